//! Navigation state aggregate and progress computation.

use serde::Serialize;

use crate::maneuver::format_distance;
use crate::model::{Destination, PositionFix, Route, Step, TravelMode};

/// Navigation session status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationStatus {
    #[default]
    Idle,
    Calculating,
    Navigating,
    OffRoute,
    Arrived,
}

/// Snapshot of the navigation session.
///
/// The navigator owns the only mutable copy; consumers always receive
/// clones.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NavigationState {
    pub status: NavigationStatus,
    pub current_route: Option<Route>,
    pub current_step: Option<Step>,
    pub step_index: usize,
    pub user_location: Option<PositionFix>,
    pub destination: Option<Destination>,
    /// Meters, never negative.
    pub distance_remaining: f64,
    /// Seconds, never negative.
    pub time_remaining: f64,
    /// Fraction of the route covered, in [0, 1].
    pub route_progress: f64,
    pub travel_mode: TravelMode,
    pub is_off_route: bool,
}

/// Output of [`compute_progress`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub distance_remaining: f64,
    pub time_remaining: f64,
    pub route_progress: f64,
}

/// Step-granular progress along a route.
///
/// The remaining distance is the full distance of the current step plus
/// every later step; positions inside a step are not interpolated.
pub fn compute_progress(route: &Route, step_index: usize) -> Progress {
    let steps = route.steps();
    let from = step_index.min(steps.len());
    let distance_remaining = steps[from..]
        .iter()
        .map(|s| s.distance_m.max(0.0))
        .sum::<f64>();

    let total = route.total_distance_m();
    let route_progress = if total > 0.0 {
        (1.0 - distance_remaining / total).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let time_remaining = (route.total_duration_s() * (1.0 - route_progress)).max(0.0);

    Progress {
        distance_remaining,
        time_remaining,
        route_progress,
    }
}

impl NavigationState {
    /// Install a freshly calculated route: first step, leg totals,
    /// progress back to zero.
    pub(crate) fn install_route(&mut self, route: Route) {
        self.current_step = route.steps().first().cloned();
        self.step_index = 0;
        self.distance_remaining = route.total_distance_m().max(0.0);
        self.time_remaining = route.total_duration_s().max(0.0);
        self.route_progress = 0.0;
        self.is_off_route = false;
        self.current_route = Some(route);
    }

    pub(crate) fn apply_progress(&mut self, progress: Progress) {
        self.distance_remaining = progress.distance_remaining;
        self.time_remaining = progress.time_remaining;
        self.route_progress = progress.route_progress;
    }

    /// True while a route is being followed.
    pub fn is_active(&self) -> bool {
        matches!(
            self.status,
            NavigationStatus::Navigating | NavigationStatus::OffRoute
        )
    }

    pub fn step_count(&self) -> usize {
        self.current_route.as_ref().map_or(0, |r| r.steps().len())
    }

    /// Remaining distance formatted for the instruction banner.
    pub fn distance_remaining_text(&self) -> String {
        format_distance(self.distance_remaining)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::geo::Coordinate;
    use crate::model::Leg;

    pub(crate) fn step(from: (f64, f64), to: (f64, f64), distance_m: f64) -> Step {
        Step {
            instruction: "Continue".into(),
            distance_m,
            duration_s: distance_m * 0.72,
            start_location: Coordinate::new(from.0, from.1),
            end_location: Coordinate::new(to.0, to.1),
            maneuver: None,
            polyline: String::new(),
        }
    }

    pub(crate) fn route(steps: Vec<Step>) -> Route {
        let distance_m = steps.iter().map(|s| s.distance_m).sum();
        let duration_s = steps.iter().map(|s| s.duration_s).sum();
        let start_location = steps[0].start_location;
        let end_location = steps[steps.len() - 1].end_location;
        Route {
            leg: Leg {
                distance_m,
                duration_s,
                steps,
                start_address: String::new(),
                end_address: String::new(),
                start_location,
                end_location,
            },
            overview_polyline: String::new(),
            warnings: Vec::new(),
        }
    }

    fn three_steps() -> Route {
        route(vec![
            step((0.0, 0.0), (0.0018, 0.0), 200.0),
            step((0.0018, 0.0), (0.0036, 0.0), 200.0),
            step((0.0036, 0.0), (0.0045, 0.0), 100.0),
        ])
    }

    #[test]
    fn progress_at_start() {
        let p = compute_progress(&three_steps(), 0);
        assert_eq!(p.distance_remaining, 500.0);
        assert_eq!(p.route_progress, 0.0);
        assert!((p.time_remaining - 360.0).abs() < 1e-9);
    }

    #[test]
    fn progress_after_first_step() {
        let p = compute_progress(&three_steps(), 1);
        assert_eq!(p.distance_remaining, 300.0);
        assert!((p.route_progress - 0.4).abs() < 1e-12);
        assert!((p.time_remaining - 216.0).abs() < 1e-9);
    }

    #[test]
    fn progress_out_of_range_index_is_clamped() {
        let p = compute_progress(&three_steps(), 10);
        assert_eq!(p.distance_remaining, 0.0);
        assert_eq!(p.route_progress, 1.0);
    }

    #[test]
    fn install_route_resets_progress() {
        let mut state = NavigationState {
            route_progress: 0.7,
            step_index: 2,
            is_off_route: true,
            ..NavigationState::default()
        };
        state.install_route(three_steps());

        assert_eq!(state.step_index, 0);
        assert_eq!(state.route_progress, 0.0);
        assert_eq!(state.distance_remaining, 500.0);
        assert!(!state.is_off_route);
        assert_eq!(state.current_step.as_ref().map(|s| s.distance_m), Some(200.0));
        assert_eq!(state.step_count(), 3);
    }

    #[test]
    fn default_state_is_idle() {
        let state = NavigationState::default();
        assert_eq!(state.status, NavigationStatus::Idle);
        assert!(state.current_route.is_none());
        assert!(!state.is_active());
        assert_eq!(state.distance_remaining_text(), "0 m");
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&NavigationStatus::OffRoute).unwrap();
        assert_eq!(json, "\"off_route\"");
    }
}
