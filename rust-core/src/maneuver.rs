//! Maneuver classification.
//!
//! Maps provider maneuver codes to [`Maneuver`] and infers a maneuver
//! from the bearing change between consecutive steps when the provider
//! leaves it out. The UI uses the maneuver to pick an instruction icon.

use serde::{Deserialize, Serialize};

use crate::geo::{bearing_degrees, Coordinate};

/// Maneuver categories, named after the directions provider codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Maneuver {
    Straight,
    TurnSlightLeft,
    TurnLeft,
    TurnSharpLeft,
    TurnSlightRight,
    TurnRight,
    TurnSharpRight,
    UturnLeft,
    UturnRight,
    KeepLeft,
    KeepRight,
    ForkLeft,
    ForkRight,
    RampLeft,
    RampRight,
    Merge,
    RoundaboutLeft,
    RoundaboutRight,
    Ferry,
    FerryTrain,
}

impl Maneuver {
    /// Parse a provider maneuver code such as `"turn-left"`.
    ///
    /// Returns None for empty or unknown codes.
    pub fn from_code(code: &str) -> Option<Maneuver> {
        let m = match code.trim() {
            "straight" => Maneuver::Straight,
            "turn-slight-left" => Maneuver::TurnSlightLeft,
            "turn-left" => Maneuver::TurnLeft,
            "turn-sharp-left" => Maneuver::TurnSharpLeft,
            "turn-slight-right" => Maneuver::TurnSlightRight,
            "turn-right" => Maneuver::TurnRight,
            "turn-sharp-right" => Maneuver::TurnSharpRight,
            "uturn-left" => Maneuver::UturnLeft,
            "uturn-right" => Maneuver::UturnRight,
            "keep-left" => Maneuver::KeepLeft,
            "keep-right" => Maneuver::KeepRight,
            "fork-left" => Maneuver::ForkLeft,
            "fork-right" => Maneuver::ForkRight,
            "ramp-left" => Maneuver::RampLeft,
            "ramp-right" => Maneuver::RampRight,
            "merge" => Maneuver::Merge,
            "roundabout-left" => Maneuver::RoundaboutLeft,
            "roundabout-right" => Maneuver::RoundaboutRight,
            "ferry" => Maneuver::Ferry,
            "ferry-train" => Maneuver::FerryTrain,
            _ => return None,
        };
        Some(m)
    }

    /// Infer the maneuver taken when leaving one step for the next.
    ///
    /// Uses the bearing of each step (start to end) and classifies the
    /// relative angle between them.
    pub fn infer(
        prev_start: &Coordinate,
        prev_end: &Coordinate,
        next_start: &Coordinate,
        next_end: &Coordinate,
    ) -> Maneuver {
        let bearing_in = bearing_degrees(prev_start, prev_end);
        let bearing_out = bearing_degrees(next_start, next_end);

        // Relative angle: positive = right turn, negative = left turn
        let mut angle = bearing_out - bearing_in;

        // Normalize to [-180, 180]
        while angle > 180.0 {
            angle -= 360.0;
        }
        while angle < -180.0 {
            angle += 360.0;
        }

        classify_turn(angle)
    }
}

/// Classify a relative bearing angle into a maneuver.
fn classify_turn(angle: f64) -> Maneuver {
    let abs_angle = angle.abs();

    if abs_angle > 170.0 {
        if angle > 0.0 { Maneuver::UturnRight } else { Maneuver::UturnLeft }
    } else if abs_angle > 120.0 {
        if angle > 0.0 { Maneuver::TurnSharpRight } else { Maneuver::TurnSharpLeft }
    } else if abs_angle > 60.0 {
        if angle > 0.0 { Maneuver::TurnRight } else { Maneuver::TurnLeft }
    } else if abs_angle > 20.0 {
        if angle > 0.0 { Maneuver::TurnSlightRight } else { Maneuver::TurnSlightLeft }
    } else {
        Maneuver::Straight
    }
}

/// Format a distance for instruction banners: "150 m", "2.5 km".
pub fn format_distance(meters: f64) -> String {
    if meters >= 1000.0 {
        format!("{:.1} km", meters / 1000.0)
    } else {
        format!("{} m", (meters / 10.0).round() as i64 * 10)
    }
}
