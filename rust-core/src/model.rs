//! Canonical navigation data model.
//!
//! Provider responses are converted into these structures, which are
//! serializable so they can cross the JNI boundary as JSON.

use serde::{Deserialize, Serialize};

use crate::geo::Coordinate;
use crate::maneuver::Maneuver;

/// How the user is travelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TravelMode {
    #[default]
    Walking,
    Driving,
    Transit,
}

impl TravelMode {
    /// Travel mode in the directions provider's vocabulary.
    pub fn as_provider_str(&self) -> &'static str {
        match self {
            TravelMode::Walking => "walking",
            TravelMode::Driving => "driving",
            TravelMode::Transit => "transit",
        }
    }

    /// Lenient parse used for strings coming from the app. Unknown
    /// values fall back to walking.
    pub fn from_name(name: &str) -> TravelMode {
        match name.trim().to_ascii_lowercase().as_str() {
            "driving" => TravelMode::Driving,
            "transit" => TravelMode::Transit,
            _ => TravelMode::Walking,
        }
    }
}

/// A navigation target, typically a campus venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub coordinates: Coordinate,
    #[serde(default)]
    pub category: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub building: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// A single position sample from the platform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionFix {
    pub lat: f64,
    pub lng: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
    /// Horizontal accuracy in meters.
    pub accuracy: f64,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
}

impl PositionFix {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.lat, self.lng)
    }
}

/// An atomic maneuver instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Plain-text instruction, markup already stripped.
    pub instruction: String,
    pub distance_m: f64,
    pub duration_s: f64,
    pub start_location: Coordinate,
    pub end_location: Coordinate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maneuver: Option<Maneuver>,
    /// Encoded polyline of the step geometry, passed through to the map.
    #[serde(default)]
    pub polyline: String,
}

/// One origin-to-destination segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leg {
    pub distance_m: f64,
    pub duration_s: f64,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub start_address: String,
    #[serde(default)]
    pub end_address: String,
    pub start_location: Coordinate,
    pub end_location: Coordinate,
}

/// A computed route. Only single-leg routes are supported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub leg: Leg,
    #[serde(default)]
    pub overview_polyline: String,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl Route {
    pub fn steps(&self) -> &[Step] {
        &self.leg.steps
    }

    /// Total route distance, falling back to the step sum when the
    /// provider reports a zero leg distance.
    pub fn total_distance_m(&self) -> f64 {
        if self.leg.distance_m > 0.0 {
            self.leg.distance_m
        } else {
            self.leg.steps.iter().map(|s| s.distance_m).sum()
        }
    }

    pub fn total_duration_s(&self) -> f64 {
        if self.leg.duration_s > 0.0 {
            self.leg.duration_s
        } else {
            self.leg.steps.iter().map(|s| s.duration_s).sum()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn travel_mode_names() {
        assert_eq!(TravelMode::from_name("Driving"), TravelMode::Driving);
        assert_eq!(TravelMode::from_name("transit"), TravelMode::Transit);
        assert_eq!(TravelMode::from_name("hovercraft"), TravelMode::Walking);
        assert_eq!(TravelMode::Transit.as_provider_str(), "transit");
    }

    #[test]
    fn destination_from_app_json() {
        let json = r#"{
            "id": "lib-1",
            "name": "Main Library",
            "description": "Open 24h",
            "coordinates": { "lat": 51.7543, "lng": -1.2540 },
            "category": "library",
            "type": "building",
            "building": "L1",
            "keywords": ["books", "study"]
        }"#;

        let dest: Destination = serde_json::from_str(json).unwrap();
        assert_eq!(dest.kind, "building");
        assert_eq!(dest.building.as_deref(), Some("L1"));
        assert_eq!(dest.keywords.len(), 2);
        assert!((dest.coordinates.lat - 51.7543).abs() < 1e-9);
    }

    #[test]
    fn destination_optional_fields_default() {
        let json = r#"{ "id": "x", "name": "X", "coordinates": { "lat": 0.0, "lng": 0.0 } }"#;
        let dest: Destination = serde_json::from_str(json).unwrap();
        assert!(dest.keywords.is_empty());
        assert!(dest.building.is_none());
    }

    #[test]
    fn route_totals_fall_back_to_steps() {
        let step = |d: f64| Step {
            instruction: "Continue".into(),
            distance_m: d,
            duration_s: d,
            start_location: Coordinate::new(0.0, 0.0),
            end_location: Coordinate::new(0.0, 0.0),
            maneuver: None,
            polyline: String::new(),
        };
        let route = Route {
            leg: Leg {
                distance_m: 0.0,
                duration_s: 0.0,
                steps: vec![step(100.0), step(50.0)],
                start_address: String::new(),
                end_address: String::new(),
                start_location: Coordinate::new(0.0, 0.0),
                end_location: Coordinate::new(0.0, 0.0),
            },
            overview_polyline: String::new(),
            warnings: Vec::new(),
        };
        assert_eq!(route.total_distance_m(), 150.0);
        assert_eq!(route.total_duration_s(), 150.0);
    }
}
