//! Directions provider client.
//!
//! Wraps the external directions HTTP API and converts its JSON response
//! into the canonical [`Route`] model. Every call is a fresh request;
//! nothing is cached and failed requests are not retried.

use async_trait::async_trait;
use log::{debug, warn};
use regex::{Captures, Regex};
use reqwest::Client;
use serde::Deserialize;
use std::sync::LazyLock;

use crate::config::DirectionsConfig;
use crate::error::{NavError, Result};
use crate::geo::Coordinate;
use crate::maneuver::Maneuver;
use crate::model::{Leg, Route, Step, TravelMode};

/// Instruction used when the provider sends none.
pub const DEFAULT_INSTRUCTION: &str = "Continue";

/// Source of routes for the navigator.
///
/// `Ok(None)` means the provider answered but had no usable route
/// (zero results, request denied, ...). `Err` covers invalid input and
/// transport or decoding failures. Callers must not retry automatically.
#[async_trait]
pub trait RouteProvider: Send + Sync {
    async fn calculate_route(
        &self,
        origin: Coordinate,
        destination: Coordinate,
        mode: TravelMode,
    ) -> Result<Option<Route>>;
}

/// HTTP client for a Google-style directions endpoint.
#[derive(Debug, Clone)]
pub struct DirectionsClient {
    config: DirectionsConfig,
    client: Client,
}

impl DirectionsClient {
    pub fn new(config: DirectionsConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl RouteProvider for DirectionsClient {
    async fn calculate_route(
        &self,
        origin: Coordinate,
        destination: Coordinate,
        mode: TravelMode,
    ) -> Result<Option<Route>> {
        if !origin.is_valid() {
            return Err(NavError::RouteComputationFailed(format!(
                "invalid origin {},{}",
                origin.lat, origin.lng
            )));
        }
        if !destination.is_valid() {
            return Err(NavError::InvalidDestination(format!(
                "{},{}",
                destination.lat, destination.lng
            )));
        }

        let mut query = vec![
            ("origin", format!("{},{}", origin.lat, origin.lng)),
            ("destination", format!("{},{}", destination.lat, destination.lng)),
            ("mode", mode.as_provider_str().to_string()),
            ("key", self.config.api_key.clone()),
        ];
        if let Some(language) = &self.config.language {
            query.push(("language", language.clone()));
        }

        debug!(
            "Requesting {} route to {},{}",
            mode.as_provider_str(),
            destination.lat,
            destination.lng
        );

        let body = self
            .client
            .get(&self.config.base_url)
            .query(&query)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        parse_response(&body)
    }
}

#[derive(Debug, Deserialize)]
struct ProviderResponse {
    status: String,
    #[serde(default)]
    routes: Vec<ProviderRoute>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProviderRoute {
    #[serde(default)]
    legs: Vec<ProviderLeg>,
    #[serde(default)]
    overview_polyline: Option<ProviderPolyline>,
    #[serde(default)]
    warnings: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ProviderLeg {
    #[serde(default)]
    distance: Option<ProviderValue>,
    #[serde(default)]
    duration: Option<ProviderValue>,
    #[serde(default)]
    start_address: String,
    #[serde(default)]
    end_address: String,
    start_location: ProviderLatLng,
    end_location: ProviderLatLng,
    #[serde(default)]
    steps: Vec<ProviderStep>,
}

#[derive(Debug, Deserialize)]
struct ProviderStep {
    #[serde(default)]
    html_instructions: Option<String>,
    #[serde(default)]
    distance: Option<ProviderValue>,
    #[serde(default)]
    duration: Option<ProviderValue>,
    start_location: ProviderLatLng,
    end_location: ProviderLatLng,
    #[serde(default)]
    maneuver: Option<String>,
    #[serde(default)]
    polyline: Option<ProviderPolyline>,
}

#[derive(Debug, Deserialize)]
struct ProviderValue {
    value: f64,
}

#[derive(Debug, Deserialize)]
struct ProviderLatLng {
    lat: f64,
    lng: f64,
}

#[derive(Debug, Deserialize)]
struct ProviderPolyline {
    points: String,
}

impl From<ProviderLatLng> for Coordinate {
    fn from(p: ProviderLatLng) -> Self {
        Coordinate::new(p.lat, p.lng)
    }
}

/// Parse a provider response body.
///
/// Non-success statuses and responses without a leg yield `Ok(None)`.
pub fn parse_response(body: &str) -> Result<Option<Route>> {
    let response: ProviderResponse = serde_json::from_str(body)?;

    if response.status != "OK" {
        warn!(
            "Directions provider returned {}: {}",
            response.status,
            response.error_message.as_deref().unwrap_or("no message")
        );
        return Ok(None);
    }

    let Some(route) = response.routes.into_iter().next() else {
        warn!("Directions provider returned OK without routes");
        return Ok(None);
    };
    let Some(leg) = route.legs.into_iter().next() else {
        warn!("Directions provider returned a route without legs");
        return Ok(None);
    };

    let steps = convert_steps(leg.steps);
    if steps.is_empty() {
        warn!("Directions provider returned a leg without steps");
        return Ok(None);
    }

    Ok(Some(Route {
        leg: Leg {
            distance_m: leg.distance.map_or(0.0, |d| d.value),
            duration_s: leg.duration.map_or(0.0, |d| d.value),
            steps,
            start_address: leg.start_address,
            end_address: leg.end_address,
            start_location: leg.start_location.into(),
            end_location: leg.end_location.into(),
        },
        overview_polyline: route.overview_polyline.map(|p| p.points).unwrap_or_default(),
        warnings: route.warnings,
    }))
}

fn convert_steps(raw: Vec<ProviderStep>) -> Vec<Step> {
    let mut steps: Vec<Step> = Vec::with_capacity(raw.len());

    for s in raw {
        let start_location: Coordinate = s.start_location.into();
        let end_location: Coordinate = s.end_location.into();

        let instruction = s
            .html_instructions
            .as_deref()
            .map(strip_markup)
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| DEFAULT_INSTRUCTION.to_string());

        // Fill in a maneuver from the turn geometry when the provider has none
        let maneuver = s
            .maneuver
            .as_deref()
            .and_then(Maneuver::from_code)
            .or_else(|| {
                steps.last().map(|prev| {
                    Maneuver::infer(
                        &prev.start_location,
                        &prev.end_location,
                        &start_location,
                        &end_location,
                    )
                })
            });

        steps.push(Step {
            instruction,
            distance_m: s.distance.map_or(0.0, |d| d.value),
            duration_s: s.duration.map_or(0.0, |d| d.value),
            start_location,
            end_location,
            maneuver,
            polyline: s.polyline.map(|p| p.points).unwrap_or_default(),
        });
    }

    steps
}

/// Any markup tag; group 1 is the tag name.
static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</?([a-zA-Z][a-zA-Z0-9]*)[^>]*>").unwrap());

/// Strip markup from an instruction and decode the common entities.
///
/// Block-level tags become word breaks, inline tags are removed.
pub fn strip_markup(html: &str) -> String {
    let text = TAG_RE.replace_all(html, |caps: &Captures| {
        match caps[1].to_ascii_lowercase().as_str() {
            "div" | "br" | "p" | "li" => " ",
            _ => "",
        }
    });
    let text = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
