//! Error types for the navigation engine.

use thiserror::Error;

/// Navigation engine error type
#[derive(Error, Debug)]
pub enum NavError {
    #[error("Location unavailable: {0}")]
    LocationUnavailable(String),

    #[error("Route computation failed: {0}")]
    RouteComputationFailed(String),

    #[error("Recalculation failed: {0}")]
    RecalculationFailed(String),

    #[error("Invalid destination: {0}")]
    InvalidDestination(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for NavError {
    fn from(e: toml::de::Error) -> Self {
        NavError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, NavError>;
