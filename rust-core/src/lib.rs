pub mod android_jni;
pub mod config;
pub mod directions;
pub mod error;
pub mod events;
pub mod geo;
pub mod location;
pub mod maneuver;
pub mod model;
pub mod navigator;
pub mod state;

pub use config::NavigatorConfig;
pub use error::{NavError, Result};
pub use events::{EventBus, EventHandler, NavigationEvent, Subscription};
pub use geo::Coordinate;
pub use model::{Destination, PositionFix, Route, Step, TravelMode};
pub use navigator::Navigator;
pub use state::{NavigationState, NavigationStatus};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
