//! Drone Delivery Fleet Planner
//!
//! This library plans parcel deliveries across a fleet of battery-powered
//! drones that must avoid time-active polygonal no-fly zones, and simulates
//! execution against capacity, battery, time-window, and zone constraints.

pub mod executor;
pub mod feasibility;
pub mod genetic;
pub mod geometry;
pub mod routing;
pub mod solver;
pub mod system;
pub mod types;
pub mod zone;

pub use executor::*;
pub use feasibility::*;
pub use genetic::*;
pub use geometry::*;
pub use routing::*;
pub use solver::*;
pub use system::*;
pub use types::*;
pub use zone::*;

/// Result type for delivery planning operations
pub type DeliveryResult<T> = Result<T, DeliveryError>;

/// Main errors that can occur while loading scenarios or running a solve
#[derive(thiserror::Error, Debug)]
pub enum DeliveryError {
    #[error("invalid polygon: {0}")]
    InvalidPolygon(String),

    #[error("invalid time window: start {start} is after end {end}")]
    InvalidTimeWindow {
        start: chrono::DateTime<chrono::Utc>,
        end: chrono::DateTime<chrono::Utc>,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unknown drone in assignment: {0}")]
    UnknownDrone(String),

    #[error("unknown delivery in assignment: {0}")]
    UnknownDelivery(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
