//! Common utilities and data structures shared by the volnav crates

mod bounds;
mod math;
mod vector;

pub use bounds::*;
pub use math::*;
pub use vector::*;

/// Represents a 3D position
pub type Vec3 = glam::Vec3;

/// Error types for the library
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("invalid navigation volume: {0}")]
    InvalidVolume(String),

    #[error("navigation query failed: {0}")]
    Query(String),

    #[error("pathfinding failed: {0}")]
    Pathfinding(String),

    #[error("query scheduler error: {0}")]
    Scheduler(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Result type for volnav operations
pub type Result<T> = std::result::Result<T, Error>;
