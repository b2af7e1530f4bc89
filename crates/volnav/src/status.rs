//! Failure codes of path queries

use volnav_common::Error;

/// Reason a path request produced no path
///
/// Failures are plain values: they are copied into result records, handed to
/// the agent that asked, and never abort the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum PathFailure {
    /// The start position is not on or near any region
    StartUnresolvable,
    /// The destination is not on or near any region
    DestinationUnresolvable,
    /// Start and destination lie in disconnected parts of the world
    NoPath,
    /// The search visited more regions than the configured limit
    SearchLimit,
    /// The request itself was malformed (non-finite coordinates, bad config)
    InvalidRequest,
}

impl PathFailure {
    /// Whether retrying the same request can succeed once the world changes
    pub fn is_transient(&self) -> bool {
        matches!(self, PathFailure::SearchLimit)
    }
}

impl std::error::Error for PathFailure {}

impl std::fmt::Display for PathFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathFailure::StartUnresolvable => write!(f, "Start position is off the navigation volumes"),
            PathFailure::DestinationUnresolvable => {
                write!(f, "Destination is off the navigation volumes")
            }
            PathFailure::NoPath => write!(f, "No path between start and destination"),
            PathFailure::SearchLimit => write!(f, "Search node limit exceeded"),
            PathFailure::InvalidRequest => write!(f, "Invalid path request"),
        }
    }
}

impl From<PathFailure> for Error {
    fn from(failure: PathFailure) -> Self {
        Error::Pathfinding(failure.to_string())
    }
}
