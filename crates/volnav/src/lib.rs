//! Volumetric navigation
//!
//! A navigation world is a table of baked [`NavVolume`]s. Each volume
//! partitions a region of space into convex [`NavRegion`]s; regions that share
//! a face or an edge are linked by a [`Portal`]. Volumes can be joined with
//! external portals so that paths may cross from one volume into another.
//!
//! # Example
//!
//! ```rust,ignore
//! use volnav::{NavWorld, PathPlanner, PathRequest, PlannerConfig};
//!
//! let mut world = NavWorld::new();
//! let volume = world.add_volume(&volume_data)?;
//!
//! let hit = world.nearest_point(point, 5.0);
//! assert!(hit.is_valid());
//!
//! let mut planner = PathPlanner::new(&world, PlannerConfig::default());
//! let path = planner.find_path(&PathRequest::new(start, destination))?;
//! ```
//!
//! Queries only read the world, so a world wrapped in an `Arc` can be shared
//! with worker threads. Floating-origin shifts go through
//! [`NavWorld::update_all_transforms`].

mod config;
mod funnel;
mod nav_hit;
mod path;
mod planner;
mod portal;
pub mod primitives;
mod status;
mod volume;
mod world;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_volume_helpers;

pub use config::*;
pub use funnel::*;
pub use nav_hit::*;
pub use path::*;
pub use planner::*;
pub use portal::*;
pub use primitives::{Edge, Triangle};
pub use status::*;
pub use volume::*;
pub use world::*;

#[cfg(test)]
mod concurrency_safety_tests;

slotmap::new_key_type! {
    /// Handle of a volume in a [`NavWorld`]
    ///
    /// Handles are generational: a handle to a removed volume never resolves
    /// to a volume loaded later into the same slot.
    pub struct VolumeId;
}

/// Index of a region inside its volume
pub type RegionIndex = u32;

/// Plain handle naming one region of one volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct RegionRef {
    /// Volume the region belongs to
    pub volume: VolumeId,
    /// Region index within the volume
    pub region: RegionIndex,
}

impl RegionRef {
    /// Creates a new region reference
    pub fn new(volume: VolumeId, region: RegionIndex) -> Self {
        Self { volume, region }
    }
}

/// Handle of a portal, either owned by a volume or by the world
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum PortalRef {
    /// Portal between two regions of the same volume
    Internal {
        /// Owning volume
        volume: VolumeId,
        /// Portal index within the volume
        index: u32,
    },
    /// Portal between regions of two different volumes
    External(u32),
}
