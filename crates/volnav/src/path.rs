//! Planned paths

use glam::Vec3;
use volnav_common::polyline_length;

use crate::RegionRef;

/// A planned path through the world
///
/// Holds the start, one waypoint on each crossed portal and the destination.
/// Segment `i` (from waypoint `i` to `i + 1`) runs inside `regions()[i]`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct NavPath {
    waypoints: Vec<Vec3>,
    regions: Vec<RegionRef>,
    corridor_length: f32,
}

impl NavPath {
    /// Creates a path; `regions` must have one entry per segment
    pub fn new(waypoints: Vec<Vec3>, regions: Vec<RegionRef>, corridor_length: f32) -> Self {
        debug_assert_eq!(regions.len() + 1, waypoints.len());
        Self {
            waypoints,
            regions,
            corridor_length,
        }
    }

    /// All waypoints, start and destination included
    pub fn waypoints(&self) -> &[Vec3] {
        &self.waypoints
    }

    /// Region traversed by each segment
    pub fn regions(&self) -> &[RegionRef] {
        &self.regions
    }

    /// Number of segments
    pub fn segment_count(&self) -> usize {
        self.regions.len()
    }

    /// First waypoint, the snapped start
    pub fn start(&self) -> Vec3 {
        self.waypoints.first().copied().unwrap_or(Vec3::ZERO)
    }

    /// Last waypoint, the snapped destination
    pub fn destination(&self) -> Vec3 {
        self.waypoints.last().copied().unwrap_or(Vec3::ZERO)
    }

    /// Length of the refined path
    pub fn length(&self) -> f32 {
        polyline_length(&self.waypoints)
    }

    /// Length of the corridor through the portal centers, as found by the search
    pub fn corridor_length(&self) -> f32 {
        self.corridor_length
    }

    /// The same path after the origin moved by `offset`
    pub fn translated(&self, offset: Vec3) -> Self {
        Self {
            waypoints: self.waypoints.iter().map(|p| *p - offset).collect(),
            regions: self.regions.clone(),
            corridor_length: self.corridor_length,
        }
    }
}
