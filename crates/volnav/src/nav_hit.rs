//! Result record of nearest-point and containment queries

use glam::Vec3;

use crate::{RegionIndex, RegionRef, VolumeId};

/// Result of a nearest-point query against a volume or a world
///
/// Plain data: safe to copy across threads and to keep after the volume it
/// names has been shifted or unloaded.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct NavHit {
    /// Volume the hit belongs to, `None` for an unresolved query
    pub volume: Option<VolumeId>,
    /// Region index within the volume
    pub region: RegionIndex,
    /// `true` when the query point was outside every region and `position` is
    /// the nearest boundary point; `false` when the point was contained
    pub on_edge: bool,
    /// Resulting position
    pub position: Vec3,
    /// Reserved, always zero
    pub normal: Vec3,
}

impl NavHit {
    /// A hit that did not resolve to any region
    pub fn invalid() -> Self {
        Self {
            volume: None,
            region: 0,
            on_edge: false,
            position: Vec3::ZERO,
            normal: Vec3::ZERO,
        }
    }

    /// A hit on a region
    pub fn new(volume: VolumeId, region: RegionIndex, on_edge: bool, position: Vec3) -> Self {
        Self {
            volume: Some(volume),
            region,
            on_edge,
            position,
            normal: Vec3::ZERO,
        }
    }

    /// Whether the query resolved to a region
    pub fn is_valid(&self) -> bool {
        self.volume.is_some()
    }

    /// Region handle of a valid hit
    pub fn region_ref(&self) -> Option<RegionRef> {
        self.volume.map(|volume| RegionRef::new(volume, self.region))
    }
}

impl Default for NavHit {
    fn default() -> Self {
        Self::invalid()
    }
}
