//! The navigation world: a table of volumes joined by external portals

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use glam::Vec3;
use log::{debug, warn};
use slotmap::SlotMap;
use volnav_common::{Error, Result};

use crate::{
    Aperture, NavHit, NavRegion, NavVolume, Portal, PortalRef, RegionRef, VolumeData, VolumeId,
};

/// Neighbor of a region as seen from the world
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorldLink {
    /// Region on the other side of the portal
    pub neighbor: RegionRef,
    /// Portal leading there
    pub portal: PortalRef,
}

/// All loaded volumes plus the portals between them
///
/// Volumes are reference counted so that cloning a world is cheap; a cloned
/// world shares volumes with the original until one of them is shifted.
#[derive(Debug, Clone, Default)]
pub struct NavWorld {
    volumes: SlotMap<VolumeId, Arc<NavVolume>>,
    external_portals: Vec<Option<Portal>>,
    external_links: HashMap<RegionRef, Vec<(RegionRef, u32)>>,
    epoch: u64,
}

impl NavWorld {
    /// Creates an empty world
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a volume from baked data and loads it
    pub fn add_volume(&mut self, data: &VolumeData) -> Result<VolumeId> {
        let id = self
            .volumes
            .try_insert_with_key(|id| NavVolume::build(id, data).map(Arc::new))?;
        debug!("loaded volume '{}' as {:?}", data.name, id);
        Ok(id)
    }

    /// Unloads a volume and every external portal touching it
    pub fn remove_volume(&mut self, id: VolumeId) -> bool {
        if self.volumes.remove(id).is_none() {
            return false;
        }

        let mut dropped = 0;
        for slot in &mut self.external_portals {
            let touches = slot
                .as_ref()
                .is_some_and(|p| p.regions().iter().any(|r| r.volume == id));
            if touches {
                *slot = None;
                dropped += 1;
            }
        }
        self.external_links.retain(|from, links| {
            links.retain(|(to, _)| to.volume != id);
            from.volume != id && !links.is_empty()
        });

        debug!("unloaded volume {:?}, dropped {} external portals", id, dropped);
        true
    }

    /// Volume by handle
    pub fn volume(&self, id: VolumeId) -> Option<&NavVolume> {
        self.volumes.get(id).map(|volume| volume.as_ref())
    }

    /// All loaded volumes in handle order
    pub fn volumes(&self) -> impl Iterator<Item = &NavVolume> + '_ {
        self.volumes.values().map(|volume| volume.as_ref())
    }

    /// Number of loaded volumes
    pub fn volume_count(&self) -> usize {
        self.volumes.len()
    }

    /// Region by handle
    pub fn region(&self, region: RegionRef) -> Option<&NavRegion> {
        self.volume(region.volume)?.region(region.region)
    }

    /// Portal by handle
    pub fn portal(&self, portal: PortalRef) -> Option<&Portal> {
        match portal {
            PortalRef::Internal { volume, index } => self.volume(volume)?.portal(index),
            PortalRef::External(index) => self.external_portals.get(index as usize)?.as_ref(),
        }
    }

    /// Number of live external portals
    pub fn external_portal_count(&self) -> usize {
        self.external_portals.iter().flatten().count()
    }

    /// Internal and external links leaving `region`
    pub fn neighbors(&self, region: RegionRef) -> impl Iterator<Item = WorldLink> + '_ {
        let internal = self.volumes.get(region.volume).into_iter().flat_map(move |volume| {
            volume
                .region_adjacency()
                .neighbors(region.region)
                .iter()
                .map(move |link| WorldLink {
                    neighbor: RegionRef::new(region.volume, link.neighbor),
                    portal: PortalRef::Internal {
                        volume: region.volume,
                        index: link.portal,
                    },
                })
        });
        let external = self
            .external_links
            .get(&region)
            .into_iter()
            .flatten()
            .map(|&(neighbor, index)| WorldLink {
                neighbor,
                portal: PortalRef::External(index),
            });
        internal.chain(external)
    }

    /// Links two regions of different volumes through `aperture`
    pub fn add_external_portal(
        &mut self,
        a: RegionRef,
        b: RegionRef,
        aperture: Aperture,
    ) -> Result<PortalRef> {
        if a.volume == b.volume {
            return Err(Error::InvalidVolume(
                "external portals must join two different volumes".to_string(),
            ));
        }
        for region in [a, b] {
            if self.region(region).is_none() {
                return Err(Error::InvalidVolume(format!(
                    "external portal references unknown region {:?}",
                    region
                )));
            }
        }

        let portal = Portal::new(a, b, aperture)?;
        let index = self.external_portals.len() as u32;
        self.external_portals.push(Some(portal));
        self.external_links.entry(a).or_default().push((b, index));
        self.external_links.entry(b).or_default().push((a, index));
        Ok(PortalRef::External(index))
    }

    /// Joins two volumes along coincident boundary faces
    ///
    /// A boundary face of a region in `a` matches a boundary face of a region in
    /// `b` when every corner of one lies within `tolerance` of a distinct corner
    /// of the other. One external portal is created per matching region pair.
    /// Returns the number of portals created.
    pub fn connect_volumes(&mut self, a: VolumeId, b: VolumeId, tolerance: f32) -> Result<usize> {
        if a == b {
            return Err(Error::InvalidVolume(
                "cannot connect a volume to itself".to_string(),
            ));
        }
        let (Some(volume_a), Some(volume_b)) = (self.volume(a), self.volume(b)) else {
            return Err(Error::InvalidVolume(format!(
                "cannot connect unknown volumes {:?} and {:?}",
                a, b
            )));
        };

        let mut shared: BTreeMap<(u32, u32), Vec<[Vec3; 3]>> = BTreeMap::new();
        for region_a in volume_a.regions() {
            let mut grown = *region_a.bounds();
            grown.min -= Vec3::splat(tolerance);
            grown.max += Vec3::splat(tolerance);

            for region_b in volume_b.regions() {
                if !grown.overlaps(region_b.bounds()) {
                    continue;
                }
                for (fa, tri_a) in region_a.triangles().iter().enumerate() {
                    if !region_a.is_boundary_face(fa) {
                        continue;
                    }
                    let corners_a = volume_a.triangle_positions(*tri_a);
                    for (fb, tri_b) in region_b.triangles().iter().enumerate() {
                        if !region_b.is_boundary_face(fb) {
                            continue;
                        }
                        let corners_b = volume_b.triangle_positions(*tri_b);
                        if faces_coincide(&corners_a, &corners_b, tolerance) {
                            shared
                                .entry((region_a.index(), region_b.index()))
                                .or_default()
                                .push(corners_a);
                        }
                    }
                }
            }
        }

        let mut created = 0;
        for ((ra, rb), triangles) in shared {
            let from = RegionRef::new(a, ra);
            let to = RegionRef::new(b, rb);
            let already_linked = self
                .external_links
                .get(&from)
                .is_some_and(|links| links.iter().any(|(r, _)| *r == to));
            if already_linked {
                warn!("regions {:?} and {:?} are already linked, skipping", from, to);
                continue;
            }
            self.add_external_portal(from, to, Aperture::new(triangles, Vec::new()))?;
            created += 1;
        }

        debug!("connected volumes {:?} and {:?} with {} portals", a, b, created);
        Ok(created)
    }

    /// Closest navigable point over all volumes
    ///
    /// Returns an invalid hit when nothing lies within `max_distance`, which
    /// includes any negative or NaN limit. Ties go to the lowest volume handle,
    /// then the lowest region index.
    pub fn nearest_point(&self, point: Vec3, max_distance: f32) -> NavHit {
        let mut best = NavHit::invalid();
        if max_distance.is_nan() || max_distance < 0.0 {
            return best;
        }
        let mut best_dist = f32::INFINITY;
        for volume in self.volumes.values() {
            let hit = volume.nearest_point_within(point, max_distance);
            if !hit.is_valid() {
                continue;
            }
            let d = (hit.position - point).length_squared();
            if d < best_dist {
                best_dist = d;
                best = hit;
                if !hit.on_edge {
                    break;
                }
            }
        }
        best
    }

    /// Applies a floating-origin shift to every volume and external portal
    ///
    /// Volumes still shared with another snapshot of the world are copied
    /// before being rewritten, so readers of that snapshot are unaffected.
    pub fn update_all_transforms(&mut self, offset: Vec3) {
        for volume in self.volumes.values_mut() {
            Arc::make_mut(volume).update_transform(offset);
        }
        for portal in self.external_portals.iter_mut().flatten() {
            portal.shift(offset);
        }
        self.epoch += 1;
        debug!("origin shifted by {:?}, epoch {}", offset, self.epoch);
    }

    /// Number of floating-origin shifts applied so far
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

/// Whether two triangles have the same corners up to `tolerance`, in any order
fn faces_coincide(a: &[Vec3; 3], b: &[Vec3; 3], tolerance: f32) -> bool {
    let tol_sq = tolerance * tolerance;
    let mut used = [false; 3];
    for corner in a {
        let matched = (0..3).find(|&j| !used[j] && (b[j] - *corner).length_squared() <= tol_sq);
        match matched {
            Some(j) => used[j] = true,
            None => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_volume_helpers::*;

    #[test]
    fn test_faces_coincide_any_order() {
        let a = [Vec3::ZERO, Vec3::X, Vec3::Y];
        let b = [Vec3::Y, Vec3::ZERO, Vec3::X + Vec3::splat(1e-4)];
        assert!(faces_coincide(&a, &b, 1e-3));
        assert!(!faces_coincide(&a, &b, 1e-5));
        assert!(!faces_coincide(&a, &[Vec3::ZERO, Vec3::X, Vec3::Z], 1e-3));
    }

    #[test]
    fn test_connect_touching_volumes() -> Result<()> {
        let (world, a, b) = two_touching_volumes_world()?;
        assert_eq!(world.external_portal_count(), 1);

        let links: Vec<_> = world.neighbors(RegionRef::new(a, 0)).collect();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].neighbor, RegionRef::new(b, 0));
        assert!(matches!(links[0].portal, PortalRef::External(_)));

        let portal = world.portal(links[0].portal).expect("portal");
        assert!((portal.center().x - 1.0).abs() < 1e-5);
        Ok(())
    }

    #[test]
    fn test_connect_twice_is_idempotent() -> Result<()> {
        let (mut world, a, b) = two_touching_volumes_world()?;
        assert_eq!(world.connect_volumes(a, b, 1e-3)?, 0);
        assert_eq!(world.external_portal_count(), 1);
        Ok(())
    }

    #[test]
    fn test_remove_volume_drops_external_portals() -> Result<()> {
        let (mut world, a, b) = two_touching_volumes_world()?;
        assert!(world.remove_volume(b));
        assert!(!world.remove_volume(b));
        assert_eq!(world.external_portal_count(), 0);
        assert_eq!(world.neighbors(RegionRef::new(a, 0)).count(), 0);
        assert!(world.volume(b).is_none());
        Ok(())
    }

    #[test]
    fn test_removed_handle_never_resolves_again() -> Result<()> {
        let mut world = NavWorld::new();
        let first = world.add_volume(&box_volume_data(Vec3::ZERO, Vec3::ONE))?;
        world.remove_volume(first);
        let second = world.add_volume(&box_volume_data(Vec3::ZERO, Vec3::ONE))?;
        assert_ne!(first, second);
        assert!(world.volume(first).is_none());
        assert!(world.volume(second).is_some());
        Ok(())
    }

    #[test]
    fn test_external_portal_validation() -> Result<()> {
        let (mut world, a, _) = two_touching_volumes_world()?;
        let aperture = Aperture::from_triangle(Vec3::ZERO, Vec3::X, Vec3::Y);
        assert!(world
            .add_external_portal(RegionRef::new(a, 0), RegionRef::new(a, 0), aperture.clone())
            .is_err());
        assert!(world
            .add_external_portal(RegionRef::new(a, 0), RegionRef::new(a, 7), aperture)
            .is_err());
        Ok(())
    }

    #[test]
    fn test_world_nearest_point() -> Result<()> {
        let (world, a, b) = two_touching_volumes_world()?;

        let inside_b = world.nearest_point(Vec3::new(1.5, 0.5, 0.5), 1.0);
        assert_eq!(inside_b.volume, Some(b));
        assert!(!inside_b.on_edge);

        // On the seam both volumes contain the point, the lower handle wins
        let seam = world.nearest_point(Vec3::new(1.0, 0.5, 0.5), 1.0);
        assert_eq!(seam.volume, Some(a));

        assert!(!world.nearest_point(Vec3::new(0.5, 50.0, 0.5), 1.0).is_valid());
        Ok(())
    }

    #[test]
    fn test_world_nearest_point_negative_limit() -> Result<()> {
        let (world, _, _) = two_touching_volumes_world()?;
        assert!(!world.nearest_point(Vec3::new(0.5, 1.5, 0.5), -1.0).is_valid());
        assert!(!world.nearest_point(Vec3::new(0.5, 0.5, 0.5), -0.5).is_valid());
        assert!(!world.nearest_point(Vec3::new(0.5, 0.5, 0.5), f32::NAN).is_valid());
        Ok(())
    }

    #[test]
    fn test_update_all_transforms_bumps_epoch() -> Result<()> {
        let (mut world, _, _) = two_touching_volumes_world()?;
        assert_eq!(world.epoch(), 0);
        world.update_all_transforms(Vec3::new(10.0, 0.0, 0.0));
        assert_eq!(world.epoch(), 1);
        let hit = world.nearest_point(Vec3::new(-9.5, 0.5, 0.5), 0.0);
        assert!(hit.is_valid());
        assert!(!hit.on_edge);
        Ok(())
    }
}
