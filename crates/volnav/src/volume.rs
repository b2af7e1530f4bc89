//! Navigation volume implementation
//!
//! A volume is built once from baked data: a vertex buffer and a partition of
//! the navigable space into convex regions, each given as the triangles of its
//! boundary. Regions that reference the same face (or the same edge) of the
//! shared vertex buffer are neighbors and get a portal.

use std::collections::{BTreeMap, HashMap, HashSet};

use glam::Vec3;
use log::debug;
use volnav_common::{
    closest_point_on_triangle, triangle_area, triangle_normal, Aabb, Error, Plane, Result,
};

use crate::primitives::{Edge, Triangle};
use crate::{Aperture, NavHit, Portal, RegionIndex, RegionRef, VolumeId};

/// Distance a point may lie outside a region's faces and still count as inside
pub const CONTAINMENT_EPSILON: f32 = 1e-4;

/// Relative tolerance used when checking that regions are convex
const CONVEXITY_TOLERANCE: f32 = 1e-3;

/// Smallest number of faces that can close a region
const MIN_REGION_FACES: usize = 4;

/// Smallest face area accepted in baked data
const MIN_FACE_AREA: f32 = 1e-8;

/// Baked boundary of one region
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct RegionData {
    /// Boundary triangles as indices into [`VolumeData::vertices`]
    pub triangles: Vec<[u32; 3]>,
}

/// Baked volume input: vertices plus the region partition
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct VolumeData {
    /// Display name of the volume
    #[cfg_attr(feature = "serialization", serde(default))]
    pub name: String,
    /// World-space vertex buffer shared by all regions
    pub vertices: Vec<Vec3>,
    /// Region partition
    pub regions: Vec<RegionData>,
}

/// Adjacency entry: neighbor region and the portal leading to it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionLink {
    /// Neighbor region in the same volume
    pub neighbor: RegionIndex,
    /// Portal index in the owning volume
    pub portal: u32,
}

/// Region adjacency of one volume
#[derive(Debug, Clone, Default)]
pub struct RegionGraph {
    adjacency: Vec<Vec<RegionLink>>,
}

impl RegionGraph {
    /// Links leaving `region`
    pub fn neighbors(&self, region: RegionIndex) -> &[RegionLink] {
        self.adjacency
            .get(region as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Number of regions in the graph
    pub fn region_count(&self) -> usize {
        self.adjacency.len()
    }

    /// Number of undirected links
    pub fn link_count(&self) -> usize {
        self.adjacency.iter().map(Vec::len).sum::<usize>() / 2
    }

    /// Whether two regions share a portal
    pub fn are_adjacent(&self, a: RegionIndex, b: RegionIndex) -> bool {
        self.neighbors(a).iter().any(|link| link.neighbor == b)
    }
}

/// A convex navigable cell of a volume
#[derive(Debug, Clone)]
pub struct NavRegion {
    index: RegionIndex,
    /// Boundary triangles with their baked winding
    triangles: Vec<[u32; 3]>,
    /// Canonical identity of each boundary triangle
    faces: Vec<Triangle>,
    /// Outward face planes, parallel to `triangles`
    planes: Vec<Plane>,
    /// Faces not shared with another region of the volume
    boundary: Vec<bool>,
    centroid: Vec3,
    bounds: Aabb,
}

impl NavRegion {
    /// Index of the region in its volume
    pub fn index(&self) -> RegionIndex {
        self.index
    }

    /// Boundary triangles
    pub fn triangles(&self) -> &[[u32; 3]] {
        &self.triangles
    }

    /// Canonical boundary faces
    pub fn faces(&self) -> &[Triangle] {
        &self.faces
    }

    /// Outward face planes
    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    /// Whether face `face` lies on the outer boundary of the volume
    pub fn is_boundary_face(&self, face: usize) -> bool {
        self.boundary.get(face).copied().unwrap_or(false)
    }

    /// Vertex centroid
    pub fn centroid(&self) -> Vec3 {
        self.centroid
    }

    /// Bounding box
    pub fn bounds(&self) -> &Aabb {
        &self.bounds
    }

    /// Whether `point` lies inside the region (boundary included)
    pub fn contains(&self, point: Vec3) -> bool {
        self.bounds.contains(point, CONTAINMENT_EPSILON)
            && self
                .planes
                .iter()
                .all(|plane| plane.signed_distance(point) <= CONTAINMENT_EPSILON)
    }

    /// Closest point on the region's boundary and its squared distance
    fn closest_boundary_point(&self, vertices: &[Vec3], point: Vec3) -> (Vec3, f32) {
        let mut best = self.centroid;
        let mut best_dist = f32::MAX;
        for tri in &self.triangles {
            let [a, b, c] = tri.map(|i| vertices[i as usize]);
            let candidate = closest_point_on_triangle(&point, &a, &b, &c);
            let d = (candidate - point).length_squared();
            if d < best_dist {
                best_dist = d;
                best = candidate;
            }
        }
        (best, best_dist)
    }

    fn shift(&mut self, offset: Vec3) {
        for plane in &mut self.planes {
            plane.shift(offset);
        }
        self.centroid -= offset;
        self.bounds.shift(offset);
    }
}

/// A baked navigation volume
#[derive(Debug, Clone)]
pub struct NavVolume {
    id: VolumeId,
    name: String,
    vertices: Vec<Vec3>,
    regions: Vec<NavRegion>,
    portals: Vec<Portal>,
    graph: RegionGraph,
    bounds: Aabb,
}

impl NavVolume {
    /// Builds a volume from baked data, detecting the portals between regions
    pub fn build(id: VolumeId, data: &VolumeData) -> Result<Self> {
        if data.regions.is_empty() {
            return Err(Error::InvalidVolume(format!(
                "volume '{}' has no regions",
                data.name
            )));
        }
        if let Some(bad) = data.vertices.iter().position(|v| !v.is_finite()) {
            return Err(Error::InvalidVolume(format!(
                "volume '{}': vertex {} is not finite",
                data.name, bad
            )));
        }

        let mut regions = Vec::with_capacity(data.regions.len());
        for (index, region_data) in data.regions.iter().enumerate() {
            regions.push(build_region(index as RegionIndex, region_data, &data.vertices, &data.name)?);
        }

        let (portal_sets, shared_faces) = find_shared_geometry(&regions, &data.name)?;

        // Faces shared with a neighbor are interior to the volume
        for (region, face) in shared_faces {
            regions[region as usize].boundary[face] = false;
        }

        let mut graph = RegionGraph {
            adjacency: vec![Vec::new(); regions.len()],
        };
        let mut portals = Vec::with_capacity(portal_sets.len());
        for ((a, b), (triangles, edges)) in portal_sets {
            let aperture = Aperture::new(
                triangles
                    .iter()
                    .map(|t| t.vertices().map(|i| data.vertices[i as usize]))
                    .collect(),
                edges
                    .iter()
                    .map(|e| e.vertices().map(|i| data.vertices[i as usize]))
                    .collect(),
            );
            let portal_index = portals.len() as u32;
            portals.push(Portal::new(
                RegionRef::new(id, a),
                RegionRef::new(id, b),
                aperture,
            )?);
            graph.adjacency[a as usize].push(RegionLink {
                neighbor: b,
                portal: portal_index,
            });
            graph.adjacency[b as usize].push(RegionLink {
                neighbor: a,
                portal: portal_index,
            });
        }

        let mut bounds = Aabb::empty();
        for region in &regions {
            bounds.expand(&region.bounds);
        }

        debug!(
            "built volume '{}': {} vertices, {} regions, {} portals",
            data.name,
            data.vertices.len(),
            regions.len(),
            portals.len()
        );

        Ok(Self {
            id,
            name: data.name.clone(),
            vertices: data.vertices.clone(),
            regions,
            portals,
            graph,
            bounds,
        })
    }

    /// Handle of the volume in its world
    pub fn id(&self) -> VolumeId {
        self.id
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// World-space vertices
    pub fn vertices(&self) -> &[Vec3] {
        &self.vertices
    }

    /// All regions
    pub fn regions(&self) -> &[NavRegion] {
        &self.regions
    }

    /// Region by index
    pub fn region(&self, index: RegionIndex) -> Option<&NavRegion> {
        self.regions.get(index as usize)
    }

    /// Internal portals
    pub fn portals(&self) -> &[Portal] {
        &self.portals
    }

    /// Internal portal by index
    pub fn portal(&self, index: u32) -> Option<&Portal> {
        self.portals.get(index as usize)
    }

    /// Read-only region adjacency used by the path planner
    pub fn region_adjacency(&self) -> &RegionGraph {
        &self.graph
    }

    /// Bounds of all regions
    pub fn bounds(&self) -> &Aabb {
        &self.bounds
    }

    /// World-space corners of a triangle
    pub fn triangle_positions(&self, triangle: [u32; 3]) -> [Vec3; 3] {
        triangle.map(|i| self.vertices[i as usize])
    }

    /// Lowest-index region containing `point`
    pub fn containing_region(&self, point: Vec3) -> Option<RegionIndex> {
        if !self.bounds.contains(point, CONTAINMENT_EPSILON) {
            return None;
        }
        self.regions
            .iter()
            .find(|region| region.contains(point))
            .map(NavRegion::index)
    }

    /// Closest point on or inside the volume's regions
    ///
    /// A contained point is returned unchanged with `on_edge == false`.
    /// Otherwise the nearest boundary point is returned with `on_edge == true`.
    /// Ties go to the lowest region index.
    pub fn nearest_point(&self, point: Vec3) -> NavHit {
        self.nearest_point_within(point, f32::INFINITY)
    }

    /// Like [`nearest_point`](Self::nearest_point), but unresolved when the
    /// nearest point is farther than `max_distance`
    ///
    /// A negative or NaN `max_distance` accepts nothing.
    pub fn nearest_point_within(&self, point: Vec3, max_distance: f32) -> NavHit {
        if !point.is_finite() || max_distance.is_nan() || max_distance < 0.0 {
            return NavHit::invalid();
        }
        if let Some(region) = self.containing_region(point) {
            return NavHit::new(self.id, region, false, point);
        }

        let max_dist_sq = if max_distance.is_finite() {
            max_distance * max_distance
        } else {
            f32::INFINITY
        };
        if self.bounds.distance_squared(point) > max_dist_sq {
            return NavHit::invalid();
        }

        let mut best: Option<(RegionIndex, Vec3)> = None;
        let mut best_dist = f32::INFINITY;
        for region in &self.regions {
            // Bounds distance is a lower bound of the true distance
            if region.bounds.distance_squared(point) >= best_dist {
                continue;
            }
            let (candidate, d) = region.closest_boundary_point(&self.vertices, point);
            if d < best_dist {
                best_dist = d;
                best = Some((region.index, candidate));
            }
        }

        match best {
            Some((region, position)) if best_dist <= max_dist_sq => {
                NavHit::new(self.id, region, true, position)
            }
            _ => NavHit::invalid(),
        }
    }

    /// Rewrites all cached world-space data after the origin moved by `offset`
    ///
    /// Afterwards every position is expressed relative to the new origin, so a
    /// point `p` before the shift corresponds to `p - offset` after it.
    pub fn update_transform(&mut self, offset: Vec3) {
        for vertex in &mut self.vertices {
            *vertex -= offset;
        }
        for region in &mut self.regions {
            region.shift(offset);
        }
        for portal in &mut self.portals {
            portal.shift(offset);
        }
        self.bounds.shift(offset);
    }
}

fn build_region(
    index: RegionIndex,
    data: &RegionData,
    vertices: &[Vec3],
    volume_name: &str,
) -> Result<NavRegion> {
    let invalid = |msg: String| {
        Error::InvalidVolume(format!("volume '{}', region {}: {}", volume_name, index, msg))
    };

    if data.triangles.len() < MIN_REGION_FACES {
        return Err(invalid(format!(
            "{} faces cannot enclose a region",
            data.triangles.len()
        )));
    }

    let mut faces = Vec::with_capacity(data.triangles.len());
    let mut seen = HashSet::new();
    let mut unique_vertices = Vec::new();
    let mut vertex_seen = HashSet::new();
    for tri in &data.triangles {
        if let Some(bad) = tri.iter().find(|&&i| i as usize >= vertices.len()) {
            return Err(invalid(format!("vertex index {} out of range", bad)));
        }
        let face = Triangle::from(*tri);
        if face.is_degenerate() {
            return Err(invalid(format!("degenerate face {:?}", tri)));
        }
        let [a, b, c] = tri.map(|i| vertices[i as usize]);
        if triangle_area(&a, &b, &c) < MIN_FACE_AREA {
            return Err(invalid(format!("face {:?} has zero area", tri)));
        }
        if !seen.insert(face) {
            return Err(invalid(format!("face {:?} listed twice", tri)));
        }
        faces.push(face);
        for &i in tri {
            if vertex_seen.insert(i) {
                unique_vertices.push(i);
            }
        }
    }

    let points: Vec<Vec3> = unique_vertices.iter().map(|&i| vertices[i as usize]).collect();
    let centroid = points.iter().copied().sum::<Vec3>() / points.len() as f32;
    let bounds = Aabb::from_points(points.iter());
    let tolerance = CONVEXITY_TOLERANCE * (bounds.max - bounds.min).length().max(1.0);

    let mut planes = Vec::with_capacity(data.triangles.len());
    for tri in &data.triangles {
        let [a, b, c] = tri.map(|i| vertices[i as usize]);
        let mut plane = Plane::from_point_normal(a, triangle_normal(&a, &b, &c).normalize());
        // Orient outward regardless of the baked winding
        if plane.signed_distance(centroid) > 0.0 {
            plane = Plane::from_point_normal(a, -plane.normal);
        }
        if let Some(p) = points.iter().find(|p| plane.signed_distance(**p) > tolerance) {
            return Err(invalid(format!(
                "not convex: vertex {:?} lies outside face {:?}",
                p, tri
            )));
        }
        planes.push(plane);
    }

    Ok(NavRegion {
        index,
        triangles: data.triangles.clone(),
        boundary: vec![true; faces.len()],
        faces,
        planes,
        centroid,
        bounds,
    })
}

type PortalSets = BTreeMap<(RegionIndex, RegionIndex), (Vec<Triangle>, Vec<Edge>)>;

/// Groups shared faces and edges by region pair
///
/// Returns the per-pair geometry plus the `(region, face)` slots that are
/// shared and therefore not on the volume boundary.
fn find_shared_geometry(
    regions: &[NavRegion],
    volume_name: &str,
) -> Result<(PortalSets, Vec<(RegionIndex, usize)>)> {
    let mut face_owners: HashMap<Triangle, Vec<(RegionIndex, usize)>> = HashMap::new();
    let mut edge_owners: HashMap<Edge, Vec<RegionIndex>> = HashMap::new();

    for region in regions {
        let mut region_edges = HashSet::new();
        for (slot, face) in region.faces.iter().enumerate() {
            face_owners.entry(*face).or_default().push((region.index, slot));
            region_edges.extend(face.edges());
        }
        for edge in region_edges {
            edge_owners.entry(edge).or_default().push(region.index);
        }
    }

    let mut sets = PortalSets::new();
    let mut shared_faces = Vec::new();

    for (face, owners) in &face_owners {
        match owners.as_slice() {
            [_] => {}
            [(a, slot_a), (b, slot_b)] => {
                let key = ((*a).min(*b), (*a).max(*b));
                sets.entry(key).or_default().0.push(*face);
                shared_faces.push((*a, *slot_a));
                shared_faces.push((*b, *slot_b));
            }
            _ => {
                return Err(Error::InvalidVolume(format!(
                    "volume '{}': face {:?} is shared by {} regions",
                    volume_name,
                    face.vertices(),
                    owners.len()
                )));
            }
        }
    }

    for (edge, owners) in &edge_owners {
        for (i, &a) in owners.iter().enumerate() {
            for &b in &owners[i + 1..] {
                let key = (a.min(b), a.max(b));
                let entry = sets.entry(key).or_default();
                if !entry.0.iter().any(|t| t.has_edge(edge)) {
                    entry.1.push(*edge);
                }
            }
        }
    }

    // Pairs that only met through edges of shared faces have nothing left
    sets.retain(|_, (triangles, edges)| !triangles.is_empty() || !edges.is_empty());
    for (triangles, edges) in sets.values_mut() {
        triangles.sort_unstable();
        edges.sort_unstable();
    }

    Ok((sets, shared_faces))
}
