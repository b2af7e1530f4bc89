//! Portals and their apertures
//!
//! A portal is the shared boundary between two regions. Its aperture is the
//! geometry an agent passes through: the faces the regions share, plus any
//! shared edges that are not already sides of those faces.

use glam::Vec3;
use volnav_common::{
    closest_point_on_segment, closest_point_on_triangle, distance, segment_triangle_intersection,
    shortest_detour_on_segment, Result,
};

use crate::RegionRef;

/// Geometry of a portal in world space
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct Aperture {
    triangles: Vec<[Vec3; 3]>,
    edges: Vec<[Vec3; 2]>,
}

impl Aperture {
    /// Creates an aperture from shared faces and shared edges
    pub fn new(triangles: Vec<[Vec3; 3]>, edges: Vec<[Vec3; 2]>) -> Self {
        Self { triangles, edges }
    }

    /// Aperture made of a single face
    pub fn from_triangle(a: Vec3, b: Vec3, c: Vec3) -> Self {
        Self::new(vec![[a, b, c]], Vec::new())
    }

    /// Shared faces
    pub fn triangles(&self) -> &[[Vec3; 3]] {
        &self.triangles
    }

    /// Shared edges not covered by the faces
    pub fn edges(&self) -> &[[Vec3; 2]] {
        &self.edges
    }

    /// Whether the aperture has no geometry
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty() && self.edges.is_empty()
    }

    /// Closest point of the aperture to `point`
    pub fn closest_point(&self, point: Vec3) -> Vec3 {
        let mut best = point;
        let mut best_dist = f32::MAX;

        for [a, b, c] in &self.triangles {
            let candidate = closest_point_on_triangle(&point, a, b, c);
            let d = (candidate - point).length_squared();
            if d < best_dist {
                best_dist = d;
                best = candidate;
            }
        }
        for [a, b] in &self.edges {
            let candidate = closest_point_on_segment(&point, a, b);
            let d = (candidate - point).length_squared();
            if d < best_dist {
                best_dist = d;
                best = candidate;
            }
        }

        best
    }

    /// Representative point: the aperture point nearest the mean of its elements
    pub fn center(&self) -> Vec3 {
        let mut sum = Vec3::ZERO;
        let mut count = 0;
        for [a, b, c] in &self.triangles {
            sum += (*a + *b + *c) / 3.0;
            count += 1;
        }
        for [a, b] in &self.edges {
            sum += (*a + *b) * 0.5;
            count += 1;
        }
        if count == 0 {
            return Vec3::ZERO;
        }
        self.closest_point(sum / count as f32)
    }

    /// Point `x` of the aperture minimizing `|from - x| + |x - to|`
    ///
    /// When the segment `from..to` passes through a face the crossing point is
    /// returned. Otherwise the minimum lies on the boundary of the aperture and
    /// is searched along every face side and shared edge.
    pub fn shortest_crossing(&self, from: Vec3, to: Vec3) -> Vec3 {
        for [a, b, c] in &self.triangles {
            if let Some(hit) = segment_triangle_intersection(&from, &to, a, b, c) {
                return hit;
            }
        }

        let mut best = self.center();
        let mut best_cost = f32::MAX;
        let mut consider = |a: &Vec3, b: &Vec3| {
            let candidate = shortest_detour_on_segment(&from, &to, a, b);
            let cost = distance(&from, &candidate) + distance(&candidate, &to);
            if cost < best_cost {
                best_cost = cost;
                best = candidate;
            }
        };

        for [a, b, c] in &self.triangles {
            consider(a, b);
            consider(b, c);
            consider(c, a);
        }
        for [a, b] in &self.edges {
            consider(a, b);
        }

        best
    }

    /// Whether `point` lies on the aperture within `tolerance`
    pub fn contains_point(&self, point: Vec3, tolerance: f32) -> bool {
        (self.closest_point(point) - point).length() <= tolerance
    }

    /// Moves the aperture by `-offset`
    pub fn shift(&mut self, offset: Vec3) {
        for triangle in &mut self.triangles {
            for vertex in triangle.iter_mut() {
                *vertex -= offset;
            }
        }
        for edge in &mut self.edges {
            for vertex in edge.iter_mut() {
                *vertex -= offset;
            }
        }
    }
}

/// Link between two regions through an aperture
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct Portal {
    regions: [RegionRef; 2],
    aperture: Aperture,
    center: Vec3,
}

impl Portal {
    /// Creates a portal between `a` and `b`
    pub fn new(a: RegionRef, b: RegionRef, aperture: Aperture) -> Result<Self> {
        if aperture.is_empty() {
            return Err(volnav_common::Error::InvalidVolume(format!(
                "portal between {:?} and {:?} has an empty aperture",
                a, b
            )));
        }
        let center = aperture.center();
        Ok(Self {
            regions: [a, b],
            aperture,
            center,
        })
    }

    /// The two regions this portal connects
    pub fn regions(&self) -> [RegionRef; 2] {
        self.regions
    }

    /// Aperture geometry
    pub fn aperture(&self) -> &Aperture {
        &self.aperture
    }

    /// Cached aperture center, used as the search entry point
    pub fn center(&self) -> Vec3 {
        self.center
    }

    /// Moves the portal by `-offset`
    pub fn shift(&mut self, offset: Vec3) {
        self.aperture.shift(offset);
        self.center -= offset;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_aperture() -> Aperture {
        // Unit square in the x = 1 plane, split into two faces
        let a = Vec3::new(1.0, 0.0, 0.0);
        let b = Vec3::new(1.0, 1.0, 0.0);
        let c = Vec3::new(1.0, 1.0, 1.0);
        let d = Vec3::new(1.0, 0.0, 1.0);
        Aperture::new(vec![[a, b, c], [a, c, d]], Vec::new())
    }

    #[test]
    fn test_center_lies_on_aperture() {
        let aperture = square_aperture();
        let center = aperture.center();
        assert!(aperture.contains_point(center, 1e-5));
        assert!((center - Vec3::new(1.0, 0.5, 0.5)).length() < 0.2);
    }

    #[test]
    fn test_shortest_crossing_through_face() {
        let aperture = square_aperture();
        let from = Vec3::new(0.0, 0.25, 0.75);
        let to = Vec3::new(2.0, 0.25, 0.75);
        let x = aperture.shortest_crossing(from, to);
        assert!((x - Vec3::new(1.0, 0.25, 0.75)).length() < 1e-4);
    }

    #[test]
    fn test_shortest_crossing_clamps_to_boundary() {
        let aperture = square_aperture();
        let from = Vec3::new(0.0, 3.0, 0.5);
        let to = Vec3::new(2.0, 3.0, 0.5);
        let x = aperture.shortest_crossing(from, to);
        assert!((x - Vec3::new(1.0, 1.0, 0.5)).length() < 1e-3);
    }

    #[test]
    fn test_edge_only_aperture() {
        let aperture = Aperture::new(
            Vec::new(),
            vec![[Vec3::new(0.0, 0.0, 0.0), Vec3::new(0.0, 0.0, 4.0)]],
        );
        assert_eq!(aperture.center(), Vec3::new(0.0, 0.0, 2.0));
        let x = aperture.shortest_crossing(Vec3::new(-1.0, 0.0, 1.0), Vec3::new(1.0, 0.0, 1.0));
        assert!((x - Vec3::new(0.0, 0.0, 1.0)).length() < 1e-3);
    }

    #[test]
    fn test_shift_moves_geometry() {
        let mut aperture = square_aperture();
        aperture.shift(Vec3::new(1.0, 0.0, 0.0));
        assert!(aperture.contains_point(Vec3::new(0.0, 0.5, 0.5), 1e-5));
    }

    #[test]
    fn test_empty_portal_rejected() {
        let r = RegionRef::new(crate::VolumeId::default(), 0);
        assert!(Portal::new(r, r, Aperture::default()).is_err());
    }
}
