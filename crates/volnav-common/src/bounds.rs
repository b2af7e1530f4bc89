//! Axis aligned bounding boxes

use glam::Vec3;

/// Axis aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct Aabb {
    /// Minimum bounds
    pub min: Vec3,
    /// Maximum bounds
    pub max: Vec3,
}

impl Aabb {
    /// Creates a new Aabb from min and max points
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Creates an empty Aabb (invalid bounds)
    pub fn empty() -> Self {
        Self {
            min: Vec3::splat(f32::MAX),
            max: Vec3::splat(f32::MIN),
        }
    }

    /// Builds the bounds of a point set
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Vec3>) -> Self {
        let mut bounds = Self::empty();
        for point in points {
            bounds.expand_point(*point);
        }
        bounds
    }

    /// Checks if this Aabb is valid
    pub fn is_valid(&self) -> bool {
        self.min.cmple(self.max).all()
    }

    /// Expands this Aabb to include another Aabb
    pub fn expand(&mut self, other: &Aabb) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// Expands this Aabb to include a point
    pub fn expand_point(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    /// Checks if this Aabb overlaps with another Aabb
    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.cmple(other.max).all() && self.max.cmpge(other.min).all()
    }

    /// Checks if a point lies inside the box, grown by `tolerance` on every side
    pub fn contains(&self, point: Vec3, tolerance: f32) -> bool {
        (point + tolerance).cmpge(self.min).all() && (point - tolerance).cmple(self.max).all()
    }

    /// Gets the center of the Aabb
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Squared distance from a point to the box (zero inside)
    pub fn distance_squared(&self, point: Vec3) -> f32 {
        let clamped = point.clamp(self.min, self.max);
        (point - clamped).length_squared()
    }

    /// Moves the box by `-offset`
    pub fn shift(&mut self, offset: Vec3) {
        self.min -= offset;
        self.max -= offset;
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_invalid() {
        assert!(!Aabb::empty().is_valid());
    }

    #[test]
    fn test_from_points() {
        let points = [Vec3::new(1.0, -2.0, 3.0), Vec3::new(-1.0, 4.0, 0.0)];
        let bounds = Aabb::from_points(points.iter());
        assert!(bounds.is_valid());
        assert_eq!(bounds.min, Vec3::new(-1.0, -2.0, 0.0));
        assert_eq!(bounds.max, Vec3::new(1.0, 4.0, 3.0));
        assert_eq!(bounds.center(), Vec3::new(0.0, 1.0, 1.5));
    }

    #[test]
    fn test_distance_squared() {
        let bounds = Aabb::new(Vec3::ZERO, Vec3::ONE);
        assert_eq!(bounds.distance_squared(Vec3::splat(0.5)), 0.0);
        assert!((bounds.distance_squared(Vec3::new(3.0, 0.5, 0.5)) - 4.0).abs() < 1e-6);
    }

    #[test]
    fn test_shift() {
        let mut bounds = Aabb::new(Vec3::ZERO, Vec3::ONE);
        bounds.shift(Vec3::new(10.0, 0.0, 0.0));
        assert_eq!(bounds.min, Vec3::new(-10.0, 0.0, 0.0));
        assert!(bounds.contains(Vec3::new(-9.5, 0.5, 0.5), 0.0));
    }
}
