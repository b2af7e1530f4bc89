//! Vector utilities for points and segments

use glam::Vec3;

/// Calculates the distance between two points
#[inline]
pub fn distance(a: &Vec3, b: &Vec3) -> f32 {
    (*b - *a).length()
}

/// Calculates the squared distance between two points
#[inline]
pub fn distance_squared(a: &Vec3, b: &Vec3) -> f32 {
    (*b - *a).length_squared()
}

/// Finds the closest point on a line segment to a given point
pub fn closest_point_on_segment(p: &Vec3, a: &Vec3, b: &Vec3) -> Vec3 {
    let ab = *b - *a;
    let ap = *p - *a;

    let ab_len_sq = ab.length_squared();

    // If the line segment is just a point, return that point
    if ab_len_sq < f32::EPSILON {
        return *a;
    }

    let t = ap.dot(ab) / ab_len_sq;

    if t < 0.0 {
        *a
    } else if t > 1.0 {
        *b
    } else {
        *a + ab * t
    }
}

/// Length of a polyline
pub fn polyline_length(points: &[Vec3]) -> f32 {
    points.windows(2).map(|w| distance(&w[0], &w[1])).sum()
}

/// Finds the point `x` on segment `a..b` minimizing `|from - x| + |x - to|`
///
/// The objective is convex along the segment, so a fixed number of ternary
/// search steps converges deterministically.
pub fn shortest_detour_on_segment(from: &Vec3, to: &Vec3, a: &Vec3, b: &Vec3) -> Vec3 {
    const STEPS: usize = 48;

    let cost = |t: f32| {
        let x = a.lerp(*b, t);
        distance(from, &x) + distance(&x, to)
    };

    let (mut lo, mut hi) = (0.0f32, 1.0f32);
    for _ in 0..STEPS {
        let m1 = lo + (hi - lo) / 3.0;
        let m2 = hi - (hi - lo) / 3.0;
        if cost(m1) <= cost(m2) {
            hi = m2;
        } else {
            lo = m1;
        }
    }
    a.lerp(*b, (lo + hi) * 0.5)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closest_point_on_segment() {
        let a = Vec3::ZERO;
        let b = Vec3::new(2.0, 0.0, 0.0);
        assert_eq!(
            closest_point_on_segment(&Vec3::new(1.0, 1.0, 0.0), &a, &b),
            Vec3::new(1.0, 0.0, 0.0)
        );
        assert_eq!(closest_point_on_segment(&Vec3::new(-3.0, 0.0, 0.0), &a, &b), a);
        assert_eq!(closest_point_on_segment(&Vec3::new(5.0, 1.0, 0.0), &a, &b), b);
    }

    #[test]
    fn test_polyline_length() {
        let points = [Vec3::ZERO, Vec3::new(3.0, 4.0, 0.0), Vec3::new(3.0, 4.0, 2.0)];
        assert!((polyline_length(&points) - 7.0).abs() < 1e-5);
        assert_eq!(polyline_length(&points[..1]), 0.0);
    }

    #[test]
    fn test_shortest_detour_on_segment() {
        // Straight line crosses the segment at x = 1
        let from = Vec3::new(1.0, -1.0, 0.0);
        let to = Vec3::new(1.0, 1.0, 0.0);
        let x = shortest_detour_on_segment(&from, &to, &Vec3::new(-2.0, 0.0, 0.0), &Vec3::new(2.0, 0.0, 0.0));
        assert!((x - Vec3::new(1.0, 0.0, 0.0)).length() < 1e-3);

        // Segment lies entirely to the side; best point is its near end
        let x = shortest_detour_on_segment(&from, &to, &Vec3::new(3.0, 0.0, 0.0), &Vec3::new(5.0, 0.0, 0.0));
        assert!((x - Vec3::new(3.0, 0.0, 0.0)).length() < 1e-3);
    }
}
