//! Triangle and plane math

use glam::Vec3;

/// Calculates the area of a triangle
pub fn triangle_area(a: &Vec3, b: &Vec3, c: &Vec3) -> f32 {
    (*b - *a).cross(*c - *a).length() * 0.5
}

/// Unnormalized normal of a triangle following its winding
#[inline]
pub fn triangle_normal(a: &Vec3, b: &Vec3, c: &Vec3) -> Vec3 {
    (*b - *a).cross(*c - *a)
}

/// Find the closest point on a triangle to a given point
pub fn closest_point_on_triangle(p: &Vec3, a: &Vec3, b: &Vec3, c: &Vec3) -> Vec3 {
    // Vertex region outside A
    let ab = *b - *a;
    let ac = *c - *a;
    let ap = *p - *a;
    let d1 = ab.dot(ap);
    let d2 = ac.dot(ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return *a;
    }

    // Vertex region outside B
    let bp = *p - *b;
    let d3 = ab.dot(bp);
    let d4 = ac.dot(bp);
    if d3 >= 0.0 && d4 <= d3 {
        return *b;
    }

    // Edge region of AB
    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return *a + ab * v;
    }

    // Vertex region outside C
    let cp = *p - *c;
    let d5 = ab.dot(cp);
    let d6 = ac.dot(cp);
    if d6 >= 0.0 && d5 <= d6 {
        return *c;
    }

    // Edge region of AC
    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return *a + ac * w;
    }

    // Edge region of BC
    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return *b + (*c - *b) * w;
    }

    // Face region, through barycentric coordinates (u,v,w)
    let denom = 1.0 / (va + vb + vc);
    let v = vb * denom;
    let w = vc * denom;
    *a + ab * v + ac * w
}

/// Calculate the squared distance from a point to a triangle
pub fn distance_point_triangle_squared(p: &Vec3, a: &Vec3, b: &Vec3, c: &Vec3) -> f32 {
    let closest = closest_point_on_triangle(p, a, b, c);
    (*p - closest).length_squared()
}

/// Intersects the segment `p..q` with a triangle
///
/// Möller–Trumbore, restricted to the segment parameter range `[0, 1]`.
/// Returns the intersection point.
pub fn segment_triangle_intersection(
    p: &Vec3,
    q: &Vec3,
    v0: &Vec3,
    v1: &Vec3,
    v2: &Vec3,
) -> Option<Vec3> {
    let direction = *q - *p;
    let edge1 = *v1 - *v0;
    let edge2 = *v2 - *v0;

    let h = direction.cross(edge2);
    let a = edge1.dot(h);

    // Segment is parallel to the triangle
    if a.abs() < f32::EPSILON {
        return None;
    }

    let f = 1.0 / a;
    let s = *p - *v0;
    let u = f * s.dot(h);
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let qv = s.cross(edge1);
    let v = f * direction.dot(qv);
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = f * edge2.dot(qv);
    if (0.0..=1.0).contains(&t) {
        Some(*p + direction * t)
    } else {
        None
    }
}

/// An oriented plane `normal · x = distance`
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct Plane {
    /// Unit normal
    pub normal: Vec3,
    /// Offset along the normal
    pub distance: f32,
}

impl Plane {
    /// Builds a plane through `point` with the given unit normal
    pub fn from_point_normal(point: Vec3, normal: Vec3) -> Self {
        Self {
            normal,
            distance: normal.dot(point),
        }
    }

    /// Signed distance of `point` from the plane, positive on the normal side
    #[inline]
    pub fn signed_distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) - self.distance
    }

    /// Moves the plane by `-offset`
    pub fn shift(&mut self, offset: Vec3) {
        self.distance -= self.normal.dot(offset);
    }
}
