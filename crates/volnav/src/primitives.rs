//! Indexed mesh primitives
//!
//! Edges and triangles are identified by the vertex indices they connect,
//! independent of the order those indices were given in. They are used as
//! hash keys to find the faces and edges regions share.

use log::warn;

/// Unordered pair of vertex indices, stored as `(min, max)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct Edge {
    v1: u32,
    v2: u32,
}

impl Edge {
    /// Creates an edge from two vertex indices in any order
    ///
    /// Repeated indices are a data-integrity problem in the caller's mesh. They
    /// are logged and still produce a (degenerate) canonical edge.
    pub fn new(a: u32, b: u32) -> Self {
        if a == b {
            warn!("degenerate edge: vertex index {} repeated", a);
        }
        Self {
            v1: a.min(b),
            v2: a.max(b),
        }
    }

    /// The canonical `(min, max)` vertex indices
    pub fn vertices(&self) -> [u32; 2] {
        [self.v1, self.v2]
    }

    /// Whether both indices are the same vertex
    pub fn is_degenerate(&self) -> bool {
        self.v1 == self.v2
    }

    /// Whether the edge has `vertex` as one of its ends
    pub fn contains(&self, vertex: u32) -> bool {
        self.v1 == vertex || self.v2 == vertex
    }
}

/// Unordered triple of vertex indices, stored sorted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct Triangle {
    v1: u32,
    v2: u32,
    v3: u32,
}

impl Triangle {
    /// Creates a triangle from three vertex indices in any order
    ///
    /// Repeated indices are logged and still produce a canonical triangle.
    pub fn new(a: u32, b: u32, c: u32) -> Self {
        if a == b || b == c || a == c {
            warn!("degenerate triangle: indices ({}, {}, {}) repeat a vertex", a, b, c);
        }
        let mut sorted = [a, b, c];
        sorted.sort_unstable();
        Self {
            v1: sorted[0],
            v2: sorted[1],
            v3: sorted[2],
        }
    }

    /// The canonical sorted vertex indices
    pub fn vertices(&self) -> [u32; 3] {
        [self.v1, self.v2, self.v3]
    }

    /// Whether two or more indices are the same vertex
    pub fn is_degenerate(&self) -> bool {
        self.v1 == self.v2 || self.v2 == self.v3
    }

    /// The three canonical edges of the triangle
    pub fn edges(&self) -> [Edge; 3] {
        [
            Edge::new(self.v1, self.v2),
            Edge::new(self.v2, self.v3),
            Edge::new(self.v1, self.v3),
        ]
    }

    /// Whether `edge` is one of this triangle's edges
    pub fn has_edge(&self, edge: &Edge) -> bool {
        let [a, b] = edge.vertices();
        a != b && self.contains(a) && self.contains(b)
    }

    /// Whether the triangle uses `vertex`
    pub fn contains(&self, vertex: u32) -> bool {
        self.v1 == vertex || self.v2 == vertex || self.v3 == vertex
    }
}

impl From<[u32; 3]> for Triangle {
    fn from(indices: [u32; 3]) -> Self {
        Triangle::new(indices[0], indices[1], indices[2])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;
    use std::collections::HashSet;
    use std::hash::{Hash, Hasher};

    fn hash_of<T: Hash>(value: &T) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_edge_order_independent() {
        for (a, b) in [(0u32, 1u32), (7, 3), (100, 2), (u32::MAX, 0)] {
            let e1 = Edge::new(a, b);
            let e2 = Edge::new(b, a);
            assert_eq!(e1, e2);
            assert_eq!(hash_of(&e1), hash_of(&e2));
            assert_eq!(e1.vertices(), [a.min(b), a.max(b)]);
            assert!(!e1.is_degenerate());
        }
    }

    #[test]
    fn test_triangle_all_permutations_equal() {
        let (a, b, c) = (9u32, 2u32, 5u32);
        let permutations = [
            [a, b, c],
            [a, c, b],
            [b, a, c],
            [b, c, a],
            [c, a, b],
            [c, b, a],
        ];
        let first = Triangle::from(permutations[0]);
        for p in permutations {
            let t = Triangle::from(p);
            assert_eq!(t, first);
            assert_eq!(hash_of(&t), hash_of(&first));
        }
        assert_eq!(first.vertices(), [2, 5, 9]);

        let set: HashSet<Triangle> = permutations.iter().map(|p| Triangle::from(*p)).collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_degenerate_primitives_are_canonical() {
        let e = Edge::new(4, 4);
        assert!(e.is_degenerate());
        assert_eq!(e.vertices(), [4, 4]);

        let t1 = Triangle::new(3, 1, 3);
        let t2 = Triangle::new(1, 3, 3);
        assert!(t1.is_degenerate());
        assert_eq!(t1, t2);
        assert_eq!(t1.vertices(), [1, 3, 3]);
    }

    #[test]
    fn test_triangle_edges() {
        let t = Triangle::new(2, 0, 1);
        let edges = t.edges();
        assert!(edges.contains(&Edge::new(0, 1)));
        assert!(edges.contains(&Edge::new(1, 2)));
        assert!(edges.contains(&Edge::new(2, 0)));
        assert!(t.has_edge(&Edge::new(1, 0)));
        assert!(!t.has_edge(&Edge::new(1, 5)));
    }
}
