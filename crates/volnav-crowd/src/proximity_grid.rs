//! Proximity grid for neighbor queries between avoidance agents
//!
//! Agents are bucketed into cubic cells. A query only visits the cells that
//! overlap the query sphere instead of testing every agent.

use std::collections::HashMap;

use glam::Vec3;

use crate::AgentId;

/// Default cell size of the grid (in world units)
pub const DEFAULT_CELL_SIZE: f32 = 4.0;

/// Grid cell coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct GridCoord {
    x: i32,
    y: i32,
    z: i32,
}

impl GridCoord {
    fn from_world_pos(pos: Vec3, cell_size: f32) -> Self {
        let cell = (pos / cell_size).floor();
        Self {
            x: cell.x as i32,
            y: cell.y as i32,
            z: cell.z as i32,
        }
    }
}

/// Spatial hash of agent positions
#[derive(Debug, Clone)]
pub struct ProximityGrid {
    cells: HashMap<GridCoord, Vec<AgentId>>,
    agent_cells: HashMap<AgentId, GridCoord>,
    cell_size: f32,
}

impl ProximityGrid {
    /// Creates a new proximity grid
    pub fn new(cell_size: f32) -> Self {
        Self {
            cells: HashMap::new(),
            agent_cells: HashMap::new(),
            // Minimum cell size to avoid division by zero
            cell_size: cell_size.max(0.1),
        }
    }

    /// Adds an agent or moves it to the cell of `pos`
    pub fn update_agent(&mut self, id: AgentId, pos: Vec3) {
        let coord = GridCoord::from_world_pos(pos, self.cell_size);
        if let Some(old) = self.agent_cells.insert(id, coord) {
            if old == coord {
                return;
            }
            self.remove_from_cell(old, id);
        }
        self.cells.entry(coord).or_default().push(id);
    }

    /// Removes an agent from the grid
    pub fn remove_agent(&mut self, id: AgentId) -> bool {
        match self.agent_cells.remove(&id) {
            Some(coord) => {
                self.remove_from_cell(coord, id);
                true
            }
            None => false,
        }
    }

    fn remove_from_cell(&mut self, coord: GridCoord, id: AgentId) {
        if let Some(cell) = self.cells.get_mut(&coord) {
            if let Some(index) = cell.iter().position(|a| *a == id) {
                cell.swap_remove(index);
            }
            // Remove empty cells to save memory
            if cell.is_empty() {
                self.cells.remove(&coord);
            }
        }
    }

    /// Agents in every cell overlapping the sphere around `pos`
    ///
    /// This is a candidate set: callers filter by exact distance. When the
    /// sphere spans more cells than are occupied, the occupied cells are
    /// scanned instead, so the cost never exceeds one pass over the grid.
    pub fn query_agents(&self, pos: Vec3, radius: f32) -> Vec<AgentId> {
        if radius.is_nan() || pos.is_nan() || self.cells.is_empty() {
            return Vec::new();
        }
        let radius = radius.max(0.0);
        let min = GridCoord::from_world_pos(pos - Vec3::splat(radius), self.cell_size);
        let max = GridCoord::from_world_pos(pos + Vec3::splat(radius), self.cell_size);

        let span = |lo: i32, hi: i32| (i64::from(hi) - i64::from(lo) + 1) as u64;
        let range_cells = span(min.x, max.x)
            .saturating_mul(span(min.y, max.y))
            .saturating_mul(span(min.z, max.z));

        let mut result = Vec::new();
        if range_cells > self.cells.len() as u64 {
            let inside = |c: &GridCoord| {
                (min.x..=max.x).contains(&c.x)
                    && (min.y..=max.y).contains(&c.y)
                    && (min.z..=max.z).contains(&c.z)
            };
            for (coord, cell) in &self.cells {
                if inside(coord) {
                    result.extend_from_slice(cell);
                }
            }
            return result;
        }

        for x in min.x..=max.x {
            for y in min.y..=max.y {
                for z in min.z..=max.z {
                    if let Some(cell) = self.cells.get(&GridCoord { x, y, z }) {
                        result.extend_from_slice(cell);
                    }
                }
            }
        }
        result
    }

    /// Clears all agents from the grid
    pub fn clear(&mut self) {
        self.cells.clear();
        self.agent_cells.clear();
    }

    /// Total number of agents in the grid
    pub fn agent_count(&self) -> usize {
        self.agent_cells.len()
    }

    /// Number of non-empty cells
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Edge length of a grid cell
    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }
}

impl Default for ProximityGrid {
    fn default() -> Self {
        Self::new(DEFAULT_CELL_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn ids(count: usize) -> Vec<AgentId> {
        let mut map: SlotMap<AgentId, ()> = SlotMap::with_key();
        (0..count).map(|_| map.insert(())).collect()
    }

    #[test]
    fn test_update_and_query() {
        let agents = ids(3);
        let mut grid = ProximityGrid::new(2.0);
        grid.update_agent(agents[0], Vec3::new(0.5, 0.5, 0.5));
        grid.update_agent(agents[1], Vec3::new(1.5, 0.5, 0.5));
        grid.update_agent(agents[2], Vec3::new(20.0, 0.0, 0.0));

        assert_eq!(grid.agent_count(), 3);
        let near = grid.query_agents(Vec3::ZERO, 1.0);
        assert!(near.contains(&agents[0]));
        assert!(near.contains(&agents[1]));
        assert!(!near.contains(&agents[2]));
    }

    #[test]
    fn test_vertical_neighbors() {
        let agents = ids(2);
        let mut grid = ProximityGrid::new(1.0);
        grid.update_agent(agents[0], Vec3::new(0.5, 0.5, 0.5));
        grid.update_agent(agents[1], Vec3::new(0.5, 2.5, 0.5));

        assert_eq!(grid.query_agents(Vec3::new(0.5, 0.5, 0.5), 0.4).len(), 1);
        assert_eq!(grid.query_agents(Vec3::new(0.5, 0.5, 0.5), 2.0).len(), 2);
    }

    #[test]
    fn test_move_and_remove() {
        let agents = ids(1);
        let mut grid = ProximityGrid::new(1.0);
        grid.update_agent(agents[0], Vec3::ZERO);
        grid.update_agent(agents[0], Vec3::new(5.5, 0.0, 0.0));
        assert_eq!(grid.cell_count(), 1);
        assert!(grid.query_agents(Vec3::ZERO, 0.5).is_empty());

        assert!(grid.remove_agent(agents[0]));
        assert!(!grid.remove_agent(agents[0]));
        assert_eq!(grid.agent_count(), 0);
        assert_eq!(grid.cell_count(), 0);
    }

    #[test]
    fn test_huge_radius_scans_occupied_cells() {
        let agents = ids(3);
        let mut grid = ProximityGrid::new(4.0);
        grid.update_agent(agents[0], Vec3::ZERO);
        grid.update_agent(agents[1], Vec3::new(400.0, 0.0, 0.0));
        grid.update_agent(agents[2], Vec3::new(-1.0e6, 3.0e5, 2.0e4));

        // A cube this large holds far more cells than the grid has occupied
        let mut near = grid.query_agents(Vec3::ZERO, 400.0);
        near.sort();
        let mut expected = vec![agents[0], agents[1]];
        expected.sort();
        assert_eq!(near, expected);

        assert_eq!(grid.query_agents(Vec3::ZERO, f32::INFINITY).len(), 3);
        assert_eq!(grid.query_agents(Vec3::ZERO, 1.0e30).len(), 3);
    }

    #[test]
    fn test_nan_query_is_empty() {
        let agents = ids(1);
        let mut grid = ProximityGrid::new(1.0);
        grid.update_agent(agents[0], Vec3::ZERO);
        assert!(grid.query_agents(Vec3::ZERO, f32::NAN).is_empty());
        assert!(grid.query_agents(Vec3::NAN, 1.0).is_empty());
        assert!(ProximityGrid::default().query_agents(Vec3::ZERO, 1.0).is_empty());
    }
}
