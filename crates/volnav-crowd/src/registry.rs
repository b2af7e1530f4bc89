//! Registry of avoidance agents
//!
//! The registry keeps the last published state of every avoidance agent and
//! hands out point-in-time neighbor snapshots for avoidance solves.

use glam::Vec3;
use slotmap::SlotMap;
use volnav_common::{Error, Result};

use crate::{AvoidanceConfig, AvoidanceInput, NeighborSnapshot, ProximityGrid};

slotmap::new_key_type! {
    /// Handle of an avoidance agent in an [`AgentRegistry`]
    pub struct AgentId;
}

/// Published state of one agent
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgentSnapshot {
    /// Last published position
    pub position: Vec3,
    /// Last published velocity
    pub velocity: Vec3,
    /// Body radius
    pub radius: f32,
    /// Speed limit
    pub max_speed: f32,
}

/// All avoidance agents known to a scheduler
#[derive(Debug, Clone)]
pub struct AgentRegistry {
    agents: SlotMap<AgentId, AgentSnapshot>,
    grid: ProximityGrid,
}

impl AgentRegistry {
    /// Creates an empty registry with the given proximity grid cell size
    pub fn new(cell_size: f32) -> Self {
        Self {
            agents: SlotMap::with_key(),
            grid: ProximityGrid::new(cell_size),
        }
    }

    /// Registers an agent and returns its handle
    pub fn insert(&mut self, snapshot: AgentSnapshot) -> AgentId {
        let id = self.agents.insert(snapshot);
        self.grid.update_agent(id, snapshot.position);
        id
    }

    /// Unregisters an agent
    pub fn remove(&mut self, id: AgentId) -> Option<AgentSnapshot> {
        self.grid.remove_agent(id);
        self.agents.remove(id)
    }

    /// Published state of an agent
    pub fn get(&self, id: AgentId) -> Option<&AgentSnapshot> {
        self.agents.get(id)
    }

    /// Number of registered agents
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Whether no agent is registered
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Publishes the current motion of an agent
    pub fn update(&mut self, id: AgentId, position: Vec3, velocity: Vec3) -> Result<()> {
        let agent = self
            .agents
            .get_mut(id)
            .ok_or_else(|| Error::Query(format!("unknown avoidance agent {:?}", id)))?;
        agent.position = position;
        agent.velocity = velocity;
        self.grid.update_agent(id, position);
        Ok(())
    }

    /// Neighbors of `id` within `distance`, nearest first, ties by handle
    pub fn neighbors(&self, id: AgentId, distance: f32, max_count: usize) -> Vec<NeighborSnapshot> {
        let Some(agent) = self.agents.get(id) else {
            return Vec::new();
        };

        let mut found: Vec<(f32, AgentId)> = self
            .grid
            .query_agents(agent.position, distance)
            .into_iter()
            .filter(|other| *other != id)
            .filter_map(|other| {
                let snapshot = self.agents.get(other)?;
                let d = agent.position.distance_squared(snapshot.position);
                (d <= distance * distance).then_some((d, other))
            })
            .collect();
        found.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        found.truncate(max_count);

        found
            .into_iter()
            .filter_map(|(_, other)| {
                self.agents.get(other).map(|s| NeighborSnapshot {
                    id: other,
                    position: s.position,
                    velocity: s.velocity,
                    radius: s.radius,
                })
            })
            .collect()
    }

    /// Copies everything an avoidance solve for `id` needs into a plain record
    pub fn avoidance_input(
        &self,
        id: AgentId,
        preferred_velocity: Vec3,
        config: &AvoidanceConfig,
        time_step: f32,
    ) -> Result<AvoidanceInput> {
        let agent = self
            .agents
            .get(id)
            .ok_or_else(|| Error::Query(format!("unknown avoidance agent {:?}", id)))?;

        Ok(AvoidanceInput {
            agent: id,
            position: agent.position,
            velocity: agent.velocity,
            preferred_velocity,
            radius: config.radius,
            max_speed: config.max_speed,
            time_horizon: config.time_horizon,
            time_step,
            neighbors: self.neighbors(id, config.neighbor_distance, config.max_neighbors),
        })
    }

    /// Moves every agent after the origin moved by `offset`
    pub fn shift(&mut self, offset: Vec3) {
        self.grid.clear();
        for (id, agent) in self.agents.iter_mut() {
            agent.position -= offset;
            self.grid.update_agent(id, agent.position);
        }
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new(crate::proximity_grid::DEFAULT_CELL_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(position: Vec3) -> AgentSnapshot {
        AgentSnapshot {
            position,
            velocity: Vec3::ZERO,
            radius: 0.5,
            max_speed: 2.0,
        }
    }

    #[test]
    fn test_neighbors_sorted_and_limited() {
        let mut registry = AgentRegistry::new(2.0);
        let me = registry.insert(snapshot(Vec3::ZERO));
        let far = registry.insert(snapshot(Vec3::new(3.0, 0.0, 0.0)));
        let near = registry.insert(snapshot(Vec3::new(0.0, 1.0, 0.0)));
        let _outside = registry.insert(snapshot(Vec3::new(30.0, 0.0, 0.0)));

        let neighbors = registry.neighbors(me, 5.0, 10);
        let ids: Vec<_> = neighbors.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![near, far]);

        let neighbors = registry.neighbors(me, 5.0, 1);
        assert_eq!(neighbors.len(), 1);
        assert_eq!(neighbors[0].id, near);
    }

    #[test]
    fn test_equal_distance_ties_by_handle() {
        let mut registry = AgentRegistry::default();
        let me = registry.insert(snapshot(Vec3::ZERO));
        let a = registry.insert(snapshot(Vec3::new(1.0, 0.0, 0.0)));
        let b = registry.insert(snapshot(Vec3::new(-1.0, 0.0, 0.0)));

        let ids: Vec<_> = registry.neighbors(me, 2.0, 10).iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![a.min(b), a.max(b)]);
    }

    #[test]
    fn test_update_unknown_agent() {
        let mut registry = AgentRegistry::default();
        let id = registry.insert(snapshot(Vec3::ZERO));
        registry.remove(id);
        assert!(registry.update(id, Vec3::ONE, Vec3::ZERO).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_shift_moves_agents() -> Result<()> {
        let mut registry = AgentRegistry::new(1.0);
        let a = registry.insert(snapshot(Vec3::new(10.0, 0.0, 0.0)));
        let b = registry.insert(snapshot(Vec3::new(10.5, 0.0, 0.0)));
        registry.shift(Vec3::new(10.0, 0.0, 0.0));

        assert_eq!(registry.get(a).map(|s| s.position), Some(Vec3::ZERO));
        assert_eq!(registry.neighbors(a, 1.0, 4).len(), 1);
        assert_eq!(registry.neighbors(b, 1.0, 4)[0].id, a);
        Ok(())
    }

    #[test]
    fn test_wide_neighbor_search() {
        let mut registry = AgentRegistry::new(4.0);
        let me = registry.insert(snapshot(Vec3::ZERO));
        let other = registry.insert(snapshot(Vec3::new(0.0, 0.0, 350.0)));

        let ids: Vec<_> = registry.neighbors(me, 400.0, 10).iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![other]);
        assert_eq!(registry.neighbors(me, f32::INFINITY, 10).len(), 1);
    }
}
