//! Path planner configuration

/// Limits and tolerances of the path planner
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct PlannerConfig {
    /// Largest number of regions the search may expand
    pub max_search_nodes: usize,
    /// Farthest a start or destination may be snapped onto a region
    pub max_snap_distance: f32,
    /// Upper bound of funnel refinement passes
    pub funnel_iterations: usize,
    /// Funnel stops once no waypoint moves farther than this
    pub funnel_tolerance: f32,
}

impl PlannerConfig {
    /// Creates a config with the given search limits and default funnel settings
    pub fn new(max_search_nodes: usize, max_snap_distance: f32) -> Self {
        Self {
            max_search_nodes,
            max_snap_distance,
            funnel_iterations: 32,
            funnel_tolerance: 1e-4,
        }
    }

    /// Sets the maximum number of regions a search may expand
    pub fn with_max_search_nodes(mut self, max_search_nodes: usize) -> Self {
        self.max_search_nodes = max_search_nodes;
        self
    }

    /// Sets how far endpoints may be snapped onto the volumes
    pub fn with_max_snap_distance(mut self, max_snap_distance: f32) -> Self {
        self.max_snap_distance = max_snap_distance;
        self
    }

    /// Sets the number of funnel passes
    pub fn with_funnel_iterations(mut self, funnel_iterations: usize) -> Self {
        self.funnel_iterations = funnel_iterations;
        self
    }

    /// Sets the waypoint movement below which the funnel stops
    pub fn with_funnel_tolerance(mut self, funnel_tolerance: f32) -> Self {
        self.funnel_tolerance = funnel_tolerance;
        self
    }

    /// Checks that every limit is in range
    pub fn validate(&self) -> Result<(), String> {
        if self.max_search_nodes == 0 {
            return Err("Max search nodes must be positive".to_string());
        }
        if !(self.max_snap_distance >= 0.0) {
            return Err("Max snap distance cannot be negative".to_string());
        }
        if !(self.funnel_tolerance > 0.0) {
            return Err("Funnel tolerance must be positive".to_string());
        }
        Ok(())
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self::new(4096, 10.0)
    }
}
