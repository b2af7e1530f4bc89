//! Agent, avoidance and scheduler configuration

/// Steering parameters of a nav agent
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct NavAgentConfig {
    /// Top speed along the path
    pub max_speed: f32,
    /// Expected acceleration, used for pre-turning and braking distances
    pub acceleration_estimate: f32,
    /// Distance to the destination at which the agent counts as arrived
    pub acceptance_radius: f32,
    /// Curve samples per path segment for spline following
    pub spline_samples_per_segment: usize,
    /// How strongly spline following pulls back toward the curve
    pub cross_track_gain: f32,
}

impl NavAgentConfig {
    /// Creates a config with the given speed limits and default tolerances
    pub fn new(max_speed: f32, acceleration_estimate: f32) -> Self {
        Self {
            max_speed,
            acceleration_estimate,
            acceptance_radius: 0.25,
            spline_samples_per_segment: 16,
            cross_track_gain: 2.0,
        }
    }

    /// Sets the top speed
    pub fn with_max_speed(mut self, max_speed: f32) -> Self {
        self.max_speed = max_speed;
        self
    }

    /// Sets the acceleration used for braking and stopping
    pub fn with_acceleration_estimate(mut self, acceleration_estimate: f32) -> Self {
        self.acceleration_estimate = acceleration_estimate;
        self
    }

    /// Sets how close counts as arrived
    pub fn with_acceptance_radius(mut self, acceptance_radius: f32) -> Self {
        self.acceptance_radius = acceptance_radius;
        self
    }

    /// Sets the arc-length samples per spline segment
    pub fn with_spline_samples_per_segment(mut self, samples: usize) -> Self {
        self.spline_samples_per_segment = samples;
        self
    }

    /// Sets how strongly drift off the path is corrected
    pub fn with_cross_track_gain(mut self, cross_track_gain: f32) -> Self {
        self.cross_track_gain = cross_track_gain;
        self
    }

    /// Checks that every parameter is in range
    pub fn validate(&self) -> Result<(), String> {
        if !(self.max_speed > 0.0 && self.max_speed.is_finite()) {
            return Err("Max speed must be positive and finite".to_string());
        }
        if !(self.acceleration_estimate > 0.0 && self.acceleration_estimate.is_finite()) {
            return Err("Acceleration estimate must be positive and finite".to_string());
        }
        if !(self.acceptance_radius > 0.0 && self.acceptance_radius.is_finite()) {
            return Err("Acceptance radius must be positive and finite".to_string());
        }
        if self.spline_samples_per_segment == 0 {
            return Err("Spline samples per segment must be positive".to_string());
        }
        if !(self.cross_track_gain >= 0.0 && self.cross_track_gain.is_finite()) {
            return Err("Cross track gain must be non-negative and finite".to_string());
        }
        Ok(())
    }
}

impl Default for NavAgentConfig {
    fn default() -> Self {
        Self::new(3.5, 8.0)
    }
}

/// Parameters of a velocity-obstacle avoidance agent
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct AvoidanceConfig {
    /// Agent radius
    pub radius: f32,
    /// Largest avoidance speed
    pub max_speed: f32,
    /// How far ahead in time collisions are avoided
    pub time_horizon: f32,
    /// Neighbors farther than this are ignored
    pub neighbor_distance: f32,
    /// Nearest neighbors considered per solve
    pub max_neighbors: usize,
}

impl AvoidanceConfig {
    /// Creates a config with the given radius and top speed
    pub fn new(radius: f32, max_speed: f32) -> Self {
        Self {
            radius,
            max_speed,
            time_horizon: 2.0,
            neighbor_distance: 10.0,
            max_neighbors: 10,
        }
    }

    /// Sets how far ahead collisions are avoided
    pub fn with_time_horizon(mut self, time_horizon: f32) -> Self {
        self.time_horizon = time_horizon;
        self
    }

    /// Sets the neighbor search radius
    pub fn with_neighbor_distance(mut self, neighbor_distance: f32) -> Self {
        self.neighbor_distance = neighbor_distance;
        self
    }

    /// Sets the maximum number of neighbors considered
    pub fn with_max_neighbors(mut self, max_neighbors: usize) -> Self {
        self.max_neighbors = max_neighbors;
        self
    }

    /// Checks that every parameter is in range
    pub fn validate(&self) -> Result<(), String> {
        if !(self.radius > 0.0 && self.radius.is_finite()) {
            return Err("Radius must be positive and finite".to_string());
        }
        if !(self.max_speed >= 0.0 && self.max_speed.is_finite()) {
            return Err("Max speed must be non-negative and finite".to_string());
        }
        if !(self.time_horizon > 0.0 && self.time_horizon.is_finite()) {
            return Err("Time horizon must be positive and finite".to_string());
        }
        if !(self.neighbor_distance >= 0.0 && self.neighbor_distance.is_finite()) {
            return Err("Neighbor distance must be non-negative and finite".to_string());
        }
        Ok(())
    }
}

impl Default for AvoidanceConfig {
    fn default() -> Self {
        Self::new(0.5, 3.5)
    }
}

/// Worker pool and queue limits of the query scheduler
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct SchedulerConfig {
    /// Worker threads, `0` lets the pool pick one per core
    pub worker_threads: usize,
    /// Submitted queries whose results were not yet taken
    pub max_pending: usize,
    /// Cell size of the agent proximity grid
    pub grid_cell_size: f32,
}

impl SchedulerConfig {
    /// Creates a config running `worker_threads` workers
    pub fn new(worker_threads: usize) -> Self {
        Self {
            worker_threads,
            max_pending: 1024,
            grid_cell_size: 4.0,
        }
    }

    /// Sets the limit on submitted but untaken queries
    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending;
        self
    }

    /// Sets the proximity grid cell size
    pub fn with_grid_cell_size(mut self, grid_cell_size: f32) -> Self {
        self.grid_cell_size = grid_cell_size;
        self
    }

    /// Checks that every parameter is in range
    pub fn validate(&self) -> Result<(), String> {
        if self.max_pending == 0 {
            return Err("Max pending queries must be positive".to_string());
        }
        if !(self.grid_cell_size > 0.0 && self.grid_cell_size.is_finite()) {
            return Err("Grid cell size must be positive and finite".to_string());
        }
        Ok(())
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::new(0)
    }
}
