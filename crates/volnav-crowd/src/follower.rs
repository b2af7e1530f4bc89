//! Path following strategies for nav agents

use glam::Vec3;
use volnav::NavPath;

use crate::NavAgentConfig;

/// Steering output of one follow step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Steering {
    /// Velocity the agent should take
    pub velocity: Vec3,
    /// Remaining distance to the destination along the path
    pub remaining: f32,
    /// The agent is within the acceptance radius of the destination
    pub finished: bool,
}

impl Steering {
    fn finished() -> Self {
        Self {
            velocity: Vec3::ZERO,
            remaining: 0.0,
            finished: true,
        }
    }
}

/// Turns a path and the agent's motion into a desired velocity
pub trait WaypointFollower {
    /// Starts following `path` from its first waypoint
    fn reset(&mut self, path: &NavPath, config: &NavAgentConfig);

    /// Computes the desired velocity at `position`, moving at `speed`
    fn steer(&mut self, position: Vec3, speed: f32, dt: f32, config: &NavAgentConfig) -> Steering;

    /// Moves all cached positions after the origin moved by `offset`
    fn shift(&mut self, offset: Vec3);
}

/// Speed that still allows stopping within `distance`
pub(crate) fn braking_speed(max_speed: f32, acceleration: f32, distance: f32) -> f32 {
    max_speed.min((2.0 * acceleration * distance.max(0.0)).sqrt())
}

/// Steers straight at the next waypoint
///
/// A waypoint is passed as soon as it lies within the braking distance
/// `v² / (2a)`, so the agent starts turning toward the following one early.
#[derive(Debug, Clone, Default)]
pub struct LinearFollower {
    waypoints: Vec<Vec3>,
    target: usize,
}

impl LinearFollower {
    /// Creates a follower with no path
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the waypoint currently steered at
    pub fn target(&self) -> usize {
        self.target
    }

    fn remaining_from(&self, position: Vec3) -> f32 {
        let Some(target) = self.waypoints.get(self.target) else {
            return 0.0;
        };
        let tail: f32 = self.waypoints[self.target..]
            .windows(2)
            .map(|w| w[0].distance(w[1]))
            .sum();
        position.distance(*target) + tail
    }
}

impl WaypointFollower for LinearFollower {
    fn reset(&mut self, path: &NavPath, _config: &NavAgentConfig) {
        self.waypoints = path.waypoints().to_vec();
        // The first waypoint is where the agent already is
        self.target = 1.min(self.waypoints.len().saturating_sub(1));
    }

    fn steer(&mut self, position: Vec3, speed: f32, _dt: f32, config: &NavAgentConfig) -> Steering {
        if self.waypoints.is_empty() {
            return Steering::finished();
        }
        let last = self.waypoints.len() - 1;

        let lookahead = (speed * speed / (2.0 * config.acceleration_estimate))
            .max(config.acceptance_radius);
        while self.target < last && position.distance(self.waypoints[self.target]) <= lookahead {
            self.target += 1;
        }

        let remaining = self.remaining_from(position);
        if self.target == last && remaining <= config.acceptance_radius {
            return Steering::finished();
        }

        let direction = (self.waypoints[self.target] - position).normalize_or_zero();
        let speed = braking_speed(config.max_speed, config.acceleration_estimate, remaining);
        Steering {
            velocity: direction * speed,
            remaining,
            finished: false,
        }
    }

    fn shift(&mut self, offset: Vec3) {
        for waypoint in &mut self.waypoints {
            *waypoint -= offset;
        }
    }
}
