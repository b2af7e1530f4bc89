//! Agents and asynchronous queries on volumetric navigation worlds
//!
//! This crate moves agents through a [`volnav::NavWorld`]: nav agents plan and
//! follow paths, avoidance agents keep clear of each other with reciprocal
//! velocity obstacles, and every query runs on a worker pool so the main loop
//! never waits for one.
//!
//! # Example
//!
//! ```rust,ignore
//! use volnav_crowd::{NavAgent, NavAgentConfig, QueryScheduler, SchedulerConfig};
//!
//! let mut scheduler = QueryScheduler::new(world, SchedulerConfig::default(), planner_config)?;
//! let mut agent: NavAgent = NavAgent::new(position, NavAgentConfig::default())?;
//! agent.add_listener(|event| println!("{:?}", event));
//! agent.set_destination(destination, &mut scheduler)?;
//!
//! // Every frame
//! let velocity = agent.update(position, dt, &mut scheduler)?;
//! position += velocity * dt;
//! ```
//!
//! # Architecture
//!
//! - [`QueryScheduler`]: worker pool, world snapshot and agent registry
//! - [`NavAgent`] / [`SplineNavAgent`]: destination state machine over a [`WaypointFollower`]
//! - [`AvoidanceAgent`]: publishes motion and consumes ORCA solves
//! - [`AgentRegistry`] and [`ProximityGrid`]: neighbor lookup for avoidance

mod avoidance;
mod avoidance_agent;
mod config;
mod follower;
mod nav_agent;
mod proximity_grid;
mod registry;
mod scheduler;
mod spline;

pub use avoidance::*;
pub use avoidance_agent::*;
pub use config::*;
pub use follower::*;
pub use nav_agent::*;
pub use proximity_grid::*;
pub use registry::*;
pub use scheduler::*;
pub use spline::*;
