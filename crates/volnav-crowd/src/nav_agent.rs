//! Path-following agents
//!
//! A [`NavAgent`] owns a destination, asks the [`QueryScheduler`] for a path
//! and follows it once the result comes back. All interaction with the
//! scheduler happens from [`NavAgent::set_destination`], [`NavAgent::update`]
//! and [`NavAgent::stop`] on the main loop; none of them block.
//!
//! ```text
//! Idle ──set_destination──▶ PathPending ──path ready──▶ Following ──▶ Arrived
//!                              │                            │
//!                              └─failure: previous state    └─stop(false)─▶ Stopping ─▶ Arrived
//! ```

use std::fmt;

use glam::Vec3;
use log::{debug, trace, warn};
use volnav::{NavPath, PathFailure, PathRequest, RegionRef};
use volnav_common::{Error, Result};

use crate::{
    LinearFollower, NavAgentConfig, QueryOutput, QueryRequest, QueryScheduler, QueryTicket,
    SplineFollower, TicketStatus, WaypointFollower,
};
use crate::scheduler::ReleaseHandle;

/// Lifecycle state of a nav agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NavAgentState {
    /// No destination
    Idle,
    /// Waiting for a path query
    PathPending,
    /// Moving along a path
    Following,
    /// Slowing down after a non-immediate stop
    Stopping,
    /// Reached the destination or finished stopping
    Arrived,
}

impl fmt::Display for NavAgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NavAgentState::Idle => "idle",
            NavAgentState::PathPending => "path pending",
            NavAgentState::Following => "following",
            NavAgentState::Stopping => "stopping",
            NavAgentState::Arrived => "arrived",
        };
        f.write_str(name)
    }
}

/// Notification sent to the listeners of a nav agent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavAgentEvent {
    /// A new path was accepted and is being followed
    PathReady,
    /// A path query failed; the agent went back to its previous state
    PathFailed(PathFailure),
    /// The agent reached its destination
    Arrived,
}

/// Observer of nav agent events
pub type NavAgentListener = Box<dyn FnMut(&NavAgentEvent) + Send>;

/// An agent that plans and follows paths to a destination
///
/// The follower strategy decides how waypoints become velocities:
/// [`LinearFollower`] by default, [`SplineFollower`] for [`SplineNavAgent`].
///
/// A path query still in flight when the agent is dropped is cancelled on the
/// scheduler's next poll.
pub struct NavAgent<F: WaypointFollower = LinearFollower> {
    config: NavAgentConfig,
    follower: F,
    state: NavAgentState,
    previous_state: NavAgentState,
    position: Vec3,
    velocity: Vec3,
    destination: Option<Vec3>,
    previous_destination: Option<Vec3>,
    path: Option<NavPath>,
    ticket: Option<QueryTicket>,
    remaining: f32,
    arrived: bool,
    listeners: Vec<NavAgentListener>,
    release: Option<ReleaseHandle>,
}

/// Nav agent following a smooth curve through its waypoints
pub type SplineNavAgent = NavAgent<SplineFollower>;

impl<F: WaypointFollower + Default> NavAgent<F> {
    /// Creates an idle agent at `position`
    pub fn new(position: Vec3, config: NavAgentConfig) -> Result<Self> {
        Self::with_follower(position, config, F::default())
    }
}

impl<F: WaypointFollower> NavAgent<F> {
    /// Creates an idle agent using a custom follower
    pub fn with_follower(position: Vec3, config: NavAgentConfig, follower: F) -> Result<Self> {
        config.validate().map_err(Error::Config)?;
        Ok(Self {
            config,
            follower,
            state: NavAgentState::Idle,
            previous_state: NavAgentState::Idle,
            position,
            velocity: Vec3::ZERO,
            destination: None,
            previous_destination: None,
            path: None,
            ticket: None,
            remaining: 0.0,
            arrived: false,
            listeners: Vec::new(),
            release: None,
        })
    }

    /// Steering parameters
    pub fn config(&self) -> &NavAgentConfig {
        &self.config
    }

    /// Current lifecycle state
    pub fn state(&self) -> NavAgentState {
        self.state
    }

    /// Last position passed to [`update`](Self::update)
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Velocity the agent wants to move with
    pub fn desired_velocity(&self) -> Vec3 {
        self.velocity
    }

    /// Destination being planned or followed
    pub fn destination(&self) -> Option<Vec3> {
        self.destination
    }

    /// Path currently followed
    pub fn path(&self) -> Option<&NavPath> {
        self.path.as_ref()
    }

    /// Path query in flight, if any
    pub fn pending_ticket(&self) -> Option<QueryTicket> {
        self.ticket
    }

    /// Distance left along the path at the last update
    pub fn remaining_distance(&self) -> f32 {
        self.remaining
    }

    /// Whether the agent reached its destination or finished stopping
    pub fn arrived(&self) -> bool {
        self.arrived
    }

    /// Waypoint follower in use
    pub fn follower(&self) -> &F {
        &self.follower
    }

    /// Registers an observer of path and arrival events
    pub fn add_listener(&mut self, listener: impl FnMut(&NavAgentEvent) + Send + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Plans a path to `destination` from the agent's last known position
    ///
    /// Asking for the destination already being planned, followed or reached
    /// does nothing. Any query still running for an older destination is
    /// cancelled.
    pub fn set_destination(&mut self, destination: Vec3, scheduler: &mut QueryScheduler) -> Result<()> {
        let current = matches!(
            self.state,
            NavAgentState::PathPending | NavAgentState::Following | NavAgentState::Arrived
        );
        if current && self.destination == Some(destination) {
            return Ok(());
        }

        if self.release.is_none() {
            self.release = Some(scheduler.release_handle());
        }
        let ticket = self.request_path(destination, scheduler)?;
        if let Some(old) = self.ticket.replace(ticket) {
            scheduler.cancel(old);
            debug!("nav agent superseded path query {:?}", old);
        }

        if self.state != NavAgentState::PathPending {
            self.previous_state = self.state;
            self.previous_destination = self.destination;
        }
        self.destination = Some(destination);
        self.transition(NavAgentState::PathPending);
        Ok(())
    }

    /// Stops the agent
    ///
    /// An immediate stop zeroes the velocity and goes idle now. Otherwise the
    /// agent decelerates at its acceleration estimate and then counts as
    /// arrived.
    pub fn stop(&mut self, immediate: bool, scheduler: &mut QueryScheduler) {
        if let Some(ticket) = self.ticket.take() {
            scheduler.cancel(ticket);
        }
        self.destination = None;
        if immediate {
            self.velocity = Vec3::ZERO;
            self.transition(NavAgentState::Idle);
        } else {
            self.transition(NavAgentState::Stopping);
        }
    }

    /// Hands the agent's path query back to the scheduler and drops the agent
    pub fn release(mut self, scheduler: &mut QueryScheduler) {
        if let Some(ticket) = self.ticket.take() {
            scheduler.cancel(ticket);
            debug!("nav agent released path query {:?}", ticket);
        }
    }

    /// Advances the agent to `position` and returns its desired velocity
    pub fn update(&mut self, position: Vec3, dt: f32, scheduler: &mut QueryScheduler) -> Result<Vec3> {
        self.position = position;
        self.poll_path(scheduler)?;

        match self.state {
            NavAgentState::Following => self.follow(dt),
            // Keep moving along the old path while a replacement is planned
            NavAgentState::PathPending
                if self.previous_state == NavAgentState::Following && self.path.is_some() =>
            {
                let steering = self.follower.steer(position, self.velocity.length(), dt, &self.config);
                self.velocity = steering.velocity;
                self.remaining = steering.remaining;
            }
            NavAgentState::Stopping => {
                let speed = self.velocity.length() - self.config.acceleration_estimate * dt;
                if speed <= 0.0 {
                    self.velocity = Vec3::ZERO;
                    self.arrived = true;
                    self.transition(NavAgentState::Arrived);
                } else {
                    self.velocity = self.velocity.normalize_or_zero() * speed;
                }
            }
            NavAgentState::Idle | NavAgentState::PathPending | NavAgentState::Arrived => {
                self.velocity = Vec3::ZERO;
            }
        }

        Ok(self.velocity)
    }

    /// Moves every cached position after the origin moved by `offset`
    pub fn shift_origin(&mut self, offset: Vec3) {
        self.position -= offset;
        self.destination = self.destination.map(|d| d - offset);
        self.previous_destination = self.previous_destination.map(|d| d - offset);
        self.path = self.path.as_ref().map(|path| path.translated(offset));
        self.follower.shift(offset);
    }

    fn follow(&mut self, dt: f32) {
        let steering = self
            .follower
            .steer(self.position, self.velocity.length(), dt, &self.config);
        self.remaining = steering.remaining;
        if steering.finished {
            self.velocity = Vec3::ZERO;
            self.arrived = true;
            self.transition(NavAgentState::Arrived);
            self.emit(NavAgentEvent::Arrived);
        } else {
            self.velocity = steering.velocity;
        }
    }

    fn poll_path(&mut self, scheduler: &mut QueryScheduler) -> Result<()> {
        let Some(ticket) = self.ticket else {
            return Ok(());
        };

        let Some(result) = scheduler.take(ticket) else {
            if scheduler.status(ticket) == TicketStatus::Unknown {
                warn!("nav agent lost path query {:?}, requesting again", ticket);
                self.resubmit(scheduler)?;
            }
            return Ok(());
        };
        self.ticket = None;

        if result.stale {
            debug!("nav agent path query {:?} is stale, requesting again", ticket);
            return self.resubmit(scheduler);
        }

        match result.output {
            QueryOutput::Path(Ok(path)) => {
                self.follower.reset(&path, &self.config);
                self.remaining = path.length();
                self.path = Some(path);
                self.arrived = false;
                self.transition(NavAgentState::Following);
                self.emit(NavAgentEvent::PathReady);
            }
            QueryOutput::Path(Err(failure)) => {
                debug!("nav agent path query failed: {}", failure);
                self.destination = self.previous_destination;
                let previous = self.previous_state;
                self.transition(previous);
                if self.state != NavAgentState::Following {
                    self.velocity = Vec3::ZERO;
                }
                self.emit(NavAgentEvent::PathFailed(failure));
            }
            other => warn!("nav agent got a non-path result: {:?}", other),
        }
        Ok(())
    }

    fn resubmit(&mut self, scheduler: &mut QueryScheduler) -> Result<()> {
        self.ticket = None;
        if let Some(destination) = self.destination {
            self.ticket = Some(self.request_path(destination, scheduler)?);
        }
        Ok(())
    }

    fn request_path(&self, destination: Vec3, scheduler: &mut QueryScheduler) -> Result<QueryTicket> {
        let mut request = PathRequest::new(self.position, destination);
        if let Some(hint) = self.region_hint(scheduler) {
            request = request.with_start_hint(hint);
        }
        scheduler.submit(QueryRequest::Path(request))
    }

    /// Region of the current path the agent is standing in
    fn region_hint(&self, scheduler: &QueryScheduler) -> Option<RegionRef> {
        let path = self.path.as_ref()?;
        let world = scheduler.world();
        path.regions().iter().copied().find(|region| {
            world
                .region(*region)
                .is_some_and(|r| r.contains(self.position))
        })
    }

    fn transition(&mut self, state: NavAgentState) {
        if self.state != state {
            trace!("nav agent {} -> {}", self.state, state);
            self.state = state;
        }
    }

    fn emit(&mut self, event: NavAgentEvent) {
        for listener in &mut self.listeners {
            listener(&event);
        }
    }
}

impl<F: WaypointFollower> Drop for NavAgent<F> {
    fn drop(&mut self) {
        if let (Some(ticket), Some(release)) = (self.ticket.take(), self.release.as_ref()) {
            release.ticket(ticket);
        }
    }
}

impl<F: WaypointFollower + fmt::Debug> fmt::Debug for NavAgent<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NavAgent")
            .field("state", &self.state)
            .field("position", &self.position)
            .field("velocity", &self.velocity)
            .field("destination", &self.destination)
            .field("ticket", &self.ticket)
            .field("follower", &self.follower)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use volnav::test_volume_helpers::two_box_world;
    use volnav::PlannerConfig;

    use crate::SchedulerConfig;

    fn scheduler() -> Result<QueryScheduler> {
        let (world, _) = two_box_world()?;
        QueryScheduler::new(world, SchedulerConfig::new(1), PlannerConfig::default())
    }

    #[test]
    fn test_new_agent_is_idle() -> Result<()> {
        let agent: NavAgent = NavAgent::new(Vec3::splat(0.5), NavAgentConfig::default())?;
        assert_eq!(agent.state(), NavAgentState::Idle);
        assert_eq!(agent.desired_velocity(), Vec3::ZERO);
        assert!(!agent.arrived());
        assert!(agent.path().is_none());
        Ok(())
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = NavAgentConfig::default().with_max_speed(-1.0);
        assert!(NavAgent::<LinearFollower>::new(Vec3::ZERO, config).is_err());
    }

    #[test]
    fn test_same_destination_is_not_resubmitted() -> Result<()> {
        let mut scheduler = scheduler()?;
        let mut agent: NavAgent = NavAgent::new(Vec3::splat(0.5), NavAgentConfig::default())?;
        let destination = Vec3::new(1.5, 0.5, 0.5);

        agent.set_destination(destination, &mut scheduler)?;
        let ticket = agent.pending_ticket();
        agent.set_destination(destination, &mut scheduler)?;

        assert_eq!(agent.pending_ticket(), ticket);
        assert_eq!(scheduler.pending_count(), 1);
        Ok(())
    }

    #[test]
    fn test_released_agent_frees_pending_slot() -> Result<()> {
        let (world, _) = two_box_world()?;
        let mut scheduler = QueryScheduler::new(
            world,
            SchedulerConfig::new(1).with_max_pending(1),
            PlannerConfig::default(),
        )?;
        let mut agent: NavAgent = NavAgent::new(Vec3::splat(0.5), NavAgentConfig::default())?;
        agent.set_destination(Vec3::new(1.5, 0.5, 0.5), &mut scheduler)?;
        let ticket = agent.pending_ticket().expect("submitted");

        agent.release(&mut scheduler);
        scheduler.wait_idle();
        assert_eq!(scheduler.status(ticket), TicketStatus::Unknown);
        assert_eq!(scheduler.pending_count(), 0);
        Ok(())
    }

    #[test]
    fn test_dropped_agents_do_not_fill_the_scheduler() -> Result<()> {
        let (world, _) = two_box_world()?;
        let mut scheduler = QueryScheduler::new(
            world,
            SchedulerConfig::new(1).with_max_pending(2),
            PlannerConfig::default(),
        )?;
        let destination = Vec3::new(1.5, 0.5, 0.5);

        for _ in 0..2 {
            let mut agent: NavAgent = NavAgent::new(Vec3::splat(0.5), NavAgentConfig::default())?;
            agent.set_destination(destination, &mut scheduler)?;
        }
        scheduler.wait_idle();
        assert_eq!(scheduler.pending_count(), 0);

        // Results of dropped agents are never taken; the limit must still allow new work
        let mut agent: NavAgent = NavAgent::new(Vec3::splat(0.5), NavAgentConfig::default())?;
        agent.set_destination(destination, &mut scheduler)?;
        assert!(agent.pending_ticket().is_some());
        Ok(())
    }

    #[test]
    fn test_immediate_stop_goes_idle() -> Result<()> {
        let mut scheduler = scheduler()?;
        let mut agent: NavAgent = NavAgent::new(Vec3::splat(0.5), NavAgentConfig::default())?;
        agent.set_destination(Vec3::new(1.5, 0.5, 0.5), &mut scheduler)?;
        let ticket = agent.pending_ticket().expect("submitted");

        agent.stop(true, &mut scheduler);
        scheduler.wait_idle();

        assert_eq!(agent.state(), NavAgentState::Idle);
        assert!(agent.pending_ticket().is_none());
        assert_eq!(scheduler.status(ticket), TicketStatus::Unknown);
        assert_eq!(agent.update(Vec3::splat(0.5), 0.1, &mut scheduler)?, Vec3::ZERO);
        Ok(())
    }

    #[test]
    fn test_gradual_stop_decelerates_to_arrived() -> Result<()> {
        let mut scheduler = scheduler()?;
        let config = NavAgentConfig::default();
        let mut agent: NavAgent = NavAgent::new(Vec3::new(0.2, 0.5, 0.5), config)?;
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        agent.add_listener(move |event| sink.lock().unwrap().push(*event));

        agent.set_destination(Vec3::new(1.8, 0.5, 0.5), &mut scheduler)?;
        scheduler.wait_idle();
        let mut position = agent.position();
        for _ in 0..5 {
            let v = agent.update(position, 0.05, &mut scheduler)?;
            position += v * 0.05;
        }
        assert_eq!(agent.state(), NavAgentState::Following);
        let speed = agent.desired_velocity().length();
        assert!(speed > 0.0);

        agent.stop(false, &mut scheduler);
        assert_eq!(agent.state(), NavAgentState::Stopping);

        let mut previous = speed;
        let mut steps = 0;
        while agent.state() == NavAgentState::Stopping {
            let v = agent.update(position, 0.05, &mut scheduler)?;
            assert!(v.length() < previous || v == Vec3::ZERO);
            previous = v.length();
            position += v * 0.05;
            steps += 1;
            assert!(steps < 100);
        }

        assert_eq!(agent.state(), NavAgentState::Arrived);
        assert!(agent.arrived());
        assert_eq!(agent.desired_velocity(), Vec3::ZERO);
        assert_eq!(*events.lock().unwrap(), vec![NavAgentEvent::PathReady]);
        Ok(())
    }

    #[test]
    fn test_shift_origin_moves_everything() -> Result<()> {
        let mut scheduler = scheduler()?;
        let mut agent: NavAgent = NavAgent::new(Vec3::splat(0.5), NavAgentConfig::default())?;
        agent.set_destination(Vec3::new(1.5, 0.5, 0.5), &mut scheduler)?;
        scheduler.wait_idle();
        agent.update(Vec3::splat(0.5), 0.05, &mut scheduler)?;

        let offset = Vec3::new(10.0, 0.0, -2.0);
        let before = agent.path().expect("path").waypoints().to_vec();
        agent.shift_origin(offset);

        assert_eq!(agent.position(), Vec3::splat(0.5) - offset);
        assert_eq!(agent.destination(), Some(Vec3::new(1.5, 0.5, 0.5) - offset));
        for (a, b) in before.iter().zip(agent.path().expect("path").waypoints()) {
            assert_eq!(*a - offset, *b);
        }
        Ok(())
    }
}
