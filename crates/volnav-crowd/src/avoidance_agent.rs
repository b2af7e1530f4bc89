//! Agent-side driver of velocity-obstacle avoidance

use glam::Vec3;
use log::trace;
use volnav_common::{Error, Result};

use crate::{
    AgentId, AgentSnapshot, AvoidanceConfig, QueryOutput, QueryRequest, QueryScheduler,
    QueryTicket, TicketStatus,
};
use crate::scheduler::ReleaseHandle;

/// Callback supplying the velocity an agent wants before avoidance
pub type InputVelocity = Box<dyn FnMut() -> Vec3 + Send>;

/// An agent taking part in reciprocal avoidance
///
/// Each [`step`](Self::step) publishes the agent's motion, picks up the last
/// solve and queues the next one, so the velocity returned lags one step
/// behind the neighbor state it was computed from.
///
/// Dropping the agent removes it from the registry on the scheduler's next
/// poll; [`unregister`](Self::unregister) does it right away.
pub struct AvoidanceAgent {
    id: AgentId,
    config: AvoidanceConfig,
    input_velocity: Option<InputVelocity>,
    avoidance_velocity: Vec3,
    pending: Option<QueryTicket>,
    has_result: bool,
    last_feasible: bool,
    release: Option<ReleaseHandle>,
}

impl AvoidanceAgent {
    /// Registers a new agent at `position` with the scheduler's registry
    pub fn new(position: Vec3, config: AvoidanceConfig, scheduler: &mut QueryScheduler) -> Result<Self> {
        config.validate().map_err(Error::Config)?;
        let id = scheduler.registry_mut().insert(AgentSnapshot {
            position,
            velocity: Vec3::ZERO,
            radius: config.radius,
            max_speed: config.max_speed,
        });
        Ok(Self {
            id,
            config,
            input_velocity: None,
            avoidance_velocity: Vec3::ZERO,
            pending: None,
            has_result: false,
            last_feasible: true,
            release: Some(scheduler.release_handle()),
        })
    }

    /// Handle of the agent in the registry
    pub fn id(&self) -> AgentId {
        self.id
    }

    /// Avoidance parameters
    pub fn config(&self) -> &AvoidanceConfig {
        &self.config
    }

    /// Overrides the desired velocity passed to [`step`](Self::step)
    pub fn set_input_velocity(&mut self, input: impl FnMut() -> Vec3 + Send + 'static) {
        self.input_velocity = Some(Box::new(input));
    }

    /// Goes back to the desired velocity passed to `step`
    pub fn clear_input_velocity(&mut self) {
        self.input_velocity = None;
    }

    /// Last velocity produced by avoidance, never faster than `max_speed`
    pub fn avoidance_velocity(&self) -> Vec3 {
        self.avoidance_velocity
    }

    /// Whether the last solve satisfied every neighbor constraint
    pub fn last_feasible(&self) -> bool {
        self.last_feasible
    }

    /// Advances the agent by one step and returns the velocity to move with
    ///
    /// `default_desired` is used unless an input velocity callback is set.
    /// Until the first solve finishes the desired velocity is returned,
    /// clamped to the agent's max speed.
    pub fn step(
        &mut self,
        position: Vec3,
        velocity: Vec3,
        default_desired: Vec3,
        dt: f32,
        scheduler: &mut QueryScheduler,
    ) -> Result<Vec3> {
        scheduler.registry_mut().update(self.id, position, velocity)?;
        self.collect(scheduler);

        let desired = match self.input_velocity.as_mut() {
            Some(input) => input(),
            None => default_desired,
        }
        .clamp_length_max(self.config.max_speed);

        if self.pending.is_none() {
            let input = scheduler
                .registry()
                .avoidance_input(self.id, desired, &self.config, dt)?;
            self.pending = Some(scheduler.submit(QueryRequest::Avoidance(input))?);
        }

        if self.has_result {
            Ok(self.avoidance_velocity)
        } else {
            Ok(desired)
        }
    }

    fn collect(&mut self, scheduler: &mut QueryScheduler) {
        let Some(ticket) = self.pending else {
            return;
        };
        match scheduler.take(ticket) {
            Some(result) => {
                self.pending = None;
                if result.stale {
                    trace!("avoidance agent {:?} dropped a stale solve", self.id);
                    return;
                }
                if let QueryOutput::Avoidance(solution) = result.output {
                    self.avoidance_velocity = solution.velocity.clamp_length_max(self.config.max_speed);
                    self.last_feasible = solution.feasible;
                    self.has_result = true;
                }
            }
            None if scheduler.status(ticket) == TicketStatus::Unknown => self.pending = None,
            None => {}
        }
    }

    /// Removes the agent from the registry and drops any solve in flight
    pub fn unregister(mut self, scheduler: &mut QueryScheduler) {
        self.release = None;
        if let Some(ticket) = self.pending.take() {
            scheduler.cancel(ticket);
        }
        scheduler.registry_mut().remove(self.id);
    }
}

impl Drop for AvoidanceAgent {
    fn drop(&mut self) {
        let Some(release) = self.release.take() else {
            return;
        };
        if let Some(ticket) = self.pending.take() {
            release.ticket(ticket);
        }
        release.agent(self.id);
    }
}

impl std::fmt::Debug for AvoidanceAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvoidanceAgent")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("avoidance_velocity", &self.avoidance_velocity)
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use volnav::test_volume_helpers::two_box_world;
    use volnav::PlannerConfig;

    use crate::SchedulerConfig;

    fn scheduler() -> Result<QueryScheduler> {
        let (world, _) = two_box_world()?;
        QueryScheduler::new(world, SchedulerConfig::new(2), PlannerConfig::default())
    }

    #[test]
    fn test_first_step_returns_clamped_desired() -> Result<()> {
        let mut scheduler = scheduler()?;
        let mut agent = AvoidanceAgent::new(Vec3::ZERO, AvoidanceConfig::new(0.5, 2.0), &mut scheduler)?;

        let v = agent.step(Vec3::ZERO, Vec3::ZERO, Vec3::new(5.0, 0.0, 0.0), 0.1, &mut scheduler)?;
        assert!((v - Vec3::new(2.0, 0.0, 0.0)).length() < 1e-5);
        assert_eq!(scheduler.pending_count(), 1);
        Ok(())
    }

    #[test]
    fn test_lone_agent_keeps_desired_velocity() -> Result<()> {
        let mut scheduler = scheduler()?;
        let mut agent = AvoidanceAgent::new(Vec3::ZERO, AvoidanceConfig::new(0.5, 2.0), &mut scheduler)?;
        let desired = Vec3::new(0.0, 1.0, 1.0);

        agent.step(Vec3::ZERO, Vec3::ZERO, desired, 0.1, &mut scheduler)?;
        scheduler.wait_idle();
        let v = agent.step(Vec3::ZERO, desired, desired, 0.1, &mut scheduler)?;

        assert!((v - desired).length() < 1e-4);
        assert!(agent.last_feasible());
        Ok(())
    }

    #[test]
    fn test_input_velocity_callback_overrides_default() -> Result<()> {
        let mut scheduler = scheduler()?;
        let mut agent = AvoidanceAgent::new(Vec3::ZERO, AvoidanceConfig::new(0.5, 2.0), &mut scheduler)?;
        agent.set_input_velocity(|| Vec3::new(0.0, 0.0, -1.0));

        let v = agent.step(Vec3::ZERO, Vec3::ZERO, Vec3::X, 0.1, &mut scheduler)?;
        assert_eq!(v, Vec3::new(0.0, 0.0, -1.0));

        agent.clear_input_velocity();
        scheduler.wait_idle();
        agent.step(Vec3::ZERO, Vec3::ZERO, Vec3::X, 0.1, &mut scheduler)?;
        scheduler.wait_idle();
        let v = agent.step(Vec3::ZERO, Vec3::X, Vec3::X, 0.1, &mut scheduler)?;
        assert!((v - Vec3::X).length() < 1e-4);
        Ok(())
    }

    #[test]
    fn test_unregister_removes_agent() -> Result<()> {
        let mut scheduler = scheduler()?;
        let agent = AvoidanceAgent::new(Vec3::ZERO, AvoidanceConfig::default(), &mut scheduler)?;
        assert_eq!(scheduler.registry().len(), 1);
        agent.unregister(&mut scheduler);
        assert!(scheduler.registry().is_empty());
        Ok(())
    }

    #[test]
    fn test_dropped_agent_leaves_registry() -> Result<()> {
        let mut scheduler = scheduler()?;
        let mut agent = AvoidanceAgent::new(Vec3::ZERO, AvoidanceConfig::default(), &mut scheduler)?;
        let other = AvoidanceAgent::new(Vec3::X, AvoidanceConfig::default(), &mut scheduler)?;
        agent.step(Vec3::ZERO, Vec3::ZERO, Vec3::X, 0.1, &mut scheduler)?;
        let id = agent.id();
        drop(agent);

        scheduler.poll();
        assert_eq!(scheduler.registry().len(), 1);
        assert!(scheduler.registry().get(id).is_none());
        assert!(scheduler.registry().get(other.id()).is_some());

        scheduler.wait_idle();
        assert_eq!(scheduler.pending_count(), 0);
        Ok(())
    }
}
