//! Asynchronous query scheduler
//!
//! Nearest-point, path and avoidance queries are copied into plain request
//! records and run on a worker pool against an immutable snapshot of the
//! world. Finished results come back over a channel and wait until their owner
//! takes them; the main loop never blocks on a query.
//!
//! Floating-origin shifts replace the world snapshot copy-on-write. Every
//! result remembers the epoch of the snapshot it was computed on and is
//! flagged stale when taken after a later shift.
//!
//! Agents dropped without handing their work back send a release message
//! instead; the scheduler applies it on the next poll, cancelling the ticket
//! and freeing the registry slot.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use glam::Vec3;
use log::{debug, warn};
use volnav::{NavHit, NavPath, NavWorld, PathFailure, PathPlanner, PathRequest, PlannerConfig};
use volnav_common::{Error, Result};

use crate::{avoidance, AgentId, AgentRegistry, AvoidanceInput, AvoidanceSolution, SchedulerConfig};

/// Handle of a submitted query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryTicket(u64);

/// A query to run on the worker pool
#[derive(Debug, Clone, PartialEq)]
pub enum QueryRequest {
    /// Nearest navigable point within `max_distance`
    Nearest {
        /// Query position
        point: Vec3,
        /// Largest accepted distance
        max_distance: f32,
    },
    /// Path between two points
    Path(PathRequest),
    /// Velocity-obstacle solve for one agent
    Avoidance(AvoidanceInput),
}

/// Output of a finished query
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutput {
    /// Nearest-point hit, invalid when nothing was within range
    Nearest(NavHit),
    /// Planned path or the reason planning failed
    Path(std::result::Result<NavPath, PathFailure>),
    /// New velocity of an avoidance agent
    Avoidance(AvoidanceSolution),
}

/// A finished query handed to its owner
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    /// Ticket the query was submitted under
    pub ticket: QueryTicket,
    /// Origin epoch of the world snapshot the query ran on
    pub epoch: u64,
    /// The origin moved after the query ran; positions in `output` use the old origin
    pub stale: bool,
    /// Query output
    pub output: QueryOutput,
}

/// Where a ticket is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketStatus {
    /// Still running or queued
    Pending,
    /// Finished and waiting to be taken
    Ready,
    /// Cancelled before it finished; its result will be dropped
    Cancelled,
    /// Never issued, already taken, or cancelled and dropped
    Unknown,
}

#[derive(Debug, Clone, Copy)]
enum Release {
    Ticket(QueryTicket),
    Agent(AgentId),
}

/// Channel end through which a dropped agent returns its ticket or registry slot
#[derive(Debug, Clone)]
pub(crate) struct ReleaseHandle(Sender<Release>);

impl ReleaseHandle {
    pub(crate) fn ticket(&self, ticket: QueryTicket) {
        // Nothing to free once the scheduler is gone
        let _ = self.0.send(Release::Ticket(ticket));
    }

    pub(crate) fn agent(&self, id: AgentId) {
        let _ = self.0.send(Release::Agent(id));
    }
}

struct Completion {
    ticket: QueryTicket,
    epoch: u64,
    output: QueryOutput,
}

/// Runs navigation queries off the main loop
pub struct QueryScheduler {
    config: SchedulerConfig,
    planner_config: PlannerConfig,
    world: Arc<NavWorld>,
    registry: AgentRegistry,
    pool: rayon::ThreadPool,
    sender: Sender<Completion>,
    receiver: Receiver<Completion>,
    release_sender: Sender<Release>,
    release_receiver: Receiver<Release>,
    next_ticket: u64,
    in_flight: HashSet<QueryTicket>,
    cancelled: HashSet<QueryTicket>,
    ready: HashMap<QueryTicket, QueryResult>,
}

impl QueryScheduler {
    /// Creates a scheduler owning `world`
    pub fn new(world: NavWorld, config: SchedulerConfig, planner_config: PlannerConfig) -> Result<Self> {
        config.validate().map_err(Error::Config)?;
        planner_config.validate().map_err(Error::Config)?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.worker_threads)
            .thread_name(|i| format!("volnav-query-{}", i))
            .build()
            .map_err(|e| Error::Scheduler(format!("failed to create worker pool: {}", e)))?;
        let (sender, receiver) = unbounded();
        let (release_sender, release_receiver) = unbounded();

        debug!(
            "query scheduler started with {} workers",
            pool.current_num_threads()
        );

        Ok(Self {
            config,
            planner_config,
            world: Arc::new(world),
            registry: AgentRegistry::new(config.grid_cell_size),
            pool,
            sender,
            receiver,
            release_sender,
            release_receiver,
            next_ticket: 1,
            in_flight: HashSet::new(),
            cancelled: HashSet::new(),
            ready: HashMap::new(),
        })
    }

    /// Pool and limit settings
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Planner settings used for path queries
    pub fn planner_config(&self) -> &PlannerConfig {
        &self.planner_config
    }

    /// Replaces the planner configuration used by later path queries
    pub fn set_planner_config(&mut self, planner_config: PlannerConfig) -> Result<()> {
        planner_config.validate().map_err(Error::Config)?;
        self.planner_config = planner_config;
        Ok(())
    }

    /// Current world snapshot
    pub fn world(&self) -> &Arc<NavWorld> {
        &self.world
    }

    /// Mutable access to the world, copied first if a query still reads it
    pub fn world_mut(&mut self) -> &mut NavWorld {
        Arc::make_mut(&mut self.world)
    }

    /// Published agent state read by avoidance queries
    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    /// Mutable access to the agent registry
    pub fn registry_mut(&mut self) -> &mut AgentRegistry {
        &mut self.registry
    }

    /// Shifts the world and every registered agent to a new origin
    pub fn update_all_transforms(&mut self, offset: Vec3) {
        self.world_mut().update_all_transforms(offset);
        self.registry.shift(offset);
    }

    pub(crate) fn release_handle(&self) -> ReleaseHandle {
        ReleaseHandle(self.release_sender.clone())
    }

    /// Queries submitted and not yet taken
    pub fn pending_count(&self) -> usize {
        self.in_flight.len() + self.ready.len()
    }

    /// Queues a query on the worker pool
    pub fn submit(&mut self, request: QueryRequest) -> Result<QueryTicket> {
        self.apply_releases();
        if self.pending_count() >= self.config.max_pending {
            return Err(Error::Scheduler(format!(
                "too many pending queries (limit {})",
                self.config.max_pending
            )));
        }
        Ok(self.dispatch(request))
    }

    /// Queues several queries at once; either all are accepted or none
    pub fn submit_batch(
        &mut self,
        requests: impl IntoIterator<Item = QueryRequest>,
    ) -> Result<Vec<QueryTicket>> {
        let requests: Vec<_> = requests.into_iter().collect();
        self.apply_releases();
        if self.pending_count() + requests.len() > self.config.max_pending {
            return Err(Error::Scheduler(format!(
                "batch of {} queries exceeds the pending limit of {}",
                requests.len(),
                self.config.max_pending
            )));
        }
        Ok(requests.into_iter().map(|r| self.dispatch(r)).collect())
    }

    fn dispatch(&mut self, request: QueryRequest) -> QueryTicket {
        let ticket = QueryTicket(self.next_ticket);
        self.next_ticket += 1;
        self.in_flight.insert(ticket);

        let world = Arc::clone(&self.world);
        let sender = self.sender.clone();
        let planner_config = self.planner_config;
        self.pool.spawn(move || {
            let output = execute(&world, &request, planner_config);
            // The receiver only goes away together with the scheduler
            let _ = sender.send(Completion {
                ticket,
                epoch: world.epoch(),
                output,
            });
        });

        ticket
    }

    /// Collects finished queries without blocking; returns how many became ready
    pub fn poll(&mut self) -> usize {
        self.apply_releases();
        let mut count = 0;
        while let Ok(completion) = self.receiver.try_recv() {
            if self.accept(completion) {
                count += 1;
            }
        }
        count
    }

    fn apply_releases(&mut self) {
        while let Ok(release) = self.release_receiver.try_recv() {
            match release {
                Release::Ticket(ticket) => {
                    if self.cancel(ticket) {
                        debug!("released query {:?} of a dropped agent", ticket);
                    }
                }
                Release::Agent(id) => {
                    if self.registry.remove(id).is_some() {
                        debug!("removed dropped agent {:?} from the registry", id);
                    }
                }
            }
        }
    }

    fn accept(&mut self, completion: Completion) -> bool {
        self.in_flight.remove(&completion.ticket);
        if self.cancelled.remove(&completion.ticket) {
            debug!("dropping result of cancelled query {:?}", completion.ticket);
            return false;
        }
        self.ready.insert(
            completion.ticket,
            QueryResult {
                ticket: completion.ticket,
                epoch: completion.epoch,
                stale: false,
                output: completion.output,
            },
        );
        true
    }

    /// Hands a finished result to its owner
    ///
    /// Returns `None` while the query is still running.
    pub fn take(&mut self, ticket: QueryTicket) -> Option<QueryResult> {
        self.poll();
        let mut result = self.ready.remove(&ticket)?;
        if result.epoch != self.world.epoch() {
            warn!(
                "query {:?} ran before the origin moved (epoch {} < {})",
                ticket,
                result.epoch,
                self.world.epoch()
            );
            result.stale = true;
        }
        Some(result)
    }

    /// Cancels a query; a result arriving later is dropped
    pub fn cancel(&mut self, ticket: QueryTicket) -> bool {
        if self.ready.remove(&ticket).is_some() {
            return true;
        }
        if self.in_flight.contains(&ticket) {
            return self.cancelled.insert(ticket);
        }
        false
    }

    /// Where `ticket` is in its lifecycle
    pub fn status(&self, ticket: QueryTicket) -> TicketStatus {
        if self.ready.contains_key(&ticket) {
            TicketStatus::Ready
        } else if self.cancelled.contains(&ticket) {
            TicketStatus::Cancelled
        } else if self.in_flight.contains(&ticket) {
            TicketStatus::Pending
        } else {
            TicketStatus::Unknown
        }
    }

    /// Blocks until every submitted query has finished
    ///
    /// Meant for tools and tests; a frame loop should use [`poll`](Self::poll).
    pub fn wait_idle(&mut self) {
        self.apply_releases();
        while !self.in_flight.is_empty() {
            match self.receiver.recv() {
                Ok(completion) => {
                    self.accept(completion);
                }
                Err(_) => break,
            }
        }
    }
}

fn execute(world: &NavWorld, request: &QueryRequest, planner_config: PlannerConfig) -> QueryOutput {
    match request {
        QueryRequest::Nearest {
            point,
            max_distance,
        } => QueryOutput::Nearest(world.nearest_point(*point, *max_distance)),
        QueryRequest::Path(path_request) => {
            QueryOutput::Path(PathPlanner::new(world, planner_config).find_path(path_request))
        }
        QueryRequest::Avoidance(input) => QueryOutput::Avoidance(avoidance::solve(input)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use volnav::test_volume_helpers::*;

    fn scheduler() -> Result<QueryScheduler> {
        let (world, _) = two_box_world()?;
        QueryScheduler::new(world, SchedulerConfig::new(2), PlannerConfig::default())
    }

    #[test]
    fn test_nearest_query() -> Result<()> {
        let mut scheduler = scheduler()?;
        let ticket = scheduler.submit(QueryRequest::Nearest {
            point: Vec3::new(0.5, 3.0, 0.5),
            max_distance: 5.0,
        })?;
        scheduler.wait_idle();

        assert_eq!(scheduler.status(ticket), TicketStatus::Ready);
        let result = scheduler.take(ticket).expect("finished");
        assert!(!result.stale);
        let QueryOutput::Nearest(hit) = result.output else {
            panic!("expected a nearest-point result");
        };
        assert!(hit.on_edge);
        assert!((hit.position - Vec3::new(0.5, 1.0, 0.5)).length() < 1e-5);

        // Results are handed out once
        assert!(scheduler.take(ticket).is_none());
        assert_eq!(scheduler.status(ticket), TicketStatus::Unknown);
        Ok(())
    }

    #[test]
    fn test_batch_results_match_tickets() -> Result<()> {
        let mut scheduler = scheduler()?;
        let points: Vec<_> = (0..16).map(|i| Vec3::new(i as f32 * 0.125, 0.5, 0.5)).collect();
        let tickets = scheduler.submit_batch(points.iter().map(|p| QueryRequest::Nearest {
            point: *p,
            max_distance: 1.0,
        }))?;
        scheduler.wait_idle();

        for (ticket, point) in tickets.into_iter().zip(points) {
            match scheduler.take(ticket).map(|r| r.output) {
                Some(QueryOutput::Nearest(hit)) => assert_eq!(hit.position, point),
                other => panic!("unexpected result {:?}", other),
            }
        }
        assert_eq!(scheduler.pending_count(), 0);
        Ok(())
    }

    #[test]
    fn test_path_query() -> Result<()> {
        let mut scheduler = scheduler()?;
        let ticket = scheduler.submit(QueryRequest::Path(PathRequest::new(
            Vec3::new(0.5, 0.5, 0.5),
            Vec3::new(1.5, 0.5, 0.5),
        )))?;
        scheduler.wait_idle();

        match scheduler.take(ticket).map(|r| r.output) {
            Some(QueryOutput::Path(Ok(path))) => assert_eq!(path.segment_count(), 2),
            other => panic!("unexpected result {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_cancelled_result_is_dropped() -> Result<()> {
        let mut scheduler = scheduler()?;
        let ticket = scheduler.submit(QueryRequest::Path(PathRequest::new(
            Vec3::new(0.5, 0.5, 0.5),
            Vec3::new(1.5, 0.5, 0.5),
        )))?;
        assert!(scheduler.cancel(ticket));
        scheduler.wait_idle();

        assert!(scheduler.take(ticket).is_none());
        assert_eq!(scheduler.status(ticket), TicketStatus::Unknown);
        assert!(!scheduler.cancel(ticket));
        assert_eq!(scheduler.pending_count(), 0);
        Ok(())
    }

    #[test]
    fn test_pending_limit() -> Result<()> {
        let (world, _) = two_box_world()?;
        let mut scheduler = QueryScheduler::new(
            world,
            SchedulerConfig::new(1).with_max_pending(2),
            PlannerConfig::default(),
        )?;
        let request = QueryRequest::Nearest {
            point: Vec3::splat(0.5),
            max_distance: 1.0,
        };

        scheduler.submit(request.clone())?;
        scheduler.submit(request.clone())?;
        assert!(scheduler.submit(request.clone()).is_err());
        assert!(scheduler.submit_batch(vec![request.clone()]).is_err());

        // Finished but untaken results still count
        scheduler.wait_idle();
        assert!(scheduler.submit(request).is_err());
        Ok(())
    }

    #[test]
    fn test_result_after_shift_is_stale() -> Result<()> {
        let mut scheduler = scheduler()?;
        let ticket = scheduler.submit(QueryRequest::Nearest {
            point: Vec3::splat(0.5),
            max_distance: 1.0,
        })?;
        scheduler.update_all_transforms(Vec3::new(100.0, 0.0, 0.0));
        scheduler.wait_idle();

        let result = scheduler.take(ticket).expect("finished");
        assert!(result.stale);
        assert_eq!(result.epoch + 1, scheduler.world().epoch());
        Ok(())
    }

    #[test]
    fn test_released_ticket_frees_its_slot() -> Result<()> {
        let (world, _) = two_box_world()?;
        let mut scheduler = QueryScheduler::new(
            world,
            SchedulerConfig::new(1).with_max_pending(1),
            PlannerConfig::default(),
        )?;
        let request = QueryRequest::Nearest {
            point: Vec3::splat(0.5),
            max_distance: 1.0,
        };

        let ticket = scheduler.submit(request.clone())?;
        scheduler.wait_idle();
        scheduler.release_handle().ticket(ticket);

        // The release is applied before the limit is checked
        let next = scheduler.submit(request)?;
        assert_eq!(scheduler.status(ticket), TicketStatus::Unknown);
        assert_ne!(next, ticket);
        Ok(())
    }

    #[test]
    fn test_invalid_config() -> Result<()> {
        let (world, _) = two_box_world()?;
        let result = QueryScheduler::new(
            world,
            SchedulerConfig::default().with_max_pending(0),
            PlannerConfig::default(),
        );
        assert!(matches!(result, Err(Error::Config(_))));
        Ok(())
    }
}
