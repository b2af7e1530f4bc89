//! Region-graph path planning
//!
//! A* runs over regions, possibly across volumes. Each search node is entered
//! at a point: the start position for the start region, otherwise the center of
//! the portal it was reached through. Moving to a neighbor costs the distance
//! from that entry point to the next portal's center. Once the corridor is
//! known, [`string_pull`] refines it into the final waypoints.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use glam::Vec3;
use log::debug;

use crate::{string_pull, NavPath, NavWorld, PathFailure, PlannerConfig, Portal, PortalRef, RegionRef};

/// Input of a path query
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct PathRequest {
    /// Where the path starts
    pub start: Vec3,
    /// Where the path should end
    pub destination: Vec3,
    /// Region believed to contain `start`, skips the nearest-point lookup when right
    pub start_hint: Option<RegionRef>,
}

impl PathRequest {
    /// Request for a path from `start` to `destination` without a start hint
    pub fn new(start: Vec3, destination: Vec3) -> Self {
        Self {
            start,
            destination,
            start_hint: None,
        }
    }

    /// Sets the region expected to contain `start`
    pub fn with_start_hint(mut self, region: RegionRef) -> Self {
        self.start_hint = Some(region);
        self
    }
}

/// State of a node during the search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeState {
    Open,
    Closed,
}

#[derive(Debug, Clone)]
struct SearchNode {
    region: RegionRef,
    /// Portal the node was entered through, `None` for the start
    portal: Option<PortalRef>,
    entry: Vec3,
    parent: Option<usize>,
    g: f32,
    state: NodeState,
}

/// Open list entry
///
/// `goal` entries close the path: their `f` is the exact corridor cost through
/// node `index` plus the final leg to the destination.
#[derive(Debug, Clone, Copy)]
struct HeapNode {
    index: usize,
    f: f32,
    order: u64,
    goal: bool,
}

impl PartialEq for HeapNode {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapNode {}

impl PartialOrd for HeapNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for a min-heap: lowest f first, then earliest insertion
        other
            .f
            .total_cmp(&self.f)
            .then_with(|| other.order.cmp(&self.order))
    }
}

/// Path planner over a [`NavWorld`]
///
/// Holds its search buffers so a planner can serve many requests.
pub struct PathPlanner<'a> {
    world: &'a NavWorld,
    config: PlannerConfig,
    nodes: Vec<SearchNode>,
    lookup: HashMap<RegionRef, usize>,
    open_list: BinaryHeap<HeapNode>,
    next_order: u64,
    expanded: usize,
}

impl<'a> PathPlanner<'a> {
    /// Creates a planner reading `world`; search buffers are reused between calls
    pub fn new(world: &'a NavWorld, config: PlannerConfig) -> Self {
        Self {
            world,
            config,
            nodes: Vec::new(),
            lookup: HashMap::new(),
            open_list: BinaryHeap::new(),
            next_order: 0,
            expanded: 0,
        }
    }

    /// Search limits used by this planner
    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Number of regions expanded by the last search
    pub fn last_expanded(&self) -> usize {
        self.expanded
    }

    /// Plans a path for `request`
    pub fn find_path(&mut self, request: &PathRequest) -> Result<NavPath, PathFailure> {
        if !request.start.is_finite() || !request.destination.is_finite() {
            return Err(PathFailure::InvalidRequest);
        }
        if let Err(reason) = self.config.validate() {
            debug!("rejecting path request: {}", reason);
            return Err(PathFailure::InvalidRequest);
        }

        let (start_region, start) = self.resolve_start(request)?;
        let destination_hit = self
            .world
            .nearest_point(request.destination, self.config.max_snap_distance);
        let goal_region = destination_hit
            .region_ref()
            .ok_or(PathFailure::DestinationUnresolvable)?;
        let destination = destination_hit.position;

        let goal_index = self.search(start_region, start, goal_region, destination)?;
        let corridor_length =
            self.nodes[goal_index].g + self.nodes[goal_index].entry.distance(destination);

        // Walk back from the goal to collect regions and the portals between them
        let mut regions = Vec::new();
        let mut portal_refs = Vec::new();
        let mut current = Some(goal_index);
        while let Some(index) = current {
            let node = &self.nodes[index];
            regions.push(node.region);
            if let Some(portal) = node.portal {
                portal_refs.push(portal);
            }
            current = node.parent;
        }
        regions.reverse();
        portal_refs.reverse();

        let world = self.world;
        let portals: Vec<&Portal> = portal_refs
            .iter()
            .map(|p| world.portal(*p).ok_or(PathFailure::NoPath))
            .collect::<Result<_, _>>()?;

        let waypoints = string_pull(
            start,
            destination,
            &portals,
            self.config.funnel_iterations,
            self.config.funnel_tolerance,
        );

        debug!(
            "path found: {} regions, {} expanded, corridor {:.3}",
            regions.len(),
            self.expanded,
            corridor_length
        );

        Ok(NavPath::new(waypoints, regions, corridor_length))
    }

    fn resolve_start(&self, request: &PathRequest) -> Result<(RegionRef, Vec3), PathFailure> {
        if let Some(hint) = request.start_hint {
            if self
                .world
                .region(hint)
                .is_some_and(|region| region.contains(request.start))
            {
                return Ok((hint, request.start));
            }
        }

        let hit = self
            .world
            .nearest_point(request.start, self.config.max_snap_distance);
        hit.region_ref()
            .map(|region| (region, hit.position))
            .ok_or(PathFailure::StartUnresolvable)
    }

    fn push(&mut self, index: usize, f: f32, goal: bool) {
        self.open_list.push(HeapNode {
            index,
            f,
            order: self.next_order,
            goal,
        });
        self.next_order += 1;
    }

    fn reset(&mut self) {
        self.nodes.clear();
        self.lookup.clear();
        self.open_list.clear();
        self.next_order = 0;
        self.expanded = 0;
    }

    /// Runs A* and returns the node index of the goal region
    fn search(
        &mut self,
        start_region: RegionRef,
        start: Vec3,
        goal_region: RegionRef,
        destination: Vec3,
    ) -> Result<usize, PathFailure> {
        self.reset();

        self.nodes.push(SearchNode {
            region: start_region,
            portal: None,
            entry: start,
            parent: None,
            g: 0.0,
            state: NodeState::Open,
        });
        self.lookup.insert(start_region, 0);
        self.push(0, start.distance(destination), false);

        while let Some(HeapNode { index, goal, .. }) = self.open_list.pop() {
            if goal {
                return Ok(index);
            }

            // Entries left behind by a cheaper update pop after it
            if self.nodes[index].state == NodeState::Closed {
                continue;
            }

            self.nodes[index].state = NodeState::Closed;
            self.expanded += 1;
            if self.expanded > self.config.max_search_nodes {
                debug!(
                    "search limit of {} regions reached",
                    self.config.max_search_nodes
                );
                return Err(PathFailure::SearchLimit);
            }

            let SearchNode {
                region, entry, g, ..
            } = self.nodes[index];

            if region == goal_region {
                self.push(index, g + entry.distance(destination), true);
                continue;
            }

            let world = self.world;
            for link in world.neighbors(region) {
                let Some(portal) = world.portal(link.portal) else {
                    continue;
                };
                let next_entry = portal.center();
                let next_g = g + entry.distance(next_entry);
                let h = next_entry.distance(destination);

                match self.lookup.get(&link.neighbor).copied() {
                    Some(existing) => {
                        let neighbor = &mut self.nodes[existing];
                        if neighbor.state == NodeState::Closed || next_g >= neighbor.g {
                            continue;
                        }
                        neighbor.g = next_g;
                        neighbor.entry = next_entry;
                        neighbor.portal = Some(link.portal);
                        neighbor.parent = Some(index);
                        self.push(existing, next_g + h, false);
                    }
                    None => {
                        let neighbor_index = self.nodes.len();
                        self.nodes.push(SearchNode {
                            region: link.neighbor,
                            portal: Some(link.portal),
                            entry: next_entry,
                            parent: Some(index),
                            g: next_g,
                            state: NodeState::Open,
                        });
                        self.lookup.insert(link.neighbor, neighbor_index);
                        self.push(neighbor_index, next_g + h, false);
                    }
                }
            }
        }

        Err(PathFailure::NoPath)
    }
}
