//! Path refinement through portal apertures
//!
//! The search produces a corridor: the start, the portals crossed in order and
//! the destination. String pulling places one waypoint on each portal so that
//! the polyline through them gets as short as the apertures allow.

use glam::Vec3;
use volnav_common::distance;

use crate::Portal;

/// Pulls the corridor `start -> portals -> destination` taut
///
/// Waypoints start at the portal centers. Every pass moves each portal waypoint
/// to the point of its aperture closest to a straight line between its
/// neighbors, keeping the move only when it shortens the path. Passes stop once
/// no waypoint moved farther than `tolerance`, or after `max_iterations`.
///
/// The returned waypoints include `start` and `destination`. The result is
/// never longer than the path through the portal centers.
pub fn string_pull(
    start: Vec3,
    destination: Vec3,
    portals: &[&Portal],
    max_iterations: usize,
    tolerance: f32,
) -> Vec<Vec3> {
    let mut points = Vec::with_capacity(portals.len() + 2);
    points.push(start);
    points.extend(portals.iter().map(|p| p.center()));
    points.push(destination);

    for _ in 0..max_iterations {
        let mut max_move = 0.0f32;

        for i in 1..points.len() - 1 {
            let prev = points[i - 1];
            let current = points[i];
            let next = points[i + 1];

            let candidate = portals[i - 1].aperture().shortest_crossing(prev, next);
            let old_cost = distance(&prev, &current) + distance(&current, &next);
            let new_cost = distance(&prev, &candidate) + distance(&candidate, &next);
            if new_cost < old_cost {
                max_move = max_move.max(distance(&current, &candidate));
                points[i] = candidate;
            }
        }

        if max_move < tolerance {
            break;
        }
    }

    points
}
