//! Optimal reciprocal collision avoidance in three dimensions
//!
//! Every neighbor contributes one half-space of allowed velocities. The agent
//! picks the velocity closest to its preferred one inside all half-spaces and
//! within its speed sphere, found by incremental linear programming. When the
//! half-spaces do not intersect the solver switches to the velocity that
//! minimizes the largest violation, starting from the first plane it failed on.

use glam::Vec3;
use log::trace;

use crate::AgentId;

const RVO_EPSILON: f32 = 1e-5;

/// Squared sine of the angle below which a vector counts as lying on the agent axis
const AXIAL_EPSILON: f32 = 1e-6;

/// Motion of a neighbor captured when the solve was requested
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NeighborSnapshot {
    /// Neighbor handle, used to order neighbors deterministically
    pub id: AgentId,
    /// Position at snapshot time
    pub position: Vec3,
    /// Velocity at snapshot time
    pub velocity: Vec3,
    /// Body radius
    pub radius: f32,
}

/// Everything one avoidance solve reads
#[derive(Debug, Clone, PartialEq)]
pub struct AvoidanceInput {
    /// Agent being solved for
    pub agent: AgentId,
    /// Current position of the agent
    pub position: Vec3,
    /// Current velocity of the agent
    pub velocity: Vec3,
    /// Velocity the agent would take without neighbors
    pub preferred_velocity: Vec3,
    /// Body radius
    pub radius: f32,
    /// Speed limit of the result
    pub max_speed: f32,
    /// Time window over which collisions are avoided
    pub time_horizon: f32,
    /// Simulation step, used when agents already overlap
    pub time_step: f32,
    /// Neighbors ordered by distance, then handle
    pub neighbors: Vec<NeighborSnapshot>,
}

/// Result of one avoidance solve
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AvoidanceSolution {
    /// New velocity, never faster than the agent's max speed
    pub velocity: Vec3,
    /// `false` when the constraints had no common solution and the least
    /// violating velocity was returned instead
    pub feasible: bool,
}

/// Half-space `(v - point) · normal >= 0` of allowed velocities
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrcaPlane {
    /// Point on the plane
    pub point: Vec3,
    /// Unit normal pointing into the allowed side
    pub normal: Vec3,
}

impl OrcaPlane {
    /// How far `velocity` lies on the forbidden side, negative when allowed
    pub fn violation(&self, velocity: Vec3) -> f32 {
        self.normal.dot(self.point - velocity)
    }
}

#[derive(Debug, Clone, Copy)]
struct Line {
    point: Vec3,
    direction: Vec3,
}

/// Builds one ORCA plane per neighbor in input order
pub fn compute_orca_planes(input: &AvoidanceInput) -> Vec<OrcaPlane> {
    let inv_time_horizon = 1.0 / input.time_horizon;
    let inv_time_step = 1.0 / input.time_step.max(RVO_EPSILON);

    let mut planes = Vec::with_capacity(input.neighbors.len());
    for neighbor in &input.neighbors {
        let relative_position = neighbor.position - input.position;
        let relative_velocity = input.velocity - neighbor.velocity;
        let dist_sq = relative_position.length_squared();
        let combined_radius = input.radius + neighbor.radius;
        let combined_radius_sq = combined_radius * combined_radius;

        let (normal, u) = if dist_sq > combined_radius_sq {
            // No collision
            let w = relative_velocity - inv_time_horizon * relative_position;
            let w_length_sq = w.length_squared();
            let dot_product = w.dot(relative_position);

            if dot_product < 0.0 && dot_product * dot_product > combined_radius_sq * w_length_sq {
                // Project on cut-off sphere
                let w_length = w_length_sq.sqrt();
                let normal = off_axis(w / w_length, w, relative_position);
                (normal, (combined_radius * inv_time_horizon - w_length) * normal)
            } else {
                // Project on cone
                let a = dist_sq;
                let b = relative_position.dot(relative_velocity);
                let c = relative_velocity.length_squared()
                    - relative_position.cross(relative_velocity).length_squared()
                        / (dist_sq - combined_radius_sq);
                let t = (b + (b * b - a * c).max(0.0).sqrt()) / a;
                let w = relative_velocity - t * relative_position;
                let w_length = w.length();
                if w_length <= RVO_EPSILON || is_axial(w, relative_position) {
                    // Relative velocity on the cone axis: leave through the side
                    // picked by `sideways`, along the cone surface normal
                    let dist = dist_sq.sqrt();
                    let axis = relative_position / dist;
                    let sin = combined_radius / dist;
                    let cos = (1.0 - sin * sin).max(0.0).sqrt();
                    let normal = cos * sideways(relative_position) - sin * axis;
                    (normal, relative_velocity.dot(axis) * sin * normal)
                } else {
                    let unit_w = w / w_length;
                    (unit_w, (combined_radius * t - w_length) * unit_w)
                }
            }
        } else {
            // Collision: project on cut-off sphere of time step
            let w = relative_velocity - inv_time_step * relative_position;
            let w_length = w.length();
            let normal = if w_length > RVO_EPSILON {
                off_axis(w / w_length, w, relative_position)
            } else {
                sideways(relative_position)
            };
            (normal, (combined_radius * inv_time_step - w_length) * normal)
        };

        planes.push(OrcaPlane {
            point: input.velocity + 0.5 * u,
            normal,
        });
    }
    planes
}

/// Whether `w` points along the line between the two agents
fn is_axial(w: Vec3, relative_position: Vec3) -> bool {
    w.cross(relative_position).length_squared()
        <= AXIAL_EPSILON * w.length_squared() * relative_position.length_squared()
}

/// Tilts an axial normal toward `sideways` so a symmetric pair can separate
///
/// A normal along the axis only lets both agents slow down, and two agents
/// aimed straight at each other would stall in front of one another.
fn off_axis(unit_w: Vec3, w: Vec3, relative_position: Vec3) -> Vec3 {
    if is_axial(w, relative_position) {
        (unit_w + sideways(relative_position)).normalize_or(unit_w)
    } else {
        unit_w
    }
}

/// Unit direction perpendicular to `relative_position`
///
/// Used when the relative velocity points straight at the neighbor. Flipping
/// the relative position flips the result, so both agents of a head-on pair
/// dodge to opposite sides.
fn sideways(relative_position: Vec3) -> Vec3 {
    let dir = relative_position.normalize_or_zero();
    if dir == Vec3::ZERO {
        return Vec3::Y;
    }
    let reference = if dir.y.abs() < 0.9 { Vec3::Y } else { Vec3::X };
    dir.cross(reference).normalize()
}

/// Solves one avoidance query
pub fn solve(input: &AvoidanceInput) -> AvoidanceSolution {
    let planes = compute_orca_planes(input);
    let max_speed = input.max_speed.max(0.0);

    let mut velocity = Vec3::ZERO;
    let plane_fail = linear_program3(&planes, max_speed, input.preferred_velocity, false, &mut velocity);
    let feasible = plane_fail >= planes.len();
    if !feasible {
        trace!(
            "avoidance for {:?} infeasible at plane {} of {}",
            input.agent,
            plane_fail,
            planes.len()
        );
        linear_program4(&planes, plane_fail, max_speed, &mut velocity);
    }

    AvoidanceSolution {
        velocity: velocity.clamp_length_max(max_speed),
        feasible,
    }
}

/// Optimizes along the line where plane `plane_no` meets the speed sphere
fn linear_program1(
    planes: &[OrcaPlane],
    plane_no: usize,
    line: &Line,
    radius: f32,
    opt_velocity: Vec3,
    direction_opt: bool,
    result: &mut Vec3,
) -> bool {
    let dot_product = line.point.dot(line.direction);
    let discriminant = dot_product * dot_product + radius * radius - line.point.length_squared();

    if discriminant < 0.0 {
        // Max speed sphere fully invalidates line
        return false;
    }

    let sqrt_discriminant = discriminant.sqrt();
    let mut t_left = -dot_product - sqrt_discriminant;
    let mut t_right = -dot_product + sqrt_discriminant;

    for plane in &planes[..plane_no] {
        let numerator = (plane.point - line.point).dot(plane.normal);
        let denominator = line.direction.dot(plane.normal);

        if denominator * denominator <= RVO_EPSILON {
            // Lines are (almost) parallel to the plane
            if numerator > 0.0 {
                return false;
            }
            continue;
        }

        let t = numerator / denominator;
        if denominator >= 0.0 {
            t_left = t_left.max(t);
        } else {
            t_right = t_right.min(t);
        }

        if t_left > t_right {
            return false;
        }
    }

    if direction_opt {
        if opt_velocity.dot(line.direction) > 0.0 {
            *result = line.point + t_right * line.direction;
        } else {
            *result = line.point + t_left * line.direction;
        }
    } else {
        let t = line.direction.dot(opt_velocity - line.point);
        *result = line.point + t.clamp(t_left, t_right) * line.direction;
    }

    true
}

/// Optimizes on plane `plane_no`, respecting the planes before it
fn linear_program2(
    planes: &[OrcaPlane],
    plane_no: usize,
    radius: f32,
    opt_velocity: Vec3,
    direction_opt: bool,
    result: &mut Vec3,
) -> bool {
    let plane = planes[plane_no];
    let plane_dist = plane.point.dot(plane.normal);
    let plane_dist_sq = plane_dist * plane_dist;
    let radius_sq = radius * radius;

    if plane_dist_sq > radius_sq {
        // Max speed sphere fully invalidates plane
        return false;
    }

    let plane_radius_sq = radius_sq - plane_dist_sq;
    let plane_center = plane_dist * plane.normal;

    if direction_opt {
        let plane_opt_velocity = opt_velocity - opt_velocity.dot(plane.normal) * plane.normal;
        let plane_opt_velocity_length_sq = plane_opt_velocity.length_squared();

        if plane_opt_velocity_length_sq <= RVO_EPSILON {
            *result = plane_center;
        } else {
            *result = plane_center
                + (plane_radius_sq / plane_opt_velocity_length_sq).sqrt() * plane_opt_velocity;
        }
    } else {
        // Project point opt_velocity on plane
        *result = opt_velocity + (plane.point - opt_velocity).dot(plane.normal) * plane.normal;

        // If outside the speed sphere, project on its intersection with the plane
        if result.length_squared() > radius_sq {
            let plane_result = *result - plane_center;
            let plane_result_length_sq = plane_result.length_squared();
            *result = plane_center + (plane_radius_sq / plane_result_length_sq).sqrt() * plane_result;
        }
    }

    for i in 0..plane_no {
        if planes[i].violation(*result) > 0.0 {
            // Result does not satisfy constraint i, optimize on the line both planes share
            let cross_product = planes[i].normal.cross(plane.normal);

            if cross_product.length_squared() <= RVO_EPSILON {
                // Planes are parallel, plane i fully invalidates plane_no
                return false;
            }

            let direction = cross_product.normalize();
            let line_normal = direction.cross(plane.normal);
            let line = Line {
                point: plane.point
                    + ((planes[i].point - plane.point).dot(planes[i].normal)
                        / line_normal.dot(planes[i].normal))
                        * line_normal,
                direction,
            };

            if !linear_program1(planes, i, &line, radius, opt_velocity, direction_opt, result) {
                return false;
            }
        }
    }

    true
}

/// Adds planes one at a time; returns the index of the first plane that made
/// the program infeasible, or `planes.len()` on success
fn linear_program3(
    planes: &[OrcaPlane],
    radius: f32,
    opt_velocity: Vec3,
    direction_opt: bool,
    result: &mut Vec3,
) -> usize {
    if direction_opt {
        // Optimize direction, the optimization velocity is a unit vector
        *result = opt_velocity * radius;
    } else if opt_velocity.length_squared() > radius * radius {
        *result = opt_velocity.normalize() * radius;
    } else {
        *result = opt_velocity;
    }

    for i in 0..planes.len() {
        if planes[i].violation(*result) > 0.0 {
            let temp_result = *result;
            if !linear_program2(planes, i, radius, opt_velocity, direction_opt, result) {
                *result = temp_result;
                return i;
            }
        }
    }

    planes.len()
}

/// Minimizes the largest violation of planes `begin_plane..` while keeping the
/// planes before it satisfied
fn linear_program4(planes: &[OrcaPlane], begin_plane: usize, radius: f32, result: &mut Vec3) {
    let mut distance = 0.0f32;

    for i in begin_plane..planes.len() {
        if planes[i].violation(*result) <= distance {
            continue;
        }

        // Result does not satisfy constraint of plane i
        let mut proj_planes = Vec::with_capacity(i);
        for j in 0..i {
            let cross_product = planes[j].normal.cross(planes[i].normal);
            let point = if cross_product.length_squared() <= RVO_EPSILON {
                // Plane i and plane j are (almost) parallel
                if planes[i].normal.dot(planes[j].normal) > 0.0 {
                    // Same direction
                    continue;
                }
                // Opposite direction
                0.5 * (planes[i].point + planes[j].point)
            } else {
                // Plane point is a point on the line of intersection
                let line_normal = cross_product.cross(planes[i].normal);
                planes[i].point
                    + ((planes[j].point - planes[i].point).dot(planes[j].normal)
                        / line_normal.dot(planes[j].normal))
                        * line_normal
            };

            proj_planes.push(OrcaPlane {
                point,
                normal: (planes[j].normal - planes[i].normal).normalize_or_zero(),
            });
        }

        let temp_result = *result;
        if linear_program3(&proj_planes, radius, planes[i].normal, true, result)
            < proj_planes.len()
        {
            // Only happens due to floating point error, keep the previous result
            *result = temp_result;
        }

        distance = planes[i].violation(*result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn ids(count: usize) -> Vec<AgentId> {
        let mut map: SlotMap<AgentId, ()> = SlotMap::with_key();
        (0..count).map(|_| map.insert(())).collect()
    }

    fn input_for(
        position: Vec3,
        velocity: Vec3,
        preferred_velocity: Vec3,
        neighbors: Vec<NeighborSnapshot>,
    ) -> AvoidanceInput {
        AvoidanceInput {
            agent: AgentId::default(),
            position,
            velocity,
            preferred_velocity,
            radius: 0.5,
            max_speed: 2.0,
            time_horizon: 2.0,
            time_step: 0.1,
            neighbors,
        }
    }

    fn neighbor(id: AgentId, position: Vec3, velocity: Vec3) -> NeighborSnapshot {
        NeighborSnapshot {
            id,
            position,
            velocity,
            radius: 0.5,
        }
    }

    /// Both agents of a head-on pair solve against each other
    fn head_on_pair(gap: f32) -> (AvoidanceInput, AvoidanceInput) {
        let agents = ids(2);
        let pa = Vec3::ZERO;
        let pb = Vec3::new(gap, 0.0, 0.0);
        let va = Vec3::new(1.0, 0.0, 0.0);
        let vb = Vec3::new(-1.0, 0.0, 0.0);
        let a = input_for(pa, va, va, vec![neighbor(agents[1], pb, vb)]);
        let b = input_for(pb, vb, vb, vec![neighbor(agents[0], pa, va)]);
        (a, b)
    }

    #[test]
    fn test_no_neighbors_keeps_preferred() {
        let input = input_for(Vec3::ZERO, Vec3::ZERO, Vec3::new(1.0, 0.5, 0.0), Vec::new());
        let solution = solve(&input);
        assert!(solution.feasible);
        assert_eq!(solution.velocity, Vec3::new(1.0, 0.5, 0.0));
    }

    #[test]
    fn test_preferred_clamped_to_max_speed() {
        let input = input_for(Vec3::ZERO, Vec3::ZERO, Vec3::new(10.0, 0.0, 0.0), Vec::new());
        let solution = solve(&input);
        assert!((solution.velocity.length() - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_head_on_constraints_satisfied() {
        for gap in [4.0, 1.2] {
            let (a, b) = head_on_pair(gap);
            let sa = solve(&a);
            let sb = solve(&b);
            assert!(sa.feasible && sb.feasible);

            for (input, solution) in [(&a, &sa), (&b, &sb)] {
                assert!(solution.velocity.length() <= input.max_speed + 1e-5);
                for plane in compute_orca_planes(input) {
                    assert!(plane.violation(solution.velocity) <= 1e-4);
                }
            }

            // The pair dodges to opposite sides
            assert!(sa.velocity.z * sb.velocity.z < 0.0);

            // No inter-penetration at the next step
            let next_a = a.position + sa.velocity * a.time_step;
            let next_b = b.position + sb.velocity * b.time_step;
            assert!(next_a.distance(next_b) >= a.radius + b.radius - 1e-4);
        }
    }

    #[test]
    fn test_slow_head_on_pair_sidesteps() {
        // Nearly stopped in front of each other, both still wanting to go straight
        let agents = ids(2);
        let pa = Vec3::new(-0.58, 0.0, 0.0);
        let pb = Vec3::new(0.58, 0.0, 0.0);
        let va = Vec3::new(0.056, 0.0, 0.0);
        let vb = -va;
        let a = input_for(pa, va, Vec3::X, vec![neighbor(agents[1], pb, vb)]);
        let b = input_for(pb, vb, -Vec3::X, vec![neighbor(agents[0], pa, va)]);

        let sa = solve(&a);
        let sb = solve(&b);
        assert!(sa.feasible && sb.feasible);
        assert!(sa.velocity.z > 0.1, "no sidestep: {:?}", sa.velocity);
        assert!(sb.velocity.z < -0.1, "no sidestep: {:?}", sb.velocity);
        assert!(sa.velocity.x > 0.1);
    }

    #[test]
    fn test_passing_neighbor_is_ignored_when_diverging() {
        let agents = ids(1);
        // Neighbor behind and moving away
        let input = input_for(
            Vec3::ZERO,
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            vec![neighbor(agents[0], Vec3::new(-3.0, 0.0, 0.0), Vec3::new(-1.0, 0.0, 0.0))],
        );
        let solution = solve(&input);
        assert!(solution.feasible);
        assert!((solution.velocity - Vec3::new(1.0, 0.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn test_infeasible_fallback_is_bounded_and_deterministic() {
        let agents = ids(6);
        let offsets = [Vec3::X, -Vec3::X, Vec3::Y, -Vec3::Y, Vec3::Z, -Vec3::Z];
        let neighbors = agents
            .iter()
            .zip(offsets)
            .map(|(id, dir)| neighbor(*id, dir * 0.5, Vec3::ZERO))
            .collect();
        let mut input = input_for(Vec3::ZERO, Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0), neighbors);
        input.max_speed = 0.1;

        let first = solve(&input);
        assert!(!first.feasible);
        assert!(first.velocity.is_finite());
        assert!(first.velocity.length() <= 0.1 + 1e-5);
        assert_eq!(solve(&input), first);
    }

    #[test]
    fn test_plane_violation_sign() {
        let plane = OrcaPlane {
            point: Vec3::new(0.0, 1.0, 0.0),
            normal: Vec3::Y,
        };
        assert!(plane.violation(Vec3::ZERO) > 0.0);
        assert!(plane.violation(Vec3::new(0.0, 2.0, 0.0)) < 0.0);
    }
}
