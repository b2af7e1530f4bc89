//! Spline path following
//!
//! The path is fitted with a Catmull-Rom curve through all of its waypoints.
//! The curve is sampled once into a polyline with cumulative arc lengths, and
//! progress along it is tracked as an arc length.

use glam::Vec3;
use volnav::NavPath;
use volnav_common::closest_point_on_segment;

use crate::follower::{braking_speed, Steering, WaypointFollower};
use crate::NavAgentConfig;

/// Arc-length parameterized Catmull-Rom curve
#[derive(Debug, Clone, PartialEq)]
pub struct SplineCurve {
    samples: Vec<Vec3>,
    /// Cumulative arc length at each sample
    lengths: Vec<f32>,
}

impl SplineCurve {
    /// Fits a curve through `points`, sampling each segment `samples_per_segment` times
    pub fn new(points: &[Vec3], samples_per_segment: usize) -> Self {
        let steps = samples_per_segment.max(1);
        let mut samples = Vec::with_capacity(points.len().saturating_sub(1) * steps + 1);

        if points.len() < 2 {
            samples.extend_from_slice(points);
        } else {
            let n = points.len();
            // Mirror the end points to get tangents at both ends
            let at = |i: isize| -> Vec3 {
                if i < 0 {
                    2.0 * points[0] - points[1]
                } else if i as usize >= n {
                    2.0 * points[n - 1] - points[n - 2]
                } else {
                    points[i as usize]
                }
            };

            for i in 0..n - 1 {
                let i = i as isize;
                let (p0, p1, p2, p3) = (at(i - 1), at(i), at(i + 1), at(i + 2));
                for k in 0..steps {
                    let t = k as f32 / steps as f32;
                    samples.push(catmull_rom(p0, p1, p2, p3, t));
                }
            }
            samples.push(points[n - 1]);
        }

        let mut lengths = Vec::with_capacity(samples.len());
        let mut total = 0.0;
        for (i, sample) in samples.iter().enumerate() {
            if i > 0 {
                total += samples[i - 1].distance(*sample);
            }
            lengths.push(total);
        }

        Self { samples, lengths }
    }

    /// Total arc length
    pub fn length(&self) -> f32 {
        self.lengths.last().copied().unwrap_or(0.0)
    }

    /// Last point of the curve
    pub fn end(&self) -> Vec3 {
        self.samples.last().copied().unwrap_or(Vec3::ZERO)
    }

    /// Arc-length samples along the curve
    pub fn samples(&self) -> &[Vec3] {
        &self.samples
    }

    /// Index of the sample segment containing arc length `s`
    fn segment_at(&self, s: f32) -> usize {
        let upper = self.lengths.partition_point(|l| *l <= s);
        upper.saturating_sub(1).min(self.samples.len().saturating_sub(2))
    }

    /// Point at arc length `s`
    pub fn point_at(&self, s: f32) -> Vec3 {
        if self.samples.len() < 2 {
            return self.end();
        }
        let s = s.clamp(0.0, self.length());
        let i = self.segment_at(s);
        let span = self.lengths[i + 1] - self.lengths[i];
        if span <= f32::EPSILON {
            return self.samples[i];
        }
        self.samples[i].lerp(self.samples[i + 1], (s - self.lengths[i]) / span)
    }

    /// Unit tangent at arc length `s`
    pub fn tangent_at(&self, s: f32) -> Vec3 {
        if self.samples.len() < 2 {
            return Vec3::ZERO;
        }
        let i = self.segment_at(s.clamp(0.0, self.length()));
        (self.samples[i + 1] - self.samples[i]).normalize_or_zero()
    }

    /// Arc length of the curve point closest to `position` within `from..=to`
    pub fn project(&self, position: Vec3, from: f32, to: f32) -> f32 {
        if self.samples.len() < 2 {
            return 0.0;
        }
        let from = from.clamp(0.0, self.length());
        let to = to.clamp(from, self.length());

        let mut best = from;
        let mut best_dist = f32::MAX;
        for i in self.segment_at(from)..=self.segment_at(to) {
            let (a, b) = (self.samples[i], self.samples[i + 1]);
            let closest = closest_point_on_segment(&position, &a, &b);
            let d = closest.distance_squared(position);
            if d < best_dist {
                best_dist = d;
                best = (self.lengths[i] + a.distance(closest)).clamp(from, to);
            }
        }
        best
    }

    fn shift(&mut self, offset: Vec3) {
        for sample in &mut self.samples {
            *sample -= offset;
        }
    }
}

fn catmull_rom(p0: Vec3, p1: Vec3, p2: Vec3, p3: Vec3, t: f32) -> Vec3 {
    let t2 = t * t;
    let t3 = t2 * t;
    0.5 * ((2.0 * p1)
        + (p2 - p0) * t
        + (2.0 * p0 - 5.0 * p1 + 4.0 * p2 - p3) * t2
        + (3.0 * p1 - p0 - 3.0 * p2 + p3) * t3)
}

/// Follows a smooth curve through the path waypoints
///
/// Outputs the curve tangent at the tracked progress plus a correction toward
/// the curve proportional to the cross-track error.
#[derive(Debug, Clone, Default)]
pub struct SplineFollower {
    curve: Option<SplineCurve>,
    progress: f32,
}

impl SplineFollower {
    /// Creates a follower with no curve
    pub fn new() -> Self {
        Self::default()
    }

    /// Curve built from the current path
    pub fn curve(&self) -> Option<&SplineCurve> {
        self.curve.as_ref()
    }

    /// Arc length travelled along the curve
    pub fn progress(&self) -> f32 {
        self.progress
    }
}

impl WaypointFollower for SplineFollower {
    fn reset(&mut self, path: &NavPath, config: &NavAgentConfig) {
        self.curve = Some(SplineCurve::new(
            path.waypoints(),
            config.spline_samples_per_segment,
        ));
        self.progress = 0.0;
    }

    fn steer(&mut self, position: Vec3, speed: f32, dt: f32, config: &NavAgentConfig) -> Steering {
        let Some(curve) = &self.curve else {
            return Steering {
                velocity: Vec3::ZERO,
                remaining: 0.0,
                finished: true,
            };
        };

        // Only look a few steps ahead so loops in the curve are not skipped
        let window = (speed.max(config.max_speed) * dt.max(0.0) * 4.0)
            .max(2.0 * config.acceptance_radius);
        self.progress = curve
            .project(position, self.progress, self.progress + window)
            .max(self.progress);

        let end = curve.end();
        let to_end = position.distance(end);
        let arc_left = curve.length() - self.progress;
        let remaining = arc_left.max(to_end);

        if to_end <= config.acceptance_radius {
            return Steering {
                velocity: Vec3::ZERO,
                remaining: to_end,
                finished: true,
            };
        }

        let speed = braking_speed(config.max_speed, config.acceleration_estimate, remaining);
        let velocity = if arc_left <= config.acceptance_radius {
            (end - position).normalize_or_zero() * speed
        } else {
            let tangent = curve.tangent_at(self.progress);
            let correction = (curve.point_at(self.progress) - position) * config.cross_track_gain;
            (tangent * speed + correction).clamp_length_max(speed)
        };

        Steering {
            velocity,
            remaining,
            finished: false,
        }
    }

    fn shift(&mut self, offset: Vec3) {
        if let Some(curve) = &mut self.curve {
            curve.shift(offset);
        }
    }
}
