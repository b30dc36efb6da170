//! Rate limiter and intermediate-node policy
//!
//! Decides, for each incoming odometry event, whether it becomes a full
//! frame, a pose-only intermediate frame, or is dropped. It also tracks the
//! last pose seen (to detect odometry resets) and the variance accumulator
//! flushed into each queued entry.

use crate::config::BufferSettings;
use crate::types::{is_identity, Pose, Uncertainty};
use std::time::Instant;

/// What happens to an incoming frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Queued with its sensor payload
    Full,
    /// Queued without sensor payload
    Intermediate,
    /// Not queued
    Dropped,
}

impl Admission {
    pub fn is_queued(&self) -> bool {
        !matches!(self, Admission::Dropped)
    }
}

/// Outcome of [`RateLimiter::evaluate`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameDecision {
    pub admission: Admission,
    /// An identity pose followed a non-identity one
    pub odometry_reset: bool,
    /// Variances to store with the queued entry
    pub uncertainty: Uncertainty,
}

/// Producer-side frame admission state
#[derive(Debug, Clone)]
pub struct RateLimiter {
    last_full_frame: Option<Instant>,
    /// `None` while odometry is lost
    last_pose: Option<Pose>,
    rot_variance: f64,
    trans_variance: f64,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            last_full_frame: None,
            last_pose: Some(Pose::identity()),
            rot_variance: 0.0,
            trans_variance: 0.0,
        }
    }

    /// Decide what to do with a frame arriving at `now`
    pub fn evaluate(
        &mut self,
        now: Instant,
        settings: &BufferSettings,
        pose: Option<Pose>,
        uncertainty: Uncertainty,
    ) -> FrameDecision {
        // Strict comparison: a frame exactly one interval later is accepted
        let ignore_frame = match (settings.min_frame_interval_secs(), self.last_full_frame) {
            (Some(interval), Some(last)) => now.duration_since(last).as_secs_f64() < interval,
            _ => false,
        };

        let odometry_reset = settings.max_size > 0
            && !self.last_pose.as_ref().is_some_and(is_identity)
            && pose.as_ref().is_some_and(is_identity);
        if odometry_reset {
            tracing::warn!("Odometry is reset (identity pose detected). Increment map id!");
            self.rot_variance = 0.0;
            self.trans_variance = 0.0;
        }

        self.last_pose = pose;

        if ignore_frame && !settings.create_intermediate_nodes {
            return FrameDecision {
                admission: Admission::Dropped,
                odometry_reset,
                uncertainty,
            };
        }
        if !ignore_frame {
            self.last_full_frame = Some(now);
        }

        self.rot_variance = self.rot_variance.max(uncertainty.rot_variance);
        self.trans_variance = self.trans_variance.max(uncertainty.trans_variance);
        let flushed = Uncertainty::new(
            if self.rot_variance <= 0.0 { 1.0 } else { self.rot_variance },
            if self.trans_variance <= 0.0 { 1.0 } else { self.trans_variance },
        );
        self.rot_variance = 0.0;
        self.trans_variance = 0.0;

        FrameDecision {
            admission: if ignore_frame {
                Admission::Intermediate
            } else {
                Admission::Full
            },
            odometry_reset,
            uncertainty: flushed,
        }
    }

    /// Record that odometry was lost
    pub fn mark_lost(&mut self) {
        self.last_pose = None;
    }

    /// Forget the last pose and variances (the rate timer is kept)
    pub fn reset(&mut self) {
        self.last_pose = Some(Pose::identity());
        self.rot_variance = 0.0;
        self.trans_variance = 0.0;
    }

    pub fn last_pose(&self) -> Option<Pose> {
        self.last_pose
    }

    /// Current (rotational, translational) accumulator
    pub fn variances(&self) -> (f64, f64) {
        (self.rot_variance, self.trans_variance)
    }
}
