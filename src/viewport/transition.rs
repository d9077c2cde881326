//! Animated moves between two camera states.
//!
//! The viewport never drives its own animation clock. A navigation call in
//! [`AnimationMode::Smooth`] returns a [`TransitionHandle`]; whoever owns the
//! frame loop turns wall-clock time into progress with
//! [`TransitionHandle::progress`] and feeds it back through
//! [`Viewport::apply_frame`](super::Viewport::apply_frame).

use std::time::{Duration, Instant};

use super::geometry::Vec2;

/// Default duration for pan/zoom transitions.
pub const DEFAULT_TRANSITION: Duration = Duration::from_millis(300);

/// Duration used by `reset_view` in smooth mode.
pub const RESET_TRANSITION: Duration = Duration::from_millis(500);

/// How a navigation operation is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnimationMode {
    /// Apply the clamped target immediately (direct manual input)
    #[default]
    Instant,

    /// Interpolate towards the target over the given duration
    Smooth(Duration),
}

impl AnimationMode {
    /// Smooth mode with the default duration.
    pub const fn smooth() -> Self {
        AnimationMode::Smooth(DEFAULT_TRANSITION)
    }
}

/// Camera state a transition moves towards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewTarget {
    pub position: Vec2,
    pub zoom: f64,
}

/// Identifies one started transition.
///
/// Starting a new transition supersedes the previous one; frames applied
/// with an old handle are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionHandle {
    pub(crate) id: u64,
    started_at: Instant,
    duration: Duration,
}

impl TransitionHandle {
    pub(crate) fn new(id: u64, duration: Duration) -> Self {
        Self {
            id,
            started_at: Instant::now(),
            duration,
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Fraction of the duration elapsed at `now`, clamped to `[0, 1]`.
    pub fn progress(&self, now: Instant) -> f64 {
        if self.duration.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(self.started_at);
        (elapsed.as_secs_f64() / self.duration.as_secs_f64()).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct ActiveTransition {
    pub id: u64,
    pub from: ViewTarget,
    pub to: ViewTarget,
}

impl ActiveTransition {
    /// Interpolated state at eased progress `t` in `[0, 1)`.
    pub fn sample(&self, t: f64) -> ViewTarget {
        let eased = ease_in_out_cubic(t);
        ViewTarget {
            position: Vec2::new(
                lerp(self.from.position.x, self.to.position.x, eased),
                lerp(self.from.position.y, self.to.position.y, eased),
            ),
            zoom: lerp(self.from.zoom, self.to.zoom, eased),
        }
    }
}

pub fn ease_in_out_cubic(t: f64) -> f64 {
    if t < 0.5 {
        4.0 * t * t * t
    } else {
        let f = 2.0 * t - 2.0;
        1.0 + f * f * f / 2.0
    }
}

fn lerp(start: f64, end: f64, t: f64) -> f64 {
    start + (end - start) * t
}
