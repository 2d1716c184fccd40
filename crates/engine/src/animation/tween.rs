use std::f32::consts::{PI, TAU};
use std::time::{Duration, Instant};

use crate::geometry::Vec2;

/// Elapsed fraction of `duration`, clamped to [0, 1]. Zero durations are
/// complete immediately.
pub fn progress(started_at: Instant, duration: Duration, now: Instant) -> f32 {
    if duration.is_zero() {
        return 1.0;
    }
    let elapsed = now.saturating_duration_since(started_at).as_secs_f32();
    (elapsed / duration.as_secs_f32()).clamp(0.0, 1.0)
}

/// Wraps an angle into (-PI, PI].
pub fn normalize_angle(angle: f32) -> f32 {
    if !angle.is_finite() {
        return 0.0;
    }
    let mut wrapped = angle % TAU;
    if wrapped <= -PI {
        wrapped += TAU;
    } else if wrapped > PI {
        wrapped -= TAU;
    }
    wrapped
}

/// Picks the representation of `end` reached from `start` along the shorter
/// arc. Both inputs must already be normalized; the result may lie outside
/// (-PI, PI].
pub fn shortest_arc_end(start: f32, end: f32) -> f32 {
    let mut clockwise = end - start;
    if clockwise < 0.0 {
        clockwise += TAU;
    }
    let mut counter_clockwise = start - end;
    if counter_clockwise < 0.0 {
        counter_clockwise += TAU;
    }

    if clockwise <= counter_clockwise {
        if end < start {
            end + TAU
        } else {
            end
        }
    } else if end > start {
        end - TAU
    } else {
        end
    }
}

/// Linear screen-space tween for one entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionTween {
    pub start: Vec2,
    pub end: Vec2,
    pub current: Vec2,
    pub started_at: Instant,
    pub duration: Duration,
}

impl PositionTween {
    pub fn new(start: Vec2, end: Vec2, now: Instant, duration: Duration) -> Self {
        Self {
            start,
            end,
            current: start,
            started_at: now,
            duration,
        }
    }

    pub fn sample(&self, now: Instant) -> Vec2 {
        let t = progress(self.started_at, self.duration, now);
        if t >= 1.0 {
            return self.end;
        }
        self.start.lerp(self.end, t)
    }

    /// Restarts toward `end` from wherever the tween is at `now`.
    pub fn retarget(&mut self, end: Vec2, now: Instant, duration: Duration) {
        let from = self.sample(now);
        *self = Self::new(from, end, now, duration);
    }

    /// Updates `current`; returns true once the tween has landed on `end`.
    pub fn advance(&mut self, now: Instant) -> bool {
        self.current = self.sample(now);
        progress(self.started_at, self.duration, now) >= 1.0
    }
}

/// Shortest-arc angle tween. `end` may be unwrapped; `target` is the
/// normalized angle the entity rests at afterwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationTween {
    pub start: f32,
    pub end: f32,
    pub target: f32,
    pub current: f32,
    pub started_at: Instant,
    pub duration: Duration,
}

impl RotationTween {
    pub fn new(from: f32, to: f32, now: Instant, duration: Duration) -> Self {
        let start = normalize_angle(from);
        let target = normalize_angle(to);
        Self {
            start,
            end: shortest_arc_end(start, target),
            target,
            current: start,
            started_at: now,
            duration,
        }
    }

    pub fn sample(&self, now: Instant) -> f32 {
        let t = progress(self.started_at, self.duration, now);
        if t >= 1.0 {
            return self.target;
        }
        self.start + (self.end - self.start) * t
    }

    pub fn advance(&mut self, now: Instant) -> bool {
        self.current = self.sample(now);
        progress(self.started_at, self.duration, now) >= 1.0
    }
}
