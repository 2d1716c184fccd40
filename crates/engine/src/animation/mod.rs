//! Turns discrete state changes into interpolated motion.

mod effects;
mod frame_loop;
mod tween;

use std::collections::HashMap;
use std::f32::consts::FRAC_PI_2;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::debug;

use crate::geometry::Vec2;

pub use effects::{
    fade_opacity, shot_scale, track_positions, EffectQueue, ShotEffect, Timestamped, TrackMark,
};
pub use frame_loop::{FrameLoop, LoopState};
pub use tween::{normalize_angle, progress, shortest_arc_end, PositionTween, RotationTween};

/// Turrets with no recorded angle point up.
pub const DEFAULT_TURRET_ANGLE: f32 = -FRAC_PI_2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AnimationTuning {
    pub own_move_ms: u64,
    pub other_move_ms: u64,
    pub rotation_ms: u64,
    pub track_lifetime_ms: u64,
    pub shot_lifetime_ms: u64,
}

impl Default for AnimationTuning {
    fn default() -> Self {
        Self {
            own_move_ms: 800,
            other_move_ms: 600,
            rotation_ms: 300,
            track_lifetime_ms: 5_000,
            shot_lifetime_ms: 1_000,
        }
    }
}

impl AnimationTuning {
    pub fn move_duration(&self, is_viewer: bool) -> Duration {
        Duration::from_millis(if is_viewer {
            self.own_move_ms
        } else {
            self.other_move_ms
        })
    }

    pub fn rotation_duration(&self) -> Duration {
        Duration::from_millis(self.rotation_ms)
    }
}

/// Per-entity position and turret tweens plus transient effects, advanced
/// together by one self-stopping frame loop.
#[derive(Debug)]
pub struct AnimationScheduler {
    tuning: AnimationTuning,
    moves: HashMap<String, PositionTween>,
    rotations: HashMap<String, RotationTween>,
    resting_angles: HashMap<String, f32>,
    tracks: EffectQueue<TrackMark>,
    shots: EffectQueue<ShotEffect>,
    frame_loop: FrameLoop,
}

impl AnimationScheduler {
    pub fn new(tuning: AnimationTuning) -> Self {
        Self {
            tuning,
            moves: HashMap::new(),
            rotations: HashMap::new(),
            resting_angles: HashMap::new(),
            tracks: EffectQueue::new(Duration::from_millis(tuning.track_lifetime_ms)),
            shots: EffectQueue::new(Duration::from_millis(tuning.shot_lifetime_ms)),
            frame_loop: FrameLoop::default(),
        }
    }

    pub fn tuning(&self) -> &AnimationTuning {
        &self.tuning
    }

    pub fn frame_loop(&self) -> &FrameLoop {
        &self.frame_loop
    }

    /// Starts or retargets `entity`'s position tween. An in-flight tween is
    /// continued from its interpolated point at `now`, never from its old
    /// start or end. Returns true when this started the frame loop.
    pub fn start_move(
        &mut self,
        entity: &str,
        from: Vec2,
        to: Vec2,
        duration: Duration,
        now: Instant,
    ) -> bool {
        match self.moves.get_mut(entity) {
            Some(tween) => {
                tween.retarget(to, now, duration);
                debug!(entity, "move_retargeted");
            }
            None => {
                self.moves
                    .insert(entity.to_string(), PositionTween::new(from, to, now, duration));
            }
        }
        self.frame_loop.request()
    }

    /// Rotates `entity`'s turret toward `target` along the shorter arc,
    /// starting from its current visual angle.
    pub fn start_rotation(&mut self, entity: &str, target: f32, now: Instant) -> bool {
        let from = self.angle_at(entity, now);
        self.rotations.insert(
            entity.to_string(),
            RotationTween::new(from, target, now, self.tuning.rotation_duration()),
        );
        self.frame_loop.request()
    }

    pub fn spawn_tracks(&mut self, from: Vec2, to: Vec2, cell_size: f32, now: Instant) -> bool {
        let angle = (to.y - from.y).atan2(to.x - from.x);
        for position in track_positions(from, to, cell_size) {
            self.tracks.push(TrackMark {
                position,
                angle,
                created_at: now,
            });
        }
        self.frame_loop.request()
    }

    pub fn spawn_shot(&mut self, at: Vec2, direction: f32, now: Instant) -> bool {
        self.shots.push(ShotEffect {
            position: at,
            direction,
            created_at: now,
        });
        self.frame_loop.request()
    }

    /// Drops `entity`'s position tween without snapping anywhere.
    pub fn abandon_move(&mut self, entity: &str) -> bool {
        self.moves.remove(entity).is_some()
    }

    /// Drops every tween and effect. Resting turret angles survive.
    pub fn clear(&mut self) {
        self.moves.clear();
        self.rotations.clear();
        self.tracks.clear();
        self.shots.clear();
    }

    /// Advances every tween and effect to `now` and settles the frame loop.
    pub fn update(&mut self, now: Instant) -> LoopState {
        let resting_angles = &mut self.resting_angles;
        self.rotations.retain(|entity, tween| {
            if tween.advance(now) {
                resting_angles.insert(entity.clone(), tween.target);
                false
            } else {
                true
            }
        });
        self.moves.retain(|_, tween| !tween.advance(now));
        self.tracks.expire(now);
        self.shots.expire(now);

        let state = self.frame_loop.settle(self.has_work());
        if state == LoopState::Stopped {
            debug!("frame_loop_stopped");
        }
        state
    }

    pub fn has_work(&self) -> bool {
        !self.moves.is_empty()
            || !self.rotations.is_empty()
            || !self.tracks.is_empty()
            || !self.shots.is_empty()
    }

    pub fn move_of(&self, entity: &str) -> Option<&PositionTween> {
        self.moves.get(entity)
    }

    pub fn rotation_of(&self, entity: &str) -> Option<&RotationTween> {
        self.rotations.get(entity)
    }

    /// Animated top-left position, while a move is in flight.
    pub fn position_of(&self, entity: &str) -> Option<Vec2> {
        self.moves.get(entity).map(|tween| tween.current)
    }

    /// Turret angle as of the last update.
    pub fn angle_of(&self, entity: &str) -> f32 {
        match self.rotations.get(entity) {
            Some(tween) => tween.current,
            None => self.resting_angle(entity),
        }
    }

    /// Turret angle sampled at `now`, for retargeting mid-rotation.
    pub fn angle_at(&self, entity: &str, now: Instant) -> f32 {
        match self.rotations.get(entity) {
            Some(tween) => tween.sample(now),
            None => self.resting_angle(entity),
        }
    }

    pub fn resting_angle(&self, entity: &str) -> f32 {
        self.resting_angles
            .get(entity)
            .copied()
            .unwrap_or(DEFAULT_TURRET_ANGLE)
    }

    pub fn tracks(&self) -> &EffectQueue<TrackMark> {
        &self.tracks
    }

    pub fn shots(&self) -> &EffectQueue<ShotEffect> {
        &self.shots
    }
}
