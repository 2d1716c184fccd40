use std::collections::VecDeque;
use std::f32::consts::PI;
use std::time::{Duration, Instant};

use crate::geometry::Vec2;

use super::tween::progress;

pub trait Timestamped {
    fn created_at(&self) -> Instant;
}

/// Fading tread mark left along a move path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackMark {
    pub position: Vec2,
    pub angle: f32,
    pub created_at: Instant,
}

impl Timestamped for TrackMark {
    fn created_at(&self) -> Instant {
        self.created_at
    }
}

/// Short-lived burst at a shot origin or a damaged tank.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShotEffect {
    pub position: Vec2,
    pub direction: f32,
    pub created_at: Instant,
}

impl Timestamped for ShotEffect {
    fn created_at(&self) -> Instant {
        self.created_at
    }
}

/// Effects with one shared lifetime, oldest first.
///
/// Items must be pushed in creation order so expiry only ever pops from
/// the front.
#[derive(Debug, Clone)]
pub struct EffectQueue<T> {
    lifetime: Duration,
    items: VecDeque<T>,
}

impl<T: Timestamped> EffectQueue<T> {
    pub fn new(lifetime: Duration) -> Self {
        Self {
            lifetime,
            items: VecDeque::new(),
        }
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    pub fn push(&mut self, item: T) {
        self.items.push_back(item);
    }

    /// Drops every item whose age reached the lifetime; returns how many.
    pub fn expire(&mut self, now: Instant) -> usize {
        let mut dropped = 0;
        while let Some(front) = self.items.front() {
            if now.saturating_duration_since(front.created_at()) < self.lifetime {
                break;
            }
            self.items.pop_front();
            dropped += 1;
        }
        dropped
    }

    /// Age as a fraction of the lifetime.
    pub fn age_fraction(&self, item: &T, now: Instant) -> f32 {
        progress(item.created_at(), self.lifetime, now)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

pub fn fade_opacity(age_fraction: f32) -> f32 {
    (1.0 - age_fraction).clamp(0.0, 1.0)
}

/// Burst grows then shrinks over its life.
pub fn shot_scale(age_fraction: f32) -> f32 {
    (age_fraction.clamp(0.0, 1.0) * PI).sin() * 0.5
}

/// Evenly spaced marks from `from` to `to`, both ends included, roughly one
/// every half cell.
pub fn track_positions(from: Vec2, to: Vec2, cell_size: f32) -> Vec<Vec2> {
    let spacing = (cell_size * 0.5).max(f32::EPSILON);
    let segments = ((from.distance(to) / spacing).floor() as usize).max(1);
    (0..=segments)
        .map(|index| from.lerp(to, index as f32 / segments as f32))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expire_pops_only_aged_out_items_from_front() {
        let t0 = Instant::now();
        let mut queue = EffectQueue::new(Duration::from_millis(1000));
        for offset in [0, 200, 900] {
            queue.push(ShotEffect {
                position: Vec2::ZERO,
                direction: 0.0,
                created_at: t0 + Duration::from_millis(offset),
            });
        }

        assert_eq!(queue.expire(t0 + Duration::from_millis(999)), 0);
        assert_eq!(queue.expire(t0 + Duration::from_millis(1000)), 1);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.expire(t0 + Duration::from_millis(5000)), 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn opacity_and_scale_follow_age() {
        assert!((fade_opacity(0.0) - 1.0).abs() < 1e-6);
        assert!((fade_opacity(0.25) - 0.75).abs() < 1e-6);
        assert_eq!(fade_opacity(2.0), 0.0);
        assert!(shot_scale(0.0).abs() < 1e-6);
        assert!((shot_scale(0.5) - 0.5).abs() < 1e-6);
        assert!(shot_scale(1.0).abs() < 1e-6);
    }

    #[test]
    fn track_positions_cover_path_every_half_cell() {
        let marks = track_positions(Vec2::new(0.0, 0.0), Vec2::new(100.0, 0.0), 50.0);
        assert_eq!(marks.len(), 5);
        assert_eq!(marks[0], Vec2::new(0.0, 0.0));
        assert_eq!(marks[4], Vec2::new(100.0, 0.0));
        assert!((marks[2].x - 50.0).abs() < 1e-4);

        let short = track_positions(Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), 50.0);
        assert_eq!(short.len(), 2);
    }
}
