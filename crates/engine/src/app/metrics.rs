use std::time::{Duration, Instant};

/// One logging interval of loop activity. Message traffic is reported as
/// plain counts since a turn-based server sends in bursts.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoopMetricsSnapshot {
    pub fps: f32,
    pub frame_time_ms: f32,
    pub received: u32,
    /// Server messages the session refused; each one desynchronizes it.
    pub rejected: u32,
    pub sent: u32,
}

#[derive(Debug)]
pub(crate) struct MetricsAccumulator {
    interval_start: Instant,
    interval: Duration,
    frames: u32,
    frame_time_sum: Duration,
    traffic: Traffic,
}

#[derive(Debug, Default, Clone, Copy)]
struct Traffic {
    received: u32,
    rejected: u32,
    sent: u32,
}

impl MetricsAccumulator {
    pub(crate) fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval_start: now,
            interval,
            frames: 0,
            frame_time_sum: Duration::ZERO,
            traffic: Traffic::default(),
        }
    }

    pub(crate) fn record_frame(&mut self, frame_time: Duration) {
        self.frames = self.frames.saturating_add(1);
        self.frame_time_sum = self.frame_time_sum.saturating_add(frame_time);
    }

    pub(crate) fn record_received(&mut self, accepted: bool) {
        self.traffic.received = self.traffic.received.saturating_add(1);
        if !accepted {
            self.traffic.rejected = self.traffic.rejected.saturating_add(1);
        }
    }

    pub(crate) fn record_sent(&mut self, count: usize) {
        let count = u32::try_from(count).unwrap_or(u32::MAX);
        self.traffic.sent = self.traffic.sent.saturating_add(count);
    }

    /// Closes the interval once it has run its length. Intervals only close
    /// from the redraw path, so an idle window produces no snapshots.
    pub(crate) fn maybe_snapshot(&mut self, now: Instant) -> Option<LoopMetricsSnapshot> {
        let elapsed = now.saturating_duration_since(self.interval_start);
        if elapsed < self.interval {
            return None;
        }

        let frame_time_ms = match self.frames {
            0 => 0.0,
            frames => self.frame_time_sum.as_secs_f32() * 1000.0 / frames as f32,
        };
        let traffic = std::mem::take(&mut self.traffic);
        let snapshot = LoopMetricsSnapshot {
            fps: self.frames as f32 / elapsed.as_secs_f32().max(f32::EPSILON),
            frame_time_ms,
            received: traffic.received,
            rejected: traffic.rejected,
            sent: traffic.sent,
        };

        self.interval_start = now;
        self.frames = 0;
        self.frame_time_sum = Duration::ZERO;
        Some(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_counts_traffic_and_averages_frames() {
        let base = Instant::now();
        let mut accumulator = MetricsAccumulator::new(Duration::from_secs(1), base);

        accumulator.record_frame(Duration::from_millis(4));
        accumulator.record_frame(Duration::from_millis(6));
        accumulator.record_received(true);
        accumulator.record_received(false);
        accumulator.record_received(true);
        accumulator.record_sent(2);

        let snapshot = accumulator
            .maybe_snapshot(base + Duration::from_secs(1))
            .expect("snapshot should be emitted");

        assert!((snapshot.fps - 2.0).abs() < 0.05);
        assert!((snapshot.frame_time_ms - 5.0).abs() < 0.001);
        assert_eq!((snapshot.received, snapshot.rejected, snapshot.sent), (3, 1, 2));
    }

    #[test]
    fn snapshot_not_emitted_before_interval() {
        let base = Instant::now();
        let mut accumulator = MetricsAccumulator::new(Duration::from_secs(1), base);
        accumulator.record_frame(Duration::from_millis(16));

        assert!(accumulator
            .maybe_snapshot(base + Duration::from_millis(500))
            .is_none());
    }

    #[test]
    fn rejections_reset_with_the_interval() {
        let base = Instant::now();
        let mut accumulator = MetricsAccumulator::new(Duration::from_secs(1), base);
        accumulator.record_received(false);
        let first = accumulator
            .maybe_snapshot(base + Duration::from_secs(1))
            .expect("first interval");
        assert_eq!(first.rejected, 1);

        let next = accumulator
            .maybe_snapshot(base + Duration::from_secs(2))
            .expect("second interval");
        assert_eq!(next, LoopMetricsSnapshot::default());
    }
}
