//! Per-session frame counters. Diagnostic only; nothing here feeds back into
//! classification.

use serde::Serialize;
use std::time::{Duration, Instant};

const FPS_WINDOW: Duration = Duration::from_secs(1);

/// Processed-frames-per-second over roughly one-second windows.
#[derive(Debug, Clone)]
pub struct FpsMeter {
    window_start: Option<Instant>,
    last_tick: Option<Instant>,
    count: u32,
    fps: f64,
}

impl Default for FpsMeter {
    fn default() -> Self {
        Self::new()
    }
}

impl FpsMeter {
    pub fn new() -> Self {
        Self {
            window_start: None,
            last_tick: None,
            count: 0,
            fps: 0.0,
        }
    }

    pub fn tick(&mut self, now: Instant) {
        let start = *self.window_start.get_or_insert(now);
        self.last_tick = Some(now);
        self.count += 1;
        let elapsed = now.saturating_duration_since(start);
        if elapsed >= FPS_WINDOW {
            self.fps = f64::from(self.count) / elapsed.as_secs_f64();
            self.count = 0;
            self.window_start = Some(now);
        }
    }

    /// Rate as of `now`; zero once a whole window passed without a tick.
    pub fn fps_at(&self, now: Instant) -> f64 {
        match self.last_tick {
            Some(last) if now.saturating_duration_since(last) < FPS_WINDOW => self.fps,
            _ => 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct FrameStats {
    pub received: u64,
    pub processed: u64,
    pub dropped: u64,
    pub fps: f64,
}

#[derive(Debug, Clone, Default)]
pub struct StatsTracker {
    meter: FpsMeter,
    stats: FrameStats,
}

impl StatsTracker {
    pub fn received(&mut self) {
        self.stats.received += 1;
    }

    pub fn dropped(&mut self) {
        self.stats.dropped += 1;
    }

    pub fn processed(&mut self, now: Instant) {
        self.stats.processed += 1;
        self.meter.tick(now);
    }

    pub fn snapshot(&self, now: Instant) -> FrameStats {
        FrameStats {
            fps: self.meter.fps_at(now),
            ..self.stats
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fps_settles_after_a_window() {
        let mut m = FpsMeter::new();
        let t0 = Instant::now();
        for i in 0..=15u64 {
            m.tick(t0 + Duration::from_millis(i * 1000 / 15));
        }
        let fps = m.fps_at(t0 + Duration::from_millis(1100));
        assert!((fps - 16.0).abs() < 0.5, "fps {fps}");
    }

    #[test]
    fn fps_drops_to_zero_after_a_silent_window() {
        let mut m = FpsMeter::new();
        let t0 = Instant::now();
        assert_eq!(m.fps_at(t0), 0.0);
        for i in 0..=30u64 {
            m.tick(t0 + Duration::from_millis(i * 1000 / 15));
        }
        let last = t0 + Duration::from_secs(2);
        assert!(m.fps_at(last + Duration::from_millis(500)) > 10.0);
        assert_eq!(m.fps_at(last + Duration::from_secs(1)), 0.0);
        assert_eq!(m.fps_at(last + Duration::from_secs(30)), 0.0);
    }

    #[test]
    fn counters_track_outcomes() {
        let mut s = StatsTracker::default();
        let t0 = Instant::now();
        s.received();
        s.processed(t0);
        s.received();
        s.dropped();
        let snap = s.snapshot(t0);
        assert_eq!((snap.received, snap.processed, snap.dropped), (2, 1, 1));
    }
}
