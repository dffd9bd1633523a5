//! Frame-rate admission and connection liveness timers.

use std::time::Duration;
use tokio::time::Instant;

/// Tolerance for frames that arrive a hair before their slot.
const JITTER: Duration = Duration::from_millis(1);

/// Admits at most one frame per interval, on a fixed schedule so a steady
/// source divides evenly (60 Hz against 15 Hz admits every fourth frame).
#[derive(Debug, Clone)]
pub struct FrameGate {
    interval: Duration,
    next_due: Option<Instant>,
}

impl FrameGate {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_due: None,
        }
    }

    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    pub fn admit(&mut self, now: Instant) -> bool {
        let base = match self.next_due {
            Some(due) if now + JITTER < due => return false,
            // keep the cadence unless we fell a whole interval behind
            Some(due) if now.saturating_duration_since(due) < self.interval => due,
            _ => now,
        };
        self.next_due = Some(base + self.interval);
        true
    }
}

/// What the housekeeping pass owes the client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Due {
    pub heartbeat: bool,
    pub stale_warning: bool,
}

/// Heartbeat cadence plus a one-shot staleness warning per silent stretch.
#[derive(Debug, Clone)]
pub struct Liveness {
    heartbeat: Duration,
    stale_after: Duration,
    last_frame: Instant,
    last_beat: Instant,
    warned: bool,
}

impl Liveness {
    pub fn new(now: Instant, heartbeat: Duration, stale_after: Duration) -> Self {
        Self {
            heartbeat,
            stale_after,
            last_frame: now,
            last_beat: now,
            warned: false,
        }
    }

    pub fn reconfigure(&mut self, heartbeat: Duration, stale_after: Duration) {
        self.heartbeat = heartbeat;
        self.stale_after = stale_after;
    }

    pub fn frame_seen(&mut self, now: Instant) {
        self.last_frame = now;
        self.warned = false;
    }

    pub fn silence(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_frame)
    }

    pub fn poll(&mut self, now: Instant) -> Due {
        let mut due = Due::default();
        if now.saturating_duration_since(self.last_beat) >= self.heartbeat {
            self.last_beat = now;
            due.heartbeat = true;
        }
        if !self.warned && self.silence(now) > self.stale_after {
            self.warned = true;
            due.stale_warning = true;
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn sixty_hz_against_fifteen_admits_one_in_four() {
        let mut gate = FrameGate::new(Duration::from_secs_f64(1.0 / 15.0));
        let frame = Duration::from_secs_f64(1.0 / 60.0);
        let t0 = Instant::now();
        let admitted: Vec<bool> = (0..120u32).map(|i| gate.admit(t0 + frame * i)).collect();

        assert_eq!(admitted.iter().filter(|a| **a).count(), 30);
        for chunk in admitted.chunks(4) {
            assert_eq!(chunk, &[true, false, false, false]);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn gate_recovers_after_a_pause() {
        let mut gate = FrameGate::new(Duration::from_millis(100));
        let t0 = Instant::now();
        assert!(gate.admit(t0));
        assert!(!gate.admit(t0 + Duration::from_millis(50)));
        // a long gap does not bank extra admissions
        assert!(gate.admit(t0 + Duration::from_secs(5)));
        assert!(!gate.admit(t0 + Duration::from_millis(5010)));
        assert!(gate.admit(t0 + Duration::from_millis(5100)));
    }

    #[tokio::test(start_paused = true)]
    async fn stale_warning_fires_once_per_silence() {
        let t0 = Instant::now();
        let mut live = Liveness::new(t0, Duration::from_secs(5), Duration::from_secs(10));

        let mut warnings = 0;
        let mut beats = 0;
        for s in 1..=30u64 {
            let due = live.poll(t0 + Duration::from_secs(s));
            warnings += due.stale_warning as u32;
            beats += due.heartbeat as u32;
        }
        assert_eq!(warnings, 1);
        assert_eq!(beats, 6);

        live.frame_seen(t0 + Duration::from_secs(31));
        assert!(!live.poll(t0 + Duration::from_secs(35)).stale_warning);
        assert!(live.poll(t0 + Duration::from_secs(42)).stale_warning);
    }
}
