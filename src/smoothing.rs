//! Debounce stages between the classifier and the session state machine.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::config::Smoothing;
use crate::gestures::{Classification, Gesture};

/// Coerces anything below the threshold to `no_gesture`.
#[derive(Debug, Clone, Copy)]
pub struct ConfidenceGate {
    threshold: f32,
}

impl ConfidenceGate {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn apply(&self, c: Classification) -> Classification {
        // NaN confidence is gated as well
        if !(c.confidence >= self.threshold) {
            return Classification::none();
        }
        c
    }
}

/// N-of-M vote over the last `window` gated labels.
#[derive(Debug, Clone)]
pub struct MajorityFilter {
    window: usize,
    min_votes: usize,
    history: VecDeque<Gesture>,
}

impl MajorityFilter {
    pub fn new(window: usize, min_votes: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            min_votes: min_votes.clamp(1, window),
            history: VecDeque::with_capacity(window),
        }
    }

    /// 1-of-1 never holds anything back.
    pub fn is_passthrough(&self) -> bool {
        self.min_votes <= 1
    }

    pub fn observe(&mut self, g: &Gesture) {
        if self.history.len() == self.window {
            self.history.pop_front();
        }
        self.history.push_back(g.clone());
    }

    pub fn confirmed(&self, g: &Gesture) -> bool {
        self.history.iter().filter(|h| *h == g).count() >= self.min_votes
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }
}

/// Minimum spacing between two actuated navigation commands.
#[derive(Debug, Clone)]
pub struct NavCooldown {
    period: Duration,
    last: Option<Instant>,
}

impl NavCooldown {
    pub fn new(period: Duration) -> Self {
        Self { period, last: None }
    }

    pub fn ready(&self, now: Instant) -> bool {
        match self.last {
            Some(t) if !self.period.is_zero() => now.saturating_duration_since(t) >= self.period,
            _ => true,
        }
    }

    pub fn mark(&mut self, now: Instant) {
        self.last = Some(now);
    }
}

/// Why a navigation gesture was reported but not actuated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hold {
    Annotation,
    Filter,
    Cooldown,
}

/// All navigation debounce state for one session.
#[derive(Debug, Clone)]
pub struct Stabilizer {
    gate: ConfidenceGate,
    filter: MajorityFilter,
    cooldown: NavCooldown,
}

impl Stabilizer {
    pub fn new(confidence: f32, s: &Smoothing) -> Self {
        Self {
            gate: ConfidenceGate::new(confidence),
            filter: MajorityFilter::new(s.window, s.min_votes),
            cooldown: NavCooldown::new(Duration::from_millis(s.nav_cooldown_ms)),
        }
    }

    /// Gate one raw verdict and record it in the vote history.
    pub fn admit(&mut self, c: Classification) -> Classification {
        let gated = self.gate.apply(c);
        self.filter.observe(&gated.gesture);
        gated
    }

    /// Decide whether an admitted navigation gesture may actuate now.
    pub fn release(&mut self, g: &Gesture, now: Instant) -> Result<(), Hold> {
        if !self.filter.confirmed(g) {
            return Err(Hold::Filter);
        }
        if !self.cooldown.ready(now) {
            return Err(Hold::Cooldown);
        }
        self.cooldown.mark(now);
        if !self.filter.is_passthrough() {
            // one confirmed run actuates once
            self.filter.clear();
        }
        Ok(())
    }
}
