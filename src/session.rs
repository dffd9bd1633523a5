//! Per-connection interaction state machine.
//!
//! A [`Session`] consumes one [`Analysis`] per admitted frame and turns it
//! into the outbound [`GestureEvent`] plus, at most, one slide command for
//! the presentation controller.

use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;

use crate::config::Profile;
use crate::deck::SlideCommand;
use crate::gestures::{Classification, Gesture};
use crate::landmarks::{INDEX_TIP, LandmarkSet};
use crate::smoothing::{Hold, Stabilizer};
use crate::stats::{FrameStats, StatsTracker};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Presentation,
    Annotation,
}

/// One hand found in one frame.
#[derive(Debug, Clone, Copy)]
pub struct Detection {
    pub landmarks: LandmarkSet,
    pub width: u32,
    pub height: u32,
}

/// Classifier output for one admitted frame. `detection` is `None` when no
/// hand was found; the classification is then ignored.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub detection: Option<Detection>,
    pub classification: Classification,
}

impl Analysis {
    pub fn no_hand() -> Self {
        Self {
            detection: None,
            classification: Classification::none(),
        }
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Outbound record for one processed frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GestureEvent {
    pub gesture: Gesture,
    pub confidence: f32,
    pub fps: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<[i32; 2]>,
    /// Present only on the frame that changed the mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<Mode>,
    pub current_mode: Mode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viz_frame: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, f32>,
    /// A navigation gesture that was reported but not actuated.
    #[serde(skip_serializing_if = "is_false")]
    pub suppressed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub event: GestureEvent,
    pub command: Option<SlideCommand>,
}

pub struct Session {
    mode: Mode,
    mode_changed: bool,
    previous: Option<LandmarkSet>,
    stabilizer: Stabilizer,
    stats: StatsTracker,
}

impl Session {
    pub fn new(stabilizer: Stabilizer) -> Self {
        Self {
            mode: Mode::default(),
            mode_changed: false,
            previous: None,
            stabilizer,
            stats: StatsTracker::default(),
        }
    }

    pub fn from_profile(p: &Profile) -> Self {
        Self::new(Stabilizer::new(p.thresholds.confidence, &p.smoothing))
    }

    /// Applies a reloaded profile. Mode and previous landmarks survive.
    pub fn reconfigure(&mut self, p: &Profile) {
        self.stabilizer = Stabilizer::new(p.thresholds.confidence, &p.smoothing);
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Landmarks of the last frame that had a hand.
    pub fn previous(&self) -> Option<&LandmarkSet> {
        self.previous.as_ref()
    }

    pub fn stats(&self, now: Instant) -> FrameStats {
        self.stats.snapshot(now)
    }

    pub fn frame_received(&mut self) {
        self.stats.received();
    }

    pub fn frame_dropped(&mut self) {
        self.stats.dropped();
    }

    /// External mode change; reported on the next event.
    pub fn set_mode(&mut self, mode: Mode) -> bool {
        if self.mode == mode {
            return false;
        }
        self.mode = mode;
        self.mode_changed = true;
        true
    }

    pub fn apply(&mut self, now: Instant, analysis: Analysis) -> Outcome {
        let Analysis {
            detection,
            classification,
        } = analysis;

        let raw = match detection {
            Some(_) => classification,
            None => Classification::none(),
        };
        let c = self.stabilizer.admit(raw);

        if let Some(d) = &detection {
            self.previous = Some(d.landmarks);
        }

        let mut coordinates = None;
        if c.gesture.wants_coordinates() {
            if let Some(d) = &detection {
                coordinates = Some(d.landmarks.to_pixels(INDEX_TIP, d.width, d.height));
                let target = if c.gesture == Gesture::Draw {
                    Mode::Annotation
                } else {
                    Mode::Presentation
                };
                self.set_mode(target);
            }
        }

        let mut command = None;
        let mut hold = None;
        if let Some(cmd) = c.gesture.slide_command() {
            if self.mode == Mode::Annotation {
                hold = Some(Hold::Annotation);
            } else {
                match self.stabilizer.release(&c.gesture, now) {
                    Ok(()) => command = Some(cmd),
                    Err(h) => hold = Some(h),
                }
            }
            if let Some(h) = hold {
                debug!("{} held back ({h:?})", c.gesture);
            }
        }

        self.stats.processed(now);
        let mode = std::mem::take(&mut self.mode_changed).then_some(self.mode);

        Outcome {
            event: GestureEvent {
                gesture: c.gesture,
                confidence: c.confidence,
                fps: self.stats.snapshot(now).fps,
                coordinates,
                mode,
                current_mode: self.mode,
                viz_frame: None,
                metadata: c.metadata,
                suppressed: hold.is_some(),
            },
            command,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::rules::fixtures::hand;
    use crate::config::Smoothing;

    fn session() -> Session {
        Session::new(Stabilizer::new(
            0.7,
            &Smoothing {
                window: 1,
                min_votes: 1,
                nav_cooldown_ms: 0,
            },
        ))
    }

    fn seen(gesture: Gesture, confidence: f32) -> Analysis {
        Analysis {
            detection: Some(Detection {
                landmarks: hand([false, true, true, false, false]),
                width: 640,
                height: 480,
            }),
            classification: Classification::new(gesture, confidence),
        }
    }

    #[test]
    fn empty_frames_report_no_gesture() {
        let mut s = session();
        let now = Instant::now();
        for _ in 0..10 {
            let out = s.apply(now, Analysis::no_hand());
            assert_eq!(out.event.gesture, Gesture::NoGesture);
            assert_eq!(out.event.confidence, 0.0);
            assert_eq!(out.event.mode, None);
            assert_eq!(out.event.current_mode, Mode::Presentation);
            assert!(out.command.is_none());
        }
        assert_eq!(s.stats(now).processed, 10);
    }

    #[test]
    fn next_slide_actuates_in_presentation() {
        let mut s = session();
        let out = s.apply(Instant::now(), seen(Gesture::NextSlide, 0.95));
        assert_eq!(out.command, Some(SlideCommand::Next));
        assert!(!out.event.suppressed);
    }

    #[test]
    fn draw_enters_annotation_once() {
        let mut s = session();
        let now = Instant::now();
        let first = s.apply(now, seen(Gesture::Draw, 0.9));
        assert_eq!(first.event.mode, Some(Mode::Annotation));
        let tip = hand([false, true, true, false, false]).to_pixels(INDEX_TIP, 640, 480);
        assert_eq!(first.event.coordinates, Some(tip));
        assert_eq!(tip[0], 281);
        for _ in 0..5 {
            let again = s.apply(now, seen(Gesture::Draw, 0.9));
            assert_eq!(again.event.mode, None);
            assert_eq!(again.event.current_mode, Mode::Annotation);
        }
        let back = s.apply(now, seen(Gesture::Pointer, 0.95));
        assert_eq!(back.event.mode, Some(Mode::Presentation));
        let redraw = s.apply(now, seen(Gesture::Draw, 0.9));
        assert_eq!(redraw.event.mode, Some(Mode::Annotation));
    }

    #[test]
    fn navigation_is_suppressed_while_annotating() {
        let mut s = session();
        let now = Instant::now();
        s.apply(now, seen(Gesture::Draw, 0.9));
        let out = s.apply(now, seen(Gesture::NextSlide, 0.95));
        assert_eq!(out.event.gesture, Gesture::NextSlide);
        assert!(out.event.suppressed);
        assert!(out.command.is_none());
    }

    #[test]
    fn low_confidence_never_reaches_the_controller() {
        let mut s = session();
        let out = s.apply(Instant::now(), seen(Gesture::NextSlide, 0.5));
        assert_eq!(out.event.gesture, Gesture::NoGesture);
        assert_eq!(out.event.confidence, 0.0);
        assert!(out.command.is_none());
    }

    #[test]
    fn previous_landmarks_survive_empty_frames() {
        let mut s = session();
        let now = Instant::now();
        s.apply(now, seen(Gesture::NoGesture, 0.0));
        let kept = *s.previous().unwrap();
        s.apply(now, Analysis::no_hand());
        assert_eq!(s.previous(), Some(&kept));
    }

    #[test]
    fn external_mode_change_is_reported_once() {
        let mut s = session();
        let now = Instant::now();
        assert!(s.set_mode(Mode::Annotation));
        assert!(!s.set_mode(Mode::Annotation));
        let out = s.apply(now, Analysis::no_hand());
        assert_eq!(out.event.mode, Some(Mode::Annotation));
        let out = s.apply(now, Analysis::no_hand());
        assert_eq!(out.event.mode, None);
    }

    #[test]
    fn event_serializes_optional_fields_sparingly() {
        let mut s = session();
        let out = s.apply(Instant::now(), Analysis::no_hand());
        let v = serde_json::to_value(&out.event).unwrap();
        assert_eq!(v["gesture"], "no_gesture");
        assert_eq!(v["current_mode"], "presentation");
        assert!(v.get("mode").is_none());
        assert!(v.get("coordinates").is_none());
        assert!(v.get("viz_frame").is_none());
        assert!(v.get("suppressed").is_none());
    }
}
