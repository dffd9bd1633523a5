//! Geometric gesture rules over finger extension and palm direction.
//!
//! Extension is a y-axis test in normalized space, so it assumes an upright
//! hand. Palm direction and the motion rules (zoom, rotate) run on the raw
//! frame-relative landmarks.

use crate::gestures::{Classification, Gesture};
use crate::landmarks::{
    INDEX_MCP, INDEX_TIP, LandmarkSet, MIDDLE_MCP, MIDDLE_TIP, NormalizedLandmarks, PINKY_MCP,
    PINKY_TIP, RING_MCP, RING_TIP, THUMB_MCP, THUMB_TIP, WRIST,
};

const DISTANCE_EPS: f32 = 1e-6;

#[derive(Debug, Clone)]
pub struct RuleConfig {
    pub distance: f32,
    pub rotation_deg: f32,
    /// Label for the all-fingers-extended pose.
    pub open_hand: Gesture,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            distance: 0.1,
            rotation_deg: 45.0,
            open_hand: Gesture::Pointer,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Fingers {
    pub thumb: bool,
    pub index: bool,
    pub middle: bool,
    pub ring: bool,
    pub pinky: bool,
}

impl Fingers {
    pub fn as_array(&self) -> [bool; 5] {
        [self.thumb, self.index, self.middle, self.ring, self.pinky]
    }
}

const FINGER_JOINTS: [(usize, usize); 5] = [
    (THUMB_TIP, THUMB_MCP),
    (INDEX_TIP, INDEX_MCP),
    (MIDDLE_TIP, MIDDLE_MCP),
    (RING_TIP, RING_MCP),
    (PINKY_TIP, PINKY_MCP),
];

/// A finger is extended when its tip sits above its base by more than
/// `threshold` (y grows downward).
pub fn finger_extension(n: &NormalizedLandmarks, threshold: f32) -> Fingers {
    let ext = FINGER_JOINTS.map(|(tip, base)| n.point(base).y - n.point(tip).y > threshold);
    Fingers {
        thumb: ext[0],
        index: ext[1],
        middle: ext[2],
        ring: ext[3],
        pinky: ext[4],
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PalmDirection {
    pub up: bool,
    pub left: bool,
    pub right: bool,
}

/// Direction of the wrist -> middle-finger-base vector.
pub fn palm_direction(raw: &LandmarkSet, threshold: f32) -> PalmDirection {
    let v = raw.point(MIDDLE_MCP).sub(raw.point(WRIST));
    PalmDirection {
        up: v.y < -threshold,
        left: v.x < -threshold,
        right: v.x > threshold,
    }
}

/// Signed rotation in degrees of the middle-tip -> wrist vector between two
/// frames, wrapped to (-180, 180].
pub fn hand_rotation_deg(previous: &LandmarkSet, current: &LandmarkSet) -> f32 {
    let angle = |s: &LandmarkSet| {
        let v = s.point(WRIST).sub(s.point(MIDDLE_TIP));
        v.y.atan2(v.x)
    };
    let mut deg = (angle(current) - angle(previous)).to_degrees();
    while deg > 180.0 {
        deg -= 360.0;
    }
    while deg <= -180.0 {
        deg += 360.0;
    }
    deg
}

#[derive(Debug, Clone, Default)]
pub struct RuleClassifier {
    cfg: RuleConfig,
}

impl RuleClassifier {
    pub fn new(cfg: RuleConfig) -> Self {
        Self { cfg }
    }

    /// Priority-ordered rules; the first match wins.
    pub fn classify(
        &self,
        raw: &LandmarkSet,
        normalized: &NormalizedLandmarks,
        previous: Option<&LandmarkSet>,
    ) -> Classification {
        let t = self.cfg.distance;
        let f = finger_extension(normalized, t);

        match f.as_array() {
            [false, true, false, false, false] => {
                return Classification::new(Gesture::NextSlide, 0.95);
            }
            [false, false, false, false, true] => {
                return Classification::new(Gesture::PreviousSlide, 0.95);
            }
            [true, false, false, false, false] => {
                return Classification::new(Gesture::Erase, 0.9);
            }
            [false, true, true, false, false] => {
                return if normalized.distance(INDEX_TIP, MIDDLE_TIP) < t {
                    Classification::new(Gesture::Shape, 0.9)
                } else {
                    Classification::new(Gesture::Draw, 0.9)
                };
            }
            [true, true, true, true, true] => {
                return Classification::new(self.cfg.open_hand.clone(), 0.95);
            }
            [false, false, false, false, false] => {
                return Classification::new(Gesture::Stop, 0.95);
            }
            _ => {}
        }

        let Some(prev) = previous else {
            return Classification::none();
        };

        if f.thumb && f.index {
            let now = raw.distance(THUMB_TIP, INDEX_TIP);
            let before = prev.distance(THUMB_TIP, INDEX_TIP);
            let delta = now - before;
            if delta.abs() > t {
                let g = if delta > 0.0 {
                    Gesture::ZoomIn
                } else {
                    Gesture::ZoomOut
                };
                let c = Classification::new(g, 0.85);
                return if before > DISTANCE_EPS {
                    c.with_meta("scale", now / before)
                } else {
                    c
                };
            }
        }

        let palm = palm_direction(raw, t);
        if palm.up {
            let rot = hand_rotation_deg(prev, raw);
            if rot.abs() > self.cfg.rotation_deg {
                let g = if rot > 0.0 { Gesture::Undo } else { Gesture::Redo };
                return Classification::new(g, 0.85).with_meta("rotation", rot);
            }
        }

        if f.index && f.middle {
            if palm.left {
                return Classification::new(Gesture::FirstSlide, 0.88);
            }
            if palm.right {
                return Classification::new(Gesture::LastSlide, 0.88);
            }
        }

        Classification::none()
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::hand;
    use super::*;
    use crate::landmarks::{Point3, normalize};

    fn classify(rc: &RuleClassifier, cur: &LandmarkSet, prev: Option<&LandmarkSet>) -> Classification {
        rc.classify(cur, &normalize(cur), prev)
    }

    #[test]
    fn extension_follows_fixture() {
        let set = hand([true, false, true, false, true]);
        let f = finger_extension(&normalize(&set), 0.1);
        assert_eq!(f.as_array(), [true, false, true, false, true]);
    }

    #[test]
    fn single_finger_patterns() {
        let rc = RuleClassifier::default();
        let c = classify(&rc, &hand([false, true, false, false, false]), None);
        assert_eq!((c.gesture, c.confidence), (Gesture::NextSlide, 0.95));
        let c = classify(&rc, &hand([false, false, false, false, true]), None);
        assert_eq!((c.gesture, c.confidence), (Gesture::PreviousSlide, 0.95));
        let c = classify(&rc, &hand([true, false, false, false, false]), None);
        assert_eq!((c.gesture, c.confidence), (Gesture::Erase, 0.9));
    }

    #[test]
    fn two_fingers_draw_or_shape() {
        let rc = RuleClassifier::default();
        let open = hand([false, true, true, false, false]);
        assert_eq!(classify(&rc, &open, None).gesture, Gesture::Draw);

        let mut pinched = open;
        pinched.set_point(MIDDLE_TIP, Point3::new(0.45, 0.35, 0.0));
        let c = classify(&rc, &pinched, None);
        assert_eq!((c.gesture, c.confidence), (Gesture::Shape, 0.9));
    }

    #[test]
    fn full_hand_and_fist() {
        let rc = RuleClassifier::default();
        let c = classify(&rc, &hand([true; 5]), None);
        assert_eq!((c.gesture, c.confidence), (Gesture::Pointer, 0.95));
        let c = classify(&rc, &hand([false; 5]), None);
        assert_eq!((c.gesture, c.confidence), (Gesture::Stop, 0.95));
    }

    #[test]
    fn open_hand_label_is_configurable() {
        let rc = RuleClassifier::new(RuleConfig {
            open_hand: Gesture::OpenHand,
            ..RuleConfig::default()
        });
        assert_eq!(classify(&rc, &hand([true; 5]), None).gesture, Gesture::OpenHand);
    }

    #[test]
    fn same_frame_twice_is_stable() {
        let rc = RuleClassifier::default();
        for ext in [
            [false, true, false, false, false],
            [true, true, false, false, false],
            [false, true, true, true, false],
        ] {
            let set = hand(ext);
            assert_eq!(classify(&rc, &set, None), classify(&rc, &set, None));
        }
    }

    #[test]
    fn thumb_index_spread_zooms_in() {
        let rc = RuleClassifier::default();
        let mut prev = hand([true, true, false, false, false]);
        prev.set_point(THUMB_TIP, Point3::new(0.40, 0.35, 0.0));
        prev.set_point(INDEX_TIP, Point3::new(0.45, 0.35, 0.0));
        let mut cur = prev;
        cur.set_point(THUMB_TIP, Point3::new(0.30, 0.35, 0.0));
        cur.set_point(INDEX_TIP, Point3::new(0.50, 0.35, 0.0));

        let c = classify(&rc, &cur, Some(&prev));
        assert_eq!((c.gesture.clone(), c.confidence), (Gesture::ZoomIn, 0.85));
        let scale = c.metadata["scale"];
        assert!((scale - 4.0).abs() < 1e-3, "scale {scale}");

        let c = classify(&rc, &prev, Some(&cur));
        assert_eq!(c.gesture, Gesture::ZoomOut);
    }

    #[test]
    fn zoom_needs_previous_frame() {
        let rc = RuleClassifier::default();
        let c = classify(&rc, &hand([true, true, false, false, false]), None);
        assert_eq!((c.gesture, c.confidence), (Gesture::NoGesture, 0.0));
    }

    #[test]
    fn palm_up_rotation_undo_and_redo() {
        let rc = RuleClassifier::default();
        let prev = hand([false, true, true, true, false]);
        assert!(palm_direction(&prev, 0.1).up);

        let mut ccw = prev;
        ccw.set_point(MIDDLE_TIP, Point3::new(0.95, 0.45, 0.0));
        let c = classify(&rc, &ccw, Some(&prev));
        assert_eq!((c.gesture, c.confidence), (Gesture::Undo, 0.85));

        let mut cw = prev;
        cw.set_point(MIDDLE_TIP, Point3::new(0.05, 0.45, 0.0));
        assert_eq!(classify(&rc, &cw, Some(&prev)).gesture, Gesture::Redo);

        // small wobble is ignored
        let mut wobble = prev;
        wobble.set_point(MIDDLE_TIP, Point3::new(0.55, 0.35, 0.0));
        assert_eq!(classify(&rc, &wobble, Some(&prev)).gesture, Gesture::NoGesture);
    }

    #[test]
    fn sideways_palm_jumps_to_first_or_last() {
        let rc = RuleClassifier::default();
        let mut left = hand([true, true, true, false, false]);
        left.set_point(MIDDLE_MCP, Point3::new(0.3, 0.75, 0.0));
        assert!(palm_direction(&left, 0.1).left);
        let c = classify(&rc, &left, Some(&left));
        assert_eq!((c.gesture, c.confidence), (Gesture::FirstSlide, 0.88));

        let mut right = left;
        right.set_point(MIDDLE_MCP, Point3::new(0.7, 0.75, 0.0));
        assert_eq!(classify(&rc, &right, Some(&right)).gesture, Gesture::LastSlide);
    }

    #[test]
    fn rotation_wraps_across_the_branch_cut() {
        let mut a = hand([false; 5]);
        a.set_point(WRIST, Point3::new(0.5, 0.5, 0.0));
        a.set_point(MIDDLE_TIP, Point3::new(0.6, 0.501, 0.0));
        let mut b = a;
        b.set_point(MIDDLE_TIP, Point3::new(0.6, 0.499, 0.0));
        assert!(hand_rotation_deg(&a, &b).abs() < 2.0);
    }
}
