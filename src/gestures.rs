use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

use crate::deck::SlideCommand;

/// Gesture labels. Back-ends may emit labels outside the known set; those
/// are carried through as [`Gesture::Other`] and never actuate anything.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Gesture {
    NextSlide,
    PreviousSlide,
    FirstSlide,
    LastSlide,
    Stop,
    Pointer,
    Draw,
    Erase,
    Highlight,
    Shape,
    ZoomIn,
    ZoomOut,
    Undo,
    Redo,
    Save,
    OpenHand,
    NoGesture,
    Other(String),
}

impl Gesture {
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "next_slide" | "next" => Self::NextSlide,
            "previous_slide" | "prev_slide" | "previous" => Self::PreviousSlide,
            "first_slide" => Self::FirstSlide,
            "last_slide" => Self::LastSlide,
            "stop" => Self::Stop,
            "pointer" => Self::Pointer,
            "draw" => Self::Draw,
            "erase" => Self::Erase,
            "highlight" => Self::Highlight,
            "shape" => Self::Shape,
            "zoom_in" => Self::ZoomIn,
            "zoom_out" => Self::ZoomOut,
            "undo" => Self::Undo,
            "redo" => Self::Redo,
            "save" => Self::Save,
            "open_hand" => Self::OpenHand,
            "no_gesture" | "none" | "" => Self::NoGesture,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::NextSlide => "next_slide",
            Self::PreviousSlide => "previous_slide",
            Self::FirstSlide => "first_slide",
            Self::LastSlide => "last_slide",
            Self::Stop => "stop",
            Self::Pointer => "pointer",
            Self::Draw => "draw",
            Self::Erase => "erase",
            Self::Highlight => "highlight",
            Self::Shape => "shape",
            Self::ZoomIn => "zoom_in",
            Self::ZoomOut => "zoom_out",
            Self::Undo => "undo",
            Self::Redo => "redo",
            Self::Save => "save",
            Self::OpenHand => "open_hand",
            Self::NoGesture => "no_gesture",
            Self::Other(s) => s.as_str(),
        }
    }

    /// Navigation gestures drive the presentation controller.
    pub fn slide_command(&self) -> Option<SlideCommand> {
        match self {
            Self::NextSlide => Some(SlideCommand::Next),
            Self::PreviousSlide => Some(SlideCommand::Previous),
            Self::FirstSlide => Some(SlideCommand::First),
            Self::LastSlide => Some(SlideCommand::Last),
            Self::Stop => Some(SlideCommand::Stop),
            _ => None,
        }
    }

    /// Gestures that carry the index-fingertip position.
    pub fn wants_coordinates(&self) -> bool {
        matches!(self, Self::Draw | Self::Pointer)
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::NoGesture)
    }
}

impl fmt::Display for Gesture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Gesture {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Gesture {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        Ok(Gesture::from_label(&s))
    }
}

/// One classifier verdict for one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub gesture: Gesture,
    pub confidence: f32,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, f32>,
}

impl Classification {
    pub fn new(gesture: Gesture, confidence: f32) -> Self {
        Self {
            gesture,
            confidence: confidence.clamp(0.0, 1.0),
            metadata: BTreeMap::new(),
        }
    }

    pub fn none() -> Self {
        Self::new(Gesture::NoGesture, 0.0)
    }

    pub fn with_meta(mut self, key: &str, value: f32) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_round_trip_through_names() {
        for g in [
            Gesture::NextSlide,
            Gesture::PreviousSlide,
            Gesture::FirstSlide,
            Gesture::LastSlide,
            Gesture::Stop,
            Gesture::Pointer,
            Gesture::Draw,
            Gesture::Erase,
            Gesture::Highlight,
            Gesture::ZoomIn,
            Gesture::ZoomOut,
            Gesture::Undo,
            Gesture::Redo,
            Gesture::Save,
            Gesture::NoGesture,
        ] {
            assert_eq!(Gesture::from_label(g.as_str()), g);
        }
    }

    #[test]
    fn aliases_and_unknown_labels() {
        assert_eq!(Gesture::from_label("prev_slide"), Gesture::PreviousSlide);
        assert_eq!(Gesture::from_label("none"), Gesture::NoGesture);
        assert_eq!(
            Gesture::from_label("thumbs_up"),
            Gesture::Other("thumbs_up".into())
        );
        assert_eq!(Gesture::Other("thumbs_up".into()).slide_command(), None);
    }

    #[test]
    fn serializes_as_plain_label() {
        let c = Classification::new(Gesture::ZoomIn, 0.85).with_meta("scale", 4.0);
        let v = serde_json::to_value(&c).unwrap();
        assert_eq!(v["gesture"], "zoom_in");
        assert_eq!(v["metadata"]["scale"], 4.0);
        let none = serde_json::to_value(Classification::none()).unwrap();
        assert!(none.get("metadata").is_none());
    }
}
