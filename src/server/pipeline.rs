//! Frame -> landmarks -> normalized features -> classification, plus the
//! controller side effect of a confirmed navigation gesture.

use image::RgbImage;
use log::{error, info};

use crate::classifier::{FrameInput, GestureClassifier};
use crate::deck::{DeckStatus, SlideCommand, SlideController};
use crate::error::FrameError;
use crate::landmarks::{LandmarkSet, normalize};
use crate::provider::{LandmarkProvider, detect_hand};
use crate::session::{Analysis, Detection};

/// An analysed frame plus the decoded image, kept for the preview.
pub struct Analyzed {
    pub analysis: Analysis,
    pub image: Option<RgbImage>,
}

fn classify_hand(
    classifier: &GestureClassifier,
    landmarks: LandmarkSet,
    width: u32,
    height: u32,
    image: Option<&RgbImage>,
    previous: Option<&LandmarkSet>,
) -> Analysis {
    let normalized = normalize(&landmarks);
    let classification = classifier.classify(&FrameInput {
        landmarks: &landmarks,
        normalized: &normalized,
        previous,
        image,
    });
    Analysis {
        detection: Some(Detection {
            landmarks,
            width,
            height,
        }),
        classification,
    }
}

/// Landmarks supplied by the client; no image is involved.
pub fn analyze_landmarks(
    classifier: &GestureClassifier,
    landmarks: LandmarkSet,
    width: u32,
    height: u32,
    previous: Option<&LandmarkSet>,
) -> Analyzed {
    Analyzed {
        analysis: classify_hand(classifier, landmarks, width, height, None, previous),
        image: None,
    }
}

/// Encoded camera frame. CPU-bound; callers run it off the async workers.
pub fn analyze_image(
    provider: &dyn LandmarkProvider,
    classifier: &GestureClassifier,
    bytes: &[u8],
    min_len: usize,
    previous: Option<&LandmarkSet>,
) -> Result<Analyzed, FrameError> {
    let (image, hand) = detect_hand(provider, bytes, min_len)?;
    let analysis = match hand {
        Some(landmarks) => classify_hand(
            classifier,
            landmarks,
            image.width(),
            image.height(),
            Some(&image),
            previous,
        ),
        None => Analysis::no_hand(),
    };
    Ok(Analyzed {
        analysis,
        image: Some(image),
    })
}

/// Drives the controller once. Failures are logged, never surfaced to the
/// connection.
pub fn actuate(controller: &mut dyn SlideController, cmd: SlideCommand) -> Option<DeckStatus> {
    match controller.actuate(cmd) {
        Ok(status) => Some(status),
        Err(e) => {
            error!("slide {cmd:?} failed: {e:#}");
            None
        }
    }
}

/// Log line for a fired, non-navigation gesture.
pub fn log_fired(analysis: &Analysis) {
    let c = &analysis.classification;
    if !c.gesture.is_none() && c.gesture.slide_command().is_none() {
        info!("gesture {} ({:.2})", c.gesture, c.confidence);
    }
}
