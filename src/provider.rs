//! Frame decoding and the hand-landmark detector seam.

use anyhow::Result;
use image::RgbImage;

use crate::error::FrameError;
use crate::landmarks::LandmarkSet;

/// Finds at most one hand in a decoded frame. Shared by every session, so
/// implementations must be safe to call concurrently.
pub trait LandmarkProvider: Send + Sync {
    fn name(&self) -> &str;
    fn detect(&self, frame: &RgbImage) -> Result<Option<LandmarkSet>>;
}

/// Detector used when none is configured: never sees a hand.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHandProvider;

impl LandmarkProvider for NoHandProvider {
    fn name(&self) -> &str {
        "none"
    }

    fn detect(&self, _frame: &RgbImage) -> Result<Option<LandmarkSet>> {
        Ok(None)
    }
}

/// Decode one encoded camera frame (JPEG or PNG).
pub fn decode_frame(bytes: &[u8], min_len: usize) -> Result<RgbImage, FrameError> {
    if bytes.len() < min_len {
        return Err(FrameError::TooSmall {
            len: bytes.len(),
            min: min_len,
        });
    }
    let img = image::load_from_memory(bytes)?;
    Ok(img.to_rgb8())
}

/// Decode and run the detector, folding detector failures into [`FrameError`].
pub fn detect_hand(
    provider: &dyn LandmarkProvider,
    bytes: &[u8],
    min_len: usize,
) -> Result<(RgbImage, Option<LandmarkSet>), FrameError> {
    let frame = decode_frame(bytes, min_len)?;
    let hand = provider
        .detect(&frame)
        .map_err(|e| FrameError::Provider(format!("{}: {e:#}", provider.name())))?;
    Ok((frame, hand))
}


#[cfg(test)]
mod tests {
    use super::fixtures::png_frame;
    use super::*;
    use anyhow::anyhow;

    struct Failing;

    impl LandmarkProvider for Failing {
        fn name(&self) -> &str {
            "failing"
        }
        fn detect(&self, _frame: &RgbImage) -> Result<Option<LandmarkSet>> {
            Err(anyhow!("detector crashed"))
        }
    }

    #[test]
    fn short_payload_is_rejected_before_decoding() {
        let err = decode_frame(&[0u8; 10], 1000).unwrap_err();
        assert!(matches!(err, FrameError::TooSmall { len: 10, min: 1000 }));
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let err = decode_frame(&[7u8; 2000], 1000).unwrap_err();
        assert!(matches!(err, FrameError::Decode(_)));
    }

    #[test]
    fn png_decodes_and_reports_no_hand() {
        let bytes = png_frame(64, 48);
        assert!(bytes.len() >= 1000, "fixture too small: {}", bytes.len());
        let (img, hand) = detect_hand(&NoHandProvider, &bytes, 1000).unwrap();
        assert_eq!(img.dimensions(), (64, 48));
        assert!(hand.is_none());
    }

    #[test]
    fn provider_failure_is_a_frame_error() {
        let bytes = png_frame(64, 48);
        let err = detect_hand(&Failing, &bytes, 0).unwrap_err();
        assert!(matches!(err, FrameError::Provider(_)));
    }
}
