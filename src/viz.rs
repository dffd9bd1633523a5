//! Annotated preview frames sent back alongside fired gestures.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::codecs::jpeg::JpegEncoder;
use image::{ImageError, Rgb, RgbImage};

use crate::landmarks::{LANDMARK_COUNT, LandmarkSet};

const JPEG_QUALITY: u8 = 70;
const JOINT: Rgb<u8> = Rgb([0, 255, 0]);
const BONE: Rgb<u8> = Rgb([255, 255, 255]);

/// Hand skeleton as landmark index pairs.
const BONES: [(usize, usize); 21] = [
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 4),
    (0, 5),
    (5, 6),
    (6, 7),
    (7, 8),
    (5, 9),
    (9, 10),
    (10, 11),
    (11, 12),
    (9, 13),
    (13, 14),
    (14, 15),
    (15, 16),
    (13, 17),
    (17, 18),
    (18, 19),
    (19, 20),
    (0, 17),
];

fn put(img: &mut RgbImage, x: i64, y: i64, c: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < img.width() && (y as u32) < img.height() {
        img.put_pixel(x as u32, y as u32, c);
    }
}

fn line(img: &mut RgbImage, a: [i32; 2], b: [i32; 2], c: Rgb<u8>) {
    let (dx, dy) = ((b[0] - a[0]) as i64, (b[1] - a[1]) as i64);
    let steps = dx.abs().max(dy.abs()).max(1);
    for s in 0..=steps {
        let x = a[0] as i64 + dx * s / steps;
        let y = a[1] as i64 + dy * s / steps;
        put(img, x, y, c);
    }
}

/// Draws the skeleton onto `img` in place.
pub fn draw_landmarks(img: &mut RgbImage, hand: &LandmarkSet) {
    let (w, h) = img.dimensions();
    let px: Vec<[i32; 2]> = (0..LANDMARK_COUNT).map(|i| hand.to_pixels(i, w, h)).collect();
    for (a, b) in BONES {
        line(img, px[a], px[b], BONE);
    }
    for p in &px {
        for oy in -2..=2 {
            for ox in -2..=2 {
                put(img, p[0] as i64 + ox, p[1] as i64 + oy, JOINT);
            }
        }
    }
}

pub fn encode_jpeg_base64(img: &RgbImage) -> Result<String, ImageError> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY).encode_image(img)?;
    Ok(STANDARD.encode(buf))
}

/// Copy of the frame with the hand drawn on it, ready for `viz_frame`.
pub fn render(frame: &RgbImage, hand: Option<&LandmarkSet>) -> Result<String, ImageError> {
    let mut img = frame.clone();
    if let Some(h) = hand {
        draw_landmarks(&mut img, h);
    }
    encode_jpeg_base64(&img)
}
