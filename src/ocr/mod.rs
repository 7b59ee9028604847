//! Text recognition for nickname regions.
//!
//! This module provides:
//! - The `Recognizer` capability and its `RecognitionCandidate` output
//! - A Tesseract-backed recognizer (`engine`), one instance per language set
//! - Preprocessing for small light-on-dark nickname text (`preprocess`)
//! - Perceptual content hashing used to detect a player change (`content_hash`)

pub mod engine;
pub mod extract;
pub mod preprocess;
pub mod setup;

pub use engine::TesseractRecognizer;

use anyhow::Result;
use image::{DynamicImage, RgbaImage};
use image_hasher::{HashAlg, HasherConfig};

/// One text reading produced by a recognizer.
#[derive(Clone, Debug, PartialEq)]
pub struct RecognitionCandidate {
    pub text: String,
    /// 0.0 to 1.0
    pub confidence: f32,
}

impl RecognitionCandidate {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
        }
    }
}

/// A recognition strategy.
///
/// Returning an empty list means "no text found"; `Err` is reserved for
/// genuine engine failures.
pub trait Recognizer: Send + Sync {
    /// Short name used in log lines.
    fn name(&self) -> &str;

    fn recognize(&self, img: &RgbaImage) -> Result<Vec<RecognitionCandidate>>;
}

/// Perceptual hash of a captured region, as base64.
///
/// Cheap compared to recognition; used to tell whether the player shown in a
/// region changed since the last resolution.
pub fn content_hash(img: &RgbaImage) -> String {
    let hasher = HasherConfig::new()
        .hash_alg(HashAlg::DoubleGradient)
        .hash_size(8, 8)
        .to_hasher();

    let hash = hasher.hash_image(&DynamicImage::ImageRgba8(img.clone()));
    hash.to_base64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgba};

    fn horizontal_gradient() -> RgbaImage {
        ImageBuffer::from_fn(64, 32, |x, _| {
            let v = (x * 4) as u8;
            Rgba([v, v, v, 255])
        })
    }

    fn vertical_gradient() -> RgbaImage {
        ImageBuffer::from_fn(64, 32, |_, y| {
            let v = (y * 8) as u8;
            Rgba([v, v, v, 255])
        })
    }

    #[test]
    fn test_content_hash_is_stable() {
        assert_eq!(
            content_hash(&horizontal_gradient()),
            content_hash(&horizontal_gradient())
        );
    }

    #[test]
    fn test_content_hash_detects_different_content() {
        assert_ne!(
            content_hash(&horizontal_gradient()),
            content_hash(&vertical_gradient())
        );
    }
}
