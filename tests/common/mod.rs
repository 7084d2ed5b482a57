//! # Test Helper Library
//!
//! Synthetic page builders and scripted recognition engines shared by the
//! integration tests. Nothing here needs the native Tesseract library.

#![allow(dead_code)]

use doc_quality::ocr_errors::RecognitionError;
use doc_quality::raster::Raster;
use doc_quality::recognition::{Recognition, RecognitionEngine, WordBox};
use image::{GrayImage, Luma};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A white page with dark horizontal text bars.
pub fn text_page(width: u32, height: u32) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        let in_margin = x < 20 || x >= width.saturating_sub(20) || y < 20;
        if !in_margin && (y - 20) % 24 < 6 && y < height.saturating_sub(20) {
            Luma([20])
        } else {
            Luma([235])
        }
    })
}

/// `image` with additive Gaussian noise of standard deviation `sigma`.
///
/// Seeded so every run sees the same pixels.
pub fn with_gaussian_noise(image: &GrayImage, sigma: f64, seed: u64) -> GrayImage {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut noisy = image.clone();
    for pixel in noisy.pixels_mut() {
        // Box-Muller transform
        let u1: f64 = rng.random::<f64>().max(f64::MIN_POSITIVE);
        let u2: f64 = rng.random::<f64>();
        let gaussian = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        let value = pixel[0] as f64 + gaussian * sigma;
        pixel[0] = value.round().clamp(0.0, 255.0) as u8;
    }
    noisy
}

/// One scripted engine reply.
#[derive(Debug, Clone)]
pub enum Reply {
    Text { text: String, confidence: Option<f32> },
    Fail,
}

impl Reply {
    pub fn text(text: &str, confidence: f32) -> Self {
        Reply::Text {
            text: text.to_string(),
            confidence: Some(confidence),
        }
    }

    pub fn without_confidence(text: &str) -> Self {
        Reply::Text {
            text: text.to_string(),
            confidence: None,
        }
    }
}

/// Returns scripted replies in call order, repeating the last one.
pub struct ScriptedEngine {
    replies: Vec<Reply>,
    words: Vec<WordBox>,
    calls: Mutex<usize>,
}

impl ScriptedEngine {
    pub fn new(replies: Vec<Reply>) -> Self {
        assert!(!replies.is_empty(), "script needs at least one reply");
        Self {
            replies,
            words: Vec::new(),
            calls: Mutex::new(0),
        }
    }

    pub fn with_words(mut self, words: Vec<WordBox>) -> Self {
        self.words = words;
        self
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock()
    }
}

impl RecognitionEngine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    fn recognize(&self, _raster: &Raster, _language: &str) -> Result<Recognition, RecognitionError> {
        let mut calls = self.calls.lock();
        let reply = self.replies[(*calls).min(self.replies.len() - 1)].clone();
        *calls += 1;
        match reply {
            Reply::Text { text, confidence } => Ok(Recognition { text, confidence }),
            Reply::Fail => Err(RecognitionError::Timeout("scripted failure".to_string())),
        }
    }

    fn word_boxes(&self, _raster: &Raster, _language: &str) -> Result<Vec<WordBox>, RecognitionError> {
        Ok(self.words.clone())
    }
}

/// Reads the page width back as text, so concurrent pages stay traceable.
pub struct WidthEchoEngine;

impl RecognitionEngine for WidthEchoEngine {
    fn name(&self) -> &str {
        "width-echo"
    }

    fn recognize(&self, raster: &Raster, _language: &str) -> Result<Recognition, RecognitionError> {
        Ok(Recognition {
            text: format!("Página de ancho {}.", raster.width()),
            confidence: Some(95.0),
        })
    }
}

/// A word box on a numbered line, 18px high.
pub fn word(line: u32, left: u32, width: u32, text: &str) -> WordBox {
    WordBox {
        block: 1,
        paragraph: 1,
        line,
        left,
        top: line * 24,
        width,
        height: 18,
        confidence: 90.0,
        text: text.to_string(),
    }
}
