use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use image::{DynamicImage, ImageBuffer, Rgb};
use roadeye::detection::{EngineOutcome, PlateDetector, Recognizer};
use roadeye::models::{BoundingBox, RecognitionHypothesis, Region};

pub const FRAME_WIDTH: u32 = 160;
pub const FRAME_HEIGHT: u32 = 80;

/// Region every fake detection reports.
pub fn plate_region(confidence: f32) -> Region {
    Region::new(BoundingBox::new(20, 20, 140, 50), confidence)
}

/// Detector that reports the same regions for every frame.
pub struct FixedDetector {
    pub regions: Vec<Region>,
}

impl FixedDetector {
    pub fn single(confidence: f32) -> Arc<Self> {
        Arc::new(Self {
            regions: vec![plate_region(confidence)],
        })
    }
}

impl PlateDetector for FixedDetector {
    fn detect(&self, _image: &DynamicImage) -> Vec<Region> {
        self.regions.clone()
    }
}

/// Recognizer returning one scripted reading, optionally after a delay.
pub struct ScriptedRecognizer {
    pub text: String,
    pub confidence: f32,
    pub delay: Duration,
}

impl ScriptedRecognizer {
    pub fn reading(text: &str, confidence: f32) -> Arc<Self> {
        Arc::new(Self {
            text: text.to_string(),
            confidence,
            delay: Duration::ZERO,
        })
    }

    pub fn slow(text: &str, confidence: f32, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            text: text.to_string(),
            confidence,
            delay,
        })
    }
}

impl Recognizer for ScriptedRecognizer {
    fn name(&self) -> &str {
        "scripted"
    }

    fn read(&self, _image: &DynamicImage) -> EngineOutcome {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        EngineOutcome::Hypotheses(vec![RecognitionHypothesis {
            text: self.text.clone(),
            confidence: self.confidence,
            engine_id: self.name().to_string(),
        }])
    }
}

/// Recognizer that always fails, standing in for an engine with missing models.
pub struct BrokenRecognizer;

impl Recognizer for BrokenRecognizer {
    fn name(&self) -> &str {
        "broken"
    }

    fn read(&self, _image: &DynamicImage) -> EngineOutcome {
        EngineOutcome::Failed("model not loaded".to_string())
    }
}

/// A plain grey frame, JPEG encoded.
pub fn frame_jpeg() -> Vec<u8> {
    let img = ImageBuffer::from_fn(FRAME_WIDTH, FRAME_HEIGHT, |x, _| Rgb([(x % 255) as u8, 120u8, 120u8]));
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Jpeg)
        .expect("Failed to encode test frame");
    bytes
}

/// Binary stream frame carrying a `{"timestamp":..}` header line.
pub fn frame_with_timestamp(timestamp: f64) -> Vec<u8> {
    let mut data = format!("{{\"timestamp\":{}}}\n", timestamp).into_bytes();
    data.extend_from_slice(&frame_jpeg());
    data
}

/// Dark frame with a bright plate-shaped panel carrying dark glyph blocks.
pub fn synthetic_plate_image() -> DynamicImage {
    let mut img = ImageBuffer::from_pixel(320, 200, Rgb([20u8, 20u8, 20u8]));
    for y in 80..120 {
        for x in 80..240 {
            img.put_pixel(x, y, Rgb([230, 230, 230]));
        }
    }
    for i in 0..8 {
        let x0 = 90 + i * 18;
        for y in 88..112 {
            for x in x0..x0 + 8 {
                img.put_pixel(x, y, Rgb([10, 10, 10]));
            }
        }
    }
    DynamicImage::ImageRgb8(img)
}
