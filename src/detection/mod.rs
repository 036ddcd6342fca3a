pub mod annotate;
pub mod contours;
pub mod fusion;
pub mod ocr;
pub mod preprocessing;
pub mod regions;
pub mod syntax;

use image::DynamicImage;

use crate::models::Region;

pub use contours::ContourPlateDetector;
pub use fusion::RecognitionFusionEngine;
pub use ocr::{EngineOutcome, OcrsRecognizer, Recognizer};
pub use preprocessing::PlatePreprocessor;
pub use regions::{RegionSelector, SelectionMode};

#[cfg(feature = "tesseract")]
pub use ocr::TesseractRecognizer;

/// Proposes plate locations in a frame. Must be side-effect free and return
/// an empty list when nothing is found.
pub trait PlateDetector: Send + Sync {
    fn detect(&self, image: &DynamicImage) -> Vec<Region>;
}
