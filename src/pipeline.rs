use anyhow::Result;
use image::{DynamicImage, RgbImage};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::detection::annotate;
use crate::detection::{PlateDetector, RecognitionFusionEngine, RegionSelector, SelectionMode};
use crate::models::{CorrectedPlate, Region};

/// One selected region and what the engines read in it.
#[derive(Debug, Clone, PartialEq)]
pub struct PlateReading {
    pub region: Region,
    pub plate: CorrectedPlate,
}

/// Result of running the pipeline over one frame.
pub struct FrameAnalysis {
    /// Readings in selection order (highest region confidence first).
    pub readings: Vec<PlateReading>,
    /// The frame with every selected region outlined.
    pub annotated: RgbImage,
}

impl FrameAnalysis {
    /// First reading with non-empty text.
    pub fn best(&self) -> Option<&PlateReading> {
        self.readings.iter().find(|r| !r.plate.is_empty())
    }
}

/// Debug configuration for pipeline execution
#[derive(Clone, Debug)]
pub struct DebugConfig {
    /// Root directory for debug outputs
    pub output_dir: PathBuf,
}

/// Frame-level composition of detection, region selection and recognition.
/// Shared read-only by the batch endpoint, the CLI and every stream session.
pub struct PlatePipeline {
    detector: Arc<dyn PlateDetector>,
    selector: RegionSelector,
    fusion: RecognitionFusionEngine,
    debug: Option<DebugConfig>,
    frames_seen: AtomicUsize,
}

impl PlatePipeline {
    pub fn new(
        detector: Arc<dyn PlateDetector>,
        selector: RegionSelector,
        fusion: RecognitionFusionEngine,
    ) -> Self {
        Self {
            detector,
            selector,
            fusion,
            debug: None,
            frames_seen: AtomicUsize::new(0),
        }
    }

    /// Enable debug mode with output directory
    /// The directory must be empty or non-existent
    pub fn with_debug(mut self, output_dir: PathBuf) -> Result<Self> {
        if output_dir.exists() {
            let entries = std::fs::read_dir(&output_dir)?;
            if entries.count() > 0 {
                return Err(anyhow::anyhow!(
                    "Debug directory is not empty: {}",
                    output_dir.display()
                ));
            }
        } else {
            std::fs::create_dir_all(&output_dir)?;
        }

        self.debug = Some(DebugConfig { output_dir });
        Ok(self)
    }

    pub fn fusion(&self) -> &RecognitionFusionEngine {
        &self.fusion
    }

    /// Detect, select, crop and recognize. Never fails: bad input gives an
    /// analysis with no readings.
    pub fn analyze(&self, image: &DynamicImage, mode: SelectionMode) -> FrameAnalysis {
        let frame_no = self.frames_seen.fetch_add(1, Ordering::Relaxed) + 1;
        let raw = self.detector.detect(image);
        let regions = self.selector.select(mode, &raw, image.width(), image.height());
        tracing::debug!(
            frame = frame_no,
            detected = raw.len(),
            selected = regions.len(),
            "Regions selected"
        );

        self.save_debug(frame_no, "input", 0, image);

        let mut readings = Vec::with_capacity(regions.len());
        for (idx, region) in regions.iter().enumerate() {
            let plate = match region.crop(image) {
                Some(crop) => {
                    self.save_debug(frame_no, "crop", idx + 1, &crop);
                    self.fusion.recognize(&crop)
                }
                None => CorrectedPlate::empty(),
            };
            readings.push(PlateReading {
                region: *region,
                plate,
            });
        }

        let boxes: Vec<_> = regions.iter().map(|r| r.bbox).collect();
        FrameAnalysis {
            readings,
            annotated: annotate::draw_regions(image, &boxes),
        }
    }

    /// Debug dumps are best effort; a failed write never fails the frame.
    fn save_debug(&self, frame_no: usize, kind: &str, idx: usize, image: &DynamicImage) {
        let Some(debug) = &self.debug else {
            return;
        };
        let dir = debug.output_dir.join(format!("{:04}", frame_no));
        let path = dir.join(format!("{:02}_{}.png", idx, kind));
        let saved = std::fs::create_dir_all(&dir)
            .map_err(anyhow::Error::from)
            .and_then(|_| image.save(&path).map_err(anyhow::Error::from));
        match saved {
            Ok(()) => tracing::debug!(path = %path.display(), "Debug image saved"),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to save debug image"),
        }
    }
}
