pub mod config;
pub mod core;
pub mod detection;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod stream;
pub mod tracking;
pub mod web;

pub use config::{CountrySetting, Settings};
pub use crate::core::db::{DetectionDb, DetectionRecord, DetectionRepository, NewDetection};
pub use detection::{PlateDetector, RecognitionFusionEngine, Recognizer, RegionSelector, SelectionMode};
pub use models::{BoundingBox, CorrectedPlate, RecognitionHypothesis, Region, Source};
pub use pipeline::{FrameAnalysis, PlatePipeline, PlateReading};
pub use stream::{StreamKind, StreamOrchestrator, StreamSession};
pub use tracking::PlateTracker;
