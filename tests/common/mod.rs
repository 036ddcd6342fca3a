#![allow(dead_code)]

mod fixtures;
pub use fixtures::*;

use std::sync::Arc;
use std::time::Duration;

use roadeye::config::{CountrySetting, TrackingSettings};
use roadeye::core::db::{DetectionDb, NewDetection};
use roadeye::detection::{PlateDetector, PlatePreprocessor, RecognitionFusionEngine, Recognizer, RegionSelector};
use roadeye::models::Source;
use roadeye::pipeline::PlatePipeline;
use roadeye::stream::{FrameResponse, RecognitionPool, StreamOrchestrator};
use roadeye::tracking::PlateTracker;
use tokio::sync::mpsc;

/// Creates a DetectionDb backed by a file in a fresh temp directory.
/// Returns both the database and the temp directory (which must be kept alive).
pub async fn create_test_db() -> (DetectionDb, tempfile::TempDir) {
    let dir = tempfile::TempDir::new().expect("Failed to create temp directory");
    let db = DetectionDb::open(dir.path().join("detections.db"))
        .await
        .expect("Failed to open test database");
    (db, dir)
}

pub fn make_pipeline(detector: Arc<dyn PlateDetector>, engines: Vec<Arc<dyn Recognizer>>, country: &str) -> PlatePipeline {
    let fusion = RecognitionFusionEngine::new(
        engines,
        PlatePreprocessor::default(),
        Arc::new(CountrySetting::new(country)),
    );
    PlatePipeline::new(detector, RegionSelector::default(), fusion)
}

/// Everything one stream test needs.
pub struct StreamHarness {
    pub orchestrator: Arc<StreamOrchestrator>,
    pub tracker: Arc<PlateTracker>,
    pub db: DetectionDb,
    pub _dir: tempfile::TempDir,
}

pub async fn stream_harness(detector: Arc<dyn PlateDetector>, engine: Arc<dyn Recognizer>) -> StreamHarness {
    let (db, dir) = create_test_db().await;
    let pipeline = Arc::new(make_pipeline(detector, vec![engine], "IN"));
    let tracker = Arc::new(PlateTracker::new(&TrackingSettings::default()));
    let orchestrator = Arc::new(StreamOrchestrator::new(
        pipeline,
        tracker.clone(),
        db.clone(),
        RecognitionPool::new(2),
        0.2,
    ));
    StreamHarness {
        orchestrator,
        tracker,
        db,
        _dir: dir,
    }
}

pub fn outbound() -> (mpsc::Sender<FrameResponse>, mpsc::Receiver<FrameResponse>) {
    mpsc::channel(8)
}

/// Next response, failing the test after two seconds.
pub async fn next_response(rx: &mut mpsc::Receiver<FrameResponse>) -> FrameResponse {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("Timed out waiting for a frame response")
        .expect("Outbound channel closed")
}

/// Asserts nothing arrives within a short grace period.
pub async fn assert_no_response(rx: &mut mpsc::Receiver<FrameResponse>) {
    let got = tokio::time::timeout(Duration::from_millis(150), rx.recv()).await;
    assert!(got.is_err(), "Unexpected response: {:?}", got);
}

pub fn make_detection(plate: &str, source: Source) -> NewDetection {
    NewDetection::now(plate, 0.8, source)
}
