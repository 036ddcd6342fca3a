//! Per-connection streaming recognition.
//!
//! A [`StreamSession`] accepts parsed client messages and hands frames to a
//! single processing task through a one-slot `watch` channel. A frame that is
//! still waiting when a newer one arrives is replaced and counted as dropped,
//! so a slow pipeline never builds a backlog. Responses leave in frame order
//! through the bounded `outbound` channel given at session start.

pub mod protocol;
pub mod worker;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};

use image::DynamicImage;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::core::db::{DetectionDb, DetectionRepository, NewDetection};
use crate::detection::{SelectionMode, annotate};
use crate::models::{CorrectedPlate, Source};
use crate::pipeline::PlatePipeline;
use crate::tracking::PlateTracker;

pub use protocol::{FrameResponse, Inbound};
pub use worker::RecognitionPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// Recorded video played back by the client; frames carry video time.
    Video,
    /// Live camera.
    Live,
}

impl StreamKind {
    pub fn source(&self) -> Source {
        match self {
            StreamKind::Video => Source::Video,
            StreamKind::Live => Source::Live,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingMessage,
    Processing,
    Closed,
}

const STATE_AWAITING: u8 = 0;
const STATE_PROCESSING: u8 = 1;
const STATE_CLOSED: u8 = 2;

/// Counters for one session, reported when it closes.
#[derive(Debug, Default)]
pub struct SessionStats {
    pub received: AtomicU64,
    pub processed: AtomicU64,
    pub dropped: AtomicU64,
    pub skipped: AtomicU64,
    pub persisted: AtomicU64,
}

/// Everything the sessions share.
pub struct StreamOrchestrator {
    pipeline: Arc<PlatePipeline>,
    tracker: Arc<PlateTracker>,
    db: DetectionDb,
    pool: RecognitionPool,
    min_confidence: f32,
}

impl StreamOrchestrator {
    pub fn new(
        pipeline: Arc<PlatePipeline>,
        tracker: Arc<PlateTracker>,
        db: DetectionDb,
        pool: RecognitionPool,
        min_confidence: f32,
    ) -> Self {
        Self {
            pipeline,
            tracker,
            db,
            pool,
            min_confidence,
        }
    }

    /// Start a session. Responses are sent on `outbound`; the session ends
    /// when [`StreamSession::close`] is called or `outbound` is dropped.
    pub fn open_session(
        self: &Arc<Self>,
        kind: StreamKind,
        outbound: mpsc::Sender<FrameResponse>,
    ) -> StreamSession {
        let id = Uuid::new_v4();
        let (frames, latest) = watch::channel(None);
        let shared = Arc::new(SessionShared {
            id,
            kind,
            closed: AtomicBool::new(false),
            state: AtomicU8::new(STATE_AWAITING),
            stats: SessionStats::default(),
        });

        let processor = tokio::spawn(process_frames(self.clone(), shared.clone(), latest, outbound));
        tracing::info!(session = %id, kind = ?kind, "Stream session opened");

        StreamSession {
            shared,
            frames,
            processor: Some(processor),
            last_timestamp: None,
            next_seq: 0,
        }
    }
}

struct PendingFrame {
    seq: u64,
    bytes: Vec<u8>,
    timestamp: f64,
}

struct SessionShared {
    id: Uuid,
    kind: StreamKind,
    closed: AtomicBool,
    state: AtomicU8,
    stats: SessionStats,
}

impl SessionShared {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn set_state(&self, state: u8) {
        // Closed is terminal.
        let _ = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| {
                (s != STATE_CLOSED).then_some(state)
            });
    }
}

/// Handle for one connected client.
pub struct StreamSession {
    shared: Arc<SessionShared>,
    frames: watch::Sender<Option<Arc<PendingFrame>>>,
    processor: Option<JoinHandle<()>>,
    last_timestamp: Option<f64>,
    next_seq: u64,
}

impl StreamSession {
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn kind(&self) -> StreamKind {
        self.shared.kind
    }

    pub fn state(&self) -> SessionState {
        match self.shared.state.load(Ordering::Acquire) {
            STATE_PROCESSING => SessionState::Processing,
            STATE_CLOSED => SessionState::Closed,
            _ => SessionState::AwaitingMessage,
        }
    }

    pub fn stats(&self) -> &SessionStats {
        &self.shared.stats
    }

    /// Last timestamp the client reported, from a control message or a frame header.
    pub fn last_timestamp(&self) -> Option<f64> {
        self.last_timestamp
    }

    /// Feed one client message. Never blocks on recognition.
    pub fn handle(&mut self, message: Inbound) {
        if self.shared.is_closed() {
            return;
        }
        match message {
            Inbound::Ping => {
                tracing::trace!(session = %self.shared.id, "Ping");
            }
            Inbound::FrameMeta { timestamp } => {
                self.last_timestamp = Some(timestamp);
            }
            Inbound::Frame { bytes, timestamp } => {
                if timestamp.is_some() {
                    self.last_timestamp = timestamp;
                }
                self.next_seq += 1;
                self.shared.stats.received.fetch_add(1, Ordering::Relaxed);
                let frame = PendingFrame {
                    seq: self.next_seq,
                    bytes,
                    timestamp: self.last_timestamp.unwrap_or(0.0),
                };
                // Replaces any frame the processor has not picked up yet.
                self.frames.send_replace(Some(Arc::new(frame)));
            }
            Inbound::Invalid(reason) => {
                self.shared.stats.skipped.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(session = %self.shared.id, reason = %reason, "Ignoring client message");
            }
        }
    }

    /// Stop the session. A frame already in recognition finishes, but its
    /// result is neither persisted nor sent.
    pub async fn close(mut self) {
        self.shared.closed.store(true, Ordering::Release);
        self.shared.state.store(STATE_CLOSED, Ordering::Release);
        let processor = self.processor.take();
        drop(self.frames);
        if let Some(processor) = processor {
            if let Err(e) = processor.await {
                tracing::warn!(session = %self.shared.id, error = %e, "Stream processor ended abnormally");
            }
        }
        let stats = &self.shared.stats;
        tracing::info!(
            session = %self.shared.id,
            received = stats.received.load(Ordering::Relaxed),
            processed = stats.processed.load(Ordering::Relaxed),
            dropped = stats.dropped.load(Ordering::Relaxed),
            skipped = stats.skipped.load(Ordering::Relaxed),
            persisted = stats.persisted.load(Ordering::Relaxed),
            "Stream session closed"
        );
    }
}

/// What the pool hands back for one frame.
struct RecognizedFrame {
    annotated_jpeg: String,
    plate: CorrectedPlate,
}

fn recognize_frame(pipeline: &PlatePipeline, bytes: &[u8]) -> anyhow::Result<RecognizedFrame> {
    let image: DynamicImage = image::load_from_memory(bytes)?;
    let analysis = pipeline.analyze(&image, SelectionMode::BestOnly);
    let plate = analysis
        .best()
        .map(|r| r.plate.clone())
        .unwrap_or_else(CorrectedPlate::empty);
    let jpeg = annotate::encode_jpeg(&analysis.annotated)?;
    Ok(RecognizedFrame {
        annotated_jpeg: annotate::encode_base64(&jpeg),
        plate,
    })
}

async fn process_frames(
    orchestrator: Arc<StreamOrchestrator>,
    session: Arc<SessionShared>,
    mut latest: watch::Receiver<Option<Arc<PendingFrame>>>,
    outbound: mpsc::Sender<FrameResponse>,
) {
    let mut last_seq = 0u64;

    while latest.changed().await.is_ok() {
        if session.is_closed() {
            break;
        }
        let pending = latest.borrow_and_update().clone();
        let Some(frame) = pending else {
            continue;
        };
        if frame.seq > last_seq + 1 {
            session
                .stats
                .dropped
                .fetch_add(frame.seq - last_seq - 1, Ordering::Relaxed);
        }
        last_seq = frame.seq;

        session.set_state(STATE_PROCESSING);
        let pipeline = orchestrator.pipeline.clone();
        let job_frame = frame.clone();
        let result = orchestrator
            .pool
            .run(move || recognize_frame(&pipeline, &job_frame.bytes))
            .await;
        session.set_state(STATE_AWAITING);

        if session.is_closed() {
            tracing::debug!(session = %session.id, seq = frame.seq, "Discarding result for closed session");
            break;
        }

        let recognized = match result {
            Ok(Ok(recognized)) => recognized,
            Ok(Err(e)) => {
                session.stats.skipped.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(session = %session.id, seq = frame.seq, error = %e, "Skipping undecodable frame");
                continue;
            }
            Err(e) => {
                session.stats.skipped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(session = %session.id, seq = frame.seq, error = %e, "Frame processing failed");
                continue;
            }
        };

        let response = orchestrator.settle(&session, &frame, recognized).await;
        session.stats.processed.fetch_add(1, Ordering::Relaxed);

        if outbound.send(response).await.is_err() {
            tracing::debug!(session = %session.id, "Outbound channel closed");
            break;
        }
    }
}

impl StreamOrchestrator {
    /// Apply the confidence floor, stabilization, dedup and persistence to
    /// one recognized frame and build the reply.
    async fn settle(
        &self,
        session: &SessionShared,
        frame: &PendingFrame,
        recognized: RecognizedFrame,
    ) -> FrameResponse {
        let RecognizedFrame {
            annotated_jpeg,
            plate,
        } = recognized;

        if plate.is_empty() || plate.confidence < self.min_confidence {
            return FrameResponse {
                frame: annotated_jpeg,
                plate: None,
                confidence: plate.confidence,
                timestamp: frame.timestamp,
            };
        }

        let decision = self.tracker.observe(&plate.text);
        if decision.persist {
            let video_timestamp = match session.kind {
                StreamKind::Video => Some(frame.timestamp),
                StreamKind::Live => None,
            };
            let new = NewDetection::now(&plate.text, plate.confidence, session.kind.source())
                .with_video_timestamp(video_timestamp);
            match self.db.insert_detection(&new).await {
                Ok(record) => {
                    session.stats.persisted.fetch_add(1, Ordering::Relaxed);
                    tracing::info!(
                        session = %session.id,
                        id = record.id,
                        plate = %record.plate_number,
                        confidence = record.confidence,
                        source = record.source.as_str(),
                        "Detection persisted"
                    );
                }
                Err(e) => {
                    self.tracker.release(&plate.text, &decision);
                    tracing::warn!(session = %session.id, plate = %plate.text, error = %e, "Failed to persist detection");
                }
            }
        } else {
            tracing::debug!(
                session = %session.id,
                plate = %plate.text,
                confirmed = decision.confirmed,
                "Plate observed"
            );
        }

        FrameResponse {
            frame: annotated_jpeg,
            plate: Some(plate.text),
            confidence: plate.confidence,
            timestamp: frame.timestamp,
        }
    }
}
