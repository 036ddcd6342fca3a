use std::path::{Path as FsPath, PathBuf};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Multipart, Path, State};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use time::OffsetDateTime;
use time::macros::format_description;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::{AppState, IMAGES_DIR};
use crate::core::db::{DetectionRecord, DetectionRepository, NewDetection};
use crate::detection::{SelectionMode, annotate, syntax};
use crate::error::{ApiError, ApiResult};
use crate::models::Source;
use crate::pipeline::{PlatePipeline, PlateReading};
use crate::stream::{FrameResponse, StreamKind, protocol};

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        // Detection
        .route("/detect/image", post(detect_image))
        // Streams
        .route("/ws/video", get(ws_video))
        .route("/ws/live", get(ws_live))
        // History
        .route("/history/", get(list_history))
        .route("/history/clear", get(clear_history).delete(clear_history))
        .route("/history/:id", delete(delete_history_record))
        // Config
        .route("/config/country", get(get_country).put(set_country))
        .with_state(state)
}

async fn root() -> Json<Value> {
    Json(json!({
        "message": "RoadEye LPR API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "image_detection": "/detect/image",
            "video_stream": "/ws/video",
            "live_stream": "/ws/live",
            "history": "/history/",
            "country": "/config/country"
        }
    }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

// ========================================
// Image detection
// ========================================

#[derive(Debug, Serialize)]
struct ImageDetection {
    id: i64,
    plate_number: String,
    confidence: f64,
}

struct BatchAnalysis {
    readings: Vec<PlateReading>,
    annotated_jpeg: Vec<u8>,
}

/// `Ok(None)` when the bytes are not a decodable image.
fn analyze_upload(pipeline: &PlatePipeline, bytes: &[u8]) -> anyhow::Result<Option<BatchAnalysis>> {
    let Ok(image) = image::load_from_memory(bytes) else {
        return Ok(None);
    };
    let analysis = pipeline.analyze(&image, SelectionMode::AllQualifying);
    Ok(Some(BatchAnalysis {
        annotated_jpeg: annotate::encode_jpeg(&analysis.annotated)?,
        readings: analysis.readings,
    }))
}

fn upload_file_name(plate: &str) -> anyhow::Result<String> {
    let stamp = OffsetDateTime::now_utc()
        .format(format_description!("[year][month][day]_[hour][minute][second]"))?;
    Ok(format!("{}_{}_{}.jpg", stamp, plate, Uuid::new_v4().simple()))
}

/// POST /detect/image, multipart with a `file` field.
async fn detect_image(State(state): State<AppState>, mut multipart: Multipart) -> ApiResult<Json<Value>> {
    let mut file_data: Option<Vec<u8>> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(format!("multipart error: {e}")))?
    {
        if field.name() == Some("file") {
            file_data = Some(
                field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::Validation(format!("file read error: {e}")))?
                    .to_vec(),
            );
        }
    }
    let data = file_data.ok_or_else(|| ApiError::Validation("missing 'file' field".into()))?;

    let pipeline = state.pipeline.clone();
    let analysis = state
        .pool
        .run(move || analyze_upload(&pipeline, &data))
        .await??;
    let Some(analysis) = analysis else {
        return Ok(Json(json!({ "error": "Invalid image", "detections": [] })));
    };

    let accepted: Vec<&PlateReading> = analysis
        .readings
        .iter()
        .filter(|r| !r.plate.is_empty() && r.plate.confidence > state.image_min_confidence)
        .collect();

    let mut detections = Vec::new();
    if let Some(first) = accepted.first() {
        let file_name = upload_file_name(&first.plate.text)?;
        let images_dir = state.uploads_dir.join(IMAGES_DIR);
        tokio::fs::create_dir_all(&images_dir).await?;
        tokio::fs::write(images_dir.join(&file_name), &analysis.annotated_jpeg).await?;
        let public_path = format!("/uploads/{}/{}", IMAGES_DIR, file_name);

        for reading in &accepted {
            let new = NewDetection::now(&reading.plate.text, reading.plate.confidence, Source::Image)
                .with_image_path(public_path.clone());
            match state.db.insert_detection(&new).await {
                Ok(record) => {
                    tracing::info!(id = record.id, plate = %record.plate_number, "Image detection persisted");
                    detections.push(ImageDetection {
                        id: record.id,
                        plate_number: record.plate_number,
                        confidence: record.confidence,
                    });
                }
                Err(e) => {
                    tracing::warn!(plate = %reading.plate.text, error = %e, "Failed to persist image detection");
                }
            }
        }
    }

    Ok(Json(json!({
        "count": detections.len(),
        "detections": detections,
        "annotated_image": annotate::encode_base64(&analysis.annotated_jpeg),
    })))
}

// ========================================
// Streams
// ========================================

async fn ws_video(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_stream(socket, state, StreamKind::Video))
}

async fn ws_live(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_stream(socket, state, StreamKind::Live))
}

async fn handle_stream(socket: WebSocket, state: AppState, kind: StreamKind) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<FrameResponse>(state.outbound_buffer.max(1));
    let mut session = state.orchestrator.open_session(kind, tx);
    let session_id = session.id();

    let send_task = tokio::spawn(async move {
        while let Some(response) = rx.recv().await {
            let text = match serde_json::to_string(&response) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(session = %session_id, error = %e, "Failed to serialize frame response");
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Text(text)) => session.handle(protocol::parse_text(&text)),
            Ok(Message::Binary(data)) => session.handle(protocol::parse_binary(&data)),
            Ok(Message::Close(_)) => {
                tracing::info!(session = %session_id, "WebSocket client disconnected");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(session = %session_id, error = %e, "WebSocket error");
                break;
            }
        }
        if send_task.is_finished() {
            break;
        }
    }

    session.close().await;
    send_task.abort();
}

// ========================================
// History
// ========================================

async fn list_history(State(state): State<AppState>) -> ApiResult<Json<Vec<DetectionRecord>>> {
    let records = state.db.list_detections().await.map_err(ApiError::database)?;
    Ok(Json(records))
}

/// Map a public `/uploads/...` path back to the file on disk.
fn stored_image_path(uploads_dir: &FsPath, public_path: &str) -> Option<PathBuf> {
    let relative = public_path.trim_start_matches('/').strip_prefix("uploads/")?;
    if relative.is_empty() || relative.split('/').any(|part| part == "..") {
        return None;
    }
    Some(uploads_dir.join(relative))
}

/// Delete the stored image unless another record still points at it.
async fn remove_unreferenced_image(state: &AppState, public_path: &str) {
    match state.db.count_image_references(public_path).await {
        Ok(0) => {}
        Ok(remaining) => {
            tracing::debug!(path = public_path, remaining, "Image still referenced, keeping it");
            return;
        }
        Err(e) => {
            tracing::warn!(path = public_path, error = %e, "Could not check image references, keeping it");
            return;
        }
    }
    let Some(path) = stored_image_path(&state.uploads_dir, public_path) else {
        return;
    };
    match tokio::fs::remove_file(&path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "Removed detection image"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove detection image"),
    }
}

async fn delete_history_record(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<Value>> {
    let Some(record) = state.db.delete_detection(id).await.map_err(ApiError::database)? else {
        return Ok(Json(json!({ "error": "Record not found" })));
    };

    if let Some(public_path) = record.image_path.as_deref() {
        remove_unreferenced_image(&state, public_path).await;
    }

    tracing::info!(id, plate = %record.plate_number, "Detection deleted");
    Ok(Json(json!({ "success": true, "id": id })))
}

async fn clear_history(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let deleted = state.db.clear_detections().await.map_err(ApiError::database)?;
    tracing::info!(deleted, "Detection history cleared");
    Ok(Json(json!({ "success": true, "deleted": deleted })))
}

// ========================================
// Config
// ========================================

#[derive(Debug, Deserialize)]
struct CountryUpdate {
    country: String,
}

async fn get_country(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "country": state.country.get(),
        "supported": syntax::SUPPORTED_COUNTRIES,
    }))
}

async fn set_country(State(state): State<AppState>, Json(update): Json<CountryUpdate>) -> ApiResult<Json<Value>> {
    if syntax::template(&update.country).is_none() {
        return Err(ApiError::Validation(format!(
            "unsupported country '{}', expected one of {:?}",
            update.country,
            syntax::SUPPORTED_COUNTRIES
        )));
    }
    state.country.set(&update.country);
    tracing::info!(country = %state.country.get(), "Active country changed");
    Ok(Json(json!({ "country": state.country.get() })))
}
