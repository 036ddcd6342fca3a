//! HTTP and WebSocket transport.

mod routes;

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderValue, Method};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::CountrySetting;
use crate::core::db::DetectionDb;
use crate::pipeline::PlatePipeline;
use crate::stream::{RecognitionPool, StreamOrchestrator};

pub use routes::create_router;

/// Subdirectory of the uploads root holding annotated uploads.
pub const IMAGES_DIR: &str = "images";

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<PlatePipeline>,
    pub orchestrator: Arc<StreamOrchestrator>,
    pub db: DetectionDb,
    pub pool: RecognitionPool,
    pub country: Arc<CountrySetting>,
    pub uploads_dir: PathBuf,
    /// Uploaded images persist readings strictly above this.
    pub image_min_confidence: f32,
    /// Responses buffered per WebSocket before the session waits on the socket.
    pub outbound_buffer: usize,
}

/// Router with CORS, request tracing and the static `/uploads` tree.
pub fn build_app(state: AppState, allowed_origins: &[String]) -> Router {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    let uploads = ServeDir::new(&state.uploads_dir);
    create_router(state)
        .nest_service("/uploads", uploads)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
