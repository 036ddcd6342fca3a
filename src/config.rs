//! Process-wide settings.
//!
//! Every tunable of the recognition core lives here so the batch and stream
//! paths share one configuration surface. Settings can be loaded from a JSON
//! file; missing keys fall back to the defaults below.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub selection: SelectionSettings,
    pub preprocess: PreprocessSettings,
    pub recognition: RecognitionSettings,
    pub tracking: TrackingSettings,
    pub storage: StorageSettings,
}

impl Settings {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {:?}", path))?;
        let settings = serde_json::from_str(&data)
            .with_context(|| format!("Invalid settings file {:?}", path))?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Concurrent pipeline calls allowed on the blocking pool.
    pub workers: usize,
    /// Responses buffered per connection before the processor waits on the socket.
    pub outbound_buffer: usize,
    pub allowed_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(2),
            outbound_buffer: 4,
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:5173".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionSettings {
    pub min_confidence: f32,
    pub min_width: i32,
    pub min_height: i32,
}

impl Default for SelectionSettings {
    fn default() -> Self {
        Self {
            min_confidence: 0.25,
            min_width: 20,
            min_height: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessSettings {
    /// Mean intensity below which the crop is treated as a night shot.
    pub low_light_threshold: f32,
    pub block_size: u32,
    pub bias: i16,
    pub min_height: u32,
    pub smoothing_diameter: u32,
    pub sigma_color: f32,
    pub sigma_space: f32,
}

impl Default for PreprocessSettings {
    fn default() -> Self {
        Self {
            low_light_threshold: 70.0,
            block_size: 11,
            bias: 2,
            min_height: 40,
            smoothing_diameter: 11,
            sigma_color: 17.0,
            sigma_space: 17.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionSettings {
    /// Active country template, e.g. "IN".
    pub country: String,
    /// Directory holding `text-detection.rten` and `text-recognition.rten`.
    pub model_dir: Option<PathBuf>,
    /// Confidence reported for ocrs readings (the engine exposes no score).
    pub ocrs_confidence: f32,
    /// Tesseract data directory and language, used with the `tesseract` feature.
    pub tessdata_dir: Option<PathBuf>,
    pub tess_language: String,
    /// Engine names in priority order.
    pub engines: Vec<String>,
    /// Below this a streamed frame reports no plate.
    pub stream_min_confidence: f32,
    /// Uploaded images persist readings strictly above this.
    pub image_min_confidence: f32,
}

impl Default for RecognitionSettings {
    fn default() -> Self {
        Self {
            country: "IN".to_string(),
            model_dir: None,
            ocrs_confidence: 0.9,
            tessdata_dir: None,
            tess_language: "eng".to_string(),
            engines: vec!["tesseract".to_string(), "ocrs".to_string()],
            stream_min_confidence: 0.2,
            image_min_confidence: 0.15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingSettings {
    pub confirm_threshold: usize,
    pub confirm_window_ms: u64,
    pub max_observations: usize,
    pub dedup_window_ms: u64,
    /// How often expired plates are dropped from memory.
    pub sweep_interval_ms: u64,
}

impl TrackingSettings {
    pub fn confirm_window(&self) -> Duration {
        Duration::from_millis(self.confirm_window_ms)
    }

    pub fn dedup_window(&self) -> Duration {
        Duration::from_millis(self.dedup_window_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms.max(1))
    }
}

impl Default for TrackingSettings {
    fn default() -> Self {
        Self {
            confirm_threshold: 2,
            confirm_window_ms: 3_000,
            max_observations: 32,
            dedup_window_ms: 5_000,
            sweep_interval_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// SQLite file; overridden by `DATABASE_URL` when given as `sqlite://...`.
    pub database_path: PathBuf,
    /// Root of the publicly served upload tree.
    pub uploads_dir: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("detections.db"),
            uploads_dir: PathBuf::from("uploads"),
        }
    }
}

/// Active country template, switchable at runtime.
#[derive(Debug)]
pub struct CountrySetting {
    code: RwLock<String>,
}

impl CountrySetting {
    pub fn new(code: &str) -> Self {
        Self {
            code: RwLock::new(code.to_uppercase()),
        }
    }

    pub fn set(&self, code: &str) {
        *self.code.write() = code.to_uppercase();
    }

    pub fn get(&self) -> String {
        self.code.read().clone()
    }
}
