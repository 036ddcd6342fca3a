//! Messages exchanged with a streaming client.
//!
//! Client to server:
//! - `{"type":"ping"}`
//! - `{"type":"frame_meta","timestamp":12.5}`
//! - binary image bytes, optionally prefixed by one line of JSON metadata
//!   (`{"timestamp":12.5}\n<jpeg>`)
//! - a text frame holding a base64 image or a `data:image/...;base64,` URL
//!
//! Server to client: [`FrameResponse`] as JSON.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ControlMessage {
    Ping,
    FrameMeta { timestamp: f64 },
}

#[derive(Debug, Deserialize)]
struct FrameMetadata {
    timestamp: Option<f64>,
}

/// One parsed client message.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Ping,
    FrameMeta { timestamp: f64 },
    /// Encoded image bytes with the timestamp sent alongside them, if any.
    Frame { bytes: Vec<u8>, timestamp: Option<f64> },
    /// Malformed message; skipped without a response.
    Invalid(String),
}

pub fn parse_text(text: &str) -> Inbound {
    let trimmed = text.trim();
    if trimmed.starts_with('{') {
        return match serde_json::from_str::<ControlMessage>(trimmed) {
            Ok(ControlMessage::Ping) => Inbound::Ping,
            Ok(ControlMessage::FrameMeta { timestamp }) => Inbound::FrameMeta { timestamp },
            Err(e) => Inbound::Invalid(format!("unknown control message: {}", e)),
        };
    }

    let payload = match trimmed.split_once(',') {
        Some((header, data)) if header.starts_with("data:") => data,
        _ => trimmed,
    };
    match STANDARD.decode(payload) {
        Ok(bytes) if !bytes.is_empty() => Inbound::Frame {
            bytes,
            timestamp: None,
        },
        Ok(_) => Inbound::Invalid("empty frame".to_string()),
        Err(e) => Inbound::Invalid(format!("invalid base64 frame: {}", e)),
    }
}

/// Split an optional `{"timestamp":..}\n` header from binary frame data.
/// Data whose first line is not JSON is treated as a bare image.
pub fn parse_binary(data: &[u8]) -> Inbound {
    if data.is_empty() {
        return Inbound::Invalid("empty frame".to_string());
    }
    if let Some(newline) = data.iter().position(|b| *b == b'\n').filter(|i| *i > 0) {
        if let Ok(meta) = serde_json::from_slice::<FrameMetadata>(&data[..newline]) {
            return Inbound::Frame {
                bytes: data[newline + 1..].to_vec(),
                timestamp: meta.timestamp,
            };
        }
    }
    Inbound::Frame {
        bytes: data.to_vec(),
        timestamp: None,
    }
}

/// Per-frame reply. `plate` is `null` when nothing readable was found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameResponse {
    /// Annotated frame, JPEG, base64.
    pub frame: String,
    pub plate: Option<String>,
    pub confidence: f32,
    pub timestamp: f64,
}
