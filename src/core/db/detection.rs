use std::future::Future;

use serde::{Serialize, Serializer};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;

use crate::models::Source;

/// Fixed-width UTC form so lexical order of stored values is chronological.
pub(super) fn format_timestamp(ts: OffsetDateTime) -> anyhow::Result<String> {
    let stored = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z");
    Ok(ts.to_offset(time::UtcOffset::UTC).format(stored)?)
}

pub(super) fn parse_timestamp(value: &str) -> anyhow::Result<OffsetDateTime> {
    Ok(OffsetDateTime::parse(value, &Rfc3339)?)
}

fn serialize_timestamp<S: Serializer>(ts: &OffsetDateTime, s: S) -> Result<S::Ok, S::Error> {
    let text = ts.format(&Rfc3339).map_err(serde::ser::Error::custom)?;
    s.serialize_str(&text)
}

/// A persisted plate detection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionRecord {
    pub id: i64,
    pub plate_number: String,
    pub confidence: f64,
    pub source: Source,
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: OffsetDateTime,
    pub image_path: Option<String>,
    pub video_timestamp: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct NewDetection {
    pub plate_number: String,
    pub confidence: f64,
    pub source: Source,
    pub timestamp: OffsetDateTime,
    pub image_path: Option<String>,
    pub video_timestamp: Option<f64>,
}

impl NewDetection {
    pub fn now(plate_number: &str, confidence: f32, source: Source) -> Self {
        Self {
            plate_number: plate_number.to_string(),
            confidence: confidence as f64,
            source,
            timestamp: OffsetDateTime::now_utc(),
            image_path: None,
            video_timestamp: None,
        }
    }

    pub fn with_image_path(mut self, path: impl Into<String>) -> Self {
        self.image_path = Some(path.into());
        self
    }

    pub fn with_video_timestamp(mut self, ts: Option<f64>) -> Self {
        self.video_timestamp = ts;
        self
    }
}

#[derive(sqlx::FromRow)]
pub(super) struct DetectionRow {
    pub id: i64,
    pub plate_number: String,
    pub confidence: f64,
    pub source: String,
    pub timestamp: String,
    pub image_path: Option<String>,
    pub video_timestamp: Option<f64>,
}

impl TryFrom<DetectionRow> for DetectionRecord {
    type Error = anyhow::Error;

    fn try_from(row: DetectionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            plate_number: row.plate_number,
            confidence: row.confidence,
            source: Source::try_from(row.source.as_str())?,
            timestamp: parse_timestamp(&row.timestamp)?,
            image_path: row.image_path,
            video_timestamp: row.video_timestamp,
        })
    }
}

pub trait DetectionRepository {
    /// Insert one record in its own transaction.
    fn insert_detection(&self, new: &NewDetection) -> impl Future<Output = anyhow::Result<DetectionRecord>> + Send;
    /// All records, newest first.
    fn list_detections(&self) -> impl Future<Output = anyhow::Result<Vec<DetectionRecord>>> + Send;
    fn get_detection(&self, id: i64) -> impl Future<Output = anyhow::Result<Option<DetectionRecord>>> + Send;
    /// Remove a record, returning it when it existed.
    fn delete_detection(&self, id: i64) -> impl Future<Output = anyhow::Result<Option<DetectionRecord>>> + Send;
    /// Number of records whose `image_path` is `image_path`.
    fn count_image_references(&self, image_path: &str) -> impl Future<Output = anyhow::Result<u64>> + Send;
    /// Remove every record, returning how many were deleted.
    fn clear_detections(&self) -> impl Future<Output = anyhow::Result<u64>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_stored_timestamps_are_fixed_width() {
        let a = format_timestamp(datetime!(2024-05-01 10:00:00 UTC)).unwrap();
        let b = format_timestamp(datetime!(2024-05-01 10:00:00.5 UTC)).unwrap();
        assert_eq!(a, "2024-05-01T10:00:00.000000Z");
        assert_eq!(a.len(), b.len());
        assert!(a < b);
    }

    #[test]
    fn test_offsets_normalised_to_utc() {
        let local = datetime!(2024-05-01 12:00:00 +02:00);
        let stored = format_timestamp(local).unwrap();
        assert_eq!(stored, "2024-05-01T10:00:00.000000Z");
        assert_eq!(parse_timestamp(&stored).unwrap(), local);
    }
}
