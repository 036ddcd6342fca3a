mod detection;
mod state;

use std::path::Path;

use sqlx::SqlitePool;

pub use detection::{DetectionRecord, DetectionRepository, NewDetection};
use detection::{DetectionRow, format_timestamp};

const SELECT_COLUMNS: &str =
    "SELECT id, plate_number, confidence, source, timestamp, image_path, video_timestamp FROM detections";

/// Detection history backed by a SQLite pool.
#[derive(Debug, Clone)]
pub struct DetectionDb {
    pool: SqlitePool,
}

impl DetectionDb {
    pub async fn open<P: AsRef<Path>>(db_file: P) -> anyhow::Result<Self> {
        Ok(Self {
            pool: state::open_file(db_file.as_ref()).await?,
        })
    }

    pub async fn open_url(url: &str) -> anyhow::Result<Self> {
        Ok(Self {
            pool: state::open_url(url).await?,
        })
    }

    /// Close the pool. Every later call fails.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl DetectionRepository for DetectionDb {
    async fn insert_detection(&self, new: &NewDetection) -> anyhow::Result<DetectionRecord> {
        let timestamp = format_timestamp(new.timestamp)?;
        let mut tx = self.pool.begin().await?;
        let id = sqlx::query(
            r#"INSERT INTO detections (plate_number, confidence, source, timestamp, image_path, video_timestamp)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&new.plate_number)
        .bind(new.confidence)
        .bind(new.source.as_str())
        .bind(&timestamp)
        .bind(&new.image_path)
        .bind(new.video_timestamp)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        let row: DetectionRow = sqlx::query_as(&format!("{} WHERE id = ?", SELECT_COLUMNS))
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        row.try_into()
    }

    async fn list_detections(&self) -> anyhow::Result<Vec<DetectionRecord>> {
        let rows: Vec<DetectionRow> =
            sqlx::query_as(&format!("{} ORDER BY timestamp DESC, id DESC", SELECT_COLUMNS))
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(DetectionRecord::try_from).collect()
    }

    async fn get_detection(&self, id: i64) -> anyhow::Result<Option<DetectionRecord>> {
        let row: Option<DetectionRow> = sqlx::query_as(&format!("{} WHERE id = ?", SELECT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(DetectionRecord::try_from).transpose()
    }

    async fn delete_detection(&self, id: i64) -> anyhow::Result<Option<DetectionRecord>> {
        let mut tx = self.pool.begin().await?;
        let row: Option<DetectionRow> = sqlx::query_as(&format!("{} WHERE id = ?", SELECT_COLUMNS))
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        sqlx::query("DELETE FROM detections WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(Some(row.try_into()?))
    }

    async fn count_image_references(&self, image_path: &str) -> anyhow::Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM detections WHERE image_path = ?")
            .bind(image_path)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    async fn clear_detections(&self) -> anyhow::Result<u64> {
        let result = sqlx::query("DELETE FROM detections")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
