mod common;

use common::*;
use roadeye::core::db::{DetectionRepository, NewDetection};
use roadeye::models::Source;
use time::macros::datetime;

#[tokio::test]
async fn test_empty_history() -> anyhow::Result<()> {
    let (db, _dir) = create_test_db().await;
    assert!(db.list_detections().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_insert_returns_stored_record() -> anyhow::Result<()> {
    let (db, _dir) = create_test_db().await;
    let new = NewDetection {
        plate_number: "KA01AB1234".to_string(),
        confidence: 0.5,
        source: Source::Video,
        timestamp: datetime!(2024-05-01 10:15:00.25 UTC),
        image_path: None,
        video_timestamp: Some(12.5),
    };
    let record = db.insert_detection(&new).await?;
    assert!(record.id > 0);
    assert_eq!(record.plate_number, "KA01AB1234");
    assert_eq!(record.source, Source::Video);
    assert_eq!(record.timestamp, datetime!(2024-05-01 10:15:00.25 UTC));
    assert_eq!(record.video_timestamp, Some(12.5));

    let fetched = db.get_detection(record.id).await?;
    assert_eq!(fetched, Some(record));
    Ok(())
}

#[tokio::test]
async fn test_list_is_newest_first() -> anyhow::Result<()> {
    let (db, _dir) = create_test_db().await;
    let mut older = make_detection("OLDER", Source::Image);
    older.timestamp = datetime!(2024-05-01 09:00:00 UTC);
    let mut newer = make_detection("NEWER", Source::Live);
    newer.timestamp = datetime!(2024-05-01 10:00:00 UTC);

    // Insert out of order; listing follows the timestamp.
    db.insert_detection(&newer).await?;
    db.insert_detection(&older).await?;

    let plates: Vec<String> = db
        .list_detections()
        .await?
        .into_iter()
        .map(|r| r.plate_number)
        .collect();
    assert_eq!(plates, vec!["NEWER", "OLDER"]);
    Ok(())
}

#[tokio::test]
async fn test_delete_reports_found_and_not_found() -> anyhow::Result<()> {
    let (db, _dir) = create_test_db().await;
    let record = db
        .insert_detection(&make_detection("MH12DE1433", Source::Image).with_image_path("/uploads/images/x.jpg"))
        .await?;

    let deleted = db.delete_detection(record.id).await?;
    assert_eq!(deleted.map(|r| r.image_path), Some(Some("/uploads/images/x.jpg".to_string())));
    assert!(db.delete_detection(record.id).await?.is_none());
    assert!(db.list_detections().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_image_references_follow_deletes() -> anyhow::Result<()> {
    let (db, _dir) = create_test_db().await;
    let shared = "/uploads/images/shared.jpg";
    let first = db
        .insert_detection(&make_detection("KA01AB1234", Source::Image).with_image_path(shared))
        .await?;
    db.insert_detection(&make_detection("MH12DE1433", Source::Image).with_image_path(shared))
        .await?;
    db.insert_detection(&make_detection("DL3CAF0001", Source::Live)).await?;

    assert_eq!(db.count_image_references(shared).await?, 2);
    db.delete_detection(first.id).await?;
    assert_eq!(db.count_image_references(shared).await?, 1);
    assert_eq!(db.count_image_references("/uploads/images/other.jpg").await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_clear_returns_count() -> anyhow::Result<()> {
    let (db, _dir) = create_test_db().await;
    for plate in ["A", "B", "C"] {
        db.insert_detection(&make_detection(plate, Source::Live)).await?;
    }
    assert_eq!(db.clear_detections().await?, 3);
    assert_eq!(db.clear_detections().await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_reopen_keeps_records() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let path = dir.path().join("nested").join("detections.db");
    {
        let db = roadeye::DetectionDb::open(&path).await?;
        db.insert_detection(&make_detection("DL3C1234", Source::Image)).await?;
        db.close().await;
    }
    let db = roadeye::DetectionDb::open(&path).await?;
    assert_eq!(db.list_detections().await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_closed_database_reports_errors() -> anyhow::Result<()> {
    let (db, _dir) = create_test_db().await;
    db.close().await;
    assert!(db.insert_detection(&make_detection("X", Source::Live)).await.is_err());
    Ok(())
}
