use std::path::Path;
use std::str::FromStr;

use anyhow::Context;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};

const MAX_CONNECTIONS: u32 = 5;

fn tune(opts: SqliteConnectOptions) -> SqliteConnectOptions {
    opts.create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
}

async fn open(opts: SqliteConnectOptions) -> anyhow::Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect_with(tune(opts))
        .await?;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to apply database migrations")?;
    Ok(pool)
}

/// Open (creating if needed) the SQLite file at `db_file` and migrate it.
pub(super) async fn open_file(db_file: &Path) -> anyhow::Result<SqlitePool> {
    if let Some(parent) = db_file.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create database directory {:?}", parent))?;
    }
    open(SqliteConnectOptions::new().filename(db_file))
        .await
        .with_context(|| format!("Failed to open database {:?}", db_file))
}

/// Open a `sqlite://...` URL and migrate it.
pub(super) async fn open_url(url: &str) -> anyhow::Result<SqlitePool> {
    let opts = SqliteConnectOptions::from_str(url)
        .with_context(|| format!("Invalid database URL {}", url))?;
    open(opts)
        .await
        .with_context(|| format!("Failed to open database {}", url))
}
