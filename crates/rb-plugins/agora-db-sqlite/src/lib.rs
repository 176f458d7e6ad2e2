//! # agora-db-sqlite
//!
//! This crate implements the data mapping between the SQLite relational model
//! and the `agora-core` domain models. One [`SqliteStore`] implements every
//! repository port; the pool and SQLite's own locking are the only
//! synchronisation between request handlers and the ranking sweep.
//!
//! Timestamps are stored as RFC 3339 text in UTC with microsecond precision,
//! which keeps `ORDER BY created_at` chronological.

mod comments;
mod posts;
mod users;
mod votes;

use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use agora_core::error::{AppError, Result};
use agora_core::ranking::parse_created_at;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::error::ErrorKind;
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::{error, info};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if missing) the database at `url` and runs pending
    /// migrations.
    pub async fn new(url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| store_err("parse database url", url, e))?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(|e| store_err("connect", url, e))?;

        info!(url, max_connections, "opened sqlite store");
        Self::migrated(pool).await
    }

    /// A private in-memory database. The pool keeps exactly one connection
    /// alive forever, since every new connection would see an empty database.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| store_err("parse database url", "sqlite::memory:", e))?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| store_err("connect", "sqlite::memory:", e))?;

        Self::migrated(pool).await
    }

    async fn migrated(pool: SqlitePool) -> Result<Self> {
        MIGRATOR.run(&pool).await.map_err(|e| {
            error!(error = %e, "migration failed");
            AppError::Store(format!("migration failed: {e}"))
        })?;
        Ok(Self { pool })
    }

    /// Direct pool access for ad-hoc queries and tests.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn now_text() -> String {
    format_ts(Utc::now())
}

fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    parse_created_at(raw).map_err(|e| AppError::Store(e.to_string()))
}

/// Constraint class of a database error, if it is one.
fn violation(e: &sqlx::Error) -> Option<ErrorKind> {
    e.as_database_error().map(|db| db.kind())
}

/// Logs a storage failure with its operation and key, then wraps it.
fn store_err(op: &str, key: impl Display, e: impl Display) -> AppError {
    error!(op, key = %key, error = %e, "store operation failed");
    AppError::Store(format!("{op} ({key}): {e}"))
}
