// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqliteSynchronous};
use std::str::FromStr;

use crate::error::DbError;

/// Create a SqlitePool with WAL mode and common settings.
///
/// # Arguments
/// * `database_url` - SQLite connection string (e.g., "sqlite:./benefits.db")
///
/// # Errors
/// Returns `DbError::Internal` if the URL is invalid or connection fails.
#[tracing::instrument(skip(database_url))]
pub async fn create_pool(database_url: &str) -> Result<SqlitePool, DbError> {
	let options = SqliteConnectOptions::from_str(database_url)
		.map_err(|e| DbError::Internal(format!("Invalid database URL: {e}")))?
		.journal_mode(SqliteJournalMode::Wal)
		.synchronous(SqliteSynchronous::Normal)
		.foreign_keys(true)
		.create_if_missing(true);

	let pool = SqlitePool::connect_with(options).await?;

	tracing::debug!("database pool created");
	Ok(pool)
}

/// Creates the tables owned by the scope core.
///
/// Business tables are owned by their modules; only grant storage and the
/// distributed metadata tier live here.
#[tracing::instrument(skip(pool))]
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), DbError> {
	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS capability_grants (
			id TEXT PRIMARY KEY,
			actor_id TEXT NOT NULL,
			capability TEXT NOT NULL,
			scope TEXT NOT NULL CHECK (scope IN ('own', 'unit', 'global')),
			unit_id TEXT,
			created_at TEXT NOT NULL,
			UNIQUE (actor_id, capability, scope, unit_id)
		)
		"#,
	)
	.execute(pool)
	.await?;

	sqlx::query(
		"CREATE INDEX IF NOT EXISTS idx_capability_grants_actor ON capability_grants(actor_id)",
	)
	.execute(pool)
	.await?;

	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS entity_metadata_cache (
			entity_name TEXT PRIMARY KEY,
			column_names TEXT NOT NULL,
			cached_at TEXT NOT NULL,
			ttl_secs INTEGER NOT NULL
		)
		"#,
	)
	.execute(pool)
	.await?;

	tracing::debug!("scope core migrations applied");
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn file_pool_enables_wal_and_foreign_keys() {
		let dir = tempfile::tempdir().unwrap();
		let url = format!("sqlite:{}", dir.path().join("benefits.db").display());
		let pool = create_pool(&url).await.unwrap();

		let mode: String = sqlx::query_scalar("PRAGMA journal_mode")
			.fetch_one(&pool)
			.await
			.unwrap();
		assert_eq!(mode.to_ascii_lowercase(), "wal");
		let fk: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
			.fetch_one(&pool)
			.await
			.unwrap();
		assert_eq!(fk, 1);
	}

	#[tokio::test]
	async fn migrations_are_idempotent() {
		let dir = tempfile::tempdir().unwrap();
		let url = format!("sqlite:{}", dir.path().join("benefits.db").display());
		let pool = create_pool(&url).await.unwrap();

		run_migrations(&pool).await.unwrap();
		run_migrations(&pool).await.unwrap();

		let tables: Vec<String> = sqlx::query_scalar(
			"SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
		)
		.fetch_all(&pool)
		.await
		.unwrap();
		assert_eq!(tables, vec!["capability_grants", "entity_metadata_cache"]);
	}
}
