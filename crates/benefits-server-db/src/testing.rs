// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::error::{DbError, Result};
use crate::store::{SchemaReflector, ScopedEntity};

/// A single-connection in-memory pool; every query sees the same database.
pub async fn create_test_pool() -> SqlitePool {
	SqlitePoolOptions::new()
		.max_connections(1)
		.idle_timeout(None)
		.max_lifetime(None)
		.connect("sqlite::memory:")
		.await
		.unwrap()
}

pub async fn create_units_table(pool: &SqlitePool) {
	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS units (
			id TEXT PRIMARY KEY,
			name TEXT NOT NULL
		)
		"#,
	)
	.execute(pool)
	.await
	.unwrap();
}

pub async fn create_citizens_table(pool: &SqlitePool) {
	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS citizens (
			id TEXT PRIMARY KEY,
			unit_id TEXT,
			actor_id TEXT,
			full_name TEXT NOT NULL,
			created_at TEXT,
			updated_at TEXT
		)
		"#,
	)
	.execute(pool)
	.await
	.unwrap();
}

pub async fn create_requests_table(pool: &SqlitePool) {
	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS requests (
			id TEXT PRIMARY KEY,
			citizen_id TEXT NOT NULL,
			unit_id TEXT,
			actor_id TEXT,
			status TEXT NOT NULL DEFAULT 'open',
			amount REAL,
			created_at TEXT,
			updated_at TEXT
		)
		"#,
	)
	.execute(pool)
	.await
	.unwrap();

	sqlx::query("CREATE INDEX IF NOT EXISTS idx_requests_unit ON requests(unit_id)")
		.execute(pool)
		.await
		.unwrap();
}

pub async fn create_payments_table(pool: &SqlitePool) {
	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS payments (
			id TEXT PRIMARY KEY,
			request_id TEXT NOT NULL,
			amount REAL NOT NULL,
			installment INTEGER NOT NULL DEFAULT 1,
			released_at TEXT,
			created_at TEXT NOT NULL
		)
		"#,
	)
	.execute(pool)
	.await
	.unwrap();
}

/// Pool with the business tables used by scope tests plus the scope core's
/// own tables.
pub async fn create_scope_test_pool() -> SqlitePool {
	let pool = create_test_pool().await;
	create_units_table(&pool).await;
	create_citizens_table(&pool).await;
	create_requests_table(&pool).await;
	create_payments_table(&pool).await;
	crate::pool::run_migrations(&pool).await.unwrap();
	pool
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citizen {
	pub id: String,
	pub unit_id: Option<String>,
	pub actor_id: Option<String>,
	pub full_name: String,
	pub created_at: Option<String>,
	pub updated_at: Option<String>,
}

impl ScopedEntity for Citizen {
	const TABLE: &'static str = "citizens";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenefitRequest {
	pub id: String,
	pub citizen_id: String,
	pub unit_id: Option<String>,
	pub actor_id: Option<String>,
	pub status: String,
	pub amount: Option<f64>,
	pub created_at: Option<String>,
	pub updated_at: Option<String>,
}

impl ScopedEntity for BenefitRequest {
	const TABLE: &'static str = "requests";
}

/// Scoped to a unit only through `requests` and `citizens`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
	pub id: String,
	pub request_id: String,
	pub amount: f64,
	pub installment: i64,
	pub released_at: Option<String>,
	pub created_at: String,
}

impl ScopedEntity for Payment {
	const TABLE: &'static str = "payments";
}

/// Schema reflector over a fixed table map that counts its calls.
#[derive(Debug, Default)]
pub struct CountingReflector {
	tables: HashMap<String, Vec<String>>,
	calls: AtomicUsize,
}

impl CountingReflector {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_table(mut self, table: &str, columns: &[&str]) -> Self {
		self.tables.insert(
			table.to_string(),
			columns.iter().map(|c| c.to_string()).collect(),
		);
		self
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl SchemaReflector for CountingReflector {
	async fn columns(&self, entity: &str) -> Result<Vec<String>> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		self
			.tables
			.get(entity)
			.cloned()
			.ok_or_else(|| DbError::UnknownEntity(entity.to_string()))
	}
}
