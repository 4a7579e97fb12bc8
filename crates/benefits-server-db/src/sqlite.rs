// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use serde_json::Value;
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqlitePool, SqliteRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};

use crate::criteria::{validate_identifier, Criteria, QueryBuilder, SqlStatement};
use crate::error::{DbError, Result};
use crate::store::{Record, SchemaReflector, StoragePort};

/// [`StoragePort`] over a SQLite pool.
#[derive(Clone)]
pub struct SqliteStore {
	pool: SqlitePool,
}

impl SqliteStore {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	pub fn pool(&self) -> &SqlitePool {
		&self.pool
	}
}

fn bind_values<'q>(
	mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
	values: &[Value],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
	for value in values {
		query = match value {
			Value::Null => query.bind(None::<String>),
			Value::Bool(b) => query.bind(*b),
			Value::Number(n) => match n.as_i64() {
				Some(i) => query.bind(i),
				None => query.bind(n.as_f64()),
			},
			Value::String(s) => query.bind(s.clone()),
			other => query.bind(other.to_string()),
		};
	}
	query
}

fn row_to_record(row: &SqliteRow) -> Result<Record> {
	let mut record = Record::new();
	for column in row.columns() {
		let i = column.ordinal();
		let raw = row.try_get_raw(i)?;
		let value = if raw.is_null() {
			Value::Null
		} else {
			let type_name = raw.type_info().name().to_ascii_uppercase();
			match type_name.as_str() {
				"INTEGER" | "BIGINT" | "INT" | "INT8" | "BOOLEAN" => {
					Value::from(row.try_get_unchecked::<i64, _>(i)?)
				}
				"REAL" | "FLOAT" | "DOUBLE" | "NUMERIC" => {
					Value::from(row.try_get_unchecked::<f64, _>(i)?)
				}
				"BLOB" => Value::from(row.try_get_unchecked::<Vec<u8>, _>(i)?),
				_ => Value::String(row.try_get_unchecked::<String, _>(i)?),
			}
		};
		record.insert(column.name().to_string(), value);
	}
	Ok(record)
}

fn validate_record_columns(record: &Record) -> Result<()> {
	record.keys().try_for_each(|k| validate_identifier(k))
}

impl SqliteStore {
	async fn fetch(&self, stmt: SqlStatement) -> Result<Vec<Record>> {
		tracing::trace!(sql = %stmt.sql, binds = stmt.binds.len(), "select");
		let rows = bind_values(sqlx::query(&stmt.sql), &stmt.binds)
			.fetch_all(&self.pool)
			.await?;
		rows.iter().map(row_to_record).collect()
	}
}

#[async_trait]
impl SchemaReflector for SqliteStore {
	#[tracing::instrument(skip(self))]
	async fn columns(&self, entity: &str) -> Result<Vec<String>> {
		validate_identifier(entity)?;
		let rows = sqlx::query("SELECT name FROM pragma_table_info(?) ORDER BY cid")
			.bind(entity)
			.fetch_all(&self.pool)
			.await?;
		if rows.is_empty() {
			return Err(DbError::UnknownEntity(entity.to_string()));
		}
		Ok(rows.iter().map(|row| row.get::<String, _>("name")).collect())
	}
}

#[async_trait]
impl StoragePort for SqliteStore {
	#[tracing::instrument(skip(self, query), fields(table = query.table()))]
	async fn find_many(&self, query: &QueryBuilder) -> Result<Vec<Record>> {
		self.fetch(query.to_select()?).await
	}

	#[tracing::instrument(skip(self, query), fields(table = query.table()))]
	async fn count(&self, query: &QueryBuilder) -> Result<u64> {
		let stmt = query.to_count()?;
		let row = bind_values(sqlx::query(&stmt.sql), &stmt.binds)
			.fetch_one(&self.pool)
			.await?;
		let count: i64 = row.get("cnt");
		Ok(count.max(0) as u64)
	}

	#[tracing::instrument(skip(self, record))]
	async fn insert(&self, table: &str, record: &Record) -> Result<Record> {
		validate_identifier(table)?;
		validate_record_columns(record)?;
		if record.is_empty() {
			return Err(DbError::Internal(format!("empty insert into {table}")));
		}

		let columns: Vec<String> = record.keys().map(|k| format!("\"{k}\"")).collect();
		let placeholders = vec!["?"; record.len()].join(", ");
		let sql = format!(
			"INSERT INTO \"{table}\" ({}) VALUES ({placeholders}) RETURNING *",
			columns.join(", ")
		);
		let values: Vec<Value> = record.values().cloned().collect();

		let row = bind_values(sqlx::query(&sql), &values)
			.fetch_one(&self.pool)
			.await
			.map_err(|e| match e {
				sqlx::Error::Database(ref db) if db.is_unique_violation() => {
					DbError::Conflict(format!("{table}: {}", db.message()))
				}
				other => DbError::Sqlx(other),
			})?;
		row_to_record(&row)
	}

	#[tracing::instrument(skip(self, criteria, patch))]
	async fn update(&self, table: &str, criteria: &Criteria, patch: &Record) -> Result<u64> {
		validate_identifier(table)?;
		validate_record_columns(patch)?;
		if patch.is_empty() {
			return Ok(0);
		}

		let assignments: Vec<String> = patch.keys().map(|k| format!("\"{k}\" = ?")).collect();
		let mut binds: Vec<Value> = patch.values().cloned().collect();
		let where_clause = criteria.to_sql(None, &mut binds)?;
		let sql = format!(
			"UPDATE \"{table}\" SET {} WHERE {where_clause}",
			assignments.join(", ")
		);

		let result = bind_values(sqlx::query(&sql), &binds)
			.execute(&self.pool)
			.await?;
		Ok(result.rows_affected())
	}

	#[tracing::instrument(skip(self, criteria))]
	async fn delete(&self, table: &str, criteria: &Criteria) -> Result<u64> {
		validate_identifier(table)?;
		let mut binds = Vec::new();
		let where_clause = criteria.to_sql(None, &mut binds)?;
		let sql = format!("DELETE FROM \"{table}\" WHERE {where_clause}");

		let result = bind_values(sqlx::query(&sql), &binds)
			.execute(&self.pool)
			.await?;
		Ok(result.rows_affected())
	}
}
