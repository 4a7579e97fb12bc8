// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The storage port the scoped accessor delegates to.
//!
//! Rows cross the port as [`Record`]s (column name to JSON value) so the port
//! stays entity-agnostic; entities convert with [`to_record`] / [`from_record`].

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::criteria::{Criteria, QueryBuilder};
use crate::error::{DbError, Result};

/// One row, keyed by column name.
pub type Record = Map<String, Value>;

/// A persisted entity type managed through a scoped accessor.
///
/// Serialized field names are column names.
pub trait ScopedEntity: Serialize + DeserializeOwned + Send + Sync + 'static {
	/// Table (and entity) name.
	const TABLE: &'static str;

	/// Primary key column.
	const ID_COLUMN: &'static str = "id";
}

/// Schema reflection: the column set of an entity's table.
#[async_trait]
pub trait SchemaReflector: Send + Sync {
	async fn columns(&self, entity: &str) -> Result<Vec<String>>;
}

/// Generic per-entity storage operations.
#[async_trait]
pub trait StoragePort: SchemaReflector {
	fn query_builder(&self, table: &str, alias: &str) -> QueryBuilder {
		QueryBuilder::new(table, alias)
	}

	async fn find_many(&self, query: &QueryBuilder) -> Result<Vec<Record>>;

	async fn find_one(&self, query: &QueryBuilder) -> Result<Option<Record>> {
		let rows = self.find_many(&query.clone().limit(1)).await?;
		Ok(rows.into_iter().next())
	}

	async fn count(&self, query: &QueryBuilder) -> Result<u64>;

	/// Inserts a row and returns it as stored.
	async fn insert(&self, table: &str, record: &Record) -> Result<Record>;

	/// Applies `patch` to rows matching `criteria`; returns the affected count.
	async fn update(&self, table: &str, criteria: &Criteria, patch: &Record) -> Result<u64>;

	/// Deletes rows matching `criteria`; returns the affected count.
	async fn delete(&self, table: &str, criteria: &Criteria) -> Result<u64>;
}

/// Serializes a value that must be a JSON object into a record.
pub fn to_record<T: Serialize + ?Sized>(value: &T) -> Result<Record> {
	match serde_json::to_value(value)? {
		Value::Object(map) => Ok(map),
		other => Err(DbError::Internal(format!(
			"expected an object, got {}",
			json_kind(&other)
		))),
	}
}

pub fn from_record<T: DeserializeOwned>(record: Record) -> Result<T> {
	Ok(serde_json::from_value(Value::Object(record))?)
}

fn json_kind(value: &Value) -> &'static str {
	match value {
		Value::Null => "null",
		Value::Bool(_) => "bool",
		Value::Number(_) => "number",
		Value::String(_) => "string",
		Value::Array(_) => "array",
		Value::Object(_) => "object",
	}
}
