// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Whitelisted join paths from an entity to its owning unit.
//!
//! Entities without a unit column of their own may be unit-scoped through an
//! explicitly declared path of one or two joins. Paths are never inferred from
//! the schema; an entity without a declared path is simply not unit-filterable.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::criteria::{validate_identifier, ColumnRef, Predicate, QueryBuilder};
use crate::error::{DbError, Result};

pub const MAX_JOIN_HOPS: usize = 2;

/// One join: `previous.local_column = table.foreign_column`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinHop {
	pub table: String,
	pub local_column: String,
	pub foreign_column: String,
}

impl JoinHop {
	pub fn new(
		table: impl Into<String>,
		local_column: impl Into<String>,
		foreign_column: impl Into<String>,
	) -> Self {
		Self {
			table: table.into(),
			local_column: local_column.into(),
			foreign_column: foreign_column.into(),
		}
	}
}

/// A validated path ending at a unit column on the last hop's table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinPath {
	hops: Vec<JoinHop>,
	unit_column: String,
}

impl JoinPath {
	pub fn new(hops: Vec<JoinHop>, unit_column: impl Into<String>) -> Result<Self> {
		let unit_column = unit_column.into();
		if hops.is_empty() || hops.len() > MAX_JOIN_HOPS {
			return Err(DbError::InvalidJoinPath(format!(
				"expected 1 to {MAX_JOIN_HOPS} hops, got {}",
				hops.len()
			)));
		}
		for hop in &hops {
			validate_identifier(&hop.table)?;
			validate_identifier(&hop.local_column)?;
			validate_identifier(&hop.foreign_column)?;
		}
		validate_identifier(&unit_column)?;
		Ok(Self { hops, unit_column })
	}

	pub fn hops(&self) -> &[JoinHop] {
		&self.hops
	}

	pub fn unit_column(&self) -> &str {
		&self.unit_column
	}

	/// Alias of the join at `index` (0-based): `scope_j1`, `scope_j2`.
	pub fn alias(index: usize) -> String {
		format!("scope_j{}", index + 1)
	}

	/// Joins the path onto `query` and filters the terminal unit column.
	pub fn apply(&self, query: QueryBuilder, unit_id: &str) -> QueryBuilder {
		self.join_from(query, 0, unit_id)
	}

	/// Selects the first hop's row keyed by `key`, restricted to `unit_id`
	/// through the remaining hops. `query` must be over the first hop's table.
	pub fn anchor(&self, query: QueryBuilder, key: Value, unit_id: &str) -> QueryBuilder {
		let first = self.first_hop();
		let alias = query.alias().to_string();
		let query = query.and_where(Predicate::eq(
			ColumnRef::qualified(alias, &first.foreign_column),
			key,
		));
		self.join_from(query, 1, unit_id)
	}

	/// The first hop; paths always have at least one.
	pub fn first_hop(&self) -> &JoinHop {
		&self.hops[0]
	}

	fn join_from(&self, mut query: QueryBuilder, start: usize, unit_id: &str) -> QueryBuilder {
		let mut previous = query.alias().to_string();
		for (i, hop) in self.hops.iter().enumerate().skip(start) {
			let alias = Self::alias(i);
			query = query.inner_join(
				&hop.table,
				&alias,
				ColumnRef::qualified(&previous, &hop.local_column),
				ColumnRef::qualified(&alias, &hop.foreign_column),
			);
			previous = alias;
		}
		query.and_where(Predicate::eq(
			ColumnRef::qualified(previous, &self.unit_column),
			unit_id,
		))
	}
}

/// Entity name to join path.
#[derive(Debug, Clone, Default)]
pub struct JoinPathTable {
	paths: HashMap<String, JoinPath>,
}

impl JoinPathTable {
	pub fn new() -> Self {
		Self::default()
	}

	/// Builder: register the path for `entity`.
	pub fn with(mut self, entity: impl Into<String>, path: JoinPath) -> Self {
		self.insert(entity, path);
		self
	}

	pub fn insert(&mut self, entity: impl Into<String>, path: JoinPath) {
		self.paths.insert(entity.into(), path);
	}

	pub fn get(&self, entity: &str) -> Option<&JoinPath> {
		self.paths.get(entity)
	}

	pub fn len(&self) -> usize {
		self.paths.len()
	}

	pub fn is_empty(&self) -> bool {
		self.paths.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn payment_path() -> JoinPath {
		JoinPath::new(
			vec![
				JoinHop::new("requests", "request_id", "id"),
				JoinHop::new("citizens", "citizen_id", "id"),
			],
			"unit_id",
		)
		.unwrap()
	}

	#[test]
	fn path_length_is_bounded() {
		assert!(matches!(
			JoinPath::new(vec![], "unit_id"),
			Err(DbError::InvalidJoinPath(_))
		));
		let three = vec![JoinHop::new("a", "a_id", "id"); 3];
		assert!(matches!(
			JoinPath::new(three, "unit_id"),
			Err(DbError::InvalidJoinPath(_))
		));
	}

	#[test]
	fn path_identifiers_are_validated() {
		assert!(matches!(
			JoinPath::new(vec![JoinHop::new("requests", "request_id", "id;")], "unit_id"),
			Err(DbError::InvalidIdentifier(_))
		));
		assert!(matches!(
			JoinPath::new(vec![JoinHop::new("requests", "request_id", "id")], "unit id"),
			Err(DbError::InvalidIdentifier(_))
		));
	}

	#[test]
	fn two_hop_path_renders_chained_joins() {
		let stmt = payment_path()
			.apply(QueryBuilder::new("payments", "p"), "u1")
			.to_select()
			.unwrap();
		assert_eq!(
			stmt.sql,
			"SELECT \"p\".* FROM \"payments\" AS \"p\" \
			 INNER JOIN \"requests\" AS \"scope_j1\" ON \"p\".\"request_id\" = \"scope_j1\".\"id\" \
			 INNER JOIN \"citizens\" AS \"scope_j2\" ON \"scope_j1\".\"citizen_id\" = \"scope_j2\".\"id\" \
			 WHERE \"scope_j2\".\"unit_id\" = ?"
		);
		assert_eq!(stmt.binds, vec![json!("u1")]);
	}

	#[test]
	fn anchor_skips_the_first_hop() {
		let stmt = payment_path()
			.anchor(QueryBuilder::new("requests", "requests"), json!("r1"), "u1")
			.to_select()
			.unwrap();
		assert_eq!(
			stmt.sql,
			"SELECT \"requests\".* FROM \"requests\" AS \"requests\" \
			 INNER JOIN \"citizens\" AS \"scope_j2\" ON \"requests\".\"citizen_id\" = \"scope_j2\".\"id\" \
			 WHERE \"requests\".\"id\" = ? AND \"scope_j2\".\"unit_id\" = ?"
		);
		assert_eq!(stmt.binds, vec![json!("r1"), json!("u1")]);
	}

	#[test]
	fn table_lookup_is_by_entity_name() {
		let table = JoinPathTable::new().with("payments", payment_path());
		assert_eq!(table.len(), 1);
		assert!(table.get("payments").is_some());
		assert!(table.get("requests").is_none());
	}
}
