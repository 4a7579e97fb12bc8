// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Filter criteria and the storage query builder.
//!
//! Values always travel as bind parameters. Identifiers (tables, aliases,
//! columns) cannot be bound, so every identifier is validated against
//! [`validate_identifier`] before it is rendered into SQL.

use serde_json::Value;

use crate::error::{DbError, Result};

/// Returns `Ok` when `ident` is a plain SQL identifier (`[A-Za-z_][A-Za-z0-9_]*`).
pub fn validate_identifier(ident: &str) -> Result<()> {
	let mut chars = ident.chars();
	let valid = match chars.next() {
		Some(first) if first.is_ascii_alphabetic() || first == '_' => {
			chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
		}
		_ => false,
	};
	if valid {
		Ok(())
	} else {
		Err(DbError::InvalidIdentifier(ident.to_string()))
	}
}

fn quote(ident: &str) -> Result<String> {
	validate_identifier(ident)?;
	Ok(format!("\"{ident}\""))
}

/// A column reference, optionally qualified by a table alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
	pub qualifier: Option<String>,
	pub name: String,
}

impl ColumnRef {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			qualifier: None,
			name: name.into(),
		}
	}

	pub fn qualified(qualifier: impl Into<String>, name: impl Into<String>) -> Self {
		Self {
			qualifier: Some(qualifier.into()),
			name: name.into(),
		}
	}

	/// Renders the reference; unqualified columns take `default_qualifier`.
	fn render(&self, default_qualifier: Option<&str>) -> Result<String> {
		match self.qualifier.as_deref().or(default_qualifier) {
			Some(q) => Ok(format!("{}.{}", quote(q)?, quote(&self.name)?)),
			None => quote(&self.name),
		}
	}
}

impl From<&str> for ColumnRef {
	/// Parses `column` or `alias.column`.
	fn from(s: &str) -> Self {
		match s.split_once('.') {
			Some((q, name)) => ColumnRef::qualified(q, name),
			None => ColumnRef::new(s),
		}
	}
}

impl From<String> for ColumnRef {
	fn from(s: String) -> Self {
		ColumnRef::from(s.as_str())
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
	Eq,
	Ne,
	Lt,
	Lte,
	Gt,
	Gte,
	Like,
}

impl CompareOp {
	fn as_sql(self) -> &'static str {
		match self {
			CompareOp::Eq => "=",
			CompareOp::Ne => "<>",
			CompareOp::Lt => "<",
			CompareOp::Lte => "<=",
			CompareOp::Gt => ">",
			CompareOp::Gte => ">=",
			CompareOp::Like => "LIKE",
		}
	}
}

/// One condition. Criteria AND their predicates together.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
	Compare {
		column: ColumnRef,
		op: CompareOp,
		value: Value,
	},
	In {
		column: ColumnRef,
		values: Vec<Value>,
	},
	Null {
		column: ColumnRef,
		negated: bool,
	},
}

impl Predicate {
	pub fn eq(column: impl Into<ColumnRef>, value: impl Into<Value>) -> Self {
		Predicate::Compare {
			column: column.into(),
			op: CompareOp::Eq,
			value: value.into(),
		}
	}

	pub fn column(&self) -> &ColumnRef {
		match self {
			Predicate::Compare { column, .. }
			| Predicate::In { column, .. }
			| Predicate::Null { column, .. } => column,
		}
	}

	fn render(&self, default_qualifier: Option<&str>, binds: &mut Vec<Value>) -> Result<String> {
		let column = self.column().render(default_qualifier)?;
		Ok(match self {
			Predicate::Compare { op, value, .. } => {
				if value.is_null() {
					match op {
						CompareOp::Eq => return Ok(format!("{column} IS NULL")),
						CompareOp::Ne => return Ok(format!("{column} IS NOT NULL")),
						_ => {}
					}
				}
				binds.push(value.clone());
				format!("{column} {} ?", op.as_sql())
			}
			Predicate::In { values, .. } if values.is_empty() => "0 = 1".to_string(),
			Predicate::In { values, .. } => {
				binds.extend(values.iter().cloned());
				let placeholders = vec!["?"; values.len()].join(", ");
				format!("{column} IN ({placeholders})")
			}
			Predicate::Null { negated: false, .. } => format!("{column} IS NULL"),
			Predicate::Null { negated: true, .. } => format!("{column} IS NOT NULL"),
		})
	}
}

/// A conjunction of predicates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Criteria {
	predicates: Vec<Predicate>,
}

impl Criteria {
	pub fn new() -> Self {
		Self::default()
	}

	/// Criteria matching one row by id.
	pub fn by_id(id_column: &str, id: impl Into<Value>) -> Self {
		Self::new().eq(id_column, id)
	}

	pub fn with(mut self, predicate: Predicate) -> Self {
		self.predicates.push(predicate);
		self
	}

	fn compare(self, column: &str, op: CompareOp, value: impl Into<Value>) -> Self {
		self.with(Predicate::Compare {
			column: column.into(),
			op,
			value: value.into(),
		})
	}

	pub fn eq(self, column: &str, value: impl Into<Value>) -> Self {
		self.compare(column, CompareOp::Eq, value)
	}

	pub fn ne(self, column: &str, value: impl Into<Value>) -> Self {
		self.compare(column, CompareOp::Ne, value)
	}

	pub fn lt(self, column: &str, value: impl Into<Value>) -> Self {
		self.compare(column, CompareOp::Lt, value)
	}

	pub fn lte(self, column: &str, value: impl Into<Value>) -> Self {
		self.compare(column, CompareOp::Lte, value)
	}

	pub fn gt(self, column: &str, value: impl Into<Value>) -> Self {
		self.compare(column, CompareOp::Gt, value)
	}

	pub fn gte(self, column: &str, value: impl Into<Value>) -> Self {
		self.compare(column, CompareOp::Gte, value)
	}

	pub fn like(self, column: &str, pattern: impl Into<String>) -> Self {
		self.compare(column, CompareOp::Like, Value::String(pattern.into()))
	}

	pub fn in_list<I, V>(self, column: &str, values: I) -> Self
	where
		I: IntoIterator<Item = V>,
		V: Into<Value>,
	{
		self.with(Predicate::In {
			column: column.into(),
			values: values.into_iter().map(Into::into).collect(),
		})
	}

	pub fn is_null(self, column: &str) -> Self {
		self.with(Predicate::Null {
			column: column.into(),
			negated: false,
		})
	}

	pub fn is_not_null(self, column: &str) -> Self {
		self.with(Predicate::Null {
			column: column.into(),
			negated: true,
		})
	}

	/// Intersects two criteria.
	pub fn and(mut self, other: Criteria) -> Self {
		self.predicates.extend(other.predicates);
		self
	}

	pub fn is_empty(&self) -> bool {
		self.predicates.is_empty()
	}

	pub fn predicates(&self) -> &[Predicate] {
		&self.predicates
	}

	/// Returns true if any predicate references a qualified column.
	pub fn has_qualified_columns(&self) -> bool {
		self.predicates.iter().any(|p| p.column().qualifier.is_some())
	}

	/// Renders a `WHERE` body. Empty criteria render as `1=1`.
	pub fn to_sql(&self, default_qualifier: Option<&str>, binds: &mut Vec<Value>) -> Result<String> {
		if self.predicates.is_empty() {
			return Ok("1=1".to_string());
		}
		let parts = self
			.predicates
			.iter()
			.map(|p| p.render(default_qualifier, binds))
			.collect::<Result<Vec<_>>>()?;
		Ok(parts.join(" AND "))
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortDirection {
	#[default]
	Asc,
	Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
	pub column: ColumnRef,
	pub direction: SortDirection,
}

impl OrderBy {
	pub fn asc(column: &str) -> Self {
		Self {
			column: column.into(),
			direction: SortDirection::Asc,
		}
	}

	pub fn desc(column: &str) -> Self {
		Self {
			column: column.into(),
			direction: SortDirection::Desc,
		}
	}
}

/// Options accepted by the finder methods.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
	pub criteria: Criteria,
	pub order: Vec<OrderBy>,
	pub limit: Option<u32>,
	pub offset: Option<u32>,
}

impl FindOptions {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn filter(mut self, criteria: Criteria) -> Self {
		self.criteria = self.criteria.and(criteria);
		self
	}

	pub fn order_by(mut self, order: OrderBy) -> Self {
		self.order.push(order);
		self
	}

	pub fn limit(mut self, limit: u32) -> Self {
		self.limit = Some(limit);
		self
	}

	pub fn offset(mut self, offset: u32) -> Self {
		self.offset = Some(offset);
		self
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Join {
	table: String,
	alias: String,
	left: ColumnRef,
	right: ColumnRef,
}

/// A rendered statement and its bind values in order.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
	pub sql: String,
	pub binds: Vec<Value>,
}

/// Builds `SELECT` statements over one base table with inner joins.
///
/// Unqualified columns in predicates and ordering refer to the base alias.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryBuilder {
	table: String,
	alias: String,
	joins: Vec<Join>,
	criteria: Criteria,
	order: Vec<OrderBy>,
	limit: Option<u32>,
	offset: Option<u32>,
}

impl QueryBuilder {
	pub fn new(table: impl Into<String>, alias: impl Into<String>) -> Self {
		Self {
			table: table.into(),
			alias: alias.into(),
			joins: Vec::new(),
			criteria: Criteria::new(),
			order: Vec::new(),
			limit: None,
			offset: None,
		}
	}

	pub fn table(&self) -> &str {
		&self.table
	}

	pub fn alias(&self) -> &str {
		&self.alias
	}

	pub fn criteria(&self) -> &Criteria {
		&self.criteria
	}

	/// Adds `INNER JOIN table AS alias ON left = right`.
	pub fn inner_join(
		mut self,
		table: impl Into<String>,
		alias: impl Into<String>,
		left: ColumnRef,
		right: ColumnRef,
	) -> Self {
		self.joins.push(Join {
			table: table.into(),
			alias: alias.into(),
			left,
			right,
		});
		self
	}

	pub fn and_where(mut self, predicate: Predicate) -> Self {
		self.criteria = self.criteria.with(predicate);
		self
	}

	pub fn and_criteria(mut self, criteria: Criteria) -> Self {
		self.criteria = self.criteria.and(criteria);
		self
	}

	pub fn order_by(mut self, order: OrderBy) -> Self {
		self.order.push(order);
		self
	}

	pub fn limit(mut self, limit: u32) -> Self {
		self.limit = Some(limit);
		self
	}

	pub fn offset(mut self, offset: u32) -> Self {
		self.offset = Some(offset);
		self
	}

	/// Applies criteria, ordering and paging from `options`.
	pub fn with_options(mut self, options: FindOptions) -> Self {
		self.criteria = self.criteria.and(options.criteria);
		self.order.extend(options.order);
		if options.limit.is_some() {
			self.limit = options.limit;
		}
		if options.offset.is_some() {
			self.offset = options.offset;
		}
		self
	}

	fn render_from(&self, binds: &mut Vec<Value>) -> Result<String> {
		let mut sql = format!("FROM {} AS {}", quote(&self.table)?, quote(&self.alias)?);
		for join in &self.joins {
			sql.push_str(&format!(
				" INNER JOIN {} AS {} ON {} = {}",
				quote(&join.table)?,
				quote(&join.alias)?,
				join.left.render(Some(self.alias.as_str()))?,
				join.right.render(Some(join.alias.as_str()))?,
			));
		}
		sql.push_str(" WHERE ");
		sql.push_str(&self.criteria.to_sql(Some(self.alias.as_str()), binds)?);
		Ok(sql)
	}

	/// Renders `SELECT alias.* ...` with ordering and paging.
	pub fn to_select(&self) -> Result<SqlStatement> {
		let mut binds = Vec::new();
		let from = self.render_from(&mut binds)?;
		let mut sql = format!("SELECT {}.* {from}", quote(&self.alias)?);

		if !self.order.is_empty() {
			let order = self
				.order
				.iter()
				.map(|o| {
					let dir = match o.direction {
						SortDirection::Asc => "ASC",
						SortDirection::Desc => "DESC",
					};
					Ok(format!("{} {dir}", o.column.render(Some(self.alias.as_str()))?))
				})
				.collect::<Result<Vec<_>>>()?;
			sql.push_str(" ORDER BY ");
			sql.push_str(&order.join(", "));
		}

		match (self.limit, self.offset) {
			(None, None) => {}
			(limit, offset) => {
				sql.push_str(" LIMIT ? OFFSET ?");
				binds.push(Value::from(limit.map(i64::from).unwrap_or(-1)));
				binds.push(Value::from(offset.unwrap_or(0)));
			}
		}

		Ok(SqlStatement { sql, binds })
	}

	/// Renders `SELECT COUNT(*) AS cnt ...`; ordering and paging are ignored.
	pub fn to_count(&self) -> Result<SqlStatement> {
		let mut binds = Vec::new();
		let from = self.render_from(&mut binds)?;
		Ok(SqlStatement {
			sql: format!("SELECT COUNT(*) AS cnt {from}"),
			binds,
		})
	}
}
