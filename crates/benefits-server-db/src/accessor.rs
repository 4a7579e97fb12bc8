// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Scope-enforcing data access.
//!
//! [`ScopedDataAccessor`] wraps a [`StoragePort`] for one entity type and
//! restricts every read and write to the [`ScopeContext`] bound to the
//! current request:
//!
//! | Scope  | Filter                                                          |
//! |--------|-----------------------------------------------------------------|
//! | GLOBAL | none                                                            |
//! | UNIT   | unit column, else the entity's whitelisted join path, else none |
//! | OWN    | actor column, else none                                         |
//!
//! "None" for UNIT and OWN is a degraded case: it is logged, never silently
//! treated as global, and bulk mutations refuse to run under it.
//!
//! Scoped operations invoked without a bound context fail with
//! [`DbError::ScopeContextRequired`]. The unscoped `*_global` methods are
//! gated by [`AccessMode`].

use std::marker::PhantomData;
use std::sync::Arc;

use benefits_server_auth::{
	current_scope, AuditEventType, AuditLogEntry, AuditSink, ScopeContext, ScopeType,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::criteria::{ColumnRef, Criteria, FindOptions, OrderBy, Predicate, QueryBuilder, SqlStatement};
use crate::error::{DbError, Result};
use crate::join_path::{JoinPath, JoinPathTable};
use crate::metadata_cache::{CachedEntityMetadata, EntityMetadataCache};
use crate::store::{from_record, to_record, Record, ScopedEntity, StoragePort};

pub const MAX_PAGE_SIZE: u32 = 1000;

const CREATED_AT: &str = "created_at";
const UPDATED_AT: &str = "updated_at";
const RESERVED_ALIAS_PREFIX: &str = "scope_j";

/// Whether unscoped methods are available to non-global callers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
	/// Unscoped methods require a bound GLOBAL context.
	#[default]
	Strict,
	/// Unscoped methods always run. For trusted background jobs only.
	Permissive,
}

/// Names of the ownership columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeColumns {
	pub unit: String,
	pub actor: String,
}

impl Default for ScopeColumns {
	fn default() -> Self {
		Self {
			unit: "unit_id".to_string(),
			actor: "actor_id".to_string(),
		}
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessorConfig {
	pub mode: AccessMode,
	pub columns: ScopeColumns,
}

/// One page of results. Pages are 1-based.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
	pub items: Vec<T>,
	pub total: u64,
	pub page: u32,
	pub size: u32,
	pub total_pages: u32,
}

/// How the active scope restricts this entity.
#[derive(Debug, Clone)]
enum ScopeFilter {
	Unrestricted,
	Column { column: String, value: String },
	Joined { path: JoinPath, unit_id: String },
	Degraded,
}

impl ScopeFilter {
	fn apply(&self, query: QueryBuilder) -> QueryBuilder {
		match self {
			ScopeFilter::Column { column, value } => {
				let alias = query.alias().to_string();
				query.and_where(Predicate::eq(
					ColumnRef::qualified(alias, column.as_str()),
					value.as_str(),
				))
			}
			ScopeFilter::Joined { path, unit_id } => path.apply(query, unit_id),
			ScopeFilter::Unrestricted | ScopeFilter::Degraded => query,
		}
	}

	/// The filter as a predicate on the base table, when it is one.
	fn column_predicate(&self) -> Option<Predicate> {
		match self {
			ScopeFilter::Column { column, value } => {
				Some(Predicate::eq(ColumnRef::new(column.as_str()), value.as_str()))
			}
			_ => None,
		}
	}
}

/// Scope-enforcing accessor for entity `E`.
pub struct ScopedDataAccessor<E> {
	storage: Arc<dyn StoragePort>,
	metadata: Arc<EntityMetadataCache>,
	join_paths: Arc<JoinPathTable>,
	audit: Arc<dyn AuditSink>,
	config: AccessorConfig,
	_entity: PhantomData<fn() -> E>,
}

impl<E> Clone for ScopedDataAccessor<E> {
	fn clone(&self) -> Self {
		Self {
			storage: Arc::clone(&self.storage),
			metadata: Arc::clone(&self.metadata),
			join_paths: Arc::clone(&self.join_paths),
			audit: Arc::clone(&self.audit),
			config: self.config.clone(),
			_entity: PhantomData,
		}
	}
}

impl<E: ScopedEntity> ScopedDataAccessor<E> {
	pub fn new(
		storage: Arc<dyn StoragePort>,
		metadata: Arc<EntityMetadataCache>,
		join_paths: Arc<JoinPathTable>,
		audit: Arc<dyn AuditSink>,
		config: AccessorConfig,
	) -> Self {
		Self {
			storage,
			metadata,
			join_paths,
			audit,
			config,
			_entity: PhantomData,
		}
	}

	pub fn mode(&self) -> AccessMode {
		self.config.mode
	}

	// -------------------------------------------------------------------------
	// Scoped reads
	// -------------------------------------------------------------------------

	#[tracing::instrument(skip(self, options), fields(entity = E::TABLE))]
	pub async fn find_all(&self, options: FindOptions) -> Result<Vec<E>> {
		let query = self.scoped_query("find_all", E::TABLE).await?;
		self.fetch_entities(&query.with_options(options)).await
	}

	#[tracing::instrument(skip(self, options), fields(entity = E::TABLE))]
	pub async fn find_by_id(&self, id: &str, options: FindOptions) -> Result<Option<E>> {
		let query = self
			.scoped_query("find_by_id", E::TABLE)
			.await?
			.and_where(Self::id_predicate(E::TABLE, id))
			.with_options(options);
		self.storage.find_one(&query).await?.map(from_record).transpose()
	}

	#[tracing::instrument(skip(self), fields(entity = E::TABLE))]
	pub async fn count(&self) -> Result<u64> {
		let query = self.scoped_query("count", E::TABLE).await?;
		self.storage.count(&query).await
	}

	/// Returns page `page` (1-based) of `size` items; `size` is clamped to
	/// `1..=MAX_PAGE_SIZE`. `options.limit` and `options.offset` are ignored.
	#[tracing::instrument(skip(self, options), fields(entity = E::TABLE))]
	pub async fn find_page(&self, page: u32, size: u32, options: FindOptions) -> Result<Page<E>> {
		let page = page.max(1);
		let size = size.clamp(1, MAX_PAGE_SIZE);

		let base = self
			.scoped_query("find_page", E::TABLE)
			.await?
			.and_criteria(options.criteria);
		let total = self.storage.count(&base).await?;

		let query = options
			.order
			.into_iter()
			.fold(base, QueryBuilder::order_by)
			.limit(size)
			.offset((page - 1).saturating_mul(size));
		let items = self.fetch_entities(&query).await?;

		let total_pages = u32::try_from(total.div_ceil(u64::from(size))).unwrap_or(u32::MAX);
		Ok(Page {
			items,
			total,
			page,
			size,
			total_pages,
		})
	}

	/// Returns a query builder pre-seeded with the scope filter.
	///
	/// Aliases starting with `scope_j` are reserved for join paths.
	#[tracing::instrument(skip(self), fields(entity = E::TABLE))]
	pub async fn create_scoped_query_builder(&self, alias: &str) -> Result<ScopedQueryBuilder<'_, E>> {
		crate::criteria::validate_identifier(alias)?;
		if alias.starts_with(RESERVED_ALIAS_PREFIX) {
			return Err(DbError::InvalidIdentifier(format!(
				"alias {alias} is reserved for scope joins"
			)));
		}
		let query = self.scoped_query("create_scoped_query_builder", alias).await?;
		Ok(ScopedQueryBuilder {
			accessor: self,
			query,
		})
	}

	// -------------------------------------------------------------------------
	// Scoped writes
	// -------------------------------------------------------------------------

	/// Inserts an entity, stamping ownership columns from the active scope.
	///
	/// The actor column is always set to the context actor and the unit
	/// column to the context unit, when the context has one. A join-path
	/// entity must reference a row visible in the active unit. A missing id is
	/// generated and `created_at` / `updated_at` are filled when the table has
	/// them.
	#[tracing::instrument(skip(self, partial), fields(entity = E::TABLE))]
	pub async fn save_scoped<P>(&self, partial: &P) -> Result<E>
	where
		P: Serialize + ?Sized + Sync,
	{
		let ctx = self.require_scope("save_scoped")?;
		let meta = self.metadata.metadata(E::TABLE).await?;
		let mut record = to_record(partial)?;
		let columns = &self.config.columns;

		if meta.has_column(&columns.actor) {
			record.insert(columns.actor.clone(), json!(ctx.actor_id().to_string()));
		}
		if !ctx.is_global() && meta.has_column(&columns.unit) {
			match ctx.unit_id() {
				Some(unit_id) => {
					record.insert(columns.unit.clone(), json!(unit_id.to_string()));
				}
				None if !is_unset(&record, &columns.unit) => {
					return Err(self.violation(
						&ctx,
						"save_scoped",
						json!({ "reason": "unit_without_context_unit", "column": columns.unit }),
						format!("save_scoped may not set {}.{} without a context unit", E::TABLE, columns.unit),
					));
				}
				None => tracing::warn!(
					entity = E::TABLE,
					actor_id = %ctx.actor_id(),
					scope_type = %ctx.scope_type(),
					"scope without unit id, unit column not stamped"
				),
			}
		}
		if let ScopeFilter::Joined { path, unit_id } = self.filter_for(&ctx).await? {
			self.ensure_anchor_in_scope(&ctx, &path, &unit_id, &record).await?;
		}

		if meta.has_column(E::ID_COLUMN) && is_unset(&record, E::ID_COLUMN) {
			record.insert(E::ID_COLUMN.to_string(), json!(Uuid::new_v4().to_string()));
		}
		let now = json!(Utc::now().to_rfc3339());
		for column in [CREATED_AT, UPDATED_AT] {
			if meta.has_column(column) && is_unset(&record, column) {
				record.insert(column.to_string(), now.clone());
			}
		}

		ensure_known_columns(&meta, &record)?;
		let stored = self.storage.insert(E::TABLE, &record).await?;
		tracing::debug!(entity = E::TABLE, scope_type = %ctx.scope_type(), "entity saved");
		from_record(stored)
	}

	/// Updates one in-scope row. Fails with `ScopeViolation` when the row is
	/// not visible under the active scope or the patch would move it out.
	#[tracing::instrument(skip(self, patch), fields(entity = E::TABLE))]
	pub async fn update_scoped<P>(&self, id: &str, patch: &P) -> Result<E>
	where
		P: Serialize + ?Sized + Sync,
	{
		let ctx = self.require_scope("update_scoped")?;
		let filter = self.filter_for(&ctx).await?;
		let mut patch = to_record(patch)?;
		self.check_patch(&ctx, &filter, &patch, "update_scoped")?;

		let meta = self.metadata.metadata(E::TABLE).await?;
		ensure_known_columns(&meta, &patch)?;
		if patch
			.get(E::ID_COLUMN)
			.is_some_and(|v| v.as_str() != Some(id))
		{
			return Err(DbError::Conflict(format!(
				"{}.{} cannot be changed",
				E::TABLE,
				E::ID_COLUMN
			)));
		}

		let Some(existing) = self.find_record_in_scope(&filter, id).await? else {
			return Err(self.out_of_scope(&ctx, "update_scoped", id));
		};
		if patch.is_empty() {
			return from_record(existing);
		}
		if meta.has_column(UPDATED_AT) && !patch.contains_key(UPDATED_AT) {
			patch.insert(UPDATED_AT.to_string(), json!(Utc::now().to_rfc3339()));
		}

		let mut criteria = Criteria::by_id(E::ID_COLUMN, id);
		if let Some(predicate) = filter.column_predicate() {
			criteria = criteria.with(predicate);
		}
		let affected = self.storage.update(E::TABLE, &criteria, &patch).await?;
		if affected == 0 {
			return Err(DbError::NotFound(format!("{} {id}", E::TABLE)));
		}

		self
			.find_record_in_scope(&filter, id)
			.await?
			.map(from_record)
			.transpose()?
			.ok_or_else(|| DbError::NotFound(format!("{} {id}", E::TABLE)))
	}

	/// Deletes one in-scope row. Fails with `ScopeViolation` when the row is
	/// not visible under the active scope.
	#[tracing::instrument(skip(self), fields(entity = E::TABLE))]
	pub async fn delete_scoped(&self, id: &str) -> Result<()> {
		let ctx = self.require_scope("delete_scoped")?;
		let filter = self.filter_for(&ctx).await?;

		if self.find_record_in_scope(&filter, id).await?.is_none() {
			return Err(self.out_of_scope(&ctx, "delete_scoped", id));
		}

		let mut criteria = Criteria::by_id(E::ID_COLUMN, id);
		if let Some(predicate) = filter.column_predicate() {
			criteria = criteria.with(predicate);
		}
		let affected = self.storage.delete(E::TABLE, &criteria).await?;
		if affected == 0 {
			return Err(DbError::NotFound(format!("{} {id}", E::TABLE)));
		}
		Ok(())
	}

	/// Updates every row matching `criteria` within the active scope.
	///
	/// `criteria` may only reference columns of the entity's own table.
	#[tracing::instrument(skip(self, criteria, patch), fields(entity = E::TABLE))]
	pub async fn update_bulk<P>(&self, criteria: Criteria, patch: &P) -> Result<u64>
	where
		P: Serialize + ?Sized + Sync,
	{
		let ctx = self.require_scope("update_bulk")?;
		let filter = self.filter_for(&ctx).await?;
		let mut patch = to_record(patch)?;
		self.check_patch(&ctx, &filter, &patch, "update_bulk")?;
		let criteria = self.bulk_criteria(&ctx, &filter, criteria, "update_bulk")?;

		let meta = self.metadata.metadata(E::TABLE).await?;
		ensure_known_columns(&meta, &patch)?;
		if patch.is_empty() {
			return Ok(0);
		}
		if meta.has_column(UPDATED_AT) && !patch.contains_key(UPDATED_AT) {
			patch.insert(UPDATED_AT.to_string(), json!(Utc::now().to_rfc3339()));
		}

		let affected = self.storage.update(E::TABLE, &criteria, &patch).await?;
		tracing::debug!(entity = E::TABLE, affected, "bulk update");
		Ok(affected)
	}

	/// Deletes every row matching `criteria` within the active scope.
	#[tracing::instrument(skip(self, criteria), fields(entity = E::TABLE))]
	pub async fn delete_bulk(&self, criteria: Criteria) -> Result<u64> {
		let ctx = self.require_scope("delete_bulk")?;
		let filter = self.filter_for(&ctx).await?;
		let criteria = self.bulk_criteria(&ctx, &filter, criteria, "delete_bulk")?;

		let affected = self.storage.delete(E::TABLE, &criteria).await?;
		tracing::debug!(entity = E::TABLE, affected, "bulk delete");
		Ok(affected)
	}

	// -------------------------------------------------------------------------
	// Unscoped access
	// -------------------------------------------------------------------------

	#[tracing::instrument(skip(self, options), fields(entity = E::TABLE))]
	pub async fn find_all_global(&self, options: FindOptions) -> Result<Vec<E>> {
		self.authorize_global("find_all_global")?;
		let query = self
			.storage
			.query_builder(E::TABLE, E::TABLE)
			.with_options(options);
		self.fetch_entities(&query).await
	}

	#[tracing::instrument(skip(self), fields(entity = E::TABLE))]
	pub async fn find_by_id_global(&self, id: &str) -> Result<Option<E>> {
		self.authorize_global("find_by_id_global")?;
		let query = self
			.storage
			.query_builder(E::TABLE, E::TABLE)
			.and_where(Self::id_predicate(E::TABLE, id));
		self.storage.find_one(&query).await?.map(from_record).transpose()
	}

	#[tracing::instrument(skip(self), fields(entity = E::TABLE))]
	pub async fn count_global(&self) -> Result<u64> {
		self.authorize_global("count_global")?;
		let query = self.storage.query_builder(E::TABLE, E::TABLE);
		self.storage.count(&query).await
	}

	// -------------------------------------------------------------------------
	// Internals
	// -------------------------------------------------------------------------

	fn id_predicate(alias: &str, id: &str) -> Predicate {
		Predicate::eq(ColumnRef::qualified(alias, E::ID_COLUMN), id)
	}

	fn require_scope(&self, operation: &'static str) -> Result<Arc<ScopeContext>> {
		if let Some(ctx) = current_scope() {
			return Ok(ctx);
		}
		tracing::error!(
			entity = E::TABLE,
			operation,
			"scoped operation invoked without a scope context"
		);
		self.record(AuditEventType::ScopeContextMissing, None, operation, Value::Null);
		Err(DbError::ScopeContextRequired { operation })
	}

	async fn filter_for(&self, ctx: &ScopeContext) -> Result<ScopeFilter> {
		let columns = &self.config.columns;
		match ctx.scope_type() {
			ScopeType::Global => Ok(ScopeFilter::Unrestricted),
			ScopeType::Unit => {
				let Some(unit_id) = ctx.unit_id() else {
					tracing::warn!(
						entity = E::TABLE,
						actor_id = %ctx.actor_id(),
						"unit scope without unit id, no unit filter applied"
					);
					return Ok(ScopeFilter::Degraded);
				};
				if self.metadata.has_column(E::TABLE, &columns.unit).await? {
					return Ok(ScopeFilter::Column {
						column: columns.unit.clone(),
						value: unit_id.to_string(),
					});
				}
				if let Some(path) = self.join_paths.get(E::TABLE) {
					return Ok(ScopeFilter::Joined {
						path: path.clone(),
						unit_id: unit_id.to_string(),
					});
				}
				tracing::warn!(
					entity = E::TABLE,
					"entity has no unit column and no join path, no unit filter applied"
				);
				Ok(ScopeFilter::Degraded)
			}
			ScopeType::Own => {
				if self.metadata.has_column(E::TABLE, &columns.actor).await? {
					return Ok(ScopeFilter::Column {
						column: columns.actor.clone(),
						value: ctx.actor_id().to_string(),
					});
				}
				tracing::warn!(
					entity = E::TABLE,
					column = %columns.actor,
					"entity has no actor column, own scope cannot be enforced"
				);
				Ok(ScopeFilter::Degraded)
			}
		}
	}

	async fn scoped_query(&self, operation: &'static str, alias: &str) -> Result<QueryBuilder> {
		let ctx = self.require_scope(operation)?;
		let filter = self.filter_for(&ctx).await?;
		Ok(filter.apply(self.storage.query_builder(E::TABLE, alias)))
	}

	async fn find_record_in_scope(&self, filter: &ScopeFilter, id: &str) -> Result<Option<Record>> {
		let query = filter
			.apply(self.storage.query_builder(E::TABLE, E::TABLE))
			.and_where(Self::id_predicate(E::TABLE, id));
		self.storage.find_one(&query).await
	}

	async fn fetch_entities(&self, query: &QueryBuilder) -> Result<Vec<E>> {
		self
			.storage
			.find_many(query)
			.await?
			.into_iter()
			.map(from_record)
			.collect()
	}

	/// Intersects bulk criteria with the scope filter.
	fn bulk_criteria(
		&self,
		ctx: &ScopeContext,
		filter: &ScopeFilter,
		criteria: Criteria,
		operation: &'static str,
	) -> Result<Criteria> {
		if criteria.has_qualified_columns() {
			return Err(DbError::InvalidIdentifier(format!(
				"{operation} criteria may only reference {} columns",
				E::TABLE
			)));
		}
		match filter {
			ScopeFilter::Unrestricted => Ok(criteria),
			ScopeFilter::Column { column, value } => Ok(criteria.with(Predicate::eq(
				ColumnRef::new(column.as_str()),
				value.as_str(),
			))),
			ScopeFilter::Joined { .. } | ScopeFilter::Degraded => {
				let detail = format!(
					"{operation} on {} is not supported under {} scope: no scope column",
					E::TABLE,
					ctx.scope_type()
				);
				tracing::warn!(entity = E::TABLE, operation, "refused unscopable bulk mutation");
				self.record(
					AuditEventType::ScopeViolation,
					Some(ctx),
					operation,
					json!({ "reason": "no_scope_column" }),
				);
				Err(DbError::ScopeViolation(detail))
			}
		}
	}

	/// Rejects patches that would move a row out of the active scope.
	fn check_patch(
		&self,
		ctx: &ScopeContext,
		filter: &ScopeFilter,
		patch: &Record,
		operation: &'static str,
	) -> Result<()> {
		let columns = &self.config.columns;
		let unit = ctx.unit_id().map(|u| u.to_string());
		let guarded: Vec<(&str, Option<String>)> = match (ctx.scope_type(), filter) {
			(ScopeType::Global, _) => vec![],
			(_, ScopeFilter::Joined { path, .. }) => {
				vec![(path.first_hop().local_column.as_str(), None)]
			}
			(ScopeType::Unit, _) => vec![(columns.unit.as_str(), unit)],
			(ScopeType::Own, _) => vec![
				(columns.actor.as_str(), Some(ctx.actor_id().to_string())),
				(columns.unit.as_str(), unit),
			],
		};

		for (column, expected) in guarded {
			let Some(value) = patch.get(column) else {
				continue;
			};
			if matches!((value, &expected), (Value::String(v), Some(e)) if v == e) {
				continue;
			}

			tracing::warn!(entity = E::TABLE, operation, column, "patch would move rows out of scope");
			return Err(self.violation(
				ctx,
				operation,
				json!({ "reason": "scope_column_changed", "column": column }),
				format!("{operation} may not change {}.{column}", E::TABLE),
			));
		}
		Ok(())
	}

	/// Rejects a new row whose first join hop points outside the active unit.
	async fn ensure_anchor_in_scope(
		&self,
		ctx: &ScopeContext,
		path: &JoinPath,
		unit_id: &str,
		record: &Record,
	) -> Result<()> {
		let hop = path.first_hop();
		let visible = match record.get(&hop.local_column) {
			Some(key) if !key.is_null() => {
				let query = path.anchor(
					self.storage.query_builder(&hop.table, &hop.table),
					key.clone(),
					unit_id,
				);
				self.storage.find_one(&query).await?.is_some()
			}
			_ => false,
		};
		if visible {
			return Ok(());
		}

		tracing::warn!(
			entity = E::TABLE,
			column = %hop.local_column,
			"new row references a row outside the active unit"
		);
		Err(self.violation(
			ctx,
			"save_scoped",
			json!({ "reason": "reference_not_in_scope", "column": hop.local_column }),
			format!(
				"{}.{} must reference a {} row in the active unit",
				E::TABLE,
				hop.local_column,
				hop.table
			),
		))
	}

	fn violation(
		&self,
		ctx: &ScopeContext,
		operation: &'static str,
		details: Value,
		detail: String,
	) -> DbError {
		self.record(AuditEventType::ScopeViolation, Some(ctx), operation, details);
		DbError::ScopeViolation(detail)
	}

	fn out_of_scope(&self, ctx: &ScopeContext, operation: &'static str, id: &str) -> DbError {
		tracing::warn!(entity = E::TABLE, operation, id, "row not found within scope");
		self.record(
			AuditEventType::ScopeViolation,
			Some(ctx),
			operation,
			json!({ "reason": "row_not_in_scope", "id": id }),
		);
		DbError::ScopeViolation(format!(
			"{} {id} is not within the active {} scope",
			E::TABLE,
			ctx.scope_type()
		))
	}

	fn authorize_global(&self, method: &'static str) -> Result<()> {
		let ctx = current_scope();
		if self.config.mode == AccessMode::Strict && !ctx.as_ref().is_some_and(|c| c.is_global()) {
			tracing::error!(
				entity = E::TABLE,
				method,
				scope_type = ctx.as_ref().map(|c| c.scope_type().to_string()).as_deref(),
				"strict mode refused unscoped access"
			);
			self.record(
				AuditEventType::StrictModeViolation,
				ctx.as_deref(),
				method,
				Value::Null,
			);
			return Err(DbError::StrictModeViolation { method });
		}

		self.record(
			AuditEventType::GlobalAccess,
			ctx.as_deref(),
			method,
			json!({ "mode": self.config.mode }),
		);
		Ok(())
	}

	fn record(
		&self,
		event_type: AuditEventType,
		ctx: Option<&ScopeContext>,
		action: &'static str,
		details: Value,
	) {
		let mut builder = AuditLogEntry::builder(event_type)
			.resource(E::TABLE)
			.action(action)
			.details(details);
		if let Some(ctx) = ctx {
			builder = builder.context(ctx);
		}
		self.audit.record(builder.build());
	}
}

fn is_unset(record: &Record, column: &str) -> bool {
	record.get(column).map_or(true, Value::is_null)
}

fn ensure_known_columns(meta: &CachedEntityMetadata, record: &Record) -> Result<()> {
	match record.keys().find(|k| !meta.has_column(k)) {
		Some(unknown) => Err(DbError::InvalidIdentifier(format!(
			"{}.{unknown}",
			meta.entity_name
		))),
		None => Ok(()),
	}
}

/// Query builder carrying the scope filter of the accessor that made it.
///
/// Predicates can be added but the scope filter cannot be removed.
pub struct ScopedQueryBuilder<'a, E: ScopedEntity> {
	accessor: &'a ScopedDataAccessor<E>,
	query: QueryBuilder,
}

impl<'a, E: ScopedEntity> ScopedQueryBuilder<'a, E> {
	pub fn alias(&self) -> &str {
		self.query.alias()
	}

	pub fn and_where(mut self, predicate: Predicate) -> Self {
		self.query = self.query.and_where(predicate);
		self
	}

	pub fn filter(mut self, criteria: Criteria) -> Self {
		self.query = self.query.and_criteria(criteria);
		self
	}

	pub fn order_by(mut self, order: OrderBy) -> Self {
		self.query = self.query.order_by(order);
		self
	}

	pub fn limit(mut self, limit: u32) -> Self {
		self.query = self.query.limit(limit);
		self
	}

	pub fn offset(mut self, offset: u32) -> Self {
		self.query = self.query.offset(offset);
		self
	}

	pub fn to_select(&self) -> Result<SqlStatement> {
		self.query.to_select()
	}

	pub async fn fetch(&self) -> Result<Vec<E>> {
		self.accessor.fetch_entities(&self.query).await
	}

	pub async fn fetch_one(&self) -> Result<Option<E>> {
		self
			.accessor
			.storage
			.find_one(&self.query)
			.await?
			.map(from_record)
			.transpose()
	}

	pub async fn fetch_count(&self) -> Result<u64> {
		self.accessor.storage.count(&self.query).await
	}
}
