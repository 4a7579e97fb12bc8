// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Wiring of the scope core from resolved configuration.

use std::sync::Arc;

use benefits_server_auth::{
	AuditSink, AuthorizerConfig, CachedGrantLookup, PermissionAuthorizer, TracingAuditSink,
};
use benefits_server_config::{ScopeConfig, ServerConfig};
use benefits_server_db::{
	create_pool, run_migrations, AccessMode, AccessorConfig, CapabilityGrantRepository,
	EntityMetadataCache, JoinHop, JoinPath, JoinPathTable, ScopeColumns, ScopedDataAccessor,
	ScopedEntity, SqliteMetadataStore, SqliteStore,
};
use sqlx::sqlite::SqlitePool;

use crate::error::Result;

pub type GrantCache = CachedGrantLookup<CapabilityGrantRepository>;

/// Long-lived collaborators shared by every request.
pub struct ScopeCore {
	pool: SqlitePool,
	storage: Arc<SqliteStore>,
	metadata: Arc<EntityMetadataCache>,
	join_paths: Arc<JoinPathTable>,
	grants: Arc<GrantCache>,
	authorizer: Arc<PermissionAuthorizer>,
	audit: Arc<dyn AuditSink>,
	accessor_config: AccessorConfig,
}

impl ScopeCore {
	/// Opens the configured database, applies migrations and wires the core
	/// with audit events going to tracing.
	#[tracing::instrument(skip(config), fields(database = %config.database.url))]
	pub async fn from_config(config: &ServerConfig) -> Result<Self> {
		let pool = create_pool(&config.database.url).await?;
		run_migrations(&pool).await?;
		Self::from_pool(pool, config, Arc::new(TracingAuditSink))
	}

	/// Wires the core over an existing, migrated pool.
	pub fn from_pool(pool: SqlitePool, config: &ServerConfig, audit: Arc<dyn AuditSink>) -> Result<Self> {
		let storage = Arc::new(SqliteStore::new(pool.clone()));

		let mut metadata = EntityMetadataCache::new(storage.clone(), config.metadata_cache.ttl());
		if config.metadata_cache.distributed {
			metadata = metadata.with_distributed(Arc::new(SqliteMetadataStore::new(pool.clone())));
		}

		let grants = Arc::new(CachedGrantLookup::new(
			CapabilityGrantRepository::new(pool.clone()),
			config.authz.grant_cache_ttl(),
		));
		let authorizer = Arc::new(PermissionAuthorizer::new(
			grants.clone(),
			audit.clone(),
			AuthorizerConfig {
				allow_request_scope_id: config.authz.allow_request_scope_id,
			},
		));

		let join_paths = build_join_paths(&config.scope)?;
		tracing::info!(
			join_paths = join_paths.len(),
			strict_mode = config.scope.strict_mode,
			"scope core ready"
		);

		Ok(Self {
			pool,
			storage,
			metadata: Arc::new(metadata),
			join_paths: Arc::new(join_paths),
			grants,
			authorizer,
			audit,
			accessor_config: AccessorConfig {
				mode: if config.scope.strict_mode {
					AccessMode::Strict
				} else {
					AccessMode::Permissive
				},
				columns: ScopeColumns {
					unit: config.scope.unit_column.clone(),
					actor: config.scope.actor_column.clone(),
				},
			},
		})
	}

	/// Accessor for request handlers, in the configured access mode.
	pub fn accessor<E: ScopedEntity>(&self) -> ScopedDataAccessor<E> {
		self.build_accessor(self.accessor_config.clone())
	}

	/// Permissive accessor for trusted background jobs that run without a
	/// request scope.
	pub fn background_accessor<E: ScopedEntity>(&self) -> ScopedDataAccessor<E> {
		self.build_accessor(AccessorConfig {
			mode: AccessMode::Permissive,
			..self.accessor_config.clone()
		})
	}

	fn build_accessor<E: ScopedEntity>(&self, config: AccessorConfig) -> ScopedDataAccessor<E> {
		ScopedDataAccessor::new(
			self.storage.clone(),
			self.metadata.clone(),
			self.join_paths.clone(),
			self.audit.clone(),
			config,
		)
	}

	pub fn authorizer(&self) -> &PermissionAuthorizer {
		&self.authorizer
	}

	/// Grant storage, for administration.
	pub fn grant_repository(&self) -> CapabilityGrantRepository {
		CapabilityGrantRepository::new(self.pool.clone())
	}

	/// Grant cache; invalidate after changing an actor's grants.
	pub fn grant_cache(&self) -> &GrantCache {
		&self.grants
	}

	pub fn metadata(&self) -> &EntityMetadataCache {
		&self.metadata
	}

	pub fn pool(&self) -> &SqlitePool {
		&self.pool
	}
}

fn build_join_paths(config: &ScopeConfig) -> Result<JoinPathTable> {
	let mut table = JoinPathTable::new();
	for path in &config.join_paths {
		let hops = path
			.hops
			.iter()
			.map(|hop| JoinHop::new(&hop.table, &hop.local_column, &hop.foreign_column))
			.collect();
		table.insert(&path.entity, JoinPath::new(hops, &path.unit_column)?);
	}
	Ok(table)
}
