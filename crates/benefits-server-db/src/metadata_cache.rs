// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Two-tier cache of entity column sets.
//!
//! L1 is an in-process map checked on every lookup. On a miss or an expired
//! entry the column set is rebuilt from schema reflection, stored in L1 and
//! mirrored to the optional L2 [`DistributedMetadataStore`]. L2 writes run on
//! spawned tasks; a failed write is logged and never reaches the caller.
//! Lookups never wait on L2. It is read only by
//! [`EntityMetadataCache::warm_from_distributed`] at startup.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;

use crate::error::{DbError, Result};
use crate::store::SchemaReflector;

/// Column set of one entity as of `cached_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedEntityMetadata {
	pub entity_name: String,
	pub column_names: BTreeSet<String>,
	pub cached_at: DateTime<Utc>,
	pub ttl: Duration,
}

impl CachedEntityMetadata {
	pub fn new(entity_name: impl Into<String>, columns: Vec<String>, ttl: Duration) -> Self {
		Self {
			entity_name: entity_name.into(),
			column_names: columns.into_iter().collect(),
			cached_at: Utc::now(),
			ttl,
		}
	}

	/// An entry is valid only while `now - cached_at < ttl`.
	pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
		match now.signed_duration_since(self.cached_at).to_std() {
			Ok(age) => age < self.ttl,
			// cached_at ahead of the local clock
			Err(_) => !self.ttl.is_zero(),
		}
	}

	pub fn has_column(&self, column: &str) -> bool {
		self.column_names.contains(column)
	}
}

/// Snapshot of the L1 tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
	pub size: usize,
	pub entities: Vec<String>,
	pub oldest: Option<DateTime<Utc>>,
	pub newest: Option<DateTime<Utc>>,
}

/// Shared metadata tier for cross-process warm starts.
#[async_trait]
pub trait DistributedMetadataStore: Send + Sync {
	async fn get(&self, entity: &str) -> Result<Option<CachedEntityMetadata>>;
	async fn put(&self, metadata: &CachedEntityMetadata) -> Result<()>;
	async fn remove(&self, entity: &str) -> Result<()>;
	async fn clear(&self) -> Result<()>;
}

pub struct EntityMetadataCache {
	reflector: Arc<dyn SchemaReflector>,
	ttl: Duration,
	entries: RwLock<HashMap<String, Arc<CachedEntityMetadata>>>,
	distributed: Option<Arc<dyn DistributedMetadataStore>>,
}

impl EntityMetadataCache {
	pub fn new(reflector: Arc<dyn SchemaReflector>, ttl: Duration) -> Self {
		Self {
			reflector,
			ttl,
			entries: RwLock::new(HashMap::new()),
			distributed: None,
		}
	}

	/// Builder: mirror entries to a distributed tier.
	pub fn with_distributed(mut self, store: Arc<dyn DistributedMetadataStore>) -> Self {
		self.distributed = Some(store);
		self
	}

	pub fn ttl(&self) -> Duration {
		self.ttl
	}

	/// Returns the entity's metadata, rebuilding it when missing or expired.
	pub async fn metadata(&self, entity: &str) -> Result<Arc<CachedEntityMetadata>> {
		let fresh = {
			let entries = self.entries.read();
			entries
				.get(entity)
				.filter(|m| m.is_valid_at(Utc::now()))
				.map(Arc::clone)
		};
		if let Some(metadata) = fresh {
			return Ok(metadata);
		}

		let columns = self.reflector.columns(entity).await?;
		let metadata = Arc::new(CachedEntityMetadata::new(entity, columns, self.ttl));
		tracing::debug!(
			entity,
			columns = metadata.column_names.len(),
			"entity metadata rebuilt from schema"
		);
		self
			.entries
			.write()
			.insert(entity.to_string(), Arc::clone(&metadata));
		self.mirror_put(Arc::clone(&metadata));
		Ok(metadata)
	}

	pub async fn has_column(&self, entity: &str, column: &str) -> Result<bool> {
		Ok(self.metadata(entity).await?.has_column(column))
	}

	pub fn invalidate(&self, entity: &str) {
		let removed = self.entries.write().remove(entity).is_some();
		tracing::debug!(entity, removed, "entity metadata invalidated");
		let entity = entity.to_string();
		self.spawn_distributed("remove", move |store| async move {
			store.remove(&entity).await
		});
	}

	pub fn invalidate_all(&self) {
		let count = {
			let mut entries = self.entries.write();
			let count = entries.len();
			entries.clear();
			count
		};
		tracing::info!(count, "entity metadata cache cleared");
		self.spawn_distributed("clear", |store| async move { store.clear().await });
	}

	pub fn stats(&self) -> CacheStats {
		let entries = self.entries.read();
		let mut entities: Vec<String> = entries.keys().cloned().collect();
		entities.sort();
		CacheStats {
			size: entries.len(),
			entities,
			oldest: entries.values().map(|m| m.cached_at).min(),
			newest: entries.values().map(|m| m.cached_at).max(),
		}
	}

	/// Loads still-valid L2 entries for `entities` into L1. Returns how many
	/// were loaded. Failures are logged and skipped.
	pub async fn warm_from_distributed(&self, entities: &[&str]) -> usize {
		let Some(store) = self.distributed.as_ref() else {
			return 0;
		};

		let mut loaded = 0;
		for entity in entities {
			match store.get(entity).await {
				Ok(Some(mut metadata)) => {
					metadata.ttl = metadata.ttl.min(self.ttl);
					if !metadata.is_valid_at(Utc::now()) {
						continue;
					}
					self
						.entries
						.write()
						.entry(entity.to_string())
						.or_insert_with(|| Arc::new(metadata));
					loaded += 1;
				}
				Ok(None) => {}
				Err(e) => {
					tracing::warn!(entity, error = %e, "failed to read distributed entity metadata");
				}
			}
		}
		tracing::info!(loaded, requested = entities.len(), "entity metadata warmed");
		loaded
	}

	fn mirror_put(&self, metadata: Arc<CachedEntityMetadata>) {
		self.spawn_distributed("put", move |store| async move {
			store.put(&metadata).await
		});
	}

	fn spawn_distributed<F, Fut>(&self, op: &'static str, f: F)
	where
		F: FnOnce(Arc<dyn DistributedMetadataStore>) -> Fut,
		Fut: std::future::Future<Output = Result<()>> + Send + 'static,
	{
		let Some(store) = self.distributed.as_ref() else {
			return;
		};
		let Ok(handle) = tokio::runtime::Handle::try_current() else {
			tracing::debug!(op, "no runtime, skipping distributed metadata write");
			return;
		};
		let fut = f(Arc::clone(store));
		handle.spawn(async move {
			if let Err(e) = fut.await {
				tracing::warn!(op, error = %e, "distributed entity metadata write failed");
			}
		});
	}
}

/// L2 tier stored in the `entity_metadata_cache` table.
#[derive(Clone)]
pub struct SqliteMetadataStore {
	pool: SqlitePool,
}

impl SqliteMetadataStore {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}
}

#[async_trait]
impl DistributedMetadataStore for SqliteMetadataStore {
	#[tracing::instrument(skip(self))]
	async fn get(&self, entity: &str) -> Result<Option<CachedEntityMetadata>> {
		let row = sqlx::query(
			"SELECT entity_name, column_names, cached_at, ttl_secs \
			 FROM entity_metadata_cache WHERE entity_name = ?",
		)
		.bind(entity)
		.fetch_optional(&self.pool)
		.await?;

		let Some(row) = row else {
			return Ok(None);
		};

		let column_names: BTreeSet<String> =
			serde_json::from_str(&row.get::<String, _>("column_names"))?;
		let cached_at = DateTime::parse_from_rfc3339(&row.get::<String, _>("cached_at"))
			.map_err(|e| DbError::Internal(format!("invalid cached_at: {e}")))?
			.with_timezone(&Utc);
		let ttl_secs: i64 = row.get("ttl_secs");

		Ok(Some(CachedEntityMetadata {
			entity_name: row.get("entity_name"),
			column_names,
			cached_at,
			ttl: Duration::from_secs(ttl_secs.max(0) as u64),
		}))
	}

	#[tracing::instrument(skip(self, metadata), fields(entity = %metadata.entity_name))]
	async fn put(&self, metadata: &CachedEntityMetadata) -> Result<()> {
		sqlx::query(
			r#"
			INSERT INTO entity_metadata_cache (entity_name, column_names, cached_at, ttl_secs)
			VALUES (?, ?, ?, ?)
			ON CONFLICT(entity_name) DO UPDATE SET
				column_names = excluded.column_names,
				cached_at = excluded.cached_at,
				ttl_secs = excluded.ttl_secs
			"#,
		)
		.bind(&metadata.entity_name)
		.bind(serde_json::to_string(&metadata.column_names)?)
		.bind(metadata.cached_at.to_rfc3339())
		.bind(metadata.ttl.as_secs() as i64)
		.execute(&self.pool)
		.await?;
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	async fn remove(&self, entity: &str) -> Result<()> {
		sqlx::query("DELETE FROM entity_metadata_cache WHERE entity_name = ?")
			.bind(entity)
			.execute(&self.pool)
			.await?;
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	async fn clear(&self) -> Result<()> {
		sqlx::query("DELETE FROM entity_metadata_cache")
			.execute(&self.pool)
			.await?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{create_scope_test_pool, CountingReflector};

	fn reflector() -> Arc<CountingReflector> {
		Arc::new(
			CountingReflector::new()
				.with_table("requests", &["id", "unit_id", "actor_id", "status"])
				.with_table("payments", &["id", "request_id", "amount"]),
		)
	}

	async fn eventually<F, Fut>(mut check: F) -> bool
	where
		F: FnMut() -> Fut,
		Fut: std::future::Future<Output = bool>,
	{
		for _ in 0..100 {
			if check().await {
				return true;
			}
			tokio::time::sleep(Duration::from_millis(10)).await;
		}
		false
	}

	#[tokio::test]
	async fn lookups_within_ttl_reflect_once() {
		let reflector = reflector();
		let cache = EntityMetadataCache::new(reflector.clone(), Duration::from_secs(300));

		let first = cache.has_column("requests", "unit_id").await.unwrap();
		let second = cache.has_column("requests", "unit_id").await.unwrap();
		assert!(first);
		assert_eq!(first, second);
		assert!(!cache.has_column("requests", "citizen_id").await.unwrap());
		assert_eq!(reflector.calls(), 1);
	}

	#[tokio::test]
	async fn expired_entries_are_rebuilt() {
		let reflector = reflector();
		let cache = EntityMetadataCache::new(reflector.clone(), Duration::ZERO);

		cache.has_column("requests", "unit_id").await.unwrap();
		cache.has_column("requests", "unit_id").await.unwrap();
		assert_eq!(reflector.calls(), 2);
	}

	#[tokio::test]
	async fn invalidate_forces_reflection() {
		let reflector = reflector();
		let cache = EntityMetadataCache::new(reflector.clone(), Duration::from_secs(300));

		cache.has_column("requests", "unit_id").await.unwrap();
		cache.has_column("payments", "amount").await.unwrap();
		cache.invalidate("requests");
		cache.has_column("requests", "unit_id").await.unwrap();
		cache.has_column("payments", "amount").await.unwrap();
		assert_eq!(reflector.calls(), 3);

		cache.invalidate_all();
		assert_eq!(cache.stats().size, 0);
		cache.has_column("payments", "amount").await.unwrap();
		assert_eq!(reflector.calls(), 4);
	}

	#[tokio::test]
	async fn stats_report_entities_and_age_bounds() {
		let cache = EntityMetadataCache::new(reflector(), Duration::from_secs(300));
		assert_eq!(
			cache.stats(),
			CacheStats {
				size: 0,
				entities: vec![],
				oldest: None,
				newest: None,
			}
		);

		cache.metadata("requests").await.unwrap();
		cache.metadata("payments").await.unwrap();
		let stats = cache.stats();
		assert_eq!(stats.size, 2);
		assert_eq!(stats.entities, vec!["payments", "requests"]);
		assert!(stats.oldest.unwrap() <= stats.newest.unwrap());
	}

	#[tokio::test]
	async fn reflection_errors_propagate_and_are_not_cached() {
		let reflector = reflector();
		let cache = EntityMetadataCache::new(reflector.clone(), Duration::from_secs(300));
		assert!(matches!(
			cache.has_column("unknown", "id").await,
			Err(DbError::UnknownEntity(_))
		));
		assert!(cache.has_column("unknown", "id").await.is_err());
		assert_eq!(reflector.calls(), 2);
		assert_eq!(cache.stats().size, 0);
	}

	#[tokio::test]
	async fn concurrent_lookups_agree() {
		let cache = Arc::new(EntityMetadataCache::new(reflector(), Duration::from_secs(300)));
		let handles: Vec<_> = (0..16)
			.map(|_| {
				let cache = Arc::clone(&cache);
				tokio::spawn(async move { cache.has_column("requests", "unit_id").await.unwrap() })
			})
			.collect();
		for handle in handles {
			assert!(handle.await.unwrap());
		}
		assert_eq!(cache.stats().size, 1);
	}

	#[tokio::test]
	async fn entries_mirror_to_distributed_tier_and_warm_a_new_cache() {
		let pool = create_scope_test_pool().await;
		let store = Arc::new(SqliteMetadataStore::new(pool));
		let cache = EntityMetadataCache::new(reflector(), Duration::from_secs(300))
			.with_distributed(store.clone());

		cache.metadata("requests").await.unwrap();
		assert!(eventually(|| async { store.get("requests").await.unwrap().is_some() }).await);

		let cold_reflector = reflector();
		let cold = EntityMetadataCache::new(cold_reflector.clone(), Duration::from_secs(300))
			.with_distributed(store.clone());
		assert_eq!(cold.warm_from_distributed(&["requests", "payments"]).await, 1);
		assert!(cold.has_column("requests", "unit_id").await.unwrap());
		assert_eq!(cold_reflector.calls(), 0);

		cold.invalidate("requests");
		assert!(eventually(|| async { store.get("requests").await.unwrap().is_none() }).await);
	}

	#[tokio::test]
	async fn expired_distributed_entries_are_not_warmed() {
		let pool = create_scope_test_pool().await;
		let store = Arc::new(SqliteMetadataStore::new(pool));
		let mut stale = CachedEntityMetadata::new("requests", vec!["id".into()], Duration::from_secs(60));
		stale.cached_at = Utc::now() - chrono::Duration::seconds(120);
		store.put(&stale).await.unwrap();

		let cache = EntityMetadataCache::new(reflector(), Duration::from_secs(300))
			.with_distributed(store);
		assert_eq!(cache.warm_from_distributed(&["requests"]).await, 0);
	}

	#[test]
	fn validity_is_strict_at_ttl_boundary() {
		let mut metadata = CachedEntityMetadata::new("requests", vec![], Duration::from_secs(10));
		let now = metadata.cached_at;
		assert!(metadata.is_valid_at(now));
		assert!(metadata.is_valid_at(now + chrono::Duration::seconds(9)));
		assert!(!metadata.is_valid_at(now + chrono::Duration::seconds(10)));
		metadata.ttl = Duration::ZERO;
		assert!(!metadata.is_valid_at(now));
	}
}
