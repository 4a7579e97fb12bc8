// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Scope-enforcing persistence for the benefits server.
//!
//! Business modules read and write through a [`ScopedDataAccessor`], which
//! applies the [`benefits_server_auth::ScopeContext`] bound to the current
//! request to every query. Storage itself sits behind [`StoragePort`];
//! [`SqliteStore`] is the production adapter.

pub mod accessor;
pub mod criteria;
pub mod error;
pub mod grants;
pub mod join_path;
pub mod metadata_cache;
pub mod pool;
pub mod sqlite;
pub mod store;
pub mod testing;

pub use accessor::{
	AccessMode, AccessorConfig, Page, ScopeColumns, ScopedDataAccessor, ScopedQueryBuilder,
	MAX_PAGE_SIZE,
};
pub use criteria::{
	validate_identifier, ColumnRef, CompareOp, Criteria, FindOptions, OrderBy, Predicate,
	QueryBuilder, SortDirection, SqlStatement,
};
pub use error::{DbError, Result};
pub use grants::CapabilityGrantRepository;
pub use join_path::{JoinHop, JoinPath, JoinPathTable, MAX_JOIN_HOPS};
pub use metadata_cache::{
	CacheStats, CachedEntityMetadata, DistributedMetadataStore, EntityMetadataCache,
	SqliteMetadataStore,
};
pub use pool::{create_pool, run_migrations};
pub use sqlite::SqliteStore;
pub use store::{from_record, to_record, Record, SchemaReflector, ScopedEntity, StoragePort};
