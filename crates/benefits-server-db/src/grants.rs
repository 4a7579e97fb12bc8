// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Capability grant repository.
//!
//! Grants are stored per actor in `capability_grants` and feed the
//! authorizer through [`GrantStore`]. Wrap the repository in a
//! [`benefits_server_auth::CachedGrantLookup`] to avoid a query per request.

use async_trait::async_trait;
use benefits_server_auth::{ActorId, AuthzError, CapabilityGrant, GrantStore, ScopeType, UnitId};
use chrono::Utc;
use sqlx::{sqlite::SqlitePool, Row};
use uuid::Uuid;

use crate::error::DbError;

#[derive(Clone)]
pub struct CapabilityGrantRepository {
	pool: SqlitePool,
}

impl CapabilityGrantRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	/// Grants a capability. Granting an existing grant again is a no-op.
	///
	/// # Returns
	/// `true` if a new grant was stored.
	#[tracing::instrument(skip(self, grant), fields(actor_id = %actor_id, capability = %grant.capability))]
	pub async fn grant(&self, actor_id: ActorId, grant: &CapabilityGrant) -> Result<bool, DbError> {
		let unit_id = grant.unit_id.map(|u| u.to_string());
		// unit_id is nullable, so the UNIQUE constraint alone cannot dedupe global grants
		let result = sqlx::query(
			r#"
			INSERT INTO capability_grants (id, actor_id, capability, scope, unit_id, created_at)
			SELECT ?, ?, ?, ?, ?, ?
			WHERE NOT EXISTS (
				SELECT 1 FROM capability_grants
				WHERE actor_id = ? AND capability = ? AND scope = ? AND unit_id IS ?
			)
			"#,
		)
		.bind(Uuid::new_v4().to_string())
		.bind(actor_id.to_string())
		.bind(&grant.capability)
		.bind(grant.scope.to_string())
		.bind(&unit_id)
		.bind(Utc::now().to_rfc3339())
		.bind(actor_id.to_string())
		.bind(&grant.capability)
		.bind(grant.scope.to_string())
		.bind(&unit_id)
		.execute(&self.pool)
		.await?;

		let created = result.rows_affected() > 0;
		if created {
			tracing::info!(scope = %grant.scope, "capability granted");
		}
		Ok(created)
	}

	/// Revokes every grant of `capability` held by the actor, at any scope.
	#[tracing::instrument(skip(self), fields(actor_id = %actor_id))]
	pub async fn revoke(&self, actor_id: ActorId, capability: &str) -> Result<u64, DbError> {
		let result = sqlx::query("DELETE FROM capability_grants WHERE actor_id = ? AND capability = ?")
			.bind(actor_id.to_string())
			.bind(capability)
			.execute(&self.pool)
			.await?;
		tracing::info!(revoked = result.rows_affected(), "capability revoked");
		Ok(result.rows_affected())
	}

	#[tracing::instrument(skip(self), fields(actor_id = %actor_id))]
	pub async fn list_for_actor(&self, actor_id: ActorId) -> Result<Vec<CapabilityGrant>, DbError> {
		let rows = sqlx::query(
			r#"
			SELECT capability, scope, unit_id
			FROM capability_grants
			WHERE actor_id = ?
			ORDER BY capability, scope
			"#,
		)
		.bind(actor_id.to_string())
		.fetch_all(&self.pool)
		.await?;

		rows.iter().map(parse_grant_row).collect()
	}
}

fn parse_grant_row(row: &sqlx::sqlite::SqliteRow) -> Result<CapabilityGrant, DbError> {
	let capability: String = row.get("capability");
	let scope: String = row.get("scope");
	let unit_id: Option<String> = row.get("unit_id");

	let scope: ScopeType = scope
		.parse()
		.map_err(|e| DbError::Internal(format!("capability_grants.scope: {e}")))?;
	let unit_id = unit_id
		.map(|u| u.parse::<UnitId>())
		.transpose()
		.map_err(|e| DbError::Internal(format!("capability_grants.unit_id: {e}")))?;

	Ok(CapabilityGrant {
		capability,
		scope,
		unit_id,
	})
}

#[async_trait]
impl GrantStore for CapabilityGrantRepository {
	async fn grants_for(&self, actor_id: ActorId) -> benefits_server_auth::Result<Vec<CapabilityGrant>> {
		self
			.list_for_actor(actor_id)
			.await
			.map_err(|e| AuthzError::Lookup(e.to_string()))
	}
}
