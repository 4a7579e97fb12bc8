// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Authorize, bind scope, and access data through a wired core.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use benefits_server::{ScopeCore, ServerError};
use benefits_server_auth::{
	with_scope, Actor, ActorId, AuditEventType, AuthContext, AuthzError, CapabilityGrant,
	MemoryAuditSink, OperationError, PermissionRequirement, ProtectedOperation, RequestView,
	ScopeContext, ScopeType, UnitId,
};
use benefits_server_config::{JoinHopConfig, JoinPathConfig, ServerConfig};
use benefits_server_db::testing::{create_scope_test_pool, BenefitRequest, Payment};
use benefits_server_db::{DbError, FindOptions};
use serde_json::json;

fn config() -> ServerConfig {
	let mut config = ServerConfig::default();
	config.scope.join_paths = vec![JoinPathConfig {
		entity: "payments".to_string(),
		hops: vec![
			JoinHopConfig {
				table: "requests".to_string(),
				local_column: "request_id".to_string(),
				foreign_column: "id".to_string(),
			},
			JoinHopConfig {
				table: "citizens".to_string(),
				local_column: "citizen_id".to_string(),
				foreign_column: "id".to_string(),
			},
		],
		unit_column: "unit_id".to_string(),
	}];
	config
}

async fn core_with_audit() -> (ScopeCore, MemoryAuditSink) {
	let audit = MemoryAuditSink::new();
	let core = ScopeCore::from_pool(
		create_scope_test_pool().await,
		&config(),
		Arc::new(audit.clone()),
	)
	.unwrap();
	(core, audit)
}

async fn seed_requests(core: &ScopeCore, rows: &[(&str, UnitId)]) {
	let requests = core.accessor::<BenefitRequest>();
	with_scope(ScopeContext::global(ActorId::generate()), async {
		for (id, unit) in rows {
			requests
				.save_scoped(&json!({ "id": id, "citizen_id": "c", "unit_id": unit.to_string() }))
				.await?;
		}
		Ok::<_, DbError>(())
	})
	.await
	.unwrap()
	.unwrap();
}

fn list_requests() -> ProtectedOperation {
	ProtectedOperation::new("requests.list").require(PermissionRequirement::unit("request.view"))
}

#[tokio::test]
async fn unit_actor_lists_only_its_units_requests() {
	let (core, _audit) = core_with_audit().await;
	let u1 = UnitId::generate();
	let u2 = UnitId::generate();
	seed_requests(&core, &[("r1", u1), ("r2", u2), ("r3", u1)]).await;

	let actor = ActorId::generate();
	core
		.grant_repository()
		.grant(actor, &CapabilityGrant::new("request.view", ScopeType::Unit))
		.await
		.unwrap();

	let requests = core.accessor::<BenefitRequest>();
	let auth = AuthContext::authenticated(Actor::new(actor).in_unit(u1));
	let rows = list_requests()
		.run(core.authorizer(), &auth, &RequestView::new(), |ctx| async move {
			assert_eq!(ctx.unit_id(), Some(u1));
			requests.find_all(FindOptions::new()).await
		})
		.await
		.unwrap()
		.unwrap();

	let mut ids: Vec<String> = rows.into_iter().map(|r| r.id).collect();
	ids.sort();
	assert_eq!(ids, vec!["r1", "r3"]);
}

#[tokio::test]
async fn actor_without_grant_never_reaches_the_data() {
	let (core, audit) = core_with_audit().await;
	let auth = AuthContext::authenticated(Actor::new(ActorId::generate()).in_unit(UnitId::generate()));

	let ran = AtomicBool::new(false);
	let result = list_requests()
		.run(core.authorizer(), &auth, &RequestView::new(), |_ctx| async {
			ran.store(true, Ordering::SeqCst);
		})
		.await;

	assert!(!ran.load(Ordering::SeqCst));

	assert!(matches!(
		result,
		Err(OperationError::Authz(AuthzError::PermissionDenied { .. }))
	));
	assert_eq!(audit.count(AuditEventType::AccessDenied), 1);
}

#[tokio::test]
async fn new_grants_apply_after_cache_invalidation() {
	let (core, _audit) = core_with_audit().await;
	let actor = ActorId::generate();
	let auth = AuthContext::authenticated(Actor::new(actor).in_unit(UnitId::generate()));
	let operation = list_requests();
	let request = RequestView::new();
	let authorize = || {
		core.authorizer()
			.authorize(&auth, operation.requirements(), &request)
	};

	assert!(authorize().await.is_err());
	core
		.grant_repository()
		.grant(actor, &CapabilityGrant::global("request.view"))
		.await
		.unwrap();
	assert!(authorize().await.is_err(), "stale cache entry still denies");

	core.grant_cache().invalidate(actor);
	assert_eq!(authorize().await.unwrap().scope_type(), ScopeType::Unit);
}

#[tokio::test]
async fn background_accessor_reads_without_a_request_scope() {
	let (core, audit) = core_with_audit().await;
	seed_requests(&core, &[("r1", UnitId::generate()), ("r2", UnitId::generate())]).await;

	assert!(matches!(
		core.accessor::<BenefitRequest>().count_global().await,
		Err(DbError::StrictModeViolation { .. })
	));
	assert_eq!(
		core.background_accessor::<BenefitRequest>()
			.count_global()
			.await
			.unwrap(),
		2
	);
	assert_eq!(
		core.background_accessor::<Payment>()
			.find_all_global(FindOptions::new())
			.await
			.unwrap()
			.len(),
		0
	);
	assert_eq!(audit.count(AuditEventType::GlobalAccess), 2);
}

#[tokio::test]
async fn invalid_join_path_identifiers_are_rejected_at_startup() {
	let mut config = config();
	config.scope.join_paths[0].hops[0].table = "requests; DROP TABLE citizens".to_string();

	let result = ScopeCore::from_pool(
		create_scope_test_pool().await,
		&config,
		Arc::new(MemoryAuditSink::new()),
	);
	assert!(matches!(
		result,
		Err(ServerError::Db(DbError::InvalidIdentifier(_)))
	));
}
