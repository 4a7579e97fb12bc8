// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! End-to-end authorization behaviour through the public API.

use std::sync::Arc;

use benefits_server_auth::{
	Actor, ActorId, AuditEventType, AuthContext, AuthorizerConfig, AuthzError, CapabilityGrant,
	DenyAllLookup, MemoryAuditSink, PermissionAuthorizer, PermissionRequirement, RequestView,
	ScopeIdSource, ScopeType, UnitId,
};
use proptest::prelude::*;

fn authorizer(audit: &MemoryAuditSink) -> PermissionAuthorizer {
	PermissionAuthorizer::new(
		Arc::new(DenyAllLookup),
		Arc::new(audit.clone()),
		AuthorizerConfig::default(),
	)
}

#[tokio::test]
async fn actor_without_capabilities_is_denied_request_view() {
	let audit = MemoryAuditSink::new();
	let actor = Actor::new(ActorId::generate()).with_grants(vec![]);

	let result = authorizer(&audit)
		.authorize(
			&AuthContext::authenticated(actor),
			&[PermissionRequirement::new("request.view")],
			&RequestView::new(),
		)
		.await;

	assert_eq!(
		result,
		Err(AuthzError::PermissionDenied {
			capability: "request.view".to_string(),
			scope_type: ScopeType::Global,
			scope_id: None,
		})
	);
	assert_eq!(audit.count(AuditEventType::AccessDenied), 1);
}

#[tokio::test]
async fn wildcard_actor_gets_global_context_for_unit_requirement() {
	let audit = MemoryAuditSink::new();
	let actor = Actor::new(ActorId::generate()).with_grants(vec![CapabilityGrant::wildcard()]);

	let ctx = authorizer(&audit)
		.authorize(
			&AuthContext::authenticated(actor),
			&[PermissionRequirement::unit("request.delete")],
			&RequestView::new(),
		)
		.await
		.unwrap();

	assert_eq!(ctx.scope_type(), ScopeType::Global);
	assert_eq!(audit.count(AuditEventType::WildcardBypass), 1);
	assert_eq!(audit.count(AuditEventType::AccessDenied), 0);
}

#[tokio::test]
async fn failing_requirement_does_not_block_satisfied_one() {
	let audit = MemoryAuditSink::new();
	let unit = UnitId::generate();
	let actor = Actor::new(ActorId::generate())
		.in_unit(unit)
		.with_grants(vec![CapabilityGrant::new("payment.view", ScopeType::Unit)]);

	let ctx = authorizer(&audit)
		.authorize(
			&AuthContext::authenticated(actor),
			&[
				PermissionRequirement::new("payment.release"),
				PermissionRequirement::unit("payment.view"),
			],
			&RequestView::new(),
		)
		.await
		.unwrap();

	assert_eq!(ctx.scope_type(), ScopeType::Unit);
	assert_eq!(ctx.unit_id(), Some(unit));
}

#[tokio::test]
async fn implicit_unit_grant_never_trusts_request_unit() {
	let audit = MemoryAuditSink::new();
	let actor = Actor::new(ActorId::generate())
		.with_grants(vec![CapabilityGrant::new("request.approve", ScopeType::Unit)]);
	let requirement = PermissionRequirement::unit("request.approve")
		.with_scope_id_source("params.unitId".parse::<ScopeIdSource>().unwrap());
	let request = RequestView::new().with_path_param("unitId", UnitId::generate().to_string());

	let result = authorizer(&audit)
		.authorize(&AuthContext::authenticated(actor), &[requirement], &request)
		.await;

	assert!(matches!(result, Err(AuthzError::PermissionDenied { .. })));
	assert_eq!(audit.count(AuditEventType::RequestScopeFallback), 0);
}

fn arb_requirement() -> impl Strategy<Value = PermissionRequirement> {
	(
		"[a-z]{1,8}\\.[a-z]{1,8}",
		prop_oneof![
			Just(ScopeType::Own),
			Just(ScopeType::Unit),
			Just(ScopeType::Global)
		],
	)
		.prop_map(|(capability, scope)| PermissionRequirement::new(capability).with_scope(scope))
}

proptest! {
	#[test]
	fn wildcard_authorizes_any_requirement_set(
		requirements in prop::collection::vec(arb_requirement(), 0..6),
	) {
		let audit = MemoryAuditSink::new();
		let actor = Actor::new(ActorId::generate()).with_grants(vec![CapabilityGrant::wildcard()]);
		let result = tokio_test::block_on(authorizer(&audit).authorize(
			&AuthContext::authenticated(actor),
			&requirements,
			&RequestView::new(),
		));
		prop_assert!(result.map(|ctx| ctx.is_global()).unwrap_or(false));
	}

	#[test]
	fn unauthenticated_is_always_rejected(
		requirements in prop::collection::vec(arb_requirement(), 0..6),
	) {
		let audit = MemoryAuditSink::new();
		let result = tokio_test::block_on(authorizer(&audit).authorize(
			&AuthContext::unauthenticated(),
			&requirements,
			&RequestView::new(),
		));
		prop_assert_eq!(result, Err(AuthzError::NotAuthenticated));
	}
}
