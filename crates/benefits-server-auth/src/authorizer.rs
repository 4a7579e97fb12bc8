// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Per-request permission evaluation.
//!
//! [`PermissionAuthorizer::authorize`] decides whether an actor may invoke an
//! operation and, if so, which [`ScopeContext`] the operation runs under:
//!
//! 1. **Authentication**: no actor fails with `NotAuthenticated` before
//!    anything else is looked at
//! 2. **No requirements**: the operation declared no restriction, global scope
//! 3. **Wildcard**: an actor holding `*.*` is granted global scope, audited
//! 4. **Requirements**: evaluated concurrently and OR-combined; the first
//!    satisfied requirement in declaration order determines the context
//!
//! Denials are audited with every failed requirement; the caller only learns
//! about the first.

use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tracing::instrument;

use crate::actor::{Actor, AuthContext};
use crate::audit::{AuditEventType, AuditLogEntry, AuditSink};
use crate::capability::{grants_satisfy, CapabilityCheck, CapabilityLookup};
use crate::error::{AuthzError, Result};
use crate::requirement::{PermissionRequirement, RequestView};
use crate::scope::ScopeContext;
use crate::types::{ScopeType, UnitId};

/// Authorizer behaviour switches.
#[derive(Debug, Clone)]
pub struct AuthorizerConfig {
	/// Accept a unit id read from the request when the actor has no unit of
	/// their own. Only grants naming that unit, or global grants, satisfy such
	/// a check.
	pub allow_request_scope_id: bool,
}

impl Default for AuthorizerConfig {
	fn default() -> Self {
		Self {
			allow_request_scope_id: true,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum DenialReason {
	MissingCapability,
	UnresolvedScopeId,
	RequestScopeIdDisabled,
	LookupFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
enum Outcome {
	Granted { from_request: bool },
	Denied { reason: DenialReason },
}

/// Result of checking one requirement.
#[derive(Debug, Clone, Serialize)]
struct Evaluation {
	capability: String,
	effective_scope: ScopeType,
	scope_id: Option<UnitId>,
	bypassed: bool,
	#[serde(flatten)]
	outcome: Outcome,
	#[serde(skip)]
	lookup_error: Option<String>,
}

impl Evaluation {
	fn is_granted(&self) -> bool {
		matches!(self.outcome, Outcome::Granted { .. })
	}

	fn denied_error(&self) -> AuthzError {
		AuthzError::PermissionDenied {
			capability: self.capability.clone(),
			scope_type: self.effective_scope,
			scope_id: self.scope_id,
		}
	}
}

/// Evaluates permission requirements for inbound requests.
pub struct PermissionAuthorizer {
	lookup: Arc<dyn CapabilityLookup>,
	audit: Arc<dyn AuditSink>,
	config: AuthorizerConfig,
}

impl PermissionAuthorizer {
	pub fn new(
		lookup: Arc<dyn CapabilityLookup>,
		audit: Arc<dyn AuditSink>,
		config: AuthorizerConfig,
	) -> Self {
		Self {
			lookup,
			audit,
			config,
		}
	}

	/// Authorizes `requirements` for the request's actor.
	///
	/// # Errors
	///
	/// - `NotAuthenticated` when the request carries no actor
	/// - `PermissionDenied` naming the first requirement when none is satisfied
	/// - `Lookup` when the capability lookup failed and nothing was granted
	#[instrument(
		skip(self, auth, requirements, request),
		fields(requirement_count = requirements.len())
	)]
	pub async fn authorize(
		&self,
		auth: &AuthContext,
		requirements: &[PermissionRequirement],
		request: &RequestView,
	) -> Result<ScopeContext> {
		let Some(actor) = auth.actor.as_ref() else {
			tracing::debug!("authorization refused: not authenticated");
			return Err(AuthzError::NotAuthenticated);
		};

		if requirements.is_empty() {
			tracing::debug!(actor_id = %actor.id, "no requirements declared, global scope");
			return Ok(ScopeContext::global(actor.id));
		}

		let wildcard = match self.holds(actor, &CapabilityCheck::wildcard()).await {
			Ok(held) => held,
			Err(e) => {
				tracing::warn!(actor_id = %actor.id, error = %e, "wildcard lookup failed");
				self.audit.record(
					AuditLogEntry::builder(AuditEventType::AccessDenied)
						.actor(actor.id)
						.details(serde_json::json!({ "reason": "lookup_failed" }))
						.build(),
				);
				return Err(e);
			}
		};
		if wildcard {
			tracing::info!(actor_id = %actor.id, "wildcard capability bypassed requirement checks");
			self.audit.record(
				AuditLogEntry::builder(AuditEventType::WildcardBypass)
					.actor(actor.id)
					.scope(ScopeType::Global, None)
					.details(serde_json::json!({
						"requirements": requirements
							.iter()
							.map(|r| r.capability.as_str())
							.collect::<Vec<_>>(),
					}))
					.build(),
			);
			return Ok(ScopeContext::global(actor.id));
		}

		let evaluations = join_all(
			requirements
				.iter()
				.map(|requirement| self.evaluate(actor, requirement, request)),
		)
		.await;

		if let Some(granted) = evaluations.iter().find(|e| e.is_granted()) {
			return Ok(self.grant(actor, granted));
		}

		if let Some(error) = evaluations.iter().find_map(|e| e.lookup_error.clone()) {
			tracing::warn!(actor_id = %actor.id, error = %error, "capability lookup failed");
			self.record_denial(actor, &evaluations);
			return Err(AuthzError::Lookup(error));
		}

		self.record_denial(actor, &evaluations);
		Err(evaluations[0].denied_error())
	}

	async fn evaluate(
		&self,
		actor: &Actor,
		requirement: &PermissionRequirement,
		request: &RequestView,
	) -> Evaluation {
		let bypassed = requirement.is_bypassed_by(&actor.roles);
		let effective_scope = if bypassed {
			ScopeType::Global
		} else {
			requirement.scope_type
		};

		let mut evaluation = Evaluation {
			capability: requirement.capability.clone(),
			effective_scope,
			scope_id: None,
			bypassed,
			outcome: Outcome::Denied {
				reason: DenialReason::MissingCapability,
			},
			lookup_error: None,
		};

		let mut check = CapabilityCheck::new(&requirement.capability, effective_scope);
		let mut from_request = false;

		if effective_scope == ScopeType::Unit {
			if let Some(unit_id) = actor.unit_id {
				check = check.in_unit(unit_id);
			} else {
				let resolved = requirement
					.scope_id_source
					.as_ref()
					.and_then(|source| source.resolve_unit_id(request));
				match resolved {
					None => {
						evaluation.outcome = Outcome::Denied {
							reason: DenialReason::UnresolvedScopeId,
						};
						return evaluation;
					}
					Some(unit_id) if !self.config.allow_request_scope_id => {
						evaluation.scope_id = Some(unit_id);
						evaluation.outcome = Outcome::Denied {
							reason: DenialReason::RequestScopeIdDisabled,
						};
						return evaluation;
					}
					Some(unit_id) => {
						check = check.in_unit(unit_id).requiring_explicit_unit();
						from_request = true;
					}
				}
			}
			evaluation.scope_id = check.scope_id;
		}

		match self.holds(actor, &check).await {
			Ok(true) => evaluation.outcome = Outcome::Granted { from_request },
			Ok(false) => {}
			Err(e) => {
				evaluation.outcome = Outcome::Denied {
					reason: DenialReason::LookupFailed,
				};
				evaluation.lookup_error = Some(e.to_string());
			}
		}
		evaluation
	}

	async fn holds(&self, actor: &Actor, check: &CapabilityCheck) -> Result<bool> {
		match &actor.granted_capabilities {
			Some(grants) => Ok(grants_satisfy(grants, check)),
			None => self.lookup.has_capability(actor.id, check).await,
		}
	}

	fn grant(&self, actor: &Actor, evaluation: &Evaluation) -> ScopeContext {
		let ctx = match evaluation.effective_scope {
			ScopeType::Global => ScopeContext::global(actor.id),
			ScopeType::Unit => ScopeContext::new(ScopeType::Unit, actor.id, evaluation.scope_id),
			ScopeType::Own => ScopeContext::own(actor.id, actor.unit_id),
		};

		if evaluation.outcome == (Outcome::Granted { from_request: true }) {
			tracing::warn!(
				actor_id = %actor.id,
				capability = %evaluation.capability,
				unit_id = ?evaluation.scope_id,
				"authorized with a request-supplied unit id"
			);
			self.audit.record(
				AuditLogEntry::builder(AuditEventType::RequestScopeFallback)
					.context(&ctx)
					.resource(evaluation.capability.clone())
					.build(),
			);
		}

		tracing::debug!(
			actor_id = %actor.id,
			capability = %evaluation.capability,
			scope_type = %ctx.scope_type(),
			bypassed = evaluation.bypassed,
			"authorization granted"
		);
		ctx
	}

	fn record_denial(&self, actor: &Actor, evaluations: &[Evaluation]) {
		let first = &evaluations[0];
		let failed = serde_json::to_value(evaluations).unwrap_or_default();

		tracing::warn!(
			actor_id = %actor.id,
			capability = %first.capability,
			scope_type = %first.effective_scope,
			failed = %failed,
			"authorization denied"
		);
		self.audit.record(
			AuditLogEntry::builder(AuditEventType::AccessDenied)
				.actor(actor.id)
				.scope(first.effective_scope, first.scope_id)
				.resource(first.capability.clone())
				.details(serde_json::json!({ "failed_requirements": failed }))
				.build(),
		);
	}
}
