// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Security audit events for scope enforcement.
//!
//! Denials, wildcard grants, missing scope contexts, strict-mode violations
//! and uses of unscoped data access each produce an [`AuditLogEntry`] handed
//! to an [`AuditSink`]. Persisting entries is the sink's concern; this crate
//! only guarantees the call is made.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{ActorId, ScopeType, UnitId};

/// Types of security events recorded by the scope core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
	/// No requirement of an operation was satisfied.
	AccessDenied,
	/// The wildcard capability bypassed requirement evaluation.
	WildcardBypass,
	/// A unit id supplied by the request was used for authorization.
	RequestScopeFallback,
	/// A scoped operation ran with no scope context bound.
	ScopeContextMissing,
	/// An unscoped method was refused under strict mode.
	StrictModeViolation,
	/// A mutation targeted rows outside the active scope.
	ScopeViolation,
	/// An unscoped method is about to run.
	GlobalAccess,
}

impl std::fmt::Display for AuditEventType {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let s = match self {
			AuditEventType::AccessDenied => "access_denied",
			AuditEventType::WildcardBypass => "wildcard_bypass",
			AuditEventType::RequestScopeFallback => "request_scope_fallback",
			AuditEventType::ScopeContextMissing => "scope_context_missing",
			AuditEventType::StrictModeViolation => "strict_mode_violation",
			AuditEventType::ScopeViolation => "scope_violation",
			AuditEventType::GlobalAccess => "global_access",
		};
		write!(f, "{s}")
	}
}

/// Severity attached to an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSeverity {
	Info,
	Notice,
	Warning,
	Critical,
}

impl AuditEventType {
	/// Default severity for the event type.
	pub fn severity(&self) -> AuditSeverity {
		match self {
			AuditEventType::GlobalAccess => AuditSeverity::Notice,
			AuditEventType::WildcardBypass | AuditEventType::RequestScopeFallback => {
				AuditSeverity::Notice
			}
			AuditEventType::AccessDenied | AuditEventType::ScopeViolation => AuditSeverity::Warning,
			AuditEventType::StrictModeViolation | AuditEventType::ScopeContextMissing => {
				AuditSeverity::Critical
			}
		}
	}
}

/// An entry in the security audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
	pub id: Uuid,
	pub timestamp: DateTime<Utc>,
	pub event_type: AuditEventType,
	pub severity: AuditSeverity,
	pub actor_id: Option<ActorId>,
	pub scope_type: Option<ScopeType>,
	pub unit_id: Option<UnitId>,
	/// Operation, capability or entity the event concerns.
	pub resource: Option<String>,
	pub action: String,
	pub details: serde_json::Value,
}

impl AuditLogEntry {
	/// Create a new audit log builder for the given event type.
	pub fn builder(event_type: AuditEventType) -> AuditLogBuilder {
		AuditLogBuilder::new(event_type)
	}
}

/// Builder for constructing audit log entries with a fluent API.
#[derive(Debug, Clone)]
pub struct AuditLogBuilder {
	event_type: AuditEventType,
	actor_id: Option<ActorId>,
	scope_type: Option<ScopeType>,
	unit_id: Option<UnitId>,
	resource: Option<String>,
	action: Option<String>,
	details: serde_json::Value,
}

impl AuditLogBuilder {
	pub fn new(event_type: AuditEventType) -> Self {
		Self {
			event_type,
			actor_id: None,
			scope_type: None,
			unit_id: None,
			resource: None,
			action: None,
			details: serde_json::Value::Null,
		}
	}

	pub fn actor(mut self, actor_id: ActorId) -> Self {
		self.actor_id = Some(actor_id);
		self
	}

	/// Set the scope the event happened under.
	pub fn scope(mut self, scope_type: ScopeType, unit_id: Option<UnitId>) -> Self {
		self.scope_type = Some(scope_type);
		self.unit_id = unit_id;
		self
	}

	/// Copy actor and scope from a scope context.
	pub fn context(self, ctx: &crate::scope::ScopeContext) -> Self {
		self
			.actor(ctx.actor_id())
			.scope(ctx.scope_type(), ctx.unit_id())
	}

	pub fn resource(mut self, resource: impl Into<String>) -> Self {
		self.resource = Some(resource.into());
		self
	}

	pub fn action(mut self, action: impl Into<String>) -> Self {
		self.action = Some(action.into());
		self
	}

	pub fn details(mut self, details: serde_json::Value) -> Self {
		self.details = details;
		self
	}

	pub fn build(self) -> AuditLogEntry {
		AuditLogEntry {
			id: Uuid::new_v4(),
			timestamp: Utc::now(),
			event_type: self.event_type,
			severity: self.event_type.severity(),
			actor_id: self.actor_id,
			scope_type: self.scope_type,
			unit_id: self.unit_id,
			resource: self.resource,
			action: self.action.unwrap_or_else(|| self.event_type.to_string()),
			details: self.details,
		}
	}
}

/// Destination for security audit entries.
///
/// `record` is called inline on the request path and must not block; sinks
/// that persist entries should queue them.
pub trait AuditSink: Send + Sync {
	fn name(&self) -> &str;
	fn record(&self, entry: AuditLogEntry);
}

/// Writes audit entries as structured tracing events on the
/// `security_audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
	fn name(&self) -> &str {
		"tracing"
	}

	fn record(&self, entry: AuditLogEntry) {
		let actor_id = entry.actor_id.map(|id| id.to_string());
		let unit_id = entry.unit_id.map(|id| id.to_string());
		let scope_type = entry.scope_type.map(|s| s.to_string());
		match entry.severity {
			AuditSeverity::Info | AuditSeverity::Notice => tracing::info!(
				target: "security_audit",
				audit_id = %entry.id,
				event_type = %entry.event_type,
				actor_id = actor_id.as_deref(),
				scope_type = scope_type.as_deref(),
				unit_id = unit_id.as_deref(),
				resource = entry.resource.as_deref(),
				details = %entry.details,
				"{}",
				entry.action
			),
			AuditSeverity::Warning => tracing::warn!(
				target: "security_audit",
				audit_id = %entry.id,
				event_type = %entry.event_type,
				actor_id = actor_id.as_deref(),
				scope_type = scope_type.as_deref(),
				unit_id = unit_id.as_deref(),
				resource = entry.resource.as_deref(),
				details = %entry.details,
				"{}",
				entry.action
			),
			AuditSeverity::Critical => tracing::error!(
				target: "security_audit",
				audit_id = %entry.id,
				event_type = %entry.event_type,
				actor_id = actor_id.as_deref(),
				scope_type = scope_type.as_deref(),
				unit_id = unit_id.as_deref(),
				resource = entry.resource.as_deref(),
				details = %entry.details,
				"{}",
				entry.action
			),
		}
	}
}

/// Keeps audit entries in memory. Used by tests to assert side effects.
#[derive(Debug, Default, Clone)]
pub struct MemoryAuditSink {
	entries: Arc<Mutex<Vec<AuditLogEntry>>>,
}

impl MemoryAuditSink {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn entries(&self) -> Vec<AuditLogEntry> {
		self.entries.lock().clone()
	}

	pub fn count(&self, event_type: AuditEventType) -> usize {
		self
			.entries
			.lock()
			.iter()
			.filter(|e| e.event_type == event_type)
			.count()
	}

	pub fn clear(&self) {
		self.entries.lock().clear();
	}
}

impl AuditSink for MemoryAuditSink {
	fn name(&self) -> &str {
		"memory"
	}

	fn record(&self, entry: AuditLogEntry) {
		self.entries.lock().push(entry);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::scope::ScopeContext;

	#[test]
	fn builder_defaults_action_to_event_name() {
		let entry = AuditLogEntry::builder(AuditEventType::WildcardBypass).build();
		assert_eq!(entry.action, "wildcard_bypass");
		assert_eq!(entry.severity, AuditSeverity::Notice);
		assert!(entry.details.is_null());
	}

	#[test]
	fn builder_copies_scope_context() {
		let actor = ActorId::generate();
		let unit = UnitId::generate();
		let entry = AuditLogEntry::builder(AuditEventType::ScopeViolation)
			.context(&ScopeContext::unit(actor, unit))
			.resource("requests")
			.action("update_scoped")
			.build();
		assert_eq!(entry.actor_id, Some(actor));
		assert_eq!(entry.scope_type, Some(ScopeType::Unit));
		assert_eq!(entry.unit_id, Some(unit));
		assert_eq!(entry.resource.as_deref(), Some("requests"));
		assert_eq!(entry.action, "update_scoped");
	}

	#[test]
	fn security_errors_are_critical() {
		assert_eq!(
			AuditEventType::ScopeContextMissing.severity(),
			AuditSeverity::Critical
		);
		assert_eq!(
			AuditEventType::StrictModeViolation.severity(),
			AuditSeverity::Critical
		);
		assert!(AuditEventType::AccessDenied.severity() > AuditSeverity::Notice);
	}

	#[test]
	fn memory_sink_counts_by_type() {
		let sink = MemoryAuditSink::new();
		sink.record(AuditLogEntry::builder(AuditEventType::AccessDenied).build());
		sink.record(AuditLogEntry::builder(AuditEventType::AccessDenied).build());
		sink.record(AuditLogEntry::builder(AuditEventType::GlobalAccess).build());
		assert_eq!(sink.count(AuditEventType::AccessDenied), 2);
		assert_eq!(sink.entries().len(), 3);
		sink.clear();
		assert!(sink.entries().is_empty());
	}

	#[test]
	fn entries_serialize_with_snake_case_types() {
		let entry = AuditLogEntry::builder(AuditEventType::StrictModeViolation).build();
		let json = serde_json::to_value(&entry).unwrap();
		assert_eq!(json["event_type"], "strict_mode_violation");
		assert_eq!(json["severity"], "critical");
	}
}
