// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Authorization core for the benefits server.
//!
//! - [`PermissionAuthorizer`] decides per request whether an actor may run an
//!   operation and derives the [`ScopeContext`] it runs under
//! - [`with_scope`] / [`current_scope`] carry that context through the request
//! - [`ProtectedOperation`] attaches requirements to business operations
//! - [`AuditSink`] receives security-relevant events

pub mod actor;
pub mod audit;
pub mod authorizer;
pub mod capability;
pub mod error;
pub mod operation;
pub mod requirement;
pub mod scope;
pub mod types;

pub use actor::{Actor, AuthContext};
pub use audit::{
	AuditEventType, AuditLogBuilder, AuditLogEntry, AuditSeverity, AuditSink, MemoryAuditSink,
	TracingAuditSink,
};
pub use authorizer::{AuthorizerConfig, PermissionAuthorizer};
pub use capability::{
	grants_satisfy, CachedGrantLookup, CapabilityCheck, CapabilityGrant, CapabilityLookup,
	DenyAllLookup, GrantStore, StaticGrantStore, WILDCARD_CAPABILITY,
};
pub use error::{AuthzError, OperationError, Result, ScopeBindError};
pub use operation::ProtectedOperation;
pub use requirement::{InvalidScopeIdSource, PermissionRequirement, RequestView, ScopeIdSource};
pub use scope::{current_scope, with_scope, ScopeContext};
pub use types::{ActorId, ScopeType, UnitId, UnknownScopeType};
