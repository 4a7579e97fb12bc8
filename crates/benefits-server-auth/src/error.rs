// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::types::{ScopeType, UnitId, UnknownScopeType};

/// Errors produced while authorizing an operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthzError {
	#[error("not authenticated")]
	NotAuthenticated,

	#[error("permission denied: {capability} at {scope_type} scope")]
	PermissionDenied {
		capability: String,
		scope_type: ScopeType,
		scope_id: Option<UnitId>,
	},

	#[error("capability lookup failed: {0}")]
	Lookup(String),
}

/// Error returned when a scope context is bound twice within one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ScopeBindError {
	#[error("a scope context is already bound to this request")]
	AlreadyBound,
}

/// Error returned by a protected operation before its body runs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OperationError {
	#[error(transparent)]
	Authz(#[from] AuthzError),

	#[error(transparent)]
	Scope(#[from] ScopeBindError),
}

impl From<UnknownScopeType> for AuthzError {
	fn from(e: UnknownScopeType) -> Self {
		AuthzError::Lookup(e.to_string())
	}
}

pub type Result<T> = std::result::Result<T, AuthzError>;
