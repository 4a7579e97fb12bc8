// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

#[derive(Debug, thiserror::Error)]
pub enum DbError {
	#[error("Database error: {0}")]
	Sqlx(#[from] sqlx::Error),

	#[error("Not found: {0}")]
	NotFound(String),

	#[error("Conflict: {0}")]
	Conflict(String),

	#[error("Internal: {0}")]
	Internal(String),

	#[error("Serialization error: {0}")]
	Serialization(#[from] serde_json::Error),

	/// A scoped operation ran with no scope context bound.
	#[error("Scope context required for {operation}")]
	ScopeContextRequired { operation: &'static str },

	/// An unscoped method was called by a non-global actor under strict mode.
	#[error("Strict mode violation: {method} requires a global scope context")]
	StrictModeViolation { method: &'static str },

	#[error("Scope violation: {0}")]
	ScopeViolation(String),

	#[error("Invalid identifier: {0}")]
	InvalidIdentifier(String),

	#[error("Unknown entity: {0}")]
	UnknownEntity(String),

	#[error("Invalid join path: {0}")]
	InvalidJoinPath(String),
}

impl DbError {
	/// True for errors that signal a security violation rather than a fault.
	pub fn is_security_violation(&self) -> bool {
		matches!(
			self,
			DbError::ScopeContextRequired { .. }
				| DbError::StrictModeViolation { .. }
				| DbError::ScopeViolation(_)
		)
	}
}

pub type Result<T> = std::result::Result<T, DbError>;
