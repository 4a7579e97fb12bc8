// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Business operations with their permission requirements attached.
//!
//! Requirements are declared once where the operation is registered and read
//! directly at call time:
//!
//! ```ignore
//! let approve = ProtectedOperation::new("approve_request")
//!     .require(PermissionRequirement::unit("request.approve"))
//!     .require(PermissionRequirement::new("request.approve"));
//!
//! approve
//!     .run(&authorizer, &auth, &request, |ctx| service.approve(ctx, id))
//!     .await?;
//! ```

use std::future::Future;

use crate::actor::AuthContext;
use crate::authorizer::PermissionAuthorizer;
use crate::error::OperationError;
use crate::requirement::{PermissionRequirement, RequestView};
use crate::scope::{with_scope, ScopeContext};

/// A named operation and the requirements any one of which permits it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectedOperation {
	name: &'static str,
	requirements: Vec<PermissionRequirement>,
}

impl ProtectedOperation {
	pub const fn new(name: &'static str) -> Self {
		Self {
			name,
			requirements: Vec::new(),
		}
	}

	/// Builder: add a requirement (OR-combined with the others).
	pub fn require(mut self, requirement: PermissionRequirement) -> Self {
		self.requirements.push(requirement);
		self
	}

	pub fn name(&self) -> &'static str {
		self.name
	}

	pub fn requirements(&self) -> &[PermissionRequirement] {
		&self.requirements
	}

	/// Authorizes the request, then runs the future produced by `body` with
	/// the resulting scope bound for its whole lifetime.
	#[tracing::instrument(skip_all, fields(operation = self.name))]
	pub async fn run<F, Fut>(
		&self,
		authorizer: &PermissionAuthorizer,
		auth: &AuthContext,
		request: &RequestView,
		body: F,
	) -> Result<Fut::Output, OperationError>
	where
		F: FnOnce(ScopeContext) -> Fut,
		Fut: Future,
	{
		let ctx = authorizer
			.authorize(auth, &self.requirements, request)
			.await?;
		let output = with_scope(ctx.clone(), body(ctx)).await?;
		Ok(output)
	}
}
