// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Per-request scope context and its request-local propagation.
//!
//! A [`ScopeContext`] is built once by the authorizer, bound to the request
//! future with [`with_scope`], and read by the data-access layer through
//! [`current_scope`]. The binding is a tokio task-local: it is visible to
//! everything awaited inside the request future and to nothing else, so no
//! request can observe or mutate another request's context.
//!
//! Tasks spawned with `tokio::spawn` do not inherit the binding. Scoped data
//! access from such a task fails fast until the context is bound again.

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ScopeBindError;
use crate::types::{ActorId, ScopeType, UnitId};

tokio::task_local! {
	static REQUEST_SCOPE: Arc<ScopeContext>;
}

/// The authorization scope of the actor serving the current request.
///
/// Immutable once constructed; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeContext {
	scope_type: ScopeType,
	actor_id: ActorId,
	unit_id: Option<UnitId>,
}

impl ScopeContext {
	/// Creates a context from its parts.
	///
	/// A `Unit` context without a unit id is accepted but degraded: the data
	/// layer applies no unit filter and logs a warning instead of treating the
	/// actor as global.
	pub fn new(scope_type: ScopeType, actor_id: ActorId, unit_id: Option<UnitId>) -> Self {
		if scope_type == ScopeType::Unit && unit_id.is_none() {
			tracing::warn!(
				actor_id = %actor_id,
				"unit scope context constructed without a unit id; scope filtering is degraded"
			);
		}
		Self {
			scope_type,
			actor_id,
			unit_id,
		}
	}

	/// Context with no data restriction.
	pub fn global(actor_id: ActorId) -> Self {
		Self::new(ScopeType::Global, actor_id, None)
	}

	/// Context restricted to one organizational unit.
	pub fn unit(actor_id: ActorId, unit_id: UnitId) -> Self {
		Self::new(ScopeType::Unit, actor_id, Some(unit_id))
	}

	/// Context restricted to the actor's own records.
	pub fn own(actor_id: ActorId, unit_id: Option<UnitId>) -> Self {
		Self::new(ScopeType::Own, actor_id, unit_id)
	}

	pub fn scope_type(&self) -> ScopeType {
		self.scope_type
	}

	pub fn actor_id(&self) -> ActorId {
		self.actor_id
	}

	pub fn unit_id(&self) -> Option<UnitId> {
		self.unit_id
	}

	pub fn is_global(&self) -> bool {
		self.scope_type == ScopeType::Global
	}
}

/// Returns the scope context bound to the current request, if any.
pub fn current_scope() -> Option<Arc<ScopeContext>> {
	REQUEST_SCOPE.try_with(Arc::clone).ok()
}

/// Runs `fut` with `ctx` bound as the request scope.
///
/// Fails with [`ScopeBindError::AlreadyBound`] when called inside a future
/// that already has a scope bound; the context of a request never changes
/// once authorization has produced it.
pub async fn with_scope<F>(ctx: ScopeContext, fut: F) -> Result<F::Output, ScopeBindError>
where
	F: Future,
{
	if current_scope().is_some() {
		return Err(ScopeBindError::AlreadyBound);
	}
	Ok(REQUEST_SCOPE.scope(Arc::new(ctx), fut).await)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn unit_context_may_lack_a_unit_id() {
		let ctx = ScopeContext::new(ScopeType::Unit, ActorId::generate(), None);
		assert!(ctx.unit_id().is_none());
		assert!(!ctx.is_global());
		assert_eq!(ctx.scope_type(), ScopeType::Unit);
	}

	#[test]
	fn constructors_set_scope_type() {
		let actor = ActorId::generate();
		let unit = UnitId::generate();
		assert!(ScopeContext::global(actor).is_global());
		assert_eq!(ScopeContext::unit(actor, unit).unit_id(), Some(unit));
		assert_eq!(ScopeContext::own(actor, None).scope_type(), ScopeType::Own);
	}

	#[tokio::test]
	async fn no_scope_outside_binding() {
		assert!(current_scope().is_none());
	}

	#[tokio::test]
	async fn bound_scope_is_visible_inside_future() {
		let ctx = ScopeContext::unit(ActorId::generate(), UnitId::generate());
		let expected = ctx.clone();
		let seen = with_scope(ctx, async { current_scope() }).await.unwrap();
		assert_eq!(seen.as_deref(), Some(&expected));
		assert!(current_scope().is_none());
	}

	#[tokio::test]
	async fn rebinding_inside_request_fails_and_keeps_original() {
		let original = ScopeContext::unit(ActorId::generate(), UnitId::generate());
		let expected = original.clone();

		let (nested, after) = with_scope(original, async {
			let nested = with_scope(ScopeContext::global(ActorId::generate()), async {}).await;
			(nested, current_scope())
		})
		.await
		.unwrap();

		assert_eq!(nested, Err(ScopeBindError::AlreadyBound));
		assert_eq!(after.as_deref(), Some(&expected));
	}

	#[tokio::test]
	async fn spawned_tasks_do_not_inherit_scope() {
		let ctx = ScopeContext::global(ActorId::generate());
		let inner = with_scope(ctx, async {
			tokio::spawn(async { current_scope().is_some() })
				.await
				.unwrap()
		})
		.await
		.unwrap();
		assert!(!inner);
	}
}
