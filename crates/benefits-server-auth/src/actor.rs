// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The authenticated actor as handed over by the identity layer.

use serde::{Deserialize, Serialize};

use crate::capability::CapabilityGrant;
use crate::error::AuthzError;
use crate::types::{ActorId, UnitId};

/// An authenticated actor.
///
/// `granted_capabilities` is set when the identity layer resolved grants up
/// front; otherwise the authorizer asks its capability lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
	pub id: ActorId,
	pub unit_id: Option<UnitId>,
	pub roles: Vec<String>,
	pub granted_capabilities: Option<Vec<CapabilityGrant>>,
}

impl Actor {
	pub fn new(id: ActorId) -> Self {
		Self {
			id,
			unit_id: None,
			roles: Vec::new(),
			granted_capabilities: None,
		}
	}

	/// Builder: set the actor's organizational unit.
	pub fn in_unit(mut self, unit_id: UnitId) -> Self {
		self.unit_id = Some(unit_id);
		self
	}

	/// Builder: set role names.
	pub fn with_roles<I, S>(mut self, roles: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.roles = roles.into_iter().map(Into::into).collect();
		self
	}

	/// Builder: attach pre-resolved grants.
	pub fn with_grants(mut self, grants: Vec<CapabilityGrant>) -> Self {
		self.granted_capabilities = Some(grants);
		self
	}

	pub fn has_role(&self, role: &str) -> bool {
		self.roles.iter().any(|r| r == role)
	}
}

/// Authentication state for one request.
#[derive(Debug, Clone, Default)]
pub struct AuthContext {
	pub actor: Option<Actor>,
}

impl AuthContext {
	pub fn unauthenticated() -> Self {
		Self { actor: None }
	}

	pub fn authenticated(actor: Actor) -> Self {
		Self { actor: Some(actor) }
	}

	pub fn is_authenticated(&self) -> bool {
		self.actor.is_some()
	}

	/// Require authentication, returning the actor or an error.
	pub fn require_actor(&self) -> Result<&Actor, AuthzError> {
		self.actor.as_ref().ok_or(AuthzError::NotAuthenticated)
	}
}
