// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core type definitions for scope enforcement.
//!
//! - **ID newtypes**: Type-safe wrappers around UUIDs for actors and
//!   organizational units ([`ActorId`], [`UnitId`]) preventing accidental mixing
//! - **Scope types**: The breadth of data an actor may touch ([`ScopeType`])
//!
//! All ID types implement transparent serde serialization (as UUID strings) and
//! provide conversion to/from [`uuid::Uuid`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// =============================================================================
// ID Newtypes
// =============================================================================

macro_rules! define_id_type {
	($name:ident, $doc:expr) => {
		#[doc = $doc]
		#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
		#[serde(transparent)]
		pub struct $name(Uuid);

		impl $name {
			/// Create a new ID from a UUID.
			pub fn new(id: Uuid) -> Self {
				Self(id)
			}

			/// Generate a new random ID.
			pub fn generate() -> Self {
				Self(Uuid::new_v4())
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				write!(f, "{}", self.0)
			}
		}

		impl FromStr for $name {
			type Err = uuid::Error;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				Uuid::parse_str(s.trim()).map(Self)
			}
		}

		impl From<Uuid> for $name {
			fn from(id: Uuid) -> Self {
				Self(id)
			}
		}

		impl From<$name> for Uuid {
			fn from(id: $name) -> Self {
				id.0
			}
		}
	};
}

define_id_type!(ActorId, "Unique identifier for an authenticated actor.");
define_id_type!(UnitId, "Unique identifier for an organizational unit.");

// =============================================================================
// Scope Types
// =============================================================================

/// Breadth of data an actor may access.
///
/// Variants are ordered by breadth: `Own < Unit < Global`. A grant at a
/// broader scope satisfies a requirement at a narrower one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeType {
	/// Only records the actor created or owns.
	Own,
	/// Records belonging to one organizational unit.
	Unit,
	/// Every record, no restriction.
	Global,
}

impl ScopeType {
	/// Returns true if this scope is at least as broad as `other`.
	pub fn covers(&self, other: ScopeType) -> bool {
		*self >= other
	}
}

impl Default for ScopeType {
	fn default() -> Self {
		ScopeType::Global
	}
}

impl fmt::Display for ScopeType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ScopeType::Own => write!(f, "own"),
			ScopeType::Unit => write!(f, "unit"),
			ScopeType::Global => write!(f, "global"),
		}
	}
}

/// Error returned when parsing an unknown scope type name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown scope type: {0}")]
pub struct UnknownScopeType(pub String);

impl FromStr for ScopeType {
	type Err = UnknownScopeType;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"own" => Ok(ScopeType::Own),
			"unit" => Ok(ScopeType::Unit),
			"global" => Ok(ScopeType::Global),
			other => Err(UnknownScopeType(other.to_string())),
		}
	}
}
