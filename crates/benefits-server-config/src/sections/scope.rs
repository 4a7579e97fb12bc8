// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Scope enforcement configuration.
//!
//! ```toml
//! [scope]
//! strict_mode = true
//! unit_column = "unit_id"
//! actor_column = "actor_id"
//!
//! [[scope.join_paths]]
//! entity = "payments"
//! unit_column = "unit_id"
//! hops = [
//!   { table = "requests", local_column = "request_id", foreign_column = "id" },
//!   { table = "citizens", local_column = "citizen_id", foreign_column = "id" },
//! ]
//! ```

use serde::{Deserialize, Serialize};

/// One join of a configured path: `previous.local_column = table.foreign_column`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinHopConfig {
	pub table: String,
	pub local_column: String,
	pub foreign_column: String,
}

/// Path from an entity without a unit column to the table that has one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinPathConfig {
	pub entity: String,
	pub hops: Vec<JoinHopConfig>,
	#[serde(default = "default_unit_column")]
	pub unit_column: String,
}

fn default_unit_column() -> String {
	"unit_id".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeConfig {
	/// Unscoped accessor methods require a GLOBAL context.
	pub strict_mode: bool,
	pub unit_column: String,
	pub actor_column: String,
	pub join_paths: Vec<JoinPathConfig>,
}

impl Default for ScopeConfig {
	fn default() -> Self {
		ScopeConfigLayer::default().finalize()
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScopeConfigLayer {
	pub strict_mode: Option<bool>,
	pub unit_column: Option<String>,
	pub actor_column: Option<String>,
	pub join_paths: Option<Vec<JoinPathConfig>>,
}

impl ScopeConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.strict_mode.is_some() {
			self.strict_mode = other.strict_mode;
		}
		if other.unit_column.is_some() {
			self.unit_column = other.unit_column;
		}
		if other.actor_column.is_some() {
			self.actor_column = other.actor_column;
		}
		if other.join_paths.is_some() {
			self.join_paths = other.join_paths;
		}
	}

	pub fn finalize(self) -> ScopeConfig {
		ScopeConfig {
			strict_mode: self.strict_mode.unwrap_or(true),
			unit_column: self.unit_column.unwrap_or_else(default_unit_column),
			actor_column: self.actor_column.unwrap_or_else(|| "actor_id".to_string()),
			join_paths: self.join_paths.unwrap_or_default(),
		}
	}
}
