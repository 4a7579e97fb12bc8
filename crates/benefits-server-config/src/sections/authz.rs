// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Authorization configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthzConfig {
	pub grant_cache_ttl_secs: u64,
	/// Honour unit ids supplied by the request (path, query, header).
	pub allow_request_scope_id: bool,
}

impl AuthzConfig {
	pub fn grant_cache_ttl(&self) -> Duration {
		Duration::from_secs(self.grant_cache_ttl_secs)
	}
}

impl Default for AuthzConfig {
	fn default() -> Self {
		Self {
			grant_cache_ttl_secs: 60,
			allow_request_scope_id: true,
		}
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AuthzConfigLayer {
	pub grant_cache_ttl_secs: Option<u64>,
	pub allow_request_scope_id: Option<bool>,
}

impl AuthzConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.grant_cache_ttl_secs.is_some() {
			self.grant_cache_ttl_secs = other.grant_cache_ttl_secs;
		}
		if other.allow_request_scope_id.is_some() {
			self.allow_request_scope_id = other.allow_request_scope_id;
		}
	}

	pub fn finalize(self) -> AuthzConfig {
		let defaults = AuthzConfig::default();
		AuthzConfig {
			grant_cache_ttl_secs: self
				.grant_cache_ttl_secs
				.unwrap_or(defaults.grant_cache_ttl_secs),
			allow_request_scope_id: self
				.allow_request_scope_id
				.unwrap_or(defaults.allow_request_scope_id),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults() {
		let config = AuthzConfigLayer::default().finalize();
		assert_eq!(config.grant_cache_ttl(), Duration::from_secs(60));
		assert!(config.allow_request_scope_id);
	}

	#[test]
	fn test_request_scope_id_can_be_disabled() {
		let layer = AuthzConfigLayer {
			allow_request_scope_id: Some(false),
			..Default::default()
		};
		assert!(!layer.finalize().allow_request_scope_id);
	}
}
