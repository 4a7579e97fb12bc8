// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Entity metadata cache configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataCacheConfig {
	pub ttl_secs: u64,
	/// Mirror entries to the shared `entity_metadata_cache` table.
	pub distributed: bool,
}

impl MetadataCacheConfig {
	pub fn ttl(&self) -> Duration {
		Duration::from_secs(self.ttl_secs)
	}
}

impl Default for MetadataCacheConfig {
	fn default() -> Self {
		Self {
			ttl_secs: 300,
			distributed: false,
		}
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MetadataCacheConfigLayer {
	pub ttl_secs: Option<u64>,
	pub distributed: Option<bool>,
}

impl MetadataCacheConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.ttl_secs.is_some() {
			self.ttl_secs = other.ttl_secs;
		}
		if other.distributed.is_some() {
			self.distributed = other.distributed;
		}
	}

	pub fn finalize(self) -> MetadataCacheConfig {
		let defaults = MetadataCacheConfig::default();
		MetadataCacheConfig {
			ttl_secs: self.ttl_secs.unwrap_or(defaults.ttl_secs),
			distributed: self.distributed.unwrap_or(defaults.distributed),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_ttl_is_five_minutes() {
		let config = MetadataCacheConfigLayer::default().finalize();
		assert_eq!(config.ttl(), Duration::from_secs(300));
		assert!(!config.distributed);
	}

	#[test]
	fn test_merge_keeps_unset_fields() {
		let mut base = MetadataCacheConfigLayer {
			ttl_secs: Some(60),
			distributed: Some(true),
		};
		base.merge(MetadataCacheConfigLayer {
			ttl_secs: Some(120),
			distributed: None,
		});
		assert_eq!(base.ttl_secs, Some(120));
		assert_eq!(base.distributed, Some(true));
	}
}
