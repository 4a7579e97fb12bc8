// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Storage connection settings.
//!
//! ```toml
//! [database]
//! url = "sqlite:/var/lib/benefits/benefits.db"
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// The scope core only speaks SQLite.
const URL_SCHEME: &str = "sqlite:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
	pub url: String,
}

impl DatabaseConfig {
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.url.starts_with(URL_SCHEME) && self.url.len() > URL_SCHEME.len() {
			return Ok(());
		}
		Err(ConfigError::invalid_value(
			"database.url",
			format!("expected a {URL_SCHEME} URL, got '{}'", self.url),
		))
	}
}

impl Default for DatabaseConfig {
	fn default() -> Self {
		DatabaseConfigLayer::default().finalize()
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DatabaseConfigLayer {
	pub url: Option<String>,
}

impl DatabaseConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.url.is_some() {
			self.url = other.url;
		}
	}

	pub fn finalize(self) -> DatabaseConfig {
		DatabaseConfig {
			url: self
				.url
				.unwrap_or_else(|| format!("{URL_SCHEME}./benefits.db")),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_is_local_sqlite_file() {
		let config = DatabaseConfig::default();
		assert_eq!(config.url, "sqlite:./benefits.db");
		assert!(config.validate().is_ok());
	}

	#[test]
	fn test_non_sqlite_urls_are_rejected() {
		for url in ["postgres://db/benefits", "sqlite:", "./benefits.db"] {
			let config = DatabaseConfigLayer {
				url: Some(url.to_string()),
			}
			.finalize();
			assert!(
				matches!(config.validate(), Err(ConfigError::InvalidValue { .. })),
				"{url}"
			);
		}
		assert!(DatabaseConfig {
			url: "sqlite::memory:".to_string()
		}
		.validate()
		.is_ok());
	}
}
