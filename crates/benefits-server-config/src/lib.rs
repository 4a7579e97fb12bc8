// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration for the benefits server.
//!
//! This crate provides:
//! - Layered configuration from multiple sources (defaults, TOML file, environment)
//! - Type-safe resolved sections with cross-field validation
//! - Consistent environment variable naming (`BENEFITS_SERVER_*`)
//!
//! # Usage
//!
//! ```ignore
//! use benefits_server_config::load_config;
//!
//! let config = load_config()?;
//! println!("strict mode: {}", config.scope.strict_mode);
//! ```

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use layer::ServerConfigLayer;
pub use sections::*;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use std::collections::HashSet;

use tracing::{debug, info};

/// Longest join path accepted from configuration.
pub const MAX_JOIN_PATH_HOPS: usize = 2;

/// Fully resolved server configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerConfig {
	pub database: DatabaseConfig,
	pub scope: ScopeConfig,
	pub metadata_cache: MetadataCacheConfig,
	pub authz: AuthzConfig,
	pub logging: LoggingConfig,
}

/// Load configuration from all sources with standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables (`BENEFITS_SERVER_*`)
/// 2. Config file (`/etc/benefits/server.toml`)
/// 3. Built-in defaults
pub fn load_config() -> Result<ServerConfig, ConfigError> {
	load_config_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	])
}

/// Load configuration with a custom config file path.
pub fn load_config_with_file(
	config_path: impl Into<std::path::PathBuf>,
) -> Result<ServerConfig, ConfigError> {
	load_config_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	])
}

/// Merge `sources` in precedence order and resolve the result.
pub fn load_config_from_sources(
	mut sources: Vec<Box<dyn ConfigSource>>,
) -> Result<ServerConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = ServerConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		merged.merge(source.load()?);
	}

	finalize(merged)
}

/// Finalize a merged layer into resolved, validated configuration.
pub fn finalize(layer: ServerConfigLayer) -> Result<ServerConfig, ConfigError> {
	let config = ServerConfig {
		database: layer.database.unwrap_or_default().finalize(),
		scope: layer.scope.unwrap_or_default().finalize(),
		metadata_cache: layer.metadata_cache.unwrap_or_default().finalize(),
		authz: layer.authz.unwrap_or_default().finalize(),
		logging: layer.logging.unwrap_or_default().finalize(),
	};

	validate_config(&config)?;

	info!(
		database = %config.database.url,
		strict_mode = config.scope.strict_mode,
		join_paths = config.scope.join_paths.len(),
		metadata_ttl_secs = config.metadata_cache.ttl_secs,
		metadata_distributed = config.metadata_cache.distributed,
		grant_cache_ttl_secs = config.authz.grant_cache_ttl_secs,
		allow_request_scope_id = config.authz.allow_request_scope_id,
		"Server configuration loaded"
	);

	Ok(config)
}

/// Validate cross-field configuration rules.
fn validate_config(config: &ServerConfig) -> Result<(), ConfigError> {
	config.database.validate()?;
	if config.metadata_cache.ttl_secs == 0 {
		return Err(ConfigError::validation(
			"metadata_cache.ttl_secs must be greater than zero",
		));
	}
	if config.authz.grant_cache_ttl_secs == 0 {
		return Err(ConfigError::validation(
			"authz.grant_cache_ttl_secs must be greater than zero",
		));
	}
	if config.scope.unit_column.is_empty() || config.scope.actor_column.is_empty() {
		return Err(ConfigError::validation(
			"scope.unit_column and scope.actor_column must not be empty",
		));
	}

	let mut entities = HashSet::new();
	for path in &config.scope.join_paths {
		if !entities.insert(path.entity.as_str()) {
			return Err(ConfigError::validation(format!(
				"duplicate join path for entity {}",
				path.entity
			)));
		}
		if path.hops.is_empty() || path.hops.len() > MAX_JOIN_PATH_HOPS {
			return Err(ConfigError::validation(format!(
				"join path for {} must have 1 to {MAX_JOIN_PATH_HOPS} hops, got {}",
				path.entity,
				path.hops.len()
			)));
		}
	}

	if !config.scope.strict_mode {
		tracing::warn!("scope.strict_mode is disabled; unscoped methods are open to every caller");
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	fn hop(table: &str) -> JoinHopConfig {
		JoinHopConfig {
			table: table.to_string(),
			local_column: format!("{table}_id"),
			foreign_column: "id".to_string(),
		}
	}

	fn path(entity: &str, hops: Vec<JoinHopConfig>) -> JoinPathConfig {
		JoinPathConfig {
			entity: entity.to_string(),
			hops,
			unit_column: "unit_id".to_string(),
		}
	}

	fn with_paths(paths: Vec<JoinPathConfig>) -> ServerConfig {
		ServerConfig {
			scope: ScopeConfig {
				join_paths: paths,
				..Default::default()
			},
			..Default::default()
		}
	}

	#[test]
	fn test_defaults_are_valid() {
		let config = finalize(ServerConfigLayer::default()).unwrap();
		assert_eq!(config, ServerConfig::default());
	}

	#[test]
	fn test_zero_ttls_are_rejected() {
		let mut config = ServerConfig::default();
		config.metadata_cache.ttl_secs = 0;
		assert!(matches!(
			validate_config(&config),
			Err(ConfigError::Validation(_))
		));

		let mut config = ServerConfig::default();
		config.authz.grant_cache_ttl_secs = 0;
		assert!(validate_config(&config)
			.unwrap_err()
			.to_string()
			.contains("grant_cache_ttl_secs"));
	}

	#[test]
	fn test_join_path_hop_count_is_bounded() {
		assert!(validate_config(&with_paths(vec![path("payments", vec![])])).is_err());
		assert!(validate_config(&with_paths(vec![path(
			"payments",
			vec![hop("requests"), hop("citizens"), hop("units")]
		)]))
		.is_err());
		assert!(validate_config(&with_paths(vec![path(
			"payments",
			vec![hop("requests"), hop("citizens")]
		)]))
		.is_ok());
	}

	#[test]
	fn test_duplicate_join_paths_are_rejected() {
		let config = with_paths(vec![
			path("payments", vec![hop("requests")]),
			path("payments", vec![hop("citizens")]),
		]);
		assert!(validate_config(&config)
			.unwrap_err()
			.to_string()
			.contains("duplicate"));
	}

	#[test]
	fn test_file_overrides_defaults() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		write!(
			file,
			r#"
[database]
url = "sqlite:/srv/benefits.db"

[scope]
strict_mode = false

[[scope.join_paths]]
entity = "payments"
hops = [
  {{ table = "requests", local_column = "request_id", foreign_column = "id" }},
  {{ table = "citizens", local_column = "citizen_id", foreign_column = "id" }},
]

[metadata_cache]
ttl_secs = 30
distributed = true
"#
		)
		.unwrap();

		let config = load_config_from_sources(vec![
			Box::new(TomlSource::new(file.path())),
			Box::new(DefaultsSource),
		])
		.unwrap();

		assert_eq!(config.database.url, "sqlite:/srv/benefits.db");
		assert!(!config.scope.strict_mode);
		assert_eq!(config.scope.join_paths[0].hops.len(), 2);
		assert_eq!(config.metadata_cache.ttl_secs, 30);
		assert!(config.metadata_cache.distributed);
		assert_eq!(config.authz, AuthzConfig::default());
	}

	#[test]
	fn test_non_sqlite_database_url_is_rejected() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		write!(file, "[database]\nurl = \"postgres://db/benefits\"\n").unwrap();

		let result = load_config_from_sources(vec![Box::new(TomlSource::new(file.path()))]);
		assert!(matches!(
			result,
			Err(ConfigError::InvalidValue { ref key, .. }) if key == "database.url"
		));
	}

	#[test]
	fn test_invalid_file_values_fail_validation() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		write!(file, "[metadata_cache]\nttl_secs = 0\n").unwrap();

		let result = load_config_from_sources(vec![Box::new(TomlSource::new(file.path()))]);
		assert!(matches!(result, Err(ConfigError::Validation(_))));
	}
}
