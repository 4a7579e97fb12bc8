// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: defaults, TOML files and environment variables.

use std::path::PathBuf;

use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::ServerConfigLayer;
use crate::sections::{
	AuthzConfigLayer, DatabaseConfigLayer, JoinPathConfig, LoggingConfigLayer,
	MetadataCacheConfigLayer, ScopeConfigLayer,
};

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<ServerConfigLayer, ConfigError>;
}

/// Built-in defaults. Defaults live in each section's `finalize`, so this
/// layer is empty.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(ServerConfigLayer::default())
	}
}

/// TOML file source. A missing file yields an empty layer.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn system() -> Self {
		Self::new("/etc/benefits/server.toml")
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(ServerConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: ServerConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: `BENEFITS_SERVER_<SECTION>_<FIELD>`. Join paths are given as
/// a JSON array in `BENEFITS_SERVER_SCOPE_JOIN_PATHS`.
pub struct EnvSource;

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading environment variables");
		layer_from_vars(&Vars(|name: &str| std::env::var(name).ok()))
	}
}

/// Variable lookup; empty values count as unset.
struct Vars<F>(F);

impl<F: Fn(&str) -> Option<String>> Vars<F> {
	fn get(&self, name: &str) -> Option<String> {
		(self.0)(name).filter(|s| !s.is_empty())
	}

	fn bool(&self, name: &str) -> Result<Option<bool>, ConfigError> {
		match self.get(name) {
			Some(v) => match v.to_ascii_lowercase().as_str() {
				"1" | "true" | "yes" => Ok(Some(true)),
				"0" | "false" | "no" => Ok(Some(false)),
				_ => Err(ConfigError::invalid_value(
					name,
					format!("invalid boolean value '{v}'"),
				)),
			},
			None => Ok(None),
		}
	}

	fn u64(&self, name: &str) -> Result<Option<u64>, ConfigError> {
		match self.get(name) {
			Some(v) => v
				.parse()
				.map(Some)
				.map_err(|_| ConfigError::invalid_value(name, format!("invalid u64 value '{v}'"))),
			None => Ok(None),
		}
	}

	fn join_paths(&self, name: &str) -> Result<Option<Vec<JoinPathConfig>>, ConfigError> {
		match self.get(name) {
			Some(v) => serde_json::from_str(&v)
				.map(Some)
				.map_err(|e| ConfigError::invalid_value(name, format!("invalid join paths: {e}"))),
			None => Ok(None),
		}
	}
}

fn layer_from_vars<F>(vars: &Vars<F>) -> Result<ServerConfigLayer, ConfigError>
where
	F: Fn(&str) -> Option<String>,
{
	Ok(ServerConfigLayer {
		database: Some(DatabaseConfigLayer {
			url: vars.get("BENEFITS_SERVER_DATABASE_URL"),
		}),
		scope: Some(ScopeConfigLayer {
			strict_mode: vars.bool("BENEFITS_SERVER_SCOPE_STRICT_MODE")?,
			unit_column: vars.get("BENEFITS_SERVER_SCOPE_UNIT_COLUMN"),
			actor_column: vars.get("BENEFITS_SERVER_SCOPE_ACTOR_COLUMN"),
			join_paths: vars.join_paths("BENEFITS_SERVER_SCOPE_JOIN_PATHS")?,
		}),
		metadata_cache: Some(MetadataCacheConfigLayer {
			ttl_secs: vars.u64("BENEFITS_SERVER_METADATA_CACHE_TTL_SECS")?,
			distributed: vars.bool("BENEFITS_SERVER_METADATA_CACHE_DISTRIBUTED")?,
		}),
		authz: Some(AuthzConfigLayer {
			grant_cache_ttl_secs: vars.u64("BENEFITS_SERVER_AUTHZ_GRANT_CACHE_TTL_SECS")?,
			allow_request_scope_id: vars.bool("BENEFITS_SERVER_AUTHZ_ALLOW_REQUEST_SCOPE_ID")?,
		}),
		logging: Some(LoggingConfigLayer {
			level: vars.get("BENEFITS_SERVER_LOG_LEVEL"),
			json: vars.bool("BENEFITS_SERVER_LOG_JSON")?,
		}),
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;
	use std::io::Write;

	fn layer_from(pairs: &[(&str, &str)]) -> Result<ServerConfigLayer, ConfigError> {
		let map: HashMap<String, String> = pairs
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect();
		layer_from_vars(&Vars(move |name: &str| map.get(name).cloned()))
	}

	#[test]
	fn test_precedence_ordering() {
		assert!(Precedence::Environment > Precedence::ConfigFile);
		assert!(Precedence::ConfigFile > Precedence::Defaults);
	}

	#[test]
	fn test_defaults_source_returns_empty_layer() {
		let layer = DefaultsSource.load().unwrap();
		assert!(layer.database.is_none());
		assert!(layer.scope.is_none());
	}

	#[test]
	fn test_toml_source_missing_file_returns_empty() {
		let layer = TomlSource::new("/nonexistent/server.toml").load().unwrap();
		assert_eq!(layer, ServerConfigLayer::default());
	}

	#[test]
	fn test_toml_source_reports_parse_errors_with_path() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(file, "[scope]\nstrict_mode = \"sometimes\"").unwrap();

		let err = TomlSource::new(file.path()).load().unwrap_err();
		assert!(matches!(err, ConfigError::TomlParse { .. }));
		assert!(err.to_string().contains(&file.path().display().to_string()));
	}

	#[test]
	fn test_env_values_are_parsed() {
		let layer = layer_from(&[
			("BENEFITS_SERVER_DATABASE_URL", "sqlite::memory:"),
			("BENEFITS_SERVER_SCOPE_STRICT_MODE", "false"),
			("BENEFITS_SERVER_METADATA_CACHE_TTL_SECS", "600"),
			("BENEFITS_SERVER_AUTHZ_ALLOW_REQUEST_SCOPE_ID", "0"),
			("BENEFITS_SERVER_LOG_JSON", "1"),
			(
				"BENEFITS_SERVER_SCOPE_JOIN_PATHS",
				r#"[{"entity":"payments","hops":[{"table":"requests","local_column":"request_id","foreign_column":"id"}]}]"#,
			),
		])
		.unwrap();

		assert_eq!(
			layer.database.unwrap().url.as_deref(),
			Some("sqlite::memory:")
		);
		let scope = layer.scope.unwrap();
		assert_eq!(scope.strict_mode, Some(false));
		assert_eq!(scope.join_paths.unwrap()[0].entity, "payments");
		assert_eq!(layer.metadata_cache.unwrap().ttl_secs, Some(600));
		assert_eq!(layer.authz.unwrap().allow_request_scope_id, Some(false));
		assert_eq!(layer.logging.unwrap().json, Some(true));
	}

	#[test]
	fn test_empty_env_values_are_unset() {
		let layer = layer_from(&[("BENEFITS_SERVER_LOG_LEVEL", "")]).unwrap();
		assert!(layer.logging.unwrap().level.is_none());
	}

	#[test]
	fn test_invalid_env_values_name_the_variable() {
		for (key, value) in [
			("BENEFITS_SERVER_METADATA_CACHE_TTL_SECS", "soon"),
			("BENEFITS_SERVER_SCOPE_STRICT_MODE", "maybe"),
			("BENEFITS_SERVER_SCOPE_JOIN_PATHS", "{not json"),
		] {
			match layer_from(&[(key, value)]) {
				Err(ConfigError::InvalidValue { key: reported, .. }) => assert_eq!(reported, key),
				other => panic!("expected InvalidValue for {key}, got {other:?}"),
			}
		}
	}
}
