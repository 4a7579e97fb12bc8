// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Permission requirements declared by business operations.
//!
//! A requirement names a capability, the scope it is needed at, optionally
//! where to read a target unit id from the inbound request, and the roles
//! that lift the requirement to global scope.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use http::{HeaderMap, Uri};
use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use crate::types::{ScopeType, UnitId};

/// One capability an operation may be invoked with.
///
/// Several requirements attached to one operation are OR-combined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRequirement {
	pub capability: String,
	#[serde(default)]
	pub scope_type: ScopeType,
	#[serde(default)]
	pub scope_id_source: Option<ScopeIdSource>,
	#[serde(default)]
	pub bypass_roles: Vec<String>,
}

impl PermissionRequirement {
	/// Requirement at the default (global) scope.
	pub fn new(capability: impl Into<String>) -> Self {
		Self {
			capability: capability.into(),
			scope_type: ScopeType::Global,
			scope_id_source: None,
			bypass_roles: Vec::new(),
		}
	}

	/// Requirement at unit scope.
	pub fn unit(capability: impl Into<String>) -> Self {
		Self::new(capability).with_scope(ScopeType::Unit)
	}

	/// Requirement at own-records scope.
	pub fn own(capability: impl Into<String>) -> Self {
		Self::new(capability).with_scope(ScopeType::Own)
	}

	/// Builder: set the declared scope.
	pub fn with_scope(mut self, scope_type: ScopeType) -> Self {
		self.scope_type = scope_type;
		self
	}

	/// Builder: read the target unit id from the request.
	pub fn with_scope_id_source(mut self, source: ScopeIdSource) -> Self {
		self.scope_id_source = Some(source);
		self
	}

	/// Builder: roles that force global scope for this requirement.
	pub fn with_bypass_roles<I, S>(mut self, roles: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.bypass_roles = roles.into_iter().map(Into::into).collect();
		self
	}

	/// Returns true if any of `roles` is a bypass role of this requirement.
	pub fn is_bypassed_by(&self, roles: &[String]) -> bool {
		roles.iter().any(|role| self.bypass_roles.contains(role))
	}
}

/// Where to read a target unit id from an inbound request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ScopeIdSource {
	PathParam(String),
	Query(String),
	Header(String),
}

impl ScopeIdSource {
	/// Evaluates the source against a request, returning the raw value.
	pub fn resolve<'a>(&self, request: &'a RequestView) -> Option<&'a str> {
		match self {
			ScopeIdSource::PathParam(name) => request.path_param(name),
			ScopeIdSource::Query(name) => request.query_param(name),
			ScopeIdSource::Header(name) => request.header(name),
		}
	}

	/// Evaluates the source and parses the value as a unit id.
	pub fn resolve_unit_id(&self, request: &RequestView) -> Option<UnitId> {
		let raw = self.resolve(request)?;
		match raw.parse() {
			Ok(id) => Some(id),
			Err(_) => {
				tracing::debug!(source = %self, "scope id source value is not a unit id");
				None
			}
		}
	}
}

impl fmt::Display for ScopeIdSource {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ScopeIdSource::PathParam(name) => write!(f, "params.{name}"),
			ScopeIdSource::Query(name) => write!(f, "query.{name}"),
			ScopeIdSource::Header(name) => write!(f, "headers.{name}"),
		}
	}
}

/// Error returned for a malformed scope id source expression.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid scope id source expression: {0}")]
pub struct InvalidScopeIdSource(pub String);

impl FromStr for ScopeIdSource {
	type Err = InvalidScopeIdSource;

	/// Parses `params.<name>`, `query.<name>` or `headers.<name>`.
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let (kind, name) = s
			.trim()
			.split_once('.')
			.ok_or_else(|| InvalidScopeIdSource(s.to_string()))?;
		if name.is_empty() {
			return Err(InvalidScopeIdSource(s.to_string()));
		}
		match kind {
			"params" => Ok(ScopeIdSource::PathParam(name.to_string())),
			"query" => Ok(ScopeIdSource::Query(name.to_string())),
			"headers" => Ok(ScopeIdSource::Header(name.to_ascii_lowercase())),
			_ => Err(InvalidScopeIdSource(s.to_string())),
		}
	}
}

impl TryFrom<String> for ScopeIdSource {
	type Error = InvalidScopeIdSource;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		value.parse()
	}
}

impl From<ScopeIdSource> for String {
	fn from(source: ScopeIdSource) -> Self {
		source.to_string()
	}
}

/// The parts of an inbound request that scope-id sources can read.
#[derive(Debug, Clone, Default)]
pub struct RequestView {
	path_params: HashMap<String, String>,
	query: HashMap<String, String>,
	headers: HeaderMap,
}

impl RequestView {
	pub fn new() -> Self {
		Self::default()
	}

	/// Builds a view from a request URI and headers.
	pub fn from_parts(uri: &Uri, headers: &HeaderMap) -> Self {
		let query = form_urlencoded::parse(uri.query().unwrap_or("").as_bytes())
			.filter(|(key, _)| !key.is_empty())
			.map(|(key, value)| (key.into_owned(), value.into_owned()))
			.collect();

		Self {
			path_params: HashMap::new(),
			query,
			headers: headers.clone(),
		}
	}

	/// Builder: add a matched path parameter.
	pub fn with_path_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.path_params.insert(name.into(), value.into());
		self
	}

	pub fn path_param(&self, name: &str) -> Option<&str> {
		self.path_params.get(name).map(String::as_str)
	}

	pub fn query_param(&self, name: &str) -> Option<&str> {
		self.query.get(name).map(String::as_str)
	}

	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.get(name)?.to_str().ok()
	}
}
