// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Partial configuration produced by each source.

use serde::Deserialize;

use crate::sections::{
	AuthzConfigLayer, DatabaseConfigLayer, LoggingConfigLayer, MetadataCacheConfigLayer,
	ScopeConfigLayer,
};

/// One source's view of the configuration. Unset fields defer to lower layers.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ServerConfigLayer {
	#[serde(default)]
	pub database: Option<DatabaseConfigLayer>,
	#[serde(default)]
	pub scope: Option<ScopeConfigLayer>,
	#[serde(default)]
	pub metadata_cache: Option<MetadataCacheConfigLayer>,
	#[serde(default)]
	pub authz: Option<AuthzConfigLayer>,
	#[serde(default)]
	pub logging: Option<LoggingConfigLayer>,
}

fn merge_section<T>(base: &mut Option<T>, other: Option<T>, merge: impl FnOnce(&mut T, T)) {
	let Some(other) = other else {
		return;
	};
	if let Some(existing) = base.as_mut() {
		merge(existing, other);
	} else {
		*base = Some(other);
	}
}

impl ServerConfigLayer {
	/// Overlays `other` onto `self`; set fields in `other` win.
	pub fn merge(&mut self, other: ServerConfigLayer) {
		merge_section(&mut self.database, other.database, DatabaseConfigLayer::merge);
		merge_section(&mut self.scope, other.scope, ScopeConfigLayer::merge);
		merge_section(
			&mut self.metadata_cache,
			other.metadata_cache,
			MetadataCacheConfigLayer::merge,
		);
		merge_section(&mut self.authz, other.authz, AuthzConfigLayer::merge);
		merge_section(&mut self.logging, other.logging, LoggingConfigLayer::merge);
	}
}
