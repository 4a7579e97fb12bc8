// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sections.

mod authz;
mod database;
mod logging;
mod metadata_cache;
mod scope;

pub use authz::{AuthzConfig, AuthzConfigLayer};
pub use database::{DatabaseConfig, DatabaseConfigLayer};
pub use logging::{LoggingConfig, LoggingConfigLayer};
pub use metadata_cache::{MetadataCacheConfig, MetadataCacheConfigLayer};
pub use scope::{JoinHopConfig, JoinPathConfig, ScopeConfig, ScopeConfigLayer};
