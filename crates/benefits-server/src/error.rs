// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use benefits_server_config::ConfigError;
use benefits_server_db::DbError;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
	#[error("Configuration error: {0}")]
	Config(#[from] ConfigError),

	#[error("Database error: {0}")]
	Db(#[from] DbError),

	#[error("Tracing initialisation failed: {0}")]
	Tracing(String),
}

pub type Result<T> = std::result::Result<T, ServerError>;
