// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use benefits_server_config::LoggingConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{Result, ServerError};

/// Installs the global subscriber. `RUST_LOG` overrides `config.level`.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
	let filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

	let (plain, json) = if config.json {
		(None, Some(tracing_subscriber::fmt::layer().json()))
	} else {
		(Some(tracing_subscriber::fmt::layer()), None)
	};

	tracing_subscriber::registry()
		.with(filter)
		.with(plain)
		.with(json)
		.try_init()
		.map_err(|e| ServerError::Tracing(e.to_string()))
}
