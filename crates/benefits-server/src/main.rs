// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Benefits server binary: loads configuration, prepares the database and
//! keeps the scope core running until interrupted.

use benefits_server::{init_tracing, ScopeCore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let config = match std::env::args().nth(1) {
		Some(path) => benefits_server_config::load_config_with_file(path)?,
		None => benefits_server_config::load_config()?,
	};

	init_tracing(&config.logging)?;

	tracing::info!(
		database = %config.database.url,
		strict_mode = config.scope.strict_mode,
		"starting benefits-server"
	);

	let core = ScopeCore::from_config(&config).await?;

	let entities: Vec<&str> = config
		.scope
		.join_paths
		.iter()
		.map(|p| p.entity.as_str())
		.collect();
	let warmed = core.metadata().warm_from_distributed(&entities).await;
	tracing::info!(warmed, "metadata cache warmed");

	tokio::signal::ctrl_c().await?;
	tracing::info!("shutting down");
	core.pool().close().await;
	Ok(())
}
