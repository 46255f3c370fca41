// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Identity Gateway
//!
//! Liveness and caller identity passthrough over HTTP.

use anyhow::Result;
use gateway::{Server, ServerConfig, ServerError, ShutdownConfig};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting identity gateway");

    let config = ServerConfig::from_env()?;

    let shutdown_config = ShutdownConfig::from(&config);

    let server = Server::new(config, shutdown_config).await;

    // NOTE: the `#[tokio::main]` task does not run a worker future, we must spawn
    let outcome = tokio::spawn(async move { server.run().await })
        .await
        .map_err(|source| ServerError::TaskJoin { source })?
        .inspect_err(|e| error!(error = %e, "identity gateway failed to start"))?;

    info!(outcome = ?outcome, "identity gateway exited");

    Ok(())
}
