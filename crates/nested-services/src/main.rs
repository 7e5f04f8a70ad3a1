// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Nested service process.
//!
//! Runs one of the `users`, `invoices` or `auth` services against RabbitMQ,
//! selected by `NESTED_SERVICE`.

use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};

use nested_rpc::broker::AmqpBroker;
use nested_services::config::Config;
use nested_services::persistence::open_store_pool;
use nested_services::runtime::ServiceRuntime;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (from crate directory or parent directories)
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("nested_services=info".parse()?)
                .add_directive("nested_rpc=info".parse()?),
        )
        .init();

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;

    info!(
        service = %config.service,
        max_connections = config.max_connections,
        call_timeout_ms = config.client.call_timeout.as_millis() as u64,
        max_in_flight = config.dispatcher.max_in_flight,
        "Starting nested service"
    );

    // Connect to the broker
    let broker = Arc::new(AmqpBroker::connect(&config.amqp_url).await.map_err(|e| {
        error!("Broker connection failed: {}", e);
        e
    })?);

    // Open the store pool
    let stores = open_store_pool(&config.database_url, config.max_connections)
        .await
        .map_err(|e| {
            error!("Store initialization failed: {}", e);
            e
        })?;
    info!("Store pool ready");

    let runtime = ServiceRuntime::builder()
        .config(&config)
        .broker(broker.clone())
        .stores(stores)
        .build()?
        .start()
        .await?;

    info!(queue = config.service.queue(), "Service is serving requests");

    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl-C, shutting down");

    runtime.shutdown().await?;
    if let Err(e) = broker.close().await {
        error!("Broker close failed: {}", e);
    }

    info!("Nested service stopped");
    Ok(())
}
