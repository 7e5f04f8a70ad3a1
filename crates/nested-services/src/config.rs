// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Service process configuration loaded from environment variables.

use std::env;
use std::time::Duration;

use nested_protocol::Service;
use nested_rpc::config::env_or;
use nested_rpc::{ClientConfig, ConfigError, DispatcherConfig};

use crate::handlers::DEFAULT_TOKEN_TTL;

/// Service process configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Which service this process runs (`NESTED_SERVICE`)
    pub service: Service,

    /// Capacity of both the channel pool and the store pool
    pub max_connections: usize,

    /// Broker URI
    pub amqp_url: String,

    /// Store URI; `memory:` selects the in-process store
    pub database_url: String,

    pub client: ClientConfig,
    pub dispatcher: DispatcherConfig,

    /// How long an auth token stays valid
    pub token_ttl: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `NESTED_SERVICE`: `users`, `invoices` or `auth`
    ///
    /// Optional:
    /// - `NESTED_MAX_CONNECTIONS`: pool capacity (default: 8)
    /// - `NESTED_AMQP_URL`: broker URI (default: amqp://127.0.0.1:5672/%2f)
    /// - `NESTED_DATABASE_URL`: store URI (default: sqlite:nested.db?mode=rwc)
    /// - `NESTED_RPC_TIMEOUT_MS`: client call deadline (default: 10000)
    /// - `NESTED_MAX_IN_FLIGHT`: dispatcher worker bound (default: 64)
    /// - `NESTED_TOKEN_TTL_SECS`: auth token validity (default: 86400)
    pub fn from_env() -> Result<Self, ConfigError> {
        let service = env::var("NESTED_SERVICE")
            .map_err(|_| ConfigError::Missing("NESTED_SERVICE"))?
            .parse::<Service>()
            .map_err(|_| {
                ConfigError::Invalid("NESTED_SERVICE", "expected users, invoices or auth")
            })?;

        let max_connections: usize =
            env_or("NESTED_MAX_CONNECTIONS", 8, "must be a positive integer")?;
        if max_connections == 0 {
            return Err(ConfigError::Invalid(
                "NESTED_MAX_CONNECTIONS",
                "must be a positive integer",
            ));
        }

        let amqp_url = env::var("NESTED_AMQP_URL")
            .unwrap_or_else(|_| "amqp://127.0.0.1:5672/%2f".to_string());

        let database_url = env::var("NESTED_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite:nested.db?mode=rwc".to_string());

        let ttl_secs: u64 = env_or(
            "NESTED_TOKEN_TTL_SECS",
            DEFAULT_TOKEN_TTL.as_secs(),
            "must be a number of seconds",
        )?;

        Ok(Self {
            service,
            max_connections,
            amqp_url,
            database_url,
            client: ClientConfig::from_env()?,
            dispatcher: DispatcherConfig::from_env()?,
            token_ttl: Duration::from_secs(ttl_secs),
        })
    }
}
