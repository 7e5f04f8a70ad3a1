// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Client and dispatcher configuration.

use std::str::FromStr;
use std::time::Duration;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}

/// Read `key`, falling back to `default` when unset.
pub fn env_or<T: FromStr>(
    key: &'static str,
    default: T,
    expected: &'static str,
) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(key, expected)),
        Err(_) => Ok(default),
    }
}

/// Settings for [`crate::RpcClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Deadline for a whole call, channel checkout included
    pub call_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_millis(10_000),
        }
    }
}

impl ClientConfig {
    /// Reads `NESTED_RPC_TIMEOUT_MS` (default 10000).
    pub fn from_env() -> Result<Self, ConfigError> {
        let timeout_ms: u64 =
            env_or("NESTED_RPC_TIMEOUT_MS", 10_000, "must be a positive integer")?;
        if timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "NESTED_RPC_TIMEOUT_MS",
                "must be a positive integer",
            ));
        }
        Ok(Self {
            call_timeout: Duration::from_millis(timeout_ms),
        })
    }
}

/// Settings for [`crate::Dispatcher`].
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Maximum number of messages being handled at once
    pub max_in_flight: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self { max_in_flight: 64 }
    }
}

impl DispatcherConfig {
    /// Reads `NESTED_MAX_IN_FLIGHT` (default 64).
    pub fn from_env() -> Result<Self, ConfigError> {
        let max_in_flight: usize =
            env_or("NESTED_MAX_IN_FLIGHT", 64, "must be a positive integer")?;
        if max_in_flight == 0 {
            return Err(ConfigError::Invalid(
                "NESTED_MAX_IN_FLIGHT",
                "must be a positive integer",
            ));
        }
        Ok(Self { max_in_flight })
    }
}
