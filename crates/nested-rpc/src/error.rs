// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Errors returned by RPC calls.

use std::time::Duration;

use nested_protocol::{ProtocolError, status};
use thiserror::Error;

use crate::broker::BrokerError;
use crate::pool::PoolError;

/// Errors that can occur while making a call
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("no broker channel became available within {0:?}")]
    PoolExhausted(Duration),

    #[error("channel pool unavailable: {0}")]
    Pool(PoolError),

    #[error("{method} timed out after {timeout:?}")]
    CallTimeout {
        method: String,
        timeout: Duration,
    },

    #[error("remote error {status}: {message}")]
    Remote { status: i32, message: String },

    #[error("decode error: {0}")]
    Decode(#[from] ProtocolError),

    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),
}

impl From<PoolError> for RpcError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::ExhaustedTimeout(waited) => RpcError::PoolExhausted(waited),
            other => RpcError::Pool(other),
        }
    }
}

impl RpcError {
    /// HTTP-style status describing this failure.
    pub fn status(&self) -> i32 {
        match self {
            RpcError::Remote { status, .. } => *status,
            RpcError::Decode(_) => status::INTERNAL_ERROR,
            RpcError::PoolExhausted(_)
            | RpcError::Pool(_)
            | RpcError::CallTimeout { .. }
            | RpcError::Broker(_) => status::SERVICE_UNAVAILABLE,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, RpcError::CallTimeout { .. } | RpcError::PoolExhausted(_))
    }
}
