// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Nested RPC - synchronous calls over a message broker
//!
//! This crate turns a publish/consume broker into request/response RPC:
//!
//! - [`ResourcePool`]: fixed-capacity pool of eagerly created resources
//!   (broker channels, store handles) with guard-based checkin
//! - [`RpcClient`]: publishes a request with a fresh correlation id and
//!   waits on a private reply queue until the call deadline
//! - [`Dispatcher`]: consumes a service queue, runs registered handlers on
//!   worker tasks and publishes their replies
//! - [`broker`]: the queue operations both sides need, implemented in
//!   memory and (feature `amqp`) over RabbitMQ
//!
//! ```text
//!  RpcClient ──publish──▶ [service queue] ──▶ Dispatcher ──▶ handler
//!      ▲                                          │
//!      └────────── [amq.gen-* reply queue] ◀──────┘
//! ```

pub mod broker;
pub mod client;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod pending;
pub mod pool;

pub use broker::{Broker, BrokerChannel, BrokerError, MemoryBroker, SharedChannel};
pub use client::RpcClient;
pub use config::{ClientConfig, ConfigError, DispatcherConfig};
pub use dispatcher::{Dispatcher, DispatcherHandle, HandlerError, HandlerRegistry, HandlerResult};
pub use error::RpcError;
pub use pending::{PendingCall, PendingCalls};
pub use pool::{PoolError, Pooled, ResourcePool};

/// Pool of broker channels shared by clients and dispatchers.
pub type ChannelPool = ResourcePool<SharedChannel>;

/// Create a channel pool of `capacity` channels opened on `broker`.
pub async fn channel_pool<B: Broker + ?Sized>(
    broker: &B,
    capacity: usize,
) -> Result<ChannelPool, PoolError> {
    ResourcePool::from_async_factory(capacity, |_| broker.open_channel()).await
}
