// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Broker abstraction.
//!
//! The RPC layer only needs a handful of queue operations: declare a durable
//! service queue, declare a private reply queue, publish with properties,
//! consume with manual acknowledgement. [`BrokerChannel`] captures those so
//! the client and dispatcher run unchanged over RabbitMQ ([`amqp`]) or the
//! in-process [`MemoryBroker`].

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use nested_protocol::Properties;
use thiserror::Error;

#[cfg(feature = "amqp")]
pub mod amqp;
pub mod memory;

#[cfg(feature = "amqp")]
pub use amqp::AmqpBroker;
pub use memory::{MemoryBroker, MemoryStats};

/// Errors reported by a broker implementation.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker connection failed: {0}")]
    Connection(String),

    #[error("channel is closed")]
    ChannelClosed,

    #[error("queue not found: {0}")]
    QueueNotFound(String),

    #[error("unknown delivery tag: {0}")]
    UnknownDelivery(u64),

    #[error("consumer not found: {0}")]
    ConsumerNotFound(String),

    #[error("broker operation failed: {0}")]
    Operation(String),
}

/// A message received from a queue, awaiting ack or reject.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub delivery_tag: u64,
    pub properties: Properties,
    pub body: Bytes,
}

/// An active subscription on a queue.
pub struct Consumer {
    pub tag: String,
    pub deliveries: BoxStream<'static, Result<Delivery, BrokerError>>,
}

impl fmt::Debug for Consumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer").field("tag", &self.tag).finish()
    }
}

/// Queue operations on one broker channel.
#[async_trait]
pub trait BrokerChannel: Send + Sync {
    /// Declare a durable queue. Declaring an existing queue is a no-op.
    async fn declare_queue(&self, name: &str) -> Result<(), BrokerError>;

    /// Declare an exclusive, auto-deleting, broker-named queue.
    async fn declare_reply_queue(&self) -> Result<String, BrokerError>;

    async fn delete_queue(&self, name: &str) -> Result<(), BrokerError>;

    /// Publish to `queue` through the default exchange.
    async fn publish(
        &self,
        queue: &str,
        properties: Properties,
        body: Bytes,
    ) -> Result<(), BrokerError>;

    /// Subscribe with manual acknowledgement.
    async fn consume(&self, queue: &str) -> Result<Consumer, BrokerError>;

    async fn cancel(&self, consumer_tag: &str) -> Result<(), BrokerError>;

    async fn ack(&self, delivery_tag: u64) -> Result<(), BrokerError>;

    async fn reject(&self, delivery_tag: u64, requeue: bool) -> Result<(), BrokerError>;

    async fn close(&self) -> Result<(), BrokerError>;
}

/// Channel handle as stored in the channel pool.
pub type SharedChannel = Arc<dyn BrokerChannel>;

/// A broker connection able to open channels.
#[async_trait]
pub trait Broker: Send + Sync {
    async fn open_channel(&self) -> Result<SharedChannel, BrokerError>;
}
