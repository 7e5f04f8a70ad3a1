// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-process broker with AMQP-like queue semantics.
//!
//! - publishing goes through a default exchange: the routing key is the
//!   queue name and a message for a missing queue is dropped
//! - each queue hands messages to its consumers round-robin
//! - deliveries stay unacked until `ack`/`reject`; `reject` may requeue
//! - exclusive queues die with their channel, auto-delete queues with their
//!   last consumer
//!
//! Used by the test suites and for running every service inside one process.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use nested_protocol::Properties;
use tokio::sync::mpsc;
use tracing::{debug, trace};
use uuid::Uuid;

use super::{Broker, BrokerChannel, BrokerError, Consumer, Delivery, SharedChannel};

/// Counters exposed for assertions in tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub published: u64,
    /// Published to a queue that did not exist
    pub unroutable: u64,
    pub delivered: u64,
    pub acked: u64,
    pub rejected: u64,
    pub requeued: u64,
}

type DeliverySender = mpsc::UnboundedSender<Result<Delivery, BrokerError>>;

struct ConsumerSlot {
    tag: String,
    channel_id: u64,
    tx: DeliverySender,
}

#[derive(Default)]
struct QueueState {
    exclusive_to: Option<u64>,
    auto_delete: bool,
    pending: VecDeque<(Properties, Bytes)>,
    consumers: Vec<ConsumerSlot>,
    next_consumer: usize,
}

struct Unacked {
    queue: String,
    channel_id: u64,
    properties: Properties,
    body: Bytes,
}

#[derive(Default)]
struct BrokerState {
    queues: HashMap<String, QueueState>,
    unacked: HashMap<u64, Unacked>,
    next_delivery_tag: u64,
    next_channel_id: u64,
    stats: MemoryStats,
}

impl BrokerState {
    /// Hand pending messages of `queue` to its consumers.
    fn dispatch(&mut self, queue: &str) {
        let Some(state) = self.queues.get_mut(queue) else {
            return;
        };
        while !state.consumers.is_empty() {
            let Some((properties, body)) = state.pending.pop_front() else {
                break;
            };
            let slot = state.next_consumer % state.consumers.len();
            self.next_delivery_tag += 1;
            let delivery_tag = self.next_delivery_tag;
            let delivery = Delivery {
                delivery_tag,
                properties: properties.clone(),
                body: body.clone(),
            };
            if state.consumers[slot].tx.send(Ok(delivery)).is_err() {
                // Receiver dropped without cancel
                let gone = state.consumers.remove(slot);
                trace!(queue, consumer = %gone.tag, "dropping dead consumer");
                state.pending.push_front((properties, body));
                continue;
            }
            state.next_consumer = slot + 1;
            self.unacked.insert(
                delivery_tag,
                Unacked {
                    queue: queue.to_string(),
                    channel_id: state.consumers[slot].channel_id,
                    properties,
                    body,
                },
            );
            self.stats.delivered += 1;
        }
    }

    fn requeue(&mut self, unacked: Unacked) {
        if let Some(state) = self.queues.get_mut(&unacked.queue) {
            state
                .pending
                .push_front((unacked.properties, unacked.body));
            self.stats.requeued += 1;
            let queue = unacked.queue;
            self.dispatch(&queue);
        }
    }
}

/// In-process broker. Clones share the same queues.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a channel without going through the [`Broker`] trait.
    pub fn channel(&self) -> Arc<MemoryChannel> {
        let id = {
            let mut state = self.state();
            state.next_channel_id += 1;
            state.next_channel_id
        };
        Arc::new(MemoryChannel {
            id,
            broker: self.clone(),
            closed: AtomicBool::new(false),
        })
    }

    pub fn stats(&self) -> MemoryStats {
        self.state().stats.clone()
    }

    pub fn queue_exists(&self, name: &str) -> bool {
        self.state().queues.contains_key(name)
    }

    /// Messages waiting in `name` that no consumer has received yet.
    pub fn pending(&self, name: &str) -> Option<usize> {
        self.state().queues.get(name).map(|q| q.pending.len())
    }

    pub fn consumer_count(&self, name: &str) -> usize {
        self.state()
            .queues
            .get(name)
            .map_or(0, |q| q.consumers.len())
    }

    pub fn unacked(&self) -> usize {
        self.state().unacked.len()
    }

    /// Number of queues named by the broker (reply queues).
    pub fn reply_queue_count(&self) -> usize {
        self.state()
            .queues
            .keys()
            .filter(|name| name.starts_with("amq.gen-"))
            .count()
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn open_channel(&self) -> Result<SharedChannel, BrokerError> {
        Ok(self.channel())
    }
}

/// One channel on a [`MemoryBroker`].
pub struct MemoryChannel {
    id: u64,
    broker: MemoryBroker,
    closed: AtomicBool,
}

impl MemoryChannel {
    fn ensure_open(&self) -> Result<(), BrokerError> {
        if self.closed.load(Ordering::Acquire) {
            Err(BrokerError::ChannelClosed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl BrokerChannel for MemoryChannel {
    async fn declare_queue(&self, name: &str) -> Result<(), BrokerError> {
        self.ensure_open()?;
        let mut state = self.broker.state();
        if !state.queues.contains_key(name) {
            debug!(queue = name, "declared durable queue");
            state.queues.insert(name.to_string(), QueueState::default());
        }
        Ok(())
    }

    async fn declare_reply_queue(&self) -> Result<String, BrokerError> {
        self.ensure_open()?;
        let name = format!("amq.gen-{}", Uuid::new_v4().simple());
        self.broker.state().queues.insert(
            name.clone(),
            QueueState {
                exclusive_to: Some(self.id),
                auto_delete: true,
                ..Default::default()
            },
        );
        Ok(name)
    }

    async fn delete_queue(&self, name: &str) -> Result<(), BrokerError> {
        self.ensure_open()?;
        let mut state = self.broker.state();
        // Dropping the senders ends every consumer stream
        state
            .queues
            .remove(name)
            .ok_or_else(|| BrokerError::QueueNotFound(name.to_string()))?;
        state.unacked.retain(|_, u| u.queue != name);
        Ok(())
    }

    async fn publish(
        &self,
        queue: &str,
        properties: Properties,
        body: Bytes,
    ) -> Result<(), BrokerError> {
        self.ensure_open()?;
        let mut state = self.broker.state();
        state.stats.published += 1;
        match state.queues.get_mut(queue) {
            Some(q) => {
                q.pending.push_back((properties, body));
                state.dispatch(queue);
            }
            None => {
                state.stats.unroutable += 1;
                debug!(queue, "no such queue, message dropped");
            }
        }
        Ok(())
    }

    async fn consume(&self, queue: &str) -> Result<Consumer, BrokerError> {
        self.ensure_open()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let tag = format!("ctag-{}-{}", self.id, Uuid::new_v4().simple());
        {
            let mut state = self.broker.state();
            let q = state
                .queues
                .get_mut(queue)
                .ok_or_else(|| BrokerError::QueueNotFound(queue.to_string()))?;
            q.consumers.push(ConsumerSlot {
                tag: tag.clone(),
                channel_id: self.id,
                tx,
            });
            state.dispatch(queue);
        }

        let deliveries = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed();

        Ok(Consumer { tag, deliveries })
    }

    async fn cancel(&self, consumer_tag: &str) -> Result<(), BrokerError> {
        let mut state = self.broker.state();
        let (name, q) = state
            .queues
            .iter_mut()
            .find(|(_, q)| q.consumers.iter().any(|c| c.tag == consumer_tag))
            .ok_or_else(|| BrokerError::ConsumerNotFound(consumer_tag.to_string()))?;
        q.consumers.retain(|c| c.tag != consumer_tag);
        if q.auto_delete && q.consumers.is_empty() {
            let name = name.clone();
            state.queues.remove(&name);
            state.unacked.retain(|_, u| u.queue != name);
            debug!(queue = %name, "auto-deleted queue after last consumer");
        }
        Ok(())
    }

    async fn ack(&self, delivery_tag: u64) -> Result<(), BrokerError> {
        self.ensure_open()?;
        let mut state = self.broker.state();
        state
            .unacked
            .remove(&delivery_tag)
            .ok_or(BrokerError::UnknownDelivery(delivery_tag))?;
        state.stats.acked += 1;
        Ok(())
    }

    async fn reject(&self, delivery_tag: u64, requeue: bool) -> Result<(), BrokerError> {
        self.ensure_open()?;
        let mut state = self.broker.state();
        let unacked = state
            .unacked
            .remove(&delivery_tag)
            .ok_or(BrokerError::UnknownDelivery(delivery_tag))?;
        state.stats.rejected += 1;
        if requeue {
            state.requeue(unacked);
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), BrokerError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let mut state = self.broker.state();
        let id = self.id;

        state.queues.retain(|_, q| q.exclusive_to != Some(id));
        for q in state.queues.values_mut() {
            q.consumers.retain(|c| c.channel_id != id);
        }

        let orphaned: Vec<u64> = state
            .unacked
            .iter()
            .filter(|(_, u)| u.channel_id == id)
            .map(|(tag, _)| *tag)
            .collect();
        for tag in orphaned {
            if let Some(unacked) = state.unacked.remove(&tag) {
                state.requeue(unacked);
            }
        }
        debug!(channel = id, "memory channel closed");
        Ok(())
    }
}
