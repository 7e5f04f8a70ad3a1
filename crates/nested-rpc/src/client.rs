// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! RPC client: a blocking call over a fire-and-forget broker.
//!
//! Each call checks a channel out of the pool, declares a private reply
//! queue, publishes the request with a fresh correlation id and waits for
//! the matching reply until the call deadline. The channel goes back to the
//! pool on every path.

use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use nested_protocol::{Method, Properties, Response, ResponsePayload, status};
use prost::Message;
use tokio::time::Instant;
use tracing::{Span, debug, field, instrument, warn};
use uuid::Uuid;

use crate::ChannelPool;
use crate::broker::{BrokerChannel, BrokerError, Consumer};
use crate::config::ClientConfig;
use crate::error::RpcError;
use crate::pending::PendingCalls;

/// Client side of the RPC bridge. Cheap to clone.
#[derive(Clone)]
pub struct RpcClient {
    channels: ChannelPool,
    pending: PendingCalls,
    config: ClientConfig,
}

impl RpcClient {
    pub fn new(channels: ChannelPool, config: ClientConfig) -> Self {
        Self {
            channels,
            pending: PendingCalls::new(),
            config,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Calls currently waiting for a reply.
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    /// Encode `request`, call `method` on its service queue and decode the
    /// reply object by the method's response kind.
    pub async fn invoke<Req: Message>(
        &self,
        method: Method,
        request: &Req,
    ) -> Result<ResponsePayload, RpcError> {
        let body = method.encode_request(request)?;
        let response = self.call(method.queue(), method.name(), body).await?;
        Ok(response.payload(method)?)
    }

    /// Call with the configured timeout. Only 2xx responses are returned.
    pub async fn call(&self, queue: &str, method: &str, body: Bytes) -> Result<Response, RpcError> {
        self.call_with_timeout(queue, method, body, self.config.call_timeout)
            .await
    }

    #[instrument(skip(self, body), fields(correlation_id = field::Empty))]
    pub async fn call_with_timeout(
        &self,
        queue: &str,
        method: &str,
        body: Bytes,
        timeout: Duration,
    ) -> Result<Response, RpcError> {
        let deadline = Instant::now() + timeout;
        let channel = self.channels.acquire_timeout(timeout).await?;

        let timed_out = || RpcError::CallTimeout {
            method: method.to_string(),
            timeout,
        };

        let reply_queue = tokio::time::timeout_at(deadline, channel.declare_reply_queue())
            .await
            .map_err(|_| timed_out())??;

        let outcome = self
            .exchange(&**channel, queue, method, body, &reply_queue, deadline)
            .await;

        // Best effort: the queue is exclusive and auto-deleted anyway
        if let Err(e) = channel.delete_queue(&reply_queue).await {
            debug!(queue = %reply_queue, error = %e, "reply queue already gone");
        }

        let response = match outcome {
            Ok(Some(response)) => response,
            Ok(None) => {
                warn!("call timed out");
                return Err(timed_out());
            }
            Err(e) => return Err(e),
        };

        if !response.is_success() {
            let message = response
                .message
                .unwrap_or_else(|| status::reason(response.status).to_string());
            return Err(RpcError::Remote {
                status: response.status,
                message,
            });
        }
        Ok(response)
    }

    /// Publish and wait. `Ok(None)` means the deadline passed.
    async fn exchange(
        &self,
        channel: &dyn BrokerChannel,
        queue: &str,
        method: &str,
        body: Bytes,
        reply_queue: &str,
        deadline: Instant,
    ) -> Result<Option<Response>, RpcError> {
        let correlation_id = Uuid::new_v4().to_string();
        Span::current().record("correlation_id", correlation_id.as_str());
        let mut call = self.pending.register(correlation_id.clone());

        let setup = async {
            let consumer = channel.consume(reply_queue).await?;
            channel
                .publish(
                    queue,
                    Properties::request(method, &correlation_id, reply_queue),
                    body,
                )
                .await?;
            Ok::<_, BrokerError>(consumer)
        };
        let mut consumer = match tokio::time::timeout_at(deadline, setup).await {
            Ok(consumer) => consumer?,
            Err(_) => return Ok(None),
        };
        debug!(queue, reply_to = reply_queue, "request published");

        let outcome = {
            let pump = pump_replies(channel, &mut consumer, &self.pending, &correlation_id);
            tokio::pin!(pump);
            tokio::select! {
                biased;
                response = call.wait() => Ok(response),
                failed = &mut pump => Err(failed),
                _ = tokio::time::sleep_until(deadline) => Ok(None),
            }
        };

        if let Err(e) = channel.cancel(&consumer.tag).await {
            debug!(consumer = %consumer.tag, error = %e, "reply consumer already gone");
        }
        outcome
    }
}

/// Route replies to the registry until the stream fails. Only returns on
/// error; a matched reply wakes the waiting call instead.
async fn pump_replies(
    channel: &dyn BrokerChannel,
    consumer: &mut Consumer,
    pending: &PendingCalls,
    own_id: &str,
) -> RpcError {
    while let Some(item) = consumer.deliveries.next().await {
        let delivery = match item {
            Ok(delivery) => delivery,
            Err(e) => return e.into(),
        };
        if let Err(e) = channel.ack(delivery.delivery_tag).await {
            return e.into();
        }
        let Some(correlation_id) = delivery.properties.correlation_id else {
            debug!("reply without correlation id discarded");
            continue;
        };
        match Response::decode(&delivery.body) {
            Ok(response) => {
                pending.fulfill(&correlation_id, response);
            }
            Err(e) if correlation_id == own_id => return e.into(),
            Err(e) => debug!(%correlation_id, error = %e, "undecodable stale reply discarded"),
        }
    }
    BrokerError::ChannelClosed.into()
}
