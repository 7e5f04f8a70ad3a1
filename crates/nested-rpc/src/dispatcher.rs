// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Server side of the RPC bridge.
//!
//! The dispatcher runs one consume loop per pooled channel on the service's
//! durable queue. Every inbound request is handled by its own worker task:
//! decode, run the registered handler, publish the reply to `reply_to` with
//! the caller's correlation id, then ack. Workers are bounded by an in-flight
//! semaphore; when it is exhausted the consume loops stop pulling messages.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use bytes::Bytes;
use futures::FutureExt;
use futures::StreamExt;
use futures::future::BoxFuture;
use nested_protocol::{Properties, Request, Response, ResponsePayload, status};
use prost::Message;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, watch};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span, instrument, warn};

use crate::ChannelPool;
use crate::broker::{BrokerError, Consumer, Delivery, SharedChannel};
use crate::config::DispatcherConfig;
use crate::error::RpcError;

/// Failure reported by a handler, sent back as `Response{status, message}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerError {
    pub status: i32,
    pub message: String,
}

impl HandlerError {
    pub fn new(status: i32, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(status::BAD_REQUEST, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(status::INTERNAL_ERROR, message)
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status, self.message)
    }
}

impl std::error::Error for HandlerError {}

/// Handler output for one request.
pub type HandlerResult = Result<ResponsePayload, HandlerError>;

type ErasedHandler = Arc<dyn Fn(Bytes) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Method name to handler table.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, ErasedHandler>,
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut methods: Vec<_> = self.handlers.keys().collect();
        methods.sort();
        f.debug_struct("HandlerRegistry")
            .field("methods", &methods)
            .finish()
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `method`. The request body is decoded as `Req`
    /// before the handler runs; a body that does not decode is answered 400.
    pub fn register<Req, F, Fut, E>(&mut self, method: impl Into<String>, handler: F) -> &mut Self
    where
        Req: Message + Default + 'static,
        F: Fn(Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ResponsePayload, E>> + Send + 'static,
        E: Into<HandlerError> + 'static,
    {
        let method = method.into();
        let name = method.clone();
        let erased: ErasedHandler =
            Arc::new(move |body: Bytes| -> BoxFuture<'static, HandlerResult> {
                match Req::decode(body) {
                    Ok(request) => {
                        let fut = handler(request);
                        async move { fut.await.map_err(Into::into) }.boxed()
                    }
                    Err(e) => {
                        let err =
                            HandlerError::bad_request(format!("invalid {name} request: {e}"));
                        async move { Err(err) }.boxed()
                    }
                }
            });
        self.handlers.insert(method, erased);
        self
    }

    pub fn contains(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }

    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    fn get(&self, method: &str) -> Option<ErasedHandler> {
        self.handlers.get(method).cloned()
    }
}

/// Serves one service queue.
pub struct Dispatcher {
    queue: String,
    registry: Arc<HandlerRegistry>,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(queue: impl Into<String>, registry: HandlerRegistry, config: DispatcherConfig) -> Self {
        Self {
            queue: queue.into(),
            registry: Arc::new(registry),
            config,
        }
    }

    /// Declare the service queue and start one consume loop per channel.
    ///
    /// Channels stay in the pool; each loop keeps its own handle.
    #[instrument(skip(self, channels), fields(queue = %self.queue))]
    pub async fn start(self, channels: &ChannelPool) -> Result<DispatcherHandle, RpcError> {
        let mut handles: Vec<SharedChannel> = Vec::with_capacity(channels.capacity());
        {
            let mut guards = Vec::with_capacity(channels.capacity());
            for _ in 0..channels.capacity() {
                let guard = channels.acquire().await?;
                handles.push(Arc::clone(&*guard));
                guards.push(guard);
            }
        }

        let permits = Arc::new(Semaphore::new(self.config.max_in_flight));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut loops = Vec::with_capacity(handles.len());

        for (index, channel) in handles.into_iter().enumerate() {
            let consumer = match subscribe(&channel, &self.queue).await {
                Ok(consumer) => consumer,
                Err(e) => {
                    error!(index, error = %e, "failed to register consumer");
                    // Loops already started must not outlive the failed start
                    let _ = shutdown_tx.send(true);
                    for handle in loops {
                        if let Err(join) = handle.await {
                            error!("consume loop panicked: {}", join);
                        }
                    }
                    return Err(e.into());
                }
            };
            debug!(index, consumer = %consumer.tag, "consumer registered");

            let ctx = LoopContext {
                channel,
                registry: Arc::clone(&self.registry),
                permits: Arc::clone(&permits),
            };
            let span = info_span!("consume_loop", queue = %self.queue, index);
            loops.push(tokio::spawn(
                consume_loop(ctx, consumer, shutdown_rx.clone()).instrument(span),
            ));
        }

        info!(
            consumers = loops.len(),
            max_in_flight = self.config.max_in_flight,
            "dispatcher started"
        );

        Ok(DispatcherHandle {
            queue: self.queue,
            shutdown_tx,
            loops,
            permits,
            max_in_flight: self.config.max_in_flight,
        })
    }
}

/// A running dispatcher.
pub struct DispatcherHandle {
    queue: String,
    shutdown_tx: watch::Sender<bool>,
    loops: Vec<JoinHandle<()>>,
    permits: Arc<Semaphore>,
    max_in_flight: usize,
}

impl DispatcherHandle {
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Workers currently handling a request.
    pub fn in_flight(&self) -> usize {
        self.max_in_flight - self.permits.available_permits()
    }

    pub fn is_running(&self) -> bool {
        self.loops.iter().any(|handle| !handle.is_finished())
    }

    /// Stop consuming, then wait for in-flight workers to finish.
    pub async fn shutdown(self) {
        info!(queue = %self.queue, "dispatcher shutting down");
        let _ = self.shutdown_tx.send(true);

        for handle in self.loops {
            if let Err(e) = handle.await {
                error!("consume loop panicked: {}", e);
            }
        }

        let all = u32::try_from(self.max_in_flight).unwrap_or(u32::MAX);
        match self.permits.acquire_many(all).await {
            Ok(_drained) => info!(queue = %self.queue, "dispatcher stopped"),
            Err(_) => warn!("in-flight semaphore closed during shutdown"),
        }
    }
}

async fn subscribe(channel: &SharedChannel, queue: &str) -> Result<Consumer, BrokerError> {
    channel.declare_queue(queue).await?;
    channel.consume(queue).await
}

struct LoopContext {
    channel: SharedChannel,
    registry: Arc<HandlerRegistry>,
    permits: Arc<Semaphore>,
}

async fn consume_loop(
    ctx: LoopContext,
    mut consumer: Consumer,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;

            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    debug!("consume loop received shutdown signal");
                    break;
                }
            }

            next = consumer.deliveries.next() => {
                match next {
                    Some(Ok(delivery)) => {
                        // Wait here for a worker slot: backpressure on the queue
                        let permit = tokio::select! {
                            biased;
                            _ = shutdown_rx.changed() => {
                                requeue(&ctx, delivery.delivery_tag).await;
                                break;
                            }
                            permit = Arc::clone(&ctx.permits).acquire_owned() => match permit {
                                Ok(permit) => permit,
                                Err(_) => break,
                            },
                        };
                        handle_delivery(&ctx, delivery, permit).await;
                    }
                    Some(Err(e)) => {
                        error!("consumer stream failed: {}", e);
                        break;
                    }
                    None => {
                        debug!("consumer stream ended");
                        break;
                    }
                }
            }
        }
    }

    if let Err(e) = ctx.channel.cancel(&consumer.tag).await {
        debug!(consumer = %consumer.tag, error = %e, "consumer cancel failed");
    }
}

async fn requeue(ctx: &LoopContext, delivery_tag: u64) {
    if let Err(e) = ctx.channel.reject(delivery_tag, true).await {
        warn!(delivery_tag, "failed to requeue delivery: {}", e);
    }
}

async fn handle_delivery(ctx: &LoopContext, delivery: Delivery, permit: OwnedSemaphorePermit) {
    let delivery_tag = delivery.delivery_tag;
    let request = match Request::from_parts(&delivery.properties, delivery.body) {
        Ok(request) => request,
        Err(e) => {
            warn!(delivery_tag, "rejecting malformed request: {}", e);
            if let Err(e) = ctx.channel.reject(delivery_tag, false).await {
                warn!(delivery_tag, "reject failed: {}", e);
            }
            return;
        }
    };

    let Some(handler) = ctx.registry.get(&request.method) else {
        warn!(method = %request.method, "unknown method");
        drop(permit);
        let response = Response::not_implemented(&request.method);
        reply_and_ack(&ctx.channel, &request, delivery_tag, response).await;
        return;
    };

    let channel = Arc::clone(&ctx.channel);
    let span = info_span!(
        "rpc_worker",
        method = %request.method,
        correlation_id = %request.correlation_id
    );
    tokio::spawn(
        async move {
            let _permit = permit;
            let response = run_handler(handler, request.payload.clone()).await;
            reply_and_ack(&channel, &request, delivery_tag, response).await;
        }
        .instrument(span),
    );
}

async fn run_handler(handler: ErasedHandler, payload: Bytes) -> Response {
    let outcome = AssertUnwindSafe(async move { handler(payload).await })
        .catch_unwind()
        .await;
    match outcome {
        Ok(Ok(payload)) => Response::success(&payload),
        Ok(Err(e)) if status::is_success(e.status) => {
            error!(status = e.status, "handler failed with a success status");
            Response::failure(status::INTERNAL_ERROR, e.message)
        }
        Ok(Err(e)) => {
            debug!(status = e.status, message = %e.message, "handler returned an error");
            Response::failure(e.status, e.message)
        }
        Err(panic) => {
            error!(panic = %panic_message(panic.as_ref()), "handler panicked");
            Response::failure(status::INTERNAL_ERROR, "internal error")
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Publish the reply, then ack. A reply that cannot be published leaves the
/// request to be redelivered.
async fn reply_and_ack(
    channel: &SharedChannel,
    request: &Request,
    delivery_tag: u64,
    response: Response,
) {
    let published = match response.encode() {
        Ok(body) => {
            channel
                .publish(
                    &request.reply_to,
                    Properties::reply(&request.correlation_id),
                    body,
                )
                .await
        }
        Err(e) => {
            error!("failed to encode response: {}", e);
            let fallback = Response::failure(status::INTERNAL_ERROR, "response too large");
            match fallback.encode() {
                Ok(body) => {
                    channel
                        .publish(
                            &request.reply_to,
                            Properties::reply(&request.correlation_id),
                            body,
                        )
                        .await
                }
                Err(_) => return,
            }
        }
    };

    match published {
        Ok(()) => {
            debug!(status = response.status, reply_to = %request.reply_to, "reply published");
            if let Err(e) = channel.ack(delivery_tag).await {
                warn!(delivery_tag, "ack failed: {}", e);
            }
        }
        Err(e) => {
            error!(reply_to = %request.reply_to, "failed to publish reply: {}", e);
            if let Err(e) = channel.reject(delivery_tag, true).await {
                warn!(delivery_tag, "requeue failed: {}", e);
            }
        }
    }
}
