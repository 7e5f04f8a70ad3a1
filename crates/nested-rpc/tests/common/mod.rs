// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for nested-rpc integration tests.
//!
//! Provides a TestContext wiring an in-memory broker, a channel pool, a
//! dispatcher serving a small `users` table and a client.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use nested_protocol::{ResponsePayload, User, UserKey, status};
use nested_rpc::{
    ChannelPool, ClientConfig, Dispatcher, DispatcherConfig, DispatcherHandle, HandlerError,
    HandlerRegistry, MemoryBroker, RpcClient, channel_pool,
};

pub const USERS: &str = "users";

/// Test context that manages broker, pools, dispatcher and client.
pub struct TestContext {
    pub broker: MemoryBroker,
    pub server_channels: ChannelPool,
    pub client_channels: ChannelPool,
    pub client: RpcClient,
    pub dispatcher: Option<DispatcherHandle>,
    /// Number of handler invocations seen by the dispatcher
    pub calls: Arc<AtomicUsize>,
}

pub fn ada() -> User {
    User {
        id: Some(42),
        name: Some("Ada".into()),
        surname: Some("Lovelace".into()),
        email: Some("ada@example.com".into()),
        ..Default::default()
    }
}

/// Registry with `ReadUser` (42 exists), `SlowRead` (sleeps for the
/// requested number of milliseconds) and `Explode` (panics).
pub fn users_registry(calls: Arc<AtomicUsize>) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();

    let counter = Arc::clone(&calls);
    registry.register("ReadUser", move |key: UserKey| {
        counter.fetch_add(1, Ordering::SeqCst);
        async move {
            match key.id {
                Some(42) => Ok(ResponsePayload::User(ada())),
                Some(id) => Err(HandlerError::new(
                    status::NOT_FOUND,
                    format!("user {id} not found"),
                )),
                None => Err(HandlerError::bad_request("id is required")),
            }
        }
    });

    let counter = Arc::clone(&calls);
    registry.register("SlowRead", move |key: UserKey| {
        counter.fetch_add(1, Ordering::SeqCst);
        async move {
            let millis = key.id.unwrap_or(0).max(0) as u64;
            tokio::time::sleep(Duration::from_millis(millis)).await;
            Ok::<_, HandlerError>(ResponsePayload::User(ada()))
        }
    });

    registry.register("Explode", |_: UserKey| async move {
        if true {
            panic!("handler exploded");
        }
        Ok::<_, HandlerError>(ResponsePayload::None)
    });

    registry
}

impl TestContext {
    pub async fn new(server_capacity: usize, client_capacity: usize) -> Self {
        Self::with_timeout(server_capacity, client_capacity, Duration::from_secs(5)).await
    }

    pub async fn with_timeout(
        server_capacity: usize,
        client_capacity: usize,
        call_timeout: Duration,
    ) -> Self {
        let broker = MemoryBroker::new();
        let server_channels = channel_pool(&broker, server_capacity)
            .await
            .expect("server channel pool");
        let client_channels = channel_pool(&broker, client_capacity)
            .await
            .expect("client channel pool");

        let calls = Arc::new(AtomicUsize::new(0));
        let dispatcher = Dispatcher::new(
            USERS,
            users_registry(Arc::clone(&calls)),
            DispatcherConfig::default(),
        )
        .start(&server_channels)
        .await
        .expect("dispatcher start");

        let client = RpcClient::new(client_channels.clone(), ClientConfig { call_timeout });

        Self {
            broker,
            server_channels,
            client_channels,
            client,
            dispatcher: Some(dispatcher),
            calls,
        }
    }

    /// Client only: nothing consumes the `users` queue.
    pub async fn without_dispatcher(client_capacity: usize, call_timeout: Duration) -> Self {
        let broker = MemoryBroker::new();
        let server_channels = channel_pool(&broker, 1).await.expect("server pool");
        let client_channels = channel_pool(&broker, client_capacity)
            .await
            .expect("client pool");
        let client = RpcClient::new(client_channels.clone(), ClientConfig { call_timeout });
        Self {
            broker,
            server_channels,
            client_channels,
            client,
            dispatcher: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn shutdown(mut self) {
        if let Some(dispatcher) = self.dispatcher.take() {
            dispatcher.shutdown().await;
        }
        self.client_channels.close();
        self.server_channels.close();
    }
}
