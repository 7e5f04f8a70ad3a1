// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for nested-services integration tests.
//!
//! Starts the three services on one in-memory broker, each with its own
//! in-memory store so tests can inspect what the handlers wrote.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use nested_protocol::{Service, User};
use nested_rpc::{ClientConfig, MemoryBroker, ResourcePool};
use nested_services::{MemoryStore, ServiceRuntime, Store, StoreError, StorePool};

pub const CALL_TIMEOUT: Duration = Duration::from_secs(2);

/// Pool of `capacity` handles onto `store`.
pub fn memory_pool(store: &MemoryStore, capacity: usize) -> StorePool {
    ResourcePool::new(capacity, |_| {
        Ok::<_, StoreError>(Box::new(store.clone()) as Box<dyn Store>)
    })
    .unwrap()
}

pub async fn start_service(
    broker: &MemoryBroker,
    service: Service,
    stores: StorePool,
    timeout: Duration,
) -> ServiceRuntime {
    ServiceRuntime::builder()
        .service(service)
        .broker(Arc::new(broker.clone()))
        .stores(stores)
        .max_channels(2)
        .client_config(ClientConfig {
            call_timeout: timeout,
        })
        .build()
        .unwrap()
        .start()
        .await
        .unwrap()
}

pub fn ada() -> User {
    User {
        id: Some(42),
        name: Some("Ada".into()),
        surname: Some("Lovelace".into()),
        email: Some("ada@example.com".into()),
        password: Some("analytical".into()),
        ..Default::default()
    }
}

/// All three services on one broker.
pub struct Cluster {
    pub broker: MemoryBroker,
    pub users: ServiceRuntime,
    pub invoices: ServiceRuntime,
    pub auth: ServiceRuntime,
    pub user_store: MemoryStore,
    pub invoice_store: MemoryStore,
    pub auth_store: MemoryStore,
}

impl Cluster {
    /// Start the cluster with `ada()` already stored.
    pub async fn start() -> Self {
        let broker = MemoryBroker::new();
        let user_store = MemoryStore::new();
        let invoice_store = MemoryStore::new();
        let auth_store = MemoryStore::new();
        user_store.seed_user(ada());

        let auth = start_service(
            &broker,
            Service::Auth,
            memory_pool(&auth_store, 2),
            CALL_TIMEOUT,
        )
        .await;
        let users = start_service(
            &broker,
            Service::Users,
            memory_pool(&user_store, 2),
            CALL_TIMEOUT,
        )
        .await;
        let invoices = start_service(
            &broker,
            Service::Invoices,
            memory_pool(&invoice_store, 2),
            CALL_TIMEOUT,
        )
        .await;

        Self {
            broker,
            users,
            invoices,
            auth,
            user_store,
            invoice_store,
            auth_store,
        }
    }

    pub async fn shutdown(self) {
        self.users.shutdown().await.unwrap();
        self.invoices.shutdown().await.unwrap();
        self.auth.shutdown().await.unwrap();
    }
}
