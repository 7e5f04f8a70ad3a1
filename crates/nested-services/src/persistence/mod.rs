// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Store interfaces and backends.
//!
//! A store handle is a pooled resource: every handler checks one out of the
//! [`StorePool`], uses it exclusively and returns it by dropping the guard.

pub mod memory;
pub mod sqlite;

pub use self::memory::MemoryStore;
pub use self::sqlite::SqliteStore;

use async_trait::async_trait;
use nested_protocol::{Invoice, Token, User};
use nested_rpc::{PoolError, ResourcePool};
use tracing::info;

use crate::error::StoreError;

/// Records kept by the three services.
///
/// Each service only uses its own slice of the interface. Methods take
/// `&mut self` since a handle is held by one handler at a time.
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert `user` and return it with its assigned id.
    async fn create_user(&mut self, user: User) -> Result<User, StoreError>;

    async fn read_user(&mut self, id: i64) -> Result<User, StoreError>;

    /// Replace the stored record with `user` (its `id` selects the record).
    async fn update_user(&mut self, user: User) -> Result<User, StoreError>;

    async fn delete_user(&mut self, id: i64) -> Result<(), StoreError>;

    async fn create_invoice(&mut self, invoice: Invoice) -> Result<Invoice, StoreError>;

    async fn read_invoice(&mut self, id: i64) -> Result<Invoice, StoreError>;

    async fn update_invoice(&mut self, invoice: Invoice) -> Result<Invoice, StoreError>;

    async fn delete_invoice(&mut self, id: i64) -> Result<(), StoreError>;

    async fn create_token(&mut self, token: Token) -> Result<Token, StoreError>;

    async fn read_token(&mut self, token: &str) -> Result<Token, StoreError>;

    async fn delete_token(&mut self, token: &str) -> Result<(), StoreError>;

    /// Remove every token issued to `user_id`; returns how many were removed.
    async fn delete_user_tokens(&mut self, user_id: i64) -> Result<u64, StoreError>;
}

/// Pool of store handles.
pub type StorePool = ResourcePool<Box<dyn Store>>;

/// Open `capacity` store handles for `database_url`.
///
/// `memory:` selects a shared in-process store; anything else is handed to
/// SQLite, one connection per handle.
pub async fn open_store_pool(database_url: &str, capacity: usize) -> Result<StorePool, PoolError> {
    if database_url.starts_with("memory:") {
        info!(capacity, "using in-memory store");
        let store = MemoryStore::new();
        return ResourcePool::new(capacity, |_| {
            Ok::<_, StoreError>(Box::new(store.clone()) as Box<dyn Store>)
        });
    }

    info!(capacity, "opening SQLite store connections");
    ResourcePool::from_async_factory(capacity, |_| async move {
        SqliteStore::connect(database_url)
            .await
            .map(|store| Box::new(store) as Box<dyn Store>)
    })
    .await
}
