// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Nested services: users, invoices and auth over broker RPC.
//!
//! Each service process serves one well-known queue. Handlers check store
//! handles out of a bounded [`persistence::StorePool`]; broker channels come
//! from a bounded [`nested_rpc::ChannelPool`] shared by the dispatcher and by
//! the typed [`clients`] used to call other services.
//!
//! ```text
//! ┌──────────────┐   UsersClient    ┌──────────────────────────────┐
//! │  REST layer  │ ───────────────▶ │ users    (ServiceRuntime)    │
//! └──────────────┘                  │   └─ DeleteUser ──▶ auth     │
//!                                   └──────────────────────────────┘
//! ```
//!
//! Start a service with [`runtime::ServiceRuntime`]; the `nested-service`
//! binary (feature `amqp`) does this against RabbitMQ from environment
//! configuration.

pub mod clients;
pub mod config;
pub mod error;
pub mod handlers;
pub mod persistence;
pub mod runtime;

pub use clients::{AuthClient, ClientError, InvoicesClient, UsersClient};
pub use config::Config;
pub use error::{ServiceError, StoreError};
pub use handlers::HandlerState;
pub use persistence::{MemoryStore, SqliteStore, Store, StorePool, open_store_pool};
pub use runtime::ServiceRuntime;
