// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Method handlers for the three services.
//!
//! Every handler gets the shared [`HandlerState`] and its decoded request,
//! checks a store handle out of the pool for as long as it needs it and
//! returns a [`ResponsePayload`] or a [`ServiceError`].

pub mod auth;
pub mod invoices;
pub mod users;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use nested_protocol::{Method, ResponsePayload, Service};
use nested_rpc::HandlerRegistry;
use prost::Message;

use crate::clients::AuthClient;
use crate::error::ServiceError;
use crate::persistence::StorePool;

/// Default lifetime of an auth token.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// State shared by all handlers of a service process.
pub struct HandlerState {
    pub stores: StorePool,
    /// Used by the users service to drop the credentials of deleted users.
    pub auth: Option<AuthClient>,
    pub token_ttl: Duration,
}

impl HandlerState {
    pub fn new(stores: StorePool) -> Self {
        Self {
            stores,
            auth: None,
            token_ttl: DEFAULT_TOKEN_TTL,
        }
    }

    pub fn with_auth(mut self, auth: AuthClient) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self
    }
}

/// Handlers of `service`, keyed by method name.
pub fn registry_for(service: Service, state: Arc<HandlerState>) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    match service {
        Service::Users => users::register(&mut registry, &state),
        Service::Invoices => invoices::register(&mut registry, &state),
        Service::Auth => auth::register(&mut registry, &state),
    }
    registry
}

fn route<Req, F, Fut>(
    registry: &mut HandlerRegistry,
    method: Method,
    state: &Arc<HandlerState>,
    handler: F,
) where
    Req: Message + Default + 'static,
    F: Fn(Arc<HandlerState>, Req) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ResponsePayload, ServiceError>> + Send + 'static,
{
    let state = Arc::clone(state);
    registry.register(method.name(), move |request: Req| {
        handler(Arc::clone(&state), request)
    });
}

fn require<T>(value: Option<T>, field: &'static str) -> Result<T, ServiceError> {
    value.ok_or_else(|| ServiceError::missing(field))
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
