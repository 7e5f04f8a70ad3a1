// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embeddable service runtime.
//!
//! [`ServiceRuntime`] owns everything one service process needs: the broker
//! channel pool, the store pool, the RPC client and the running dispatcher.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use nested_protocol::Service;
//! use nested_rpc::MemoryBroker;
//! use nested_services::persistence::open_store_pool;
//! use nested_services::runtime::ServiceRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = ServiceRuntime::builder()
//!         .service(Service::Users)
//!         .broker(Arc::new(MemoryBroker::new()))
//!         .stores(open_store_pool("memory:", 4).await?)
//!         .build()?
//!         .start()
//!         .await?;
//!
//!     let user = runtime.users().read_user(42).await;
//!
//!     runtime.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use nested_protocol::Service;
use nested_rpc::{
    Broker, ChannelPool, ClientConfig, Dispatcher, DispatcherConfig, DispatcherHandle, RpcClient,
    channel_pool,
};
use tracing::{info, warn};

use crate::clients::{AuthClient, InvoicesClient, UsersClient};
use crate::config::Config;
use crate::handlers::{DEFAULT_TOKEN_TTL, HandlerState, registry_for};
use crate::persistence::StorePool;

/// Builder for creating a [`ServiceRuntime`].
pub struct ServiceRuntimeBuilder {
    service: Option<Service>,
    broker: Option<Arc<dyn Broker>>,
    stores: Option<StorePool>,
    max_channels: usize,
    client: ClientConfig,
    dispatcher: DispatcherConfig,
    token_ttl: Duration,
}

impl std::fmt::Debug for ServiceRuntimeBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRuntimeBuilder")
            .field("service", &self.service)
            .field("broker", &self.broker.as_ref().map(|_| "..."))
            .field("stores", &self.stores.as_ref().map(|s| s.capacity()))
            .field("max_channels", &self.max_channels)
            .field("client", &self.client)
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

impl Default for ServiceRuntimeBuilder {
    fn default() -> Self {
        Self {
            service: None,
            broker: None,
            stores: None,
            max_channels: 8,
            client: ClientConfig::default(),
            dispatcher: DispatcherConfig::default(),
            token_ttl: DEFAULT_TOKEN_TTL,
        }
    }
}

impl ServiceRuntimeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every setting except the broker and the stores from `config`.
    pub fn config(mut self, config: &Config) -> Self {
        self.service = Some(config.service);
        self.max_channels = config.max_connections;
        self.client = config.client.clone();
        self.dispatcher = config.dispatcher.clone();
        self.token_ttl = config.token_ttl;
        self
    }

    /// Set the service to run (required).
    pub fn service(mut self, service: Service) -> Self {
        self.service = Some(service);
        self
    }

    /// Set the broker channels are opened on (required).
    pub fn broker(mut self, broker: Arc<dyn Broker>) -> Self {
        self.broker = Some(broker);
        self
    }

    /// Set the store pool handlers check handles out of (required).
    pub fn stores(mut self, stores: StorePool) -> Self {
        self.stores = Some(stores);
        self
    }

    /// Number of pooled broker channels.
    ///
    /// Default: 8
    pub fn max_channels(mut self, max_channels: usize) -> Self {
        self.max_channels = max_channels;
        self
    }

    pub fn client_config(mut self, config: ClientConfig) -> Self {
        self.client = config;
        self
    }

    pub fn dispatcher_config(mut self, config: DispatcherConfig) -> Self {
        self.dispatcher = config;
        self
    }

    pub fn token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self
    }

    /// Build the runtime configuration.
    ///
    /// Returns an error if required fields are missing.
    pub fn build(self) -> Result<ServiceRuntimeConfig> {
        let service = self
            .service
            .ok_or_else(|| anyhow::anyhow!("service is required"))?;
        let broker = self
            .broker
            .ok_or_else(|| anyhow::anyhow!("broker is required"))?;
        let stores = self
            .stores
            .ok_or_else(|| anyhow::anyhow!("stores are required"))?;

        Ok(ServiceRuntimeConfig {
            service,
            broker,
            stores,
            max_channels: self.max_channels,
            client: self.client,
            dispatcher: self.dispatcher,
            token_ttl: self.token_ttl,
        })
    }
}

/// Configuration for a [`ServiceRuntime`].
pub struct ServiceRuntimeConfig {
    service: Service,
    broker: Arc<dyn Broker>,
    stores: StorePool,
    max_channels: usize,
    client: ClientConfig,
    dispatcher: DispatcherConfig,
    token_ttl: Duration,
}

impl ServiceRuntimeConfig {
    /// Open the channel pool and start serving the service queue.
    pub async fn start(self) -> Result<ServiceRuntime> {
        let channels = channel_pool(&*self.broker, self.max_channels)
            .await
            .context("failed to open broker channels")?;
        let rpc = RpcClient::new(channels.clone(), self.client);

        let mut state = HandlerState::new(self.stores.clone()).with_token_ttl(self.token_ttl);
        if self.service == Service::Users {
            state = state.with_auth(AuthClient::new(rpc.clone()));
        }
        let registry = registry_for(self.service, Arc::new(state));

        let dispatcher = match Dispatcher::new(self.service.queue(), registry, self.dispatcher)
            .start(&channels)
            .await
        {
            Ok(dispatcher) => dispatcher,
            Err(e) => {
                channels.close();
                return Err(e).context("failed to start dispatcher");
            }
        };

        info!(
            service = %self.service,
            channels = channels.capacity(),
            stores = self.stores.capacity(),
            "ServiceRuntime started"
        );

        Ok(ServiceRuntime {
            service: self.service,
            channels,
            stores: self.stores,
            rpc,
            dispatcher,
        })
    }
}

/// A running service.
///
/// Call [`shutdown`](Self::shutdown) for graceful termination.
pub struct ServiceRuntime {
    service: Service,
    channels: ChannelPool,
    stores: StorePool,
    rpc: RpcClient,
    dispatcher: DispatcherHandle,
}

impl ServiceRuntime {
    /// Create a new builder for configuring the runtime.
    pub fn builder() -> ServiceRuntimeBuilder {
        ServiceRuntimeBuilder::new()
    }

    pub fn service(&self) -> Service {
        self.service
    }

    /// RPC client sharing this runtime's channel pool.
    pub fn client(&self) -> &RpcClient {
        &self.rpc
    }

    pub fn users(&self) -> UsersClient {
        UsersClient::new(self.rpc.clone())
    }

    pub fn invoices(&self) -> InvoicesClient {
        InvoicesClient::new(self.rpc.clone())
    }

    pub fn auth(&self) -> AuthClient {
        AuthClient::new(self.rpc.clone())
    }

    pub fn channels(&self) -> &ChannelPool {
        &self.channels
    }

    pub fn stores(&self) -> &StorePool {
        &self.stores
    }

    /// Requests currently being handled by the dispatcher.
    pub fn in_flight(&self) -> usize {
        self.dispatcher.in_flight()
    }

    pub fn is_running(&self) -> bool {
        self.dispatcher.is_running()
    }

    /// Stop the dispatcher, wait for in-flight handlers, then close both
    /// pools.
    pub async fn shutdown(self) -> Result<()> {
        info!(service = %self.service, "ServiceRuntime shutting down...");
        self.dispatcher.shutdown().await;

        let mut held = Vec::with_capacity(self.channels.capacity());
        while let Some(channel) = self.channels.try_acquire() {
            if let Err(e) = channel.close().await {
                warn!("failed to close broker channel: {}", e);
            }
            held.push(channel);
        }
        if held.len() < self.channels.capacity() {
            warn!(
                outstanding = self.channels.capacity() - held.len(),
                "closing channel pool with channels still checked out"
            );
        }
        self.channels.close();
        drop(held);

        self.stores.close();
        info!(service = %self.service, "ServiceRuntime shutdown complete");
        Ok(())
    }
}
