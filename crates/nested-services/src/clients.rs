// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Typed clients for the three services.
//!
//! These are what the REST layer (and other services) call. Every failure is
//! flattened into a [`ClientError`] carrying the reply status; the detailed
//! message is for logs, [`ClientError::public_description`] is for callers.

use nested_protocol::{
    Invoice, InvoiceKey, Method, ProtocolError, Token, TokenKey, User, UserKey, status,
};
use nested_rpc::{RpcClient, RpcError};
use thiserror::Error;

/// Failure of a typed client call.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message} (status {status})")]
pub struct ClientError {
    pub status: i32,
    pub message: String,
}

impl ClientError {
    /// Status suitable for an HTTP response; out-of-range codes become 500.
    pub fn http_status(&self) -> u16 {
        u16::try_from(self.status)
            .ok()
            .filter(|code| (100..600).contains(code))
            .unwrap_or(500)
    }

    /// Message safe to show to an external caller.
    pub fn public_description(&self) -> &'static str {
        match self.http_status() {
            400 => "The request is invalid",
            404 => "The requested resource does not exist",
            501 => "The operation is not supported",
            503 => "The service is temporarily unavailable",
            _ => "An internal error occurred",
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status == status::NOT_FOUND
    }
}

impl From<RpcError> for ClientError {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::Remote { status, message } => ClientError { status, message },
            other => ClientError {
                status: other.status(),
                message: other.to_string(),
            },
        }
    }
}

impl From<ProtocolError> for ClientError {
    fn from(err: ProtocolError) -> Self {
        ClientError {
            status: status::INTERNAL_ERROR,
            message: err.to_string(),
        }
    }
}

/// Client for the `users` service.
#[derive(Clone)]
pub struct UsersClient {
    rpc: RpcClient,
}

impl UsersClient {
    pub fn new(rpc: RpcClient) -> Self {
        Self { rpc }
    }

    pub async fn create_user(&self, user: &User) -> Result<User, ClientError> {
        Ok(self.rpc.invoke(Method::CreateUser, user).await?.into_user()?)
    }

    pub async fn read_user(&self, id: i64) -> Result<User, ClientError> {
        let key = UserKey { id: Some(id) };
        Ok(self.rpc.invoke(Method::ReadUser, &key).await?.into_user()?)
    }

    /// Apply the fields present in `patch` to the user it identifies.
    pub async fn update_user(&self, patch: &User) -> Result<User, ClientError> {
        Ok(self.rpc.invoke(Method::UpdateUser, patch).await?.into_user()?)
    }

    pub async fn delete_user(&self, id: i64) -> Result<(), ClientError> {
        let key = UserKey { id: Some(id) };
        self.rpc.invoke(Method::DeleteUser, &key).await?;
        Ok(())
    }
}

/// Client for the `invoices` service.
#[derive(Clone)]
pub struct InvoicesClient {
    rpc: RpcClient,
}

impl InvoicesClient {
    pub fn new(rpc: RpcClient) -> Self {
        Self { rpc }
    }

    pub async fn create_invoice(&self, invoice: &Invoice) -> Result<Invoice, ClientError> {
        Ok(self
            .rpc
            .invoke(Method::CreateInvoice, invoice)
            .await?
            .into_invoice()?)
    }

    pub async fn read_invoice(&self, id: i64) -> Result<Invoice, ClientError> {
        let key = InvoiceKey { id: Some(id) };
        Ok(self
            .rpc
            .invoke(Method::ReadInvoice, &key)
            .await?
            .into_invoice()?)
    }

    pub async fn update_invoice(&self, patch: &Invoice) -> Result<Invoice, ClientError> {
        Ok(self
            .rpc
            .invoke(Method::UpdateInvoice, patch)
            .await?
            .into_invoice()?)
    }

    pub async fn delete_invoice(&self, id: i64) -> Result<(), ClientError> {
        let key = InvoiceKey { id: Some(id) };
        self.rpc.invoke(Method::DeleteInvoice, &key).await?;
        Ok(())
    }
}

/// Client for the `auth` service.
#[derive(Clone)]
pub struct AuthClient {
    rpc: RpcClient,
}

impl AuthClient {
    pub fn new(rpc: RpcClient) -> Self {
        Self { rpc }
    }

    /// Issue a new token for `user_id`.
    pub async fn create_token(
        &self,
        user_id: i64,
        user_agent: Option<&str>,
    ) -> Result<Token, ClientError> {
        let request = Token {
            user_id: Some(user_id),
            user_agent: user_agent.map(str::to_owned),
            ..Default::default()
        };
        Ok(self
            .rpc
            .invoke(Method::CreateToken, &request)
            .await?
            .into_token()?)
    }

    pub async fn is_valid_token(&self, token: &str) -> Result<bool, ClientError> {
        let key = TokenKey {
            token: Some(token.to_owned()),
        };
        Ok(self
            .rpc
            .invoke(Method::IsValidToken, &key)
            .await?
            .into_bool()?)
    }

    pub async fn remove_token(&self, token: &str) -> Result<(), ClientError> {
        let key = TokenKey {
            token: Some(token.to_owned()),
        };
        self.rpc.invoke(Method::RemoveToken, &key).await?;
        Ok(())
    }

    /// Remove every token issued to `user_id`.
    pub async fn remove_credentials(&self, user_id: i64) -> Result<(), ClientError> {
        let key = UserKey { id: Some(user_id) };
        self.rpc.invoke(Method::RemoveCredentials, &key).await?;
        Ok(())
    }
}
