// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! `auth` service handlers: opaque refresh tokens.

use std::sync::Arc;
use std::time::Duration;

use nested_protocol::{Method, ResponsePayload, Token, TokenKey, UserKey};
use nested_rpc::HandlerRegistry;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::{HandlerState, now_millis, require, route};
use crate::error::{Result, StoreError};

pub(super) fn register(registry: &mut HandlerRegistry, state: &Arc<HandlerState>) {
    route(registry, Method::CreateToken, state, create_token);
    route(registry, Method::IsValidToken, state, is_valid_token);
    route(registry, Method::RemoveToken, state, remove_token);
    route(registry, Method::RemoveCredentials, state, remove_credentials);
}

/// Issue a fresh token for `request.user_id`, valid from now.
#[instrument(skip_all, fields(user_id = ?request.user_id))]
pub async fn create_token(state: Arc<HandlerState>, request: Token) -> Result<ResponsePayload> {
    let user_id = require(request.user_id, "user_id")?;
    let token = Token {
        user_id: Some(user_id),
        token: Some(Uuid::new_v4().to_string()),
        valid_from: Some(now_millis()),
        user_agent: request.user_agent,
    };

    let mut store = state.stores.acquire().await?;
    let created = store.create_token(token).await?;
    info!(user_id, "token issued");
    Ok(ResponsePayload::Token(created))
}

/// Unknown and expired tokens are both reported as invalid.
#[instrument(skip_all)]
pub async fn is_valid_token(state: Arc<HandlerState>, key: TokenKey) -> Result<ResponsePayload> {
    let value = require(key.token, "token")?;
    let mut store = state.stores.acquire().await?;
    let token = match store.read_token(&value).await {
        Ok(token) => token,
        Err(StoreError::NotFound { .. }) => return Ok(ResponsePayload::Bool(false)),
        Err(e) => return Err(e.into()),
    };

    let valid = is_fresh(&token, state.token_ttl, now_millis());
    debug!(user_id = ?token.user_id, valid, "token checked");
    Ok(ResponsePayload::Bool(valid))
}

#[instrument(skip_all)]
pub async fn remove_token(state: Arc<HandlerState>, key: TokenKey) -> Result<ResponsePayload> {
    let value = require(key.token, "token")?;
    let mut store = state.stores.acquire().await?;
    store.delete_token(&value).await?;
    Ok(ResponsePayload::None)
}

/// Drop every token of a user; called when the user is deleted.
#[instrument(skip(state))]
pub async fn remove_credentials(state: Arc<HandlerState>, key: UserKey) -> Result<ResponsePayload> {
    let user_id = require(key.id, "id")?;
    let mut store = state.stores.acquire().await?;
    let removed = store.delete_user_tokens(user_id).await?;
    info!(user_id, removed, "credentials removed");
    Ok(ResponsePayload::None)
}

fn is_fresh(token: &Token, ttl: Duration, now: i64) -> bool {
    let Some(valid_from) = token.valid_from else {
        return false;
    };
    let ttl = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
    valid_from <= now && now.saturating_sub(valid_from) < ttl
}
