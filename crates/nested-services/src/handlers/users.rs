// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! `users` service handlers.

use std::sync::Arc;

use nested_protocol::{Method, ResponsePayload, User, UserKey};
use nested_rpc::HandlerRegistry;
use tracing::{info, instrument, warn};

use super::{HandlerState, require, route};
use crate::error::Result;

pub(super) fn register(registry: &mut HandlerRegistry, state: &Arc<HandlerState>) {
    route(registry, Method::CreateUser, state, create_user);
    route(registry, Method::ReadUser, state, read_user);
    route(registry, Method::UpdateUser, state, update_user);
    route(registry, Method::DeleteUser, state, delete_user);
}

#[instrument(skip_all)]
pub async fn create_user(state: Arc<HandlerState>, mut user: User) -> Result<ResponsePayload> {
    require(user.email.as_ref(), "email")?;
    // Ids are assigned by the store
    user.id = None;

    let mut store = state.stores.acquire().await?;
    let created = store.create_user(user).await?;
    info!(user_id = ?created.id, "user created");
    Ok(ResponsePayload::User(created.without_password()))
}

#[instrument(skip(state))]
pub async fn read_user(state: Arc<HandlerState>, key: UserKey) -> Result<ResponsePayload> {
    let id = require(key.id, "id")?;
    let mut store = state.stores.acquire().await?;
    let user = store.read_user(id).await?;
    Ok(ResponsePayload::User(user.without_password()))
}

#[instrument(skip_all, fields(user_id = ?patch.id))]
pub async fn update_user(state: Arc<HandlerState>, patch: User) -> Result<ResponsePayload> {
    let id = require(patch.id, "id")?;
    let mut store = state.stores.acquire().await?;
    let mut user = store.read_user(id).await?;
    user.merge_patch(patch);
    let updated = store.update_user(user).await?;
    Ok(ResponsePayload::User(updated.without_password()))
}

/// Delete the user, then ask the auth service to drop their credentials.
#[instrument(skip(state))]
pub async fn delete_user(state: Arc<HandlerState>, key: UserKey) -> Result<ResponsePayload> {
    let id = require(key.id, "id")?;
    {
        let mut store = state.stores.acquire().await?;
        store.delete_user(id).await?;
    }
    info!(user_id = id, "user deleted");

    if let Some(auth) = &state.auth
        && let Err(e) = auth.remove_credentials(id).await
    {
        warn!(user_id = id, status = e.status, "failed to remove credentials: {}", e);
    }
    Ok(ResponsePayload::None)
}
