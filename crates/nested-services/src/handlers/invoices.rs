// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! `invoices` service handlers.

use std::sync::Arc;

use nested_protocol::{Invoice, InvoiceKey, Method, ResponsePayload};
use nested_rpc::HandlerRegistry;
use tracing::{info, instrument};

use super::{HandlerState, now_millis, require, route};
use crate::error::Result;

pub(super) fn register(registry: &mut HandlerRegistry, state: &Arc<HandlerState>) {
    route(registry, Method::CreateInvoice, state, create_invoice);
    route(registry, Method::ReadInvoice, state, read_invoice);
    route(registry, Method::UpdateInvoice, state, update_invoice);
    route(registry, Method::DeleteInvoice, state, delete_invoice);
}

#[instrument(skip_all, fields(user_id = ?invoice.user_id))]
pub async fn create_invoice(
    state: Arc<HandlerState>,
    mut invoice: Invoice,
) -> Result<ResponsePayload> {
    require(invoice.user_id, "user_id")?;
    invoice.id = None;
    invoice.creation_date.get_or_insert_with(now_millis);

    let mut store = state.stores.acquire().await?;
    let created = store.create_invoice(invoice).await?;
    info!(invoice_id = ?created.id, products = created.products.len(), "invoice created");
    Ok(ResponsePayload::Invoice(created))
}

#[instrument(skip(state))]
pub async fn read_invoice(state: Arc<HandlerState>, key: InvoiceKey) -> Result<ResponsePayload> {
    let id = require(key.id, "id")?;
    let mut store = state.stores.acquire().await?;
    Ok(ResponsePayload::Invoice(store.read_invoice(id).await?))
}

#[instrument(skip_all, fields(invoice_id = ?patch.id))]
pub async fn update_invoice(state: Arc<HandlerState>, patch: Invoice) -> Result<ResponsePayload> {
    let id = require(patch.id, "id")?;
    let mut store = state.stores.acquire().await?;
    let mut invoice = store.read_invoice(id).await?;
    invoice.merge_patch(patch);
    Ok(ResponsePayload::Invoice(store.update_invoice(invoice).await?))
}

#[instrument(skip(state))]
pub async fn delete_invoice(state: Arc<HandlerState>, key: InvoiceKey) -> Result<ResponsePayload> {
    let id = require(key.id, "id")?;
    let mut store = state.stores.acquire().await?;
    store.delete_invoice(id).await?;
    info!(invoice_id = id, "invoice deleted");
    Ok(ResponsePayload::None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::open_store_pool;
    use nested_protocol::Product;

    async fn state() -> Arc<HandlerState> {
        let stores = open_store_pool("memory:", 2).await.unwrap();
        Arc::new(HandlerState::new(stores))
    }

    #[tokio::test]
    async fn test_create_sets_creation_date() {
        let state = state().await;
        let created = create_invoice(
            Arc::clone(&state),
            Invoice {
                user_id: Some(7),
                products: vec![Product {
                    name: Some("Widget".into()),
                    quantity: Some(3),
                    ..Default::default()
                }],
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .into_invoice()
        .unwrap();

        assert_eq!(created.id, Some(1));
        assert!(created.creation_date.unwrap() > 0);
        assert_eq!(created.products.len(), 1);
    }

    #[tokio::test]
    async fn test_create_keeps_given_creation_date() {
        let created = create_invoice(
            state().await,
            Invoice {
                user_id: Some(7),
                creation_date: Some(1_000),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .into_invoice()
        .unwrap();
        assert_eq!(created.creation_date, Some(1_000));
    }

    #[tokio::test]
    async fn test_create_requires_user() {
        let err = create_invoice(state().await, Invoice::default())
            .await
            .unwrap_err();
        assert_eq!(err.status(), 400);
    }

    #[tokio::test]
    async fn test_update_then_delete() {
        let state = state().await;
        create_invoice(
            Arc::clone(&state),
            Invoice {
                user_id: Some(7),
                delivery_country: Some("PL".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let updated = update_invoice(
            Arc::clone(&state),
            Invoice {
                id: Some(1),
                delivery_currency: Some("PLN".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .into_invoice()
        .unwrap();
        assert_eq!(updated.delivery_country.as_deref(), Some("PL"));
        assert_eq!(updated.delivery_currency.as_deref(), Some("PLN"));

        delete_invoice(Arc::clone(&state), InvoiceKey { id: Some(1) })
            .await
            .unwrap();
        let err = read_invoice(state, InvoiceKey { id: Some(1) })
            .await
            .unwrap_err();
        assert_eq!(err.status(), 404);
    }
}
