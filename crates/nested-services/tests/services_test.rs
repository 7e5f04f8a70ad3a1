// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The services talking to each other through the in-memory broker.

mod common;

use std::time::Duration;

use bytes::Bytes;
use common::{CALL_TIMEOUT, Cluster, ada, memory_pool, start_service};
use nested_protocol::{Invoice, Method, Product, Service, User, UserKey};
use nested_rpc::{MemoryBroker, RpcError};
use nested_services::{MemoryStore, open_store_pool};

#[tokio::test]
async fn read_user_scenarios() {
    let cluster = Cluster::start().await;
    let users = cluster.users.users();

    let user = users.read_user(42).await.unwrap();
    assert_eq!(user, ada().without_password());

    let err = users.read_user(999).await.unwrap_err();
    assert_eq!(err.status, 404);
    assert_eq!(err.message, "user '999' not found");

    let err = cluster
        .users
        .client()
        .call("users", "DoesNotExist", Bytes::new())
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::Remote { status: 501, .. }));

    // The dispatcher is still serving
    assert!(users.read_user(42).await.is_ok());
    cluster.shutdown().await;
}

#[tokio::test]
async fn user_lifecycle_over_rpc() {
    let cluster = Cluster::start().await;
    let users = cluster.invoices.users();

    let created = users
        .create_user(&User {
            name: Some("Grace".into()),
            email: Some("grace@example.com".into()),
            password: Some("cobol".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    let id = created.id.unwrap();
    assert!(created.password.is_none());

    let updated = users
        .update_user(&User {
            id: Some(id),
            surname: Some("Hopper".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(updated.name.as_deref(), Some("Grace"));
    assert_eq!(updated.surname.as_deref(), Some("Hopper"));

    users.delete_user(id).await.unwrap();
    assert!(users.read_user(id).await.unwrap_err().is_not_found());

    let err = users.create_user(&User::default()).await.unwrap_err();
    assert_eq!(err.http_status(), 400);
    cluster.shutdown().await;
}

#[tokio::test]
async fn invoice_lifecycle_over_rpc() {
    let cluster = Cluster::start().await;
    let invoices = cluster.users.invoices();

    let created = invoices
        .create_invoice(&Invoice {
            user_id: Some(42),
            delivery_country: Some("UK".into()),
            products: vec![Product {
                id: Some(1),
                name: Some("Difference engine".into()),
                price: Some(17_000.0),
                quantity: Some(1),
            }],
            ..Default::default()
        })
        .await
        .unwrap();
    let id = created.id.unwrap();
    assert!(created.creation_date.is_some());

    let read = invoices.read_invoice(id).await.unwrap();
    assert_eq!(read, created);

    invoices.delete_invoice(id).await.unwrap();
    assert_eq!(invoices.read_invoice(id).await.unwrap_err().status, 404);
    cluster.shutdown().await;
}

#[tokio::test]
async fn deleting_a_user_removes_their_tokens() {
    let cluster = Cluster::start().await;
    let auth = cluster.users.auth();

    let first = auth.create_token(42, Some("firefox")).await.unwrap();
    let second = auth.create_token(42, None).await.unwrap();
    let other = auth.create_token(7, None).await.unwrap();
    assert_eq!(cluster.auth_store.token_count(), 3);
    assert!(auth.is_valid_token(first.token.as_deref().unwrap()).await.unwrap());

    cluster.users.users().delete_user(42).await.unwrap();

    assert_eq!(cluster.auth_store.token_count(), 1);
    for token in [&first, &second] {
        let valid = auth.is_valid_token(token.token.as_deref().unwrap()).await.unwrap();
        assert!(!valid);
    }
    assert!(auth.is_valid_token(other.token.as_deref().unwrap()).await.unwrap());
    cluster.shutdown().await;
}

#[tokio::test]
async fn user_delete_survives_missing_auth_service() {
    let broker = MemoryBroker::new();
    let store = MemoryStore::new();
    store.seed_user(ada());
    // The credential cleanup gives up quickly; the outer call waits longer
    let users = start_service(
        &broker,
        Service::Users,
        memory_pool(&store, 1),
        Duration::from_millis(100),
    )
    .await;

    let body = Method::DeleteUser
        .encode_request(&UserKey { id: Some(42) })
        .unwrap();
    let response = users
        .client()
        .call_with_timeout("users", "DeleteUser", body, CALL_TIMEOUT)
        .await
        .unwrap();
    assert!(response.is_success());
    assert_eq!(store.user_count(), 0);
    users.shutdown().await.unwrap();
}

#[tokio::test]
async fn expired_tokens_are_invalid() {
    let broker = MemoryBroker::new();
    let stores = memory_pool(&MemoryStore::new(), 1);
    let auth = nested_services::ServiceRuntime::builder()
        .service(Service::Auth)
        .broker(std::sync::Arc::new(broker.clone()))
        .stores(stores)
        .max_channels(1)
        .token_ttl(Duration::ZERO)
        .build()
        .unwrap()
        .start()
        .await
        .unwrap();

    let token = auth.auth().create_token(1, None).await.unwrap();
    let valid = auth
        .auth()
        .is_valid_token(token.token.as_deref().unwrap())
        .await
        .unwrap();
    assert!(!valid);
    auth.shutdown().await.unwrap();
}

#[tokio::test]
async fn sqlite_backed_service() {
    let dir = tempfile::TempDir::new().unwrap();
    let url = format!("sqlite:{}?mode=rwc", dir.path().join("users.db").display());
    let stores = open_store_pool(&url, 2).await.unwrap();

    let broker = MemoryBroker::new();
    let runtime = start_service(&broker, Service::Users, stores, CALL_TIMEOUT).await;
    let users = runtime.users();

    let created = users
        .create_user(&User {
            email: Some("ada@example.com".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    let read = users.read_user(created.id.unwrap()).await.unwrap();
    assert_eq!(read.email.as_deref(), Some("ada@example.com"));
    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn shutdown_closes_both_pools() {
    let cluster = Cluster::start().await;
    let channels = cluster.users.channels().clone();
    let stores = cluster.users.stores().clone();
    assert!(cluster.users.is_running());

    let broker = cluster.broker.clone();
    cluster.shutdown().await;

    assert!(channels.is_closed());
    assert!(stores.is_closed());
    assert_eq!(channels.idle(), 0);
    assert_eq!(stores.idle(), 0);
    assert_eq!(broker.consumer_count("users"), 0);
}
