// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! End-to-end calls through the in-memory broker.

mod common;

use std::time::{Duration, Instant};

use bytes::Bytes;
use common::{TestContext, USERS, ada};
use futures::StreamExt;
use futures::future::join_all;
use nested_protocol::{Method, Properties, Response, ResponsePayload, UserKey, status};
use nested_rpc::{BrokerChannel, RpcError};
use tokio::task::JoinHandle;

fn read_user(id: i64) -> Bytes {
    Method::ReadUser
        .encode_request(&UserKey { id: Some(id) })
        .unwrap()
}

/// Correlation id a scripted reply is published under.
enum ReplyId {
    Caller,
    Other(&'static str),
}

/// Serves exactly one request on the users queue by publishing `replies`,
/// in order, to the caller's reply queue.
async fn scripted_server(ctx: &TestContext, replies: Vec<(ReplyId, Bytes)>) -> JoinHandle<()> {
    let channel = ctx.broker.channel();
    channel.declare_queue(USERS).await.unwrap();
    let mut consumer = channel.consume(USERS).await.unwrap();

    tokio::spawn(async move {
        let delivery = consumer.deliveries.next().await.unwrap().unwrap();
        let reply_to = delivery.properties.reply_to.unwrap();
        let caller = delivery.properties.correlation_id.unwrap();
        for (to, body) in replies {
            let id = match to {
                ReplyId::Caller => caller.as_str(),
                ReplyId::Other(id) => id,
            };
            channel
                .publish(&reply_to, Properties::reply(id), body)
                .await
                .unwrap();
        }
        channel.ack(delivery.delivery_tag).await.unwrap();
        channel.cancel(&consumer.tag).await.unwrap();
    })
}

fn ada_reply() -> Bytes {
    Response::success(&ResponsePayload::User(ada()))
        .encode()
        .unwrap()
}

#[tokio::test]
async fn read_existing_user() {
    let ctx = TestContext::new(2, 2).await;

    let user = ctx
        .client
        .invoke(Method::ReadUser, &UserKey { id: Some(42) })
        .await
        .unwrap()
        .into_user()
        .unwrap();
    assert_eq!(user, ada());

    assert_eq!(ctx.client_channels.idle(), 2);
    assert_eq!(ctx.client.in_flight(), 0);
    assert_eq!(ctx.broker.reply_queue_count(), 0);
    ctx.shutdown().await;
}

#[tokio::test]
async fn missing_user_is_not_found() {
    let ctx = TestContext::new(2, 2).await;

    let err = ctx
        .client
        .call(USERS, "ReadUser", read_user(999))
        .await
        .unwrap_err();
    match err {
        RpcError::Remote { status, message } => {
            assert_eq!(status, 404);
            assert_eq!(message, "user 999 not found");
        }
        other => panic!("unexpected error: {other}"),
    }
    ctx.shutdown().await;
}

#[tokio::test]
async fn unknown_method_is_not_implemented() {
    let ctx = TestContext::new(1, 1).await;

    let err = ctx
        .client
        .call(USERS, "DoesNotExist", Bytes::new())
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::Remote { status: 501, .. }));
    assert_eq!(ctx.calls(), 0);

    // The dispatcher keeps serving
    let response = ctx.client.call(USERS, "ReadUser", read_user(42)).await.unwrap();
    assert_eq!(response.status, status::OK);
    assert_eq!(ctx.broker.unacked(), 0);
    ctx.shutdown().await;
}

#[tokio::test]
async fn undecodable_body_is_bad_request() {
    let ctx = TestContext::new(1, 1).await;

    let err = ctx
        .client
        .call(USERS, "ReadUser", Bytes::from_static(&[0xff, 0xff, 0xff]))
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::Remote { status: 400, .. }));
    ctx.shutdown().await;
}

#[tokio::test]
async fn handler_panic_is_internal_error() {
    let ctx = TestContext::new(1, 1).await;

    let err = ctx
        .client
        .call(USERS, "Explode", read_user(1))
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::Remote { status: 500, .. }));

    let response = ctx.client.call(USERS, "ReadUser", read_user(42)).await.unwrap();
    assert!(response.is_success());
    ctx.shutdown().await;
}

#[tokio::test]
async fn timeout_releases_the_channel() {
    let ctx = TestContext::without_dispatcher(1, Duration::from_millis(50)).await;

    let started = Instant::now();
    let err = ctx
        .client
        .call(USERS, "ReadUser", read_user(42))
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::CallTimeout { .. }));
    assert!(started.elapsed() >= Duration::from_millis(50));

    assert_eq!(ctx.client_channels.idle(), 1);
    assert_eq!(ctx.client.in_flight(), 0);
    assert_eq!(ctx.broker.reply_queue_count(), 0);

    // The same single channel serves the next call
    let err = ctx
        .client
        .call(USERS, "ReadUser", read_user(42))
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::CallTimeout { .. }));
    ctx.shutdown().await;
}

#[tokio::test]
async fn exhausted_channel_pool_fails_within_deadline() {
    let ctx = TestContext::with_timeout(1, 1, Duration::from_millis(50)).await;
    let held = ctx.client_channels.acquire().await.unwrap();

    let err = ctx
        .client
        .call(USERS, "ReadUser", read_user(42))
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::PoolExhausted(_)));
    assert_eq!(ctx.calls(), 0);

    drop(held);
    ctx.client.call(USERS, "ReadUser", read_user(42)).await.unwrap();
    ctx.shutdown().await;
}

#[tokio::test]
async fn late_reply_is_discarded() {
    let ctx = TestContext::with_timeout(1, 1, Duration::from_millis(50)).await;

    // SlowRead sleeps for `id` milliseconds
    let err = ctx
        .client
        .call(USERS, "SlowRead", read_user(200))
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::CallTimeout { .. }));

    tokio::time::sleep(Duration::from_millis(300)).await;
    // The handler finished, its reply had nowhere to go
    assert_eq!(ctx.calls(), 1);
    assert_eq!(ctx.broker.unacked(), 0);
    assert!(ctx.broker.stats().unroutable >= 1);

    let response = ctx.client.call(USERS, "ReadUser", read_user(42)).await.unwrap();
    assert!(response.is_success());
    ctx.shutdown().await;
}

#[tokio::test]
async fn request_without_reply_to_is_rejected() {
    let ctx = TestContext::new(1, 1).await;
    let channel = ctx.broker.channel();

    let properties = Properties {
        correlation_id: Some("orphan".into()),
        reply_to: None,
        method: Some("ReadUser".into()),
    };
    channel
        .publish(USERS, properties, read_user(42))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    let stats = ctx.broker.stats();
    assert_eq!(stats.rejected, 1);
    assert_eq!(stats.requeued, 0);
    assert_eq!(ctx.broker.pending(USERS), Some(0));
    assert_eq!(ctx.calls(), 0);
    ctx.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_calls_share_a_small_pool() {
    let ctx = TestContext::new(2, 2).await;

    let calls = (0..16).map(|i| {
        let client = ctx.client.clone();
        async move {
            let id = if i % 4 == 0 { 7 } else { 42 };
            client.call(USERS, "ReadUser", read_user(id)).await
        }
    });
    let results = join_all(calls).await;

    let ok = results.iter().filter(|r| r.is_ok()).count();
    let not_found = results
        .iter()
        .filter(|r| matches!(r, Err(RpcError::Remote { status: 404, .. })))
        .count();
    assert_eq!(ok, 12);
    assert_eq!(not_found, 4);
    assert_eq!(ctx.client_channels.idle(), 2);
    ctx.shutdown().await;
}

#[tokio::test]
async fn shutdown_stops_consumers() {
    let ctx = TestContext::new(3, 1).await;
    assert_eq!(ctx.broker.consumer_count(USERS), 3);

    let broker = ctx.broker.clone();
    ctx.shutdown().await;
    assert_eq!(broker.consumer_count(USERS), 0);
}

#[tokio::test]
async fn stale_replies_are_skipped_until_the_matching_one() {
    let ctx = TestContext::without_dispatcher(1, Duration::from_secs(2)).await;
    let server = scripted_server(
        &ctx,
        vec![
            (ReplyId::Other("stale-id"), Bytes::from_static(&[0xff, 0xff])),
            (ReplyId::Other("stale-id-2"), ada_reply()),
            (ReplyId::Caller, ada_reply()),
        ],
    )
    .await;

    let response = ctx.client.call(USERS, "ReadUser", read_user(42)).await.unwrap();
    assert_eq!(response.status, status::OK);
    let user = response.payload(Method::ReadUser).unwrap().into_user().unwrap();
    assert_eq!(user, ada());

    server.await.unwrap();
    assert_eq!(ctx.client_channels.idle(), 1);
    assert_eq!(ctx.client.in_flight(), 0);
    assert_eq!(ctx.broker.reply_queue_count(), 0);
    ctx.shutdown().await;
}

#[tokio::test]
async fn undecodable_matching_reply_is_a_decode_error() {
    let ctx = TestContext::without_dispatcher(1, Duration::from_secs(2)).await;
    let server = scripted_server(
        &ctx,
        vec![(ReplyId::Caller, Bytes::from_static(&[0xff, 0xff]))],
    )
    .await;

    let err = ctx
        .client
        .call(USERS, "ReadUser", read_user(42))
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::Decode(_)), "unexpected error: {err:?}");

    server.await.unwrap();
    assert_eq!(ctx.client_channels.idle(), 1);
    assert_eq!(ctx.client.in_flight(), 0);
    assert_eq!(ctx.broker.reply_queue_count(), 0);
    ctx.shutdown().await;
}
