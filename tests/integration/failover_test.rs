// tests/integration/failover_test.rs

//! End-to-end failover behavior through a real listener, primary and
//! authenticated fallback.

use super::test_helpers::*;
use docproxy::core::auth::ScramMechanism;
use docproxy::core::protocol::{Document, Message, Value};
use std::sync::Arc;

async fn backends(primary: Responder, fallback: Responder) -> (MockBackend, MockBackend) {
    let primary = MockBackend::start(primary).await;
    let fallback = MockBackend::start_with_auth(ScramServer::new(ScramMechanism::Sha1), fallback).await;
    (primary, fallback)
}

#[tokio::test]
async fn test_non_empty_primary_result_is_relayed_without_touching_fallback() {
    let (mut primary, mut fallback) =
        backends(serve_batch(vec![user("alice")]), serve_batch(vec![user("bob")])).await;
    let proxy = TestProxy::failover(&primary, &fallback, TEST_PASSWORD).await;
    let mut client = proxy.client().await;

    client.send(find_query(7, "users", Document::new())).await;
    let reply = client.recv().await;

    let expected = find_reply(7, vec![user("alice")], 0);
    assert_eq!(reply.serialize().unwrap(), expected.serialize().unwrap());
    assert!(primary.next_received().await.as_query().is_some());
    fallback.assert_nothing_received().await;
    assert!(client.try_recv().await.is_none());

    proxy.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_empty_primary_result_is_retried_on_fallback() {
    let (mut primary, mut fallback) =
        backends(serve_empty(), serve_batch(vec![user("x")])).await;
    let proxy = TestProxy::failover(&primary, &fallback, TEST_PASSWORD).await;
    let mut client = proxy.client().await;

    let query = find_query(11, "users", Document::new().with("name", "x"));
    client.send(query.clone()).await;

    let reply = client.recv().await;
    assert_eq!(first_batch(&reply), Some(vec![Value::from(user("x"))]));
    // The client never sees the empty primary result.
    assert!(client.try_recv().await.is_none());

    let at_primary = primary.next_received().await;
    let at_fallback = fallback.next_received().await;
    // Replayed verbatim, request id included.
    assert_eq!(at_fallback.serialize().unwrap(), query.serialize().unwrap());
    assert_eq!(at_primary.serialize().unwrap(), query.serialize().unwrap());
    assert_eq!(at_fallback.request_id(), 11);

    proxy.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_most_recent_find_is_the_one_replayed() {
    // Primary answers "first" with data and "second" with nothing.
    let primary_responder: Responder = Arc::new(|message: &Message| {
        let query = message.as_query().unwrap();
        let id = query.header.request_id;
        let filter = query.query.get_document("filter").unwrap();
        match filter.get_str("name") {
            Some("first") => vec![find_reply(id, vec![user("first")], 0)],
            _ => vec![empty_find_reply(id)],
        }
    });
    let (mut primary, mut fallback) =
        backends(primary_responder, serve_batch(vec![user("from-fallback")])).await;
    let proxy = TestProxy::failover(&primary, &fallback, TEST_PASSWORD).await;
    let mut client = proxy.client().await;

    client.send(find_query(1, "users", Document::new().with("name", "first"))).await;
    assert_eq!(
        first_batch(&client.recv().await),
        Some(vec![Value::from(user("first"))])
    );

    let second = find_query(2, "users", Document::new().with("name", "second"));
    client.send(second.clone()).await;
    assert_eq!(
        first_batch(&client.recv().await),
        Some(vec![Value::from(user("from-fallback"))])
    );

    primary.next_received().await;
    primary.next_received().await;
    let replayed = fallback.next_received().await;
    assert_eq!(replayed.serialize().unwrap(), second.serialize().unwrap());
    fallback.assert_nothing_received().await;

    proxy.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_empty_reply_without_pending_find_is_dropped() {
    // A primary that answers everything with an empty find result.
    let always_empty: Responder = Arc::new(|message: &Message| {
        vec![empty_find_reply(message.request_id())]
    });
    let (primary, mut fallback) = backends(always_empty, serve_batch(vec![user("bob")])).await;
    let proxy = TestProxy::failover(&primary, &fallback, TEST_PASSWORD).await;
    let mut client = proxy.client().await;

    client.send(insert_query(3, "users", user("carol"))).await;

    assert!(client.try_recv().await.is_none());
    fallback.assert_nothing_received().await;

    proxy.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_non_find_traffic_is_forwarded_both_ways() {
    let (mut primary, mut fallback) = backends(serve_batch(Vec::new()), serve_nothing()).await;
    let proxy = TestProxy::failover(&primary, &fallback, TEST_PASSWORD).await;
    let mut client = proxy.client().await;

    client.send(insert_query(5, "users", user("dave"))).await;
    let reply = client.recv().await;

    let doc = reply.as_reply().unwrap().first_document().unwrap();
    assert_eq!(doc.get_i32("n"), Some(1));
    assert_eq!(reply.header().response_to, 5);
    assert!(primary.next_received().await.as_query().is_some());
    fallback.assert_nothing_received().await;

    proxy.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_failed_fallback_auth_still_serves_primary() {
    let (mut primary, mut fallback) =
        backends(serve_batch(vec![user("alice")]), serve_batch(vec![user("bob")])).await;
    let proxy = TestProxy::failover(&primary, &fallback, "wrong-password").await;
    let mut client = proxy.client().await;

    client.send(find_query(21, "users", Document::new())).await;
    let reply = client.recv().await;

    assert_eq!(first_batch(&reply), Some(vec![Value::from(user("alice"))]));
    primary.next_received().await;
    fallback.assert_nothing_received().await;

    proxy.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_degraded_mode_relays_empty_primary_result() {
    let (primary, fallback) = backends(serve_empty(), serve_batch(vec![user("bob")])).await;
    let proxy = TestProxy::failover(&primary, &fallback, "wrong-password").await;
    let mut client = proxy.client().await;

    client.send(find_query(22, "users", Document::new().with("name", "x"))).await;
    let reply = client.recv().await;

    assert_eq!(first_batch(&reply), Some(Vec::new()));
    proxy.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unreachable_fallback_still_serves_primary() {
    let primary = MockBackend::start(serve_batch(vec![user("alice")])).await;
    let dead = unused_addr().await;

    let handler = docproxy::ProxyHandler::new(
        docproxy::config::ProxyMode::Failover,
        primary.endpoint(),
        docproxy::connection::Endpoint::new(dead.to_string()),
        docproxy::core::auth::Credentials::new(TEST_USER, TEST_PASSWORD),
        docproxy::core::auth::MechanismPreference::ScramSha1,
    );
    let proxy = TestProxy::start(Arc::new(handler)).await;
    let mut client = proxy.client().await;

    client.send(find_query(4, "users", Document::new())).await;
    assert_eq!(
        first_batch(&client.recv().await),
        Some(vec![Value::from(user("alice"))])
    );

    proxy.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unreachable_primary_closes_client() {
    let fallback = MockBackend::start_with_auth(
        ScramServer::new(ScramMechanism::Sha1),
        serve_nothing(),
    )
    .await;
    let dead = unused_addr().await;
    let handler = docproxy::ProxyHandler::new(
        docproxy::config::ProxyMode::Failover,
        docproxy::connection::Endpoint::new(dead.to_string()),
        fallback.endpoint(),
        docproxy::core::auth::Credentials::new(TEST_USER, TEST_PASSWORD),
        docproxy::core::auth::MechanismPreference::ScramSha1,
    );
    let proxy = TestProxy::start(Arc::new(handler)).await;
    let mut client = proxy.client().await;

    assert!(client.is_closed().await);
    proxy.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_primary_disconnect_closes_client() {
    let (primary, fallback) = backends(serve_batch(vec![user("alice")]), serve_nothing()).await;
    let proxy = TestProxy::failover(&primary, &fallback, TEST_PASSWORD).await;
    let mut client = proxy.client().await;

    client.send(find_query(1, "users", Document::new())).await;
    client.recv().await;
    // Dropping the mock closes every socket it accepted.
    drop(primary);

    assert!(client.is_closed().await);
    proxy.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_clients_are_isolated() {
    const CLIENTS: usize = 16;
    const REQUESTS: i32 = 5;

    // Echo the requested name back so each client can recognize its own data.
    let echo: Responder = Arc::new(|message: &Message| {
        let query = message.as_query().unwrap();
        let name = query
            .query
            .get_document("filter")
            .and_then(|f| f.get_str("name"))
            .unwrap_or_default()
            .to_string();
        vec![find_reply(query.header.request_id, vec![user(&name)], 0)]
    });
    let (primary, fallback) = backends(echo, serve_nothing()).await;
    let proxy = TestProxy::failover(&primary, &fallback, TEST_PASSWORD).await;

    let mut tasks = tokio::task::JoinSet::new();
    for i in 0..CLIENTS {
        let addr = proxy.addr;
        tasks.spawn(async move {
            let mut client = TestClient::connect(addr).await;
            for k in 0..REQUESTS {
                let id = (i as i32) * 100 + k;
                let name = format!("client-{i}-{k}");
                client
                    .send(find_query(id, "users", Document::new().with("name", name.as_str())))
                    .await;
                let reply = client.recv().await;
                assert_eq!(reply.header().response_to, id);
                assert_eq!(first_batch(&reply), Some(vec![Value::from(user(&name))]));
            }
        });
    }
    while let Some(res) = tasks.join_next().await {
        res.unwrap();
    }

    proxy.shutdown().await.unwrap();
}
