// tests/integration/listener_test.rs

use super::test_helpers::*;
use async_trait::async_trait;
use docproxy::connection::Context;
use docproxy::core::ProxyError;
use docproxy::core::protocol::Document;
use docproxy::server::{ConnectionHandler, Listener};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Answers every message with an empty find reply until the client leaves.
struct EchoHandler {
    served: AtomicUsize,
}

#[async_trait]
impl ConnectionHandler for EchoHandler {
    async fn handle(&self, client: &mut Context) {
        self.served.fetch_add(1, Ordering::SeqCst);
        while let Some(message) = client.next().await {
            if client.send(&empty_find_reply(message.request_id())).await.is_err() {
                return;
            }
        }
    }
}

/// Returns immediately without reading anything.
struct HangUpHandler;

#[async_trait]
impl ConnectionHandler for HangUpHandler {
    async fn handle(&self, _client: &mut Context) {}
}

struct PanickingHandler;

#[async_trait]
impl ConnectionHandler for PanickingHandler {
    async fn handle(&self, _client: &mut Context) {
        panic!("handler blew up");
    }
}

#[tokio::test]
async fn test_serve_twice_fails() {
    let proxy = TestProxy::start(Arc::new(HangUpHandler)).await;

    let err = proxy.listener.serve(Arc::new(HangUpHandler)).await.unwrap_err();
    assert_eq!(err, ProxyError::AlreadyServing);

    proxy.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_serve_after_close_fails() {
    let proxy = TestProxy::start(Arc::new(HangUpHandler)).await;
    let listener = proxy.listener.clone();
    proxy.shutdown().await.unwrap();

    let err = listener.serve(Arc::new(HangUpHandler)).await.unwrap_err();
    assert_eq!(err, ProxyError::AlreadyServing);
    assert_eq!(listener.local_addr().await, None);
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let never_served = Listener::new("127.0.0.1:0", 8);
    never_served.close();
    never_served.close();

    let proxy = TestProxy::start(Arc::new(HangUpHandler)).await;
    proxy.listener.close();
    proxy.listener.close();
    proxy.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_close_before_serve_does_not_consume_listener() {
    let listener = Arc::new(Listener::new("127.0.0.1:0", 8));
    listener.close();

    let serving = listener.clone();
    let task = tokio::spawn(async move { serving.serve(Arc::new(HangUpHandler)).await });
    let addr = tokio::time::timeout(STEP_TIMEOUT, listener.local_addr())
        .await
        .expect("listener did not bind in time");
    assert!(addr.is_some());

    listener.close();
    let result = tokio::time::timeout(STEP_TIMEOUT, task)
        .await
        .expect("serve did not return after close")
        .unwrap();
    assert_eq!(result, Ok(()));
}

#[tokio::test]
async fn test_bind_failure_is_reported() {
    let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let listener = Listener::new(taken.local_addr().unwrap().to_string(), 8);

    let err = listener.serve(Arc::new(HangUpHandler)).await.unwrap_err();
    assert!(matches!(err, ProxyError::Io(_)));
    assert_eq!(listener.local_addr().await, None);
}

#[tokio::test]
async fn test_each_connection_gets_the_handler() {
    let handler = Arc::new(EchoHandler {
        served: AtomicUsize::new(0),
    });
    let proxy = TestProxy::start(handler.clone()).await;

    let mut a = proxy.client().await;
    let mut b = proxy.client().await;
    a.send(find_query(1, "users", Document::new())).await;
    b.send(find_query(2, "users", Document::new())).await;
    assert_eq!(a.recv().await.header().response_to, 1);
    assert_eq!(b.recv().await.header().response_to, 2);
    assert_eq!(handler.served.load(Ordering::SeqCst), 2);

    proxy.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_client_is_closed_when_handler_returns() {
    let proxy = TestProxy::start(Arc::new(HangUpHandler)).await;
    let mut client = proxy.client().await;

    assert!(client.is_closed().await);
    proxy.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_panicking_handler_does_not_stop_the_listener() {
    let proxy = TestProxy::start(Arc::new(PanickingHandler)).await;

    let mut first = proxy.client().await;
    assert!(first.is_closed().await);
    let mut second = proxy.client().await;
    assert!(second.is_closed().await);

    proxy.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_sessions_outlive_listener_close() {
    let handler = Arc::new(EchoHandler {
        served: AtomicUsize::new(0),
    });
    let proxy = TestProxy::start(handler).await;
    let addr = proxy.addr;
    let mut client = proxy.client().await;
    client.send(find_query(1, "users", Document::new())).await;
    client.recv().await;

    proxy.shutdown().await.unwrap();

    client.send(find_query(2, "users", Document::new())).await;
    assert_eq!(client.recv().await.header().response_to, 2);
    assert!(tokio::net::TcpStream::connect(addr).await.is_err());
}
