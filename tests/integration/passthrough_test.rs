// tests/integration/passthrough_test.rs

use super::test_helpers::*;
use docproxy::core::protocol::{Document, Message, MessageHeader, OpCode, RawMessage, Value};
use std::sync::Arc;

#[tokio::test]
async fn test_replies_reach_client_with_zeroed_request_id() {
    let responder: Responder = Arc::new(|message: &Message| {
        let mut reply = find_reply(message.request_id(), vec![user("alice")], 0);
        reply.set_request_id(4242);
        vec![reply]
    });
    let mut primary = MockBackend::start(responder).await;
    let proxy = TestProxy::passthrough(&primary).await;
    let mut client = proxy.client().await;

    let query = find_query(17, "users", Document::new());
    client.send(query.clone()).await;
    let reply = client.recv().await;

    assert_eq!(reply.request_id(), 0);
    assert_eq!(reply.header().response_to, 17);
    assert_eq!(first_batch(&reply), Some(vec![Value::from(user("alice"))]));

    let forwarded = primary.next_received().await;
    assert_eq!(forwarded.serialize().unwrap(), query.serialize().unwrap());

    proxy.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_empty_results_are_not_rerouted() {
    let mut primary = MockBackend::start(serve_empty()).await;
    let proxy = TestProxy::passthrough(&primary).await;
    let mut client = proxy.client().await;

    client.send(find_query(1, "users", Document::new())).await;
    assert_eq!(first_batch(&client.recv().await), Some(Vec::new()));
    primary.next_received().await;

    proxy.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_uninspected_op_codes_pass_through() {
    let mut primary = MockBackend::start(serve_nothing()).await;
    let proxy = TestProxy::passthrough(&primary).await;
    let mut client = proxy.client().await;

    let msg = Message::Other(RawMessage {
        header: MessageHeader::new(OpCode::Msg, 9),
        body: bytes::Bytes::from_static(&[0, 0, 0, 0, 1, 2, 3]),
    });
    client.send(msg.clone()).await;

    let forwarded = primary.next_received().await;
    assert_eq!(forwarded.op_code(), OpCode::Msg);
    assert_eq!(forwarded.serialize().unwrap(), msg.serialize().unwrap());

    proxy.shutdown().await.unwrap();
}
