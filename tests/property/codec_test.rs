// tests/property/codec_test.rs

//! Decoding a well-formed frame and serializing it again reproduces the exact
//! bytes, however the frame is split across reads.

use bytes::BytesMut;
use docproxy::core::protocol::{
    Array, Document, Message, MessageHeader, OpCode, QueryFlags, QueryMessage, RawMessage, ReplyMessage,
    ResponseFlags, Value, WireCodec,
};
use proptest::prelude::*;
use tokio_util::codec::Decoder;

fn key() -> impl Strategy<Value = String> {
    "[a-zA-Z_$][a-zA-Z0-9_.]{0,10}"
}

fn leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<f64>().prop_map(Value::Double),
        ".{0,16}".prop_map(Value::String),
        (any::<u8>(), proptest::collection::vec(any::<u8>(), 0..24))
            .prop_map(|(subtype, bytes)| Value::Binary { subtype, bytes: bytes.into() }),
        Just(Value::Undefined),
        any::<[u8; 12]>().prop_map(Value::ObjectId),
        any::<u8>().prop_map(Value::Boolean),
        any::<i64>().prop_map(Value::DateTime),
        Just(Value::Null),
        ("[a-z.*]{0,8}", "[imsx]{0,3}")
            .prop_map(|(pattern, options)| Value::Regex { pattern, options }),
        ("[a-z.]{1,8}", any::<[u8; 12]>())
            .prop_map(|(namespace, id)| Value::DbPointer { namespace, id }),
        "[a-z(){} ;]{0,16}".prop_map(Value::JavaScript),
        "[a-z]{0,8}".prop_map(Value::Symbol),
        any::<i32>().prop_map(Value::Int32),
        any::<u64>().prop_map(Value::Timestamp),
        any::<i64>().prop_map(Value::Int64),
        any::<[u8; 16]>().prop_map(Value::Decimal128),
        Just(Value::MinKey),
        Just(Value::MaxKey),
    ]
}

fn value() -> impl Strategy<Value = Value> {
    leaf().prop_recursive(4, 32, 6, |inner| {
        prop_oneof![
            proptest::collection::vec((key(), inner.clone()), 0..5)
                .prop_map(|entries| Value::Document(entries.into_iter().collect())),
            proptest::collection::vec(inner.clone(), 0..5).prop_map(Value::from),
            proptest::collection::vec((key(), inner.clone()), 0..5)
                .prop_map(|entries| Value::Array(Array::from_entries(entries))),
            ("[a-z ]{0,12}", proptest::collection::vec((key(), inner), 0..3)).prop_map(
                |(code, entries)| Value::JavaScriptWithScope {
                    code,
                    scope: entries.into_iter().collect(),
                }
            ),
        ]
    })
}

fn document() -> impl Strategy<Value = Document> {
    proptest::collection::vec((key(), value()), 0..6)
        .prop_map(|entries| entries.into_iter().collect())
}

fn message() -> impl Strategy<Value = Message> {
    let query = (
        any::<i32>(),
        any::<i32>(),
        "[a-z]{1,8}\\.[a-z$]{1,8}",
        any::<i32>(),
        any::<i32>(),
        document(),
        proptest::option::of(document()),
    )
        .prop_map(|(id, flags, ns, skip, ret, query, selector)| {
            let mut q = QueryMessage::new(ns, query);
            q.header.request_id = id;
            q.flags = QueryFlags::from_bits_retain(flags);
            q.number_to_skip = skip;
            q.number_to_return = ret;
            q.return_fields_selector = selector;
            Message::Query(q)
        });
    let reply = (
        any::<i32>(),
        any::<i32>(),
        any::<i64>(),
        proptest::collection::vec(document(), 0..3),
    )
        .prop_map(|(response_to, flags, cursor_id, docs)| {
            let mut r = ReplyMessage::new(response_to, docs);
            r.response_flags = ResponseFlags::from_bits_retain(flags);
            r.cursor_id = cursor_id;
            Message::Reply(r)
        });
    let other = (any::<i32>(), proptest::collection::vec(any::<u8>(), 0..64)).prop_map(
        |(id, body)| {
            Message::Other(RawMessage {
                header: MessageHeader::new(OpCode::Msg, id),
                body: body.into(),
            })
        },
    );
    prop_oneof![query, reply, other]
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 200,
        max_shrink_iters: 500,
        ..ProptestConfig::default()
    })]

    #[test]
    fn test_decode_then_serialize_is_byte_identical(
        message in message(),
        cut in any::<prop::sample::Index>(),
    ) {
        let wire = message.serialize().unwrap();
        let cut = cut.index(wire.len());

        let mut codec = WireCodec;
        let mut buf = BytesMut::from(&wire[..cut]);
        prop_assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(&wire[cut..]);
        let decoded = codec.decode(&mut buf).unwrap().unwrap();

        prop_assert!(buf.is_empty());
        prop_assert_eq!(decoded.header().message_length as usize, wire.len());
        prop_assert_eq!(decoded.serialize().unwrap(), wire);
    }
}
