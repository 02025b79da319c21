// src/core/forward/routing.rs

//! The two predicates that drive failover.

use crate::core::protocol::{Message, Value};

/// True for a query whose document contains a top-level `find` key.
pub fn is_find_query(message: &Message) -> bool {
    message
        .as_query()
        .is_some_and(|q| q.query.contains_key("find"))
}

/// True for a successful `find` reply that matched nothing and left no cursor
/// open: `ok == 1`, an empty `cursor.firstBatch` array and `cursor.id == 0`.
///
/// A missing `cursor.id` counts as 0. Any other shape, including a missing or
/// non-array `firstBatch`, is not an empty result.
pub fn is_find_result_empty(message: &Message) -> bool {
    let Some(doc) = message.as_reply().and_then(|r| r.first_document()) else {
        return false;
    };
    if doc.get_f64("ok") != Some(1.0) {
        return false;
    }
    let Some(cursor) = doc.get_document("cursor") else {
        return false;
    };
    let batch_is_empty = cursor
        .get_array("firstBatch")
        .is_some_and(<[Value]>::is_empty);
    let cursor_id = match cursor.get("id") {
        None => Some(0),
        Some(id) => id.as_i64(),
    };
    batch_is_empty && cursor_id == Some(0)
}
