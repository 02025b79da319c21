// src/core/forward/passthrough.rs

//! The plain bidirectional forwarding engine.

use super::{ForwardExit, Side};
use crate::connection::Context;
use crate::core::metrics;

/// Relays messages between `source` and `target` until either side closes or a
/// write fails.
///
/// Messages from `source` are sent verbatim. Messages from `target` are
/// serialized with a zeroed request id before being written to `source`.
pub async fn forward(source: &mut Context, target: &mut Context) -> ForwardExit {
    loop {
        tokio::select! {
            message = source.next() => {
                let Some(message) = message else {
                    return ForwardExit::Closed(Side::Client);
                };
                if let Err(e) = target.send(&message).await {
                    return ForwardExit::SendFailed(Side::Primary, e);
                }
                metrics::MESSAGES_FORWARDED_TOTAL.with_label_values(&["client_to_primary"]).inc();
            }
            message = target.next() => {
                let Some(mut message) = message else {
                    return ForwardExit::Closed(Side::Primary);
                };
                let request_id = message.request_id();
                message.set_request_id(0);
                let frame = message.serialize();
                message.set_request_id(request_id);
                let sent = match frame {
                    Ok(frame) => source.send_raw(&frame).await,
                    Err(e) => Err(e),
                };
                if let Err(e) = sent {
                    return ForwardExit::SendFailed(Side::Client, e);
                }
                metrics::MESSAGES_FORWARDED_TOTAL.with_label_values(&["primary_to_client"]).inc();
            }
        }
    }
}
