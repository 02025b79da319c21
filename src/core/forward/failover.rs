// src/core/forward/failover.rs

//! The failover forwarding engine.

use super::routing::{is_find_query, is_find_result_empty};
use super::{ForwardExit, Side};
use crate::connection::Context;
use crate::core::metrics;
use crate::core::protocol::Message;
use tracing::{debug, info, warn};

/// Services `client`, `primary` and `fallback` until any of them closes or a
/// write fails.
///
/// Client traffic goes to the primary. An empty `find` result from the primary
/// is swallowed and the last `find` query the client sent is replayed to the
/// fallback, whose answer is relayed instead. With no fallback available the
/// empty result is relayed as-is.
pub async fn forward_find(
    client: &mut Context,
    primary: &mut Context,
    mut fallback: Option<&mut Context>,
) -> ForwardExit {
    let mut pending_find: Option<Message> = None;

    loop {
        tokio::select! {
            message = client.next() => {
                let Some(message) = message else {
                    return ForwardExit::Closed(Side::Client);
                };
                if let Err(e) = primary.send(&message).await {
                    return ForwardExit::SendFailed(Side::Primary, e);
                }
                metrics::MESSAGES_FORWARDED_TOTAL.with_label_values(&["client_to_primary"]).inc();
                if is_find_query(&message) {
                    pending_find = Some(message);
                }
            }
            message = primary.next() => {
                let Some(message) = message else {
                    return ForwardExit::Closed(Side::Primary);
                };
                if is_find_result_empty(&message) {
                    if let Some(fallback) = fallback.as_deref_mut() {
                        let Some(query) = pending_find.as_ref() else {
                            warn!(
                                "Empty find result from primary for {} with no pending find query; dropping it.",
                                client.peer_addr()
                            );
                            metrics::DROPPED_EMPTY_REPLIES_TOTAL.inc();
                            continue;
                        };
                        info!(
                            "Primary returned an empty find result for {}; retrying on fallback.",
                            client.peer_addr()
                        );
                        if let Err(e) = fallback.send(query).await {
                            return ForwardExit::SendFailed(Side::Fallback, e);
                        }
                        metrics::FAILOVERS_TOTAL.inc();
                        continue;
                    }
                    debug!("No fallback session; relaying the empty primary result.");
                }
                if let Err(e) = relay(client, &message).await {
                    return e;
                }
                metrics::MESSAGES_FORWARDED_TOTAL.with_label_values(&["primary_to_client"]).inc();
            }
            message = next_from(fallback.as_deref_mut()) => {
                let Some(message) = message else {
                    return ForwardExit::Closed(Side::Fallback);
                };
                if let Err(e) = relay(client, &message).await {
                    return e;
                }
                metrics::MESSAGES_FORWARDED_TOTAL.with_label_values(&["fallback_to_client"]).inc();
            }
        }
    }
}

/// Receives from an optional context; never resolves when there is none.
async fn next_from(ctx: Option<&mut Context>) -> Option<Message> {
    match ctx {
        Some(ctx) => ctx.next().await,
        None => std::future::pending().await,
    }
}

async fn relay(client: &mut Context, message: &Message) -> Result<(), ForwardExit> {
    let frame = message
        .serialize()
        .map_err(|e| ForwardExit::SendFailed(Side::Client, e))?;
    client
        .send_raw(&frame)
        .await
        .map_err(|e| ForwardExit::SendFailed(Side::Client, e))
}
