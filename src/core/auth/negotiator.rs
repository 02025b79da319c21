// src/core/auth/negotiator.rs

//! Drives a SCRAM conversation over the wire.
//!
//! The exchange is a strict request/reply sequence on a freshly dialed
//! backend connection:
//!
//! 1. an `isMaster` handshake,
//! 2. `saslStart` carrying the client-first message,
//! 3. `saslContinue` rounds until the server reports `done`.

use super::scram::{ScramConversation, ScramMechanism};
use super::{Credentials, MechanismPreference};
use crate::connection::Context;
use crate::core::ProxyError;
use crate::core::protocol::{Document, Message, QueryMessage, ReplyMessage, Value};
use bytes::Bytes;
use tracing::{debug, info};

/// The fields of a `saslStart`/`saslContinue` reply the client acts on.
#[derive(Debug, Clone, PartialEq)]
pub struct SaslReply {
    pub conversation_id: i32,
    pub payload: Bytes,
    pub done: bool,
}

/// Authenticates with SCRAM-SHA-1 against the `admin` database.
pub async fn authenticate(
    ctx: &mut Context,
    username: &str,
    password: &str,
) -> Result<(), ProxyError> {
    let credentials = Credentials::new(username, password);
    authenticate_with(ctx, &credentials, MechanismPreference::ScramSha1)
        .await
        .map(|_| ())
}

/// Authenticates `credentials` on `ctx` and returns the mechanism that was used.
///
/// No other traffic may flow on `ctx` while this runs. On error the connection
/// is left in an undefined protocol state and should be closed.
pub async fn authenticate_with(
    ctx: &mut Context,
    credentials: &Credentials,
    preference: MechanismPreference,
) -> Result<ScramMechanism, ProxyError> {
    let mut hello_cmd = Document::new().with("isMaster", 1);
    if preference == MechanismPreference::Auto {
        hello_cmd.push(
            "saslSupportedMechs",
            format!("{}.{}", credentials.auth_db, credentials.username),
        );
    }
    let reply = round_trip(ctx, QueryMessage::command(hello_cmd), 0, "isMaster").await?;
    let hello = reply
        .first_document()
        .ok_or_else(|| ProxyError::Protocol("isMaster reply has no document".into()))?;

    let mechanism = match preference {
        MechanismPreference::ScramSha1 => ScramMechanism::Sha1,
        MechanismPreference::ScramSha256 => ScramMechanism::Sha256,
        MechanismPreference::Auto => {
            let advertised = parse_sasl_mechanisms(hello);
            debug!("Backend advertises SASL mechanisms {:?}", advertised);
            choose_mechanism(&advertised).ok_or_else(|| {
                ProxyError::Authentication(format!(
                    "no supported SCRAM mechanism among {advertised:?}"
                ))
            })?
        }
    };

    let mut conversation =
        ScramConversation::new(mechanism, &credentials.username, &credentials.password);
    let start = QueryMessage::command_on(&credentials.auth_db, conversation.first_message()?);
    debug!(
        "Starting {} conversation for user '{}'",
        mechanism.name(),
        credentials.username
    );
    let reply = round_trip(ctx, start, 0, "saslStart").await?;

    let mut request_id = reply.header.request_id;
    let mut sasl = parse_sasl_reply(&reply)?;
    while !sasl.done {
        let payload = conversation.next(&sasl.payload)?;
        let command = Document::new()
            .with("saslContinue", 1)
            .with("conversationId", sasl.conversation_id)
            .with("payload", Value::binary(payload))
            .with("autoAuthorize", 1);
        request_id = request_id.wrapping_add(1);
        debug!(
            "saslContinue (conversation {}, step {})",
            sasl.conversation_id,
            conversation.step()
        );
        let query = QueryMessage::command_on(&credentials.auth_db, command);
        let reply = round_trip(ctx, query, request_id, "saslContinue").await?;
        sasl = parse_sasl_reply(&reply)?;
    }

    info!(
        "Authenticated as '{}' on {} using {}",
        credentials.username,
        ctx.peer_addr(),
        mechanism.name()
    );
    Ok(mechanism)
}

/// Sends one command and waits for its reply.
async fn round_trip(
    ctx: &mut Context,
    query: QueryMessage,
    request_id: i32,
    phase: &str,
) -> Result<ReplyMessage, ProxyError> {
    let mut message = Message::Query(query);
    message.set_request_id(request_id);
    ctx.send(&message).await?;

    match ctx.next().await {
        Some(Message::Reply(reply)) => Ok(reply),
        Some(other) => Err(ProxyError::UnexpectedMessage(other.op_code())),
        None => Err(ProxyError::ConnectionClosed(phase.to_string())),
    }
}

/// Extracts `conversationId`, `payload` and `done` from a SASL reply.
///
/// Fails unless `ok` is numerically 1. A missing `payload` is an error; the
/// other two fields default to zero values.
pub fn parse_sasl_reply(reply: &ReplyMessage) -> Result<SaslReply, ProxyError> {
    let doc = reply
        .first_document()
        .ok_or_else(|| ProxyError::Protocol("SASL reply carries no document".into()))?;

    if doc.get_f64("ok") != Some(1.0) {
        let reason = doc
            .get_str("errmsg")
            .unwrap_or("server rejected the SASL exchange");
        return Err(ProxyError::Authentication(reason.to_string()));
    }

    let payload = doc
        .get_binary("payload")
        .cloned()
        .ok_or(ProxyError::MissingField("payload"))?;

    Ok(SaslReply {
        conversation_id: doc.get_i32("conversationId").unwrap_or(0),
        payload,
        done: doc.get_bool("done").unwrap_or(false),
    })
}

/// Reads `saslSupportedMechs` from a hello reply. Entries may be bare names or
/// `"<db>.<user> <MECH>"`; only the mechanism name is kept.
pub fn parse_sasl_mechanisms(hello: &Document) -> Vec<String> {
    hello
        .get_array("saslSupportedMechs")
        .unwrap_or_default()
        .iter()
        .filter_map(Value::as_str)
        .filter_map(|entry| entry.split_whitespace().last())
        .map(str::to_string)
        .collect()
}

/// Picks SCRAM-SHA-256 when offered, then SCRAM-SHA-1.
pub fn choose_mechanism(mechanisms: &[String]) -> Option<ScramMechanism> {
    [ScramMechanism::Sha256, ScramMechanism::Sha1]
        .into_iter()
        .find(|m| mechanisms.iter().any(|name| name == m.name()))
}
