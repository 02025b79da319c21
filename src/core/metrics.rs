// src/core/metrics.rs

//! Defines and registers Prometheus metrics for proxy monitoring.
//!
//! This module uses `lazy_static` to ensure that metrics are registered only once
//! globally for the entire application lifecycle.

use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, Histogram, TextEncoder, register_counter, register_counter_vec,
    register_gauge, register_histogram,
};

lazy_static! {
    // --- Gauges ---
    /// The number of clients currently connected to the proxy.
    pub static ref CONNECTED_CLIENTS: Gauge =
        register_gauge!("docproxy_connected_clients", "Number of currently connected clients.").unwrap();

    // --- Counters ---
    /// The total number of client connections accepted since startup.
    pub static ref CONNECTIONS_ACCEPTED_TOTAL: Counter =
        register_counter!("docproxy_connections_accepted_total", "Total number of client connections accepted.").unwrap();
    /// Find queries that were re-issued against the fallback after an empty primary result.
    pub static ref FAILOVERS_TOTAL: Counter =
        register_counter!("docproxy_failovers_total", "Total number of find queries retried against the fallback.").unwrap();
    /// Empty primary results dropped because no find query was pending.
    pub static ref DROPPED_EMPTY_REPLIES_TOTAL: Counter =
        register_counter!("docproxy_dropped_empty_replies_total", "Empty find results dropped with no pending query.").unwrap();
    /// Connections whose fallback could not be dialed or authenticated.
    pub static ref FALLBACK_UNAVAILABLE_TOTAL: CounterVec =
        register_counter_vec!("docproxy_fallback_unavailable_total", "Fallback sessions that could not be established, labeled by reason.", &["reason"]).unwrap();
    /// Messages moved by the forwarding engines, labeled by direction.
    pub static ref MESSAGES_FORWARDED_TOTAL: CounterVec =
        register_counter_vec!("docproxy_messages_forwarded_total", "Total number of messages forwarded, labeled by direction.", &["direction"]).unwrap();

    // --- Histograms ---
    /// Time spent on the fallback handshake, from dial to the final SASL reply.
    pub static ref FALLBACK_HANDSHAKE_SECONDS: Histogram =
        register_histogram!("docproxy_fallback_handshake_seconds", "Duration of the fallback connect and authentication handshake in seconds.").unwrap();
}

/// Gathers all registered metrics and encodes them in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
