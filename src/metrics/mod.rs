//! Prometheus metrics for the bridge hub.
//!
//! Counters cover the hub's delivery pipeline (broadcasts accepted, events
//! dropped by the bounded queue, per-transport delivery failures); gauges
//! track live subscriber counts and are refreshed from the registry when
//! /metrics is scraped.

use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, register_int_gauge_vec,
    Encoder, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, TextEncoder,
};

const METRIC_PREFIX: &str = "yomu";

lazy_static! {
    /// Live subscribers per transport (datagram/stream/duplex)
    pub static ref ACTIVE_SUBSCRIBERS: IntGaugeVec = register_int_gauge_vec!(
        format!("{}_active_subscribers", METRIC_PREFIX),
        "Live subscribers per transport",
        &["transport"]
    ).unwrap();

    /// Rooms created so far
    pub static ref ROOMS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_rooms_active", METRIC_PREFIX),
        "Number of chat rooms created"
    ).unwrap();

    /// Registrations processed by the hub loop
    pub static ref SUBSCRIBERS_REGISTERED: IntCounterVec = register_int_counter_vec!(
        format!("{}_subscribers_registered_total", METRIC_PREFIX),
        "Register operations processed, per transport",
        &["transport"]
    ).unwrap();

    /// Unregistrations processed by the hub loop
    pub static ref SUBSCRIBERS_UNREGISTERED: IntCounterVec = register_int_counter_vec!(
        format!("{}_subscribers_unregistered_total", METRIC_PREFIX),
        "Unregister operations processed, per transport",
        &["transport"]
    ).unwrap();

    /// Broadcast requests accepted onto the hub's queue
    pub static ref EVENTS_BROADCAST: IntCounter = register_int_counter!(
        format!("{}_events_broadcast_total", METRIC_PREFIX),
        "Broadcast requests enqueued to the hub"
    ).unwrap();

    /// Broadcast requests dropped because the queue was full
    pub static ref EVENTS_DROPPED: IntCounter = register_int_counter!(
        format!("{}_events_dropped_total", METRIC_PREFIX),
        "Broadcast requests dropped by the bounded queue"
    ).unwrap();

    /// Successful per-subscriber deliveries
    pub static ref DELIVERIES: IntCounterVec = register_int_counter_vec!(
        format!("{}_deliveries_total", METRIC_PREFIX),
        "Per-subscriber deliveries, per transport",
        &["transport"]
    ).unwrap();

    /// Failed per-subscriber deliveries (unreachable address, closed or
    /// saturated connection channel)
    pub static ref DELIVERY_FAILURES: IntCounterVec = register_int_counter_vec!(
        format!("{}_delivery_failures_total", METRIC_PREFIX),
        "Per-subscriber delivery failures, per transport",
        &["transport"]
    ).unwrap();
}

/// Encode all registered metrics in Prometheus text exposition format.
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}
