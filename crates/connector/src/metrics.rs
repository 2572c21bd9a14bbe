//! Prometheus metrics for the relay bridge
//!
//! Per-channel metrics for link state, connect attempts and event flow.

use once_cell::sync::Lazy;
use prometheus::{
    register_int_counter_vec, register_int_gauge_vec, Encoder, IntCounterVec, IntGaugeVec,
    TextEncoder,
};

use crate::status::LinkState;

/// Labels used for metrics
const LABEL_CHANNEL: &str = "channel";
const LABEL_LINK: &str = "link";
const LABEL_KIND: &str = "kind";
const LABEL_CAUSE: &str = "cause";

pub const LINK_MARKET: &str = "market";
pub const LINK_RELAY: &str = "relay";

/// Events forwarded to the relay per kind
static EVENTS_FORWARDED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "mdrelay_events_forwarded_total",
        "Total events forwarded to the relay",
        &[LABEL_CHANNEL, LABEL_KIND]
    )
    .expect("Failed to register events_forwarded metric")
});

/// Relay sends that failed per kind
static FORWARD_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "mdrelay_forward_failures_total",
        "Total relay sends that failed",
        &[LABEL_CHANNEL, LABEL_KIND]
    )
    .expect("Failed to register forward_failures metric")
});

static CONNECT_ATTEMPTS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "mdrelay_connect_attempts_total",
        "Connect attempts per link",
        &[LABEL_CHANNEL, LABEL_LINK]
    )
    .expect("Failed to register connect_attempts metric")
});

static CONNECT_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "mdrelay_connect_failures_total",
        "Failed connect attempts per link",
        &[LABEL_CHANNEL, LABEL_LINK]
    )
    .expect("Failed to register connect_failures metric")
});

/// Sessions ended, labelled by which side ended them
static SESSIONS_ENDED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "mdrelay_sessions_ended_total",
        "Sessions torn down, by cause (market, relay, both)",
        &[LABEL_CHANNEL, LABEL_CAUSE]
    )
    .expect("Failed to register sessions_ended metric")
});

/// Link state per link (0=closed, 1=connecting, 2=open)
static LINK_STATE: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "mdrelay_link_state",
        "Link state (0=closed, 1=connecting, 2=open)",
        &[LABEL_CHANNEL, LABEL_LINK]
    )
    .expect("Failed to register link_state metric")
});

/// Handle for recording metrics for one channel
#[derive(Clone)]
pub struct ChannelMetrics {
    channel: String,
}

impl ChannelMetrics {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
        }
    }

    pub fn inc_forwarded(&self, kind: &str) {
        EVENTS_FORWARDED
            .with_label_values(&[&self.channel, kind])
            .inc();
    }

    pub fn inc_forward_failure(&self, kind: &str) {
        FORWARD_FAILURES
            .with_label_values(&[&self.channel, kind])
            .inc();
    }

    pub fn inc_connect_attempt(&self, link: &str) {
        CONNECT_ATTEMPTS
            .with_label_values(&[&self.channel, link])
            .inc();
    }

    pub fn inc_connect_failure(&self, link: &str) {
        CONNECT_FAILURES
            .with_label_values(&[&self.channel, link])
            .inc();
    }

    pub fn inc_session_ended(&self, cause: &str) {
        SESSIONS_ENDED
            .with_label_values(&[&self.channel, cause])
            .inc();
    }

    pub fn set_link_state(&self, link: &str, state: LinkState) {
        LINK_STATE
            .with_label_values(&[&self.channel, link])
            .set(state as i64);
    }

    pub fn forwarded(&self, kind: &str) -> u64 {
        EVENTS_FORWARDED
            .with_label_values(&[&self.channel, kind])
            .get()
    }
}

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| {
        prometheus::Error::Msg(format!("Failed to encode metrics as UTF-8: {}", e))
    })
}
