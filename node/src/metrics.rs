//! Prometheus metrics for the masternode layer.
//!
//! [`NodeMetrics`] owns a dedicated [`Registry`] so an exporter can encode
//! it into the Prometheus text exposition format.

use prometheus::{
    register_int_counter_with_registry, register_int_gauge_with_registry, IntCounter, IntGauge,
    Encoder, Opts, Registry, TextEncoder,
};

/// Central collection of all node-level Prometheus metrics.
pub struct NodeMetrics {
    /// The Prometheus registry that owns every metric below.
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    /// Announces that added or refreshed a registry entry.
    pub announces_accepted: IntCounter,
    pub pings_accepted: IntCounter,
    pub votes_accepted: IntCounter,
    /// Messages dropped, with or without a misbehavior score.
    pub messages_rejected: IntCounter,
    /// Payment votes this node signed itself.
    pub own_votes: IntCounter,

    // ── Gauges ──────────────────────────────────────────────────────────
    pub masternodes: IntGauge,
    pub masternodes_enabled: IntGauge,
    /// Numeric code of the current sync stage.
    pub sync_stage: IntGauge,
    pub payment_votes: IntGauge,
}

impl NodeMetrics {
    /// Create a fresh set of metrics, all registered under a new
    /// [`Registry`].
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        // Counters
        let announces_accepted = register_int_counter_with_registry!(
            Opts::new(
                "mx_announces_accepted_total",
                "Masternode announces accepted into the registry"
            ),
            registry
        )?;

        let pings_accepted = register_int_counter_with_registry!(
            Opts::new("mx_pings_accepted_total", "Masternode pings accepted"),
            registry
        )?;

        let votes_accepted = register_int_counter_with_registry!(
            Opts::new("mx_votes_accepted_total", "Payment votes accepted from peers"),
            registry
        )?;

        let messages_rejected = register_int_counter_with_registry!(
            Opts::new(
                "mx_messages_rejected_total",
                "Masternode messages rejected or dropped"
            ),
            registry
        )?;

        let own_votes = register_int_counter_with_registry!(
            Opts::new("mx_own_votes_total", "Payment votes signed by this node"),
            registry
        )?;

        // Gauges
        let masternodes = register_int_gauge_with_registry!(
            Opts::new("mx_masternodes", "Entries in the masternode registry"),
            registry
        )?;

        let masternodes_enabled = register_int_gauge_with_registry!(
            Opts::new("mx_masternodes_enabled", "Enabled masternodes"),
            registry
        )?;

        let sync_stage = register_int_gauge_with_registry!(
            Opts::new("mx_sync_stage", "Current masternode sync stage code"),
            registry
        )?;

        let payment_votes = register_int_gauge_with_registry!(
            Opts::new("mx_payment_votes", "Payment votes held in memory"),
            registry
        )?;

        Ok(Self {
            registry,
            announces_accepted,
            pings_accepted,
            votes_accepted,
            messages_rejected,
            own_votes,
            masternodes,
            masternodes_enabled,
            sync_stage,
            payment_votes,
        })
    }

    /// Encode every metric in the text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
