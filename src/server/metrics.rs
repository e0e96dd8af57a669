//! Prometheus exposition of coordinator counters.

use prometheus::{Encoder, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};

use crate::prefetch::coordinator::PrefetchCoordinator;

/// Gauges refreshed from the coordinator at scrape time.
pub struct PrefetchMetrics {
    registry: Registry,
    events: IntGaugeVec,
    ledger_entries: IntGauge,
    pending_fetches: IntGauge,
    pending_timers: IntGauge,
}

impl PrefetchMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let events = IntGaugeVec::new(
            Opts::new(
                "route_prefetch_events",
                "Prefetch lifecycle events since startup",
            ),
            &["event"],
        )?;
        let ledger_entries = IntGauge::new(
            "route_prefetch_ledger_entries",
            "Route keys currently fresh in the dedup ledger",
        )?;
        let pending_fetches = IntGauge::new(
            "route_prefetch_pending_fetches",
            "Route keys with a fetch in flight",
        )?;
        let pending_timers = IntGauge::new(
            "route_prefetch_pending_timers",
            "Delay and expiry timers not yet fired",
        )?;

        registry.register(Box::new(events.clone()))?;
        registry.register(Box::new(ledger_entries.clone()))?;
        registry.register(Box::new(pending_fetches.clone()))?;
        registry.register(Box::new(pending_timers.clone()))?;

        Ok(Self {
            registry,
            events,
            ledger_entries,
            pending_fetches,
            pending_timers,
        })
    }

    /// Refresh from `coordinator` and render the text format.
    pub fn render(&self, coordinator: &PrefetchCoordinator) -> prometheus::Result<String> {
        for (event, value) in coordinator.stats().events() {
            self.events
                .with_label_values(&[event])
                .set(value as i64);
        }
        self.ledger_entries.set(coordinator.ledger_len() as i64);
        self.pending_fetches.set(coordinator.pending_fetches() as i64);
        self.pending_timers.set(coordinator.pending_timers() as i64);

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
