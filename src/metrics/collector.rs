//! Metrics collection using Prometheus
//!
//! Vote outcomes, gate rejections and request latency for the star-tally
//! service.

use anyhow::Result;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Main metrics collector for the rating service
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Votes received by outcome (applied, already_voted, failed)
    pub votes_total: IntCounterVec,

    /// Requests rejected by the gate by reason (validation, configuration, storage)
    pub rejections_total: IntCounterVec,

    /// Aggregate reads served
    pub aggregate_reads_total: IntCounter,

    /// Sort requests served
    pub sorts_total: IntCounter,

    /// Time spent applying a vote
    pub vote_duration: Histogram,

    /// Stored aggregates at the last health check
    pub stored_aggregates: IntGauge,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let votes_total = IntCounterVec::new(
            Opts::new("star_tally_votes_total", "Votes received by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(votes_total.clone()))?;

        let rejections_total = IntCounterVec::new(
            Opts::new(
                "star_tally_rejections_total",
                "Vote gate requests rejected by reason",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(rejections_total.clone()))?;

        let aggregate_reads_total = IntCounter::new(
            "star_tally_aggregate_reads_total",
            "Aggregate read requests served",
        )?;
        registry.register(Box::new(aggregate_reads_total.clone()))?;

        let sorts_total = IntCounter::new("star_tally_sorts_total", "Sort requests served")?;
        registry.register(Box::new(sorts_total.clone()))?;

        let vote_duration = Histogram::with_opts(
            HistogramOpts::new(
                "star_tally_vote_duration_seconds",
                "Time spent applying a vote",
            )
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]),
        )?;
        registry.register(Box::new(vote_duration.clone()))?;

        let stored_aggregates = IntGauge::new(
            "star_tally_stored_aggregates",
            "Stored aggregates at the last health check",
        )?;
        registry.register(Box::new(stored_aggregates.clone()))?;

        Ok(Self {
            registry,
            votes_total,
            rejections_total,
            aggregate_reads_total,
            sorts_total,
            vote_duration,
            stored_aggregates,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn record_vote(&self, outcome: &str, duration: Duration) {
        self.votes_total.with_label_values(&[outcome]).inc();
        self.vote_duration.observe(duration.as_secs_f64());
    }

    pub fn record_rejection(&self, reason: &str) {
        self.rejections_total.with_label_values(&[reason]).inc();
    }

    /// Start a timer for an operation
    pub fn start_timer(&self) -> Instant {
        Instant::now()
    }

    /// Render all metrics in the Prometheus text format
    pub fn export(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_export() {
        let collector = MetricsCollector::new().unwrap();

        collector.record_vote("applied", Duration::from_millis(1));
        collector.record_vote("applied", Duration::from_millis(2));
        collector.record_rejection("validation");

        assert_eq!(collector.votes_total.with_label_values(&["applied"]).get(), 2);
        assert_eq!(
            collector
                .rejections_total
                .with_label_values(&["validation"])
                .get(),
            1
        );

        let exported = collector.export().unwrap();
        assert!(exported.contains("star_tally_votes_total"));
        assert!(exported.contains("star_tally_vote_duration_seconds"));
    }

    #[test]
    fn test_collectors_do_not_share_registries() {
        let first = MetricsCollector::new().unwrap();
        let second = MetricsCollector::new().unwrap();

        first.sorts_total.inc();
        assert_eq!(second.sorts_total.get(), 0);
    }
}
