//! Prometheus metrics for the gossip pipeline.
//!
//! All metrics follow the naming convention: `qc_gossip_<metric>_<unit>`
//!
//! ## Metric Types
//!
//! - **Counter**: verdicts, dropped jobs, internal errors, peer reports
//! - **Gauge**: queue length and in-flight jobs per object kind
//! - **Histogram**: job processing time and queue wait time per object kind
//!
//! Every family is labelled by `kind` (the gossip object kind literal, e.g.
//! `beacon_block`) so one dashboard row covers one topic type.

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec,
    IntGaugeVec, Opts, Registry, TextEncoder,
};

use crate::TelemetryError;

lazy_static! {
    /// Process-wide gossip metrics, registered in their own registry.
    static ref GOSSIP_METRICS: GossipMetrics =
        GossipMetrics::new().expect("gossip metric creation failed");
}

/// Process-wide metrics instance.
pub fn metrics() -> &'static GossipMetrics {
    &GOSSIP_METRICS
}

/// All metric families exported by the gossip pipeline.
///
/// Each instance owns a private [`Registry`]; tests build their own instance
/// and read counters back without interference from other tests.
#[derive(Clone)]
pub struct GossipMetrics {
    registry: Registry,

    // =========================================================================
    // ADMISSION QUEUES
    // =========================================================================
    /// Resident jobs per queue
    pub queue_length: IntGaugeVec,
    /// Jobs dropped by the backpressure policy
    pub queue_dropped_jobs: IntCounterVec,
    /// Jobs currently being processed
    pub queue_concurrency: IntGaugeVec,
    /// Time from dequeue to verdict
    pub queue_job_time: HistogramVec,
    /// Time from admission to dequeue
    pub queue_job_wait_time: HistogramVec,

    // =========================================================================
    // VALIDATION
    // =========================================================================
    /// Verdicts by kind and verdict (`accept`, `ignore`, `reject`)
    pub verdicts: IntCounterVec,
    /// Internal faults of the business rule (never attributed to the peer)
    pub internal_errors: IntCounterVec,
    /// Reject reasons by kind and reason code
    pub reject_reasons: IntCounterVec,
    /// Accepted objects whose downstream side effect failed
    pub side_effect_failures: IntCounterVec,
    /// Peer reports by action class
    pub peer_reports: IntCounterVec,

    // =========================================================================
    // PEER SCORE PARAMETERS
    // =========================================================================
    /// Successful parameter rebuilds
    pub score_params_updates: IntCounter,
    /// Failed parameter rebuilds (previous snapshot kept)
    pub score_params_errors: IntCounter,
}

impl GossipMetrics {
    /// Create and register every metric family in a fresh registry.
    pub fn new() -> Result<Self, TelemetryError> {
        let registry = Registry::new();
        let err = |e: prometheus::Error| TelemetryError::MetricsInit(e.to_string());

        let queue_length = IntGaugeVec::new(
            Opts::new("qc_gossip_queue_length", "Resident jobs per gossip queue"),
            &["kind"],
        )
        .map_err(err)?;
        let queue_dropped_jobs = IntCounterVec::new(
            Opts::new(
                "qc_gossip_queue_dropped_jobs_total",
                "Jobs dropped by the queue backpressure policy",
            ),
            &["kind"],
        )
        .map_err(err)?;
        let queue_concurrency = IntGaugeVec::new(
            Opts::new(
                "qc_gossip_queue_concurrency",
                "Jobs currently in flight per gossip queue",
            ),
            &["kind"],
        )
        .map_err(err)?;
        let queue_job_time = HistogramVec::new(
            HistogramOpts::new(
                "qc_gossip_queue_job_time_seconds",
                "Time spent decoding and validating one gossip job",
            )
            .buckets(exponential_buckets(0.0001, 2.0, 16).map_err(err)?),
            &["kind"],
        )
        .map_err(err)?;
        let queue_job_wait_time = HistogramVec::new(
            HistogramOpts::new(
                "qc_gossip_queue_job_wait_time_seconds",
                "Time a gossip job spent resident in its queue",
            )
            .buckets(exponential_buckets(0.0001, 2.0, 18).map_err(err)?),
            &["kind"],
        )
        .map_err(err)?;

        let verdicts = IntCounterVec::new(
            Opts::new(
                "qc_gossip_validation_verdicts_total",
                "Gossip validation verdicts",
            ),
            &["kind", "verdict"],
        )
        .map_err(err)?;
        let internal_errors = IntCounterVec::new(
            Opts::new(
                "qc_gossip_validation_internal_errors_total",
                "Business rule faults downgraded to ignore",
            ),
            &["kind"],
        )
        .map_err(err)?;
        let reject_reasons = IntCounterVec::new(
            Opts::new(
                "qc_gossip_validation_reject_reasons_total",
                "Rejected gossip messages by reason code",
            ),
            &["kind", "code"],
        )
        .map_err(err)?;
        let side_effect_failures = IntCounterVec::new(
            Opts::new(
                "qc_gossip_side_effect_failures_total",
                "Downstream effects of accepted messages that failed",
            ),
            &["kind"],
        )
        .map_err(err)?;
        let peer_reports = IntCounterVec::new(
            Opts::new("qc_gossip_peer_reports_total", "Peer penalties reported"),
            &["action"],
        )
        .map_err(err)?;

        let score_params_updates = IntCounter::new(
            "qc_gossip_score_params_updates_total",
            "Peer score parameter rebuilds",
        )
        .map_err(err)?;
        let score_params_errors = IntCounter::new(
            "qc_gossip_score_params_errors_total",
            "Peer score parameter rebuilds that failed",
        )
        .map_err(err)?;

        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(queue_length.clone()),
            Box::new(queue_dropped_jobs.clone()),
            Box::new(queue_concurrency.clone()),
            Box::new(queue_job_time.clone()),
            Box::new(queue_job_wait_time.clone()),
            Box::new(verdicts.clone()),
            Box::new(internal_errors.clone()),
            Box::new(reject_reasons.clone()),
            Box::new(side_effect_failures.clone()),
            Box::new(peer_reports.clone()),
            Box::new(score_params_updates.clone()),
            Box::new(score_params_errors.clone()),
        ];
        for collector in collectors {
            registry.register(collector).map_err(err)?;
        }

        Ok(Self {
            registry,
            queue_length,
            queue_dropped_jobs,
            queue_concurrency,
            queue_job_time,
            queue_job_wait_time,
            verdicts,
            internal_errors,
            reject_reasons,
            side_effect_failures,
            peer_reports,
            score_params_updates,
            score_params_errors,
        })
    }

    /// Registry holding this instance's families.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Verdict count for one kind, as seen by the counters.
    pub fn verdict_count(&self, kind: &str, verdict: &str) -> u64 {
        self.verdicts.with_label_values(&[kind, verdict]).get()
    }

    /// Encode all metrics as Prometheus text format.
    pub fn encode(&self) -> Result<String, TelemetryError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instances_are_isolated() {
        let a = GossipMetrics::new().unwrap();
        let b = GossipMetrics::new().unwrap();
        a.verdicts.with_label_values(&["beacon_block", "accept"]).inc();
        assert_eq!(a.verdict_count("beacon_block", "accept"), 1);
        assert_eq!(b.verdict_count("beacon_block", "accept"), 0);
    }

    #[test]
    fn test_encode_contains_families() {
        let m = GossipMetrics::new().unwrap();
        m.queue_dropped_jobs.with_label_values(&["beacon_attestation"]).inc_by(3);
        m.queue_length.with_label_values(&["beacon_attestation"]).set(7);
        let text = m.encode().unwrap();
        assert!(text.contains("qc_gossip_queue_dropped_jobs_total{kind=\"beacon_attestation\"} 3"));
        assert!(text.contains("qc_gossip_queue_length{kind=\"beacon_attestation\"} 7"));
    }

    #[test]
    fn test_global_instance() {
        metrics().score_params_updates.inc();
        assert!(metrics().score_params_updates.get() >= 1);
    }
}
