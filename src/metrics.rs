//! Prometheus metrics for the replication controllers.
//!
//! - `replicator_reconciliations_total{kind}`: reconcile attempts
//! - `replicator_reconciliation_errors_total{kind,step}`: failed attempts by the step that failed
//! - `replicator_reconciliation_duration_seconds{kind}`: time spent per attempt

use std::time::Duration;

use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};

#[derive(Clone)]
pub struct Metrics {
    reconciliations: IntCounterVec,
    errors: IntCounterVec,
    duration: HistogramVec,
}

impl Metrics {
    /// Creates the collectors and registers them with `registry`.
    pub fn new(registry: &Registry) -> prometheus::Result<Self> {
        let reconciliations = IntCounterVec::new(
            Opts::new(
                "replicator_reconciliations_total",
                "Total number of reconciliations",
            ),
            &["kind"],
        )?;
        let errors = IntCounterVec::new(
            Opts::new(
                "replicator_reconciliation_errors_total",
                "Total number of failed reconciliations by failing step",
            ),
            &["kind", "step"],
        )?;
        let duration = HistogramVec::new(
            HistogramOpts::new(
                "replicator_reconciliation_duration_seconds",
                "Duration of reconciliation in seconds",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
            &["kind"],
        )?;

        registry.register(Box::new(reconciliations.clone()))?;
        registry.register(Box::new(errors.clone()))?;
        registry.register(Box::new(duration.clone()))?;

        Ok(Self {
            reconciliations,
            errors,
            duration,
        })
    }

    pub fn reconciled(&self, kind: &str, elapsed: Duration) {
        self.reconciliations.with_label_values(&[kind]).inc();
        self.duration
            .with_label_values(&[kind])
            .observe(elapsed.as_secs_f64());
    }

    pub fn failed(&self, kind: &str, step: &str) {
        self.errors.with_label_values(&[kind, step]).inc();
    }
}
