//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `authgateway_reconciliations_total` - Total number of reconciliations
//! - `authgateway_reconciliation_errors_total{kind}` - Reconciliation errors by kind
//! - `authgateway_reconciliation_duration_seconds` - Duration of reconciliations
//! - `authgateway_sync_passes_total` - Completed gateway sync passes
//! - `authgateway_sync_pass_duration_seconds` - Time spent inside the sync critical section
//! - `authgateway_sync_lock_wait_seconds` - Time spent waiting for the sync lock
//! - `authgateway_gateway_regenerations_total` - Gateway configuration regenerations
//! - `authgateway_selector_errors_total` - Gateways skipped because of a malformed selector
//! - `authgateway_finalizer_operations_total{operation}` - Finalizer marker and cleanup operations
//! - `authgateway_requeues_total{reason}` - Requeues scheduled by the error policy

use anyhow::Result;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "authgateway_reconciliations_total",
        "Total number of reconciliations",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "authgateway_reconciliation_errors_total",
            "Total number of reconciliation errors by kind",
        ),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "authgateway_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static SYNC_PASSES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "authgateway_sync_passes_total",
        "Total number of completed gateway sync passes",
    )
    .expect("Failed to create SYNC_PASSES_TOTAL metric - this should never happen")
});

static SYNC_PASS_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "authgateway_sync_pass_duration_seconds",
            "Time spent holding the gateway sync lock in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
    )
    .expect("Failed to create SYNC_PASS_DURATION metric - this should never happen")
});

static SYNC_LOCK_WAIT: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "authgateway_sync_lock_wait_seconds",
            "Time spent waiting for the gateway sync lock in seconds",
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
    )
    .expect("Failed to create SYNC_LOCK_WAIT metric - this should never happen")
});

static GATEWAY_REGENERATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "authgateway_gateway_regenerations_total",
        "Total number of gateway configuration regenerations",
    )
    .expect("Failed to create GATEWAY_REGENERATIONS_TOTAL metric - this should never happen")
});

static SELECTOR_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "authgateway_selector_errors_total",
        "Total number of gateways skipped because of a malformed selector",
    )
    .expect("Failed to create SELECTOR_ERRORS_TOTAL metric - this should never happen")
});

static FINALIZER_OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "authgateway_finalizer_operations_total",
            "Total number of finalizer operations by operation",
        ),
        &["operation"],
    )
    .expect("Failed to create FINALIZER_OPERATIONS_TOTAL metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "authgateway_requeues_total",
            "Total number of requeues scheduled by reason",
        ),
        &["reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

/// Register every collector with the process registry
///
/// Safe to call more than once; collectors that are already registered are skipped.
pub fn register_metrics() -> Result<()> {
    register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    register(Box::new(RECONCILIATION_DURATION.clone()))?;
    register(Box::new(SYNC_PASSES_TOTAL.clone()))?;
    register(Box::new(SYNC_PASS_DURATION.clone()))?;
    register(Box::new(SYNC_LOCK_WAIT.clone()))?;
    register(Box::new(GATEWAY_REGENERATIONS_TOTAL.clone()))?;
    register(Box::new(SELECTOR_ERRORS_TOTAL.clone()))?;
    register(Box::new(FINALIZER_OPERATIONS_TOTAL.clone()))?;
    register(Box::new(REQUEUES_TOTAL.clone()))?;

    Ok(())
}

fn register(collector: Box<dyn prometheus::core::Collector>) -> Result<()> {
    match REGISTRY.register(collector) {
        Ok(()) | Err(prometheus::Error::AlreadyReg) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors(kind: &str) {
    RECONCILIATION_ERRORS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

pub fn increment_sync_passes() {
    SYNC_PASSES_TOTAL.inc();
}

pub fn observe_sync_pass_duration(duration: f64) {
    SYNC_PASS_DURATION.observe(duration);
}

pub fn observe_sync_lock_wait(duration: f64) {
    SYNC_LOCK_WAIT.observe(duration);
}

pub fn increment_gateway_regenerations() {
    GATEWAY_REGENERATIONS_TOTAL.inc();
}

pub fn increment_selector_errors() {
    SELECTOR_ERRORS_TOTAL.inc();
}

pub fn increment_finalizer_operations(operation: &str) {
    FINALIZER_OPERATIONS_TOTAL
        .with_label_values(&[operation])
        .inc();
}

pub fn increment_requeues(reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[reason]).inc();
}

/// Encode the registry in the Prometheus text exposition format
pub fn encode_text() -> Result<Vec<u8>> {
    use prometheus::Encoder;

    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(buffer)
}
