//! Metric instrument factories for stage-advance.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"stage-advance"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for stage-advance instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("stage-advance")
}

/// Counter: engine invocations by outcome.
/// Labels: `outcome` ("advanced" | "no_candidate" | "failed").
pub fn runs() -> Counter<u64> {
    meter()
        .u64_counter("stage.runs")
        .with_description("Number of claim-and-advance invocations")
        .build()
}

/// Counter: article status transitions applied by this stage.
/// Labels: `from`, `to`.
pub fn state_transitions() -> Counter<u64> {
    meter()
        .u64_counter("stage.transitions")
        .with_description("Number of article status transitions")
        .build()
}

/// Counter: claim attempts that lost to another invocation.
pub fn claim_conflicts() -> Counter<u64> {
    meter()
        .u64_counter("stage.claim.conflicts")
        .with_description("Number of lost claim races")
        .build()
}

/// Counter: individual publish attempts.
/// Labels: `channel`, `result` ("ok" | "error").
pub fn publishes() -> Counter<u64> {
    meter()
        .u64_counter("stage.publish")
        .with_description("Number of downstream publish attempts")
        .build()
}

/// Counter: items handled by the reconciliation sweep.
/// Labels: `result` ("resumed" | "skipped" | "failed").
pub fn reconcile_items() -> Counter<u64> {
    meter()
        .u64_counter("stage.reconcile.items")
        .with_description("Number of stale claimed items handled by the sweep")
        .build()
}

/// Counter: queue-level operations (send, read, archive).
/// Labels: `queue`, `operation`.
pub fn queue_operations() -> Counter<u64> {
    meter()
        .u64_counter("stage.queue.operations")
        .with_description("Number of queue operations")
        .build()
}

/// Histogram: operation duration in milliseconds.
/// Labels: `operation`.
pub fn operation_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("stage.operation.duration_ms")
        .with_description("Operation duration in milliseconds")
        .with_unit("ms")
        .build()
}
