//! Stage invocation span helpers.
//!
//! Provides span creation and state-transition recording for articles
//! flowing through the claim-and-advance engine.

use tracing::Span;

/// Start a span for one engine invocation.
///
/// `item.id` and `stage.outcome` are declared empty and filled in as the
/// invocation progresses.
pub fn start_run_span(message_id: Option<&str>) -> Span {
    tracing::info_span!(
        "stage.run",
        "trigger.message_id" = message_id.unwrap_or("-"),
        "item.id" = tracing::field::Empty,
        "stage.outcome" = tracing::field::Empty,
    )
}

/// Start a span for one reconciliation sweep.
pub fn start_sweep_span() -> Span {
    tracing::info_span!(
        "stage.reconcile",
        "reconcile.examined" = tracing::field::Empty,
        "reconcile.resumed" = tracing::field::Empty,
    )
}

pub fn record_item(span: &Span, item_id: &str) {
    span.record("item.id", item_id);
}

pub fn record_outcome(span: &Span, outcome: &str) {
    span.record("stage.outcome", outcome);
}

/// Record a state transition event on the given span.
///
/// Emits a tracing `info` event scoped to the given span.
pub fn record_state_transition(span: &Span, from: &str, to: &str) {
    span.in_scope(|| {
        tracing::info!(from = from, to = to, "state_transition");
    });
}
