//! Integration tests for telemetry initialization and span helpers.

use stage_advance::telemetry::{TelemetryConfig, init_telemetry, metrics, stage};

#[test]
fn telemetry_initializes_without_endpoint() {
    // Note: tracing subscriber can only be set once per process.
    let config = TelemetryConfig {
        endpoint: None,
        service_name: "stage-advance-test".to_string(),
        namespace: Some("newsroom".to_string()),
        default_filter: "debug".to_string(),
    };
    // This may return Err if a global subscriber was already set by
    // another test in this process; that is acceptable.
    if let Ok(guard) = init_telemetry(config) {
        tracing::info!("telemetry up");
        guard.force_flush();
    }
}

#[test]
fn run_span_records_item_outcome_and_transition() {
    let span = stage::start_run_span(Some("msg-1"));
    stage::record_item(&span, "A1");
    stage::record_state_transition(&span, "received", "claimed");
    stage::record_outcome(&span, "advanced");
}

#[test]
fn sweep_span_creates() {
    let _span = stage::start_sweep_span();
}

#[test]
fn metric_instruments_accept_recordings_without_a_provider() {
    metrics::runs().add(1, &[opentelemetry::KeyValue::new("outcome", "advanced")]);
    metrics::operation_duration_ms().record(3.0, &[]);
}
