//! Session counters
//!
//! - `session_refresh_total` (counter): label `outcome`
//! - `session_gateway_retries_total` (counter): label `outcome`
//! - `session_boundary_messages_total` (counter): labels `direction`, `result`
//!
//! Without an installed recorder these are no-ops.

/// Record a settled refresh cycle: "success", "rejected", "no_session",
/// or "superseded".
pub fn record_refresh(outcome: &'static str) {
    metrics::counter!("session_refresh_total", "outcome" => outcome).increment(1);
}

/// Record a gateway retry decision: "retried", "session_expired", or
/// "not_replayable".
pub fn record_retry(outcome: &'static str) {
    metrics::counter!("session_gateway_retries_total", "outcome" => outcome).increment(1);
}

/// Record a boundary message: direction "outbound"/"inbound", result
/// "sent"/"applied"/"dropped"/"ignored".
pub fn record_boundary(direction: &'static str, result: &'static str) {
    metrics::counter!(
        "session_boundary_messages_total",
        "direction" => direction,
        "result" => result
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle, PrometheusRecorder};

    fn isolated_recorder() -> (PrometheusRecorder, PrometheusHandle) {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        (recorder, handle)
    }

    #[test]
    fn record_functions_do_not_panic_without_recorder() {
        record_refresh("success");
        record_retry("retried");
        record_boundary("outbound", "sent");
    }

    #[test]
    fn refresh_outcomes_render_with_label() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_refresh("success");
        record_refresh("rejected");

        let output = handle.render();
        assert!(output.contains("session_refresh_total"), "got: {output}");
        assert!(output.contains("outcome=\"success\""));
        assert!(output.contains("outcome=\"rejected\""));
    }

    #[test]
    fn boundary_counter_carries_both_labels() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_boundary("inbound", "applied");

        let output = handle.render();
        assert!(output.contains("session_boundary_messages_total"));
        assert!(output.contains("direction=\"inbound\""));
        assert!(output.contains("result=\"applied\""));
    }
}
