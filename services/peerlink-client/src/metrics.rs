//! Process-local metrics
//!
//! The client is short-lived, so counters are not exported over HTTP; the
//! rendered snapshot is logged at debug level on exit.
//!
//! - `client_commands_total` (counter): labels `command`, `outcome`
//! - plus the `session_*` counters recorded by `peerlink-auth`

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder as the global recorder.
pub fn install_recorder() -> anyhow::Result<PrometheusHandle> {
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();
    metrics::set_global_recorder(recorder)
        .map_err(|e| anyhow::anyhow!("failed to install metrics recorder: {e}"))?;
    Ok(handle)
}

/// Record a finished command: outcome "ok", "login_required", or "error".
pub fn record_command(command: &'static str, outcome: &'static str) {
    metrics::counter!("client_commands_total", "command" => command, "outcome" => outcome)
        .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_command_does_not_panic_without_recorder() {
        record_command("status", "ok");
    }

    #[test]
    fn command_counter_renders_labels() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_command("search", "login_required");

        let output = handle.render();
        assert!(output.contains("client_commands_total"), "got: {output}");
        assert!(output.contains("command=\"search\""));
        assert!(output.contains("outcome=\"login_required\""));
    }
}
