//! `HealthCheckSink`: stands in for the out-of-scope alerting system
//! (health-check alerting is named explicitly as an external
//! collaborator in §1). The loop alerts through this exactly once per
//! non-default-signal failure.

/// A single alert: a named check and a human-readable output string,
/// mirroring the original's `sensu_checkin(check_name, output, ...)`.
pub trait HealthCheckSink: Send + Sync {
    fn alert(&self, check_name: &str, output: &str);
}

/// Discards every alert. Used where no alerting backend is wired up
/// (e.g. a simulation harness).
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHealthCheckSink;

impl HealthCheckSink for NoopHealthCheckSink {
    fn alert(&self, _check_name: &str, _output: &str) {}
}

/// Logs every alert via `tracing`, the real implementation used by
/// `clustermand` until a proper alerting backend is wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHealthCheckSink;

impl HealthCheckSink for LoggingHealthCheckSink {
    fn alert(&self, check_name: &str, output: &str) {
        tracing::warn!(check_name, output, "health check alert");
    }
}

/// Records every alert in memory, for tests that need to assert an
/// alert fired exactly once.
#[derive(Debug, Default)]
pub struct RecordingHealthCheckSink {
    alerts: std::sync::Mutex<Vec<(String, String)>>,
}

impl RecordingHealthCheckSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts(&self) -> Vec<(String, String)> {
        self.alerts.lock().unwrap().clone()
    }
}

impl HealthCheckSink for RecordingHealthCheckSink {
    fn alert(&self, check_name: &str, output: &str) {
        self.alerts.lock().unwrap().push((check_name.to_string(), output.to_string()));
    }
}
