//! Prometheus metrics for conditions and the reboot controller
//!
//! One registry per process, handed explicitly to conditions and the
//! controller. Gauges and counters are atomic and may be touched from any task.

use crate::state::StateName;
use prometheus::{
    register_gauge_vec_with_registry, register_gauge_with_registry,
    register_int_counter_vec_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, Encoder, Gauge, GaugeVec, IntCounter, IntCounterVec,
    IntGauge, Registry, TextEncoder,
};
use std::sync::Arc;

const NAMESPACE: &str = "rebootd";

/// Metrics exported by the daemon
#[derive(Clone)]
pub struct RebootMetrics {
    pub process_start_timestamp: Gauge,
    pub heartbeat_timestamp: Gauge,
    pub version: GaugeVec,

    // Per condition
    pub checker_last_check: GaugeVec,
    pub condition_state: GaugeVec,
    pub state_change_timestamp: GaugeVec,

    // Controller
    pub reboot_requests_total: IntCounterVec,
    pub invocation_errors_total: IntCounter,
    pub system_uptime_seconds: IntGauge,

    registry: Arc<Registry>,
}

impl RebootMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let process_start_timestamp = register_gauge_with_registry!(
            format!("{}_start_timestamp_seconds", NAMESPACE),
            "Unix time the daemon was started",
            registry
        )?;

        let heartbeat_timestamp = register_gauge_with_registry!(
            format!("{}_heartbeat_timestamp_seconds", NAMESPACE),
            "Unix time of the last heartbeat",
            registry
        )?;

        let version = register_gauge_vec_with_registry!(
            format!("{}_version", NAMESPACE),
            "Running daemon version",
            &["version"],
            registry
        )?;

        let checker_last_check = register_gauge_vec_with_registry!(
            format!("{}_checker_last_check_timestamp_seconds", NAMESPACE),
            "Unix time a checker was last scheduled",
            &["checker"],
            registry
        )?;

        let condition_state = register_gauge_vec_with_registry!(
            format!("{}_condition_state", NAMESPACE),
            "1 for the current state of a condition, 0 otherwise",
            &["state", "checker"],
            registry
        )?;

        let state_change_timestamp = register_gauge_vec_with_registry!(
            format!("{}_condition_state_change_timestamp_seconds", NAMESPACE),
            "Unix time a condition left the given state",
            &["state", "checker"],
            registry
        )?;

        let reboot_requests_total = register_int_counter_vec_with_registry!(
            format!("{}_reboot_requests_total", NAMESPACE),
            "Reboot requests received from groups",
            &["group"],
            registry
        )?;

        let invocation_errors_total = register_int_counter_with_registry!(
            format!("{}_invocation_errors_total", NAMESPACE),
            "Failed invocations of the reboot primitive",
            registry
        )?;

        let system_uptime_seconds = register_int_gauge_with_registry!(
            format!("{}_system_uptime_seconds", NAMESPACE),
            "System uptime as last seen by the safety gate",
            registry
        )?;

        #[cfg(target_os = "linux")]
        registry.register(Box::new(
            prometheus::process_collector::ProcessCollector::for_self(),
        ))?;

        Ok(Self {
            process_start_timestamp,
            heartbeat_timestamp,
            version,
            checker_last_check,
            condition_state,
            state_change_timestamp,
            reboot_requests_total,
            invocation_errors_total,
            system_uptime_seconds,
            registry: Arc::new(registry),
        })
    }

    /// Record that a checker was scheduled
    pub fn record_check(&self, checker: &str) {
        self.checker_last_check
            .with_label_values(&[checker])
            .set(now_secs());
    }

    /// Flip the state gauges of a condition and stamp the state it left
    pub fn record_transition(&self, checker: &str, from: StateName, to: StateName) {
        self.condition_state
            .with_label_values(&[from.as_str(), checker])
            .set(0.0);
        self.condition_state
            .with_label_values(&[to.as_str(), checker])
            .set(1.0);
        self.state_change_timestamp
            .with_label_values(&[from.as_str(), checker])
            .set(now_secs());
    }

    pub fn record_reboot_request(&self, group: &str) {
        self.reboot_requests_total.with_label_values(&[group]).inc();
    }

    pub fn record_invocation_error(&self) {
        self.invocation_errors_total.inc();
    }

    pub fn record_start(&self, version: &str) {
        self.process_start_timestamp.set(now_secs());
        self.version.with_label_values(&[version]).set(1.0);
    }

    pub fn heartbeat(&self) {
        self.heartbeat_timestamp.set(now_secs());
    }

    /// Current value of a condition's state gauge
    pub fn state_value(&self, checker: &str, state: StateName) -> f64 {
        self.condition_state
            .with_label_values(&[state.as_str(), checker])
            .get()
    }

    /// Export metrics in Prometheus text format
    pub fn export(&self) -> prometheus::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    /// Export only the daemon's own families, leaving out process metrics
    /// that other exporters on the host already publish
    pub fn export_own(&self) -> prometheus::Result<String> {
        let prefix = format!("{}_", NAMESPACE);
        let families: Vec<_> = self
            .registry
            .gather()
            .into_iter()
            .filter(|family| family.get_name().starts_with(&prefix))
            .collect();

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl std::fmt::Debug for RebootMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RebootMetrics").finish_non_exhaustive()
    }
}

fn now_secs() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_flips_state_gauges() {
        let metrics = RebootMetrics::new().unwrap();
        metrics.record_transition("needrestart", StateName::Initial, StateName::RebootNeeded);

        assert_eq!(metrics.state_value("needrestart", StateName::Initial), 0.0);
        assert_eq!(metrics.state_value("needrestart", StateName::RebootNeeded), 1.0);
        assert!(
            metrics
                .state_change_timestamp
                .with_label_values(&["initial", "needrestart"])
                .get()
                > 0.0
        );
    }

    #[test]
    fn test_export_contains_counters() {
        let metrics = RebootMetrics::new().unwrap();
        metrics.record_invocation_error();
        metrics.record_reboot_request("updates");
        metrics.record_check("file");

        let text = metrics.export().unwrap();
        assert!(text.contains("rebootd_invocation_errors_total 1"));
        assert!(text.contains("rebootd_reboot_requests_total{group=\"updates\"} 1"));
        assert!(text.contains("rebootd_checker_last_check_timestamp_seconds"));
    }

    #[test]
    fn test_export_own_keeps_namespace() {
        let metrics = RebootMetrics::new().unwrap();
        metrics.heartbeat();
        let text = metrics.export_own().unwrap();
        assert!(text.contains("rebootd_heartbeat_timestamp_seconds"));
        assert!(!text.contains("process_start_time_seconds"));
    }

    #[test]
    fn test_registries_are_independent() {
        let a = RebootMetrics::new().unwrap();
        let b = RebootMetrics::new().unwrap();
        a.record_invocation_error();
        assert_eq!(a.invocation_errors_total.get(), 1);
        assert_eq!(b.invocation_errors_total.get(), 0);
    }
}
