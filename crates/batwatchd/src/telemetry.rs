//! Prometheus metrics for the MAPE-K loop
//!
//! Metrics are kept in a private registry; `gather_text` renders the text
//! exposition format for whoever wants to serve it.

use crate::mapek::cycle::CycleResult;
use crate::mapek::types::ActionStatus;
use prometheus::{
    register_gauge_vec_with_registry, register_histogram_vec_with_registry,
    register_int_counter_vec_with_registry, Encoder, GaugeVec, HistogramVec, IntCounterVec,
    Registry, TextEncoder,
};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),

    #[error("metrics output is not UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

/// Loop metrics for Prometheus
#[derive(Clone)]
pub struct LoopMetrics {
    pub cycles_total: IntCounterVec,
    pub anomalies_total: IntCounterVec,
    pub recovery_actions_total: IntCounterVec,
    pub health_score: GaugeVec,
    pub cycle_duration_seconds: HistogramVec,

    registry: Arc<Registry>,
}

impl LoopMetrics {
    pub fn new() -> Result<Self, TelemetryError> {
        let registry = Registry::new();

        let cycles_total = register_int_counter_vec_with_registry!(
            "batwatch_cycles_total",
            "Total number of MAPE-K cycles by outcome",
            &["node_id", "outcome"],
            registry
        )?;

        let anomalies_total = register_int_counter_vec_with_registry!(
            "batwatch_anomalies_total",
            "Total number of detected anomalies by type",
            &["node_id", "anomaly_type"],
            registry
        )?;

        let recovery_actions_total = register_int_counter_vec_with_registry!(
            "batwatch_recovery_actions_total",
            "Total number of recovery actions by result",
            &["node_id", "action", "result"],
            registry
        )?;

        let health_score = register_gauge_vec_with_registry!(
            "batwatch_health_score",
            "Latest overall health score (0.0 - 1.0)",
            &["node_id"],
            registry
        )?;

        let cycle_duration_seconds = register_histogram_vec_with_registry!(
            "batwatch_cycle_duration_seconds",
            "MAPE-K cycle duration in seconds",
            &["node_id"],
            vec![0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0],
            registry
        )?;

        Ok(Self {
            cycles_total,
            anomalies_total,
            recovery_actions_total,
            health_score,
            cycle_duration_seconds,
            registry: Arc::new(registry),
        })
    }

    /// Record everything a finished cycle reports
    pub fn observe_cycle(&self, cycle: &CycleResult) {
        let node = cycle.node_id.as_str();
        let outcome = if cycle.success() { "success" } else { "failure" };

        self.cycles_total.with_label_values(&[node, outcome]).inc();
        self.cycle_duration_seconds
            .with_label_values(&[node])
            .observe(cycle.duration_seconds);

        for anomaly in &cycle.anomalies {
            self.anomalies_total
                .with_label_values(&[node, anomaly.anomaly_type.as_str()])
                .inc();
        }

        if let Some(execution) = &cycle.execution {
            for executed in &execution.actions_executed {
                let result = match executed.result.status {
                    ActionStatus::Success => "success",
                    ActionStatus::Escalated => "escalated",
                };
                self.recovery_actions_total
                    .with_label_values(&[node, executed.action.as_str(), result])
                    .inc();
            }
            for failed in &execution.actions_failed {
                self.recovery_actions_total
                    .with_label_values(&[node, failed.action.as_str(), "failure"])
                    .inc();
            }
        }

        if let Some(score) = cycle.health_score() {
            self.health_score.with_label_values(&[node]).set(score);
        }
    }

    pub fn gather_text(&self) -> Result<String, TelemetryError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapek::cycle::CycleOutcome;
    use crate::mapek::monitor::MonitoringData;
    use crate::mapek::types::{
        ActionReport, Anomaly, AnomalyType, ExecutedAction, ExecutionResult, FailedAction,
        RecoveryAction, Severity,
    };
    use chrono::Utc;
    use serde_json::json;

    fn cycle() -> CycleResult {
        let now = Utc::now();
        CycleResult {
            cycle_id: 1,
            node_id: "node-1".to_string(),
            started_at: now,
            completed_at: now,
            monitoring: Some(MonitoringData::new(json!({"overall_score": 0.4}), json!({}))),
            anomalies: vec![Anomaly::new(
                AnomalyType::NodeUnhealthy,
                Severity::Medium,
                "low score",
                "node-1",
                json!({}),
            )],
            anomalies_count: 1,
            plan: None,
            execution: Some(ExecutionResult {
                plan_id: "batman-plan-0001".to_string(),
                started_at: now,
                completed_at: now,
                actions_executed: vec![ExecutedAction {
                    action: RecoveryAction::AdjustRouting,
                    result: ActionReport::success("ok"),
                }],
                actions_failed: vec![FailedAction {
                    action: RecoveryAction::RestartDaemon,
                    error: "timeout".to_string(),
                }],
                success: false,
            }),
            outcome: CycleOutcome::Success,
            duration_seconds: 0.2,
        }
    }

    #[test]
    fn test_observe_cycle() {
        let metrics = LoopMetrics::new().unwrap();
        metrics.observe_cycle(&cycle());
        metrics.observe_cycle(&cycle());

        assert_eq!(
            metrics
                .cycles_total
                .with_label_values(&["node-1", "success"])
                .get(),
            2
        );
        assert_eq!(
            metrics
                .anomalies_total
                .with_label_values(&["node-1", "node_unhealthy"])
                .get(),
            2
        );
        assert_eq!(
            metrics
                .recovery_actions_total
                .with_label_values(&["node-1", "restart_daemon", "failure"])
                .get(),
            2
        );
        assert_eq!(metrics.health_score.with_label_values(&["node-1"]).get(), 0.4);
    }

    #[test]
    fn test_gather_text() {
        let metrics = LoopMetrics::new().unwrap();
        metrics.observe_cycle(&cycle());

        let text = metrics.gather_text().unwrap();
        assert!(text.contains("batwatch_cycles_total"));
        assert!(text.contains("batwatch_cycle_duration_seconds_bucket"));
        assert!(text.contains("outcome=\"success\""));
    }

    #[test]
    fn test_independent_registries() {
        // Two loops in one process must not collide on registration
        assert!(LoopMetrics::new().is_ok());
        assert!(LoopMetrics::new().is_ok());
    }
}
