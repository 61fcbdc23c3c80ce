//! Analyze phase: threshold-based anomaly detection
//!
//! Input is the JSON produced by Monitor. Missing or malformed fields fall
//! back to healthy values, so bad input yields fewer anomalies rather than an
//! error.

use super::monitor::MonitoringData;
use super::types::{Anomaly, AnomalyType, Severity};
use batwatch_common::History;
use serde_json::{json, Value};
use tracing::{debug, warn};

pub const HEALTH_SCORE_THRESHOLD: f64 = 0.5;
pub const LATENCY_THRESHOLD_MS: f64 = 100.0;
pub const PACKET_LOSS_THRESHOLD: f64 = 5.0;
pub const LINK_QUALITY_THRESHOLD: f64 = 0.5;

pub const ANOMALY_HISTORY_CAPACITY: usize = 100;

const UNKNOWN_NODE: &str = "unknown";

pub struct Analyzer {
    history: History<Anomaly>,
}

impl Analyzer {
    pub fn new() -> Self {
        Self {
            history: History::with_capacity(ANOMALY_HISTORY_CAPACITY),
        }
    }

    /// Evaluate every rule independently; several anomalies may fire at once
    pub fn analyze(&mut self, data: &MonitoringData) -> Vec<Anomaly> {
        let health = &data.health_report;
        let metrics = &data.metrics;

        let health_node = str_field(health, "node_id").unwrap_or(UNKNOWN_NODE);
        let metrics_node = str_field(metrics, "node_id").unwrap_or(health_node);

        let mut anomalies = Vec::new();

        let overall_score = f64_field(health, "overall_score", 1.0);
        if overall_score < HEALTH_SCORE_THRESHOLD {
            let severity = if overall_score < 0.3 {
                Severity::High
            } else {
                Severity::Medium
            };
            anomalies.push(Anomaly::new(
                AnomalyType::NodeUnhealthy,
                severity,
                format!("Node health score is {:.2}", overall_score),
                health_node,
                json!({ "health_score": overall_score }),
            ));
        }

        let checks = health
            .get("checks")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for check in checks {
            if str_field(check, "status") != Some("unhealthy") {
                continue;
            }
            let check_score = f64_field(check, "score", 1.0);
            let message = str_field(check, "message").unwrap_or_default();

            let detected = match str_field(check, "type") {
                Some("connectivity") => Some((
                    AnomalyType::OriginatorLoss,
                    Severity::High,
                    format!("Connectivity check failed: {}", message),
                )),
                Some("gateway") => Some((
                    AnomalyType::NoGateway,
                    Severity::Medium,
                    "No gateway available".to_string(),
                )),
                Some("interface") => Some((
                    AnomalyType::InterfaceDown,
                    Severity::Critical,
                    format!("Interface issue: {}", message),
                )),
                _ => None,
            };

            if let Some((anomaly_type, severity, description)) = detected {
                anomalies.push(Anomaly::new(
                    anomaly_type,
                    severity,
                    description,
                    health_node,
                    json!({ "check_score": check_score }),
                ));
            }
        }

        let latency_ms = f64_field(metrics, "latency_ms", 0.0);
        if latency_ms > LATENCY_THRESHOLD_MS {
            let severity = if latency_ms >= 200.0 {
                Severity::High
            } else {
                Severity::Medium
            };
            anomalies.push(Anomaly::new(
                AnomalyType::HighLatency,
                severity,
                format!("High latency detected: {:.1}ms", latency_ms),
                metrics_node,
                json!({ "latency_ms": latency_ms }),
            ));
        }

        let packet_loss = f64_field(metrics, "packet_loss_percent", 0.0);
        if packet_loss > PACKET_LOSS_THRESHOLD {
            let severity = if packet_loss > 10.0 {
                Severity::High
            } else {
                Severity::Medium
            };
            anomalies.push(Anomaly::new(
                AnomalyType::PacketLoss,
                severity,
                format!("Packet loss detected: {:.1}%", packet_loss),
                metrics_node,
                json!({ "packet_loss_percent": packet_loss }),
            ));
        }

        let link_quality = f64_field(metrics, "avg_link_quality", 1.0);
        if link_quality < LINK_QUALITY_THRESHOLD {
            anomalies.push(Anomaly::new(
                AnomalyType::LinkDegraded,
                Severity::Medium,
                format!("Degraded link quality: {:.2}", link_quality),
                metrics_node,
                json!({ "avg_link_quality": link_quality }),
            ));
        }

        for anomaly in &anomalies {
            warn!(
                "Anomaly {} ({}) on {}: {}",
                anomaly.anomaly_type, anomaly.severity, anomaly.affected_node, anomaly.description
            );
        }
        debug!("Analyze: {} anomalies", anomalies.len());

        self.history.extend(anomalies.iter().cloned());
        anomalies
    }

    /// Last `limit` anomalies, oldest first
    pub fn recent_anomalies(&self, limit: usize) -> Vec<Anomaly> {
        self.history.recent_cloned(limit)
    }

    pub fn history(&self) -> &History<Anomaly> {
        &self.history
    }
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new()
    }
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

fn f64_field(value: &Value, key: &str, default: f64) -> f64 {
    value.get(key).and_then(Value::as_f64).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(health: Value, metrics: Value) -> MonitoringData {
        MonitoringData::new(health, metrics)
    }

    fn types(anomalies: &[Anomaly]) -> Vec<AnomalyType> {
        anomalies.iter().map(|a| a.anomaly_type).collect()
    }

    #[test]
    fn test_node_unhealthy_severity() {
        let mut analyzer = Analyzer::new();

        let found = analyzer.analyze(&data(json!({"overall_score": 0.2}), json!({})));
        assert_eq!(types(&found), vec![AnomalyType::NodeUnhealthy]);
        assert_eq!(found[0].severity, Severity::High);

        let found = analyzer.analyze(&data(json!({"overall_score": 0.4}), json!({})));
        assert_eq!(found[0].severity, Severity::Medium);

        let found = analyzer.analyze(&data(json!({"overall_score": 0.5}), json!({})));
        assert!(found.is_empty());
    }

    #[test]
    fn test_unhealthy_checks_map_to_anomalies() {
        let mut analyzer = Analyzer::new();
        let health = json!({
            "node_id": "node-9",
            "overall_score": 0.9,
            "checks": [
                {"type": "connectivity", "status": "unhealthy", "score": 0.0, "message": "none reachable"},
                {"type": "gateway", "status": "unhealthy", "score": 0.1},
                {"type": "interface", "status": "unhealthy", "score": 0.0, "message": "bat0 down"},
                {"type": "routing", "status": "unhealthy", "score": 0.0},
                {"type": "link_quality", "status": "degraded", "score": 0.6}
            ]
        });

        let found = analyzer.analyze(&data(health, json!({})));
        assert_eq!(
            types(&found),
            vec![
                AnomalyType::OriginatorLoss,
                AnomalyType::NoGateway,
                AnomalyType::InterfaceDown
            ]
        );
        assert_eq!(found[2].severity, Severity::Critical);
        assert_eq!(found[2].description, "Interface issue: bat0 down");
        assert!(found.iter().all(|a| a.affected_node == "node-9"));
    }

    #[test]
    fn test_metric_thresholds() {
        let mut analyzer = Analyzer::new();
        let metrics = json!({
            "node_id": "node-3",
            "latency_ms": 150.0,
            "packet_loss_percent": 12.0,
            "avg_link_quality": 0.3
        });

        let found = analyzer.analyze(&data(json!({}), metrics));
        assert_eq!(
            types(&found),
            vec![
                AnomalyType::HighLatency,
                AnomalyType::PacketLoss,
                AnomalyType::LinkDegraded
            ]
        );
        assert_eq!(found[0].severity, Severity::Medium);
        assert_eq!(found[1].severity, Severity::High);
        assert_eq!(found[0].affected_node, "node-3");
    }

    #[test]
    fn test_latency_severity_boundary() {
        let mut analyzer = Analyzer::new();
        let found = analyzer.analyze(&data(json!({}), json!({"latency_ms": 200.0})));
        assert_eq!(found[0].severity, Severity::High);

        let found = analyzer.analyze(&data(json!({}), json!({"latency_ms": 100.0})));
        assert!(found.is_empty());
    }

    #[test]
    fn test_malformed_input_is_treated_as_healthy() {
        let mut analyzer = Analyzer::new();
        let health = json!({"overall_score": "bad", "checks": "nope"});
        let metrics = json!({"latency_ms": null, "avg_link_quality": [1, 2]});

        assert!(analyzer.analyze(&data(health, metrics)).is_empty());
        assert!(analyzer.analyze(&data(Value::Null, Value::Null)).is_empty());
    }

    #[test]
    fn test_affected_node_falls_back() {
        let mut analyzer = Analyzer::new();
        let found = analyzer.analyze(&data(
            json!({"node_id": "from-health"}),
            json!({"latency_ms": 500.0}),
        ));
        assert_eq!(found[0].affected_node, "from-health");

        let found = analyzer.analyze(&data(json!({}), json!({"latency_ms": 500.0})));
        assert_eq!(found[0].affected_node, "unknown");
    }

    #[test]
    fn test_history_is_capped_to_most_recent() {
        let mut analyzer = Analyzer::new();
        for i in 0..120 {
            let latency = 101.0 + i as f64;
            analyzer.analyze(&data(json!({}), json!({"latency_ms": latency})));
        }

        let history = analyzer.recent_anomalies(usize::MAX);
        assert_eq!(history.len(), ANOMALY_HISTORY_CAPACITY);
        assert_eq!(history[0].metrics["latency_ms"], 121.0);
        assert_eq!(history[99].metrics["latency_ms"], 220.0);
    }
}
