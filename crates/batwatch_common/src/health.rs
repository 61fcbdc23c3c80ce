//! Node health reports
//!
//! A report is built once per monitoring cycle from the individual check
//! results and is not modified afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Score at or above which a node counts as healthy
pub const HEALTHY_THRESHOLD: f64 = 0.8;
/// Score at or above which a node counts as degraded rather than unhealthy
pub const DEGRADED_THRESHOLD: f64 = 0.5;

/// Health status levels for batman-adv nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Unknown,
}

impl HealthStatus {
    /// Map a 0.0-1.0 score onto a status
    pub fn from_score(score: f64) -> Self {
        if score >= HEALTHY_THRESHOLD {
            HealthStatus::Healthy
        } else if score >= DEGRADED_THRESHOLD {
            HealthStatus::Degraded
        } else {
            HealthStatus::Unhealthy
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Unknown => "unknown",
        }
    }
}

/// Kinds of health check run against a mesh node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckType {
    Connectivity,
    LinkQuality,
    OriginatorTable,
    Gateway,
    Interface,
    Routing,
}

impl CheckType {
    pub const ALL: [CheckType; 6] = [
        CheckType::Connectivity,
        CheckType::LinkQuality,
        CheckType::OriginatorTable,
        CheckType::Gateway,
        CheckType::Interface,
        CheckType::Routing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckType::Connectivity => "connectivity",
            CheckType::LinkQuality => "link_quality",
            CheckType::OriginatorTable => "originator_table",
            CheckType::Gateway => "gateway",
            CheckType::Interface => "interface",
            CheckType::Routing => "routing",
        }
    }

    /// Weight of this check in the overall score
    pub fn weight(&self) -> f64 {
        match self {
            CheckType::Connectivity => 2.0,
            CheckType::LinkQuality => 1.5,
            CheckType::OriginatorTable => 1.0,
            CheckType::Gateway => 1.0,
            CheckType::Interface => 1.5,
            CheckType::Routing => 1.0,
        }
    }

    fn recommendation(&self) -> &'static str {
        match self {
            CheckType::Connectivity => "Check network connectivity and interface status",
            CheckType::LinkQuality => {
                "Investigate link quality issues - consider node repositioning"
            }
            CheckType::OriginatorTable => "Verify batman-adv daemon is running correctly",
            CheckType::Gateway => "Check gateway connectivity or select alternative gateway",
            CheckType::Interface => "Verify batman-adv interface configuration",
            CheckType::Routing => "Check routing table and originator entries",
        }
    }
}

/// Result of a single health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    #[serde(rename = "type")]
    pub check_type: CheckType,
    pub status: HealthStatus,
    /// 0.0 - 1.0
    pub score: f64,
    pub message: String,
    #[serde(default)]
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub duration_ms: f64,
}

impl CheckResult {
    pub fn new(
        check_type: CheckType,
        status: HealthStatus,
        score: f64,
        message: impl Into<String>,
    ) -> Self {
        Self {
            check_type,
            status,
            score: score.clamp(0.0, 1.0),
            message: message.into(),
            details: serde_json::Value::Null,
            timestamp: Utc::now(),
            duration_ms: 0.0,
        }
    }

    /// Check whose status follows from its score
    pub fn scored(check_type: CheckType, score: f64, message: impl Into<String>) -> Self {
        Self::new(check_type, HealthStatus::from_score(score), score, message)
    }

    /// Check that could not be evaluated
    pub fn unknown(check_type: CheckType, score: f64, message: impl Into<String>) -> Self {
        Self::new(check_type, HealthStatus::Unknown, score, message)
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: f64) -> Self {
        self.duration_ms = duration_ms;
        self
    }
}

/// Complete health report for a node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub node_id: String,
    pub overall_status: HealthStatus,
    pub overall_score: f64,
    pub checks: Vec<CheckResult>,
    pub recommendations: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl HealthReport {
    /// Build a report, deriving score, status and recommendations from the checks
    pub fn from_checks(node_id: impl Into<String>, checks: Vec<CheckResult>) -> Self {
        let overall_score = overall_score(&checks);
        let recommendations = recommendations(&checks);

        Self {
            node_id: node_id.into(),
            overall_status: HealthStatus::from_score(overall_score),
            overall_score,
            checks,
            recommendations,
            timestamp: Utc::now(),
        }
    }

    pub fn check(&self, check_type: CheckType) -> Option<&CheckResult> {
        self.checks.iter().find(|c| c.check_type == check_type)
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Weighted mean of the check scores; 0.0 with no checks
pub fn overall_score(checks: &[CheckResult]) -> f64 {
    let (weighted, total_weight) = checks.iter().fold((0.0, 0.0), |(sum, weight), check| {
        let w = check.check_type.weight();
        (sum + check.score * w, weight + w)
    });

    if total_weight > 0.0 {
        weighted / total_weight
    } else {
        0.0
    }
}

fn recommendations(checks: &[CheckResult]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for check in checks.iter().filter(|c| c.status == HealthStatus::Unhealthy) {
        let text = check.check_type.recommendation();
        if !out.iter().any(|r| r == text) {
            out.push(text.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_status_thresholds() {
        assert_eq!(HealthStatus::from_score(1.0), HealthStatus::Healthy);
        assert_eq!(HealthStatus::from_score(0.8), HealthStatus::Healthy);
        assert_eq!(HealthStatus::from_score(0.79), HealthStatus::Degraded);
        assert_eq!(HealthStatus::from_score(0.5), HealthStatus::Degraded);
        assert_eq!(HealthStatus::from_score(0.49), HealthStatus::Unhealthy);
    }

    #[test]
    fn test_weighted_overall_score() {
        let checks = vec![
            CheckResult::scored(CheckType::Connectivity, 1.0, "ok"),
            CheckResult::scored(CheckType::Gateway, 0.0, "no gateway"),
        ];
        // (1.0 * 2.0 + 0.0 * 1.0) / 3.0
        assert_relative_eq!(overall_score(&checks), 2.0 / 3.0);
        assert_eq!(overall_score(&[]), 0.0);
    }

    #[test]
    fn test_report_from_checks() {
        let checks = vec![
            CheckResult::scored(CheckType::Interface, 0.0, "bat0 missing"),
            CheckResult::scored(CheckType::Routing, 0.0, "empty"),
            CheckResult::scored(CheckType::Connectivity, 0.0, "no originators"),
        ];
        let report = HealthReport::from_checks("node-001", checks);

        assert_eq!(report.overall_status, HealthStatus::Unhealthy);
        assert_eq!(report.recommendations.len(), 3);
        assert_eq!(
            report.recommendations[0],
            "Verify batman-adv interface configuration"
        );
    }

    #[test]
    fn test_recommendations_are_deduplicated() {
        let checks = vec![
            CheckResult::scored(CheckType::Gateway, 0.1, "a"),
            CheckResult::scored(CheckType::Gateway, 0.2, "b"),
            CheckResult::scored(CheckType::Gateway, 0.9, "c"),
        ];
        let report = HealthReport::from_checks("n", checks);
        assert_eq!(report.recommendations.len(), 1);
    }

    #[test]
    fn test_serialized_shape() {
        let report = HealthReport::from_checks(
            "node-7",
            vec![CheckResult::scored(CheckType::LinkQuality, 0.3, "poor")],
        );
        let value = report.to_value();

        assert_eq!(value["node_id"], "node-7");
        assert_eq!(value["overall_status"], "unhealthy");
        assert_eq!(value["checks"][0]["type"], "link_quality");
        assert_eq!(value["checks"][0]["status"], "unhealthy");
    }

    #[test]
    fn test_score_is_clamped() {
        let check = CheckResult::scored(CheckType::Routing, 1.7, "too good");
        assert_eq!(check.score, 1.0);
    }
}
