//! Value types passed between the MAPE-K phases

use batwatch_common::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Anomalies
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    NodeUnhealthy,
    LinkDegraded,
    NoGateway,
    HighLatency,
    PacketLoss,
    RoutingLoop,
    OriginatorLoss,
    InterfaceDown,
}

impl AnomalyType {
    pub const ALL: [AnomalyType; 8] = [
        AnomalyType::NodeUnhealthy,
        AnomalyType::LinkDegraded,
        AnomalyType::NoGateway,
        AnomalyType::HighLatency,
        AnomalyType::PacketLoss,
        AnomalyType::RoutingLoop,
        AnomalyType::OriginatorLoss,
        AnomalyType::InterfaceDown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyType::NodeUnhealthy => "node_unhealthy",
            AnomalyType::LinkDegraded => "link_degraded",
            AnomalyType::NoGateway => "no_gateway",
            AnomalyType::HighLatency => "high_latency",
            AnomalyType::PacketLoss => "packet_loss",
            AnomalyType::RoutingLoop => "routing_loop",
            AnomalyType::OriginatorLoss => "originator_loss",
            AnomalyType::InterfaceDown => "interface_down",
        }
    }
}

impl fmt::Display for AnomalyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnomalyType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AnomalyType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownAnomaly(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A detected deviation. Never mutated after the analyzer creates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    #[serde(rename = "type")]
    pub anomaly_type: AnomalyType,
    pub severity: Severity,
    pub description: String,
    pub affected_node: String,
    pub timestamp: DateTime<Utc>,
    /// Observed values that triggered the detection
    pub metrics: serde_json::Value,
}

impl Anomaly {
    pub fn new(
        anomaly_type: AnomalyType,
        severity: Severity,
        description: impl Into<String>,
        affected_node: impl Into<String>,
        metrics: serde_json::Value,
    ) -> Self {
        Self {
            anomaly_type,
            severity,
            description: description.into(),
            affected_node: affected_node.into(),
            timestamp: Utc::now(),
            metrics,
        }
    }
}

// ============================================================================
// Recovery actions and plans
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    RestartInterface,
    ReselectGateway,
    PurgeOriginators,
    AdjustRouting,
    IsolateNode,
    ReconfigureLink,
    RestartDaemon,
    Escalate,
}

impl RecoveryAction {
    pub const ALL: [RecoveryAction; 8] = [
        RecoveryAction::RestartInterface,
        RecoveryAction::ReselectGateway,
        RecoveryAction::PurgeOriginators,
        RecoveryAction::AdjustRouting,
        RecoveryAction::IsolateNode,
        RecoveryAction::ReconfigureLink,
        RecoveryAction::RestartDaemon,
        RecoveryAction::Escalate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryAction::RestartInterface => "restart_interface",
            RecoveryAction::ReselectGateway => "reselect_gateway",
            RecoveryAction::PurgeOriginators => "purge_originators",
            RecoveryAction::AdjustRouting => "adjust_routing",
            RecoveryAction::IsolateNode => "isolate_node",
            RecoveryAction::ReconfigureLink => "reconfigure_link",
            RecoveryAction::RestartDaemon => "restart_daemon",
            RecoveryAction::Escalate => "escalate",
        }
    }
}

impl fmt::Display for RecoveryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecoveryAction {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RecoveryAction::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownAction(s.to_string()))
    }
}

/// Ordered remediation for a batch of anomalies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryPlan {
    pub plan_id: String,
    pub anomalies: Vec<Anomaly>,
    pub actions: Vec<RecoveryAction>,
    /// 1 = most urgent, 5 = least
    pub priority: u8,
    pub estimated_duration_secs: f64,
    pub created_at: DateTime<Utc>,
}

impl RecoveryPlan {
    /// One-line description for logs and escalation reports
    pub fn summary(&self) -> String {
        let actions: Vec<&str> = self.actions.iter().map(|a| a.as_str()).collect();
        let anomalies: Vec<&str> = self
            .anomalies
            .iter()
            .map(|a| a.anomaly_type.as_str())
            .collect();
        format!(
            "{} (priority {}): [{}] for [{}]",
            self.plan_id,
            self.priority,
            actions.join(", "),
            anomalies.join(", ")
        )
    }
}

// ============================================================================
// Execution
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Success,
    /// Handed to an operator rather than fixed locally
    Escalated,
}

/// What a handler reports back on success
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionReport {
    pub status: ActionStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ActionReport {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: ActionStatus::Success,
            message: message.into(),
            details: None,
        }
    }

    pub fn escalated(message: impl Into<String>, details: serde_json::Value) -> Self {
        Self {
            status: ActionStatus::Escalated,
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutedAction {
    pub action: RecoveryAction,
    pub result: ActionReport,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedAction {
    pub action: RecoveryAction,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub plan_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub actions_executed: Vec<ExecutedAction>,
    pub actions_failed: Vec<FailedAction>,
    /// False as soon as one action failed
    pub success: bool,
}
