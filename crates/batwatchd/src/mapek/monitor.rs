//! Monitor phase
//!
//! Pulls a health report and a metrics snapshot from the two collaborators
//! and hands them to Analyze as plain JSON.

use async_trait::async_trait;
use batwatch_common::{CheckResult, CheckType, HealthReport, MetricsSnapshot, ProviderError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tracing::debug;

// ============================================================================
// Provider Traits
// ============================================================================

#[async_trait]
pub trait HealthProvider: Send + Sync {
    async fn run_health_checks(&self) -> Result<HealthReport, ProviderError>;

    /// One-time setup before the first cycle
    async fn initialize(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

#[async_trait]
pub trait MetricsProvider: Send + Sync {
    async fn collect(&self) -> Result<MetricsSnapshot, ProviderError>;

    async fn initialize(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

// ============================================================================
// Monitor
// ============================================================================

/// Output of the Monitor phase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringData {
    pub health_report: serde_json::Value,
    pub metrics: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl MonitoringData {
    pub fn new(health_report: serde_json::Value, metrics: serde_json::Value) -> Self {
        Self {
            health_report,
            metrics,
            timestamp: Utc::now(),
        }
    }

    /// Overall health score, 1.0 when absent
    pub fn overall_score(&self) -> f64 {
        self.health_report
            .get("overall_score")
            .and_then(|v| v.as_f64())
            .unwrap_or(1.0)
    }
}

pub struct Monitor {
    health: Arc<dyn HealthProvider>,
    metrics: Arc<dyn MetricsProvider>,
    last_health_report: RwLock<Option<HealthReport>>,
    last_metrics: RwLock<Option<MetricsSnapshot>>,
}

impl Monitor {
    pub fn new(health: Arc<dyn HealthProvider>, metrics: Arc<dyn MetricsProvider>) -> Self {
        Self {
            health,
            metrics,
            last_health_report: RwLock::new(None),
            last_metrics: RwLock::new(None),
        }
    }

    pub async fn initialize(&self) -> Result<(), ProviderError> {
        self.health.initialize().await?;
        self.metrics.initialize().await?;
        Ok(())
    }

    pub async fn monitor(&self) -> Result<MonitoringData, ProviderError> {
        let report = self.health.run_health_checks().await?;
        let snapshot = self.metrics.collect().await?;
        debug!(
            "Monitor: {} score={:.2} originators={}",
            report.node_id, report.overall_score, snapshot.originators_count
        );

        let data = MonitoringData::new(report.to_value(), snapshot.to_value());
        *self.last_health_report.write().await = Some(report);
        *self.last_metrics.write().await = Some(snapshot);
        Ok(data)
    }

    pub async fn last_health_report(&self) -> Option<HealthReport> {
        self.last_health_report.read().await.clone()
    }

    pub async fn last_metrics(&self) -> Option<MetricsSnapshot> {
        self.last_metrics.read().await.clone()
    }
}

// ============================================================================
// Static Providers (Testing)
// ============================================================================

/// Returns whatever report it currently holds
#[derive(Clone)]
pub struct StaticHealthProvider {
    report: Arc<Mutex<HealthReport>>,
}

impl StaticHealthProvider {
    pub fn new(report: HealthReport) -> Self {
        Self {
            report: Arc::new(Mutex::new(report)),
        }
    }

    /// Every check passing with a full score
    pub fn healthy(node_id: &str) -> Self {
        let checks = CheckType::ALL
            .iter()
            .map(|check| CheckResult::scored(*check, 1.0, "ok"))
            .collect();
        Self::new(HealthReport::from_checks(node_id, checks))
    }

    /// Replace the report returned by subsequent calls
    pub fn set(&self, report: HealthReport) {
        *self.report.lock().unwrap_or_else(|e| e.into_inner()) = report;
    }
}

#[async_trait]
impl HealthProvider for StaticHealthProvider {
    async fn run_health_checks(&self) -> Result<HealthReport, ProviderError> {
        let report = self.report.lock().unwrap_or_else(|e| e.into_inner()).clone();
        Ok(report)
    }
}

#[derive(Clone)]
pub struct StaticMetricsProvider {
    snapshot: Arc<Mutex<MetricsSnapshot>>,
}

impl StaticMetricsProvider {
    pub fn new(snapshot: MetricsSnapshot) -> Self {
        Self {
            snapshot: Arc::new(Mutex::new(snapshot)),
        }
    }

    /// Well-connected node with no performance issues
    pub fn healthy(node_id: &str) -> Self {
        let mut snapshot = MetricsSnapshot::for_node(node_id);
        snapshot.set_link_qualities(&[0.9, 0.95]);
        snapshot.interface_up = true;
        Self::new(snapshot)
    }

    pub fn set(&self, snapshot: MetricsSnapshot) {
        *self.snapshot.lock().unwrap_or_else(|e| e.into_inner()) = snapshot;
    }
}

#[async_trait]
impl MetricsProvider for StaticMetricsProvider {
    async fn collect(&self) -> Result<MetricsSnapshot, ProviderError> {
        let snapshot = self.snapshot.lock().unwrap_or_else(|e| e.into_inner()).clone();
        Ok(snapshot)
    }
}

/// Provider whose every call fails
#[derive(Debug, Clone)]
pub struct FailingProvider {
    message: String,
}

impl FailingProvider {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl HealthProvider for FailingProvider {
    async fn run_health_checks(&self) -> Result<HealthReport, ProviderError> {
        Err(ProviderError::Health(self.message.clone()))
    }
}

#[async_trait]
impl MetricsProvider for FailingProvider {
    async fn collect(&self) -> Result<MetricsSnapshot, ProviderError> {
        Err(ProviderError::Metrics(self.message.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use batwatch_common::{CheckResult, CheckType};

    fn healthy_report() -> HealthReport {
        HealthReport::from_checks(
            "node-1",
            vec![CheckResult::scored(CheckType::Interface, 1.0, "up")],
        )
    }

    #[tokio::test]
    async fn test_monitor_assembles_data_and_remembers_last() {
        let monitor = Monitor::new(
            Arc::new(StaticHealthProvider::new(healthy_report())),
            Arc::new(StaticMetricsProvider::new(MetricsSnapshot::for_node("node-1"))),
        );
        assert!(monitor.last_health_report().await.is_none());

        let data = monitor.monitor().await.unwrap();
        assert_eq!(data.health_report["node_id"], "node-1");
        assert_eq!(data.metrics["node_id"], "node-1");
        assert_eq!(data.overall_score(), 1.0);
        assert!(monitor.last_health_report().await.is_some());
        assert!(monitor.last_metrics().await.is_some());
    }

    #[tokio::test]
    async fn test_monitor_propagates_provider_failure() {
        let monitor = Monitor::new(
            Arc::new(FailingProvider::new("batctl exploded")),
            Arc::new(StaticMetricsProvider::new(MetricsSnapshot::default())),
        );
        let err = monitor.monitor().await.unwrap_err();
        assert_eq!(err, ProviderError::Health("batctl exploded".to_string()));
        assert!(monitor.last_health_report().await.is_none());
    }

    #[test]
    fn test_overall_score_defaults_to_healthy() {
        let data = MonitoringData::new(serde_json::json!({}), serde_json::json!({}));
        assert_eq!(data.overall_score(), 1.0);
    }
}
