//! MAPE-K loop orchestration
//!
//! One `MapekLoop` per monitored node. `run_cycle` always returns a
//! `CycleResult`; failures inside a cycle become `CycleOutcome::Failure` and
//! the scheduling loop in `start` carries on regardless.

use super::analyzer::Analyzer;
use super::executor::Executor;
use super::knowledge::{KnowledgeStats, KnowledgeStore};
use super::monitor::{HealthProvider, MetricsProvider, Monitor, MonitoringData};
use super::planner::Planner;
use super::types::{Anomaly, ExecutionResult, RecoveryPlan};
use crate::config::{CommandConfig, Config};
use crate::runner::CommandRunner;
use crate::telemetry::LoopMetrics;
use batwatch_common::{HealthReport, InterfaceName, ProviderError, ValidationError};
use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{watch, Mutex, RwLock, RwLockReadGuard};
use tracing::{debug, error, info, warn};

// ============================================================================
// Configuration and results
// ============================================================================

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub node_id: String,
    pub interface: InterfaceName,
    pub cycle_interval: Duration,
    pub auto_heal: bool,
    pub daemon_unit: String,
    pub commands: CommandConfig,
}

impl LoopConfig {
    pub fn new(node_id: impl Into<String>, interface: &str) -> Result<Self, ValidationError> {
        Ok(Self {
            node_id: node_id.into(),
            interface: InterfaceName::new(interface)?,
            cycle_interval: Duration::from_secs(30),
            auto_heal: true,
            daemon_unit: "batman-adv".to_string(),
            commands: CommandConfig::default(),
        })
    }
}

impl From<&Config> for LoopConfig {
    fn from(config: &Config) -> Self {
        Self {
            node_id: config.node_id.clone(),
            interface: config.interface.clone(),
            cycle_interval: config.cycle_interval(),
            auto_heal: config.auto_heal,
            daemon_unit: config.daemon_unit.clone(),
            commands: config.commands.clone(),
        }
    }
}

/// Errors that end a cycle early
#[derive(Error, Debug)]
pub enum CycleError {
    #[error("monitor phase failed: {0}")]
    Monitor(#[from] ProviderError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Success,
    Failure { error: String },
}

// Flattened into the cycle result as `success` plus an optional `error`.
impl Serialize for CycleOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        match self {
            CycleOutcome::Success => map.serialize_entry("success", &true)?,
            CycleOutcome::Failure { error } => {
                map.serialize_entry("success", &false)?;
                map.serialize_entry("error", error)?;
            }
        }
        map.end()
    }
}

/// Record of a single Monitor → Analyze → Plan → Execute → Knowledge pass
#[derive(Debug, Clone, Serialize)]
pub struct CycleResult {
    pub cycle_id: u64,
    pub node_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub monitoring: Option<MonitoringData>,
    pub anomalies: Vec<Anomaly>,
    pub anomalies_count: usize,
    pub plan: Option<RecoveryPlan>,
    pub execution: Option<ExecutionResult>,
    #[serde(flatten)]
    pub outcome: CycleOutcome,
    pub duration_seconds: f64,
}

impl CycleResult {
    fn begin(cycle_id: u64, node_id: &str) -> Self {
        let now = Utc::now();
        Self {
            cycle_id,
            node_id: node_id.to_string(),
            started_at: now,
            completed_at: now,
            monitoring: None,
            anomalies: Vec::new(),
            anomalies_count: 0,
            plan: None,
            execution: None,
            outcome: CycleOutcome::Success,
            duration_seconds: 0.0,
        }
    }

    pub fn success(&self) -> bool {
        self.outcome == CycleOutcome::Success
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            CycleOutcome::Success => None,
            CycleOutcome::Failure { error } => Some(error),
        }
    }

    /// Overall health score seen by Monitor, if it got that far
    pub fn health_score(&self) -> Option<f64> {
        self.monitoring.as_ref().map(MonitoringData::overall_score)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoopStatus {
    pub node_id: String,
    pub interface: String,
    pub running: bool,
    pub cycle_count: u64,
    pub auto_heal: bool,
    pub last_health_report: Option<HealthReport>,
    pub knowledge_stats: KnowledgeStats,
}

// ============================================================================
// Loop
// ============================================================================

/// Phases whose state only changes inside a cycle
struct Phases {
    analyzer: Analyzer,
    planner: Planner,
    executor: Executor,
}

pub struct MapekLoop {
    config: LoopConfig,
    monitor: Monitor,
    phases: Mutex<Phases>,
    knowledge: RwLock<KnowledgeStore>,
    cycle_count: AtomicU64,
    running: watch::Sender<bool>,
    metrics: Option<LoopMetrics>,
}

impl MapekLoop {
    pub fn new(
        config: LoopConfig,
        health: Arc<dyn HealthProvider>,
        metrics: Arc<dyn MetricsProvider>,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<Self, ValidationError> {
        if config.cycle_interval.is_zero() {
            return Err(ValidationError::Config(
                "cycle interval must be greater than zero".to_string(),
            ));
        }

        let executor = Executor::new(config.interface.as_str(), runner)?
            .with_commands(config.commands.clone())
            .with_daemon_unit(config.daemon_unit.clone());
        let (running, _) = watch::channel(false);

        Ok(Self {
            monitor: Monitor::new(health, metrics),
            phases: Mutex::new(Phases {
                analyzer: Analyzer::new(),
                planner: Planner::new(),
                executor,
            }),
            knowledge: RwLock::new(KnowledgeStore::new()),
            cycle_count: AtomicU64::new(0),
            running,
            metrics: None,
            config,
        })
    }

    pub fn with_metrics(mut self, metrics: LoopMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    pub fn node_id(&self) -> &str {
        &self.config.node_id
    }

    /// Prime the monitoring collaborators
    pub async fn initialize(&self) -> Result<(), CycleError> {
        self.monitor.initialize().await?;
        info!(
            "MAPE-K loop initialized for {} on {}",
            self.config.node_id, self.config.interface
        );
        Ok(())
    }

    /// Run cycles until `stop` is called.
    ///
    /// Returns immediately if the loop is already running.
    pub async fn start(&self) {
        if self.running.send_replace(true) {
            warn!("MAPE-K loop for {} is already running", self.config.node_id);
            return;
        }
        let mut stop_rx = self.running.subscribe();
        info!(
            "MAPE-K loop started for {} (interval {:?}, auto_heal={})",
            self.config.node_id, self.config.cycle_interval, self.config.auto_heal
        );

        loop {
            if !*stop_rx.borrow_and_update() {
                break;
            }

            tokio::select! {
                _ = self.run_cycle() => {}
                _ = stop_requested(&mut stop_rx) => break,
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.cycle_interval) => {}
                _ = stop_requested(&mut stop_rx) => break,
            }
        }

        self.running.send_replace(false);
        info!("MAPE-K loop stopped for {}", self.config.node_id);
    }

    pub fn stop(&self) {
        if self.running.send_replace(false) {
            info!("Stopping MAPE-K loop for {}", self.config.node_id);
        }
    }

    pub fn is_running(&self) -> bool {
        *self.running.borrow()
    }

    pub fn cycle_count(&self) -> u64 {
        self.cycle_count.load(Ordering::SeqCst)
    }

    /// One full pass. Never fails; errors end up in the result's outcome.
    pub async fn run_cycle(&self) -> CycleResult {
        let mut phases = self.phases.lock().await;

        let cycle_id = self.cycle_count.fetch_add(1, Ordering::SeqCst) + 1;
        let timer = Instant::now();
        let mut result = CycleResult::begin(cycle_id, &self.config.node_id);
        debug!("Cycle {} started for {}", cycle_id, self.config.node_id);

        if let Err(e) = self.run_phases(&mut phases, &mut result).await {
            error!("Cycle {} failed: {}", cycle_id, e);
            result.outcome = CycleOutcome::Failure {
                error: e.to_string(),
            };
        }

        result.completed_at = Utc::now();
        result.duration_seconds = timer.elapsed().as_secs_f64();

        if let Some(metrics) = &self.metrics {
            metrics.observe_cycle(&result);
        }
        info!(
            "Cycle {} completed: {} anomalies in {:.3}s",
            cycle_id, result.anomalies_count, result.duration_seconds
        );
        result
    }

    async fn run_phases(
        &self,
        phases: &mut Phases,
        result: &mut CycleResult,
    ) -> Result<(), CycleError> {
        // Monitor
        let monitoring = self.monitor.monitor().await?;
        let health_score = monitoring.overall_score();

        // Analyze
        let anomalies = phases.analyzer.analyze(&monitoring);
        result.monitoring = Some(monitoring);
        result.anomalies_count = anomalies.len();

        if !anomalies.is_empty() {
            // Plan
            let plan = phases.planner.plan(anomalies.clone());

            // Execute + Knowledge
            if self.config.auto_heal {
                let execution = phases.executor.execute(&plan).await;
                self.knowledge
                    .write()
                    .await
                    .record_incident(&anomalies, &plan, &execution);
                result.execution = Some(execution);
            } else {
                info!("auto_heal disabled, not executing {}", plan.summary());
            }
            result.plan = Some(plan);
        }
        result.anomalies = anomalies;

        self.knowledge
            .write()
            .await
            .record_health_trend(&self.config.node_id, health_score);
        Ok(())
    }

    pub async fn status(&self) -> LoopStatus {
        let knowledge_stats = self.knowledge.read().await.stats();
        LoopStatus {
            node_id: self.config.node_id.clone(),
            interface: self.config.interface.to_string(),
            running: self.is_running(),
            cycle_count: self.cycle_count(),
            auto_heal: self.config.auto_heal,
            last_health_report: self.monitor.last_health_report().await,
            knowledge_stats,
        }
    }

    /// Read access to what the loop has learned
    pub async fn knowledge(&self) -> RwLockReadGuard<'_, KnowledgeStore> {
        self.knowledge.read().await
    }

    pub async fn last_health_report(&self) -> Option<HealthReport> {
        self.monitor.last_health_report().await
    }

    pub async fn recent_anomalies(&self, limit: usize) -> Vec<Anomaly> {
        self.phases.lock().await.analyzer.recent_anomalies(limit)
    }

    pub async fn recent_plans(&self, limit: usize) -> Vec<RecoveryPlan> {
        self.phases.lock().await.planner.recent_plans(limit)
    }

    pub async fn recent_executions(&self, limit: usize) -> Vec<ExecutionResult> {
        self.phases.lock().await.executor.recent_executions(limit)
    }
}

/// Resolves once the running flag drops to false
async fn stop_requested(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|running| !*running).await;
}
