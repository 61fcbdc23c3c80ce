//! MAPE-K self-healing loop
//!
//! Monitor → Analyze → Plan → Execute → Knowledge, one loop per mesh node.
//!
//! - `monitor`: collects health and metrics through provider traits
//! - `analyzer`: threshold rules producing typed anomalies
//! - `planner`: anomaly → recovery action table with priorities
//! - `executor`: runs recovery actions through a `CommandRunner`
//! - `knowledge`: incident history, action success rates, health trends
//! - `cycle`: the orchestrating `MapekLoop`

pub mod analyzer;
pub mod cycle;
pub mod executor;
pub mod knowledge;
pub mod monitor;
pub mod planner;
pub mod types;

pub use analyzer::Analyzer;
pub use cycle::{CycleError, CycleOutcome, CycleResult, LoopConfig, LoopStatus, MapekLoop};
pub use executor::Executor;
pub use knowledge::{HealthTrend, Incident, KnowledgeStats, KnowledgeStore, TrendDirection};
pub use monitor::{HealthProvider, MetricsProvider, Monitor, MonitoringData};
pub use planner::Planner;
pub use types::{
    ActionReport, ActionStatus, Anomaly, AnomalyType, ExecutionResult, RecoveryAction,
    RecoveryPlan, Severity,
};
