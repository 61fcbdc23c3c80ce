//! Knowledge phase: incident history and learned action success rates
//!
//! Only the owning loop writes here. Readers go through the loop's
//! `RwLock`, so status queries never observe a half-evicted buffer.

use super::types::{Anomaly, AnomalyType, ExecutionResult, RecoveryAction, RecoveryPlan};
use batwatch_common::History;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;
use uuid::Uuid;

pub const INCIDENT_HISTORY_CAPACITY: usize = 100;
pub const HEALTH_TREND_CAPACITY: usize = 100;

/// Success rate reported for an action with no recorded attempts
pub const NEUTRAL_SUCCESS_RATE: f64 = 0.5;

/// Difference in half-window means that counts as a trend
pub const TREND_DELTA: f64 = 0.1;

pub const DEFAULT_TREND_WINDOW: usize = 10;

/// Actions worth trying for each anomaly type, in preference order
pub fn candidate_actions(anomaly_type: AnomalyType) -> &'static [RecoveryAction] {
    use RecoveryAction::*;
    match anomaly_type {
        AnomalyType::InterfaceDown => &[RestartInterface, RestartDaemon],
        AnomalyType::NodeUnhealthy => &[RestartDaemon, PurgeOriginators],
        AnomalyType::NoGateway => &[ReselectGateway],
        AnomalyType::LinkDegraded => &[ReconfigureLink, AdjustRouting],
        AnomalyType::HighLatency => &[AdjustRouting, ReselectGateway],
        AnomalyType::PacketLoss => &[PurgeOriginators, ReconfigureLink],
        AnomalyType::RoutingLoop | AnomalyType::OriginatorLoss => &[],
    }
}

/// One handled problem: what was seen, what was planned, what happened
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub incident_id: Uuid,
    pub recorded_at: DateTime<Utc>,
    pub anomalies: Vec<Anomaly>,
    pub plan: RecoveryPlan,
    pub execution: ExecutionResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Improving,
    Declining,
    Stable,
    InsufficientData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthTrend {
    pub trend: TrendDirection,
    pub samples: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl HealthTrend {
    fn insufficient(samples: usize) -> Self {
        Self {
            trend: TrendDirection::InsufficientData,
            samples,
            avg: None,
            min: None,
            max: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeStats {
    pub incidents_recorded: usize,
    /// Only actions that were attempted at least once
    pub action_success_rates: BTreeMap<String, f64>,
}

pub struct KnowledgeStore {
    incidents: History<Incident>,
    action_successes: HashMap<RecoveryAction, u64>,
    action_failures: HashMap<RecoveryAction, u64>,
    health_trends: HashMap<String, History<f64>>,
}

impl KnowledgeStore {
    pub fn new() -> Self {
        Self {
            incidents: History::with_capacity(INCIDENT_HISTORY_CAPACITY),
            action_successes: HashMap::new(),
            action_failures: HashMap::new(),
            health_trends: HashMap::new(),
        }
    }

    pub fn record_incident(
        &mut self,
        anomalies: &[Anomaly],
        plan: &RecoveryPlan,
        execution: &ExecutionResult,
    ) {
        for executed in &execution.actions_executed {
            *self.action_successes.entry(executed.action).or_insert(0) += 1;
        }
        for failed in &execution.actions_failed {
            *self.action_failures.entry(failed.action).or_insert(0) += 1;
        }

        self.incidents.push(Incident {
            incident_id: Uuid::new_v4(),
            recorded_at: Utc::now(),
            anomalies: anomalies.to_vec(),
            plan: plan.clone(),
            execution: execution.clone(),
        });
        debug!(
            "Knowledge: recorded incident for {} ({} incidents)",
            plan.plan_id,
            self.incidents.len()
        );
    }

    pub fn record_health_trend(&mut self, node_id: &str, score: f64) {
        self.health_trends
            .entry(node_id.to_string())
            .or_insert_with(|| History::with_capacity(HEALTH_TREND_CAPACITY))
            .push(score);
    }

    pub fn get_action_success_rate(&self, action: RecoveryAction) -> f64 {
        let successes = self.action_successes.get(&action).copied().unwrap_or(0);
        let failures = self.action_failures.get(&action).copied().unwrap_or(0);
        let attempts = successes + failures;

        if attempts == 0 {
            NEUTRAL_SUCCESS_RATE
        } else {
            successes as f64 / attempts as f64
        }
    }

    /// Candidate with the best track record; earlier candidates win ties
    pub fn get_best_action_for_anomaly(&self, anomaly_type: AnomalyType) -> Option<RecoveryAction> {
        let mut best: Option<(RecoveryAction, f64)> = None;
        for &action in candidate_actions(anomaly_type) {
            let rate = self.get_action_success_rate(action);
            if best.map_or(true, |(_, best_rate)| rate > best_rate) {
                best = Some((action, rate));
            }
        }
        best.map(|(action, _)| action)
    }

    /// Compare the two halves of the last `window` scores for `node_id`
    pub fn get_health_trend(&self, node_id: &str, window: usize) -> HealthTrend {
        let scores: Vec<f64> = self
            .health_trends
            .get(node_id)
            .map(|h| h.recent_cloned(window))
            .unwrap_or_default();

        if scores.len() < 2 {
            return HealthTrend::insufficient(scores.len());
        }

        let (first, second) = scores.split_at(scores.len() / 2);
        let delta = mean(second) - mean(first);
        let trend = if delta > TREND_DELTA {
            TrendDirection::Improving
        } else if delta < -TREND_DELTA {
            TrendDirection::Declining
        } else {
            TrendDirection::Stable
        };

        HealthTrend {
            trend,
            samples: scores.len(),
            avg: Some(mean(&scores)),
            min: scores.iter().copied().reduce(f64::min),
            max: scores.iter().copied().reduce(f64::max),
        }
    }

    pub fn recent_incidents(&self, limit: usize) -> Vec<Incident> {
        self.incidents.recent_cloned(limit)
    }

    pub fn stats(&self) -> KnowledgeStats {
        let mut attempted: Vec<RecoveryAction> = self
            .action_successes
            .keys()
            .chain(self.action_failures.keys())
            .copied()
            .collect();
        attempted.sort();
        attempted.dedup();

        KnowledgeStats {
            incidents_recorded: self.incidents.len(),
            action_success_rates: attempted
                .into_iter()
                .map(|a| (a.as_str().to_string(), self.get_action_success_rate(a)))
                .collect(),
        }
    }
}

impl Default for KnowledgeStore {
    fn default() -> Self {
        Self::new()
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}
