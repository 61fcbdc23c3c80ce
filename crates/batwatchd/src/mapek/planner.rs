//! Plan phase: anomaly types to an ordered, deduplicated action list

use super::types::{Anomaly, AnomalyType, RecoveryAction, RecoveryPlan};
use batwatch_common::History;
use chrono::Utc;
use tracing::debug;

pub const PLAN_HISTORY_CAPACITY: usize = 50;

/// Priority given to a plan that only escalates
pub const DEFAULT_PRIORITY: u8 = 5;

/// Seconds budgeted per action
const SECONDS_PER_ACTION: f64 = 5.0;

/// Remediation and urgency for each anomaly type
pub fn recovery_for(anomaly_type: AnomalyType) -> Option<(RecoveryAction, u8)> {
    match anomaly_type {
        AnomalyType::InterfaceDown => Some((RecoveryAction::RestartInterface, 1)),
        AnomalyType::NodeUnhealthy => Some((RecoveryAction::RestartDaemon, 2)),
        AnomalyType::OriginatorLoss => Some((RecoveryAction::PurgeOriginators, 2)),
        AnomalyType::RoutingLoop => Some((RecoveryAction::AdjustRouting, 2)),
        AnomalyType::NoGateway => Some((RecoveryAction::ReselectGateway, 3)),
        AnomalyType::LinkDegraded => Some((RecoveryAction::ReconfigureLink, 3)),
        AnomalyType::PacketLoss => Some((RecoveryAction::PurgeOriginators, 3)),
        AnomalyType::HighLatency => Some((RecoveryAction::AdjustRouting, 4)),
    }
}

pub struct Planner {
    recovery_map: fn(AnomalyType) -> Option<(RecoveryAction, u8)>,
    plan_counter: u64,
    history: History<RecoveryPlan>,
}

impl Planner {
    pub fn new() -> Self {
        Self::with_recovery_map(recovery_for)
    }

    /// Planner with a custom anomaly → action table
    pub fn with_recovery_map(recovery_map: fn(AnomalyType) -> Option<(RecoveryAction, u8)>) -> Self {
        Self {
            recovery_map,
            plan_counter: 0,
            history: History::with_capacity(PLAN_HISTORY_CAPACITY),
        }
    }

    pub fn plan(&mut self, anomalies: Vec<Anomaly>) -> RecoveryPlan {
        let mut actions: Vec<RecoveryAction> = Vec::new();
        let mut priority = DEFAULT_PRIORITY;

        for anomaly in &anomalies {
            if let Some((action, candidate)) = (self.recovery_map)(anomaly.anomaly_type) {
                priority = priority.min(candidate);
                if !actions.contains(&action) {
                    actions.push(action);
                }
            }
        }

        if actions.is_empty() {
            actions.push(RecoveryAction::Escalate);
            priority = DEFAULT_PRIORITY;
        }

        self.plan_counter += 1;
        let plan = RecoveryPlan {
            plan_id: format!("batman-plan-{:04}", self.plan_counter),
            estimated_duration_secs: SECONDS_PER_ACTION * actions.len() as f64,
            anomalies,
            actions,
            priority,
            created_at: Utc::now(),
        };

        debug!("Plan: {}", plan.summary());
        self.history.push(plan.clone());
        plan
    }

    pub fn recent_plans(&self, limit: usize) -> Vec<RecoveryPlan> {
        self.history.recent_cloned(limit)
    }

    pub fn plans_created(&self) -> u64 {
        self.plan_counter
    }
}

impl Default for Planner {
    fn default() -> Self {
        Self::new()
    }
}
