//! Execute phase: runs each planned action against the host
//!
//! Every action is attempted even when an earlier one failed. Handler
//! failures are recorded in the result, never propagated.

use super::types::{ActionReport, ExecutedAction, ExecutionResult, FailedAction, RecoveryAction, RecoveryPlan};
use crate::config::CommandConfig;
use crate::runner::CommandRunner;
use batwatch_common::{ActionError, History, InterfaceName, ValidationError};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub const EXECUTION_HISTORY_CAPACITY: usize = 50;

const DEFAULT_GATEWAY_MODE: &str = "client";
const GATEWAY_MODES: [&str; 3] = ["off", "client", "server"];

pub struct Executor {
    interface: InterfaceName,
    runner: Arc<dyn CommandRunner>,
    commands: CommandConfig,
    daemon_unit: String,
    history: History<ExecutionResult>,
}

impl Executor {
    /// Fails if `interface` is not a safe interface name
    pub fn new(interface: &str, runner: Arc<dyn CommandRunner>) -> Result<Self, ValidationError> {
        Ok(Self {
            interface: InterfaceName::new(interface)?,
            runner,
            commands: CommandConfig::default(),
            daemon_unit: "batman-adv".to_string(),
            history: History::with_capacity(EXECUTION_HISTORY_CAPACITY),
        })
    }

    pub fn with_commands(mut self, commands: CommandConfig) -> Self {
        self.commands = commands;
        self
    }

    pub fn with_daemon_unit(mut self, unit: impl Into<String>) -> Self {
        self.daemon_unit = unit.into();
        self
    }

    pub fn interface(&self) -> &InterfaceName {
        &self.interface
    }

    pub async fn execute(&mut self, plan: &RecoveryPlan) -> ExecutionResult {
        let started_at = Utc::now();
        let mut actions_executed = Vec::new();
        let mut actions_failed = Vec::new();

        for &action in &plan.actions {
            info!("Executing recovery action: {}", action);
            match self.execute_action(action, plan).await {
                Ok(result) => {
                    debug!("{}: {}", action, result.message);
                    actions_executed.push(ExecutedAction { action, result });
                }
                Err(e) => {
                    error!("Recovery action {} failed: {}", action, e);
                    actions_failed.push(FailedAction {
                        action,
                        error: e.to_string(),
                    });
                }
            }
        }

        let result = ExecutionResult {
            plan_id: plan.plan_id.clone(),
            started_at,
            completed_at: Utc::now(),
            success: actions_failed.is_empty(),
            actions_executed,
            actions_failed,
        };
        self.history.push(result.clone());
        result
    }

    /// Run a single action
    pub async fn execute_action(
        &self,
        action: RecoveryAction,
        plan: &RecoveryPlan,
    ) -> Result<ActionReport, ActionError> {
        match action {
            RecoveryAction::RestartInterface => self.restart_interface().await,
            RecoveryAction::ReselectGateway => self.reselect_gateway().await,
            RecoveryAction::PurgeOriginators => self.purge_originators().await,
            RecoveryAction::AdjustRouting => Ok(self.adjust_routing()),
            RecoveryAction::IsolateNode => self.isolate_node(plan),
            RecoveryAction::ReconfigureLink => Ok(self.reconfigure_link()),
            RecoveryAction::RestartDaemon => self.restart_daemon().await,
            RecoveryAction::Escalate => Ok(self.escalate(plan)),
        }
    }

    pub fn recent_executions(&self, limit: usize) -> Vec<ExecutionResult> {
        self.history.recent_cloned(limit)
    }

    async fn ip_link_set(&self, state: &str) -> Result<String, ActionError> {
        self.runner
            .run_checked(
                "ip",
                &["link", "set", self.interface.as_str(), state],
                self.commands.action_timeout(),
            )
            .await
    }

    async fn set_gateway_mode(&self, mode: &str) -> Result<String, ActionError> {
        self.runner
            .run_checked(
                "batctl",
                &["meshif", self.interface.as_str(), "gw_mode", mode],
                self.commands.probe_timeout(),
            )
            .await
    }

    async fn restart_interface(&self) -> Result<ActionReport, ActionError> {
        self.ip_link_set("down").await?;
        tokio::time::sleep(self.commands.settle_delay()).await;
        self.ip_link_set("up").await?;

        Ok(ActionReport::success(format!(
            "Interface {} restarted",
            self.interface
        )))
    }

    /// Toggle gateway mode off and back to force a new gateway election
    async fn reselect_gateway(&self) -> Result<ActionReport, ActionError> {
        let current = match self
            .runner
            .run(
                "batctl",
                &["meshif", self.interface.as_str(), "gw_mode"],
                self.commands.probe_timeout(),
            )
            .await
        {
            Ok(output) if output.success() => parse_gateway_mode(&output.stdout),
            Ok(_) => DEFAULT_GATEWAY_MODE,
            Err(e) => {
                warn!("Could not read gateway mode, assuming {}: {}", DEFAULT_GATEWAY_MODE, e);
                DEFAULT_GATEWAY_MODE
            }
        };

        self.set_gateway_mode("off").await?;
        tokio::time::sleep(self.commands.settle_delay()).await;
        self.set_gateway_mode(current).await?;

        Ok(ActionReport::success("Gateway reselection triggered")
            .with_details(json!({ "gateway_mode": current })))
    }

    async fn purge_originators(&self) -> Result<ActionReport, ActionError> {
        self.runner
            .run_checked(
                "batctl",
                &["meshif", self.interface.as_str(), "translocal", "-d"],
                self.commands.probe_timeout(),
            )
            .await?;
        Ok(ActionReport::success("Originator tables purged"))
    }

    fn adjust_routing(&self) -> ActionReport {
        info!("Routing adjustment requested for {}", self.interface);
        ActionReport::success("Routing adjustment acknowledged")
    }

    fn reconfigure_link(&self) -> ActionReport {
        info!("Link reconfiguration requested for {}", self.interface);
        ActionReport::success("Link reconfiguration acknowledged")
    }

    fn isolate_node(&self, plan: &RecoveryPlan) -> Result<ActionReport, ActionError> {
        let node = plan
            .anomalies
            .first()
            .map(|a| a.affected_node.as_str())
            .ok_or(ActionError::NoIsolationTarget)?;

        warn!("Isolation requested for node {}", node);
        Ok(ActionReport::success(format!("Node {} marked for isolation", node))
            .with_details(json!({ "node": node })))
    }

    async fn restart_daemon(&self) -> Result<ActionReport, ActionError> {
        self.runner
            .run_checked(
                "systemctl",
                &["restart", self.daemon_unit.as_str()],
                self.commands.daemon_restart_timeout(),
            )
            .await?;
        Ok(ActionReport::success(format!("{} restarted", self.daemon_unit)))
    }

    fn escalate(&self, plan: &RecoveryPlan) -> ActionReport {
        let summary = plan.summary();
        error!("Escalating to operator: {}", summary);
        ActionReport::escalated(
            format!("Escalated: {}", summary),
            serde_json::to_value(plan).unwrap_or(serde_json::Value::Null),
        )
    }
}

/// First word of `batctl gw_mode` output if it names a known mode
pub fn parse_gateway_mode(output: &str) -> &'static str {
    let first = output.split_whitespace().next().unwrap_or_default();
    GATEWAY_MODES
        .into_iter()
        .find(|mode| *mode == first)
        .unwrap_or(DEFAULT_GATEWAY_MODE)
}
