//! batctl-backed monitoring collaborators
//!
//! `BatctlHealthMonitor` runs the six health checks and `BatctlMetricsCollector`
//! fills a `MetricsSnapshot`. Both shell out through a `CommandRunner`; the
//! parsing of `batctl`, `ip` and ping output is done by the pure functions at
//! the bottom of this file.

use crate::mapek::monitor::{HealthProvider, MetricsProvider};
use crate::runner::{CommandOutput, CommandRunner};
use async_trait::async_trait;
use batwatch_common::{
    ActionError, CheckResult, CheckType, HealthReport, HealthStatus, InterfaceName,
    MetricsSnapshot, ProviderError,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Originators pinged by the connectivity check
const PING_TARGETS: usize = 3;
/// Originator count that earns a full originator-table score
const FULL_ORIGINATOR_COUNT: f64 = 10.0;
/// Translocal entry count that earns a full routing score
const FULL_ROUTING_ENTRIES: f64 = 5.0;
/// Latency probe ping count
const LATENCY_PINGS: &str = "3";

const SYSFS_NET: &str = "/sys/class/net";

static MAC_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9a-fA-F]{2}:){5}[0-9a-fA-F]{2}$").unwrap());
static TQ_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(\s*(\d+)\)").unwrap());
static RTT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"rtt min/avg/max/mdev = [\d.]+/([\d.]+)/").unwrap());
static LOSS_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)?)% packet loss").unwrap());
static LINK_FLAGS_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"<([^>]*)>").unwrap());
static LINK_STATE_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bstate (\w+)").unwrap());

// ============================================================================
// Shared batctl access
// ============================================================================

#[derive(Clone)]
struct Batctl {
    interface: InterfaceName,
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
}

impl Batctl {
    async fn meshif(&self, args: &[&str]) -> Result<CommandOutput, ActionError> {
        let mut full = vec!["meshif", self.interface.as_str()];
        full.extend_from_slice(args);
        self.runner.run("batctl", &full, self.timeout).await
    }

    /// stdout of a successful batctl call
    async fn meshif_checked(&self, args: &[&str]) -> Result<String, ActionError> {
        let mut full = vec!["meshif", self.interface.as_str()];
        full.extend_from_slice(args);
        self.runner.run_checked("batctl", &full, self.timeout).await
    }

    async fn originators(&self) -> Result<Vec<Originator>, ActionError> {
        Ok(parse_originators(&self.meshif_checked(&["originators"]).await?))
    }

    async fn ip_link_show(&self) -> Result<CommandOutput, ActionError> {
        self.runner
            .run("ip", &["link", "show", self.interface.as_str()], self.timeout)
            .await
    }
}

// ============================================================================
// Health monitor
// ============================================================================

pub struct BatctlHealthMonitor {
    node_id: String,
    batctl: Batctl,
}

impl BatctlHealthMonitor {
    pub fn new(
        node_id: impl Into<String>,
        interface: InterfaceName,
        runner: Arc<dyn CommandRunner>,
        timeout: Duration,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            batctl: Batctl {
                interface,
                runner,
                timeout,
            },
        }
    }

    pub async fn check_connectivity(&self) -> CheckResult {
        let originators = match self.batctl.originators().await {
            Ok(o) => o,
            Err(e) => return failed_check(CheckType::Connectivity, &e, false),
        };
        if originators.is_empty() {
            return CheckResult::new(
                CheckType::Connectivity,
                HealthStatus::Unhealthy,
                0.0,
                "No originators found in mesh",
            )
            .with_details(json!({ "originators_count": 0 }));
        }

        let targets: Vec<&Originator> = originators.iter().take(PING_TARGETS).collect();
        let mut reachable = 0;
        for target in &targets {
            let ping = self
                .batctl
                .meshif(&["ping", "-c", "1", target.mac.as_str()])
                .await;
            if matches!(ping, Ok(ref out) if out.success()) {
                reachable += 1;
            }
        }

        let score = reachable as f64 / targets.len() as f64;
        CheckResult::scored(
            CheckType::Connectivity,
            score,
            format!("Reachable {}/{} originators", reachable, targets.len()),
        )
        .with_details(json!({
            "originators_count": originators.len(),
            "reachable_count": reachable,
        }))
    }

    pub async fn check_link_quality(&self) -> CheckResult {
        let output = match self.batctl.meshif(&["originators"]).await {
            Ok(out) => out,
            Err(e) => return failed_check(CheckType::LinkQuality, &e, true),
        };
        if !output.success() {
            return CheckResult::unknown(
                CheckType::LinkQuality,
                0.0,
                "Failed to get originator information",
            );
        }

        let qualities: Vec<f64> = parse_originators(&output.stdout)
            .iter()
            .filter_map(Originator::link_quality)
            .collect();
        if qualities.is_empty() {
            return CheckResult::new(
                CheckType::LinkQuality,
                HealthStatus::Degraded,
                0.5,
                "No link quality data available",
            );
        }

        let mut stats = MetricsSnapshot::default();
        stats.set_link_qualities(&qualities);
        CheckResult::scored(
            CheckType::LinkQuality,
            stats.avg_link_quality,
            format!("Average link quality: {:.0}%", stats.avg_link_quality * 100.0),
        )
        .with_details(json!({
            "avg_quality": stats.avg_link_quality,
            "min_quality": stats.min_link_quality,
            "max_quality": stats.max_link_quality,
            "links_count": stats.total_links,
        }))
    }

    pub async fn check_originator_table(&self) -> CheckResult {
        let originators = match self.batctl.originators().await {
            Ok(o) => o,
            Err(e) => return failed_check(CheckType::OriginatorTable, &e, false),
        };
        if originators.is_empty() {
            return CheckResult::new(
                CheckType::OriginatorTable,
                HealthStatus::Unhealthy,
                0.0,
                "Originator table is empty",
            )
            .with_details(json!({ "originators_count": 0 }));
        }

        let score = (originators.len() as f64 / FULL_ORIGINATOR_COUNT).min(1.0);
        CheckResult::scored(
            CheckType::OriginatorTable,
            score,
            format!("Found {} originators", originators.len()),
        )
        .with_details(json!({ "originators_count": originators.len() }))
    }

    pub async fn check_gateway(&self) -> CheckResult {
        let output = match self.batctl.meshif(&["gateways"]).await {
            Ok(out) => out,
            Err(e) => return failed_check(CheckType::Gateway, &e, true),
        };
        if !output.success() {
            return CheckResult::unknown(
                CheckType::Gateway,
                0.5,
                "Failed to get gateway information",
            );
        }

        let gateways = parse_gateways(&output.stdout);
        if gateways.count == 0 {
            return CheckResult::new(
                CheckType::Gateway,
                HealthStatus::Degraded,
                0.5,
                "No gateways available",
            )
            .with_details(json!({ "gateways_count": 0 }));
        }

        CheckResult::new(
            CheckType::Gateway,
            HealthStatus::Healthy,
            1.0,
            format!("Found {} gateway(s)", gateways.count),
        )
        .with_details(json!({
            "gateways_count": gateways.count,
            "selected": gateways.selected,
        }))
    }

    pub async fn check_interface(&self) -> CheckResult {
        let interface = self.batctl.interface.as_str();
        let output = match self.batctl.ip_link_show().await {
            Ok(out) => out,
            Err(e) => return failed_check(CheckType::Interface, &e, false),
        };
        if !output.success() {
            return CheckResult::new(
                CheckType::Interface,
                HealthStatus::Unhealthy,
                0.0,
                format!("Interface {} not found", interface),
            );
        }

        match parse_link_state(&output.stdout) {
            LinkState::Up => CheckResult::new(
                CheckType::Interface,
                HealthStatus::Healthy,
                1.0,
                format!("Interface {} is UP", interface),
            )
            .with_details(json!({ "interface": interface, "state": "up" })),
            LinkState::Unknown => CheckResult::new(
                CheckType::Interface,
                HealthStatus::Degraded,
                0.5,
                format!("Interface {} state unknown", interface),
            )
            .with_details(json!({ "interface": interface, "state": "unknown" })),
            LinkState::Down => CheckResult::new(
                CheckType::Interface,
                HealthStatus::Unhealthy,
                0.0,
                format!("Interface {} is DOWN", interface),
            )
            .with_details(json!({ "interface": interface, "state": "down" })),
        }
    }

    pub async fn check_routing(&self) -> CheckResult {
        let output = match self.batctl.meshif(&["translocal"]).await {
            Ok(out) => out,
            Err(e) => return failed_check(CheckType::Routing, &e, true),
        };
        if !output.success() {
            return CheckResult::unknown(
                CheckType::Routing,
                0.5,
                "Failed to get routing information",
            );
        }

        let entries = count_mac_entries(&output.stdout);
        if entries == 0 {
            return CheckResult::new(
                CheckType::Routing,
                HealthStatus::Degraded,
                0.5,
                "Routing table is empty",
            )
            .with_details(json!({ "routing_entries": 0 }));
        }

        let score = (entries as f64 / FULL_ROUTING_ENTRIES).min(1.0);
        CheckResult::scored(
            CheckType::Routing,
            score,
            format!("Routing table has {} entries", entries),
        )
        .with_details(json!({ "routing_entries": entries }))
    }
}

#[async_trait]
impl HealthProvider for BatctlHealthMonitor {
    async fn run_health_checks(&self) -> Result<HealthReport, ProviderError> {
        let (connectivity, link_quality, originators, gateway, interface, routing) = tokio::join!(
            timed(self.check_connectivity()),
            timed(self.check_link_quality()),
            timed(self.check_originator_table()),
            timed(self.check_gateway()),
            timed(self.check_interface()),
            timed(self.check_routing()),
        );

        Ok(HealthReport::from_checks(
            self.node_id.clone(),
            vec![connectivity, link_quality, originators, gateway, interface, routing],
        ))
    }

    async fn initialize(&self) -> Result<(), ProviderError> {
        match self.batctl.runner.run("batctl", &["-v"], self.batctl.timeout).await {
            Ok(out) => debug!("batctl: {}", out.stdout.trim()),
            Err(e) => warn!("batctl unavailable, health checks will degrade: {}", e),
        }
        Ok(())
    }
}

async fn timed(check: impl std::future::Future<Output = CheckResult>) -> CheckResult {
    let start = Instant::now();
    let result = check.await;
    result.with_duration_ms(start.elapsed().as_secs_f64() * 1000.0)
}

/// Result for a check whose command could not run.
///
/// Advisory checks score a missing tool as neutral rather than broken.
fn failed_check(check_type: CheckType, error: &ActionError, advisory: bool) -> CheckResult {
    match error {
        ActionError::ToolMissing { program, .. } if advisory => {
            debug!("{} not available for {} check", program, check_type.as_str());
            CheckResult::unknown(check_type, 0.5, format!("{} not available", program))
        }
        _ => {
            warn!("{} check failed: {}", check_type.as_str(), error);
            CheckResult::unknown(
                check_type,
                0.0,
                format!("{} check failed: {}", check_type.as_str(), error),
            )
        }
    }
}

// ============================================================================
// Metrics collector
// ============================================================================

pub struct BatctlMetricsCollector {
    node_id: String,
    batctl: Batctl,
    sysfs_root: PathBuf,
}

impl BatctlMetricsCollector {
    pub fn new(
        node_id: impl Into<String>,
        interface: InterfaceName,
        runner: Arc<dyn CommandRunner>,
        timeout: Duration,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            batctl: Batctl {
                interface,
                runner,
                timeout,
            },
            sysfs_root: PathBuf::from(SYSFS_NET),
        }
    }

    /// Read interface counters below `root` instead of /sys/class/net
    pub fn with_sysfs_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.sysfs_root = root.into();
        self
    }

    async fn collect_topology(&self, snapshot: &mut MetricsSnapshot) -> Vec<Originator> {
        let originators = match self.batctl.originators().await {
            Ok(o) => o,
            Err(e) => {
                log_collection_failure("topology", &e);
                return Vec::new();
            }
        };

        snapshot.originators_count = originators.len() as u32;
        let qualities: Vec<f64> = originators.iter().filter_map(Originator::link_quality).collect();
        snapshot.set_link_qualities(&qualities);

        match self.batctl.meshif_checked(&["transglobal"]).await {
            Ok(out) => snapshot.neighbors_count = count_mac_entries(&out) as u32,
            Err(e) => log_collection_failure("neighbor", &e),
        }
        originators
    }

    async fn collect_routing(&self, snapshot: &mut MetricsSnapshot) {
        match self.batctl.meshif_checked(&["translocal"]).await {
            Ok(out) => snapshot.routing_entries = count_mac_entries(&out) as u32,
            Err(e) => log_collection_failure("routing", &e),
        }
    }

    async fn collect_gateways(&self, snapshot: &mut MetricsSnapshot) {
        match self.batctl.meshif_checked(&["gateways"]).await {
            Ok(out) => {
                let gateways = parse_gateways(&out);
                snapshot.gateways_count = gateways.count as u32;
                snapshot.has_gateway = gateways.selected;
            }
            Err(e) => log_collection_failure("gateway", &e),
        }
        match self.batctl.meshif_checked(&["gw_mode"]).await {
            Ok(out) => snapshot.gateway_mode = out.trim().to_string(),
            Err(e) => log_collection_failure("gateway mode", &e),
        }
    }

    async fn collect_interface(&self, snapshot: &mut MetricsSnapshot) {
        match self.batctl.ip_link_show().await {
            Ok(out) if out.success() => {
                snapshot.interface_up = parse_link_state(&out.stdout) == LinkState::Up
            }
            Ok(_) => {}
            Err(e) => log_collection_failure("interface", &e),
        }

        let stats = self
            .sysfs_root
            .join(self.batctl.interface.as_str())
            .join("statistics");
        snapshot.rx_bytes = read_counter(&stats, "rx_bytes").await.unwrap_or(0);
        snapshot.tx_bytes = read_counter(&stats, "tx_bytes").await.unwrap_or(0);
        snapshot.rx_packets = read_counter(&stats, "rx_packets").await.unwrap_or(0);
        snapshot.tx_packets = read_counter(&stats, "tx_packets").await.unwrap_or(0);
    }

    async fn collect_performance(&self, snapshot: &mut MetricsSnapshot, originators: &[Originator]) {
        if snapshot.avg_link_quality > 0.0 {
            // Rough estimate, 100 Mbit/s at perfect TQ
            snapshot.throughput_mbps = snapshot.avg_link_quality * 100.0;
        }

        let Some(target) = originators.first() else {
            return;
        };
        let ping = self
            .batctl
            .runner
            .run(
                "batctl",
                &[
                    "meshif",
                    self.batctl.interface.as_str(),
                    "ping",
                    "-c",
                    LATENCY_PINGS,
                    target.mac.as_str(),
                ],
                self.batctl.timeout.saturating_mul(3),
            )
            .await;

        match ping {
            Ok(out) => {
                let stats = parse_ping(&out.stdout);
                if let Some(avg) = stats.avg_rtt_ms {
                    snapshot.latency_ms = avg;
                }
                if let Some(loss) = stats.loss_percent {
                    snapshot.packet_loss_percent = loss;
                }
            }
            Err(e) => log_collection_failure("performance", &e),
        }
    }
}

#[async_trait]
impl MetricsProvider for BatctlMetricsCollector {
    async fn collect(&self) -> Result<MetricsSnapshot, ProviderError> {
        let start = Instant::now();
        let mut snapshot = MetricsSnapshot::for_node(self.node_id.clone());

        let originators = self.collect_topology(&mut snapshot).await;
        self.collect_routing(&mut snapshot).await;
        self.collect_gateways(&mut snapshot).await;
        self.collect_interface(&mut snapshot).await;
        self.collect_performance(&mut snapshot, &originators).await;

        debug!("Metrics collection completed in {:?}", start.elapsed());
        Ok(snapshot)
    }
}

fn log_collection_failure(what: &str, error: &ActionError) {
    match error {
        ActionError::ToolMissing { program, .. } => {
            debug!("{} not available for {} metrics", program, what)
        }
        _ => warn!("Failed to collect {} metrics: {}", what, error),
    }
}

async fn read_counter(dir: &Path, name: &str) -> Option<u64> {
    let raw = tokio::fs::read_to_string(dir.join(name)).await.ok()?;
    raw.trim().parse().ok()
}

// ============================================================================
// Parsers
// ============================================================================

/// One row of `batctl originators`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Originator {
    pub mac: String,
    /// Transmission quality, 0-255
    pub tq: Option<u8>,
    /// Marked as the best route
    pub best: bool,
}

impl Originator {
    /// TQ normalised to 0.0-1.0
    pub fn link_quality(&self) -> Option<f64> {
        self.tq.map(|tq| tq as f64 / 255.0)
    }
}

/// Parse `batctl meshif <if> originators`, one entry per originator MAC.
///
/// When an originator is listed once per neighbor, the row marked `*` wins.
pub fn parse_originators(output: &str) -> Vec<Originator> {
    let mut originators: Vec<Originator> = Vec::new();

    for line in output.lines() {
        let mut tokens = line.split_whitespace().peekable();
        let best = tokens.next_if_eq(&"*").is_some();
        let Some(mac) = tokens.next().filter(|t| MAC_PATTERN.is_match(t)) else {
            continue;
        };
        let tq = TQ_PATTERN
            .captures(line)
            .and_then(|c| c[1].parse::<u16>().ok())
            .map(|tq| tq.min(255) as u8);

        let entry = Originator {
            mac: mac.to_lowercase(),
            tq,
            best,
        };
        match originators.iter().position(|o| o.mac == entry.mac) {
            Some(i) if best && !originators[i].best => originators[i] = entry,
            Some(_) => {}
            None => originators.push(entry),
        }
    }

    originators
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GatewaySummary {
    pub count: usize,
    /// A gateway is currently selected (`*` or `=>` marker)
    pub selected: bool,
}

/// Parse `batctl meshif <if> gateways`
pub fn parse_gateways(output: &str) -> GatewaySummary {
    let mut summary = GatewaySummary::default();
    if output.contains("No gateways") {
        return summary;
    }

    for line in output.lines() {
        let trimmed = line.trim_start();
        let (marked, rest) = match trimmed.strip_prefix("=>").or_else(|| trimmed.strip_prefix('*')) {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        let is_gateway = rest
            .split_whitespace()
            .next()
            .is_some_and(|t| MAC_PATTERN.is_match(t));
        if is_gateway {
            summary.count += 1;
            summary.selected |= marked;
        }
    }
    summary
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PingStats {
    pub avg_rtt_ms: Option<f64>,
    pub loss_percent: Option<f64>,
}

/// Pull average RTT and packet loss out of ping output
pub fn parse_ping(output: &str) -> PingStats {
    PingStats {
        avg_rtt_ms: RTT_PATTERN
            .captures(output)
            .and_then(|c| c[1].parse().ok()),
        loss_percent: LOSS_PATTERN
            .captures(output)
            .and_then(|c| c[1].parse().ok()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Up,
    Down,
    /// Administratively up but operational state not reported
    Unknown,
}

/// Interpret `ip link show <if>` output
pub fn parse_link_state(output: &str) -> LinkState {
    if let Some(state) = LINK_STATE_PATTERN.captures(output) {
        match &state[1] {
            "UP" => return LinkState::Up,
            "DOWN" | "LOWERLAYERDOWN" => return LinkState::Down,
            _ => {}
        }
    }

    let admin_up = LINK_FLAGS_PATTERN
        .captures(output)
        .is_some_and(|c| c[1].split(',').any(|flag| flag == "UP"));
    if admin_up {
        LinkState::Unknown
    } else {
        LinkState::Down
    }
}

/// Rows that start with a MAC address, optionally after a `*` marker
pub fn count_mac_entries(output: &str) -> usize {
    output
        .lines()
        .filter(|line| {
            line.split_whitespace()
                .find(|t| *t != "*")
                .is_some_and(|t| MAC_PATTERN.is_match(t))
        })
        .count()
}
