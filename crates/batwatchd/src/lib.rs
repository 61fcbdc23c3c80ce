//! batwatchd - self-healing daemon for Batman-adv mesh nodes
//!
//! Runs a MAPE-K loop per (node, interface): monitor mesh health, detect
//! anomalies, plan recovery, execute it, and remember how it went.

pub mod batctl;
pub mod config;
pub mod mapek;
pub mod registry;
pub mod runner;
pub mod telemetry;

pub use batctl::{BatctlHealthMonitor, BatctlMetricsCollector};
pub use config::{CommandConfig, Config};
pub use mapek::{CycleResult, LoopConfig, LoopStatus, MapekLoop};
pub use registry::{LoopKey, LoopRegistry};
pub use runner::{CommandOutput, CommandRunner, FakeCommandRunner, SystemCommandRunner};
pub use telemetry::LoopMetrics;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level.
pub fn init_logging(default_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    // A second init (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
