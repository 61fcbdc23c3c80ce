//! batwatch common - shared types for the batman-adv self-healing daemon
//!
//! Health reports and metrics snapshots are produced by the monitoring
//! collaborators and consumed as plain data by the MAPE-K loop.

pub mod error;
pub mod health;
pub mod history;
pub mod iface;
pub mod metrics;

pub use error::{ActionError, ProviderError, ValidationError};
pub use health::{CheckResult, CheckType, HealthReport, HealthStatus};
pub use history::History;
pub use iface::InterfaceName;
pub use metrics::MetricsSnapshot;
