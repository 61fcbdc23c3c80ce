//! Point-in-time mesh metrics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Counters and gauges collected once per cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSnapshot {
    pub node_id: String,
    pub timestamp: DateTime<Utc>,

    // Topology
    pub originators_count: u32,
    pub neighbors_count: u32,

    // Links, TQ normalised to 0.0-1.0
    pub total_links: u32,
    pub avg_link_quality: f64,
    pub min_link_quality: f64,
    pub max_link_quality: f64,

    // Routing
    pub routing_entries: u32,

    // Gateways
    pub gateways_count: u32,
    pub has_gateway: bool,
    pub gateway_mode: String,

    // Performance estimates
    pub throughput_mbps: f64,
    pub latency_ms: f64,
    pub packet_loss_percent: f64,

    // Interface counters
    pub interface_up: bool,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub rx_packets: u64,
    pub tx_packets: u64,
}

impl Default for MetricsSnapshot {
    fn default() -> Self {
        Self {
            node_id: String::new(),
            timestamp: Utc::now(),
            originators_count: 0,
            neighbors_count: 0,
            total_links: 0,
            avg_link_quality: 0.0,
            min_link_quality: 0.0,
            max_link_quality: 0.0,
            routing_entries: 0,
            gateways_count: 0,
            has_gateway: false,
            gateway_mode: String::new(),
            throughput_mbps: 0.0,
            latency_ms: 0.0,
            packet_loss_percent: 0.0,
            interface_up: false,
            rx_bytes: 0,
            tx_bytes: 0,
            rx_packets: 0,
            tx_packets: 0,
        }
    }
}

impl MetricsSnapshot {
    pub fn for_node(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            ..Default::default()
        }
    }

    /// Record link qualities and derive the aggregate link stats
    pub fn set_link_qualities(&mut self, qualities: &[f64]) {
        if qualities.is_empty() {
            return;
        }
        self.total_links = qualities.len() as u32;
        self.avg_link_quality = qualities.iter().sum::<f64>() / qualities.len() as f64;
        self.min_link_quality = qualities.iter().copied().fold(f64::INFINITY, f64::min);
        self.max_link_quality = qualities.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_link_quality_aggregates() {
        let mut snapshot = MetricsSnapshot::for_node("node-1");
        snapshot.set_link_qualities(&[1.0, 0.5, 0.75]);

        assert_eq!(snapshot.total_links, 3);
        assert_relative_eq!(snapshot.avg_link_quality, 0.75);
        assert_relative_eq!(snapshot.min_link_quality, 0.5);
        assert_relative_eq!(snapshot.max_link_quality, 1.0);
    }

    #[test]
    fn test_empty_qualities_leave_defaults() {
        let mut snapshot = MetricsSnapshot::default();
        snapshot.set_link_qualities(&[]);
        assert_eq!(snapshot.total_links, 0);
        assert_eq!(snapshot.avg_link_quality, 0.0);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let snapshot: MetricsSnapshot =
            serde_json::from_str(r#"{"latency_ms": 150.0, "node_id": "n2"}"#).unwrap();
        assert_eq!(snapshot.node_id, "n2");
        assert_eq!(snapshot.latency_ms, 150.0);
        assert_eq!(snapshot.routing_entries, 0);
    }
}
