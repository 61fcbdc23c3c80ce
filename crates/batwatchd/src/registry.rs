//! Process-wide registry of MAPE-K loops
//!
//! One loop per (node, interface) pair. Asking twice for the same pair hands
//! back the same loop.

use crate::mapek::cycle::MapekLoop;
use batwatch_common::{InterfaceName, ValidationError};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoopKey {
    pub node_id: String,
    pub interface: InterfaceName,
}

impl LoopKey {
    pub fn new(node_id: impl Into<String>, interface: &str) -> Result<Self, ValidationError> {
        Ok(Self {
            node_id: node_id.into(),
            interface: InterfaceName::new(interface)?,
        })
    }
}

impl fmt::Display for LoopKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.node_id, self.interface)
    }
}

#[derive(Default)]
pub struct LoopRegistry {
    loops: RwLock<HashMap<LoopKey, Arc<MapekLoop>>>,
}

impl LoopRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &LoopKey) -> Option<Arc<MapekLoop>> {
        self.loops.read().await.get(key).cloned()
    }

    /// Existing loop for `key`, or a new one built by `factory`.
    ///
    /// The factory only runs when no loop is registered yet.
    pub async fn get_or_create<F>(
        &self,
        key: LoopKey,
        factory: F,
    ) -> Result<Arc<MapekLoop>, ValidationError>
    where
        F: FnOnce(&LoopKey) -> Result<MapekLoop, ValidationError>,
    {
        if let Some(existing) = self.get(&key).await {
            return Ok(existing);
        }

        let mut loops = self.loops.write().await;
        // Another task may have won the race between the two locks
        if let Some(existing) = loops.get(&key) {
            return Ok(Arc::clone(existing));
        }

        let created = Arc::new(factory(&key)?);
        info!("Registered MAPE-K loop {}", key);
        loops.insert(key, Arc::clone(&created));
        Ok(created)
    }

    /// Unregister a loop, stopping it first
    pub async fn remove(&self, key: &LoopKey) -> Option<Arc<MapekLoop>> {
        let removed = self.loops.write().await.remove(key)?;
        removed.stop();
        info!("Removed MAPE-K loop {}", key);
        Some(removed)
    }

    /// Stop every registered loop and clear the registry
    pub async fn shutdown(&self) {
        let mut loops = self.loops.write().await;
        for (key, mapek) in loops.drain() {
            mapek.stop();
            info!("Stopped MAPE-K loop {}", key);
        }
    }

    pub async fn keys(&self) -> Vec<LoopKey> {
        let mut keys: Vec<LoopKey> = self.loops.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub async fn len(&self) -> usize {
        self.loops.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.loops.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapek::cycle::LoopConfig;
    use crate::mapek::monitor::{StaticHealthProvider, StaticMetricsProvider};
    use crate::runner::FakeCommandRunner;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn build(key: &LoopKey) -> Result<MapekLoop, ValidationError> {
        let config = LoopConfig::new(key.node_id.clone(), key.interface.as_str())?;
        MapekLoop::new(
            config,
            Arc::new(StaticHealthProvider::healthy(&key.node_id)),
            Arc::new(StaticMetricsProvider::healthy(&key.node_id)),
            Arc::new(FakeCommandRunner::new()),
        )
    }

    #[tokio::test]
    async fn test_same_key_returns_same_loop() {
        let registry = LoopRegistry::new();
        let built = AtomicUsize::new(0);
        let factory = |key: &LoopKey| {
            built.fetch_add(1, Ordering::SeqCst);
            build(key)
        };

        let key = LoopKey::new("node-1", "bat0").unwrap();
        let first = registry.get_or_create(key.clone(), factory).await.unwrap();
        let second = registry.get_or_create(key, factory).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(built.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_distinct_keys() {
        let registry = LoopRegistry::new();
        let a = LoopKey::new("node-1", "bat0").unwrap();
        let b = LoopKey::new("node-1", "bat1").unwrap();

        let first = registry.get_or_create(a.clone(), build).await.unwrap();
        let second = registry.get_or_create(b.clone(), build).await.unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(registry.keys().await, vec![a, b]);
    }

    #[tokio::test]
    async fn test_factory_error_registers_nothing() {
        let registry = LoopRegistry::new();
        let key = LoopKey::new("node-1", "bat0").unwrap();

        let result = registry
            .get_or_create(key, |_| Err(ValidationError::Config("broken".to_string())))
            .await;

        assert!(result.is_err());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_remove_and_shutdown() {
        let registry = LoopRegistry::new();
        let a = LoopKey::new("node-1", "bat0").unwrap();
        let b = LoopKey::new("node-2", "bat0").unwrap();
        registry.get_or_create(a.clone(), build).await.unwrap();
        registry.get_or_create(b, build).await.unwrap();

        assert!(registry.remove(&a).await.is_some());
        assert!(registry.remove(&a).await.is_none());
        assert_eq!(registry.len().await, 1);

        registry.shutdown().await;
        assert!(registry.is_empty().await);
    }

    #[test]
    fn test_key_rejects_bad_interface() {
        assert!(LoopKey::new("node-1", "bat0; reboot").is_err());
        assert_eq!(
            LoopKey::new("node-1", "bat0").unwrap().to_string(),
            "node-1@bat0"
        );
    }
}
