use std::collections::BTreeMap;
use std::sync::Arc;

use jiff::Timestamp;
use lorasense_core::{BASESTATION_ID, Capabilities, NodeId, SensorKind};
use serde::Serialize;
use tokio::sync::RwLock;

/// What the basestation knows about an admitted node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeRecord {
    pub id: NodeId,
    pub capabilities: Capabilities,
    pub joined_at: Timestamp,
    pub last_seen: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("node {0} is already registered")]
    Duplicate(NodeId),
    #[error("id {0} is reserved for the basestation")]
    Reserved(NodeId),
}

/// The authoritative set of admitted nodes.
///
/// Records are created once and never replaced or removed for the lifetime
/// of the process. Iteration is in ascending id order.
#[derive(Clone, Default)]
pub struct NodeRegistry {
    nodes: Arc<RwLock<BTreeMap<NodeId, NodeRecord>>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(
        &self,
        id: NodeId,
        capabilities: Capabilities,
    ) -> Result<NodeRecord, RegistryError> {
        if id == BASESTATION_ID {
            return Err(RegistryError::Reserved(id));
        }

        let mut nodes = self.nodes.write().await;

        if nodes.contains_key(&id) {
            return Err(RegistryError::Duplicate(id));
        }

        let now = Timestamp::now();
        let record = NodeRecord {
            id,
            capabilities,
            joined_at: now,
            last_seen: now,
        };
        nodes.insert(id, record.clone());

        Ok(record)
    }

    pub async fn get(&self, id: NodeId) -> Option<NodeRecord> {
        self.nodes.read().await.get(&id).cloned()
    }

    pub async fn list(&self) -> Vec<NodeRecord> {
        self.nodes.read().await.values().cloned().collect()
    }

    /// Ids of every node advertising `kind`, ascending.
    pub async fn capable_of(&self, kind: SensorKind) -> Vec<NodeId> {
        self.nodes
            .read()
            .await
            .values()
            .filter(|record| record.capabilities.contains(kind))
            .map(|record| record.id)
            .collect()
    }

    /// Marks a node as heard from just now. Returns false for unknown ids.
    pub async fn touch(&self, id: NodeId) -> bool {
        match self.nodes.write().await.get_mut(&id) {
            Some(record) => {
                record.last_seen = Timestamp::now();
                true
            }
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.nodes.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.nodes.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(kinds: &[SensorKind]) -> Capabilities {
        kinds.iter().copied().collect()
    }

    #[tokio::test]
    async fn second_join_keeps_first_capabilities() {
        let registry = NodeRegistry::new();
        let first = caps(&[SensorKind::Temperature]);

        registry.register(4, first).await.unwrap();
        let err = registry
            .register(4, caps(&[SensorKind::Pressure]))
            .await
            .unwrap_err();

        assert_eq!(err, RegistryError::Duplicate(4));
        assert_eq!(registry.len().await, 1);
        assert_eq!(registry.get(4).await.unwrap().capabilities, first);
    }

    #[tokio::test]
    async fn identical_rejoin_is_still_a_duplicate() {
        let registry = NodeRegistry::new();
        let set = caps(&[SensorKind::Humidity]);

        registry.register(2, set).await.unwrap();
        assert_eq!(
            registry.register(2, set).await,
            Err(RegistryError::Duplicate(2))
        );
    }

    #[tokio::test]
    async fn basestation_id_is_reserved() {
        let registry = NodeRegistry::new();
        assert_eq!(
            registry.register(BASESTATION_ID, Capabilities::all()).await,
            Err(RegistryError::Reserved(BASESTATION_ID))
        );
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn capable_nodes_are_ascending() {
        let registry = NodeRegistry::new();
        registry.register(9, Capabilities::all()).await.unwrap();
        registry
            .register(3, caps(&[SensorKind::Temperature]))
            .await
            .unwrap();
        registry
            .register(5, caps(&[SensorKind::Pressure]))
            .await
            .unwrap();

        assert_eq!(registry.capable_of(SensorKind::Temperature).await, vec![3, 9]);
        assert_eq!(registry.capable_of(SensorKind::Pressure).await, vec![5, 9]);
        assert!(!registry.touch(42).await);
        assert!(registry.touch(5).await);
    }
}
