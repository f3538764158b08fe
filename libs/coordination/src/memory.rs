//! In-process coordination store.
//!
//! Used by tests and by deployments where every replica shares one process.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::store::{join_path, normalize_path, CoordinationStore};
use crate::StoreError;

/// Coordination store held entirely in memory.
///
/// Nodes are keyed by canonical path. The root node always exists.
#[derive(Debug, Default)]
pub struct MemoryStore {
    nodes: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes, excluding the implicit root.
    pub async fn len(&self) -> usize {
        self.nodes.read().await.len()
    }

    /// Returns true if no node has been created.
    pub async fn is_empty(&self) -> bool {
        self.nodes.read().await.is_empty()
    }

    /// Check whether a node exists.
    pub async fn exists(&self, path: &str) -> Result<bool, StoreError> {
        let key = canonical(path)?;
        Ok(key == "/" || self.nodes.read().await.contains_key(&key))
    }
}

fn canonical(path: &str) -> Result<String, StoreError> {
    Ok(join_path(&normalize_path(path)?))
}

/// Prefix shared by every descendant of `key`.
fn child_prefix(key: &str) -> String {
    if key == "/" {
        "/".to_string()
    } else {
        format!("{key}/")
    }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn children(&self, path: &str) -> Result<Vec<String>, StoreError> {
        let key = canonical(path)?;
        let nodes = self.nodes.read().await;

        if key != "/" && !nodes.contains_key(&key) {
            return Err(StoreError::NotFound(key));
        }

        let prefix = child_prefix(&key);
        let children = nodes
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .filter_map(|(k, _)| {
                let rest = &k[prefix.len()..];
                (!rest.is_empty() && !rest.contains('/')).then(|| rest.to_string())
            })
            .collect();

        Ok(children)
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        let key = canonical(path)?;
        self.nodes
            .read()
            .await
            .get(&key)
            .cloned()
            .ok_or(StoreError::NotFound(key))
    }

    async fn set(&self, path: &str, data: &[u8]) -> Result<(), StoreError> {
        let key = canonical(path)?;
        let mut nodes = self.nodes.write().await;

        match nodes.get_mut(&key) {
            Some(existing) => {
                existing.clear();
                existing.extend_from_slice(data);
                Ok(())
            }
            None => Err(StoreError::NotFound(key)),
        }
    }

    async fn mkdirs(&self, path: &str) -> Result<(), StoreError> {
        let segments = normalize_path(path)?;
        let mut nodes = self.nodes.write().await;

        for depth in 1..=segments.len() {
            let key = join_path(&segments[..depth]);
            if !nodes.contains_key(&key) {
                debug!(path = %key, "Creating store node");
                nodes.insert(key, Vec::new());
            }
        }

        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        let key = canonical(path)?;
        let mut nodes = self.nodes.write().await;

        if key == "/" {
            nodes.clear();
            return Ok(());
        }

        let prefix = child_prefix(&key);
        nodes.retain(|k, _| k != &key && !k.starts_with(&prefix));
        Ok(())
    }
}
