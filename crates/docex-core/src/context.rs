use std::sync::{Arc, PoisonError, RwLock};

use serde_json::{Map, Value};

/// Run-scoped key-value bag threaded through every stage call of one pipeline run.
///
/// Cloning yields another handle onto the same map, so a value inserted by one
/// item's pipeline is visible to every other item of the run afterwards. Writes
/// are not ordered across items: keep usage append-only or keyed per item.
#[derive(Debug, Clone, Default)]
pub struct PipelineContext {
    inner: Arc<RwLock<Map<String, Value>>>,
}

impl PipelineContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(map)),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let map = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        map.get(key).cloned()
    }

    /// Insert a value, returning the previous one for that key.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        map.insert(key.into(), value.into())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        let map = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        map.contains_key(key)
    }

    pub fn len(&self) -> usize {
        let map = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Point-in-time copy of the whole map.
    pub fn snapshot(&self) -> Map<String, Value> {
        let map = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        map.clone()
    }

    /// True when both handles refer to the same underlying map.
    pub fn shares_state_with(&self, other: &PipelineContext) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
