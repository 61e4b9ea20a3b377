use async_trait::async_trait;
use autosign_types::AutosignError;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Key/value storage for session-scoped secrets.
///
/// Implementations own durability; callers only rely on a completed
/// `write` being visible to a later `read`.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn write(&self, key: &str, value: &str) -> Result<(), AutosignError>;

    async fn read(&self, key: &str) -> Result<Option<String>, AutosignError>;

    /// Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<(), AutosignError>;
}

/// In-memory store (for testing and single-process hosts).
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw stored value, bypassing any decoding.
    pub fn raw(&self, key: &str) -> Option<String> {
        self.entries.read().unwrap().get(key).cloned()
    }

    /// List all stored keys.
    pub fn keys(&self) -> Vec<String> {
        self.entries.read().unwrap().keys().cloned().collect()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn write(&self, key: &str, value: &str) -> Result<(), AutosignError> {
        self.entries
            .write()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Option<String>, AutosignError> {
        Ok(self.raw(key))
    }

    async fn remove(&self, key: &str) -> Result<(), AutosignError> {
        self.entries.write().unwrap().remove(key);
        Ok(())
    }
}
