// src/listeners/manager.rs

use crate::error::{Error, Result};
use crate::listeners::Listener;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Keyed inventory of live listeners.
#[derive(Default)]
pub struct ListenerManager {
    listeners: RwLock<HashMap<String, Arc<Listener>>>,
}

impl ListenerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener; IDs are unique within the manager.
    pub fn add(&self, listener: Arc<Listener>) -> Result<()> {
        let mut listeners = self.listeners.write();
        let id = listener.id().to_string();
        if listeners.contains_key(&id) {
            return Err(Error::DuplicateListener(id));
        }
        listeners.insert(id, listener);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Arc<Listener>> {
        self.listeners
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::ListenerNotFound(id.to_string()))
    }

    pub fn list(&self) -> Vec<Arc<Listener>> {
        self.listeners.read().values().cloned().collect()
    }

    pub fn remove(&self, id: &str) -> Result<()> {
        self.listeners
            .write()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| Error::ListenerNotFound(id.to_string()))
    }

    pub fn count(&self) -> usize {
        self.listeners.read().len()
    }
}
