//! In-flight update guard

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Set of keys with an operation in flight. At most one holder per key.
#[derive(Debug, Clone, Default)]
pub struct UpdateGuard {
    keys: Arc<Mutex<HashSet<String>>>,
}

impl UpdateGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key`. Returns `None` if someone else already holds it.
    pub fn try_acquire(&self, key: impl Into<String>) -> Option<UpdateTicket> {
        let key = key.into();
        let mut keys = self.keys.lock().unwrap_or_else(|e| e.into_inner());
        if !keys.insert(key.clone()) {
            return None;
        }
        Some(UpdateTicket {
            key,
            keys: self.keys.clone(),
        })
    }

    pub fn is_held(&self, key: &str) -> bool {
        let keys = self.keys.lock().unwrap_or_else(|e| e.into_inner());
        keys.contains(key)
    }

    pub fn len(&self) -> usize {
        let keys = self.keys.lock().unwrap_or_else(|e| e.into_inner());
        keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Held key; released on drop
#[derive(Debug)]
pub struct UpdateTicket {
    key: String,
    keys: Arc<Mutex<HashSet<String>>>,
}

impl UpdateTicket {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for UpdateTicket {
    fn drop(&mut self) {
        let mut keys = self.keys.lock().unwrap_or_else(|e| e.into_inner());
        keys.remove(&self.key);
    }
}

/// Guard key for updating one stack on one agent
pub fn stack_key(agent_id: &str, stack: &str) -> String {
    format!("{}/{}", agent_id, stack)
}
