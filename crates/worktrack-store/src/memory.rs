use std::collections::HashMap;
use std::sync::Mutex;

use crate::{validate_key, PreferenceStore, StoreError};

#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, StoreError> {
        self.values
            .lock()
            .map_err(|_| StoreError::Internal("memory store poisoned".into()))
    }
}

impl PreferenceStore for MemoryStore {
    fn get_raw(&self, key: &str) -> Result<Option<String>, StoreError> {
        validate_key(key)?;
        Ok(self.lock()?.get(key).cloned())
    }

    fn put_raw(&self, key: &str, value: &str) -> Result<(), StoreError> {
        validate_key(key)?;
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        validate_key(key)?;
        self.lock()?.remove(key);
        Ok(())
    }
}
