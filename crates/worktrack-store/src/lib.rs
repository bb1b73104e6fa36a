mod local;
mod memory;
mod preference;

pub use local::LocalStore;
pub use memory::MemoryStore;
pub use preference::{LastActivity, LastProject, Preference, Preferences, Theme};

use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("serialize {key}: {message}")]
    Serialize { key: String, message: String },

    #[error("store error: {0}")]
    Internal(String),
}

/// Synchronous key-value store for small JSON preference values.
/// Reads happen at startup, writes on every change; the last write wins.
pub trait PreferenceStore: Send + Sync {
    /// Raw stored value, or `None` if the key was never written.
    fn get_raw(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write (create or overwrite) a value.
    fn put_raw(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Delete a value. No-op if absent.
    fn remove(&self, key: &str) -> Result<(), StoreError>;

    fn contains(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.get_raw(key)?.is_some())
    }
}

// -- Keys --

pub const THEME_KEY: &str = "theme";
pub const LAST_PROJECT_KEY: &str = "last-project";
pub const LAST_ACTIVITY_KEY: &str = "last-activity";
pub const REMEMBER_LAST_PROJECT_KEY: &str = "remember-last-project";
pub const MEMBER_FILTER_KEY: &str = "board-member-filter";
pub const CATEGORY_FILTER_KEY: &str = "board-category-filter";
pub const HIDDEN_COLUMNS_KEY: &str = "board-hidden-columns";
pub const MERGE_ENTRIES_KEY: &str = "time-entries-merge";

/// Keys become file names, so only a conservative character set is accepted.
pub(crate) fn validate_key(key: &str) -> Result<(), StoreError> {
    let ok = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}

// -- Configuration --

pub struct StoreConfig {
    /// Directory holding one JSON file per key. `None` uses the default data dir.
    pub local_data_dir: Option<String>,
    /// Keep everything in memory (tests, `--no-persist`).
    pub in_memory: bool,
}

impl StoreConfig {
    pub fn from_env() -> Self {
        Self {
            local_data_dir: std::env::var("WORKTRACK_DATA_DIR").ok(),
            in_memory: false,
        }
    }
}

pub fn create_store(config: &StoreConfig) -> Result<Arc<dyn PreferenceStore>, StoreError> {
    if config.in_memory {
        Ok(Arc::new(MemoryStore::new()))
    } else {
        Ok(Arc::new(LocalStore::new(config)?))
    }
}
