use std::path::PathBuf;

use crate::{validate_key, PreferenceStore, StoreConfig, StoreError};

/// One JSON file per key under a data directory.
pub struct LocalStore {
    base_dir: PathBuf,
}

impl LocalStore {
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        let base_dir = config
            .local_data_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(default_data_dir);
        std::fs::create_dir_all(&base_dir)
            .map_err(|e| StoreError::Internal(format!("mkdir {}: {e}", base_dir.display())))?;
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, StoreError> {
        validate_key(key)?;
        Ok(self.base_dir.join(format!("{key}.json")))
    }
}

pub(crate) fn default_data_dir() -> PathBuf {
    let base = if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        PathBuf::from(xdg)
    } else if let Some(home) = std::env::var_os("HOME") {
        PathBuf::from(home).join(".local/share")
    } else {
        PathBuf::from(".")
    };
    base.join("worktrack")
}

impl PreferenceStore for LocalStore {
    fn get_raw(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.resolve(key)?;
        match std::fs::read_to_string(&path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Internal(format!(
                "read {}: {e}",
                path.display()
            ))),
        }
    }

    fn put_raw(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.resolve(key)?;
        // Write-then-rename; readers never see a half-written value.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value)
            .map_err(|e| StoreError::Internal(format!("write {}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, &path)
            .map_err(|e| StoreError::Internal(format!("rename {}: {e}", path.display())))
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let path = self.resolve(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Internal(format!(
                "delete {}: {e}",
                path.display()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store(dir: &std::path::Path) -> LocalStore {
        let config = StoreConfig {
            local_data_dir: Some(dir.to_string_lossy().to_string()),
            in_memory: false,
        };
        LocalStore::new(&config).unwrap()
    }

    #[test]
    fn put_then_get_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let store = test_store(tmp.path());

        store.put_raw("theme", "\"dark\"").unwrap();
        assert_eq!(store.get_raw("theme").unwrap().as_deref(), Some("\"dark\""));
    }

    #[test]
    fn get_missing_returns_none() {
        let tmp = tempfile::tempdir().unwrap();
        let store = test_store(tmp.path());
        assert!(store.get_raw("nothing").unwrap().is_none());
    }

    #[test]
    fn put_overwrites_existing() {
        let tmp = tempfile::tempdir().unwrap();
        let store = test_store(tmp.path());

        store.put_raw("key", "1").unwrap();
        store.put_raw("key", "2").unwrap();
        assert_eq!(store.get_raw("key").unwrap().as_deref(), Some("2"));
        assert!(!tmp.path().join("key.json.tmp").exists());
    }

    #[test]
    fn remove_missing_is_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let store = test_store(tmp.path());
        store.remove("never-written").unwrap();
        store.put_raw("k", "1").unwrap();
        store.remove("k").unwrap();
        assert!(!store.contains("k").unwrap());
    }

    #[test]
    fn rejects_path_like_keys() {
        let tmp = tempfile::tempdir().unwrap();
        let store = test_store(tmp.path());
        assert!(matches!(
            store.put_raw("../outside", "1"),
            Err(StoreError::InvalidKey(_))
        ));
    }

    #[test]
    fn creates_missing_base_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("a/b");
        let store = test_store(&nested);
        assert!(store.base_dir().exists());
    }
}
