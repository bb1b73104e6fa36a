use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;
use worktrack_core::board_filter::{CategoryFilter, HiddenColumns, MemberFilter};

use crate::{
    PreferenceStore, StoreError, CATEGORY_FILTER_KEY, HIDDEN_COLUMNS_KEY, LAST_ACTIVITY_KEY,
    LAST_PROJECT_KEY, MEMBER_FILTER_KEY, MERGE_ENTRIES_KEY, REMEMBER_LAST_PROJECT_KEY, THEME_KEY,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    #[default]
    System,
    Light,
    Dark,
}

impl Theme {
    pub fn next(self) -> Self {
        match self {
            Theme::System => Theme::Light,
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::System,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Theme::System => "system",
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastProject {
    pub project_id: String,
    pub project_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastActivity {
    pub activity_id: String,
    pub activity_name: String,
}

/// Typed handle on one stored value. A missing or unreadable value loads as
/// `T::default()`; it is never an error.
pub struct Preference<T> {
    store: Arc<dyn PreferenceStore>,
    key: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Preference<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    pub fn new(store: Arc<dyn PreferenceStore>, key: &'static str) -> Self {
        Self {
            store,
            key,
            _marker: PhantomData,
        }
    }

    pub fn key(&self) -> &'static str {
        self.key
    }

    pub fn load(&self) -> T {
        match self.store.get_raw(self.key) {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(key = self.key, "ignoring malformed preference: {e}");
                T::default()
            }),
            Ok(None) => T::default(),
            Err(e) => {
                warn!(key = self.key, "preference read failed: {e}");
                T::default()
            }
        }
    }

    pub fn save(&self, value: &T) -> Result<(), StoreError> {
        let raw = serde_json::to_string(value).map_err(|e| StoreError::Serialize {
            key: self.key.to_string(),
            message: e.to_string(),
        })?;
        self.store.put_raw(self.key, &raw)
    }

    /// Load, modify, save; returns the saved value.
    pub fn update(&self, f: impl FnOnce(&mut T)) -> Result<T, StoreError> {
        let mut value = self.load();
        f(&mut value);
        self.save(&value)?;
        Ok(value)
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        self.store.remove(self.key)
    }
}

/// All persisted UI preferences, backed by one store.
#[derive(Clone)]
pub struct Preferences {
    store: Arc<dyn PreferenceStore>,
}

impl Preferences {
    pub fn new(store: Arc<dyn PreferenceStore>) -> Self {
        Self { store }
    }

    fn handle<T>(&self, key: &'static str) -> Preference<T>
    where
        T: Serialize + DeserializeOwned + Default,
    {
        Preference::new(self.store.clone(), key)
    }

    pub fn theme(&self) -> Preference<Theme> {
        self.handle(THEME_KEY)
    }

    pub fn last_project(&self) -> Preference<Option<LastProject>> {
        self.handle(LAST_PROJECT_KEY)
    }

    pub fn last_activity(&self) -> Preference<Option<LastActivity>> {
        self.handle(LAST_ACTIVITY_KEY)
    }

    pub fn remember_last_project(&self) -> Preference<bool> {
        self.handle(REMEMBER_LAST_PROJECT_KEY)
    }

    pub fn member_filter(&self) -> Preference<MemberFilter> {
        self.handle(MEMBER_FILTER_KEY)
    }

    pub fn category_filter(&self) -> Preference<CategoryFilter> {
        self.handle(CATEGORY_FILTER_KEY)
    }

    pub fn hidden_columns(&self) -> Preference<HiddenColumns> {
        self.handle(HIDDEN_COLUMNS_KEY)
    }

    pub fn merge_entries(&self) -> Preference<bool> {
        self.handle(MERGE_ENTRIES_KEY)
    }

    /// Record the project last used for a timer or entry, if the user asked
    /// for it to be remembered. Forgets it otherwise.
    pub fn note_project_used(&self, project: LastProject) -> Result<(), StoreError> {
        if self.remember_last_project().load() {
            self.last_project().save(&Some(project))
        } else {
            self.last_project().clear()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LocalStore, MemoryStore, StoreConfig};
    use worktrack_core::board_filter::MemberMode;
    use worktrack_core::WorkItemCategory;

    fn prefs() -> Preferences {
        Preferences::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn missing_values_load_defaults() {
        let p = prefs();
        assert_eq!(p.theme().load(), Theme::System);
        assert!(p.last_project().load().is_none());
        assert!(!p.remember_last_project().load());
        assert_eq!(p.member_filter().load().mode, MemberMode::Mine);
        assert_eq!(
            p.category_filter().load().enabled.len(),
            WorkItemCategory::ALL.len()
        );
    }

    #[test]
    fn malformed_value_falls_back_to_default() {
        let store = Arc::new(MemoryStore::new());
        store.put_raw(THEME_KEY, "{not json").unwrap();
        store.put_raw(MEMBER_FILTER_KEY, "[1,2,3]").unwrap();
        let p = Preferences::new(store);
        assert_eq!(p.theme().load(), Theme::System);
        assert_eq!(p.member_filter().load(), MemberFilter::default());
    }

    #[test]
    fn theme_cycles_back_to_system() {
        let mut theme = Theme::default();
        let mut seen = Vec::new();
        for _ in 0..3 {
            theme = theme.next();
            seen.push(theme.display_name());
        }
        assert_eq!(seen, ["light", "dark", "system"]);
    }

    #[test]
    fn update_persists_through_local_store() {
        let tmp = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            local_data_dir: Some(tmp.path().to_string_lossy().to_string()),
            in_memory: false,
        };
        let p = Preferences::new(Arc::new(LocalStore::new(&config).unwrap()));
        p.hidden_columns().update(|h| h.toggle("col-1")).unwrap();
        p.theme().save(&Theme::Dark).unwrap();

        let reopened = Preferences::new(Arc::new(LocalStore::new(&config).unwrap()));
        assert!(reopened.hidden_columns().load().is_hidden("col-1"));
        assert_eq!(reopened.theme().load(), Theme::Dark);
    }

    #[test]
    fn corrupt_file_on_disk_loads_default() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("board-hidden-columns.json"), "\u{0}garbage").unwrap();
        let config = StoreConfig {
            local_data_dir: Some(tmp.path().to_string_lossy().to_string()),
            in_memory: false,
        };
        let p = Preferences::new(Arc::new(LocalStore::new(&config).unwrap()));
        assert_eq!(p.hidden_columns().load(), HiddenColumns::default());
    }

    #[test]
    fn last_project_only_kept_when_remembered() {
        let p = prefs();
        let project = LastProject {
            project_id: "42".into(),
            project_name: "Internal".into(),
        };
        p.note_project_used(project.clone()).unwrap();
        assert!(p.last_project().load().is_none());

        p.remember_last_project().save(&true).unwrap();
        p.note_project_used(project.clone()).unwrap();
        assert_eq!(p.last_project().load(), Some(project));
    }
}
