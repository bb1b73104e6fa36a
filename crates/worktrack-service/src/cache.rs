use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};
use worktrack_core::board::BoardScope;
use worktrack_core::time_entry::DateRange;
use worktrack_core::timer::Provider;

use crate::ServiceError;

pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(30);

/// Identity of a cached query. Two requests with equal keys share one entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    Differs,
    Board(BoardScope),
    BoardProjects { organization: String },
    Iterations { organization: String, project: String },
    Timer(Provider),
    ProviderProjects(Provider),
    Activities { provider: Provider, project_id: String },
    TimeEntries { provider: Provider, range: DateRange },
    TimeInfo { provider: Provider, range: DateRange },
    Notifications,
    NotificationPreferences { repo_id: String },
}

impl QueryKey {
    pub fn provider(&self) -> Option<Provider> {
        match self {
            QueryKey::Timer(p) | QueryKey::ProviderProjects(p) => Some(*p),
            QueryKey::Activities { provider, .. }
            | QueryKey::TimeEntries { provider, .. }
            | QueryKey::TimeInfo { provider, .. } => Some(*provider),
            _ => None,
        }
    }

    /// Entries and time info for a provider, any date range.
    pub fn is_time_data_for(&self, provider: Provider) -> bool {
        matches!(
            self,
            QueryKey::TimeEntries { provider: p, .. } | QueryKey::TimeInfo { provider: p, .. }
                if *p == provider
        )
    }
}

struct Entry {
    value: serde_json::Value,
    fetched_at: Instant,
    invalidated: bool,
}

/// Query results keyed by `QueryKey`, stored as JSON so one cache can hold
/// every result type.
///
/// Invalidation marks an entry stale without dropping it, so the last value
/// stays readable until the refetch lands. `remove` drops it outright.
pub struct QueryCache {
    entries: Mutex<HashMap<QueryKey, Entry>>,
    stale_after: Duration,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(DEFAULT_STALE_AFTER)
    }
}

impl QueryCache {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            stale_after,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<QueryKey, Entry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get<T: DeserializeOwned>(&self, key: &QueryKey) -> Option<T> {
        let entries = self.lock();
        let entry = entries.get(key)?;
        match serde_json::from_value(entry.value.clone()) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(?key, "cached value has unexpected shape: {e}");
                None
            }
        }
    }

    pub fn set<T: Serialize>(&self, key: &QueryKey, value: &T) {
        match serde_json::to_value(value) {
            Ok(value) => {
                self.lock().insert(
                    key.clone(),
                    Entry {
                        value,
                        fetched_at: Instant::now(),
                        invalidated: false,
                    },
                );
            }
            Err(e) => warn!(?key, "value not cacheable: {e}"),
        }
    }

    /// Patch a cached value in place under the lock. Returns the closure's
    /// result, or `None` when nothing is cached for `key`.
    pub fn modify<T, R>(&self, key: &QueryKey, f: impl FnOnce(&mut T) -> R) -> Option<R>
    where
        T: Serialize + DeserializeOwned,
    {
        let mut entries = self.lock();
        let entry = entries.get_mut(key)?;
        let mut value: T = serde_json::from_value(entry.value.clone()).ok()?;
        let out = f(&mut value);
        match serde_json::to_value(&value) {
            Ok(v) => entry.value = v,
            Err(e) => {
                warn!(?key, "patched value not cacheable: {e}");
                return None;
            }
        }
        Some(out)
    }

    /// Optimistic patch: apply `f` and hand back the value it replaced.
    pub fn update<T>(&self, key: &QueryKey, f: impl FnOnce(&mut T)) -> Option<T>
    where
        T: Serialize + DeserializeOwned + Clone,
    {
        self.modify(key, |value: &mut T| {
            let previous = value.clone();
            f(value);
            previous
        })
    }

    pub fn remove(&self, key: &QueryKey) -> bool {
        self.lock().remove(key).is_some()
    }

    pub fn invalidate(&self, key: &QueryKey) {
        if let Some(entry) = self.lock().get_mut(key) {
            entry.invalidated = true;
        }
    }

    pub fn invalidate_where(&self, pred: impl Fn(&QueryKey) -> bool) -> usize {
        let mut count = 0;
        for (key, entry) in self.lock().iter_mut() {
            if pred(key) {
                entry.invalidated = true;
                count += 1;
            }
        }
        count
    }

    /// Missing entries count as stale.
    pub fn is_stale(&self, key: &QueryKey) -> bool {
        match self.lock().get(key) {
            Some(entry) => entry.invalidated || entry.fetched_at.elapsed() >= self.stale_after,
            None => true,
        }
    }

    pub fn contains(&self, key: &QueryKey) -> bool {
        self.lock().contains_key(key)
    }

    /// Cached value when fresh, otherwise run `fetcher` and cache its result.
    /// The lock is not held while the fetch is in flight.
    pub async fn fetch<T, F, Fut>(&self, key: QueryKey, fetcher: F) -> Result<T, ServiceError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        if !self.is_stale(&key) {
            if let Some(value) = self.get(&key) {
                return Ok(value);
            }
        }
        debug!(?key, "fetching");
        let value = fetcher().await?;
        self.set(&key, &value);
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_set_roundtrip() {
        let cache = QueryCache::default();
        cache.set(&QueryKey::Differs, &vec![1, 2, 3]);
        assert_eq!(cache.get::<Vec<i32>>(&QueryKey::Differs), Some(vec![1, 2, 3]));
        assert!(cache.get::<Vec<i32>>(&QueryKey::Notifications).is_none());
    }

    #[test]
    fn update_returns_previous_value() {
        let cache = QueryCache::default();
        cache.set(&QueryKey::Differs, &vec![1]);
        let previous = cache.update(&QueryKey::Differs, |v: &mut Vec<i32>| v.push(2));
        assert_eq!(previous, Some(vec![1]));
        assert_eq!(cache.get::<Vec<i32>>(&QueryKey::Differs), Some(vec![1, 2]));

        let missing = cache.update(&QueryKey::Notifications, |v: &mut Vec<i32>| v.push(2));
        assert!(missing.is_none());
    }

    #[test]
    fn invalidate_keeps_value_but_marks_stale() {
        let cache = QueryCache::default();
        cache.set(&QueryKey::Differs, &"x");
        assert!(!cache.is_stale(&QueryKey::Differs));
        cache.invalidate(&QueryKey::Differs);
        assert!(cache.is_stale(&QueryKey::Differs));
        assert_eq!(cache.get::<String>(&QueryKey::Differs).as_deref(), Some("x"));
    }

    #[test]
    fn invalidate_where_matches_provider_time_data() {
        let cache = QueryCache::default();
        let range = DateRange {
            from: chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            to: chrono::NaiveDate::from_ymd_opt(2024, 1, 7).unwrap(),
        };
        let mt = QueryKey::TimeEntries {
            provider: Provider::Milltime,
            range,
        };
        let tt = QueryKey::TimeEntries {
            provider: Provider::TimeTracking,
            range,
        };
        cache.set(&mt, &0);
        cache.set(&tt, &0);
        let n = cache.invalidate_where(|k| k.is_time_data_for(Provider::Milltime));
        assert_eq!(n, 1);
        assert!(cache.is_stale(&mt));
        assert!(!cache.is_stale(&tt));
    }

    #[test]
    fn zero_stale_time_is_always_stale() {
        let cache = QueryCache::new(Duration::ZERO);
        cache.set(&QueryKey::Differs, &1);
        assert!(cache.is_stale(&QueryKey::Differs));
    }

    #[tokio::test]
    async fn fetch_uses_fresh_cache_and_refetches_after_invalidate() {
        let cache = QueryCache::default();
        let calls = std::sync::atomic::AtomicUsize::new(0);
        let fetcher = || async {
            calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok::<_, ServiceError>(vec![42])
        };

        let first: Vec<i32> = cache.fetch(QueryKey::Differs, fetcher).await.unwrap();
        let second: Vec<i32> = cache.fetch(QueryKey::Differs, fetcher).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);

        cache.invalidate(&QueryKey::Differs);
        let _: Vec<i32> = cache.fetch(QueryKey::Differs, fetcher).await.unwrap();
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fetch_error_leaves_cache_untouched() {
        let cache = QueryCache::default();
        let result: Result<Vec<i32>, _> = cache
            .fetch(QueryKey::Differs, || async {
                Err(ServiceError::Internal("boom".into()))
            })
            .await;
        assert!(result.is_err());
        assert!(!cache.contains(&QueryKey::Differs));
    }
}
