//! Writes that touch cached queries.
//!
//! Most follow the same shape: patch the cached value, send the request,
//! put the captured value back if the request fails, and invalidate on
//! settle so the next read refetches.

use std::future::Future;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, warn};
use worktrack_core::differ::{self, Differ, DifferStatus, RepositoryKey};
use worktrack_core::notification::{self, Notification, NotificationPreferences};
use worktrack_core::push::{decode_vapid_key, PushSubscription};
use worktrack_core::time_entry::{CreateTimeEntry, TimeEntry, UpdateTimeEntry};
use worktrack_core::timer::{EditTimer, Provider, StartTimer, StopTimer, TimerSnapshot};

use crate::cache::{QueryCache, QueryKey};
use crate::{ServiceError, TrackerService};

/// Optimistic update of one cached query around `request`.
///
/// When nothing is cached under `key` the patch is skipped and the request
/// still runs.
pub async fn mutate<T, P, F, Fut>(
    cache: &QueryCache,
    key: &QueryKey,
    patch: P,
    request: F,
) -> Result<(), ServiceError>
where
    T: Serialize + DeserializeOwned + Clone,
    P: FnOnce(&mut T),
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<(), ServiceError>>,
{
    let previous = cache.update(key, patch);
    let result = request().await;
    if let Err(ref e) = result {
        if let Some(previous) = previous {
            warn!(?key, "request failed, rolling back: {e}");
            cache.set(key, &previous);
        }
    }
    cache.invalidate(key);
    result
}

// -- Differs --

pub async fn follow_repository(
    service: &dyn TrackerService,
    cache: &QueryCache,
    key: &RepositoryKey,
    follow: bool,
) -> Result<(), ServiceError> {
    mutate(
        cache,
        &QueryKey::Differs,
        |list: &mut Vec<Differ>| {
            differ::set_followed(list, key, follow);
        },
        || service.follow_repository(key, follow),
    )
    .await
}

pub async fn start_differ(
    service: &dyn TrackerService,
    cache: &QueryCache,
    key: &RepositoryKey,
) -> Result<(), ServiceError> {
    mutate(
        cache,
        &QueryKey::Differs,
        |list: &mut Vec<Differ>| {
            differ::set_status(list, key, DifferStatus::Running);
        },
        || service.start_differ(key),
    )
    .await
}

pub async fn stop_differ(
    service: &dyn TrackerService,
    cache: &QueryCache,
    key: &RepositoryKey,
) -> Result<(), ServiceError> {
    mutate(
        cache,
        &QueryKey::Differs,
        |list: &mut Vec<Differ>| {
            differ::set_status(list, key, DifferStatus::Stopped);
        },
        || service.stop_differ(key),
    )
    .await
}

pub async fn add_repository(
    service: &dyn TrackerService,
    cache: &QueryCache,
    key: &RepositoryKey,
) -> Result<(), ServiceError> {
    let result = service.add_repository(key).await;
    cache.invalidate(&QueryKey::Differs);
    result
}

pub async fn delete_repository(
    service: &dyn TrackerService,
    cache: &QueryCache,
    key: &RepositoryKey,
) -> Result<(), ServiceError> {
    mutate(
        cache,
        &QueryKey::Differs,
        |list: &mut Vec<Differ>| list.retain(|d| &d.key != key),
        || service.delete_repository(key),
    )
    .await
}

// -- Notifications --

pub async fn mark_notification_viewed(
    service: &dyn TrackerService,
    cache: &QueryCache,
    id: i64,
) -> Result<(), ServiceError> {
    mutate(
        cache,
        &QueryKey::Notifications,
        |list: &mut Vec<Notification>| {
            notification::mark_viewed(list, id);
        },
        || service.mark_notification_viewed(id),
    )
    .await
}

pub async fn delete_notification(
    service: &dyn TrackerService,
    cache: &QueryCache,
    id: i64,
) -> Result<(), ServiceError> {
    mutate(
        cache,
        &QueryKey::Notifications,
        |list: &mut Vec<Notification>| {
            notification::remove(list, id);
        },
        || service.delete_notification(id),
    )
    .await
}

pub async fn set_notification_preferences(
    service: &dyn TrackerService,
    cache: &QueryCache,
    preferences: &NotificationPreferences,
) -> Result<(), ServiceError> {
    let key = QueryKey::NotificationPreferences {
        repo_id: preferences.repo_id.clone(),
    };
    mutate(
        cache,
        &key,
        |cached: &mut NotificationPreferences| *cached = preferences.clone(),
        || service.set_notification_preferences(preferences),
    )
    .await
}

/// Register a push endpoint. The server's application key is checked first;
/// a subscription made against a malformed key would never receive anything.
pub async fn subscribe_push(
    service: &dyn TrackerService,
    vapid_key: &str,
    subscription: &PushSubscription,
) -> Result<(), ServiceError> {
    decode_vapid_key(vapid_key)?;
    if subscription.endpoint.trim().is_empty() {
        return Err(ServiceError::InvalidInput("push endpoint is empty".into()));
    }
    service.subscribe_push(subscription).await?;
    info!(endpoint = %subscription.endpoint, "push subscription registered");
    Ok(())
}

// -- Timer --

/// The cached timer is dropped before the request goes out, so nothing
/// shows a stale timer while the start is pending.
pub async fn start_timer(
    service: &dyn TrackerService,
    cache: &QueryCache,
    provider: Provider,
    input: &StartTimer,
) -> Result<(), ServiceError> {
    let key = QueryKey::Timer(provider);
    cache.remove(&key);
    let result = service.start_timer(provider, input).await;
    if result.is_ok() {
        info!(
            provider = provider.as_str(),
            project = %input.project_name,
            activity = %input.activity_name,
            "timer started"
        );
    }
    cache.invalidate(&key);
    result
}

/// Stopping registers the running time as an entry, so the provider's time
/// data is invalidated along with the timer.
pub async fn stop_timer(
    service: &dyn TrackerService,
    cache: &QueryCache,
    provider: Provider,
    input: &StopTimer,
) -> Result<(), ServiceError> {
    let result = mutate(
        cache,
        &QueryKey::Timer(provider),
        |timer: &mut Option<TimerSnapshot>| *timer = None,
        || service.stop_timer(provider, input),
    )
    .await;
    if result.is_ok() {
        info!(provider = provider.as_str(), "timer stopped");
    }
    cache.invalidate_where(|k| k.is_time_data_for(provider));
    result
}

pub async fn delete_timer(
    service: &dyn TrackerService,
    cache: &QueryCache,
    provider: Provider,
) -> Result<(), ServiceError> {
    mutate(
        cache,
        &QueryKey::Timer(provider),
        |timer: &mut Option<TimerSnapshot>| *timer = None,
        || service.delete_timer(provider),
    )
    .await
}

pub async fn edit_timer(
    service: &dyn TrackerService,
    cache: &QueryCache,
    provider: Provider,
    input: &EditTimer,
) -> Result<(), ServiceError> {
    mutate(
        cache,
        &QueryKey::Timer(provider),
        |timer: &mut Option<TimerSnapshot>| {
            if let Some(t) = timer.as_mut() {
                if let Some(note) = &input.note {
                    t.note = Some(note.clone());
                }
                if let Some(start) = input.start_time {
                    t.start_time = start;
                }
            }
        },
        || service.edit_timer(provider, input),
    )
    .await
}

// -- Time entries --

pub async fn create_time_entry(
    service: &dyn TrackerService,
    cache: &QueryCache,
    provider: Provider,
    input: &CreateTimeEntry,
) -> Result<(), ServiceError> {
    let result = service.create_time_entry(provider, input).await;
    cache.invalidate_where(|k| k.is_time_data_for(provider));
    result
}

/// Attested entries are rejected before any request is made.
pub async fn update_time_entry(
    service: &dyn TrackerService,
    cache: &QueryCache,
    provider: Provider,
    existing: &TimeEntry,
    input: &UpdateTimeEntry,
) -> Result<(), ServiceError> {
    existing.ensure_editable()?;
    let result = service.update_time_entry(provider, input).await;
    cache.invalidate_where(|k| k.is_time_data_for(provider));
    result
}

pub async fn delete_time_entry(
    service: &dyn TrackerService,
    cache: &QueryCache,
    provider: Provider,
    existing: &TimeEntry,
) -> Result<(), ServiceError> {
    existing.ensure_editable()?;
    let result = service
        .delete_time_entry(provider, &existing.registration_id)
        .await;
    cache.invalidate_where(|k| k.is_time_data_for(provider));
    result
}
