use tokio::runtime::Runtime;
use worktrack_core::board::{Board, BoardProject, BoardScope, Iteration};
use worktrack_core::differ::{Differ, RepositoryKey};
use worktrack_core::notification::{
    Notification, NotificationException, NotificationPreferences, NotificationType,
};
use worktrack_core::push::PushSubscription;
use worktrack_core::time_entry::{
    Activity, CreateTimeEntry, DateRange, ProviderProject, TimeEntry, TimeInfo, UpdateTimeEntry,
};
use worktrack_core::timer::{EditTimer, Provider, StartTimer, StopTimer, TimerSnapshot};

use crate::board_move::{BeginMove, BoardMover, MoveOutcome, PendingMove};
use crate::cache::{QueryCache, QueryKey};
use crate::session::ProviderSession;
use crate::{mutations, queries, Credentials, HttpConfig, HttpService, ServiceError, TrackerService};

/// Blocking wrapper around the async `HttpService`, its query cache and the
/// board mover.
///
/// Creates an internal tokio runtime and uses `block_on()` for each call.
/// Designed for sync callers like the TUI.
pub struct BlockingHttpService {
    inner: HttpService,
    cache: QueryCache,
    mover: BoardMover,
    rt: Runtime,
}

impl BlockingHttpService {
    pub fn new(inner: HttpService) -> Result<Self, ServiceError> {
        let rt = Runtime::new()
            .map_err(|e| ServiceError::Internal(format!("failed to create tokio runtime: {e}")))?;
        Ok(Self {
            inner,
            cache: QueryCache::default(),
            mover: BoardMover::new(),
            rt,
        })
    }

    pub fn connect(config: &HttpConfig) -> Result<Self, ServiceError> {
        Self::new(HttpService::new(config))
    }

    pub fn service(&self) -> &HttpService {
        &self.inner
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn invalidate(&self, key: &QueryKey) {
        self.cache.invalidate(key);
    }

    // -- Differs --

    pub fn differs(&self) -> Result<Vec<Differ>, ServiceError> {
        self.rt.block_on(queries::differs(&self.inner, &self.cache))
    }

    pub fn follow_repository(&self, key: &RepositoryKey, follow: bool) -> Result<(), ServiceError> {
        self.rt.block_on(mutations::follow_repository(
            &self.inner,
            &self.cache,
            key,
            follow,
        ))
    }

    pub fn start_differ(&self, key: &RepositoryKey) -> Result<(), ServiceError> {
        self.rt
            .block_on(mutations::start_differ(&self.inner, &self.cache, key))
    }

    pub fn stop_differ(&self, key: &RepositoryKey) -> Result<(), ServiceError> {
        self.rt
            .block_on(mutations::stop_differ(&self.inner, &self.cache, key))
    }

    pub fn add_repository(&self, key: &RepositoryKey) -> Result<(), ServiceError> {
        self.rt
            .block_on(mutations::add_repository(&self.inner, &self.cache, key))
    }

    pub fn delete_repository(&self, key: &RepositoryKey) -> Result<(), ServiceError> {
        self.rt
            .block_on(mutations::delete_repository(&self.inner, &self.cache, key))
    }

    // -- Board --

    pub fn board(&self, scope: &BoardScope) -> Result<Board, ServiceError> {
        self.rt
            .block_on(queries::board(&self.inner, &self.cache, scope))
    }

    pub fn board_projects(&self, organization: &str) -> Result<Vec<BoardProject>, ServiceError> {
        self.rt.block_on(queries::board_projects(
            &self.inner,
            &self.cache,
            organization,
        ))
    }

    pub fn iterations(
        &self,
        organization: &str,
        project: &str,
    ) -> Result<Vec<Iteration>, ServiceError> {
        self.rt.block_on(queries::iterations(
            &self.inner,
            &self.cache,
            organization,
            project,
        ))
    }

    /// Patch the cached board only. Pair with `finish_move` once the caller
    /// has redrawn.
    pub fn begin_move(
        &self,
        scope: &BoardScope,
        item_id: i64,
        target_column_id: &str,
    ) -> Result<BeginMove, ServiceError> {
        self.mover
            .begin(&self.cache, scope, item_id, target_column_id)
    }

    pub fn finish_move(&self, pending: PendingMove) -> Result<(), ServiceError> {
        self.rt
            .block_on(self.mover.finish(&self.inner, &self.cache, pending))
    }

    pub fn move_item(
        &self,
        scope: &BoardScope,
        item_id: i64,
        target_column_id: &str,
    ) -> Result<MoveOutcome, ServiceError> {
        self.rt.block_on(self.mover.move_item(
            &self.inner,
            &self.cache,
            scope,
            item_id,
            target_column_id,
        ))
    }

    pub fn format_for_llm(
        &self,
        organization: &str,
        project: &str,
        work_item_id: i64,
    ) -> Result<String, ServiceError> {
        self.rt
            .block_on(self.inner.format_for_llm(organization, project, work_item_id))
    }

    // -- Provider session --

    pub fn session(&self, provider: Provider) -> ProviderSession {
        ProviderSession::from_service(provider, &self.inner)
    }

    pub fn authenticate(
        &self,
        session: &mut ProviderSession,
        credentials: &Credentials,
    ) -> Result<(), ServiceError> {
        self.rt
            .block_on(session.authenticate(&self.inner, &self.cache, credentials, || {}))
    }

    pub fn log_out(&self, session: &mut ProviderSession) {
        session.reset(&self.inner, &self.cache);
    }

    // -- Timer --

    pub fn timer(&self, provider: Provider) -> Result<Option<TimerSnapshot>, ServiceError> {
        self.rt
            .block_on(queries::timer(&self.inner, &self.cache, provider))
    }

    pub fn start_timer(&self, provider: Provider, input: &StartTimer) -> Result<(), ServiceError> {
        self.rt.block_on(mutations::start_timer(
            &self.inner,
            &self.cache,
            provider,
            input,
        ))
    }

    pub fn stop_timer(&self, provider: Provider, input: &StopTimer) -> Result<(), ServiceError> {
        self.rt.block_on(mutations::stop_timer(
            &self.inner,
            &self.cache,
            provider,
            input,
        ))
    }

    pub fn delete_timer(&self, provider: Provider) -> Result<(), ServiceError> {
        self.rt
            .block_on(mutations::delete_timer(&self.inner, &self.cache, provider))
    }

    pub fn edit_timer(&self, provider: Provider, input: &EditTimer) -> Result<(), ServiceError> {
        self.rt.block_on(mutations::edit_timer(
            &self.inner,
            &self.cache,
            provider,
            input,
        ))
    }

    // -- Time entries --

    pub fn provider_projects(&self, provider: Provider) -> Result<Vec<ProviderProject>, ServiceError> {
        self.rt.block_on(queries::provider_projects(
            &self.inner,
            &self.cache,
            provider,
        ))
    }

    pub fn activities(
        &self,
        provider: Provider,
        project_id: &str,
    ) -> Result<Vec<Activity>, ServiceError> {
        self.rt.block_on(queries::activities(
            &self.inner,
            &self.cache,
            provider,
            project_id,
        ))
    }

    pub fn time_entries(
        &self,
        provider: Provider,
        range: DateRange,
    ) -> Result<Vec<TimeEntry>, ServiceError> {
        self.rt.block_on(queries::time_entries(
            &self.inner,
            &self.cache,
            provider,
            range,
        ))
    }

    pub fn time_info(&self, provider: Provider, range: DateRange) -> Result<TimeInfo, ServiceError> {
        self.rt.block_on(queries::time_info(
            &self.inner,
            &self.cache,
            provider,
            range,
        ))
    }

    pub fn create_time_entry(
        &self,
        provider: Provider,
        input: &CreateTimeEntry,
    ) -> Result<(), ServiceError> {
        self.rt.block_on(mutations::create_time_entry(
            &self.inner,
            &self.cache,
            provider,
            input,
        ))
    }

    pub fn update_time_entry(
        &self,
        provider: Provider,
        existing: &TimeEntry,
        input: &UpdateTimeEntry,
    ) -> Result<(), ServiceError> {
        self.rt.block_on(mutations::update_time_entry(
            &self.inner,
            &self.cache,
            provider,
            existing,
            input,
        ))
    }

    pub fn delete_time_entry(
        &self,
        provider: Provider,
        existing: &TimeEntry,
    ) -> Result<(), ServiceError> {
        self.rt.block_on(mutations::delete_time_entry(
            &self.inner,
            &self.cache,
            provider,
            existing,
        ))
    }

    // -- Notifications --

    pub fn notifications(&self) -> Result<Vec<Notification>, ServiceError> {
        self.rt
            .block_on(queries::notifications(&self.inner, &self.cache))
    }

    pub fn mark_notification_viewed(&self, id: i64) -> Result<(), ServiceError> {
        self.rt.block_on(mutations::mark_notification_viewed(
            &self.inner,
            &self.cache,
            id,
        ))
    }

    pub fn delete_notification(&self, id: i64) -> Result<(), ServiceError> {
        self.rt
            .block_on(mutations::delete_notification(&self.inner, &self.cache, id))
    }

    pub fn subscribe_push(
        &self,
        vapid_key: &str,
        subscription: &PushSubscription,
    ) -> Result<(), ServiceError> {
        self.rt
            .block_on(mutations::subscribe_push(&self.inner, vapid_key, subscription))
    }

    pub fn notification_preferences(
        &self,
        repo_id: &str,
    ) -> Result<NotificationPreferences, ServiceError> {
        self.rt.block_on(queries::notification_preferences(
            &self.inner,
            &self.cache,
            repo_id,
        ))
    }

    pub fn set_notification_preferences(
        &self,
        preferences: &NotificationPreferences,
    ) -> Result<(), ServiceError> {
        self.rt.block_on(mutations::set_notification_preferences(
            &self.inner,
            &self.cache,
            preferences,
        ))
    }

    pub fn notification_exception(
        &self,
        repo_id: &str,
        pull_request_id: i64,
        kind: NotificationType,
    ) -> Result<Option<NotificationException>, ServiceError> {
        self.rt.block_on(
            self.inner
                .get_notification_exception(repo_id, pull_request_id, kind),
        )
    }

    pub fn set_notification_exception(
        &self,
        exception: &NotificationException,
    ) -> Result<(), ServiceError> {
        self.rt
            .block_on(self.inner.set_notification_exception(exception))
    }

    pub fn delete_notification_exception(
        &self,
        repo_id: &str,
        pull_request_id: i64,
        kind: NotificationType,
    ) -> Result<(), ServiceError> {
        self.rt.block_on(
            self.inner
                .delete_notification_exception(repo_id, pull_request_id, kind),
        )
    }
}
