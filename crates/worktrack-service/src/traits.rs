use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use worktrack_core::board::{Board, BoardProject, BoardScope, Iteration, MoveWorkItem};
use worktrack_core::differ::{Differ, RepositoryKey};
use worktrack_core::notification::{
    Notification, NotificationException, NotificationPreferences, NotificationType,
};
use worktrack_core::push::PushSubscription;
use worktrack_core::time_entry::{
    Activity, CreateTimeEntry, DateRange, ProviderProject, TimeEntry, TimeInfo, UpdateTimeEntry,
};
use worktrack_core::timer::{EditTimer, Provider, StartTimer, StopTimer, TimerSnapshot};
use worktrack_core::WorktrackError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// 401 from the backend. `provider` is set for provider-scoped requests.
    #[error("unauthorized{}", .provider.map(|p| format!(" ({p})")).unwrap_or_default())]
    Unauthorized { provider: Option<Provider> },

    #[error("locked: {0}")]
    Locked(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<WorktrackError> for ServiceError {
    fn from(e: WorktrackError) -> Self {
        match e {
            WorktrackError::NotFound(msg) => ServiceError::NotFound(msg),
            WorktrackError::InvalidInput(msg) => ServiceError::InvalidInput(msg),
            WorktrackError::Locked(msg) => ServiceError::Locked(msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Every remote operation the client performs.
///
/// The terminal UI and the cache helpers program against this trait.
/// `HttpService` is the only production implementation.
#[async_trait]
pub trait TrackerService: Send + Sync {
    // -- Differs / repositories --
    async fn list_differs(&self) -> Result<Vec<Differ>, ServiceError>;
    async fn start_differ(&self, key: &RepositoryKey) -> Result<(), ServiceError>;
    async fn stop_differ(&self, key: &RepositoryKey) -> Result<(), ServiceError>;
    async fn add_repository(&self, key: &RepositoryKey) -> Result<(), ServiceError>;
    async fn follow_repository(&self, key: &RepositoryKey, follow: bool)
        -> Result<(), ServiceError>;
    async fn delete_repository(&self, key: &RepositoryKey) -> Result<(), ServiceError>;

    // -- Work items --
    async fn get_board(&self, scope: &BoardScope) -> Result<Board, ServiceError>;
    async fn list_board_projects(&self, organization: &str)
        -> Result<Vec<BoardProject>, ServiceError>;
    async fn list_iterations(
        &self,
        organization: &str,
        project: &str,
    ) -> Result<Vec<Iteration>, ServiceError>;
    async fn move_work_item(&self, input: &MoveWorkItem) -> Result<(), ServiceError>;
    async fn format_for_llm(
        &self,
        organization: &str,
        project: &str,
        work_item_id: i64,
    ) -> Result<String, ServiceError>;

    // -- Provider session --
    async fn authenticate(
        &self,
        provider: Provider,
        credentials: &Credentials,
    ) -> Result<(), ServiceError>;
    /// Whether session cookies for the provider are present.
    fn has_session(&self, provider: Provider) -> bool;
    /// Drop the provider's session cookies (host and parent domain).
    fn clear_session(&self, provider: Provider);

    // -- Provider timer --
    async fn get_timer(&self, provider: Provider) -> Result<Option<TimerSnapshot>, ServiceError>;
    async fn start_timer(&self, provider: Provider, input: &StartTimer)
        -> Result<(), ServiceError>;
    async fn stop_timer(&self, provider: Provider, input: &StopTimer) -> Result<(), ServiceError>;
    async fn delete_timer(&self, provider: Provider) -> Result<(), ServiceError>;
    async fn edit_timer(&self, provider: Provider, input: &EditTimer) -> Result<(), ServiceError>;

    // -- Provider time entries --
    async fn list_provider_projects(
        &self,
        provider: Provider,
    ) -> Result<Vec<ProviderProject>, ServiceError>;
    async fn list_activities(
        &self,
        provider: Provider,
        project_id: &str,
    ) -> Result<Vec<Activity>, ServiceError>;
    async fn list_time_entries(
        &self,
        provider: Provider,
        range: &DateRange,
    ) -> Result<Vec<TimeEntry>, ServiceError>;
    async fn create_time_entry(
        &self,
        provider: Provider,
        input: &CreateTimeEntry,
    ) -> Result<(), ServiceError>;
    async fn update_time_entry(
        &self,
        provider: Provider,
        input: &UpdateTimeEntry,
    ) -> Result<(), ServiceError>;
    async fn delete_time_entry(
        &self,
        provider: Provider,
        registration_id: &str,
    ) -> Result<(), ServiceError>;
    async fn get_time_info(
        &self,
        provider: Provider,
        range: &DateRange,
    ) -> Result<TimeInfo, ServiceError>;

    // -- Notifications --
    async fn list_notifications(&self) -> Result<Vec<Notification>, ServiceError>;
    async fn mark_notification_viewed(&self, id: i64) -> Result<(), ServiceError>;
    async fn delete_notification(&self, id: i64) -> Result<(), ServiceError>;
    async fn subscribe_push(&self, subscription: &PushSubscription) -> Result<(), ServiceError>;
    async fn get_notification_preferences(
        &self,
        repo_id: &str,
    ) -> Result<NotificationPreferences, ServiceError>;
    async fn set_notification_preferences(
        &self,
        preferences: &NotificationPreferences,
    ) -> Result<(), ServiceError>;
    async fn get_notification_exception(
        &self,
        repo_id: &str,
        pull_request_id: i64,
        kind: NotificationType,
    ) -> Result<Option<NotificationException>, ServiceError>;
    async fn set_notification_exception(
        &self,
        exception: &NotificationException,
    ) -> Result<(), ServiceError>;
    async fn delete_notification_exception(
        &self,
        repo_id: &str,
        pull_request_id: i64,
        kind: NotificationType,
    ) -> Result<(), ServiceError>;
}
