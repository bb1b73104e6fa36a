//! Cached reads. Each helper owns its `QueryKey` so callers and mutations
//! agree on what to invalidate.

use worktrack_core::board::{Board, BoardProject, BoardScope, Iteration};
use worktrack_core::differ::Differ;
use worktrack_core::notification::{Notification, NotificationPreferences};
use worktrack_core::time_entry::{Activity, DateRange, ProviderProject, TimeEntry, TimeInfo};
use worktrack_core::timer::{Provider, TimerSnapshot};

use crate::cache::{QueryCache, QueryKey};
use crate::{ServiceError, TrackerService};

pub async fn differs(
    service: &dyn TrackerService,
    cache: &QueryCache,
) -> Result<Vec<Differ>, ServiceError> {
    cache
        .fetch(QueryKey::Differs, || service.list_differs())
        .await
}

/// The board with items already in render order.
pub async fn board(
    service: &dyn TrackerService,
    cache: &QueryCache,
    scope: &BoardScope,
) -> Result<Board, ServiceError> {
    cache
        .fetch(QueryKey::Board(scope.clone()), || async {
            let mut board = service.get_board(scope).await?;
            board.sort_items();
            Ok(board)
        })
        .await
}

pub async fn board_projects(
    service: &dyn TrackerService,
    cache: &QueryCache,
    organization: &str,
) -> Result<Vec<BoardProject>, ServiceError> {
    let key = QueryKey::BoardProjects {
        organization: organization.to_string(),
    };
    cache
        .fetch(key, || service.list_board_projects(organization))
        .await
}

pub async fn iterations(
    service: &dyn TrackerService,
    cache: &QueryCache,
    organization: &str,
    project: &str,
) -> Result<Vec<Iteration>, ServiceError> {
    let key = QueryKey::Iterations {
        organization: organization.to_string(),
        project: project.to_string(),
    };
    cache
        .fetch(key, || service.list_iterations(organization, project))
        .await
}

pub async fn timer(
    service: &dyn TrackerService,
    cache: &QueryCache,
    provider: Provider,
) -> Result<Option<TimerSnapshot>, ServiceError> {
    cache
        .fetch(QueryKey::Timer(provider), || service.get_timer(provider))
        .await
}

pub async fn provider_projects(
    service: &dyn TrackerService,
    cache: &QueryCache,
    provider: Provider,
) -> Result<Vec<ProviderProject>, ServiceError> {
    cache
        .fetch(QueryKey::ProviderProjects(provider), || {
            service.list_provider_projects(provider)
        })
        .await
}

pub async fn activities(
    service: &dyn TrackerService,
    cache: &QueryCache,
    provider: Provider,
    project_id: &str,
) -> Result<Vec<Activity>, ServiceError> {
    let key = QueryKey::Activities {
        provider,
        project_id: project_id.to_string(),
    };
    cache
        .fetch(key, || service.list_activities(provider, project_id))
        .await
}

pub async fn time_entries(
    service: &dyn TrackerService,
    cache: &QueryCache,
    provider: Provider,
    range: DateRange,
) -> Result<Vec<TimeEntry>, ServiceError> {
    cache
        .fetch(QueryKey::TimeEntries { provider, range }, || {
            service.list_time_entries(provider, &range)
        })
        .await
}

pub async fn time_info(
    service: &dyn TrackerService,
    cache: &QueryCache,
    provider: Provider,
    range: DateRange,
) -> Result<TimeInfo, ServiceError> {
    cache
        .fetch(QueryKey::TimeInfo { provider, range }, || {
            service.get_time_info(provider, &range)
        })
        .await
}

pub async fn notifications(
    service: &dyn TrackerService,
    cache: &QueryCache,
) -> Result<Vec<Notification>, ServiceError> {
    cache
        .fetch(QueryKey::Notifications, || service.list_notifications())
        .await
}

pub async fn notification_preferences(
    service: &dyn TrackerService,
    cache: &QueryCache,
    repo_id: &str,
) -> Result<NotificationPreferences, ServiceError> {
    let key = QueryKey::NotificationPreferences {
        repo_id: repo_id.to_string(),
    };
    cache
        .fetch(key, || service.get_notification_preferences(repo_id))
        .await
}
