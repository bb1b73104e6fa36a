use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{COOKIE, SET_COOKIE};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};
use worktrack_core::board::{Board, BoardProject, BoardScope, Iteration, MoveWorkItem};
use worktrack_core::differ::{Differ, DifferAction, FollowRepository, RepositoryKey};
use worktrack_core::notification::{
    Notification, NotificationException, NotificationPreferences, NotificationType,
};
use worktrack_core::push::PushSubscription;
use worktrack_core::time_entry::{
    Activity, CreateTimeEntry, DateRange, ProviderProject, TimeEntry, TimeInfo, UpdateTimeEntry,
};
use worktrack_core::timer::{EditTimer, Provider, StartTimer, StopTimer, TimerSnapshot};

use crate::cookies::CookieJar;
use crate::{Credentials, ServiceError, TrackerService};

/// Raised when the backend answers 401.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    /// The core API session is gone; the user has to log in again.
    LoginRequired,
    /// Only this provider's session expired.
    ProviderExpired(Provider),
}

pub type AuthHook = Arc<dyn Fn(AuthEvent) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpConfig {
    pub core_url: String,
    pub time_url: String,
    /// Parent domain provider cookies may be scoped to, e.g. `.example.com`.
    pub cookie_domain: Option<String>,
}

impl HttpConfig {
    /// Both APIs served from one base URL.
    pub fn single(base_url: &str) -> Self {
        Self {
            core_url: base_url.to_string(),
            time_url: base_url.to_string(),
            cookie_domain: None,
        }
    }
}

/// Which backend a request belongs to. Decides the base URL and what a 401
/// means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Core,
    Provider(Provider),
}

/// Async HTTP client implementation of `TrackerService`.
///
/// Requests are credentialed through a shared `CookieJar`; every
/// `Set-Cookie` seen on a response is stored and replayed on later requests.
pub struct HttpService {
    core_url: String,
    time_url: String,
    core_host: String,
    time_host: String,
    client: Client,
    jar: Arc<CookieJar>,
    auth_hook: Option<AuthHook>,
}

impl HttpService {
    pub fn new(config: &HttpConfig) -> Self {
        let core_url = config.core_url.trim_end_matches('/').to_string();
        let time_url = config.time_url.trim_end_matches('/').to_string();
        let core_host = host_of(&core_url);
        let time_host = host_of(&time_url);
        let jar = CookieJar::new(&core_host, config.cookie_domain.as_deref()).with_host(&time_host);
        Self {
            core_url,
            time_url,
            core_host,
            time_host,
            client: Client::new(),
            jar: Arc::new(jar),
            auth_hook: None,
        }
    }

    pub fn with_auth_hook(mut self, hook: AuthHook) -> Self {
        self.auth_hook = Some(hook);
        self
    }

    pub fn cookies(&self) -> &CookieJar {
        &self.jar
    }

    fn url(&self, scope: Scope, path: &str) -> String {
        let base = match scope {
            Scope::Provider(p) if p.uses_time_api() => &self.time_url,
            _ => &self.core_url,
        };
        format!("{base}/{path}")
    }

    fn host(&self, scope: Scope) -> &str {
        match scope {
            Scope::Provider(p) if p.uses_time_api() => &self.time_host,
            _ => &self.core_host,
        }
    }

    fn provider_path(provider: Provider, rest: &str) -> String {
        format!("{}/{rest}", provider.as_str())
    }

    fn emit(&self, event: AuthEvent) {
        if let Some(hook) = &self.auth_hook {
            hook(event);
        }
    }

    async fn send(&self, scope: Scope, builder: RequestBuilder) -> Result<Response, ServiceError> {
        let builder = match self.jar.header_value(self.host(scope)) {
            Some(cookie) => builder.header(COOKIE, cookie),
            None => builder,
        };
        let resp = builder
            .send()
            .await
            .map_err(|e| ServiceError::Internal(e.to_string()))?;

        let origin = resp
            .url()
            .host_str()
            .map(str::to_string)
            .unwrap_or_else(|| self.host(scope).to_string());
        for value in resp.headers().get_all(SET_COOKIE) {
            if let Ok(v) = value.to_str() {
                self.jar.store_set_cookie(&origin, v);
            }
        }

        if resp.status() == StatusCode::UNAUTHORIZED {
            return Err(match scope {
                Scope::Core => {
                    warn!(url = %resp.url(), "core api rejected the session");
                    self.emit(AuthEvent::LoginRequired);
                    ServiceError::Unauthorized { provider: None }
                }
                Scope::Provider(p) => {
                    warn!(provider = p.as_str(), "provider session expired");
                    self.emit(AuthEvent::ProviderExpired(p));
                    ServiceError::Unauthorized { provider: Some(p) }
                }
            });
        }
        Ok(resp)
    }

    async fn get_json<T: DeserializeOwned>(&self, scope: Scope, path: &str) -> Result<T, ServiceError> {
        let url = self.url(scope, path);
        debug!(%url, "GET");
        let resp = self.send(scope, self.client.get(url)).await?;
        handle_response(resp).await
    }

    async fn get_query<T, Q>(&self, scope: Scope, path: &str, query: &Q) -> Result<T, ServiceError>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let url = self.url(scope, path);
        debug!(%url, "GET");
        let resp = self.send(scope, self.client.get(url).query(query)).await?;
        handle_response(resp).await
    }

    async fn get_text<Q>(&self, scope: Scope, path: &str, query: &Q) -> Result<String, ServiceError>
    where
        Q: Serialize + ?Sized,
    {
        let url = self.url(scope, path);
        debug!(%url, "GET");
        let resp = self.send(scope, self.client.get(url).query(query)).await?;
        let status = resp.status();
        if status.is_success() {
            resp.text()
                .await
                .map_err(|e| ServiceError::Internal(format!("read body: {e}")))
        } else {
            Err(parse_error_with_status(status, resp).await)
        }
    }

    /// GET where 404 and 204 mean "nothing there".
    async fn get_optional<T: DeserializeOwned>(
        &self,
        scope: Scope,
        path: &str,
    ) -> Result<Option<T>, ServiceError> {
        let url = self.url(scope, path);
        debug!(%url, "GET");
        let resp = self.send(scope, self.client.get(url)).await?;
        match resp.status() {
            StatusCode::NOT_FOUND | StatusCode::NO_CONTENT => Ok(None),
            _ => handle_response(resp).await,
        }
    }

    async fn post_json<B: Serialize + ?Sized>(
        &self,
        scope: Scope,
        path: &str,
        body: &B,
    ) -> Result<(), ServiceError> {
        let url = self.url(scope, path);
        debug!(%url, "POST");
        let resp = self.send(scope, self.client.post(url).json(body)).await?;
        expect_success(resp).await
    }

    async fn post_empty(&self, scope: Scope, path: &str) -> Result<(), ServiceError> {
        let url = self.url(scope, path);
        debug!(%url, "POST");
        let resp = self.send(scope, self.client.post(url)).await?;
        expect_success(resp).await
    }

    async fn put_json<B: Serialize + ?Sized>(
        &self,
        scope: Scope,
        path: &str,
        body: &B,
    ) -> Result<(), ServiceError> {
        let url = self.url(scope, path);
        debug!(%url, "PUT");
        let resp = self.send(scope, self.client.put(url).json(body)).await?;
        expect_success(resp).await
    }

    async fn delete_req<Q: Serialize + ?Sized>(
        &self,
        scope: Scope,
        path: &str,
        query: &Q,
    ) -> Result<(), ServiceError> {
        let url = self.url(scope, path);
        debug!(%url, "DELETE");
        let resp = self.send(scope, self.client.delete(url).query(query)).await?;
        expect_success(resp).await
    }
}

fn host_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
        .unwrap_or_default()
}

fn repository_query(key: &RepositoryKey) -> [(&'static str, &str); 3] {
    [
        ("organization", key.organization.as_str()),
        ("project", key.project.as_str()),
        ("repoName", key.repo_name.as_str()),
    ]
}

fn range_query(range: &DateRange) -> [(&'static str, String); 2] {
    [
        ("from", range.from.format("%Y-%m-%d").to_string()),
        ("to", range.to.format("%Y-%m-%d").to_string()),
    ]
}

fn exception_path(repo_id: &str, pull_request_id: i64, kind: NotificationType) -> String {
    format!(
        "notifications/exceptions/{repo_id}/{pull_request_id}/{}",
        kind.as_str()
    )
}

async fn handle_response<T: DeserializeOwned>(resp: Response) -> Result<T, ServiceError> {
    let status = resp.status();
    if status.is_success() {
        resp.json::<T>()
            .await
            .map_err(|e| ServiceError::Internal(format!("json decode: {e}")))
    } else {
        Err(parse_error_with_status(status, resp).await)
    }
}

async fn expect_success(resp: Response) -> Result<(), ServiceError> {
    let status = resp.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(parse_error_with_status(status, resp).await)
    }
}

async fn parse_error_with_status(status: StatusCode, resp: Response) -> ServiceError {
    let body = resp.text().await.unwrap_or_default();
    let msg = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v["error"].as_str().map(String::from))
        .unwrap_or(body);

    match status {
        StatusCode::NOT_FOUND => ServiceError::NotFound(msg),
        StatusCode::BAD_REQUEST => ServiceError::InvalidInput(msg),
        StatusCode::LOCKED | StatusCode::CONFLICT => ServiceError::Locked(msg),
        _ => ServiceError::Internal(msg),
    }
}

#[async_trait]
impl TrackerService for HttpService {
    async fn list_differs(&self) -> Result<Vec<Differ>, ServiceError> {
        self.get_json(Scope::Core, "differs").await
    }

    async fn start_differ(&self, key: &RepositoryKey) -> Result<(), ServiceError> {
        let body = DifferAction { key: key.clone() };
        self.post_json(Scope::Core, "differs/start", &body).await
    }

    async fn stop_differ(&self, key: &RepositoryKey) -> Result<(), ServiceError> {
        let body = DifferAction { key: key.clone() };
        self.post_json(Scope::Core, "differs/stop", &body).await
    }

    async fn add_repository(&self, key: &RepositoryKey) -> Result<(), ServiceError> {
        let body = DifferAction { key: key.clone() };
        self.post_json(Scope::Core, "repositories", &body).await
    }

    async fn follow_repository(
        &self,
        key: &RepositoryKey,
        follow: bool,
    ) -> Result<(), ServiceError> {
        let body = FollowRepository {
            key: key.clone(),
            follow,
        };
        self.post_json(Scope::Core, "repositories/follow", &body)
            .await
    }

    async fn delete_repository(&self, key: &RepositoryKey) -> Result<(), ServiceError> {
        self.delete_req(Scope::Core, "repositories", &repository_query(key))
            .await
    }

    async fn get_board(&self, scope: &BoardScope) -> Result<Board, ServiceError> {
        self.get_query(Scope::Core, "work-items/board", &scope.query_pairs())
            .await
    }

    async fn list_board_projects(
        &self,
        organization: &str,
    ) -> Result<Vec<BoardProject>, ServiceError> {
        self.get_query(
            Scope::Core,
            "work-items/projects",
            &[("organization", organization)],
        )
        .await
    }

    async fn list_iterations(
        &self,
        organization: &str,
        project: &str,
    ) -> Result<Vec<Iteration>, ServiceError> {
        self.get_query(
            Scope::Core,
            "work-items/iterations",
            &[("organization", organization), ("project", project)],
        )
        .await
    }

    async fn move_work_item(&self, input: &MoveWorkItem) -> Result<(), ServiceError> {
        self.post_json(Scope::Core, "work-items/move", input).await
    }

    async fn format_for_llm(
        &self,
        organization: &str,
        project: &str,
        work_item_id: i64,
    ) -> Result<String, ServiceError> {
        let id = work_item_id.to_string();
        self.get_text(
            Scope::Core,
            "work-items/format-for-llm",
            &[
                ("organization", organization),
                ("project", project),
                ("id", id.as_str()),
            ],
        )
        .await
    }

    async fn authenticate(
        &self,
        provider: Provider,
        credentials: &Credentials,
    ) -> Result<(), ServiceError> {
        let path = Self::provider_path(provider, "authenticate");
        self.post_json(Scope::Provider(provider), &path, credentials)
            .await
    }

    fn has_session(&self, provider: Provider) -> bool {
        self.jar.has_prefixed(provider.cookie_prefix())
    }

    fn clear_session(&self, provider: Provider) {
        let removed = self.jar.clear_prefixed(provider.cookie_prefix());
        debug!(provider = provider.as_str(), removed, "cleared session cookies");
    }

    async fn get_timer(&self, provider: Provider) -> Result<Option<TimerSnapshot>, ServiceError> {
        let path = Self::provider_path(provider, "timer");
        let timer: Option<Option<TimerSnapshot>> =
            self.get_optional(Scope::Provider(provider), &path).await?;
        Ok(timer.flatten())
    }

    async fn start_timer(
        &self,
        provider: Provider,
        input: &StartTimer,
    ) -> Result<(), ServiceError> {
        let path = Self::provider_path(provider, "timer");
        self.post_json(Scope::Provider(provider), &path, input).await
    }

    async fn stop_timer(&self, provider: Provider, input: &StopTimer) -> Result<(), ServiceError> {
        let path = Self::provider_path(provider, "timer");
        self.put_json(Scope::Provider(provider), &path, input).await
    }

    async fn delete_timer(&self, provider: Provider) -> Result<(), ServiceError> {
        let path = Self::provider_path(provider, "timer");
        self.delete_req(Scope::Provider(provider), &path, &[] as &[(&str, &str)])
            .await
    }

    async fn edit_timer(&self, provider: Provider, input: &EditTimer) -> Result<(), ServiceError> {
        let path = Self::provider_path(provider, "update-timer");
        self.put_json(Scope::Provider(provider), &path, input).await
    }

    async fn list_provider_projects(
        &self,
        provider: Provider,
    ) -> Result<Vec<ProviderProject>, ServiceError> {
        let path = Self::provider_path(provider, "projects");
        self.get_json(Scope::Provider(provider), &path).await
    }

    async fn list_activities(
        &self,
        provider: Provider,
        project_id: &str,
    ) -> Result<Vec<Activity>, ServiceError> {
        let path = Self::provider_path(provider, &format!("projects/{project_id}/activities"));
        self.get_json(Scope::Provider(provider), &path).await
    }

    async fn list_time_entries(
        &self,
        provider: Provider,
        range: &DateRange,
    ) -> Result<Vec<TimeEntry>, ServiceError> {
        let path = Self::provider_path(provider, "time-entries");
        self.get_query(Scope::Provider(provider), &path, &range_query(range))
            .await
    }

    async fn create_time_entry(
        &self,
        provider: Provider,
        input: &CreateTimeEntry,
    ) -> Result<(), ServiceError> {
        let path = Self::provider_path(provider, "time-entries");
        self.post_json(Scope::Provider(provider), &path, input).await
    }

    async fn update_time_entry(
        &self,
        provider: Provider,
        input: &UpdateTimeEntry,
    ) -> Result<(), ServiceError> {
        let path = Self::provider_path(provider, "time-entries");
        self.put_json(Scope::Provider(provider), &path, input).await
    }

    async fn delete_time_entry(
        &self,
        provider: Provider,
        registration_id: &str,
    ) -> Result<(), ServiceError> {
        let path = Self::provider_path(provider, "time-entries");
        self.delete_req(
            Scope::Provider(provider),
            &path,
            &[("registrationId", registration_id)],
        )
        .await
    }

    async fn get_time_info(
        &self,
        provider: Provider,
        range: &DateRange,
    ) -> Result<TimeInfo, ServiceError> {
        let path = Self::provider_path(provider, "time-info");
        self.get_query(Scope::Provider(provider), &path, &range_query(range))
            .await
    }

    async fn list_notifications(&self) -> Result<Vec<Notification>, ServiceError> {
        self.get_json(Scope::Core, "notifications").await
    }

    async fn mark_notification_viewed(&self, id: i64) -> Result<(), ServiceError> {
        self.post_empty(Scope::Core, &format!("notifications/{id}/view"))
            .await
    }

    async fn delete_notification(&self, id: i64) -> Result<(), ServiceError> {
        self.delete_req(
            Scope::Core,
            &format!("notifications/{id}"),
            &[] as &[(&str, &str)],
        )
        .await
    }

    async fn subscribe_push(&self, subscription: &PushSubscription) -> Result<(), ServiceError> {
        self.post_json(Scope::Core, "notifications/subscribe", subscription)
            .await
    }

    async fn get_notification_preferences(
        &self,
        repo_id: &str,
    ) -> Result<NotificationPreferences, ServiceError> {
        self.get_json(Scope::Core, &format!("notifications/preferences/{repo_id}"))
            .await
    }

    async fn set_notification_preferences(
        &self,
        preferences: &NotificationPreferences,
    ) -> Result<(), ServiceError> {
        self.post_json(
            Scope::Core,
            &format!("notifications/preferences/{}", preferences.repo_id),
            preferences,
        )
        .await
    }

    async fn get_notification_exception(
        &self,
        repo_id: &str,
        pull_request_id: i64,
        kind: NotificationType,
    ) -> Result<Option<NotificationException>, ServiceError> {
        self.get_optional(Scope::Core, &exception_path(repo_id, pull_request_id, kind))
            .await
    }

    async fn set_notification_exception(
        &self,
        exception: &NotificationException,
    ) -> Result<(), ServiceError> {
        let path = exception_path(
            &exception.repo_id,
            exception.pull_request_id,
            exception.notification_type,
        );
        self.post_json(Scope::Core, &path, exception).await
    }

    async fn delete_notification_exception(
        &self,
        repo_id: &str,
        pull_request_id: i64,
        kind: NotificationType,
    ) -> Result<(), ServiceError> {
        self.delete_req(
            Scope::Core,
            &exception_path(repo_id, pull_request_id, kind),
            &[] as &[(&str, &str)],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_tracking_requests_use_time_api() {
        let service = HttpService::new(&HttpConfig {
            core_url: "http://core.test/api/".into(),
            time_url: "http://time.test/api".into(),
            cookie_domain: None,
        });
        assert_eq!(
            service.url(Scope::Core, "differs"),
            "http://core.test/api/differs"
        );
        assert_eq!(
            service.url(Scope::Provider(Provider::Milltime), "milltime/timer"),
            "http://core.test/api/milltime/timer"
        );
        assert_eq!(
            service.url(Scope::Provider(Provider::TimeTracking), "time-tracking/timer"),
            "http://time.test/api/time-tracking/timer"
        );
    }

    #[test]
    fn cookie_jar_host_comes_from_core_url() {
        let service = HttpService::new(&HttpConfig {
            core_url: "https://App.Example.com/api".into(),
            time_url: "https://time.example.com".into(),
            cookie_domain: Some(".example.com".into()),
        });
        assert_eq!(service.cookies().host(), "app.example.com");
        assert_eq!(service.cookies().parent_domain(), Some("example.com"));
    }

    #[test]
    fn each_backend_gets_its_own_cookies() {
        let service = HttpService::new(&HttpConfig {
            core_url: "http://core.test/api".into(),
            time_url: "http://time.other/api".into(),
            cookie_domain: None,
        });
        let jar = service.cookies();
        jar.store_set_cookie(service.host(Scope::Core), "core_session=secret");
        jar.store_set_cookie(
            service.host(Scope::Provider(Provider::TimeTracking)),
            "tt_session=t1",
        );

        assert_eq!(service.host(Scope::Provider(Provider::Milltime)), "core.test");
        assert_eq!(
            jar.header_value(service.host(Scope::Core)).as_deref(),
            Some("core_session=secret")
        );
        assert_eq!(
            jar.header_value(service.host(Scope::Provider(Provider::TimeTracking)))
                .as_deref(),
            Some("tt_session=t1")
        );

        service.clear_session(Provider::TimeTracking);
        assert!(!service.has_session(Provider::TimeTracking));
    }

    #[test]
    fn session_presence_follows_cookie_prefix() {
        let service = HttpService::new(&HttpConfig::single("http://localhost:3000"));
        assert!(!service.has_session(Provider::Milltime));
        service.cookies().store_set_cookie("localhost", "mt_session=abc");
        assert!(service.has_session(Provider::Milltime));
        assert!(!service.has_session(Provider::TimeTracking));
        service.clear_session(Provider::Milltime);
        assert!(!service.has_session(Provider::Milltime));
    }
}
