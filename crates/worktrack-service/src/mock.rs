//! In-process mock of the backend APIs for integration tests.
//!
//! One axum router serves both the core API and the provider endpoints, so a
//! single base URL can be used for `core_url` and `time_url`.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use axum::extract::{Path, Query, Request, State};
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{Datelike, Duration, Local, NaiveDate, TimeZone, Utc};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use worktrack_core::board::{
    Board, BoardColumn, BoardProject, BoardWorkItem, Iteration, MoveWorkItem, Person,
};
use worktrack_core::differ::{self, Differ, DifferAction, DifferStatus, FollowRepository, RepositoryKey};
use worktrack_core::notification::{
    self, Notification, NotificationException, NotificationPreferences, NotificationType,
};
use worktrack_core::push::PushSubscription;
use worktrack_core::time_entry::{
    Activity, AttestLevel, CreateTimeEntry, ProviderProject, TimeEntry, TimeInfo, UpdateTimeEntry,
};
use worktrack_core::timer::{EditTimer, Provider, StartTimer, StopTimer, TimerSnapshot};

use crate::Credentials;

pub const MOCK_USER_EMAIL: &str = "me@example.com";
pub const MOCK_PASSWORD: &str = "secret";

/// Backend state plus knobs tests flip to provoke failures.
#[derive(Debug, Default)]
pub struct MockData {
    pub differs: Vec<Differ>,
    pub board: Board,
    pub board_projects: Vec<BoardProject>,
    pub iterations: Vec<Iteration>,
    pub timers: HashMap<Provider, TimerSnapshot>,
    pub provider_projects: Vec<ProviderProject>,
    pub activities: Vec<Activity>,
    pub time_entries: HashMap<Provider, Vec<TimeEntry>>,
    pub notifications: Vec<Notification>,
    pub preferences: HashMap<String, NotificationPreferences>,
    pub exceptions: HashMap<(String, i64, NotificationType), NotificationException>,
    pub subscriptions: Vec<PushSubscription>,

    /// `POST work-items/move` answers 500.
    pub fail_moves: bool,
    /// Every other core mutation answers 500.
    pub fail_mutations: bool,
    /// Every core request answers 401.
    pub core_unauthorized: bool,
    /// Provider requests answer 401 even with a session cookie.
    pub expired_providers: HashSet<Provider>,
    /// `METHOD path` of every request, in arrival order.
    pub requests: Vec<String>,
    next_registration: u64,
}

pub type MockState = Arc<Mutex<MockData>>;

fn lock(state: &MockState) -> MutexGuard<'_, MockData> {
    state.lock().unwrap_or_else(|p| p.into_inner())
}

impl MockData {
    /// A board, two differs, notifications and a week of time entries
    /// around today.
    pub fn seeded() -> Self {
        let today = Local::now().date_naive();
        let monday = today - Duration::days(today.weekday().num_days_from_monday() as i64);

        let columns = vec![
            column("col-new", "New", 0),
            column("col-active", "Active", 1),
            column("col-done", "Closed", 2),
        ];
        let items = vec![
            work_item(101, "Fix login redirect", "Bug", "col-new", Some(MOCK_USER_EMAIL), Some(1)),
            work_item(102, "Board filters", "User Story", "col-active", Some(MOCK_USER_EMAIL), Some(2)),
            work_item(103, "Upgrade runtime", "Task", "col-active", Some("bob@example.com"), None),
            work_item(104, "Release notes", "Task", "col-done", None, None),
        ];

        let mt_entries = vec![
            entry("r1", monday, (9, 0), (11, 0), "Backend", "Development", "API", AttestLevel::None),
            entry("r2", monday, (13, 0), (17, 0), "Backend", "Development", "API", AttestLevel::None),
            entry("r3", monday, (10, 30), (11, 30), "Support", "Meetings", "", AttestLevel::None),
            entry("r4", monday + Duration::days(1), (8, 0), (12, 0), "Backend", "Development", "", AttestLevel::Week),
        ];

        let mut time_entries = HashMap::new();
        time_entries.insert(Provider::Milltime, mt_entries);
        time_entries.insert(Provider::TimeTracking, Vec::new());

        Self {
            differs: vec![
                differ_row("acme", "web", "frontend", DifferStatus::Running, true),
                differ_row("acme", "web", "backend", DifferStatus::Stopped, false),
            ],
            board: Board { columns, items },
            board_projects: vec![BoardProject {
                id: "p-web".into(),
                name: "web".into(),
            }],
            iterations: vec![Iteration {
                id: "it-1".into(),
                name: "Sprint 1".into(),
                path: "web\\Sprint 1".into(),
                is_current: true,
            }],
            provider_projects: vec![
                ProviderProject {
                    id: "backend".into(),
                    name: "Backend".into(),
                },
                ProviderProject {
                    id: "support".into(),
                    name: "Support".into(),
                },
            ],
            activities: vec![
                Activity {
                    id: "dev".into(),
                    name: "Development".into(),
                    project_id: "backend".into(),
                },
                Activity {
                    id: "meet".into(),
                    name: "Meetings".into(),
                    project_id: "support".into(),
                },
            ],
            time_entries,
            notifications: vec![
                notification_row(1, NotificationType::ReviewRequested, "Review requested: Board filters", false),
                notification_row(2, NotificationType::Merged, "Merged: Upgrade runtime", true),
            ],
            next_registration: 100,
            ..Default::default()
        }
    }
}

fn column(id: &str, name: &str, order: i32) -> BoardColumn {
    BoardColumn {
        id: id.into(),
        name: name.into(),
        order,
    }
}

fn work_item(
    id: i64,
    title: &str,
    kind: &str,
    column_id: &str,
    assignee: Option<&str>,
    priority: Option<u8>,
) -> BoardWorkItem {
    BoardWorkItem {
        id,
        title: title.into(),
        work_item_type: kind.into(),
        board_column_id: Some(column_id.into()),
        board_column_name: None,
        board_state: None,
        assigned_to: assignee.map(|email| Person {
            display_name: email.split('@').next().unwrap_or(email).to_string(),
            email: Some(email.into()),
        }),
        priority,
        tags: Default::default(),
        pull_requests: vec![],
        url: None,
    }
}

fn differ_row(org: &str, project: &str, repo: &str, status: DifferStatus, followed: bool) -> Differ {
    Differ {
        key: RepositoryKey::new(org, project, repo),
        repo_id: Some(format!("{repo}-id")),
        status,
        is_followed: followed,
        last_updated: None,
        refresh_interval: Some(60),
    }
}

fn notification_row(id: i64, kind: NotificationType, title: &str, viewed: bool) -> Notification {
    Notification {
        id,
        repo_id: "frontend-id".into(),
        pull_request_id: 7,
        notification_type: kind,
        title: title.into(),
        message: String::new(),
        created_at: Utc::now(),
        viewed,
    }
}

#[allow(clippy::too_many_arguments)]
fn entry(
    registration_id: &str,
    date: NaiveDate,
    start: (u32, u32),
    end: (u32, u32),
    project: &str,
    activity: &str,
    note: &str,
    attest_level: AttestLevel,
) -> TimeEntry {
    let at = |(h, m): (u32, u32)| {
        date.and_hms_opt(h, m, 0)
            .map(|naive| Utc.from_utc_datetime(&naive))
    };
    let start_time = at(start);
    let end_time = at(end);
    let hours = match (start_time, end_time) {
        (Some(s), Some(e)) => (e - s).num_minutes() as f64 / 60.0,
        _ => 0.0,
    };
    TimeEntry {
        registration_id: registration_id.into(),
        project_id: project.to_lowercase(),
        project_name: project.into(),
        activity_id: activity.to_lowercase(),
        activity_name: activity.into(),
        date,
        hours,
        start_time,
        end_time,
        note: (!note.is_empty()).then(|| note.to_string()),
        attest_level,
    }
}

/// A running mock server with base_url and background task handle.
pub struct MockServer {
    pub base_url: String,
    pub state: MockState,
    _handle: tokio::task::JoinHandle<()>,
}

/// Spawn the mock on a random port with seeded data.
pub async fn spawn_mock_server() -> MockServer {
    spawn_mock_server_with(MockData::seeded()).await
}

pub async fn spawn_mock_server_with(data: MockData) -> MockServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let base_url = format!("http://{addr}");
    let state: MockState = Arc::new(Mutex::new(data));
    let app = mock_router(state.clone());
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    MockServer {
        base_url,
        state,
        _handle: handle,
    }
}

pub fn mock_router(state: MockState) -> Router {
    Router::new()
        .route("/differs", get(list_differs))
        .route("/differs/start", post(start_differ))
        .route("/differs/stop", post(stop_differ))
        .route(
            "/repositories",
            post(add_repository).delete(delete_repository),
        )
        .route("/repositories/follow", post(follow_repository))
        .route("/work-items/board", get(get_board))
        .route("/work-items/projects", get(list_board_projects))
        .route("/work-items/iterations", get(list_iterations))
        .route("/work-items/move", post(move_work_item))
        .route("/work-items/format-for-llm", get(format_for_llm))
        .route("/notifications", get(list_notifications))
        .route("/notifications/subscribe", post(subscribe_push))
        .route("/notifications/{id}", axum::routing::delete(delete_notification))
        .route("/notifications/{id}/view", post(view_notification))
        .route(
            "/notifications/preferences/{repo_id}",
            get(get_preferences).post(set_preferences),
        )
        .route(
            "/notifications/exceptions/{repo_id}/{pr_id}/{kind}",
            get(get_exception).post(set_exception).delete(delete_exception),
        )
        .route("/{provider}/authenticate", post(authenticate))
        .route(
            "/{provider}/timer",
            get(get_timer).post(start_timer).put(stop_timer).delete(delete_timer),
        )
        .route("/{provider}/update-timer", put(edit_timer))
        .route("/{provider}/projects", get(list_provider_projects))
        .route("/{provider}/projects/{project_id}/activities", get(list_activities))
        .route(
            "/{provider}/time-entries",
            get(list_time_entries)
                .post(create_time_entry)
                .put(update_time_entry)
                .delete(delete_time_entry),
        )
        .route("/{provider}/time-info", get(get_time_info))
        .layer(middleware::from_fn_with_state(state.clone(), gatekeeper))
        .with_state(state)
}

type HandlerError = (StatusCode, Json<serde_json::Value>);

fn error(status: StatusCode, msg: &str) -> HandlerError {
    (status, Json(json!({ "error": msg })))
}

/// Logs the request and answers 401 for core paths while
/// `core_unauthorized` is set.
async fn gatekeeper(State(state): State<MockState>, req: Request, next: Next) -> Response {
    let path = req.uri().path().to_string();
    let provider_path = Provider::ALL
        .iter()
        .any(|p| path.starts_with(&format!("/{}/", p.as_str())));
    {
        let mut data = lock(&state);
        data.requests.push(format!("{} {}", req.method(), path));
        if data.core_unauthorized && !provider_path {
            return error(StatusCode::UNAUTHORIZED, "login required").into_response();
        }
    }
    next.run(req).await
}

fn core_mutation_allowed(state: &MockState) -> Result<(), HandlerError> {
    if lock(state).fail_mutations {
        Err(error(StatusCode::INTERNAL_SERVER_ERROR, "mutation failed"))
    } else {
        Ok(())
    }
}

/// Resolve the provider segment and check its session cookie.
fn provider_session(
    state: &MockState,
    headers: &HeaderMap,
    segment: &str,
) -> Result<Provider, HandlerError> {
    let provider = Provider::parse_str(segment)
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "unknown provider"))?;
    if lock(state).expired_providers.contains(&provider) {
        return Err(error(StatusCode::UNAUTHORIZED, "session expired"));
    }
    let wanted = format!("{}session=", provider.cookie_prefix());
    let has_cookie = headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .any(|c| c.trim().starts_with(&wanted));
    if has_cookie {
        Ok(provider)
    } else {
        Err(error(StatusCode::UNAUTHORIZED, "no session"))
    }
}

// -- Differs --

async fn list_differs(State(state): State<MockState>) -> Json<Vec<Differ>> {
    Json(lock(&state).differs.clone())
}

async fn start_differ(
    State(state): State<MockState>,
    Json(input): Json<DifferAction>,
) -> Result<StatusCode, HandlerError> {
    core_mutation_allowed(&state)?;
    if differ::set_status(&mut lock(&state).differs, &input.key, DifferStatus::Running) {
        Ok(StatusCode::OK)
    } else {
        Err(error(StatusCode::NOT_FOUND, "differ not found"))
    }
}

async fn stop_differ(
    State(state): State<MockState>,
    Json(input): Json<DifferAction>,
) -> Result<StatusCode, HandlerError> {
    core_mutation_allowed(&state)?;
    if differ::set_status(&mut lock(&state).differs, &input.key, DifferStatus::Stopped) {
        Ok(StatusCode::OK)
    } else {
        Err(error(StatusCode::NOT_FOUND, "differ not found"))
    }
}

async fn add_repository(
    State(state): State<MockState>,
    Json(input): Json<DifferAction>,
) -> Result<StatusCode, HandlerError> {
    core_mutation_allowed(&state)?;
    let mut data = lock(&state);
    if data.differs.iter().any(|d| d.key == input.key) {
        return Err(error(StatusCode::BAD_REQUEST, "repository already tracked"));
    }
    data.differs.push(Differ {
        key: input.key,
        repo_id: None,
        status: DifferStatus::Stopped,
        is_followed: false,
        last_updated: None,
        refresh_interval: None,
    });
    Ok(StatusCode::CREATED)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepositoryQuery {
    organization: String,
    project: String,
    repo_name: String,
}

async fn delete_repository(
    State(state): State<MockState>,
    Query(q): Query<RepositoryQuery>,
) -> Result<StatusCode, HandlerError> {
    core_mutation_allowed(&state)?;
    let key = RepositoryKey::new(q.organization, q.project, q.repo_name);
    let mut data = lock(&state);
    let before = data.differs.len();
    data.differs.retain(|d| d.key != key);
    if data.differs.len() == before {
        Err(error(StatusCode::NOT_FOUND, "repository not found"))
    } else {
        Ok(StatusCode::NO_CONTENT)
    }
}

async fn follow_repository(
    State(state): State<MockState>,
    Json(input): Json<FollowRepository>,
) -> Result<StatusCode, HandlerError> {
    core_mutation_allowed(&state)?;
    if differ::set_followed(&mut lock(&state).differs, &input.key, input.follow) {
        Ok(StatusCode::OK)
    } else {
        Err(error(StatusCode::NOT_FOUND, "repository not found"))
    }
}

// -- Work items --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BoardQuery {
    organization: String,
    project: String,
}

async fn get_board(
    State(state): State<MockState>,
    Query(q): Query<BoardQuery>,
) -> Result<Json<Board>, HandlerError> {
    if q.organization.is_empty() || q.project.is_empty() {
        return Err(error(StatusCode::BAD_REQUEST, "organization and project required"));
    }
    Ok(Json(lock(&state).board.clone()))
}

async fn list_board_projects(State(state): State<MockState>) -> Json<Vec<BoardProject>> {
    Json(lock(&state).board_projects.clone())
}

async fn list_iterations(State(state): State<MockState>) -> Json<Vec<Iteration>> {
    Json(lock(&state).iterations.clone())
}

async fn move_work_item(
    State(state): State<MockState>,
    Json(input): Json<MoveWorkItem>,
) -> Result<StatusCode, HandlerError> {
    let mut data = lock(&state);
    if data.fail_moves {
        return Err(error(StatusCode::INTERNAL_SERVER_ERROR, "move rejected"));
    }
    let Some(column) = data
        .board
        .columns
        .iter()
        .find(|c| c.name == input.target_column)
        .cloned()
    else {
        return Err(error(StatusCode::BAD_REQUEST, "unknown column"));
    };
    let Some(item) = data.board.items.iter_mut().find(|i| i.id == input.id) else {
        return Err(error(StatusCode::NOT_FOUND, "work item not found"));
    };
    item.board_column_id = Some(column.id);
    item.board_column_name = Some(column.name);
    Ok(StatusCode::OK)
}

#[derive(Debug, Deserialize)]
struct FormatQuery {
    id: i64,
}

async fn format_for_llm(
    State(state): State<MockState>,
    Query(q): Query<FormatQuery>,
) -> Result<String, HandlerError> {
    let data = lock(&state);
    let item = data
        .board
        .items
        .iter()
        .find(|i| i.id == q.id)
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "work item not found"))?;
    Ok(format!(
        "# {} {}\n\nType: {}\n",
        item.id, item.title, item.work_item_type
    ))
}

// -- Notifications --

async fn list_notifications(State(state): State<MockState>) -> Json<Vec<Notification>> {
    Json(lock(&state).notifications.clone())
}

async fn view_notification(
    State(state): State<MockState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, HandlerError> {
    core_mutation_allowed(&state)?;
    if notification::mark_viewed(&mut lock(&state).notifications, id) {
        Ok(StatusCode::OK)
    } else {
        Err(error(StatusCode::NOT_FOUND, "notification not found"))
    }
}

async fn delete_notification(
    State(state): State<MockState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, HandlerError> {
    core_mutation_allowed(&state)?;
    if notification::remove(&mut lock(&state).notifications, id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(error(StatusCode::NOT_FOUND, "notification not found"))
    }
}

async fn subscribe_push(
    State(state): State<MockState>,
    Json(input): Json<PushSubscription>,
) -> StatusCode {
    lock(&state).subscriptions.push(input);
    StatusCode::CREATED
}

async fn get_preferences(
    State(state): State<MockState>,
    Path(repo_id): Path<String>,
) -> Json<NotificationPreferences> {
    let data = lock(&state);
    let prefs = data
        .preferences
        .get(&repo_id)
        .cloned()
        .unwrap_or_else(|| NotificationPreferences {
            repo_id,
            enabled: true,
            types: NotificationType::ALL.to_vec(),
        });
    Json(prefs)
}

async fn set_preferences(
    State(state): State<MockState>,
    Path(repo_id): Path<String>,
    Json(input): Json<NotificationPreferences>,
) -> Result<StatusCode, HandlerError> {
    core_mutation_allowed(&state)?;
    lock(&state).preferences.insert(repo_id, input);
    Ok(StatusCode::OK)
}

fn parse_kind(kind: &str) -> Result<NotificationType, HandlerError> {
    serde_json::from_value(json!(kind))
        .map_err(|_| error(StatusCode::BAD_REQUEST, "unknown notification type"))
}

async fn get_exception(
    State(state): State<MockState>,
    Path((repo_id, pr_id, kind)): Path<(String, i64, String)>,
) -> Result<Json<NotificationException>, HandlerError> {
    let kind = parse_kind(&kind)?;
    lock(&state)
        .exceptions
        .get(&(repo_id, pr_id, kind))
        .cloned()
        .map(Json)
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "no exception"))
}

async fn set_exception(
    State(state): State<MockState>,
    Path((repo_id, pr_id, kind)): Path<(String, i64, String)>,
    Json(input): Json<NotificationException>,
) -> Result<StatusCode, HandlerError> {
    let kind = parse_kind(&kind)?;
    lock(&state).exceptions.insert((repo_id, pr_id, kind), input);
    Ok(StatusCode::OK)
}

async fn delete_exception(
    State(state): State<MockState>,
    Path((repo_id, pr_id, kind)): Path<(String, i64, String)>,
) -> Result<StatusCode, HandlerError> {
    let kind = parse_kind(&kind)?;
    lock(&state).exceptions.remove(&(repo_id, pr_id, kind));
    Ok(StatusCode::NO_CONTENT)
}

// -- Providers --

async fn authenticate(
    Path(segment): Path<String>,
    Json(credentials): Json<Credentials>,
) -> Result<Response, HandlerError> {
    let provider = Provider::parse_str(&segment)
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "unknown provider"))?;
    if credentials.username.is_empty() || credentials.password != MOCK_PASSWORD {
        return Err(error(StatusCode::BAD_REQUEST, "invalid credentials"));
    }
    let prefix = provider.cookie_prefix();
    let mut response = StatusCode::OK.into_response();
    let headers = response.headers_mut();
    for cookie in [
        format!("{prefix}session=token-{}; Path=/; HttpOnly", credentials.username),
        format!("{prefix}user={}; Path=/", credentials.username),
    ] {
        if let Ok(value) = cookie.parse() {
            headers.append(SET_COOKIE, value);
        }
    }
    Ok(response)
}

async fn get_timer(
    State(state): State<MockState>,
    headers: HeaderMap,
    Path(segment): Path<String>,
) -> Result<Json<Option<TimerSnapshot>>, HandlerError> {
    let provider = provider_session(&state, &headers, &segment)?;
    Ok(Json(lock(&state).timers.get(&provider).cloned()))
}

async fn start_timer(
    State(state): State<MockState>,
    headers: HeaderMap,
    Path(segment): Path<String>,
    Json(input): Json<StartTimer>,
) -> Result<StatusCode, HandlerError> {
    let provider = provider_session(&state, &headers, &segment)?;
    let mut data = lock(&state);
    if data.timers.contains_key(&provider) {
        return Err(error(StatusCode::BAD_REQUEST, "timer already running"));
    }
    data.timers.insert(
        provider,
        TimerSnapshot {
            start_time: Utc::now(),
            project_id: Some(input.project_id),
            project_name: Some(input.project_name),
            activity_id: Some(input.activity_id),
            activity_name: Some(input.activity_name),
            note: input.note,
            elapsed_seconds: 0,
        },
    );
    Ok(StatusCode::CREATED)
}

async fn stop_timer(
    State(state): State<MockState>,
    headers: HeaderMap,
    Path(segment): Path<String>,
    Json(input): Json<StopTimer>,
) -> Result<StatusCode, HandlerError> {
    let provider = provider_session(&state, &headers, &segment)?;
    let mut data = lock(&state);
    let timer = data
        .timers
        .remove(&provider)
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "no running timer"))?;
    let now = Utc::now();
    let hours = timer.elapsed_at(now) as f64 / 3600.0;
    data.next_registration += 1;
    let registration_id = format!("r{}", data.next_registration);
    let stopped = TimeEntry {
        registration_id,
        project_id: input.project_id,
        project_name: timer.project_name.unwrap_or_default(),
        activity_id: input.activity_id,
        activity_name: timer.activity_name.unwrap_or_default(),
        date: Local::now().date_naive(),
        hours,
        start_time: Some(timer.start_time),
        end_time: Some(now),
        note: input.note,
        attest_level: AttestLevel::None,
    };
    data.time_entries.entry(provider).or_default().push(stopped);
    Ok(StatusCode::OK)
}

async fn delete_timer(
    State(state): State<MockState>,
    headers: HeaderMap,
    Path(segment): Path<String>,
) -> Result<StatusCode, HandlerError> {
    let provider = provider_session(&state, &headers, &segment)?;
    lock(&state).timers.remove(&provider);
    Ok(StatusCode::NO_CONTENT)
}

async fn edit_timer(
    State(state): State<MockState>,
    headers: HeaderMap,
    Path(segment): Path<String>,
    Json(input): Json<EditTimer>,
) -> Result<StatusCode, HandlerError> {
    let provider = provider_session(&state, &headers, &segment)?;
    let mut data = lock(&state);
    let timer = data
        .timers
        .get_mut(&provider)
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "no running timer"))?;
    if let Some(note) = input.note {
        timer.note = Some(note);
    }
    if let Some(start) = input.start_time {
        timer.start_time = start;
    }
    Ok(StatusCode::OK)
}

async fn list_provider_projects(
    State(state): State<MockState>,
    headers: HeaderMap,
    Path(segment): Path<String>,
) -> Result<Json<Vec<ProviderProject>>, HandlerError> {
    provider_session(&state, &headers, &segment)?;
    Ok(Json(lock(&state).provider_projects.clone()))
}

async fn list_activities(
    State(state): State<MockState>,
    headers: HeaderMap,
    Path((segment, project_id)): Path<(String, String)>,
) -> Result<Json<Vec<Activity>>, HandlerError> {
    provider_session(&state, &headers, &segment)?;
    let activities = lock(&state)
        .activities
        .iter()
        .filter(|a| a.project_id == project_id)
        .cloned()
        .collect();
    Ok(Json(activities))
}

#[derive(Debug, Deserialize)]
struct RangeQuery {
    from: NaiveDate,
    to: NaiveDate,
}

async fn list_time_entries(
    State(state): State<MockState>,
    headers: HeaderMap,
    Path(segment): Path<String>,
    Query(range): Query<RangeQuery>,
) -> Result<Json<Vec<TimeEntry>>, HandlerError> {
    let provider = provider_session(&state, &headers, &segment)?;
    let entries = lock(&state)
        .time_entries
        .get(&provider)
        .map(|list| {
            list.iter()
                .filter(|e| e.date >= range.from && e.date <= range.to)
                .cloned()
                .collect()
        })
        .unwrap_or_default();
    Ok(Json(entries))
}

async fn create_time_entry(
    State(state): State<MockState>,
    headers: HeaderMap,
    Path(segment): Path<String>,
    Json(input): Json<CreateTimeEntry>,
) -> Result<StatusCode, HandlerError> {
    let provider = provider_session(&state, &headers, &segment)?;
    let mut data = lock(&state);
    data.next_registration += 1;
    let registration_id = format!("r{}", data.next_registration);
    let project_name = data
        .provider_projects
        .iter()
        .find(|p| p.id == input.project_id)
        .map(|p| p.name.clone())
        .unwrap_or_else(|| input.project_id.clone());
    let activity_name = data
        .activities
        .iter()
        .find(|a| a.id == input.activity_id)
        .map(|a| a.name.clone())
        .unwrap_or_else(|| input.activity_id.clone());
    data.time_entries.entry(provider).or_default().push(TimeEntry {
        registration_id,
        project_id: input.project_id,
        project_name,
        activity_id: input.activity_id,
        activity_name,
        date: input.date,
        hours: input.hours,
        start_time: input.start_time,
        end_time: input.end_time,
        note: input.note,
        attest_level: AttestLevel::None,
    });
    Ok(StatusCode::CREATED)
}

fn editable_entry<'a>(
    data: &'a mut MockData,
    provider: Provider,
    registration_id: &str,
) -> Result<&'a mut TimeEntry, HandlerError> {
    let entry = data
        .time_entries
        .get_mut(&provider)
        .and_then(|list| list.iter_mut().find(|e| e.registration_id == registration_id))
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "time entry not found"))?;
    if entry.is_locked() {
        return Err(error(StatusCode::LOCKED, "time entry is attested"));
    }
    Ok(entry)
}

async fn update_time_entry(
    State(state): State<MockState>,
    headers: HeaderMap,
    Path(segment): Path<String>,
    Json(input): Json<UpdateTimeEntry>,
) -> Result<StatusCode, HandlerError> {
    let provider = provider_session(&state, &headers, &segment)?;
    let mut data = lock(&state);
    let entry = editable_entry(&mut data, provider, &input.registration_id)?;
    entry.project_id = input.project_id;
    entry.activity_id = input.activity_id;
    entry.date = input.date;
    entry.hours = input.hours;
    entry.note = input.note;
    entry.start_time = input.start_time;
    entry.end_time = input.end_time;
    Ok(StatusCode::OK)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegistrationQuery {
    registration_id: String,
}

async fn delete_time_entry(
    State(state): State<MockState>,
    headers: HeaderMap,
    Path(segment): Path<String>,
    Query(q): Query<RegistrationQuery>,
) -> Result<StatusCode, HandlerError> {
    let provider = provider_session(&state, &headers, &segment)?;
    let mut data = lock(&state);
    editable_entry(&mut data, provider, &q.registration_id)?;
    if let Some(list) = data.time_entries.get_mut(&provider) {
        list.retain(|e| e.registration_id != q.registration_id);
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn get_time_info(
    State(state): State<MockState>,
    headers: HeaderMap,
    Path(segment): Path<String>,
    Query(range): Query<RangeQuery>,
) -> Result<Json<TimeInfo>, HandlerError> {
    let provider = provider_session(&state, &headers, &segment)?;
    let data = lock(&state);
    let worked: f64 = data
        .time_entries
        .get(&provider)
        .map(|list| {
            list.iter()
                .filter(|e| e.date >= range.from && e.date <= range.to)
                .map(|e| e.hours)
                .sum()
        })
        .unwrap_or(0.0);
    let weekdays = (0..=(range.to - range.from).num_days())
        .map(|d| range.from + Duration::days(d))
        .filter(|d| d.weekday().num_days_from_monday() < 5)
        .count();
    let scheduled = weekdays as f64 * 8.0;
    Ok(Json(TimeInfo {
        flex_hours: worked - scheduled,
        scheduled_hours: scheduled,
        worked_hours: worked,
    }))
}
