use std::sync::{Arc, Mutex};

use chrono::{Duration, Local, NaiveDate, Utc};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap};
use tracing::{info, warn};
use worktrack_core::board::{Board, BoardScope, WorkItemCategory};
use worktrack_core::board_filter::{
    board_members, build_board_view, BoardFilters, BoardView, HiddenColumns, MemberMode,
};
use worktrack_core::differ::{Differ, DifferStatus};
use worktrack_core::format::{
    format_elapsed, format_hours_as_hours_minutes, iso_week_bounds, iso_week_number,
};
use worktrack_core::notification::{unread_count, Notification};
use worktrack_core::sanitize::html_to_text;
use worktrack_core::time_entry::{CreateTimeEntry, DateRange, EntryRow, TimeEntry, TimeInfo};
use worktrack_core::timer::{Provider, StartTimer, StopTimer, TimerDisplay, TimerPatch, TimerSnapshot};
use worktrack_service::board_move::{BeginMove, PendingMove};
use worktrack_service::{
    AuthEvent, AuthHook, BlockingHttpService, Credentials, ProviderSession, QueryKey,
    ServiceError,
};
use worktrack_store::{LastActivity, LastProject, Preferences, Theme};

use crate::components::board::{BoardPanel, Step};
use crate::components::time_entries::EntriesPanel;
use crate::components::Palette;

/// Collects 401 events raised by the HTTP layer until the UI drains them.
#[derive(Clone, Default)]
pub struct AuthInbox {
    events: Arc<Mutex<Vec<AuthEvent>>>,
}

impl AuthInbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hook(&self) -> AuthHook {
        let events = self.events.clone();
        Arc::new(move |event: AuthEvent| {
            events
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .push(event);
        })
    }

    pub fn drain(&self) -> Vec<AuthEvent> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(|p| p.into_inner()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Board,
    TimeEntries,
    Differs,
    Notifications,
}

impl View {
    pub const ALL: &[View] = &[
        View::Board,
        View::TimeEntries,
        View::Differs,
        View::Notifications,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            View::Board => "Board",
            View::TimeEntries => "Time",
            View::Differs => "Differs",
            View::Notifications => "Notifications",
        }
    }

    fn index(self) -> usize {
        View::ALL.iter().position(|v| *v == self).unwrap_or(0)
    }

    fn next(self) -> Self {
        View::ALL[(self.index() + 1) % View::ALL.len()]
    }

    fn prev(self) -> Self {
        View::ALL[(self.index() + View::ALL.len() - 1) % View::ALL.len()]
    }
}

/// What the app is currently doing
#[derive(Debug, Clone)]
pub enum Mode {
    Normal,
    /// Provider login prompt
    Login {
        provider: Provider,
        username: String,
        password: String,
        field: LoginField,
    },
    /// Toggling work item categories on the board
    CategoryPick,
    /// Choosing assignees for the custom member filter, as (name, email)
    MemberPick { members: Vec<(String, String)> },
    /// Confirm deleting a time entry
    ConfirmDelete { row: EntryRow },
    /// Work item rendered for pasting into an LLM prompt
    LlmText {
        item_id: i64,
        text: String,
        scroll: u16,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginField {
    Username,
    Password,
}

pub struct App {
    service: BlockingHttpService,
    preferences: Preferences,
    inbox: AuthInbox,
    scope: Option<BoardScope>,
    filters: BoardFilters,
    view: View,
    mode: Mode,
    board: BoardPanel,
    /// Moves patched into the cached board whose requests go out after the
    /// next draw.
    pending_moves: Vec<PendingMove>,
    provider: Provider,
    sessions: Vec<ProviderSession>,
    timer: Option<TimerSnapshot>,
    week_of: NaiveDate,
    week_entries: Vec<TimeEntry>,
    entries: EntriesPanel,
    time_info: Option<TimeInfo>,
    differs: Vec<Differ>,
    differ_state: ListState,
    notifications: Vec<Notification>,
    notification_state: ListState,
    login_required: bool,
    status_message: Option<String>,
    theme: Theme,
}

impl App {
    pub fn new(
        service: BlockingHttpService,
        preferences: Preferences,
        inbox: AuthInbox,
        scope: Option<BoardScope>,
        user_email: Option<String>,
    ) -> Self {
        let filters = BoardFilters {
            member: preferences.member_filter().load(),
            category: preferences.category_filter().load(),
            hidden_columns: preferences.hidden_columns().load(),
            current_user_email: user_email,
        };
        let merged = preferences.merge_entries().load();
        let theme = preferences.theme().load();
        let sessions = Provider::ALL.iter().map(|&p| service.session(p)).collect();

        let mut app = Self {
            service,
            preferences,
            inbox,
            scope,
            filters,
            view: View::Board,
            mode: Mode::Normal,
            board: BoardPanel::new(BoardView::default()),
            pending_moves: Vec::new(),
            provider: Provider::Milltime,
            sessions,
            timer: None,
            week_of: Local::now().date_naive(),
            week_entries: Vec::new(),
            entries: EntriesPanel::new(&[], merged),
            time_info: None,
            differs: Vec::new(),
            differ_state: ListState::default(),
            notifications: Vec::new(),
            notification_state: ListState::default(),
            login_required: false,
            status_message: None,
            theme,
        };
        app.refresh_all();
        app
    }

    // -- Accessors --

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn board(&self) -> &BoardPanel {
        &self.board
    }

    pub fn filters(&self) -> &BoardFilters {
        &self.filters
    }

    pub fn entries(&self) -> &EntriesPanel {
        &self.entries
    }

    pub fn differs(&self) -> &[Differ] {
        &self.differs
    }

    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn session(&self, provider: Provider) -> Option<&ProviderSession> {
        self.sessions.iter().find(|s| s.provider() == provider)
    }

    pub fn status_message(&self) -> Option<&str> {
        self.status_message.as_deref()
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    fn palette(&self) -> Palette {
        Palette::for_theme(self.theme)
    }

    pub fn login_required(&self) -> bool {
        self.login_required
    }

    pub fn week_range(&self) -> DateRange {
        let (from, to) = iso_week_bounds(self.week_of);
        DateRange { from, to }
    }

    pub fn is_input_mode(&self) -> bool {
        matches!(self.mode, Mode::Login { .. })
    }

    pub fn has_pending_moves(&self) -> bool {
        !self.pending_moves.is_empty()
    }

    /// The event loop redraws on a timeout while a timer is running.
    pub fn needs_polling(&self) -> bool {
        self.timer.is_some()
    }

    pub fn tick(&mut self) {
        if let Some(snapshot) = &self.timer {
            let elapsed = snapshot.elapsed_at(Utc::now());
            self.session_mut(self.provider).set_timer(TimerPatch {
                elapsed_seconds: Some(elapsed),
                ..Default::default()
            });
        }
    }

    fn session_mut(&mut self, provider: Provider) -> &mut ProviderSession {
        let idx = self
            .sessions
            .iter()
            .position(|s| s.provider() == provider)
            .unwrap_or(0);
        &mut self.sessions[idx]
    }

    fn is_authenticated(&self) -> bool {
        self.session(self.provider)
            .is_some_and(|s| s.is_authenticated())
    }

    fn report(&mut self, what: &str, error: ServiceError) {
        warn!("{what} failed: {error}");
        self.status_message = Some(match error {
            ServiceError::Locked(msg) => format!("Locked: {msg}"),
            other => format!("{what} failed: {other}"),
        });
    }

    // -- Loading --

    fn refresh_all(&mut self) {
        self.refresh_board();
        self.refresh_differs();
        self.refresh_notifications();
        self.refresh_time();
        self.drain_auth_events();
    }

    fn refresh_board(&mut self) {
        let Some(scope) = self.scope.clone() else {
            return;
        };
        match self.service.board(&scope) {
            Ok(board) => self.rebuild_board(&board),
            Err(e) => self.report("Loading board", e),
        }
    }

    /// Rebuild from whatever the cache holds, optimistic patches included.
    fn redraw_board(&mut self) {
        let Some(scope) = self.scope.clone() else {
            return;
        };
        match self.service.cache().get::<Board>(&QueryKey::Board(scope)) {
            Some(board) => self.rebuild_board(&board),
            None => self.refresh_board(),
        }
    }

    fn rebuild_board(&mut self, board: &Board) {
        let selected = self.board.selected_item().map(|i| i.id);
        let active = self.board.active_column().map(|c| c.id.clone());
        self.board = BoardPanel::new(build_board_view(board, &self.filters));
        let kept = selected.is_some_and(|id| self.board.select_item_by_id(id));
        if !kept {
            if let Some(column_id) = active {
                self.board.focus_column(&column_id);
            }
        }
    }

    fn refresh_differs(&mut self) {
        match self.service.differs() {
            Ok(differs) => {
                self.differs = differs;
                clamp_selection(&mut self.differ_state, self.differs.len());
            }
            Err(e) => self.report("Loading differs", e),
        }
    }

    fn refresh_notifications(&mut self) {
        match self.service.notifications() {
            Ok(notifications) => {
                self.notifications = notifications;
                clamp_selection(&mut self.notification_state, self.notifications.len());
            }
            Err(e) => self.report("Loading notifications", e),
        }
    }

    fn refresh_time(&mut self) {
        if !self.is_authenticated() {
            self.timer = None;
            self.week_entries.clear();
            self.time_info = None;
            self.entries = EntriesPanel::new(&[], self.entries.is_merged());
            return;
        }
        let provider = self.provider;
        let range = self.week_range();

        match self.service.timer(provider) {
            Ok(snapshot) => {
                let display = TimerDisplay::from_snapshot(snapshot.as_ref(), Utc::now());
                self.session_mut(provider).set_timer(TimerPatch {
                    visible: Some(display.visible),
                    running: Some(display.running),
                    elapsed_seconds: Some(display.elapsed_seconds),
                });
                self.timer = snapshot;
            }
            Err(e) => self.report("Loading timer", e),
        }

        match self.service.time_entries(provider, range) {
            Ok(entries) => {
                let selected = self
                    .entries
                    .selected_row()
                    .and_then(|r| r.periods.first())
                    .map(|p| p.registration_id.clone());
                self.entries = EntriesPanel::new(&entries, self.entries.is_merged());
                if let Some(id) = selected {
                    self.entries.select_registration(&id);
                }
                self.week_entries = entries;
            }
            Err(e) => self.report("Loading time entries", e),
        }

        match self.service.time_info(provider, range) {
            Ok(info) => self.time_info = Some(info),
            Err(e) => self.report("Loading time info", e),
        }
    }

    /// Apply 401s the HTTP layer reported since the last call.
    pub fn drain_auth_events(&mut self) {
        for event in self.inbox.drain() {
            match event {
                AuthEvent::LoginRequired => {
                    warn!("core API session expired");
                    self.login_required = true;
                    self.status_message = Some("Login required: core API session expired".into());
                }
                AuthEvent::ProviderExpired(provider) => {
                    for session in &mut self.sessions {
                        session.handle_auth_event(event);
                    }
                    if provider == self.provider {
                        self.timer = None;
                    }
                    if let Some(msg) = self.session(provider).and_then(|s| s.error()) {
                        self.status_message = Some(msg.to_string());
                    }
                }
            }
        }
    }

    /// Send the moves patched by the last key press. The event loop calls
    /// this after drawing so the optimistic board is on screen while the
    /// requests are out.
    pub fn settle_moves(&mut self) {
        for pending in std::mem::take(&mut self.pending_moves) {
            let item_id = pending.item_id();
            if let Err(e) = self.service.finish_move(pending) {
                warn!(item_id, "move failed: {e}");
                self.status_message = Some(format!("Move of #{item_id} failed: {e}"));
            }
        }
        self.refresh_board();
        self.drain_auth_events();
    }

    // -- Keys --

    pub fn handle_key(&mut self, key: KeyEvent) {
        self.status_message = None;

        match self.mode.clone() {
            Mode::Normal => self.handle_normal(key),
            Mode::Login {
                provider,
                username,
                password,
                field,
            } => self.handle_login(key, provider, username, password, field),
            Mode::CategoryPick => self.handle_category_pick(key),
            Mode::MemberPick { members } => self.handle_member_pick(key, members),
            Mode::ConfirmDelete { row } => self.handle_confirm_delete(key, row),
            Mode::LlmText {
                item_id,
                text,
                scroll,
            } => self.handle_llm_text(key, item_id, text, scroll),
        }

        self.drain_auth_events();
    }

    fn handle_normal(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Tab => self.switch_view(self.view.next()),
            KeyCode::BackTab => self.switch_view(self.view.prev()),
            KeyCode::Char(c @ '1'..='4') => {
                let idx = c as usize - '1' as usize;
                self.switch_view(View::ALL[idx]);
            }
            KeyCode::Char('r') => self.reload_view(),
            KeyCode::Char('p') => {
                self.provider = match self.provider {
                    Provider::Milltime => Provider::TimeTracking,
                    Provider::TimeTracking => Provider::Milltime,
                };
                self.timer = None;
                self.refresh_time();
                self.status_message = Some(format!("Provider: {}", self.provider));
            }
            KeyCode::Char('L') => {
                self.mode = Mode::Login {
                    provider: self.provider,
                    username: String::new(),
                    password: String::new(),
                    field: LoginField::Username,
                };
            }
            KeyCode::Char('O') => {
                let provider = self.provider;
                let idx = self
                    .sessions
                    .iter()
                    .position(|s| s.provider() == provider)
                    .unwrap_or(0);
                self.service.log_out(&mut self.sessions[idx]);
                info!(provider = provider.as_str(), "logged out");
                self.refresh_time();
                self.status_message = Some(format!("Logged out of {provider}"));
            }
            KeyCode::Char('T') => {
                self.theme = self.theme.next();
                if let Err(e) = self.preferences.theme().save(&self.theme) {
                    warn!("saving theme: {e}");
                }
                self.status_message = Some(format!("Theme: {}", self.theme.display_name()));
            }
            KeyCode::Esc => {
                self.login_required = false;
                let provider = self.provider;
                self.session_mut(provider).dismiss_error();
            }
            _ => match self.view {
                View::Board => self.handle_board(key),
                View::TimeEntries => self.handle_time(key),
                View::Differs => self.handle_differs(key),
                View::Notifications => self.handle_notifications(key),
            },
        }
    }

    fn switch_view(&mut self, view: View) {
        self.view = view;
        if view == View::TimeEntries && !self.is_authenticated() {
            self.status_message = Some(format!("Not logged in to {}, press L", self.provider));
        }
    }

    fn reload_view(&mut self) {
        let cache = self.service.cache();
        match self.view {
            View::Board => {
                if let Some(scope) = &self.scope {
                    cache.invalidate(&QueryKey::Board(scope.clone()));
                }
                self.refresh_board();
            }
            View::TimeEntries => {
                let provider = self.provider;
                cache.invalidate(&QueryKey::Timer(provider));
                cache.invalidate_where(|k| k.is_time_data_for(provider));
                self.refresh_time();
            }
            View::Differs => {
                cache.invalidate(&QueryKey::Differs);
                self.refresh_differs();
            }
            View::Notifications => {
                cache.invalidate(&QueryKey::Notifications);
                self.refresh_notifications();
            }
        }
    }

    // -- Board --

    fn handle_board(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('m') => self.move_selected(Step::Right),
            KeyCode::Char('M') => self.move_selected(Step::Left),
            KeyCode::Char('f') => {
                self.filters.member.mode = self.filters.member.mode.next();
                self.save_member_filter();
                self.status_message =
                    Some(format!("Members: {}", self.filters.member.mode.display_name()));
            }
            KeyCode::Char('a') => {
                let Some(email) = self
                    .board
                    .selected_item()
                    .and_then(|i| i.assignee_email())
                    .map(String::from)
                else {
                    return;
                };
                self.filters.member.mode = MemberMode::Custom;
                self.filters.member.toggle_member(&email);
                self.save_member_filter();
            }
            KeyCode::Char('c') => self.mode = Mode::CategoryPick,
            KeyCode::Char('u') => self.open_member_pick(),
            KeyCode::Char('x') => {
                let Some(column) = self.board.active_column().cloned() else {
                    return;
                };
                self.filters.hidden_columns.toggle(&column.id);
                self.save_hidden_columns();
                self.status_message = Some(format!("Hid column {}", column.name));
            }
            KeyCode::Char('X') => {
                self.filters.hidden_columns = HiddenColumns::default();
                self.save_hidden_columns();
            }
            KeyCode::Char('y') => self.open_llm_text(),
            _ => self.board.handle_key(key),
        }
    }

    fn move_selected(&mut self, step: Step) {
        let Some(scope) = self.scope.clone() else {
            return;
        };
        let Some(item_id) = self.board.selected_item().map(|i| i.id) else {
            return;
        };
        let Some(target) = self.board.neighbour_column(step).cloned() else {
            return;
        };

        match self.service.begin_move(&scope, item_id, &target.id) {
            Ok(BeginMove::Started(pending)) => {
                info!(item_id, column = %target.name, "moving work item");
                self.pending_moves.push(pending);
                self.redraw_board();
                self.board.select_item_by_id(item_id);
            }
            Ok(BeginMove::Dropped) => {
                self.status_message = Some(format!("#{item_id} is already moving"));
            }
            Ok(BeginMove::Unchanged) => {}
            Err(e) => self.report("Move", e),
        }
    }

    fn save_member_filter(&mut self) {
        if let Err(e) = self.preferences.member_filter().save(&self.filters.member) {
            warn!("saving member filter: {e}");
        }
        self.redraw_board();
    }

    fn save_hidden_columns(&mut self) {
        if let Err(e) = self
            .preferences
            .hidden_columns()
            .save(&self.filters.hidden_columns)
        {
            warn!("saving hidden columns: {e}");
        }
        self.redraw_board();
    }

    fn handle_category_pick(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char(c @ '1'..='9') => {
                let idx = c as usize - '1' as usize;
                if let Some(&category) = WorkItemCategory::ALL.get(idx) {
                    self.filters.category.toggle(category);
                    if let Err(e) = self
                        .preferences
                        .category_filter()
                        .save(&self.filters.category)
                    {
                        warn!("saving category filter: {e}");
                    }
                    self.redraw_board();
                }
            }
            KeyCode::Esc | KeyCode::Enter => self.mode = Mode::Normal,
            _ => {}
        }
    }

    fn open_member_pick(&mut self) {
        let Some(scope) = self.scope.clone() else {
            return;
        };
        let members = self
            .service
            .cache()
            .get::<Board>(&QueryKey::Board(scope))
            .map(|board| board_members(&board))
            .unwrap_or_default();
        if members.is_empty() {
            self.status_message = Some("No assignees on this board".into());
            return;
        }
        self.mode = Mode::MemberPick { members };
    }

    fn handle_member_pick(&mut self, key: KeyEvent, members: Vec<(String, String)>) {
        match key.code {
            KeyCode::Char(c @ '1'..='9') => {
                let idx = c as usize - '1' as usize;
                if let Some((_, email)) = members.get(idx) {
                    self.filters.member.mode = MemberMode::Custom;
                    self.filters.member.toggle_member(email);
                    self.save_member_filter();
                }
            }
            KeyCode::Char('0') => {
                self.filters.member.selected.clear();
                self.save_member_filter();
            }
            KeyCode::Esc | KeyCode::Enter => self.mode = Mode::Normal,
            _ => {}
        }
    }

    fn open_llm_text(&mut self) {
        let (Some(scope), Some(item_id)) =
            (self.scope.clone(), self.board.selected_item().map(|i| i.id))
        else {
            return;
        };
        match self
            .service
            .format_for_llm(&scope.organization, &scope.project, item_id)
        {
            Ok(text) => {
                // Descriptions come back as rich text.
                self.mode = Mode::LlmText {
                    item_id,
                    text: html_to_text(&text),
                    scroll: 0,
                }
            }
            Err(e) => self.report("Formatting work item", e),
        }
    }

    fn handle_llm_text(&mut self, key: KeyEvent, item_id: i64, text: String, scroll: u16) {
        match key.code {
            KeyCode::Char('j') | KeyCode::Down => {
                self.mode = Mode::LlmText {
                    item_id,
                    text,
                    scroll: scroll.saturating_add(1),
                }
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.mode = Mode::LlmText {
                    item_id,
                    text,
                    scroll: scroll.saturating_sub(1),
                }
            }
            KeyCode::Esc => self.mode = Mode::Normal,
            _ => {}
        }
    }

    // -- Provider login --

    fn handle_login(
        &mut self,
        key: KeyEvent,
        provider: Provider,
        mut username: String,
        mut password: String,
        mut field: LoginField,
    ) {
        match key.code {
            KeyCode::Esc => {
                self.mode = Mode::Normal;
                return;
            }
            KeyCode::Tab => {
                field = match field {
                    LoginField::Username => LoginField::Password,
                    LoginField::Password => LoginField::Username,
                };
            }
            KeyCode::Backspace => {
                match field {
                    LoginField::Username => username.pop(),
                    LoginField::Password => password.pop(),
                };
            }
            KeyCode::Char(c) => match field {
                LoginField::Username => username.push(c),
                LoginField::Password => password.push(c),
            },
            KeyCode::Enter => {
                if field == LoginField::Username {
                    field = LoginField::Password;
                } else {
                    let credentials = Credentials {
                        username: username.trim().to_string(),
                        password: password.clone(),
                    };
                    let idx = self
                        .sessions
                        .iter()
                        .position(|s| s.provider() == provider)
                        .unwrap_or(0);
                    match self
                        .service
                        .authenticate(&mut self.sessions[idx], &credentials)
                    {
                        Ok(()) => {
                            self.mode = Mode::Normal;
                            self.status_message = Some(format!("Logged in to {provider}"));
                            self.refresh_time();
                            return;
                        }
                        Err(e) => {
                            self.report("Login", e);
                            password.clear();
                        }
                    }
                }
            }
            _ => {}
        }
        self.mode = Mode::Login {
            provider,
            username,
            password,
            field,
        };
    }

    // -- Time entries --

    fn handle_time(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('[') => {
                self.week_of -= Duration::days(7);
                self.refresh_time();
            }
            KeyCode::Char(']') => {
                self.week_of += Duration::days(7);
                self.refresh_time();
            }
            KeyCode::Char('t') => {
                self.week_of = Local::now().date_naive();
                self.refresh_time();
            }
            KeyCode::Char('v') => {
                let merged = !self.entries.is_merged();
                if let Err(e) = self.preferences.merge_entries().save(&merged) {
                    warn!("saving merge preference: {e}");
                }
                self.entries = EntriesPanel::new(&self.week_entries, merged);
            }
            KeyCode::Char('s') => self.toggle_timer(),
            KeyCode::Char('c') => self.copy_to_today(),
            KeyCode::Char('d') => {
                let Some(row) = self.entries.selected_row().cloned() else {
                    return;
                };
                if row.is_locked() {
                    self.status_message = Some("Entry is attested and locked".into());
                } else if !row.can_delete() {
                    self.status_message = Some("Unmerge rows (v) to delete a single entry".into());
                } else {
                    self.mode = Mode::ConfirmDelete { row };
                }
            }
            _ => self.entries.handle_key(key),
        }
    }

    fn toggle_timer(&mut self) {
        if !self.is_authenticated() {
            self.status_message = Some(format!("Not logged in to {}, press L", self.provider));
            return;
        }
        let provider = self.provider;
        match self.timer.clone() {
            Some(snapshot) => {
                let (Some(project_id), Some(activity_id)) =
                    (snapshot.project_id.clone(), snapshot.activity_id.clone())
                else {
                    self.status_message = Some("Timer has no project or activity".into());
                    return;
                };
                let input = StopTimer {
                    project_id,
                    activity_id,
                    note: snapshot.note.clone(),
                };
                match self.service.stop_timer(provider, &input) {
                    Ok(()) => self.status_message = Some("Timer stopped".into()),
                    Err(e) => self.report("Stopping timer", e),
                }
            }
            None => {
                let Some(input) = self.timer_target() else {
                    self.status_message = Some("No project to start a timer on".into());
                    return;
                };
                match self.service.start_timer(provider, &input) {
                    Ok(()) => {
                        self.remember_project(&input);
                        self.status_message = Some(format!("Timer started on {}", input.project_name));
                    }
                    Err(e) => self.report("Starting timer", e),
                }
            }
        }
        self.refresh_time();
    }

    /// Selected row first, then the remembered project, then the provider's
    /// first project.
    fn timer_target(&self) -> Option<StartTimer> {
        if let Some(row) = self.entries.selected_row() {
            return Some(StartTimer {
                project_id: row.project_id.clone(),
                project_name: row.project_name.clone(),
                activity_id: row.activity_id.clone(),
                activity_name: row.activity_name.clone(),
                note: row.note.clone(),
            });
        }
        let provider = self.provider;
        let (project_id, project_name) = match self.preferences.last_project().load() {
            Some(last) => (last.project_id, last.project_name),
            None => {
                let first = self.service.provider_projects(provider).ok()?.into_iter().next()?;
                (first.id, first.name)
            }
        };
        let activity = match self.preferences.last_activity().load() {
            Some(last) => (last.activity_id, last.activity_name),
            None => {
                let first = self
                    .service
                    .activities(provider, &project_id)
                    .ok()?
                    .into_iter()
                    .next()?;
                (first.id, first.name)
            }
        };
        Some(StartTimer {
            project_id,
            project_name,
            activity_id: activity.0,
            activity_name: activity.1,
            note: None,
        })
    }

    fn remember_project(&self, input: &StartTimer) {
        let project = LastProject {
            project_id: input.project_id.clone(),
            project_name: input.project_name.clone(),
        };
        let activity = LastActivity {
            activity_id: input.activity_id.clone(),
            activity_name: input.activity_name.clone(),
        };
        let saved = self
            .preferences
            .note_project_used(project)
            .and_then(|_| self.preferences.last_activity().save(&Some(activity)));
        if let Err(e) = saved {
            warn!("saving last project: {e}");
        }
    }

    fn copy_to_today(&mut self) {
        let Some(row) = self.entries.selected_row().cloned() else {
            return;
        };
        let input = CreateTimeEntry {
            project_id: row.project_id.clone(),
            activity_id: row.activity_id.clone(),
            date: Local::now().date_naive(),
            hours: row.hours,
            note: row.note.clone(),
            start_time: None,
            end_time: None,
        };
        match self.service.create_time_entry(self.provider, &input) {
            Ok(()) => {
                self.status_message = Some(format!(
                    "Logged {} on {}",
                    format_hours_as_hours_minutes(row.hours),
                    row.project_name
                ));
                self.refresh_time();
            }
            Err(e) => self.report("Creating entry", e),
        }
    }

    fn handle_confirm_delete(&mut self, key: KeyEvent, row: EntryRow) {
        self.mode = Mode::Normal;
        if key.code != KeyCode::Char('y') {
            return;
        }
        let Some(registration_id) = row.periods.first().map(|p| p.registration_id.clone()) else {
            return;
        };
        let Some(existing) = self
            .week_entries
            .iter()
            .find(|e| e.registration_id == registration_id)
            .cloned()
        else {
            return;
        };
        match self.service.delete_time_entry(self.provider, &existing) {
            Ok(()) => {
                self.status_message = Some("Entry deleted".into());
                self.refresh_time();
            }
            Err(e) => self.report("Deleting entry", e),
        }
    }

    // -- Differs --

    fn handle_differs(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('j') | KeyCode::Down => step_selection(&mut self.differ_state, self.differs.len(), 1),
            KeyCode::Char('k') | KeyCode::Up => step_selection(&mut self.differ_state, self.differs.len(), -1),
            KeyCode::Char('f') => {
                let Some(differ) = self.selected_differ().cloned() else {
                    return;
                };
                match self
                    .service
                    .follow_repository(&differ.key, !differ.is_followed)
                {
                    Ok(()) => self.refresh_differs(),
                    Err(e) => self.report("Follow", e),
                }
            }
            KeyCode::Char('s') => {
                let Some(differ) = self.selected_differ().cloned() else {
                    return;
                };
                let result = if differ.status == DifferStatus::Running {
                    self.service.stop_differ(&differ.key)
                } else {
                    self.service.start_differ(&differ.key)
                };
                match result {
                    Ok(()) => self.refresh_differs(),
                    Err(e) => self.report("Differ", e),
                }
            }
            _ => {}
        }
    }

    fn selected_differ(&self) -> Option<&Differ> {
        self.differs.get(self.differ_state.selected()?)
    }

    // -- Notifications --

    fn handle_notifications(&mut self, key: KeyEvent) {
        let len = self.notifications.len();
        match key.code {
            KeyCode::Char('j') | KeyCode::Down => step_selection(&mut self.notification_state, len, 1),
            KeyCode::Char('k') | KeyCode::Up => step_selection(&mut self.notification_state, len, -1),
            KeyCode::Enter | KeyCode::Char('v') => {
                let Some(id) = self.selected_notification().map(|n| n.id) else {
                    return;
                };
                match self.service.mark_notification_viewed(id) {
                    Ok(()) => self.refresh_notifications(),
                    Err(e) => self.report("Marking notification", e),
                }
            }
            KeyCode::Char('d') => {
                let Some(id) = self.selected_notification().map(|n| n.id) else {
                    return;
                };
                match self.service.delete_notification(id) {
                    Ok(()) => self.refresh_notifications(),
                    Err(e) => self.report("Deleting notification", e),
                }
            }
            _ => {}
        }
    }

    fn selected_notification(&self) -> Option<&Notification> {
        self.notifications.get(self.notification_state.selected()?)
    }

    // -- Rendering --

    pub fn render(&self, frame: &mut Frame) {
        let area = frame.area();

        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(0),
                Constraint::Length(1),
            ])
            .split(area);

        self.render_title_bar(frame, layout[0]);
        match self.view {
            View::Board => self.render_board(frame, layout[1]),
            View::TimeEntries => self.render_time(frame, layout[1]),
            View::Differs => self.render_differs(frame, layout[1]),
            View::Notifications => self.render_notifications(frame, layout[1]),
        }
        self.render_status_bar(frame, layout[2]);

        match &self.mode {
            Mode::Normal => {}
            Mode::Login {
                provider,
                username,
                password,
                field,
            } => self.render_login(frame, *provider, username, password, *field, area),
            Mode::CategoryPick => self.render_category_pick(frame, area),
            Mode::MemberPick { members } => self.render_member_pick(frame, members, area),
            Mode::ConfirmDelete { row } => self.render_confirm_delete(frame, row, area),
            Mode::LlmText { text, scroll, .. } => {
                self.render_scrollable_text(frame, " Work item for LLM ", text, *scroll, area)
            }
        }
    }

    fn render_title_bar(&self, frame: &mut Frame, area: Rect) {
        let mut spans = vec![Span::styled(
            " worktrack ",
            Style::default().bold().fg(self.palette().accent),
        )];
        if let Some(scope) = &self.scope {
            spans.push(Span::raw("| "));
            spans.push(Span::styled(
                format!("{}/{}", scope.organization, scope.project),
                Style::default().fg(Color::Yellow),
            ));
        }
        spans.push(Span::raw(" |"));
        for (i, view) in View::ALL.iter().enumerate() {
            let style = if *view == self.view {
                Style::default().fg(self.palette().accent).bold()
            } else {
                Style::default().fg(Color::DarkGray)
            };
            spans.push(Span::styled(format!(" {}:{}", i + 1, view.title()), style));
        }

        let unread = unread_count(&self.notifications);
        if unread > 0 {
            spans.push(Span::styled(
                format!(" ({unread} unread)"),
                Style::default().fg(Color::Magenta),
            ));
        }

        if let Some(session) = self.session(self.provider) {
            spans.push(Span::raw(" | "));
            let (label, color) = if session.is_authenticated() {
                (self.provider.display_name(), Color::Green)
            } else {
                (self.provider.display_name(), Color::DarkGray)
            };
            spans.push(Span::styled(label, Style::default().fg(color)));
            let timer = session.timer();
            if timer.visible && timer.running {
                spans.push(Span::styled(
                    format!(" {}", format_elapsed(timer.elapsed_seconds)),
                    Style::default().fg(Color::Red).bold(),
                ));
            }
        }
        if self.login_required {
            spans.push(Span::styled(
                " | login required",
                Style::default().fg(Color::Red).bold(),
            ));
        }
        frame.render_widget(Line::from(spans), area);
    }

    fn render_status_bar(&self, frame: &mut Frame, area: Rect) {
        let sticky = self.session(self.provider).and_then(|s| s.error());
        if let Some(msg) = self.status_message.as_deref().or(sticky) {
            let color = if sticky.is_some_and(|s| s == msg) {
                Color::Red
            } else {
                Color::Green
            };
            let line = Line::from(Span::styled(format!(" {msg}"), Style::default().fg(color)));
            frame.render_widget(line, area);
            return;
        }

        let hints = match (&self.mode, self.view) {
            (Mode::Normal, View::Board) => vec![
                ("q", "quit"),
                ("Tab", "view"),
                ("h/l", "cols"),
                ("j/k", "items"),
                ("m/M", "move"),
                ("f", "members"),
                ("a", "pick member"),
                ("u", "member list"),
                ("c", "categories"),
                ("x/X", "hide/show col"),
                ("y", "llm"),
                ("r", "reload"),
            ],
            (Mode::Normal, View::TimeEntries) => vec![
                ("q", "quit"),
                ("Tab", "view"),
                ("[/]", "week"),
                ("t", "today"),
                ("v", "merge"),
                ("s", "timer"),
                ("c", "copy to today"),
                ("d", "del"),
                ("p", "provider"),
                ("L/O", "log in/out"),
            ],
            (Mode::Normal, View::Differs) => vec![
                ("q", "quit"),
                ("Tab", "view"),
                ("j/k", "nav"),
                ("f", "follow"),
                ("s", "start/stop"),
                ("r", "reload"),
            ],
            (Mode::Normal, View::Notifications) => vec![
                ("q", "quit"),
                ("Tab", "view"),
                ("j/k", "nav"),
                ("v", "viewed"),
                ("d", "del"),
                ("r", "reload"),
            ],
            (Mode::Login { .. }, _) => {
                vec![("Tab", "next field"), ("Enter", "log in"), ("Esc", "cancel")]
            }
            (Mode::CategoryPick, _) => vec![("1-6", "toggle"), ("Esc", "done")],
            (Mode::MemberPick { .. }, _) => {
                vec![("1-9", "toggle"), ("0", "clear"), ("Esc", "done")]
            }
            (Mode::ConfirmDelete { .. }, _) => vec![("y", "confirm"), ("any", "cancel")],
            (Mode::LlmText { .. }, _) => vec![("j/k", "scroll"), ("Esc", "back")],
        };

        let spans: Vec<Span> = hints
            .into_iter()
            .flat_map(|(key, desc)| {
                vec![
                    Span::styled(format!(" {key}"), Style::default().fg(Color::Yellow).bold()),
                    Span::raw(format!(" {desc} ")),
                ]
            })
            .collect();

        frame.render_widget(Line::from(spans), area);
    }

    fn render_board(&self, frame: &mut Frame, area: Rect) {
        if self.scope.is_none() {
            frame.render_widget(
                Paragraph::new(" No board selected: set --organization and --project"),
                area,
            );
            return;
        }
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(1), Constraint::Min(0)])
            .split(area);

        let hidden = self.filters.hidden_columns.ids.len();
        let mut summary = format!(
            " Members: {}  Categories: {}/{}",
            self.filters.member.mode.display_name(),
            self.filters.category.enabled.len(),
            WorkItemCategory::ALL.len()
        );
        if hidden > 0 {
            summary.push_str(&format!("  Hidden columns: {hidden}"));
        }
        frame.render_widget(
            Line::from(Span::styled(summary, Style::default().fg(Color::DarkGray))),
            layout[0],
        );

        let moving = self.pending_moves.first().map(|m| m.item_id());
        self.board.render(frame, layout[1], moving, self.palette());
    }

    fn render_time(&self, frame: &mut Frame, area: Rect) {
        if !self.is_authenticated() {
            let text = format!(" Not logged in to {}. Press L to log in.", self.provider);
            frame.render_widget(
                Paragraph::new(text).style(Style::default().fg(Color::Yellow)),
                area,
            );
            return;
        }
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(1), Constraint::Min(0)])
            .split(area);

        let range = self.week_range();
        let mut header = vec![Span::styled(
            format!(
                " Week {} ({} - {})",
                iso_week_number(range.from),
                range.from.format("%d %b"),
                range.to.format("%d %b")
            ),
            Style::default().bold(),
        )];
        if let Some(info) = &self.time_info {
            header.push(Span::styled(
                format!(
                    "  worked {} of {}, flex {}",
                    format_hours_as_hours_minutes(info.worked_hours),
                    format_hours_as_hours_minutes(info.scheduled_hours),
                    format_hours_as_hours_minutes(info.flex_hours)
                ),
                Style::default().fg(Color::DarkGray),
            ));
        }
        frame.render_widget(Line::from(header), layout[0]);
        self.entries
            .render(frame, layout[1], self.provider.display_name(), self.palette());
    }

    fn render_differs(&self, frame: &mut Frame, area: Rect) {
        let items: Vec<ListItem> = self
            .differs
            .iter()
            .map(|d| {
                let status_color = match d.status {
                    DifferStatus::Running => Color::Green,
                    _ => Color::DarkGray,
                };
                ListItem::new(Line::from(vec![
                    Span::styled(
                        format!("{:<8} ", d.status.display_name()),
                        Style::default().fg(status_color),
                    ),
                    Span::raw(d.key.to_string()),
                    Span::styled(
                        if d.is_followed { " *" } else { "" },
                        Style::default().fg(Color::Yellow),
                    ),
                ]))
            })
            .collect();
        let list = List::new(items)
            .block(
                Block::default()
                    .title(" Differs ")
                    .borders(Borders::ALL)
                    .border_style(self.palette().border()),
            )
            .highlight_style(self.palette().highlight())
            .highlight_symbol("> ");
        let mut state = self.differ_state.clone();
        frame.render_stateful_widget(list, area, &mut state);
    }

    fn render_notifications(&self, frame: &mut Frame, area: Rect) {
        let items: Vec<ListItem> = self
            .notifications
            .iter()
            .map(|n| {
                let style = if n.viewed {
                    Style::default().fg(Color::DarkGray)
                } else {
                    Style::default().bold()
                };
                ListItem::new(Line::from(vec![
                    Span::styled(
                        format!("{} ", n.created_at.with_timezone(&Local).format("%d %b %H:%M")),
                        Style::default().fg(Color::Yellow),
                    ),
                    Span::styled(
                        format!("[{}] ", n.notification_type.display_name()),
                        Style::default().fg(Color::Magenta),
                    ),
                    Span::styled(n.title.as_str(), style),
                ]))
            })
            .collect();
        let list = List::new(items)
            .block(
                Block::default()
                    .title(format!(
                        " Notifications ({} unread) ",
                        unread_count(&self.notifications)
                    ))
                    .borders(Borders::ALL)
                    .border_style(self.palette().border()),
            )
            .highlight_style(self.palette().highlight())
            .highlight_symbol("> ");
        let mut state = self.notification_state.clone();
        frame.render_stateful_widget(list, area, &mut state);
    }

    fn render_login(
        &self,
        frame: &mut Frame,
        provider: Provider,
        username: &str,
        password: &str,
        field: LoginField,
        area: Rect,
    ) {
        let popup = centered_rect(50, 30, area);
        frame.render_widget(Clear, popup);
        let block = Block::default()
            .title(format!(" Log in to {provider} "))
            .borders(Borders::ALL)
            .border_style(self.palette().border());
        let marker = |f: LoginField| if f == field { "> " } else { "  " };
        let lines = vec![
            Line::from(vec![
                Span::raw(marker(LoginField::Username)),
                Span::styled("Username: ", Style::default().bold()),
                Span::raw(username),
            ]),
            Line::from(vec![
                Span::raw(marker(LoginField::Password)),
                Span::styled("Password: ", Style::default().bold()),
                Span::raw("*".repeat(password.chars().count())),
            ]),
        ];
        frame.render_widget(Paragraph::new(lines).block(block), popup);
    }

    fn render_category_pick(&self, frame: &mut Frame, area: Rect) {
        let popup = centered_rect(40, 40, area);
        frame.render_widget(Clear, popup);
        let lines: Vec<Line> = WorkItemCategory::ALL
            .iter()
            .enumerate()
            .map(|(i, category)| {
                let on = self.filters.category.enabled.contains(category);
                Line::from(vec![
                    Span::styled(format!(" {} ", i + 1), Style::default().fg(Color::Yellow).bold()),
                    Span::raw(if on { "[x] " } else { "[ ] " }),
                    Span::raw(category.display_name()),
                ])
            })
            .collect();
        let block = Block::default()
            .title(" Categories ")
            .borders(Borders::ALL)
            .border_style(self.palette().border());
        frame.render_widget(Paragraph::new(lines).block(block), popup);
    }

    fn render_member_pick(&self, frame: &mut Frame, members: &[(String, String)], area: Rect) {
        let popup = centered_rect(50, 50, area);
        frame.render_widget(Clear, popup);
        let lines: Vec<Line> = members
            .iter()
            .take(9)
            .enumerate()
            .map(|(i, (name, email))| {
                let on = self.filters.member.selected.contains(&email.to_lowercase());
                Line::from(vec![
                    Span::styled(format!(" {} ", i + 1), Style::default().fg(Color::Yellow).bold()),
                    Span::raw(if on { "[x] " } else { "[ ] " }),
                    Span::raw(name.as_str()),
                    Span::styled(format!("  {email}"), Style::default().fg(Color::DarkGray)),
                ])
            })
            .collect();
        let block = Block::default()
            .title(" Members ")
            .borders(Borders::ALL)
            .border_style(self.palette().border());
        frame.render_widget(Paragraph::new(lines).block(block), popup);
    }

    fn render_confirm_delete(&self, frame: &mut Frame, row: &EntryRow, area: Rect) {
        let popup = centered_rect(50, 20, area);
        frame.render_widget(Clear, popup);
        let text = format!(
            "Delete {} on {} / {} ({})? y/n",
            row.date.format("%a %d %b"),
            row.project_name,
            row.activity_name,
            format_hours_as_hours_minutes(row.hours)
        );
        let block = Block::default()
            .title(" Confirm ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Red));
        frame.render_widget(
            Paragraph::new(text).block(block).wrap(Wrap { trim: true }),
            popup,
        );
    }

    fn render_scrollable_text(
        &self,
        frame: &mut Frame,
        title: &str,
        text: &str,
        scroll: u16,
        area: Rect,
    ) {
        let popup = centered_rect(80, 80, area);
        frame.render_widget(Clear, popup);
        let block = Block::default()
            .title(title)
            .borders(Borders::ALL)
            .border_style(self.palette().border());
        frame.render_widget(
            Paragraph::new(text)
                .block(block)
                .wrap(Wrap { trim: false })
                .scroll((scroll, 0)),
            popup,
        );
    }
}

fn clamp_selection(state: &mut ListState, len: usize) {
    match (state.selected(), len) {
        (_, 0) => state.select(None),
        (None, _) => state.select(Some(0)),
        (Some(i), len) if i >= len => state.select(Some(len - 1)),
        _ => {}
    }
}

fn step_selection(state: &mut ListState, len: usize, delta: isize) {
    if len == 0 {
        return;
    }
    let current = state.selected().unwrap_or(0) as isize;
    let next = (current + delta).clamp(0, len as isize - 1);
    state.select(Some(next as usize));
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
