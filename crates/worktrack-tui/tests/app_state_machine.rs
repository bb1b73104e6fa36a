//! State machine tests for the TUI App.
//!
//! Each test spawns the mock backend on a separate thread (to avoid nested tokio runtime panics),
//! creates a BlockingHttpService, builds an App, and simulates key events to test transitions.

use std::sync::Arc;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use worktrack_core::board::BoardScope;
use worktrack_core::board_filter::MemberMode;
use worktrack_core::differ::DifferStatus;
use worktrack_core::timer::Provider;
use worktrack_service::mock::{MockState, MOCK_PASSWORD, MOCK_USER_EMAIL};
use worktrack_service::{BlockingHttpService, HttpConfig, HttpService};
use worktrack_store::{MemoryStore, Preferences, Theme};
use worktrack_tui::app::{App, AuthInbox, Mode, View};

/// Spawn the mock backend on a separate thread, return its URL and state.
/// BlockingHttpService creates its own tokio Runtime, so the server
/// must live in a separate thread's Runtime to avoid nesting.
fn spawn_server() -> (String, MockState) {
    let (tx, rx) = std::sync::mpsc::sync_channel(1);
    std::thread::spawn(move || {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let server = worktrack_service::mock::spawn_mock_server().await;
            tx.send((server.base_url.clone(), server.state.clone()))
                .unwrap();
            std::future::pending::<()>().await;
        });
    });
    rx.recv().unwrap()
}

fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
}

fn char_key(c: char) -> KeyEvent {
    key(KeyCode::Char(c))
}

fn type_text(app: &mut App, text: &str) {
    for c in text.chars() {
        app.handle_key(char_key(c));
    }
}

struct Harness {
    app: App,
    state: MockState,
    preferences: Preferences,
}

impl Harness {
    fn requests(&self, wanted: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .requests
            .iter()
            .filter(|r| r.as_str() == wanted)
            .count()
    }

    fn column_of(&self, item_id: i64) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .board
            .items
            .iter()
            .find(|i| i.id == item_id)
            .and_then(|i| i.board_column_id.clone())
    }
}

fn make_harness() -> Harness {
    let (url, state) = spawn_server();
    let inbox = AuthInbox::new();
    let http = HttpService::new(&HttpConfig::single(&url)).with_auth_hook(inbox.hook());
    let svc = BlockingHttpService::new(http).unwrap();
    let preferences = Preferences::new(Arc::new(MemoryStore::new()));
    let app = App::new(
        svc,
        preferences.clone(),
        inbox,
        Some(BoardScope::new("acme", "web")),
        Some(MOCK_USER_EMAIL.to_string()),
    );
    Harness {
        app,
        state,
        preferences,
    }
}

/// Log in to Milltime through the prompt and land on the time view.
fn logged_in_harness() -> Harness {
    let mut h = make_harness();
    h.app.handle_key(char_key('2'));
    h.app.handle_key(char_key('L'));
    type_text(&mut h.app, MOCK_USER_EMAIL);
    h.app.handle_key(key(KeyCode::Tab));
    type_text(&mut h.app, MOCK_PASSWORD);
    h.app.handle_key(key(KeyCode::Enter));
    assert!(matches!(h.app.mode(), Mode::Normal));
    h
}

// ---- Startup ----

#[test]
fn app_starts_on_board_in_normal_mode() {
    let h = make_harness();
    assert!(matches!(h.app.mode(), Mode::Normal));
    assert_eq!(h.app.view(), View::Board);
    assert!(!h.app.is_input_mode());
    assert_eq!(h.app.differs().len(), 2);
    assert_eq!(h.app.notifications().len(), 2);
    assert!(!h.app.session(Provider::Milltime).unwrap().is_authenticated());
}

#[test]
fn default_member_filter_shows_only_my_items() {
    let h = make_harness();
    assert_eq!(h.app.filters().member.mode, MemberMode::Mine);
    assert_eq!(h.app.board().selected_item().unwrap().id, 101);
    assert_eq!(h.app.board().active_column().unwrap().id, "col-new");
}

#[test]
fn views_switch_with_digits_and_tab() {
    let mut h = make_harness();
    h.app.handle_key(char_key('3'));
    assert_eq!(h.app.view(), View::Differs);
    h.app.handle_key(key(KeyCode::Tab));
    assert_eq!(h.app.view(), View::Notifications);
    h.app.handle_key(key(KeyCode::BackTab));
    assert_eq!(h.app.view(), View::Differs);
    h.app.handle_key(char_key('1'));
    assert_eq!(h.app.view(), View::Board);
}

// ---- Board filters ----

#[test]
fn member_mode_cycles_and_persists() {
    let mut h = make_harness();
    h.app.handle_key(char_key('f'));
    assert_eq!(h.app.filters().member.mode, MemberMode::All);
    assert_eq!(h.preferences.member_filter().load().mode, MemberMode::All);

    // Bob's item is now on the board.
    h.app.handle_key(char_key('l'));
    h.app.handle_key(char_key('j'));
    assert_eq!(h.app.board().selected_item().unwrap().id, 103);
}

#[test]
fn category_pick_hides_bugs() {
    let mut h = make_harness();
    h.app.handle_key(char_key('c'));
    assert!(matches!(h.app.mode(), Mode::CategoryPick));
    // Second category is Bug.
    h.app.handle_key(char_key('2'));
    h.app.handle_key(key(KeyCode::Esc));
    assert!(matches!(h.app.mode(), Mode::Normal));

    let bug = worktrack_core::board::WorkItemCategory::Bug;
    assert!(!h.app.filters().category.enabled.contains(&bug));
    assert!(!h.preferences.category_filter().load().enabled.contains(&bug));
    // 101 was the only item of mine in the first column.
    assert_eq!(h.app.board().active_column().unwrap().id, "col-new");
    assert!(h.app.board().selected_item().is_none());
    h.app.handle_key(char_key('l'));
    assert_eq!(h.app.board().selected_item().unwrap().id, 102);
}

#[test]
fn member_list_picks_custom_assignees() {
    let mut h = make_harness();
    h.app.handle_key(char_key('u'));
    let Mode::MemberPick { members } = h.app.mode() else {
        panic!("expected MemberPick, got {:?}", h.app.mode());
    };
    let emails: Vec<&str> = members.iter().map(|(_, e)| e.as_str()).collect();
    assert_eq!(emails, vec!["bob@example.com", MOCK_USER_EMAIL]);

    h.app.handle_key(char_key('1'));
    assert_eq!(h.app.filters().member.mode, MemberMode::Custom);
    let saved = h.preferences.member_filter().load();
    assert!(saved.selected.contains("bob@example.com"));
    assert!(matches!(h.app.mode(), Mode::MemberPick { .. }));

    h.app.handle_key(key(KeyCode::Esc));
    assert!(matches!(h.app.mode(), Mode::Normal));
    assert!(h.app.board().selected_item().is_none());
    h.app.handle_key(char_key('l'));
    assert_eq!(h.app.board().selected_item().unwrap().id, 103);
}

#[test]
fn clearing_member_list_shows_everyone() {
    let mut h = make_harness();
    h.app.handle_key(char_key('u'));
    h.app.handle_key(char_key('1'));
    h.app.handle_key(char_key('0'));
    h.app.handle_key(key(KeyCode::Enter));
    assert_eq!(h.app.filters().member.mode, MemberMode::Custom);
    assert!(h.preferences.member_filter().load().selected.is_empty());
    // Unassigned 104 is visible again.
    assert_eq!(h.app.board().column_count(), 3);
    h.app.handle_key(char_key('l'));
    h.app.handle_key(char_key('l'));
    assert_eq!(h.app.board().selected_item().unwrap().id, 104);
}

#[test]
fn theme_toggle_persists() {
    let mut h = make_harness();
    assert_eq!(h.app.theme(), Theme::System);
    h.app.handle_key(char_key('T'));
    assert_eq!(h.app.theme(), Theme::Light);
    assert_eq!(h.preferences.theme().load(), Theme::Light);
    assert_eq!(h.app.status_message(), Some("Theme: light"));
}

#[test]
fn hiding_a_column_persists_and_x_restores() {
    let mut h = make_harness();
    assert_eq!(h.app.board().column_count(), 3);
    h.app.handle_key(char_key('x'));
    assert_eq!(h.app.board().column_count(), 2);
    assert!(h
        .preferences
        .hidden_columns()
        .load()
        .is_hidden("col-new"));

    h.app.handle_key(char_key('X'));
    assert_eq!(h.app.board().column_count(), 3);
    assert!(h.preferences.hidden_columns().load().ids.is_empty());
}

#[test]
fn llm_text_opens_and_closes() {
    let mut h = make_harness();
    h.app.handle_key(char_key('y'));
    match h.app.mode() {
        Mode::LlmText { item_id, text, .. } => {
            assert_eq!(*item_id, 101);
            assert!(!text.is_empty());
        }
        other => panic!("expected LlmText, got {other:?}"),
    }
    h.app.handle_key(char_key('j'));
    h.app.handle_key(key(KeyCode::Esc));
    assert!(matches!(h.app.mode(), Mode::Normal));
}

// ---- Optimistic moves ----

#[test]
fn move_patches_first_and_sends_on_settle() {
    let mut h = make_harness();
    h.app.handle_key(char_key('m'));

    assert!(h.app.has_pending_moves());
    assert_eq!(h.app.board().selected_item().unwrap().id, 101);
    assert_eq!(h.app.board().active_column().unwrap().id, "col-active");
    assert_eq!(h.requests("POST /work-items/move"), 0);

    h.app.settle_moves();
    assert!(!h.app.has_pending_moves());
    assert_eq!(h.requests("POST /work-items/move"), 1);
    assert_eq!(h.column_of(101).as_deref(), Some("col-active"));
    assert_eq!(h.app.board().active_column().unwrap().id, "col-active");
}

#[test]
fn failed_move_rolls_back_with_status() {
    let mut h = make_harness();
    h.state.lock().unwrap().fail_moves = true;

    h.app.handle_key(char_key('m'));
    assert_eq!(h.app.board().active_column().unwrap().id, "col-active");
    h.app.settle_moves();

    assert!(h.app.status_message().unwrap().contains("failed"));
    assert_eq!(h.app.board().selected_item().unwrap().id, 101);
    assert_eq!(h.app.board().active_column().unwrap().id, "col-new");
    assert_eq!(h.column_of(101).as_deref(), Some("col-new"));
}

#[test]
fn second_move_while_in_flight_is_dropped() {
    let mut h = make_harness();
    h.app.handle_key(char_key('m'));
    h.app.handle_key(char_key('m'));
    assert!(h.app.status_message().unwrap().contains("already moving"));
    assert_eq!(h.app.board().active_column().unwrap().id, "col-active");

    h.app.settle_moves();
    assert_eq!(h.requests("POST /work-items/move"), 1);
    assert_eq!(h.column_of(101).as_deref(), Some("col-active"));
}

#[test]
fn move_left_from_first_column_does_nothing() {
    let mut h = make_harness();
    h.app.handle_key(char_key('M'));
    assert!(!h.app.has_pending_moves());
}

// ---- Provider login ----

#[test]
fn login_prompt_is_input_mode_and_escapes() {
    let mut h = make_harness();
    h.app.handle_key(char_key('L'));
    assert!(h.app.is_input_mode());
    // q is text here, not quit
    h.app.handle_key(char_key('q'));
    match h.app.mode() {
        Mode::Login { username, .. } => assert_eq!(username, "q"),
        other => panic!("expected Login, got {other:?}"),
    }
    h.app.handle_key(key(KeyCode::Esc));
    assert!(matches!(h.app.mode(), Mode::Normal));
}

#[test]
fn wrong_password_stays_in_prompt() {
    let mut h = make_harness();
    h.app.handle_key(char_key('L'));
    type_text(&mut h.app, "me");
    h.app.handle_key(key(KeyCode::Enter));
    type_text(&mut h.app, "nope");
    h.app.handle_key(key(KeyCode::Enter));

    match h.app.mode() {
        Mode::Login { password, .. } => assert!(password.is_empty()),
        other => panic!("expected Login, got {other:?}"),
    }
    assert!(h.app.status_message().unwrap().contains("Login failed"));
    assert!(!h.app.session(Provider::Milltime).unwrap().is_authenticated());
}

#[test]
fn login_loads_the_week() {
    let h = logged_in_harness();
    assert!(h.app.session(Provider::Milltime).unwrap().is_authenticated());
    assert_eq!(h.app.view(), View::TimeEntries);
    assert_eq!(h.app.entries().rows().len(), 4);
    assert!(h.app.entries().rows().iter().any(|r| r.has_overlap()));
    assert_eq!(h.app.entries().total_hours(), 11.0);
}

// ---- Time entries ----

#[test]
fn merge_toggle_collapses_rows_and_persists() {
    let mut h = logged_in_harness();
    h.app.handle_key(char_key('v'));
    assert!(h.app.entries().is_merged());
    assert_eq!(h.app.entries().rows().len(), 3);
    assert!(h.preferences.merge_entries().load());
}

#[test]
fn locked_entry_cannot_be_deleted() {
    let mut h = logged_in_harness();
    // Newest day first: Tuesday's attested entry is selected.
    assert!(h.app.entries().selected_row().unwrap().is_locked());
    h.app.handle_key(char_key('d'));
    assert!(matches!(h.app.mode(), Mode::Normal));
    assert!(h.app.status_message().unwrap().contains("locked"));
    assert_eq!(h.requests("DELETE /milltime/time-entries"), 0);
}

#[test]
fn delete_entry_after_confirmation() {
    let mut h = logged_in_harness();
    h.app.handle_key(char_key('j'));
    let row = h.app.entries().selected_row().unwrap().clone();
    assert!(row.can_delete());

    h.app.handle_key(char_key('d'));
    assert!(matches!(h.app.mode(), Mode::ConfirmDelete { .. }));
    h.app.handle_key(char_key('y'));
    assert!(matches!(h.app.mode(), Mode::Normal));
    assert_eq!(h.requests("DELETE /milltime/time-entries"), 1);
    assert_eq!(h.app.entries().rows().len(), 3);
}

#[test]
fn any_other_key_cancels_delete() {
    let mut h = logged_in_harness();
    h.app.handle_key(char_key('j'));
    h.app.handle_key(char_key('d'));
    h.app.handle_key(char_key('n'));
    assert!(matches!(h.app.mode(), Mode::Normal));
    assert_eq!(h.requests("DELETE /milltime/time-entries"), 0);
    assert_eq!(h.app.entries().rows().len(), 4);
}

#[test]
fn merged_row_must_be_unmerged_before_delete() {
    let mut h = logged_in_harness();
    h.app.handle_key(char_key('v'));
    let merged_idx = h
        .app
        .entries()
        .rows()
        .iter()
        .position(|r| r.periods.len() > 1)
        .unwrap();
    for _ in 0..merged_idx {
        h.app.handle_key(char_key('j'));
    }
    h.app.handle_key(char_key('d'));
    assert!(matches!(h.app.mode(), Mode::Normal));
    assert!(h.app.status_message().unwrap().contains("Unmerge"));
}

#[test]
fn timer_starts_and_stops_into_an_entry() {
    let mut h = logged_in_harness();
    h.app.handle_key(char_key('j'));
    h.app.handle_key(char_key('s'));
    assert!(h.app.needs_polling());
    let timer = *h.app.session(Provider::Milltime).unwrap().timer();
    assert!(timer.visible && timer.running);
    assert_eq!(h.requests("POST /milltime/timer"), 1);
    assert!(h.preferences.last_activity().load().is_some());

    h.app.handle_key(char_key('s'));
    assert!(!h.app.needs_polling());
    assert!(!h.app.session(Provider::Milltime).unwrap().timer().running);
    assert_eq!(h.requests("PUT /milltime/timer"), 1);
    assert_eq!(h.app.entries().rows().len(), 5);
}

#[test]
fn week_navigation_moves_the_range() {
    let mut h = logged_in_harness();
    let this_week = h.app.week_range();
    h.app.handle_key(char_key('['));
    assert_eq!(h.app.week_range().from, this_week.from - chrono::Duration::days(7));
    assert!(h.app.entries().rows().is_empty());
    h.app.handle_key(char_key('t'));
    assert_eq!(h.app.week_range(), this_week);
    assert_eq!(h.app.entries().rows().len(), 4);
}

#[test]
fn provider_expiry_sets_sticky_error() {
    let mut h = logged_in_harness();
    h.state
        .lock()
        .unwrap()
        .expired_providers
        .insert(Provider::Milltime);
    h.app.handle_key(char_key('r'));

    let session = h.app.session(Provider::Milltime).unwrap();
    assert!(!session.is_authenticated());
    assert!(session.error().unwrap().contains("expired"));
    assert!(!h.app.login_required());

    h.app.handle_key(key(KeyCode::Esc));
    assert!(h.app.session(Provider::Milltime).unwrap().error().is_none());
}

#[test]
fn log_out_clears_session() {
    let mut h = logged_in_harness();
    h.app.handle_key(char_key('O'));
    assert!(!h.app.session(Provider::Milltime).unwrap().is_authenticated());
    assert!(h.app.entries().rows().is_empty());
}

#[test]
fn core_unauthorized_flags_login_required() {
    let mut h = make_harness();
    h.state.lock().unwrap().core_unauthorized = true;
    h.app.handle_key(char_key('r'));
    assert!(h.app.login_required());
    h.app.handle_key(key(KeyCode::Esc));
    assert!(!h.app.login_required());
}

// ---- Differs and notifications ----

#[test]
fn follow_and_start_differ() {
    let mut h = make_harness();
    h.app.handle_key(char_key('3'));
    h.app.handle_key(char_key('j'));
    assert!(!h.app.differs()[1].is_followed);

    h.app.handle_key(char_key('f'));
    assert!(h.app.differs()[1].is_followed);

    h.app.handle_key(char_key('s'));
    assert_eq!(h.app.differs()[1].status, DifferStatus::Running);
    h.app.handle_key(char_key('s'));
    assert_eq!(h.app.differs()[1].status, DifferStatus::Stopped);
}

#[test]
fn notifications_mark_viewed_and_delete() {
    let mut h = make_harness();
    h.app.handle_key(char_key('4'));
    assert!(!h.app.notifications()[0].viewed);

    h.app.handle_key(key(KeyCode::Enter));
    assert!(h.app.notifications().iter().all(|n| n.viewed));

    h.app.handle_key(char_key('d'));
    assert_eq!(h.app.notifications().len(), 1);
}
