use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::WorktrackError;

/// Category bucket for a work item type. Types outside the known set land in
/// `Other` so they stay visible when a category filter is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkItemCategory {
    Story,
    Bug,
    Task,
    Feature,
    Epic,
    Other,
}

impl WorkItemCategory {
    pub const ALL: &[WorkItemCategory] = &[
        WorkItemCategory::Story,
        WorkItemCategory::Bug,
        WorkItemCategory::Task,
        WorkItemCategory::Feature,
        WorkItemCategory::Epic,
        WorkItemCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkItemCategory::Story => "story",
            WorkItemCategory::Bug => "bug",
            WorkItemCategory::Task => "task",
            WorkItemCategory::Feature => "feature",
            WorkItemCategory::Epic => "epic",
            WorkItemCategory::Other => "other",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            WorkItemCategory::Story => "Story",
            WorkItemCategory::Bug => "Bug",
            WorkItemCategory::Task => "Task",
            WorkItemCategory::Feature => "Feature",
            WorkItemCategory::Epic => "Epic",
            WorkItemCategory::Other => "Other",
        }
    }

    /// Map a backend work item type name ("User Story", "Bug", ...) to its bucket.
    pub fn from_type_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "user story" | "story" | "product backlog item" => WorkItemCategory::Story,
            "bug" => WorkItemCategory::Bug,
            "task" => WorkItemCategory::Task,
            "feature" => WorkItemCategory::Feature,
            "epic" => WorkItemCategory::Epic,
            _ => WorkItemCategory::Other,
        }
    }
}

impl fmt::Display for WorkItemCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Coarse progress bucket derived locally from a column's display name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoardState {
    Todo,
    InProgress,
    Done,
}

impl BoardState {
    pub fn for_column_name(name: &str) -> Self {
        match normalize_column_name(name).as_str() {
            "new" | "to do" | "todo" | "approved" | "proposed" => BoardState::Todo,
            "done" | "closed" | "removed" | "completed" => BoardState::Done,
            _ => BoardState::InProgress,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            BoardState::Todo => "To Do",
            BoardState::InProgress => "In Progress",
            BoardState::Done => "Done",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrApproval {
    Approved,
    ApprovedWithSuggestions,
    WaitingForAuthor,
    Rejected,
    NoVote,
}

impl PrApproval {
    pub fn symbol(&self) -> &'static str {
        match self {
            PrApproval::Approved => "✓",
            PrApproval::ApprovedWithSuggestions => "✓~",
            PrApproval::WaitingForAuthor => "…",
            PrApproval::Rejected => "✗",
            PrApproval::NoVote => "·",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub display_name: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedPullRequest {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub repository: Option<String>,
    #[serde(default)]
    pub approval: Option<PrApproval>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardWorkItem {
    pub id: i64,
    pub title: String,
    pub work_item_type: String,
    #[serde(default)]
    pub board_column_id: Option<String>,
    #[serde(default)]
    pub board_column_name: Option<String>,
    #[serde(default)]
    pub board_state: Option<BoardState>,
    #[serde(default)]
    pub assigned_to: Option<Person>,
    #[serde(default)]
    pub priority: Option<u8>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub pull_requests: Vec<LinkedPullRequest>,
    #[serde(default)]
    pub url: Option<String>,
}

impl BoardWorkItem {
    pub fn category(&self) -> WorkItemCategory {
        WorkItemCategory::from_type_name(&self.work_item_type)
    }

    pub fn assignee_email(&self) -> Option<&str> {
        self.assigned_to.as_ref().and_then(|p| p.email.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardColumn {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub order: i32,
}

impl BoardColumn {
    /// Total order over columns: ordering key, then name.
    pub fn cmp_order(&self, other: &BoardColumn) -> Ordering {
        self.order
            .cmp(&other.order)
            .then_with(|| self.name.cmp(&other.name))
    }
}

/// Cached result of the board query for one scope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    pub columns: Vec<BoardColumn>,
    pub items: Vec<BoardWorkItem>,
}

/// Organization/project/iteration/team context a board is fetched and moved in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardScope {
    pub organization: String,
    pub project: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,
}

impl BoardScope {
    pub fn new(organization: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            organization: organization.into(),
            project: project.into(),
            iteration_path: None,
            team: None,
        }
    }

    pub fn query_pairs(&self) -> Vec<(&'static str, &str)> {
        let mut pairs = vec![
            ("organization", self.organization.as_str()),
            ("project", self.project.as_str()),
        ];
        if let Some(ref path) = self.iteration_path {
            pairs.push(("iterationPath", path.as_str()));
        }
        if let Some(ref team) = self.team {
            pairs.push(("team", team.as_str()));
        }
        pairs
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveWorkItem {
    pub id: i64,
    pub target_column: String,
    #[serde(flatten)]
    pub scope: BoardScope,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardProject {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Iteration {
    pub id: String,
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub is_current: bool,
}

/// Case and whitespace folding used to match column names.
pub fn normalize_column_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Lookup from column id or normalized name to the fetched column.
pub struct ColumnIndex<'a> {
    columns: &'a [BoardColumn],
    by_id: HashMap<&'a str, usize>,
    by_name: HashMap<String, usize>,
}

impl<'a> ColumnIndex<'a> {
    pub fn new(columns: &'a [BoardColumn]) -> Self {
        let mut by_id = HashMap::with_capacity(columns.len());
        let mut by_name = HashMap::with_capacity(columns.len());
        for (idx, col) in columns.iter().enumerate() {
            by_id.insert(col.id.as_str(), idx);
            by_name.entry(normalize_column_name(&col.name)).or_insert(idx);
        }
        Self {
            columns,
            by_id,
            by_name,
        }
    }

    /// Explicit id first, then normalized name. `None` when neither matches.
    pub fn resolve(&self, item: &BoardWorkItem) -> Option<&'a BoardColumn> {
        let columns = self.columns;
        if let Some(idx) = item
            .board_column_id
            .as_deref()
            .and_then(|id| self.by_id.get(id))
        {
            return columns.get(*idx);
        }
        item.board_column_name
            .as_deref()
            .and_then(|name| self.by_name.get(&normalize_column_name(name)))
            .and_then(|idx| columns.get(*idx))
    }

    pub fn get(&self, column_id: &str) -> Option<&'a BoardColumn> {
        let columns = self.columns;
        self.by_id.get(column_id).and_then(|idx| columns.get(*idx))
    }

    /// Item ordering: resolved column (unresolved last), priority with
    /// present before absent, then id.
    pub fn compare_items(&self, a: &BoardWorkItem, b: &BoardWorkItem) -> Ordering {
        let col_a = self.resolve(a);
        let col_b = self.resolve(b);
        let by_column = match (col_a, col_b) {
            (Some(x), Some(y)) => x.cmp_order(y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        by_column
            .then_with(|| match (a.priority, b.priority) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            })
            .then_with(|| a.id.cmp(&b.id))
    }
}

impl Board {
    pub fn sort_items(&mut self) {
        let columns = std::mem::take(&mut self.columns);
        {
            let index = ColumnIndex::new(&columns);
            self.items.sort_by(|a, b| index.compare_items(a, b));
        }
        self.columns = columns;
    }

    pub fn item(&self, id: i64) -> Option<&BoardWorkItem> {
        self.items.iter().find(|i| i.id == id)
    }

    /// Optimistically place `item_id` in `target_column_id` and re-sort.
    /// Returns the item as it was before the patch, for rollback.
    pub fn apply_move(
        &mut self,
        item_id: i64,
        target_column_id: &str,
    ) -> Result<BoardWorkItem, WorktrackError> {
        let target = self
            .columns
            .iter()
            .find(|c| c.id == target_column_id)
            .cloned()
            .ok_or_else(|| WorktrackError::NotFound(format!("column {target_column_id}")))?;
        let item = self
            .items
            .iter_mut()
            .find(|i| i.id == item_id)
            .ok_or_else(|| WorktrackError::NotFound(format!("work item {item_id}")))?;
        let previous = item.clone();
        item.board_column_id = Some(target.id.clone());
        item.board_column_name = Some(target.name.clone());
        item.board_state = Some(BoardState::for_column_name(&target.name));
        self.sort_items();
        Ok(previous)
    }

    /// Put back a single item captured by `apply_move`. Other items are untouched.
    pub fn restore_item(&mut self, previous: BoardWorkItem) {
        match self.items.iter_mut().find(|i| i.id == previous.id) {
            Some(slot) => *slot = previous,
            None => self.items.push(previous),
        }
        self.sort_items();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(id: &str, name: &str, order: i32) -> BoardColumn {
        BoardColumn {
            id: id.into(),
            name: name.into(),
            order,
        }
    }

    fn item(id: i64, column_id: Option<&str>, column_name: Option<&str>) -> BoardWorkItem {
        BoardWorkItem {
            id,
            title: format!("Item {id}"),
            work_item_type: "User Story".into(),
            board_column_id: column_id.map(String::from),
            board_column_name: column_name.map(String::from),
            board_state: None,
            assigned_to: None,
            priority: None,
            tags: BTreeSet::new(),
            pull_requests: Vec::new(),
            url: None,
        }
    }

    fn sample_board() -> Board {
        Board {
            columns: vec![
                column("c-new", "New", 0),
                column("c-active", "Active", 1),
                column("c-done", "Done", 2),
            ],
            items: vec![
                item(3, Some("c-active"), None),
                item(1, Some("c-new"), None),
                item(2, None, Some("  done ")),
            ],
        }
    }

    #[test]
    fn resolves_by_id_then_name() {
        let board = sample_board();
        let index = ColumnIndex::new(&board.columns);
        assert_eq!(index.resolve(&board.items[0]).unwrap().id, "c-active");
        assert_eq!(index.resolve(&board.items[2]).unwrap().id, "c-done");
    }

    #[test]
    fn stale_column_id_falls_back_to_name() {
        let columns = vec![column("c-1", "In  Review", 0)];
        let index = ColumnIndex::new(&columns);
        let it = item(1, Some("gone"), Some("in review"));
        assert_eq!(index.resolve(&it).unwrap().id, "c-1");
    }

    #[test]
    fn unresolvable_item_returns_none() {
        let columns = vec![column("c-1", "New", 0)];
        let index = ColumnIndex::new(&columns);
        assert!(index.resolve(&item(1, Some("x"), Some("Elsewhere"))).is_none());
        assert!(index.resolve(&item(2, None, None)).is_none());
    }

    #[test]
    fn resolution_is_idempotent() {
        let board = sample_board();
        let index = ColumnIndex::new(&board.columns);
        for it in &board.items {
            let first = index.resolve(it).map(|c| c.id.clone());
            let second = index.resolve(it).map(|c| c.id.clone());
            assert_eq!(first, second);
        }
    }

    #[test]
    fn sort_orders_by_column_priority_then_id() {
        let mut board = Board {
            columns: vec![column("a", "A", 0), column("b", "B", 1)],
            items: vec![
                item(5, Some("b"), None),
                item(4, Some("a"), None),
                BoardWorkItem {
                    priority: Some(2),
                    ..item(9, Some("a"), None)
                },
                BoardWorkItem {
                    priority: Some(1),
                    ..item(7, Some("a"), None)
                },
                item(2, Some("a"), None),
            ],
        };
        board.sort_items();
        let ids: Vec<i64> = board.items.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![7, 9, 2, 4, 5]);

        let before = board.items.clone();
        board.sort_items();
        assert_eq!(board.items, before);
    }

    #[test]
    fn column_ties_break_by_name() {
        let a = column("1", "Beta", 0);
        let b = column("2", "Alpha", 0);
        assert_eq!(a.cmp_order(&b), Ordering::Greater);
    }

    #[test]
    fn distinct_items_never_compare_equal() {
        let board = sample_board();
        let index = ColumnIndex::new(&board.columns);
        for a in &board.items {
            for b in &board.items {
                let ord = index.compare_items(a, b);
                if a.id == b.id {
                    assert_eq!(ord, Ordering::Equal);
                } else {
                    assert_ne!(ord, Ordering::Equal);
                    assert_eq!(ord.reverse(), index.compare_items(b, a));
                }
            }
        }
    }

    #[test]
    fn board_state_from_column_name() {
        assert_eq!(BoardState::for_column_name("New"), BoardState::Todo);
        assert_eq!(BoardState::for_column_name("To Do"), BoardState::Todo);
        assert_eq!(BoardState::for_column_name("Approved"), BoardState::Todo);
        assert_eq!(BoardState::for_column_name("Closed"), BoardState::Done);
        assert_eq!(BoardState::for_column_name("removed"), BoardState::Done);
        assert_eq!(BoardState::for_column_name("Code Review"), BoardState::InProgress);
    }

    #[test]
    fn apply_move_patches_item_and_resorts() {
        let mut board = sample_board();
        board.sort_items();
        let previous = board.apply_move(1, "c-done").unwrap();
        assert_eq!(previous.board_column_id.as_deref(), Some("c-new"));

        let moved = board.item(1).unwrap();
        assert_eq!(moved.board_column_id.as_deref(), Some("c-done"));
        assert_eq!(moved.board_column_name.as_deref(), Some("Done"));
        assert_eq!(moved.board_state, Some(BoardState::Done));
        let ids: Vec<i64> = board.items.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![3, 1, 2]);
    }

    #[test]
    fn restore_item_only_touches_the_moved_item() {
        let mut board = sample_board();
        let previous = board.apply_move(1, "c-done").unwrap();
        // Another item changes meanwhile; restore must keep that change.
        board.items.iter_mut().find(|i| i.id == 3).unwrap().title = "Renamed".into();
        board.restore_item(previous);
        assert_eq!(board.item(1).unwrap().board_column_id.as_deref(), Some("c-new"));
        assert_eq!(board.item(3).unwrap().title, "Renamed");
    }

    #[test]
    fn apply_move_to_unknown_column_fails() {
        let mut board = sample_board();
        assert!(matches!(
            board.apply_move(1, "nope"),
            Err(WorktrackError::NotFound(_))
        ));
        assert!(matches!(
            board.apply_move(99, "c-new"),
            Err(WorktrackError::NotFound(_))
        ));
    }

    #[test]
    fn unknown_type_is_other() {
        assert_eq!(WorkItemCategory::from_type_name("User Story"), WorkItemCategory::Story);
        assert_eq!(WorkItemCategory::from_type_name("Spike"), WorkItemCategory::Other);
    }

    #[test]
    fn scope_query_pairs_include_optional_fields() {
        let mut scope = BoardScope::new("org", "proj");
        assert_eq!(scope.query_pairs().len(), 2);
        scope.team = Some("Team A".into());
        assert!(scope.query_pairs().contains(&("team", "Team A")));
    }
}
