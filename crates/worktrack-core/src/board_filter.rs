use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::board::{Board, BoardColumn, BoardWorkItem, ColumnIndex, WorkItemCategory};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberMode {
    #[default]
    Mine,
    All,
    Custom,
}

impl MemberMode {
    pub fn next(self) -> Self {
        match self {
            MemberMode::Mine => MemberMode::All,
            MemberMode::All => MemberMode::Custom,
            MemberMode::Custom => MemberMode::Mine,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            MemberMode::Mine => "Mine",
            MemberMode::All => "All",
            MemberMode::Custom => "Custom",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MemberFilter {
    pub mode: MemberMode,
    /// Lower-cased assignee emails shown under `Custom`.
    #[serde(default)]
    pub selected: BTreeSet<String>,
}

impl MemberFilter {
    pub fn toggle_member(&mut self, email: &str) {
        let email = email.to_lowercase();
        if !self.selected.remove(&email) {
            self.selected.insert(email);
        }
    }

    pub fn allows(&self, item: &BoardWorkItem, current_user: Option<&str>) -> bool {
        match self.mode {
            MemberMode::All => true,
            MemberMode::Mine => match (item.assignee_email(), current_user) {
                (Some(email), Some(me)) => email.eq_ignore_ascii_case(me),
                _ => false,
            },
            MemberMode::Custom => {
                if self.selected.is_empty() {
                    return true;
                }
                item.assignee_email()
                    .is_some_and(|email| self.selected.contains(&email.to_lowercase()))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryFilter {
    pub enabled: BTreeSet<WorkItemCategory>,
}

impl Default for CategoryFilter {
    fn default() -> Self {
        Self {
            enabled: WorkItemCategory::ALL.iter().copied().collect(),
        }
    }
}

impl CategoryFilter {
    pub fn toggle(&mut self, category: WorkItemCategory) {
        if !self.enabled.remove(&category) {
            self.enabled.insert(category);
        }
    }

    pub fn allows(&self, item: &BoardWorkItem) -> bool {
        self.enabled.contains(&item.category())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HiddenColumns {
    pub ids: BTreeSet<String>,
}

impl HiddenColumns {
    pub fn toggle(&mut self, column_id: &str) {
        if !self.ids.remove(column_id) {
            self.ids.insert(column_id.to_string());
        }
    }

    pub fn is_hidden(&self, column_id: &str) -> bool {
        self.ids.contains(column_id)
    }
}

#[derive(Debug, Clone, Default)]
pub struct BoardFilters {
    pub member: MemberFilter,
    pub category: CategoryFilter,
    pub hidden_columns: HiddenColumns,
    pub current_user_email: Option<String>,
}

impl BoardFilters {
    pub fn allows(&self, item: &BoardWorkItem) -> bool {
        self.category.allows(item)
            && self
                .member
                .allows(item, self.current_user_email.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedColumn {
    pub column: BoardColumn,
    pub items: Vec<BoardWorkItem>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BoardView {
    pub columns: Vec<RenderedColumn>,
    /// Every fetched column, hidden ones included.
    pub total_columns: usize,
}

impl BoardView {
    pub fn visible_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn item_count(&self) -> usize {
        self.columns.iter().map(|c| c.items.len()).sum()
    }

    pub fn column_of(&self, item_id: i64) -> Option<&BoardColumn> {
        self.columns
            .iter()
            .find(|c| c.items.iter().any(|i| i.id == item_id))
            .map(|c| &c.column)
    }
}

/// Bucket the fetched items into visible columns. Items that do not resolve
/// to a column, fail a filter, or sit in a hidden column are left out.
pub fn build_board_view(board: &Board, filters: &BoardFilters) -> BoardView {
    let index = ColumnIndex::new(&board.columns);

    let mut ordered: Vec<&BoardColumn> = board.columns.iter().collect();
    ordered.sort_by(|a, b| a.cmp_order(b));

    let mut columns: Vec<RenderedColumn> = ordered
        .into_iter()
        .filter(|c| !filters.hidden_columns.is_hidden(&c.id))
        .map(|c| RenderedColumn {
            column: c.clone(),
            items: Vec::new(),
        })
        .collect();

    for item in board.items.iter().filter(|i| filters.allows(i)) {
        let Some(resolved) = index.resolve(item) else {
            continue;
        };
        if let Some(slot) = columns.iter_mut().find(|c| c.column.id == resolved.id) {
            slot.items.push(item.clone());
        }
    }

    for col in &mut columns {
        col.items.sort_by(|a, b| index.compare_items(a, b));
    }

    BoardView {
        columns,
        total_columns: board.columns.len(),
    }
}

/// Distinct assignees on the board, for the custom member picker.
pub fn board_members(board: &Board) -> Vec<(String, String)> {
    let mut seen = BTreeSet::new();
    let mut members = Vec::new();
    for item in &board.items {
        if let Some(person) = &item.assigned_to {
            if let Some(email) = &person.email {
                if seen.insert(email.to_lowercase()) {
                    members.push((person.display_name.clone(), email.clone()));
                }
            }
        }
    }
    members.sort_by(|a, b| a.0.cmp(&b.0));
    members
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Person;

    fn column(id: &str, name: &str, order: i32) -> BoardColumn {
        BoardColumn {
            id: id.into(),
            name: name.into(),
            order,
        }
    }

    fn item(id: i64, column_id: &str, kind: &str, email: Option<&str>) -> BoardWorkItem {
        BoardWorkItem {
            id,
            title: format!("Item {id}"),
            work_item_type: kind.into(),
            board_column_id: Some(column_id.into()),
            board_column_name: None,
            board_state: None,
            assigned_to: email.map(|e| Person {
                display_name: e.split('@').next().unwrap_or(e).to_string(),
                email: Some(e.to_string()),
            }),
            priority: None,
            tags: BTreeSet::new(),
            pull_requests: Vec::new(),
            url: None,
        }
    }

    fn board() -> Board {
        Board {
            columns: vec![
                column("done", "Done", 2),
                column("new", "New", 0),
                column("active", "Active", 1),
            ],
            items: vec![
                item(1, "new", "Bug", Some("ana@example.com")),
                item(2, "active", "User Story", Some("BOB@example.com")),
                item(3, "done", "Task", None),
                item(4, "missing", "Task", Some("ana@example.com")),
                item(5, "active", "Spike", Some("ana@example.com")),
            ],
        }
    }

    fn all_filters() -> BoardFilters {
        BoardFilters {
            member: MemberFilter {
                mode: MemberMode::All,
                selected: BTreeSet::new(),
            },
            ..Default::default()
        }
    }

    #[test]
    fn columns_render_in_order_and_unresolved_items_drop() {
        let view = build_board_view(&board(), &all_filters());
        let names: Vec<&str> = view.columns.iter().map(|c| c.column.name.as_str()).collect();
        assert_eq!(names, vec!["New", "Active", "Done"]);
        assert_eq!(view.item_count(), 4);
        assert!(view.column_of(4).is_none());
    }

    #[test]
    fn every_item_lands_in_at_most_one_column() {
        let view = build_board_view(&board(), &all_filters());
        for it in board().items {
            let hits = view
                .columns
                .iter()
                .filter(|c| c.items.iter().any(|i| i.id == it.id))
                .count();
            assert!(hits <= 1);
        }
    }

    #[test]
    fn mine_matches_email_case_insensitively() {
        let filters = BoardFilters {
            current_user_email: Some("bob@EXAMPLE.com".into()),
            ..Default::default()
        };
        let view = build_board_view(&board(), &filters);
        let ids: Vec<i64> = view.columns.iter().flat_map(|c| c.items.iter().map(|i| i.id)).collect();
        assert_eq!(ids, vec![2]);
    }

    #[test]
    fn mine_without_user_shows_nothing() {
        let view = build_board_view(&board(), &BoardFilters::default());
        assert_eq!(view.item_count(), 0);
    }

    #[test]
    fn custom_filter_excludes_unassigned_when_selection_non_empty() {
        let mut filters = all_filters();
        filters.member.mode = MemberMode::Custom;
        assert_eq!(build_board_view(&board(), &filters).item_count(), 4);

        filters.member.toggle_member("Ana@Example.com");
        let view = build_board_view(&board(), &filters);
        let ids: Vec<i64> = view.columns.iter().flat_map(|c| c.items.iter().map(|i| i.id)).collect();
        assert_eq!(ids, vec![1, 5]);
    }

    #[test]
    fn unknown_category_follows_other_toggle() {
        let mut filters = all_filters();
        let view = build_board_view(&board(), &filters);
        assert!(view.column_of(5).is_some());

        filters.category.toggle(WorkItemCategory::Other);
        let view = build_board_view(&board(), &filters);
        assert!(view.column_of(5).is_none());
        assert!(view.column_of(2).is_some());
    }

    #[test]
    fn hidden_columns_still_count_toward_total() {
        let mut filters = all_filters();
        filters.hidden_columns.toggle("active");
        let view = build_board_view(&board(), &filters);
        assert_eq!(view.visible_columns(), 2);
        assert_eq!(view.total_columns, 3);
        assert!(view.column_of(2).is_none());

        filters.hidden_columns.toggle("active");
        assert_eq!(build_board_view(&board(), &filters).visible_columns(), 3);
    }

    #[test]
    fn members_are_deduplicated_by_email() {
        let members = board_members(&board());
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].0, "BOB");
        assert_eq!(members[1].0, "ana");
    }

    #[test]
    fn stored_filter_round_trips_through_json() {
        let mut filter = MemberFilter::default();
        filter.mode = MemberMode::Custom;
        filter.toggle_member("x@y.z");
        let json = serde_json::to_string(&filter).unwrap();
        let back: MemberFilter = serde_json::from_str(&json).unwrap();
        assert_eq!(back, filter);
    }
}
