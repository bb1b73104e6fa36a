use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState};
use worktrack_core::board::{BoardColumn, BoardWorkItem, WorkItemCategory};
use worktrack_core::board_filter::BoardView;
use worktrack_core::format::{initials, seeded_color};

use super::Palette;

/// Side-by-side columns of a filtered board with a cursor.
pub struct BoardPanel {
    columns: Vec<ColumnState>,
    active_column: usize,
}

struct ColumnState {
    column: BoardColumn,
    items: Vec<BoardWorkItem>,
    list_state: ListState,
}

/// Direction of a keyboard move between adjacent visible columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Left,
    Right,
}

impl BoardPanel {
    pub fn new(view: BoardView) -> Self {
        let columns = view
            .columns
            .into_iter()
            .map(|rendered| {
                let mut list_state = ListState::default();
                if !rendered.items.is_empty() {
                    list_state.select(Some(0));
                }
                ColumnState {
                    column: rendered.column,
                    items: rendered.items,
                    list_state,
                }
            })
            .collect();
        Self {
            columns,
            active_column: 0,
        }
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn active_column(&self) -> Option<&BoardColumn> {
        self.columns.get(self.active_column).map(|c| &c.column)
    }

    /// Focus the column with this id, if it is visible.
    pub fn focus_column(&mut self, column_id: &str) -> bool {
        match self.columns.iter().position(|c| c.column.id == column_id) {
            Some(idx) => {
                self.active_column = idx;
                true
            }
            None => false,
        }
    }

    pub fn selected_item(&self) -> Option<&BoardWorkItem> {
        let col = self.columns.get(self.active_column)?;
        let idx = col.list_state.selected()?;
        col.items.get(idx)
    }

    /// Put the cursor on the item with this id, wherever it is.
    pub fn select_item_by_id(&mut self, item_id: i64) -> bool {
        for (col_idx, col) in self.columns.iter_mut().enumerate() {
            if let Some(idx) = col.items.iter().position(|i| i.id == item_id) {
                self.active_column = col_idx;
                col.list_state.select(Some(idx));
                return true;
            }
        }
        false
    }

    /// Visible column next to the selected item's column.
    pub fn neighbour_column(&self, step: Step) -> Option<&BoardColumn> {
        self.selected_item()?;
        let target = match step {
            Step::Left => self.active_column.checked_sub(1)?,
            Step::Right => self.active_column + 1,
        };
        self.columns.get(target).map(|c| &c.column)
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('h') | KeyCode::Left => {
                if self.active_column > 0 {
                    self.active_column -= 1;
                }
            }
            KeyCode::Char('l') | KeyCode::Right => {
                if self.active_column + 1 < self.columns.len() {
                    self.active_column += 1;
                }
            }
            KeyCode::Char('j') | KeyCode::Down => {
                if let Some(col) = self.columns.get_mut(self.active_column) {
                    let current = col.list_state.selected().unwrap_or(0);
                    if current + 1 < col.items.len() {
                        col.list_state.select(Some(current + 1));
                    }
                }
            }
            KeyCode::Char('k') | KeyCode::Up => {
                if let Some(col) = self.columns.get_mut(self.active_column) {
                    let current = col.list_state.selected().unwrap_or(0);
                    if current > 0 {
                        col.list_state.select(Some(current - 1));
                    }
                }
            }
            KeyCode::Char('g') => {
                if let Some(col) = self.columns.get_mut(self.active_column) {
                    if !col.items.is_empty() {
                        col.list_state.select(Some(0));
                    }
                }
            }
            KeyCode::Char('G') => {
                if let Some(col) = self.columns.get_mut(self.active_column) {
                    if !col.items.is_empty() {
                        col.list_state.select(Some(col.items.len() - 1));
                    }
                }
            }
            _ => {}
        }
    }

    /// `moving` marks the item whose move request is still out.
    pub fn render(&self, frame: &mut Frame, area: Rect, moving: Option<i64>, palette: Palette) {
        let col_count = self.columns.len() as u16;
        if col_count == 0 {
            frame.render_widget(
                Line::from(Span::styled(
                    " No visible columns ",
                    Style::default().fg(Color::DarkGray),
                )),
                area,
            );
            return;
        }

        let constraints: Vec<Constraint> = (0..col_count)
            .map(|_| Constraint::Ratio(1, col_count as u32))
            .collect();

        let chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints(constraints)
            .split(area);

        for (i, (col, chunk)) in self.columns.iter().zip(chunks.iter()).enumerate() {
            render_column(frame, col, *chunk, i == self.active_column, moving, palette);
        }
    }
}

fn render_column(
    frame: &mut Frame,
    col: &ColumnState,
    area: Rect,
    is_active: bool,
    moving: Option<i64>,
    palette: Palette,
) {
    let title = format!(" {} ({}) ", col.column.name, col.items.len());

    let border_style = if is_active {
        palette.border()
    } else {
        Style::default().fg(Color::DarkGray)
    };

    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(border_style);

    let items: Vec<ListItem> = col
        .items
        .iter()
        .map(|item| ListItem::new(item_line(item, moving == Some(item.id))))
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(palette.highlight())
        .highlight_symbol("> ");

    let mut state = col.list_state.clone();
    frame.render_stateful_widget(list, area, &mut state);
}

fn item_line(item: &BoardWorkItem, moving: bool) -> Line<'_> {
    let category = item.category();
    let mut spans = vec![
        Span::styled(
            format!("{} ", category_symbol(category)),
            category_color(category),
        ),
        Span::styled(format!("#{} ", item.id), Style::default().fg(Color::DarkGray)),
        Span::raw(item.title.as_str()),
    ];
    if let Some(person) = &item.assigned_to {
        let seed = person.email.as_deref().unwrap_or(&person.display_name);
        let (r, g, b) = seeded_color(seed);
        spans.push(Span::styled(
            format!(" {}", initials(&person.display_name)),
            Style::default().fg(Color::Rgb(r, g, b)).bold(),
        ));
    }
    for pr in &item.pull_requests {
        let symbol = pr.approval.as_ref().map_or("PR", |a| a.symbol());
        spans.push(Span::styled(
            format!(" {symbol}"),
            Style::default().fg(Color::Magenta),
        ));
    }
    if moving {
        spans.push(Span::styled(" ...", Style::default().fg(Color::Yellow)));
    }
    Line::from(spans)
}

fn category_symbol(category: WorkItemCategory) -> &'static str {
    match category {
        WorkItemCategory::Bug => "B",
        WorkItemCategory::Story => "S",
        WorkItemCategory::Task => "T",
        WorkItemCategory::Feature => "F",
        WorkItemCategory::Epic => "E",
        WorkItemCategory::Other => "·",
    }
}

fn category_color(category: WorkItemCategory) -> Style {
    match category {
        WorkItemCategory::Bug => Style::default().fg(Color::Red).bold(),
        WorkItemCategory::Story => Style::default().fg(Color::Blue),
        WorkItemCategory::Task => Style::default().fg(Color::Yellow),
        WorkItemCategory::Feature => Style::default().fg(Color::Magenta),
        WorkItemCategory::Epic => Style::default().fg(Color::LightMagenta).bold(),
        WorkItemCategory::Other => Style::default().fg(Color::DarkGray),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyModifiers;
    use worktrack_core::board_filter::RenderedColumn;

    fn item(id: i64, column: &str) -> BoardWorkItem {
        BoardWorkItem {
            id,
            title: format!("Item {id}"),
            work_item_type: "Task".into(),
            board_column_id: Some(column.into()),
            board_column_name: None,
            board_state: None,
            assigned_to: None,
            priority: None,
            tags: Default::default(),
            pull_requests: vec![],
            url: None,
        }
    }

    fn column(id: &str, order: i32, items: Vec<BoardWorkItem>) -> RenderedColumn {
        RenderedColumn {
            column: BoardColumn {
                id: id.into(),
                name: id.to_uppercase(),
                order,
            },
            items,
        }
    }

    fn make_panel() -> BoardPanel {
        BoardPanel::new(BoardView {
            columns: vec![
                column("new", 0, vec![item(1, "new"), item(2, "new")]),
                column("active", 1, vec![]),
                column("done", 2, vec![item(3, "done")]),
            ],
            total_columns: 4,
        })
    }

    fn key(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE)
    }

    #[test]
    fn starts_on_first_item_of_first_column() {
        let panel = make_panel();
        assert_eq!(panel.selected_item().unwrap().id, 1);
        assert_eq!(panel.active_column().unwrap().id, "new");
    }

    #[test]
    fn navigation_stays_in_bounds() {
        let mut panel = make_panel();
        panel.handle_key(key('h'));
        assert_eq!(panel.active_column().unwrap().id, "new");
        panel.handle_key(key('j'));
        panel.handle_key(key('j'));
        assert_eq!(panel.selected_item().unwrap().id, 2);
        panel.handle_key(key('g'));
        assert_eq!(panel.selected_item().unwrap().id, 1);
        for _ in 0..5 {
            panel.handle_key(key('l'));
        }
        assert_eq!(panel.active_column().unwrap().id, "done");
    }

    #[test]
    fn empty_column_has_no_selection() {
        let mut panel = make_panel();
        panel.handle_key(key('l'));
        assert!(panel.selected_item().is_none());
        assert!(panel.neighbour_column(Step::Right).is_none());
    }

    #[test]
    fn select_item_switches_column() {
        let mut panel = make_panel();
        assert!(panel.select_item_by_id(3));
        assert_eq!(panel.active_column().unwrap().id, "done");
        assert!(!panel.select_item_by_id(99));
        assert_eq!(panel.selected_item().unwrap().id, 3);
    }

    #[test]
    fn neighbour_columns_follow_visible_order() {
        let mut panel = make_panel();
        assert!(panel.neighbour_column(Step::Left).is_none());
        assert_eq!(panel.neighbour_column(Step::Right).unwrap().id, "active");

        panel.select_item_by_id(3);
        assert_eq!(panel.neighbour_column(Step::Left).unwrap().id, "active");
        assert!(panel.neighbour_column(Step::Right).is_none());
    }

    #[test]
    fn focus_column_ignores_hidden() {
        let mut panel = make_panel();
        assert!(panel.focus_column("done"));
        assert!(!panel.focus_column("review"));
        assert_eq!(panel.active_column().unwrap().id, "done");
    }
}
