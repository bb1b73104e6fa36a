use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState};
use worktrack_core::format::format_hours_as_hours_minutes;
use worktrack_core::time_entry::{build_rows, EntryRow, TimeEntry};

use super::Palette;

pub struct EntriesPanel {
    rows: Vec<EntryRow>,
    list_state: ListState,
    merged: bool,
    total_hours: f64,
}

impl EntriesPanel {
    pub fn new(entries: &[TimeEntry], merged: bool) -> Self {
        let rows = build_rows(entries, merged);
        let mut list_state = ListState::default();
        if !rows.is_empty() {
            list_state.select(Some(0));
        }
        Self {
            total_hours: entries.iter().map(|e| e.hours).sum(),
            rows,
            list_state,
            merged,
        }
    }

    pub fn rows(&self) -> &[EntryRow] {
        &self.rows
    }

    pub fn is_merged(&self) -> bool {
        self.merged
    }

    pub fn total_hours(&self) -> f64 {
        self.total_hours
    }

    pub fn selected_row(&self) -> Option<&EntryRow> {
        self.rows.get(self.list_state.selected()?)
    }

    /// Keep the cursor on the row holding this registration after a reload.
    pub fn select_registration(&mut self, registration_id: &str) -> bool {
        match self
            .rows
            .iter()
            .position(|r| r.periods.iter().any(|p| p.registration_id == registration_id))
        {
            Some(idx) => {
                self.list_state.select(Some(idx));
                true
            }
            None => false,
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        let current = self.list_state.selected().unwrap_or(0);
        match key.code {
            KeyCode::Char('j') | KeyCode::Down => {
                if current + 1 < self.rows.len() {
                    self.list_state.select(Some(current + 1));
                }
            }
            KeyCode::Char('k') | KeyCode::Up => {
                if current > 0 {
                    self.list_state.select(Some(current - 1));
                }
            }
            KeyCode::Char('g') => {
                if !self.rows.is_empty() {
                    self.list_state.select(Some(0));
                }
            }
            KeyCode::Char('G') => {
                if !self.rows.is_empty() {
                    self.list_state.select(Some(self.rows.len() - 1));
                }
            }
            _ => {}
        }
    }

    pub fn render(&self, frame: &mut Frame, area: Rect, title: &str, palette: Palette) {
        let block = Block::default()
            .title(format!(
                " {title} | {} | {} ",
                format_hours_as_hours_minutes(self.total_hours),
                if self.merged { "merged" } else { "separate" }
            ))
            .borders(Borders::ALL)
            .border_style(palette.border());

        if self.rows.is_empty() {
            frame.render_widget(
                List::new(vec![ListItem::new(Span::styled(
                    "No entries this week",
                    Style::default().fg(Color::DarkGray),
                ))])
                .block(block),
                area,
            );
            return;
        }

        let items: Vec<ListItem> = self.rows.iter().map(|row| ListItem::new(row_line(row))).collect();
        let list = List::new(items)
            .block(block)
            .highlight_style(palette.highlight())
            .highlight_symbol("> ");

        let mut state = self.list_state.clone();
        frame.render_stateful_widget(list, area, &mut state);
    }
}

/// One display line: day, span, project/activity, hours, markers, note.
pub fn row_line(row: &EntryRow) -> Line<'_> {
    let mut spans = vec![
        Span::styled(
            format!("{} ", row.date.format("%a %d %b")),
            Style::default().fg(Color::Yellow),
        ),
        Span::styled(
            format!("{:<13} ", period_span(row)),
            Style::default().fg(Color::DarkGray),
        ),
        Span::raw(format!("{} / {} ", row.project_name, row.activity_name)),
        Span::styled(
            format_hours_as_hours_minutes(row.hours),
            Style::default().bold(),
        ),
    ];
    if row.periods.len() > 1 {
        spans.push(Span::styled(
            format!(" x{}", row.periods.len()),
            Style::default().fg(Color::Blue),
        ));
    }
    if row.has_overlap() {
        spans.push(Span::styled(" [overlap]", Style::default().fg(Color::Red).bold()));
    }
    if row.is_locked() {
        spans.push(Span::styled(" [locked]", Style::default().fg(Color::DarkGray)));
    }
    if let Some(note) = &row.note {
        spans.push(Span::styled(format!("  {note}"), Style::default().italic()));
    }
    Line::from(spans)
}

/// `09:00-11:00` over the earliest start and latest end of the row.
fn period_span(row: &EntryRow) -> String {
    let start = row.periods.iter().filter_map(|p| p.start_time).min();
    let end = row.periods.iter().filter_map(|p| p.end_time).max();
    match (start, end) {
        (Some(s), Some(e)) => format!("{}-{}", s.format("%H:%M"), e.format("%H:%M")),
        _ => String::new(),
    }
}
