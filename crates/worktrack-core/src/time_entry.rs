use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::WorktrackError;

/// Above this many visible entries overlap detection is skipped. Cost
/// control only; rows past the limit are simply never flagged.
pub const OVERLAP_CHECK_LIMIT: usize = 250;

/// Attestation is a one-way lock: attested entries are read-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttestLevel {
    #[default]
    None,
    Week,
    Month,
}

impl AttestLevel {
    pub fn is_locked(&self) -> bool {
        !matches!(self, AttestLevel::None)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            AttestLevel::None => "None",
            AttestLevel::Week => "Week",
            AttestLevel::Month => "Month",
        }
    }
}

impl fmt::Display for AttestLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeEntry {
    pub registration_id: String,
    pub project_id: String,
    pub project_name: String,
    pub activity_id: String,
    pub activity_name: String,
    pub date: NaiveDate,
    pub hours: f64,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub attest_level: AttestLevel,
}

impl TimeEntry {
    pub fn is_locked(&self) -> bool {
        self.attest_level.is_locked()
    }

    /// Refuse edits and deletes of attested entries.
    pub fn ensure_editable(&self) -> Result<(), WorktrackError> {
        if self.is_locked() {
            Err(WorktrackError::Locked(format!(
                "{} is attested ({})",
                self.registration_id, self.attest_level
            )))
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTimeEntry {
    pub project_id: String,
    pub activity_id: String,
    pub date: NaiveDate,
    pub hours: f64,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTimeEntry {
    pub registration_id: String,
    pub project_id: String,
    pub activity_id: String,
    pub date: NaiveDate,
    pub hours: f64,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderProject {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: String,
    pub name: String,
    pub project_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeInfo {
    pub flex_hours: f64,
    pub scheduled_hours: f64,
    pub worked_hours: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.from && date <= self.to
    }
}

/// One original entry inside a (possibly merged) row.
#[derive(Debug, Clone, PartialEq)]
pub struct TimePeriod {
    pub registration_id: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub hours: f64,
    pub attest_level: AttestLevel,
    pub overlapping: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntryRow {
    pub date: NaiveDate,
    pub project_id: String,
    pub project_name: String,
    pub activity_id: String,
    pub activity_name: String,
    pub note: Option<String>,
    pub hours: f64,
    pub periods: Vec<TimePeriod>,
}

impl EntryRow {
    /// Locked only when every period is locked.
    pub fn is_locked(&self) -> bool {
        !self.periods.is_empty() && self.periods.iter().all(|p| p.attest_level.is_locked())
    }

    /// A row spanning several periods has to be unmerged before editing.
    pub fn is_editable(&self) -> bool {
        self.periods.len() == 1 && !self.is_locked()
    }

    pub fn can_delete(&self) -> bool {
        self.is_editable()
    }

    pub fn has_overlap(&self) -> bool {
        self.periods.iter().any(|p| p.overlapping)
    }

    fn earliest_start(&self) -> Option<DateTime<Utc>> {
        self.periods.iter().filter_map(|p| p.start_time).min()
    }
}

fn period_of(entry: &TimeEntry) -> TimePeriod {
    TimePeriod {
        registration_id: entry.registration_id.clone(),
        start_time: entry.start_time,
        end_time: entry.end_time,
        hours: entry.hours,
        attest_level: entry.attest_level,
        overlapping: false,
    }
}

fn row_of(entry: &TimeEntry) -> EntryRow {
    EntryRow {
        date: entry.date,
        project_id: entry.project_id.clone(),
        project_name: entry.project_name.clone(),
        activity_id: entry.activity_id.clone(),
        activity_name: entry.activity_name.clone(),
        note: entry.note.clone(),
        hours: entry.hours,
        periods: vec![period_of(entry)],
    }
}

/// Build display rows, newest day first. With `merge`, entries on the same day
/// sharing project, activity and note collapse into one row. Overlaps are
/// flagged unless there are more than [`OVERLAP_CHECK_LIMIT`] entries.
pub fn build_rows(entries: &[TimeEntry], merge: bool) -> Vec<EntryRow> {
    let mut rows: Vec<EntryRow> = if merge {
        // A missing note and an empty one are different keys.
        let mut grouped: BTreeMap<(NaiveDate, &str, &str, Option<&str>), EntryRow> =
            BTreeMap::new();
        for entry in entries {
            let key = (
                entry.date,
                entry.project_name.as_str(),
                entry.activity_name.as_str(),
                entry.note.as_deref(),
            );
            match grouped.get_mut(&key) {
                Some(row) => {
                    row.hours += entry.hours;
                    row.periods.push(period_of(entry));
                }
                None => {
                    grouped.insert(key, row_of(entry));
                }
            }
        }
        grouped.into_values().collect()
    } else {
        entries.iter().map(row_of).collect()
    };

    if entries.len() <= OVERLAP_CHECK_LIMIT {
        flag_overlaps(&mut rows);
    }

    rows.sort_by(|a, b| {
        b.date
            .cmp(&a.date)
            .then_with(|| match (a.earliest_start(), b.earliest_start()) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            })
            .then_with(|| a.project_name.cmp(&b.project_name))
            .then_with(|| a.activity_name.cmp(&b.activity_name))
    });
    for row in &mut rows {
        row.periods
            .sort_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.registration_id.cmp(&b.registration_id)));
    }
    rows
}

fn minute(ts: DateTime<Utc>) -> i64 {
    ts.timestamp().div_euclid(60)
}

/// Sweep each day's intervals in start order; an interval overlaps when it
/// starts before the latest end seen so far, compared at minute precision.
fn flag_overlaps(rows: &mut [EntryRow]) {
    // (date, start, end, row index, period index)
    let mut intervals: Vec<(NaiveDate, i64, i64, usize, usize)> = Vec::new();
    for (r, row) in rows.iter().enumerate() {
        for (p, period) in row.periods.iter().enumerate() {
            if let (Some(start), Some(end)) = (period.start_time, period.end_time) {
                intervals.push((row.date, minute(start), minute(end), r, p));
            }
        }
    }
    intervals.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));

    let mut flagged: Vec<(usize, usize)> = Vec::new();
    let mut latest: Option<(NaiveDate, i64, usize, usize)> = None;
    for &(date, start, end, r, p) in &intervals {
        match latest {
            Some((day, latest_end, lr, lp)) if day == date => {
                if start < latest_end {
                    flagged.push((lr, lp));
                    flagged.push((r, p));
                }
                if end > latest_end {
                    latest = Some((date, end, r, p));
                }
            }
            _ => latest = Some((date, end, r, p)),
        }
    }
    for (r, p) in flagged {
        rows[r].periods[p].overlapping = true;
    }
}

pub fn total_hours(entries: &[TimeEntry]) -> f64 {
    entries.iter().map(|e| e.hours).sum()
}
