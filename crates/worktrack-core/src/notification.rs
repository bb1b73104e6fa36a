use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationType {
    Comment,
    Mentioned,
    ReviewRequested,
    Approved,
    ChangesRequested,
    Merged,
    PipelineFailed,
}

impl NotificationType {
    pub const ALL: &[NotificationType] = &[
        NotificationType::Comment,
        NotificationType::Mentioned,
        NotificationType::ReviewRequested,
        NotificationType::Approved,
        NotificationType::ChangesRequested,
        NotificationType::Merged,
        NotificationType::PipelineFailed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::Comment => "comment",
            NotificationType::Mentioned => "mentioned",
            NotificationType::ReviewRequested => "review-requested",
            NotificationType::Approved => "approved",
            NotificationType::ChangesRequested => "changes-requested",
            NotificationType::Merged => "merged",
            NotificationType::PipelineFailed => "pipeline-failed",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            NotificationType::Comment => "Comment",
            NotificationType::Mentioned => "Mentioned",
            NotificationType::ReviewRequested => "Review requested",
            NotificationType::Approved => "Approved",
            NotificationType::ChangesRequested => "Changes requested",
            NotificationType::Merged => "Merged",
            NotificationType::PipelineFailed => "Pipeline failed",
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: i64,
    pub repo_id: String,
    pub pull_request_id: i64,
    pub notification_type: NotificationType,
    pub title: String,
    #[serde(default)]
    pub message: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub viewed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPreferences {
    pub repo_id: String,
    pub enabled: bool,
    #[serde(default)]
    pub types: Vec<NotificationType>,
}

impl NotificationPreferences {
    pub fn allows(&self, kind: NotificationType) -> bool {
        self.enabled && self.types.contains(&kind)
    }
}

/// Per pull request override of a repository's preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationException {
    pub repo_id: String,
    pub pull_request_id: i64,
    pub notification_type: NotificationType,
    pub enabled: bool,
}

pub fn unread_count(notifications: &[Notification]) -> usize {
    notifications.iter().filter(|n| !n.viewed).count()
}

/// Optimistic patches for the cached notification list.
pub fn mark_viewed(notifications: &mut [Notification], id: i64) -> bool {
    match notifications.iter_mut().find(|n| n.id == id) {
        Some(n) => {
            n.viewed = true;
            true
        }
        None => false,
    }
}

pub fn remove(notifications: &mut Vec<Notification>, id: i64) -> bool {
    let before = notifications.len();
    notifications.retain(|n| n.id != id);
    notifications.len() != before
}
