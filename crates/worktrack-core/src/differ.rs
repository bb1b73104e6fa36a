use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifferStatus {
    Running,
    Stopped,
    Errored,
}

impl DifferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DifferStatus::Running => "running",
            DifferStatus::Stopped => "stopped",
            DifferStatus::Errored => "errored",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            DifferStatus::Running => "Running",
            DifferStatus::Stopped => "Stopped",
            DifferStatus::Errored => "Errored",
        }
    }
}

impl fmt::Display for DifferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Identity of a tracked repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryKey {
    pub organization: String,
    pub project: String,
    pub repo_name: String,
}

impl RepositoryKey {
    pub fn new(
        organization: impl Into<String>,
        project: impl Into<String>,
        repo_name: impl Into<String>,
    ) -> Self {
        Self {
            organization: organization.into(),
            project: project.into(),
            repo_name: repo_name.into(),
        }
    }
}

impl fmt::Display for RepositoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.organization, self.project, self.repo_name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Differ {
    #[serde(flatten)]
    pub key: RepositoryKey,
    #[serde(default)]
    pub repo_id: Option<String>,
    pub status: DifferStatus,
    #[serde(default)]
    pub is_followed: bool,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
    /// Seconds between refreshes, when the server schedules them.
    #[serde(default)]
    pub refresh_interval: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DifferAction {
    #[serde(flatten)]
    pub key: RepositoryKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowRepository {
    #[serde(flatten)]
    pub key: RepositoryKey,
    pub follow: bool,
}

/// Optimistic patches applied to a cached differ list before the server confirms.
pub fn set_followed(differs: &mut [Differ], key: &RepositoryKey, follow: bool) -> bool {
    match differs.iter_mut().find(|d| &d.key == key) {
        Some(d) => {
            d.is_followed = follow;
            true
        }
        None => false,
    }
}

pub fn set_status(differs: &mut [Differ], key: &RepositoryKey, status: DifferStatus) -> bool {
    match differs.iter_mut().find(|d| &d.key == key) {
        Some(d) => {
            d.status = status;
            true
        }
        None => false,
    }
}
