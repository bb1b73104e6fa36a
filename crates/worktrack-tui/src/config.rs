use std::path::PathBuf;

use clap::Parser;
use worktrack_core::board::BoardScope;
use worktrack_service::HttpConfig;
use worktrack_store::StoreConfig;

/// Debug builds talk to a locally running backend.
pub const DEFAULT_API_URL: &str = if cfg!(debug_assertions) {
    "http://localhost:5000/api"
} else {
    "https://worktrack.local/api"
};

#[derive(Debug, Clone, Parser)]
#[command(name = "worktrack", about = "Work items, differs and time tracking in the terminal")]
pub struct Config {
    /// Core API base URL
    #[arg(long, env = "WORKTRACK_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Time-tracking API base URL (defaults to the core API URL)
    #[arg(long, env = "WORKTRACK_TIME_API_URL")]
    pub time_api_url: Option<String>,

    /// Parent domain provider cookies are scoped to, e.g. `.example.com`
    #[arg(long, env = "WORKTRACK_COOKIE_DOMAIN")]
    pub cookie_domain: Option<String>,

    /// Directory for persisted preferences
    #[arg(long, env = "WORKTRACK_DATA_DIR")]
    pub data_dir: Option<String>,

    /// Keep preferences in memory only
    #[arg(long)]
    pub no_persist: bool,

    /// Email of the signed-in user, used by the "Mine" board filter
    #[arg(long, env = "WORKTRACK_USER_EMAIL")]
    pub user_email: Option<String>,

    /// Organization whose board is shown
    #[arg(long, env = "WORKTRACK_ORGANIZATION")]
    pub organization: Option<String>,

    /// Project whose board is shown (defaults to the organization's first project)
    #[arg(long, env = "WORKTRACK_PROJECT")]
    pub project: Option<String>,

    /// Log file; the terminal itself is taken by the UI
    #[arg(long, env = "WORKTRACK_LOG_FILE", default_value = "worktrack.log")]
    pub log_file: PathBuf,
}

impl Config {
    pub fn http_config(&self) -> HttpConfig {
        HttpConfig {
            core_url: self.api_url.clone(),
            time_url: self
                .time_api_url
                .clone()
                .unwrap_or_else(|| self.api_url.clone()),
            cookie_domain: self.cookie_domain.clone(),
        }
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            local_data_dir: self.data_dir.clone(),
            in_memory: self.no_persist,
        }
    }

    /// Board scope when both organization and project were given.
    pub fn board_scope(&self) -> Option<BoardScope> {
        match (&self.organization, &self.project) {
            (Some(org), Some(project)) => Some(BoardScope::new(org.as_str(), project.as_str())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_url_falls_back_to_api_url() {
        let config = Config::parse_from(["worktrack", "--api-url", "http://core"]);
        let http = config.http_config();
        assert_eq!(http.core_url, "http://core");
        assert_eq!(http.time_url, "http://core");

        let config = Config::parse_from([
            "worktrack",
            "--api-url",
            "http://core",
            "--time-api-url",
            "http://time",
        ]);
        assert_eq!(config.http_config().time_url, "http://time");
    }

    #[test]
    fn board_scope_needs_organization_and_project() {
        let config = Config::parse_from(["worktrack", "--organization", "acme"]);
        assert!(config.board_scope().is_none());

        let config =
            Config::parse_from(["worktrack", "--organization", "acme", "--project", "web"]);
        assert_eq!(config.board_scope(), Some(BoardScope::new("acme", "web")));
    }

    #[test]
    fn no_persist_selects_memory_store() {
        let config = Config::parse_from(["worktrack", "--no-persist"]);
        assert!(config.store_config().in_memory);
    }
}
