use std::path::PathBuf;

pub const LOG_ENV: &str = "GRADEBOOK_LOG";
pub const WORKSPACE_ENV: &str = "GRADEBOOK_WORKSPACE";
const DEFAULT_LOG_FILTER: &str = "gradebookd=info";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub log_filter: String,
    /// Opened at startup when set; the UI can still switch with `workspace.select`.
    pub workspace: Option<PathBuf>,
}

impl Config {
    /// Reads `.env` (if present) and then the process environment.
    pub fn load() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let log_filter = get(LOG_ENV)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());
        let workspace = get(WORKSPACE_ENV)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        Self {
            log_filter,
            workspace,
        }
    }
}
