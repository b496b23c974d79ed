use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://app.tablecrm.com/api/v1";

/// How non-interactive commands print their results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Text,
    Json,
}

/// Runtime configuration resolved from flags and environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub base_url: String,
    pub user_agent: String,
    pub timeout: Option<Duration>,
    pub debounce: Duration,
    pub token_path: PathBuf,
    /// Token supplied on the command line; takes precedence over the stored one.
    pub token_override: Option<String>,
    pub log_file: PathBuf,
    pub output: OutputMode,
}

/// `<data_dir>/tablecrm-order/tablecrm-order.log`, falling back to the
/// working directory when no data dir is known.
pub fn default_log_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tablecrm-order")
        .join("tablecrm-order.log")
}
