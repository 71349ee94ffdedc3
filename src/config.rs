//! Configuration and paths

use std::path::PathBuf;
use std::time::Duration;

/// Base URL used when `TRAVEL_MATCH_API` is unset
pub const DEFAULT_API_BASE: &str = "http://localhost:5000/api";

/// Storage key (file name) for the persisted auth token
pub const TOKEN_KEY: &str = "auth_token";

/// Longest chat message the backend accepts, in characters
pub const MAX_MESSAGE_CHARS: usize = 500;

/// Substituted when the SOS form leaves location blank
pub const DEFAULT_SOS_LOCATION: &str = "Location unavailable";

/// Substituted when the SOS form leaves the message blank
pub const DEFAULT_SOS_MESSAGE: &str = "Emergency assistance needed";

/// Trip size used when the create form leaves it unset
pub const DEFAULT_MAX_PARTICIPANTS: u32 = 4;

/// All configurable endpoints, paths and timings
#[derive(Debug, Clone)]
pub struct Config {
    pub api_base: String,
    pub state_dir: PathBuf,
    pub token_file: PathBuf,
    pub poll_interval_ms: u64,
    pub sos_cooldown_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        let state_dir = std::env::var_os("TRAVEL_MATCH_STATE_DIR")
            .map(PathBuf::from)
            .or_else(|| dirs::data_local_dir().map(|d| d.join("travel-match")))
            .unwrap_or_else(|| PathBuf::from(".travel-match"));

        let api_base = std::env::var("TRAVEL_MATCH_API")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());

        Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            token_file: state_dir.join(TOKEN_KEY),
            state_dir,
            poll_interval_ms: 3000,
            sos_cooldown_secs: 30,
            request_timeout_secs: 10,
        }
    }
}

impl Config {
    /// Create config for testing with custom paths
    pub fn for_test(temp_dir: &std::path::Path) -> Self {
        Self {
            api_base: "http://127.0.0.1:9/api".to_string(),
            state_dir: temp_dir.to_path_buf(),
            token_file: temp_dir.join(TOKEN_KEY),
            poll_interval_ms: 3000,
            sos_cooldown_secs: 30,
            request_timeout_secs: 2,
        }
    }

    /// Point the config at a different backend
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn sos_cooldown(&self) -> Duration {
        Duration::from_secs(self.sos_cooldown_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
