use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

const CONFIG_FILE: &str = "courier_config.json";
const REQUEST_TIMEOUT_ENV: &str = "COURIER_REQUEST_TIMEOUT_MS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub message_page_size: u32,
    pub conversation_page_size: u32,
    pub request_timeout_ms: u64,
    pub typing_idle_ms: u64,
    pub typing_expiry_ms: u64,
    pub reveal_above_anchor: usize,
    pub log_to_file: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            message_page_size: 15,
            conversation_page_size: 10,
            request_timeout_ms: 10_000,
            typing_idle_ms: 2_000,
            typing_expiry_ms: 6_000,
            reveal_above_anchor: 3,
            log_to_file: false,
        }
    }
}

impl AppConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn typing_idle(&self) -> Duration {
        Duration::from_millis(self.typing_idle_ms)
    }

    pub fn typing_expiry(&self) -> Duration {
        Duration::from_millis(self.typing_expiry_ms)
    }

    // A zero page size would make every page look like the last one.
    fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if self.message_page_size == 0 {
            self.message_page_size = defaults.message_page_size;
        }
        if self.conversation_page_size == 0 {
            self.conversation_page_size = defaults.conversation_page_size;
        }
        if self.request_timeout_ms == 0 {
            self.request_timeout_ms = defaults.request_timeout_ms;
        }
        self
    }

    fn with_timeout_override(mut self, raw: Option<&str>) -> Self {
        if let Some(v) = raw.map(str::trim).filter(|s| !s.is_empty()) {
            match v.parse::<u64>() {
                Ok(ms) if ms > 0 => self.request_timeout_ms = ms,
                _ => tracing::warn!(
                    env = REQUEST_TIMEOUT_ENV,
                    value = v,
                    "ignoring invalid request timeout override"
                ),
            }
        }
        self
    }
}

/// Read `<data_dir>/courier_config.json`. A missing or unparsable file yields defaults.
pub fn load_app_config(data_dir: &str) -> AppConfig {
    let path = Path::new(data_dir).join(CONFIG_FILE);
    let config = match std::fs::read(&path) {
        Ok(bytes) => serde_json::from_slice::<AppConfig>(&bytes).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), %e, "unparsable config, using defaults");
            AppConfig::default()
        }),
        Err(_) => AppConfig::default(),
    };
    config
        .sanitized()
        .with_timeout_override(std::env::var(REQUEST_TIMEOUT_ENV).ok().as_deref())
}

pub fn default_app_config_json() -> String {
    serde_json::to_string_pretty(&AppConfig::default()).unwrap_or_else(|_| "{}".to_string())
}
