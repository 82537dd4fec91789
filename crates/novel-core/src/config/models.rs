use crate::fitting::FixedWidthMetrics;
use crate::pagination::Viewport;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Reader settings; every key is optional in TOML.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ReaderConfig {
    #[serde(default = "crate::config::defaults::default_legado_url")]
    pub legado_url: String,
    #[serde(default)]
    pub book_name: String,
    #[serde(default = "crate::config::defaults::default_match_prefix")]
    pub match_prefix: String,
    #[serde(default = "crate::config::defaults::default_viewport_width")]
    pub viewport_width: u32,
    #[serde(default = "crate::config::defaults::default_padding_left")]
    pub padding_left: u32,
    #[serde(default = "crate::config::defaults::default_narrow_char_width")]
    pub narrow_char_width: u32,
    #[serde(default = "crate::config::defaults::default_wide_char_width")]
    pub wide_char_width: u32,
    #[serde(default = "crate::config::defaults::default_save_debounce_ms")]
    pub save_debounce_ms: u64,
    #[serde(default = "crate::config::defaults::default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "crate::config::defaults::default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "crate::config::defaults::default_log_level")]
    pub log_level: LogLevel,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        use crate::config::defaults::*;
        Self {
            legado_url: default_legado_url(),
            book_name: String::new(),
            match_prefix: default_match_prefix(),
            viewport_width: default_viewport_width(),
            padding_left: default_padding_left(),
            narrow_char_width: default_narrow_char_width(),
            wide_char_width: default_wide_char_width(),
            save_debounce_ms: default_save_debounce_ms(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            log_level: default_log_level(),
        }
    }
}

impl ReaderConfig {
    /// Both the service address and the book name are set.
    pub fn is_complete(&self) -> bool {
        !self.legado_url.trim().is_empty() && !self.book_name.trim().is_empty()
    }

    pub fn viewport(&self) -> Viewport {
        Viewport {
            width: self.viewport_width,
            padding_left: self.padding_left,
        }
    }

    pub fn metrics(&self) -> FixedWidthMetrics {
        FixedWidthMetrics {
            narrow: self.narrow_char_width,
            wide: self.wide_char_width,
        }
    }

    pub fn save_debounce(&self) -> Duration {
        Duration::from_millis(self.save_debounce_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Supported logging verbosity levels.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_filter_str())
    }
}

impl LogLevel {
    pub fn as_filter_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}
