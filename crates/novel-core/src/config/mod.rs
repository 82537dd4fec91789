//! Configuration loading for the reader.
//!
//! Settings live in `conf/novel.toml` by default. Missing keys take their
//! defaults; a missing or unparsable file falls back to the defaults entirely
//! so the reader still starts (and reports the missing book name itself).

mod defaults;
mod models;

pub use models::{LogLevel, ReaderConfig};

use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

pub const DEFAULT_CONFIG_PATH: &str = "conf/novel.toml";

pub fn load_config(path: &Path) -> ReaderConfig {
    let contents = match fs::read_to_string(path) {
        Ok(data) => {
            info!(path = %path.display(), "Loaded reader config");
            data
        }
        Err(err) => {
            warn!(
                path = %path.display(),
                "Falling back to default config: {err}"
            );
            return ReaderConfig::default();
        }
    };

    match parse_config(&contents) {
        Ok(cfg) => {
            debug!(book = %cfg.book_name, url = %cfg.legado_url, "Parsed configuration from disk");
            cfg
        }
        Err(err) => {
            warn!(path = %path.display(), "Invalid config TOML: {err}");
            ReaderConfig::default()
        }
    }
}

pub fn parse_config(contents: &str) -> Result<ReaderConfig, toml::de::Error> {
    toml::from_str(contents)
}
