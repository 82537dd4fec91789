//! Terminal host for the scroll reader.
//!
//! Loads `conf/novel.toml` (or the path given as the first argument), attaches
//! an inline reader to the configured trigger and reads wheel events from
//! stdin, one per line:
//! - `j`, `+` or an empty line scroll down
//! - `k` or `-` scroll up
//! - `r` reconnects
//! - `q` (or Ctrl+C) saves and quits
//!
//! Each redraw prints the visible line.

use anyhow::{Context, Result};
use novel_core::config::DEFAULT_CONFIG_PATH;
use novel_core::text_utils::char_len;
use novel_core::{HttpLibraryClient, InlineReader, ReadingSession, load_config};
use std::env;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*, reload};

type ReloadHandle = reload::Handle<EnvFilter, tracing_subscriber::Registry>;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Wheel(i32),
    Reload,
    Quit,
}

fn main() {
    let reload_handle = init_tracing();
    if let Err(err) = run(&reload_handle) {
        error!("{err:?}");
        std::process::exit(1);
    }
}

fn run(reload_handle: &ReloadHandle) -> Result<()> {
    let config_path = parse_args();
    let config = load_config(&config_path);
    set_log_level(reload_handle, config.log_level.as_filter_str());
    info!(
        path = %config_path.display(),
        level = %config.log_level,
        book = %config.book_name,
        "Starting novel scroll reader"
    );

    let client = HttpLibraryClient::new(
        &config.legado_url,
        config.connect_timeout(),
        config.request_timeout(),
    )?;
    let session = ReadingSession::new(config, client)?;
    let mut reader = InlineReader::from_config(session.clone());

    // The terminal has no document; the trigger itself is the document.
    let trigger = session.config().match_prefix.clone();
    reader.on_caret_moved(&trigger, char_len(&trigger));

    let (tx, rx) = mpsc::channel();
    let ctrlc_tx = tx.clone();
    if let Err(err) = ctrlc::set_handler(move || {
        info!("Received Ctrl+C; saving progress before exit");
        let _ = ctrlc_tx.send(Command::Quit);
    }) {
        warn!("Failed to install Ctrl+C signal handler: {err}");
    }
    thread::Builder::new()
        .name("stdin-reader".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                match parse_command(&line) {
                    Some(command) => {
                        if tx.send(command).is_err() {
                            return;
                        }
                    }
                    None => warn!(input = %line.trim(), "Unknown command"),
                }
            }
            let _ = tx.send(Command::Quit);
        })
        .context("failed to spawn stdin reader")?;

    loop {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(Command::Wheel(rotation)) => {
                reader.on_wheel(rotation);
            }
            Ok(Command::Reload) => session.reload(),
            Ok(Command::Quit) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
        if let Some(line) = reader.poll_render() {
            println!("{line}");
        }
    }

    if !session.shutdown() {
        warn!("Reader worker did not stop in time; last save may be lost");
    }
    info!("Reader closed");
    Ok(())
}

fn parse_args() -> PathBuf {
    env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

fn parse_command(line: &str) -> Option<Command> {
    match line.trim() {
        "" | "j" | "+" => Some(Command::Wheel(1)),
        "k" | "-" => Some(Command::Wheel(-1)),
        "r" => Some(Command::Reload),
        "q" => Some(Command::Quit),
        _ => None,
    }
}

fn init_tracing() -> ReloadHandle {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (filter_layer, handle) = reload::Layer::new(env_filter);
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(io::stderr)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_filter(filter_layer),
        )
        .init();
    handle
}

fn set_log_level(handle: &ReloadHandle, level: &str) {
    let parsed = EnvFilter::builder()
        .parse(level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    if let Err(err) = handle.modify(|filter| *filter = parsed.clone()) {
        warn!(%level, "Failed to update log level from config: {err}");
    } else {
        info!(%level, "Applied log level from config");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stdin_commands() {
        assert_eq!(parse_command(""), Some(Command::Wheel(1)));
        assert_eq!(parse_command(" j "), Some(Command::Wheel(1)));
        assert_eq!(parse_command("+"), Some(Command::Wheel(1)));
        assert_eq!(parse_command("k"), Some(Command::Wheel(-1)));
        assert_eq!(parse_command("-"), Some(Command::Wheel(-1)));
        assert_eq!(parse_command("r"), Some(Command::Reload));
        assert_eq!(parse_command("q"), Some(Command::Quit));
        assert_eq!(parse_command("scroll"), None);
    }
}
