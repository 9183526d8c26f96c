use std::fs::OpenOptions;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

use crate::decode::DecodeError;
use crate::util::env_flag;

const DEBUG_FRAMES_ENV: &str = "AUI_DEBUG_FRAMES";
const LOG_PATH_ENV: &str = "AUI_LOG_PATH";
const LOG_LEVEL_ENV: &str = "AUI_LOG_LEVEL";
const DEFAULT_LOG_LEVEL: &str = "info";
const MAX_LOGGED_FRAME_CHARS: usize = 2048;

/// Installs the global tracing subscriber. `RUST_LOG` wins over `AUI_LOG_LEVEL`.
/// Returns false when a subscriber was already installed.
pub fn init_tracing() -> bool {
    let level = std::env::var(LOG_LEVEL_ENV).unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let writer = match resolve_log_path() {
        Some(path) => match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => {
                let file = Arc::new(Mutex::new(file));
                BoxMakeWriter::new(move || SharedFile(Arc::clone(&file)))
            }
            Err(err) => {
                eprintln!("aui: cannot open log file {path}: {err}");
                BoxMakeWriter::new(std::io::stderr)
            }
        },
        None => BoxMakeWriter::new(std::io::stderr),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .is_ok()
}

pub fn debug_frames_enabled() -> bool {
    env_flag(DEBUG_FRAMES_ENV, false)
}

pub fn emit_frame_debug(generation: u64, frame: &str) {
    if !debug_frames_enabled() {
        return;
    }
    debug!(generation, frame = %truncate_frame(frame), "inbound frame");
}

pub fn emit_decode_error(generation: u64, frame: &str, error: &DecodeError) {
    warn!(
        generation,
        error = %error,
        frame = %truncate_frame(frame),
        "dropping undecodable frame"
    );
}

fn truncate_frame(frame: &str) -> String {
    if frame.chars().count() <= MAX_LOGGED_FRAME_CHARS {
        return frame.to_string();
    }
    let mut truncated: String = frame.chars().take(MAX_LOGGED_FRAME_CHARS).collect();
    truncated.push('…');
    truncated
}

fn resolve_log_path() -> Option<String> {
    std::env::var(LOG_PATH_ENV)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

struct SharedFile(Arc<Mutex<std::fs::File>>);

impl std::io::Write for SharedFile {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self.0.lock() {
            Ok(mut file) => file.write(buf),
            Err(_) => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self.0.lock() {
            Ok(mut file) => file.flush(),
            Err(_) => Ok(()),
        }
    }
}
