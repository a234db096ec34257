//! Structured logging for debugging goalchain.
//!
//! Log levels:
//! - ERROR: Tasks and chains that failed for good
//! - WARN: Failed attempts and ignored dependencies
//! - INFO: Chain lifecycle and plan creation
//! - DEBUG: Dispatch decisions, retries and config loading
//! - TRACE: Everything else
//!
//! Debug mode can be enabled with `--debug` flag or `GOALCHAIN_DEBUG=1` env
//! var. `RUST_LOG` overrides both.

use std::fs::File;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

static DEBUG_ENABLED: AtomicBool = AtomicBool::new(false);

/// Initialize logging to ~/.goalchain/goalchain.log
pub fn init() {
    init_with_debug(false);
}

/// Initialize logging with explicit debug mode setting.
///
/// Falls back to stderr when the log file cannot be created. Calling this
/// more than once keeps the first subscriber.
pub fn init_with_debug(debug: bool) {
    let env_debug = std::env::var("GOALCHAIN_DEBUG")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    let debug_enabled = debug || env_debug;
    DEBUG_ENABLED.store(debug_enabled, Ordering::SeqCst);

    let filter = make_filter(debug_enabled);
    match Config::log_path().ok().and_then(|path| open_log_file(&path)) {
        Some(file) => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(true)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init();
        }
        None => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(true)
                .with_writer(std::io::stderr)
                .try_init();
        }
    }
}

/// Check if debug mode is enabled.
pub fn is_debug() -> bool {
    DEBUG_ENABLED.load(Ordering::Relaxed)
}

fn make_filter(debug: bool) -> EnvFilter {
    let fallback = if debug { "goalchain=debug" } else { "goalchain=info" };
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

// Truncated on startup.
fn open_log_file(path: &Path) -> Option<File> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).ok()?;
    }
    File::create(path).ok()
}
