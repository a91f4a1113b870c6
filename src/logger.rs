//! Logging utilities with colored output.
//!
//! Every line is `HH:MM:SS [module] message`. Lines are truncated to the
//! terminal width when stdout is a terminal, and written whole otherwise
//! (container logs).
//!
//! # Example
//!
//! ```ignore
//! log!("sync"; "added post {}", post.id);
//! log!("error"; "dropping {}: {}", describe, err);
//! ```

use chrono::Local;
use colored::{ColoredString, Colorize};
use crossterm::terminal::size;
use std::{
    io::{Write, stdout},
    sync::OnceLock,
};

/// Cached terminal width (fetched once on first use)
static TERMINAL_WIDTH: OnceLock<Option<u16>> = OnceLock::new();

/// Length of "HH:MM:SS " before the prefix
const CLOCK_LEN: usize = 9;

/// Calculate total prefix length for a module name.
///
/// Returns: `module.len() + 3` (for `[`, `]`, and trailing space)
#[inline]
const fn calc_prefix_len(module_len: usize) -> usize {
    CLOCK_LEN + module_len + 3
}

/// Get terminal width, cached after first call.
/// `None` when stdout is not attached to a terminal.
fn get_terminal_width() -> Option<u16> {
    *TERMINAL_WIDTH.get_or_init(|| size().ok().map(|(w, _)| w).filter(|w| *w > 0))
}

// ============================================================================
// Log Macro
// ============================================================================

/// Log a message with a colored module prefix.
///
/// # Usage
/// ```ignore
/// log!("module"; "message with {} formatting", args);
/// ```
#[macro_export]
macro_rules! log {
    ($module:expr; $($arg:tt)*) => {{
        $crate::logger::log($module, &format!($($arg)*))
    }};
}

/// Write one log line. Safe to call from any thread; lines never interleave.
pub fn log(module: &str, message: &str) {
    let prefix = colorize_prefix(module, &module.to_ascii_lowercase());
    let clock = Local::now().format("%H:%M:%S");

    let message = match get_terminal_width() {
        Some(width) if !message.contains('\n') => {
            let max_msg_len = (width as usize).saturating_sub(calc_prefix_len(module.len()));
            truncate_str(message, max_msg_len)
        }
        _ => message,
    };

    let mut stdout = stdout().lock();
    writeln!(stdout, "{} {prefix} {message}", clock.to_string().dimmed()).ok();
    stdout.flush().ok();
}

/// Get colored prefix based on module name
fn colorize_prefix(module: &str, module_lower: &str) -> ColoredString {
    let prefix = format!("[{module}]");
    match module_lower {
        "serve" => prefix.bright_blue().bold(),
        "sync" => prefix.bright_green().bold(),
        "source" => prefix.bright_cyan().bold(),
        "error" => prefix.bright_red().bold(),
        _ => prefix.bright_yellow().bold(),
    }
}

/// Truncate a string to fit within `max_len` bytes.
///
/// Ensures the result is valid UTF-8 by finding the nearest character boundary.
#[inline]
fn truncate_str(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        return s;
    }
    let mut end = max_len;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
