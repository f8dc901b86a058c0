//! Pure line formatting. Destinations only ever receive finished strings.

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use colored::Colorize;

use crate::logging::Level;

/// Custom line formatter: `(timestamp, level, message) -> line`.
pub type Formatter = Arc<dyn Fn(&str, Level, &str) -> String + Send + Sync>;

/// Current UTC time as RFC 3339 with millisecond precision, e.g. `2024-05-01T12:00:00.123Z`.
pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// `[<timestamp>] [<LEVEL>] <message>`
pub fn format_line(timestamp: &str, level: Level, message: &str) -> String {
    format!("[{}] [{}] {}", timestamp, level.tag(), message)
}

/// Wrap `message` in the color for `level`.
///
/// `colored` leaves the text untouched when the terminal does not support color
/// or when `NO_COLOR` is set.
pub fn colorize(level: Level, message: &str) -> String {
    match level {
        Level::Info => message.green(),
        Level::Warn => message.yellow(),
        Level::Error => message.red(),
    }
    .to_string()
}

/// Console line: the custom formatter when present, otherwise the default
/// template with a colored message.
pub fn format_console_line(
    timestamp: &str,
    level: Level,
    message: &str,
    formatter: Option<&Formatter>,
) -> String {
    match formatter {
        Some(f) => f(timestamp, level, message),
        None => format_line(timestamp, level, &colorize(level, message)),
    }
}
