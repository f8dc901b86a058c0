use std::fmt;

use serde::Deserialize;

/// Severity used when a slow request is reported.
///
/// Only selects which sink method is called; sinks do not filter on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(from = "String")]
pub enum Level {
    Info,
    #[default]
    Warn,
    Error,
}

impl Level {
    /// Parse a level name. Only the exact lowercase names `info` and `error`
    /// select those levels; anything else is `Warn`.
    pub fn from_name(name: &str) -> Self {
        match name {
            "info" => Level::Info,
            "error" => Level::Error,
            _ => Level::Warn,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
        }
    }

    /// Uppercase tag written between brackets in each log line.
    pub fn tag(&self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

impl From<&str> for Level {
    fn from(name: &str) -> Self {
        Self::from_name(name)
    }
}

impl From<String> for Level {
    fn from(name: String) -> Self {
        Self::from_name(&name)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
