use std::sync::Arc;

use crate::config::LoggingConfig;
use crate::logging::destination::{ConsoleDestination, Destination, FileDestination};
use crate::logging::format::{Formatter, format_console_line, format_line, timestamp_now};
use crate::logging::Level;

/// Receiver of slow-request messages.
///
/// Implementations write every message they receive; the level only decides
/// how the line is tagged.
pub trait Sink: Send + Sync {
    fn emit(&self, level: Level, message: &str);

    fn info(&self, message: &str) {
        self.emit(Level::Info, message)
    }

    fn warn(&self, message: &str) {
        self.emit(Level::Warn, message)
    }

    fn error(&self, message: &str) {
        self.emit(Level::Error, message)
    }
}

/// Sink used when logging is disabled. Does nothing at all.
#[derive(Debug, Default, Clone, Copy)]
pub struct InertSink;

impl Sink for InertSink {
    fn emit(&self, _level: Level, _message: &str) {}
}

/// Writes plain lines to a log file and, optionally, colored lines to the console.
pub struct ActiveSink {
    file: FileDestination,
    console: Option<ConsoleDestination>,
    formatter: Option<Formatter>,
}

impl ActiveSink {
    pub fn new(config: &LoggingConfig) -> Self {
        let console = config.console_enabled.then(ConsoleDestination::stdout);
        Self::from_parts(
            FileDestination::new(&config.destination_path),
            console,
            config.formatter.clone(),
        )
    }

    pub fn from_parts(
        file: FileDestination,
        console: Option<ConsoleDestination>,
        formatter: Option<Formatter>,
    ) -> Self {
        Self {
            file,
            console,
            formatter,
        }
    }
}

impl Sink for ActiveSink {
    fn emit(&self, level: Level, message: &str) {
        let timestamp = timestamp_now();

        if let Err(e) = self.file.write_line(&format_line(&timestamp, level, message)) {
            tracing::warn!(error = %e, "slow request log entry dropped");
        }

        if let Some(console) = &self.console {
            let line = format_console_line(&timestamp, level, message, self.formatter.as_ref());
            if let Err(e) = console.write_line(&line) {
                tracing::warn!(error = %e, "slow request console entry dropped");
            }
        }
    }
}

/// Build the sink described by `config`.
///
/// A disabled configuration yields an [`InertSink`] without touching the
/// filesystem or the console.
pub fn configure_sink(config: &LoggingConfig) -> Arc<dyn Sink> {
    if !config.enabled {
        return Arc::new(InertSink);
    }
    tracing::debug!(
        path = %config.destination_path.display(),
        console = config.console_enabled,
        "slow request sink configured"
    );
    Arc::new(ActiveSink::new(config))
}
