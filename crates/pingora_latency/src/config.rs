//! Latency and logging configuration.
//!
//! Configurations are built either programmatically through the builder
//! methods, or from a possibly partial [`LatencyOptions`] value (for example
//! deserialized from JSON) that [`LatencyOptions::resolve`] turns into a fully
//! populated [`LatencyConfig`]. Every missing field takes its default; nothing
//! here is validated.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::logging::{Formatter, Level};

pub const DEFAULT_THRESHOLD_MS: f64 = 100.0;
pub const DEFAULT_DESTINATION: &str = "slow-requests.log";

/// Per-method threshold overrides, keyed by uppercase method name.
pub type MethodThresholds = HashMap<String, f64>;

/// How slow requests are written out.
#[derive(Clone)]
pub struct LoggingConfig {
    /// When false nothing is ever written (default: true)
    pub enabled: bool,
    /// Which sink method reports a slow request (default: warn)
    pub level: Level,
    /// Log file (default: `slow-requests.log`)
    pub destination_path: PathBuf,
    /// Also write to stdout (default: true)
    pub console_enabled: bool,
    /// Replaces the console line template when set
    pub formatter: Option<Formatter>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: Level::Warn,
            destination_path: PathBuf::from(DEFAULT_DESTINATION),
            console_enabled: true,
            formatter: None,
        }
    }
}

impl fmt::Debug for LoggingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggingConfig")
            .field("enabled", &self.enabled)
            .field("level", &self.level)
            .field("destination_path", &self.destination_path)
            .field("console_enabled", &self.console_enabled)
            .field("formatter", &self.formatter.as_ref().map(|_| "custom"))
            .finish()
    }
}

impl LoggingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// A configuration that never writes anything.
    pub fn disabled() -> Self {
        Self::default().enabled(false)
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn level<L: Into<Level>>(mut self, level: L) -> Self {
        self.level = level.into();
        self
    }

    pub fn destination_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.destination_path = path.into();
        self
    }

    pub fn console_enabled(mut self, enabled: bool) -> Self {
        self.console_enabled = enabled;
        self
    }

    pub fn formatter<F>(mut self, formatter: F) -> Self
    where
        F: Fn(&str, Level, &str) -> String + Send + Sync + 'static,
    {
        self.formatter = Some(Arc::new(formatter));
        self
    }
}

/// Configuration of one latency middleware installation.
#[derive(Debug, Clone)]
pub struct LatencyConfig {
    /// Global slow-request threshold in milliseconds (default: 100)
    pub threshold_ms: f64,
    pub logging: LoggingConfig,
    /// Optional per-method overrides of `threshold_ms`
    pub custom_thresholds: Option<MethodThresholds>,
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            threshold_ms: DEFAULT_THRESHOLD_MS,
            logging: LoggingConfig::default(),
            custom_thresholds: None,
        }
    }
}

impl LatencyConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a partial JSON configuration and fill in the defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let options: LatencyOptions = serde_json::from_str(json)?;
        Ok(options.resolve())
    }

    pub fn threshold_ms(mut self, threshold_ms: f64) -> Self {
        self.threshold_ms = threshold_ms;
        self
    }

    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }

    /// Override the threshold for one HTTP method.
    pub fn custom_threshold<M: AsRef<str>>(mut self, method: M, threshold_ms: f64) -> Self {
        self.custom_thresholds
            .get_or_insert_with(HashMap::new)
            .insert(method.as_ref().to_ascii_uppercase(), threshold_ms);
        self
    }

    /// Replace the whole override table. Method names are uppercased.
    pub fn custom_thresholds<I, M>(mut self, table: I) -> Self
    where
        I: IntoIterator<Item = (M, f64)>,
        M: AsRef<str>,
    {
        self.custom_thresholds = Some(normalize_methods(table));
        self
    }

    /// Threshold that applies to a request with `method`.
    ///
    /// An override of zero or NaN counts as missing; in that case, and for
    /// methods without an override, the global threshold applies.
    pub fn threshold_for(&self, method: &str) -> f64 {
        self.custom_thresholds
            .as_ref()
            .and_then(|table| table.get(method))
            .copied()
            .filter(|t| *t != 0.0 && !t.is_nan())
            .unwrap_or(self.threshold_ms)
    }
}

fn normalize_methods<I, M>(table: I) -> MethodThresholds
where
    I: IntoIterator<Item = (M, f64)>,
    M: AsRef<str>,
{
    table
        .into_iter()
        .map(|(m, t)| (m.as_ref().to_ascii_uppercase(), t))
        .collect()
}

/// Partial logging options. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoggingOptions {
    pub enabled: Option<bool>,
    pub level: Option<String>,
    #[serde(alias = "logFile")]
    pub destination_path: Option<PathBuf>,
    pub console_enabled: Option<bool>,
}

impl LoggingOptions {
    pub fn resolve(self) -> LoggingConfig {
        let defaults = LoggingConfig::default();
        LoggingConfig {
            enabled: self.enabled.unwrap_or(defaults.enabled),
            level: self.level.as_deref().map(Level::from_name).unwrap_or(defaults.level),
            destination_path: self.destination_path.unwrap_or(defaults.destination_path),
            console_enabled: self.console_enabled.unwrap_or(defaults.console_enabled),
            formatter: None,
        }
    }
}

/// Partial latency options. Every field is optional.
///
/// ```
/// use pingora_latency::LatencyOptions;
///
/// let options: LatencyOptions = serde_json::from_str(
///     r#"{ "thresholdMs": 250, "customThresholds": { "post": 500 } }"#,
/// ).unwrap();
/// let config = options.resolve();
/// assert_eq!(config.threshold_for("GET"), 250.0);
/// assert_eq!(config.threshold_for("POST"), 500.0);
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LatencyOptions {
    #[serde(alias = "threshold")]
    pub threshold_ms: Option<f64>,
    pub logging: Option<LoggingOptions>,
    pub custom_thresholds: Option<HashMap<String, f64>>,
}

impl LatencyOptions {
    pub fn resolve(self) -> LatencyConfig {
        LatencyConfig {
            threshold_ms: self.threshold_ms.unwrap_or(DEFAULT_THRESHOLD_MS),
            logging: self.logging.unwrap_or_default().resolve(),
            custom_thresholds: self.custom_thresholds.map(normalize_methods),
        }
    }
}
