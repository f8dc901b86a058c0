use std::path::PathBuf;

/// Errors raised while turning external input into a [`LatencyConfig`](crate::LatencyConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid latency configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failures of a log destination.
///
/// These never reach the request path: sinks report them through `tracing`
/// and carry on.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("failed to open log file {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write log file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write console log: {0}")]
    Console(#[source] std::io::Error),
}
