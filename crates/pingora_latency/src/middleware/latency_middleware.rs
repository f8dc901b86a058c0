use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::config::LatencyConfig;
use crate::core::{Handler, Request, Response};
use crate::logging::{Level, Sink, configure_sink};
use crate::middleware::Middleware;

/// Logs requests whose latency exceeds a threshold.
///
/// The timer starts when the request enters the middleware and stops when the
/// response has been fully sent. The request itself is never altered or
/// delayed; the log line, if any, is written after the response went out.
pub struct LatencyMiddleware {
    config: Arc<LatencyConfig>,
    sink: Arc<dyn Sink>,
}

impl LatencyMiddleware {
    /// Create the middleware and the sink described by `config.logging`.
    pub fn new(config: LatencyConfig) -> Self {
        let sink = configure_sink(&config.logging);
        Self::with_sink(config, sink)
    }

    /// Create the middleware around an existing sink. `config.logging` only
    /// contributes the level.
    pub fn with_sink(config: LatencyConfig, sink: Arc<dyn Sink>) -> Self {
        Self {
            config: Arc::new(config),
            sink,
        }
    }

    pub fn config(&self) -> &LatencyConfig {
        &self.config
    }
}

impl Default for LatencyMiddleware {
    fn default() -> Self {
        Self::new(LatencyConfig::default())
    }
}

/// Strictly slower than the threshold; equal is not slow.
pub fn is_slow(elapsed_ms: f64, threshold_ms: f64) -> bool {
    elapsed_ms > threshold_ms
}

pub fn slow_request_message(method: &str, url: &str, elapsed_ms: f64, threshold_ms: f64) -> String {
    format!(
        "Slow Request found => {}:{} took: {:.2} milliseconds (threshold: {}ms)",
        method, url, elapsed_ms, threshold_ms
    )
}

fn report(sink: &dyn Sink, level: Level, message: &str) {
    match level {
        Level::Info => sink.info(message),
        Level::Warn => sink.warn(message),
        Level::Error => sink.error(message),
    }
}

#[async_trait]
impl Middleware for LatencyMiddleware {
    async fn handle(&self, req: Request, next: Arc<dyn Handler>) -> Response {
        let start = Instant::now();
        let method = req.method().clone();
        let url = req.original_url().to_string();

        let mut res = next.handle(req).await;

        let config = Arc::clone(&self.config);
        let sink = Arc::clone(&self.sink);
        res.on_complete(move || {
            let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
            let threshold_ms = config.threshold_for(method.as_str());
            if !is_slow(elapsed_ms, threshold_ms) {
                return;
            }
            let message = slow_request_message(method.as_str(), &url, elapsed_ms, threshold_ms);
            report(sink.as_ref(), config.logging.level, &message);
        });

        res
    }
}
