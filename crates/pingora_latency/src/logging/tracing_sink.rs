use tracing::{error, info, warn};

use crate::logging::{Level, Sink};

/// A sink that forwards slow-request messages to the `tracing` ecosystem
/// instead of writing its own file.
#[derive(Debug, Clone, Default)]
pub struct TracingSink;

impl TracingSink {
    pub fn new() -> Self {
        Self
    }
}

impl Sink for TracingSink {
    fn emit(&self, level: Level, message: &str) {
        match level {
            Level::Error => error!(target: "slow_request", "{}", message),
            Level::Warn => warn!(target: "slow_request", "{}", message),
            Level::Info => info!(target: "slow_request", "{}", message),
        }
    }
}
