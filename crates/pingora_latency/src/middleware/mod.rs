#![allow(clippy::module_inception)]
pub mod latency_middleware;
pub mod middleware;

pub use latency_middleware::LatencyMiddleware;
pub use middleware::{Middleware, compose};
