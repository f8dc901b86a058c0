use std::sync::Arc;

use async_trait::async_trait;

use crate::core::{Handler, Request, Response};

/// Middleware trait for processing requests
#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    /// Process the request, optionally calling the next handler
    async fn handle(&self, req: Request, next: Arc<dyn Handler>) -> Response;
}

/// Binds one middleware to the handler it wraps
struct MiddlewareHandler {
    middleware: Arc<dyn Middleware>,
    next: Arc<dyn Handler>,
}

#[async_trait]
impl Handler for MiddlewareHandler {
    async fn handle(&self, req: Request) -> Response {
        self.middleware.handle(req, Arc::clone(&self.next)).await
    }
}

/// Compose middlewares around a final handler.
///
/// Onion model: the first registered middleware is the outermost layer.
pub fn compose(
    middlewares: &[Arc<dyn Middleware>],
    final_handler: Arc<dyn Handler>,
) -> Arc<dyn Handler> {
    middlewares
        .iter()
        .rev()
        .fold(final_handler, |next, middleware| -> Arc<dyn Handler> {
            Arc::new(MiddlewareHandler {
                middleware: Arc::clone(middleware),
                next,
            })
        })
}
