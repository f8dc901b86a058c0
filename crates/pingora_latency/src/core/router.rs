use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::{Method, Request, Response};

#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, req: Request) -> Response;
}

/// Adapter for plain closures used as route handlers
pub struct FnHandler<F>
where
    F: Fn(Request) -> Response + Send + Sync + 'static,
{
    closure: F,
}

impl<F> FnHandler<F>
where
    F: Fn(Request) -> Response + Send + Sync + 'static,
{
    pub fn new(closure: F) -> Self {
        Self { closure }
    }
}

#[async_trait]
impl<F> Handler for FnHandler<F>
where
    F: Fn(Request) -> Response + Send + Sync + 'static,
{
    async fn handle(&self, req: Request) -> Response {
        (self.closure)(req)
    }
}

pub struct Router {
    by_method: HashMap<String, matchit::Router<Arc<dyn Handler>>>,
}

impl Router {
    pub fn new() -> Self {
        Self {
            by_method: HashMap::new(),
        }
    }

    /// Register a route.
    ///
    /// # Panics
    ///
    /// Panics if `path` is not a valid matchit pattern or conflicts with an
    /// existing route for the same method.
    pub fn add<S: Into<String>>(&mut self, method: Method, path: S, handler: Arc<dyn Handler>) {
        let r = self.by_method.entry(method.as_str().to_string()).or_default();
        r.insert(path.into(), handler).expect("valid route");
    }

    pub fn get<S: Into<String>>(&mut self, path: S, handler: Arc<dyn Handler>) {
        self.add(Method::GET, path, handler)
    }

    pub fn post<S: Into<String>>(&mut self, path: S, handler: Arc<dyn Handler>) {
        self.add(Method::POST, path, handler)
    }

    pub fn get_fn<S, F>(&mut self, path: S, handler: F)
    where
        S: Into<String>,
        F: Fn(Request) -> Response + Send + Sync + 'static,
    {
        self.add(Method::GET, path, Arc::new(FnHandler::new(handler)))
    }

    pub fn post_fn<S, F>(&mut self, path: S, handler: F)
    where
        S: Into<String>,
        F: Fn(Request) -> Response + Send + Sync + 'static,
    {
        self.add(Method::POST, path, Arc::new(FnHandler::new(handler)))
    }

    pub fn find(
        &self,
        method: &Method,
        path: &str,
    ) -> Option<(Arc<dyn Handler>, HashMap<String, String>)> {
        if let Some(found) = self.lookup(method, path) {
            return Some(found);
        }

        // HEAD behaves like GET without a body when no explicit HEAD route exists
        if *method == Method::HEAD {
            return self.lookup(&Method::GET, path);
        }

        None
    }

    fn lookup(
        &self,
        method: &Method,
        path: &str,
    ) -> Option<(Arc<dyn Handler>, HashMap<String, String>)> {
        let m = self.by_method.get(method.as_str())?.at(path).ok()?;
        let params = m
            .params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Some((Arc::clone(m.value), params))
    }

    /// Methods that have a route matching `path`, sorted (for 405 responses)
    pub fn allowed_methods(&self, path: &str) -> Vec<String> {
        let mut methods: Vec<String> = self
            .by_method
            .iter()
            .filter(|(_, r)| r.at(path).is_ok())
            .map(|(m, _)| m.clone())
            .collect();
        methods.sort();
        methods
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::response::Body;

    struct HelloHandler;

    #[async_trait]
    impl Handler for HelloHandler {
        async fn handle(&self, req: Request) -> Response {
            let name = req.param("name").unwrap_or("world");
            Response::text(200, format!("hi {}", name))
        }
    }

    fn body_text(res: Response) -> String {
        match res.body {
            Body::Bytes(b) => String::from_utf8(b.to_vec()).unwrap(),
            _ => panic!("unexpected streaming body"),
        }
    }

    #[tokio::test]
    async fn matchit_basic_param() {
        let mut r = Router::new();
        r.get("/hi/{name}", Arc::new(HelloHandler));

        let (h, params) = r.find(&Method::GET, "/hi/alice").expect("found");
        let req = Request::new(Method::GET, "/hi/alice").with_params(params);
        assert_eq!(body_text(h.handle(req).await), "hi alice");
    }

    #[tokio::test]
    async fn head_falls_back_to_get() {
        let mut r = Router::new();
        r.get_fn("/ping", |_req| Response::text(200, "pong"));

        let (h, _) = r.find(&Method::HEAD, "/ping").expect("found");
        let res = h.handle(Request::new(Method::HEAD, "/ping")).await;
        assert_eq!(res.status.as_u16(), 200);
        assert!(r.find(&Method::DELETE, "/ping").is_none());
    }

    #[test]
    fn allowed_methods_are_sorted() {
        let mut r = Router::new();
        r.post_fn("/items", |_req| Response::empty(201));
        r.get_fn("/items", |_req| Response::empty(200));

        assert_eq!(r.allowed_methods("/items"), vec!["GET", "POST"]);
        assert!(r.allowed_methods("/nothing").is_empty());
    }
}
