//! Slow-request logging for Pingora-based HTTP services.
//!
//! [`LatencyMiddleware`] times every request from the moment it enters the
//! middleware chain until its response has been fully written to the client,
//! and writes one line to a log file (and optionally the console) for each
//! request slower than the configured threshold:
//!
//! ```text
//! [2024-05-01T12:00:00.123Z] [WARN] Slow Request found => GET:/reports took: 212.48 milliseconds (threshold: 150ms)
//! ```
//!
//! ```no_run
//! use pingora_latency::{App, LatencyConfig, LatencyMiddleware, LoggingConfig, Response, Router};
//!
//! let mut router = Router::new();
//! router.get_fn("/", |_req| Response::text(200, "ok"));
//!
//! let mut app = App::new(router);
//! app.use_middleware(LatencyMiddleware::new(
//!     LatencyConfig::new()
//!         .threshold_ms(150.0)
//!         .custom_threshold("POST", 400.0)
//!         .logging(LoggingConfig::new().level("error").destination_path("logs/slow.log")),
//! ));
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod middleware;

pub use config::{LatencyConfig, LatencyOptions, LoggingConfig, LoggingOptions};
pub use crate::core::*;
pub use error::{ConfigError, SinkError};
pub use http::StatusCode;
pub use logging::*;
pub use middleware::*;

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use http::Response as HttpResponse;
use pingora::protocols::http::ServerSession;
use pingora::server::ShutdownWatch;
use pingora::services::listening::Service;
use pingora_core::apps::{HttpPersistentSettings, HttpServerApp, HttpServerOptions, ReusedHttpStream};
use pingora_http::ResponseHeader;

/// The application: a router plus the middleware chain wrapped around it.
pub struct App {
    router: Router,
    pub(crate) middlewares: Vec<Arc<dyn Middleware>>,
}

struct NotFoundHandler;

#[async_trait]
impl Handler for NotFoundHandler {
    async fn handle(&self, _req: Request) -> Response {
        Response::text(404, "Not Found")
    }
}

impl App {
    pub fn new(router: Router) -> Self {
        Self {
            router,
            middlewares: Vec::new(),
        }
    }

    /// Add a middleware. The first one added is the outermost layer.
    pub fn use_middleware<M: Middleware + 'static>(&mut self, middleware: M) {
        self.middlewares.push(Arc::new(middleware));
    }

    /// Wrap the app in a Pingora listening service.
    pub fn to_service(self, name: &str) -> Service<App> {
        Service::new(name.to_string(), self)
    }

    /// Handle a request end-to-end through middlewares and the router.
    ///
    /// The returned response still carries its completion observers; the
    /// server fires them once the response is on the wire. Callers driving
    /// the app in-process use [`Response::complete`].
    pub async fn handle(&self, req: Request) -> Response {
        let Some((handler, params)) = self.router.find(req.method(), req.path()) else {
            let fallback = self.fallback(req.path());
            return self.run(fallback, req).await;
        };
        self.run(handler, req.with_params(params)).await
    }

    /// 405 with an `Allow` header when another method matches the path, else 404.
    fn fallback(&self, path: &str) -> Arc<dyn Handler> {
        let allowed = self.router.allowed_methods(path);
        if allowed.is_empty() {
            return Arc::new(NotFoundHandler);
        }
        let allow = allowed.join(", ");
        Arc::new(FnHandler::new(move |_req| {
            Response::text(405, "Method Not Allowed").header(http::header::ALLOW, allow.as_str())
        }))
    }

    async fn run(&self, handler: Arc<dyn Handler>, req: Request) -> Response {
        let entry = compose(&self.middlewares, handler);
        let mut response = entry.handle(req).await;
        finalize_response_headers(&mut response);
        response
    }
}

/// Set content-length or transfer-encoding unless the handler already did.
fn finalize_response_headers(response: &mut Response) {
    if response.headers.contains_key(http::header::CONTENT_LENGTH)
        || response.headers.contains_key(http::header::TRANSFER_ENCODING)
    {
        return;
    }

    match &response.body {
        Body::Bytes(bytes) => {
            let len = http::HeaderValue::from(bytes.len());
            response.headers.insert(http::header::CONTENT_LENGTH, len);
        }
        Body::Stream(_) => {
            response.headers.insert(
                http::header::TRANSFER_ENCODING,
                http::HeaderValue::from_static("chunked"),
            );
        }
    }
}

#[async_trait]
impl HttpServerApp for App {
    async fn process_new_http(
        self: &Arc<Self>,
        mut http: ServerSession,
        shutdown: &ShutdownWatch,
    ) -> Option<ReusedHttpStream> {
        if !(http.read_request().await.ok()?) {
            return None;
        }
        if *shutdown.borrow() {
            http.set_keepalive(None);
        } else {
            http.set_keepalive(Some(60));
        }

        let reqh = http.req_header();
        let target = String::from_utf8_lossy(reqh.raw_path()).to_string();
        let is_head = reqh.method == Method::HEAD;

        let mut req = Request::new(reqh.method.clone(), target);
        for (name, value) in reqh.headers.iter() {
            req.headers_mut().append(name.clone(), value.clone());
        }

        if !is_head {
            let has_te = req.headers().contains_key(http::header::TRANSFER_ENCODING);
            let has_len = req
                .headers()
                .get(http::header::CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(0)
                > 0;
            if (has_te || has_len)
                && let Ok(Some(bytes)) = http.read_request_body().await
            {
                req = req.with_body(bytes);
            }
        }

        let mut res = self.handle(req).await;
        // Dropped unfired if the response does not make it out in full
        let mut completion = res.take_completion();

        let mut builder = HttpResponse::builder().status(res.status);
        for (k, v) in res.headers.iter() {
            builder = builder.header(k, v);
        }
        let (parts, _) = builder.body(()).ok()?.into_parts();
        let resp_header: ResponseHeader = parts.into();
        if http
            .write_response_header(Box::new(resp_header))
            .await
            .is_err()
        {
            return None;
        }

        let written = if is_head {
            true
        } else {
            match res.body {
                Body::Bytes(bytes) => http.write_response_body(bytes, true).await.is_ok(),
                Body::Stream(mut s) => {
                    let mut ok = true;
                    while let Some(chunk) = s.next().await {
                        if http.write_response_body(chunk, false).await.is_err() {
                            ok = false;
                            break;
                        }
                    }
                    ok
                }
            }
        };
        if !written {
            tracing::debug!(pending = completion.len(), "response body write failed, skipping completion hooks");
            return None;
        }

        // finish() flushes buffered output and terminates the body
        let persistent_settings = HttpPersistentSettings::for_session(&http);
        match http.finish().await {
            Ok(reusable) => {
                completion.fire();
                reusable.map(|s| ReusedHttpStream::new(s, Some(persistent_settings)))
            }
            Err(e) => {
                tracing::debug!(error = %e, pending = completion.len(), "response not finished, skipping completion hooks");
                None
            }
        }
    }

    fn h2_options(&self) -> Option<pingora::protocols::http::v2::server::H2Options> {
        None
    }

    fn server_options(&self) -> Option<&HttpServerOptions> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::sync::watch;

    struct SleepHandler(Duration);

    #[async_trait]
    impl Handler for SleepHandler {
        async fn handle(&self, req: Request) -> Response {
            tokio::time::sleep(self.0).await;
            Response::text(200, format!("{} done", req.path()))
        }
    }

    fn sleeping(ms: u64) -> Arc<dyn Handler> {
        Arc::new(SleepHandler(Duration::from_millis(ms)))
    }

    fn file_logging(path: &Path) -> LoggingConfig {
        LoggingConfig::new()
            .destination_path(path)
            .console_enabled(false)
    }

    async fn send(app: &App, method: Method, target: &str) -> Response {
        let mut res = app.handle(Request::new(method, target)).await;
        res.complete();
        res
    }

    fn log_path(dir: &tempfile::TempDir) -> PathBuf {
        dir.path().join("slow-requests.log")
    }

    #[tokio::test(start_paused = true)]
    async fn slow_request_lands_in_the_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = log_path(&dir);
        let mut router = Router::new();
        router.get("/threshold-only", sleeping(200));
        let mut app = App::new(router);
        app.use_middleware(LatencyMiddleware::new(
            LatencyConfig::new()
                .threshold_ms(150.0)
                .logging(LoggingConfig::new().destination_path(&path)),
        ));

        let res = send(&app, Method::GET, "/threshold-only").await;
        assert_eq!(res.status.as_u16(), 200);

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("Slow Request found"));
        assert!(content.contains("/threshold-only"));
        assert!(content.contains("[WARN]"));
    }

    #[tokio::test(start_paused = true)]
    async fn fast_request_creates_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = log_path(&dir);
        let mut router = Router::new();
        router.get("/fast", sleeping(10));
        let mut app = App::new(router);
        app.use_middleware(LatencyMiddleware::new(
            LatencyConfig::new()
                .threshold_ms(1000.0)
                .logging(file_logging(&path).level("info")),
        ));

        send(&app, Method::GET, "/fast").await;
        assert!(!path.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn per_method_thresholds_in_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = log_path(&dir);
        let mut router = Router::new();
        router.get("/custom-get", sleeping(30));
        router.post("/custom-post", sleeping(20));
        let mut app = App::new(router);
        app.use_middleware(LatencyMiddleware::new(
            LatencyConfig::new()
                .threshold_ms(1000.0)
                .custom_threshold("GET", 20.0)
                .custom_threshold("POST", 10.0)
                .logging(file_logging(&path).level("info")),
        ));

        send(&app, Method::GET, "/custom-get").await;
        send(&app, Method::POST, "/custom-post").await;

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("[INFO] Slow Request found => GET:/custom-get"));
        assert!(lines[1].contains("[INFO] Slow Request found => POST:/custom-post"));
    }

    #[tokio::test(start_paused = true)]
    async fn level_tags_follow_configuration() {
        for (level, tag) in [("error", "[ERROR]"), ("info", "[INFO]"), ("nonsense", "[WARN]")] {
            let dir = tempfile::tempdir().unwrap();
            let path = log_path(&dir);
            let mut router = Router::new();
            router.get("/level-test", sleeping(30));
            let mut app = App::new(router);
            app.use_middleware(LatencyMiddleware::new(
                LatencyConfig::new()
                    .threshold_ms(10.0)
                    .logging(file_logging(&path).level(level)),
            ));

            send(&app, Method::GET, "/level-test").await;
            let content = std::fs::read_to_string(&path).unwrap();
            assert!(content.contains(tag), "level {level}: {content}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_logging_creates_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = log_path(&dir);
        let mut router = Router::new();
        router.get("/disabled", sleeping(30));
        let mut app = App::new(router);
        app.use_middleware(LatencyMiddleware::new(
            LatencyConfig::new()
                .threshold_ms(10.0)
                .logging(file_logging(&path).level("info").enabled(false)),
        ));

        let res = send(&app, Method::GET, "/disabled").await;
        assert_eq!(res.status.as_u16(), 200);
        assert!(!path.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn independent_installations_keep_their_own_config() {
        let dir = tempfile::tempdir().unwrap();
        let strict = dir.path().join("strict.log");
        let relaxed = dir.path().join("relaxed.log");

        let mut router = Router::new();
        router.get("/report", sleeping(80));
        let mut app = App::new(router);
        app.use_middleware(LatencyMiddleware::new(
            LatencyConfig::new().threshold_ms(50.0).logging(file_logging(&strict)),
        ));
        app.use_middleware(LatencyMiddleware::new(
            LatencyConfig::new().threshold_ms(500.0).logging(file_logging(&relaxed)),
        ));

        send(&app, Method::GET, "/report").await;
        assert!(strict.exists());
        assert!(!relaxed.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn query_string_is_part_of_the_logged_url() {
        let dir = tempfile::tempdir().unwrap();
        let path = log_path(&dir);
        let mut router = Router::new();
        router.get("/search", sleeping(30));
        let mut app = App::new(router);
        app.use_middleware(LatencyMiddleware::new(
            LatencyConfig::new().threshold_ms(10.0).logging(file_logging(&path)),
        ));

        send(&app, Method::GET, "/search?q=slow").await;
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("GET:/search?q=slow took: "));
    }

    #[tokio::test]
    async fn unknown_route_is_404_and_wrong_method_is_405() {
        let mut router = Router::new();
        router.get_fn("/only-get", |_req| Response::text(200, "ok"));
        let app = App::new(router);

        let res = send(&app, Method::GET, "/missing").await;
        assert_eq!(res.status.as_u16(), 404);

        let res = send(&app, Method::POST, "/only-get").await;
        assert_eq!(res.status.as_u16(), 405);
        assert_eq!(
            res.headers.get(http::header::ALLOW).and_then(|v| v.to_str().ok()),
            Some("GET")
        );
    }

    #[tokio::test]
    async fn app_sets_content_length() {
        let mut router = Router::new();
        router.get_fn("/text", |_req| Response::text(200, "hello world"));
        router.get_fn("/manual", |_req| Response::text(200, "hello").header("content-length", "999"));
        let app = App::new(router);

        let res = send(&app, Method::GET, "/text").await;
        assert_eq!(
            res.headers
                .get(http::header::CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok()),
            Some("11")
        );

        let res = send(&app, Method::GET, "/manual").await;
        assert_eq!(
            res.headers
                .get(http::header::CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok()),
            Some("999")
        );
    }

    #[derive(Default)]
    struct RecordingSink(Mutex<Vec<String>>);

    impl RecordingSink {
        fn entries(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    impl Sink for RecordingSink {
        fn emit(&self, _level: Level, message: &str) {
            self.0.lock().unwrap().push(message.to_string());
        }
    }

    /// Every completed request counts as slow, so each fired hook shows up in the sink.
    fn served_app(sink: Arc<RecordingSink>) -> Arc<App> {
        let mut router = Router::new();
        router.get("/slow", sleeping(30));
        router.get_fn("/short-body", |_req| {
            Response::text(200, "hello").header("content-length", "999")
        });
        router.get_fn("/stream", |_req| {
            let chunks = futures::stream::iter((0..256).map(|_| Bytes::from_static(&[b'x'; 64])));
            Response::stream(200, chunks.boxed())
        });
        let mut app = App::new(router);
        app.use_middleware(LatencyMiddleware::with_sink(
            LatencyConfig::new().threshold_ms(0.0),
            sink,
        ));
        Arc::new(app)
    }

    #[tokio::test]
    async fn served_request_emits_once_after_the_response_is_written() {
        let sink = Arc::new(RecordingSink::default());
        let app = served_app(sink.clone());
        let (mut client, server) = tokio::io::duplex(4096);
        client
            .write_all(b"GET /slow?from=wire HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();

        let (_tx, shutdown) = watch::channel(false);
        let session = ServerSession::new_http1(Box::new(server));
        app.process_new_http(session, &shutdown).await;

        let mut buf = vec![0u8; 1024];
        let n = client.read(&mut buf).await.unwrap();
        let wire = String::from_utf8_lossy(&buf[..n]);
        assert!(wire.starts_with("HTTP/1.1 200"), "{wire}");
        assert!(wire.contains("/slow done"), "{wire}");

        let entries = sink.entries();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].contains("GET:/slow?from=wire took: "));
    }

    #[tokio::test]
    async fn client_leaving_mid_stream_emits_nothing() {
        let sink = Arc::new(RecordingSink::default());
        let app = served_app(sink.clone());
        let (mut client, server) = tokio::io::duplex(256);
        client
            .write_all(b"GET /stream HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();

        let (_tx, shutdown) = watch::channel(false);
        let serving = tokio::spawn(async move {
            let session = ServerSession::new_http1(Box::new(server));
            app.process_new_http(session, &shutdown).await.is_some()
        });

        let mut buf = [0u8; 128];
        let n = client.read(&mut buf).await.unwrap();
        assert!(String::from_utf8_lossy(&buf[..n]).starts_with("HTTP/1.1 200"));
        drop(client);

        assert!(!serving.await.unwrap());
        assert!(sink.entries().is_empty());
    }

    #[tokio::test]
    async fn body_shorter_than_content_length_emits_nothing() {
        let sink = Arc::new(RecordingSink::default());
        let app = served_app(sink.clone());
        let (mut client, server) = tokio::io::duplex(4096);
        client
            .write_all(b"GET /short-body HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();

        let (_tx, shutdown) = watch::channel(false);
        let session = ServerSession::new_http1(Box::new(server));
        let reused = app.process_new_http(session, &shutdown).await;

        assert!(reused.is_none());
        assert!(sink.entries().is_empty());
    }
}
