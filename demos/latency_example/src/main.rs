use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, stream};
use pingora::server::Server;
use pingora_latency::{
    App, Handler, LatencyConfig, LatencyMiddleware, LoggingConfig, Request, Response, Router,
    TracingSink,
};
use tracing_subscriber::EnvFilter;

// Sleeps for `/delay/<n>` or `?ms=<n>` milliseconds (default 250) before answering
struct DelayHandler;

#[async_trait]
impl Handler for DelayHandler {
    async fn handle(&self, req: Request) -> Response {
        let ms = req
            .param("ms")
            .or_else(|| {
                req.uri()
                    .query()
                    .and_then(|q| q.split('&').find_map(|kv| kv.strip_prefix("ms=")))
            })
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(250);
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Response::text(200, format!("slept {ms}ms"))
    }
}

// Streams 20 chunks, 10ms apart; latency covers the whole body
struct StreamHandler;

#[async_trait]
impl Handler for StreamHandler {
    async fn handle(&self, _req: Request) -> Response {
        let s = stream::unfold(0u32, |i| async move {
            if i >= 20 {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            Some((Bytes::from(format!("chunk-{}\n", i + 1)), i + 1))
        });
        Response::stream(200, s.boxed()).header("content-type", "text/plain; charset=utf-8")
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let mut router = Router::new();
    router.get_fn("/", |_req| Response::text(200, "ok"));
    router.get("/delay", Arc::new(DelayHandler));
    router.post("/delay", Arc::new(DelayHandler));
    router.get("/delay/{ms}", Arc::new(DelayHandler));
    router.get("/stream", Arc::new(StreamHandler));

    let config = match std::env::var("LATENCY_CONFIG") {
        Ok(json) => match LatencyConfig::from_json(&json) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("{e}");
                std::process::exit(2);
            }
        },
        Err(_) => LatencyConfig::new()
            .threshold_ms(150.0)
            .custom_threshold("POST", 50.0)
            .logging(
                LoggingConfig::new()
                    .level("warn")
                    .destination_path("logs/slow-requests.log"),
            ),
    };

    let mut app = App::new(router);
    app.use_middleware(LatencyMiddleware::new(config));
    // second installation: very slow requests also go through tracing
    app.use_middleware(LatencyMiddleware::with_sink(
        LatencyConfig::new()
            .threshold_ms(1000.0)
            .logging(LoggingConfig::new().level("error")),
        Arc::new(TracingSink::new()),
    ));

    tracing::info!("latency example listening on http://localhost:8080");
    tracing::info!("try: /delay?ms=300, /delay/400, POST /delay?ms=80, /stream");

    if let Err(e) = run_server(app, "0.0.0.0:8080") {
        eprintln!("Pingora server error: {e}");
    }
}

fn run_server(app: App, addr: &str) -> std::io::Result<()> {
    let mut server = Server::new(None).map_err(|e| std::io::Error::other(e.to_string()))?;
    server.bootstrap();

    let mut service = app.to_service("Latency Example HTTP");
    service.add_tcp(addr);
    server.add_service(service);

    server.run_forever()
}
