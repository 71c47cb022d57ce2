use axum::{
    body::Body,
    extract::Path,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use bytes::Bytes;
use http_logging::{
    EventLogger, HttpLoggingLayer, LoggingConfig, MemorySink, MultiSink, TracingSink,
};
use std::time::Duration;
use tokio::{net::TcpListener, time::sleep};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
#[error("item {0} does not exist")]
struct MissingItem(u32);

// Demo handlers
async fn hello_handler() -> impl IntoResponse {
    sleep(Duration::from_millis(100)).await; // Simulate some work
    "Hello, World!"
}

async fn echo_handler(body: Bytes) -> impl IntoResponse {
    sleep(Duration::from_millis(50)).await;
    format!("Echo: {}", String::from_utf8_lossy(&body))
}

async fn item_handler(logger: EventLogger, Path(id): Path<u32>) -> Response {
    let lookup = logger
        .advise("find_item")
        .before()
        .returning()
        .throwing()
        .trace_async(async move {
            sleep(Duration::from_millis(5)).await;
            if id < 100 {
                Ok(format!(r#"{{"id":{id},"name":"item-{id}"}}"#))
            } else {
                Err(MissingItem(id))
            }
        })
        .await;

    match lookup {
        Ok(json) => ([("content-type", "application/json")], json).into_response(),
        Err(e) => (StatusCode::NOT_FOUND, e.into_inner().to_string()).into_response(),
    }
}

async fn streaming_handler() -> impl IntoResponse {
    use futures::stream;
    use tokio::time::interval;

    let stream = stream::unfold(0u32, |count| async move {
        if count >= 5 {
            None
        } else {
            let mut interval = interval(Duration::from_millis(200));
            interval.tick().await;
            Some((
                Ok::<_, std::convert::Infallible>(Bytes::from(format!("chunk-{count}\n"))),
                count + 1,
            ))
        }
    });

    Response::builder()
        .header("content-type", "text/plain")
        .body(Body::from_stream(stream))
        .unwrap()
}

async fn stats_handler(records: MemorySink) -> impl IntoResponse {
    let records = records.records();
    axum::Json(serde_json::json!({
        "total_records": records.len(),
        "records": records
            .iter()
            .map(|r| serde_json::json!({
                "severity": r.severity.as_str(),
                "message": r.message,
            }))
            .collect::<Vec<_>>()
    }))
}

/// Reads the logging configuration from `HTTP_LOGGING_CONFIG` (JSON), falling back to
/// full detail at INFO.
fn load_config() -> anyhow::Result<LoggingConfig> {
    match std::env::var("HTTP_LOGGING_CONFIG") {
        Ok(raw) => Ok(serde_json::from_str(&raw)?),
        Err(_) => Ok(LoggingConfig {
            log_request_headers: true,
            log_response_headers: true,
            log_request_body: true,
            log_response_body: true,
            ..LoggingConfig::default()
        }),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG overrides the default filter, e.g. RUST_LOG=http_logging=info
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .init();

    info!("Starting http logging demo server");

    let config = load_config()?;
    info!(level = %config.level, enabled = config.enabled, "Loaded logging configuration");

    // Records go to tracing and to an in-memory buffer served on /stats
    let memory = MemorySink::new();
    let sink = MultiSink::new().with(TracingSink).with(memory.clone());
    let logger = EventLogger::new(config, sink);

    let item_logger = logger.clone();
    let mut app = Router::new()
        .route("/hello", get(hello_handler))
        .route("/echo", post(echo_handler))
        .route(
            "/items/{id}",
            get(move |path| item_handler(item_logger.clone(), path)),
        )
        .route("/streaming", get(streaming_handler))
        .route("/stats", get(move || stats_handler(memory.clone())));

    if logger.is_enabled() {
        app = app.layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(HttpLoggingLayer::from_logger(logger))
                .into_inner(),
        );
    }

    info!("Demo server endpoints:");
    info!("  GET  /hello       - Simple greeting");
    info!("  POST /echo        - Echo request body");
    info!("  GET  /items/{{id}}  - Traced lookup, ids >= 100 fail");
    info!("  GET  /streaming   - Streaming response");
    info!("  GET  /stats       - Records captured so far");
    info!("");
    info!("Try these commands:");
    info!("  curl http://localhost:3000/hello");
    info!("  curl -X POST -d 'Hello from client' http://localhost:3000/echo");
    info!("  curl -H 'X-Trace: abc' http://localhost:3000/items/42");
    info!("  curl http://localhost:3000/items/404");
    info!("  curl http://localhost:3000/streaming");
    info!("  curl http://localhost:3000/stats");

    let listener = TcpListener::bind("0.0.0.0:3000").await?;
    info!("Demo server listening on http://localhost:3000");

    axum::serve(listener, app).await?;

    Ok(())
}
