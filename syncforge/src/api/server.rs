//! API server setup.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::analysis::MediaAnalyzer;
use crate::api::routes;
use crate::media::MediaRunner;
use crate::storage::{AssetFetcher, ObjectStorage};
use crate::Result;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Server start time for uptime reporting.
    pub start_time: Instant,
    pub analyzer: Arc<MediaAnalyzer>,
    pub fetcher: Arc<dyn AssetFetcher>,
    pub media: Arc<dyn MediaRunner>,
    pub storage: Arc<dyn ObjectStorage>,
    /// Optional bearer gate on the analyzer endpoint.
    pub webhook_shared_secret: Option<String>,
    /// CORS allow-list; empty means wildcard.
    pub cors_origins: Vec<String>,
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .max_age(std::time::Duration::from_secs(3600));

    if origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "Ignoring unparsable CORS origin");
                None
            }
        })
        .collect();

    if parsed.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(parsed)
    }
}

/// Build the router.
pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.cors_origins);

    Router::new()
        .route("/", post(routes::analyze::analyze))
        .route("/preview", post(routes::preview::preview))
        .route("/health", get(routes::health::health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve until the shutdown token fires.
///
/// Non-JSON request bodies are rejected by the JSON extractor before a
/// handler runs.
pub async fn serve(
    state: AppState,
    bind_address: &str,
    port: u16,
    shutdown: CancellationToken,
) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", bind_address, port)
        .parse()
        .map_err(|e| crate::Error::config(format!("Invalid bind address: {}", e)))?;

    let app = router(state);
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "API server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn test_state(secret: Option<&str>) -> AppState {
        let fetcher = Arc::new(FakeAssetFetcher::new());
        let media = Arc::new(FakeMediaRunner::new(8.0));
        let jobs = Arc::new(InMemoryJobRepository::new());
        let generations = Arc::new(InMemoryGenerationRepository::new());
        let analyzer = Arc::new(MediaAnalyzer::new(
            fetcher.clone(),
            media.clone(),
            jobs,
            generations,
        ));

        AppState {
            start_time: Instant::now(),
            analyzer,
            fetcher,
            media,
            storage: Arc::new(FakeObjectStorage::new()),
            webhook_shared_secret: secret.map(String::from),
            cors_origins: Vec::new(),
        }
    }

    fn json_post(uri: &str, body: &str, bearer: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(bearer) = bearer {
            builder = builder.header("authorization", format!("Bearer {}", bearer));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = router(test_state(None));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_analyzer_gate_rejects_bad_bearer() {
        let app = router(test_state(Some("s3cret")));
        let body = r#"{"video": "https://x/v.mp4", "audio": "https://x/a.wav"}"#;

        let response = app
            .clone()
            .oneshot(json_post("/", body, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .oneshot(json_post("/", body, Some("wrong")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_analyzer_rejects_invalid_urls() {
        let app = router(test_state(None));

        let response = app
            .clone()
            .oneshot(json_post(
                "/",
                r#"{"video": "file:///etc/passwd", "audio": "https://x/a.wav"}"#,
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(json_post("/", r#"{"audio": "https://x/a.wav"}"#, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_analyzer_rejects_out_of_range_bpm() {
        let app = router(test_state(None));
        let response = app
            .oneshot(json_post(
                "/",
                r#"{"video": "https://x/v.mp4", "audio": "https://x/a.wav", "bpm": 500}"#,
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
