//! Skin Flow HTTP Server
//!
//! Same-origin relay for the upstream APIs plus the onboarding pages.
//!
//! ## Endpoints
//! - POST /api/submit - Relay identity `{name, location}`
//! - POST /api/proxy - Relay image classification `{Image}`
//! - GET /api/health - Health check

use axum::{
    body::Bytes,
    extract::State,
    http::{Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::Config;
use crate::flow::StepFlowController;
use crate::gateway::{ClassificationGateway, Endpoint, GatewayError};
use crate::session::{Session, SessionRegistry};
use crate::submission::ImageSubmission;

/// Per-browser state
#[derive(Default)]
pub struct Client {
    pub session: Session,
    /// Live only while the user is on the introduction page
    pub flow: tokio::sync::Mutex<Option<StepFlowController>>,
    /// Token of the upload in progress, if any
    pub upload: std::sync::Mutex<Option<CancellationToken>>,
}

impl Client {
    /// Cancel whatever upload is running and register a new one
    pub fn start_upload(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let mut slot = self.upload.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = slot.replace(token.clone()) {
            previous.cancel();
        }
        token
    }

    pub fn cancel_upload(&self) {
        if let Some(token) = self.upload.lock().unwrap_or_else(|e| e.into_inner()).take() {
            token.cancel();
        }
    }
}

/// Server state
pub struct AppState {
    pub config: Config,
    pub gateway: Arc<dyn ClassificationGateway>,
    pub submission: ImageSubmission,
    pub clients: SessionRegistry<Client>,
}

impl AppState {
    pub fn new(config: Config, gateway: Arc<dyn ClassificationGateway>) -> Self {
        let submission =
            ImageSubmission::new(gateway.clone()).with_min_duration(config.min_loading);
        let clients = SessionRegistry::new(config.max_sessions);
        Self {
            config,
            gateway,
            submission,
            clients,
        }
    }
}

/// Create the router
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    let api = Router::new()
        .route("/submit", post(submit_handler))
        .route("/proxy", post(proxy_handler))
        .route("/health", get(health_handler));

    let web = crate::web_ui::create_web_router();

    Router::new()
        .nest("/api", api)
        .merge(web)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Relay identity. Upstream status and body pass through untouched.
async fn submit_handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let body: Value = match serde_json::from_slice(&body) {
        Ok(body) => body,
        Err(e) => {
            warn!("Unreadable identity body: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "An unexpected error occurred" })),
            )
                .into_response();
        }
    };

    match state.gateway.relay(Endpoint::Identity, body).await {
        Ok(relayed) => {
            let status = StatusCode::from_u16(relayed.status).unwrap_or(StatusCode::OK);
            (status, Json(relayed.body)).into_response()
        }
        Err(e) => identity_error(&e),
    }
}

fn identity_error(e: &GatewayError) -> Response {
    let status = e
        .status()
        .and_then(|s| StatusCode::from_u16(s).ok())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        Json(json!({ "error": e.to_string(), "details": e.details() })),
    )
        .into_response()
}

/// Relay image classification. Every failure, including a reply that isn't
/// JSON, collapses to one 500.
async fn proxy_handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let relayed = match serde_json::from_slice::<Value>(&body) {
        Ok(body) => state
            .gateway
            .relay(Endpoint::Classify, body)
            .await
            .map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    }
    .and_then(|relayed| {
        if relayed.is_json() {
            Ok(relayed)
        } else {
            Err(format!("non-JSON upstream reply ({} bytes)", relayed.raw.len()))
        }
    });

    match relayed {
        Ok(relayed) => (StatusCode::OK, Json(relayed.body)).into_response(),
        Err(e) => {
            warn!("Error proxying request: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Error proxying request to API" })),
            )
                .into_response()
        }
    }
}

/// Health check
async fn health_handler() -> &'static str {
    "OK"
}

/// Start the server
pub async fn start_server(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let gateway: Arc<dyn ClassificationGateway> = Arc::new(config.gateway());
    let addr = config.addr();
    let state = Arc::new(AppState::new(config, gateway));

    let app = create_router(state);

    info!("Skin Flow server starting on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::Relayed;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    struct Canned(Result<Relayed, GatewayError>);

    #[async_trait]
    impl ClassificationGateway for Canned {
        async fn relay(&self, _endpoint: Endpoint, _body: Value) -> Result<Relayed, GatewayError> {
            self.0.clone()
        }
    }

    fn app(reply: Result<Relayed, GatewayError>) -> Router {
        let state = Arc::new(AppState::new(Config::default(), Arc::new(Canned(reply))));
        create_router(state)
    }

    async fn post_json(app: Router, uri: &str, body: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn unavailable() -> GatewayError {
        GatewayError::Upstream {
            status: 503,
            message: "Request failed with status code 503".to_string(),
            raw_body: r#"{"message":"busy"}"#.to_string(),
        }
    }

    #[tokio::test]
    async fn test_health() {
        let response = app(Ok(Relayed::json(200, Value::Null)))
            .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_submit_passes_status_through() {
        let app = app(Ok(Relayed::json(201, json!({ "success": true }))));
        let (status, body) =
            post_json(app, "/api/submit", r#"{"name":"Alex","location":"12 Elm St"}"#).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body, json!({ "success": true }));
    }

    #[tokio::test]
    async fn test_submit_text_reply_is_relayed() {
        let app = app(Ok(Relayed::from_raw(200, "Form submitted".to_string())));
        let (status, body) = post_json(app, "/api/submit", "{}").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!("Form submitted"));
    }

    #[tokio::test]
    async fn test_submit_upstream_error() {
        let (status, body) = post_json(app(Err(unavailable())), "/api/submit", "{}").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "Request failed with status code 503");
        assert_eq!(body["details"], json!({ "message": "busy" }));
    }

    #[tokio::test]
    async fn test_submit_network_error_is_500() {
        let err = GatewayError::Network { message: "connection reset".to_string() };
        let (status, body) = post_json(app(Err(err)), "/api/submit", "{}").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["details"], Value::Null);
    }

    #[tokio::test]
    async fn test_proxy_success_is_200() {
        let app = app(Ok(Relayed::json(202, json!({ "data": {} }))));
        let (status, body) = post_json(app, "/api/proxy", r#"{"Image":"QUJD"}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "data": {} }));
    }

    #[tokio::test]
    async fn test_proxy_failure_collapses() {
        let (status, body) =
            post_json(app(Err(unavailable())), "/api/proxy", r#"{"Image":"QUJD"}"#).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({ "error": "Error proxying request to API" }));

        let ok = app(Ok(Relayed::json(200, Value::Null)));
        let (status, _) = post_json(ok, "/api/proxy", "not json").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_proxy_non_json_reply_is_500() {
        for raw in ["", "Form submitted"] {
            let app = app(Ok(Relayed::from_raw(200, raw.to_string())));
            let (status, body) = post_json(app, "/api/proxy", r#"{"Image":"QUJD"}"#).await;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(body, json!({ "error": "Error proxying request to API" }));
        }
    }

    #[test]
    fn test_new_upload_cancels_previous() {
        let client = Client::default();
        let first = client.start_upload();
        let second = client.start_upload();
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());

        client.cancel_upload();
        assert!(second.is_cancelled());
    }
}
