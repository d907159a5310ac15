//! Local stand-in for the upstream identity and classification APIs

#![allow(dead_code)]

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::post,
    Router,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

/// One request as the upstream saw it
#[derive(Debug, Clone)]
pub struct Received {
    pub path: &'static str,
    pub content_type: Option<String>,
    pub body: Value,
}

pub struct Upstream {
    pub identity_status: Mutex<u16>,
    /// Plain-text body for identity replies instead of JSON
    pub identity_text: Mutex<Option<String>>,
    pub classify_status: Mutex<u16>,
    pub classify_body: Mutex<Value>,
    pub received: Mutex<Vec<Received>>,
}

impl Upstream {
    fn new() -> Self {
        Self {
            identity_status: Mutex::new(200),
            identity_text: Mutex::new(None),
            classify_status: Mutex::new(200),
            classify_body: Mutex::new(scored_body()),
            received: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_identity(&self, status: u16) {
        *self.identity_status.lock().unwrap() = status;
    }

    pub fn reply_identity_text(&self, text: &str) {
        *self.identity_text.lock().unwrap() = Some(text.to_string());
    }

    pub fn fail_classify(&self, status: u16) {
        *self.classify_status.lock().unwrap() = status;
    }

    pub fn received(&self, path: &str) -> Vec<Received> {
        self.received
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.path == path)
            .cloned()
            .collect()
    }

    fn record(&self, path: &'static str, headers: &HeaderMap, body: &Bytes) {
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = serde_json::from_slice(body).unwrap_or(Value::Null);
        self.received.lock().unwrap().push(Received {
            path,
            content_type,
            body,
        });
    }
}

/// Score table in the shape the classification API answers with
pub fn scored_body() -> Value {
    json!({
        "message": "success",
        "data": {
            "race": { "black": 0.9951, "white": 0.0049 },
            "age": { "20-29": 0.7, "30-39": 0.3 },
            "gender": { "female": 0.72, "male": 0.28 }
        }
    })
}

fn reply(status: u16, ok: Value) -> Response {
    let status = StatusCode::from_u16(status).unwrap();
    if status.is_success() {
        (status, Json(ok)).into_response()
    } else {
        (status, Json(json!({ "message": "Service Unavailable" }))).into_response()
    }
}

async fn identity(State(up): State<Arc<Upstream>>, headers: HeaderMap, body: Bytes) -> Response {
    up.record("/level1", &headers, &body);
    if let Some(text) = up.identity_text.lock().unwrap().clone() {
        return (StatusCode::OK, text).into_response();
    }
    let status = *up.identity_status.lock().unwrap();
    reply(status, json!({ "success": true, "message": "Identity received" }))
}

async fn classify(State(up): State<Arc<Upstream>>, headers: HeaderMap, body: Bytes) -> Response {
    up.record("/level2", &headers, &body);
    let status = *up.classify_status.lock().unwrap();
    let ok = up.classify_body.lock().unwrap().clone();
    reply(status, ok)
}

/// Serve the fake on an ephemeral port. Returns its base URL.
pub async fn spawn_upstream() -> (String, Arc<Upstream>) {
    let upstream = Arc::new(Upstream::new());
    let app = Router::new()
        .route("/level1", post(identity))
        .route("/level2", post(classify))
        .with_state(upstream.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), upstream)
}
