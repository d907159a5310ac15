//! Remote Classification Gateway
//!
//! Forwards JSON bodies unmodified to the fixed upstream endpoints and hands
//! back the response, or a normalized error. No retries and no persistence:
//! callers decide what a failure means for the user.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::types::{Category, CategoryPrediction, ClassificationResult, UserProfile};

pub const DEFAULT_IDENTITY_URL: &str =
    "https://wk7wmfz7x8.execute-api.us-east-2.amazonaws.com/live/FES_Virtual_Internship_1/level1";
pub const DEFAULT_CLASSIFY_URL: &str =
    "https://wk7wmfz7x8.execute-api.us-east-2.amazonaws.com/live/FES_Virtual_Internship_1/level2";

/// Field the classification API expects the base64 payload under
pub const IMAGE_FIELD: &str = "Image";

/// Upstream endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Identity,
    Classify,
}

/// Gateway errors
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// Upstream answered with a non-success status
    #[error("Request failed with status code {status}")]
    Upstream {
        status: u16,
        message: String,
        raw_body: String,
    },
    /// DNS, connect, TLS, timeout or reset
    #[error("Network error: {message}")]
    Network { message: String },
    /// Success status but the body isn't a classification
    #[error("Malformed upstream response: {message}")]
    Decode { message: String, raw_body: String },
}

impl GatewayError {
    pub fn status(&self) -> Option<u16> {
        match self {
            GatewayError::Upstream { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn raw_body(&self) -> Option<&str> {
        match self {
            GatewayError::Upstream { raw_body, .. } | GatewayError::Decode { raw_body, .. } => {
                Some(raw_body)
            }
            GatewayError::Network { .. } => None,
        }
    }

    /// Upstream body as JSON when it parses, as a string otherwise
    pub fn details(&self) -> Value {
        match self.raw_body() {
            Some(raw) if !raw.is_empty() => {
                serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
            }
            _ => Value::Null,
        }
    }
}

/// Upstream response as received
#[derive(Debug, Clone, PartialEq)]
pub struct Relayed {
    pub status: u16,
    /// Parsed JSON, or the raw text as a JSON string when it isn't JSON
    pub body: Value,
    pub raw: String,
}

impl Relayed {
    pub fn from_raw(status: u16, raw: String) -> Self {
        let body = serde_json::from_str(&raw).unwrap_or_else(|_| Value::String(raw.clone()));
        Self { status, body, raw }
    }

    pub fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            raw: body.to_string(),
            body,
        }
    }

    /// True if the upstream sent a JSON document
    pub fn is_json(&self) -> bool {
        serde_json::from_str::<serde::de::IgnoredAny>(&self.raw).is_ok()
    }
}

/// Acknowledgement of an identity submission
pub type ServerAck = Relayed;

#[async_trait]
pub trait ClassificationGateway: Send + Sync {
    /// POST `body` to `endpoint` as-is
    async fn relay(&self, endpoint: Endpoint, body: Value) -> Result<Relayed, GatewayError>;

    async fn submit_identity(&self, profile: &UserProfile) -> Result<ServerAck, GatewayError> {
        let body = json!({ "name": profile.name, "location": profile.location });
        self.relay(Endpoint::Identity, body).await
    }

    /// Accepts raw base64 or a `data:` URL
    async fn submit_image(&self, image: &str) -> Result<ClassificationResult, GatewayError> {
        let payload = strip_data_url_prefix(image);
        let body = json!({ IMAGE_FIELD: payload });
        let relayed = self.relay(Endpoint::Classify, body).await?;
        decode_classification(relayed.body)
    }
}

/// Drop a leading `data:<mime>;base64,` if present
pub fn strip_data_url_prefix(image: &str) -> &str {
    static PREFIX: OnceLock<Regex> = OnceLock::new();
    let re = PREFIX.get_or_init(|| Regex::new(r"^data:[^,]*?;base64,").expect("static regex"));
    match re.find(image) {
        Some(m) => &image[m.end()..],
        None => image,
    }
}

/// Encode raw bytes as a `data:` URL
pub fn to_data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ClassificationBody {
    /// `{ "data": { "race": { "white": 0.61, ... }, ... } }`
    Scored {
        data: BTreeMap<String, BTreeMap<String, f64>>,
    },
    Direct(ClassificationResult),
}

/// Normalize either upstream shape into a [`ClassificationResult`]
pub fn decode_classification(body: Value) -> Result<ClassificationResult, GatewayError> {
    let raw = || body.to_string();
    let parsed: ClassificationBody =
        serde_json::from_value(body.clone()).map_err(|e| GatewayError::Decode {
            message: e.to_string(),
            raw_body: raw(),
        })?;

    let result = match parsed {
        ClassificationBody::Scored { data } => {
            let pick = |c: Category| data.get(c.as_str()).and_then(CategoryPrediction::from_scores);
            ClassificationResult {
                race: pick(Category::Race),
                age: pick(Category::Age),
                gender: pick(Category::Gender),
            }
        }
        ClassificationBody::Direct(result) => result,
    };

    if result.race.is_none() && result.age.is_none() && result.gender.is_none() {
        return Err(GatewayError::Decode {
            message: "no predictions in response".to_string(),
            raw_body: raw(),
        });
    }
    if let Some(category) = result.inconsistent_category() {
        return Err(GatewayError::Decode {
            message: format!("{} prediction missing from its confidences", category),
            raw_body: raw(),
        });
    }
    Ok(result)
}

/// Gateway over HTTPS using a blocking `ureq` agent on the tokio blocking pool
#[derive(Clone)]
pub struct HttpGateway {
    agent: ureq::Agent,
    identity_url: String,
    classify_url: String,
}

impl HttpGateway {
    pub fn new(identity_url: &str, classify_url: &str, timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            identity_url: identity_url.to_string(),
            classify_url: classify_url.to_string(),
        }
    }

    pub fn url(&self, endpoint: Endpoint) -> &str {
        match endpoint {
            Endpoint::Identity => &self.identity_url,
            Endpoint::Classify => &self.classify_url,
        }
    }

    fn post_blocking(
        agent: &ureq::Agent,
        url: &str,
        body: &Value,
    ) -> Result<Relayed, GatewayError> {
        let response = match agent
            .post(url)
            .set("Content-Type", "application/json")
            .send_string(&body.to_string())
        {
            Ok(response) => response,
            Err(ureq::Error::Status(status, response)) => {
                let raw_body = response.into_string().unwrap_or_default();
                warn!("Upstream {} answered {}", url, status);
                return Err(GatewayError::Upstream {
                    status,
                    message: format!("Request failed with status code {}", status),
                    raw_body,
                });
            }
            Err(ureq::Error::Transport(t)) => {
                warn!("Upstream {} unreachable: {}", url, t);
                return Err(GatewayError::Network { message: t.to_string() });
            }
        };

        let status = response.status();
        let raw = response.into_string().map_err(|e| GatewayError::Network {
            message: format!("Failed to read response: {}", e),
        })?;
        debug!("Upstream {} answered {} ({} bytes)", url, status, raw.len());

        Ok(Relayed::from_raw(status, raw))
    }
}

#[async_trait]
impl ClassificationGateway for HttpGateway {
    async fn relay(&self, endpoint: Endpoint, body: Value) -> Result<Relayed, GatewayError> {
        let agent = self.agent.clone();
        let url = self.url(endpoint).to_string();
        tokio::task::spawn_blocking(move || Self::post_blocking(&agent, &url, &body))
            .await
            .map_err(|e| GatewayError::Network {
                message: format!("Request task failed: {}", e),
            })?
    }
}
