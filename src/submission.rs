//! Image Submission Sequence
//!
//! encode -> classify -> persist -> minimum loading time -> done
//!
//! Steps run strictly in order. Every wait races a [`CancellationToken`], so a
//! client that navigates away (or starts another upload) abandons the work. A
//! cancelled or failed submission never writes to the session.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::gateway::{to_data_url, ClassificationGateway, GatewayError};
use crate::session::Session;
use crate::types::ClassificationResult;

/// How long the loading screen stays up at minimum
pub const DEFAULT_MIN_DURATION: Duration = Duration::from_secs(5);

/// A user-selected photo
#[derive(Debug, Clone)]
pub struct ImageFile {
    pub name: Option<String>,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl ImageFile {
    pub fn new(mime: &str, bytes: Vec<u8>) -> Self {
        Self {
            name: None,
            mime: mime.to_string(),
            bytes,
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// Guess the MIME type from the file extension
    pub fn mime_for_path(path: &std::path::Path) -> &'static str {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("png") => "image/png",
            Some("gif") => "image/gif",
            Some("webp") => "image/webp",
            Some("bmp") => "image/bmp",
            _ => "image/jpeg",
        }
    }
}

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("Something went wrong while analyzing your image. Please try again.")]
    Gateway(#[from] GatewayError),
    #[error("Submission cancelled")]
    Cancelled,
    #[error("Could not prepare the image: {0}")]
    Encode(String),
    #[error("Could not save the analysis: {0}")]
    Persist(#[from] serde_json::Error),
}

/// Finished submission
#[derive(Debug, Clone)]
pub struct Completion {
    pub result: ClassificationResult,
    pub elapsed: Duration,
}

pub struct ImageSubmission {
    gateway: Arc<dyn ClassificationGateway>,
    min_duration: Duration,
}

impl ImageSubmission {
    pub fn new(gateway: Arc<dyn ClassificationGateway>) -> Self {
        Self {
            gateway,
            min_duration: DEFAULT_MIN_DURATION,
        }
    }

    pub fn with_min_duration(mut self, min_duration: Duration) -> Self {
        self.min_duration = min_duration;
        self
    }

    pub async fn submit(
        &self,
        session: &Session,
        file: ImageFile,
        cancel: &CancellationToken,
    ) -> Result<Completion, SubmissionError> {
        let started = Instant::now();
        info!(
            "Submitting image {} ({} bytes)",
            file.name.as_deref().unwrap_or("<unnamed>"),
            file.bytes.len()
        );

        // 1. encode
        let encode = tokio::task::spawn_blocking(move || to_data_url(&file.mime, &file.bytes));
        let data_url = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SubmissionError::Cancelled),
            encoded = encode => encoded.map_err(|e| SubmissionError::Encode(e.to_string()))?,
        };

        // 2. classify
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SubmissionError::Cancelled),
            result = self.gateway.submit_image(&data_url) => result.map_err(|e| {
                warn!("Image classification failed: {}", e);
                SubmissionError::Gateway(e)
            })?,
        };

        // 3. persist, unless abandoned while the request was finishing
        if cancel.is_cancelled() {
            return Err(SubmissionError::Cancelled);
        }
        session.set_classification(&result)?;

        // 4. pad to the minimum loading time
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SubmissionError::Cancelled),
            _ = tokio::time::sleep_until(started + self.min_duration) => {}
        }

        let elapsed = started.elapsed();
        info!("Image analysis ready after {:?}", elapsed);
        Ok(Completion { result, elapsed })
    }
}
