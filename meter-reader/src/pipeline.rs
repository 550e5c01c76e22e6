//! Rate-limited meter reading extraction.
//!
//! [`ReadingPipeline::extract`] never fails: every load, decode or model
//! error is collapsed into an [`UNREADABLE`] reading with
//! [`ReadingStatus::Failed`]. The fallible path is kept separate in
//! [`ReadingPipeline::read_meter`] so the collapse happens in exactly one
//! place.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{MeterError, Result};
use crate::limiter::RateLimiter;
use crate::vision::prompts::UNREADABLE;
use crate::vision::Classifier;

/// Outcome of one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub enum ReadingStatus {
    #[serde(rename = "OK")]
    Ok,
    Failed,
    NotFound,
}

impl ReadingStatus {
    /// `Ok` for any non-empty reading other than the unreadable token.
    pub fn from_reading(reading: &str) -> Self {
        if reading.is_empty() || reading == UNREADABLE {
            Self::Failed
        } else {
            Self::Ok
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ExtractionResult {
    /// File name of the image.
    pub image: String,
    /// `None` only when the image was not found.
    pub reading: Option<String>,
    pub status: ReadingStatus,
}

impl ExtractionResult {
    pub fn from_reading(image: impl Into<String>, reading: String) -> Self {
        let status = ReadingStatus::from_reading(&reading);
        Self {
            image: image.into(),
            reading: Some(reading),
            status,
        }
    }

    pub fn not_found(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            reading: None,
            status: ReadingStatus::NotFound,
        }
    }
}

pub(crate) fn image_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[derive(Clone)]
pub struct ReadingPipeline {
    limiter: Arc<RateLimiter>,
    classifier: Arc<dyn Classifier>,
    prompt: Arc<str>,
}

impl ReadingPipeline {
    pub fn new(
        limiter: Arc<RateLimiter>,
        classifier: Arc<dyn Classifier>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            limiter,
            classifier,
            prompt: Arc::from(prompt.into()),
        }
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Acquire a limiter slot, load and decode the image, ask the model and
    /// trim its answer.
    pub async fn read_meter(&self, path: &Path) -> Result<String> {
        self.limiter.acquire().await;

        let bytes = tokio::fs::read(path).await?;
        let bytes = tokio::task::spawn_blocking(move || {
            image::load_from_memory(&bytes)?;
            Ok::<_, MeterError>(bytes)
        })
        .await
        .map_err(|e| MeterError::Internal(format!("Image decode task panicked: {e}")))??;

        let text = self.classifier.classify(&self.prompt, &bytes).await?;
        Ok(text.trim().to_string())
    }

    /// Read one image. Never fails.
    pub async fn extract(&self, path: &Path) -> ExtractionResult {
        let image = image_name(path);

        let reading = match self.read_meter(path).await {
            Ok(reading) => reading,
            Err(e) => {
                warn!(image = %image, error = %e, "Meter reading failed");
                UNREADABLE.to_string()
            }
        };

        let result = ExtractionResult::from_reading(image, reading);
        info!(
            image = %result.image,
            reading = result.reading.as_deref().unwrap_or_default(),
            status = ?result.status,
            "Meter reading extracted"
        );
        result
    }

    /// Read images one at a time, in input order.
    pub async fn extract_batch(&self, paths: &[PathBuf]) -> Vec<ExtractionResult> {
        let mut results = Vec::with_capacity(paths.len());
        for path in paths {
            results.push(self.extract(path).await);
        }
        results
    }

    /// Like [`extract_batch`](Self::extract_batch), but images that do not
    /// exist are reported as `NotFound` without taking a limiter slot.
    pub async fn extract_batch_checked(&self, paths: &[PathBuf]) -> Vec<ExtractionResult> {
        let mut results = Vec::with_capacity(paths.len());
        for path in paths {
            // An existence check that errors falls through to `extract`.
            if let Ok(false) = tokio::fs::try_exists(path).await {
                warn!(path = %path.display(), "Image not found");
                results.push(ExtractionResult::not_found(image_name(path)));
                continue;
            }
            results.push(self.extract(path).await);
        }
        results
    }
}

impl std::fmt::Debug for ReadingPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadingPipeline")
            .field("limiter", &self.limiter)
            .finish_non_exhaustive()
    }
}
