use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::{parse_vision_provider_model, VisionConfig};
use crate::error::{MeterError, Result};

use super::api::{GeminiClient, OpenAiVisionClient};
use super::Classifier;

#[derive(Clone)]
enum VisionBackend {
    Gemini(GeminiClient),
    OpenAi(OpenAiVisionClient),
    Unavailable { reason: String },
}

/// Which backend a provider ended up with, for health reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisionBackendKind {
    Gemini,
    OpenAi,
    Unavailable,
}

impl VisionBackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::OpenAi => "openai",
            Self::Unavailable => "unavailable",
        }
    }
}

#[derive(Clone)]
pub struct VisionProvider {
    backend: VisionBackend,
    config: VisionConfig,
}

impl VisionProvider {
    pub fn new(config: &VisionConfig) -> Result<Self> {
        let (provider, _model) = parse_vision_provider_model(&config.model);

        let backend = match provider.to_lowercase().as_str() {
            "openai" => match OpenAiVisionClient::new(config) {
                Ok(client) => {
                    info!(model = client.model(), "OpenAI Vision backend initialized");
                    VisionBackend::OpenAi(client)
                }
                Err(e) => {
                    let reason = format!("OpenAI Vision backend unavailable: {e}");
                    warn!("{}", reason);
                    VisionBackend::Unavailable { reason }
                }
            },
            _ => match GeminiClient::new(config) {
                Ok(client) => {
                    info!(model = client.model(), "Gemini backend initialized");
                    VisionBackend::Gemini(client)
                }
                Err(e) => {
                    let reason = format!("Gemini backend unavailable: {e}");
                    warn!("{}", reason);
                    VisionBackend::Unavailable { reason }
                }
            },
        };

        Ok(Self {
            backend,
            config: config.clone(),
        })
    }

    pub fn is_available(&self) -> bool {
        !matches!(self.backend, VisionBackend::Unavailable { .. })
    }

    pub fn kind(&self) -> VisionBackendKind {
        match self.backend {
            VisionBackend::Gemini(_) => VisionBackendKind::Gemini,
            VisionBackend::OpenAi(_) => VisionBackendKind::OpenAi,
            VisionBackend::Unavailable { .. } => VisionBackendKind::Unavailable,
        }
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    async fn classify_internal(&self, prompt: &str, image: &[u8]) -> Result<String> {
        match &self.backend {
            VisionBackend::Gemini(client) => client.classify(prompt, image).await,
            VisionBackend::OpenAi(client) => client.classify(prompt, image).await,
            VisionBackend::Unavailable { reason } => {
                Err(MeterError::VisionUnavailable(reason.clone()))
            }
        }
    }
}

#[async_trait]
impl Classifier for VisionProvider {
    async fn classify(&self, prompt: &str, image: &[u8]) -> Result<String> {
        let timeout_duration = Duration::from_secs(self.config.timeout_secs);

        match tokio::time::timeout(timeout_duration, self.classify_internal(prompt, image)).await {
            Ok(inner_result) => inner_result,
            Err(_) => Err(MeterError::Vision(format!(
                "Vision call timed out after {} seconds",
                self.config.timeout_secs
            ))),
        }
    }
}
