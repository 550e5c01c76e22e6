//! Vision-language model access.
//!
//! The pipeline only sees the [`Classifier`] trait: a prompt and the raw
//! image bytes go in, the model's free-form text comes out. [`VisionProvider`]
//! is the production implementation and selects a backend from the model
//! name prefix:
//! - `gemini/<model>` (or no prefix) uses the Gemini `generateContent` API
//! - `openai/<model>` uses an OpenAI-compatible chat completions API
//!
//! A provider without credentials is still constructed, in an unavailable
//! state that fails every call, so the service can start and report
//! unreadable meters instead of refusing to boot.

mod api;
pub mod prompts;
mod provider;

use async_trait::async_trait;

use crate::error::Result;

pub use api::{GeminiClient, OpenAiVisionClient};
pub use provider::{VisionBackendKind, VisionProvider};

/// Opaque image-to-text call used by the extraction pipeline.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, prompt: &str, image: &[u8]) -> Result<String>;
}
