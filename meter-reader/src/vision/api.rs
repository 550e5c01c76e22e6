use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::{header::RETRY_AFTER, Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

use crate::config::{parse_vision_provider_model, VisionConfig};
use crate::error::{MeterError, Result};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Clone, Debug)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct OpenAiVisionClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_retries: u32,
}

// Gemini generateContent wire types

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
enum Part {
    Text(String),
    InlineData(Blob),
}

#[derive(Debug, Serialize)]
struct Blob {
    mime_type: String,
    data: String,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Default, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Default, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Default, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

// OpenAI-compatible chat completion wire types

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    #[serde(default)]
    content: Option<String>,
}

/// MIME type for the image payload, falling back to JPEG for unknown data.
pub(crate) fn image_mime_type(image_bytes: &[u8]) -> &'static str {
    image::guess_format(image_bytes)
        .map(|format| format.to_mime_type())
        .unwrap_or("image/jpeg")
}

fn http_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| MeterError::Vision(format!("Failed to create HTTP client: {e}")))
}

fn retry_after_secs(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

/// Send a request, retrying rate limits, server errors and transport failures
/// with exponential backoff. `max_retries` counts attempts after the first.
async fn send_with_retries<F>(build: F, max_retries: u32) -> Result<Response>
where
    F: Fn() -> RequestBuilder,
{
    let mut retries = 0;

    loop {
        match build().send().await {
            Ok(resp) => {
                let status = resp.status();
                if status.is_success() {
                    return Ok(resp);
                }

                if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                    if retries >= max_retries {
                        if status == StatusCode::TOO_MANY_REQUESTS {
                            return Err(MeterError::VisionRateLimit {
                                retry_after: retry_after_secs(&resp),
                            });
                        }
                        return Err(MeterError::Vision(format!(
                            "API request failed after {max_retries} retries: {status}"
                        )));
                    }
                    retries += 1;
                    warn!(%status, attempt = retries, "Vision API request failed, retrying");
                    let delay = Duration::from_millis(100 * (2_u64.pow(retries)));
                    tokio::time::sleep(delay).await;
                    continue;
                }

                let body = resp.text().await.unwrap_or_default();
                return Err(MeterError::Vision(format!(
                    "API request failed: {status} - {body}"
                )));
            }
            Err(e) => {
                if retries >= max_retries {
                    return Err(MeterError::Vision(format!(
                        "API request failed after {max_retries} retries: {e}"
                    )));
                }
                retries += 1;
                warn!(error = %e, attempt = retries, "Vision API transport error, retrying");
                let delay = Duration::from_millis(100 * (2_u64.pow(retries)));
                tokio::time::sleep(delay).await;
            }
        }
    }
}

impl GeminiClient {
    pub fn new(config: &VisionConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| MeterError::Vision("API key required for Gemini".to_string()))?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| GEMINI_BASE_URL.to_string());

        let (_, model) = parse_vision_provider_model(&config.model);

        Ok(Self {
            client: http_client(config.timeout_secs)?,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            max_retries: config.max_retries,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn classify(&self, prompt: &str, image_bytes: &[u8]) -> Result<String> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![
                    Part::Text(prompt.to_string()),
                    Part::InlineData(Blob {
                        mime_type: image_mime_type(image_bytes).to_string(),
                        data: STANDARD.encode(image_bytes),
                    }),
                ],
            }],
        };

        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let response = send_with_retries(
            || {
                self.client
                    .post(&url)
                    .header("x-goog-api-key", &self.api_key)
                    .json(&request)
            },
            self.max_retries,
        )
        .await?;

        let body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| MeterError::Vision(format!("Failed to parse response: {e}")))?;

        let candidate = body
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| MeterError::Vision("No candidates in response".to_string()))?;

        let text: String = candidate
            .content
            .unwrap_or_default()
            .parts
            .into_iter()
            .filter_map(|part| part.text)
            .collect();

        Ok(text)
    }
}

impl OpenAiVisionClient {
    pub fn new(config: &VisionConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| MeterError::Vision("API key required for OpenAI Vision".to_string()))?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| OPENAI_BASE_URL.to_string());

        let (_, model) = parse_vision_provider_model(&config.model);

        Ok(Self {
            client: http_client(config.timeout_secs)?,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            max_retries: config.max_retries,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn classify(&self, prompt: &str, image_bytes: &[u8]) -> Result<String> {
        let data_url = format!(
            "data:{};base64,{}",
            image_mime_type(image_bytes),
            STANDARD.encode(image_bytes)
        );

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: vec![
                    ContentPart::Text {
                        text: prompt.to_string(),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl { url: data_url },
                    },
                ],
            }],
            max_tokens: 64,
        };

        let url = format!("{}/chat/completions", self.base_url);
        let response = send_with_retries(
            || {
                self.client
                    .post(&url)
                    .bearer_auth(&self.api_key)
                    .json(&request)
            },
            self.max_retries,
        )
        .await?;

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| MeterError::Vision(format!("Failed to parse response: {e}")))?;

        chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.unwrap_or_default())
            .ok_or_else(|| MeterError::Vision("No response from API".to_string()))
    }
}
