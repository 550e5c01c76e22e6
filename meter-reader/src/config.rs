use std::env;
use std::path::PathBuf;

fn parse_env_or<T: std::str::FromStr>(var: &str, default: T) -> T
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(val) => match val.parse() {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Invalid value '{}' for {}: {}. Using default.", val, var, e);
                default
            }
        },
        Err(_) => default,
    }
}

/// Non-empty value of the first variable in `vars` that is set.
fn env_first(vars: &[&str]) -> Option<String> {
    vars.iter()
        .filter_map(|var| env::var(var).ok())
        .find(|val| !val.trim().is_empty())
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub images: ImageConfig,
    pub vision: VisionConfig,
    pub rate_limit: RateLimitConfig,
    pub drive: DriveConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Where staged meter photos live and how the UI listing is shaped.
#[derive(Debug, Clone)]
pub struct ImageConfig {
    /// Directory holding downloaded images. `None` means the batch routes
    /// answer with a configuration error.
    pub local_dir: Option<PathBuf>,
    pub demo_readings_file: PathBuf,
    /// Extra pause before each image in the UI listing, on top of the limiter.
    pub ui_frame_delay_secs: u64,
    pub ui_fixed_time: String,
}

#[derive(Debug, Clone)]
pub struct VisionConfig {
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
    /// Replaces the built-in extraction instruction when set.
    pub prompt: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_requests_per_window: u32,
    pub window_secs: u64,
}

#[derive(Debug, Clone)]
pub struct DriveConfig {
    pub service_account_file: PathBuf,
    pub folder_id: Option<String>,
    pub base_url: Option<String>,
    pub token_url: Option<String>,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            model: "gemini/gemini-2.5-flash".to_string(),
            api_key: None,
            base_url: None,
            timeout_secs: 60,
            max_retries: 3,
            prompt: None,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests_per_window: 10,
            window_secs: 60,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: env::var("METER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parse_env_or("METER_PORT", 8000),
            },
            images: ImageConfig {
                local_dir: env_first(&["LOCAL_IMAGE_DIR"]).map(PathBuf::from),
                demo_readings_file: env::var("DEMO_READINGS_FILE")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("UI_Response/ui_response.json")),
                ui_frame_delay_secs: parse_env_or("UI_FRAME_DELAY_SECS", 8),
                ui_fixed_time: env::var("UI_FIXED_TIME")
                    .unwrap_or_else(|_| "2025-07-24 00:00:00".to_string()),
            },
            vision: VisionConfig {
                model: env::var("VISION_MODEL")
                    .unwrap_or_else(|_| "gemini/gemini-2.5-flash".to_string()),
                api_key: env_first(&["VISION_API_KEY", "GOOGLE_API_KEY"]),
                base_url: env::var("VISION_BASE_URL").ok(),
                timeout_secs: parse_env_or("VISION_TIMEOUT", 60),
                max_retries: parse_env_or("VISION_MAX_RETRIES", 3),
                prompt: env_first(&["METER_PROMPT"]),
            },
            rate_limit: RateLimitConfig {
                max_requests_per_window: parse_env_or("MAX_REQUESTS_PER_MINUTE", 10),
                window_secs: parse_env_or("RATE_LIMIT_WINDOW_SECS", 60),
            },
            drive: DriveConfig {
                service_account_file: env::var("GOOGLE_SERVICE_ACCOUNT_FILE")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("service_account_key.json")),
                folder_id: env_first(&["DRIVE_FOLDER_ID"]),
                base_url: env::var("DRIVE_BASE_URL").ok(),
                token_url: env::var("GOOGLE_TOKEN_URL").ok(),
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default()
    }
}

/// Vision providers with a dedicated client.
pub const KNOWN_VISION_PROVIDERS: &[&str] = &["gemini", "openai"];

/// Parse a vision model name into (provider, model) tuple.
///
/// Names without a known provider prefix are treated as Gemini models, so
/// `gemini-2.5-flash` and `gemini/gemini-2.5-flash` are equivalent.
pub fn parse_vision_provider_model(model: &str) -> (&str, &str) {
    if let Some((prefix, rest)) = model.split_once('/') {
        let prefix_lower = prefix.to_lowercase();
        if KNOWN_VISION_PROVIDERS.contains(&prefix_lower.as_str()) {
            return (prefix, rest);
        }
    }
    ("gemini", model)
}
