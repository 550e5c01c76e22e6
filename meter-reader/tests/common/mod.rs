#![allow(dead_code)]

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use meter_reader::api::AppState;
use meter_reader::config::{
    Config, DriveConfig, ImageConfig, RateLimitConfig, ServerConfig, VisionConfig,
};
use meter_reader::drive::{DriveFile, FileStore};
use meter_reader::error::{MeterError, Result};
use meter_reader::limiter::{Clock, RateLimiter};
use meter_reader::pipeline::ReadingPipeline;
use meter_reader::vision::{Classifier, VisionBackendKind};

static INIT: Once = Once::new();

/// Initialize tracing subscriber once for tests
pub fn init_test_logger() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

/// Get the path to a fixture file
pub fn fixture_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// A small, valid PNG.
pub fn png_bytes() -> Vec<u8> {
    use image::{DynamicImage, ImageFormat};
    let img = DynamicImage::new_rgb8(16, 16);
    let mut output = Vec::new();
    img.write_to(&mut Cursor::new(&mut output), ImageFormat::Png)
        .expect("Failed to encode PNG");
    output
}

pub fn write_png(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, png_bytes()).expect("Failed to write PNG fixture");
    path
}

/// Classifier that answers every image with the same text and counts calls.
pub struct StubClassifier {
    answer: std::result::Result<String, String>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl StubClassifier {
    pub fn answering(answer: &str) -> Arc<Self> {
        Arc::new(Self {
            answer: Ok(answer.to_string()),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            answer: Err(message.to_string()),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Classifier for StubClassifier {
    async fn classify(&self, prompt: &str, _image: &[u8]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.answer.clone().map_err(MeterError::Vision)
    }
}

/// In-memory Drive folder: `name -> bytes`.
pub struct StubDrive {
    files: Vec<(DriveFile, Vec<u8>)>,
    fail: bool,
}

impl StubDrive {
    pub fn with_files(files: &[(&str, Vec<u8>)]) -> Arc<Self> {
        Arc::new(Self {
            files: files
                .iter()
                .enumerate()
                .map(|(i, (name, bytes))| {
                    (
                        DriveFile {
                            id: format!("id-{i}"),
                            name: name.to_string(),
                        },
                        bytes.clone(),
                    )
                })
                .collect(),
            fail: false,
        })
    }

    pub fn broken() -> Arc<Self> {
        Arc::new(Self {
            files: Vec::new(),
            fail: true,
        })
    }
}

#[async_trait]
impl FileStore for StubDrive {
    async fn list_files(&self, _folder_id: &str) -> Result<Vec<DriveFile>> {
        if self.fail {
            return Err(MeterError::DriveAuth("invalid_grant".to_string()));
        }
        Ok(self.files.iter().map(|(f, _)| f.clone()).collect())
    }

    async fn download(&self, file_id: &str, file_name: &str, dest_dir: &Path) -> Result<PathBuf> {
        let (_, bytes) = self
            .files
            .iter()
            .find(|(f, _)| f.id == file_id)
            .ok_or_else(|| MeterError::Drive(format!("no file {file_id}")))?;
        fs::create_dir_all(dest_dir)?;
        let path = dest_dir.join(file_name);
        fs::write(&path, bytes)?;
        Ok(path)
    }
}

pub fn test_config(image_dir: Option<PathBuf>) -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8000,
        },
        images: ImageConfig {
            local_dir: image_dir,
            demo_readings_file: fixture_path("ui_response.json"),
            ui_frame_delay_secs: 0,
            ui_fixed_time: "2025-07-24 00:00:00".to_string(),
        },
        vision: VisionConfig::default(),
        rate_limit: RateLimitConfig::default(),
        drive: DriveConfig {
            service_account_file: fixture_path("service_account.json"),
            folder_id: Some("folder-123".to_string()),
            base_url: None,
            token_url: None,
        },
    }
}

/// Clock whose `sleep` advances time instantly.
#[derive(Default)]
pub struct SkipClock {
    elapsed: Mutex<Duration>,
}

#[async_trait]
impl Clock for SkipClock {
    fn now(&self) -> Instant {
        static ORIGIN: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
        *ORIGIN.get_or_init(Instant::now) + *self.elapsed.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        *self.elapsed.lock().unwrap() += duration;
    }
}

/// Pipeline over `classifier` with a simulated clock.
pub fn test_pipeline(classifier: Arc<dyn Classifier>, max_requests: u32) -> ReadingPipeline {
    let limiter = Arc::new(RateLimiter::with_clock(
        max_requests,
        Duration::from_secs(60),
        Arc::new(SkipClock::default()),
    ));
    ReadingPipeline::new(limiter, classifier, "read the meter")
}

pub fn test_state(
    config: Config,
    classifier: Arc<dyn Classifier>,
    drive: Option<Arc<dyn FileStore>>,
) -> AppState {
    let pipeline = test_pipeline(classifier, 10);
    AppState::new(config, pipeline, VisionBackendKind::Gemini, drive)
}

pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// Re-export commonly used crates for convenience
pub use serial_test::serial;
pub use tempfile;
pub use wiremock;
