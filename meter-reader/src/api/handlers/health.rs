use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::dto::MessageResponse;
use crate::api::AppState;

/// `GET /`
#[utoipa::path(
    get,
    path = "/",
    tag = "health",
    responses((status = 200, description = "Greeting", body = MessageResponse))
)]
pub async fn root() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "Hello, Meter Reader!".to_string(),
    })
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct HealthData {
    pub status: String,
    pub version: String,
    pub vision: VisionStatus,
    pub rate_limit: RateLimitStatus,
    pub storage: StorageStatus,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct VisionStatus {
    pub status: String,
    pub provider: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct RateLimitStatus {
    pub max_requests: u32,
    pub window_secs: u64,
    pub requests_in_window: u32,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct StorageStatus {
    pub image_dir_configured: bool,
    pub image_dir_exists: bool,
    pub drive_configured: bool,
}

/// `GET /health`
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses((status = 200, description = "Service health status", body = HealthData))
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthData> {
    let vision_available =
        state.vision_backend != crate::vision::VisionBackendKind::Unavailable;

    let limiter = state.pipeline.limiter();
    let rate_limit = RateLimitStatus {
        max_requests: limiter.max_requests(),
        window_secs: limiter.window().as_secs(),
        requests_in_window: limiter.request_count(),
    };

    let image_dir = state.config.images.local_dir.as_deref();
    let image_dir_exists = match image_dir {
        Some(dir) => tokio::fs::metadata(dir)
            .await
            .map(|meta| meta.is_dir())
            .unwrap_or(false),
        None => false,
    };

    let drive_configured = state.drive.is_some() && state.config.drive.folder_id.is_some();

    Json(HealthData {
        status: if vision_available && image_dir_exists {
            "ok".to_string()
        } else {
            "degraded".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        vision: VisionStatus {
            status: if vision_available {
                "available".to_string()
            } else {
                "unavailable".to_string()
            },
            provider: state.vision_backend.as_str().to_string(),
            model: state.config.vision.model.clone(),
        },
        rate_limit,
        storage: StorageStatus {
            image_dir_configured: image_dir.is_some(),
            image_dir_exists,
            drive_configured,
        },
    })
}
