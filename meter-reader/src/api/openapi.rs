use axum::Json;
use utoipa::OpenApi;
use utoipa_redoc::{Redoc, Servable};

use super::dto;
use super::handlers;
use crate::pipeline;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Meter Reader API",
        version = "1.0.0",
        description = "Reads electricity meter photos with a vision-language model.",
    ),
    paths(
        handlers::health::root,
        handlers::health::health_check,
        handlers::readings::read_single,
        handlers::readings::batch_process,
        handlers::readings::ui_data,
        handlers::demo::demo_readings,
        handlers::drive::sync_drive,
    ),
    components(schemas(
        pipeline::ReadingStatus,
        pipeline::ExtractionResult,
        dto::MessageResponse,
        dto::ErrorBody,
        dto::BatchResponse,
        dto::UiReading,
        dto::UiDataResponse,
        dto::SyncResponse,
        handlers::health::HealthData,
        handlers::health::VisionStatus,
        handlers::health::RateLimitStatus,
        handlers::health::StorageStatus,
    )),
    tags(
        (name = "health", description = "Liveness and configuration status"),
        (name = "ocr", description = "Meter reading extraction"),
        (name = "drive", description = "Google Drive image sync"),
    ),
)]
pub struct ApiDoc;

pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

pub fn redoc_router<S: Clone + Send + Sync + 'static>() -> axum::Router<S> {
    Redoc::with_url("/docs", ApiDoc::openapi()).into()
}
