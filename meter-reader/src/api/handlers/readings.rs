use std::time::Duration;

use axum::extract::{Path, State};
use axum::Json;
use base64::{engine::general_purpose::STANDARD, Engine};
use tracing::{info, warn};

use crate::api::dto::{BatchResponse, UiDataResponse, UiReading};
use crate::api::AppState;
use crate::error::{MeterError, Result};
use crate::images::{list_images, require_image_dir, resolve_image};
use crate::pipeline::{image_name, ExtractionResult, ReadingStatus};

/// `GET /ocr/single/{image_name}`
#[utoipa::path(
    get,
    path = "/ocr/single/{image_name}",
    tag = "ocr",
    params(("image_name" = String, Path, description = "File name inside the image directory")),
    responses(
        (status = 200, description = "Reading for the image", body = ExtractionResult),
        (status = 400, description = "Name escapes the image directory", body = crate::api::dto::ErrorBody),
        (status = 404, description = "Image not found", body = crate::api::dto::ErrorBody),
        (status = 500, description = "Image directory not configured", body = crate::api::dto::ErrorBody),
    )
)]
pub async fn read_single(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ExtractionResult>> {
    let dir = require_image_dir(state.config.images.local_dir.as_deref()).await?;
    let path = resolve_image(dir, &name)?;
    info!(path = %path.display(), "Checking image path");

    if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
        warn!(path = %path.display(), "Image not found");
        return Err(MeterError::NotFound("Image not found.".to_string()));
    }

    Ok(Json(state.pipeline.extract(&path).await))
}

/// `GET /ocr/batch-process`
#[utoipa::path(
    get,
    path = "/ocr/batch-process",
    tag = "ocr",
    responses(
        (status = 200, description = "Readings for every image, by file name", body = BatchResponse),
        (status = 404, description = "No images in the directory", body = crate::api::dto::ErrorBody),
        (status = 500, description = "Image directory not configured", body = crate::api::dto::ErrorBody),
    )
)]
pub async fn batch_process(State(state): State<AppState>) -> Result<Json<BatchResponse>> {
    let dir = require_image_dir(state.config.images.local_dir.as_deref()).await?;
    let images = list_images(dir).await?;
    info!(dir = %dir.display(), count = images.len(), "Image files to process");

    if images.is_empty() {
        warn!("No image files found to process");
        return Err(MeterError::NotFound(
            "No images found in local directory.".to_string(),
        ));
    }

    let results = state.pipeline.extract_batch_checked(&images).await;
    let ok = results
        .iter()
        .filter(|r| r.status == ReadingStatus::Ok)
        .count();
    info!(total = results.len(), ok, "Batch processing finished");

    Ok(Json(BatchResponse { results }))
}

/// `GET /ocr/ui-data`
///
/// Readings plus the base64-encoded photo for each image, for the dashboard.
#[utoipa::path(
    get,
    path = "/ocr/ui-data",
    tag = "ocr",
    responses(
        (status = 200, description = "Dashboard rows", body = UiDataResponse),
        (status = 404, description = "No images in the directory", body = crate::api::dto::ErrorBody),
        (status = 500, description = "Image directory not configured", body = crate::api::dto::ErrorBody),
    )
)]
pub async fn ui_data(State(state): State<AppState>) -> Result<Json<UiDataResponse>> {
    let dir = require_image_dir(state.config.images.local_dir.as_deref()).await?;
    let images = list_images(dir).await?;

    if images.is_empty() {
        return Err(MeterError::NotFound(
            "No images found in local directory.".to_string(),
        ));
    }

    let frame_delay = Duration::from_secs(state.config.images.ui_frame_delay_secs);
    let mut data = Vec::with_capacity(images.len());

    for path in &images {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            continue;
        }

        if !frame_delay.is_zero() {
            tokio::time::sleep(frame_delay).await;
        }

        let result = state.pipeline.extract(path).await;

        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(image = %image_name(path), error = %e, "Image vanished before encoding");
                continue;
            }
        };

        data.push(UiReading {
            image_name: result.image,
            reading: result.reading,
            status: result.status,
            time: state.config.images.ui_fixed_time.clone(),
            previous_status: vec![ReadingStatus::Ok, ReadingStatus::Failed],
            image_base64: STANDARD.encode(&bytes),
        });
    }

    Ok(Json(UiDataResponse { data }))
}
