use axum::extract::State;
use axum::Json;
use serde_json::Value;
use tracing::error;

use crate::api::AppState;
use crate::error::{MeterError, Result};

/// `GET /ocr/demo-readings`
///
/// Serves the canned dashboard payload from the demo fixture file as-is.
#[utoipa::path(
    get,
    path = "/ocr/demo-readings",
    tag = "ocr",
    responses(
        (status = 200, description = "Contents of the demo fixture"),
        (status = 404, description = "Fixture missing", body = crate::api::dto::ErrorBody),
        (status = 500, description = "Fixture unreadable", body = crate::api::dto::ErrorBody),
    )
)]
pub async fn demo_readings(State(state): State<AppState>) -> Result<Json<Value>> {
    let path = &state.config.images.demo_readings_file;

    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            error!(path = %path.display(), "Demo UI response file not found");
            return Err(MeterError::NotFound(
                "Demo UI response file not found.".to_string(),
            ));
        }
        Err(e) => {
            error!(path = %path.display(), error = %e, "Error reading demo UI file");
            return Err(e.into());
        }
    };

    let value: Value = serde_json::from_str(&raw).map_err(|e| {
        error!(path = %path.display(), error = %e, "Demo UI file is not valid JSON");
        MeterError::from(e)
    })?;

    Ok(Json(value))
}
