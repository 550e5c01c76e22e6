use axum::extract::State;
use axum::Json;
use tracing::{error, info, warn};

use crate::api::dto::SyncResponse;
use crate::api::AppState;
use crate::error::{MeterError, Result};

/// Drive failures are reported as internal errors regardless of their cause.
fn as_drive_error(e: MeterError) -> MeterError {
    match e {
        MeterError::Drive(_) | MeterError::DriveAuth(_) => e,
        other => MeterError::Drive(other.to_string()),
    }
}

/// `GET /drive/sync`
///
/// Downloads every file of the configured Drive folder into the image directory.
#[utoipa::path(
    get,
    path = "/drive/sync",
    tag = "drive",
    responses(
        (status = 200, description = "Downloaded file names, or a message for an empty folder", body = SyncResponse),
        (status = 500, description = "Drive not configured or a Drive call failed", body = crate::api::dto::ErrorBody),
    )
)]
pub async fn sync_drive(State(state): State<AppState>) -> Result<Json<SyncResponse>> {
    let drive = state
        .drive
        .clone()
        .ok_or_else(|| MeterError::Config("Google Drive is not configured.".to_string()))?;
    let folder_id = state
        .config
        .drive
        .folder_id
        .as_deref()
        .ok_or_else(|| MeterError::Config("DRIVE_FOLDER_ID is not set.".to_string()))?;
    let save_dir = state
        .config
        .images
        .local_dir
        .as_deref()
        .ok_or_else(|| MeterError::Config("LOCAL_IMAGE_DIR is not set.".to_string()))?;

    info!(folder_id, "Listing files in Google Drive folder");
    let files = drive.list_files(folder_id).await.map_err(|e| {
        error!(error = %e, "Exception during Drive listing");
        as_drive_error(e)
    })?;

    if files.is_empty() {
        warn!(folder_id, "No files found in the Drive folder");
        return Ok(Json(SyncResponse {
            message: Some("No files found in the Drive folder.".to_string()),
            downloaded_files: None,
        }));
    }

    info!(dir = %save_dir.display(), count = files.len(), "Saving images");
    let mut downloaded = Vec::with_capacity(files.len());
    for file in &files {
        let path = drive
            .download(&file.id, &file.name, save_dir)
            .await
            .map_err(|e| {
                error!(file = %file.name, error = %e, "Exception during download");
                as_drive_error(e)
            })?;
        info!(path = %path.display(), "Downloaded");
        downloaded.push(crate::pipeline::image_name(&path));
    }

    Ok(Json(SyncResponse {
        message: None,
        downloaded_files: Some(downloaded),
    }))
}
