//! JSON bodies returned by the HTTP routes.

use serde::{Deserialize, Serialize};

use crate::pipeline::{ExtractionResult, ReadingStatus};

/// `{"message": "..."}`
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

/// Error body produced by [`MeterError`](crate::error::MeterError).
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ErrorBody {
    pub error: String,
    pub code: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct BatchResponse {
    pub results: Vec<ExtractionResult>,
}

/// One row of the dashboard listing.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct UiReading {
    pub image_name: String,
    pub reading: Option<String>,
    pub status: ReadingStatus,
    pub time: String,
    pub previous_status: Vec<ReadingStatus>,
    pub image_base64: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct UiDataResponse {
    pub data: Vec<UiReading>,
}

/// Either the downloaded file names, or a message when the folder was empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize, utoipa::ToSchema)]
pub struct SyncResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloaded_files: Option<Vec<String>>,
}
