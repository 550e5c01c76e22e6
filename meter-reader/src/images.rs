//! The local staging directory for meter photos.

use std::path::{Component, Path, PathBuf};

use crate::error::{MeterError, Result};

/// Extensions picked up by the batch routes, compared case-insensitively.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

pub fn is_image_file(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

/// The configured directory, or a configuration error when it is unset or
/// does not exist.
pub async fn require_image_dir(dir: Option<&Path>) -> Result<&Path> {
    let dir = dir.ok_or_else(|| {
        MeterError::Config("Local image directory is not set or does not exist.".to_string())
    })?;

    if !tokio::fs::metadata(dir)
        .await
        .map(|meta| meta.is_dir())
        .unwrap_or(false)
    {
        tracing::error!(dir = %dir.display(), "Local image directory does not exist");
        return Err(MeterError::Config(
            "Local image directory is not set or does not exist.".to_string(),
        ));
    }

    Ok(dir)
}

/// Image files directly inside `dir`, sorted by file name.
pub async fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut images = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if is_image_file(name) && entry.file_type().await?.is_file() {
            images.push(entry.path());
        }
    }

    images.sort();
    Ok(images)
}

/// Join a client-supplied file name onto `dir`, rejecting anything that is
/// not a single plain path component.
pub fn resolve_image(dir: &Path, name: &str) -> Result<PathBuf> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(dir.join(name)),
        _ => Err(MeterError::Validation(format!(
            "Invalid image name: {name}"
        ))),
    }
}
