/// Static image loader
///
/// Reads an uploaded photo from disk and decodes it once: the original bytes
/// are kept for the `/predict` upload and the decoded pixels become the
/// display handle.

use iced::widget::image::Handle;
use std::path::{Path, PathBuf};
use tokio::task;

use crate::error::{Error, Result};

/// An uploaded photo, ready to display and to send
#[derive(Debug, Clone)]
pub struct StillImage {
    /// File name sent with the multipart upload
    pub file_name: String,
    /// Encoded file contents, exactly as read from disk
    pub bytes: Vec<u8>,
    /// Natural width in pixels
    pub width: u32,
    /// Natural height in pixels
    pub height: u32,
    /// Decoded RGBA pixels for the image widget
    pub handle: Handle,
}

/// Load and decode an image file
///
/// Spawns blocking because decoding a large photo is CPU-intensive.
pub async fn load_still(path: PathBuf) -> Result<StillImage> {
    task::spawn_blocking(move || load_still_blocking(&path)).await?
}

fn load_still_blocking(path: &Path) -> Result<StillImage> {
    let bytes = std::fs::read(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let decoded = image::load_from_memory(&bytes)?;
    let rgba = decoded.to_rgba8();
    let (width, height) = rgba.dimensions();

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "upload".to_string());

    tracing::info!("🖼️  Loaded {} ({}x{})", file_name, width, height);

    Ok(StillImage {
        file_name,
        bytes,
        width,
        height,
        handle: Handle::from_rgba(width, height, rgba.into_raw()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shelf.png");
        image::RgbImage::new(64, 48).save(&path).unwrap();

        let still = load_still(path).await.unwrap();

        assert_eq!(still.file_name, "shelf.png");
        assert_eq!((still.width, still.height), (64, 48));
        assert!(!still.bytes.is_empty());
    }

    #[tokio::test]
    async fn test_missing_file() {
        let result = load_still(PathBuf::from("/nonexistent/shelf.png")).await;
        assert!(matches!(result, Err(Error::Io { .. })));
    }

    #[tokio::test]
    async fn test_not_an_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.png");
        std::fs::write(&path, b"definitely not a png").unwrap();

        let result = load_still(path).await;
        assert!(matches!(result, Err(Error::Image(_))));
    }
}
