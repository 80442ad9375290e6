use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, RgbImage};
use std::sync::Arc;
use tokio::task;

use iced::widget::image::Handle;

use crate::error::Result;

/// Encode a frame as JPEG on a blocking task
pub async fn encode_jpeg(frame: Arc<RgbImage>, quality: u8) -> Result<Vec<u8>> {
    task::spawn_blocking(move || encode_jpeg_blocking(&frame, quality)).await?
}

pub fn encode_jpeg_blocking(frame: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut jpeg = Vec::with_capacity(frame.as_raw().len() / 8);
    JpegEncoder::new_with_quality(&mut jpeg, quality).encode_image(frame)?;
    Ok(jpeg)
}

/// Convert a camera frame into a handle for the video surface
pub fn to_rgba_handle(frame: &RgbImage) -> Handle {
    let rgba = DynamicImage::ImageRgb8(frame.clone()).into_rgba8();
    let (width, height) = rgba.dimensions();
    Handle::from_rgba(width, height, rgba.into_raw())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, ImageFormat, Rgb};

    #[test]
    fn test_rgba_handle_adds_opaque_alpha() {
        let frame = RgbImage::from_pixel(3, 2, Rgb([10, 20, 30]));

        match to_rgba_handle(&frame) {
            Handle::Rgba { width, height, pixels, .. } => {
                assert_eq!((width, height), (3, 2));
                assert_eq!(pixels.len(), 3 * 2 * 4);
                assert!(pixels.chunks(4).all(|pixel| pixel == [10, 20, 30, 255]));
            }
            other => panic!("expected an RGBA handle, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_encode_jpeg_keeps_dimensions() {
        let frame = Arc::new(RgbImage::from_pixel(32, 24, Rgb([200, 30, 30])));

        let jpeg = encode_jpeg(frame, 80).await.unwrap();

        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory_with_format(&jpeg, ImageFormat::Jpeg).unwrap();
        assert_eq!(decoded.dimensions(), (32, 24));
    }
}
