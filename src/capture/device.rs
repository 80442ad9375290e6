/// nokhwa-backed camera device
///
/// `nokhwa::Camera` is not `Send`, so it is only ever constructed inside
/// the webcam worker thread (see `Webcam::start`).

use image::RgbImage;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;

use super::webcam::{CameraDevice, DeviceFactory};
use crate::error::{Error, Result};

pub struct NokhwaCamera {
    index: u32,
    camera: Option<Camera>,
}

impl NokhwaCamera {
    pub fn new(index: u32) -> Self {
        Self { index, camera: None }
    }

    /// Factory for `Webcam::start`
    pub fn factory(index: u32) -> DeviceFactory {
        Box::new(move || Ok(Box::new(NokhwaCamera::new(index)) as Box<dyn CameraDevice>))
    }
}

impl CameraDevice for NokhwaCamera {
    fn open(&mut self) -> Result<()> {
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);
        let mut camera = Camera::new(CameraIndex::Index(self.index), requested)
            .map_err(|e| Error::Camera(e.to_string()))?;
        camera
            .open_stream()
            .map_err(|e| Error::Camera(e.to_string()))?;

        tracing::info!(
            "📷 Opened camera {} ({})",
            self.index,
            camera.info().human_name()
        );
        self.camera = Some(camera);
        Ok(())
    }

    fn frame(&mut self) -> Result<RgbImage> {
        let camera = self
            .camera
            .as_mut()
            .ok_or_else(|| Error::Camera("camera not open".to_string()))?;

        let buffer = camera.frame().map_err(|e| Error::Camera(e.to_string()))?;
        let decoded = buffer
            .decode_image::<RgbFormat>()
            .map_err(|e| Error::Camera(e.to_string()))?;
        let (width, height) = (decoded.width(), decoded.height());

        // Rebuild with our own image version in case nokhwa links another one
        RgbImage::from_raw(width, height, decoded.into_raw())
            .ok_or_else(|| Error::Camera("frame buffer size mismatch".to_string()))
    }

    fn close(&mut self) {
        if let Some(mut camera) = self.camera.take() {
            if let Err(e) = camera.stop_stream() {
                tracing::warn!("failed to stop camera stream: {}", e);
            }
        }
    }
}
