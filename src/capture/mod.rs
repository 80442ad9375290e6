/// Capture source module
///
/// This module obtains the pixels that get sent to the backend:
/// - Uploaded photos (still.rs)
/// - The live camera stream and its worker thread (webcam.rs)
/// - The nokhwa camera backend (device.rs)
/// - JPEG encoding and display conversion of frames (encode.rs)

pub mod device;
pub mod encode;
pub mod still;
pub mod webcam;

pub use still::StillImage;
pub use webcam::Webcam;
