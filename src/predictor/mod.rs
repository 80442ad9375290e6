/// Predictor client module
///
/// Talks to the detection backend in two styles:
/// - One-shot multipart requests for uploaded photos and saves (http.rs)
/// - A persistent streaming channel for webcam frames (stream.rs)

pub mod http;
pub mod stream;

pub use stream::{ChannelEvent, FrameSender};
