/// Error type shared by every module of the client
///
/// Background work returns `Result<T>`; the UI converts errors to strings
/// before they travel inside a `Message`.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Reading a file from disk failed
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The upload could not be decoded, or a frame could not be encoded
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// The camera could not be opened or stopped delivering frames
    #[error("camera unavailable: {0}")]
    Camera(String),

    /// Transport failure or non-success status from the backend
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The backend answered with something that is not the expected JSON
    #[error("malformed response: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The streaming channel failed
    #[error("channel error: {0}")]
    Channel(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("invalid backend url: {0}")]
    Url(#[from] url::ParseError),

    #[error("invalid configuration: {0}")]
    Config(String),

    /// A blocking task panicked or was cancelled
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, Error>;
