//! Error types for facematch.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FaceMatchError {
    #[error("Session is not running")]
    SessionClosed,

    #[error("Image load error: {0}")]
    ImageLoad(String),

    #[error("Image decode error: {0}")]
    ImageDecode(#[from] image::ImageError),

    #[error("Host error: {0}")]
    Host(String),

    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Config serialization error: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    #[error("Invalid locator pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for FaceMatchError {
    fn from(e: reqwest::Error) -> Self {
        FaceMatchError::ImageLoad(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FaceMatchError>;
