use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("settings error: {0}")]
    Settings(#[from] serde_json::Error),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] image::ImageError),
}
