use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Failed to resolve video: {0}")]
    Resolve(String),

    #[error("no audio stream found")]
    NoAudioStream,

    #[error("Download failed: {0}")]
    Download(String),

    /// A conversion prerequisite is absent. The message tells the user what to install.
    #[error("{0}")]
    MissingDependency(String),

    #[error("Conversion failed: {0}")]
    Transcode(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Io(e.to_string())
    }
}
