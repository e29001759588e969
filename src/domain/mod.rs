pub mod error;
pub mod model;

pub use error::AppError;
pub use model::{
    ControlAction, DownloadOutcome, DownloadPhase, DownloadRequest, MediaStream, OutputFormat,
    ResolvedMedia,
};
