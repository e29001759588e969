pub mod client;
pub mod models;

use std::path::Path;

use async_trait::async_trait;

use crate::domain::{AppError, MediaStream, ResolvedMedia};

pub use client::YtDlpResolver;
pub use models::ToolConfig;

/// Turns a page URL into downloadable streams.
#[async_trait]
pub trait StreamResolver: Send + Sync {
    async fn resolve(&self, url: &str) -> Result<ResolvedMedia, AppError>;

    /// Write the bytes of `stream` to `destination`, replacing any existing file.
    ///
    /// On failure the implementation removes whatever it wrote, and leaves
    /// `destination` untouched if it failed before writing.
    async fn download(&self, stream: &MediaStream, destination: &Path) -> Result<(), AppError>;
}
