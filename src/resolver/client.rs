use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use futures::{Stream, StreamExt, TryStreamExt};
use reqwest::Client;
use tokio::io::AsyncWriteExt;

use super::models::{ToolConfig, VideoInfo};
use super::StreamResolver;
use crate::domain::{AppError, MediaStream, ResolvedMedia};
use crate::utils::tokio_command;

pub type Result<T> = std::result::Result<T, AppError>;

/// Resolves pages through `yt-dlp` and fetches the chosen stream over HTTP.
#[derive(Clone)]
pub struct YtDlpResolver {
    config: ToolConfig,
    client: Client,
}

impl YtDlpResolver {
    pub fn new(config: ToolConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    async fn dump_json(&self, url: &str) -> Result<String> {
        let output = tokio_command(&self.config.ytdlp_program)
            .arg("--dump-single-json")
            .arg("--no-playlist")
            .arg("--no-warnings")
            .arg(url)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                AppError::Resolve(format!(
                    "could not run {}: {}",
                    self.config.ytdlp_program, e
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = stderr
                .lines()
                .rev()
                .find(|line| !line.trim().is_empty())
                .unwrap_or("unknown error")
                .trim_start_matches("ERROR:")
                .trim()
                .to_string();
            tracing::warn!(%url, status = %output.status, "yt-dlp failed: {}", reason);
            return Err(AppError::Resolve(reason));
        }

        String::from_utf8(output.stdout)
            .map_err(|e| AppError::Resolve(format!("yt-dlp produced invalid UTF-8: {}", e)))
    }

    /// Open the HTTP body of `stream`.
    /// Returns (total_size, stream)
    pub async fn download_file_stream(
        &self,
        stream: &MediaStream,
    ) -> Result<(Option<u64>, impl Stream<Item = Result<bytes::Bytes>>)> {
        let mut request = self
            .client
            .get(&stream.url)
            .header(reqwest::header::USER_AGENT, &self.config.user_agent);
        for (name, value) in &stream.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::Download(format!("request failed: {}", e)))?
            .error_for_status()
            .map_err(|e| AppError::Download(format!("server rejected request: {}", e)))?;

        let total_size = response.content_length();
        let body = response
            .bytes_stream()
            .map_err(|e| AppError::Download(e.to_string()));

        Ok((total_size, body))
    }
}

#[async_trait]
impl StreamResolver for YtDlpResolver {
    async fn resolve(&self, url: &str) -> Result<ResolvedMedia> {
        let json = self.dump_json(url).await?;
        let info: VideoInfo = serde_json::from_str(&json)
            .map_err(|e| AppError::Resolve(format!("unreadable yt-dlp output: {}", e)))?;

        let media = info.into_media();
        if media.streams.is_empty() {
            return Err(AppError::Resolve("no downloadable streams".to_string()));
        }

        tracing::debug!(title = %media.title, streams = media.streams.len(), "resolved");
        Ok(media)
    }

    async fn download(&self, stream: &MediaStream, destination: &Path) -> Result<()> {
        let (total, body) = self.download_file_stream(stream).await?;
        tracing::info!(
            format = %stream.id,
            bytes = ?total,
            path = %destination.display(),
            "downloading stream"
        );

        save_stream(body, destination).await
    }
}

/// Write `body` to `destination`. A file created here is removed again if
/// anything fails after creation; nothing is touched before that.
pub async fn save_stream(
    body: impl Stream<Item = Result<bytes::Bytes>> + Send,
    destination: &Path,
) -> Result<()> {
    let file = tokio::fs::File::create(destination)
        .await
        .map_err(|e| AppError::Io(format!("Failed to create file: {}", e)))?;

    if let Err(e) = write_body(file, body).await {
        if let Err(cleanup) = tokio::fs::remove_file(destination).await {
            tracing::warn!(path = %destination.display(), "could not remove partial download: {}", cleanup);
        }
        return Err(e);
    }
    Ok(())
}

async fn write_body(
    mut file: tokio::fs::File,
    body: impl Stream<Item = Result<bytes::Bytes>> + Send,
) -> Result<()> {
    let mut body = std::pin::pin!(body);
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        file.write_all(&chunk)
            .await
            .map_err(|e| AppError::Io(format!("Write error: {}", e)))?;
    }

    file.sync_all()
        .await
        .map_err(|e| AppError::Io(format!("Failed to sync file: {}", e)))
}
