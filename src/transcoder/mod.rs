use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;

use crate::domain::{AppError, OutputFormat};
use crate::utils::tokio_command;

/// Re-encodes the audio of a media file into another container.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// External executable this transcoder shells out to.
    fn program(&self) -> &str;

    async fn convert(
        &self,
        source: &Path,
        destination: &Path,
        format: OutputFormat,
    ) -> Result<(), AppError>;
}

pub struct FfmpegTranscoder {
    program: String,
}

impl FfmpegTranscoder {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn codec_args(format: OutputFormat) -> &'static [&'static str] {
        match format {
            OutputFormat::Mp3 => &["-codec:a", "libmp3lame", "-q:a", "2"],
            OutputFormat::Wav => &["-codec:a", "pcm_s16le"],
            // Not requested by the download flow, which saves mp4 as is.
            // ffmpeg's mp4 default (aac) applies if a caller converts to it.
            OutputFormat::Mp4 => &[],
        }
    }
}

/// Sibling of `destination` that ffmpeg writes to before the final rename.
/// Keeps the extension so ffmpeg still picks the right muxer.
pub fn partial_path(destination: &Path) -> PathBuf {
    let stem = destination
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match destination.extension() {
        Some(ext) => format!("{}.converting.{}", stem, ext.to_string_lossy()),
        None => format!("{}.converting", stem),
    };
    destination.with_file_name(name)
}

async fn discard_partial(partial: &Path) {
    match tokio::fs::remove_file(partial).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(path = %partial.display(), "could not remove partial output: {}", e);
        }
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    fn program(&self) -> &str {
        &self.program
    }

    async fn convert(
        &self,
        source: &Path,
        destination: &Path,
        format: OutputFormat,
    ) -> Result<(), AppError> {
        tracing::info!(
            source = %source.display(),
            destination = %destination.display(),
            %format,
            "converting"
        );

        let partial = partial_path(destination);
        let output = tokio_command(&self.program)
            .args(["-y", "-hide_banner", "-loglevel", "error", "-i"])
            .arg(source)
            .arg("-vn")
            .args(Self::codec_args(format))
            .arg(&partial)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| AppError::Transcode(format!("could not run {}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            tracing::warn!(status = %output.status, "{} failed: {}", self.program, stderr);
            let reason = if stderr.is_empty() {
                format!("{} exited with {}", self.program, output.status)
            } else {
                stderr
            };
            discard_partial(&partial).await;
            return Err(AppError::Transcode(reason));
        }

        if let Err(e) = tokio::fs::rename(&partial, destination).await {
            discard_partial(&partial).await;
            return Err(AppError::Io(format!(
                "Failed to move converted file to {}: {}",
                destination.display(),
                e
            )));
        }
        Ok(())
    }
}
