use std::collections::BTreeMap;

use serde::Deserialize;

use crate::domain::{MediaStream, ResolvedMedia};

/// Subset of `yt-dlp --dump-single-json` output
#[derive(Debug, Clone, Deserialize)]
pub struct VideoInfo {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub formats: Vec<FormatInfo>,
}

/// One entry of the `formats` array
#[derive(Debug, Clone, Deserialize)]
pub struct FormatInfo {
    pub format_id: String,
    #[serde(default)]
    pub ext: String,
    pub url: Option<String>,
    pub acodec: Option<String>,
    pub vcodec: Option<String>,
    pub abr: Option<f64>,
    pub protocol: Option<String>,
    #[serde(default)]
    pub http_headers: BTreeMap<String, String>,
}

fn codec_present(codec: &Option<String>) -> bool {
    matches!(codec.as_deref(), Some(c) if !c.is_empty() && c != "none")
}

impl FormatInfo {
    /// Formats without a direct HTTP URL (HLS/DASH manifests, fragments) are skipped.
    pub fn into_stream(self) -> Option<MediaStream> {
        let direct = matches!(self.protocol.as_deref(), None | Some("http") | Some("https"));
        if !direct {
            return None;
        }
        let url = self.url.filter(|u| u.starts_with("http"))?;
        Some(MediaStream {
            has_audio: codec_present(&self.acodec),
            has_video: codec_present(&self.vcodec),
            id: self.format_id,
            container: self.ext,
            audio_bitrate: self.abr,
            url,
            headers: self.http_headers.into_iter().collect(),
        })
    }
}

impl VideoInfo {
    pub fn into_media(self) -> ResolvedMedia {
        ResolvedMedia {
            title: self.title,
            streams: self
                .formats
                .into_iter()
                .filter_map(FormatInfo::into_stream)
                .collect(),
        }
    }
}

/// Configuration for the external tools
#[derive(Debug, Clone)]
pub struct ToolConfig {
    pub ytdlp_program: String,
    pub ffmpeg_program: String,
    pub user_agent: String,
    pub default_url: String,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            ytdlp_program: "yt-dlp".to_string(),
            ffmpeg_program: "ffmpeg".to_string(),
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string(),
            default_url: "https://www.youtube.com/watch?v=".to_string(),
        }
    }
}
