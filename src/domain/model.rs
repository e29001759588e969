use std::fmt;
use std::path::PathBuf;

use super::AppError;

/// Output container the user asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    Mp4,
    #[default]
    Mp3,
    Wav,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 3] = [OutputFormat::Mp4, OutputFormat::Mp3, OutputFormat::Wav];

    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "mp4",
            OutputFormat::Mp3 => "mp3",
            OutputFormat::Wav => "wav",
        }
    }

    /// mp4 is the only container here that can carry video.
    pub fn is_video_container(self) -> bool {
        matches!(self, OutputFormat::Mp4)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub url: String,
    pub output_dir: PathBuf,
    pub format: OutputFormat,
}

/// One downloadable track offered by the remote source.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaStream {
    pub id: String,
    pub container: String,
    /// Audio bitrate in kbit/s, when the source reports one.
    pub audio_bitrate: Option<f64>,
    pub has_audio: bool,
    pub has_video: bool,
    pub url: String,
    pub headers: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMedia {
    pub title: String,
    pub streams: Vec<MediaStream>,
}

/// Final file path on success, failure reason otherwise.
pub type DownloadOutcome = Result<PathBuf, AppError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadPhase {
    Idle,
    Resolving,
    Downloading,
    Finishing,
    Converting,
    Done,
    Failed,
}

impl DownloadPhase {
    fn rank(self) -> u8 {
        match self {
            DownloadPhase::Idle => 0,
            DownloadPhase::Resolving => 1,
            DownloadPhase::Downloading => 2,
            DownloadPhase::Finishing | DownloadPhase::Converting => 3,
            DownloadPhase::Done | DownloadPhase::Failed => 4,
        }
    }

    /// Phases only move forward within a request. `Idle` is reachable only
    /// from a terminal phase.
    pub fn can_advance_to(self, next: DownloadPhase) -> bool {
        match (self, next) {
            (DownloadPhase::Done | DownloadPhase::Failed, DownloadPhase::Idle) => true,
            // Failure may interrupt any active phase.
            (current, DownloadPhase::Failed) => current.is_active(),
            (current, next) => next.rank() > current.rank() && !current.is_terminal(),
        }
    }

    pub fn is_active(self) -> bool {
        matches!(
            self,
            DownloadPhase::Resolving
                | DownloadPhase::Downloading
                | DownloadPhase::Finishing
                | DownloadPhase::Converting
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, DownloadPhase::Done | DownloadPhase::Failed)
    }

    pub fn status_text(self) -> &'static str {
        match self {
            DownloadPhase::Idle => "Ready",
            DownloadPhase::Resolving => "Resolving video...",
            DownloadPhase::Downloading => "Downloading...",
            DownloadPhase::Finishing => "Saving file...",
            DownloadPhase::Converting => "Converting...",
            DownloadPhase::Done => "Done",
            DownloadPhase::Failed => "Failed",
        }
    }

    /// Pause and Cancel exist in the UI but never change the phase.
    pub fn apply(self, action: ControlAction) -> (DownloadPhase, &'static str) {
        (self, action.status_text())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    Pause,
    Cancel,
}

impl ControlAction {
    pub fn status_text(self) -> &'static str {
        match self {
            ControlAction::Pause => "Pause is not implemented",
            ControlAction::Cancel => "Cancel is not implemented",
        }
    }
}
