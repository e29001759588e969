use std::path::PathBuf;

use iced::{
    widget::{button, column, pick_list, progress_bar, row, text, text_input, Space},
    Element, Length,
};

use crate::domain::{DownloadPhase, OutputFormat};

/// Main view state
pub struct DownloadView {
    pub url: String,
    pub format: OutputFormat,
    pub output_dir: Option<PathBuf>,
    pub status_message: String,
    /// True from the moment Start is accepted until the request settles.
    pub is_downloading: bool,
    pub phase: DownloadPhase,
    /// Position of the indeterminate activity bar, 0.0 to 1.0.
    pub activity: f32,
}

impl DownloadView {
    pub fn new(default_url: &str) -> Self {
        Self {
            url: default_url.to_string(),
            format: OutputFormat::default(),
            output_dir: None,
            status_message: "Enter a video URL to download".to_string(),
            is_downloading: false,
            phase: DownloadPhase::Idle,
            activity: 0.0,
        }
    }

    pub fn can_start(&self) -> bool {
        !self.is_downloading
    }

    /// Pause and Cancel are only clickable while a request is running.
    pub fn controls_enabled(&self) -> bool {
        self.phase.is_active()
    }
}

#[derive(Debug, Clone)]
pub enum DownloadMessage {
    UrlChanged(String),
    FormatSelected(OutputFormat),
    StartPressed,
    PausePressed,
    CancelPressed,
}

impl DownloadView {
    pub fn update(&mut self, message: DownloadMessage) {
        match message {
            DownloadMessage::UrlChanged(url) => {
                self.url = url;
            }
            DownloadMessage::FormatSelected(format) => {
                self.format = format;
            }
            DownloadMessage::StartPressed
            | DownloadMessage::PausePressed
            | DownloadMessage::CancelPressed => {
                // Will be handled by the app
            }
        }
    }

    pub fn view(&self) -> Element<'_, DownloadMessage> {
        let directory = match &self.output_dir {
            Some(dir) => format!("Saving to: {}", dir.display()),
            None => "You will be asked for an output folder".to_string(),
        };

        let format_picker = pick_list(
            &OutputFormat::ALL[..],
            Some(self.format),
            DownloadMessage::FormatSelected,
        );

        let controls = row![
            button("Download")
                .on_press_maybe(self.can_start().then_some(DownloadMessage::StartPressed))
                .padding([10, 20]),
            button("Pause")
                .on_press_maybe(self.controls_enabled().then_some(DownloadMessage::PausePressed))
                .padding([10, 20]),
            button("Cancel")
                .on_press_maybe(self.controls_enabled().then_some(DownloadMessage::CancelPressed))
                .padding([10, 20]),
        ]
        .spacing(10);

        let activity = if self.is_downloading {
            self.activity
        } else {
            0.0
        };

        column![
            text("Video Audio Downloader").size(32),
            Space::new().height(Length::Fixed(20.0)),
            text("Video URL:").size(16),
            text_input("Paste a video URL...", &self.url)
                .on_input(DownloadMessage::UrlChanged)
                .padding(10),
            row![text("Format:").size(16), format_picker].spacing(10),
            text(directory).size(14),
            Space::new().height(Length::Fixed(10.0)),
            controls,
            progress_bar(0.0..=1.0, activity),
            text(&self.status_message).size(14),
        ]
        .padding(20)
        .spacing(10)
        .into()
    }
}
