use crate::application::{DownloadCoordinator, DownloadEvent};
use crate::domain::{AppError, ControlAction, DownloadPhase, DownloadRequest};
use crate::resolver::{ToolConfig, YtDlpResolver};
use crate::transcoder::{FfmpegTranscoder, Transcoder};
use crate::ui::{DownloadMessage, DownloadView};
use futures::StreamExt;
use iced::{time, Subscription, Task};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub struct DownloadApp {
    view: DownloadView,
    coordinator: DownloadCoordinator,
    config: ToolConfig,
    // Request waiting for the folder picker
    pending_request: Option<DownloadRequest>,
}

impl Default for DownloadApp {
    fn default() -> Self {
        Self::new(ToolConfig::default())
    }
}

impl DownloadApp {
    pub fn new(config: ToolConfig) -> Self {
        let resolver = Arc::new(YtDlpResolver::new(config.clone()));
        let transcoder: Arc<dyn Transcoder> =
            Arc::new(FfmpegTranscoder::new(config.ffmpeg_program.clone()));
        let coordinator = DownloadCoordinator::new(resolver, Some(transcoder));

        Self {
            view: DownloadView::new(&config.default_url),
            coordinator,
            config,
            pending_request: None,
        }
    }

    /// Checks the typed URL before anything is started.
    fn validate_url(&self) -> Result<String, AppError> {
        let url = self.view.url.trim();
        if url.is_empty() || url == self.config.default_url {
            return Err(AppError::InvalidInput(
                "Please enter a video URL".to_string(),
            ));
        }

        match url::Url::parse(url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(url.to_string()),
            Ok(parsed) => Err(AppError::InvalidInput(format!(
                "Invalid URL: unsupported scheme '{}'",
                parsed.scheme()
            ))),
            Err(e) => Err(AppError::InvalidInput(format!("Invalid URL: {}", e))),
        }
    }

    fn finish(&mut self) {
        self.view.is_downloading = false;
        self.view.phase = DownloadPhase::Idle;
        self.view.activity = 0.0;
        self.pending_request = None;
    }
}

#[derive(Debug, Clone)]
pub enum Message {
    UiMessage(DownloadMessage),
    OutputDirSelected(Option<PathBuf>),
    Download(DownloadEvent),
    /// Advances the activity indicator
    Tick,
}

pub fn update(app: &mut DownloadApp, message: Message) -> Task<Message> {
    match message {
        Message::UiMessage(ui_msg) => {
            app.view.update(ui_msg.clone());

            match ui_msg {
                DownloadMessage::StartPressed if app.view.can_start() => {
                    let url = match app.validate_url() {
                        Ok(url) => url,
                        Err(e) => {
                            app.view.status_message = e.to_string();
                            return Task::none();
                        }
                    };

                    app.view.is_downloading = true;
                    app.view.status_message = "Please select an output folder...".to_string();
                    app.pending_request = Some(DownloadRequest {
                        url,
                        output_dir: PathBuf::new(),
                        format: app.view.format,
                    });

                    let coordinator = app.coordinator.clone();
                    return Task::perform(
                        async move { coordinator.choose_output_dir().await },
                        Message::OutputDirSelected,
                    );
                }
                DownloadMessage::PausePressed => {
                    let (phase, status) = app.view.phase.apply(ControlAction::Pause);
                    app.view.phase = phase;
                    app.view.status_message = status.to_string();
                }
                DownloadMessage::CancelPressed => {
                    let (phase, status) = app.view.phase.apply(ControlAction::Cancel);
                    app.view.phase = phase;
                    app.view.status_message = status.to_string();
                }
                _ => {}
            }
        }
        Message::OutputDirSelected(dir) => {
            let pending = app.pending_request.take();
            match (dir, pending) {
                (Some(dir), Some(mut request)) => {
                    request.output_dir = dir.clone();
                    app.view.output_dir = Some(dir);
                    app.view.status_message = DownloadPhase::Resolving.status_text().to_string();

                    // Runs on the executor; events come back in order on one stream
                    let events = app.coordinator.download_events(request);
                    return Task::stream(events.map(Message::Download));
                }
                _ => {
                    app.finish();
                    app.view.status_message = "No output directory selected".to_string();
                }
            }
        }
        Message::Download(DownloadEvent::Phase(phase)) => {
            if app.view.is_downloading && app.view.phase.can_advance_to(phase) {
                app.view.phase = phase;
                app.view.status_message = phase.status_text().to_string();
            }
        }
        Message::Download(DownloadEvent::Finished(outcome)) => {
            let settled = if outcome.is_ok() {
                DownloadPhase::Done
            } else {
                DownloadPhase::Failed
            };
            if app.view.phase.can_advance_to(settled) {
                app.view.phase = settled;
            }
            tracing::debug!(phase = ?app.view.phase, "request settled");
            app.finish();
            match outcome {
                Ok(path) => {
                    app.view.status_message = format!("Saved: {}", path.display());
                }
                Err(e) => {
                    app.view.status_message = format!("Error: {}", e);
                }
            }
        }
        Message::Tick => {
            app.view.activity = (app.view.activity + 0.04) % 1.0;
        }
    }
    Task::none()
}

pub fn view(app: &DownloadApp) -> iced::Element<'_, Message> {
    app.view.view().map(Message::UiMessage)
}

pub fn subscription(app: &DownloadApp) -> Subscription<Message> {
    if app.view.is_downloading {
        time::every(Duration::from_millis(80)).map(|_| Message::Tick)
    } else {
        Subscription::none()
    }
}
