use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::{channel::mpsc, stream::BoxStream, FutureExt, StreamExt};

use crate::{
    domain::{AppError, DownloadOutcome, DownloadPhase, DownloadRequest, MediaStream, OutputFormat},
    resolver::StreamResolver,
    transcoder::Transcoder,
    utils::{is_tool_available, sanitize_filename},
};

#[derive(Debug, Clone, PartialEq)]
pub enum DownloadEvent {
    Phase(DownloadPhase),
    Finished(DownloadOutcome),
}

/// What happens to the temporary download once it is on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishAction {
    Move,
    Convert,
}

pub fn finish_action(container: &str, format: OutputFormat) -> FinishAction {
    // A video container request keeps the download as is, even when the
    // selected stream is audio only.
    if container.eq_ignore_ascii_case(format.extension()) || format.is_video_container() {
        FinishAction::Move
    } else {
        FinishAction::Convert
    }
}

/// Highest audio bitrate among audio-capable streams.
pub fn select_audio_stream(streams: &[MediaStream]) -> Option<&MediaStream> {
    streams
        .iter()
        .filter(|s| s.has_audio)
        .max_by(|a, b| {
            let a = a.audio_bitrate.unwrap_or(0.0);
            let b = b.audio_bitrate.unwrap_or(0.0);
            a.total_cmp(&b)
        })
}

pub fn temp_path(dir: &Path, name: &str, container: &str) -> PathBuf {
    dir.join(format!("{}_orig.{}", name, container))
}

pub fn final_path(dir: &Path, name: &str, format: OutputFormat) -> PathBuf {
    dir.join(format!("{}.{}", name, format.extension()))
}

#[derive(Clone)]
pub struct DownloadCoordinator {
    resolver: Arc<dyn StreamResolver>,
    transcoder: Option<Arc<dyn Transcoder>>,
    tool_check: fn(&str) -> bool,
}

impl DownloadCoordinator {
    pub fn new(resolver: Arc<dyn StreamResolver>, transcoder: Option<Arc<dyn Transcoder>>) -> Self {
        Self {
            resolver,
            transcoder,
            tool_check: is_tool_available,
        }
    }

    pub fn with_tool_check(mut self, tool_check: fn(&str) -> bool) -> Self {
        self.tool_check = tool_check;
        self
    }

    pub async fn choose_output_dir(&self) -> Option<PathBuf> {
        rfd::AsyncFileDialog::new()
            .set_title("Choose output folder")
            .pick_folder()
            .await
            .map(|handle| handle.path().to_path_buf())
    }

    /// Runs one request to completion, reporting each phase it enters.
    pub async fn run(
        &self,
        request: &DownloadRequest,
        report: &(dyn Fn(DownloadPhase) + Send + Sync),
    ) -> DownloadOutcome {
        tracing::info!(url = %request.url, format = %request.format, "starting download");

        report(DownloadPhase::Resolving);
        let media = self.resolver.resolve(&request.url).await?;
        let stream = select_audio_stream(&media.streams).ok_or(AppError::NoAudioStream)?;
        tracing::info!(
            title = %media.title,
            format = %stream.id,
            container = %stream.container,
            video = stream.has_video,
            bitrate = ?stream.audio_bitrate,
            "selected stream"
        );

        let name = sanitize_filename(&media.title);
        let temp = temp_path(&request.output_dir, &name, &stream.container);
        let target = final_path(&request.output_dir, &name, request.format);

        report(DownloadPhase::Downloading);
        self.resolver.download(stream, &temp).await?;

        match finish_action(&stream.container, request.format) {
            FinishAction::Move => {
                report(DownloadPhase::Finishing);
                tokio::fs::rename(&temp, &target).await.map_err(|e| {
                    AppError::Io(format!("Failed to move {}: {}", temp.display(), e))
                })?;
            }
            FinishAction::Convert => {
                self.convert(&temp, &target, request.format, report).await?;
            }
        }

        tracing::info!(path = %target.display(), "download finished");
        Ok(target)
    }

    async fn convert(
        &self,
        temp: &Path,
        target: &Path,
        format: OutputFormat,
        report: &(dyn Fn(DownloadPhase) + Send + Sync),
    ) -> Result<(), AppError> {
        let transcoder = self.transcoder.as_ref().ok_or_else(|| {
            AppError::MissingDependency(format!(
                "Audio conversion to {} is not available in this build. The original download was kept at {}",
                format,
                temp.display()
            ))
        })?;

        let program = transcoder.program();
        if !(self.tool_check)(program) {
            tracing::warn!(%program, "converter not found on PATH");
            return Err(AppError::MissingDependency(format!(
                "{} was not found on PATH. Install {} to convert to {}. The original download was kept at {}",
                program,
                program,
                format,
                temp.display()
            )));
        }

        report(DownloadPhase::Converting);
        transcoder.convert(temp, target, format).await?;

        if let Err(e) = tokio::fs::remove_file(temp).await {
            tracing::warn!(path = %temp.display(), "could not remove temporary file: {}", e);
        }
        Ok(())
    }

    /// Runs `request` and yields its phases followed by exactly one `Finished` event.
    pub fn download_events(&self, request: DownloadRequest) -> BoxStream<'static, DownloadEvent> {
        let (tx, rx) = mpsc::unbounded();
        let coordinator = self.clone();

        let worker = async move {
            let phase_tx = tx.clone();
            let report = move |phase: DownloadPhase| {
                let _ = phase_tx.unbounded_send(DownloadEvent::Phase(phase));
            };

            let outcome = match AssertUnwindSafe(coordinator.run(&request, &report))
                .catch_unwind()
                .await
            {
                Ok(outcome) => outcome,
                Err(panic) => {
                    let details = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "worker panicked".to_string());
                    Err(AppError::Unexpected(details))
                }
            };

            if let Err(e) = &outcome {
                tracing::warn!(url = %request.url, "download failed: {}", e);
            }
            let _ = tx.unbounded_send(DownloadEvent::Finished(outcome));
        };

        let worker = futures::stream::once(worker).filter_map(|()| async { None::<DownloadEvent> });
        futures::stream::select(rx, worker).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ResolvedMedia;
    use async_trait::async_trait;
    use std::sync::Mutex;

    const AUDIO_BYTES: &[u8] = b"native audio payload";

    fn stream(id: &str, container: &str, bitrate: Option<f64>, has_audio: bool) -> MediaStream {
        MediaStream {
            id: id.to_string(),
            container: container.to_string(),
            audio_bitrate: bitrate,
            has_audio,
            has_video: false,
            url: format!("https://cdn.example/{}", id),
            headers: Vec::new(),
        }
    }

    enum FakeDownload {
        Complete,
        FailBeforeWrite(AppError),
        FailMidway(AppError),
    }

    struct FakeResolver {
        result: Result<ResolvedMedia, AppError>,
        panic_on_resolve: bool,
        download: FakeDownload,
    }

    impl FakeResolver {
        fn with_stream(title: &str, container: &str) -> Self {
            Self {
                result: Ok(ResolvedMedia {
                    title: title.to_string(),
                    streams: vec![stream("a", container, Some(128.0), true)],
                }),
                panic_on_resolve: false,
                download: FakeDownload::Complete,
            }
        }

        fn failing(error: AppError) -> Self {
            Self {
                result: Err(error),
                panic_on_resolve: false,
                download: FakeDownload::Complete,
            }
        }
    }

    #[async_trait]
    impl StreamResolver for FakeResolver {
        async fn resolve(&self, _url: &str) -> Result<ResolvedMedia, AppError> {
            if self.panic_on_resolve {
                panic!("extractor exploded");
            }
            self.result.clone()
        }

        async fn download(&self, _stream: &MediaStream, destination: &Path) -> Result<(), AppError> {
            match &self.download {
                FakeDownload::Complete => {
                    tokio::fs::write(destination, AUDIO_BYTES).await?;
                    Ok(())
                }
                FakeDownload::FailBeforeWrite(e) => Err(e.clone()),
                FakeDownload::FailMidway(e) => {
                    let body = futures::stream::iter(vec![
                        Ok(bytes::Bytes::from_static(b"partial")),
                        Err(e.clone()),
                    ]);
                    crate::resolver::client::save_stream(body, destination).await
                }
            }
        }
    }

    #[derive(Default)]
    enum FakeConversion {
        #[default]
        Write,
        /// Succeeds but deletes its source, so the later cleanup fails.
        ConsumeSource,
        Fail,
    }

    #[derive(Default)]
    struct FakeTranscoder {
        calls: Mutex<Vec<(PathBuf, OutputFormat)>>,
        conversion: FakeConversion,
    }

    impl FakeTranscoder {
        fn with(conversion: FakeConversion) -> Self {
            Self {
                conversion,
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl Transcoder for FakeTranscoder {
        fn program(&self) -> &str {
            "ffmpeg"
        }

        async fn convert(
            &self,
            source: &Path,
            destination: &Path,
            format: OutputFormat,
        ) -> Result<(), AppError> {
            assert!(source.exists(), "source must still exist while converting");
            self.calls.lock().unwrap().push((source.to_path_buf(), format));
            match self.conversion {
                FakeConversion::Write => {}
                FakeConversion::ConsumeSource => tokio::fs::remove_file(source).await?,
                FakeConversion::Fail => {
                    return Err(AppError::Transcode("Invalid data found".to_string()))
                }
            }
            tokio::fs::write(destination, b"converted").await?;
            Ok(())
        }
    }

    fn request(dir: &Path, format: OutputFormat) -> DownloadRequest {
        DownloadRequest {
            url: "https://www.youtube.com/watch?v=abc".to_string(),
            output_dir: dir.to_path_buf(),
            format,
        }
    }

    fn coordinator(
        resolver: FakeResolver,
        transcoder: Option<Arc<FakeTranscoder>>,
        tool_available: bool,
    ) -> DownloadCoordinator {
        fn present(_: &str) -> bool {
            true
        }
        fn absent(_: &str) -> bool {
            false
        }

        let transcoder = transcoder.map(|t| t as Arc<dyn Transcoder>);
        let check = if tool_available { present } else { absent };
        DownloadCoordinator::new(Arc::new(resolver), transcoder).with_tool_check(check)
    }

    async fn run_collecting(
        coordinator: &DownloadCoordinator,
        request: &DownloadRequest,
    ) -> (DownloadOutcome, Vec<DownloadPhase>) {
        let phases = Mutex::new(Vec::new());
        let report = |phase: DownloadPhase| phases.lock().unwrap().push(phase);
        let outcome = coordinator.run(request, &report).await;
        (outcome, phases.into_inner().unwrap())
    }

    fn dir_entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_select_highest_audio_bitrate() {
        let streams = vec![
            stream("video", "mp4", Some(500.0), false),
            stream("low", "m4a", Some(48.0), true),
            stream("high", "webm", Some(160.0), true),
            stream("unknown", "m4a", None, true),
        ];
        assert_eq!(select_audio_stream(&streams).unwrap().id, "high");
    }

    #[test]
    fn test_select_none_without_audio() {
        let streams = vec![stream("video", "mp4", None, false)];
        assert!(select_audio_stream(&streams).is_none());
        assert!(select_audio_stream(&[]).is_none());
    }

    #[test]
    fn test_finish_action() {
        assert_eq!(finish_action("mp3", OutputFormat::Mp3), FinishAction::Move);
        assert_eq!(finish_action("WAV", OutputFormat::Wav), FinishAction::Move);
        assert_eq!(finish_action("m4a", OutputFormat::Mp4), FinishAction::Move);
        assert_eq!(finish_action("webm", OutputFormat::Mp4), FinishAction::Move);
        assert_eq!(finish_action("m4a", OutputFormat::Mp3), FinishAction::Convert);
        assert_eq!(finish_action("webm", OutputFormat::Wav), FinishAction::Convert);
    }

    #[tokio::test]
    async fn test_converts_sanitized_title_and_removes_temp() {
        let dir = tempfile::tempdir().unwrap();
        let transcoder = Arc::new(FakeTranscoder::default());
        let coordinator = coordinator(
            FakeResolver::with_stream("My Song: Live!", "m4a"),
            Some(transcoder.clone()),
            true,
        );

        let (outcome, phases) =
            run_collecting(&coordinator, &request(dir.path(), OutputFormat::Mp3)).await;

        let expected_temp = dir.path().join("My Song Live!_orig.m4a");
        assert_eq!(outcome.unwrap(), dir.path().join("My Song Live!.mp3"));
        assert_eq!(
            *transcoder.calls.lock().unwrap(),
            vec![(expected_temp.clone(), OutputFormat::Mp3)]
        );
        assert!(!expected_temp.exists());
        assert_eq!(dir_entries(dir.path()), ["My Song Live!.mp3"]);
        assert_eq!(
            phases,
            [
                DownloadPhase::Resolving,
                DownloadPhase::Downloading,
                DownloadPhase::Converting
            ]
        );
    }

    #[tokio::test]
    async fn test_same_container_is_plain_rename() {
        let dir = tempfile::tempdir().unwrap();
        let transcoder = Arc::new(FakeTranscoder::default());
        let coordinator =
            coordinator(FakeResolver::with_stream("Track", "mp3"), Some(transcoder.clone()), true);

        let (outcome, phases) =
            run_collecting(&coordinator, &request(dir.path(), OutputFormat::Mp3)).await;

        let path = outcome.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), AUDIO_BYTES);
        assert!(transcoder.calls.lock().unwrap().is_empty());
        assert_eq!(dir_entries(dir.path()), ["Track.mp3"]);
        assert_eq!(phases.last(), Some(&DownloadPhase::Finishing));
    }

    #[tokio::test]
    async fn test_rename_overwrites_existing_final_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Track.wav"), b"stale").unwrap();
        let coordinator = coordinator(FakeResolver::with_stream("Track", "wav"), None, false);

        let path = coordinator
            .run(&request(dir.path(), OutputFormat::Wav), &|_| {})
            .await
            .unwrap();

        assert_eq!(std::fs::read(path).unwrap(), AUDIO_BYTES);
    }

    #[tokio::test]
    async fn test_video_container_request_saves_download_unconverted() {
        let dir = tempfile::tempdir().unwrap();
        let transcoder = Arc::new(FakeTranscoder::default());
        let coordinator =
            coordinator(FakeResolver::with_stream("Clip", "m4a"), Some(transcoder.clone()), true);

        let path = coordinator
            .run(&request(dir.path(), OutputFormat::Mp4), &|_| {})
            .await
            .unwrap();

        assert_eq!(path, dir.path().join("Clip.mp4"));
        assert_eq!(std::fs::read(&path).unwrap(), AUDIO_BYTES);
        assert!(transcoder.calls.lock().unwrap().is_empty());
        assert_eq!(dir_entries(dir.path()), ["Clip.mp4"]);
    }

    #[tokio::test]
    async fn test_missing_tool_keeps_temp_and_skips_transcoder() {
        let dir = tempfile::tempdir().unwrap();
        let transcoder = Arc::new(FakeTranscoder::default());
        let coordinator =
            coordinator(FakeResolver::with_stream("Song", "m4a"), Some(transcoder.clone()), false);

        let err = coordinator
            .run(&request(dir.path(), OutputFormat::Wav), &|_| {})
            .await
            .unwrap_err();

        assert!(matches!(&err, AppError::MissingDependency(msg) if msg.contains("ffmpeg")));
        assert!(transcoder.calls.lock().unwrap().is_empty());
        assert!(dir.path().join("Song_orig.m4a").exists());
        assert!(!dir.path().join("Song.wav").exists());
    }

    #[tokio::test]
    async fn test_missing_transcoder_keeps_temp() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(FakeResolver::with_stream("Song", "webm"), None, true);

        let err = coordinator
            .run(&request(dir.path(), OutputFormat::Mp3), &|_| {})
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::MissingDependency(_)));
        assert_eq!(dir_entries(dir.path()), ["Song_orig.webm"]);
    }

    #[tokio::test]
    async fn test_resolution_failure_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(
            FakeResolver::failing(AppError::Resolve("Video unavailable".to_string())),
            Some(Arc::new(FakeTranscoder::default())),
            true,
        );

        let (outcome, phases) =
            run_collecting(&coordinator, &request(dir.path(), OutputFormat::Mp3)).await;

        assert_eq!(
            outcome.unwrap_err(),
            AppError::Resolve("Video unavailable".to_string())
        );
        assert_eq!(phases, [DownloadPhase::Resolving]);
        assert!(dir_entries(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_no_audio_stream_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = FakeResolver {
            result: Ok(ResolvedMedia {
                title: "Silent".to_string(),
                streams: vec![stream("v", "mp4", None, false)],
            }),
            panic_on_resolve: false,
            download: FakeDownload::Complete,
        };
        let coordinator = coordinator(resolver, None, true);

        let err = coordinator
            .run(&request(dir.path(), OutputFormat::Mp3), &|_| {})
            .await
            .unwrap_err();

        assert_eq!(err, AppError::NoAudioStream);
        assert_eq!(err.to_string(), "no audio stream found");
        assert!(dir_entries(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_events_end_with_single_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(FakeResolver::with_stream("Track", "mp3"), None, true);

        let events: Vec<DownloadEvent> = coordinator
            .download_events(request(dir.path(), OutputFormat::Mp3))
            .collect()
            .await;

        assert_eq!(
            events,
            [
                DownloadEvent::Phase(DownloadPhase::Resolving),
                DownloadEvent::Phase(DownloadPhase::Downloading),
                DownloadEvent::Phase(DownloadPhase::Finishing),
                DownloadEvent::Finished(Ok(dir.path().join("Track.mp3"))),
            ]
        );
    }

    #[tokio::test]
    async fn test_events_capture_worker_panic() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = FakeResolver {
            panic_on_resolve: true,
            ..FakeResolver::with_stream("Track", "mp3")
        };
        let coordinator = coordinator(resolver, None, true);

        let events: Vec<DownloadEvent> = coordinator
            .download_events(request(dir.path(), OutputFormat::Mp3))
            .collect()
            .await;

        assert_eq!(
            events.last(),
            Some(&DownloadEvent::Finished(Err(AppError::Unexpected(
                "extractor exploded".to_string()
            ))))
        );
    }

    #[tokio::test]
    async fn test_failed_download_keeps_file_from_earlier_run() {
        let dir = tempfile::tempdir().unwrap();
        let kept = dir.path().join("Song_orig.m4a");
        std::fs::write(&kept, AUDIO_BYTES).unwrap();
        let resolver = FakeResolver {
            download: FakeDownload::FailBeforeWrite(AppError::Download(
                "server rejected request: 403".to_string(),
            )),
            ..FakeResolver::with_stream("Song", "m4a")
        };
        let coordinator = coordinator(resolver, Some(Arc::new(FakeTranscoder::default())), true);

        let err = coordinator
            .run(&request(dir.path(), OutputFormat::Mp3), &|_| {})
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Download(_)));
        assert_eq!(std::fs::read(&kept).unwrap(), AUDIO_BYTES);
    }

    #[tokio::test]
    async fn test_interrupted_download_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = FakeResolver {
            download: FakeDownload::FailMidway(AppError::Download("connection reset".to_string())),
            ..FakeResolver::with_stream("Song", "m4a")
        };
        let coordinator = coordinator(resolver, Some(Arc::new(FakeTranscoder::default())), true);

        let err = coordinator
            .run(&request(dir.path(), OutputFormat::Mp3), &|_| {})
            .await
            .unwrap_err();

        assert_eq!(err, AppError::Download("connection reset".to_string()));
        assert!(dir_entries(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_temp_cleanup_failure_does_not_mask_conversion() {
        let dir = tempfile::tempdir().unwrap();
        let transcoder = Arc::new(FakeTranscoder::with(FakeConversion::ConsumeSource));
        let coordinator =
            coordinator(FakeResolver::with_stream("Song", "m4a"), Some(transcoder.clone()), true);

        let path = coordinator
            .run(&request(dir.path(), OutputFormat::Mp3), &|_| {})
            .await
            .unwrap();

        assert_eq!(path, dir.path().join("Song.mp3"));
        assert_eq!(transcoder.calls.lock().unwrap().len(), 1);
        assert_eq!(dir_entries(dir.path()), ["Song.mp3"]);
    }

    #[tokio::test]
    async fn test_conversion_failure_keeps_temp_and_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let transcoder = Arc::new(FakeTranscoder::with(FakeConversion::Fail));
        let coordinator =
            coordinator(FakeResolver::with_stream("Song", "m4a"), Some(transcoder.clone()), true);

        let events: Vec<DownloadEvent> = coordinator
            .download_events(request(dir.path(), OutputFormat::Wav))
            .collect()
            .await;

        assert_eq!(
            events.last(),
            Some(&DownloadEvent::Finished(Err(AppError::Transcode(
                "Invalid data found".to_string()
            ))))
        );
        assert!(!events
            .iter()
            .any(|e| matches!(e, DownloadEvent::Finished(Ok(_)))));
        assert_eq!(transcoder.calls.lock().unwrap().len(), 1);
        assert_eq!(dir_entries(dir.path()), ["Song_orig.m4a"]);
    }
}
