use super::engine::{EngineSession, MediaEngine};
use super::types::{DownloadError, DownloadReport, EngineError, Job, JobKind, OutputSettings, ProgressSink};
use super::utils::plan_jobs;
use std::path::PathBuf;
use tracing::{error, info};
use yf_core::DownloadRequest;

/// Runs every job for a request, one after the other. Each job gets its own
/// engine session, released before the next one starts. The first failure
/// ends the run.
pub fn process_download<E: MediaEngine>(
    engine: &E,
    request: &DownloadRequest,
    settings: &OutputSettings,
    sink: &mut dyn ProgressSink,
) -> Result<DownloadReport, DownloadError> {
    if !request.has_url() {
        error!("No link provided. Exiting.");
        return Err(DownloadError::EmptyUrl);
    }

    let jobs = plan_jobs(request, settings).inspect_err(|e| error!("{}", e))?;
    info!(
        "Quality: {} | Destination: {} | Jobs: {}",
        request.quality,
        request.destination.display(),
        jobs.len()
    );

    let mut report = DownloadReport::default();
    for job in &jobs {
        announce(request, job);
        match run_job(engine, &request.url, job, sink) {
            Ok(files) => report.artifacts.extend(files),
            Err(source) => {
                error!("Failed to download {}: {}", request.url, source);
                return Err(DownloadError::Engine {
                    url: request.url.clone(),
                    job: job.kind,
                    source,
                });
            }
        }
    }

    info!("Done: {} file(s) in {}", report.artifacts.len(), request.destination.display());
    Ok(report)
}

fn announce(request: &DownloadRequest, job: &Job) {
    match job.kind {
        JobKind::Video if request.is_playlist() => info!("Fetching playlist: {}", request.url),
        JobKind::Video => info!("Fetching video: {}", request.url),
        JobKind::Audio => info!("Fetching audio: {}", request.url),
    }
}

fn run_job<E: MediaEngine>(
    engine: &E,
    url: &str,
    job: &Job,
    sink: &mut dyn ProgressSink,
) -> Result<Vec<PathBuf>, EngineError> {
    let mut session = engine.open(&job.options)?;
    session.download(url, sink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::types::{EngineOptions, ExtractionPolicy, ProgressEvent};
    use std::cell::RefCell;
    use yf_core::QualitySelector;

    /// Records what it was asked to do; fails on the n-th open when told to.
    #[derive(Default)]
    struct Recorder {
        opened: RefCell<Vec<EngineOptions>>,
        fail_at: Option<usize>,
    }

    struct RecordedSession {
        fail: bool,
        template: PathBuf,
    }

    impl MediaEngine for Recorder {
        type Session = RecordedSession;

        fn open(&self, options: &EngineOptions) -> Result<RecordedSession, EngineError> {
            let mut opened = self.opened.borrow_mut();
            let fail = self.fail_at == Some(opened.len());
            opened.push(options.clone());
            Ok(RecordedSession {
                fail,
                template: options.output_template.clone(),
            })
        }
    }

    impl EngineSession for RecordedSession {
        fn download(&mut self, _url: &str, sink: &mut dyn ProgressSink) -> Result<Vec<PathBuf>, EngineError> {
            if self.fail {
                return Err(EngineError::Failed("Requested format is not available".into()));
            }
            let filename = self.template.with_file_name("clip.bin");
            sink.report(&ProgressEvent::Finished {
                filename: filename.clone(),
            });
            Ok(vec![filename])
        }
    }

    fn request(quality: QualitySelector) -> (tempfile::TempDir, DownloadRequest) {
        let dir = tempfile::tempdir().unwrap();
        let req = DownloadRequest::new("https://example/video", dir.path().join("dl"), quality);
        (dir, req)
    }

    #[test]
    fn empty_url_never_reaches_the_engine() {
        let engine = Recorder::default();
        let req = DownloadRequest::new("  ", "unused", QualitySelector::Highest);
        let mut sink = |_: &ProgressEvent| {};
        let result = process_download(&engine, &req, &OutputSettings::default(), &mut sink);
        assert!(matches!(result, Err(DownloadError::EmptyUrl)));
        assert!(engine.opened.borrow().is_empty());
        assert!(!std::path::Path::new("unused").exists());
    }

    #[test]
    fn video_then_audio() {
        let engine = Recorder::default();
        let (_dir, req) = request(QualitySelector::Custom(480));
        let mut finished = 0;
        let mut sink = |e: &ProgressEvent| {
            if matches!(e, ProgressEvent::Finished { .. }) {
                finished += 1;
            }
        };
        let report = process_download(&engine, &req, &OutputSettings::default(), &mut sink).unwrap();

        let opened = engine.opened.borrow();
        assert_eq!(opened.len(), 2);
        assert_eq!(opened[0].format, "bestvideo[height=480]+bestaudio/best");
        assert_eq!(opened[1].format, "bestaudio/best");
        assert_eq!(report.artifacts.len(), 2);
        assert_eq!(finished, 2);
    }

    #[test]
    fn audio_policy_only_for_audio_requests() {
        let engine = Recorder::default();
        let (_dir, req) = request(QualitySelector::Highest);
        let settings = OutputSettings {
            extraction: ExtractionPolicy::AudioOnlyRequests,
            ..OutputSettings::default()
        };
        let mut sink = |_: &ProgressEvent| {};
        process_download(&engine, &req, &settings, &mut sink).unwrap();
        assert_eq!(engine.opened.borrow().len(), 1);
    }

    #[test]
    fn failure_stops_the_run_with_context() {
        let engine = Recorder {
            fail_at: Some(0),
            ..Recorder::default()
        };
        let (_dir, req) = request(QualitySelector::Highest);
        let mut sink = |_: &ProgressEvent| {};
        let err = process_download(&engine, &req, &OutputSettings::default(), &mut sink).unwrap_err();

        match err {
            DownloadError::Engine { url, job, source } => {
                assert_eq!(url, "https://example/video");
                assert_eq!(job, JobKind::Video);
                assert!(source.to_string().contains("not available"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(engine.opened.borrow().len(), 1);
    }

    #[test]
    fn failure_in_the_audio_pass_is_reported_as_audio() {
        let engine = Recorder {
            fail_at: Some(1),
            ..Recorder::default()
        };
        let (_dir, req) = request(QualitySelector::Lowest);
        let mut sink = |_: &ProgressEvent| {};
        let err = process_download(&engine, &req, &OutputSettings::default(), &mut sink).unwrap_err();
        assert!(matches!(err, DownloadError::Engine { job: JobKind::Audio, .. }));
    }
}
