use std::{fmt, io, path::PathBuf};
use thiserror::Error;

/// When a separate MP3 pass runs after the main download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionPolicy {
    /// Every successful video download is followed by an audio-only pass.
    AfterEveryVideo,
    /// Audio is only extracted when the user asked for audio only.
    AudioOnlyRequests,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Video,
    Audio,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Video => f.write_str("video"),
            JobKind::Audio => f.write_str("audio"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Postprocessor {
    /// Extract the audio track and re-encode it (ffmpeg).
    ExtractAudio { codec: String, quality_kbps: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleOptions {
    pub languages: Vec<String>,
    pub include_auto: bool,
    /// Preference list, e.g. `srt/vtt`.
    pub format: String,
}

/// Write-once configuration for a single engine session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    pub format: String,
    /// `<destination>/%(title)s.%(ext)s`
    pub output_template: PathBuf,
    pub merge_output_format: Option<String>,
    pub postprocessors: Vec<Postprocessor>,
    pub subtitles: Option<SubtitleOptions>,
    pub no_playlist: bool,
}

impl EngineOptions {
    pub fn extract_audio_codec(&self) -> Option<&str> {
        self.postprocessors.iter().find_map(|pp| match pp {
            Postprocessor::ExtractAudio { codec, .. } => Some(codec.as_str()),
        })
    }
}

#[derive(Debug, Clone)]
pub struct Job {
    pub kind: JobKind,
    pub options: EngineOptions,
}

/// Settings the option builder needs besides the request itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSettings {
    pub audio_codec: String,
    pub audio_quality_kbps: u32,
    pub merge_format: Option<String>,
    pub subtitle_format: String,
    pub extraction: ExtractionPolicy,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            audio_codec: "mp3".to_string(),
            audio_quality_kbps: 192,
            merge_format: Some("mp4".to_string()),
            subtitle_format: "srt/vtt".to_string(),
            extraction: ExtractionPolicy::AfterEveryVideo,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Downloading {
        downloaded_bytes: u64,
        total_bytes: Option<u64>,
        /// Bytes per second.
        speed: Option<f64>,
        /// Seconds remaining.
        eta: Option<u64>,
    },
    /// One stream is complete. A job may fetch several (video, then audio)
    /// before its final file exists.
    StreamFinished,
    Finished {
        filename: PathBuf,
    },
    Error {
        message: String,
    },
}

impl ProgressEvent {
    /// 0.0 - 100.0, only when the total is known.
    pub fn percent(&self) -> Option<f64> {
        match self {
            ProgressEvent::Downloading {
                downloaded_bytes,
                total_bytes: Some(total),
                ..
            } if *total > 0 => Some((*downloaded_bytes as f64 / *total as f64 * 100.0).min(100.0)),
            _ => None,
        }
    }
}

/// Receives progress events from inside an engine session.
pub trait ProgressSink {
    fn report(&mut self, event: &ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: FnMut(&ProgressEvent),
{
    fn report(&mut self, event: &ProgressEvent) {
        self(event)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DownloadReport {
    /// Final file paths, in job order.
    pub artifacts: Vec<PathBuf>,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{0}")]
    Failed(String),
    #[error("i/o error while talking to the engine: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("no link provided")]
    EmptyUrl,
    #[error("cannot prepare destination {}: {source}", .path.display())]
    Destination {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to download {url} ({job} job): {source}")]
    Engine {
        url: String,
        job: JobKind,
        #[source]
        source: EngineError,
    },
}

/// Values supplied on the command line; anything left `None` is prompted.
#[derive(Debug, Clone, Default)]
pub struct DownloadArgs {
    pub url: Option<String>,
    pub quality: Option<String>,
    pub folder: Option<String>,
    pub subtitles: Option<String>,
    pub auto_subtitles: bool,
    pub no_subtitles: bool,
    pub no_mp3: bool,
}
