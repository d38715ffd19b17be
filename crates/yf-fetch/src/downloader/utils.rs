use super::types::{
    DownloadError, EngineOptions, ExtractionPolicy, Job, JobKind, OutputSettings, Postprocessor,
    SubtitleOptions,
};
use anyhow::{Context, Result};
use std::{
    ffi::OsStr,
    fs, io,
    path::{Path, PathBuf},
};
use yf_core::{format, DownloadRequest};

pub const OUTPUT_NAME: &str = "%(title)s.%(ext)s";

/// Looks up every external program a run needs. yt-dlp downloads; ffmpeg
/// merges streams and extracts the MP3, so both must be present up front.
pub fn check_dependencies(yt_dlp: &Path) -> Result<()> {
    require_programs([yt_dlp.as_os_str(), OsStr::new("ffmpeg")])
}

fn require_programs<'a>(programs: impl IntoIterator<Item = &'a OsStr>) -> Result<()> {
    for program in programs {
        let found = which::which(program)
            .with_context(|| format!("Error: '{}' not found in PATH.", program.to_string_lossy()))?;
        tracing::debug!("using {}", found.display());
    }
    Ok(())
}

/// `(name, resolved path)` for each program, for `ytfetch check`.
pub fn dependency_report(yt_dlp: &Path) -> Vec<(String, Option<PathBuf>)> {
    [yt_dlp.as_os_str(), OsStr::new("ffmpeg")]
        .into_iter()
        .map(|program| {
            (
                program.to_string_lossy().into_owned(),
                which::which(program).ok(),
            )
        })
        .collect()
}

/// Creates the destination (and parents) if missing. An existing
/// directory is left as it is.
pub fn ensure_destination(path: &Path) -> io::Result<()> {
    fs::create_dir_all(path)
}

pub fn output_template(destination: &Path) -> PathBuf {
    destination.join(OUTPUT_NAME)
}

/// Maps a request onto the engine configuration for one job kind.
pub fn build_options(request: &DownloadRequest, kind: JobKind, settings: &OutputSettings) -> EngineOptions {
    let subtitles = request.wants_subtitles().then(|| SubtitleOptions {
        languages: request.subtitle_languages.clone(),
        include_auto: request.include_auto_subtitles,
        format: settings.subtitle_format.clone(),
    });

    let (format, merge_output_format, postprocessors) = match kind {
        JobKind::Video => (
            request.quality.format_selector(),
            settings.merge_format.clone(),
            Vec::new(),
        ),
        JobKind::Audio => (
            format::BEST_AUDIO.to_string(),
            None,
            vec![Postprocessor::ExtractAudio {
                codec: settings.audio_codec.clone(),
                quality_kbps: settings.audio_quality_kbps,
            }],
        ),
    };

    EngineOptions {
        format,
        output_template: output_template(&request.destination),
        merge_output_format,
        postprocessors,
        subtitles,
        no_playlist: !request.is_playlist(),
    }
}

/// Prepares the destination and lists the jobs for a request, in the
/// order they must run.
pub fn plan_jobs(request: &DownloadRequest, settings: &OutputSettings) -> Result<Vec<Job>, DownloadError> {
    ensure_destination(&request.destination).map_err(|source| DownloadError::Destination {
        path: request.destination.clone(),
        source,
    })?;

    if request.quality.is_audio_only() {
        return Ok(vec![Job {
            kind: JobKind::Audio,
            options: build_options(request, JobKind::Audio, settings),
        }]);
    }

    let mut jobs = vec![Job {
        kind: JobKind::Video,
        options: build_options(request, JobKind::Video, settings),
    }];

    if settings.extraction == ExtractionPolicy::AfterEveryVideo {
        // Subtitles already come with the video.
        let mut options = build_options(request, JobKind::Audio, settings);
        options.subtitles = None;
        jobs.push(Job {
            kind: JobKind::Audio,
            options,
        });
    }

    Ok(jobs)
}
