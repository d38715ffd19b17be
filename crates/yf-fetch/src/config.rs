use crate::downloader::{ExtractionPolicy, OutputSettings};
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

#[derive(Debug, Clone, Deserialize)]
pub struct DownloadConfig {
    /// Used when the folder prompt is left blank.
    #[serde(default = "default_folder")]
    pub default_folder: PathBuf,
    /// Run an extra MP3 pass after every video download.
    #[serde(default = "default_true")]
    pub extract_audio_after_video: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            default_folder: default_folder(),
            extract_audio_after_video: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioConfig {
    #[serde(default = "default_codec")]
    pub codec: String,
    /// Target bitrate in kbit/s.
    #[serde(default = "default_quality")]
    pub quality_kbps: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            codec: default_codec(),
            quality_kbps: default_quality(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VideoConfig {
    /// Container for merged video+audio. Empty string disables merging hints.
    #[serde(default = "default_merge_format")]
    pub merge_format: String,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            merge_format: default_merge_format(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubtitleConfig {
    /// Ask about subtitles in interactive runs.
    #[serde(default = "default_true")]
    pub prompt: bool,
    #[serde(default = "default_subtitle_format")]
    pub format: String,
    #[serde(default = "default_languages")]
    pub default_languages: String,
}

impl Default for SubtitleConfig {
    fn default() -> Self {
        Self {
            prompt: true,
            format: default_subtitle_format(),
            default_languages: default_languages(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Appended to on every run. Relative paths are relative to the working directory.
    #[serde(default = "default_log_file")]
    pub file: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: default_log_file(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_yt_dlp")]
    pub yt_dlp: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            yt_dlp: default_yt_dlp(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub download: DownloadConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub video: VideoConfig,
    #[serde(default)]
    pub subtitles: SubtitleConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

impl Config {
    /// An explicit path must exist. Otherwise the platform config file is
    /// used when present, and defaults when not.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) if path.is_file() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "ytfetch").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    pub fn output_settings(&self) -> OutputSettings {
        let merge = self.video.merge_format.trim();
        OutputSettings {
            audio_codec: self.audio.codec.clone(),
            audio_quality_kbps: self.audio.quality_kbps,
            merge_format: (!merge.is_empty()).then(|| merge.to_string()),
            subtitle_format: self.subtitles.format.clone(),
            extraction: if self.download.extract_audio_after_video {
                ExtractionPolicy::AfterEveryVideo
            } else {
                ExtractionPolicy::AudioOnlyRequests
            },
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_folder() -> PathBuf {
    PathBuf::from(yf_core::DEFAULT_FOLDER)
}

fn default_codec() -> String {
    "mp3".to_string()
}

fn default_quality() -> u32 {
    192
}

fn default_merge_format() -> String {
    "mp4".to_string()
}

fn default_subtitle_format() -> String {
    "srt/vtt".to_string()
}

fn default_languages() -> String {
    "en".to_string()
}

fn default_log_file() -> PathBuf {
    PathBuf::from("app.log")
}

fn default_yt_dlp() -> PathBuf {
    PathBuf::from("yt-dlp")
}
