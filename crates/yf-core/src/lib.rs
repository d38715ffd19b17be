use std::{fmt, path::PathBuf, str::FromStr};

/// Format selector expressions understood by yt-dlp.
pub mod format {
    pub const BEST_VIDEO_AUDIO: &str = "bestvideo+bestaudio/best";
    pub const WORST_VIDEO_AUDIO: &str = "worstvideo+worstaudio/worst";
    pub const BEST_AUDIO: &str = "bestaudio/best";

    /// `bestvideo[height=H]+bestaudio/best`
    pub fn height_constrained(height: u32) -> String {
        format!("bestvideo[height={}]+bestaudio/best", height)
    }
}

pub const DEFAULT_FOLDER: &str = "downloads";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualitySelector {
    Highest,
    Lowest,
    /// Target video height in pixels. Zero means "no constraint".
    Custom(u32),
    AudioOnly,
}

impl QualitySelector {
    /// Builds a selector from a `"<integer>p"` string, falling back to
    /// `Highest` when the input doesn't parse.
    pub fn from_resolution(input: &str) -> Self {
        match parse_resolution(input) {
            Some(height) => Self::Custom(height),
            None => Self::Highest,
        }
    }

    pub fn format_selector(&self) -> String {
        match *self {
            Self::Highest => format::BEST_VIDEO_AUDIO.to_string(),
            Self::Lowest => format::WORST_VIDEO_AUDIO.to_string(),
            Self::Custom(0) => format::BEST_VIDEO_AUDIO.to_string(),
            Self::Custom(height) => format::height_constrained(height),
            Self::AudioOnly => format::BEST_AUDIO.to_string(),
        }
    }

    #[inline]
    pub fn is_audio_only(&self) -> bool {
        matches!(self, Self::AudioOnly)
    }
}

impl fmt::Display for QualitySelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Highest => f.write_str("highest"),
            Self::Lowest => f.write_str("lowest"),
            Self::Custom(0) => f.write_str("best available"),
            Self::Custom(height) => write!(f, "{}p", height),
            Self::AudioOnly => f.write_str("audio only"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownQuality(pub String);

impl fmt::Display for UnknownQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown quality '{}'", self.0)
    }
}

impl std::error::Error for UnknownQuality {}

/// Parses the values accepted on the command line: menu numbers 1-3,
/// the words `highest`/`lowest`/`audio`, or a resolution like `720p`.
impl FromStr for QualitySelector {
    type Err = UnknownQuality;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "1" | "highest" | "best" => Ok(Self::Highest),
            "2" | "lowest" | "worst" => Ok(Self::Lowest),
            "3" | "audio" | "mp3" => Ok(Self::AudioOnly),
            _ => parse_resolution(trimmed)
                .map(Self::Custom)
                .ok_or_else(|| UnknownQuality(trimmed.to_string())),
        }
    }
}

/// Answer to the "Download options" menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    Quality(QualitySelector),
    /// Option 4: the caller still has to ask for a resolution.
    CustomResolution,
    Unrecognized,
}

pub fn parse_menu_choice(input: &str) -> MenuChoice {
    match input.trim() {
        "1" => MenuChoice::Quality(QualitySelector::Highest),
        "2" => MenuChoice::Quality(QualitySelector::Lowest),
        "3" => MenuChoice::Quality(QualitySelector::AudioOnly),
        "4" => MenuChoice::CustomResolution,
        _ => MenuChoice::Unrecognized,
    }
}

/// `"720p"` -> `Some(720)`. Zero, a missing `p` suffix, or anything that
/// is not a plain integer yields `None`.
pub fn parse_resolution(input: &str) -> Option<u32> {
    let digits = input.trim().strip_suffix('p')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse::<u32>().ok().filter(|h| *h > 0)
}

/// Splits `"en, es-419,fr"` into tags, dropping empty entries.
pub fn parse_languages(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|lang| !lang.is_empty())
        .map(String::from)
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct DownloadRequest {
    pub url: String,
    pub destination: PathBuf,
    pub quality: QualitySelector,
    pub subtitle_languages: Vec<String>,
    pub include_auto_subtitles: bool,
}

impl DownloadRequest {
    pub fn new(url: impl Into<String>, destination: impl Into<PathBuf>, quality: QualitySelector) -> Self {
        Self {
            url: url.into().trim().to_string(),
            destination: destination.into(),
            quality,
            subtitle_languages: Vec::new(),
            include_auto_subtitles: false,
        }
    }

    pub fn with_subtitles(mut self, languages: Vec<String>, include_auto: bool) -> Self {
        self.subtitle_languages = languages;
        self.include_auto_subtitles = include_auto;
        self
    }

    #[inline]
    pub fn has_url(&self) -> bool {
        !self.url.trim().is_empty()
    }

    #[inline]
    pub fn wants_subtitles(&self) -> bool {
        !self.subtitle_languages.is_empty()
    }

    pub fn is_playlist(&self) -> bool {
        self.url.to_ascii_lowercase().contains("playlist")
    }
}
