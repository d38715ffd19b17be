use super::core::process_download;
use super::engine::YtDlpEngine;
use super::prompt::{Prompter, TermPrompter};
use super::types::{DownloadArgs, DownloadReport, ExtractionPolicy, ProgressEvent, ProgressSink};
use super::utils::check_dependencies;
use crate::config::Config;
use anyhow::Result;
use indicatif::{HumanBytes, ProgressBar, ProgressStyle};
use std::path::PathBuf;
use yf_core::{parse_languages, parse_menu_choice, DownloadRequest, MenuChoice, QualitySelector};

pub fn run_cli(args: DownloadArgs, config: &Config) -> Result<DownloadReport> {
    let mut settings = config.output_settings();
    if args.no_mp3 {
        settings.extraction = ExtractionPolicy::AudioOnlyRequests;
    }

    let mut prompter = TermPrompter::default();
    let request = collect_request(&args, config, settings.extraction, &mut prompter)?;

    // An empty link is rejected by the invoker; no need for yt-dlp then.
    if request.has_url() {
        check_dependencies(&config.engine.yt_dlp)?;
    }

    let engine = YtDlpEngine::new(&config.engine.yt_dlp);
    let mut progress = TerminalProgress::new();
    let result = process_download(&engine, &request, &settings, &mut progress);
    progress.finish();

    let report = result?;
    for path in &report.artifacts {
        println!("✅ Saved: {}", path.display());
    }
    Ok(report)
}

/// Asks for whatever the command line didn't provide. Stops after the URL
/// prompt when it's left empty.
pub fn collect_request(
    args: &DownloadArgs,
    config: &Config,
    extraction: ExtractionPolicy,
    prompter: &mut dyn Prompter,
) -> Result<DownloadRequest> {
    let url = match &args.url {
        Some(url) => url.clone(),
        None => prompter.text("Enter video or playlist link", None)?,
    };
    if url.trim().is_empty() {
        return Ok(DownloadRequest::new(
            url,
            config.download.default_folder.clone(),
            QualitySelector::Highest,
        ));
    }

    let quality = resolve_quality(args.quality.as_deref(), extraction, prompter)?;
    let destination = resolve_folder(args.folder.as_deref(), config, prompter)?;
    let (languages, include_auto) = resolve_subtitles(args, config, prompter)?;

    Ok(DownloadRequest::new(url, destination, quality).with_subtitles(languages, include_auto))
}

pub fn menu_text(extraction: ExtractionPolicy) -> String {
    let mp3 = match extraction {
        ExtractionPolicy::AfterEveryVideo => " (+ mp3)",
        ExtractionPolicy::AudioOnlyRequests => "",
    };
    format!(
        "\nDownload options:\n\
         1. Highest resolution video{mp3}\n\
         2. Lowest resolution video{mp3}\n\
         3. Audio only (mp3)\n\
         4. Custom resolution{mp3}"
    )
}

pub fn resolve_quality(
    arg: Option<&str>,
    extraction: ExtractionPolicy,
    prompter: &mut dyn Prompter,
) -> Result<QualitySelector> {
    if let Some(value) = arg {
        return Ok(value.parse().unwrap_or_else(|e| {
            tracing::warn!("{}; defaulting to highest resolution.", e);
            QualitySelector::Highest
        }));
    }

    prompter.notice(&menu_text(extraction));
    let choice = prompter.text("Enter choice (1-4)", None)?;
    match parse_menu_choice(&choice) {
        MenuChoice::Quality(quality) => Ok(quality),
        MenuChoice::CustomResolution => {
            let resolution = prompter.text("Enter resolution (e.g., 360p, 720p, 1080p)", None)?;
            let quality = QualitySelector::from_resolution(&resolution);
            if quality == QualitySelector::Highest {
                tracing::warn!(
                    "Resolution '{}' not recognized. Using best available quality.",
                    resolution.trim()
                );
            }
            Ok(quality)
        }
        MenuChoice::Unrecognized => {
            tracing::warn!("Invalid choice. Defaulting to highest resolution.");
            Ok(QualitySelector::Highest)
        }
    }
}

pub fn resolve_folder(arg: Option<&str>, config: &Config, prompter: &mut dyn Prompter) -> Result<PathBuf> {
    let answer = match arg {
        Some(folder) => folder.to_string(),
        None => {
            let prompt = format!(
                "Enter download folder (leave blank for '{}')",
                config.download.default_folder.display()
            );
            prompter.text(&prompt, None)?
        }
    };
    let answer = answer.trim();
    Ok(if answer.is_empty() {
        config.download.default_folder.clone()
    } else {
        PathBuf::from(answer)
    })
}

pub fn resolve_subtitles(
    args: &DownloadArgs,
    config: &Config,
    prompter: &mut dyn Prompter,
) -> Result<(Vec<String>, bool)> {
    if args.no_subtitles {
        return Ok((Vec::new(), false));
    }
    if let Some(langs) = &args.subtitles {
        return Ok((parse_languages(langs), args.auto_subtitles));
    }
    if !config.subtitles.prompt || !prompter.confirm("Download subtitles?", false)? {
        return Ok((Vec::new(), false));
    }

    let defaults = &config.subtitles.default_languages;
    let prompt = format!("Enter subtitle languages (e.g., en,es-419,fr) [default: {}]", defaults);
    let mut languages = parse_languages(&prompter.text(&prompt, Some(defaults))?);
    if languages.is_empty() {
        languages = parse_languages(defaults);
    }
    let include_auto = prompter.confirm("Include auto-generated subtitles?", false)?;
    Ok((languages, include_auto))
}

/// Progress bar fed by engine events. The bar's length is set the first
/// time a stream reports its size, and a fresh bar starts for each new
/// stream after a finished one (a merged download fetches two).
pub struct TerminalProgress {
    bar: ProgressBar,
    stream_finished: bool,
}

impl TerminalProgress {
    pub fn new() -> Self {
        Self::with_bar(new_bar())
    }

    pub fn with_bar(bar: ProgressBar) -> Self {
        bar.set_message("Starting...");
        Self {
            bar,
            stream_finished: false,
        }
    }

    pub fn length(&self) -> Option<u64> {
        self.bar.length()
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl Default for TerminalProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for TerminalProgress {
    fn report(&mut self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Downloading {
                downloaded_bytes,
                total_bytes,
                ..
            } => {
                if self.stream_finished {
                    self.stream_finished = false;
                    self.bar.finish_and_clear();
                    let hidden = self.bar.is_hidden();
                    self.bar = if hidden { ProgressBar::hidden() } else { new_bar() };
                }
                if self.bar.length().is_none() {
                    if let Some(total) = total_bytes {
                        self.bar.set_length(*total);
                    }
                }
                self.bar.set_position(*downloaded_bytes);
                self.bar.set_message(describe_progress(event));
            }
            ProgressEvent::StreamFinished => self.stream_finished = true,
            ProgressEvent::Finished { filename } => {
                let name = filename
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| filename.display().to_string());
                self.bar.set_message(format!("Finished: {}", name));
                self.bar.suspend(|| tracing::info!("Download finished: {}", filename.display()));
                self.stream_finished = true;
            }
            ProgressEvent::Error { message } => {
                self.bar.set_message("Error!");
                self.bar.suspend(|| tracing::error!("Error during download: {}", message));
            }
        }
    }
}

fn new_bar() -> ProgressBar {
    let bar = ProgressBar::no_length();
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-"),
    );
    bar
}

/// `"Downloading... 45.0% | 1.20 MiB/s | ETA 00:31"`
pub fn describe_progress(event: &ProgressEvent) -> String {
    let ProgressEvent::Downloading {
        downloaded_bytes,
        speed,
        eta,
        ..
    } = event
    else {
        return String::new();
    };

    let mut parts = vec![match event.percent() {
        Some(pct) => format!("Downloading... {:.1}%", pct),
        None => format!("Downloading... {}", HumanBytes(*downloaded_bytes)),
    }];
    if let Some(rate) = speed {
        parts.push(format!("{}/s", HumanBytes(rate.round() as u64)));
    }
    if let Some(secs) = eta {
        parts.push(format!("ETA {}", format_eta(*secs)));
    }
    parts.join(" | ")
}

/// `mm:ss`, or `h:mm:ss` past an hour.
pub fn format_eta(secs: u64) -> String {
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{:02}:{:02}", m, s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::{engine::parse_line, prompt::ScriptedPrompter};

    fn downloading(done: u64, total: Option<u64>) -> ProgressEvent {
        ProgressEvent::Downloading {
            downloaded_bytes: done,
            total_bytes: total,
            speed: Some(1_258_291.2),
            eta: Some(31),
        }
    }

    #[test]
    fn eta_formatting() {
        assert_eq!(format_eta(0), "00:00");
        assert_eq!(format_eta(31), "00:31");
        assert_eq!(format_eta(3_725), "1:02:05");
    }

    #[test]
    fn progress_line_has_percent_rate_and_eta() {
        let line = describe_progress(&downloading(450, Some(1000)));
        assert_eq!(line, "Downloading... 45.0% | 1.20 MiB/s | ETA 00:31");
    }

    #[test]
    fn progress_line_without_total_shows_bytes() {
        let event = ProgressEvent::Downloading {
            downloaded_bytes: 2048,
            total_bytes: None,
            speed: None,
            eta: None,
        };
        assert_eq!(describe_progress(&event), "Downloading... 2.00 KiB");
    }

    #[test]
    fn bar_length_is_set_lazily() {
        let mut progress = TerminalProgress::with_bar(ProgressBar::hidden());
        progress.report(&downloading(10, None));
        assert_eq!(progress.length(), None);
        progress.report(&downloading(20, Some(100)));
        assert_eq!(progress.length(), Some(100));
        progress.report(&downloading(30, Some(250)));
        assert_eq!(progress.length(), Some(100));

        progress.report(&ProgressEvent::Finished {
            filename: PathBuf::from("downloads/clip.f137.mp4"),
        });
        progress.report(&downloading(5, Some(40)));
        assert_eq!(progress.length(), Some(40));
    }

    #[test]
    fn second_stream_of_a_merge_gets_a_new_bar() {
        let lines = [
            r#"yf-progress:{"status": "downloading", "downloaded_bytes": 100, "total_bytes": 1000}"#,
            r#"yf-progress:{"status": "finished", "downloaded_bytes": 1000, "total_bytes": 1000}"#,
            r#"yf-progress:{"status": "downloading", "downloaded_bytes": 10, "total_bytes": 200}"#,
        ];

        let mut progress = TerminalProgress::with_bar(ProgressBar::hidden());
        for event in lines.iter().filter_map(|line| parse_line(line)) {
            progress.report(&event);
        }
        assert_eq!(progress.length(), Some(200));
    }

    #[test]
    fn quality_from_menu() {
        let mut p = ScriptedPrompter::new(["3"]);
        assert_eq!(
            resolve_quality(None, ExtractionPolicy::AfterEveryVideo, &mut p).unwrap(),
            QualitySelector::AudioOnly
        );

        let mut p = ScriptedPrompter::new(["4", "1080p"]);
        assert_eq!(
            resolve_quality(None, ExtractionPolicy::AfterEveryVideo, &mut p).unwrap(),
            QualitySelector::Custom(1080)
        );

        let mut p = ScriptedPrompter::new(["4", "big"]);
        assert_eq!(
            resolve_quality(None, ExtractionPolicy::AfterEveryVideo, &mut p).unwrap(),
            QualitySelector::Highest
        );

        let mut p = ScriptedPrompter::new(["9"]);
        assert_eq!(
            resolve_quality(None, ExtractionPolicy::AfterEveryVideo, &mut p).unwrap(),
            QualitySelector::Highest
        );
    }

    #[test]
    fn quality_from_flag_skips_the_menu() {
        let mut p = ScriptedPrompter::default();
        assert_eq!(
            resolve_quality(Some("720p"), ExtractionPolicy::AfterEveryVideo, &mut p).unwrap(),
            QualitySelector::Custom(720)
        );
        assert_eq!(
            resolve_quality(Some("nonsense"), ExtractionPolicy::AfterEveryVideo, &mut p).unwrap(),
            QualitySelector::Highest
        );
        assert!(p.asked().is_empty());
    }

    #[test]
    fn menu_mentions_mp3_only_when_it_will_happen() {
        assert!(menu_text(ExtractionPolicy::AfterEveryVideo).contains("Highest resolution video (+ mp3)"));
        assert!(!menu_text(ExtractionPolicy::AudioOnlyRequests).contains("(+ mp3)\n"));
        assert!(menu_text(ExtractionPolicy::AudioOnlyRequests).contains("3. Audio only (mp3)"));
    }

    #[test]
    fn blank_folder_uses_default() {
        let config = Config::default();
        let mut p = ScriptedPrompter::new(["  "]);
        assert_eq!(resolve_folder(None, &config, &mut p).unwrap(), PathBuf::from("downloads"));
        let mut p = ScriptedPrompter::new(["out"]);
        assert_eq!(resolve_folder(None, &config, &mut p).unwrap(), PathBuf::from("out"));
    }

    #[test]
    fn subtitle_prompts() {
        let config = Config::default();
        let args = DownloadArgs::default();

        let mut p = ScriptedPrompter::new(["n"]);
        assert_eq!(resolve_subtitles(&args, &config, &mut p).unwrap(), (vec![], false));

        let mut p = ScriptedPrompter::new(["y", "", "n"]);
        assert_eq!(
            resolve_subtitles(&args, &config, &mut p).unwrap(),
            (vec!["en".to_string()], false)
        );

        let mut p = ScriptedPrompter::new(["y", "en, es-419", "y"]);
        assert_eq!(
            resolve_subtitles(&args, &config, &mut p).unwrap(),
            (vec!["en".to_string(), "es-419".to_string()], true)
        );
    }

    #[test]
    fn subtitle_flags_skip_prompts() {
        let mut config = Config::default();
        let mut p = ScriptedPrompter::default();

        let args = DownloadArgs {
            subtitles: Some("fr,de".into()),
            auto_subtitles: true,
            ..DownloadArgs::default()
        };
        assert_eq!(
            resolve_subtitles(&args, &config, &mut p).unwrap(),
            (vec!["fr".to_string(), "de".to_string()], true)
        );

        config.subtitles.prompt = false;
        assert_eq!(
            resolve_subtitles(&DownloadArgs::default(), &config, &mut p).unwrap(),
            (vec![], false)
        );
        assert!(p.asked().is_empty());
    }

    #[test]
    fn empty_url_stops_prompting() {
        let config = Config::default();
        let mut p = ScriptedPrompter::new([""]);
        let req = collect_request(
            &DownloadArgs::default(),
            &config,
            ExtractionPolicy::AfterEveryVideo,
            &mut p,
        )
        .unwrap();
        assert!(!req.has_url());
        assert_eq!(p.asked().len(), 1);
    }
}
