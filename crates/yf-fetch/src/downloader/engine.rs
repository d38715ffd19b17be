use super::types::{EngineError, EngineOptions, Postprocessor, ProgressEvent, ProgressSink};
use serde::Deserialize;
use std::{
    io::{self, BufRead, BufReader, Read},
    path::PathBuf,
    process::{Child, Command, Stdio},
    sync::mpsc::{self, Sender},
    thread::{self, JoinHandle},
};

const PROGRESS_MARKER: &str = "yf-progress:";
const FILE_MARKER: &str = "yf-file:";

/// Something that can open download sessions.
pub trait MediaEngine {
    type Session: EngineSession;

    fn open(&self, options: &EngineOptions) -> Result<Self::Session, EngineError>;
}

/// An opened engine configuration. Resources are released on drop, whether
/// or not `download` succeeded.
pub trait EngineSession {
    /// Blocks until the URL has been fetched and post-processed. Returns the
    /// final file paths.
    fn download(&mut self, url: &str, sink: &mut dyn ProgressSink) -> Result<Vec<PathBuf>, EngineError>;
}

/// Drives the `yt-dlp` executable.
#[derive(Debug, Clone)]
pub struct YtDlpEngine {
    program: PathBuf,
}

impl YtDlpEngine {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for YtDlpEngine {
    fn default() -> Self {
        Self::new("yt-dlp")
    }
}

impl MediaEngine for YtDlpEngine {
    type Session = YtDlpSession;

    fn open(&self, options: &EngineOptions) -> Result<YtDlpSession, EngineError> {
        Ok(YtDlpSession {
            program: self.program.clone(),
            args: render_args(options),
            child: None,
        })
    }
}

pub struct YtDlpSession {
    program: PathBuf,
    args: Vec<String>,
    child: Option<Child>,
}

impl EngineSession for YtDlpSession {
    fn download(&mut self, url: &str, sink: &mut dyn ProgressSink) -> Result<Vec<PathBuf>, EngineError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| EngineError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        self.child = Some(child);

        // Both pipes are drained on their own threads so neither can fill up
        // and stall yt-dlp. Lines are handled here, in arrival order.
        let (tx, rx) = mpsc::channel();
        let readers: Vec<_> = [
            stdout.map(|pipe| drain(pipe, tx.clone(), Output::Stdout)),
            stderr.map(|pipe| drain(pipe, tx.clone(), Output::Stderr)),
        ]
        .into_iter()
        .flatten()
        .collect();
        drop(tx);

        let mut artifacts = Vec::new();
        let mut last_error = None;
        let mut read_error = None;
        for output in rx {
            match output {
                Output::Stdout(line) => match parse_line(&line) {
                    Some(event) => {
                        if let ProgressEvent::Finished { filename } = &event {
                            artifacts.push(filename.clone());
                        }
                        sink.report(&event);
                    }
                    None if !line.trim().is_empty() => tracing::debug!("yt-dlp: {}", line),
                    None => {}
                },
                Output::Stderr(line) => {
                    if let Some(message) = line.strip_prefix("ERROR:") {
                        let message = message.trim().to_string();
                        sink.report(&ProgressEvent::Error {
                            message: message.clone(),
                        });
                        last_error = Some(message);
                    } else if let Some(message) = line.strip_prefix("WARNING:") {
                        tracing::warn!("yt-dlp: {}", message.trim());
                    } else if !line.trim().is_empty() {
                        tracing::debug!("yt-dlp: {}", line);
                    }
                }
                Output::ReadFailed(err) => {
                    // The other reader only stops once the process is gone.
                    if let Some(child) = self.child.as_mut() {
                        let _ = child.kill();
                    }
                    if read_error.is_none() {
                        read_error = Some(err);
                    }
                }
            }
        }
        for reader in readers {
            let _ = reader.join();
        }

        let status = match self.child.as_mut() {
            Some(child) => child.wait()?,
            None => return Err(EngineError::Failed("yt-dlp process went away".into())),
        };
        self.child = None;

        if let Some(err) = read_error {
            return Err(EngineError::Io(err));
        }
        if !status.success() {
            return Err(EngineError::Failed(
                last_error.unwrap_or_else(|| format!("yt-dlp exited with {}", status)),
            ));
        }
        Ok(artifacts)
    }
}

impl Drop for YtDlpSession {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            tracing::debug!("stopping unfinished yt-dlp process {}", child.id());
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

enum Output {
    Stdout(String),
    Stderr(String),
    ReadFailed(io::Error),
}

/// Forwards every line of `pipe` until end of file. Bytes that aren't valid
/// UTF-8 are replaced rather than treated as an error.
fn drain<R>(pipe: R, tx: Sender<Output>, wrap: fn(String) -> Output) -> JoinHandle<()>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut reader = BufReader::new(pipe);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf)
                        .trim_end_matches(['\r', '\n'])
                        .to_string();
                    if tx.send(wrap(line)).is_err() {
                        break;
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    let _ = tx.send(Output::ReadFailed(err));
                    break;
                }
            }
        }
    })
}

/// Renders engine options as yt-dlp command-line arguments (URL excluded).
pub fn render_args(options: &EngineOptions) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "--newline".into(),
        "--progress".into(),
        "--encoding".into(),
        "utf-8".into(),
        "--progress-template".into(),
        format!("download:{}%(progress)j", PROGRESS_MARKER),
        "--print".into(),
        format!("after_move:{}%(filepath)s", FILE_MARKER),
        "-f".into(),
        options.format.clone(),
        "-o".into(),
        options.output_template.to_string_lossy().into_owned(),
    ];

    if let Some(container) = &options.merge_output_format {
        args.push("--merge-output-format".into());
        args.push(container.clone());
    }

    for pp in &options.postprocessors {
        match pp {
            Postprocessor::ExtractAudio {
                codec,
                quality_kbps,
            } => {
                args.push("--extract-audio".into());
                args.push("--audio-format".into());
                args.push(codec.clone());
                args.push("--audio-quality".into());
                args.push(format!("{}K", quality_kbps));
            }
        }
    }

    if let Some(subs) = &options.subtitles {
        args.push("--write-subs".into());
        args.push("--sub-langs".into());
        args.push(subs.languages.join(","));
        args.push("--sub-format".into());
        args.push(subs.format.clone());
        if subs.include_auto {
            args.push("--write-auto-subs".into());
        }
    }

    args.push(if options.no_playlist { "--no-playlist" } else { "--yes-playlist" }.into());
    args
}

#[derive(Debug, Deserialize)]
struct RawProgress {
    status: String,
    #[serde(default)]
    downloaded_bytes: Option<f64>,
    #[serde(default)]
    total_bytes: Option<f64>,
    #[serde(default)]
    total_bytes_estimate: Option<f64>,
    #[serde(default)]
    speed: Option<f64>,
    #[serde(default)]
    eta: Option<f64>,
}

/// Turns one line of yt-dlp output into an event, if it is one of ours.
/// A `"finished"` progress record only closes a stream; the final path
/// arrives later on the `after_move` line.
pub fn parse_line(line: &str) -> Option<ProgressEvent> {
    let line = line.trim_end_matches(['\r', '\n']);

    if let Some(path) = line.strip_prefix(FILE_MARKER) {
        let path = path.trim();
        if path.is_empty() || path == "NA" {
            return None;
        }
        return Some(ProgressEvent::Finished {
            filename: PathBuf::from(path),
        });
    }

    let json = line.strip_prefix(PROGRESS_MARKER)?;
    let raw: RawProgress = serde_json::from_str(json.trim()).ok()?;
    match raw.status.as_str() {
        "downloading" => Some(ProgressEvent::Downloading {
            downloaded_bytes: raw.downloaded_bytes.map(as_u64).unwrap_or(0),
            total_bytes: raw.total_bytes.or(raw.total_bytes_estimate).map(as_u64),
            speed: raw.speed.filter(|s| s.is_finite() && *s >= 0.0),
            eta: raw.eta.map(as_u64),
        }),
        "finished" => Some(ProgressEvent::StreamFinished),
        "error" => Some(ProgressEvent::Error {
            message: "download reported an error".into(),
        }),
        _ => None,
    }
}

fn as_u64(value: f64) -> u64 {
    if value.is_finite() && value > 0.0 {
        value.round() as u64
    } else {
        0
    }
}
