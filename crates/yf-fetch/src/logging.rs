use anyhow::{Context, Result};
use std::path::Path;
use tracing::subscriber::DefaultGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter};

/// Keeps the run's subscriber installed. Logging stops when it is dropped.
pub struct LogGuard {
    _default: DefaultGuard,
}

/// Installs a subscriber writing timestamped, leveled lines to stdout and
/// appending them to `log_file`. `RUST_LOG` overrides the default `info`
/// filter.
pub fn init_logging(log_file: &Path) -> Result<LogGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let dir = match log_file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let name = log_file
        .file_name()
        .with_context(|| format!("Log path '{}' has no file name", log_file.display()))?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(name.to_string_lossy())
        .build(dir)
        .with_context(|| format!("Failed to open log file {}", log_file.display()))?;

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stdout))
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(appender),
        );

    Ok(LogGuard {
        _default: tracing::subscriber::set_default(subscriber),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn appends_to_the_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.log");
        fs::write(&path, "earlier run\n").unwrap();

        {
            let _guard = init_logging(&path).unwrap();
            tracing::info!("Fetching video: https://example/video");
            tracing::warn!("Invalid choice. Defaulting to highest resolution.");
        }

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("earlier run\n"));
        assert!(text.contains(" INFO Fetching video: https://example/video"));
        assert!(text.contains(" WARN Invalid choice"));
    }

    #[test]
    fn rejects_paths_without_a_file_name() {
        assert!(init_logging(Path::new("/")).is_err());
    }
}
