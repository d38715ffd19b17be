use clap::{Args, Parser, Subcommand};
use std::{path::PathBuf, process::ExitCode};
use yf_fetch::{
    config::Config,
    downloader::{self, DownloadError, DownloadReport},
    logging,
};

#[derive(Parser)]
#[command(name = "ytfetch")]
#[command(version)]
#[command(about = "Download a video, its audio as MP3, and subtitles with yt-dlp")]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Download one link (default). Missing values are asked for interactively
    Download(DownloadFlags),

    /// Check that yt-dlp and ffmpeg can be found
    Check,
}

#[derive(Args, Default)]
struct DownloadFlags {
    #[arg(short, long)]
    url: Option<String>,

    /// highest, lowest, audio, or a resolution such as 720p
    #[arg(short, long)]
    quality: Option<String>,

    #[arg(short, long)]
    folder: Option<String>,

    /// Comma-separated subtitle languages, e.g. en,es-419
    #[arg(short, long, value_name = "LANGS")]
    subs: Option<String>,

    /// Include auto-generated subtitles (with --subs)
    #[arg(long, default_value_t = false, requires = "subs")]
    auto_subs: bool,

    /// Don't ask about subtitles
    #[arg(long, default_value_t = false, conflicts_with = "subs")]
    no_subs: bool,

    /// Skip the extra MP3 pass after a video download
    #[arg(long, default_value_t = false)]
    no_mp3: bool,
}

impl From<DownloadFlags> for downloader::DownloadArgs {
    fn from(flags: DownloadFlags) -> Self {
        Self {
            url: flags.url,
            quality: flags.quality,
            folder: flags.folder,
            subtitles: flags.subs,
            auto_subtitles: flags.auto_subs,
            no_subtitles: flags.no_subs,
            no_mp3: flags.no_mp3,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Config Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let _log = match logging::init_logging(&config.logging.file) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("❌ Logging Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    match cli.command.unwrap_or(Commands::Download(DownloadFlags::default())) {
        // [1] DOWNLOAD
        Commands::Download(flags) => {
            ExitCode::from(download_status(&downloader::run_cli(flags.into(), &config)))
        }

        // [2] CHECK
        Commands::Check => {
            let mut missing = false;
            for (program, found) in downloader::dependency_report(&config.engine.yt_dlp) {
                match found {
                    Some(path) => println!("✅ {} -> {}", program, path.display()),
                    None => {
                        println!("❌ {} not found in PATH", program);
                        missing = true;
                    }
                }
            }
            if missing {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
    }
}

/// Process status for a download run.
fn download_status(result: &anyhow::Result<DownloadReport>) -> u8 {
    match result {
        Ok(_) => 0,
        Err(e) => match e.downcast_ref::<DownloadError>() {
            // Nothing was asked for, nothing failed.
            Some(DownloadError::EmptyUrl) => 0,
            // Already logged with its URL by the invoker.
            Some(_) => 1,
            None => {
                tracing::error!("❌ Download Error: {:#}", e);
                1
            }
        },
    }
}
