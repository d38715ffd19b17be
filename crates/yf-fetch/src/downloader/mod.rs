mod cli;
mod core;
mod engine;
mod prompt;
mod types;
mod utils;

pub use cli::{
    collect_request, describe_progress, format_eta, menu_text, resolve_folder, resolve_quality,
    resolve_subtitles, run_cli, TerminalProgress,
};
pub use self::core::process_download;
pub use engine::{parse_line, render_args, EngineSession, MediaEngine, YtDlpEngine, YtDlpSession};
pub use prompt::{Prompter, TermPrompter};
#[doc(hidden)]
pub use prompt::ScriptedPrompter;
pub use types::*;
pub use utils::{
    build_options, check_dependencies, dependency_report, ensure_destination, output_template,
    plan_jobs, OUTPUT_NAME,
};
