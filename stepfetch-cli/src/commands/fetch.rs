//! The `fetch` subcommand: run the step loop to completion.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use stepfetch::{
    ChunkedDownloader, DownloaderConfig, JobState, RedirectResolver, ReqwestClient, StepReport,
};

use crate::error::CliError;

/// File the job state is persisted to between steps, inside the output
/// directory, unless overridden.
const DEFAULT_STATE_FILE: &str = "stepfetch-state.json";

#[derive(Debug, Args)]
pub struct FetchArgs {
    /// URL of the file to download (redirects are resolved first)
    pub url: String,

    /// Directory the file is downloaded into
    #[arg(long, default_value = ".")]
    pub out_dir: PathBuf,

    /// Wall-clock time budget per step, in seconds
    #[arg(long, default_value_t = stepfetch::DEFAULT_TIME_BUDGET_SECS)]
    pub budget_secs: u64,

    /// Path of the JSON state file (defaults to the output directory)
    #[arg(long)]
    pub state_file: Option<PathBuf>,
}

pub fn run(args: FetchArgs) -> Result<(), CliError> {
    let state_path = args
        .state_file
        .clone()
        .unwrap_or_else(|| args.out_dir.join(DEFAULT_STATE_FILE));

    let config = DownloaderConfig::new(args.out_dir.clone())
        .with_time_budget(Duration::from_secs(args.budget_secs));

    let transport = ReqwestClient::with_options(config.http_timeout, config.user_agent.clone())
        .map_err(|e| CliError::HttpClient(e.to_string()))?;
    let resolver_client =
        ReqwestClient::with_options(config.http_timeout, config.user_agent.clone())
            .map_err(|e| CliError::HttpClient(e.to_string()))?;

    let downloader = ChunkedDownloader::new(
        transport,
        RedirectResolver::new(resolver_client, &args.url),
        config,
    );

    // Ctrl-C only sets a flag; the in-flight step finishes and the state
    // file stays behind for the next invocation to resume from.
    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = Arc::clone(&interrupted);
        let _ = ctrlc::set_handler(move || interrupted.store(true, Ordering::SeqCst));
    }

    let mut state = load_state(&state_path)?.unwrap_or_default();
    if state.offset > -1 {
        println!(
            "Resuming from byte {} (state file: {})",
            state.offset + 1,
            state_path.display()
        );
    }

    let bar = ProgressBar::hidden();
    bar.set_style(
        ProgressStyle::with_template("{bar:40} {bytes}/{total_bytes} ({bytes_per_sec})")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    loop {
        let report = match downloader.step(state.clone()) {
            Ok(report) => report,
            Err(e) => {
                // Keep the state file: the caller decides whether to retry
                // from the last known-good offset by rerunning the command.
                save_state(&state_path, &StepReport::from_error(&state, &e).resume_state())?;
                return Err(e.into());
            }
        };

        tracing::debug!(
            offset = report.offset,
            chunk_index = report.chunk_index,
            done = report.done,
            "step complete"
        );

        if bar.is_hidden() && report.size > 0 {
            bar.set_length(report.size);
            bar.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        }
        bar.set_position((report.offset + 1).max(0) as u64);

        if report.done {
            bar.finish();
            let _ = std::fs::remove_file(&state_path);
            let basename = report.basename.unwrap_or_default();
            println!("Downloaded {}", args.out_dir.join(basename).display());
            return Ok(());
        }

        state = report.resume_state();
        save_state(&state_path, &state)?;

        if interrupted.load(Ordering::SeqCst) {
            bar.abandon();
            println!(
                "Interrupted; rerun the same command to resume from byte {}",
                state.offset + 1
            );
            return Ok(());
        }
    }
}

fn load_state(path: &std::path::Path) -> Result<Option<JobState>, CliError> {
    match std::fs::read_to_string(path) {
        Ok(json) => serde_json::from_str(&json)
            .map(Some)
            .map_err(|e| CliError::StateFile(format!("{}: {}", path.display(), e))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(CliError::StateFile(format!("{}: {}", path.display(), e))),
    }
}

fn save_state(path: &std::path::Path, state: &JobState) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(state)
        .map_err(|e| CliError::StateFile(e.to_string()))?;

    std::fs::write(path, json).map_err(|e| CliError::StateFile(format!("{}: {}", path.display(), e)))
}
