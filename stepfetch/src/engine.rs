//! The adaptive chunked transfer loop.
//!
//! One call to [`ChunkedDownloader::step`] makes as much progress on a
//! download job as its wall-clock time budget allows, then hands the
//! updated state back to the caller. The caller persists that state and
//! submits it again; repeating until `done` downloads the whole artifact
//! across any number of time-boxed invocations.
//!
//! The loop is single-threaded and synchronous by design: the time budget
//! is wall-clock time measured around blocking calls (the HEAD probe, each
//! ranged GET, and the deliberate pacing sleep), and there is no work
//! between calls. Callers must not run two steps of the same job
//! concurrently; the output file is owned by the executing call for its
//! duration.

use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::http::{HttpClient, HttpError, DEFAULT_TIMEOUT_SECS, DEFAULT_USER_AGENT};
use crate::pacing;
use crate::resolve::{probe_total_size, ResolveError, UrlResolver};
use crate::sink::{FileSink, PackageSink, SinkError};
use crate::state::{basename_from_url, JobState, StepReport};

/// Default wall-clock time budget per step call, in seconds.
pub const DEFAULT_TIME_BUDGET_SECS: u64 = 10;

/// Errors that make a step call fail.
///
/// Running out of the time budget is NOT an error: the step returns a
/// report with `done = false` and the caller resumes. Only unrecoverable
/// conditions surface here.
#[derive(Debug, Error)]
pub enum StepError {
    /// Resolution produced no URL, or the server failed the range-support
    /// probe. Terminal for the whole job; there is nothing to resume.
    #[error("There is no file to download")]
    NothingToDownload,

    /// The redirect chain never terminated.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// The output file is inconsistent with the claimed offset, or plain
    /// I/O failure around it.
    #[error(transparent)]
    Sink(#[from] SinkError),

    /// Transport-level failure on a range request.
    #[error(transparent)]
    Http(#[from] HttpError),

    /// A range request answered with something other than 200 or 206.
    #[error("Unexpected HTTP status {status} downloading range {from}-{to}")]
    BadStatus { status: u16, from: u64, to: u64 },

    /// A range request answered with an empty body.
    #[error("The server returned an empty body for range {from}-{to}")]
    EmptyChunk { from: u64, to: u64 },

    /// The sink accepted fewer bytes than the chunk held. The output file
    /// has been removed; the job must restart from scratch.
    #[error("Expected to write {expected} bytes but only {actual} were written")]
    ShortWrite { expected: usize, actual: usize },
}

/// Configuration for the downloader.
#[derive(Clone, Debug)]
pub struct DownloaderConfig {
    /// Directory the output file lives in.
    pub temp_dir: PathBuf,

    /// Wall-clock budget for one step call.
    pub time_budget: Duration,

    /// Per-request HTTP timeout (forwarded to the transport by callers
    /// constructing a [`crate::ReqwestClient`]).
    pub http_timeout: Duration,

    /// User-Agent for probe and range requests.
    pub user_agent: String,
}

impl DownloaderConfig {
    /// Create a config with defaults for everything but the directory.
    pub fn new(temp_dir: PathBuf) -> Self {
        Self {
            temp_dir,
            time_budget: Duration::from_secs(DEFAULT_TIME_BUDGET_SECS),
            http_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    /// Set the per-step time budget.
    pub fn with_time_budget(mut self, time_budget: Duration) -> Self {
        self.time_budget = time_budget;
        self
    }

    /// Set the per-request HTTP timeout.
    pub fn with_http_timeout(mut self, http_timeout: Duration) -> Self {
        self.http_timeout = http_timeout;
        self
    }

    /// Set the User-Agent string.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// Resumable chunked downloader.
///
/// Generic over the transport and the URL resolver so both can be mocked;
/// production callers pair it with [`crate::ReqwestClient`] and one of the
/// resolvers from [`crate::resolve`].
pub struct ChunkedDownloader<C: HttpClient, R: UrlResolver> {
    http_client: C,
    resolver: R,
    config: DownloaderConfig,
}

/// What the transfer loop hands back to the report assembly.
struct TransferOutcome {
    offset: i64,
    chunk_index: usize,
    done: bool,
}

impl<C: HttpClient, R: UrlResolver> ChunkedDownloader<C, R> {
    pub fn new(http_client: C, resolver: R, config: DownloaderConfig) -> Self {
        Self {
            http_client,
            resolver,
            config,
        }
    }

    /// The transport this downloader was built with.
    pub fn http_client(&self) -> &C {
        &self.http_client
    }

    /// Run one time-boxed step of the job, writing to
    /// `temp_dir/basename(url)`.
    ///
    /// Returns the updated state for the caller to persist. `Err` only for
    /// unrecoverable conditions; a step that spent its budget comes back
    /// `Ok` with `done = false`.
    pub fn step(&self, state: JobState) -> Result<StepReport, StepError> {
        let started = Instant::now();
        let (url, size) = self.resolve_job(&state)?;
        let basename = basename_from_url(&url);

        let mut sink = FileSink::new(&self.config.temp_dir, &basename);
        let outcome = self.transfer(started, &url, size, &state, &mut sink)?;

        Ok(self.assemble(url, basename, size, outcome))
    }

    /// Like [`Self::step`] but with a caller-provided sink.
    pub fn step_with_sink(
        &self,
        state: JobState,
        sink: &mut dyn PackageSink,
    ) -> Result<StepReport, StepError> {
        let started = Instant::now();
        let (url, size) = self.resolve_job(&state)?;
        let basename = basename_from_url(&url);

        let outcome = self.transfer(started, &url, size, &state, sink)?;

        Ok(self.assemble(url, basename, size, outcome))
    }

    /// Determine `(url, size)`, reusing round-tripped values when present.
    fn resolve_job(&self, state: &JobState) -> Result<(String, u64), StepError> {
        let url = match &state.url {
            Some(url) => url.clone(),
            None => self
                .resolver
                .resolve()?
                .ok_or(StepError::NothingToDownload)?,
        };

        let size = match state.size {
            Some(size) if size > 0 => size,
            _ => {
                let size =
                    probe_total_size(&self.http_client, &url).ok_or(StepError::NothingToDownload)?;
                tracing::info!(url = %url, size, "resolved download target");
                size
            }
        };

        if size == 0 {
            return Err(StepError::NothingToDownload);
        }

        Ok((url, size))
    }

    fn assemble(&self, url: String, basename: String, size: u64, outcome: TransferOutcome) -> StepReport {
        StepReport {
            url: Some(url),
            basename: Some(basename),
            size,
            offset: outcome.offset,
            chunk_index: outcome.chunk_index,
            done: outcome.done,
            error: None,
        }
    }

    /// The per-call transfer loop.
    fn transfer(
        &self,
        started: Instant,
        url: &str,
        size: u64,
        state: &JobState,
        sink: &mut dyn PackageSink,
    ) -> Result<TransferOutcome, StepError> {
        let mut offset = state.offset.max(-1);
        let mut chunk_index = pacing::clamp_index(state.chunk_index);
        let last_index = size as i64 - 1;

        sink.prepare(offset)?;

        let mut done = offset >= last_index;

        while !done {
            // A spent budget is a pause, not a failure: report the state
            // as-is and let the next call resume.
            if started.elapsed() >= self.config.time_budget {
                tracing::debug!(offset, "time budget spent, pausing");
                break;
            }

            let chunk = pacing::chunk_size(chunk_index);
            let from = if offset < 0 { 0 } else { offset as u64 + 1 };
            let to = (from + chunk).min(size);

            if from > size {
                done = true;
                break;
            }

            let chunk_started = Instant::now();
            let response = self.http_client.get_range(url, from, to)?;

            if response.status != 200 && response.status != 206 {
                return Err(StepError::BadStatus {
                    status: response.status,
                    from,
                    to,
                });
            }

            if response.body.is_empty() {
                return Err(StepError::EmptyChunk { from, to });
            }

            let written = sink.append(&response.body)?;
            if written < response.body.len() {
                // The file now holds a chunk we cannot account for; remove
                // it so the job restarts from scratch instead of trusting
                // half-written state.
                let _ = sink.discard();
                return Err(StepError::ShortWrite {
                    expected: response.body.len(),
                    actual: written,
                });
            }

            offset += written as i64;
            let elapsed = chunk_started.elapsed();

            tracing::debug!(
                from,
                to,
                written,
                offset,
                chunk_index,
                elapsed_ms = elapsed.as_millis() as u64,
                "chunk written"
            );

            if offset >= last_index {
                done = true;
                break;
            }

            let adaptation = pacing::adapt(elapsed, chunk_index);
            chunk_index = adaptation.chunk_index;

            if let Some(pause) = adaptation.throttle_sleep {
                tracing::debug!(
                    pause_ms = pause.as_millis() as u64,
                    "throttling at maximum chunk size"
                );
                thread::sleep(pause);
            }

            // Starting a range request the budget cannot cover would waste
            // a partial fetch; break early and let the next call take it.
            if started.elapsed() + adaptation.projected_next > self.config.time_budget {
                tracing::debug!(
                    offset,
                    projected_ms = adaptation.projected_next.as_millis() as u64,
                    "next chunk would exceed the budget, pausing"
                );
                break;
            }
        }

        if done {
            tracing::info!(url = %url, size, "download complete");
        }

        Ok(TransferOutcome {
            offset,
            chunk_index,
            done,
        })
    }
}
