//! Stepfetch - resumable chunked HTTP downloads with adaptive pacing.
//!
//! This library downloads a large artifact across repeated, time-boxed
//! invocations. Each call to [`ChunkedDownloader::step`] fetches successive
//! HTTP byte ranges into a local file until its wall-clock budget runs out,
//! adapting the range size toward a 2-4 second per-request target, then
//! returns the job state for the caller to persist and resubmit. There is
//! no server-side session: the caller owns persistence, and a job resumes
//! from whatever state the last step reported.

pub mod engine;
pub mod http;
pub mod pacing;
pub mod resolve;
pub mod sink;
pub mod state;

pub use engine::{ChunkedDownloader, DownloaderConfig, StepError, DEFAULT_TIME_BUDGET_SECS};
pub use http::{HeadProbe, HttpClient, HttpError, RangeResponse, ReqwestClient};
pub use pacing::CHUNK_SIZES;
pub use resolve::{probe_total_size, RedirectResolver, ResolveError, StaticResolver, UrlResolver};
pub use sink::{FileSink, PackageSink, SinkError};
pub use state::{basename_from_url, JobState, StepReport, OFFSET_UNSET};
