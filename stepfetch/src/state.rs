//! Round-tripped job state.
//!
//! A download job has no server-side session: the caller receives the
//! updated state after every step and submits it back on the next one.
//! Both sides of that round trip live here. `JobState` is the input half,
//! `StepReport` the output half; `StepReport::resume_state` turns a report
//! back into the next call's input.
//!
//! `offset` is a byte *index*, not a count: it names the last byte durably
//! written, with `-1` meaning "nothing written yet". The job is complete
//! once the index reaches the last valid byte (`offset >= size - 1`). All
//! range arithmetic downstream is defined on this form, so it is preserved
//! here rather than normalized into a count.

use serde::{Deserialize, Serialize};

use crate::engine::StepError;
use crate::pacing;

/// Offset sentinel for a job that has not written any bytes yet.
pub const OFFSET_UNSET: i64 = -1;

/// Caller-persisted input state for one step of a download job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobState {
    /// Resolved source URL; `None` until the resolver has run.
    pub url: Option<String>,

    /// Total artifact size in bytes; `None` until the HEAD probe has run.
    /// Never decreases once known.
    pub size: Option<u64>,

    /// Index of the last byte durably written, or [`OFFSET_UNSET`].
    #[serde(default = "default_offset")]
    pub offset: i64,

    /// Resume position in the pacing table; clamped on use.
    #[serde(default)]
    pub chunk_index: usize,
}

fn default_offset() -> i64 {
    OFFSET_UNSET
}

impl JobState {
    /// State for a job that has not started: everything unresolved.
    pub fn new() -> Self {
        Self {
            url: None,
            size: None,
            offset: OFFSET_UNSET,
            chunk_index: 0,
        }
    }

    /// State for a job whose URL is already known (no resolver round trip).
    pub fn for_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::new()
        }
    }

    /// True if no bytes have been written yet.
    pub fn is_fresh(&self) -> bool {
        self.offset < 0
    }
}

impl Default for JobState {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of one step call, mirrored back to the caller for persistence.
///
/// `error` is populated only for unrecoverable conditions. A step that
/// merely ran out of its time budget is a normal pause: `done` is false
/// and `error` is `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepReport {
    /// Resolved source URL, if resolution got that far.
    pub url: Option<String>,

    /// Output file name derived from the URL.
    pub basename: Option<String>,

    /// Total artifact size in bytes (0 if never resolved).
    pub size: u64,

    /// Index of the last byte durably written, or [`OFFSET_UNSET`].
    pub offset: i64,

    /// Pacing table position to resume from.
    pub chunk_index: usize,

    /// True once the last byte of the artifact has been written.
    pub done: bool,

    /// Human-readable failure, or `None` for progress/pause/completion.
    pub error: Option<String>,
}

impl StepReport {
    /// Render an unrecoverable error in the caller-facing report shape.
    ///
    /// Resolution failures leave nothing to resume, so they are reported
    /// with `done = true`; every other failure keeps `done = false` and the
    /// caller decides whether to retry from the last known-good offset.
    pub fn from_error(state: &JobState, error: &StepError) -> Self {
        let basename = state.url.as_deref().map(basename_from_url);

        Self {
            url: state.url.clone(),
            basename,
            size: state.size.unwrap_or(0),
            offset: state.offset,
            chunk_index: pacing::clamp_index(state.chunk_index),
            done: matches!(error, StepError::NothingToDownload),
            error: Some(error.to_string()),
        }
    }

    /// The input state for the next step call.
    pub fn resume_state(&self) -> JobState {
        JobState {
            url: self.url.clone(),
            size: (self.size > 0).then_some(self.size),
            offset: self.offset,
            chunk_index: self.chunk_index,
        }
    }
}

/// Derive the output file name from a URL: the final path segment with any
/// query string or fragment stripped.
pub fn basename_from_url(url: &str) -> String {
    let without_fragment = url.split('#').next().unwrap_or(url);
    let without_query = without_fragment.split('?').next().unwrap_or(url);

    without_query
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(without_query)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_is_fresh() {
        let state = JobState::new();
        assert!(state.is_fresh());
        assert_eq!(state.offset, OFFSET_UNSET);
        assert_eq!(state.chunk_index, 0);
        assert!(state.url.is_none());
        assert!(state.size.is_none());
    }

    #[test]
    fn test_for_url_keeps_offset_unset() {
        let state = JobState::for_url("https://example.org/pkg.zip");
        assert_eq!(state.url.as_deref(), Some("https://example.org/pkg.zip"));
        assert!(state.is_fresh());
    }

    #[test]
    fn test_basename_plain() {
        assert_eq!(
            basename_from_url("https://example.org/files/Release_5.0.zip"),
            "Release_5.0.zip"
        );
    }

    #[test]
    fn test_basename_strips_query_and_fragment() {
        assert_eq!(
            basename_from_url("https://cdn.example.org/pkg.zip?token=abc#part"),
            "pkg.zip"
        );
    }

    #[test]
    fn test_basename_trailing_slash() {
        assert_eq!(basename_from_url("https://example.org/dir/"), "dir");
    }

    #[test]
    fn test_resume_state_round_trip() {
        let report = StepReport {
            url: Some("https://example.org/pkg.zip".to_string()),
            basename: Some("pkg.zip".to_string()),
            size: 1_000_000,
            offset: 499_999,
            chunk_index: 3,
            done: false,
            error: None,
        };

        let state = report.resume_state();
        assert_eq!(state.url.as_deref(), Some("https://example.org/pkg.zip"));
        assert_eq!(state.size, Some(1_000_000));
        assert_eq!(state.offset, 499_999);
        assert_eq!(state.chunk_index, 3);
    }

    #[test]
    fn test_resume_state_unresolved_size_stays_none() {
        let report = StepReport {
            url: None,
            basename: None,
            size: 0,
            offset: OFFSET_UNSET,
            chunk_index: 0,
            done: false,
            error: None,
        };

        assert!(report.resume_state().size.is_none());
    }

    #[test]
    fn test_state_survives_json_round_trip() {
        let state = JobState {
            url: Some("https://example.org/pkg.zip".to_string()),
            size: Some(42),
            offset: 7,
            chunk_index: 2,
        };

        let json = serde_json::to_string(&state).unwrap();
        let back: JobState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn test_missing_offset_defaults_to_unset() {
        let back: JobState = serde_json::from_str(r#"{"url":null,"size":null}"#).unwrap();
        assert_eq!(back.offset, OFFSET_UNSET);
        assert_eq!(back.chunk_index, 0);
    }

    #[test]
    fn test_report_from_resolution_error_is_done() {
        let report = StepReport::from_error(&JobState::new(), &StepError::NothingToDownload);
        assert!(report.done);
        assert!(report.error.unwrap().contains("no file to download"));
    }

    #[test]
    fn test_report_from_transfer_error_keeps_offset() {
        let mut state = JobState::for_url("https://example.org/pkg.zip");
        state.size = Some(1000);
        state.offset = 511;

        let error = StepError::ShortWrite {
            expected: 100,
            actual: 60,
        };
        let report = StepReport::from_error(&state, &error);
        assert!(!report.done);
        assert_eq!(report.offset, 511);
        assert_eq!(report.basename.as_deref(), Some("pkg.zip"));
    }
}
