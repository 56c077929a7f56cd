//! Adaptive chunk-size pacing.
//!
//! The transfer loop targets a 2-4 second wall-clock duration per range
//! request: long enough to amortize HTTP overhead, short enough to fit
//! inside server-enforced execution time limits and to checkpoint progress
//! frequently. Chunk sizes are never computed freely; they are picked from
//! a fixed ascending table by index, and only this module moves the index.
//!
//! # Throttling at the top of the table
//!
//! When a request finishes in under two seconds and the index is already at
//! the table maximum, the loop deliberately sleeps for the observed elapsed
//! time (not for `2.0 - elapsed`). This undershoots the two-second target,
//! and that is intentional: an unnaturally fast run of sequential range
//! requests is exactly what edge/CDN abuse heuristics flag. Do not "fix"
//! this to hit the target.

use std::time::Duration;

/// Candidate chunk sizes in bytes, ascending, 50 KiB up to 10 MiB.
///
/// The table is indexed by `JobState::chunk_index` and shared by every job;
/// it is a constant, never mutated at runtime.
pub const CHUNK_SIZES: [u64; 8] = [
    51_200,
    153_600,
    262_144,
    524_288,
    1_048_576,
    2_097_152,
    5_242_880,
    10_485_760,
];

/// Lower edge of the per-request duration target window, in seconds.
pub const TARGET_MIN_SECS: f64 = 2.0;

/// Upper edge of the per-request duration target window, in seconds.
pub const TARGET_MAX_SECS: f64 = 4.0;

/// The highest valid index into [`CHUNK_SIZES`].
pub const fn max_index() -> usize {
    CHUNK_SIZES.len() - 1
}

/// Clamp an externally supplied index into the valid table range.
pub fn clamp_index(index: usize) -> usize {
    index.min(max_index())
}

/// Chunk size in bytes for the given (clamped) index.
pub fn chunk_size(index: usize) -> u64 {
    CHUNK_SIZES[clamp_index(index)]
}

/// Outcome of one pacing decision.
///
/// The decision is pure: the caller performs the actual sleep. This keeps
/// the algorithm fully unit-testable with synthetic durations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Adaptation {
    /// Index to use for the next range request.
    pub chunk_index: usize,

    /// Deliberate pause before the next request, if the transfer is too
    /// fast even at the maximum chunk size. Equal to the observed elapsed
    /// time (see module docs).
    pub throttle_sleep: Option<Duration>,

    /// Estimate of the next request's duration, used by the transfer loop
    /// to avoid starting a range request it cannot finish inside its time
    /// budget.
    pub projected_next: Duration,
}

/// Decide the next chunk index from the duration of the last request.
///
/// * under 2 s at the maximum index: hold the index and throttle by
///   sleeping for `elapsed`;
/// * under 2 s with room to grow: raise the index by
///   `max(1, ceil(sqrt(2.0 / elapsed)))`, clamped to the table top, and
///   project the next duration as `2^add * elapsed`;
/// * over 4 s: lower the index by one (floor 0) and halve the projection;
/// * inside the 2-4 s window: hold steady.
pub fn adapt(elapsed: Duration, chunk_index: usize) -> Adaptation {
    let index = clamp_index(chunk_index);
    let secs = elapsed.as_secs_f64();

    if secs < TARGET_MIN_SECS {
        if index == max_index() {
            return Adaptation {
                chunk_index: index,
                throttle_sleep: Some(elapsed),
                projected_next: elapsed,
            };
        }

        let add = growth_factor(secs);
        return Adaptation {
            chunk_index: clamp_index(index + add),
            throttle_sleep: None,
            projected_next: elapsed.mul_f64(2f64.powi(add as i32)),
        };
    }

    if secs > TARGET_MAX_SECS {
        return Adaptation {
            chunk_index: index.saturating_sub(1),
            throttle_sleep: None,
            projected_next: elapsed / 2,
        };
    }

    Adaptation {
        chunk_index: index,
        throttle_sleep: None,
        projected_next: elapsed,
    }
}

/// How many table steps to climb when a request finished early.
///
/// Capped at the table length: any larger factor is indistinguishable after
/// clamping, and the cap keeps the `2^add` projection finite for very small
/// elapsed times.
fn growth_factor(secs: f64) -> usize {
    let secs = secs.max(f64::EPSILON);
    let factor = (TARGET_MIN_SECS / secs).sqrt().ceil();

    (factor as usize).clamp(1, CHUNK_SIZES.len())
}
