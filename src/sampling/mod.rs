//! Per-backend trace sampling.
//!
//! The decision is a deterministic function of the trace id, so every
//! backend (and every export cycle) agrees on the same trace: a backend at
//! rate 0.5 exports a subset of what a backend at rate 0.8 exports.

use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};

/// Sampling decision result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplingDecision {
    /// Export this trace
    Keep,
    /// Skip this trace for this backend
    Drop,
}

/// Decides whether `trace_id` is exported at `rate`.
///
/// `rate >= 1.0` always keeps, `rate <= 0.0` always drops; otherwise roughly
/// `rate` of all trace ids are kept.
#[inline]
pub fn decide(trace_id: &str, rate: f64) -> SamplingDecision {
    if rate >= 1.0 {
        return SamplingDecision::Keep;
    }
    if rate <= 0.0 || rate.is_nan() {
        return SamplingDecision::Drop;
    }
    if sample_point(trace_id) < rate {
        SamplingDecision::Keep
    } else {
        SamplingDecision::Drop
    }
}

/// Convenience wrapper over [`decide`].
#[inline]
pub fn should_sample(trace_id: &str, rate: f64) -> bool {
    decide(trace_id, rate) == SamplingDecision::Keep
}

/// Maps a trace id to a stable point in `[0, 1)`.
#[inline]
fn sample_point(trace_id: &str) -> f64 {
    let hash = mix64(fast_hash(trace_id));
    // Top 53 bits fill an f64 mantissa exactly.
    (hash >> 11) as f64 / (1u64 << 53) as f64
}

/// Fast non-cryptographic hash; FxHash is stable across processes.
#[inline(always)]
fn fast_hash(trace_id: &str) -> u64 {
    let mut hasher = FxHasher::default();
    trace_id.hash(&mut hasher);
    hasher.finish()
}

/// SplitMix64 finaliser; FxHash alone leaves the high bits poorly mixed for short ids.
#[inline(always)]
fn mix64(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}
