//! Crate error types
use thiserror::Error;

/// Errors reported by the robust (offset, slope) fitter.
#[derive(Debug, Clone, Error)]
pub enum FitError {
    /// Both the left and the right hit populations are empty:
    /// there is nothing to fit and no sensible value to return.
    #[error("no hits to fit (both populations empty)")]
    NoHits,
    /// The normal equations are singular. Typically all hits share
    /// the same position within their layer, so the slope is
    /// unconstrained.
    #[error("linear regression failure (degenerate hit geometry)")]
    RegressionFailure,
}

/// Invalid [crate::extractor::TimingConfig], rejected at construction.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// At least two hits are needed to constrain two parameters.
    #[error("hits_min must be at least 2 (got {0})")]
    HitsMinTooSmall(usize),
    /// The prune cut is a positive multiple of the residual scale.
    #[error("prune_cut must be finite and positive (got {0})")]
    InvalidPruneCut(f64),
    /// The per-hit resolution seeds downstream weights and must be usable.
    #[error("time_error must be finite and positive (got {0})")]
    InvalidTimeError(f64),
    /// The nominal time offset is added to every corrected time.
    #[error("time_offset must be finite (got {0})")]
    InvalidTimeOffset(f64),
}
