//! Per-track measurement sequence and its fit results
use crate::measurement::{StationMask, TimeMeasurement};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Speed of light, in cm/ns, matching the crate's position (cm) and
/// time (ns) conventions.
pub const SPEED_OF_LIGHT_CM_PER_NS: f64 = 29.979_245_8;

/// Aggregate fit results attached to a [TimeMeasurementSequence]
/// once the fitter has run successfully.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SequenceFit {
    /// Global arrival-time offset (ns).
    pub offset: f64,
    /// Fitted slope (ns/cm), shared by the left and right branches.
    pub slope: f64,
    /// Number of hits retained by the fit, after outlier pruning.
    pub hits_used: usize,
    /// Stations contributing at least one retained hit.
    pub stations: StationMask,
    /// Per-hit time resolution (ns) the sequence was corrected with,
    /// echoed here so downstream combiners can weight this sequence.
    pub time_error: f64,
}

/// [TimeMeasurementSequence] is an ordered collection of
/// [TimeMeasurement] built incrementally for one track, then finalized
/// by a single fit. Insertion order is the segment processing order and
/// carries no further meaning.
#[derive(Debug, Default, Clone)]
pub struct TimeMeasurementSequence {
    /// Measurement records, in processing order.
    measurements: Vec<TimeMeasurement>,
    /// Fit results, [None] until a fit has been computed.
    fit: Option<SequenceFit>,
}

impl TimeMeasurementSequence {
    /// Creates an empty sequence for one track.
    pub fn new() -> Self {
        Self {
            measurements: Vec::with_capacity(16),
            fit: None,
        }
    }

    /// Append one measurement. Any previously computed fit no longer
    /// describes the sequence and is discarded.
    pub fn push(&mut self, measurement: TimeMeasurement) {
        self.fit = None;
        self.measurements.push(measurement);
    }

    /// Number of measurements currently latched.
    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    /// True when no measurement has been latched.
    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }

    /// Read access to the measurement records.
    pub fn measurements(&self) -> &[TimeMeasurement] {
        &self.measurements
    }

    /// Fit results, [None] while not computed (too few hits, or the
    /// fitter failed). Check this before reading offset or slope.
    pub fn fit(&self) -> Option<&SequenceFit> {
        self.fit.as_ref()
    }

    /// True once fit results are attached.
    pub fn is_fitted(&self) -> bool {
        self.fit.is_some()
    }

    /// Flush all measurements and results, ready for the next track.
    pub fn clear(&mut self) {
        self.measurements.clear();
        self.fit = None;
    }

    pub(crate) fn set_fit(&mut self, fit: SequenceFit) {
        self.fit = Some(fit);
    }

    pub(crate) fn measurements_mut(&mut self) -> &mut [TimeMeasurement] {
        &mut self.measurements
    }

    /// Weighted inverse-velocity estimate 1/β from the corrected times,
    /// each hit normalized by its path length from the interaction
    /// point. Only meaningful once the sequence is fitted (the
    /// corrected times then hold per-hit local offsets); returns [None]
    /// otherwise, or when no hit carries a usable path length.
    pub fn inverse_beta(&self) -> Option<f64> {
        let fit = self.fit.as_ref()?;
        let mut sum = 0.0_f64;
        let mut weights = 0.0_f64;
        for meas in self.measurements.iter() {
            if !meas.dist_ip.is_finite() || meas.dist_ip <= 0.0 || !meas.time_corr.is_finite() {
                continue;
            }
            let weight =
                (meas.dist_ip / (SPEED_OF_LIGHT_CM_PER_NS * fit.time_error)).powi(2);
            let invbeta =
                1.0 + meas.time_corr * SPEED_OF_LIGHT_CM_PER_NS / meas.dist_ip;
            sum += weight * invbeta;
            weights += weight;
        }
        if weights > 0.0 {
            Some(sum / weights)
        } else {
            None
        }
    }
}
