//! drift-timing is a library to extract a particle's arrival-time
//! offset and velocity-related slope from drift-chamber hit
//! measurements associated with a reconstructed track, and to classify
//! track candidates from their station-match pattern.
//!
//! The engine is a free-standing library: tracks, segments and
//! geometry live in the calling framework and reach this crate through
//! the [segment::SegmentSource] and [geometry::WireGeometry]
//! collaborator traits. One [extractor::TimingExtractor] call turns an
//! empty [measurement::TimeMeasurementSequence] into corrected per-hit
//! records plus a robust (offset, slope) estimate, or leaves the
//! sequence without results when the data cannot support one.
//!
//! ```
//! use drift_timing::prelude::*;
//! use std::collections::HashMap;
//!
//! // collaborators: no wire delays, one track with no segments
//! let segments: HashMap<TrackId, Vec<DriftSegment>> = HashMap::new();
//! let extractor =
//!     TimingExtractor::new(TimingConfig::default(), NoWireCorrections, segments).unwrap();
//!
//! let mut sequence = TimeMeasurementSequence::new();
//! extractor.fill_timing(TrackId(1), &mut sequence);
//! assert!(!sequence.is_fitted());
//! ```
pub mod corrector;
pub mod errors;
pub mod extractor;
pub mod fit;
pub mod geometry;
pub mod measurement;
pub mod segment;
pub mod selection;

pub mod prelude {
    pub use crate::corrector::HitCorrector;
    pub use crate::errors::{ConfigError, FitError};
    pub use crate::extractor::{TimingConfig, TimingExtractor};
    pub use crate::fit::{fit_samples, fit_t0, FitSample, T0Fit};
    pub use crate::geometry::{NoWireCorrections, WireGeometry};
    pub use crate::measurement::{
        DriftCellId, Projection, SequenceFit, StationMask, TimeMeasurement,
        TimeMeasurementSequence, SPEED_OF_LIGHT_CM_PER_NS,
    };
    pub use crate::segment::{
        DriftSegment, SegmentHit, SegmentProjection, SegmentSource, TrackId,
    };
    pub use crate::selection::{
        is_good_candidate, is_good_candidate_with_cuts, required_station_mask, SegmentAgreement,
        SelectionCuts, SelectionPolicy, StationMatch,
    };
}
