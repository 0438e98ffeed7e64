//! Matched-segment input model and the track-to-segments collaborator
use crate::measurement::DriftCellId;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Opaque reference to a reconstructed track, resolved by the
/// [SegmentSource] collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrackId(pub u64);

/// One reconstructed hit within a segment projection.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SegmentHit {
    /// Drift cell that produced the hit.
    pub cell: DriftCellId,
    /// Recorded drift-cell side.
    pub is_left: bool,
    /// Local hit position within its layer (cm).
    pub pos_in_layer: f64,
    /// Distance from the interaction point to the hit (cm).
    pub dist_ip: f64,
    /// Raw hit time (ns), before any correction.
    pub time: f64,
}

/// One projection (bending or non-bending) of a matched segment.
#[derive(Debug, Default, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SegmentProjection {
    /// Segment-level reference time (ns), subtracted from raw hit
    /// times when segment-T0 usage is enabled.
    pub t0: Option<f64>,
    /// Hits contributing to this projection.
    pub hits: Vec<SegmentHit>,
}

/// [DriftSegment] is a track-associated hit cluster in one station,
/// carrying a bending (phi) and/or non-bending (theta) projection.
#[derive(Debug, Default, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DriftSegment {
    /// Owning station index.
    pub station: u8,
    /// Bending-plane projection, when reconstructed.
    pub phi: Option<SegmentProjection>,
    /// Non-bending-plane projection, when reconstructed.
    pub theta: Option<SegmentProjection>,
}

impl DriftSegment {
    /// True when both projections were reconstructed.
    pub fn has_both_projections(&self) -> bool {
        self.phi.is_some() && self.theta.is_some()
    }
}

/// Track-to-segments lookup. Implementations resolve which segments
/// were matched to a track; matching and arbitration themselves are the
/// implementation's concern. Read-only: safe concurrent access is the
/// implementor's contract.
pub trait SegmentSource {
    /// All segments matched to this track, one entry per (station,
    /// chamber) association.
    fn segments_for(&self, track: TrackId) -> Vec<DriftSegment>;
}

impl SegmentSource for std::collections::HashMap<TrackId, Vec<DriftSegment>> {
    fn segments_for(&self, track: TrackId) -> Vec<DriftSegment> {
        self.get(&track).cloned().unwrap_or_default()
    }
}
