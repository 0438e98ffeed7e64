//! Wire geometry collaborator
use crate::measurement::DriftCellId;

use std::collections::HashMap;

/// Drift-cell geometry lookup. The engine only ever asks one question:
/// how long does the signal travel along the sense wire before being
/// read out. Implementations are read-only; safe concurrent access is
/// the implementor's contract.
pub trait WireGeometry {
    /// Signal propagation delay along the sense wire for this cell
    /// (ns), or [None] when the cell is unknown to the geometry. An
    /// unknown cell causes the hit to be silently dropped upstream.
    fn propagation_delay(&self, cell: DriftCellId) -> Option<f64>;
}

impl WireGeometry for HashMap<DriftCellId, f64> {
    fn propagation_delay(&self, cell: DriftCellId) -> Option<f64> {
        self.get(&cell).copied()
    }
}

/// Geometry with no wire corrections, for callers that disable them or
/// feed pre-corrected times.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoWireCorrections;

impl WireGeometry for NoWireCorrections {
    fn propagation_delay(&self, _: DriftCellId) -> Option<f64> {
        Some(0.0)
    }
}
