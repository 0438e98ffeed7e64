//! Per-hit timing measurements
mod sequence;

pub use sequence::{SequenceFit, TimeMeasurementSequence, SPEED_OF_LIGHT_CM_PER_NS};

use strum_macros::{Display, EnumString};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Opaque reference to the physical drift cell that produced a hit.
/// Only ever used as a key into the wire geometry collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DriftCellId(pub u32);

impl std::fmt::Display for DriftCellId {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(fmt, "cell#{}", self.0)
    }
}

/// Measurement projection within a chamber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Projection {
    /// Bending plane
    #[strum(serialize = "PHI")]
    Phi,
    /// Non bending plane
    #[strum(serialize = "THETA")]
    Theta,
}

impl Projection {
    /// True for bending plane measurements.
    pub fn is_phi(&self) -> bool {
        matches!(self, Self::Phi)
    }
}

/// Bitmask over detector station indices, used for coverage accounting.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StationMask(pub u32);

impl StationMask {
    /// Mark this station as covered. Station indices beyond the mask
    /// width (32) are ignored.
    pub fn insert(&mut self, station: u8) {
        if station < 32 {
            self.0 |= 1 << station;
        }
    }

    /// True if this station is covered.
    pub fn contains(&self, station: u8) -> bool {
        station < 32 && self.0 & (1 << station) != 0
    }

    /// Number of covered stations.
    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// True when no station is covered.
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Highest covered station index, if any.
    pub fn outermost(&self) -> Option<u8> {
        if self.0 == 0 {
            None
        } else {
            Some(31 - self.0.leading_zeros() as u8)
        }
    }
}

/// [TimeMeasurement] is a single hit's timing and geometric attributes,
/// finalized by the hit corrector and immutable from the caller's
/// perspective once the sequence is fitted.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TimeMeasurement {
    /// Drift-cell left/right assignment for this hit.
    pub is_left: bool,
    /// Bending (phi) or non-bending (theta) projection.
    pub projection: Projection,
    /// Hit position within its detector layer (cm), the fit's
    /// independent variable.
    pub pos_in_layer: f64,
    /// Distance from the interaction point to the hit (cm), used to
    /// convert a time into a path-length-normalized quantity.
    pub dist_ip: f64,
    /// Corrected hit time (ns), the fit's dependent variable.
    /// Re-derived as a local offset estimate once the sequence is fitted.
    pub time_corr: f64,
    /// Detector station index, for coverage accounting only.
    pub station: u8,
    /// Originating drift cell.
    pub cell: DriftCellId,
}

impl TimeMeasurement {
    /// True when position and time are both usable by the fitter.
    pub fn is_usable(&self) -> bool {
        self.pos_in_layer.is_finite() && self.time_corr.is_finite()
    }
}

#[cfg(test)]
mod test {
    use super::{Projection, StationMask};
    use std::str::FromStr;

    #[test]
    fn projections() {
        assert!(Projection::Phi.is_phi());
        assert!(!Projection::Theta.is_phi());
        assert_eq!(Projection::from_str("PHI").unwrap(), Projection::Phi);
        assert_eq!(Projection::from_str("THETA").unwrap(), Projection::Theta);
        assert_eq!(Projection::Theta.to_string(), "THETA");
    }

    #[test]
    fn station_mask() {
        let mut mask = StationMask::default();
        assert!(mask.is_empty());
        assert_eq!(mask.outermost(), None);

        mask.insert(1);
        mask.insert(3);
        mask.insert(3);

        assert_eq!(mask.len(), 2);
        assert!(mask.contains(1));
        assert!(!mask.contains(2));
        assert_eq!(mask.outermost(), Some(3));
    }

    #[test]
    fn station_mask_ignores_out_of_range_indices() {
        let mut mask = StationMask::default();
        mask.insert(32);
        mask.insert(200);
        assert!(mask.is_empty());
        assert!(!mask.contains(32));
        assert!(!mask.contains(200));

        mask.insert(4);
        assert_eq!(mask.len(), 1);
        assert_eq!(mask.outermost(), Some(4));
    }
}
