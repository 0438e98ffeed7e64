//! Candidate classification from per-station match quality
use strum_macros::{Display, EnumString};

use crate::measurement::StationMask;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Named last-station selection policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SelectionPolicy {
    /// Matched-station count and bending-plane agreement in the
    /// outermost crossed station.
    #[strum(serialize = "LastStationLoose")]
    LastStationLoose,
    /// Loose requirements plus non-bending-plane agreement in the
    /// outermost crossed station.
    #[strum(serialize = "LastStationTight")]
    LastStationTight,
}

/// Numeric cuts behind a [SelectionPolicy]. An unbounded cut is
/// expressed as [f64::INFINITY].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SelectionCuts {
    /// Minimum number of well-matched stations.
    pub min_matches: usize,
    /// Bending-plane position agreement (cm).
    pub max_abs_dx: f64,
    /// Bending-plane pull agreement.
    pub max_abs_pull_x: f64,
    /// Non-bending-plane position agreement (cm).
    pub max_abs_dy: f64,
    /// Non-bending-plane pull agreement.
    pub max_abs_pull_y: f64,
    /// A station counts as crossed well within active volume when its
    /// signed chamber-edge distance stays below this (negative: the
    /// crossing must be inside the chamber by that margin).
    pub max_chamber_dist: f64,
    /// Same requirement on the distance pull.
    pub max_chamber_dist_pull: f64,
}

impl SelectionPolicy {
    /// The numeric cuts this policy applies.
    pub fn cuts(&self) -> SelectionCuts {
        match self {
            Self::LastStationLoose => SelectionCuts {
                min_matches: 2,
                max_abs_dx: 3.0,
                max_abs_pull_x: 3.0,
                max_abs_dy: f64::INFINITY,
                max_abs_pull_y: f64::INFINITY,
                max_chamber_dist: -3.0,
                max_chamber_dist_pull: -3.0,
            },
            Self::LastStationTight => SelectionCuts {
                min_matches: 2,
                max_abs_dx: 3.0,
                max_abs_pull_x: 3.0,
                max_abs_dy: 3.0,
                max_abs_pull_y: 3.0,
                max_chamber_dist: -3.0,
                max_chamber_dist_pull: -3.0,
            },
        }
    }
}

/// Arbitrated track-to-segment agreement in one station. Position
/// residuals and pulls are supplied by the external matching
/// collaborator.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SegmentAgreement {
    /// Bending-plane position residual (cm).
    pub dx: f64,
    /// Bending-plane pull.
    pub pull_x: f64,
    /// Non-bending-plane position residual (cm), when measured.
    pub dy: Option<f64>,
    /// Non-bending-plane pull, when measured.
    pub pull_y: Option<f64>,
}

/// Per-station summary of how the track crossed the station and how
/// well the arbitrated segment (if any) agrees with it.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StationMatch {
    /// Station index.
    pub station: u8,
    /// Signed distance from the extrapolated crossing to the chamber
    /// edge (cm), negative inside the chamber.
    pub chamber_dist: f64,
    /// Pull of that distance.
    pub chamber_dist_pull: f64,
    /// Best arbitrated segment agreement, [None] when the station saw
    /// no segment for this track.
    pub segment: Option<SegmentAgreement>,
}

impl StationMatch {
    /// True when the station carries a segment agreeing with the track
    /// in the bending plane.
    fn is_matched(&self, cuts: &SelectionCuts) -> bool {
        match &self.segment {
            Some(seg) => seg.dx.abs() < cuts.max_abs_dx || seg.pull_x.abs() < cuts.max_abs_pull_x,
            None => false,
        }
    }
}

impl SegmentAgreement {
    fn passes_y(&self, cuts: &SelectionCuts) -> bool {
        match (self.dy, self.pull_y) {
            (Some(dy), Some(pull)) => dy.abs() < cuts.max_abs_dy || pull.abs() < cuts.max_abs_pull_y,
            (Some(dy), None) => dy.abs() < cuts.max_abs_dy,
            (None, Some(pull)) => pull.abs() < cuts.max_abs_pull_y,
            // no non-bending measurement: only an unbounded cut passes
            (None, None) => cuts.max_abs_dy.is_infinite() || cuts.max_abs_pull_y.is_infinite(),
        }
    }
}

/// Stations the track crossed well within active volume, so a segment
/// there may legitimately be demanded.
pub fn required_station_mask(matches: &[StationMatch], cuts: &SelectionCuts) -> StationMask {
    let mut mask = StationMask::default();
    for m in matches.iter() {
        if m.chamber_dist < cuts.max_chamber_dist
            && m.chamber_dist_pull < cuts.max_chamber_dist_pull
        {
            mask.insert(m.station);
        }
    }
    mask
}

/// Classify a track's station-match pattern under a named policy.
///
/// The candidate passes when enough stations are well matched and the
/// outermost station crossed well within active volume carries a
/// segment agreeing with the track in the bending plane (the tight
/// policy additionally demands non-bending agreement there). A track
/// that crosses no station well within active volume is judged on the
/// matched-station count alone.
pub fn is_good_candidate(matches: &[StationMatch], policy: SelectionPolicy) -> bool {
    is_good_candidate_with_cuts(matches, &policy.cuts())
}

/// Same classification under fully custom [SelectionCuts].
pub fn is_good_candidate_with_cuts(matches: &[StationMatch], cuts: &SelectionCuts) -> bool {
    let matched = matches.iter().filter(|m| m.is_matched(cuts)).count();
    if matched < cuts.min_matches {
        return false;
    }

    let required = required_station_mask(matches, cuts);
    let last = match required.outermost() {
        Some(station) => station,
        None => return true,
    };

    let last_match = match matches.iter().find(|m| m.station == last) {
        Some(m) => m,
        None => return false,
    };
    if !last_match.is_matched(cuts) {
        return false;
    }
    match &last_match.segment {
        Some(seg) => seg.passes_y(cuts),
        None => false,
    }
}
