//! Timing extraction orchestration
use log::debug;

use crate::corrector::HitCorrector;
use crate::errors::ConfigError;
use crate::fit::{fit_samples, FitSample};
use crate::geometry::WireGeometry;
use crate::measurement::{SequenceFit, StationMask, TimeMeasurementSequence};
use crate::segment::{SegmentSource, TrackId};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// [TimingConfig] gathers the extraction policy knobs, validated once
/// at [crate::extractor::TimingExtractor] construction.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TimingConfig {
    /// Minimum number of usable hits to attempt a fit, and the floor
    /// pruning never goes below.
    pub hits_min: usize,
    /// Outlier threshold, a dimensionless multiple of the residual
    /// scale.
    pub prune_cut: f64,
    /// Subtract the segment-supplied reference time from raw hit times.
    pub use_segment_t0: bool,
    /// Apply the wire-propagation delay looked up from the geometry.
    pub do_wire_corr: bool,
    /// Keep non-bending (theta) hits out of the sequence entirely.
    pub drop_theta: bool,
    /// Only accept segments carrying both the phi and theta projection.
    pub require_both_projections: bool,
    /// Nominal time offset (ns) added to every corrected hit time.
    pub time_offset: f64,
    /// Per-hit time resolution (ns), seeding downstream weights.
    pub time_error: f64,
}

impl Default for TimingConfig {
    /// Nominal extraction policy: wire correction on, theta kept,
    /// segment T0 ignored, 8 hits minimum, 3 sigma prune cut,
    /// 6 ns per-hit resolution.
    fn default() -> Self {
        Self {
            hits_min: 8,
            prune_cut: 3.0,
            use_segment_t0: false,
            do_wire_corr: true,
            drop_theta: false,
            require_both_projections: false,
            time_offset: 0.0,
            time_error: 6.0,
        }
    }
}

impl TimingConfig {
    /// Returns a new [TimingConfig] with desired minimum hit count.
    pub fn with_hits_min(&self, hits_min: usize) -> Self {
        let mut s = self.clone();
        s.hits_min = hits_min;
        s
    }

    /// Returns a new [TimingConfig] with desired prune cut.
    pub fn with_prune_cut(&self, prune_cut: f64) -> Self {
        let mut s = self.clone();
        s.prune_cut = prune_cut;
        s
    }

    /// Returns a new [TimingConfig] with segment-T0 subtraction
    /// enabled or disabled.
    pub fn with_segment_t0(&self, enabled: bool) -> Self {
        let mut s = self.clone();
        s.use_segment_t0 = enabled;
        s
    }

    /// Returns a new [TimingConfig] with wire-propagation correction
    /// enabled or disabled.
    pub fn with_wire_correction(&self, enabled: bool) -> Self {
        let mut s = self.clone();
        s.do_wire_corr = enabled;
        s
    }

    /// Returns a new [TimingConfig] dropping (or keeping) theta hits.
    pub fn with_theta_dropped(&self, dropped: bool) -> Self {
        let mut s = self.clone();
        s.drop_theta = dropped;
        s
    }

    /// Returns a new [TimingConfig] requiring (or not) both
    /// projections per segment.
    pub fn with_both_projections_required(&self, required: bool) -> Self {
        let mut s = self.clone();
        s.require_both_projections = required;
        s
    }

    /// Returns a new [TimingConfig] with desired nominal time offset (ns).
    pub fn with_time_offset(&self, offset: f64) -> Self {
        let mut s = self.clone();
        s.time_offset = offset;
        s
    }

    /// Returns a new [TimingConfig] with desired per-hit resolution (ns).
    pub fn with_time_error(&self, error: f64) -> Self {
        let mut s = self.clone();
        s.time_error = error;
        s
    }

    /// Policy validation, run once at extractor construction.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hits_min < 2 {
            return Err(ConfigError::HitsMinTooSmall(self.hits_min));
        }
        if !self.prune_cut.is_finite() || self.prune_cut <= 0.0 {
            return Err(ConfigError::InvalidPruneCut(self.prune_cut));
        }
        if !self.time_error.is_finite() || self.time_error <= 0.0 {
            return Err(ConfigError::InvalidTimeError(self.time_error));
        }
        if !self.time_offset.is_finite() {
            return Err(ConfigError::InvalidTimeOffset(self.time_offset));
        }
        Ok(())
    }
}

/// [TimingExtractor] drives the whole pipeline for one track: collect
/// matched segments, correct their hits into a
/// [TimeMeasurementSequence], run the robust fit, and record the
/// results back into the sequence.
///
/// Stateless across invocations: processing one track never affects
/// the next, and independent callers may run concurrently provided
/// each owns its sequence and the collaborators tolerate concurrent
/// reads.
pub struct TimingExtractor<G: WireGeometry, S: SegmentSource> {
    config: TimingConfig,
    geometry: G,
    segments: S,
}

impl<G: WireGeometry, S: SegmentSource> TimingExtractor<G, S> {
    /// Builds an extractor from a validated policy and the two
    /// read-only collaborators.
    pub fn new(config: TimingConfig, geometry: G, segments: S) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            geometry,
            segments,
        })
    }

    /// Extraction policy in effect.
    pub fn config(&self) -> &TimingConfig {
        &self.config
    }

    /// Populate `sequence` with this track's corrected measurements
    /// and, when enough usable hits survive the corrections, attach
    /// the fitted (offset, slope).
    ///
    /// Every ordinary shortfall (missing geometry, too few hits, a
    /// degenerate fit) leaves the sequence without results; check
    /// [TimeMeasurementSequence::fit] before reading them.
    pub fn fill_timing(&self, track: TrackId, sequence: &mut TimeMeasurementSequence) {
        let corrector = HitCorrector::new(&self.geometry, &self.config);

        for segment in self.segments.segments_for(track).iter() {
            if self.config.require_both_projections && !segment.has_both_projections() {
                debug!(
                    "station {}: segment lacks a projection, skipped",
                    segment.station
                );
                continue;
            }
            corrector.append_segment(segment, sequence);
        }

        if sequence.len() < self.config.hits_min {
            debug!(
                "{} usable hits, {} required: no fit",
                sequence.len(),
                self.config.hits_min
            );
            return;
        }

        let samples: Vec<FitSample> = sequence
            .measurements()
            .iter()
            .map(|m| FitSample {
                pos: m.pos_in_layer,
                time: m.time_corr,
                is_left: m.is_left,
            })
            .collect();

        let fit = match fit_samples(&samples, self.config.prune_cut, self.config.hits_min) {
            Ok(fit) => fit,
            Err(error) => {
                debug!("fit abandoned: {}", error);
                return;
            },
        };

        let mut stations = StationMask::default();
        for &index in fit.used.iter() {
            stations.insert(sequence.measurements()[index].station);
        }

        // each retained hit now carries its own local offset estimate
        let slope = fit.slope;
        for &index in fit.used.iter() {
            let meas = &mut sequence.measurements_mut()[index];
            let sign = if meas.is_left { 1.0 } else { -1.0 };
            meas.time_corr = sign * (meas.time_corr - slope * meas.pos_in_layer);
        }

        sequence.set_fit(SequenceFit {
            offset: fit.offset,
            slope: fit.slope,
            hits_used: fit.hits_used(),
            stations,
            time_error: self.config.time_error,
        });
    }
}

#[cfg(test)]
mod test {
    use super::{TimingConfig, TimingExtractor};
    use crate::errors::ConfigError;
    use crate::geometry::NoWireCorrections;
    use crate::measurement::{DriftCellId, Projection, TimeMeasurementSequence};
    use crate::segment::{DriftSegment, SegmentHit, SegmentProjection, TrackId};
    use std::collections::HashMap;

    const TRACK: TrackId = TrackId(7);
    const OFFSET: f64 = 2.0;
    const SLOPE: f64 = 0.5;

    fn on_track_hit(cell: u32, pos: f64, is_left: bool) -> SegmentHit {
        let sign = if is_left { 1.0 } else { -1.0 };
        SegmentHit {
            cell: DriftCellId(cell),
            is_left,
            pos_in_layer: pos,
            dist_ip: 500.0,
            time: sign * OFFSET + SLOPE * pos,
        }
    }

    /// Two segments, 5 left + 5 right hits exactly on the mirrored
    /// lines time = ±OFFSET + SLOPE·pos.
    fn matched_segments() -> Vec<DriftSegment> {
        let mut station_1 = DriftSegment {
            station: 1,
            ..Default::default()
        };
        let mut station_3 = DriftSegment {
            station: 3,
            ..Default::default()
        };
        let mut phi_1 = SegmentProjection::default();
        let mut phi_3 = SegmentProjection::default();
        for i in 0..5 {
            let pos = 1.0 + i as f64;
            phi_1.hits.push(on_track_hit(100 + i, pos, true));
            phi_3.hits.push(on_track_hit(300 + i, pos, false));
        }
        station_1.phi = Some(phi_1);
        station_3.phi = Some(phi_3);
        vec![station_1, station_3]
    }

    fn source(segments: Vec<DriftSegment>) -> HashMap<TrackId, Vec<DriftSegment>> {
        let mut source = HashMap::new();
        source.insert(TRACK, segments);
        source
    }

    fn extractor(
        config: TimingConfig,
        segments: Vec<DriftSegment>,
    ) -> TimingExtractor<NoWireCorrections, HashMap<TrackId, Vec<DriftSegment>>> {
        TimingExtractor::new(config, NoWireCorrections, source(segments)).unwrap()
    }

    #[test]
    fn config_validation() {
        assert!(TimingConfig::default().validate().is_ok());
        assert!(matches!(
            TimingConfig::default().with_hits_min(1).validate(),
            Err(ConfigError::HitsMinTooSmall(1))
        ));
        assert!(matches!(
            TimingConfig::default().with_prune_cut(0.0).validate(),
            Err(ConfigError::InvalidPruneCut(_))
        ));
        assert!(matches!(
            TimingConfig::default().with_time_error(-1.0).validate(),
            Err(ConfigError::InvalidTimeError(_))
        ));
    }

    #[test]
    fn nominal_extraction() {
        let extractor = extractor(TimingConfig::default(), matched_segments());
        let mut sequence = TimeMeasurementSequence::new();
        extractor.fill_timing(TRACK, &mut sequence);

        let fit = sequence.fit().expect("fit expected");
        assert!((fit.offset - OFFSET).abs() < 1e-9);
        assert!((fit.slope - SLOPE).abs() < 1e-9);
        assert_eq!(fit.hits_used, 10);
        assert!(fit.stations.contains(1));
        assert!(fit.stations.contains(3));
        assert_eq!(fit.stations.len(), 2);

        // every retained hit now holds its own local offset estimate
        for meas in sequence.measurements() {
            assert!((meas.time_corr - OFFSET).abs() < 1e-9);
        }
    }

    #[test]
    fn outlier_pruned_end_to_end() {
        let mut segments = matched_segments();
        segments[0].phi.as_mut().unwrap().hits[2].time += 20.0;

        let extractor = extractor(TimingConfig::default(), segments);
        let mut sequence = TimeMeasurementSequence::new();
        extractor.fill_timing(TRACK, &mut sequence);

        let fit = sequence.fit().expect("fit expected");
        assert_eq!(fit.hits_used, 9);
        assert!((fit.offset - OFFSET).abs() < 1e-9);
        assert!((fit.slope - SLOPE).abs() < 1e-9);
    }

    #[test]
    fn below_hits_min_leaves_sentinel() {
        let extractor = extractor(
            TimingConfig::default().with_hits_min(11),
            matched_segments(),
        );
        let mut sequence = TimeMeasurementSequence::new();
        extractor.fill_timing(TRACK, &mut sequence);

        assert_eq!(sequence.len(), 10);
        assert!(!sequence.is_fitted());
        // raw corrected times untouched by any write-back
        assert_eq!(
            sequence.measurements()[0].time_corr,
            OFFSET + SLOPE * 1.0
        );
    }

    #[test]
    fn unknown_track_yields_empty_sequence() {
        let extractor = extractor(TimingConfig::default(), matched_segments());
        let mut sequence = TimeMeasurementSequence::new();
        extractor.fill_timing(TrackId(999), &mut sequence);
        assert!(sequence.is_empty());
        assert!(!sequence.is_fitted());
    }

    #[test]
    fn phi_only_segment_excluded_when_both_required() {
        let mut segments = matched_segments();
        // give station 3 a theta projection, leave station 1 phi-only
        segments[1].theta = Some(SegmentProjection::default());

        let extractor = extractor(
            TimingConfig::default()
                .with_both_projections_required(true)
                .with_hits_min(2),
            segments,
        );
        let mut sequence = TimeMeasurementSequence::new();
        extractor.fill_timing(TRACK, &mut sequence);

        // station 1 contributes nothing at all
        assert_eq!(sequence.len(), 5);
        assert!(sequence.measurements().iter().all(|m| m.station == 3));
    }

    #[test]
    fn theta_hits_never_appear_when_dropped() {
        let mut segments = matched_segments();
        segments[0].theta = Some(SegmentProjection {
            t0: None,
            hits: vec![on_track_hit(900, 2.5, true)],
        });

        let extractor = extractor(
            TimingConfig::default().with_theta_dropped(true),
            segments,
        );
        let mut sequence = TimeMeasurementSequence::new();
        extractor.fill_timing(TRACK, &mut sequence);

        assert!(sequence
            .measurements()
            .iter()
            .all(|m| m.projection == Projection::Phi));
    }

    #[test]
    fn idempotent_across_invocations() {
        let extractor = extractor(TimingConfig::default(), matched_segments());

        let mut first = TimeMeasurementSequence::new();
        extractor.fill_timing(TRACK, &mut first);

        let mut second = TimeMeasurementSequence::new();
        extractor.fill_timing(TRACK, &mut second);

        assert_eq!(first.fit(), second.fit());
        assert_eq!(first.measurements(), second.measurements());
    }

    #[test]
    fn inverse_beta_close_to_unity_for_prompt_track() {
        // hits exactly on the mirrored lines with zero global offset:
        // local offsets all vanish, the track is in time
        let mut segments = matched_segments();
        for segment in segments.iter_mut() {
            for hit in segment.phi.as_mut().unwrap().hits.iter_mut() {
                let sign = if hit.is_left { 1.0 } else { -1.0 };
                hit.time -= sign * OFFSET;
            }
        }

        let extractor = extractor(TimingConfig::default(), segments);
        let mut sequence = TimeMeasurementSequence::new();
        extractor.fill_timing(TRACK, &mut sequence);

        assert!(sequence.is_fitted());
        let invbeta = sequence.inverse_beta().expect("fitted sequence");
        assert!((invbeta - 1.0).abs() < 1e-9);
    }
}
