//! Raw segment hits into corrected time measurements
use log::debug;

use crate::extractor::TimingConfig;
use crate::geometry::WireGeometry;
use crate::measurement::{Projection, TimeMeasurement, TimeMeasurementSequence};
use crate::segment::{DriftSegment, SegmentProjection};

/// [HitCorrector] turns one matched segment into corrected
/// [TimeMeasurement] records appended to a per-track sequence.
///
/// It never fails and never removes records: a hit lacking a usable
/// geometric correction, or carrying non-finite values, is silently
/// skipped.
pub struct HitCorrector<'a, G: WireGeometry> {
    geometry: &'a G,
    config: &'a TimingConfig,
}

impl<'a, G: WireGeometry> HitCorrector<'a, G> {
    pub fn new(geometry: &'a G, config: &'a TimingConfig) -> Self {
        Self { geometry, config }
    }

    /// Append all usable measurements of this segment to the sequence.
    /// Appends zero, one or two projections' worth of records, honoring
    /// the theta-drop policy.
    pub fn append_segment(
        &self,
        segment: &DriftSegment,
        sequence: &mut TimeMeasurementSequence,
    ) {
        if let Some(phi) = &segment.phi {
            self.append_projection(phi, Projection::Phi, segment.station, sequence);
        }
        if let Some(theta) = &segment.theta {
            if self.config.drop_theta {
                debug!("station {}: theta projection dropped", segment.station);
            } else {
                self.append_projection(theta, Projection::Theta, segment.station, sequence);
            }
        }
    }

    fn append_projection(
        &self,
        projection: &SegmentProjection,
        kind: Projection,
        station: u8,
        sequence: &mut TimeMeasurementSequence,
    ) {
        for hit in projection.hits.iter() {
            let mut time_corr = hit.time;

            if self.config.use_segment_t0 {
                if let Some(t0) = projection.t0 {
                    time_corr -= t0;
                }
            }

            if self.config.do_wire_corr {
                match self.geometry.propagation_delay(hit.cell) {
                    Some(delay) => time_corr -= delay,
                    None => {
                        debug!("{}: no wire geometry, hit skipped", hit.cell);
                        continue;
                    },
                }
            }

            time_corr += self.config.time_offset;

            let measurement = TimeMeasurement {
                is_left: hit.is_left,
                projection: kind,
                pos_in_layer: hit.pos_in_layer,
                dist_ip: hit.dist_ip,
                time_corr,
                station,
                cell: hit.cell,
            };
            if !measurement.is_usable() {
                debug!("{}: non-finite hit values, hit skipped", hit.cell);
                continue;
            }
            sequence.push(measurement);
        }
    }
}
