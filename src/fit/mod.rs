//! Robust two-branch (offset, slope) fitting
use itertools::izip;
use log::debug;
use polyfit_rs::polyfit_rs::polyfit;

use crate::errors::FitError;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Residuals below this level (ns) are numerical noise; pruning never
/// acts on them.
const RESIDUAL_FLOOR: f64 = 1e-9;

/// One (position, time) pair with its drift-cell side assignment,
/// ready for fitting.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FitSample {
    /// Position within the layer (cm).
    pub pos: f64,
    /// Corrected hit time (ns).
    pub time: f64,
    /// Drift-cell side: left hits carry the +offset branch, right hits
    /// the mirrored −offset branch.
    pub is_left: bool,
}

impl FitSample {
    fn sign(&self) -> f64 {
        if self.is_left {
            1.0
        } else {
            -1.0
        }
    }

    fn residual(&self, offset: f64, slope: f64) -> f64 {
        self.time - slope * self.pos - self.sign() * offset
    }
}

/// [T0Fit] is the outcome of a successful robust fit.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct T0Fit {
    /// Global arrival-time offset (ns): the left branch follows
    /// `time = offset + slope·pos`, the right branch its mirror
    /// `time = −offset + slope·pos`.
    pub offset: f64,
    /// Shared slope (ns/cm).
    pub slope: f64,
    /// Residual RMS of the retained hits (ns).
    pub rms: f64,
    /// Indices (into the input samples) of the hits retained by the
    /// fit, ascending.
    pub used: Vec<usize>,
    /// Number of hits removed as outliers.
    pub pruned: usize,
}

impl T0Fit {
    /// Number of hits the reported estimate rests on.
    pub fn hits_used(&self) -> usize {
        self.used.len()
    }
}

/// Least-squares solution for (offset, slope) over the active samples.
///
/// Mixed left/right populations share one slope with mirrored offsets,
/// solved through the 2x2 normal equations. A single-branch population
/// degenerates to an ordinary degree-1 polynomial fit.
fn solve(samples: &[FitSample], active: &[usize]) -> Result<(f64, f64), FitError> {
    if active.is_empty() {
        return Err(FitError::NoHits);
    }

    let lefts = active.iter().filter(|&&i| samples[i].is_left).count();

    if lefts == 0 || lefts == active.len() {
        // single branch: plain y = c0 + c1·x
        let xs: Vec<f64> = active.iter().map(|&i| samples[i].pos).collect();
        let ys: Vec<f64> = active.iter().map(|&i| samples[i].time).collect();
        let coeffs = polyfit(&xs, &ys, 1).map_err(|_| FitError::RegressionFailure)?;
        let slope = coeffs[1];
        let offset = if lefts > 0 { coeffs[0] } else { -coeffs[0] };
        if !offset.is_finite() || !slope.is_finite() {
            return Err(FitError::RegressionFailure);
        }
        return Ok((offset, slope));
    }

    // model: time = slope·pos + sign·offset
    let mut n = 0.0_f64;
    let mut sx = 0.0_f64; // Σ sign·pos
    let mut sy = 0.0_f64; // Σ sign·time
    let mut xy = 0.0_f64; // Σ pos·time
    let mut xx = 0.0_f64; // Σ pos²
    for &i in active.iter() {
        let sample = &samples[i];
        let sign = sample.sign();
        n += 1.0;
        sx += sign * sample.pos;
        sy += sign * sample.time;
        xy += sample.pos * sample.time;
        xx += sample.pos * sample.pos;
    }

    let det = n * xx - sx * sx;
    if det.abs() <= f64::EPSILON * n * xx.abs() {
        return Err(FitError::RegressionFailure);
    }

    let offset = (sy * xx - sx * xy) / det;
    let slope = (n * xy - sx * sy) / det;
    if !offset.is_finite() || !slope.is_finite() {
        return Err(FitError::RegressionFailure);
    }
    Ok((offset, slope))
}

/// Robust fit over pre-built samples, retaining the identity of every
/// hit that survives pruning.
///
/// Iterates equal-weight least squares, removing the single worst
/// residual per pass while it exceeds `prune_cut` times the residual
/// scale of the remaining hits, then refitting. Pruning never takes
/// the retained count below `hits_min`: the fit preceding such a
/// removal is kept. Ties on the worst residual resolve to the earliest
/// sample, so the procedure is reproducible for identical input order.
pub fn fit_samples(
    samples: &[FitSample],
    prune_cut: f64,
    hits_min: usize,
) -> Result<T0Fit, FitError> {
    let mut active: Vec<usize> = (0..samples.len()).collect();
    let (mut offset, mut slope) = solve(samples, &active)?;
    let mut pruned = 0_usize;

    let rms = loop {
        let mut sum2 = 0.0_f64;
        let mut worst = 0_usize;
        let mut worst_abs = 0.0_f64;
        for (rank, &i) in active.iter().enumerate() {
            let abs = samples[i].residual(offset, slope).abs();
            sum2 += abs * abs;
            if abs > worst_abs {
                worst_abs = abs;
                worst = rank;
            }
        }
        let rms = (sum2 / active.len() as f64).sqrt();

        // scale from the other hits, so a gross outlier cannot mask
        // itself inside the RMS it dominates
        let scale = if active.len() > 1 {
            ((sum2 - worst_abs * worst_abs) / (active.len() - 1) as f64).sqrt()
        } else {
            rms
        };

        if worst_abs <= RESIDUAL_FLOOR || worst_abs <= prune_cut * scale {
            break rms;
        }
        if active.len() <= hits_min {
            debug!(
                "pruning halted at {} hits (minimum {}), worst residual {:.3} ns kept",
                active.len(),
                hits_min,
                worst_abs
            );
            break rms;
        }

        let mut candidate = active.clone();
        let removed = candidate.remove(worst);
        match solve(samples, &candidate) {
            Ok((new_offset, new_slope)) => {
                debug!(
                    "pruned hit {} (residual {:.3} ns, scale {:.3} ns)",
                    removed, worst_abs, scale
                );
                active = candidate;
                offset = new_offset;
                slope = new_slope;
                pruned += 1;
            },
            Err(error) => {
                // removal would leave a degenerate system: keep this fit
                debug!("pruning halted: {}", error);
                break rms;
            },
        }
    };

    Ok(T0Fit {
        offset,
        slope,
        rms,
        used: active,
        pruned,
    })
}

/// Robust fit from split left/right (position, time) arrays.
///
/// ## Input
/// - xl, yl: positions and times of left-assigned hits
/// - xr, yr: positions and times of right-assigned hits
/// - prune_cut: outlier threshold, a multiple of the residual scale
/// - hits_min: retained-hit count pruning must never go below
///
/// ## Output
/// - fitted [T0Fit], or [FitError] when no solution exists. Retained
///   indices count left hits first, then right hits.
///
/// Position/time arrays of unequal length are a caller bug.
pub fn fit_t0(
    xl: &[f64],
    yl: &[f64],
    xr: &[f64],
    yr: &[f64],
    prune_cut: f64,
    hits_min: usize,
) -> Result<T0Fit, FitError> {
    assert_eq!(xl.len(), yl.len(), "left position/time arrays differ in length");
    assert_eq!(xr.len(), yr.len(), "right position/time arrays differ in length");

    let mut samples = Vec::with_capacity(xl.len() + xr.len());
    for (&pos, &time) in izip!(xl, yl) {
        samples.push(FitSample {
            pos,
            time,
            is_left: true,
        });
    }
    for (&pos, &time) in izip!(xr, yr) {
        samples.push(FitSample {
            pos,
            time,
            is_left: false,
        });
    }
    fit_samples(&samples, prune_cut, hits_min)
}

#[cfg(test)]
mod test {
    use super::{fit_samples, fit_t0, FitSample};
    use crate::errors::FitError;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    const OFFSET: f64 = 2.0;
    const SLOPE: f64 = 0.5;

    /// 5 left + 5 right hits exactly on the mirrored lines.
    fn clean_arrays() -> (Vec<f64>, Vec<f64>, Vec<f64>, Vec<f64>) {
        let xl: Vec<f64> = (1..=5).map(|x| x as f64).collect();
        let yl: Vec<f64> = xl.iter().map(|x| OFFSET + SLOPE * x).collect();
        let xr = xl.clone();
        let yr: Vec<f64> = xr.iter().map(|x| -OFFSET + SLOPE * x).collect();
        (xl, yl, xr, yr)
    }

    #[test]
    fn clean_recovery_without_pruning() {
        let (xl, yl, xr, yr) = clean_arrays();
        let fit = fit_t0(&xl, &yl, &xr, &yr, 3.0, 8).unwrap();
        assert!((fit.offset - OFFSET).abs() < 1e-12);
        assert!((fit.slope - SLOPE).abs() < 1e-12);
        assert_eq!(fit.hits_used(), 10);
        assert_eq!(fit.pruned, 0);
        assert!(fit.rms < 1e-12);
    }

    #[test]
    fn single_outlier_pruned_exactly() {
        let (xl, mut yl, xr, yr) = clean_arrays();
        yl[2] += 20.0; // one left hit 20 ns late

        let fit = fit_t0(&xl, &yl, &xr, &yr, 3.0, 8).unwrap();
        assert_eq!(fit.pruned, 1);
        assert_eq!(fit.hits_used(), 9);
        assert!(!fit.used.contains(&2), "outlier index must be dropped");
        assert!((fit.offset - OFFSET).abs() < 1e-9);
        assert!((fit.slope - SLOPE).abs() < 1e-9);
    }

    #[test]
    fn pruning_respects_hits_min() {
        let (xl, mut yl, xr, yr) = clean_arrays();
        yl[2] += 20.0;

        // already at the minimum: the outlier must be kept
        let fit = fit_t0(&xl, &yl, &xr, &yr, 3.0, 10).unwrap();
        assert_eq!(fit.pruned, 0);
        assert_eq!(fit.hits_used(), 10);
    }

    #[test]
    fn left_only_degenerates_to_plain_regression() {
        let (xl, yl, _, _) = clean_arrays();
        let fit = fit_t0(&xl, &yl, &[], &[], 3.0, 2).unwrap();
        assert!((fit.offset - OFFSET).abs() < 1e-9);
        assert!((fit.slope - SLOPE).abs() < 1e-9);
        assert_eq!(fit.hits_used(), 5);
    }

    #[test]
    fn right_only_mirrors_the_offset() {
        let (_, _, xr, yr) = clean_arrays();
        let fit = fit_t0(&[], &[], &xr, &yr, 3.0, 2).unwrap();
        assert!((fit.offset - OFFSET).abs() < 1e-9);
        assert!((fit.slope - SLOPE).abs() < 1e-9);
    }

    #[test]
    fn both_populations_empty() {
        assert!(matches!(
            fit_t0(&[], &[], &[], &[], 3.0, 2),
            Err(FitError::NoHits)
        ));
    }

    #[test]
    fn degenerate_geometry_is_reported() {
        // every hit at the same position: slope unconstrained
        let xs = [1.5, 1.5, 1.5];
        let ys = [2.0, 2.1, 1.9];
        assert!(matches!(
            fit_t0(&xs, &ys, &[], &[], 3.0, 2),
            Err(FitError::RegressionFailure)
        ));
    }

    #[test]
    #[should_panic]
    fn mismatched_arrays_are_a_caller_bug() {
        let _ = fit_t0(&[1.0, 2.0], &[1.0], &[], &[], 3.0, 2);
    }

    #[test]
    fn deterministic_on_tied_residuals() {
        // two identical outliers: the earliest one goes first
        let mut samples: Vec<FitSample> = (1..=6)
            .map(|x| FitSample {
                pos: x as f64,
                time: OFFSET + SLOPE * x as f64,
                is_left: true,
            })
            .collect();
        samples.extend((1..=6).map(|x| FitSample {
            pos: x as f64,
            time: -OFFSET + SLOPE * x as f64,
            is_left: false,
        }));
        samples[1].time += 25.0;
        samples[7].time += 25.0;

        let first = fit_samples(&samples, 3.0, 4).unwrap();
        let second = fit_samples(&samples, 3.0, 4).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.pruned, 2);
        assert!(!first.used.contains(&1));
        assert!(!first.used.contains(&7));
    }

    #[test]
    fn noisy_recovery_within_tolerance() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut xl = Vec::new();
        let mut yl = Vec::new();
        let mut xr = Vec::new();
        let mut yr = Vec::new();
        for i in 0..50 {
            let x = 0.5 + 0.1 * i as f64;
            let noise = (rng.gen::<f64>() - 0.5) * 0.2;
            if i % 2 == 0 {
                xl.push(x);
                yl.push(OFFSET + SLOPE * x + noise);
            } else {
                xr.push(x);
                yr.push(-OFFSET + SLOPE * x + noise);
            }
        }
        let fit = fit_t0(&xl, &yl, &xr, &yr, 3.0, 8).unwrap();
        assert!((fit.offset - OFFSET).abs() < 0.05);
        assert!((fit.slope - SLOPE).abs() < 0.05);
        assert!(fit.hits_used() >= 45);
    }
}
