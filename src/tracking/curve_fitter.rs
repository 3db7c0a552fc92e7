// src/tracking/curve_fitter.rs
//
// Least-squares fit of x = a·y² + b·y + c through a line's pixels.
//
// Every line is fitted twice per frame: once on raw pixel coordinates (for
// drawing) and once on coordinates scaled to meters (for curvature). The two
// are independent fits, not a rescaling of one another.
//
// Numerics:
//   Raw y reaches ~720 px, so y⁴ sums span >20 orders of magnitude across
//   the normal equations. y is centred and scaled to [-1, 1] before solving
//   and the coefficients are expanded back to raw-y form afterwards.

use super::line_model::{FitCoefficients, LineFit};
use crate::error::{TrackingError, TrackingResult};
use crate::mask::PixelCoord;
use crate::types::ScaleConfig;
use nalgebra::{Matrix3, Vector3};
use tracing::debug;

/// A quadratic needs at least this many distinct sample rows.
pub const MIN_DISTINCT_ROWS: usize = 3;

#[derive(Debug, Clone, Copy)]
pub struct CurveFitter {
    scale: ScaleConfig,
}

impl CurveFitter {
    pub fn new(scale: ScaleConfig) -> Self {
        Self { scale }
    }

    /// Pixel-space and meter-space fits for one line.
    pub fn fit_line(&self, xs: &[PixelCoord], ys: &[PixelCoord]) -> TrackingResult<LineFit> {
        let distinct = distinct_rows(ys);
        if distinct < MIN_DISTINCT_ROWS {
            return Err(TrackingError::IllConditionedFit {
                distinct_rows: distinct,
            });
        }

        let px: Vec<(f64, f64)> = xs
            .iter()
            .zip(ys)
            .map(|(&x, &y)| (x as f64, y as f64))
            .collect();
        let pixel = fit_polynomial(&px)?;

        let (xm, ym) = (self.scale.xm_per_pix, self.scale.ym_per_pix);
        let meters: Vec<(f64, f64)> = px.iter().map(|&(x, y)| (x * xm, y * ym)).collect();
        let meter = fit_polynomial(&meters)?;

        Ok(LineFit { pixel, meter })
    }

    pub fn scale(&self) -> ScaleConfig {
        self.scale
    }
}

fn distinct_rows(ys: &[PixelCoord]) -> usize {
    let mut rows = ys.to_vec();
    rows.sort_unstable();
    rows.dedup();
    rows.len()
}

/// Fit x = a·y² + b·y + c to `(x, y)` samples.
pub fn fit_polynomial(points: &[(f64, f64)]) -> TrackingResult<FitCoefficients> {
    let mut rows: Vec<f64> = points.iter().map(|p| p.1).collect();
    rows.sort_by(|a, b| a.total_cmp(b));
    rows.dedup();
    if rows.len() < MIN_DISTINCT_ROWS {
        return Err(TrackingError::IllConditionedFit {
            distinct_rows: rows.len(),
        });
    }

    let y_min = rows[0];
    let y_max = rows[rows.len() - 1];
    let mid = 0.5 * (y_min + y_max);
    let half = 0.5 * (y_max - y_min);

    let mut s1 = 0.0f64;
    let mut s2 = 0.0f64;
    let mut s3 = 0.0f64;
    let mut s4 = 0.0f64;
    let mut sx0 = 0.0f64;
    let mut sx1 = 0.0f64;
    let mut sx2 = 0.0f64;

    for &(x, y) in points {
        let t = (y - mid) / half;
        let t2 = t * t;
        s1 += t;
        s2 += t2;
        s3 += t2 * t;
        s4 += t2 * t2;
        sx0 += x;
        sx1 += x * t;
        sx2 += x * t2;
    }
    let s0 = points.len() as f64;

    //   | s4 s3 s2 | | α |   | sx2 |
    //   | s3 s2 s1 | | β | = | sx1 |
    //   | s2 s1 s0 | | γ |   | sx0 |
    let normal = Matrix3::new(s4, s3, s2, s3, s2, s1, s2, s1, s0);
    let rhs = Vector3::new(sx2, sx1, sx0);
    let solved = normal
        .lu()
        .solve(&rhs)
        .filter(|v| v.iter().all(|c| c.is_finite()));
    let Some(v) = solved else {
        debug!(
            "Normal equations singular ({} points, {} rows)",
            points.len(),
            rows.len()
        );
        return Err(TrackingError::IllConditionedFit {
            distinct_rows: rows.len(),
        });
    };

    let (alpha, beta, gamma) = (v[0], v[1], v[2]);

    // x = α·((y−m)/h)² + β·(y−m)/h + γ, expanded in y.
    let h2 = half * half;
    Ok(FitCoefficients {
        a: alpha / h2,
        b: beta / half - 2.0 * alpha * mid / h2,
        c: gamma - beta * mid / half + alpha * mid * mid / h2,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_three_rows_determine_parabola() {
        let truth = FitCoefficients::new(0.5, -2.0, 7.0);
        let pts: Vec<(f64, f64)> = [3.0, 10.0, 42.0]
            .iter()
            .map(|&y| (truth.eval(y), y))
            .collect();
        let fit = fit_polynomial(&pts).unwrap();
        assert_abs_diff_eq!(fit.a, truth.a, epsilon = 1e-9);
        assert_abs_diff_eq!(fit.b, truth.b, epsilon = 1e-8);
        assert_abs_diff_eq!(fit.c, truth.c, epsilon = 1e-7);
    }

    #[test]
    fn test_vertical_column_fits_constant() {
        let pts: Vec<(f64, f64)> = (0..720).map(|y| (300.0, y as f64)).collect();
        let fit = fit_polynomial(&pts).unwrap();
        assert_abs_diff_eq!(fit.a, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(fit.b, 0.0, epsilon = 1e-7);
        assert_abs_diff_eq!(fit.c, 300.0, epsilon = 1e-6);
    }

    #[test]
    fn test_recovers_exact_parabola() {
        let truth = FitCoefficients::new(2e-4, -0.3, 410.0);
        let pts: Vec<(f64, f64)> = (0..720)
            .step_by(3)
            .map(|y| (truth.eval(y as f64), y as f64))
            .collect();
        let fit = fit_polynomial(&pts).unwrap();
        assert_abs_diff_eq!(fit.a, truth.a, epsilon = 1e-9);
        assert_abs_diff_eq!(fit.b, truth.b, epsilon = 1e-6);
        assert_abs_diff_eq!(fit.c, truth.c, epsilon = 1e-4);
    }

    #[test]
    fn test_two_rows_is_ill_conditioned() {
        let pts = [(1.0, 10.0), (2.0, 10.0), (3.0, 11.0), (4.0, 11.0)];
        assert_eq!(
            fit_polynomial(&pts),
            Err(TrackingError::IllConditionedFit { distinct_rows: 2 })
        );
    }

    #[test]
    fn test_empty_input_is_ill_conditioned() {
        let fitter = CurveFitter::new(ScaleConfig::default());
        assert!(matches!(
            fitter.fit_line(&[], &[]),
            Err(TrackingError::IllConditionedFit { distinct_rows: 0 })
        ));
    }

    #[test]
    fn test_meter_fit_is_independent_scaled_fit() {
        let scale = ScaleConfig::default();
        let fitter = CurveFitter::new(scale);
        let truth = FitCoefficients::new(1e-4, 0.05, 200.0);
        let ys: Vec<PixelCoord> = (0..720).collect();
        // Exact integer x keeps the comparison clean.
        let xs: Vec<PixelCoord> = ys
            .iter()
            .map(|&y| truth.eval(y as f64).round() as PixelCoord)
            .collect();
        let fit = fitter.fit_line(&xs, &ys).unwrap();

        let (xm, ym) = (scale.xm_per_pix, scale.ym_per_pix);
        assert_abs_diff_eq!(fit.meter.a, fit.pixel.a * xm / (ym * ym), epsilon = 1e-9);
        assert_abs_diff_eq!(fit.meter.b, fit.pixel.b * xm / ym, epsilon = 1e-9);
        assert_abs_diff_eq!(fit.meter.c, fit.pixel.c * xm, epsilon = 1e-9);
    }
}
