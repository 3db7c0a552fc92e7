// src/tracking/geometry.rs
//
// Real-world measurements from the fitted lines: radius of curvature and the
// vehicle's lateral offset from the lane centre.
//
// Offset assumption:
//   The camera is forward-facing, mounted on the vehicle's centreline and not
//   rotated, so the image's horizontal centre is the vehicle's position. Lane
//   width is taken from the pixels nearest the vehicle only. This is a
//   heuristic, not a homography-based lateral position.

use super::line_model::{FitCoefficients, LineModel};
use crate::types::{FitSpace, ScaleConfig};

/// Returned by `offset_from_center` when either line is undetected.
pub const OFFSET_UNAVAILABLE: f64 = -1.0;

/// Pixels with y above this fraction of the line's lowest pixel count as
/// "near the vehicle".
const BOTTOM_BAND_FRACTION: f64 = 0.95;

/// Radius of the osculating circle of x = a·y² + b·y + c at `y_eval`.
///
/// A straight line (`a == 0`) has infinite radius.
pub fn curvature_radius(fit: &FitCoefficients, y_eval: f64) -> f64 {
    let two_a = 2.0 * fit.a;
    if two_a == 0.0 {
        return f64::INFINITY;
    }
    let slope = two_a * y_eval + fit.b;
    (1.0 + slope * slope).powf(1.5) / two_a.abs()
}

#[derive(Debug, Clone, Copy)]
pub struct GeometryEstimator {
    scale: ScaleConfig,
}

impl GeometryEstimator {
    pub fn new(scale: ScaleConfig) -> Self {
        Self { scale }
    }

    /// Curvature of a line's averaged meter-space fit at the bottom row.
    pub fn line_curvature(&self, line: &LineModel, frame_height_px: usize) -> Option<f64> {
        let fit = line.average_fit(FitSpace::Meter)?;
        let y_eval = frame_height_px.saturating_sub(1) as f64 * self.scale.ym_per_pix;
        Some(curvature_radius(&fit, y_eval))
    }

    /// Mean of the per-line curvature estimates that exist.
    pub fn mean_curvature(left: &LineModel, right: &LineModel) -> Option<f64> {
        match (left.curvature_meter(), right.curvature_meter()) {
            (Some(l), Some(r)) => Some(0.5 * (l + r)),
            (Some(v), None) | (None, Some(v)) => Some(v),
            (None, None) => None,
        }
    }

    /// Lateral offset of the frame centre from the lane midpoint, in meters.
    ///
    /// Returns `OFFSET_UNAVAILABLE` unless both lines are detected.
    pub fn offset_from_center(
        &self,
        left: &LineModel,
        right: &LineModel,
        frame_width_px: usize,
    ) -> f64 {
        if !(left.detected() && right.detected()) {
            return OFFSET_UNAVAILABLE;
        }
        let (Some(left_x), Some(right_x)) = (bottom_x(left), bottom_x(right)) else {
            return OFFSET_UNAVAILABLE;
        };

        let lane_width = right_x - left_x;
        let midpoint = left_x + lane_width / 2.0;
        let offset_px = (midpoint - frame_width_px as f64 / 2.0).abs();
        self.scale.xm_per_pix * offset_px
    }
}

/// Mean x of the line's pixels closest to the vehicle.
fn bottom_x(line: &LineModel) -> Option<f64> {
    let max_y = *line.pixel_y().iter().max()? as f64;
    let cutoff = BOTTOM_BAND_FRACTION * max_y;

    let (sum, count) = line
        .pixel_x()
        .iter()
        .zip(line.pixel_y())
        .filter(|&(_, &y)| y as f64 > cutoff)
        .fold((0.0f64, 0usize), |(s, n), (&x, _)| (s + x as f64, n + 1));

    if count == 0 {
        // Only when every pixel lies on row 0.
        None
    } else {
        Some(sum / count as f64)
    }
}
