// src/tracking/pixel_locator.rs
//
// Finds which mask pixels belong to the left and right lane lines in a
// bird's-eye binary mask.
//
// Two searches:
//   - Sliding window (cold start): seed each line at the peak of a column
//     histogram over the bottom half of the mask, then walk fixed-width
//     windows up the image band by band, recentering on the pixels found.
//   - Prior fit (warm): keep every set pixel within a corridor around the
//     previous frame's polynomial. Cheaper and steadier while the lines are
//     being tracked, but only trusted when it returns enough pixels.
//
// Both searches return pixels in row-major order, so on an unchanged mask a
// warm search seeded with the cold fit yields an identical pixel set.

use super::line_model::FitCoefficients;
use crate::error::{TrackingError, TrackingResult};
use crate::mask::{BinaryMask, PixelCoord};
use crate::types::{LineSide, TrackingConfig};
use tracing::debug;

// ============================================================================
// TYPES
// ============================================================================

/// How a line's pixels were located this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchPath {
    /// Blind sliding-window search.
    SlidingWindow,
    /// Corridor around the previous fit.
    PriorFit,
    /// Warm search came back too thin; sliding window used for this frame.
    Degraded,
}

impl SearchPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SlidingWindow => "SLIDING",
            Self::PriorFit => "PRIOR",
            Self::Degraded => "DEGRADED",
        }
    }
}

/// Pixels attributed to one line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinePixels {
    pub xs: Vec<PixelCoord>,
    pub ys: Vec<PixelCoord>,
}

impl LinePixels {
    pub fn len(&self) -> usize {
        self.xs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.xs.is_empty()
    }

    fn from_points(mut points: Vec<(PixelCoord, PixelCoord)>) -> Self {
        // (y, x) ordering is row-major.
        points.sort_unstable();
        let (ys, xs) = points.into_iter().unzip();
        Self { xs, ys }
    }
}

/// One sliding window. Rows are `[y_low, y_high)`, columns `[x_low, x_high)`;
/// columns may extend past the mask edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchWindow {
    pub x_low: i64,
    pub x_high: i64,
    pub y_low: usize,
    pub y_high: usize,
}

#[derive(Debug, Clone, Default)]
pub struct SlidingWindowSearch {
    pub left: LinePixels,
    pub right: LinePixels,
    pub left_windows: Vec<SearchWindow>,
    pub right_windows: Vec<SearchWindow>,
}

impl SlidingWindowSearch {
    pub fn pixels(&self, side: LineSide) -> &LinePixels {
        match side {
            LineSide::Left => &self.left,
            LineSide::Right => &self.right,
        }
    }

    pub fn windows(&self, side: LineSide) -> &[SearchWindow] {
        match side {
            LineSide::Left => &self.left_windows,
            LineSide::Right => &self.right_windows,
        }
    }
}

// ============================================================================
// LOCATOR
// ============================================================================

#[derive(Debug, Clone)]
pub struct PixelLocator {
    n_windows: usize,
    margin: usize,
    min_recenter_pixels: usize,
    prior_margin: usize,
    min_warm_pixels: usize,
}

impl PixelLocator {
    pub fn new(config: &TrackingConfig) -> Self {
        Self {
            n_windows: config.n_windows.max(1),
            margin: config.margin,
            min_recenter_pixels: config.min_recenter_pixels,
            prior_margin: config.prior_margin,
            min_warm_pixels: config.min_warm_pixels,
        }
    }

    /// Cold-start search for both lines.
    pub fn sliding_window(&self, mask: &BinaryMask) -> SlidingWindowSearch {
        let (width, height) = (mask.width(), mask.height());
        let histogram = mask.column_histogram(height / 2);
        let midpoint = width / 2;
        let left_base = argmax(&histogram[..midpoint]);
        let right_base = argmax(&histogram[midpoint..]) + midpoint;

        debug!(
            "Sliding window seeds: left x={}, right x={} ({}x{} mask)",
            left_base, right_base, width, height
        );

        let (left, left_windows) = self.walk_windows(mask, left_base);
        let (right, right_windows) = self.walk_windows(mask, right_base);

        SlidingWindowSearch {
            left,
            right,
            left_windows,
            right_windows,
        }
    }

    /// Trace one line from `base_x` upward, band by band.
    fn walk_windows(&self, mask: &BinaryMask, base_x: usize) -> (LinePixels, Vec<SearchWindow>) {
        let (width, height) = (mask.width(), mask.height());
        let n = self.n_windows;
        let margin = self.margin as i64;

        let mut current_x = base_x as i64;
        let mut points = Vec::new();
        let mut windows = Vec::with_capacity(n);

        // Band edges tile [0, height) exactly; remainder rows are spread
        // across bands, so heights below n still get searched.
        for band in 0..n {
            let y_high = height - band * height / n;
            let y_low = height - (band + 1) * height / n;
            let window = SearchWindow {
                x_low: current_x - margin,
                x_high: current_x + margin,
                y_low,
                y_high,
            };
            windows.push(window);

            let x_start = window.x_low.clamp(0, width as i64) as usize;
            let x_end = window.x_high.clamp(0, width as i64) as usize;

            let mut found = 0usize;
            let mut sum_x = 0u64;
            for y in y_low..y_high {
                for x in x_start..x_end {
                    if mask.get(x, y) {
                        points.push((y as PixelCoord, x as PixelCoord));
                        found += 1;
                        sum_x += x as u64;
                    }
                }
            }

            if found > 0 && found >= self.min_recenter_pixels {
                current_x = (sum_x / found as u64) as i64;
            }
        }

        (LinePixels::from_points(points), windows)
    }

    /// Warm search in a corridor around the previous pixel-space fit.
    ///
    /// Fails with `InsufficientPixels` when fewer than `min_warm_pixels` are
    /// found; the caller then searches this line blind for the frame.
    pub fn around_prior(
        &self,
        mask: &BinaryMask,
        side: LineSide,
        prior: &FitCoefficients,
    ) -> TrackingResult<LinePixels> {
        let margin = self.prior_margin as f64;
        let mut xs = Vec::new();
        let mut ys = Vec::new();

        for y in 0..mask.height() {
            let expected = prior.eval(y as f64);
            let lo = expected - margin;
            let hi = expected + margin;
            // Integer columns strictly inside (lo, hi).
            let x_start = (lo.floor() + 1.0).max(0.0);
            let x_end = hi.ceil().min(mask.width() as f64);
            if x_start >= x_end {
                continue;
            }
            for x in x_start as usize..x_end as usize {
                if mask.get(x, y) {
                    xs.push(x as PixelCoord);
                    ys.push(y as PixelCoord);
                }
            }
        }

        let found = xs.len();
        if found < self.min_warm_pixels.max(1) {
            debug!(
                "Prior-fit search for {} line found {} pixels (< {})",
                side, found, self.min_warm_pixels
            );
            return Err(TrackingError::InsufficientPixels {
                side,
                found,
                required: self.min_warm_pixels.max(1),
            });
        }

        Ok(LinePixels { xs, ys })
    }
}

/// Index of the first maximum.
fn argmax(values: &[u32]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > values[best] {
            best = i;
        }
    }
    best
}
