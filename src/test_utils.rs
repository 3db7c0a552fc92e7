// src/test_utils.rs
//
// Synthetic bird's-eye masks shared by unit tests.

use crate::mask::BinaryMask;
use crate::tracking::FitCoefficients;

/// Vertical lines of `thickness` px centred on each of `centers`.
pub fn column_mask(width: usize, height: usize, centers: &[usize], thickness: usize) -> BinaryMask {
    let mut mask = BinaryMask::new(width, height);
    for &center in centers {
        let start = center - thickness / 2;
        for x in start..start + thickness {
            for y in 0..height {
                mask.set(x, y, true);
            }
        }
    }
    mask
}

/// Curves x = fit(y), each `2 * half_width + 1` px wide.
pub fn curved_mask(
    width: usize,
    height: usize,
    fits: &[FitCoefficients],
    half_width: usize,
) -> BinaryMask {
    let mut mask = BinaryMask::new(width, height);
    let hw = half_width as i64;
    for fit in fits {
        for y in 0..height {
            let cx = fit.eval(y as f64).round() as i64;
            for x in (cx - hw)..=(cx + hw) {
                if (0..width as i64).contains(&x) {
                    mask.set(x as usize, y, true);
                }
            }
        }
    }
    mask
}
