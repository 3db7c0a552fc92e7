// src/collaborators.rs
//
// Seams to the image-side collaborators the tracking core depends on:
// lens undistortion, lane-pixel binarization, and the bird's-eye warp.
//
// The core only relies on the trait contracts. The implementations here are
// small reference versions so the binary can run on raw dash-cam footage;
// swap in a calibrated undistorter or a tuned binarizer without touching the
// tracker.

use crate::mask::BinaryMask;
use crate::types::{BinarizationConfig, CalibrationConfig, PerspectiveConfig, RadialCalibration};
use anyhow::{anyhow, Result};
use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::distance_transform::Norm;
use imageproc::geometric_transformations::{warp, warp_with, Interpolation, Projection};
use nalgebra::{SMatrix, SVector};
use tracing::debug;

// ============================================================================
// CONTRACTS
// ============================================================================

/// Removes lens distortion. Deterministic for fixed parameters.
pub trait Calibration: Send {
    fn undistort(&self, frame: &RgbImage) -> RgbImage;
}

/// Marks likely lane pixels. Output has the frame's shape, values {0, 1}.
pub trait Binarizer: Send {
    fn binarize(&self, frame: &RgbImage) -> BinaryMask;
}

/// Bird's-eye mask plus the projections between camera and road plane.
#[derive(Debug, Clone)]
pub struct BirdEyeView {
    pub mask: BinaryMask,
    pub forward: Projection,
    pub inverse: Projection,
}

pub trait PerspectiveTransform: Send {
    fn birdeye(&self, mask: &BinaryMask) -> BirdEyeView;
}

// ============================================================================
// CALIBRATION
// ============================================================================

/// For footage that is already undistorted.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityCalibration;

impl Calibration for IdentityCalibration {
    fn undistort(&self, frame: &RgbImage) -> RgbImage {
        frame.clone()
    }
}

/// Brown–Conrady radial/tangential undistortion with fixed intrinsics.
#[derive(Debug, Clone, Copy)]
pub struct RadialUndistort {
    params: RadialCalibration,
}

impl RadialUndistort {
    pub fn new(params: RadialCalibration) -> Self {
        Self { params }
    }

    /// Where undistorted pixel (x, y) came from in the raw frame.
    fn distort(&self, x: f32, y: f32) -> (f32, f32) {
        let p = &self.params;
        let xn = (x - p.cx) / p.fx;
        let yn = (y - p.cy) / p.fy;
        let r2 = xn * xn + yn * yn;
        let radial = 1.0 + p.k1 * r2 + p.k2 * r2 * r2 + p.k3 * r2 * r2 * r2;
        let xd = xn * radial + 2.0 * p.p1 * xn * yn + p.p2 * (r2 + 2.0 * xn * xn);
        let yd = yn * radial + p.p1 * (r2 + 2.0 * yn * yn) + 2.0 * p.p2 * xn * yn;
        (xd * p.fx + p.cx, yd * p.fy + p.cy)
    }
}

impl Calibration for RadialUndistort {
    fn undistort(&self, frame: &RgbImage) -> RgbImage {
        warp_with(
            frame,
            |x, y| self.distort(x, y),
            Interpolation::Bilinear,
            Rgb([0, 0, 0]),
        )
    }
}

pub fn build_calibration(config: &CalibrationConfig) -> Box<dyn Calibration> {
    match config {
        CalibrationConfig::Identity => Box::new(IdentityCalibration),
        CalibrationConfig::Radial(params) => Box::new(RadialUndistort::new(*params)),
    }
}

// ============================================================================
// BINARIZATION
// ============================================================================

/// Yellow paint (HSV range) OR white paint (equalized gray threshold) OR
/// strong edges (Sobel magnitude), closed to fill small gaps.
#[derive(Debug, Clone)]
pub struct ThresholdBinarizer {
    config: BinarizationConfig,
}

impl ThresholdBinarizer {
    pub fn new(config: BinarizationConfig) -> Self {
        Self { config }
    }

    fn is_yellow(&self, px: &Rgb<u8>) -> bool {
        let hsv = rgb_to_hsv(px);
        let (lo, hi) = (self.config.yellow_hsv_min, self.config.yellow_hsv_max);
        (0..3).all(|i| lo[i] <= hsv[i] && hsv[i] <= hi[i])
    }
}

impl Binarizer for ThresholdBinarizer {
    fn binarize(&self, frame: &RgbImage) -> BinaryMask {
        let gray = image::imageops::grayscale(frame);
        let equalized = imageproc::contrast::equalize_histogram(&gray);
        let gradients = imageproc::gradients::sobel_gradients(&gray);
        let max_grad = gradients.pixels().map(|p| p.0[0]).max().unwrap_or(0).max(1) as u32;

        let combined = GrayImage::from_fn(frame.width(), frame.height(), |x, y| {
            let yellow = self.is_yellow(frame.get_pixel(x, y));
            let white = equalized.get_pixel(x, y).0[0] >= self.config.white_threshold;
            let grad = gradients.get_pixel(x, y).0[0] as u32 * 255 / max_grad;
            let edge = grad >= self.config.sobel_threshold as u32;
            Luma([if yellow || white || edge { 255 } else { 0 }])
        });

        let closed = if self.config.close_radius > 0 {
            imageproc::morphology::close(&combined, Norm::LInf, self.config.close_radius)
        } else {
            combined
        };
        BinaryMask::from_gray(&closed)
    }
}

/// HSV with OpenCV ranges: H in 0..180, S and V in 0..255.
fn rgb_to_hsv(px: &Rgb<u8>) -> [u8; 3] {
    let [r, g, b] = px.0.map(|c| c as f32);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let hue_deg = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * ((g - b) / delta)
    } else if max == g {
        60.0 * ((b - r) / delta) + 120.0
    } else {
        60.0 * ((r - g) / delta) + 240.0
    };
    let hue_deg = if hue_deg < 0.0 { hue_deg + 360.0 } else { hue_deg };
    let sat = if max == 0.0 { 0.0 } else { delta / max * 255.0 };

    [(hue_deg / 2.0).round() as u8, sat.round() as u8, max as u8]
}

// ============================================================================
// PERSPECTIVE
// ============================================================================

/// Fixed road-plane homography from four point correspondences.
#[derive(Debug, Clone, Copy)]
pub struct FixedPerspective {
    forward: Projection,
    inverse: Projection,
}

impl FixedPerspective {
    pub fn from_config(config: &PerspectiveConfig) -> Result<Self> {
        let h = homography_from_points(&config.src, &config.dst)?;
        let forward = Projection::from_matrix(h)
            .ok_or_else(|| anyhow!("perspective homography is not invertible"))?;
        debug!("Bird's-eye homography: {:?}", h);
        Ok(Self {
            forward,
            inverse: forward.invert(),
        })
    }

    /// For masks that are already rectified.
    pub fn identity() -> Self {
        let id = Projection::scale(1.0, 1.0);
        Self {
            forward: id,
            inverse: id,
        }
    }

    pub fn forward(&self) -> Projection {
        self.forward
    }

    pub fn inverse(&self) -> Projection {
        self.inverse
    }
}

impl PerspectiveTransform for FixedPerspective {
    fn birdeye(&self, mask: &BinaryMask) -> BirdEyeView {
        let warped = warp(
            &mask.to_gray(),
            &self.forward,
            Interpolation::Nearest,
            Luma([0]),
        );
        BirdEyeView {
            mask: BinaryMask::from_gray(&warped),
            forward: self.forward,
            inverse: self.inverse,
        }
    }
}

/// Row-major 3×3 homography mapping each `src` point onto its `dst` point.
pub fn homography_from_points(src: &[[f32; 2]; 4], dst: &[[f32; 2]; 4]) -> Result<[f32; 9]> {
    if has_collinear_triple(src) || has_collinear_triple(dst) {
        return Err(anyhow!("perspective points contain three collinear points"));
    }

    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();

    for (i, (s, d)) in src.iter().zip(dst).enumerate() {
        let (x, y) = (s[0] as f64, s[1] as f64);
        let (u, v) = (d[0] as f64, d[1] as f64);
        let r = 2 * i;
        a.row_mut(r)
            .copy_from_slice(&[x, y, 1.0, 0.0, 0.0, 0.0, -u * x, -u * y]);
        a.row_mut(r + 1)
            .copy_from_slice(&[0.0, 0.0, 0.0, x, y, 1.0, -v * x, -v * y]);
        b[r] = u;
        b[r + 1] = v;
    }

    let h = a
        .lu()
        .solve(&b)
        .ok_or_else(|| anyhow!("perspective system is singular"))?;

    let mut out = [1.0f32; 9];
    for (o, v) in out.iter_mut().zip(h.iter()) {
        *o = *v as f32;
    }
    Ok(out)
}

fn has_collinear_triple(pts: &[[f32; 2]; 4]) -> bool {
    const TRIPLES: [[usize; 3]; 4] = [[0, 1, 2], [0, 1, 3], [0, 2, 3], [1, 2, 3]];
    TRIPLES.iter().any(|&[i, j, k]| {
        let (a, b, c) = (pts[i], pts[j], pts[k]);
        let cross = (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0]);
        cross.abs() < 1e-3
    })
}
