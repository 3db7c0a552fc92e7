// src/types.rs

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// SHARED VALUE TYPES
// ============================================================================

/// Which side of the ego lane a line bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LineSide {
    Left,
    Right,
}

impl LineSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

impl fmt::Display for LineSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coordinate space a polynomial fit was computed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FitSpace {
    Pixel,
    Meter,
}

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tracking: TrackingConfig,
    pub scale: ScaleConfig,
    pub overlay: OverlayConfig,
    pub calibration: CalibrationConfig,
    pub binarization: BinarizationConfig,
    pub perspective: PerspectiveConfig,
    pub batch: BatchConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Number of most recent per-frame fits kept for temporal averaging.
    pub buffer_size: usize,
    /// Horizontal bands the sliding-window search splits the mask into.
    pub n_windows: usize,
    /// Half-width of each sliding window, in pixels.
    pub margin: usize,
    /// Pixels a window must collect before the next band recenters on them.
    pub min_recenter_pixels: usize,
    /// Half-width of the corridor around the previous fit for warm search.
    pub prior_margin: usize,
    /// Below this many pixels a warm search is not trusted and the line is
    /// searched blind for that frame.
    pub min_warm_pixels: usize,
    /// Carry line state between frames (video). Off for independent stills.
    pub keep_state: bool,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            buffer_size: 10,
            n_windows: 9,
            margin: 100,
            min_recenter_pixels: 50,
            prior_margin: 100,
            min_warm_pixels: 50,
            keep_state: true,
        }
    }
}

/// Fixed pixel→meter conversion for the bird's-eye view.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ScaleConfig {
    pub ym_per_pix: f64,
    pub xm_per_pix: f64,
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self {
            ym_per_pix: 30.0 / 720.0,
            xm_per_pix: 3.7 / 700.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// RGB fill of the lane area.
    pub lane_color: [u8; 3],
    /// Weight of the de-warped lane area when blended onto the frame.
    pub lane_alpha: f32,
    /// Darkening applied to the header strip holding the thumbnails.
    pub header_alpha: f32,
    /// Thumbnail size as a fraction of the frame size.
    pub thumb_ratio: f32,
    /// Horizontal / vertical spacing of thumbnails in the header strip.
    pub thumb_offset: [u32; 2],
    /// TrueType font for curvature/offset text. Overrides the bundled font.
    pub font_path: Option<String>,
    pub font_scale: f32,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            lane_color: [0, 255, 0],
            lane_alpha: 0.3,
            header_alpha: 0.2,
            thumb_ratio: 0.2,
            thumb_offset: [20, 15],
            font_path: None,
            font_scale: 28.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CalibrationConfig {
    /// Frames are already undistorted.
    Identity,
    /// Brown–Conrady radial/tangential model.
    Radial(RadialCalibration),
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self::Identity
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RadialCalibration {
    pub fx: f32,
    pub fy: f32,
    pub cx: f32,
    pub cy: f32,
    pub k1: f32,
    pub k2: f32,
    #[serde(default)]
    pub p1: f32,
    #[serde(default)]
    pub p2: f32,
    #[serde(default)]
    pub k3: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BinarizationConfig {
    /// Inclusive HSV lower bound for yellow paint (H in 0..180, S/V in 0..255).
    pub yellow_hsv_min: [u8; 3],
    pub yellow_hsv_max: [u8; 3],
    /// Threshold on the histogram-equalized gray image for white paint.
    pub white_threshold: u8,
    /// Threshold on the Sobel gradient magnitude.
    pub sobel_threshold: u16,
    /// Radius of the closing applied to the combined mask. 0 disables.
    pub close_radius: u8,
}

impl Default for BinarizationConfig {
    fn default() -> Self {
        Self {
            yellow_hsv_min: [0, 70, 70],
            yellow_hsv_max: [50, 255, 255],
            white_threshold: 250,
            sobel_threshold: 50,
            close_radius: 2,
        }
    }
}

/// Four source/destination correspondences defining the bird's-eye warp.
/// Points are (x, y) in pixels, ordered consistently between `src` and `dst`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerspectiveConfig {
    pub src: [[f32; 2]; 4],
    pub dst: [[f32; 2]; 4],
}

impl Default for PerspectiveConfig {
    // Tuned for a 1280x720 forward-facing dash camera.
    fn default() -> Self {
        Self {
            src: [[1280.0, 710.0], [0.0, 710.0], [546.0, 460.0], [732.0, 460.0]],
            dst: [[1280.0, 720.0], [0.0, 720.0], [0.0, 0.0], [1280.0, 0.0]],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub input_dir: String,
    pub output_dir: String,
    pub save_annotated: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            input_dir: "test_images".to_string(),
            output_dir: "output_images".to_string(),
            save_annotated: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "lane_tracker=info".to_string(),
        }
    }
}
