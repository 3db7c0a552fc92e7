// src/overlay.rs
//
// Output frame rendering.
//
// ════════════════════════════════════════════════════════════════════════════
// LAYOUT
// ════════════════════════════════════════════════════════════════════════════
//
//   ┌──────────────────────────────────────────────────────────────┐
//   │ ┌────────┐ ┌────────┐ ┌────────┐  Curvature radius: 812.40m  │
//   │ │ binary │ │birdeye │ │  fit   │  Offset from center: 0.21m  │ ← darkened
//   │ └────────┘ └────────┘ └────────┘                             │   header
//   │──────────────────────────────────────────────────────────────│
//   │                                                              │
//   │                  /▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓\                         │
//   │                 /▓▓▓ lane area ▓▓▓▓▓\   ← de-warped, blended │
//   │                /▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓\                       │
//   └──────────────────────────────────────────────────────────────┘
//
//   1. LANE AREA: polygon between the two fitted curves, drawn in
//      bird's-eye space, warped back through the inverse perspective and
//      blended onto the undistorted frame. Line pixels are painted on top.
//
//   2. FIT VISUALIZATION: bird's-eye mask with search windows, attributed
//      pixels and fitted curves. Shown as the third thumbnail.
//
//   3. HEADER: three thumbnails and the curvature/offset readout.
//
// Rendering never mutates tracking state.

use crate::mask::BinaryMask;
use crate::tracking::{LineModel, SlidingWindowSearch, OFFSET_UNAVAILABLE};
use crate::types::{LineSide, OverlayConfig};
use ab_glyph::{FontArc, PxScale};
use anyhow::{Context, Result};
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use imageproc::drawing::{
    draw_hollow_rect_mut, draw_line_segment_mut, draw_polygon_mut, draw_text_mut,
};
use imageproc::geometric_transformations::{warp, Interpolation, Projection};
use imageproc::point::Point;
use imageproc::rect::Rect;
use tracing::{debug, info};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// RGB colors of diagnostic elements.
pub mod colors {
    use image::Rgb;

    pub const LEFT_PIXELS: Rgb<u8> = Rgb([255, 0, 0]);
    pub const RIGHT_PIXELS: Rgb<u8> = Rgb([0, 0, 255]);
    pub const SEARCH_WINDOW: Rgb<u8> = Rgb([0, 255, 0]);
    pub const FITTED_CURVE: Rgb<u8> = Rgb([255, 255, 0]);
    pub const TEXT: Rgb<u8> = Rgb([255, 255, 255]);
    pub const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
}

/// What the header readout shows.
#[derive(Debug, Clone, Copy)]
pub struct Readout {
    pub curvature_m: Option<f64>,
    /// `OFFSET_UNAVAILABLE` when either line is undetected.
    pub offset_m: f64,
}

impl Readout {
    pub fn lines(&self) -> [String; 2] {
        let curvature = match self.curvature_m {
            Some(r) if r.is_finite() => format!("Curvature radius: {:.2}m", r),
            Some(_) => "Curvature radius: inf".to_string(),
            None => "Curvature radius: n/a".to_string(),
        };
        [
            curvature,
            format!("Offset from center: {:.2}m", self.offset_m),
        ]
    }

    pub fn offset_available(&self) -> bool {
        self.offset_m != OFFSET_UNAVAILABLE
    }
}

/// Intermediate images shown as header thumbnails.
pub struct Thumbnails<'a> {
    pub binary: &'a BinaryMask,
    pub birdeye: &'a BinaryMask,
    pub fit: &'a RgbImage,
}

/// DejaVu Sans, used for the readout unless `font_path` overrides it.
const BUNDLED_FONT: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

pub struct OverlayRenderer {
    config: OverlayConfig,
    font: Option<FontArc>,
}

impl OverlayRenderer {
    pub fn new(config: OverlayConfig) -> Result<Self> {
        let font = match &config.font_path {
            Some(path) => {
                let bytes =
                    std::fs::read(path).with_context(|| format!("reading font {}", path))?;
                let font = FontArc::try_from_vec(bytes)
                    .with_context(|| format!("parsing font {}", path))?;
                info!("Overlay font loaded from {}", path);
                font
            }
            None => FontArc::try_from_slice(BUNDLED_FONT).context("parsing bundled font")?,
        };
        let font = Some(font);
        Ok(Self { config, font })
    }

    /// Renderer that skips text, for headless use and tests.
    pub fn without_text(config: OverlayConfig) -> Self {
        Self { config, font: None }
    }

    // ========================================================================
    // 1. LANE AREA
    // ========================================================================

    /// Fill the lane between both lines in bird's-eye space, warp it back
    /// to the camera view through `inverse` and blend it onto `undistorted`.
    ///
    /// Uses each line's averaged history fit when `use_averaged_fit` is set
    /// or the line is undetected this frame, its latest fit otherwise. With
    /// no fit available for either line the frame is returned unchanged.
    pub fn draw_lane_area(
        &self,
        undistorted: &RgbImage,
        inverse: &Projection,
        left: &LineModel,
        right: &LineModel,
        use_averaged_fit: bool,
    ) -> RgbImage {
        let (w, h) = undistorted.dimensions();
        let (Some(left_fit), Some(right_fit)) = (
            left.display_fit(use_averaged_fit),
            right.display_fit(use_averaged_fit),
        ) else {
            debug!("No fit history yet, lane area not drawn");
            return undistorted.clone();
        };

        let max_x = w.saturating_sub(1) as f64;
        let clamp_x = |x: f64| x.clamp(0.0, max_x).round() as i32;

        let mut polygon: Vec<Point<i32>> = Vec::with_capacity(2 * h as usize);
        for y in 0..h {
            polygon.push(Point::new(clamp_x(left_fit.eval(y as f64)), y as i32));
        }
        for y in (0..h).rev() {
            polygon.push(Point::new(clamp_x(right_fit.eval(y as f64)), y as i32));
        }
        polygon.dedup();
        if polygon.len() > 1 && polygon.first() == polygon.last() {
            polygon.pop();
        }

        let mut road = RgbImage::new(w, h);
        if polygon.len() >= 3 {
            draw_polygon_mut(&mut road, &polygon, Rgb(self.config.lane_color));
        }

        let mut line_pixels = RgbImage::new(w, h);
        paint_pixels(&mut line_pixels, left, colors::LEFT_PIXELS);
        paint_pixels(&mut line_pixels, right, colors::RIGHT_PIXELS);

        let road_view = warp(&road, inverse, Interpolation::Nearest, colors::BLACK);
        let lines_view = warp(&line_pixels, inverse, Interpolation::Nearest, colors::BLACK);

        let mut out = add_weighted(undistorted, 1.0, &road_view, self.config.lane_alpha);
        for (o, l) in out.pixels_mut().zip(lines_view.pixels()) {
            if l.0 != [0, 0, 0] {
                *o = *l;
            }
        }
        out
    }

    // ========================================================================
    // 2. FIT VISUALIZATION
    // ========================================================================

    /// Bird's-eye mask with the search windows, attributed pixels and the
    /// fitted curves of the current frame.
    pub fn fit_visualization(
        &self,
        birdeye: &BinaryMask,
        left: &LineModel,
        right: &LineModel,
        search: Option<&SlidingWindowSearch>,
    ) -> RgbImage {
        let mut vis = image::DynamicImage::ImageLuma8(birdeye.to_gray()).to_rgb8();
        let (w, h) = vis.dimensions();

        if let Some(search) = search {
            for side in [LineSide::Left, LineSide::Right] {
                for win in search.windows(side) {
                    let width = (win.x_high - win.x_low).max(0) as u32;
                    let height = win.y_high.saturating_sub(win.y_low) as u32;
                    if width == 0 || height == 0 {
                        continue;
                    }
                    let rect = Rect::at(win.x_low as i32, win.y_low as i32).of_size(width, height);
                    draw_hollow_rect_mut(&mut vis, rect, colors::SEARCH_WINDOW);
                }
            }
        }

        paint_pixels(&mut vis, left, colors::LEFT_PIXELS);
        paint_pixels(&mut vis, right, colors::RIGHT_PIXELS);

        for line in [left, right] {
            if !line.detected() {
                continue;
            }
            let Some(fit) = line.display_fit(false) else {
                continue;
            };
            let mut prev: Option<(f32, f32)> = None;
            for y in 0..h {
                let pt = (fit.eval(y as f64) as f32, y as f32);
                if let Some(p) = prev {
                    if (0.0..w as f32).contains(&pt.0) {
                        draw_line_segment_mut(&mut vis, p, pt, colors::FITTED_CURVE);
                    }
                }
                prev = Some(pt);
            }
        }
        vis
    }

    // ========================================================================
    // 3. HEADER STRIP
    // ========================================================================

    /// Darken the header band, place the thumbnails, write the readout.
    pub fn compose_header(
        &self,
        frame: &RgbImage,
        thumbs: &Thumbnails<'_>,
        readout: &Readout,
    ) -> RgbImage {
        let (w, h) = frame.dimensions();
        let ratio = self.config.thumb_ratio;
        let thumb_w = ((ratio * w as f32) as u32).max(1);
        let thumb_h = ((ratio * h as f32) as u32).max(1);
        let [off_x, off_y] = self.config.thumb_offset;

        let mut out = frame.clone();
        let band = (thumb_h + 2 * off_y).min(h);
        let keep = 1.0 - self.config.header_alpha;
        for y in 0..band {
            for x in 0..w {
                let px = out.get_pixel_mut(x, y);
                px.0 = px.0.map(|c| (c as f32 * keep).round() as u8);
            }
        }

        let binary = image::DynamicImage::ImageLuma8(thumbs.binary.to_gray()).to_rgb8();
        let birdeye = image::DynamicImage::ImageLuma8(thumbs.birdeye.to_gray()).to_rgb8();
        for (slot, img) in [&binary, &birdeye, thumbs.fit].into_iter().enumerate() {
            let thumb = imageops::resize(img, thumb_w, thumb_h, FilterType::Triangle);
            let x = off_x + slot as u32 * (off_x + thumb_w);
            imageops::overlay(&mut out, &thumb, x as i64, off_y as i64);
        }

        match &self.font {
            Some(font) => {
                let scale = PxScale::from(self.config.font_scale);
                let text_x = (3 * (off_x + thumb_w) + off_x) as i32;
                let line_gap = (self.config.font_scale * 2.0) as i32;
                for (i, line) in readout.lines().iter().enumerate() {
                    let y = (2 * off_y) as i32 + i as i32 * line_gap;
                    draw_text_mut(&mut out, colors::TEXT, text_x, y, scale, font, line);
                }
            }
            None => debug!("Text disabled, readout not drawn"),
        }
        out
    }
}

/// Paint a line's attributed pixels. Out-of-bounds coordinates are skipped.
fn paint_pixels(img: &mut RgbImage, line: &LineModel, color: Rgb<u8>) {
    let (w, h) = img.dimensions();
    for (&x, &y) in line.pixel_x().iter().zip(line.pixel_y()) {
        if x < w && y < h {
            img.put_pixel(x, y, color);
        }
    }
}

/// `a·wa + b·wb`, saturating per channel.
fn add_weighted(a: &RgbImage, wa: f32, b: &RgbImage, wb: f32) -> RgbImage {
    let mut out = a.clone();
    for (o, p) in out.pixels_mut().zip(b.pixels()) {
        for c in 0..3 {
            let v = o.0[c] as f32 * wa + p.0[c] as f32 * wb;
            o.0[c] = v.round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::FitCoefficients;

    fn tracked_line(side: LineSide, x: u32, height: u32) -> LineModel {
        let mut line = LineModel::new(side, 3);
        let ys: Vec<u32> = (0..height).collect();
        let fit = FitCoefficients::new(0.0, 0.0, x as f64);
        line.update(vec![x; ys.len()], ys, fit, fit);
        line
    }

    fn identity() -> Projection {
        Projection::scale(1.0, 1.0)
    }

    #[test]
    fn test_lane_area_tints_between_lines_only() {
        let renderer = OverlayRenderer::without_text(OverlayConfig::default());
        let frame = RgbImage::from_pixel(200, 100, Rgb([100, 100, 100]));
        let left = tracked_line(LineSide::Left, 50, 100);
        let right = tracked_line(LineSide::Right, 150, 100);

        let out = renderer.draw_lane_area(&frame, &identity(), &left, &right, false);

        // Green channel raised by 0.3 * 255 inside the lane.
        assert_eq!(out.get_pixel(100, 50).0, [100, 177, 100]);
        assert_eq!(out.get_pixel(10, 50).0, [100, 100, 100]);
        assert_eq!(out.get_pixel(190, 50).0, [100, 100, 100]);
        // Line pixels are painted over the fill.
        assert_eq!(*out.get_pixel(50, 50), colors::LEFT_PIXELS);
        assert_eq!(*out.get_pixel(150, 50), colors::RIGHT_PIXELS);
    }

    #[test]
    fn test_lane_area_without_history_returns_frame() {
        let renderer = OverlayRenderer::without_text(OverlayConfig::default());
        let frame = RgbImage::from_pixel(64, 32, Rgb([9, 9, 9]));
        let left = LineModel::new(LineSide::Left, 3);
        let right = tracked_line(LineSide::Right, 40, 32);
        let out = renderer.draw_lane_area(&frame, &identity(), &left, &right, true);
        assert_eq!(out, frame);
    }

    #[test]
    fn test_header_darkens_band_and_places_thumbnails() {
        let renderer = OverlayRenderer::without_text(OverlayConfig::default());
        let frame = RgbImage::from_pixel(400, 200, Rgb([100, 100, 100]));
        let mut binary = BinaryMask::new(400, 200);
        for y in 0..200 {
            for x in 0..400 {
                binary.set(x, y, true);
            }
        }
        let birdeye = BinaryMask::new(400, 200);
        let fit = RgbImage::new(400, 200);
        let thumbs = Thumbnails {
            binary: &binary,
            birdeye: &birdeye,
            fit: &fit,
        };
        let readout = Readout {
            curvature_m: Some(500.0),
            offset_m: 0.1,
        };
        let out = renderer.compose_header(&frame, &thumbs, &readout);

        // Thumbnails are 80x40 at (20, 15), (120, 15), (220, 15).
        assert_eq!(out.get_pixel(25, 20).0, [255, 255, 255]);
        assert_eq!(out.get_pixel(125, 20).0, [0, 0, 0]);
        // Header band (0..70) outside thumbnails is darkened by 20%.
        assert_eq!(out.get_pixel(390, 5).0, [80, 80, 80]);
        // Below the band the frame is untouched.
        assert_eq!(out.get_pixel(390, 150).0, [100, 100, 100]);
    }

    #[test]
    fn test_default_renderer_draws_readout() {
        let frame = RgbImage::from_pixel(1280, 720, Rgb([100, 100, 100]));
        let binary = BinaryMask::new(1280, 720);
        let fit = RgbImage::new(1280, 720);
        let thumbs = Thumbnails {
            binary: &binary,
            birdeye: &binary,
            fit: &fit,
        };
        let readout = Readout {
            curvature_m: Some(500.0),
            offset_m: 0.3,
        };

        let with_text = OverlayRenderer::new(OverlayConfig::default())
            .unwrap()
            .compose_header(&frame, &thumbs, &readout);
        let plain = OverlayRenderer::without_text(OverlayConfig::default())
            .compose_header(&frame, &thumbs, &readout);

        // Readout starts right of the third thumbnail, at x = 848, y = 30.
        let changed = (30..130)
            .flat_map(|y| (848..1280).map(move |x| (x, y)))
            .filter(|&(x, y)| with_text.get_pixel(x, y) != plain.get_pixel(x, y))
            .count();
        assert!(changed > 100, "only {} text pixels drawn", changed);
        // Thumbnails are identical either way.
        assert_eq!(with_text.get_pixel(100, 50), plain.get_pixel(100, 50));
    }

    #[test]
    fn test_font_path_override_must_exist() {
        let config = OverlayConfig {
            font_path: Some("does/not/exist.ttf".into()),
            ..OverlayConfig::default()
        };
        assert!(OverlayRenderer::new(config).is_err());
    }

    #[test]
    fn test_fit_visualization_marks_pixels_and_windows() {
        let renderer = OverlayRenderer::without_text(OverlayConfig::default());
        let mask = crate::test_utils::column_mask(1280, 720, &[300, 900], 3);
        let search = crate::tracking::PixelLocator::new(&Default::default()).sliding_window(&mask);
        let mut left = LineModel::new(LineSide::Left, 3);
        let f = FitCoefficients::new(0.0, 0.0, 300.0);
        left.update(search.left.xs.clone(), search.left.ys.clone(), f, f);
        let right = LineModel::new(LineSide::Right, 3);

        let vis = renderer.fit_visualization(&mask, &left, &right, Some(&search));
        // Bottom window's left edge sits at x = 299 - 100.
        assert_eq!(*vis.get_pixel(199, 700), colors::SEARCH_WINDOW);
        // The right line was never tracked, its mask pixels stay white.
        assert_eq!(vis.get_pixel(900, 10).0, [255, 255, 255]);
        // Fitted curve drawn over the left pixels at x = 300.
        assert_eq!(*vis.get_pixel(300, 10), colors::FITTED_CURVE);
    }

    #[test]
    fn test_readout_formatting() {
        let r = Readout {
            curvature_m: Some(f64::INFINITY),
            offset_m: OFFSET_UNAVAILABLE,
        };
        assert_eq!(r.lines()[0], "Curvature radius: inf");
        assert_eq!(r.lines()[1], "Offset from center: -1.00m");
        assert!(!r.offset_available());

        let r = Readout {
            curvature_m: Some(812.4),
            offset_m: 0.2134,
        };
        assert_eq!(
            r.lines(),
            [
                "Curvature radius: 812.40m".to_string(),
                "Offset from center: 0.21m".to_string()
            ]
        );
    }
}
