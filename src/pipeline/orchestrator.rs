// src/pipeline/orchestrator.rs
//
// Per-frame driver of the tracking core.
//
// ════════════════════════════════════════════════════════════════════════════
// STATE MACHINE
// ════════════════════════════════════════════════════════════════════════════
//
//   ColdStart ── both lines detected, keep_state ──▶ WarmTrack
//       ▲                                               │
//       └──────── either line undetected ◀──────────────┘
//
//   ColdStart: sliding-window search for both lines.
//   WarmTrack: corridor search around each line's previous fit. A line whose
//              corridor holds too few pixels takes the sliding-window result
//              for this frame only.
//
//   keep_state = false pins the machine to ColdStart and clears each line's
//   history before the update, so every frame is fitted on its own.
//
// Frame steps:
//   undistort → binarize → bird's-eye → locate → fit → update/mark →
//   curvature + offset → render → frame_index += 1
//
// No tracking error escapes a frame. A line that cannot be fitted is marked
// undetected and keeps its last-known pixels for drawing; a line whose
// search found no pixels at all is left with an empty pixel set.

use super::diagnostics::{DiagnosticEvent, DiagnosticSink};
use super::metrics::SessionMetrics;
use crate::collaborators::{
    build_calibration, Binarizer, Calibration, FixedPerspective, PerspectiveTransform,
    ThresholdBinarizer,
};
use crate::error::{TrackingError, TrackingResult};
use crate::mask::BinaryMask;
use crate::overlay::{OverlayRenderer, Readout, Thumbnails};
use crate::tracking::{
    CurveFitter, FitCoefficients, GeometryEstimator, LineFit, LineModel, LinePixels, PixelLocator,
    SearchPath, SlidingWindowSearch,
};
use crate::types::{Config, FitSpace, LineSide, ScaleConfig, TrackingConfig};
use anyhow::Result;
use image::RgbImage;
use std::time::Instant;
use tracing::{debug, info, warn};

// ============================================================================
// SESSION STATE
// ============================================================================

/// Everything that carries over from one frame to the next.
///
/// One per video. Frames of a session must be fed in order; distinct
/// sessions are independent and can run on separate threads.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub line_left: LineModel,
    pub line_right: LineModel,
    pub frame_index: u64,
}

impl SessionState {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            line_left: LineModel::new(LineSide::Left, buffer_size),
            line_right: LineModel::new(LineSide::Right, buffer_size),
            frame_index: 0,
        }
    }

    pub fn line(&self, side: LineSide) -> &LineModel {
        match side {
            LineSide::Left => &self.line_left,
            LineSide::Right => &self.line_right,
        }
    }

    fn line_mut(&mut self, side: LineSide) -> &mut LineModel {
        match side {
            LineSide::Left => &mut self.line_left,
            LineSide::Right => &mut self.line_right,
        }
    }

    fn both_detected(&self) -> bool {
        self.line_left.detected() && self.line_right.detected()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    ColdStart,
    WarmTrack,
}

// ============================================================================
// OUTPUTS
// ============================================================================

/// What the tracking half of a frame produced.
#[derive(Debug, Clone)]
pub struct TrackingOutcome {
    pub frame_index: u64,
    pub state: TrackState,
    pub left_path: SearchPath,
    pub right_path: SearchPath,
    /// Present whenever a sliding-window search ran for either line.
    pub search: Option<SlidingWindowSearch>,
    pub curvature_m: Option<f64>,
    /// `OFFSET_UNAVAILABLE` unless both lines were detected.
    pub offset_m: f64,
}

impl TrackingOutcome {
    pub fn path(&self, side: LineSide) -> SearchPath {
        match side {
            LineSide::Left => self.left_path,
            LineSide::Right => self.right_path,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FrameOutput {
    pub overlay: RgbImage,
    pub tracking: TrackingOutcome,
}

// ============================================================================
// ORCHESTRATOR
// ============================================================================

pub struct FrameOrchestrator {
    calibration: Box<dyn Calibration>,
    binarizer: Box<dyn Binarizer>,
    perspective: Box<dyn PerspectiveTransform>,
    renderer: OverlayRenderer,
    locator: PixelLocator,
    fitter: CurveFitter,
    geometry: GeometryEstimator,
    buffer_size: usize,
    sink: Option<Box<dyn DiagnosticSink>>,
    metrics: SessionMetrics,
}

impl FrameOrchestrator {
    pub fn new(
        tracking: &TrackingConfig,
        scale: ScaleConfig,
        calibration: Box<dyn Calibration>,
        binarizer: Box<dyn Binarizer>,
        perspective: Box<dyn PerspectiveTransform>,
        renderer: OverlayRenderer,
    ) -> Self {
        Self {
            calibration,
            binarizer,
            perspective,
            renderer,
            locator: PixelLocator::new(tracking),
            fitter: CurveFitter::new(scale),
            geometry: GeometryEstimator::new(scale),
            buffer_size: tracking.buffer_size.max(1),
            sink: None,
            metrics: SessionMetrics::new(),
        }
    }

    /// Orchestrator wired with the reference collaborators described by
    /// `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let calibration = build_calibration(&config.calibration);
        let binarizer = Box::new(ThresholdBinarizer::new(config.binarization.clone()));
        let perspective = Box::new(FixedPerspective::from_config(&config.perspective)?);
        let renderer = OverlayRenderer::new(config.overlay.clone())?;

        info!(
            "Tracker ready: buffer_size={}, n_windows={}, margin={}px, prior_margin={}px",
            config.tracking.buffer_size,
            config.tracking.n_windows,
            config.tracking.margin,
            config.tracking.prior_margin
        );

        Ok(Self::new(
            &config.tracking,
            config.scale,
            calibration,
            binarizer,
            perspective,
            renderer,
        ))
    }

    pub fn with_sink(mut self, sink: Box<dyn DiagnosticSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn metrics(&self) -> &SessionMetrics {
        &self.metrics
    }

    /// Fresh state for a new video or image sequence.
    pub fn new_session(&self) -> SessionState {
        SessionState::new(self.buffer_size)
    }

    // ========================================================================
    // FULL FRAME
    // ========================================================================

    /// Run one raw camera frame through the core and return the annotated
    /// frame. Advances `state` by exactly one frame.
    pub fn process_frame(
        &mut self,
        raw: &RgbImage,
        state: &mut SessionState,
        keep_state: bool,
    ) -> FrameOutput {
        let started = Instant::now();

        let undistorted = self.calibration.undistort(raw);
        let binary = self.binarizer.binarize(&undistorted);
        let (w, h) = undistorted.dimensions();
        if binary.width() != w as usize || binary.height() != h as usize {
            warn!(
                "Binarizer returned {}x{} mask for {}x{} frame",
                binary.width(),
                binary.height(),
                w,
                h
            );
        }
        let view = self.perspective.birdeye(&binary);

        let tracking = self.track(&view.mask, state, keep_state);

        let lane = self.renderer.draw_lane_area(
            &undistorted,
            &view.inverse,
            &state.line_left,
            &state.line_right,
            keep_state,
        );
        let fit_vis = self.renderer.fit_visualization(
            &view.mask,
            &state.line_left,
            &state.line_right,
            tracking.search.as_ref(),
        );
        let readout = Readout {
            curvature_m: tracking.curvature_m,
            offset_m: tracking.offset_m,
        };
        let thumbs = Thumbnails {
            binary: &binary,
            birdeye: &view.mask,
            fit: &fit_vis,
        };
        let overlay = self.renderer.compose_header(&lane, &thumbs, &readout);

        publish(
            &mut self.sink,
            DiagnosticEvent::Rendered {
                frame_index: tracking.frame_index,
                curvature_m: tracking.curvature_m,
                offset_m: tracking.offset_m,
            },
        );

        state.frame_index += 1;
        self.metrics.inc(&self.metrics.total_frames);
        self.metrics
            .set_timing(&self.metrics.frame_time_us, started.elapsed().as_micros() as u64);

        FrameOutput { overlay, tracking }
    }

    /// Tracking half only, for callers that already hold a bird's-eye mask.
    /// Advances `state` by one frame without rendering.
    pub fn process_birdeye(
        &mut self,
        birdeye: &BinaryMask,
        state: &mut SessionState,
        keep_state: bool,
    ) -> TrackingOutcome {
        let outcome = self.track(birdeye, state, keep_state);
        state.frame_index += 1;
        self.metrics.inc(&self.metrics.total_frames);
        outcome
    }

    // ========================================================================
    // TRACKING
    // ========================================================================

    fn track(
        &mut self,
        birdeye: &BinaryMask,
        state: &mut SessionState,
        keep_state: bool,
    ) -> TrackingOutcome {
        let frame_index = state.frame_index;
        let track_state = if keep_state && frame_index > 0 && state.both_detected() {
            TrackState::WarmTrack
        } else {
            TrackState::ColdStart
        };
        debug!("Frame {}: {:?}", frame_index, track_state);

        // Warm seeds must be read before any reset.
        let priors = [LineSide::Left, LineSide::Right].map(|side| match track_state {
            TrackState::WarmTrack => state.line(side).last_fit(FitSpace::Pixel),
            TrackState::ColdStart => None,
        });

        if !keep_state {
            state.line_left.reset();
            state.line_right.reset();
        }

        let mut search: Option<SlidingWindowSearch> = None;
        let mut paths = [SearchPath::SlidingWindow; 2];

        for (i, side) in [LineSide::Left, LineSide::Right].into_iter().enumerate() {
            let (pixels, path) = self.locate(birdeye, side, priors[i].as_ref(), &mut search);
            paths[i] = path;
            self.metrics.record_search(path);
            publish(
                &mut self.sink,
                DiagnosticEvent::Located {
                    frame_index,
                    side,
                    path,
                    pixels: pixels.len(),
                },
            );

            let line = state.line_mut(side);
            match fit_pixels(&self.fitter, side, &pixels) {
                Ok(fit) => {
                    line.update(pixels.xs, pixels.ys, fit.pixel, fit.meter);
                    if let Some(r) = self.geometry.line_curvature(line, birdeye.height()) {
                        line.set_curvature_meter(r);
                    }
                    publish(
                        &mut self.sink,
                        DiagnosticEvent::Fitted {
                            frame_index,
                            side,
                            detected: true,
                            fit: Some(fit.pixel),
                            error: None,
                        },
                    );
                }
                Err(e) => {
                    debug!("Frame {}: {} line undetected: {}", frame_index, side, e);
                    if pixels.is_empty() {
                        line.mark_not_found();
                    } else {
                        line.mark_undetected();
                    }
                    self.metrics.inc(&self.metrics.undetected_lines);
                    publish(
                        &mut self.sink,
                        DiagnosticEvent::Fitted {
                            frame_index,
                            side,
                            detected: false,
                            fit: None,
                            error: Some(e),
                        },
                    );
                }
            }
        }

        let offset_m =
            self.geometry
                .offset_from_center(&state.line_left, &state.line_right, birdeye.width());
        if state.both_detected() {
            self.metrics.inc(&self.metrics.frames_with_offset);
        }
        let curvature_m = GeometryEstimator::mean_curvature(&state.line_left, &state.line_right);

        TrackingOutcome {
            frame_index,
            state: track_state,
            left_path: paths[0],
            right_path: paths[1],
            search,
            curvature_m,
            offset_m,
        }
    }

    /// Pixels for one line. Runs the sliding-window search at most once per
    /// frame and shares it between lines.
    fn locate(
        &self,
        birdeye: &BinaryMask,
        side: LineSide,
        prior: Option<&FitCoefficients>,
        search: &mut Option<SlidingWindowSearch>,
    ) -> (LinePixels, SearchPath) {
        let path = match prior {
            Some(fit) => match self.locator.around_prior(birdeye, side, fit) {
                Ok(pixels) => return (pixels, SearchPath::PriorFit),
                Err(e) => {
                    info!("{} line lost its corridor ({}), searching blind", side, e);
                    SearchPath::Degraded
                }
            },
            None => SearchPath::SlidingWindow,
        };
        let blind = search.get_or_insert_with(|| self.locator.sliding_window(birdeye));
        (blind.pixels(side).clone(), path)
    }
}

fn fit_pixels(fitter: &CurveFitter, side: LineSide, pixels: &LinePixels) -> TrackingResult<LineFit> {
    if pixels.is_empty() {
        return Err(TrackingError::InsufficientPixels {
            side,
            found: 0,
            required: 1,
        });
    }
    fitter.fit_line(&pixels.xs, &pixels.ys)
}

fn publish(sink: &mut Option<Box<dyn DiagnosticSink>>, event: DiagnosticEvent) {
    if let Some(sink) = sink.as_mut() {
        sink.publish(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::IdentityCalibration;
    use crate::pipeline::diagnostics::EventLog;
    use crate::test_utils::curved_mask;
    use crate::tracking::OFFSET_UNAVAILABLE;
    use crate::types::OverlayConfig;
    use image::Rgb;

    const W: usize = 1280;
    const H: usize = 720;

    /// Anything brighter than mid-gray is a lane pixel.
    struct BrightBinarizer;

    impl Binarizer for BrightBinarizer {
        fn binarize(&self, frame: &RgbImage) -> BinaryMask {
            let mut mask = BinaryMask::new(frame.width() as usize, frame.height() as usize);
            for (x, y, px) in frame.enumerate_pixels() {
                if px.0.iter().all(|&c| c > 128) {
                    mask.set(x as usize, y as usize, true);
                }
            }
            mask
        }
    }

    fn orchestrator() -> FrameOrchestrator {
        FrameOrchestrator::new(
            &TrackingConfig::default(),
            ScaleConfig::default(),
            Box::new(IdentityCalibration),
            Box::new(BrightBinarizer),
            Box::new(FixedPerspective::identity()),
            OverlayRenderer::without_text(OverlayConfig::default()),
        )
    }

    fn left_curve() -> FitCoefficients {
        FitCoefficients::new(2e-4, -0.1, 320.0)
    }

    fn right_curve() -> FitCoefficients {
        FitCoefficients::new(2e-4, -0.1, 920.0)
    }

    fn frame_from_mask(mask: &BinaryMask) -> RgbImage {
        RgbImage::from_fn(mask.width() as u32, mask.height() as u32, |x, y| {
            if mask.get(x as usize, y as usize) {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        })
    }

    fn lane_frame(fits: &[FitCoefficients]) -> RgbImage {
        frame_from_mask(&curved_mask(W, H, fits, 2))
    }

    #[test]
    fn test_identical_frames_with_state_converge() {
        let mut orch = orchestrator();
        let mut state = orch.new_session();
        let frame = lane_frame(&[left_curve(), right_curve()]);

        let mut curvatures = Vec::new();
        for i in 0..10 {
            let out = orch.process_frame(&frame, &mut state, true);
            assert_eq!(out.overlay.dimensions(), (W as u32, H as u32));
            if i >= 1 {
                assert!(state.line_left.detected() && state.line_right.detected());
                assert_eq!(out.tracking.state, TrackState::WarmTrack);
                assert_eq!(out.tracking.left_path, SearchPath::PriorFit);
                assert_eq!(out.tracking.right_path, SearchPath::PriorFit);
            } else {
                assert_eq!(out.tracking.state, TrackState::ColdStart);
            }
            let r = out.tracking.curvature_m.expect("curvature after a fit");
            assert!(r.is_finite() && r > 0.0);
            curvatures.push(r);
        }

        for pair in curvatures.windows(2) {
            assert!((pair[1] - pair[0]).abs() / pair[0] < 1e-6, "{:?}", curvatures);
        }
        assert_eq!(state.frame_index, 10);
        assert_eq!(state.line_left.history_len(), 10);
    }

    #[test]
    fn test_identical_frames_without_state_fit_independently() {
        let mut orch = orchestrator();
        let mut state = orch.new_session();
        let frame = lane_frame(&[left_curve(), right_curve()]);

        for _ in 0..10 {
            let out = orch.process_frame(&frame, &mut state, false);
            assert_eq!(out.tracking.state, TrackState::ColdStart);
            assert_eq!(out.tracking.left_path, SearchPath::SlidingWindow);
            assert_eq!(out.tracking.right_path, SearchPath::SlidingWindow);
            assert!(out.tracking.search.is_some());
            assert_eq!(state.line_left.history_len(), 1);
            assert_eq!(state.line_right.history_len(), 1);
        }
        let s = orch.metrics().summary();
        assert_eq!(s.total_frames, 10);
        assert_eq!(s.sliding_window_searches, 20);
        assert_eq!(s.prior_fit_searches, 0);
    }

    #[test]
    fn test_recovered_fit_matches_synthetic_curve() {
        let mut orch = orchestrator();
        let mut state = orch.new_session();
        orch.process_birdeye(&curved_mask(W, H, &[left_curve(), right_curve()], 2), &mut state, true);

        let fit = state.line_left.last_fit(FitSpace::Pixel).unwrap();
        let truth = left_curve();
        for y in [0.0, 360.0, 719.0] {
            assert!((fit.eval(y) - truth.eval(y)).abs() < 1.0, "y={}", y);
        }
    }

    #[test]
    fn test_lost_corridor_degrades_single_line() {
        let mut orch = orchestrator();
        let mut state = orch.new_session();
        let straight = |c| FitCoefficients::new(0.0, 0.0, c);

        orch.process_birdeye(&curved_mask(W, H, &[straight(300.0), straight(900.0)], 2), &mut state, true);
        // Left line jumps 200 px, well outside its 100 px corridor.
        let out = orch.process_birdeye(
            &curved_mask(W, H, &[straight(500.0), straight(900.0)], 2),
            &mut state,
            true,
        );

        assert_eq!(out.state, TrackState::WarmTrack);
        assert_eq!(out.path(LineSide::Left), SearchPath::Degraded);
        assert_eq!(out.path(LineSide::Right), SearchPath::PriorFit);
        assert!(state.line_left.detected());
        let c = state.line_left.last_fit(FitSpace::Pixel).unwrap().c;
        assert!((c - 500.0).abs() < 1.0);
        assert_eq!(orch.metrics().summary().degraded_searches, 1);
    }

    #[test]
    fn test_zero_pixel_search_leaves_empty_pixel_set() {
        let mut orch = orchestrator();
        let mut state = orch.new_session();
        let straight = |c| FitCoefficients::new(0.0, 0.0, c);

        orch.process_birdeye(&curved_mask(W, H, &[straight(300.0), straight(900.0)], 2), &mut state, true);
        assert_eq!(state.line_left.pixel_x().len(), H * 5);

        let out = orch.process_birdeye(&BinaryMask::new(W, H), &mut state, true);
        assert_eq!(out.left_path, SearchPath::Degraded);
        assert!(!state.line_left.detected());
        assert!(state.line_left.pixel_x().is_empty());
        assert!(state.line_right.pixel_x().is_empty());
        assert_eq!(state.line_left.history_len(), 1);
    }

    #[test]
    fn test_empty_frame_marks_lines_undetected() {
        let mut orch = orchestrator();
        let mut state = orch.new_session();
        let lanes = lane_frame(&[left_curve(), right_curve()]);
        let blank = RgbImage::new(W as u32, H as u32);

        orch.process_frame(&lanes, &mut state, true);
        let out = orch.process_frame(&blank, &mut state, true);

        assert!(!state.line_left.detected());
        assert!(!state.line_right.detected());
        assert_eq!(out.tracking.offset_m, OFFSET_UNAVAILABLE);
        assert_eq!(out.tracking.left_path, SearchPath::Degraded);
        // Nothing was found, so no pixels are shown; history stays.
        assert!(state.line_left.pixel_x().is_empty());
        assert!(state.line_right.pixel_y().is_empty());
        assert_eq!(state.line_left.history_len(), 1);
        assert!(state.line_left.curvature_meter().is_some());

        // Lane fill is still drawn from history.
        let mid_x = ((left_curve().eval(700.0) + right_curve().eval(700.0)) / 2.0) as u32;
        assert_eq!(out.overlay.get_pixel(mid_x, 700).0[1], 77);

        let out = orch.process_frame(&lanes, &mut state, true);
        assert_eq!(out.tracking.state, TrackState::ColdStart);
        assert!(state.line_left.detected());
        assert_eq!(orch.metrics().summary().undetected_lines, 2);
    }

    #[test]
    fn test_blank_first_frame_yields_no_readout() {
        let mut orch = orchestrator();
        let mut state = orch.new_session();
        let out = orch.process_frame(&RgbImage::new(W as u32, H as u32), &mut state, true);
        assert_eq!(out.tracking.curvature_m, None);
        assert_eq!(out.tracking.offset_m, OFFSET_UNAVAILABLE);
        assert_eq!(state.frame_index, 1);
    }

    #[test]
    fn test_sink_sees_every_extension_point() {
        let log = EventLog::new(64);
        let mut orch = orchestrator().with_sink(Box::new(log.clone()));
        let mut state = orch.new_session();
        orch.process_frame(&lane_frame(&[left_curve(), right_curve()]), &mut state, true);

        let events = log.drain();
        assert_eq!(events.len(), 5);
        assert!(matches!(
            events[0],
            DiagnosticEvent::Located {
                side: LineSide::Left,
                path: SearchPath::SlidingWindow,
                ..
            }
        ));
        assert!(matches!(
            events[1],
            DiagnosticEvent::Fitted {
                side: LineSide::Left,
                detected: true,
                ..
            }
        ));
        assert!(matches!(events[4], DiagnosticEvent::Rendered { frame_index: 0, .. }));
    }

    #[test]
    fn test_sessions_are_independent() {
        let mut orch = orchestrator();
        let mut a = orch.new_session();
        let mut b = orch.new_session();
        let frame = curved_mask(W, H, &[left_curve(), right_curve()], 2);

        orch.process_birdeye(&frame, &mut a, true);
        orch.process_birdeye(&frame, &mut a, true);
        let out = orch.process_birdeye(&frame, &mut b, true);

        assert_eq!(out.state, TrackState::ColdStart);
        assert_eq!(a.line_left.history_len(), 2);
        assert_eq!(b.line_left.history_len(), 1);
    }
}
