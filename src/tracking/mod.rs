// src/tracking/mod.rs
//
// Lane-line tracking core.
//
// Signal flow per frame:
//   bird's-eye mask → pixel_locator → curve_fitter → line_model (update or
//   mark undetected) → geometry (curvature, offset)
//
// Orchestrated by pipeline::orchestrator::FrameOrchestrator.

pub mod curve_fitter;
pub mod geometry;
pub mod line_model;
pub mod pixel_locator;

pub use curve_fitter::{fit_polynomial, CurveFitter, MIN_DISTINCT_ROWS};
pub use geometry::{curvature_radius, GeometryEstimator, OFFSET_UNAVAILABLE};
pub use line_model::{FitCoefficients, LineFit, LineModel};
pub use pixel_locator::{LinePixels, PixelLocator, SearchPath, SearchWindow, SlidingWindowSearch};
