// src/tracking/line_model.rs
//
// Per-line tracking state: bounded fit history for temporal averaging, the
// pixels attributed to the line in the latest frame, and the last curvature
// estimate. One instance per lane side, alive for the whole session.

use crate::mask::PixelCoord;
use crate::types::{FitSpace, LineSide};
use std::collections::VecDeque;

/// Coefficients of x = a·y² + b·y + c.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FitCoefficients {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl FitCoefficients {
    pub const fn new(a: f64, b: f64, c: f64) -> Self {
        Self { a, b, c }
    }

    #[inline]
    pub fn eval(&self, y: f64) -> f64 {
        self.a * y * y + self.b * y + self.c
    }
}

/// The two independent fits of one line for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineFit {
    pub pixel: FitCoefficients,
    pub meter: FitCoefficients,
}

impl LineFit {
    pub fn get(&self, space: FitSpace) -> FitCoefficients {
        match space {
            FitSpace::Pixel => self.pixel,
            FitSpace::Meter => self.meter,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LineModel {
    side: LineSide,
    detected: bool,
    history: VecDeque<LineFit>,
    buffer_size: usize,
    pixel_x: Vec<PixelCoord>,
    pixel_y: Vec<PixelCoord>,
    curvature_meter: Option<f64>,
}

impl LineModel {
    /// # Arguments
    /// * `buffer_size` - Fits retained for averaging (clamped to at least 1)
    pub fn new(side: LineSide, buffer_size: usize) -> Self {
        let buffer_size = buffer_size.max(1);
        Self {
            side,
            detected: false,
            history: VecDeque::with_capacity(buffer_size),
            buffer_size,
            pixel_x: Vec::new(),
            pixel_y: Vec::new(),
            curvature_meter: None,
        }
    }

    /// Record a successful detection for this frame.
    pub fn update(
        &mut self,
        pixel_x: Vec<PixelCoord>,
        pixel_y: Vec<PixelCoord>,
        fit_pixel: FitCoefficients,
        fit_meter: FitCoefficients,
    ) {
        if self.history.len() == self.buffer_size {
            self.history.pop_front();
        }
        self.history.push_back(LineFit {
            pixel: fit_pixel,
            meter: fit_meter,
        });
        self.pixel_x = pixel_x;
        self.pixel_y = pixel_y;
        self.detected = true;
    }

    /// Pixels and curvature stay at their last-known values so a stale lane
    /// can still be drawn.
    pub fn mark_undetected(&mut self) {
        self.detected = false;
    }

    /// The search found nothing for this line: no pixels to show, history
    /// and curvature kept.
    pub fn mark_not_found(&mut self) {
        self.pixel_x.clear();
        self.pixel_y.clear();
        self.detected = false;
    }

    /// Mean of every fit in the history, `None` if nothing was ever fitted.
    pub fn average_fit(&self, space: FitSpace) -> Option<FitCoefficients> {
        if self.history.is_empty() {
            return None;
        }
        let n = self.history.len() as f64;
        let sum = self
            .history
            .iter()
            .map(|fit| fit.get(space))
            .fold(FitCoefficients::default(), |acc, f| {
                FitCoefficients::new(acc.a + f.a, acc.b + f.b, acc.c + f.c)
            });
        Some(FitCoefficients::new(sum.a / n, sum.b / n, sum.c / n))
    }

    /// Latest single-frame fit.
    pub fn last_fit(&self, space: FitSpace) -> Option<FitCoefficients> {
        self.history.back().map(|fit| fit.get(space))
    }

    /// Fit used for drawing: the averaged history when smoothing is requested
    /// or the current frame was not trusted, the raw latest fit otherwise.
    pub fn display_fit(&self, use_averaged: bool) -> Option<FitCoefficients> {
        if use_averaged || !self.detected {
            self.average_fit(FitSpace::Pixel)
        } else {
            self.last_fit(FitSpace::Pixel)
        }
    }

    /// Forget all history (independent still-image processing).
    pub fn reset(&mut self) {
        self.history.clear();
        self.pixel_x.clear();
        self.pixel_y.clear();
        self.curvature_meter = None;
        self.detected = false;
    }

    pub fn set_curvature_meter(&mut self, radius: f64) {
        self.curvature_meter = Some(radius);
    }

    pub fn side(&self) -> LineSide {
        self.side
    }

    pub fn detected(&self) -> bool {
        self.detected
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn history(&self) -> impl Iterator<Item = &LineFit> {
        self.history.iter()
    }

    pub fn pixel_x(&self) -> &[PixelCoord] {
        &self.pixel_x
    }

    pub fn pixel_y(&self) -> &[PixelCoord] {
        &self.pixel_y
    }

    pub fn curvature_meter(&self) -> Option<f64> {
        self.curvature_meter
    }
}
