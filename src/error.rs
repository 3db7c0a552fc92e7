// src/error.rs
//
// Recoverable tracking failures. None of these abort a session: the
// orchestrator turns every one of them into an undetected line for the
// current frame and keeps going.

use crate::types::LineSide;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrackingError {
    #[error("{side} line: {found} lane pixels found, {required} required")]
    InsufficientPixels {
        side: LineSide,
        found: usize,
        required: usize,
    },

    #[error("polynomial fit is ill-conditioned: {distinct_rows} distinct rows, need at least 3")]
    IllConditionedFit { distinct_rows: usize },

    #[error("invalid mask: {reason}")]
    InvalidMask { reason: String },
}

pub type TrackingResult<T> = std::result::Result<T, TrackingError>;
