// src/lib.rs
//
// Lane-line tracking for forward-facing dash-cam footage.
//
// The core (tracking + pipeline::orchestrator) consumes bird's-eye lane
// masks and keeps per-line fit histories across frames. Calibration,
// binarization and the perspective warp are collaborators behind traits in
// `collaborators`; drivers in `batch` and `video_processor` feed frames in.

pub mod batch;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod mask;
pub mod overlay;
pub mod pipeline;
pub mod tracking;
pub mod types;
#[cfg(feature = "video")]
pub mod video_processor;

#[cfg(test)]
mod test_utils;

pub use error::{TrackingError, TrackingResult};
pub use pipeline::{FrameOrchestrator, FrameOutput, SessionState};
pub use types::Config;
