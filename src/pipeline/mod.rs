// src/pipeline/mod.rs

pub mod diagnostics;
pub mod metrics;
pub mod orchestrator;

pub use diagnostics::{DiagnosticEvent, DiagnosticSink, EventLog, TracingSink};
pub use metrics::{MetricsSummary, SessionMetrics};
pub use orchestrator::{FrameOrchestrator, FrameOutput, SessionState, TrackState, TrackingOutcome};
