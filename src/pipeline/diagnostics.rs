// src/pipeline/diagnostics.rs
//
// Per-frame diagnostic events. The orchestrator publishes what it located,
// fitted and rendered; sinks decide whether to log, buffer or ignore it.

use crate::error::TrackingError;
use crate::tracking::{FitCoefficients, SearchPath};
use crate::types::LineSide;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum DiagnosticEvent {
    Located {
        frame_index: u64,
        side: LineSide,
        path: SearchPath,
        pixels: usize,
    },

    Fitted {
        frame_index: u64,
        side: LineSide,
        detected: bool,
        fit: Option<FitCoefficients>,
        error: Option<TrackingError>,
    },

    Rendered {
        frame_index: u64,
        curvature_m: Option<f64>,
        offset_m: f64,
    },
}

impl DiagnosticEvent {
    pub fn frame_index(&self) -> u64 {
        match self {
            Self::Located { frame_index, .. }
            | Self::Fitted { frame_index, .. }
            | Self::Rendered { frame_index, .. } => *frame_index,
        }
    }
}

pub trait DiagnosticSink: Send {
    fn publish(&mut self, event: DiagnosticEvent);
}

/// Writes every event to the `debug` log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn publish(&mut self, event: DiagnosticEvent) {
        match event {
            DiagnosticEvent::Located {
                frame_index,
                side,
                path,
                pixels,
            } => debug!(
                "frame {}: {} line located via {} ({} px)",
                frame_index,
                side,
                path.as_str(),
                pixels
            ),
            DiagnosticEvent::Fitted {
                frame_index,
                side,
                detected,
                fit,
                error,
            } => match (fit, error) {
                (Some(f), _) => debug!(
                    "frame {}: {} fit a={:.3e} b={:.4} c={:.1}",
                    frame_index, side, f.a, f.b, f.c
                ),
                (None, Some(e)) => debug!(
                    "frame {}: {} not fitted (detected={}): {}",
                    frame_index, side, detected, e
                ),
                (None, None) => debug!("frame {}: {} not fitted", frame_index, side),
            },
            DiagnosticEvent::Rendered {
                frame_index,
                curvature_m,
                offset_m,
            } => debug!(
                "frame {}: rendered (curvature={:?}, offset={:.3}m)",
                frame_index, curvature_m, offset_m
            ),
        }
    }
}

/// Bounded in-memory event buffer. Clones share the same buffer, so one
/// handle can be given to the orchestrator while another drains it.
#[derive(Debug, Clone)]
pub struct EventLog {
    events: Arc<Mutex<VecDeque<DiagnosticEvent>>>,
    max_pending: usize,
}

impl EventLog {
    pub fn new(max_pending: usize) -> Self {
        let max_pending = max_pending.max(1);
        Self {
            events: Arc::new(Mutex::new(VecDeque::with_capacity(max_pending))),
            max_pending,
        }
    }

    pub fn drain(&self) -> Vec<DiagnosticEvent> {
        self.lock().drain(..).collect()
    }

    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<DiagnosticEvent>> {
        // A panic while holding the lock cannot leave the deque half-written.
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl DiagnosticSink for EventLog {
    fn publish(&mut self, event: DiagnosticEvent) {
        let mut events = self.lock();
        if events.len() >= self.max_pending {
            warn!(
                "Diagnostic log full ({} events), dropping oldest",
                self.max_pending
            );
            events.pop_front();
        }
        events.push_back(event);
    }
}
