// src/pipeline/metrics.rs
//
// Session counters. Handles are cheap to clone and can be read from another
// thread while the orchestrator is running.

use crate::tracking::SearchPath;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct SessionMetrics {
    pub total_frames: Arc<AtomicU64>,
    pub sliding_window_searches: Arc<AtomicU64>,
    pub prior_fit_searches: Arc<AtomicU64>,
    pub degraded_searches: Arc<AtomicU64>,
    pub undetected_lines: Arc<AtomicU64>,
    pub frames_with_offset: Arc<AtomicU64>,
    pub frame_time_us: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl SessionMetrics {
    pub fn new() -> Self {
        Self {
            total_frames: Arc::new(AtomicU64::new(0)),
            sliding_window_searches: Arc::new(AtomicU64::new(0)),
            prior_fit_searches: Arc::new(AtomicU64::new(0)),
            degraded_searches: Arc::new(AtomicU64::new(0)),
            undetected_lines: Arc::new(AtomicU64::new(0)),
            frames_with_offset: Arc::new(AtomicU64::new(0)),
            frame_time_us: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    pub fn inc(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_timing(&self, counter: &AtomicU64, duration_us: u64) {
        counter.store(duration_us, Ordering::Relaxed);
    }

    pub fn record_search(&self, path: SearchPath) {
        let counter = match path {
            SearchPath::SlidingWindow => &self.sliding_window_searches,
            SearchPath::PriorFit => &self.prior_fit_searches,
            SearchPath::Degraded => &self.degraded_searches,
        };
        self.inc(counter);
    }

    pub fn fps(&self) -> f64 {
        let frames = self.total_frames.load(Ordering::Relaxed);
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed > 0.01 {
            frames as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            total_frames: self.total_frames.load(Ordering::Relaxed),
            fps: self.fps(),
            sliding_window_searches: self.sliding_window_searches.load(Ordering::Relaxed),
            prior_fit_searches: self.prior_fit_searches.load(Ordering::Relaxed),
            degraded_searches: self.degraded_searches.load(Ordering::Relaxed),
            undetected_lines: self.undetected_lines.load(Ordering::Relaxed),
            frames_with_offset: self.frames_with_offset.load(Ordering::Relaxed),
            last_frame_us: self.frame_time_us.load(Ordering::Relaxed),
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

impl Default for SessionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSummary {
    pub total_frames: u64,
    pub fps: f64,
    pub sliding_window_searches: u64,
    pub prior_fit_searches: u64,
    pub degraded_searches: u64,
    pub undetected_lines: u64,
    pub frames_with_offset: u64,
    pub last_frame_us: u64,
    pub elapsed_secs: f64,
}
