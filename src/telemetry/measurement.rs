//! Per-session call timing.
//!
//! A [`MeasurementContext`] is owned by whoever drives calls (the session
//! handler, or a test). Nothing is recorded until `start()`; `stop()` ends the
//! window and returns what was collected.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Summary statistics for one API, in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CallSummary {
    pub count: u64,
    pub sum_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
}

impl CallSummary {
    fn record(&mut self, ms: f64) {
        if self.count == 0 {
            self.min_ms = ms;
            self.max_ms = ms;
        } else {
            self.min_ms = self.min_ms.min(ms);
            self.max_ms = self.max_ms.max(ms);
        }
        self.count += 1;
        self.sum_ms += ms;
    }

    pub fn mean_ms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum_ms / self.count as f64
        }
    }
}

/// Collected measurements at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeasurementSnapshot {
    pub active: bool,
    pub window_ms: u64,
    pub calls: BTreeMap<String, CallSummary>,
}

#[derive(Debug, Default)]
pub struct MeasurementContext {
    started: Option<Instant>,
    last_window: Duration,
    calls: BTreeMap<String, CallSummary>,
}

impl MeasurementContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a new measurement window, discarding anything collected before.
    pub fn start(&mut self) {
        self.calls.clear();
        self.last_window = Duration::ZERO;
        self.started = Some(Instant::now());
    }

    /// End the window and return the collected data.
    pub fn stop(&mut self) -> MeasurementSnapshot {
        if let Some(started) = self.started.take() {
            self.last_window = started.elapsed();
        }
        self.snapshot()
    }

    pub fn is_active(&self) -> bool {
        self.started.is_some()
    }

    /// Record one call. Ignored outside a window.
    pub fn record(&mut self, api: &str, elapsed: Duration) {
        let ms = elapsed.as_secs_f64() * 1000.0;
        metrics::histogram!("hal_agent.call_api.duration_ms").record(ms);
        metrics::counter!("hal_agent.call_api.total").increment(1);

        if self.started.is_none() {
            return;
        }
        self.calls.entry(api.to_string()).or_default().record(ms);
    }

    pub fn snapshot(&self) -> MeasurementSnapshot {
        let window = match self.started {
            Some(started) => started.elapsed(),
            None => self.last_window,
        };
        MeasurementSnapshot {
            active: self.is_active(),
            window_ms: window.as_millis() as u64,
            calls: self.calls.clone(),
        }
    }
}
