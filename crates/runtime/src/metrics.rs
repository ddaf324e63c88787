// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Per-step execution metrics.
//!
//! [`StepMetrics`] is returned by every call to `run`. Accumulating several
//! of them gives totals for a benchmark or a training loop.

use memory_manager::GcStats;
use std::time::Duration;

/// What one call to `run` did.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct StepMetrics {
    /// Wall-clock time of the call.
    pub duration: Duration,
    /// Executor steps run (`num_iteration_per_run`).
    pub iterations: usize,
    /// Ops executed across all devices and iterations.
    pub ops_run: usize,
    /// Number of fetched values.
    pub fetched: usize,
    /// Garbage handed to collectors during the call.
    pub gc: GcStats,
}

impl StepMetrics {
    /// Adds `other` into `self`.
    pub fn accumulate(&mut self, other: &StepMetrics) {
        self.duration += other.duration;
        self.iterations += other.iterations;
        self.ops_run += other.ops_run;
        self.fetched += other.fetched;
        self.gc.merge(&other.gc);
    }

    /// Ops executed per second of wall-clock time.
    pub fn ops_per_second(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs <= 0.0 || self.ops_run == 0 {
            return 0.0;
        }
        self.ops_run as f64 / secs
    }

    /// Returns a human-readable summary suitable for CLI output.
    pub fn summary(&self) -> String {
        format!(
            "Step: {:.3}ms, {} iterations, {} ops ({:.0} ops/s), {} fetched | {}",
            self.duration.as_secs_f64() * 1000.0,
            self.iterations,
            self.ops_run,
            self.ops_per_second(),
            self.fetched,
            self.gc.summary(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_metrics() {
        let m = StepMetrics::default();
        assert_eq!(m.ops_per_second(), 0.0);
        assert!(m.summary().contains("0 ops"));
    }

    #[test]
    fn test_accumulate() {
        let step = StepMetrics {
            duration: Duration::from_millis(5),
            iterations: 1,
            ops_run: 10,
            fetched: 1,
            gc: GcStats::default(),
        };
        let mut total = StepMetrics::default();
        total.accumulate(&step);
        total.accumulate(&step);
        assert_eq!(total.duration, Duration::from_millis(10));
        assert_eq!(total.ops_run, 20);
        assert_eq!(total.iterations, 2);
        assert!((total.ops_per_second() - 2000.0).abs() < 1.0);
    }

    #[test]
    fn test_serialize() {
        let json = serde_json::to_string(&StepMetrics::default()).unwrap();
        assert!(json.contains("\"ops_run\":0"));
    }
}
