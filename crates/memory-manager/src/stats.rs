// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Collector statistics for profiling and diagnostics.
//!
//! [`GcStats`] tracks cumulative counts of what collectors were handed and
//! how often they released. Subtracting two snapshots gives per-step numbers.

/// Cumulative statistics of one or more garbage collectors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct GcStats {
    /// Number of collection requests (one per op completion with garbage).
    pub requests: u64,
    /// Buffers handed to the collector.
    pub buffers: u64,
    /// Bytes handed to the collector.
    pub bytes: u64,
    /// Number of batch releases triggered by reaching the threshold.
    pub flushes: u64,
    /// Buffers released immediately, bypassing the batch.
    pub immediate: u64,
}

impl GcStats {
    pub(crate) fn record_request(&mut self, buffers: usize, bytes: usize) {
        self.requests += 1;
        self.buffers += buffers as u64;
        self.bytes += bytes as u64;
    }

    pub(crate) fn record_flush(&mut self) {
        self.flushes += 1;
    }

    pub(crate) fn record_immediate(&mut self, buffers: usize) {
        self.immediate += buffers as u64;
    }

    /// Adds `other` into `self`.
    pub fn merge(&mut self, other: &GcStats) {
        self.requests += other.requests;
        self.buffers += other.buffers;
        self.bytes += other.bytes;
        self.flushes += other.flushes;
        self.immediate += other.immediate;
    }

    /// Counts accumulated since `earlier`.
    pub fn since(&self, earlier: &GcStats) -> GcStats {
        GcStats {
            requests: self.requests.saturating_sub(earlier.requests),
            buffers: self.buffers.saturating_sub(earlier.buffers),
            bytes: self.bytes.saturating_sub(earlier.bytes),
            flushes: self.flushes.saturating_sub(earlier.flushes),
            immediate: self.immediate.saturating_sub(earlier.immediate),
        }
    }

    /// Returns a human-readable summary.
    pub fn summary(&self) -> String {
        let mb = self.bytes as f64 / (1024.0 * 1024.0);
        format!(
            "GC: {} buffers ({:.2} MB) in {} requests, {} flushes, {} immediate",
            self.buffers, mb, self.requests, self.flushes, self.immediate,
        )
    }
}
