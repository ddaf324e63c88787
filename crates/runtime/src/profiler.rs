// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Process-wide op profiler.
//!
//! Enabled by setting `PE_PROFILE_FNAME` to an output path before the first
//! executor is built. Every executor in the process then records its op
//! timings into the same [`Profiler`]; each call to `run` first appends the
//! timings of earlier steps to the file, one JSON object per line.

use crate::RuntimeError;
use graph_executor::OpTimer;
use graph_ir::OpNode;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Output path of the process-wide profiler.
pub const PROFILE_FNAME_ENV: &str = "PE_PROFILE_FNAME";

static PROFILER: Lazy<Option<Arc<Profiler>>> = Lazy::new(|| {
    let path = std::env::var_os(PROFILE_FNAME_ENV).filter(|p| !p.is_empty())?;
    let profiler = Profiler::new(PathBuf::from(path));
    tracing::info!(path = %profiler.path().display(), "op profiler enabled");
    Some(Arc::new(profiler))
});

/// Kernel time of one op.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct OpTiming {
    pub op: String,
    pub op_type: String,
    pub place: String,
    pub micros: u64,
}

/// Collects op timings and appends them to a JSON-lines file.
#[derive(Debug)]
pub struct Profiler {
    path: PathBuf,
    pending: Mutex<Vec<OpTiming>>,
}

impl Profiler {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            pending: Mutex::new(Vec::new()),
        }
    }

    /// The process-wide profiler, if `PE_PROFILE_FNAME` was set when it was
    /// first requested.
    pub fn global() -> Option<Arc<Profiler>> {
        PROFILER.clone()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self, op: &OpNode, elapsed: Duration) {
        self.pending.lock().push(OpTiming {
            op: op.label(),
            op_type: op.op_type.clone(),
            place: op.place.to_string(),
            micros: elapsed.as_micros() as u64,
        });
    }

    /// Timings recorded since the last flush.
    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    /// A timer callback for executors that records into this profiler.
    pub fn timer(self: &Arc<Self>) -> OpTimer {
        let profiler = Arc::clone(self);
        Arc::new(move |op: &OpNode, elapsed: Duration| profiler.record(op, elapsed))
    }

    /// Appends pending timings to the output file. Returns how many were
    /// written.
    pub fn flush(&self) -> Result<usize, RuntimeError> {
        let records = std::mem::take(&mut *self.pending.lock());
        if records.is_empty() {
            return Ok(0);
        }
        let fail = |e: &dyn std::fmt::Display| {
            RuntimeError::Profiler(format!("cannot write '{}': {e}", self.path.display()))
        };

        let mut out = String::new();
        for record in &records {
            out.push_str(&serde_json::to_string(record).map_err(|e| fail(&e))?);
            out.push('\n');
        }
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut f| f.write_all(out.as_bytes()))
            .map_err(|e| fail(&e))?;

        tracing::debug!(records = records.len(), "profile flushed");
        Ok(records.len())
    }
}
