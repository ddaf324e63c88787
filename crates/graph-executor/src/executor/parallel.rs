// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! One graph and one executor per device.
//!
//! Used when each device got its own graph at build time. Every device runs
//! its step on its own thread; the step ends when all of them have joined.

use crate::executor::FastExecutor;
use crate::{ExecutorError, ExecutorOptions};
use graph_ir::{Graph, Validated};
use scope::Scope;

/// Per-device executors run concurrently.
#[derive(Debug)]
pub struct ParallelSsaExecutor {
    executors: Vec<FastExecutor>,
}

impl ParallelSsaExecutor {
    /// `graphs[i]` must be the single-place graph of device `i`.
    pub fn new(graphs: Vec<Graph<Validated>>, options: ExecutorOptions) -> Self {
        tracing::debug!(devices = graphs.len(), "parallel executor created");
        Self {
            executors: graphs
                .into_iter()
                .map(|g| FastExecutor::new(g, options.clone()))
                .collect(),
        }
    }

    pub fn num_devices(&self) -> usize {
        self.executors.len()
    }

    pub fn graphs(&self) -> impl Iterator<Item = &Graph<Validated>> {
        self.executors.iter().map(FastExecutor::graph)
    }

    /// Runs every device's graph against `scopes[device]`. All devices are
    /// joined before returning; on failure the error of the lowest device
    /// index wins.
    pub fn run_ops(&self, scopes: &[Scope]) -> Result<usize, ExecutorError> {
        if scopes.len() != self.executors.len() {
            return Err(ExecutorError::ScopeCount {
                expected: self.executors.len(),
                actual: scopes.len(),
            });
        }

        let results: Vec<Result<usize, ExecutorError>> = std::thread::scope(|s| {
            let handles: Vec<_> = self
                .executors
                .iter()
                .zip(scopes)
                .map(|(exec, scope)| s.spawn(move || exec.run_ops(std::slice::from_ref(scope))))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
                .collect()
        });

        let mut ops = 0;
        for result in results {
            ops += result?;
        }
        Ok(ops)
    }
}
