// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Running a single op: kernel, timing, completion hooks.

use crate::ExecutorError;
use device::DeviceContextPool;
use graph_ir::{Graph, KernelContext, OpId, OpNode, Validated};
use scope::Scope;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tensor_core::Place;

/// Callback receiving the kernel time of every op that succeeded.
pub type OpTimer = Arc<dyn Fn(&OpNode, Duration) + Send + Sync>;

/// Settings shared by every executor variant.
#[derive(Clone, Default)]
pub struct ExecutorOptions {
    /// Worker threads per executor. `0` means available parallelism.
    pub num_threads: usize,
    /// Device contexts. When set, accelerator ops run on their device's
    /// compute stream.
    pub contexts: Option<Arc<DeviceContextPool>>,
    pub op_timer: Option<OpTimer>,
}

impl ExecutorOptions {
    pub fn with_threads(num_threads: usize) -> Self {
        Self {
            num_threads,
            ..Self::default()
        }
    }

    /// Resolved worker count, never zero.
    pub fn threads(&self) -> usize {
        if self.num_threads > 0 {
            return self.num_threads;
        }
        std::thread::available_parallelism().map_or(1, |n| n.get())
    }
}

impl std::fmt::Debug for ExecutorOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorOptions")
            .field("num_threads", &self.num_threads)
            .field("contexts", &self.contexts.is_some())
            .field("op_timer", &self.op_timer.is_some())
            .finish()
    }
}

/// Runs ops of one graph against its exec scopes.
pub(crate) struct OpRunner<'a> {
    graph: &'a Graph<Validated>,
    scopes: &'a [Scope],
    options: &'a ExecutorOptions,
}

impl<'a> OpRunner<'a> {
    pub(crate) fn new(
        graph: &'a Graph<Validated>,
        scopes: &'a [Scope],
        options: &'a ExecutorOptions,
    ) -> Result<Self, ExecutorError> {
        if scopes.len() != graph.places().len() {
            return Err(ExecutorError::ScopeCount {
                expected: graph.places().len(),
                actual: scopes.len(),
            });
        }
        Ok(Self {
            graph,
            scopes,
            options,
        })
    }

    pub(crate) fn graph(&self) -> &'a Graph<Validated> {
        self.graph
    }

    /// Runs `id` to completion, including its completion hooks.
    ///
    /// Accelerator ops are dispatched to the device stream and this thread
    /// blocks until the kernel has finished there.
    pub(crate) fn run(&self, id: OpId) -> Result<(), ExecutorError> {
        let op = self.graph.op(id);
        let scope = &self.scopes[op.device];
        let mut ctx = KernelContext::new(
            op.op_type.clone(),
            op.place,
            scope.clone(),
            op.input_names.clone(),
            op.output_names.clone(),
            Arc::clone(&op.attrs),
        );

        let start = Instant::now();
        let result = match (op.place, &self.options.contexts) {
            (Place::Accel(_), Some(pool)) => {
                let kernel = Arc::clone(&op.kernel);
                pool.get(op.place)?.run(move || kernel.compute(&mut ctx))?
            }
            _ => op.kernel.compute(&mut ctx),
        };
        result.map_err(|source| ExecutorError::OpFailed {
            op: op.label(),
            place: op.place,
            source,
        })?;
        let elapsed = start.elapsed();
        if let Some(timer) = &self.options.op_timer {
            timer(op, elapsed);
        }

        self.graph
            .notify_complete(op, scope)
            .map_err(|source| ExecutorError::Hook {
                op: op.label(),
                source,
            })?;
        tracing::trace!(op = %op.label(), ?elapsed, "op complete");
        Ok(())
    }
}
