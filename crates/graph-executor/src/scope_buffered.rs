// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Per-step exec scopes and fetch merging around a [`GraphExecutor`].
//!
//! ```text
//! device scope ── exec scope (kept for N steps, then dropped)
//!   persistable vars       non-persistable vars, op outputs
//! ```

use crate::{ExecutorError, GraphExecutor};
use device::DeviceContextPool;
use graph_ir::VariableInfo;
use scope::{FetchList, Scope};
use std::sync::Arc;
use tensor_core::{Shape, Tensor};

/// Output of one buffered step.
#[derive(Debug, Clone)]
pub struct BufferedOutput {
    /// One merged tensor per fetch name, in request order.
    pub fetches: FetchList,
    pub ops_run: usize,
}

/// Wraps the chosen executor with exec-scope management.
#[derive(Debug)]
pub struct ScopeBufferedExecutor {
    inner: GraphExecutor,
    local_scopes: Vec<Scope>,
    var_infos: Vec<VariableInfo>,
    drop_every: usize,
    contexts: Option<Arc<DeviceContextPool>>,
    exec_scopes: Vec<Scope>,
    steps_since_drop: usize,
}

impl ScopeBufferedExecutor {
    /// `local_scopes[i]` is the scope of device `i`. Exec scopes are
    /// dropped after every `num_iteration_per_drop_scope` steps (at least
    /// one).
    pub fn new(
        inner: GraphExecutor,
        local_scopes: Vec<Scope>,
        var_infos: Vec<VariableInfo>,
        num_iteration_per_drop_scope: usize,
        contexts: Option<Arc<DeviceContextPool>>,
    ) -> Self {
        Self {
            inner,
            local_scopes,
            var_infos,
            drop_every: num_iteration_per_drop_scope.max(1),
            contexts,
            exec_scopes: Vec::new(),
            steps_since_drop: 0,
        }
    }

    pub fn inner(&self) -> &GraphExecutor {
        &self.inner
    }

    pub fn var_infos(&self) -> &[VariableInfo] {
        &self.var_infos
    }

    /// Current exec scopes; empty between retention windows.
    pub fn exec_scopes(&self) -> &[Scope] {
        &self.exec_scopes
    }

    /// Runs one step and merges each fetch across devices.
    pub fn run<S: AsRef<str>>(&mut self, fetch_names: &[S]) -> Result<BufferedOutput, ExecutorError> {
        if self.exec_scopes.is_empty() {
            self.create_exec_scopes();
        }

        let step = self.inner.run(&self.exec_scopes, fetch_names)?;
        let fetches = step
            .fetches
            .into_iter()
            .map(merge_fetch)
            .collect::<Result<FetchList, _>>()?;

        self.steps_since_drop += 1;
        if self.steps_since_drop >= self.drop_every {
            self.drop_local_exec_scopes()?;
        }
        Ok(BufferedOutput {
            fetches,
            ops_run: step.ops_run,
        })
    }

    /// Waits for every device, then drops the exec scopes.
    pub fn drop_local_exec_scopes(&mut self) -> Result<(), ExecutorError> {
        if let Some(pool) = &self.contexts {
            pool.wait_all()?;
        }
        for (local, exec) in self.local_scopes.iter().zip(self.exec_scopes.drain(..)) {
            local.delete_scope(&exec);
        }
        self.steps_since_drop = 0;
        tracing::trace!("exec scopes dropped");
        Ok(())
    }

    fn create_exec_scopes(&mut self) {
        self.exec_scopes = self
            .local_scopes
            .iter()
            .map(|local| {
                let exec = local.new_scope();
                for info in &self.var_infos {
                    // Fed or broadcast values already live in the device scope.
                    if local.find_var(&info.name).is_some() {
                        continue;
                    }
                    if info.persistable {
                        local.var(&info.name, info.var_type);
                    } else {
                        exec.var(&info.name, info.var_type);
                    }
                }
                exec
            })
            .collect();
        tracing::trace!(devices = self.exec_scopes.len(), "exec scopes created");
    }
}

/// Concatenates per-device values in device order into one host tensor.
/// A single device's value is passed through unchanged. Scalars are
/// merged as `[1]` rows, so N devices give a `[N]` tensor.
fn merge_fetch(mut per_device: Vec<Tensor>) -> Result<Tensor, ExecutorError> {
    if per_device.len() == 1 {
        if let Some(only) = per_device.pop() {
            return Ok(only);
        }
    }
    let rows = per_device
        .into_iter()
        .map(|t| match t.shape().rank() {
            0 => t.reshape(Shape::vector(1)),
            _ => Ok(t),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Tensor::concat_batch(&rows)?)
}
