// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The [`GraphExecutor`] variants.

pub mod fast;
pub mod parallel;
pub mod threaded;

pub use fast::FastExecutor;
pub use parallel::ParallelSsaExecutor;
pub use threaded::ThreadedExecutor;

use crate::ExecutorError;
use graph_ir::{Graph, Validated};
use scope::Scope;
use tensor_core::{Place, Tensor};

/// Result of one executor step, before fetches are merged.
#[derive(Debug, Clone)]
pub struct StepOutput {
    /// `fetches[i][device]` is the value of fetch `i` on `device`.
    pub fetches: Vec<Vec<Tensor>>,
    pub ops_run: usize,
}

/// The executor chosen for a coordinator. Selected once at construction.
///
/// Every variant runs each op exactly once per step, after all ops it
/// depends on. The first failing op stops new scheduling; ops already
/// running finish before the failure is returned.
#[derive(Debug)]
pub enum GraphExecutor {
    Threaded(ThreadedExecutor),
    Fast(FastExecutor),
    Parallel(ParallelSsaExecutor),
}

impl GraphExecutor {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Threaded(_) => "threaded",
            Self::Fast(_) => "fast",
            Self::Parallel(_) => "parallel",
        }
    }

    /// The graphs this executor runs: one shared graph, or one per device.
    pub fn graphs(&self) -> Vec<&Graph<Validated>> {
        match self {
            Self::Threaded(e) => vec![e.graph()],
            Self::Fast(e) => vec![e.graph()],
            Self::Parallel(e) => e.graphs().collect(),
        }
    }

    /// Places in device order.
    pub fn places(&self) -> Vec<Place> {
        self.graphs()
            .into_iter()
            .flat_map(|g| g.places().iter().copied())
            .collect()
    }

    pub fn num_ops(&self) -> usize {
        self.graphs().iter().map(|g| g.num_ops()).sum()
    }

    /// Runs one step against `exec_scopes` (one per device) and reads each
    /// of `fetch_names` from every device afterwards.
    pub fn run<S: AsRef<str>>(
        &self,
        exec_scopes: &[Scope],
        fetch_names: &[S],
    ) -> Result<StepOutput, ExecutorError> {
        let ops_run = match self {
            Self::Threaded(e) => e.run_ops(exec_scopes)?,
            Self::Fast(e) => e.run_ops(exec_scopes)?,
            Self::Parallel(e) => e.run_ops(exec_scopes)?,
        };

        let fetches = fetch_names
            .iter()
            .map(|name| {
                exec_scopes
                    .iter()
                    .map(|scope| Ok(scope.get_var(name.as_ref())?.tensor()?))
                    .collect::<Result<Vec<_>, ExecutorError>>()
            })
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(executor = self.name(), ops_run, fetches = fetches.len(), "step finished");
        Ok(StepOutput { fetches, ops_run })
    }
}
