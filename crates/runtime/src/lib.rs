// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # runtime
//!
//! The coordinator that runs one program across several devices.
//!
//! The runtime takes:
//! - A [`ProgramDesc`](graph_ir::ProgramDesc) and the kernels for its ops.
//! - A [`RuntimeConfig`]: places plus execution and build strategies.
//! - A global [`Scope`](scope::Scope) that outlives the executor.
//!
//! And builds a [`ParallelExecutor`] that owns the per-device scopes, the
//! garbage collectors and reference counts, and the chosen graph executor.
//! Each call to [`ParallelExecutor::run`] resets the per-step counts, runs
//! the graph and writes the fetched values into the global scope.
//!
//! # Execution modes
//! ```text
//! one shared graph  ──► threaded (default) | fast (work stealing)
//! one graph/device  ──► parallel (admitted by parallel_graph_admission)
//! ```
//!
//! # Environment
//! - `PE_ENABLE_PARALLEL_GRAPH`: opt into one graph per device.
//! - `PE_PROFILE_FNAME`: record op timings to a JSON-lines file.

mod admission;
mod config;
mod engine;
mod error;
mod metrics;
mod profiler;
mod replicator;

pub use admission::{parallel_graph_admission, Admission};
pub use config::{
    BuildStrategy, ExecutionStrategy, ExecutorType, ReduceStrategy, RuntimeConfig,
    ENABLE_PARALLEL_GRAPH_ENV,
};
pub use engine::{ParallelExecutor, ParallelExecutorBuilder, ScopeOwnership};
pub use error::RuntimeError;
pub use metrics::StepMetrics;
pub use profiler::{OpTiming, Profiler, PROFILE_FNAME_ENV};
pub use replicator::{Replicator, LR_DECAY_COUNTER};
