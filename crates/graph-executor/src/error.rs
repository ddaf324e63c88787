// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for graph execution.

use graph_ir::{HookError, KernelError};
use tensor_core::Place;

/// Errors that can occur while running a step.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// An op's kernel returned an error. The first failure of a step wins.
    #[error("op {op} failed on {place}: {source}")]
    OpFailed {
        op: String,
        place: Place,
        #[source]
        source: KernelError,
    },

    /// A completion hook (e.g. eager deletion) failed after an op.
    #[error("completion hook failed after op {op}: {source}")]
    Hook {
        op: String,
        #[source]
        source: HookError,
    },

    /// The number of exec scopes does not match the number of devices.
    #[error("expected {expected} exec scopes, got {actual}")]
    ScopeCount { expected: usize, actual: usize },

    /// Not every op ran although no op failed.
    #[error("step stalled: {completed} of {total} ops completed")]
    Stalled { completed: usize, total: usize },

    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error(transparent)]
    Device(#[from] device::DeviceError),

    #[error(transparent)]
    Scope(#[from] scope::ScopeError),

    #[error(transparent)]
    Tensor(#[from] tensor_core::TensorError),
}
