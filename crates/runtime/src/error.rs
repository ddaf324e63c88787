// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for the execution engine.

/// Errors that can occur while building or running a [`crate::ParallelExecutor`].
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// Inconsistent or unparsable configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A step failed. The executor stays usable.
    #[error("execution error: {0}")]
    Execution(#[from] graph_executor::ExecutorError),

    /// Building or validating a graph failed.
    #[error("graph error: {0}")]
    Graph(#[from] graph_ir::GraphError),

    /// Setting up garbage collection failed.
    #[error("memory error: {0}")]
    Memory(#[from] memory_manager::MemoryError),

    /// A device could not be used.
    #[error("device error: {0}")]
    Device(#[from] device::DeviceError),

    #[error("scope error: {0}")]
    Scope(#[from] scope::ScopeError),

    /// A fed tensor could not be split or merged.
    #[error("tensor error: {0}")]
    Tensor(#[from] tensor_core::TensorError),

    /// The profiler output could not be written.
    #[error("profiler error: {0}")]
    Profiler(String),
}
