// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for program loading and graph construction.

/// Errors that can occur while loading programs or building graphs.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// The program file could not be read.
    #[error("failed to read program: {0}")]
    ProgramReadError(#[from] std::io::Error),

    /// The program JSON is malformed.
    #[error("failed to parse program: {0}")]
    ProgramParseError(#[from] serde_json::Error),

    /// The program is internally inconsistent.
    #[error("invalid program: {0}")]
    InvalidProgram(String),

    /// No kernel is registered for an op type used by the program.
    #[error("no kernel registered for op type '{op_type}'")]
    KernelNotFound { op_type: String },

    /// The graph references missing nodes or unknown devices.
    #[error("invalid graph: {0}")]
    InvalidGraph(String),

    /// The dependency graph is not acyclic.
    #[error("dependency cycle detected: {remaining} ops can never become ready")]
    Cycle { remaining: usize },
}
