// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for variable lookup.

use crate::VarType;

/// Errors raised when reading variables out of a scope.
#[derive(Debug, thiserror::Error)]
pub enum ScopeError {
    /// No variable with this name exists in the scope or its ancestors.
    #[error("variable '{0}' not found")]
    VarNotFound(String),

    /// The variable exists but holds no value yet.
    #[error("variable '{0}' is not initialized")]
    Uninitialized(String),

    /// The variable holds a value of a different kind than requested.
    #[error("variable '{name}' holds {actual:?}, expected {expected:?}")]
    TypeMismatch {
        name: String,
        expected: VarType,
        actual: VarType,
    },
}
