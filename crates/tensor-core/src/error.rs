// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for tensor operations.

use crate::{DType, Shape};

/// Errors that can occur during tensor operations.
#[derive(Debug, thiserror::Error)]
pub enum TensorError {
    /// The provided buffer size does not match the expected size for the given shape and dtype.
    #[error("shape mismatch: expected {expected} bytes, got {actual}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    /// Two tensors have incompatible shapes for the requested operation.
    #[error("incompatible shapes for {op}: {lhs} vs {rhs}")]
    ShapeMismatch {
        op: &'static str,
        lhs: Shape,
        rhs: Shape,
    },

    /// Two tensors have different element types.
    #[error("dtype mismatch for {op}: {lhs} vs {rhs}")]
    DTypeMismatch {
        op: &'static str,
        lhs: DType,
        rhs: DType,
    },

    /// A typed accessor was used on a tensor of a different dtype.
    #[error("cannot read {actual} tensor as {requested}")]
    WrongDType { requested: DType, actual: DType },

    /// The sequence metadata is inconsistent with the tensor.
    #[error("invalid LoD: {0}")]
    InvalidLod(String),

    /// The tensor has no outer (batch) dimension to operate on.
    #[error("{op} requires a tensor with rank >= 1")]
    ScalarNotAllowed { op: &'static str },

    /// A batch cannot be split into one shard per device.
    #[error("batch of {batch} samples cannot be split across {devices} devices")]
    NotEnoughSamples { batch: usize, devices: usize },

    /// An operation received no tensors.
    #[error("{op} requires at least one tensor")]
    Empty { op: &'static str },
}
