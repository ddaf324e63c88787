// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # tensor-core
//!
//! Tensor values as they flow through the multi-device execution engine.
//!
//! This crate provides:
//! - [`Place`]: the physical device a tensor lives on (`cpu`, `accel:N`).
//! - [`Tensor`]: an n-dimensional tensor whose byte buffer is reference
//!   counted, so several variables (or several device scopes) can share one
//!   buffer without copying.
//! - [`Shape`] / [`DType`]: shape and element type descriptors.
//! - [`Lod`]: level-of-detail (sequence length) metadata carried alongside
//!   batched tensors and honoured when a batch is split across devices.
//!
//! # Design Goals
//! - Sharing is explicit: [`Tensor::share_data_with`] never copies,
//!   [`Tensor::deep_copy_to`] always does.
//! - Splitting a batch across devices and merging fetched results back are
//!   exact inverses of each other.
//! - Clean error types via `thiserror`.

mod dtype;
mod error;
mod lod;
mod place;
mod shape;
mod tensor;

pub use dtype::DType;
pub use error::TensorError;
pub use lod::Lod;
pub use place::Place;
pub use shape::Shape;
pub use tensor::Tensor;
