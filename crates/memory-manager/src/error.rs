// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for memory management.

use tensor_core::Place;

/// Errors that can occur while setting up garbage collection.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// A size string could not be parsed.
    #[error("invalid size '{input}': {detail}")]
    InvalidSize { input: String, detail: String },

    /// No collector can serve this place.
    #[error("no garbage collector available for place {0}")]
    UnsupportedPlace(Place),

    /// The device backend rejected the request.
    #[error(transparent)]
    Device(#[from] device::DeviceError),
}
