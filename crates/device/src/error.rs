// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for device resources.

use tensor_core::Place;

/// Errors raised by streams and device contexts.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// The place needs a backend this build does not include.
    #[error("place {0} is not supported by this build (enable the `accel` feature)")]
    Unsupported(Place),

    /// A communicator was requested for a place that cannot take part in
    /// collectives.
    #[error("place {0} cannot join a communicator")]
    InvalidCommPlace(Place),

    /// No context exists for the place.
    #[error("no device context for {0}")]
    NoContext(Place),

    /// The stream's worker thread could not be started.
    #[error("failed to start stream worker for {place}: {source}")]
    Spawn {
        place: Place,
        #[source]
        source: std::io::Error,
    },

    /// The stream's worker is gone (it panicked while running submitted work).
    #[error("stream for {0} is closed")]
    StreamClosed(Place),
}
