// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # device
//!
//! Per-device execution resources used by the engine.
//!
//! - [`Stream`]: an in-order work queue backed by a dedicated thread.
//!   Work submitted to a stream runs strictly after everything submitted
//!   before it; [`Stream::wait`] blocks until the queue drains.
//! - [`DeviceContext`] / [`DeviceContextPool`]: one compute stream per
//!   accelerator place (host places execute inline).
//! - [`CommContextMap`]: one communicator per accelerator place with a
//!   grouped broadcast.
//!
//! # Backend
//! Accelerators are simulated on the host behind the `accel` cargo feature
//! (enabled by default). Without it every accelerator request fails with
//! [`DeviceError::Unsupported`].

mod comm;
mod context;
mod error;
mod stream;

pub use comm::{CommContext, CommContextMap};
pub use context::{DeviceContext, DeviceContextPool};
pub use error::DeviceError;
pub use stream::Stream;

use tensor_core::Place;

/// Returns `true` when the accelerator backend is compiled in.
pub const fn accel_available() -> bool {
    cfg!(feature = "accel")
}

/// Fails with [`DeviceError::Unsupported`] if `place` cannot be served by
/// this build.
pub fn ensure_supported(place: Place) -> Result<(), DeviceError> {
    if place.is_accel() && !accel_available() {
        return Err(DeviceError::Unsupported(place));
    }
    Ok(())
}
