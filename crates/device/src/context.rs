// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Device contexts and the process-side pool that owns them.

use crate::{DeviceError, Stream};
use std::collections::HashMap;
use std::sync::Arc;
use tensor_core::Place;

/// Execution resources of one place.
///
/// Accelerator places own a compute [`Stream`]; host work runs inline on
/// the calling thread.
#[derive(Debug)]
pub struct DeviceContext {
    place: Place,
    stream: Option<Stream>,
}

impl DeviceContext {
    pub fn new(place: Place) -> Result<Self, DeviceError> {
        crate::ensure_supported(place)?;
        let stream = if place.is_accel() {
            Some(Stream::new(place)?)
        } else {
            None
        };
        Ok(Self { place, stream })
    }

    pub fn place(&self) -> Place {
        self.place
    }

    /// The compute stream, if this is an accelerator context.
    pub fn stream(&self) -> Option<&Stream> {
        self.stream.as_ref()
    }

    /// Runs `job` on the compute stream (or inline for host contexts) and
    /// blocks until it completes.
    pub fn run<F, R>(&self, job: F) -> Result<R, DeviceError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        match &self.stream {
            Some(stream) => stream.execute(job),
            None => Ok(job()),
        }
    }

    /// Blocks until all work queued on this context has finished.
    pub fn wait(&self) -> Result<(), DeviceError> {
        match &self.stream {
            Some(stream) => stream.wait(),
            None => Ok(()),
        }
    }
}

/// One [`DeviceContext`] per distinct place.
#[derive(Debug, Default)]
pub struct DeviceContextPool {
    contexts: HashMap<Place, Arc<DeviceContext>>,
    order: Vec<Place>,
}

impl DeviceContextPool {
    pub fn new(places: &[Place]) -> Result<Self, DeviceError> {
        let mut pool = Self::default();
        for &place in places {
            if pool.contexts.contains_key(&place) {
                continue;
            }
            pool.contexts.insert(place, Arc::new(DeviceContext::new(place)?));
            pool.order.push(place);
        }
        tracing::debug!(places = pool.order.len(), "device context pool created");
        Ok(pool)
    }

    pub fn get(&self, place: Place) -> Result<Arc<DeviceContext>, DeviceError> {
        self.contexts
            .get(&place)
            .cloned()
            .ok_or(DeviceError::NoContext(place))
    }

    pub fn places(&self) -> &[Place] {
        &self.order
    }

    /// Waits on every context in creation order. Every context is waited on
    /// even if an earlier one fails; the first error is returned.
    pub fn wait_all(&self) -> Result<(), DeviceError> {
        let mut first_err = None;
        for place in &self.order {
            if let Err(e) = self.contexts[place].wait() {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}
