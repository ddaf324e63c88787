// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Collective communication contexts.
//!
//! Only the operations the engine needs are provided: rank bookkeeping and
//! a grouped broadcast. Each communicator owns its own stream so collective
//! traffic is ordered independently of compute.

use crate::{DeviceError, Stream};
use std::sync::mpsc;
use tensor_core::{Place, Tensor};

/// Communicator of one accelerator place.
#[derive(Debug)]
pub struct CommContext {
    place: Place,
    rank: usize,
    stream: Stream,
}

impl CommContext {
    pub fn place(&self) -> Place {
        self.place
    }

    /// Global rank across all trainers.
    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn stream(&self) -> &Stream {
        &self.stream
    }
}

/// Communicators for every local accelerator place.
#[derive(Debug)]
pub struct CommContextMap {
    contexts: Vec<CommContext>,
    nranks: usize,
}

impl CommContextMap {
    /// Creates one communicator per place.
    ///
    /// With `num_trainers` processes each driving `places.len()` devices,
    /// the world has `num_trainers * places.len()` ranks and local device
    /// `i` of trainer `trainer_id` is rank `trainer_id * places.len() + i`.
    pub fn new(places: &[Place], trainer_id: usize, num_trainers: usize) -> Result<Self, DeviceError> {
        let local = places.len();
        let nranks = num_trainers.max(1) * local;
        let mut contexts = Vec::with_capacity(local);
        for (i, &place) in places.iter().enumerate() {
            crate::ensure_supported(place)?;
            if !place.is_accel() {
                return Err(DeviceError::InvalidCommPlace(place));
            }
            contexts.push(CommContext {
                place,
                rank: trainer_id * local + i,
                stream: Stream::new(place)?,
            });
        }
        tracing::info!(local, nranks, trainer_id, "communication contexts created");
        Ok(Self { contexts, nranks })
    }

    pub fn nranks(&self) -> usize {
        self.nranks
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    pub fn get(&self, place: Place) -> Option<&CommContext> {
        self.contexts.iter().find(|c| c.place == place)
    }

    /// Broadcasts `src`, which lives on local device `root`, to every local
    /// device as one grouped call.
    ///
    /// The root keeps its own buffer; every other device receives a fresh
    /// copy on its place. All transfers are enqueued before any is awaited,
    /// then every communicator is waited on.
    pub fn group_broadcast(&self, src: &Tensor, root: usize) -> Result<Vec<Tensor>, DeviceError> {
        let mut pending = Vec::with_capacity(self.contexts.len());
        for (i, ctx) in self.contexts.iter().enumerate() {
            let (done, event) = mpsc::sync_channel(1);
            let src = src.share_data_with();
            let place = ctx.place;
            let is_root = i == root;
            ctx.stream.submit(move || {
                let out = if is_root { src } else { src.deep_copy_to(place) };
                let _ = done.send(out);
            })?;
            pending.push((ctx.place, event));
        }
        self.wait_all()?;

        pending
            .into_iter()
            .map(|(place, event)| event.recv().map_err(|_| DeviceError::StreamClosed(place)))
            .collect()
    }

    /// Blocks until every communicator's queued work has finished.
    pub fn wait_all(&self) -> Result<(), DeviceError> {
        for ctx in &self.contexts {
            ctx.stream.wait()?;
        }
        Ok(())
    }
}
