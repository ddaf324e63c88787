// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! In-order device streams.

use crate::DeviceError;
use std::sync::mpsc;
use std::thread::JoinHandle;
use tensor_core::Place;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// An in-order queue of work bound to one device.
///
/// Each stream owns a worker thread that runs submitted closures one at a
/// time in submission order. Dropping the stream drains the queue and joins
/// the worker.
pub struct Stream {
    place: Place,
    sender: Option<mpsc::Sender<Job>>,
    worker: Option<JoinHandle<()>>,
}

impl Stream {
    /// Starts a stream for `place`.
    pub fn new(place: Place) -> Result<Self, DeviceError> {
        crate::ensure_supported(place)?;
        let (sender, receiver) = mpsc::channel::<Job>();
        let worker = std::thread::Builder::new()
            .name(format!("{place}-stream"))
            .spawn(move || {
                while let Ok(job) = receiver.recv() {
                    job();
                }
            })
            .map_err(|source| DeviceError::Spawn { place, source })?;
        tracing::trace!(%place, "stream started");
        Ok(Self {
            place,
            sender: Some(sender),
            worker: Some(worker),
        })
    }

    pub fn place(&self) -> Place {
        self.place
    }

    /// Enqueues `job` after all previously submitted work. Does not block.
    pub fn submit<F>(&self, job: F) -> Result<(), DeviceError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.sender
            .as_ref()
            .ok_or(DeviceError::StreamClosed(self.place))?
            .send(Box::new(job))
            .map_err(|_| DeviceError::StreamClosed(self.place))
    }

    /// Enqueues `job` and blocks until it has run, returning its result.
    pub fn execute<F, R>(&self, job: F) -> Result<R, DeviceError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (done, event) = mpsc::sync_channel(1);
        self.submit(move || {
            let _ = done.send(job());
        })?;
        event.recv().map_err(|_| DeviceError::StreamClosed(self.place))
    }

    /// Blocks until everything submitted so far has run.
    pub fn wait(&self) -> Result<(), DeviceError> {
        self.execute(|| ())
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        drop(self.sender.take());
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!(place = %self.place, "stream worker panicked");
            }
        }
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream").field("place", &self.place).finish()
    }
}

#[cfg(all(test, feature = "accel"))]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn test_runs_in_submission_order() {
        let stream = Stream::new(Place::Accel(0)).unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        for i in 0..16 {
            let log = Arc::clone(&log);
            stream.submit(move || log.lock().push(i)).unwrap();
        }
        stream.wait().unwrap();
        assert_eq!(*log.lock(), (0..16).collect::<Vec<_>>());
    }

    #[test]
    fn test_execute_returns_value() {
        let stream = Stream::new(Place::Accel(1)).unwrap();
        assert_eq!(stream.execute(|| 40 + 2).unwrap(), 42);
    }

    #[test]
    fn test_panicking_job_closes_stream() {
        let stream = Stream::new(Place::Accel(0)).unwrap();
        let _ = stream.submit(|| panic!("kernel fault"));
        assert!(matches!(stream.wait(), Err(DeviceError::StreamClosed(_))));
    }
}
