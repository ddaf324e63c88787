// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Device-scoped garbage collectors.
//!
//! A collector receives tensors whose last reader has finished, holds them
//! until the accumulated size reaches its threshold, then releases the
//! whole batch. "Releasing" drops the collector's handle to each buffer;
//! the allocation itself is freed once no other handle remains.
//!
//! ```text
//!   add(tensors) ──► pending += bytes ──► pending >= threshold?
//!                                             │ yes
//!                         Cpu / UnsafeFastAccel ──► drop now
//!                         Stream               ──► drop on the device stream,
//!                                                  after queued compute work
//! ```

use crate::{GcStats, MemoryBudget, MemoryError};
use device::{DeviceContext, DeviceContextPool};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tensor_core::{Place, Tensor};

/// The collector variants. Chosen once per place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum CollectorKind {
    /// Host memory, released synchronously.
    Cpu,
    /// Accelerator memory, released on the device's compute stream.
    Stream,
    /// Accelerator memory, released synchronously without waiting for the
    /// device.
    UnsafeFastAccel,
}

#[derive(Default)]
struct Pending {
    buffers: Vec<Tensor>,
    bytes: usize,
}

/// Batches and releases tensors for one place.
pub struct GarbageCollector {
    kind: CollectorKind,
    place: Place,
    threshold: usize,
    context: Option<Arc<DeviceContext>>,
    pending: Mutex<Pending>,
    stats: Mutex<GcStats>,
}

impl GarbageCollector {
    /// Chooses and creates the collector for `place`.
    ///
    /// Host places get [`CollectorKind::Cpu`]. Accelerator places get
    /// [`CollectorKind::UnsafeFastAccel`] when `fast` is set, otherwise
    /// [`CollectorKind::Stream`], which needs the place's device context.
    pub fn for_place(
        place: Place,
        threshold: MemoryBudget,
        fast: bool,
        contexts: Option<&DeviceContextPool>,
    ) -> Result<Self, MemoryError> {
        device::ensure_supported(place)?;
        let (kind, context) = match place {
            Place::Cpu => (CollectorKind::Cpu, None),
            Place::Accel(_) if fast => (CollectorKind::UnsafeFastAccel, None),
            Place::Accel(_) => {
                let pool = contexts.ok_or(MemoryError::UnsupportedPlace(place))?;
                (CollectorKind::Stream, Some(pool.get(place)?))
            }
        };
        tracing::debug!(%place, ?kind, threshold = %threshold, "garbage collector created");
        Ok(Self {
            kind,
            place,
            threshold: threshold.as_bytes(),
            context,
            pending: Mutex::new(Pending::default()),
            stats: Mutex::new(GcStats::default()),
        })
    }

    pub fn kind(&self) -> CollectorKind {
        self.kind
    }

    pub fn place(&self) -> Place {
        self.place
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Bytes currently held back.
    pub fn pending_bytes(&self) -> usize {
        self.pending.lock().bytes
    }

    /// Hands `garbage` to the collector. Releases the accumulated batch if
    /// the held size reaches the threshold.
    pub fn add(&self, garbage: Vec<Tensor>) {
        if garbage.is_empty() {
            return;
        }
        let bytes: usize = garbage.iter().map(Tensor::size_bytes).sum();
        self.stats.lock().record_request(garbage.len(), bytes);

        let batch = {
            let mut pending = self.pending.lock();
            pending.bytes += bytes;
            pending.buffers.extend(garbage);
            if pending.bytes >= self.threshold {
                Some(std::mem::take(&mut *pending))
            } else {
                None
            }
        };
        if let Some(batch) = batch {
            self.stats.lock().record_flush();
            self.release(batch.buffers, batch.bytes);
        }
    }

    /// Releases `garbage` right away, bypassing the batch.
    pub fn release_now(&self, garbage: Vec<Tensor>) {
        if garbage.is_empty() {
            return;
        }
        let bytes: usize = garbage.iter().map(Tensor::size_bytes).sum();
        {
            let mut stats = self.stats.lock();
            stats.record_request(garbage.len(), bytes);
            stats.record_immediate(garbage.len());
        }
        self.release(garbage, bytes);
    }

    /// Releases whatever is held back, regardless of the threshold.
    pub fn flush(&self) {
        let batch = std::mem::take(&mut *self.pending.lock());
        if !batch.buffers.is_empty() {
            self.stats.lock().record_flush();
            self.release(batch.buffers, batch.bytes);
        }
    }

    /// Blocks until every release queued on a device stream has run.
    pub fn wait(&self) -> Result<(), MemoryError> {
        if let Some(ctx) = &self.context {
            ctx.wait()?;
        }
        Ok(())
    }

    pub fn stats(&self) -> GcStats {
        *self.stats.lock()
    }

    fn release(&self, buffers: Vec<Tensor>, bytes: usize) {
        tracing::trace!(place = %self.place, buffers = buffers.len(), bytes, "releasing garbage");
        match (self.kind, self.context.as_ref().and_then(|c| c.stream())) {
            (CollectorKind::Stream, Some(stream)) => {
                if let Err(e) = stream.submit(move || drop(buffers)) {
                    // The stream is gone, so nothing can still be using the buffers.
                    tracing::warn!(place = %self.place, error = %e, "stream release failed, releasing on host");
                }
            }
            _ => drop(buffers),
        }
    }
}

impl std::fmt::Debug for GarbageCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GarbageCollector")
            .field("kind", &self.kind)
            .field("place", &self.place)
            .field("threshold", &self.threshold)
            .finish()
    }
}

/// One collector per place, shared by every graph that runs there.
#[derive(Debug, Default)]
pub struct GarbageCollectorMap {
    collectors: HashMap<Place, Arc<GarbageCollector>>,
}

impl GarbageCollectorMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the collector for `place`, creating it if missing.
    pub fn get_or_create(
        &mut self,
        place: Place,
        threshold: MemoryBudget,
        fast: bool,
        contexts: Option<&DeviceContextPool>,
    ) -> Result<Arc<GarbageCollector>, MemoryError> {
        if let Some(gc) = self.collectors.get(&place) {
            return Ok(Arc::clone(gc));
        }
        let gc = Arc::new(GarbageCollector::for_place(place, threshold, fast, contexts)?);
        self.collectors.insert(place, Arc::clone(&gc));
        Ok(gc)
    }

    pub fn get(&self, place: Place) -> Option<Arc<GarbageCollector>> {
        self.collectors.get(&place).cloned()
    }

    pub fn len(&self) -> usize {
        self.collectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collectors.is_empty()
    }

    /// Combined statistics of every collector.
    pub fn stats(&self) -> GcStats {
        let mut total = GcStats::default();
        for gc in self.collectors.values() {
            total.merge(&gc.stats());
        }
        total
    }

    /// Flushes and waits on every collector.
    pub fn flush_all(&self) -> Result<(), MemoryError> {
        for gc in self.collectors.values() {
            gc.flush();
            gc.wait()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tensor_core::Shape;

    fn tensor(n: usize) -> Tensor {
        Tensor::from_f32(Shape::vector(n), &vec![0.0; n]).unwrap()
    }

    #[test]
    fn test_zero_threshold_releases_every_request() {
        let gc = GarbageCollector::for_place(Place::Cpu, MemoryBudget::from_bytes(0), false, None).unwrap();
        assert_eq!(gc.kind(), CollectorKind::Cpu);
        let t = tensor(4);
        let handle = t.share_data_with();
        gc.add(vec![t]);
        assert_eq!(gc.pending_bytes(), 0);
        assert_eq!(handle.buffer_handles(), 1);
        assert_eq!(gc.stats().flushes, 1);
    }

    #[test]
    fn test_batches_until_threshold() {
        // Each tensor is 16 bytes; threshold 40 releases on the third add.
        let gc = GarbageCollector::for_place(Place::Cpu, MemoryBudget::from_bytes(40), false, None).unwrap();
        let handles: Vec<_> = (0..3).map(|_| tensor(4)).collect();
        for p in &handles[..2] {
            gc.add(vec![p.share_data_with()]);
        }
        assert_eq!(gc.pending_bytes(), 32);
        assert!(handles.iter().take(2).all(|p| p.buffer_handles() == 2));

        gc.add(vec![handles[2].share_data_with()]);
        assert_eq!(gc.pending_bytes(), 0);
        assert!(handles.iter().all(|p| p.buffer_handles() == 1));
        assert_eq!(gc.stats().buffers, 3);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let gc = GarbageCollector::for_place(Place::Cpu, MemoryBudget::from_bytes(16), false, None).unwrap();
        gc.add(vec![tensor(4)]);
        assert_eq!(gc.pending_bytes(), 0);
    }

    #[test]
    fn test_release_now_and_flush() {
        let gc = GarbageCollector::for_place(Place::Cpu, MemoryBudget::from_mb(1), false, None).unwrap();
        gc.add(vec![tensor(4)]);
        gc.release_now(vec![tensor(2)]);
        assert_eq!(gc.pending_bytes(), 16);
        assert_eq!(gc.stats().immediate, 1);
        gc.flush();
        assert_eq!(gc.pending_bytes(), 0);
    }

    #[cfg(feature = "accel")]
    #[test]
    fn test_accel_collector_choice() {
        let pool = DeviceContextPool::new(&[Place::Accel(0)]).unwrap();
        let budget = MemoryBudget::from_bytes(0);
        let fast = GarbageCollector::for_place(Place::Accel(0), budget, true, None).unwrap();
        assert_eq!(fast.kind(), CollectorKind::UnsafeFastAccel);
        let stream = GarbageCollector::for_place(Place::Accel(0), budget, false, Some(&pool)).unwrap();
        assert_eq!(stream.kind(), CollectorKind::Stream);

        let t = tensor(8).deep_copy_to(Place::Accel(0));
        let handle = t.share_data_with();
        stream.add(vec![t]);
        stream.wait().unwrap();
        assert_eq!(handle.buffer_handles(), 1);
    }

    #[cfg(feature = "accel")]
    #[test]
    fn test_stream_collector_needs_context() {
        let res = GarbageCollector::for_place(Place::Accel(0), MemoryBudget::from_bytes(0), false, None);
        assert!(matches!(res, Err(MemoryError::UnsupportedPlace(_))));
    }

    #[test]
    fn test_map_reuses_collectors() {
        let mut map = GarbageCollectorMap::new();
        let budget = MemoryBudget::from_bytes(0);
        let a = map.get_or_create(Place::Cpu, budget, false, None).unwrap();
        let b = map.get_or_create(Place::Cpu, budget, false, None).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(map.len(), 1);
        a.add(vec![tensor(1)]);
        assert_eq!(map.stats().buffers, 1);
        map.flush_all().unwrap();
    }
}
