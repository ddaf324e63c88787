// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Static and runtime reference counts.
//!
//! The static map is computed once from the graph. Before every step the
//! runtime map is reset from it; ops then decrement it concurrently as they
//! finish. Keys never change after construction, so the runtime map needs
//! no lock: each entry is an `AtomicUsize`.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Per-device `name → count`, computed once.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ReferenceCountMap {
    per_device: Vec<BTreeMap<String, usize>>,
}

impl ReferenceCountMap {
    pub fn new(num_devices: usize) -> Self {
        Self {
            per_device: vec![BTreeMap::new(); num_devices],
        }
    }

    pub fn set(&mut self, device: usize, name: &str, count: usize) {
        self.per_device[device].insert(name.to_string(), count);
    }

    pub fn get(&self, device: usize, name: &str) -> Option<usize> {
        self.per_device.get(device)?.get(name).copied()
    }

    pub fn num_devices(&self) -> usize {
        self.per_device.len()
    }

    /// Entries of one device, sorted by name.
    pub fn device(&self, device: usize) -> impl Iterator<Item = (&str, usize)> {
        self.per_device
            .get(device)
            .into_iter()
            .flat_map(|m| m.iter().map(|(k, v)| (k.as_str(), *v)))
    }

    /// Number of tracked variables across all devices.
    pub fn len(&self) -> usize {
        self.per_device.iter().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Outcome of one [`AtomicReferenceCountMap::decrement`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decrement {
    /// This call moved the count from 1 to 0: the caller owns the release.
    ReachedZero,
    /// The count is still positive.
    Remaining(usize),
    /// The count was already zero (excluded this step); nothing changed.
    AlreadyZero,
    /// The name is not tracked on this device.
    Untracked,
}

/// The runtime copy of a [`ReferenceCountMap`].
#[derive(Debug, Default)]
pub struct AtomicReferenceCountMap {
    per_device: Vec<HashMap<String, AtomicUsize>>,
}

impl AtomicReferenceCountMap {
    /// Creates a runtime map with the same keys as `statics`, all zero.
    pub fn with_keys_of(statics: &ReferenceCountMap) -> Self {
        Self {
            per_device: statics
                .per_device
                .iter()
                .map(|m| m.keys().map(|k| (k.clone(), AtomicUsize::new(0))).collect())
                .collect(),
        }
    }

    /// Copies `statics` into this map, then zeroes every name in `excluded`
    /// on every device.
    ///
    /// Must not race with [`decrement`](Self::decrement); the executor calls
    /// it between steps.
    pub fn reset<S: AsRef<str>>(&self, statics: &ReferenceCountMap, excluded: &[S]) {
        for (runtime, fixed) in self.per_device.iter().zip(&statics.per_device) {
            for (name, count) in fixed {
                if let Some(slot) = runtime.get(name) {
                    slot.store(*count, Ordering::Release);
                }
            }
            for name in excluded {
                if let Some(slot) = runtime.get(name.as_ref()) {
                    slot.store(0, Ordering::Release);
                }
            }
        }
    }

    /// Decrements `name` on `device`, never going below zero.
    ///
    /// Exactly one caller observes [`Decrement::ReachedZero`] per reset.
    pub fn decrement(&self, device: usize, name: &str) -> Decrement {
        let Some(slot) = self.per_device.get(device).and_then(|m| m.get(name)) else {
            return Decrement::Untracked;
        };
        match slot.fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| c.checked_sub(1)) {
            Ok(1) => Decrement::ReachedZero,
            Ok(prev) => Decrement::Remaining(prev - 1),
            Err(_) => Decrement::AlreadyZero,
        }
    }

    pub fn get(&self, device: usize, name: &str) -> Option<usize> {
        self.per_device
            .get(device)?
            .get(name)
            .map(|c| c.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn statics() -> ReferenceCountMap {
        let mut m = ReferenceCountMap::new(2);
        m.set(0, "a", 2);
        m.set(0, "b", 1);
        m.set(1, "a", 3);
        m
    }

    #[test]
    fn test_static_map() {
        let m = statics();
        assert_eq!(m.get(0, "a"), Some(2));
        assert_eq!(m.get(1, "b"), None);
        assert_eq!(m.get(5, "a"), None);
        assert_eq!(m.len(), 3);
        let names: Vec<_> = m.device(0).map(|(n, _)| n).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_reset_copies_and_excludes() {
        let s = statics();
        let rt = AtomicReferenceCountMap::with_keys_of(&s);
        assert_eq!(rt.get(0, "a"), Some(0));
        rt.reset(&s, &["b"]);
        assert_eq!(rt.get(0, "a"), Some(2));
        assert_eq!(rt.get(0, "b"), Some(0));
        assert_eq!(rt.get(1, "a"), Some(3));
    }

    #[test]
    fn test_decrement_sequence() {
        let s = statics();
        let rt = AtomicReferenceCountMap::with_keys_of(&s);
        rt.reset(&s, &["b"]);
        assert_eq!(rt.decrement(0, "a"), Decrement::Remaining(1));
        assert_eq!(rt.decrement(0, "a"), Decrement::ReachedZero);
        assert_eq!(rt.decrement(0, "a"), Decrement::AlreadyZero);
        assert_eq!(rt.decrement(0, "b"), Decrement::AlreadyZero);
        assert_eq!(rt.decrement(0, "zzz"), Decrement::Untracked);
        assert_eq!(rt.get(0, "a"), Some(0));
    }

    #[test]
    fn test_concurrent_single_zero_crossing() {
        let mut s = ReferenceCountMap::new(1);
        s.set(0, "x", 64);
        let rt = Arc::new(AtomicReferenceCountMap::with_keys_of(&s));

        for _ in 0..10 {
            rt.reset(&s, &[] as &[&str]);
            let zeros: usize = std::thread::scope(|sc| {
                let handles: Vec<_> = (0..8)
                    .map(|_| {
                        let rt = Arc::clone(&rt);
                        sc.spawn(move || {
                            (0..16)
                                .filter(|_| rt.decrement(0, "x") == Decrement::ReachedZero)
                                .count()
                        })
                    })
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap()).sum()
            });
            // 128 decrements against a count of 64: exactly one reaches zero.
            assert_eq!(zeros, 1);
            assert_eq!(rt.get(0, "x"), Some(0));
        }
    }
}
