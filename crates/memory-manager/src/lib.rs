// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # memory-manager
//!
//! Eager deletion of intermediate tensors: a variable's buffer is released
//! as soon as the last op that reads it has finished, instead of when the
//! step's scope is dropped.
//!
//! # Key Components
//!
//! - [`MemoryBudget`]: the collector threshold, with human-readable parsing
//!   (`"64M"`, `"1G"`, `"0"`).
//! - [`GarbageCollector`]: one per place; batches released tensors and
//!   frees them on the host or on the device stream.
//! - [`ReferenceCountMap`] / [`AtomicReferenceCountMap`]: static counts
//!   computed from the graph, and their per-step runtime copy.
//! - [`prepare_gc_and_ref_counts`]: runs the GC passes over one graph and
//!   returns the [`GcPlan`] the executor resets before each step.
//! - [`GcStats`]: cumulative collector metrics.
//!
//! # Release Path
//!
//! ```text
//! op completes ──► EagerDeletionHook
//!                     │ decrement(device, name) for each last-live input
//!                     ▼
//!                  ReachedZero? ──► take tensor out of the exec scope
//!                                       │
//!                                       ▼
//!                              GarbageCollector::add / release_now
//! ```

mod budget;
mod error;
mod gc;
pub mod passes;
mod ref_count;
mod stats;

pub use budget::MemoryBudget;
pub use error::MemoryError;
pub use gc::{CollectorKind, GarbageCollector, GarbageCollectorMap};
pub use passes::{
    early_delete_pass, eager_deletion_pass, prepare_gc_and_ref_counts, reference_count_pass,
    EagerDeletionHook, GcOptions, GcPlan, ReferenceCountPlan,
};
pub use ref_count::{AtomicReferenceCountMap, Decrement, ReferenceCountMap};
pub use stats::GcStats;
