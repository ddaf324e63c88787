// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Graph passes that wire reference counting into op completion.
//!
//! Run per graph, after building and before the first step:
//!
//! 1. collectors are created for every place the graph runs on;
//! 2. [`reference_count_pass`] computes static counts and last-live ops;
//! 3. [`eager_deletion_pass`] installs an [`EagerDeletionHook`];
//! 4. optionally, [`early_delete_pass`] lets single-use variables skip the
//!    collector's batching.
//!
//! [`prepare_gc_and_ref_counts`] runs all of them in that order.

use crate::{
    AtomicReferenceCountMap, Decrement, GarbageCollector, GarbageCollectorMap, MemoryBudget,
    MemoryError, ReferenceCountMap,
};
use device::DeviceContextPool;
use graph_ir::{CompletionHook, Graph, HookError, OpId, OpNode, Validated, VarNode};
use parking_lot::RwLock;
use scope::{Scope, VarType};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// Garbage-collection settings.
#[derive(Debug, Clone, Copy)]
pub struct GcOptions {
    pub threshold: MemoryBudget,
    /// Use [`crate::CollectorKind::UnsafeFastAccel`] for accelerator places.
    pub fast_eager_deletion: bool,
    /// Run [`early_delete_pass`].
    pub memory_early_delete: bool,
}

// ── Reference-count pass ───────────────────────────────────────────

/// Result of [`reference_count_pass`].
#[derive(Debug, Clone)]
pub struct ReferenceCountPlan {
    pub static_counts: ReferenceCountMap,
    /// Per device: name → ops after which the variable is dead.
    pub last_live_ops: Vec<BTreeMap<String, Vec<OpId>>>,
    /// Indexed by op id: names this op decrements when it completes.
    pub release_after: Vec<Vec<String>>,
}

fn is_collectable(var: &VarNode) -> bool {
    !var.is_control()
        && !var.persistable
        && matches!(var.var_type, VarType::LodTensor | VarType::SelectedRows)
}

/// Computes, for every collectable variable on every device, the ops that
/// touch its final version: its readers, or its generator when nobody
/// reads it. The static count is the size of that set.
pub fn reference_count_pass(graph: &Graph<Validated>) -> ReferenceCountPlan {
    let num_devices = graph.places().len();

    let mut last_version: HashMap<(usize, &str), &VarNode> = HashMap::new();
    for var in graph.vars().iter().filter(|v| is_collectable(v)) {
        last_version
            .entry((var.device, var.name.as_str()))
            .and_modify(|cur| {
                if var.version > cur.version {
                    *cur = var;
                }
            })
            .or_insert(var);
    }

    let mut static_counts = ReferenceCountMap::new(num_devices);
    let mut last_live_ops = vec![BTreeMap::new(); num_devices];
    let mut release_after = vec![Vec::new(); graph.num_ops()];
    for ((device, name), var) in last_version {
        let mut ops = var.readers.clone();
        ops.sort_unstable();
        ops.dedup();
        if ops.is_empty() {
            ops.extend(var.generator);
        }
        if ops.is_empty() {
            continue;
        }
        static_counts.set(device, name, ops.len());
        for &op in &ops {
            release_after[op].push(name.to_string());
        }
        last_live_ops[device].insert(name.to_string(), ops);
    }
    for names in &mut release_after {
        names.sort_unstable();
    }

    tracing::debug!(
        graph = %graph.name,
        tracked = static_counts.len(),
        "reference counts computed"
    );
    ReferenceCountPlan {
        static_counts,
        last_live_ops,
        release_after,
    }
}

// ── Eager deletion ─────────────────────────────────────────────────

/// Decrements reference counts as ops complete and hands dead tensors to
/// the device's collector.
pub struct EagerDeletionHook {
    counts: Arc<AtomicReferenceCountMap>,
    release_after: Vec<Vec<String>>,
    collectors: Vec<Arc<GarbageCollector>>,
    early: RwLock<Vec<HashSet<String>>>,
}

impl EagerDeletionHook {
    fn new(
        counts: Arc<AtomicReferenceCountMap>,
        release_after: Vec<Vec<String>>,
        collectors: Vec<Arc<GarbageCollector>>,
    ) -> Self {
        let devices = collectors.len();
        Self {
            counts,
            release_after,
            collectors,
            early: RwLock::new(vec![HashSet::new(); devices]),
        }
    }

    /// Number of variables released without batching.
    pub fn num_early(&self) -> usize {
        self.early.read().iter().map(HashSet::len).sum()
    }

    fn mark_early(&self, device: usize, name: &str) {
        if let Some(set) = self.early.write().get_mut(device) {
            set.insert(name.to_string());
        }
    }
}

impl CompletionHook for EagerDeletionHook {
    fn on_op_complete(&self, op: &OpNode, scope: &Scope) -> Result<(), HookError> {
        let Some(names) = self.release_after.get(op.id).filter(|n| !n.is_empty()) else {
            return Ok(());
        };

        let mut batched = Vec::new();
        let mut immediate = Vec::new();
        {
            let early = self.early.read();
            for name in names {
                if self.counts.decrement(op.device, name) != Decrement::ReachedZero {
                    continue;
                }
                let Some(tensor) = scope.find_var(name).and_then(|v| v.take_tensor()) else {
                    continue;
                };
                if early.get(op.device).is_some_and(|set| set.contains(name)) {
                    immediate.push(tensor);
                } else {
                    batched.push(tensor);
                }
            }
        }

        let gc = &self.collectors[op.device];
        gc.release_now(immediate);
        gc.add(batched);
        Ok(())
    }
}

/// Installs an [`EagerDeletionHook`] on `graph`.
///
/// `collectors[i]` must serve `graph.places()[i]`.
pub fn eager_deletion_pass(
    graph: &mut Graph<Validated>,
    plan: &ReferenceCountPlan,
    counts: Arc<AtomicReferenceCountMap>,
    collectors: Vec<Arc<GarbageCollector>>,
) -> Arc<EagerDeletionHook> {
    let hook = Arc::new(EagerDeletionHook::new(
        counts,
        plan.release_after.clone(),
        collectors,
    ));
    graph.install_hook(hook.clone());
    hook
}

/// Lets variables with a single last-live op bypass collector batching.
///
/// Returns the number of variables affected.
pub fn early_delete_pass(plan: &ReferenceCountPlan, hook: &EagerDeletionHook) -> usize {
    for (device, vars) in plan.last_live_ops.iter().enumerate() {
        for (name, ops) in vars {
            if ops.len() == 1 {
                hook.mark_early(device, name);
            }
        }
    }
    let marked = hook.num_early();
    tracing::debug!(marked, "early delete enabled");
    marked
}

// ── Driver ─────────────────────────────────────────────────────────

/// Reference-count state of one prepared graph.
pub struct GcPlan {
    pub static_counts: ReferenceCountMap,
    pub runtime_counts: Arc<AtomicReferenceCountMap>,
    pub hook: Arc<EagerDeletionHook>,
}

impl GcPlan {
    /// Resets the runtime counts for a new step. Names in `excluded` are
    /// not collected during that step.
    pub fn reset<S: AsRef<str>>(&self, excluded: &[S]) {
        self.runtime_counts.reset(&self.static_counts, excluded);
    }
}

impl std::fmt::Debug for GcPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcPlan")
            .field("tracked", &self.static_counts.len())
            .field("early", &self.hook.num_early())
            .finish()
    }
}

/// Runs the collector setup and all GC passes on `graph`, in order.
pub fn prepare_gc_and_ref_counts(
    graph: &mut Graph<Validated>,
    collectors: &mut GarbageCollectorMap,
    options: &GcOptions,
    contexts: Option<&DeviceContextPool>,
) -> Result<GcPlan, MemoryError> {
    let per_device = graph
        .places()
        .iter()
        .map(|&place| {
            collectors.get_or_create(place, options.threshold, options.fast_eager_deletion, contexts)
        })
        .collect::<Result<Vec<_>, _>>()?;
    tracing::info!(
        graph = %graph.name,
        threshold = %options.threshold,
        "garbage collection enabled"
    );

    let plan = reference_count_pass(graph);
    let runtime_counts = Arc::new(AtomicReferenceCountMap::with_keys_of(&plan.static_counts));
    let hook = eager_deletion_pass(graph, &plan, Arc::clone(&runtime_counts), per_device);
    if options.memory_early_delete {
        early_delete_pass(&plan, &hook);
    }

    Ok(GcPlan {
        static_counts: plan.static_counts,
        runtime_counts,
        hook,
    })
}
