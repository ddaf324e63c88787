// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Work-stealing executor.
//!
//! Each worker owns a LIFO deque. Newly ready dependents are pushed onto the
//! local deque of the worker that completed their last dependency, so a
//! chain of ops tends to stay on one thread. Idle workers steal from the
//! global injector first, then from each other. Pending counts are atomic;
//! no lock guards the ready set.
//!
//! A worker that finds nothing to run parks on a condvar. It is woken when
//! another worker holds surplus work in its deque, when the step completes,
//! or when an op fails.
//!
//! # When to use
//! - Wide graphs with many short ops, where a single queue lock would be
//!   contended.

use crate::runner::OpRunner;
use crate::{ExecutorError, ExecutorOptions};
use crossbeam_deque::{Injector, Stealer, Worker};
use graph_ir::{Graph, OpId, Validated};
use parking_lot::{Condvar, Mutex};
use scope::Scope;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Parking lot for idle workers.
///
/// `epoch` moves on every wake. A worker samples it before looking for
/// work and only sleeps if it has not moved since, so a wake issued
/// between a failed search and the wait is never lost.
#[derive(Default)]
struct Idle {
    epoch: AtomicUsize,
    sleepers: AtomicUsize,
    lock: Mutex<()>,
    wakeup: Condvar,
}

impl Idle {
    fn epoch(&self) -> usize {
        self.epoch.load(Ordering::SeqCst)
    }

    fn park(&self, seen: usize) {
        let mut guard = self.lock.lock();
        self.sleepers.fetch_add(1, Ordering::SeqCst);
        if self.epoch.load(Ordering::SeqCst) == seen {
            self.wakeup.wait(&mut guard);
        }
        self.sleepers.fetch_sub(1, Ordering::SeqCst);
    }

    fn wake(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        if self.sleepers.load(Ordering::SeqCst) > 0 {
            let _guard = self.lock.lock();
            self.wakeup.notify_all();
        }
    }
}

/// Runs one graph on scoped worker threads with work stealing.
#[derive(Debug)]
pub struct FastExecutor {
    graph: Graph<Validated>,
    options: ExecutorOptions,
}

impl FastExecutor {
    pub fn new(graph: Graph<Validated>, options: ExecutorOptions) -> Self {
        tracing::debug!(graph = %graph.name, threads = options.threads(), "fast executor created");
        Self { graph, options }
    }

    pub fn graph(&self) -> &Graph<Validated> {
        &self.graph
    }

    /// Runs every op once. Returns the number of ops run.
    pub fn run_ops(&self, scopes: &[Scope]) -> Result<usize, ExecutorError> {
        let runner = OpRunner::new(&self.graph, scopes, &self.options)?;
        let total = self.graph.num_ops();

        let injector = Injector::new();
        for id in self.graph.initial_ready() {
            injector.push(id);
        }
        let pending: Vec<AtomicUsize> = self
            .graph
            .pending_counts()
            .into_iter()
            .map(AtomicUsize::new)
            .collect();
        let remaining = AtomicUsize::new(total);
        let failed = AtomicBool::new(false);
        let error = Mutex::new(None);
        let idle = Idle::default();

        let workers: Vec<Worker<OpId>> = (0..self.options.threads().min(total).max(1))
            .map(|_| Worker::new_lifo())
            .collect();
        let stealers: Vec<Stealer<OpId>> = workers.iter().map(Worker::stealer).collect();

        std::thread::scope(|s| {
            for local in workers {
                let (runner, injector, stealers, idle) = (&runner, &injector, &stealers, &idle);
                let (pending, remaining, failed, error) = (&pending, &remaining, &failed, &error);
                s.spawn(move || loop {
                    let seen = idle.epoch();
                    if failed.load(Ordering::Acquire) || remaining.load(Ordering::Acquire) == 0 {
                        break;
                    }
                    let Some(id) = find_task(&local, injector, stealers) else {
                        idle.park(seen);
                        continue;
                    };
                    // Leftovers in the local deque can be stolen.
                    if !local.is_empty() {
                        idle.wake();
                    }
                    match runner.run(id) {
                        Ok(()) => {
                            for &next in runner.graph().dependents(id) {
                                if pending[next].fetch_sub(1, Ordering::AcqRel) == 1 {
                                    local.push(next);
                                }
                            }
                            if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                                idle.wake();
                            }
                        }
                        Err(e) => {
                            tracing::debug!(error = %e, "op failed, stopping workers");
                            error.lock().get_or_insert(e);
                            failed.store(true, Ordering::Release);
                            idle.wake();
                        }
                    }
                });
            }
        });

        if let Some(e) = error.into_inner() {
            return Err(e);
        }
        Ok(total - remaining.into_inner())
    }
}

/// Local deque first, then a batch from the injector, then the other
/// workers.
fn find_task<T>(local: &Worker<T>, global: &Injector<T>, stealers: &[Stealer<T>]) -> Option<T> {
    local.pop().or_else(|| {
        std::iter::repeat_with(|| {
            global
                .steal_batch_and_pop(local)
                .or_else(|| stealers.iter().map(Stealer::steal).collect())
        })
        .find(|s| !s.is_retry())
        .and_then(|s| s.success())
    })
}
