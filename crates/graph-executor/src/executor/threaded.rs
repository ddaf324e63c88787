// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Thread-pool executor with one shared ready queue.
//!
//! Ops whose dependencies are all satisfied sit in a single FIFO queue
//! behind a mutex. Every completion decrements the pending counts of the
//! op's dependents, appends the ones that reach zero, and drains the queue
//! into the pool.
//!
//! # When to use
//! - The default. Scheduling order is predictable (FIFO by readiness),
//!   which makes logs and profiles easy to read.

use crate::runner::OpRunner;
use crate::{ExecutorError, ExecutorOptions};
use graph_ir::{Graph, OpId, Validated};
use parking_lot::Mutex;
use scope::Scope;
use std::collections::VecDeque;

struct ReadyQueue {
    ready: VecDeque<OpId>,
    pending: Vec<usize>,
    completed: usize,
    failed: Option<ExecutorError>,
}

struct Shared<'a> {
    runner: OpRunner<'a>,
    queue: Mutex<ReadyQueue>,
}

/// Runs one graph on a `rayon` pool.
pub struct ThreadedExecutor {
    graph: Graph<Validated>,
    pool: rayon::ThreadPool,
    options: ExecutorOptions,
}

impl ThreadedExecutor {
    pub fn new(graph: Graph<Validated>, options: ExecutorOptions) -> Result<Self, ExecutorError> {
        let threads = options.threads();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("pe-worker-{i}"))
            .build()?;
        tracing::debug!(graph = %graph.name, threads, "threaded executor created");
        Ok(Self {
            graph,
            pool,
            options,
        })
    }

    pub fn graph(&self) -> &Graph<Validated> {
        &self.graph
    }

    /// Runs every op once. Returns the number of ops run.
    pub fn run_ops(&self, scopes: &[Scope]) -> Result<usize, ExecutorError> {
        let runner = OpRunner::new(&self.graph, scopes, &self.options)?;
        let shared = Shared {
            runner,
            queue: Mutex::new(ReadyQueue {
                ready: self.graph.initial_ready().into(),
                pending: self.graph.pending_counts(),
                completed: 0,
                failed: None,
            }),
        };

        self.pool.scope(|s| schedule(s, &shared));

        let queue = shared.queue.into_inner();
        if let Some(e) = queue.failed {
            return Err(e);
        }
        let total = self.graph.num_ops();
        if queue.completed != total {
            return Err(ExecutorError::Stalled {
                completed: queue.completed,
                total,
            });
        }
        Ok(total)
    }
}

/// Moves every queued op into the pool. Stops feeding once a failure has
/// been recorded; ops already spawned still finish.
fn schedule<'s>(s: &rayon::Scope<'s>, shared: &'s Shared<'s>) {
    let batch: Vec<OpId> = {
        let mut queue = shared.queue.lock();
        if queue.failed.is_some() {
            queue.ready.clear();
            return;
        }
        queue.ready.drain(..).collect()
    };

    for id in batch {
        s.spawn(move |s| {
            let result = shared.runner.run(id);
            {
                let mut queue = shared.queue.lock();
                match result {
                    Ok(()) => {
                        queue.completed += 1;
                        for &next in shared.runner.graph().dependents(id) {
                            queue.pending[next] -= 1;
                            if queue.pending[next] == 0 {
                                queue.ready.push_back(next);
                            }
                        }
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "op failed, draining in-flight ops");
                        queue.failed.get_or_insert(e);
                    }
                }
            }
            schedule(s, shared);
        });
    }
}

impl std::fmt::Debug for ThreadedExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadedExecutor")
            .field("graph", &self.graph.name)
            .field("threads", &self.pool.current_num_threads())
            .finish()
    }
}
