// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The execution coordinator.
//!
//! ```text
//! ParallelExecutor::builder(config, &program, &registry)
//!     │  .bcast_vars(..) .loss_var(..) .local_scopes(..)
//!     │  .build(&global_scope)
//!     ▼
//! scopes → [broadcast] → graph(s) → [sequentialize] → [GC passes]
//!     → var infos → executor + scope buffering
//!     │
//!     │  .feed_and_split(..) / .feed_per_device(..)
//!     │  .run(fetch_names, output_slot)
//!     ▼
//!   FetchList in the global scope + StepMetrics
//! ```
//!
//! Every setup decision is made once in `build`; `run` only resets counts,
//! delegates to the executor and publishes the fetched values.

use crate::admission::parallel_graph_admission;
use crate::replicator::Replicator;
use crate::{ExecutorType, Profiler, ReduceStrategy, RuntimeConfig, RuntimeError, StepMetrics};
use device::{CommContextMap, DeviceContextPool};
use graph_executor::{
    ExecutorOptions, FastExecutor, GraphExecutor, ParallelSsaExecutor, ScopeBufferedExecutor,
    ThreadedExecutor,
};
use graph_ir::{
    collect_var_infos, Graph, GraphBuilder, KernelRegistry, ProgramDesc, ReplicatedGraphBuilder,
    Validated, VariableInfo,
};
use memory_manager::{prepare_gc_and_ref_counts, GarbageCollectorMap, GcPlan, GcStats};
use scope::{Scope, VarType};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tensor_core::{Place, Tensor, TensorError};

/// Whether a device scope is deleted when the executor is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeOwnership {
    /// Created here as a kid of the global scope; deleted on drop.
    Owned,
    /// The global scope itself, or a kid of a caller-supplied scope.
    Borrowed,
}

// ── Builder ────────────────────────────────────────────────────────

/// Collects the construction inputs of a [`ParallelExecutor`].
pub struct ParallelExecutorBuilder<'a> {
    config: RuntimeConfig,
    program: &'a ProgramDesc,
    registry: &'a KernelRegistry,
    bcast_vars: Vec<String>,
    loss_var: Option<String>,
    local_scopes: Vec<Scope>,
    graph_builder: &'a dyn GraphBuilder,
}

impl<'a> ParallelExecutorBuilder<'a> {
    /// Variables copied from device 0 to every other device at build time.
    pub fn bcast_vars<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.bcast_vars = names.into_iter().map(Into::into).collect();
        self
    }

    /// Name of the loss variable. Only used for a connectivity warning.
    pub fn loss_var(mut self, name: impl Into<String>) -> Self {
        self.loss_var = Some(name.into());
        self
    }

    /// Caller-owned device scopes, one per place. Each gets a kid that the
    /// executor uses; nothing is broadcast and nothing is deleted on drop.
    pub fn local_scopes(mut self, scopes: Vec<Scope>) -> Self {
        self.local_scopes = scopes;
        self
    }

    /// Replaces the default [`ReplicatedGraphBuilder`].
    pub fn graph_builder(mut self, builder: &'a dyn GraphBuilder) -> Self {
        self.graph_builder = builder;
        self
    }

    /// Builds the executor on top of `global_scope`.
    ///
    /// Steps:
    /// 1. Validate the configuration and the program.
    /// 2. Set up device scopes.
    /// 3. Create device contexts and communicators for accelerators.
    /// 4. Broadcast `bcast_vars` from device 0.
    /// 5. Build one shared graph, or one graph per device when admitted.
    /// 6. Prepare reference counts and collectors when eager deletion is on.
    /// 7. Collect variable infos and select the executor.
    ///
    /// When a step after 2 fails, the scopes created in 2 are deleted.
    pub fn build<'s>(self, global_scope: &'s Scope) -> Result<ParallelExecutor<'s>, RuntimeError> {
        let mut config = self.config.clone();
        config.build.apply_env();
        config.validate()?;
        self.program.validate()?;

        let places = config.places.clone();
        if !self.local_scopes.is_empty() && self.local_scopes.len() != places.len() {
            return Err(RuntimeError::Config(format!(
                "{} local scopes supplied for {} places",
                self.local_scopes.len(),
                places.len()
            )));
        }
        tracing::info!(
            program = %self.program.name,
            devices = places.len(),
            executor = ?config.execution.executor_type,
            "building parallel executor"
        );

        // Scopes. `created` pairs every new kid with its parent.
        let external = !self.local_scopes.is_empty();
        let mut created = Vec::new();
        let (local_scopes, ownership) = if external {
            let kids: Vec<Scope> = self.local_scopes.iter().map(Scope::new_scope).collect();
            created.extend(self.local_scopes.iter().cloned().zip(kids.iter().cloned()));
            (kids, vec![ScopeOwnership::Borrowed; places.len()])
        } else {
            let mut scopes = vec![global_scope.clone()];
            let mut ownership = vec![ScopeOwnership::Borrowed];
            for _ in 1..places.len() {
                let kid = global_scope.new_scope();
                created.push((global_scope.clone(), kid.clone()));
                scopes.push(kid);
                ownership.push(ScopeOwnership::Owned);
            }
            (scopes, ownership)
        };

        let parts = match self.assemble(&config, &local_scopes, external) {
            Ok(parts) => parts,
            Err(e) => {
                for (parent, kid) in &created {
                    parent.delete_scope(kid);
                }
                return Err(e);
            }
        };

        Ok(ParallelExecutor {
            global_scope,
            local_scopes,
            ownership,
            places,
            config,
            contexts: parts.contexts,
            comms: parts.comms,
            collectors: parts.collectors,
            gc_plans: parts.gc_plans,
            executor: parts.executor,
            profiler: parts.profiler,
        })
    }

    /// Everything after scope setup.
    fn assemble(
        &self,
        config: &RuntimeConfig,
        local_scopes: &[Scope],
        external: bool,
    ) -> Result<Parts, RuntimeError> {
        let places = &config.places;
        let exec = &config.execution;
        let build = &config.build;

        // Devices.
        let (contexts, comms) = if exec.use_accel {
            let contexts = Arc::new(DeviceContextPool::new(places)?);
            let comms = CommContextMap::new(places, build.trainer_id, build.num_trainers)?;
            tracing::info!(nranks = comms.nranks(), "communicators created");
            (Some(contexts), Some(comms))
        } else {
            (None, None)
        };

        if places.len() > 1 && !external {
            let replicator = Replicator::new(
                local_scopes,
                comms.as_ref(),
                build.reduce == ReduceStrategy::AllReduce,
                exec.use_accel,
            );
            replicator.broadcast(&self.bcast_vars)?;
        }

        // Graphs.
        let admission = parallel_graph_admission(self.program, exec, build);
        tracing::info!(
            enabled = admission.enabled,
            reason = admission.reason,
            "parallel graph mode"
        );
        let mut graphs: Vec<Graph<Validated>> = if admission.enabled {
            places
                .iter()
                .map(|&place| self.graph_builder.build(self.program, &[place], self.registry))
                .collect::<Result<_, _>>()?
        } else {
            vec![self.graph_builder.build(self.program, places, self.registry)?]
        };
        tracing::debug!(builder = self.graph_builder.name(), graphs = graphs.len(), "graphs built");

        if build.enable_sequential_execution {
            graphs = graphs
                .into_iter()
                .map(|graph| graph.sequentialize())
                .collect::<Result<_, _>>()?;
            tracing::info!("sequential execution enforced");
        }

        // Eager deletion.
        let mut collectors = GarbageCollectorMap::new();
        let mut gc_plans = Vec::new();
        if let Some(options) = build.gc_options()? {
            for graph in &mut graphs {
                gc_plans.push(prepare_gc_and_ref_counts(
                    graph,
                    &mut collectors,
                    &options,
                    contexts.as_deref(),
                )?);
            }
        } else {
            tracing::debug!("eager deletion disabled");
        }

        let var_infos = collect_var_infos(graphs.iter());

        if let Some(loss) = &self.loss_var {
            if !admission.enabled && graphs[0].connected_components(Some(0)) > 1 {
                tracing::warn!(
                    loss = %loss,
                    "program has more than one connected component; \
                     ops unrelated to the loss also run every step"
                );
            }
        }

        // Executor.
        let profiler = Profiler::global();
        let options = ExecutorOptions {
            num_threads: exec.resolve_threads(),
            contexts: contexts.clone(),
            op_timer: profiler.as_ref().map(Profiler::timer),
        };
        let inner = if admission.enabled {
            GraphExecutor::Parallel(ParallelSsaExecutor::new(graphs, options))
        } else {
            let graph = graphs.remove(0);
            match exec.executor_type {
                ExecutorType::Default => GraphExecutor::Threaded(ThreadedExecutor::new(graph, options)?),
                ExecutorType::Fast | ExecutorType::Experimental => {
                    GraphExecutor::Fast(FastExecutor::new(graph, options))
                }
            }
        };
        tracing::info!(
            executor = inner.name(),
            ops = inner.num_ops(),
            vars = var_infos.len(),
            threads = exec.resolve_threads(),
            "executor ready"
        );
        let executor = ScopeBufferedExecutor::new(
            inner,
            local_scopes.to_vec(),
            var_infos,
            exec.num_iteration_per_drop_scope,
            contexts.clone(),
        );

        Ok(Parts {
            contexts,
            comms,
            collectors,
            gc_plans,
            executor,
            profiler,
        })
    }
}

/// Build products other than the scopes.
struct Parts {
    contexts: Option<Arc<DeviceContextPool>>,
    comms: Option<CommContextMap>,
    collectors: GarbageCollectorMap,
    gc_plans: Vec<GcPlan>,
    executor: ScopeBufferedExecutor,
    profiler: Option<Arc<Profiler>>,
}

// ── Executor ───────────────────────────────────────────────────────

/// Runs one program across several devices.
///
/// # Example
/// ```
/// use graph_ir::{KernelContext, KernelError, KernelRegistry, OpDesc, ProgramDesc, VarDesc};
/// use runtime::{ParallelExecutor, RuntimeConfig};
/// use scope::Scope;
/// use std::collections::HashMap;
/// use tensor_core::{Shape, Tensor};
///
/// # fn main() -> Result<(), runtime::RuntimeError> {
/// let mut registry = KernelRegistry::new();
/// registry.register("double", |ctx: &mut KernelContext| -> Result<(), KernelError> {
///     let x = ctx.input(0)?;
///     let y: Vec<f32> = x.to_f32_vec()?.iter().map(|v| v * 2.0).collect();
///     ctx.set_output(0, Tensor::from_f32(x.shape().clone(), &y)?)
/// });
/// let program = ProgramDesc::new(
///     "double",
///     vec![VarDesc::tensor("x"), VarDesc::tensor("y")],
///     vec![OpDesc::new("double", ["x"], ["y"])],
/// );
///
/// let global = Scope::new();
/// let mut pe = ParallelExecutor::builder(RuntimeConfig::cpu(2), &program, &registry)
///     .build(&global)?;
/// let x = Tensor::from_f32(Shape::new(vec![4, 1]), &[1.0, 2.0, 3.0, 4.0])?;
/// pe.feed_and_split(&HashMap::from([("x".to_string(), x)]))?;
/// pe.run(&["y"], "fetch")?;
/// let out = global.get_var("fetch")?.fetch_list()?;
/// assert_eq!(out[0].to_f32_vec()?, vec![2.0, 4.0, 6.0, 8.0]);
/// # Ok(())
/// # }
/// ```
pub struct ParallelExecutor<'s> {
    global_scope: &'s Scope,
    local_scopes: Vec<Scope>,
    ownership: Vec<ScopeOwnership>,
    places: Vec<Place>,
    config: RuntimeConfig,
    contexts: Option<Arc<DeviceContextPool>>,
    comms: Option<CommContextMap>,
    collectors: GarbageCollectorMap,
    gc_plans: Vec<GcPlan>,
    executor: ScopeBufferedExecutor,
    profiler: Option<Arc<Profiler>>,
}

impl<'s> ParallelExecutor<'s> {
    /// Starts building an executor for `program` with `config`.
    pub fn builder<'a>(
        config: RuntimeConfig,
        program: &'a ProgramDesc,
        registry: &'a KernelRegistry,
    ) -> ParallelExecutorBuilder<'a> {
        ParallelExecutorBuilder {
            config,
            program,
            registry,
            bcast_vars: Vec::new(),
            loss_var: None,
            local_scopes: Vec::new(),
            graph_builder: &ReplicatedGraphBuilder,
        }
    }

    /// Runs one call's worth of steps and writes the fetched values, merged
    /// across devices, into `output_slot` of the global scope.
    ///
    /// Fetched names and `output_slot` are never collected during the call.
    /// A failed step leaves the executor usable.
    pub fn run<S: AsRef<str>>(
        &mut self,
        fetch_names: &[S],
        output_slot: &str,
    ) -> Result<StepMetrics, RuntimeError> {
        let start = Instant::now();
        if let Some(profiler) = &self.profiler {
            profiler.flush()?;
        }
        let gc_before = self.collectors.stats();

        let mut excluded: Vec<&str> = fetch_names.iter().map(AsRef::as_ref).collect();
        excluded.push(output_slot);

        let iterations = self.config.execution.num_iteration_per_run.max(1);
        let mut ops_run = 0;
        let mut fetches = Vec::new();
        for _ in 0..iterations {
            for plan in &self.gc_plans {
                plan.reset(&excluded);
            }
            let step = self.executor.run(fetch_names)?;
            ops_run += step.ops_run;
            fetches = step.fetches;
        }

        let metrics = StepMetrics {
            duration: start.elapsed(),
            iterations,
            ops_run,
            fetched: fetches.len(),
            gc: self.collectors.stats().since(&gc_before),
        };
        self.global_scope
            .var(output_slot, VarType::FetchList)
            .set_fetch_list(fetches);
        tracing::debug!(
            ops_run,
            iterations,
            elapsed_us = metrics.duration.as_micros() as u64,
            "run finished"
        );
        Ok(metrics)
    }

    /// Feeds one map per device. Tensors are shared, not copied.
    pub fn feed_per_device(&self, feeds: &[HashMap<String, Tensor>]) -> Result<(), RuntimeError> {
        if feeds.len() != self.local_scopes.len() {
            return Err(RuntimeError::Config(format!(
                "{} feed maps for {} devices",
                feeds.len(),
                self.local_scopes.len()
            )));
        }
        for (scope, feed) in self.local_scopes.iter().zip(feeds) {
            for (name, tensor) in feed {
                scope.var(name, VarType::LodTensor).set_tensor(tensor.share_data_with());
            }
        }
        tracing::trace!(devices = feeds.len(), "fed per device");
        Ok(())
    }

    /// Splits every tensor along its batch dimension and feeds shard `i`
    /// to device `i`. Nothing is written unless every tensor splits into
    /// one shard per device.
    pub fn feed_and_split(&self, feed: &HashMap<String, Tensor>) -> Result<(), RuntimeError> {
        let devices = self.places.len();
        let mut split = Vec::with_capacity(feed.len());
        for (name, tensor) in feed {
            let shards = tensor.split_batch(&self.places)?;
            if shards.len() < devices {
                return Err(TensorError::NotEnoughSamples {
                    batch: tensor.batch_size()?,
                    devices,
                }
                .into());
            }
            split.push((name, shards));
        }

        for (name, shards) in split {
            for (scope, shard) in self.local_scopes.iter().zip(shards) {
                scope.var(name, VarType::LodTensor).set_tensor(shard);
            }
        }
        tracing::trace!(vars = feed.len(), devices, "fed and split");
        Ok(())
    }

    /// Device scopes in place order.
    pub fn local_scopes(&self) -> &[Scope] {
        &self.local_scopes
    }

    pub fn places(&self) -> &[Place] {
        &self.places
    }

    /// The effective configuration, after environment overrides.
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// The selected executor.
    pub fn executor(&self) -> &GraphExecutor {
        self.executor.inner()
    }

    pub fn var_infos(&self) -> &[VariableInfo] {
        self.executor.var_infos()
    }

    /// Reference-count state per graph; empty when eager deletion is off.
    pub fn gc_plans(&self) -> &[GcPlan] {
        &self.gc_plans
    }

    /// Cumulative statistics of every collector.
    pub fn gc_stats(&self) -> GcStats {
        self.collectors.stats()
    }

    pub fn comms(&self) -> Option<&CommContextMap> {
        self.comms.as_ref()
    }

    /// Returns a human-readable summary suitable for CLI output.
    pub fn summary(&self) -> String {
        let places: Vec<String> = self.places.iter().map(ToString::to_string).collect();
        format!(
            "ParallelExecutor: {} executor, {} ops, {} vars on [{}], GC {}",
            self.executor().name(),
            self.executor().num_ops(),
            self.var_infos().len(),
            places.join(", "),
            if self.gc_plans.is_empty() { "off" } else { "on" },
        )
    }
}

impl Drop for ParallelExecutor<'_> {
    fn drop(&mut self) {
        if let Some(contexts) = &self.contexts {
            if let Err(e) = contexts.wait_all() {
                tracing::warn!("device wait failed during teardown: {e}");
            }
        }
        if let Err(e) = self.executor.drop_local_exec_scopes() {
            tracing::warn!("dropping exec scopes failed: {e}");
        }
        for (scope, ownership) in self.local_scopes.iter().zip(&self.ownership) {
            if *ownership == ScopeOwnership::Owned {
                self.global_scope.delete_scope(scope);
            }
        }
        tracing::debug!("parallel executor dropped");
    }
}

impl std::fmt::Debug for ParallelExecutor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelExecutor")
            .field("places", &self.places)
            .field("executor", &self.executor().name())
            .field("ownership", &self.ownership)
            .field("gc_plans", &self.gc_plans)
            .finish()
    }
}
