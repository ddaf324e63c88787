// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Runtime configuration loaded from TOML files or constructed programmatically.
//!
//! # TOML Format
//! ```toml
//! places = ["accel:0", "accel:1"]
//!
//! [execution]
//! executor_type = "fast"
//! num_threads = 4
//! use_accel = true
//! num_iteration_per_drop_scope = 10
//!
//! [build]
//! reduce = "all_reduce"
//! eager_delete_threshold = "64M"
//! memory_early_delete = true
//! ```

use crate::RuntimeError;
use memory_manager::{GcOptions, MemoryBudget};
use std::path::Path;
use tensor_core::Place;

/// Opt-in for one-graph-per-device execution, applied to
/// [`BuildStrategy::enable_parallel_graph`].
pub const ENABLE_PARALLEL_GRAPH_ENV: &str = "PE_ENABLE_PARALLEL_GRAPH";

/// Which scheduler runs a shared graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorType {
    /// Thread pool with one shared FIFO ready queue.
    #[default]
    Default,
    /// Work-stealing workers.
    Fast,
    /// Reserved for experimental schedulers; runs like [`ExecutorType::Fast`]
    /// but disables parallel-graph mode.
    Experimental,
}

/// How gradients are combined across devices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReduceStrategy {
    #[default]
    AllReduce,
    Reduce,
}

/// How a step is executed.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ExecutionStrategy {
    pub executor_type: ExecutorType,
    /// Worker threads; `0` uses the available parallelism.
    pub num_threads: usize,
    /// Run on accelerator places.
    pub use_accel: bool,
    /// Steps an exec scope is kept before it is dropped.
    pub num_iteration_per_drop_scope: usize,
    /// Executor steps per call to `run`; fetches come from the last one.
    pub num_iteration_per_run: usize,
}

impl Default for ExecutionStrategy {
    fn default() -> Self {
        Self {
            executor_type: ExecutorType::Default,
            num_threads: 0,
            use_accel: false,
            num_iteration_per_drop_scope: 100,
            num_iteration_per_run: 1,
        }
    }
}

impl ExecutionStrategy {
    /// Resolves the number of worker threads.
    pub fn resolve_threads(&self) -> usize {
        if self.num_threads > 0 {
            return self.num_threads;
        }
        std::thread::available_parallelism().map_or(1, |n| n.get())
    }
}

/// How the graph is built and which passes run on it.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct BuildStrategy {
    pub reduce: ReduceStrategy,
    /// Garbage-collector threshold (`"0"`, `"64M"`, ...). `None` disables
    /// eager deletion.
    pub eager_delete_threshold: Option<String>,
    /// Release accelerator memory without waiting for the device.
    pub fast_eager_deletion: bool,
    pub memory_early_delete: bool,
    pub enable_sequential_execution: bool,
    pub enable_parallel_graph: bool,
    pub trainer_id: usize,
    pub num_trainers: usize,
}

impl Default for BuildStrategy {
    fn default() -> Self {
        Self {
            reduce: ReduceStrategy::AllReduce,
            eager_delete_threshold: None,
            fast_eager_deletion: true,
            memory_early_delete: false,
            enable_sequential_execution: false,
            enable_parallel_graph: false,
            trainer_id: 0,
            num_trainers: 1,
        }
    }
}

impl BuildStrategy {
    /// Garbage-collection options, or `None` when eager deletion is off.
    pub fn gc_options(&self) -> Result<Option<GcOptions>, RuntimeError> {
        let Some(threshold) = &self.eager_delete_threshold else {
            return Ok(None);
        };
        let threshold = MemoryBudget::parse(threshold)
            .map_err(|e| RuntimeError::Config(format!("invalid eager_delete_threshold: {e}")))?;
        Ok(Some(GcOptions {
            threshold,
            fast_eager_deletion: self.fast_eager_deletion,
            memory_early_delete: self.memory_early_delete,
        }))
    }

    /// Applies `PE_ENABLE_PARALLEL_GRAPH` if it is set. Accepts
    /// `1`/`true`/`on` and `0`/`false`/`off`; anything else is ignored with
    /// a warning.
    pub fn apply_env(&mut self) {
        if let Ok(value) = std::env::var(ENABLE_PARALLEL_GRAPH_ENV) {
            match parse_flag(&value) {
                Some(flag) => self.enable_parallel_graph = flag,
                None => tracing::warn!(
                    var = ENABLE_PARALLEL_GRAPH_ENV,
                    value = %value,
                    "ignoring unrecognised flag value"
                ),
            }
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" | "" => Some(false),
        _ => None,
    }
}

/// Configuration for the execution engine.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RuntimeConfig {
    /// Devices in rank order (`"cpu"`, `"accel:N"`).
    pub places: Vec<Place>,
    #[serde(default)]
    pub execution: ExecutionStrategy,
    #[serde(default)]
    pub build: BuildStrategy,
}

impl RuntimeConfig {
    /// `n` host devices with default strategies.
    pub fn cpu(n: usize) -> Self {
        Self {
            places: vec![Place::Cpu; n],
            execution: ExecutionStrategy::default(),
            build: BuildStrategy::default(),
        }
    }

    /// `n` accelerators `accel:0..n` with accelerator execution enabled.
    pub fn accel(n: usize) -> Self {
        Self {
            places: (0..n).map(Place::Accel).collect(),
            execution: ExecutionStrategy {
                use_accel: true,
                ..ExecutionStrategy::default()
            },
            build: BuildStrategy::default(),
        }
    }

    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, RuntimeError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RuntimeError::Config(format!("cannot read config '{}': {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, RuntimeError> {
        toml::from_str(toml_str).map_err(|e| RuntimeError::Config(format!("TOML parse error: {e}")))
    }

    /// Serialises configuration to TOML.
    pub fn to_toml(&self) -> Result<String, RuntimeError> {
        toml::to_string_pretty(self)
            .map_err(|e| RuntimeError::Config(format!("TOML serialise error: {e}")))
    }

    /// Checks the settings against each other.
    ///
    /// # Checks
    /// - At least one place.
    /// - `Reduce` needs more than one place.
    /// - `use_accel` holds exactly when every place is an accelerator, and
    ///   the accelerator backend is compiled in.
    /// - The eager-deletion threshold parses.
    pub fn validate(&self) -> Result<(), RuntimeError> {
        if self.places.is_empty() {
            return Err(RuntimeError::Config("at least one place is required".into()));
        }
        if self.build.reduce == ReduceStrategy::Reduce && self.places.len() == 1 {
            return Err(RuntimeError::Config(
                "the reduce strategy needs more than one place".into(),
            ));
        }
        let all_accel = self.places.iter().all(Place::is_accel);
        let any_accel = self.places.iter().any(Place::is_accel);
        if self.execution.use_accel {
            if !all_accel {
                return Err(RuntimeError::Config(
                    "use_accel requires every place to be an accelerator".into(),
                ));
            }
            for &place in &self.places {
                device::ensure_supported(place)?;
            }
        } else if any_accel {
            return Err(RuntimeError::Config(
                "accelerator places require execution.use_accel".into(),
            ));
        }
        self.build.gc_options()?;
        Ok(())
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::cpu(1)
    }
}
