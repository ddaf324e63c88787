// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # graph-executor
//!
//! Runs a validated SSA graph: every op once per step, after the ops it
//! depends on, concurrently where the graph allows.
//!
//! # Variants
//!
//! | Variant | Ready set | Graphs |
//! |---|---|---|
//! | [`ThreadedExecutor`] | one FIFO queue behind a mutex, `rayon` pool | one shared |
//! | [`FastExecutor`] | per-worker deques with stealing (`crossbeam-deque`) | one shared |
//! | [`ParallelSsaExecutor`] | one [`FastExecutor`] per device | one per device |
//!
//! The coordinator picks one variant once, wraps it in a [`GraphExecutor`]
//! and then in a [`ScopeBufferedExecutor`], which owns the per-step exec
//! scopes and merges fetched values across devices.
//!
//! # Op lifecycle
//!
//! ```text
//! ready ──► kernel (host thread, or device stream for accelerator ops)
//!       ──► op timer
//!       ──► completion hooks (eager deletion)
//!       ──► dependents' pending counts decremented
//! ```
//!
//! # Example
//! ```
//! use graph_executor::{ExecutorOptions, GraphExecutor, ThreadedExecutor};
//! use graph_ir::{GraphBuilder, KernelContext, KernelError, KernelRegistry, ProgramDesc, ReplicatedGraphBuilder};
//! use scope::{Scope, VarType};
//! use tensor_core::{Place, Shape, Tensor};
//!
//! let program = ProgramDesc::from_json(r#"{
//!     "vars": [{ "name": "x" }, { "name": "y" }],
//!     "ops": [{ "type": "copy", "inputs": ["x"], "outputs": ["y"] }]
//! }"#).unwrap();
//! let mut registry = KernelRegistry::new();
//! registry.register("copy", |ctx: &mut KernelContext| -> Result<(), KernelError> {
//!     let x = ctx.input(0)?;
//!     ctx.set_output(0, x)
//! });
//! let graph = ReplicatedGraphBuilder.build(&program, &[Place::Cpu], &registry).unwrap();
//! let exec = GraphExecutor::Threaded(ThreadedExecutor::new(graph, ExecutorOptions::default()).unwrap());
//!
//! let scope = Scope::new();
//! scope.var("x", VarType::LodTensor).set_tensor(Tensor::from_f32(Shape::vector(1), &[7.0]).unwrap());
//! let out = exec.run(&[scope], &["y"]).unwrap();
//! assert_eq!(out.fetches[0][0].to_f32_vec().unwrap(), vec![7.0]);
//! ```

mod error;
pub mod executor;
mod runner;
mod scope_buffered;
#[cfg(test)]
mod testing;

pub use error::ExecutorError;
pub use executor::{FastExecutor, GraphExecutor, ParallelSsaExecutor, StepOutput, ThreadedExecutor};
pub use runner::{ExecutorOptions, OpTimer};
pub use scope_buffered::{BufferedOutput, ScopeBufferedExecutor};
