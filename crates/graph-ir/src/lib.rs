// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # graph-ir
//!
//! The dataflow representation the executors run:
//!
//! - [`ProgramDesc`]: a device-independent list of variables and operators,
//!   loaded from JSON.
//! - [`Graph`]: the SSA dependency graph with a **type-state pattern**
//!   (`Built` → `Validated`). Variable nodes are versioned per device;
//!   control-only variable nodes carry write-after-read ordering.
//! - [`OpKernel`] / [`KernelRegistry`]: the computation behind each op type.
//! - [`GraphBuilder`] / [`ReplicatedGraphBuilder`]: program → graph.
//! - [`VariableInfo`]: what must exist in a scope before a step runs.
//! - [`CompletionHook`]: callbacks the executors invoke after each op.
//!
//! # Example
//! ```
//! use graph_ir::{GraphBuilder, KernelRegistry, ProgramDesc, ReplicatedGraphBuilder};
//! use tensor_core::Place;
//!
//! let program = ProgramDesc::from_json(r#"{
//!     "vars": [{ "name": "x" }, { "name": "y" }],
//!     "ops": [{ "type": "copy", "inputs": ["x"], "outputs": ["y"] }]
//! }"#).unwrap();
//!
//! let mut registry = KernelRegistry::new();
//! registry.register("copy", |ctx: &mut graph_ir::KernelContext| -> Result<(), graph_ir::KernelError> {
//!     let x = ctx.input(0)?;
//!     ctx.set_output(0, x)
//! });
//!
//! let graph = ReplicatedGraphBuilder
//!     .build(&program, &[Place::Cpu, Place::Cpu], &registry)
//!     .unwrap();
//! assert_eq!(graph.num_ops(), 2);
//! ```

mod builder;
mod error;
pub mod graph;
mod kernel;
mod program;
mod var_info;

pub use builder::{GraphBuilder, ReplicatedGraphBuilder};
pub use error::GraphError;
pub use graph::{
    Built, CompletionHook, Graph, GraphState, HookError, OpId, OpNode, Validated, VarId, VarKind,
    VarNode,
};
pub use kernel::{Attrs, KernelContext, KernelError, KernelRegistry, OpKernel};
pub use program::{OpDesc, ProgramDesc, VarDesc};
pub use var_info::{collect_var_infos, VariableInfo};
