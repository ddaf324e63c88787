// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Program → graph construction.

use crate::{
    Attrs, Graph, GraphError, KernelRegistry, OpKernel, ProgramDesc, Validated, VarId,
};
use std::collections::HashMap;
use std::sync::Arc;
use tensor_core::Place;

/// Turns a program into an executable graph over a set of places.
pub trait GraphBuilder: Send + Sync {
    /// Human-readable builder name, for logs.
    fn name(&self) -> &str;

    fn build(
        &self,
        program: &ProgramDesc,
        places: &[Place],
        registry: &KernelRegistry,
    ) -> Result<Graph<Validated>, GraphError>;
}

/// Replicates every op once per place, in program order.
///
/// Within a device, each write creates a new SSA version of the variable.
/// An op that overwrites a variable is ordered after every reader of the
/// previous version (and after its writer if nobody read it), so no reader
/// ever observes a partially written input. Replicas share no edges.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplicatedGraphBuilder;

impl GraphBuilder for ReplicatedGraphBuilder {
    fn name(&self) -> &str {
        "replicated"
    }

    fn build(
        &self,
        program: &ProgramDesc,
        places: &[Place],
        registry: &KernelRegistry,
    ) -> Result<Graph<Validated>, GraphError> {
        program.validate()?;

        let kernels = program
            .ops
            .iter()
            .map(|op| {
                registry
                    .get(&op.op_type)
                    .ok_or_else(|| GraphError::KernelNotFound {
                        op_type: op.op_type.clone(),
                    })
            })
            .collect::<Result<Vec<Arc<dyn OpKernel>>, _>>()?;
        let attrs: Vec<Arc<Attrs>> = program
            .ops
            .iter()
            .map(|op| Arc::new(op.attrs.clone()))
            .collect();

        let mut graph = Graph::new(program.name.clone(), places.to_vec());
        for device in 0..places.len() {
            let mut latest: HashMap<&str, VarId> = HashMap::new();

            for (i, op) in program.ops.iter().enumerate() {
                let mut inputs = Vec::with_capacity(op.inputs.len());
                for name in &op.inputs {
                    let id = match latest.get(name.as_str()) {
                        Some(&id) => id,
                        None => {
                            let desc = lookup(program, name)?;
                            let id = graph.add_var(name, device, 0, desc.var_type, desc.persistable);
                            latest.insert(name, id);
                            id
                        }
                    };
                    inputs.push(id);
                }

                let mut order_after = Vec::new();
                let mut outputs = Vec::with_capacity(op.outputs.len());
                for name in &op.outputs {
                    let version = match latest.get(name.as_str()) {
                        Some(&prev) => {
                            let node = graph.var(prev);
                            order_after.extend(node.readers.iter().copied());
                            if node.readers.is_empty() {
                                order_after.extend(node.generator);
                            }
                            node.version + 1
                        }
                        None => 0,
                    };
                    let desc = lookup(program, name)?;
                    let id = graph.add_var(name, device, version, desc.var_type, desc.persistable);
                    latest.insert(name, id);
                    outputs.push(id);
                }

                let op_id = graph.add_op(
                    &op.op_type,
                    device,
                    inputs,
                    outputs,
                    Arc::clone(&attrs[i]),
                    Arc::clone(&kernels[i]),
                )?;

                order_after.sort_unstable();
                order_after.dedup();
                for before in order_after.into_iter().filter(|&b| b != op_id) {
                    graph.add_control_dep(before, op_id)?;
                }
            }
        }

        let graph = graph.validate()?;
        tracing::info!(builder = self.name(), "{}", graph.summary());
        Ok(graph)
    }
}

fn lookup<'p>(program: &'p ProgramDesc, name: &str) -> Result<&'p crate::VarDesc, GraphError> {
    program
        .var(name)
        .ok_or_else(|| GraphError::InvalidProgram(format!("undeclared variable '{name}'")))
}
