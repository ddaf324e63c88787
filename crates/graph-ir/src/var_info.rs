// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Variables that must exist in every device scope before a step.

use crate::{Graph, Validated};
use scope::VarType;
use std::collections::HashSet;

/// Declaration of one named variable, as seen in the graphs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize)]
pub struct VariableInfo {
    pub name: String,
    pub var_type: VarType,
    pub persistable: bool,
}

/// Collects one [`VariableInfo`] per distinct data variable name across
/// `graphs`, in first-seen order. Control nodes are skipped.
pub fn collect_var_infos<'a, I>(graphs: I) -> Vec<VariableInfo>
where
    I: IntoIterator<Item = &'a Graph<Validated>>,
{
    let mut seen = HashSet::new();
    let mut infos = Vec::new();
    for graph in graphs {
        for var in graph.vars().iter().filter(|v| !v.is_control()) {
            if seen.insert(var.name.clone()) {
                infos.push(VariableInfo {
                    name: var.name.clone(),
                    var_type: var.var_type,
                    persistable: var.persistable,
                });
            }
        }
    }
    infos
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        GraphBuilder, KernelContext, KernelError, KernelRegistry, OpDesc, ProgramDesc,
        ReplicatedGraphBuilder, VarDesc,
    };
    use tensor_core::Place;

    #[test]
    fn test_collect_dedupes_and_skips_control() {
        let program = ProgramDesc::new(
            "p",
            vec![VarDesc::tensor("x"), VarDesc::parameter("w"), VarDesc::tensor("y")],
            vec![
                OpDesc::new("f", ["x", "w"], ["y"]),
                OpDesc::new("f", ["y"], ["x"]),
            ],
        );
        let mut registry = KernelRegistry::new();
        registry.register("f", |_: &mut KernelContext| -> Result<(), KernelError> { Ok(()) });
        let graph = ReplicatedGraphBuilder
            .build(&program, &[Place::Cpu, Place::Cpu], &registry)
            .unwrap();
        assert!(graph.vars().iter().any(|v| v.is_control()));

        let infos = collect_var_infos([&graph]);
        let names: Vec<_> = infos.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["x", "w", "y"]);
        assert!(infos[1].persistable);
        assert!(!infos[0].persistable);
    }
}
