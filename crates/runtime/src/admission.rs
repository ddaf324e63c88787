// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Whether a program may run in one-graph-per-device mode.

use crate::{BuildStrategy, ExecutionStrategy, ExecutorType, ReduceStrategy};
use graph_ir::ProgramDesc;
use scope::VarType;

/// The decision and the first reason that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub enabled: bool,
    pub reason: &'static str,
}

impl Admission {
    fn deny(reason: &'static str) -> Self {
        Self {
            enabled: false,
            reason,
        }
    }
}

/// Decides whether `program` gets one graph per device. Has no side
/// effects; the caller logs the result.
pub fn parallel_graph_admission(
    program: &ProgramDesc,
    exec: &ExecutionStrategy,
    build: &BuildStrategy,
) -> Admission {
    if !build.enable_parallel_graph {
        return Admission::deny("parallel graph mode not enabled");
    }
    if program.has_var_type(VarType::SelectedRows) {
        return Admission::deny("program has selected-rows variables");
    }
    if program.has_op_type("send") || program.has_op_type("recv") {
        return Admission::deny("program has send/recv ops");
    }
    if build.reduce != ReduceStrategy::AllReduce || !exec.use_accel {
        return Admission::deny("requires all-reduce on accelerators");
    }
    if build.enable_sequential_execution {
        return Admission::deny("sequential execution is forced");
    }
    if exec.executor_type == ExecutorType::Experimental {
        return Admission::deny("experimental executor selected");
    }
    Admission {
        enabled: true,
        reason: "all requirements met",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graph_ir::{OpDesc, VarDesc};

    fn program(extra_op: Option<&str>, sparse: bool) -> ProgramDesc {
        let mut vars = vec![VarDesc::tensor("x"), VarDesc::tensor("y")];
        if sparse {
            vars.push(VarDesc {
                var_type: VarType::SelectedRows,
                ..VarDesc::tensor("emb_grad")
            });
        }
        let mut ops = vec![OpDesc::new("scale", ["x"], ["y"])];
        if let Some(op) = extra_op {
            ops.push(OpDesc::new(op, ["y"], Vec::<String>::new()));
        }
        ProgramDesc::new("p", vars, ops)
    }

    fn strategies() -> (ExecutionStrategy, BuildStrategy) {
        let exec = ExecutionStrategy {
            use_accel: true,
            ..Default::default()
        };
        let build = BuildStrategy {
            enable_parallel_graph: true,
            ..Default::default()
        };
        (exec, build)
    }

    #[test]
    fn test_admitted() {
        let (exec, build) = strategies();
        assert!(parallel_graph_admission(&program(None, false), &exec, &build).enabled);
    }

    #[test]
    fn test_each_rule_denies() {
        let (exec, build) = strategies();
        let p = program(None, false);

        let off = BuildStrategy {
            enable_parallel_graph: false,
            ..build.clone()
        };
        assert!(!parallel_graph_admission(&p, &exec, &off).enabled);

        assert!(!parallel_graph_admission(&program(None, true), &exec, &build).enabled);
        assert!(!parallel_graph_admission(&program(Some("send"), false), &exec, &build).enabled);
        assert!(!parallel_graph_admission(&program(Some("recv"), false), &exec, &build).enabled);

        let reduce = BuildStrategy {
            reduce: ReduceStrategy::Reduce,
            ..build.clone()
        };
        assert!(!parallel_graph_admission(&p, &exec, &reduce).enabled);

        let host = ExecutionStrategy {
            use_accel: false,
            ..exec.clone()
        };
        assert!(!parallel_graph_admission(&p, &host, &build).enabled);

        let sequential = BuildStrategy {
            enable_sequential_execution: true,
            ..build.clone()
        };
        let a = parallel_graph_admission(&p, &exec, &sequential);
        assert!(!a.enabled);
        assert!(a.reason.contains("sequential"));

        let experimental = ExecutionStrategy {
            executor_type: ExecutorType::Experimental,
            ..exec.clone()
        };
        assert!(!parallel_graph_admission(&p, &experimental, &build).enabled);
    }

    #[test]
    fn test_pure() {
        let (exec, build) = strategies();
        let p = program(Some("send"), false);
        let first = parallel_graph_admission(&p, &exec, &build);
        assert_eq!(first, parallel_graph_admission(&p, &exec, &build));
    }
}
