// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Example: Compare executor types and GC thresholds on a branching program.
//!
//! Every configuration runs the same program on four host devices and must
//! produce the same result; only timing and collector activity differ.
//!
//! ```bash
//! cargo run -p runtime --example executor_comparison
//! ```

use graph_ir::{KernelContext, KernelError, KernelRegistry, OpDesc, ProgramDesc, VarDesc};
use runtime::{ExecutorType, ParallelExecutor, RuntimeConfig, StepMetrics};
use scope::Scope;
use std::collections::HashMap;
use tensor_core::{Shape, Tensor};

const STEPS: usize = 20;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing.
    tracing_subscriber::fmt()
        .with_env_filter("warn")
        .init();

    let registry = registry();
    let program = branching_program(6, 10);
    println!("Program: {} ops, {} vars\n", program.ops.len(), program.vars.len());

    let configs = [
        (ExecutorType::Default, None),
        (ExecutorType::Fast, None),
        (ExecutorType::Default, Some("0")),
        (ExecutorType::Fast, Some("0")),
        (ExecutorType::Fast, Some("64K")),
    ];

    println!(
        "{:<10} {:>8} {:>12} {:>12} {:>10} {:>12}",
        "Executor", "GC", "Total ms", "Ops/s", "Buffers", "Checksum",
    );
    println!("{}", "-".repeat(70));

    for (executor, threshold) in configs {
        let mut config = RuntimeConfig::cpu(4);
        config.execution.executor_type = executor;
        config.build.eager_delete_threshold = threshold.map(str::to_string);

        let global = Scope::new();
        let mut pe = ParallelExecutor::builder(config, &program, &registry).build(&global)?;

        let x = Tensor::from_f32(Shape::matrix(64, 32), &vec![0.5; 64 * 32])?;
        let feed = HashMap::from([("x".to_string(), x)]);

        let mut total = StepMetrics::default();
        for _ in 0..STEPS {
            pe.feed_and_split(&feed)?;
            total.accumulate(&pe.run(&["out"], "fetch")?);
        }
        let out = global.get_var("fetch")?.fetch_list()?;
        let checksum: f32 = out[0].to_f32_vec()?.iter().sum();

        println!(
            "{:<10} {:>8} {:>12.2} {:>12.0} {:>10} {:>12.3}",
            pe.executor().name(),
            threshold.unwrap_or("off"),
            total.duration.as_secs_f64() * 1000.0,
            total.ops_per_second(),
            total.gc.buffers,
            checksum,
        );
    }

    Ok(())
}

fn registry() -> KernelRegistry {
    let mut r = KernelRegistry::new();
    r.register("scale", |ctx: &mut KernelContext| -> Result<(), KernelError> {
        let x = ctx.input(0)?;
        let values: Vec<f32> = x.to_f32_vec()?.iter().map(|v| v * 1.1).collect();
        ctx.set_output(0, Tensor::from_f32(x.shape().clone(), &values)?)
    })
    .register("add", |ctx: &mut KernelContext| -> Result<(), KernelError> {
        let a = ctx.input(0)?;
        let b = ctx.input(1)?.to_f32_vec()?;
        let values: Vec<f32> = a.to_f32_vec()?.iter().zip(&b).map(|(x, y)| x + y).collect();
        ctx.set_output(0, Tensor::from_f32(a.shape().clone(), &values)?)
    });
    r
}

/// `width` independent chains of `depth` scales, summed into `out`.
fn branching_program(width: usize, depth: usize) -> ProgramDesc {
    let mut vars = vec![VarDesc::tensor("x")];
    let mut ops = Vec::new();
    let mut tails = Vec::new();
    for b in 0..width {
        let mut prev = "x".to_string();
        for d in 0..depth {
            let name = format!("h{b}_{d}");
            vars.push(VarDesc::tensor(&name));
            ops.push(OpDesc::new("scale", [prev.as_str()], [name.as_str()]));
            prev = name;
        }
        tails.push(prev);
    }
    let mut acc = tails[0].clone();
    for (b, tail) in tails.iter().enumerate().skip(1) {
        let name = format!("s{b}");
        vars.push(VarDesc::tensor(&name));
        ops.push(OpDesc::new("add", [acc.as_str(), tail.as_str()], [name.as_str()]));
        acc = name;
    }
    vars.push(VarDesc::tensor("out"));
    ops.push(OpDesc::new("scale", [acc.as_str()], ["out"]));
    ProgramDesc::new("branching", vars, ops)
}
