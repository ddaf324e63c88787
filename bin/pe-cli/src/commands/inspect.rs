// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `pe inspect` command: show what a program becomes before it runs.
//!
//! Builds an executor with eager deletion forced on (unless the config
//! already sets a threshold) and prints the graph, the variable infos and
//! the static reference counts per device.

use super::{load_config, load_program, registry, truncate};
use runtime::{parallel_graph_admission, ParallelExecutor};
use scope::Scope;
use std::path::PathBuf;

pub async fn execute(program: Option<PathBuf>, config: Option<PathBuf>, devices: usize) -> anyhow::Result<()> {
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║               pe · Program Inspector                 ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();

    let program = load_program(program.as_deref())?;
    let mut config = load_config(config.as_ref(), devices, false)?;
    if config.build.eager_delete_threshold.is_none() {
        config.build.eager_delete_threshold = Some("0".into());
    }

    // ── Program ────────────────────────────────────────────────
    println!("  Program: {}", program.name);
    println!("  Variables: {} ({} persistable)", program.vars.len(), program.persistable_vars().len());
    println!("  Ops: {}", program.ops.len());
    println!();
    println!("  {:<4} {:<12} {:<30} {:<30}", "#", "Type", "Inputs", "Outputs");
    println!("  {}", "-".repeat(78));
    for (i, op) in program.ops.iter().enumerate() {
        println!(
            "  {:<4} {:<12} {:<30} {:<30}",
            i,
            truncate(&op.op_type, 12),
            truncate(&op.inputs.join(", "), 30),
            truncate(&op.outputs.join(", "), 30),
        );
    }
    println!();

    let admission = parallel_graph_admission(&program, &config.execution, &config.build);
    println!(
        "  Parallel graph: {} ({})",
        if admission.enabled { "yes" } else { "no" },
        admission.reason
    );
    println!();

    // ── Executor ───────────────────────────────────────────────
    let global = Scope::new();
    let registry = registry();
    let pe = ParallelExecutor::builder(config, &program, &registry).build(&global)?;
    println!("  {}", pe.summary());
    for graph in pe.executor().graphs() {
        println!("  {}", graph.summary());
    }
    println!();

    println!("  {:<24} {:<14} {:>11}", "Variable", "Type", "Persistable");
    println!("  {}", "-".repeat(51));
    for info in pe.var_infos() {
        println!(
            "  {:<24} {:<14} {:>11}",
            truncate(&info.name, 24),
            format!("{:?}", info.var_type),
            if info.persistable { "yes" } else { "" },
        );
    }
    println!();

    // ── Reference counts ───────────────────────────────────────
    for (g, plan) in pe.gc_plans().iter().enumerate() {
        let counts = &plan.static_counts;
        for device in 0..counts.num_devices() {
            let mut entries: Vec<(&str, usize)> = counts.device(device).collect();
            entries.sort_unstable();
            println!(
                "  Reference counts, graph {g} device {device} ({} tracked, {} early):",
                entries.len(),
                plan.hook.num_early(),
            );
            for (name, count) in entries {
                println!("   {:<24} {count}", truncate(name, 24));
            }
        }
    }
    println!();

    Ok(())
}
