// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `pe benchmark` command: sweep executor types and GC thresholds.
//!
//! Runs the same program with every combination and prints a comparison
//! table of step latency, throughput and collector activity.

use super::{
    init_parameters, load_program, parse_executor, parse_threshold, program_inputs,
    program_outputs, registry, synthetic_feed,
};
use graph_ir::ProgramDesc;
use runtime::{ExecutorType, ParallelExecutor, RuntimeConfig, StepMetrics};
use scope::Scope;
use std::path::PathBuf;
use std::sync::Arc;

const BATCH_PER_DEVICE: usize = 16;
const WIDTH: usize = 64;

struct BenchResult {
    executor: &'static str,
    threshold: String,
    ms_per_step: f64,
    ops_per_second: f64,
    gc_buffers: u64,
    gc_mb: f64,
}

pub async fn execute(
    program: Option<PathBuf>,
    devices: usize,
    steps: usize,
    executors: String,
    thresholds: String,
) -> anyhow::Result<()> {
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║              pe · Benchmark Suite                    ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();

    let program = Arc::new(load_program(program.as_deref())?);
    let executors: Vec<ExecutorType> = executors
        .split(',')
        .map(parse_executor)
        .collect::<Result<_, _>>()?;
    let thresholds: Vec<Option<String>> = thresholds.split(',').map(parse_threshold).collect();

    println!("  Program:    {} ({} ops)", program.name, program.ops.len());
    println!("  Devices:    {devices} × cpu");
    println!("  Steps:      {steps}");
    println!();

    println!(
        "  {:<10} {:>8} {:>12} {:>12} {:>10} {:>10}",
        "Executor", "GC", "ms/step", "ops/s", "Buffers", "GC MB",
    );
    println!("  {}", "-".repeat(68));

    let mut results = Vec::new();
    for &executor in &executors {
        for threshold in &thresholds {
            let mut config = RuntimeConfig::cpu(devices);
            config.execution.executor_type = executor;
            config.build.eager_delete_threshold = threshold.clone();

            let program = Arc::clone(&program);
            let outcome =
                tokio::task::spawn_blocking(move || run_single(&program, config, steps)).await?;
            match outcome {
                Ok(r) => {
                    println!(
                        "  {:<10} {:>8} {:>12.3} {:>12.0} {:>10} {:>10.2}",
                        r.executor, r.threshold, r.ms_per_step, r.ops_per_second, r.gc_buffers, r.gc_mb,
                    );
                    results.push(r);
                }
                Err(e) => println!(
                    "  {:<10} {:>8} FAIL: {e}",
                    format!("{executor:?}"),
                    threshold.as_deref().unwrap_or("off"),
                ),
            }
        }
    }
    println!();

    if let Some(best) = results
        .iter()
        .min_by(|a, b| a.ms_per_step.total_cmp(&b.ms_per_step))
    {
        println!(
            "  Fastest: {} with GC {} ({:.3} ms/step)",
            best.executor, best.threshold, best.ms_per_step
        );
    }
    Ok(())
}

fn run_single(program: &ProgramDesc, config: RuntimeConfig, steps: usize) -> anyhow::Result<BenchResult> {
    let devices = config.places.len();
    let threshold = config
        .build
        .eager_delete_threshold
        .clone()
        .unwrap_or_else(|| "off".into());
    let global = Scope::new();
    let registry = registry();
    let params = init_parameters(&global, program, WIDTH)?;
    let mut pe = ParallelExecutor::builder(config, program, &registry)
        .bcast_vars(params)
        .build(&global)?;

    let inputs = program_inputs(program);
    let fetch = program_outputs(program);
    let batch = devices * BATCH_PER_DEVICE;

    // Warm-up step, not measured.
    pe.feed_and_split(&synthetic_feed(&inputs, batch, WIDTH, 0)?)?;
    pe.run(&fetch, "@FETCH@")?;

    let mut total = StepMetrics::default();
    for step in 0..steps {
        pe.feed_and_split(&synthetic_feed(&inputs, batch, WIDTH, step + 1)?)?;
        total.accumulate(&pe.run(&fetch, "@FETCH@")?);
    }

    Ok(BenchResult {
        executor: pe.executor().name(),
        threshold,
        ms_per_step: total.duration.as_secs_f64() * 1000.0 / steps.max(1) as f64,
        ops_per_second: total.ops_per_second(),
        gc_buffers: total.gc.buffers,
        gc_mb: total.gc.bytes as f64 / (1024.0 * 1024.0),
    })
}
