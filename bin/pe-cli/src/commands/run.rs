// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `pe run` command: execute a program for a number of steps.
//!
//! ```text
//! config → global scope + parameters → ParallelExecutor::build
//!        → (feed_and_split → run) × steps → fetched values + metrics
//! ```

use super::{
    init_parameters, load_config, load_program, parse_executor, program_inputs, program_outputs,
    registry, synthetic_feed, truncate,
};
use runtime::{ParallelExecutor, StepMetrics};
use scope::Scope;
use std::path::PathBuf;

const FETCH_SLOT: &str = "@FETCH@";

pub struct RunArgs {
    pub program: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub devices: usize,
    pub accel: bool,
    pub executor: Option<String>,
    pub gc_threshold: Option<String>,
    pub steps: usize,
    pub batch: usize,
    pub width: usize,
    pub fetch: Option<String>,
    pub json: bool,
}

/// What the blocking part hands back for printing.
struct RunReport {
    summary: String,
    steps: Vec<StepMetrics>,
    fetched: Vec<(String, Vec<usize>, Vec<f32>)>,
}

pub async fn execute(args: RunArgs) -> anyhow::Result<()> {
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║              pe · Parallel Executor Run              ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();

    // ── Configuration ──────────────────────────────────────────
    let program = load_program(args.program.as_deref())?;
    let mut config = load_config(args.config.as_ref(), args.devices, args.accel)?;
    if let Some(name) = &args.executor {
        config.execution.executor_type = parse_executor(name)?;
    }
    if args.gc_threshold.is_some() {
        config.build.eager_delete_threshold = args.gc_threshold.clone();
    }
    let fetch: Vec<String> = match &args.fetch {
        Some(list) => list.split(',').map(|s| s.trim().to_string()).collect(),
        None => program_outputs(&program),
    };
    let inputs = program_inputs(&program);

    println!("  Config:");
    println!("   Program:  {} ({} ops)", program.name, program.ops.len());
    println!(
        "   Places:   {}",
        config.places.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
    );
    println!("   Executor: {:?}", config.execution.executor_type);
    println!(
        "   GC:       {}",
        config.build.eager_delete_threshold.as_deref().unwrap_or("off")
    );
    println!("   Inputs:   {}", inputs.join(", "));
    println!("   Fetch:    {}", fetch.join(", "));
    println!();

    // ── Steps ──────────────────────────────────────────────────
    let (steps, batch, width) = (args.steps, args.batch, args.width);
    let report = tokio::task::spawn_blocking(move || -> anyhow::Result<RunReport> {
        let global = Scope::new();
        let registry = registry();
        let params = init_parameters(&global, &program, width)?;

        let mut builder = ParallelExecutor::builder(config, &program, &registry).bcast_vars(params);
        if let Some(loss) = fetch.first() {
            builder = builder.loss_var(loss.clone());
        }
        let mut pe = builder.build(&global)?;
        let summary = pe.summary();

        let mut metrics = Vec::with_capacity(steps);
        for step in 0..steps {
            pe.feed_and_split(&synthetic_feed(&inputs, batch, width, step)?)?;
            metrics.push(pe.run(&fetch, FETCH_SLOT)?);
        }

        let values = global.get_var(FETCH_SLOT)?.fetch_list()?;
        let fetched = fetch
            .iter()
            .zip(values)
            .map(|(name, t)| Ok((name.clone(), t.shape().dims().to_vec(), t.to_f32_vec()?)))
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(RunReport {
            summary,
            steps: metrics,
            fetched,
        })
    })
    .await??;

    println!("  {}", report.summary);
    println!();
    for (i, m) in report.steps.iter().enumerate() {
        println!("  [{:>3}] {}", i + 1, m.summary());
    }
    println!();

    let mut total = StepMetrics::default();
    for m in &report.steps {
        total.accumulate(m);
    }
    print_results(&report.fetched, &total);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&total)?);
    }
    Ok(())
}

fn print_results(fetched: &[(String, Vec<usize>, Vec<f32>)], total: &StepMetrics) {
    println!("  ── Results ───────────────────────────────────────────");
    for (name, dims, values) in fetched {
        let head: Vec<String> = values.iter().take(6).map(|v| format!("{v:.4}")).collect();
        println!(
            "   {:<16} {:?}  [{}{}]",
            truncate(name, 16),
            dims,
            head.join(", "),
            if values.len() > head.len() { ", …" } else { "" },
        );
    }
    println!();
    println!("  ── Totals ────────────────────────────────────────────");
    println!("   Iterations: {}", total.iterations);
    println!("   Ops run:    {}", total.ops_run);
    println!("   Wall time:  {:.3} ms", total.duration.as_secs_f64() * 1000.0);
    println!("   Throughput: {:.0} ops/s", total.ops_per_second());
    println!("   {}", total.gc.summary());
}
