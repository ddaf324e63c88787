// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # pe
//!
//! Command-line interface for the parallel execution runtime.
//!
//! ## Usage
//! ```bash
//! # Run a program for 10 steps on 4 host devices
//! pe run --program ./program.json --devices 4 --steps 10
//!
//! # Show the graph, variable infos and reference counts
//! pe inspect --program ./program.json --devices 2
//!
//! # Compare executors and GC thresholds
//! pe benchmark --executors default,fast --thresholds off,0,1M
//! ```
//!
//! Without `--program` the built-in demo program is used.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "pe",
    about = "Multi-device dataflow executor with eager garbage collection",
    version,
    author
)]
struct Cli {
    /// Path to a TOML runtime configuration (places and strategies).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (repeat for more: -v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program for a number of steps and print step metrics.
    Run {
        /// Program description (JSON). Defaults to the built-in demo.
        #[arg(short, long)]
        program: Option<PathBuf>,

        /// Number of devices, ignored when --config is given.
        #[arg(short, long, default_value_t = 2)]
        devices: usize,

        /// Use accelerator devices instead of host devices.
        #[arg(long)]
        accel: bool,

        /// Executor type: default, fast, experimental.
        #[arg(short, long)]
        executor: Option<String>,

        /// Garbage-collector threshold (e.g. "0", "64M"). Off when absent.
        #[arg(short = 't', long)]
        gc_threshold: Option<String>,

        /// Number of calls to run.
        #[arg(short, long, default_value_t = 5)]
        steps: usize,

        /// Samples per step, split across devices.
        #[arg(short, long, default_value_t = 8)]
        batch: usize,

        /// Row width of the synthetic inputs and parameters.
        #[arg(long, default_value_t = 16)]
        width: usize,

        /// Comma-separated variables to fetch. Defaults to the program outputs.
        #[arg(short, long)]
        fetch: Option<String>,

        /// Print the accumulated metrics as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print the graph, variable infos and reference counts of a program.
    Inspect {
        /// Program description (JSON). Defaults to the built-in demo.
        #[arg(short, long)]
        program: Option<PathBuf>,

        /// Number of devices, ignored when --config is given.
        #[arg(short, long, default_value_t = 2)]
        devices: usize,
    },

    /// Compare executor types and GC thresholds on one program.
    Benchmark {
        /// Program description (JSON). Defaults to the built-in demo.
        #[arg(short, long)]
        program: Option<PathBuf>,

        /// Number of host devices.
        #[arg(short, long, default_value_t = 4)]
        devices: usize,

        /// Calls to run per configuration.
        #[arg(short, long, default_value_t = 50)]
        steps: usize,

        /// Executor types to compare (comma-separated).
        #[arg(long, default_value = "default,fast")]
        executors: String,

        /// GC thresholds to compare (comma-separated, "off" disables).
        #[arg(long, default_value = "off,0,1M")]
        thresholds: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing/logging based on verbosity.
    commands::init_tracing(cli.verbose);

    match cli.command {
        Commands::Run {
            program,
            devices,
            accel,
            executor,
            gc_threshold,
            steps,
            batch,
            width,
            fetch,
            json,
        } => {
            let args = commands::run::RunArgs {
                program,
                config: cli.config,
                devices,
                accel,
                executor,
                gc_threshold,
                steps,
                batch,
                width,
                fetch,
                json,
            };
            commands::run::execute(args).await
        }
        Commands::Inspect { program, devices } => {
            commands::inspect::execute(program, cli.config, devices).await
        }
        Commands::Benchmark {
            program,
            devices,
            steps,
            executors,
            thresholds,
        } => commands::benchmark::execute(program, devices, steps, executors, thresholds).await,
    }
}
