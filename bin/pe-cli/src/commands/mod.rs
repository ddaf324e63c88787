// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Subcommands and the helpers they share.

pub mod benchmark;
pub mod inspect;
mod kernels;
pub mod run;

pub use kernels::registry;

use anyhow::Context;
use graph_ir::{OpDesc, ProgramDesc, VarDesc};
use runtime::{ExecutorType, RuntimeConfig};
use scope::{Scope, VarType};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tensor_core::{Shape, Tensor};
use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. `RUST_LOG` wins over `-v`.
pub fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

// ── Programs ───────────────────────────────────────────────────────

/// Loads `path`, or the built-in demo program when `None`.
pub fn load_program(path: Option<&Path>) -> anyhow::Result<ProgramDesc> {
    match path {
        Some(path) => ProgramDesc::from_file(path)
            .with_context(|| format!("failed to load program from '{}'", path.display())),
        None => Ok(demo_program()),
    }
}

/// A small layer with a skip branch:
///
/// ```text
/// h = x * w + b;  a = relu(h);  z = tanh(2a)
/// s = 0.5 x;      out = z + s
/// ```
pub fn demo_program() -> ProgramDesc {
    let vars = ["x", "h0", "h", "a", "y", "z", "s", "out"]
        .into_iter()
        .map(VarDesc::tensor)
        .chain([VarDesc::parameter("w"), VarDesc::parameter("b")])
        .collect();
    let ops = vec![
        OpDesc::new("mul", ["x", "w"], ["h0"]),
        OpDesc::new("add", ["h0", "b"], ["h"]),
        OpDesc::new("relu", ["h"], ["a"]),
        OpDesc::new("scale", ["a"], ["y"]),
        OpDesc::new("tanh", ["y"], ["z"]),
        OpDesc::new("scale", ["x"], ["s"]).with_attr("scale", 0.5),
        OpDesc::new("add", ["z", "s"], ["out"]),
    ];
    ProgramDesc::new("demo", vars, ops)
}

/// Non-persistable variables read by some op but written by none.
pub fn program_inputs(program: &ProgramDesc) -> Vec<String> {
    let written: HashSet<&str> = program
        .ops
        .iter()
        .flat_map(|op| op.outputs.iter().map(String::as_str))
        .collect();
    let read: HashSet<&str> = program
        .ops
        .iter()
        .flat_map(|op| op.inputs.iter().map(String::as_str))
        .collect();
    program
        .vars
        .iter()
        .filter(|v| !v.persistable && read.contains(v.name.as_str()) && !written.contains(v.name.as_str()))
        .map(|v| v.name.clone())
        .collect()
}

/// Variables written by some op but read by none.
pub fn program_outputs(program: &ProgramDesc) -> Vec<String> {
    let read: HashSet<&str> = program
        .ops
        .iter()
        .flat_map(|op| op.inputs.iter().map(String::as_str))
        .collect();
    let mut seen = HashSet::new();
    program
        .ops
        .iter()
        .flat_map(|op| op.outputs.iter())
        .filter(|name| !read.contains(name.as_str()) && seen.insert(name.as_str()))
        .cloned()
        .collect()
}

/// Fills every persistable variable of `program` in `global` with a ramp
/// of `width` values. Returns their names.
pub fn init_parameters(global: &Scope, program: &ProgramDesc, width: usize) -> anyhow::Result<Vec<String>> {
    let mut names = Vec::new();
    for var in program.vars.iter().filter(|v| v.persistable) {
        let values: Vec<f32> = (0..width).map(|i| 0.1 * (i + 1) as f32).collect();
        let t = Tensor::from_f32(Shape::vector(width), &values)?;
        global.var(&var.name, VarType::LodTensor).set_tensor(t);
        names.push(var.name.clone());
    }
    Ok(names)
}

/// A `[batch, width]` tensor per input, varying with `step`.
pub fn synthetic_feed(
    inputs: &[String],
    batch: usize,
    width: usize,
    step: usize,
) -> anyhow::Result<HashMap<String, Tensor>> {
    inputs
        .iter()
        .enumerate()
        .map(|(k, name)| {
            let values: Vec<f32> = (0..batch * width)
                .map(|i| ((i + step + k) % 17) as f32 / 8.0 - 1.0)
                .collect();
            Ok((name.clone(), Tensor::from_f32(Shape::matrix(batch, width), &values)?))
        })
        .collect()
}

// ── Configuration ──────────────────────────────────────────────────

/// Loads `config`, or builds a default configuration for `devices`.
pub fn load_config(config: Option<&PathBuf>, devices: usize, accel: bool) -> anyhow::Result<RuntimeConfig> {
    match config {
        Some(path) => Ok(RuntimeConfig::from_file(path)?),
        None if accel => Ok(RuntimeConfig::accel(devices)),
        None => Ok(RuntimeConfig::cpu(devices)),
    }
}

pub fn parse_executor(name: &str) -> anyhow::Result<ExecutorType> {
    match name.trim() {
        "default" | "threaded" => Ok(ExecutorType::Default),
        "fast" => Ok(ExecutorType::Fast),
        "experimental" => Ok(ExecutorType::Experimental),
        other => anyhow::bail!("unknown executor type '{other}' (expected default, fast or experimental)"),
    }
}

/// `"off"` disables eager deletion.
pub fn parse_threshold(value: &str) -> Option<String> {
    match value.trim() {
        "off" | "none" | "" => None,
        other => Some(other.to_string()),
    }
}

pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{cut}…")
    }
}
