// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Integration tests: end-to-end multi-device execution.
//!
//! These tests exercise the complete flow from program description →
//! graph building → GC preparation → scheduling → fetch publication,
//! proving that all seven crates compose correctly.

use graph_ir::{KernelContext, KernelError, KernelRegistry, OpDesc, ProgramDesc, VarDesc};
use runtime::{
    ExecutorType, ParallelExecutor, ReduceStrategy, RuntimeConfig, RuntimeError, LR_DECAY_COUNTER,
};
use scope::{Scope, VarType};
use std::collections::HashMap;
use tensor_core::{Lod, Place, Shape, Tensor, TensorError};

// ── Helpers ────────────────────────────────────────────────────

/// `f`: y = 2x + 1, `g`: z = y * y, `mean`: scalar average,
/// `check`: fails on negative input.
fn registry() -> KernelRegistry {
    let mut r = KernelRegistry::new();
    r.register("f", |ctx: &mut KernelContext| -> Result<(), KernelError> {
        let x = ctx.input(0)?;
        let y: Vec<f32> = x.to_f32_vec()?.iter().map(|v| 2.0 * v + 1.0).collect();
        let y = Tensor::from_f32(x.shape().clone(), &y)?.with_lod(x.lod().clone());
        ctx.set_output(0, y.deep_copy_to(ctx.place()))
    })
    .register("g", |ctx: &mut KernelContext| -> Result<(), KernelError> {
        let y = ctx.input(0)?;
        let z: Vec<f32> = y.to_f32_vec()?.iter().map(|v| v * v).collect();
        let z = Tensor::from_f32(y.shape().clone(), &z)?.with_lod(y.lod().clone());
        ctx.set_output(0, z.deep_copy_to(ctx.place()))
    })
    .register("mean", |ctx: &mut KernelContext| -> Result<(), KernelError> {
        let x = ctx.input(0)?.to_f32_vec()?;
        let mean = x.iter().sum::<f32>() / x.len().max(1) as f32;
        ctx.set_output(0, Tensor::from_f32(Shape::scalar(), &[mean])?)
    })
    .register("check", |ctx: &mut KernelContext| -> Result<(), KernelError> {
        let x = ctx.input(0)?;
        if x.to_f32_vec()?.iter().any(|v| *v < 0.0) {
            return Err(KernelError::Failed("negative input".into()));
        }
        ctx.set_output(0, x)
    });
    r
}

/// z = g(f(x))
fn chain_program() -> ProgramDesc {
    ProgramDesc::new(
        "chain",
        vec![VarDesc::tensor("x"), VarDesc::tensor("y"), VarDesc::tensor("z")],
        vec![OpDesc::new("f", ["x"], ["y"]), OpDesc::new("g", ["y"], ["z"])],
    )
}

fn column(values: &[f32]) -> Tensor {
    Tensor::from_f32(Shape::new(vec![values.len(), 1]), values).unwrap()
}

fn feed(values: &[f32]) -> HashMap<String, Tensor> {
    HashMap::from([("x".to_string(), column(values))])
}

fn expected(values: &[f32]) -> Vec<f32> {
    values.iter().map(|v| (2.0 * v + 1.0) * (2.0 * v + 1.0)).collect()
}

fn fetched(global: &Scope, slot: &str) -> Vec<Tensor> {
    global.get_var(slot).unwrap().fetch_list().unwrap()
}

fn config(devices: usize, executor: ExecutorType) -> RuntimeConfig {
    let mut c = RuntimeConfig::cpu(devices);
    c.execution.executor_type = executor;
    c.execution.num_threads = 4;
    c
}

// ── End-to-end ─────────────────────────────────────────────────

#[test]
fn test_end_to_end_every_executor() {
    let registry = registry();
    let program = chain_program();
    for executor in [ExecutorType::Default, ExecutorType::Fast, ExecutorType::Experimental] {
        let global = Scope::new();
        let mut pe = ParallelExecutor::builder(config(2, executor), &program, &registry)
            .build(&global)
            .unwrap();

        let x = [0.0, 1.0, 2.0, 3.0, 4.0];
        pe.feed_and_split(&feed(&x)).unwrap();
        let metrics = pe.run(&["z"], "fetch").unwrap();

        assert_eq!(metrics.ops_run, 4, "{executor:?}");
        let out = fetched(&global, "fetch");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].to_f32_vec().unwrap(), expected(&x), "{executor:?}");
        assert_eq!(out[0].place(), Place::Cpu);
    }
}

#[test]
fn test_scalar_loss_fetched_from_every_device() {
    let registry = registry();
    let program = ProgramDesc::new(
        "loss",
        vec![VarDesc::tensor("x"), VarDesc::tensor("y"), VarDesc::tensor("loss")],
        vec![OpDesc::new("f", ["x"], ["y"]), OpDesc::new("mean", ["y"], ["loss"])],
    );
    for executor in [ExecutorType::Default, ExecutorType::Fast] {
        let global = Scope::new();
        let mut c = config(2, executor);
        c.build.eager_delete_threshold = Some("0".into());
        let mut pe = ParallelExecutor::builder(c, &program, &registry)
            .loss_var("loss")
            .build(&global)
            .unwrap();

        pe.feed_and_split(&feed(&[0.0, 1.0, 2.0, 3.0])).unwrap();
        pe.run(&["loss"], "fetch").unwrap();

        let out = fetched(&global, "fetch");
        assert_eq!(out[0].shape().dims(), &[2], "{executor:?}");
        assert_eq!(out[0].to_f32_vec().unwrap(), vec![2.0, 6.0], "{executor:?}");
    }
}

#[test]
fn test_repeated_runs() {
    let registry = registry();
    let program = chain_program();
    let global = Scope::new();
    let mut pe = ParallelExecutor::builder(config(3, ExecutorType::Fast), &program, &registry)
        .build(&global)
        .unwrap();

    for step in 0..5 {
        let x: Vec<f32> = (0..6).map(|i| (i + step) as f32).collect();
        pe.feed_and_split(&feed(&x)).unwrap();
        pe.run(&["y", "z"], "fetch").unwrap();
        let out = fetched(&global, "fetch");
        assert_eq!(out.len(), 2);
        let y: Vec<f32> = x.iter().map(|v| 2.0 * v + 1.0).collect();
        assert_eq!(out[0].to_f32_vec().unwrap(), y);
        assert_eq!(out[1].to_f32_vec().unwrap(), expected(&x));
    }
}

#[test]
fn test_sequential_execution() {
    let registry = registry();
    let program = chain_program();
    let global = Scope::new();
    let mut c = config(2, ExecutorType::Fast);
    c.build.enable_sequential_execution = true;
    let mut pe = ParallelExecutor::builder(c, &program, &registry).build(&global).unwrap();

    pe.feed_and_split(&feed(&[1.0, 2.0])).unwrap();
    pe.run(&["z"], "fetch").unwrap();
    assert_eq!(fetched(&global, "fetch")[0].to_f32_vec().unwrap(), vec![9.0, 25.0]);
}

#[test]
fn test_lod_survives_split_and_merge() {
    let registry = registry();
    let program = chain_program();
    let global = Scope::new();
    let mut pe = ParallelExecutor::builder(config(2, ExecutorType::Default), &program, &registry)
        .build(&global)
        .unwrap();

    let lod = Lod::from_levels(vec![vec![0, 2, 3, 6]]).unwrap();
    let x = column(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]).with_lod(lod.clone());
    pe.feed_and_split(&HashMap::from([("x".to_string(), x)])).unwrap();
    pe.run(&["z"], "fetch").unwrap();

    let out = &fetched(&global, "fetch")[0];
    assert_eq!(out.lod(), &lod);
    assert_eq!(out.to_f32_vec().unwrap(), expected(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]));
}

// ── Feeding ────────────────────────────────────────────────────

#[test]
fn test_feed_and_split_too_few_samples() {
    let registry = registry();
    let program = chain_program();
    let global = Scope::new();
    let pe = ParallelExecutor::builder(config(4, ExecutorType::Fast), &program, &registry)
        .build(&global)
        .unwrap();

    let err = pe.feed_and_split(&feed(&[1.0, 2.0, 3.0])).unwrap_err();
    assert!(matches!(
        err,
        RuntimeError::Tensor(TensorError::NotEnoughSamples { batch: 3, devices: 4 })
    ));
    assert!(pe.local_scopes().iter().all(|s| s.find_local_var("x").is_none()));
}

#[test]
fn test_feed_per_device_runs_unequal_shards() {
    let registry = registry();
    let program = chain_program();
    let global = Scope::new();
    let mut pe = ParallelExecutor::builder(config(2, ExecutorType::Default), &program, &registry)
        .build(&global)
        .unwrap();

    pe.feed_per_device(&[feed(&[1.0]), feed(&[2.0, 3.0, 4.0])]).unwrap();
    pe.run(&["z"], "fetch").unwrap();
    assert_eq!(
        fetched(&global, "fetch")[0].to_f32_vec().unwrap(),
        expected(&[1.0, 2.0, 3.0, 4.0])
    );
}

// ── Failure ────────────────────────────────────────────────────

#[test]
fn test_op_failure_leaves_executor_usable() {
    let registry = registry();
    let program = ProgramDesc::new(
        "checked",
        vec![VarDesc::tensor("x"), VarDesc::tensor("c"), VarDesc::tensor("y"), VarDesc::tensor("z")],
        vec![
            OpDesc::new("check", ["x"], ["c"]),
            OpDesc::new("f", ["c"], ["y"]),
            OpDesc::new("g", ["y"], ["z"]),
        ],
    );
    let global = Scope::new();
    let mut pe = ParallelExecutor::builder(config(2, ExecutorType::Fast), &program, &registry)
        .build(&global)
        .unwrap();

    pe.feed_and_split(&feed(&[1.0, -1.0])).unwrap();
    let err = pe.run(&["z"], "fetch").unwrap_err();
    assert!(matches!(err, RuntimeError::Execution(_)));

    pe.feed_and_split(&feed(&[1.0, 2.0])).unwrap();
    pe.run(&["z"], "fetch").unwrap();
    assert_eq!(fetched(&global, "fetch")[0].to_f32_vec().unwrap(), vec![9.0, 25.0]);
}

#[test]
fn test_unknown_fetch_is_an_error() {
    let registry = registry();
    let program = chain_program();
    let global = Scope::new();
    let mut pe = ParallelExecutor::builder(config(1, ExecutorType::Default), &program, &registry)
        .build(&global)
        .unwrap();
    pe.feed_per_device(&[feed(&[1.0])]).unwrap();
    assert!(pe.run(&["nope"], "fetch").is_err());
}

// ── Garbage collection ─────────────────────────────────────────

#[test]
fn test_eager_deletion_collects_every_intermediate() {
    let registry = registry();
    let program = chain_program();
    for executor in [ExecutorType::Default, ExecutorType::Fast] {
        let global = Scope::new();
        let mut c = config(2, executor);
        c.build.eager_delete_threshold = Some("0".into());
        let mut pe = ParallelExecutor::builder(c, &program, &registry).build(&global).unwrap();
        assert_eq!(pe.gc_plans().len(), 1);

        for step in 1..=3u64 {
            pe.feed_and_split(&feed(&[1.0, 2.0, 3.0, 4.0])).unwrap();
            let metrics = pe.run(&["z"], "fetch").unwrap();
            // x and y on both devices; z is fetched.
            assert_eq!(metrics.gc.buffers, 4, "{executor:?}");
            assert_eq!(pe.gc_stats().buffers, 4 * step);
            assert_eq!(
                fetched(&global, "fetch")[0].to_f32_vec().unwrap(),
                expected(&[1.0, 2.0, 3.0, 4.0])
            );
        }
        for scope in pe.local_scopes() {
            let x = scope.find_local_var("x").unwrap();
            assert!(!x.is_initialized());
        }
    }
}

#[test]
fn test_eager_deletion_respects_iterations_per_run() {
    let registry = registry();
    // y = f(w); z = g(y). w is persistable, so every iteration recomputes.
    let program = ProgramDesc::new(
        "persistent",
        vec![VarDesc::parameter("w"), VarDesc::tensor("y"), VarDesc::tensor("z")],
        vec![OpDesc::new("f", ["w"], ["y"]), OpDesc::new("g", ["y"], ["z"])],
    );
    let global = Scope::new();
    global.var("w", VarType::LodTensor).set_tensor(column(&[1.0]));

    let mut c = config(1, ExecutorType::Fast);
    c.build.eager_delete_threshold = Some("0".into());
    c.execution.num_iteration_per_run = 3;
    let mut pe = ParallelExecutor::builder(c, &program, &registry).build(&global).unwrap();

    let metrics = pe.run(&["z"], "fetch").unwrap();
    assert_eq!(metrics.iterations, 3);
    assert_eq!(metrics.gc.buffers, 3);
    assert_eq!(fetched(&global, "fetch")[0].to_f32_vec().unwrap(), vec![9.0]);
    assert!(global.find_var("w").unwrap().is_initialized());
}

// ── Scopes ─────────────────────────────────────────────────────

#[test]
fn test_exec_scopes_dropped_on_schedule() {
    let registry = registry();
    let program = chain_program();
    let global = Scope::new();
    let mut c = config(1, ExecutorType::Default);
    c.execution.num_iteration_per_drop_scope = 2;
    let mut pe = ParallelExecutor::builder(c, &program, &registry).build(&global).unwrap();

    pe.feed_per_device(&[feed(&[1.0])]).unwrap();
    pe.run(&["z"], "fetch").unwrap();
    // Device 0 uses the global scope; its exec scope is still alive.
    assert_eq!(global.num_kids(), 1);
    pe.run(&["z"], "fetch").unwrap();
    assert_eq!(global.num_kids(), 0);

    drop(pe);
    assert_eq!(global.num_kids(), 0);
    assert!(global.find_local_var("fetch").is_some());
}

// ── Broadcast ──────────────────────────────────────────────────

#[test]
fn test_broadcast_on_build() {
    let registry = registry();
    let program = chain_program();
    for (reduce, deep) in [(ReduceStrategy::AllReduce, true), (ReduceStrategy::Reduce, false)] {
        let global = Scope::new();
        let w = column(&[0.5, 1.5]);
        global.var("w", VarType::LodTensor).set_tensor(w.share_data_with());
        let counter = column(&[0.0]);
        global.var(LR_DECAY_COUNTER, VarType::LodTensor).set_tensor(counter.share_data_with());

        let mut c = config(3, ExecutorType::Default);
        c.build.reduce = reduce;
        let pe = ParallelExecutor::builder(c, &program, &registry)
            .bcast_vars(["w", LR_DECAY_COUNTER, "missing"])
            .build(&global)
            .unwrap();

        for scope in &pe.local_scopes()[1..] {
            let copy = scope.find_local_var("w").unwrap().tensor().unwrap();
            assert_eq!(copy.to_f32_vec().unwrap(), vec![0.5, 1.5]);
            assert_eq!(copy.shares_buffer_with(&w), !deep, "{reduce:?}");
            let copy = scope.find_local_var(LR_DECAY_COUNTER).unwrap().tensor().unwrap();
            assert!(!copy.shares_buffer_with(&counter));
            assert!(scope.find_local_var("missing").is_none());
        }
    }
}

#[test]
fn test_supplied_scopes_skip_broadcast() {
    let registry = registry();
    let program = chain_program();
    let global = Scope::new();
    global.var("w", VarType::LodTensor).set_tensor(column(&[1.0]));
    let supplied: Vec<Scope> = (0..2).map(|_| Scope::new()).collect();

    let pe = ParallelExecutor::builder(config(2, ExecutorType::Default), &program, &registry)
        .bcast_vars(["w"])
        .local_scopes(supplied)
        .build(&global)
        .unwrap();
    assert!(pe.local_scopes().iter().all(|s| s.find_var("w").is_none()));
}

// ── Configuration ──────────────────────────────────────────────

#[test]
fn test_config_from_toml_drives_build() {
    let registry = registry();
    let program = chain_program();
    let config = RuntimeConfig::from_toml(
        r#"
places = ["cpu", "cpu"]

[execution]
executor_type = "fast"
num_threads = 2

[build]
eager_delete_threshold = "1K"
"#,
    )
    .unwrap();
    let global = Scope::new();
    let pe = ParallelExecutor::builder(config, &program, &registry).build(&global).unwrap();
    assert_eq!(pe.executor().name(), "fast");
    assert_eq!(pe.gc_plans().len(), 1);
    assert_eq!(pe.var_infos().len(), 3);
}

#[test]
fn test_invalid_config_rejected() {
    let registry = registry();
    let program = chain_program();
    let global = Scope::new();

    let mut reduce = RuntimeConfig::cpu(1);
    reduce.build.reduce = ReduceStrategy::Reduce;
    let err = ParallelExecutor::builder(reduce, &program, &registry).build(&global).unwrap_err();
    assert!(matches!(err, RuntimeError::Config(_)));

    let mut threshold = RuntimeConfig::cpu(1);
    threshold.build.eager_delete_threshold = Some("lots".into());
    assert!(ParallelExecutor::builder(threshold, &program, &registry).build(&global).is_err());

    let missing_kernel = ProgramDesc::new(
        "bad",
        vec![VarDesc::tensor("x"), VarDesc::tensor("y")],
        vec![OpDesc::new("unknown", ["x"], ["y"])],
    );
    let err = ParallelExecutor::builder(RuntimeConfig::cpu(1), &missing_kernel, &registry)
        .build(&global)
        .unwrap_err();
    assert!(matches!(err, RuntimeError::Graph(_)));
    assert_eq!(global.num_kids(), 0);

    // Scopes created before the failure are released again.
    let err = ParallelExecutor::builder(RuntimeConfig::cpu(3), &missing_kernel, &registry)
        .build(&global)
        .unwrap_err();
    assert!(matches!(err, RuntimeError::Graph(_)));
    assert_eq!(global.num_kids(), 0);
}

// ── Accelerators ───────────────────────────────────────────────

#[cfg(feature = "accel")]
#[test]
fn test_parallel_graph_on_accelerators() {
    let registry = registry();
    let program = chain_program();
    let global = Scope::new();
    let mut c = RuntimeConfig::accel(2);
    c.build.enable_parallel_graph = true;
    c.build.eager_delete_threshold = Some("0".into());
    let mut pe = ParallelExecutor::builder(c, &program, &registry).build(&global).unwrap();
    assert_eq!(pe.executor().name(), "parallel");
    assert_eq!(pe.gc_plans().len(), 2);
    assert_eq!(pe.comms().map(|c| c.nranks()), Some(2));

    let x = [1.0, 2.0, 3.0, 4.0];
    pe.feed_and_split(&feed(&x)).unwrap();
    let shard = pe.local_scopes()[1].find_local_var("x").unwrap().tensor().unwrap();
    assert_eq!(shard.place(), Place::Accel(1));

    let metrics = pe.run(&["z"], "fetch").unwrap();
    assert_eq!(metrics.gc.buffers, 4);
    assert_eq!(fetched(&global, "fetch")[0].to_f32_vec().unwrap(), expected(&x));
}

#[cfg(feature = "accel")]
#[test]
fn test_accelerator_broadcast() {
    let registry = registry();
    let program = chain_program();
    let global = Scope::new();
    let w = column(&[7.0, 8.0]).deep_copy_to(Place::Accel(0));
    global.var("w", VarType::LodTensor).set_tensor(w.share_data_with());

    let pe = ParallelExecutor::builder(RuntimeConfig::accel(3), &program, &registry)
        .bcast_vars(["w"])
        .build(&global)
        .unwrap();
    for (i, scope) in pe.local_scopes().iter().enumerate().skip(1) {
        let copy = scope.find_local_var("w").unwrap().tensor().unwrap();
        assert_eq!(copy.place(), Place::Accel(i));
        assert_eq!(copy.to_f32_vec().unwrap(), vec![7.0, 8.0]);
    }
}

#[cfg(not(feature = "accel"))]
#[test]
fn test_accelerators_unsupported_without_backend() {
    let registry = registry();
    let program = chain_program();
    let global = Scope::new();
    let err = ParallelExecutor::builder(RuntimeConfig::accel(1), &program, &registry)
        .build(&global)
        .unwrap_err();
    assert!(matches!(err, RuntimeError::Device(_)));
}
