// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Elementwise demo kernels for programs run from the command line.
//!
//! Every kernel reads `f32` inputs, keeps the shape and LoD of its first
//! input and writes its output on the op's place. Binary kernels repeat
//! the second operand when it is shorter, so a `[width]` parameter
//! applies to every row of a `[batch, width]` input.

use graph_ir::{KernelContext, KernelError, KernelRegistry};
use tensor_core::Tensor;

/// Registers `copy`, `scale`, `relu`, `tanh`, `add` and `mul`.
pub fn registry() -> KernelRegistry {
    let mut r = KernelRegistry::new();
    r.register("copy", |ctx: &mut KernelContext| unary(ctx, |v| v))
        .register("scale", |ctx: &mut KernelContext| -> Result<(), KernelError> {
            let k = ctx.attr_f32_or("scale", 2.0)?;
            unary(ctx, |v| v * k)
        })
        .register("relu", |ctx: &mut KernelContext| unary(ctx, |v| v.max(0.0)))
        .register("tanh", |ctx: &mut KernelContext| unary(ctx, f32::tanh))
        .register("add", |ctx: &mut KernelContext| binary(ctx, |a, b| a + b))
        .register("mul", |ctx: &mut KernelContext| binary(ctx, |a, b| a * b));
    r
}

fn unary(ctx: &mut KernelContext, f: impl Fn(f32) -> f32) -> Result<(), KernelError> {
    let x = ctx.input(0)?;
    let values: Vec<f32> = x.to_f32_vec()?.into_iter().map(f).collect();
    write_like(ctx, &x, &values)
}

fn binary(ctx: &mut KernelContext, f: impl Fn(f32, f32) -> f32) -> Result<(), KernelError> {
    let a = ctx.input(0)?;
    let b = ctx.input(1)?.to_f32_vec()?;
    if b.is_empty() {
        return Err(KernelError::Failed(format!(
            "{}: second operand is empty",
            ctx.op_type()
        )));
    }
    let values: Vec<f32> = a
        .to_f32_vec()?
        .into_iter()
        .enumerate()
        .map(|(i, v)| f(v, b[i % b.len()]))
        .collect();
    write_like(ctx, &a, &values)
}

fn write_like(ctx: &KernelContext, like: &Tensor, values: &[f32]) -> Result<(), KernelError> {
    let out = Tensor::from_f32(like.shape().clone(), values)?.with_lod(like.lod().clone());
    ctx.set_output(0, out.deep_copy_to(ctx.place()))
}
