// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Kernels and programs shared by the executor tests.

use graph_ir::{
    Graph, GraphBuilder, KernelContext, KernelError, KernelRegistry, OpDesc, ProgramDesc,
    ReplicatedGraphBuilder, Validated, VarDesc,
};
use scope::{Scope, VarType};
use tensor_core::{Place, Shape, Tensor};

/// `scale`: y = x * attr("scale", 2); `add`: z = x + y; `slow`: copies x
/// after sleeping attr("millis", 50); `fail`: errors after sleeping
/// attr("millis", 0).
pub(crate) fn registry() -> KernelRegistry {
    let mut r = KernelRegistry::new();
    r.register("scale", |ctx: &mut KernelContext| -> Result<(), KernelError> {
        let x = ctx.input(0)?;
        let k = ctx.attr_f32_or("scale", 2.0)?;
        let values: Vec<f32> = x.to_f32_vec()?.iter().map(|v| v * k).collect();
        let y = Tensor::from_f32(x.shape().clone(), &values)?.with_lod(x.lod().clone());
        ctx.set_output(0, y.deep_copy_to(ctx.place()))
    })
    .register("add", |ctx: &mut KernelContext| -> Result<(), KernelError> {
        let x = ctx.input(0)?.to_f32_vec()?;
        let y = ctx.input(1)?.to_f32_vec()?;
        let values: Vec<f32> = x.iter().zip(&y).map(|(a, b)| a + b).collect();
        let z = Tensor::from_f32(Shape::vector(values.len()), &values)?;
        ctx.set_output(0, z.deep_copy_to(ctx.place()))
    })
    .register("slow", |ctx: &mut KernelContext| -> Result<(), KernelError> {
        pause(ctx.attr_f32_or("millis", 50.0)?);
        let x = ctx.input(0)?;
        ctx.set_output(0, x.deep_copy_to(ctx.place()))
    })
    .register("fail", |ctx: &mut KernelContext| -> Result<(), KernelError> {
        pause(ctx.attr_f32_or("millis", 0.0)?);
        Err(KernelError::Failed("injected".into()))
    });
    r
}

fn pause(millis: f32) {
    if millis > 0.0 {
        std::thread::sleep(std::time::Duration::from_millis(millis as u64));
    }
}

/// Two independent ops on `x`: `slow` writes `s` after 100 ms, `fail`
/// errors after 10 ms.
pub(crate) fn slow_sibling_program() -> ProgramDesc {
    ProgramDesc::new(
        "slow-sibling",
        vec![VarDesc::tensor("x"), VarDesc::tensor("s"), VarDesc::tensor("y")],
        vec![
            OpDesc::new("slow", ["x"], ["s"]).with_attr("millis", 100.0),
            OpDesc::new("fail", ["x"], ["y"]).with_attr("millis", 10.0),
        ],
    )
}

/// A diamond followed by a chain:
///
/// ```text
/// a = scale(x)      (×2)
/// b = scale(x)      (×3)
/// c = add(a, b)     (= 5x)
/// d = scale(c) ... repeated `tail` times (×2 each)
/// ```
pub(crate) fn diamond_program(tail: usize) -> ProgramDesc {
    let mut vars = vec![
        VarDesc::tensor("x"),
        VarDesc::tensor("a"),
        VarDesc::tensor("b"),
        VarDesc::tensor("c0"),
    ];
    let mut ops = vec![
        OpDesc::new("scale", ["x"], ["a"]),
        OpDesc::new("scale", ["x"], ["b"]).with_attr("scale", 3.0),
        OpDesc::new("add", ["a", "b"], ["c0"]),
    ];
    for i in 0..tail {
        vars.push(VarDesc::tensor(format!("c{}", i + 1)));
        ops.push(OpDesc::new(
            "scale",
            [format!("c{i}")],
            [format!("c{}", i + 1)],
        ));
    }
    ProgramDesc::new("diamond", vars, ops)
}

pub(crate) fn build(program: &ProgramDesc, places: &[Place]) -> Graph<Validated> {
    ReplicatedGraphBuilder
        .build(program, places, &registry())
        .unwrap()
}

/// One fresh scope per place, each holding `x = [1, 2]`.
pub(crate) fn scopes_with_input(places: &[Place]) -> Vec<Scope> {
    places
        .iter()
        .map(|_| {
            let s = Scope::new();
            let x = Tensor::from_f32(Shape::vector(2), &[1.0, 2.0]).unwrap();
            s.var("x", VarType::LodTensor).set_tensor(x);
            s
        })
        .collect()
}

/// Expected value of `c{tail}` for input `[1, 2]`.
pub(crate) fn expected_tail(tail: usize) -> Vec<f32> {
    let k = 5.0 * 2f32.powi(tail as i32);
    vec![k, 2.0 * k]
}
