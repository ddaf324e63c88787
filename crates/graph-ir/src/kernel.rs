// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Operator kernels.
//!
//! The engine is agnostic to what operators compute. Each op type maps to an
//! [`OpKernel`] in a [`KernelRegistry`]; at run time the kernel receives a
//! [`KernelContext`] bound to the op's device scope.

use scope::{Scope, ScopeError, VarType};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tensor_core::{Place, Tensor, TensorError};

/// Op attributes, as written in the program.
pub type Attrs = BTreeMap<String, serde_json::Value>;

/// Errors a kernel may report.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    #[error(transparent)]
    Scope(#[from] ScopeError),

    #[error(transparent)]
    Tensor(#[from] TensorError),

    #[error("op has no input #{0}")]
    MissingInput(usize),

    #[error("op has no output #{0}")]
    MissingOutput(usize),

    #[error("attribute '{name}': {detail}")]
    BadAttr { name: String, detail: String },

    #[error("{0}")]
    Failed(String),
}

/// The computation behind one op type.
///
/// Kernels run on a worker thread (host places) or on the device's compute
/// stream (accelerator places) and must be thread-safe.
pub trait OpKernel: Send + Sync + 'static {
    fn compute(&self, ctx: &mut KernelContext) -> Result<(), KernelError>;
}

impl<F> OpKernel for F
where
    F: Fn(&mut KernelContext) -> Result<(), KernelError> + Send + Sync + 'static,
{
    fn compute(&self, ctx: &mut KernelContext) -> Result<(), KernelError> {
        self(ctx)
    }
}

/// Everything a kernel may see while running one op.
///
/// Inputs are resolved through the scope chain (exec scope → device scope
/// → global scope). Outputs are written to the nearest existing variable of
/// that name, or created in the exec scope.
#[derive(Debug, Clone)]
pub struct KernelContext {
    op_type: String,
    place: Place,
    scope: Scope,
    inputs: Vec<String>,
    outputs: Vec<String>,
    attrs: Arc<Attrs>,
}

impl KernelContext {
    pub fn new(
        op_type: impl Into<String>,
        place: Place,
        scope: Scope,
        inputs: Vec<String>,
        outputs: Vec<String>,
        attrs: Arc<Attrs>,
    ) -> Self {
        Self {
            op_type: op_type.into(),
            place,
            scope,
            inputs,
            outputs,
            attrs,
        }
    }

    pub fn op_type(&self) -> &str {
        &self.op_type
    }

    /// Device the op is placed on. Outputs should be produced here.
    pub fn place(&self) -> Place {
        self.place
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn num_inputs(&self) -> usize {
        self.inputs.len()
    }

    pub fn num_outputs(&self) -> usize {
        self.outputs.len()
    }

    pub fn input_name(&self, index: usize) -> Result<&str, KernelError> {
        self.inputs
            .get(index)
            .map(String::as_str)
            .ok_or(KernelError::MissingInput(index))
    }

    pub fn output_name(&self, index: usize) -> Result<&str, KernelError> {
        self.outputs
            .get(index)
            .map(String::as_str)
            .ok_or(KernelError::MissingOutput(index))
    }

    /// Reads input `index` as a dense tensor.
    pub fn input(&self, index: usize) -> Result<Tensor, KernelError> {
        let name = self.input_name(index)?;
        Ok(self.scope.get_var(name)?.tensor()?)
    }

    /// Writes output `index`.
    pub fn set_output(&self, index: usize, tensor: Tensor) -> Result<(), KernelError> {
        let name = self.output_name(index)?;
        let var = self
            .scope
            .find_var(name)
            .unwrap_or_else(|| self.scope.var(name, VarType::LodTensor));
        var.set_tensor(tensor);
        Ok(())
    }

    pub fn attr(&self, name: &str) -> Option<&serde_json::Value> {
        self.attrs.get(name)
    }

    /// Reads a numeric attribute as `f32`.
    pub fn attr_f32(&self, name: &str) -> Result<f32, KernelError> {
        let value = self.attr(name).ok_or_else(|| KernelError::BadAttr {
            name: name.to_string(),
            detail: "missing".into(),
        })?;
        value
            .as_f64()
            .map(|v| v as f32)
            .ok_or_else(|| KernelError::BadAttr {
                name: name.to_string(),
                detail: format!("expected a number, got {value}"),
            })
    }

    /// Like [`attr_f32`](KernelContext::attr_f32) with a fallback for
    /// absent attributes.
    pub fn attr_f32_or(&self, name: &str, default: f32) -> Result<f32, KernelError> {
        match self.attr(name) {
            None => Ok(default),
            Some(_) => self.attr_f32(name),
        }
    }
}

/// Maps op types to kernels.
#[derive(Clone, Default)]
pub struct KernelRegistry {
    kernels: HashMap<String, Arc<dyn OpKernel>>,
}

impl KernelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the kernel for `op_type`.
    pub fn register<K: OpKernel>(&mut self, op_type: &str, kernel: K) -> &mut Self {
        if self
            .kernels
            .insert(op_type.to_string(), Arc::new(kernel))
            .is_some()
        {
            tracing::warn!(op_type, "kernel replaced");
        }
        self
    }

    pub fn get(&self, op_type: &str) -> Option<Arc<dyn OpKernel>> {
        self.kernels.get(op_type).cloned()
    }

    pub fn contains(&self, op_type: &str) -> bool {
        self.kernels.contains_key(op_type)
    }

    /// Registered op types, sorted.
    pub fn op_types(&self) -> Vec<&str> {
        let mut types: Vec<_> = self.kernels.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

impl std::fmt::Debug for KernelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelRegistry")
            .field("op_types", &self.op_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tensor_core::Shape;

    fn double(ctx: &mut KernelContext) -> Result<(), KernelError> {
        let x = ctx.input(0)?;
        let factor = ctx.attr_f32_or("factor", 2.0)?;
        let values: Vec<f32> = x.to_f32_vec()?.iter().map(|v| v * factor).collect();
        ctx.set_output(0, Tensor::from_f32(x.shape().clone(), &values)?)
    }

    fn context(scope: &Scope, attrs: Attrs) -> KernelContext {
        KernelContext::new(
            "double",
            Place::Cpu,
            scope.clone(),
            vec!["x".into()],
            vec!["y".into()],
            Arc::new(attrs),
        )
    }

    #[test]
    fn test_kernel_reads_and_writes_scope() {
        let global = Scope::new();
        global
            .var("x", VarType::LodTensor)
            .set_tensor(Tensor::from_f32(Shape::vector(2), &[1.0, 2.0]).unwrap());
        let exec = global.new_scope();

        let mut ctx = context(&exec, Attrs::new());
        double(&mut ctx).unwrap();

        let y = exec.find_local_var("y").unwrap().tensor().unwrap();
        assert_eq!(y.to_f32_vec().unwrap(), vec![2.0, 4.0]);
        assert!(global.find_local_var("y").is_none());
    }

    #[test]
    fn test_output_goes_to_existing_var() {
        let global = Scope::new();
        global
            .var("x", VarType::LodTensor)
            .set_tensor(Tensor::from_f32(Shape::vector(1), &[3.0]).unwrap());
        global.var("y", VarType::LodTensor);
        let exec = global.new_scope();

        double(&mut context(&exec, Attrs::new())).unwrap();
        assert!(exec.find_local_var("y").is_none());
        assert!(global.find_local_var("y").unwrap().is_initialized());
    }

    #[test]
    fn test_missing_input_var() {
        let scope = Scope::new();
        let err = double(&mut context(&scope, Attrs::new())).unwrap_err();
        assert!(matches!(err, KernelError::Scope(ScopeError::VarNotFound(_))));
        assert!(matches!(
            context(&scope, Attrs::new()).input(5),
            Err(KernelError::MissingInput(5))
        ));
    }

    #[test]
    fn test_bad_attr() {
        let scope = Scope::new();
        let mut attrs = Attrs::new();
        attrs.insert("factor".into(), serde_json::json!("two"));
        let ctx = context(&scope, attrs);
        assert!(matches!(ctx.attr_f32("factor"), Err(KernelError::BadAttr { .. })));
        assert!(ctx.attr_f32("absent").is_err());
    }

    #[test]
    fn test_registry() {
        let mut registry = KernelRegistry::new();
        registry
            .register("double", double)
            .register("noop", |_: &mut KernelContext| -> Result<(), KernelError> { Ok(()) });
        assert!(registry.contains("double"));
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.op_types(), vec!["double", "noop"]);
    }
}
