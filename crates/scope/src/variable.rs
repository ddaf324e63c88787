// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Variables and the values they hold.

use crate::ScopeError;
use parking_lot::RwLock;
use tensor_core::Tensor;

/// Per-fetch results of one step, in fetch-name order.
pub type FetchList = Vec<Tensor>;

/// Declared kind of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarType {
    /// Dense tensor, optionally carrying sequence metadata.
    LodTensor,
    /// Sparse row set: a dense value tensor plus the row ids it covers.
    SelectedRows,
    /// The step output slot.
    FetchList,
    /// Opaque; the engine never reads or frees it.
    Raw,
}

/// Current content of a [`Variable`].
#[derive(Debug, Clone)]
pub enum VarValue {
    /// Declared but not yet written.
    Uninit(VarType),
    Tensor(Tensor),
    SelectedRows {
        rows: Vec<i64>,
        height: usize,
        value: Tensor,
    },
    FetchList(FetchList),
}

impl VarValue {
    /// Kind of the value (or the declared kind when uninitialized).
    pub fn var_type(&self) -> VarType {
        match self {
            VarValue::Uninit(t) => *t,
            VarValue::Tensor(_) => VarType::LodTensor,
            VarValue::SelectedRows { .. } => VarType::SelectedRows,
            VarValue::FetchList(_) => VarType::FetchList,
        }
    }
}

/// A named slot in a [`crate::Scope`].
///
/// Readers clone the held tensor, which shares the underlying buffer; the
/// buffer is released once the variable is cleared and every clone dropped.
#[derive(Debug)]
pub struct Variable {
    name: String,
    value: RwLock<VarValue>,
}

impl Variable {
    pub(crate) fn new(name: impl Into<String>, var_type: VarType) -> Self {
        Self {
            name: name.into(),
            value: RwLock::new(VarValue::Uninit(var_type)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn var_type(&self) -> VarType {
        self.value.read().var_type()
    }

    /// Returns `true` once a value has been written.
    pub fn is_initialized(&self) -> bool {
        !matches!(*self.value.read(), VarValue::Uninit(_))
    }

    /// Returns `true` when the variable holds an initialized dense tensor.
    pub fn is_dense_tensor(&self) -> bool {
        matches!(*self.value.read(), VarValue::Tensor(_))
    }

    /// Returns a snapshot of the held value.
    pub fn value(&self) -> VarValue {
        self.value.read().clone()
    }

    /// Replaces the held value.
    pub fn set_value(&self, value: VarValue) {
        *self.value.write() = value;
    }

    /// Returns the held dense tensor (sharing its buffer).
    pub fn tensor(&self) -> Result<Tensor, ScopeError> {
        match &*self.value.read() {
            VarValue::Tensor(t) => Ok(t.clone()),
            VarValue::Uninit(VarType::LodTensor) => Err(ScopeError::Uninitialized(self.name.clone())),
            other => Err(ScopeError::TypeMismatch {
                name: self.name.clone(),
                expected: VarType::LodTensor,
                actual: other.var_type(),
            }),
        }
    }

    pub fn set_tensor(&self, tensor: Tensor) {
        *self.value.write() = VarValue::Tensor(tensor);
    }

    /// Removes the held tensor or sparse value, leaving the variable
    /// uninitialized with its declared kind.
    ///
    /// Returns the removed tensor so the caller can hand its buffer to a
    /// collector. Fetch lists and raw values are left untouched.
    pub fn take_tensor(&self) -> Option<Tensor> {
        let mut guard = self.value.write();
        match &*guard {
            VarValue::Tensor(_) | VarValue::SelectedRows { .. } => {}
            _ => return None,
        }
        let kind = guard.var_type();
        match std::mem::replace(&mut *guard, VarValue::Uninit(kind)) {
            VarValue::Tensor(t) => Some(t),
            VarValue::SelectedRows { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Returns the fetched tensors of the last step.
    pub fn fetch_list(&self) -> Result<FetchList, ScopeError> {
        match &*self.value.read() {
            VarValue::FetchList(list) => Ok(list.clone()),
            VarValue::Uninit(VarType::FetchList) => Err(ScopeError::Uninitialized(self.name.clone())),
            other => Err(ScopeError::TypeMismatch {
                name: self.name.clone(),
                expected: VarType::FetchList,
                actual: other.var_type(),
            }),
        }
    }

    pub fn set_fetch_list(&self, list: FetchList) {
        *self.value.write() = VarValue::FetchList(list);
    }
}
