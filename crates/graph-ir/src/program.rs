// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! JSON program descriptions.
//!
//! A program lists the variables it touches and its operators in program
//! order. It says nothing about devices: the graph builder replicates it.
//!
//! # Format
//! ```json
//! {
//!   "name": "mlp",
//!   "vars": [
//!     { "name": "x" },
//!     { "name": "w", "persistable": true, "dtype": "f32" },
//!     { "name": "h" }
//!   ],
//!   "ops": [
//!     { "type": "mul", "inputs": ["x", "w"], "outputs": ["h"] },
//!     { "type": "scale", "inputs": ["h"], "outputs": ["h"], "attrs": { "scale": 0.5 } }
//!   ]
//! }
//! ```

use crate::{Attrs, GraphError};
use scope::VarType;
use std::collections::HashSet;
use std::path::Path;
use tensor_core::DType;

/// A declared variable.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct VarDesc {
    pub name: String,
    #[serde(default = "default_var_type")]
    pub var_type: VarType,
    /// Persistable variables (parameters) live in the device scopes and are
    /// never reclaimed between steps.
    #[serde(default)]
    pub persistable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dtype: Option<DType>,
}

fn default_var_type() -> VarType {
    VarType::LodTensor
}

impl VarDesc {
    /// A non-persistable dense tensor.
    pub fn tensor(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            var_type: VarType::LodTensor,
            persistable: false,
            dtype: None,
        }
    }

    /// A persistable dense tensor.
    pub fn parameter(name: impl Into<String>) -> Self {
        Self {
            persistable: true,
            ..Self::tensor(name)
        }
    }
}

/// One operator invocation.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OpDesc {
    #[serde(rename = "type")]
    pub op_type: String,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default, skip_serializing_if = "Attrs::is_empty")]
    pub attrs: Attrs,
}

impl OpDesc {
    pub fn new<I, O>(op_type: &str, inputs: I, outputs: O) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
        O: IntoIterator,
        O::Item: Into<String>,
    {
        Self {
            op_type: op_type.to_string(),
            inputs: inputs.into_iter().map(Into::into).collect(),
            outputs: outputs.into_iter().map(Into::into).collect(),
            attrs: Attrs::new(),
        }
    }

    /// Builder-style attribute setter.
    pub fn with_attr(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.attrs.insert(key.to_string(), value.into());
        self
    }
}

/// A complete program.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ProgramDesc {
    #[serde(default = "default_name")]
    pub name: String,
    pub vars: Vec<VarDesc>,
    pub ops: Vec<OpDesc>,
}

fn default_name() -> String {
    "program".to_string()
}

impl ProgramDesc {
    pub fn new(name: impl Into<String>, vars: Vec<VarDesc>, ops: Vec<OpDesc>) -> Self {
        Self {
            name: name.into(),
            vars,
            ops,
        }
    }

    /// Loads a program from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, GraphError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parses a program from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, GraphError> {
        let program: Self = serde_json::from_str(json)?;
        Ok(program)
    }

    pub fn to_json(&self) -> Result<String, GraphError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Checks that the program is internally consistent.
    ///
    /// Checks:
    /// - At least one op is defined.
    /// - Variable names are unique.
    /// - Every op input and output is declared.
    pub fn validate(&self) -> Result<(), GraphError> {
        if self.ops.is_empty() {
            return Err(GraphError::InvalidProgram(format!(
                "program '{}' contains no ops",
                self.name
            )));
        }

        let mut declared = HashSet::new();
        for var in &self.vars {
            if !declared.insert(var.name.as_str()) {
                return Err(GraphError::InvalidProgram(format!(
                    "duplicate variable '{}'",
                    var.name
                )));
            }
        }

        for (i, op) in self.ops.iter().enumerate() {
            if op.op_type.is_empty() {
                return Err(GraphError::InvalidProgram(format!("op #{i} has no type")));
            }
            for name in op.inputs.iter().chain(&op.outputs) {
                if !declared.contains(name.as_str()) {
                    return Err(GraphError::InvalidProgram(format!(
                        "op #{i} ({}) references undeclared variable '{name}'",
                        op.op_type
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn var(&self, name: &str) -> Option<&VarDesc> {
        self.vars.iter().find(|v| v.name == name)
    }

    /// Names of all persistable variables.
    pub fn persistable_vars(&self) -> Vec<&str> {
        self.vars
            .iter()
            .filter(|v| v.persistable)
            .map(|v| v.name.as_str())
            .collect()
    }

    /// Returns `true` if any op has the given type.
    pub fn has_op_type(&self, op_type: &str) -> bool {
        self.ops.iter().any(|op| op.op_type == op_type)
    }

    /// Returns `true` if any variable is declared with the given kind.
    pub fn has_var_type(&self, var_type: VarType) -> bool {
        self.vars.iter().any(|v| v.var_type == var_type)
    }
}
