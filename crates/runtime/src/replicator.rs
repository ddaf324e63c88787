// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Copying initial parameter values from device 0 to the other devices.

use crate::RuntimeError;
use device::CommContextMap;
use scope::{Scope, VarType};
use tensor_core::Place;

/// Learning-rate decay counter. Always deep-copied: sharing it would make
/// every device advance the same counter.
pub const LR_DECAY_COUNTER: &str = "@LR_DECAY_COUNTER@";

/// Broadcasts device-0 state to every other device scope.
#[derive(Debug, Clone, Copy)]
pub struct Replicator<'a> {
    scopes: &'a [Scope],
    comms: Option<&'a CommContextMap>,
    use_all_reduce: bool,
    use_accel: bool,
}

impl<'a> Replicator<'a> {
    /// `scopes[0]` is the source.
    pub fn new(
        scopes: &'a [Scope],
        comms: Option<&'a CommContextMap>,
        use_all_reduce: bool,
        use_accel: bool,
    ) -> Self {
        Self {
            scopes,
            comms,
            use_all_reduce,
            use_accel,
        }
    }

    /// Copies each of `names` that device 0 holds as an initialized dense
    /// tensor. Other names are skipped. Returns the number of variables
    /// copied.
    ///
    /// Accelerator tensors go through one grouped broadcast per variable;
    /// device 0 keeps its own buffer. Host tensors are deep-copied when
    /// devices update them independently (all-reduce, accelerator
    /// execution, or the decay counter) and shared otherwise.
    pub fn broadcast<S: AsRef<str>>(&self, names: &[S]) -> Result<usize, RuntimeError> {
        let Some((source, others)) = self.scopes.split_first() else {
            return Ok(0);
        };

        let mut copied = 0;
        for name in names.iter().map(AsRef::as_ref) {
            let Some(var) = source.find_var(name) else {
                continue;
            };
            if !var.is_dense_tensor() {
                continue;
            }
            let main = var.tensor()?;

            if main.place().is_accel() {
                let comms = self.comms.ok_or_else(|| {
                    RuntimeError::Config(format!(
                        "'{name}' lives on {} but no communicators exist",
                        main.place()
                    ))
                })?;
                let copies = comms.group_broadcast(&main, 0)?;
                for (scope, t) in others.iter().zip(copies.into_iter().skip(1)) {
                    scope.var(name, VarType::LodTensor).set_tensor(t);
                }
            } else {
                let deep = self.use_all_reduce || self.use_accel || name == LR_DECAY_COUNTER;
                for scope in others {
                    let t = if deep {
                        main.deep_copy_to(Place::Cpu)
                    } else {
                        main.share_data_with()
                    };
                    scope.var(name, VarType::LodTensor).set_tensor(t);
                }
            }
            tracing::trace!(var = name, place = %main.place(), "broadcast");
            copied += 1;
        }

        tracing::debug!(copied, devices = self.scopes.len(), "parameters broadcast");
        Ok(copied)
    }
}
