// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The scope tree.

use crate::{ScopeError, VarType, Variable};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

struct ScopeInner {
    vars: RwLock<HashMap<String, Arc<Variable>>>,
    kids: Mutex<Vec<Scope>>,
    parent: Weak<ScopeInner>,
}

/// A cheaply cloneable handle to a node of the scope tree.
///
/// Clones refer to the same node; compare nodes with [`Scope::ptr_eq`].
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

impl Scope {
    /// Creates a root scope.
    pub fn new() -> Self {
        Self::with_parent(Weak::new())
    }

    fn with_parent(parent: Weak<ScopeInner>) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                vars: RwLock::new(HashMap::new()),
                kids: Mutex::new(Vec::new()),
                parent,
            }),
        }
    }

    /// Creates a kid scope owned by `self`.
    pub fn new_scope(&self) -> Scope {
        let kid = Scope::with_parent(Arc::downgrade(&self.inner));
        self.inner.kids.lock().push(kid.clone());
        kid
    }

    /// Detaches `kid` from this scope. Returns `false` if it is not a kid
    /// of this scope.
    pub fn delete_scope(&self, kid: &Scope) -> bool {
        let mut kids = self.inner.kids.lock();
        let before = kids.len();
        kids.retain(|k| !k.ptr_eq(kid));
        before != kids.len()
    }

    /// Detaches every kid.
    pub fn drop_kids(&self) {
        let dropped = std::mem::take(&mut *self.inner.kids.lock());
        tracing::trace!(count = dropped.len(), "dropped kid scopes");
    }

    /// Returns `true` when `kid` was created under this scope and not yet deleted.
    pub fn has_kid(&self, kid: &Scope) -> bool {
        self.inner.kids.lock().iter().any(|k| k.ptr_eq(kid))
    }

    pub fn num_kids(&self) -> usize {
        self.inner.kids.lock().len()
    }

    /// Returns the parent, if it is still alive.
    pub fn parent(&self) -> Option<Scope> {
        self.inner.parent.upgrade().map(|inner| Scope { inner })
    }

    /// Returns `true` when both handles refer to the same scope.
    pub fn ptr_eq(&self, other: &Scope) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Returns the variable named `name` in this scope, creating an
    /// uninitialized one of kind `var_type` if absent.
    pub fn var(&self, name: &str, var_type: VarType) -> Arc<Variable> {
        if let Some(v) = self.inner.vars.read().get(name) {
            return Arc::clone(v);
        }
        let mut vars = self.inner.vars.write();
        Arc::clone(
            vars.entry(name.to_string())
                .or_insert_with(|| Arc::new(Variable::new(name, var_type))),
        )
    }

    /// Looks `name` up in this scope only.
    pub fn find_local_var(&self, name: &str) -> Option<Arc<Variable>> {
        self.inner.vars.read().get(name).cloned()
    }

    /// Looks `name` up in this scope, then in each ancestor.
    pub fn find_var(&self, name: &str) -> Option<Arc<Variable>> {
        if let Some(v) = self.find_local_var(name) {
            return Some(v);
        }
        let mut current = self.inner.parent.upgrade();
        while let Some(scope) = current {
            if let Some(v) = scope.vars.read().get(name) {
                return Some(Arc::clone(v));
            }
            current = scope.parent.upgrade();
        }
        None
    }

    /// Like [`find_var`](Scope::find_var) but errors when absent.
    pub fn get_var(&self, name: &str) -> Result<Arc<Variable>, ScopeError> {
        self.find_var(name)
            .ok_or_else(|| ScopeError::VarNotFound(name.to_string()))
    }

    /// Removes the named variables from this scope.
    pub fn erase_vars<S: AsRef<str>>(&self, names: &[S]) {
        let mut vars = self.inner.vars.write();
        for name in names {
            vars.remove(name.as_ref());
        }
    }

    /// Names of the variables owned by this scope, sorted.
    pub fn local_var_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.inner.vars.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("vars", &self.inner.vars.read().len())
            .field("kids", &self.num_kids())
            .finish()
    }
}
