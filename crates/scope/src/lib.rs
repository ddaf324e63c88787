// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # scope
//!
//! Variable storage for the execution engine.
//!
//! - [`Scope`]: a node in a tree of namespaces. Lookups fall back to the
//!   parent chain; kids are owned by their parent.
//! - [`Variable`]: a named, lock-protected slot holding a [`VarValue`].
//! - [`VarType`]: the declared kind of a variable.
//!
//! # Ownership
//! A parent holds strong handles to its kids and each kid holds only a weak
//! back-reference, so a kid never keeps its parent alive. Deleting a kid
//! from its parent releases every variable it owns once the last outside
//! handle is gone.
//!
//! ```text
//! global
//!  ├── device 1 scope
//!  │    └── step scope
//!  └── device 2 scope
//!       └── step scope
//! ```

mod error;
mod scope;
mod variable;

pub use error::ScopeError;
pub use scope::Scope;
pub use variable::{FetchList, VarType, VarValue, Variable};
