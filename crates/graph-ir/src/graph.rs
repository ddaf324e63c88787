// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The SSA dependency graph.
//!
//! # Type-State Pattern
//!
//! ```text
//! Graph<Built>      : nodes added, not yet checked.
//!       │  .validate()
//!       ▼
//! Graph<Validated>  : acyclic, all references resolved, dependency
//!                     tables computed; ready for executors and passes.
//! ```
//!
//! Executors only accept `Graph<Validated>`, so they never see a graph whose
//! dependency tables are missing or stale.
//!
//! # Nodes
//! A [`VarNode`] is one *version* of a named variable on one device: every
//! write creates a new version with exactly one generator op. Control
//! variable nodes carry no data and only order two ops.

use crate::{Attrs, GraphError, OpKernel};
use scope::{Scope, VarType};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tensor_core::Place;

pub type OpId = usize;
pub type VarId = usize;

/// Error type returned by [`CompletionHook`]s.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

// ── Type-state markers ─────────────────────────────────────────────

/// Marker: graph has been built but not validated.
#[derive(Debug, Clone)]
pub struct Built;

/// Marker: graph has been validated and is ready to execute.
#[derive(Debug, Clone)]
pub struct Validated;

/// Sealed trait for graph states.
pub trait GraphState: fmt::Debug + Clone {}
impl GraphState for Built {}
impl GraphState for Validated {}

// ── Nodes ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Data,
    /// Ordering-only edge, never materialized in a scope.
    Control,
}

/// One version of a variable on one device.
#[derive(Debug, Clone)]
pub struct VarNode {
    pub id: VarId,
    pub name: String,
    pub kind: VarKind,
    /// Index into [`Graph::places`].
    pub device: usize,
    pub version: usize,
    pub var_type: VarType,
    pub persistable: bool,
    pub generator: Option<OpId>,
    pub readers: Vec<OpId>,
}

impl VarNode {
    pub fn is_control(&self) -> bool {
        self.kind == VarKind::Control
    }
}

/// One operator instance placed on one device.
#[derive(Clone)]
pub struct OpNode {
    pub id: OpId,
    pub op_type: String,
    /// Index into [`Graph::places`].
    pub device: usize,
    pub place: Place,
    /// Data and control inputs.
    pub inputs: Vec<VarId>,
    /// Data and control outputs.
    pub outputs: Vec<VarId>,
    /// Names of the data inputs in argument order.
    pub input_names: Vec<String>,
    /// Names of the data outputs in argument order.
    pub output_names: Vec<String>,
    pub attrs: Arc<Attrs>,
    pub kernel: Arc<dyn OpKernel>,
}

impl OpNode {
    /// Short label used in logs and errors, e.g. `scale#3@accel:1`.
    pub fn label(&self) -> String {
        format!("{}#{}@{}", self.op_type, self.id, self.place)
    }
}

impl fmt::Debug for OpNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpNode")
            .field("id", &self.id)
            .field("op_type", &self.op_type)
            .field("place", &self.place)
            .field("inputs", &self.input_names)
            .field("outputs", &self.output_names)
            .finish()
    }
}

// ── Completion hooks ───────────────────────────────────────────────

/// Callback run by every executor right after an op's kernel succeeds,
/// on the thread that ran the op. `scope` is the op's device exec scope.
pub trait CompletionHook: Send + Sync {
    fn on_op_complete(&self, op: &OpNode, scope: &Scope) -> Result<(), HookError>;
}

// ── Graph ──────────────────────────────────────────────────────────

/// The dependency graph of one step.
#[derive(Clone)]
pub struct Graph<S: GraphState = Built> {
    pub name: String,
    places: Vec<Place>,
    vars: Vec<VarNode>,
    ops: Vec<OpNode>,
    hooks: Vec<Arc<dyn CompletionHook>>,
    deps: Vec<Vec<OpId>>,
    dependents: Vec<Vec<OpId>>,
    _state: std::marker::PhantomData<S>,
}

// ── Built state ────────────────────────────────────────────────────

impl Graph<Built> {
    /// Creates an empty graph over `places`.
    pub fn new(name: impl Into<String>, places: Vec<Place>) -> Self {
        Self {
            name: name.into(),
            places,
            vars: Vec::new(),
            ops: Vec::new(),
            hooks: Vec::new(),
            deps: Vec::new(),
            dependents: Vec::new(),
            _state: std::marker::PhantomData,
        }
    }

    /// Adds a data variable node with no generator yet.
    pub fn add_var(
        &mut self,
        name: &str,
        device: usize,
        version: usize,
        var_type: VarType,
        persistable: bool,
    ) -> VarId {
        let id = self.vars.len();
        self.vars.push(VarNode {
            id,
            name: name.to_string(),
            kind: VarKind::Data,
            device,
            version,
            var_type,
            persistable,
            generator: None,
            readers: Vec::new(),
        });
        id
    }

    /// Adds an op reading `inputs` and generating `outputs`.
    ///
    /// Names are taken from the data var nodes, in the order given.
    pub fn add_op(
        &mut self,
        op_type: &str,
        device: usize,
        inputs: Vec<VarId>,
        outputs: Vec<VarId>,
        attrs: Arc<Attrs>,
        kernel: Arc<dyn OpKernel>,
    ) -> Result<OpId, GraphError> {
        let place = *self.places.get(device).ok_or_else(|| {
            GraphError::InvalidGraph(format!(
                "op '{op_type}' placed on device {device}, graph has {}",
                self.places.len()
            ))
        })?;
        let id = self.ops.len();
        for &v in inputs.iter().chain(&outputs) {
            self.var_mut(v)?;
        }
        for &v in &outputs {
            let node = &self.vars[v];
            if let Some(other) = node.generator {
                return Err(GraphError::InvalidGraph(format!(
                    "var '{}' v{} generated by both op {other} and op {id}",
                    node.name, node.version
                )));
            }
        }

        let mut input_names = Vec::with_capacity(inputs.len());
        for &v in &inputs {
            let node = &mut self.vars[v];
            node.readers.push(id);
            input_names.push(node.name.clone());
        }
        let mut output_names = Vec::with_capacity(outputs.len());
        for &v in &outputs {
            let node = &mut self.vars[v];
            node.generator = Some(id);
            output_names.push(node.name.clone());
        }
        self.ops.push(OpNode {
            id,
            op_type: op_type.to_string(),
            device,
            place,
            inputs,
            outputs,
            input_names,
            output_names,
            attrs,
            kernel,
        });
        Ok(id)
    }

    /// Orders `after` behind `before` through a fresh control var node.
    pub fn add_control_dep(&mut self, before: OpId, after: OpId) -> Result<VarId, GraphError> {
        if before >= self.ops.len() || after >= self.ops.len() {
            return Err(GraphError::InvalidGraph(format!(
                "control dependency {before} -> {after} references a missing op"
            )));
        }
        let id = self.vars.len();
        let device = self.ops[after].device;
        self.vars.push(VarNode {
            id,
            name: format!("__ctrl_{id}"),
            kind: VarKind::Control,
            device,
            version: 0,
            var_type: VarType::Raw,
            persistable: false,
            generator: Some(before),
            readers: vec![after],
        });
        self.ops[before].outputs.push(id);
        self.ops[after].inputs.push(id);
        Ok(id)
    }

    fn var_mut(&mut self, id: VarId) -> Result<&mut VarNode, GraphError> {
        self.vars
            .get_mut(id)
            .ok_or_else(|| GraphError::InvalidGraph(format!("var node {id} does not exist")))
    }

    /// Validates the graph and transitions to the `Validated` state.
    ///
    /// # Checks
    /// - The graph has at least one place and one op.
    /// - Every op's place matches its device slot.
    /// - Generator/reader links agree with op input/output lists.
    /// - The dependency relation is acyclic.
    pub fn validate(self) -> Result<Graph<Validated>, GraphError> {
        if self.places.is_empty() {
            return Err(GraphError::InvalidGraph("graph has no places".into()));
        }
        if self.ops.is_empty() {
            return Err(GraphError::InvalidGraph(format!(
                "graph '{}' contains no ops",
                self.name
            )));
        }

        for op in &self.ops {
            if self.places.get(op.device) != Some(&op.place) {
                return Err(GraphError::InvalidGraph(format!(
                    "op {} is not placed on a known device",
                    op.label()
                )));
            }
            for &v in &op.inputs {
                if !self.vars[v].readers.contains(&op.id) {
                    return Err(GraphError::InvalidGraph(format!(
                        "op {} reads var {v} without being registered as a reader",
                        op.label()
                    )));
                }
            }
            for &v in &op.outputs {
                if self.vars[v].generator != Some(op.id) {
                    return Err(GraphError::InvalidGraph(format!(
                        "op {} writes var {v} it does not generate",
                        op.label()
                    )));
                }
            }
        }

        let mut deps = vec![Vec::new(); self.ops.len()];
        let mut dependents = vec![Vec::new(); self.ops.len()];
        for op in &self.ops {
            for &v in &op.inputs {
                if let Some(g) = self.vars[v].generator {
                    if g != op.id && !deps[op.id].contains(&g) {
                        deps[op.id].push(g);
                        dependents[g].push(op.id);
                    }
                }
            }
        }

        // Kahn's algorithm: every op must become ready.
        let mut pending: Vec<usize> = deps.iter().map(Vec::len).collect();
        let mut queue: VecDeque<OpId> = (0..self.ops.len()).filter(|&i| pending[i] == 0).collect();
        let mut visited = 0;
        while let Some(op) = queue.pop_front() {
            visited += 1;
            for &next in &dependents[op] {
                pending[next] -= 1;
                if pending[next] == 0 {
                    queue.push_back(next);
                }
            }
        }
        if visited != self.ops.len() {
            return Err(GraphError::Cycle {
                remaining: self.ops.len() - visited,
            });
        }

        tracing::debug!(
            graph = %self.name,
            ops = self.ops.len(),
            vars = self.vars.len(),
            "graph validated"
        );

        Ok(Graph {
            name: self.name,
            places: self.places,
            vars: self.vars,
            ops: self.ops,
            hooks: self.hooks,
            deps,
            dependents,
            _state: std::marker::PhantomData,
        })
    }
}

// ── Validated state ────────────────────────────────────────────────

impl Graph<Validated> {
    /// Ops this op waits for (generators of its inputs), deduplicated.
    pub fn deps(&self, op: OpId) -> &[OpId] {
        &self.deps[op]
    }

    /// Ops waiting for this op.
    pub fn dependents(&self, op: OpId) -> &[OpId] {
        &self.dependents[op]
    }

    /// Number of ops each op waits for, indexed by op id.
    pub fn pending_counts(&self) -> Vec<usize> {
        self.deps.iter().map(Vec::len).collect()
    }

    /// Ops with no dependencies, in id order.
    pub fn initial_ready(&self) -> Vec<OpId> {
        (0..self.ops.len()).filter(|&i| self.deps[i].is_empty()).collect()
    }

    /// Installs a hook run after every completed op.
    pub fn install_hook(&mut self, hook: Arc<dyn CompletionHook>) {
        self.hooks.push(hook);
    }

    pub fn hooks(&self) -> &[Arc<dyn CompletionHook>] {
        &self.hooks
    }

    /// Runs every installed hook for `op`, stopping at the first failure.
    pub fn notify_complete(&self, op: &OpNode, scope: &Scope) -> Result<(), HookError> {
        for hook in &self.hooks {
            hook.on_op_complete(op, scope)?;
        }
        Ok(())
    }

    /// Number of weakly connected components among the ops of `device`
    /// (or of the whole graph when `None`).
    pub fn connected_components(&self, device: Option<usize>) -> usize {
        let selected = |op: &OpNode| device.map_or(true, |d| op.device == d);
        let mut parent: Vec<usize> = (0..self.ops.len()).collect();

        fn find(parent: &mut [usize], mut x: usize) -> usize {
            while parent[x] != x {
                parent[x] = parent[parent[x]];
                x = parent[x];
            }
            x
        }

        for op in self.ops.iter().filter(|op| selected(op)) {
            for &d in &self.deps[op.id] {
                if selected(&self.ops[d]) {
                    let a = find(&mut parent, op.id);
                    let b = find(&mut parent, d);
                    parent[a] = b;
                }
            }
        }
        // Ops sharing an input version also belong together.
        for var in &self.vars {
            let readers: Vec<_> = var
                .readers
                .iter()
                .copied()
                .filter(|&r| selected(&self.ops[r]))
                .collect();
            for pair in readers.windows(2) {
                let a = find(&mut parent, pair[0]);
                let b = find(&mut parent, pair[1]);
                parent[a] = b;
            }
        }

        let mut roots = std::collections::HashSet::new();
        for op in self.ops.iter().filter(|op| selected(op)) {
            roots.insert(find(&mut parent, op.id));
        }
        roots.len()
    }

    /// Chains the ops of every device in id order with control
    /// dependencies, so each device runs one op at a time in program order.
    ///
    /// Installed hooks are kept.
    pub fn sequentialize(self) -> Result<Graph<Validated>, GraphError> {
        let mut built = Graph::<Built> {
            name: self.name,
            places: self.places,
            vars: self.vars,
            ops: self.ops,
            hooks: self.hooks,
            deps: Vec::new(),
            dependents: Vec::new(),
            _state: std::marker::PhantomData,
        };
        for device in 0..built.places.len() {
            let ids: Vec<OpId> = built.ops_on(device).map(|op| op.id).collect();
            for pair in ids.windows(2) {
                if !self.deps[pair[1]].contains(&pair[0]) {
                    built.add_control_dep(pair[0], pair[1])?;
                }
            }
        }
        built.validate()
    }

    /// Returns a one-line description of the graph.
    pub fn summary(&self) -> String {
        let control = self.vars.iter().filter(|v| v.is_control()).count();
        format!(
            "Graph '{}': {} ops on {} devices, {} var nodes ({} control)",
            self.name,
            self.ops.len(),
            self.places.len(),
            self.vars.len(),
            control,
        )
    }
}

// ── Shared implementations ─────────────────────────────────────────

impl<S: GraphState> Graph<S> {
    pub fn places(&self) -> &[Place] {
        &self.places
    }

    pub fn ops(&self) -> &[OpNode] {
        &self.ops
    }

    pub fn op(&self, id: OpId) -> &OpNode {
        &self.ops[id]
    }

    pub fn vars(&self) -> &[VarNode] {
        &self.vars
    }

    pub fn var(&self, id: VarId) -> &VarNode {
        &self.vars[id]
    }

    pub fn num_ops(&self) -> usize {
        self.ops.len()
    }

    /// Ops placed on `device`.
    pub fn ops_on(&self, device: usize) -> impl Iterator<Item = &OpNode> {
        self.ops.iter().filter(move |op| op.device == device)
    }
}

impl<S: GraphState> fmt::Debug for Graph<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("name", &self.name)
            .field("places", &self.places)
            .field("ops", &self.ops.len())
            .field("vars", &self.vars.len())
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

impl<S: GraphState> fmt::Display for Graph<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Graph '{}' ({} ops):", self.name, self.ops.len())?;
        for op in &self.ops {
            writeln!(
                f,
                "  {:<24} {:?} -> {:?}",
                op.label(),
                op.input_names,
                op.output_names
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{KernelContext, KernelError};

    fn noop() -> Arc<dyn OpKernel> {
        Arc::new(|_: &mut KernelContext| -> Result<(), KernelError> { Ok(()) })
    }

    /// x -> a -> y -> b -> z, all on one CPU device.
    fn chain() -> Graph<Built> {
        let mut g = Graph::new("chain", vec![Place::Cpu]);
        let x = g.add_var("x", 0, 0, VarType::LodTensor, false);
        let y = g.add_var("y", 0, 0, VarType::LodTensor, false);
        let z = g.add_var("z", 0, 0, VarType::LodTensor, false);
        let attrs = Arc::new(Attrs::new());
        g.add_op("a", 0, vec![x], vec![y], attrs.clone(), noop()).unwrap();
        g.add_op("b", 0, vec![y], vec![z], attrs, noop()).unwrap();
        g
    }

    #[test]
    fn test_validate_chain() {
        let g = chain().validate().unwrap();
        assert_eq!(g.deps(1), &[0]);
        assert_eq!(g.dependents(0), &[1]);
        assert_eq!(g.initial_ready(), vec![0]);
        assert_eq!(g.pending_counts(), vec![0, 1]);
        assert_eq!(g.op(1).input_names, vec!["y".to_string()]);
    }

    #[test]
    fn test_validate_empty() {
        let g = Graph::new("empty", vec![Place::Cpu]);
        assert!(g.validate().is_err());
        let g = Graph::new("no places", vec![]);
        assert!(g.validate().is_err());
    }

    #[test]
    fn test_unknown_device() {
        let mut g = Graph::new("bad", vec![Place::Cpu]);
        let x = g.add_var("x", 0, 0, VarType::LodTensor, false);
        let res = g.add_op("a", 3, vec![x], vec![], Arc::new(Attrs::new()), noop());
        assert!(matches!(res, Err(GraphError::InvalidGraph(_))));
    }

    #[test]
    fn test_double_generator_rejected() {
        let mut g = chain();
        let y = 1;
        let res = g.add_op("c", 0, vec![], vec![y], Arc::new(Attrs::new()), noop());
        assert!(res.is_err());
    }

    #[test]
    fn test_cycle_detected() {
        let mut g = chain();
        g.add_control_dep(1, 0).unwrap();
        assert!(matches!(g.validate(), Err(GraphError::Cycle { remaining: 2 })));
    }

    #[test]
    fn test_control_dep() {
        let mut g = Graph::new("ctrl", vec![Place::Cpu]);
        let x = g.add_var("x", 0, 0, VarType::LodTensor, false);
        let a = g.add_op("a", 0, vec![x], vec![], Arc::new(Attrs::new()), noop()).unwrap();
        let b = g.add_op("b", 0, vec![], vec![], Arc::new(Attrs::new()), noop()).unwrap();
        let c = g.add_control_dep(a, b).unwrap();
        assert!(g.var(c).is_control());
        let g = g.validate().unwrap();
        assert_eq!(g.deps(b), &[a]);
        assert!(g.op(b).input_names.is_empty());
    }

    #[test]
    fn test_connected_components() {
        let mut g = Graph::new("two", vec![Place::Cpu, Place::Cpu]);
        for device in 0..2 {
            let x = g.add_var("x", device, 0, VarType::LodTensor, false);
            let y = g.add_var("y", device, 0, VarType::LodTensor, false);
            g.add_op("a", device, vec![x], vec![y], Arc::new(Attrs::new()), noop())
                .unwrap();
        }
        let g = g.validate().unwrap();
        assert_eq!(g.connected_components(None), 2);
        assert_eq!(g.connected_components(Some(0)), 1);
    }

    #[test]
    fn test_shared_input_joins_components() {
        let mut g = Graph::new("fan-out", vec![Place::Cpu]);
        let x = g.add_var("x", 0, 0, VarType::LodTensor, false);
        let attrs = Arc::new(Attrs::new());
        g.add_op("a", 0, vec![x], vec![], attrs.clone(), noop()).unwrap();
        g.add_op("b", 0, vec![x], vec![], attrs, noop()).unwrap();
        assert_eq!(g.validate().unwrap().connected_components(None), 1);
    }

    #[test]
    fn test_sequentialize() {
        let mut g = Graph::new("independent", vec![Place::Cpu, Place::Cpu]);
        let attrs = Arc::new(Attrs::new());
        for device in 0..2 {
            for _ in 0..3 {
                g.add_op("a", device, vec![], vec![], attrs.clone(), noop()).unwrap();
            }
        }
        let g = g.validate().unwrap();
        assert_eq!(g.initial_ready().len(), 6);

        let g = g.sequentialize().unwrap();
        assert_eq!(g.initial_ready(), vec![0, 3]);
        assert_eq!(g.deps(2), &[1]);
        assert_eq!(g.deps(4), &[3]);
        // Chains never cross devices.
        assert_eq!(g.connected_components(None), 2);
    }

    #[test]
    fn test_sequentialize_skips_existing_edges() {
        let g = chain().validate().unwrap();
        let vars = g.vars().len();
        let g = g.sequentialize().unwrap();
        assert_eq!(g.vars().len(), vars);
    }

    #[test]
    fn test_summary_and_display() {
        let g = chain().validate().unwrap();
        assert!(g.summary().contains("2 ops"));
        let shown = format!("{g}");
        assert!(shown.contains("a#0@cpu"));
        assert!(shown.contains("b#1@cpu"));
    }
}
