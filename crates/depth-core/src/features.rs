//! Feature extraction from RTL signals
//!
//! Turns a (source, signal) pair into a fixed-size numeric vector describing
//! the combinational logic cone that drives the signal: its width, how many
//! signals feed it, which operator families it contains and how deep the
//! operator chain is, both structurally and weighted by estimated gate cost.
//!
//! Extraction is a pure function of its inputs. Every internal map is
//! ordered so repeated calls produce identical vectors.

use crate::error::{DepthError, Result};
use crate::models::{FeatureSchema, FeatureVector};
use crate::rtl::ast::{Direction, Expr, OpClass, Select, UnaryOp};
use crate::rtl::netlist::{clog2, Design, Driver, DriverKind, ModuleNetlist, SignalLocation};
use petgraph::algo::kosaraju_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::DfsPostOrder;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Bumped whenever a feature is added, removed or redefined
pub const FEATURE_SCHEMA_VERSION: u32 = 1;

pub const FEATURE_NAMES: [&str; 15] = [
    "bit_width",
    "is_register",
    "fan_in",
    "fan_out",
    "cone_size",
    "cone_inputs",
    "cone_operators",
    "arith_ops",
    "compare_ops",
    "logic_ops",
    "shift_ops",
    "mux_count",
    "structural_depth",
    "weighted_depth",
    "has_comb_loop",
];

/// Schema shared by every vector this extractor produces
pub fn feature_schema() -> Arc<FeatureSchema> {
    static SCHEMA: OnceLock<Arc<FeatureSchema>> = OnceLock::new();
    SCHEMA
        .get_or_init(|| {
            Arc::new(FeatureSchema::new(
                FEATURE_SCHEMA_VERSION,
                FEATURE_NAMES.iter().map(|n| n.to_string()).collect(),
            ))
        })
        .clone()
}

/// Extracts cone features for RTL signals
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    schema: Arc<FeatureSchema>,
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureExtractor {
    pub fn new() -> Self {
        Self {
            schema: feature_schema(),
        }
    }

    pub fn schema(&self) -> &Arc<FeatureSchema> {
        &self.schema
    }

    /// Parse `rtl_source`, resolve `signal_name` and compute its features
    pub fn extract(&self, rtl_source: &str, signal_name: &str) -> Result<FeatureVector> {
        let design = Design::from_source(rtl_source)?;
        let location = design.resolve(signal_name)?;
        let vector = self.extract_location(&design, &location)?;
        debug!(
            signal = %signal_name,
            module = %location.module,
            "Extracted features"
        );
        Ok(vector)
    }

    /// Features for every signal of the top module, ordered by name
    pub fn extract_all(&self, rtl_source: &str) -> Result<Vec<(String, FeatureVector)>> {
        let design = Design::from_source(rtl_source)?;
        let top = design.top();
        top.signals
            .keys()
            .map(|name| Ok((name.clone(), self.analyze(top, name))))
            .collect()
    }

    /// Features for an already resolved location
    pub fn extract_location(
        &self,
        design: &Design,
        location: &SignalLocation,
    ) -> Result<FeatureVector> {
        let module = design
            .module(&location.module)
            .ok_or_else(|| DepthError::SignalNotFound {
                signal: location.hierarchical_name(),
                module: location.module.clone(),
            })?;
        if module.signal(&location.signal).is_none() {
            return Err(DepthError::SignalNotFound {
                signal: location.hierarchical_name(),
                module: module.name.clone(),
            });
        }
        Ok(self.analyze(module, &location.signal))
    }

    fn analyze(&self, module: &ModuleNetlist, signal: &str) -> FeatureVector {
        let cone = Cone::build(module, signal);
        let (structural, weighted) = cone.depth();
        let stats = cone.stats();
        let width = module.signal(signal).map_or(1, |s| s.width);
        let is_register = module.signal(signal).map_or(false, |s| s.is_register);

        let values = vec![
            width as f64,
            flag(is_register),
            fan_in(module, signal) as f64,
            fan_out(module, signal) as f64,
            stats.internal as f64,
            stats.boundary as f64,
            stats.ops.total as f64,
            stats.ops.arith as f64,
            stats.ops.compare as f64,
            stats.ops.logic as f64,
            stats.ops.shift as f64,
            stats.ops.mux as f64,
            structural as f64,
            weighted,
            flag(cone.has_loop()),
        ];
        FeatureVector::new(self.schema.clone(), values)
    }
}

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

/// Distinct signals read by the logic driving `signal`
fn fan_in(module: &ModuleNetlist, signal: &str) -> usize {
    let mut reads = BTreeSet::new();
    for driver in module.drivers_of(signal) {
        reads.extend(driver_inputs(module, driver));
    }
    reads.retain(|name| !module.is_param(name));
    reads.len()
}

/// Distinct sinks (driven signals and instance input ports) reading `signal`
fn fan_out(module: &ModuleNetlist, signal: &str) -> usize {
    let mut sinks = BTreeSet::new();
    for (target, drivers) in &module.drivers {
        if drivers
            .iter()
            .any(|d| !d.is_instance() && d.reads().contains(signal))
        {
            sinks.insert(target.clone());
        }
    }
    for inst in &module.instances {
        for conn in &inst.connections {
            if conn.direction == Some(Direction::Output) {
                continue;
            }
            let mut reads = BTreeSet::new();
            conn.expr.collect_reads(&mut reads);
            if reads.contains(signal) {
                sinks.insert(format!("{}.{}", inst.name, conn.port));
            }
        }
    }
    sinks.len()
}

/// Signals a driver depends on. An instance output depends on the
/// instance's input connections.
fn driver_inputs(module: &ModuleNetlist, driver: &Driver) -> BTreeSet<String> {
    let mut reads = driver.reads();
    if let DriverKind::Instance { instance, port } = &driver.kind {
        if let Some(inst) = module.instance(instance) {
            for conn in inst.connections.iter().filter(|c| &c.port != port) {
                if conn.direction != Some(Direction::Output) {
                    conn.expr.collect_reads(&mut reads);
                }
            }
        }
    }
    reads
}

#[derive(Debug, Default)]
struct OpCounts {
    total: usize,
    arith: usize,
    compare: usize,
    logic: usize,
    shift: usize,
    mux: usize,
}

#[derive(Debug, Default)]
struct ConeStats {
    /// Combinational signals inside the cone, excluding the root
    internal: usize,
    /// Inputs, registers, instance outputs and undriven nets feeding the cone
    boundary: usize,
    ops: OpCounts,
}

/// Cone boundaries stop the walk: they start a new timing path
fn is_boundary(module: &ModuleNetlist, name: &str) -> bool {
    let Some(signal) = module.signal(name) else {
        return true;
    };
    if signal.is_register || signal.direction == Some(Direction::Input) {
        return true;
    }
    module.drivers_of(name).iter().all(Driver::is_instance)
}

/// Combinational fan-in of one signal as a dependency graph
///
/// Nodes are the root and every non-boundary signal it transitively reads.
/// An edge runs from a signal to each signal its drivers read.
struct Cone<'a> {
    module: &'a ModuleNetlist,
    graph: DiGraph<String, ()>,
    index: BTreeMap<String, NodeIndex>,
    root: NodeIndex,
    boundary: BTreeSet<String>,
}

type Depth = (u32, f64);

impl<'a> Cone<'a> {
    fn build(module: &'a ModuleNetlist, root: &str) -> Self {
        let mut graph = DiGraph::new();
        let mut index = BTreeMap::new();
        let root_node = graph.add_node(root.to_string());
        index.insert(root.to_string(), root_node);
        let mut boundary = BTreeSet::new();

        let mut queue = vec![root_node];
        while let Some(node) = queue.pop() {
            let name = graph[node].clone();
            for driver in module.drivers_of(&name).iter().filter(|d| !d.is_instance()) {
                for read in driver.reads() {
                    if module.is_param(&read) {
                        continue;
                    }
                    if is_boundary(module, &read) {
                        if read != root {
                            boundary.insert(read);
                        }
                        continue;
                    }
                    let dep = match index.get(&read).copied() {
                        Some(dep) => dep,
                        None => {
                            let dep = graph.add_node(read.clone());
                            index.insert(read, dep);
                            queue.push(dep);
                            dep
                        }
                    };
                    graph.update_edge(node, dep, ());
                }
            }
        }

        Self {
            module,
            graph,
            index,
            root: root_node,
            boundary,
        }
    }

    /// A loop exists iff some strongly connected component is non-trivial
    fn has_loop(&self) -> bool {
        kosaraju_scc(&self.graph)
            .iter()
            .any(|scc| scc.len() > 1 || self.graph.contains_edge(scc[0], scc[0]))
    }

    /// Structural and weighted depth of the root
    ///
    /// Signals are evaluated in DFS post-order from the root, so every read
    /// is already finished except the back edges of combinational loops,
    /// which are cut and count as depth 0.
    fn depth(&self) -> Depth {
        let mut memo: Vec<Option<Depth>> = vec![None; self.graph.node_count()];
        let mut dfs = DfsPostOrder::new(&self.graph, self.root);
        while let Some(node) = dfs.next(&self.graph) {
            memo[node.index()] = Some(self.drivers_depth(&self.graph[node], &memo));
        }
        memo[self.root.index()].unwrap_or((0, 0.0))
    }

    fn signal_depth(&self, name: &str, memo: &[Option<Depth>]) -> Depth {
        if self.module.is_param(name) || is_boundary(self.module, name) {
            return (0, 0.0);
        }
        self.index
            .get(name)
            .and_then(|node| memo[node.index()])
            .unwrap_or((0, 0.0))
    }

    fn drivers_depth(&self, name: &str, memo: &[Option<Depth>]) -> Depth {
        let mut best = (0u32, 0.0f64);
        for driver in self.module.drivers_of(name).iter().filter(|d| !d.is_instance()) {
            let (mut s, mut w) = match &driver.rhs {
                Some(rhs) => self.expr_depth(rhs, memo),
                None => (0, 0.0),
            };
            for index in &driver.index_reads {
                let (is, iw) = self.signal_depth(index, memo);
                s = s.max(is + 1);
                w = w.max(iw + 1.0);
            }
            for cond in &driver.conditions {
                let (cs, cw) = self.expr_depth(cond, memo);
                s = s.max(cs);
                w = w.max(cw);
            }
            s += driver.conditions.len() as u32;
            w += driver.conditions.len() as f64;
            best = (best.0.max(s), best.1.max(w));
        }
        best
    }

    fn max_depth<'e>(
        &self,
        exprs: impl IntoIterator<Item = &'e Expr>,
        memo: &[Option<Depth>],
    ) -> Depth {
        exprs.into_iter().fold((0, 0.0), |acc, e| {
            let (s, w) = self.expr_depth(e, memo);
            (acc.0.max(s), acc.1.max(w))
        })
    }

    fn expr_depth(&self, expr: &Expr, memo: &[Option<Depth>]) -> Depth {
        let module = self.module;
        match expr {
            Expr::Ident(name) => self.signal_depth(name, memo),
            Expr::Number(_) => (0, 0.0),
            Expr::Select { base, select } => {
                let (bs, bw) = self.expr_depth(base, memo);
                let index = match select {
                    Select::Bit(index) => Some(index),
                    Select::Indexed { start, .. } => Some(start),
                    Select::Part(..) => None,
                };
                match index {
                    Some(index) if module.const_value(index).is_none() => {
                        let (is, iw) = self.expr_depth(index, memo);
                        let cost = clog2(module.expr_width(base) as u64).max(1) as f64;
                        (bs.max(is) + 1, bw.max(iw) + cost)
                    }
                    _ => (bs, bw),
                }
            }
            Expr::Unary { op, operand } => {
                let (s, w) = self.expr_depth(operand, memo);
                if *op == UnaryOp::Plus {
                    return (s, w);
                }
                let width = module.expr_width(operand) as u64;
                let cost = match op.class() {
                    OpClass::Arith => (clog2(width) + 1) as f64,
                    OpClass::Reduce => clog2(width).max(1) as f64,
                    _ => 1.0,
                };
                (s + 1, w + cost)
            }
            Expr::Binary { op, lhs, rhs } => {
                let (ls, lw) = self.expr_depth(lhs, memo);
                let (rs, rw) = self.expr_depth(rhs, memo);
                let (s, w) = (ls.max(rs), lw.max(rw));
                let width = module.expr_width(lhs).max(module.expr_width(rhs)) as u64;
                match op.class() {
                    OpClass::Arith | OpClass::Compare => (s + 1, w + (clog2(width) + 1) as f64),
                    OpClass::Multiply => (s + 1, w + (2 * clog2(width) + 2) as f64),
                    OpClass::Shift if module.const_value(rhs).is_some() => (s, w),
                    OpClass::Shift => {
                        let cost = clog2(module.expr_width(lhs) as u64).max(1) as f64;
                        (s + 1, w + cost)
                    }
                    _ => (s + 1, w + 1.0),
                }
            }
            Expr::Ternary {
                cond,
                then_expr,
                else_expr,
            } => {
                let branches = [cond.as_ref(), then_expr.as_ref(), else_expr.as_ref()];
                let (s, w) = self.max_depth(branches, memo);
                (s + 1, w + 1.0)
            }
            Expr::Concat(items) | Expr::Replicate { items, .. } => self.max_depth(items, memo),
            Expr::Call { name, args } => {
                let (s, w) = self.max_depth(args, memo);
                if matches!(name.as_str(), "$signed" | "$unsigned") {
                    (s, w)
                } else {
                    (s + 1, w + 1.0)
                }
            }
        }
    }

    /// Sizes of the cone and the operators inside it
    fn stats(&self) -> ConeStats {
        let mut stats = ConeStats {
            internal: self.graph.node_count() - 1,
            boundary: self.boundary.len(),
            ops: OpCounts::default(),
        };
        for name in self.index.keys() {
            let mut conditions: Vec<&Expr> = Vec::new();
            for driver in self.module.drivers_of(name).iter().filter(|d| !d.is_instance()) {
                if let Some(rhs) = &driver.rhs {
                    count_ops(self.module, rhs, &mut stats.ops);
                }
                for cond in &driver.conditions {
                    if !conditions.contains(&cond) {
                        conditions.push(cond);
                    }
                }
            }
            // Each distinct guard selects between driver values
            stats.ops.mux += conditions.len();
            stats.ops.total += conditions.len();
            for cond in conditions {
                count_ops(self.module, cond, &mut stats.ops);
            }
        }
        stats
    }
}

fn count_ops(module: &ModuleNetlist, expr: &Expr, ops: &mut OpCounts) {
    match expr {
        Expr::Ident(_) | Expr::Number(_) => {}
        Expr::Select { base, select } => {
            count_ops(module, base, ops);
            let index = match select {
                Select::Bit(index) => Some(index.as_ref()),
                Select::Indexed { start, .. } => Some(start.as_ref()),
                Select::Part(..) => None,
            };
            if let Some(index) = index {
                if module.const_value(index).is_none() {
                    ops.mux += 1;
                    ops.total += 1;
                    count_ops(module, index, ops);
                }
            }
        }
        Expr::Unary { op, operand } => {
            if *op != UnaryOp::Plus {
                ops.total += 1;
                match op.class() {
                    OpClass::Arith => ops.arith += 1,
                    _ => ops.logic += 1,
                }
            }
            count_ops(module, operand, ops);
        }
        Expr::Binary { op, lhs, rhs } => {
            ops.total += 1;
            match op.class() {
                OpClass::Arith | OpClass::Multiply => ops.arith += 1,
                OpClass::Compare => ops.compare += 1,
                OpClass::Shift => ops.shift += 1,
                OpClass::Logic | OpClass::Reduce => ops.logic += 1,
            }
            count_ops(module, lhs, ops);
            count_ops(module, rhs, ops);
        }
        Expr::Ternary {
            cond,
            then_expr,
            else_expr,
        } => {
            ops.total += 1;
            ops.mux += 1;
            count_ops(module, cond, ops);
            count_ops(module, then_expr, ops);
            count_ops(module, else_expr, ops);
        }
        Expr::Concat(items) | Expr::Replicate { items, .. } => {
            for item in items {
                count_ops(module, item, ops);
            }
        }
        Expr::Call { args, .. } => {
            for arg in args {
                count_ops(module, arg, ops);
            }
        }
    }
}
