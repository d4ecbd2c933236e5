//! Elaborated per-module signal tables, drivers and instance hierarchy

use super::ast::*;
use crate::error::{DepthError, Result};
use std::collections::{BTreeMap, BTreeSet};

/// Width assumed for `integer` declarations and parameters
pub const INTEGER_WIDTH: u32 = 32;

#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub name: String,
    pub width: u32,
    pub direction: Option<Direction>,
    /// Assigned from a clocked block
    pub is_register: bool,
    /// Created by the implicit net rule rather than a declaration
    pub implicit: bool,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DriverKind {
    /// `assign` or a declaration initializer
    Continuous,
    /// Combinational always block
    Combinational,
    /// Clocked always block
    Sequential,
    /// Output port of a submodule instance
    Instance { instance: String, port: String },
}

/// One assignment to a signal
#[derive(Debug, Clone, PartialEq)]
pub struct Driver {
    pub kind: DriverKind,
    /// Right hand side, absent for instance outputs
    pub rhs: Option<Expr>,
    /// Guarding `if` conditions and `case` selectors, outermost first
    pub conditions: Vec<Expr>,
    /// Identifiers read by select indices on the target
    pub index_reads: BTreeSet<String>,
    pub line: usize,
}

impl Driver {
    /// Every identifier this driver depends on
    pub fn reads(&self) -> BTreeSet<String> {
        let mut out = self.index_reads.clone();
        if let Some(rhs) = &self.rhs {
            rhs.collect_reads(&mut out);
        }
        for cond in &self.conditions {
            cond.collect_reads(&mut out);
        }
        out
    }

    pub fn is_instance(&self) -> bool {
        matches!(self.kind, DriverKind::Instance { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortConnection {
    pub port: String,
    pub direction: Option<Direction>,
    pub expr: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InstanceNode {
    pub name: String,
    pub module: String,
    pub connections: Vec<PortConnection>,
    /// Instantiated module has no definition in the source
    pub black_box: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModuleNetlist {
    pub name: String,
    pub ports: Vec<String>,
    pub params: BTreeMap<String, i64>,
    pub signals: BTreeMap<String, Signal>,
    pub drivers: BTreeMap<String, Vec<Driver>>,
    pub instances: Vec<InstanceNode>,
}

impl ModuleNetlist {
    pub fn signal(&self, name: &str) -> Option<&Signal> {
        self.signals.get(name)
    }

    pub fn drivers_of(&self, name: &str) -> &[Driver] {
        self.drivers.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_param(&self, name: &str) -> bool {
        self.params.contains_key(name)
    }

    pub fn instance(&self, name: &str) -> Option<&InstanceNode> {
        self.instances.iter().find(|i| i.name == name)
    }

    pub fn const_value(&self, expr: &Expr) -> Option<i64> {
        eval_const(expr, &self.params)
    }

    /// Self-determined bit width of an expression
    pub fn expr_width(&self, expr: &Expr) -> u32 {
        match expr {
            Expr::Ident(name) => match self.signals.get(name) {
                Some(signal) => signal.width,
                None if self.is_param(name) => INTEGER_WIDTH,
                None => 1,
            },
            Expr::Number(lit) => lit.width.unwrap_or_else(|| {
                // Unsized literals take the bits their value needs
                lit.value.map_or(1, |v| (64 - v.leading_zeros()).max(1))
            }),
            Expr::Select { select, .. } => match select {
                Select::Bit(_) => 1,
                Select::Part(msb, lsb) => match (self.const_value(msb), self.const_value(lsb)) {
                    (Some(m), Some(l)) => range_width(m, l),
                    _ => 1,
                },
                Select::Indexed { width, .. } => self
                    .const_value(width)
                    .and_then(|w| u32::try_from(w).ok())
                    .filter(|w| *w > 0)
                    .unwrap_or(1),
            },
            Expr::Unary { op, operand } => match op.class() {
                OpClass::Reduce => 1,
                _ if *op == UnaryOp::LogicalNot => 1,
                _ => self.expr_width(operand),
            },
            Expr::Binary { op, lhs, rhs } => match op.class() {
                OpClass::Compare => 1,
                OpClass::Shift => self.expr_width(lhs),
                _ if matches!(op, BinaryOp::LogicalAnd | BinaryOp::LogicalOr) => 1,
                _ => self.expr_width(lhs).max(self.expr_width(rhs)),
            },
            Expr::Ternary {
                then_expr,
                else_expr,
                ..
            } => self.expr_width(then_expr).max(self.expr_width(else_expr)),
            Expr::Concat(items) => self.concat_width(items).max(1),
            Expr::Replicate { count, items } => {
                let inner = self.concat_width(items);
                let count = self
                    .const_value(count)
                    .and_then(|c| u32::try_from(c).ok())
                    .unwrap_or(1);
                inner.saturating_mul(count).max(1)
            }
            Expr::Call { name, args } => match (name.as_str(), args.first()) {
                ("$signed" | "$unsigned", Some(arg)) => self.expr_width(arg),
                _ => INTEGER_WIDTH,
            },
        }
    }

    /// Widths clamp at `u32::MAX`
    fn concat_width(&self, items: &[Expr]) -> u32 {
        items
            .iter()
            .fold(0u32, |acc, item| acc.saturating_add(self.expr_width(item)))
    }
}

/// Location of a resolved signal in the instance hierarchy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalLocation {
    /// Instance names walked from the top module
    pub path: Vec<String>,
    /// Module that declares the signal
    pub module: String,
    pub signal: String,
}

impl SignalLocation {
    pub fn hierarchical_name(&self) -> String {
        let mut parts = self.path.clone();
        parts.push(self.signal.clone());
        parts.join(".")
    }
}

#[derive(Debug, Clone)]
pub struct Design {
    modules: BTreeMap<String, ModuleNetlist>,
    top: String,
}

impl Design {
    /// Parse and elaborate RTL source in one step
    pub fn from_source(source: &str) -> Result<Self> {
        Self::elaborate(super::parser::parse(source)?)
    }

    pub fn elaborate(unit: SourceUnit) -> Result<Self> {
        let mut modules = BTreeMap::new();
        for decl in &unit.modules {
            if modules.contains_key(&decl.name) {
                return Err(DepthError::parse(
                    decl.line,
                    1,
                    format!("module '{}' is defined more than once", decl.name),
                ));
            }
            modules.insert(decl.name.clone(), declare_module(decl)?);
        }

        // Drivers need the port directions of every submodule
        let mut elaborated = BTreeMap::new();
        for decl in &unit.modules {
            let mut netlist = modules[&decl.name].clone();
            connect_module(decl, &mut netlist, &modules);
            elaborated.insert(decl.name.clone(), netlist);
        }

        let instantiated: BTreeSet<&str> = elaborated
            .values()
            .flat_map(|m| m.instances.iter().map(|i| i.module.as_str()))
            .collect();
        let top = unit
            .modules
            .iter()
            .find(|m| !instantiated.contains(m.name.as_str()))
            .or_else(|| unit.modules.first())
            .map(|m| m.name.clone())
            .ok_or_else(|| DepthError::parse(1, 1, "source contains no module"))?;

        Ok(Design {
            modules: elaborated,
            top,
        })
    }

    pub fn top(&self) -> &ModuleNetlist {
        &self.modules[&self.top]
    }

    pub fn top_name(&self) -> &str {
        &self.top
    }

    pub fn module(&self, name: &str) -> Option<&ModuleNetlist> {
        self.modules.get(name)
    }

    pub fn modules(&self) -> impl Iterator<Item = &ModuleNetlist> {
        self.modules.values()
    }

    /// Resolve a plain or dotted hierarchical name to exactly one signal
    pub fn resolve(&self, signal_name: &str) -> Result<SignalLocation> {
        let not_found = |module: &str| DepthError::SignalNotFound {
            signal: signal_name.to_string(),
            module: module.to_string(),
        };

        let parts: Vec<&str> = signal_name.split('.').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(not_found(&self.top));
        }

        if parts.len() > 1 {
            let mut module = self.top();
            let mut path = Vec::new();
            for step in &parts[..parts.len() - 1] {
                let child = module
                    .instance(step)
                    .and_then(|inst| self.modules.get(&inst.module))
                    .ok_or_else(|| not_found(&module.name))?;
                path.push(step.to_string());
                module = child;
            }
            let signal = parts[parts.len() - 1];
            return match module.signal(signal) {
                Some(_) => Ok(SignalLocation {
                    path,
                    module: module.name.clone(),
                    signal: signal.to_string(),
                }),
                None => Err(not_found(&module.name)),
            };
        }

        let top = self.top();
        if top.signal(signal_name).is_some() {
            return Ok(SignalLocation {
                path: Vec::new(),
                module: top.name.clone(),
                signal: signal_name.to_string(),
            });
        }

        let mut hits = Vec::new();
        let mut stack = vec![top.name.clone()];
        self.search_instances(top, signal_name, &mut Vec::new(), &mut stack, &mut hits);
        match hits.len() {
            0 => Err(not_found(&top.name)),
            1 => Ok(hits.remove(0)),
            _ => {
                let mut candidates: Vec<String> =
                    hits.iter().map(SignalLocation::hierarchical_name).collect();
                candidates.sort();
                Err(DepthError::AmbiguousSignal {
                    signal: signal_name.to_string(),
                    candidates,
                })
            }
        }
    }

    fn search_instances(
        &self,
        module: &ModuleNetlist,
        signal: &str,
        path: &mut Vec<String>,
        stack: &mut Vec<String>,
        hits: &mut Vec<SignalLocation>,
    ) {
        for inst in &module.instances {
            let Some(child) = self.modules.get(&inst.module) else {
                continue;
            };
            // Recursive instantiation would never terminate
            if stack.contains(&child.name) {
                continue;
            }
            path.push(inst.name.clone());
            if child.signal(signal).is_some() {
                hits.push(SignalLocation {
                    path: path.clone(),
                    module: child.name.clone(),
                    signal: signal.to_string(),
                });
            }
            stack.push(child.name.clone());
            self.search_instances(child, signal, path, stack, hits);
            stack.pop();
            path.pop();
        }
    }
}

fn range_width(msb: i64, lsb: i64) -> u32 {
    u32::try_from(msb.abs_diff(lsb).saturating_add(1)).unwrap_or(u32::MAX)
}

/// First pass: parameters and the declared signal table
fn declare_module(decl: &ModuleDecl) -> Result<ModuleNetlist> {
    let mut params = BTreeMap::new();
    for param in &decl.params {
        if let Some(value) = eval_const(&param.value, &params) {
            params.insert(param.name.clone(), value);
        }
    }

    let mut signals: BTreeMap<String, Signal> = BTreeMap::new();
    // (has direction, has net kind, has range) per declared name
    let mut seen: BTreeMap<String, (bool, bool, bool)> = BTreeMap::new();
    for item in &decl.items {
        let ModuleItem::Decl(d) = item else { continue };
        let width = match (&d.range, d.kind) {
            (Some(range), _) => {
                let msb = eval_const(&range.msb, &params);
                let lsb = eval_const(&range.lsb, &params);
                match (msb, lsb) {
                    (Some(m), Some(l)) => range_width(m, l),
                    _ => 1,
                }
            }
            (None, Some(NetKind::Integer)) => INTEGER_WIDTH,
            (None, _) => 1,
        };
        let attrs = (d.direction.is_some(), d.kind.is_some(), d.range.is_some());

        match (signals.get_mut(&d.name), seen.get_mut(&d.name)) {
            (Some(existing), Some(prev)) => {
                // `output y;` followed by `reg y;` completes one declaration
                let conflict = (prev.0 && attrs.0)
                    || (prev.1 && attrs.1)
                    || (prev.2 && attrs.2 && existing.width != width);
                if conflict {
                    return Err(DepthError::parse(
                        d.line,
                        d.column,
                        format!("conflicting declaration of '{}'", d.name),
                    ));
                }
                if attrs.0 {
                    existing.direction = d.direction;
                }
                if attrs.2 || (!prev.2 && d.kind == Some(NetKind::Integer)) {
                    existing.width = width;
                }
                *prev = (prev.0 || attrs.0, prev.1 || attrs.1, prev.2 || attrs.2);
            }
            _ => {
                signals.insert(
                    d.name.clone(),
                    Signal {
                        name: d.name.clone(),
                        width,
                        direction: d.direction,
                        is_register: false,
                        implicit: false,
                        line: d.line,
                    },
                );
                seen.insert(d.name.clone(), attrs);
            }
        }
    }

    // Header ports never declared in the body
    for port in &decl.ports {
        signals.entry(port.clone()).or_insert_with(|| Signal {
            name: port.clone(),
            width: 1,
            direction: None,
            is_register: false,
            implicit: true,
            line: decl.line,
        });
    }

    Ok(ModuleNetlist {
        name: decl.name.clone(),
        ports: decl.ports.clone(),
        params,
        signals,
        drivers: BTreeMap::new(),
        instances: Vec::new(),
    })
}

/// Second pass: drivers from assignments, always blocks and instances
fn connect_module(
    decl: &ModuleDecl,
    netlist: &mut ModuleNetlist,
    declared: &BTreeMap<String, ModuleNetlist>,
) {
    for item in &decl.items {
        match item {
            ModuleItem::Decl(d) => {
                if let (Some(init), Some(NetKind::Wire) | None) = (&d.init, d.kind) {
                    add_driver(
                        netlist,
                        &Expr::Ident(d.name.clone()),
                        init.clone(),
                        Vec::new(),
                        DriverKind::Continuous,
                        d.line,
                    );
                }
            }
            ModuleItem::Param(_) => {}
            ModuleItem::Assign { lhs, rhs, line } => {
                add_driver(netlist, lhs, rhs.clone(), Vec::new(), DriverKind::Continuous, *line);
            }
            ModuleItem::Always(block) => {
                let kind = if block.is_sequential() {
                    DriverKind::Sequential
                } else {
                    DriverKind::Combinational
                };
                let mut assignments = Vec::new();
                flatten(&block.body, &mut Vec::new(), &mut assignments);
                for (lhs, rhs, conditions) in assignments {
                    add_driver(netlist, lhs, rhs.clone(), conditions, kind.clone(), block.line);
                }
            }
            ModuleItem::Instance(inst) => {
                let node = connect_instance(inst, declared.get(&inst.module));
                for conn in &node.connections {
                    if matches!(conn.direction, Some(Direction::Output | Direction::Inout)) {
                        add_instance_driver(netlist, &node.name, conn, inst.line);
                    }
                }
                netlist.instances.push(node);
            }
        }
    }

    // Black box outputs cannot be told apart from inputs; an otherwise
    // undriven lvalue connection is assumed to be driven by the cell
    let black_box: Vec<(String, PortConnection)> = netlist
        .instances
        .iter()
        .filter(|i| i.black_box)
        .flat_map(|i| i.connections.iter().map(move |c| (i.name.clone(), c.clone())))
        .collect();
    for (instance, conn) in black_box {
        let undriven = conn.expr.is_lvalue()
            && conn
                .expr
                .targets()
                .iter()
                .all(|t| netlist.drivers_of(t).is_empty());
        if undriven {
            add_instance_driver(netlist, &instance, &conn, 0);
        }
    }
}

fn connect_instance(inst: &Instance, child: Option<&ModuleNetlist>) -> InstanceNode {
    let direction_of = |port: &str| child.and_then(|c| c.signal(port)).and_then(|s| s.direction);
    let connections = match &inst.connections {
        Connections::Named(named) => named
            .iter()
            .filter_map(|(port, expr)| {
                expr.as_ref().map(|expr| PortConnection {
                    port: port.clone(),
                    direction: direction_of(port),
                    expr: expr.clone(),
                })
            })
            .collect(),
        Connections::Positional(exprs) => exprs
            .iter()
            .enumerate()
            .filter_map(|(idx, expr)| {
                let expr = expr.as_ref()?;
                let port = child
                    .and_then(|c| c.ports.get(idx).cloned())
                    .unwrap_or_else(|| format!("#{}", idx));
                Some(PortConnection {
                    direction: direction_of(&port),
                    port,
                    expr: expr.clone(),
                })
            })
            .collect(),
    };
    InstanceNode {
        name: inst.name.clone(),
        module: inst.module.clone(),
        connections,
        black_box: child.is_none(),
    }
}

fn add_instance_driver(
    netlist: &mut ModuleNetlist,
    instance: &str,
    conn: &PortConnection,
    line: usize,
) {
    let mut index_reads = BTreeSet::new();
    conn.expr.collect_target_reads(&mut index_reads);
    for target in conn.expr.targets() {
        ensure_signal(netlist, target, line);
        netlist
            .drivers
            .entry(target.to_string())
            .or_default()
            .push(Driver {
                kind: DriverKind::Instance {
                    instance: instance.to_string(),
                    port: conn.port.clone(),
                },
                rhs: None,
                conditions: Vec::new(),
                index_reads: index_reads.clone(),
                line,
            });
    }
}

fn add_driver(
    netlist: &mut ModuleNetlist,
    lhs: &Expr,
    rhs: Expr,
    conditions: Vec<Expr>,
    kind: DriverKind,
    line: usize,
) {
    let mut index_reads = BTreeSet::new();
    lhs.collect_target_reads(&mut index_reads);
    for target in lhs.targets() {
        ensure_signal(netlist, target, line);
        if kind == DriverKind::Sequential {
            if let Some(signal) = netlist.signals.get_mut(target) {
                signal.is_register = true;
            }
        }
        netlist
            .drivers
            .entry(target.to_string())
            .or_default()
            .push(Driver {
                kind: kind.clone(),
                rhs: Some(rhs.clone()),
                conditions: conditions.clone(),
                index_reads: index_reads.clone(),
                line,
            });
    }
}

/// Implicit net rule: an undeclared assignment target is a 1-bit wire
fn ensure_signal(netlist: &mut ModuleNetlist, name: &str, line: usize) {
    netlist
        .signals
        .entry(name.to_string())
        .or_insert_with(|| Signal {
            name: name.to_string(),
            width: 1,
            direction: None,
            is_register: false,
            implicit: true,
            line,
        });
}

/// Flatten a procedural body into (target, value, guarding conditions)
fn flatten<'a>(
    stmt: &'a Statement,
    conditions: &mut Vec<Expr>,
    out: &mut Vec<(&'a Expr, &'a Expr, Vec<Expr>)>,
) {
    match stmt {
        Statement::Block(body) => {
            for s in body {
                flatten(s, conditions, out);
            }
        }
        Statement::If {
            cond,
            then_branch,
            else_branch,
        } => {
            conditions.push(cond.clone());
            flatten(then_branch, conditions, out);
            if let Some(else_branch) = else_branch {
                flatten(else_branch, conditions, out);
            }
            conditions.pop();
        }
        Statement::Case {
            selector,
            items,
            default,
        } => {
            conditions.push(selector.clone());
            for item in items {
                flatten(&item.body, conditions, out);
            }
            if let Some(default) = default {
                flatten(default, conditions, out);
            }
            conditions.pop();
        }
        Statement::Assign { lhs, rhs, .. } => out.push((lhs, rhs, conditions.clone())),
        Statement::Empty => {}
    }
}

/// Evaluate a constant expression against known parameter values
pub fn eval_const(expr: &Expr, params: &BTreeMap<String, i64>) -> Option<i64> {
    match expr {
        Expr::Number(lit) => match lit.value? {
            u64::MAX => Some(-1),
            v => i64::try_from(v).ok(),
        },
        Expr::Ident(name) => params.get(name).copied(),
        Expr::Unary { op, operand } => {
            let v = eval_const(operand, params)?;
            match op {
                UnaryOp::Plus => Some(v),
                UnaryOp::Minus => v.checked_neg(),
                UnaryOp::LogicalNot => Some((v == 0) as i64),
                UnaryOp::BitNot => Some(!v),
                _ => None,
            }
        }
        Expr::Binary { op, lhs, rhs } => {
            let l = eval_const(lhs, params)?;
            let r = eval_const(rhs, params)?;
            match op {
                BinaryOp::Add => l.checked_add(r),
                BinaryOp::Sub => l.checked_sub(r),
                BinaryOp::Mul => l.checked_mul(r),
                BinaryOp::Div => l.checked_div(r),
                BinaryOp::Mod => l.checked_rem(r),
                BinaryOp::Pow => u32::try_from(r).ok().and_then(|r| l.checked_pow(r)),
                BinaryOp::Shl | BinaryOp::AShl => {
                    u32::try_from(r).ok().and_then(|r| l.checked_shl(r))
                }
                BinaryOp::Shr | BinaryOp::AShr => {
                    u32::try_from(r).ok().and_then(|r| l.checked_shr(r))
                }
                BinaryOp::Lt => Some((l < r) as i64),
                BinaryOp::Le => Some((l <= r) as i64),
                BinaryOp::Gt => Some((l > r) as i64),
                BinaryOp::Ge => Some((l >= r) as i64),
                BinaryOp::Eq | BinaryOp::CaseEq => Some((l == r) as i64),
                BinaryOp::Ne | BinaryOp::CaseNe => Some((l != r) as i64),
                BinaryOp::BitAnd => Some(l & r),
                BinaryOp::BitOr => Some(l | r),
                BinaryOp::BitXor => Some(l ^ r),
                BinaryOp::BitXnor => Some(!(l ^ r)),
                BinaryOp::LogicalAnd => Some((l != 0 && r != 0) as i64),
                BinaryOp::LogicalOr => Some((l != 0 || r != 0) as i64),
            }
        }
        Expr::Ternary {
            cond,
            then_expr,
            else_expr,
        } => {
            if eval_const(cond, params)? != 0 {
                eval_const(then_expr, params)
            } else {
                eval_const(else_expr, params)
            }
        }
        Expr::Call { name, args } if name == "$clog2" && args.len() == 1 => {
            let v = eval_const(&args[0], params)?;
            Some(clog2(v.max(0) as u64) as i64)
        }
        _ => None,
    }
}

/// Ceiling of log2, with clog2(0) == clog2(1) == 0
pub fn clog2(value: u64) -> u32 {
    if value <= 1 {
        0
    } else {
        64 - (value - 1).leading_zeros()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HIERARCHY: &str = "
        module adder #(parameter W = 8) (input [W-1:0] a, b, output [W:0] sum);
            assign sum = a + b;
        endmodule

        module top(input clk, input [7:0] x, y, output reg [8:0] q);
            wire [8:0] s0, s1;
            adder #(.W(8)) u0 (.a(x), .b(y), .sum(s0));
            adder u1 (x, y, s1);
            always @(posedge clk) q <= s0 + s1;
        endmodule
    ";

    #[test]
    fn test_top_module_is_uninstantiated() {
        let design = Design::from_source(HIERARCHY).unwrap();
        assert_eq!(design.top_name(), "top");
    }

    #[test]
    fn test_widths_from_parameters() {
        let design = Design::from_source(HIERARCHY).unwrap();
        let adder = design.module("adder").unwrap();
        assert_eq!(adder.signal("a").unwrap().width, 8);
        assert_eq!(adder.signal("sum").unwrap().width, 9);
    }

    #[test]
    fn test_sequential_targets_are_registers() {
        let design = Design::from_source(HIERARCHY).unwrap();
        let top = design.top();
        assert!(top.signal("q").unwrap().is_register);
        assert!(!top.signal("s0").unwrap().is_register);
    }

    #[test]
    fn test_instance_outputs_drive_nets() {
        let design = Design::from_source(HIERARCHY).unwrap();
        let top = design.top();
        assert!(top.drivers_of("s0")[0].is_instance());
        // Positional connections map onto header port order
        assert!(top.drivers_of("s1")[0].is_instance());
        assert!(top.drivers_of("x").is_empty());
    }

    #[test]
    fn test_resolve_plain_and_hierarchical() {
        let design = Design::from_source(HIERARCHY).unwrap();
        let loc = design.resolve("q").unwrap();
        assert!(loc.path.is_empty());

        let loc = design.resolve("u1.sum").unwrap();
        assert_eq!(loc.module, "adder");
        assert_eq!(loc.hierarchical_name(), "u1.sum");
    }

    #[test]
    fn test_resolve_ambiguous_across_instances() {
        let design = Design::from_source(HIERARCHY).unwrap();
        match design.resolve("sum").unwrap_err() {
            DepthError::AmbiguousSignal { candidates, .. } => {
                assert_eq!(candidates, vec!["u0.sum".to_string(), "u1.sum".to_string()]);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_resolve_missing() {
        let design = Design::from_source(HIERARCHY).unwrap();
        assert_eq!(design.resolve("nope").unwrap_err().kind(), "signal_not_found");
        assert_eq!(design.resolve("u9.sum").unwrap_err().kind(), "signal_not_found");
        assert_eq!(design.resolve("u0.nope").unwrap_err().kind(), "signal_not_found");
    }

    #[test]
    fn test_unreachable_module_not_searched() {
        let source = "
            module orphan(input a, output z); assign z = a; endmodule
            module top(input a, output y); assign y = a; endmodule
        ";
        let design = Design::from_source(source).unwrap();
        // Both are uninstantiated, the first one wins
        assert_eq!(design.top_name(), "orphan");
        assert!(design.resolve("y").is_err());
    }

    #[test]
    fn test_implicit_net_declared_on_assignment() {
        let source = "module m(input a, output y); assign t = ~a; assign y = t; endmodule";
        let design = Design::from_source(source).unwrap();
        let t = design.top().signal("t").unwrap();
        assert!(t.implicit);
        assert_eq!(t.width, 1);
    }

    #[test]
    fn test_conflicting_declaration_rejected() {
        let err = Design::from_source("module m(input a); input [3:0] a; endmodule").unwrap_err();
        assert_eq!(err.kind(), "parse_error");
    }

    #[test]
    fn test_non_ansi_output_reg_merges() {
        let design = Design::from_source(
            "module m(clk, d, q); input clk; input [3:0] d; output [3:0] q; reg [3:0] q;\n\
             always @(posedge clk) q <= d; endmodule",
        )
        .unwrap();
        let q = design.top().signal("q").unwrap();
        assert_eq!(q.direction, Some(Direction::Output));
        assert_eq!(q.width, 4);
        assert!(q.is_register);
    }

    #[test]
    fn test_conditions_recorded_on_drivers() {
        let design = Design::from_source(
            "module m(input s, input [1:0] c, input a, b, output reg y);\n\
             always @* begin if (s) case (c) 2'd0: y = a; default: y = b; endcase else y = 0; end\n\
             endmodule",
        )
        .unwrap();
        let drivers = design.top().drivers_of("y");
        assert_eq!(drivers.len(), 3);
        assert_eq!(drivers[0].conditions.len(), 2);
        assert_eq!(drivers[2].conditions.len(), 1);
        assert!(drivers[0].reads().contains("c"));
    }

    #[test]
    fn test_eval_const_and_clog2() {
        let design = Design::from_source(
            "module m #(parameter N = 16, localparam B = $clog2(N)) (input [B-1:0] i); endmodule",
        )
        .unwrap();
        assert_eq!(design.top().params["B"], 4);
        assert_eq!(design.top().signal("i").unwrap().width, 4);
        assert_eq!(clog2(1), 0);
        assert_eq!(clog2(5), 3);
    }

    #[test]
    fn test_concat_width_saturates() {
        let design = Design::from_source(
            "module m(input [4294967294:0] a, output y); assign y = ^{a, a}; endmodule",
        )
        .unwrap();
        let module = design.top();
        assert_eq!(module.signal("a").unwrap().width, u32::MAX);
        let rhs = module.drivers_of("y")[0].rhs.as_ref().unwrap();
        let Expr::Unary { operand, .. } = rhs else {
            panic!("expected reduction, got {rhs:?}");
        };
        assert_eq!(module.expr_width(operand), u32::MAX);
    }
}
