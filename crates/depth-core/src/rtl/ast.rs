//! Syntax tree for the supported RTL subset

use super::lexer::Literal;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq)]
pub struct SourceUnit {
    pub modules: Vec<ModuleDecl>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModuleDecl {
    pub name: String,
    pub line: usize,
    pub params: Vec<ParamDecl>,
    /// Port names in header order
    pub ports: Vec<String>,
    pub items: Vec<ModuleItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
    Inout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetKind {
    Wire,
    Reg,
    Logic,
    Integer,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Range {
    pub msb: Expr,
    pub lsb: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub name: String,
    pub direction: Option<Direction>,
    pub kind: Option<NetKind>,
    pub range: Option<Range>,
    pub signed: bool,
    /// `wire x = expr;` style initializer
    pub init: Option<Expr>,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamDecl {
    pub name: String,
    pub value: Expr,
    pub local: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModuleItem {
    Decl(Declaration),
    Param(ParamDecl),
    Assign { lhs: Expr, rhs: Expr, line: usize },
    Always(AlwaysBlock),
    Instance(Instance),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlwaysKind {
    Always,
    Comb,
    Ff,
    Latch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Pos,
    Neg,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SensItem {
    pub edge: Option<Edge>,
    pub expr: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Sensitivity {
    /// `@*`, `@(*)` or implicit for `always_comb`
    Star,
    List(Vec<SensItem>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlwaysBlock {
    pub kind: AlwaysKind,
    pub sensitivity: Sensitivity,
    pub body: Statement,
    pub line: usize,
}

impl AlwaysBlock {
    /// Clocked blocks produce registers
    pub fn is_sequential(&self) -> bool {
        if self.kind == AlwaysKind::Ff {
            return true;
        }
        match &self.sensitivity {
            Sensitivity::Star => false,
            Sensitivity::List(items) => items.iter().any(|i| i.edge.is_some()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Block(Vec<Statement>),
    If {
        cond: Expr,
        then_branch: Box<Statement>,
        else_branch: Option<Box<Statement>>,
    },
    Case {
        selector: Expr,
        items: Vec<CaseItem>,
        default: Option<Box<Statement>>,
    },
    Assign {
        lhs: Expr,
        rhs: Expr,
        blocking: bool,
    },
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseItem {
    pub labels: Vec<Expr>,
    pub body: Statement,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Connections {
    Named(Vec<(String, Option<Expr>)>),
    Positional(Vec<Option<Expr>>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    pub module: String,
    pub name: String,
    pub connections: Connections,
    pub line: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
    LogicalNot,
    BitNot,
    ReduceAnd,
    ReduceOr,
    ReduceXor,
    ReduceNand,
    ReduceNor,
    ReduceXnor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Pow,
    Mul,
    Div,
    Mod,
    Add,
    Sub,
    Shl,
    Shr,
    AShl,
    AShr,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    CaseEq,
    CaseNe,
    BitAnd,
    BitXor,
    BitXnor,
    BitOr,
    LogicalAnd,
    LogicalOr,
}

/// Hardware cost class of an operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpClass {
    Arith,
    Multiply,
    Compare,
    Logic,
    Shift,
    Reduce,
}

impl UnaryOp {
    pub fn class(self) -> OpClass {
        match self {
            UnaryOp::Plus | UnaryOp::Minus => OpClass::Arith,
            UnaryOp::LogicalNot | UnaryOp::BitNot => OpClass::Logic,
            _ => OpClass::Reduce,
        }
    }
}

impl BinaryOp {
    pub fn class(self) -> OpClass {
        use BinaryOp::*;
        match self {
            Add | Sub => OpClass::Arith,
            Pow | Mul | Div | Mod => OpClass::Multiply,
            Shl | Shr | AShl | AShr => OpClass::Shift,
            Lt | Le | Gt | Ge | Eq | Ne | CaseEq | CaseNe => OpClass::Compare,
            BitAnd | BitXor | BitXnor | BitOr | LogicalAnd | LogicalOr => OpClass::Logic,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Select {
    Bit(Box<Expr>),
    Part(Box<Expr>, Box<Expr>),
    /// `base[start +: width]` / `base[start -: width]`
    Indexed { start: Box<Expr>, width: Box<Expr> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Ident(String),
    Number(Literal),
    Select {
        base: Box<Expr>,
        select: Select,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Ternary {
        cond: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
    Concat(Vec<Expr>),
    Replicate {
        count: Box<Expr>,
        items: Vec<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
}

impl Expr {
    /// Collect every identifier read by this expression
    pub fn collect_reads(&self, out: &mut BTreeSet<String>) {
        match self {
            Expr::Ident(name) => {
                out.insert(name.clone());
            }
            Expr::Number(_) => {}
            Expr::Select { base, select } => {
                base.collect_reads(out);
                select.collect_reads(out);
            }
            Expr::Unary { operand, .. } => operand.collect_reads(out),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_reads(out);
                rhs.collect_reads(out);
            }
            Expr::Ternary {
                cond,
                then_expr,
                else_expr,
            } => {
                cond.collect_reads(out);
                then_expr.collect_reads(out);
                else_expr.collect_reads(out);
            }
            Expr::Concat(items) | Expr::Call { args: items, .. } => {
                for item in items {
                    item.collect_reads(out);
                }
            }
            Expr::Replicate { count, items } => {
                count.collect_reads(out);
                for item in items {
                    item.collect_reads(out);
                }
            }
        }
    }

    /// Signals written when this expression is used as an assignment target
    pub fn targets(&self) -> Vec<&str> {
        match self {
            Expr::Ident(name) => vec![name.as_str()],
            Expr::Select { base, .. } => base.targets(),
            Expr::Concat(items) => items.iter().flat_map(|i| i.targets()).collect(),
            _ => Vec::new(),
        }
    }

    /// Identifiers read by an assignment target (select indices)
    pub fn collect_target_reads(&self, out: &mut BTreeSet<String>) {
        match self {
            Expr::Select { base, select } => {
                base.collect_target_reads(out);
                select.collect_reads(out);
            }
            Expr::Concat(items) => {
                for item in items {
                    item.collect_target_reads(out);
                }
            }
            _ => {}
        }
    }

    pub fn is_lvalue(&self) -> bool {
        match self {
            Expr::Ident(_) => true,
            Expr::Select { base, .. } => base.is_lvalue(),
            Expr::Concat(items) => !items.is_empty() && items.iter().all(Expr::is_lvalue),
            _ => false,
        }
    }
}

impl Select {
    fn collect_reads(&self, out: &mut BTreeSet<String>) {
        match self {
            Select::Bit(index) => index.collect_reads(out),
            Select::Part(msb, lsb) => {
                msb.collect_reads(out);
                lsb.collect_reads(out);
            }
            Select::Indexed { start, width } => {
                start.collect_reads(out);
                width.collect_reads(out);
            }
        }
    }
}
