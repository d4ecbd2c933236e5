//! RTL front end: tokenizer, parser and netlist elaboration
//!
//! Supports the synthesizable Verilog/SystemVerilog subset needed to trace
//! combinational cones. Unsupported constructs are rejected with a parse
//! error naming them rather than being silently misread.

pub mod ast;
pub mod lexer;
pub mod netlist;
pub mod parser;

pub use netlist::{Design, ModuleNetlist, Signal, SignalLocation};
pub use parser::parse;
