//! `cminusfc-core`: the optimization and lowering core of the `cminus-f`
//! pedagogical compiler. Consumes a `Module` already built by an upstream
//! AST-to-IR builder, promotes memory-allocated scalars to SSA form via
//! dominator-driven Mem2Reg, and lowers the result to a LoongArch-like
//! assembly text. The lexer/parser/AST and the CLI frontend proper are
//! external collaborators — see `driver::textir` for the minimal textual
//! IR format this crate's own harness and tests parse instead.

pub mod codegen;
pub mod common;
pub mod dom;
pub mod driver;
pub mod ir;
pub mod mem2reg;
