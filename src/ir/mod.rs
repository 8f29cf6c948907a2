//! The IR this crate consumes and rewrites: `Module` owns `Function`s and
//! `Global`s, `Function` owns `BasicBlock`s and `Argument`s, `BasicBlock`
//! owns an ordered `Instruction` list plus one `Terminator`. See `ir::ir`
//! for the full data model and the construction/rewrite API upstream
//! builders (and this crate's own passes) use.

pub mod ir;

pub use ir::*;
