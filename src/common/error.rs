//! Error types for the core. Per the error-handling design:
//!
//! 1. Structural IR violations (missing terminator, φ/predecessor mismatch,
//!    operand type mismatch) are programming errors in the upstream builder
//!    or in a pass itself — they are fatal `assert!`/`panic!`s, not `Result`s.
//! 2. Unsupported constructs (an opcode or type the lowering table doesn't
//!    know) are recoverable at the API boundary: `emit()` returns `Err` and
//!    the caller prints the message and exits without partial output. The
//!    closed `Instruction`/`Terminator` enums this crate lowers are matched
//!    exhaustively, so this crate itself never hits this category; it is
//!    reserved for a future opcode/type this crate doesn't yet know about.
//! 3. Runtime-only checks (negative array index) are not detected by the
//!    compiler at all; they are the emitted program's problem.

use thiserror::Error;

/// Errors `emit()` can return — category 2 above. Category 1 is never
/// represented here; it panics.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("function `{function}` is malformed: {reason}")]
    MalformedFunction { function: String, reason: String },

    #[error("malformed textual IR input: {0}")]
    TextIrSyntax(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
