//! Register naming conventions for the generated assembly. There is no
//! liveness analysis or register allocation in this crate: every value
//! lives on the stack between instructions, and a fixed, small set of
//! scratch registers carries it through exactly one instruction's worth
//! of arithmetic: every `gen_*` lowering routine loads its operands from
//! the frame, computes, and stores the result straight back.

/// General-purpose scratch registers used while lowering a single
/// instruction. `T8` is reserved for the "large stack offset" address
/// computation (see `asm::fits_imm12`) and for φ-copy resolution on a
/// branch edge, so it is never assigned by a `gen_*` routine directly.
pub const T0: &str = "$t0";
pub const T1: &str = "$t1";
pub const T2: &str = "$t2";
pub const T3: &str = "$t3";
pub const T4: &str = "$t4";
pub const T8: &str = "$t8";

/// Floating-point scratch registers, same convention as the `T*` set.
pub const FT0: &str = "$ft0";
pub const FT1: &str = "$ft1";
pub const FT2: &str = "$ft2";
pub const FT8: &str = "$ft8";

pub const ZERO: &str = "$zero";
pub const FP: &str = "$fp";
pub const SP: &str = "$sp";
pub const RA: &str = "$ra";

/// The `i`-th integer/pointer argument register, per the calling
/// convention (caller and callee agree on a fixed a0..aN sequence; this
/// crate never spills call arguments to the stack).
pub fn greg_arg(i: usize) -> String {
    format!("$a{i}")
}

/// The `i`-th floating-point argument register.
pub fn freg_arg(i: usize) -> String {
    format!("$fa{i}")
}
