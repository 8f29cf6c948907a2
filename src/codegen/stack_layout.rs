//! Per-function stack frame planning: every non-void instruction result
//! and every parameter gets a fixed, `$fp`-relative slot; nothing is ever
//! register-allocated or shared between values, since this crate performs
//! no liveness analysis. An `alloca` additionally reserves its backing
//! storage immediately below its own pointer slot.
//!
//! Parameters are walked first, then every instruction in program order,
//! assigning slots aligned to their own size, bumping the running offset
//! by an alloca's extra backing size as a side effect, and rounding the
//! final frame size up to 16.

use crate::common::fx_hash::FxHashMap;
use crate::common::types::Type;
use crate::ir::ir::{Function, Instruction, ValueId, instruction_result_type};

/// Distance from `$fp` down to the first assignable slot: 16 bytes are
/// reserved above it for the saved `$ra`/old `$fp` pair written by the
/// prologue.
pub const PROLOGUE_OFFSET_BASE: u32 = 16;
/// Every frame's total size is rounded up to a multiple of this.
pub const PROLOGUE_ALIGN: u32 = 16;

fn align_up(n: u32, to: u32) -> u32 {
    if to <= 1 {
        return n;
    }
    n.div_ceil(to) * to
}

/// The slot assignment and total frame size for one function.
#[derive(Debug, Clone, Default)]
pub struct StackFrame {
    /// `$fp`-relative byte offset (always negative) of each parameter's
    /// and each non-void instruction's result.
    pub offset_map: FxHashMap<ValueId, i32>,
    /// Total stack space to reserve, already aligned to 16.
    pub frame_size: u32,
}

/// Plan the stack frame for one (non-extern) function.
pub fn plan(func: &Function) -> StackFrame {
    let mut offset_map = FxHashMap::default();
    let mut offset = PROLOGUE_OFFSET_BASE;

    for arg in &func.params {
        let size = arg.ty.size().max(1);
        offset = align_up(offset + size, size);
        offset_map.insert(arg.id, -(offset as i32));
    }

    for block in &func.blocks {
        for inst in &block.instructions {
            if let Some(dest) = inst.dest() {
                let ty = instruction_result_type(inst);
                if !ty.is_void() {
                    let size = ty.size().max(1);
                    offset = align_up(offset + size, size);
                    offset_map.insert(dest, -(offset as i32));
                }
            }
            if let Instruction::Alloca { ty, .. } = inst {
                offset += ty.size();
            }
        }
    }

    StackFrame { offset_map, frame_size: align_up(offset, PROLOGUE_ALIGN) }
}

/// The load/store width to use for a scalar type: `1` (byte, `i1`),
/// `4` (word, `i32`/`f32`), or `8` (double, pointers).
pub fn scalar_width(ty: &Type) -> u32 {
    match ty {
        Type::I1 => 1,
        Type::I32 | Type::F32 => 4,
        Type::Ptr(_) => 8,
        other => panic!("no scalar memory width for type {other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::ir::{BasicBlock, Operand, Terminator};

    #[test]
    fn params_and_results_get_distinct_aligned_slots() {
        let mut f = Function::new(
            "f",
            Type::I32,
            vec![("a".into(), Type::I32), ("b".into(), Type::F32)],
            false,
        );
        let entry = f.new_block();
        let t = f.new_value();
        f.blocks.push(BasicBlock {
            id: entry,
            instructions: vec![Instruction::BinOp {
                dest: t,
                op: crate::ir::ir::IntBinOp::Add,
                lhs: Operand::Value(f.params[0].id),
                rhs: Operand::Value(f.params[0].id),
            }],
            terminator: Terminator::Ret(Some(Operand::Value(t))),
        });

        let frame = plan(&f);
        assert_eq!(frame.offset_map.len(), 3);
        assert_eq!(frame.frame_size % PROLOGUE_ALIGN, 0);
        // every slot is distinct and within the final frame size
        let mut offsets: Vec<i32> = frame.offset_map.values().copied().collect();
        offsets.sort_unstable();
        offsets.dedup();
        assert_eq!(offsets.len(), 3);
    }

    #[test]
    fn alloca_reserves_backing_storage_below_its_slot() {
        let mut f = Function::new("g", Type::Void, vec![], false);
        let entry = f.new_block();
        let a = f.new_value();
        f.blocks.push(BasicBlock {
            id: entry,
            instructions: vec![Instruction::Alloca { dest: a, ty: Type::array(Type::I32, 4) }],
            terminator: Terminator::Ret(None),
        });
        let frame = plan(&f);
        // 16 (base) + 8 (ptr slot, aligned to 8) + 16 (backing bytes) = 40, aligned to 48
        assert_eq!(frame.frame_size, 48);
    }
}
