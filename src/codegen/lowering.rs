//! Per-opcode instruction lowering: one routine per `Instruction`/`Terminator`
//! variant, each loading its operands from the stack frame into a fixed
//! scratch register, computing, and storing the result straight back.
//! Covers binary/float-binary arithmetic, `icmp`/`fcmp` via `slt`/`nor`/`or`
//! sequences, `gep`'s scalar and array-decay address arithmetic, the
//! `sitofp`/`fptosi` raw-bit-pattern round-trip through a float register,
//! and φ-copy resolution on both edges of a conditional branch before the
//! branch itself is emitted.

use crate::codegen::asm::{fits_imm12, load_large_int32, load_large_int64, AsmEmitter};
use crate::codegen::regs::*;
use crate::codegen::stack_layout::{scalar_width, StackFrame};
use crate::common::types::Type;
use crate::ir::ir::{
    BlockId, CmpPred, Constant, FloatBinOp, Function, Instruction, IntBinOp, Module, Operand, Terminator,
};

pub struct LoweringCtx<'a> {
    pub module: &'a Module,
    pub func: &'a Function,
    pub frame: &'a StackFrame,
    pub asm: &'a mut AsmEmitter,
}

fn operand_type(ctx: &LoweringCtx, op: &Operand) -> Type {
    match op {
        Operand::Const(c) => c.ty(),
        Operand::Value(v) => ctx.func.value_type(*v),
        Operand::Global(name) => {
            let global = ctx.module.globals.iter().find(|g| &g.name == name).unwrap_or_else(|| {
                panic!("lowering: no such global `{name}` in module")
            });
            Type::ptr(global.ty.clone())
        }
    }
}

/// `ld.b`/`ld.w`/`ld.d` or `st.b`/`st.w`/`st.d`, chosen by a scalar
/// type's memory width.
fn int_mnemonic(prefix: &str, width: u32) -> &'static str {
    match (prefix, width) {
        ("ld", 1) => "ld.b",
        ("ld", 4) => "ld.w",
        ("ld", 8) => "ld.d",
        ("st", 1) => "st.b",
        ("st", 4) => "st.w",
        ("st", 8) => "st.d",
        _ => unreachable!("unsupported width {width} for {prefix}"),
    }
}

fn load_to_greg(ctx: &mut LoweringCtx, op: &Operand, reg: &str) {
    match op {
        Operand::Const(Constant::I32(v)) => {
            if fits_imm12(*v as i64) {
                ctx.asm.emit_fmt(format_args!("    addi.w {reg}, {ZERO}, {v}"));
            } else {
                load_large_int32(ctx.asm, *v, reg);
            }
        }
        Operand::Const(Constant::I1(b)) => {
            ctx.asm.emit_fmt(format_args!("    addi.w {reg}, {ZERO}, {}", *b as i32));
        }
        Operand::Const(Constant::F32(_)) => panic!("load_to_greg called on a float constant"),
        Operand::Global(name) => {
            ctx.asm.emit_fmt(format_args!("    la.local {reg}, {name}"));
        }
        Operand::Value(v) => load_from_stack_to_greg(ctx, *v, reg),
    }
}

fn load_from_stack_to_greg(ctx: &mut LoweringCtx, v: crate::ir::ir::ValueId, reg: &str) {
    let offset = ctx.frame.offset_map[&v] as i64;
    let ty = ctx.func.value_type(v);
    let width = scalar_width(&ty);
    let mnemonic = int_mnemonic("ld", width);
    if fits_imm12(offset) {
        ctx.asm.emit_fmt(format_args!("    {mnemonic} {reg}, {FP}, {offset}"));
    } else {
        load_large_int64(ctx.asm, offset, reg);
        ctx.asm.emit_fmt(format_args!("    add.d {reg}, {FP}, {reg}"));
        ctx.asm.emit_fmt(format_args!("    {mnemonic} {reg}, {reg}, 0"));
    }
}

fn store_from_greg(ctx: &mut LoweringCtx, v: crate::ir::ir::ValueId, reg: &str) {
    let offset = ctx.frame.offset_map[&v] as i64;
    let ty = ctx.func.value_type(v);
    let width = scalar_width(&ty);
    let mnemonic = int_mnemonic("st", width);
    if fits_imm12(offset) {
        ctx.asm.emit_fmt(format_args!("    {mnemonic} {reg}, {FP}, {offset}"));
    } else {
        load_large_int64(ctx.asm, offset, T8);
        ctx.asm.emit_fmt(format_args!("    add.d {T8}, {FP}, {T8}"));
        ctx.asm.emit_fmt(format_args!("    {mnemonic} {reg}, {T8}, 0"));
    }
}

fn load_to_freg(ctx: &mut LoweringCtx, op: &Operand, freg: &str) {
    match op {
        Operand::Const(Constant::F32(v)) => {
            let bits = v.to_bits() as i32;
            load_large_int32(ctx.asm, bits, T8);
            ctx.asm.emit_fmt(format_args!("    movgr2fr.w {freg}, {T8}"));
        }
        Operand::Value(v) => {
            let offset = ctx.frame.offset_map[v] as i64;
            if fits_imm12(offset) {
                ctx.asm.emit_fmt(format_args!("    fld.s {freg}, {FP}, {offset}"));
            } else {
                load_large_int64(ctx.asm, offset, T8);
                ctx.asm.emit_fmt(format_args!("    add.d {T8}, {FP}, {T8}"));
                ctx.asm.emit_fmt(format_args!("    fld.s {freg}, {T8}, 0"));
            }
        }
        other => panic!("load_to_freg called on non-float operand {other:?}"),
    }
}

fn store_from_freg(ctx: &mut LoweringCtx, v: crate::ir::ir::ValueId, freg: &str) {
    let offset = ctx.frame.offset_map[&v] as i64;
    if fits_imm12(offset) {
        ctx.asm.emit_fmt(format_args!("    fst.s {freg}, {FP}, {offset}"));
    } else {
        load_large_int64(ctx.asm, offset, T8);
        ctx.asm.emit_fmt(format_args!("    add.d {T8}, {FP}, {T8}"));
        ctx.asm.emit_fmt(format_args!("    fst.s {freg}, {T8}, 0"));
    }
}

pub fn gen_prologue(ctx: &mut LoweringCtx) {
    let frame_size = ctx.frame.frame_size as i64;
    ctx.asm.emit_fmt(format_args!("    st.d {RA}, {SP}, -8"));
    ctx.asm.emit_fmt(format_args!("    st.d {FP}, {SP}, -16"));
    ctx.asm.emit_fmt(format_args!("    addi.d {FP}, {SP}, 0"));
    if fits_imm12(-frame_size) {
        ctx.asm.emit_fmt(format_args!("    addi.d {SP}, {SP}, {}", -frame_size));
    } else {
        load_large_int64(ctx.asm, frame_size, T0);
        ctx.asm.emit_fmt(format_args!("    sub.d {SP}, {SP}, {T0}"));
    }

    let mut gregs = 0usize;
    let mut fregs = 0usize;
    for i in 0..ctx.func.params.len() {
        let (id, ty) = (ctx.func.params[i].id, ctx.func.params[i].ty.clone());
        if ty.is_float() {
            let reg = freg_arg(fregs);
            fregs += 1;
            store_from_freg(ctx, id, &reg);
        } else {
            let reg = greg_arg(gregs);
            gregs += 1;
            store_from_greg(ctx, id, &reg);
        }
    }
}

pub fn gen_epilogue(ctx: &mut LoweringCtx) {
    let exit_label = format!("{}_exit", ctx.func.name);
    ctx.asm.label(&exit_label);
    let frame_size = ctx.frame.frame_size as i64;
    if fits_imm12(frame_size) {
        ctx.asm.emit_fmt(format_args!("    addi.d {SP}, {SP}, {frame_size}"));
    } else {
        load_large_int64(ctx.asm, frame_size, T0);
        ctx.asm.emit_fmt(format_args!("    add.d {SP}, {SP}, {T0}"));
    }
    ctx.asm.emit_fmt(format_args!("    ld.d {RA}, {SP}, -8"));
    ctx.asm.emit_fmt(format_args!("    ld.d {FP}, {SP}, -16"));
    ctx.asm.emit_fmt(format_args!("    jr {RA}"));
}

pub fn block_label(func_name: &str, block: BlockId) -> String {
    format!("{func_name}_{block}")
}

/// Materialize the values a branch's target block's φs expect from this
/// edge, before the branch itself is taken. Both a conditional branch's
/// targets get their copies written unconditionally ahead of the actual
/// test, since only the taken target's φ will ever be read.
fn resolve_phis(ctx: &mut LoweringCtx, pred: BlockId, succ: BlockId) {
    for phi in ctx.func.block(succ).phis() {
        let Instruction::Phi { dest, ty, incoming } = phi else { unreachable!() };
        let Some((value, _)) = incoming.iter().find(|(_, b)| *b == pred) else { continue };
        if ty.is_float() {
            load_to_freg(ctx, value, FT8);
            store_from_freg(ctx, *dest, FT8);
        } else {
            load_to_greg(ctx, value, T8);
            store_from_greg(ctx, *dest, T8);
        }
    }
}

pub fn gen_terminator(ctx: &mut LoweringCtx, block: BlockId, term: &Terminator) {
    match term {
        Terminator::Ret(None) => {
            ctx.asm.emit_fmt(format_args!("    addi.w {}, {ZERO}, 0", greg_arg(0)));
            ctx.asm.emit_fmt(format_args!("    b {}_exit", ctx.func.name));
        }
        Terminator::Ret(Some(op)) => {
            if operand_type(ctx, op).is_float() {
                let reg = freg_arg(0);
                load_to_freg(ctx, op, &reg);
            } else {
                let reg = greg_arg(0);
                load_to_greg(ctx, op, &reg);
            }
            ctx.asm.emit_fmt(format_args!("    b {}_exit", ctx.func.name));
        }
        Terminator::Br(target) => {
            resolve_phis(ctx, block, *target);
            ctx.asm.emit_fmt(format_args!("    b {}", block_label(&ctx.func.name, *target)));
        }
        Terminator::CondBr { cond, then_blk, else_blk } => {
            load_to_greg(ctx, cond, T0);
            ctx.asm.emit_fmt(format_args!("    bstrpick.d {T1}, {T0}, 0, 0"));
            resolve_phis(ctx, block, *then_blk);
            resolve_phis(ctx, block, *else_blk);
            ctx.asm.emit_fmt(format_args!("    bnez {T1}, {}", block_label(&ctx.func.name, *then_blk)));
            ctx.asm.emit_fmt(format_args!("    b {}", block_label(&ctx.func.name, *else_blk)));
        }
    }
}

pub fn gen_instruction(ctx: &mut LoweringCtx, inst: &Instruction) {
    match inst {
        Instruction::Alloca { dest, ty } => {
            let slot = ctx.frame.offset_map[dest];
            let start = slot - ty.size() as i32;
            if fits_imm12(start as i64) {
                ctx.asm.emit_fmt(format_args!("    addi.d {T1}, {FP}, {start}"));
            } else {
                load_large_int64(ctx.asm, start as i64, T1);
                ctx.asm.emit_fmt(format_args!("    add.d {T1}, {FP}, {T1}"));
            }
            store_from_greg(ctx, *dest, T1);
        }
        Instruction::Load { dest, ty, ptr } => {
            load_to_greg(ctx, ptr, T0);
            if ty.is_float() {
                ctx.asm.emit_fmt(format_args!("    fld.s {FT0}, {T0}, 0"));
                store_from_freg(ctx, *dest, FT0);
            } else {
                let mnemonic = int_mnemonic("ld", scalar_width(ty));
                ctx.asm.emit_fmt(format_args!("    {mnemonic} {T0}, {T0}, 0"));
                store_from_greg(ctx, *dest, T0);
            }
        }
        Instruction::Store { ptr, value } => {
            let value_ty = operand_type(ctx, value);
            load_to_greg(ctx, ptr, T0);
            if value_ty.is_float() {
                load_to_freg(ctx, value, FT0);
                ctx.asm.emit_fmt(format_args!("    fst.s {FT0}, {T0}, 0"));
            } else {
                load_to_greg(ctx, value, T1);
                let mnemonic = int_mnemonic("st", scalar_width(&value_ty));
                ctx.asm.emit_fmt(format_args!("    {mnemonic} {T1}, {T0}, 0"));
            }
        }
        Instruction::BinOp { dest, op, lhs, rhs } => {
            load_to_greg(ctx, lhs, T0);
            load_to_greg(ctx, rhs, T1);
            let mnemonic = match op {
                IntBinOp::Add => "add.w",
                IntBinOp::Sub => "sub.w",
                IntBinOp::Mul => "mul.w",
                IntBinOp::Sdiv => "div.w",
            };
            ctx.asm.emit_fmt(format_args!("    {mnemonic} {T2}, {T0}, {T1}"));
            store_from_greg(ctx, *dest, T2);
        }
        Instruction::FBinOp { dest, op, lhs, rhs } => {
            load_to_freg(ctx, lhs, FT0);
            load_to_freg(ctx, rhs, FT1);
            let mnemonic = match op {
                FloatBinOp::Fadd => "fadd.s",
                FloatBinOp::Fsub => "fsub.s",
                FloatBinOp::Fmul => "fmul.s",
                FloatBinOp::Fdiv => "fdiv.s",
            };
            ctx.asm.emit_fmt(format_args!("    {mnemonic} {FT2}, {FT0}, {FT1}"));
            store_from_freg(ctx, *dest, FT2);
        }
        Instruction::Icmp { dest, pred, lhs, rhs } => {
            load_to_greg(ctx, lhs, T0);
            load_to_greg(ctx, rhs, T1);
            match pred {
                CmpPred::Gt => ctx.asm.emit_fmt(format_args!("    slt {T0}, {T1}, {T0}")),
                CmpPred::Ge => {
                    ctx.asm.emit_fmt(format_args!("    addi.w {T0}, {T0}, 1"));
                    ctx.asm.emit_fmt(format_args!("    slt {T0}, {T1}, {T0}"));
                }
                CmpPred::Eq => {
                    ctx.asm.emit_fmt(format_args!("    slt {T2}, {T1}, {T0}"));
                    ctx.asm.emit_fmt(format_args!("    slt {T3}, {T0}, {T1}"));
                    ctx.asm.emit_fmt(format_args!("    nor {T0}, {T2}, {T3}"));
                }
                CmpPred::Ne => {
                    ctx.asm.emit_fmt(format_args!("    slt {T2}, {T1}, {T0}"));
                    ctx.asm.emit_fmt(format_args!("    slt {T3}, {T0}, {T1}"));
                    ctx.asm.emit_fmt(format_args!("    or {T0}, {T2}, {T3}"));
                }
                CmpPred::Le => {
                    ctx.asm.emit_fmt(format_args!("    addi.w {T1}, {T1}, 1"));
                    ctx.asm.emit_fmt(format_args!("    slt {T0}, {T0}, {T1}"));
                }
                CmpPred::Lt => ctx.asm.emit_fmt(format_args!("    slt {T0}, {T0}, {T1}")),
            }
            store_from_greg(ctx, *dest, T0);
        }
        Instruction::Fcmp { dest, pred, lhs, rhs } => {
            load_to_freg(ctx, lhs, FT0);
            load_to_freg(ctx, rhs, FT1);
            match pred {
                CmpPred::Gt => ctx.asm.emit_fmt(format_args!("    fcmp.slt.s {FT0}, {FT1}, {FT0}")),
                CmpPred::Ge => ctx.asm.emit_fmt(format_args!("    fcmp.sle.s {FT0}, {FT1}, {FT0}")),
                CmpPred::Eq => ctx.asm.emit_fmt(format_args!("    fcmp.seq.s {FT0}, {FT0}, {FT1}")),
                CmpPred::Ne => ctx.asm.emit_fmt(format_args!("    fcmp.sne.s {FT0}, {FT0}, {FT1}")),
                CmpPred::Le => ctx.asm.emit_fmt(format_args!("    fcmp.sle.s {FT0}, {FT0}, {FT1}")),
                CmpPred::Lt => ctx.asm.emit_fmt(format_args!("    fcmp.slt.s {FT0}, {FT0}, {FT1}")),
            }
            store_from_freg(ctx, *dest, FT0);
        }
        Instruction::Zext { dest, value } => {
            load_to_greg(ctx, value, T0);
            ctx.asm.emit_fmt(format_args!("    bstrpick.w {T0}, {T0}, 0, 0"));
            store_from_greg(ctx, *dest, T0);
        }
        Instruction::Sitofp { dest, value } => {
            load_to_greg(ctx, value, T0);
            ctx.asm.emit_fmt(format_args!("    movgr2fr.w {FT0}, {T0}"));
            ctx.asm.emit_fmt(format_args!("    ffint.s.w {FT1}, {FT0}"));
            store_from_freg(ctx, *dest, FT1);
        }
        Instruction::Fptosi { dest, value } => {
            load_to_freg(ctx, value, FT0);
            ctx.asm.emit_fmt(format_args!("    ftintrz.w.s {FT1}, {FT0}"));
            store_from_freg(ctx, *dest, FT1);
        }
        Instruction::Call { dest, callee, args, ret_ty } => {
            let mut gregs = 0usize;
            let mut fregs = 0usize;
            for arg in args {
                if operand_type(ctx, arg).is_float() {
                    let reg = freg_arg(fregs);
                    fregs += 1;
                    load_to_freg(ctx, arg, &reg);
                } else {
                    let reg = greg_arg(gregs);
                    gregs += 1;
                    load_to_greg(ctx, arg, &reg);
                }
            }
            ctx.asm.emit_fmt(format_args!("    bl {callee}"));
            if let Some(dest) = dest {
                if ret_ty.is_float() {
                    store_from_freg(ctx, *dest, &freg_arg(0));
                } else {
                    store_from_greg(ctx, *dest, &greg_arg(0));
                }
            }
        }
        Instruction::Gep { dest, base, base_ty, indices } => {
            load_to_greg(ctx, base, T0);
            load_to_greg(ctx, &indices[0], T1);
            if indices.len() == 2 {
                let Type::Array(elem, _) = base_ty else {
                    panic!("gep with two indices requires an array base type, got {base_ty:?}")
                };
                load_to_greg(ctx, &indices[1], T2);
                load_large_int32(ctx.asm, base_ty.size() as i32, T3);
                load_large_int32(ctx.asm, elem.size() as i32, T4);
                ctx.asm.emit_fmt(format_args!("    mul.w {T1}, {T1}, {T3}"));
                ctx.asm.emit_fmt(format_args!("    bstrpick.d {T1}, {T1}, 31, 0"));
                ctx.asm.emit_fmt(format_args!("    add.d {T0}, {T0}, {T1}"));
                ctx.asm.emit_fmt(format_args!("    mul.w {T2}, {T2}, {T4}"));
                ctx.asm.emit_fmt(format_args!("    bstrpick.d {T2}, {T2}, 31, 0"));
                ctx.asm.emit_fmt(format_args!("    add.d {T0}, {T0}, {T2}"));
            } else {
                load_large_int32(ctx.asm, base_ty.size() as i32, T2);
                ctx.asm.emit_fmt(format_args!("    mul.w {T1}, {T1}, {T2}"));
                ctx.asm.emit_fmt(format_args!("    bstrpick.d {T1}, {T1}, 31, 0"));
                ctx.asm.emit_fmt(format_args!("    add.d {T0}, {T0}, {T1}"));
            }
            store_from_greg(ctx, *dest, T0);
        }
        Instruction::Phi { .. } => {
            // Resolved on the predecessor's outgoing edge, not here.
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::stack_layout;
    use crate::ir::ir::{BasicBlock, Function};

    fn ctx_for<'a>(module: &'a Module, func: &'a Function, frame: &'a StackFrame, asm: &'a mut AsmEmitter) -> LoweringCtx<'a> {
        LoweringCtx { module, func, frame, asm }
    }

    #[test]
    fn binop_loads_both_operands_and_stores_result() {
        let mut f = Function::new("f", Type::I32, vec![("a".into(), Type::I32), ("b".into(), Type::I32)], false);
        let entry = f.new_block();
        let t = f.new_value();
        f.blocks.push(BasicBlock {
            id: entry,
            instructions: vec![Instruction::BinOp {
                dest: t,
                op: IntBinOp::Add,
                lhs: Operand::Value(f.params[0].id),
                rhs: Operand::Value(f.params[1].id),
            }],
            terminator: Terminator::Ret(Some(Operand::Value(t))),
        });
        let module = Module::new();
        let frame = stack_layout::plan(&f);
        let mut asm = AsmEmitter::new();
        {
            let mut ctx = ctx_for(&module, &f, &frame, &mut asm);
            gen_instruction(&mut ctx, &f.blocks[0].instructions[0]);
        }
        let out = asm.finish();
        assert!(out.contains("add.w $t2, $t0, $t1"));
    }

    #[test]
    fn icmp_eq_uses_double_slt_and_nor() {
        let mut f = Function::new("f", Type::I1, vec![("a".into(), Type::I32), ("b".into(), Type::I32)], false);
        let entry = f.new_block();
        let t = f.new_value();
        f.blocks.push(BasicBlock {
            id: entry,
            instructions: vec![Instruction::Icmp {
                dest: t,
                pred: CmpPred::Eq,
                lhs: Operand::Value(f.params[0].id),
                rhs: Operand::Value(f.params[1].id),
            }],
            terminator: Terminator::Ret(Some(Operand::Value(t))),
        });
        let module = Module::new();
        let frame = stack_layout::plan(&f);
        let mut asm = AsmEmitter::new();
        {
            let mut ctx = ctx_for(&module, &f, &frame, &mut asm);
            gen_instruction(&mut ctx, &f.blocks[0].instructions[0]);
        }
        let out = asm.finish();
        assert!(out.contains("nor $t0, $t2, $t3"));
    }

    #[test]
    fn gep_scalar_scales_index_by_element_size() {
        let mut f = Function::new("f", Type::ptr(Type::I32), vec![("p".into(), Type::ptr(Type::I32))], false);
        let entry = f.new_block();
        let g = f.new_value();
        f.blocks.push(BasicBlock {
            id: entry,
            instructions: vec![Instruction::Gep {
                dest: g,
                base: Operand::Value(f.params[0].id),
                base_ty: Type::I32,
                indices: vec![Operand::Const(Constant::I32(3))],
            }],
            terminator: Terminator::Ret(Some(Operand::Value(g))),
        });
        let module = Module::new();
        let frame = stack_layout::plan(&f);
        let mut asm = AsmEmitter::new();
        {
            let mut ctx = ctx_for(&module, &f, &frame, &mut asm);
            gen_instruction(&mut ctx, &f.blocks[0].instructions[0]);
        }
        let out = asm.finish();
        assert!(out.contains("mul.w $t1, $t1, $t2"));
        assert!(out.contains("add.d $t0, $t0, $t1"));
    }
}
