//! Whole-module assembly emission: a `.bss` reservation per global followed
//! by a `.text` definition per function, each function lowered block by
//! block with [`stack_layout::plan`] fixing its frame ahead of time.
//! Globals are emitted once up front, then one function at a time, each
//! bracketed by its own prologue/epilogue.

use crate::codegen::asm::AsmEmitter;
use crate::codegen::lowering::{self, LoweringCtx};
use crate::codegen::stack_layout;
use crate::common::error::{CoreError, CoreResult};
use crate::ir::ir::Module;

/// Lower an entire module to assembly text.
pub fn emit(module: &Module) -> CoreResult<String> {
    let mut asm = AsmEmitter::new();
    emit_globals(module, &mut asm);
    emit_functions(module, &mut asm)?;
    Ok(asm.finish())
}

fn emit_globals(module: &Module, asm: &mut AsmEmitter) {
    if module.globals.is_empty() {
        return;
    }
    asm.directive("    .section .bss,\"aw\",@nobits");
    for global in &module.globals {
        let size = global.size().max(1);
        asm.directive(format!("    .globl {}", global.name));
        asm.directive("    .align 3");
        asm.directive(format!("    .type {}, @object", global.name));
        asm.directive(format!("    .size {}, {}", global.name, size));
        asm.label(&global.name);
        asm.directive(format!("    .space {size}"));
    }
}

fn emit_functions(module: &Module, asm: &mut AsmEmitter) -> CoreResult<()> {
    asm.directive("    .text");
    for func in &module.functions {
        if func.is_extern {
            continue;
        }
        if func.blocks.is_empty() {
            return Err(CoreError::MalformedFunction {
                function: func.name.clone(),
                reason: "has no basic blocks".into(),
            });
        }
        emit_function(module, func, asm);
    }
    Ok(())
}

fn emit_function(module: &Module, func: &crate::ir::ir::Function, asm: &mut AsmEmitter) {
    asm.directive(format!("    .globl {}", func.name));
    asm.directive(format!("    .type {}, @function", func.name));
    asm.label(&func.name);

    let frame = stack_layout::plan(func);
    let mut ctx = LoweringCtx { module, func, frame: &frame, asm };
    lowering::gen_prologue(&mut ctx);

    for block in &func.blocks {
        ctx.asm.label(lowering::block_label(&func.name, block.id));
        for inst in &block.instructions {
            if inst.is_phi() {
                continue;
            }
            lowering::gen_instruction(&mut ctx, inst);
        }
        lowering::gen_terminator(&mut ctx, block.id, &block.terminator);
    }

    lowering::gen_epilogue(&mut ctx);
    asm.directive(format!("    .size {0}, .-{0}", func.name));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::Type;
    use crate::ir::ir::{BasicBlock, Function, Global, IntBinOp, Operand, Terminator};

    #[test]
    fn emits_bss_entry_per_global() {
        let mut module = Module::new();
        module.globals.push(Global { name: "counter".into(), ty: Type::I32 });
        let mut f = Function::new("main", Type::I32, vec![], false);
        let entry = f.new_block();
        f.blocks.push(BasicBlock {
            id: entry,
            instructions: vec![],
            terminator: Terminator::Ret(Some(Operand::Const(crate::ir::ir::Constant::I32(0)))),
        });
        module.functions.push(f);

        let out = emit(&module).expect("emits");
        assert!(out.contains(".section .bss"));
        assert!(out.contains("counter:"));
        assert!(out.contains(".space 4"));
    }

    #[test]
    fn emits_one_label_per_block_and_skips_extern_functions() {
        let mut module = Module::new();
        module.functions.push(Function::new("putint", Type::Void, vec![("v".into(), Type::I32)], true));

        let mut f = Function::new("add_one", Type::I32, vec![("a".into(), Type::I32)], false);
        let entry = f.new_block();
        let t = f.new_value();
        f.blocks.push(BasicBlock {
            id: entry,
            instructions: vec![crate::ir::ir::Instruction::BinOp {
                dest: t,
                op: IntBinOp::Add,
                lhs: Operand::Value(f.params[0].id),
                rhs: Operand::Const(crate::ir::ir::Constant::I32(1)),
            }],
            terminator: Terminator::Ret(Some(Operand::Value(t))),
        });
        module.functions.push(f);

        let out = emit(&module).expect("emits");
        assert!(!out.contains("putint:"));
        assert!(out.contains("add_one:"));
        assert!(out.contains(&format!("add_one_{entry}:")));
        assert!(out.contains("add_one_exit:"));
    }
}
