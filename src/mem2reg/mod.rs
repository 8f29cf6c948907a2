//! Mem2Reg: promotes memory-allocated scalars into SSA form by inserting
//! φ-nodes at iterated dominance frontiers and renaming via a
//! dominator-tree DFS. Three phases: collect def blocks for each
//! promotable alloca, place φs at the iterated dominance frontier of
//! those def blocks, then walk the dominator tree renaming loads/stores
//! to a per-variable value stack, adapted to a tagged-enum IR with no
//! intrusive Use list — rewriting is a whole-function operand
//! substitution pass instead.
//!
//! Array-typed allocas are never promotable. Scalar allocas whose address
//! is taken — passed to a `gep`, a `call`, or stored as a value rather
//! than used as a load/store target — are excluded too
//! (`collect_escaping_values`), so promotion never has to reason about
//! aliasing through a pointer it handed out.

use log::debug;

use crate::common::fx_hash::{FxHashMap, FxHashSet};
use crate::common::types::Type;
use crate::dom::{self, Dominators};
use crate::ir::ir::{BlockId, Constant, Function, Instruction, Module, Operand, ValueId};

/// Promote allocas to SSA form with φ insertion, for every function in the
/// module. Runs dominator analysis itself.
pub fn promote_allocas(module: &mut Module) {
    for func in &mut module.functions {
        if func.is_extern || func.blocks.is_empty() {
            continue;
        }
        let doms = dom::analyze(func);
        promote_function(func, &doms);
    }
}

/// Per-alloca bookkeeping collected in phase 1.
struct AllocaInfo {
    ty: Type,
    def_blocks: FxHashSet<BlockId>,
}

fn promote_function(func: &mut Function, doms: &Dominators) {
    let escaping = collect_escaping_values(func);

    // Phase 1: collect promotable allocas and their def blocks.
    let mut allocas: FxHashMap<ValueId, AllocaInfo> = FxHashMap::default();
    for block in &func.blocks {
        for inst in &block.instructions {
            if let Instruction::Alloca { dest, ty } = inst {
                if ty.is_scalar() && !escaping.contains(dest) {
                    allocas.insert(*dest, AllocaInfo { ty: ty.clone(), def_blocks: FxHashSet::default() });
                }
            }
        }
    }
    if allocas.is_empty() {
        return;
    }
    for block in &func.blocks {
        for inst in &block.instructions {
            if let Instruction::Store { ptr: Operand::Value(v), .. } = inst {
                if let Some(info) = allocas.get_mut(v) {
                    info.def_blocks.insert(block.id);
                }
            }
        }
    }

    // Phase 2: iterated-dominance-frontier φ placement.
    let mut phi_owner: FxHashMap<ValueId, ValueId> = FxHashMap::default();
    for (&alloca, info) in &allocas {
        let mut worklist: Vec<BlockId> = info.def_blocks.iter().copied().collect();
        let mut placed: FxHashSet<BlockId> = FxHashSet::default();
        while let Some(x) = worklist.pop() {
            let Some(frontier) = doms.dom_front.get(&x) else { continue };
            for &y in frontier {
                if !placed.insert(y) {
                    continue;
                }
                let phi_dest = func.insert_phi(y, info.ty.clone());
                phi_owner.insert(phi_dest, alloca);
                if !info.def_blocks.contains(&y) {
                    worklist.push(y);
                }
            }
        }
    }

    debug!(
        "mem2reg `{}`: promoting {} alloca(s), {} φ(s) inserted",
        func.name,
        allocas.len(),
        phi_owner.len()
    );

    // Phase 3: dominator-tree-DFS rename.
    let mut stacks: FxHashMap<ValueId, Vec<Operand>> = FxHashMap::default();
    let mut subst: FxHashMap<ValueId, Operand> = FxHashMap::default();
    let mut loads_to_delete: FxHashSet<ValueId> = FxHashSet::default();
    let mut stores_to_delete: FxHashSet<(BlockId, usize)> = FxHashSet::default();
    let tys: FxHashMap<ValueId, Type> = allocas.iter().map(|(&a, info)| (a, info.ty.clone())).collect();
    let entry = func.entry();

    rename(
        func,
        entry,
        doms,
        &phi_owner,
        &tys,
        &mut stacks,
        &mut subst,
        &mut loads_to_delete,
        &mut stores_to_delete,
    );

    // Apply the collected substitution to every remaining instruction and
    // terminator operand in the function — this is `replace_all_use_with`
    // at function granularity, valid because values pushed onto a stack
    // are never themselves a load marked for deletion (see module docs).
    for block in &mut func.blocks {
        for inst in &mut block.instructions {
            for operand in inst.operands_mut() {
                if let Operand::Value(v) = operand {
                    if let Some(replacement) = subst.get(v) {
                        *operand = replacement.clone();
                    }
                }
            }
        }
        for operand in block.terminator.operands_mut() {
            if let Operand::Value(v) = operand {
                if let Some(replacement) = subst.get(v) {
                    *operand = replacement.clone();
                }
            }
        }
    }

    // Erase the marked loads, stores, and the now-dead promoted allocas.
    let promoted: FxHashSet<ValueId> = allocas.keys().copied().collect();
    for block in &mut func.blocks {
        let block_id = block.id;
        let mut idx = 0usize;
        block.instructions.retain(|inst| {
            let keep = match inst {
                Instruction::Load { dest, .. } => !loads_to_delete.contains(dest),
                Instruction::Store { .. } => !stores_to_delete.contains(&(block_id, idx)),
                Instruction::Alloca { dest, .. } => !promoted.contains(dest),
                _ => true,
            };
            idx += 1;
            keep
        });
    }
}

/// Every `ValueId` that appears in a role other than the pointer operand
/// of a `load` or the pointer operand of a `store` — i.e. every value
/// whose address could have "escaped" into a `gep`, a `call`, the stored
/// *value* of some other store, a φ, or a terminator operand. Allocas in
/// this set are not promotable regardless of their type.
fn collect_escaping_values(func: &Function) -> FxHashSet<ValueId> {
    fn note(operand: &Operand, escaping: &mut FxHashSet<ValueId>) {
        if let Operand::Value(v) = operand {
            escaping.insert(*v);
        }
    }

    let mut escaping = FxHashSet::default();
    for block in &func.blocks {
        for inst in &block.instructions {
            match inst {
                Instruction::Load { .. } => {
                    // The ptr operand is the sole, safe use; nothing to mark.
                }
                Instruction::Store { value, .. } => {
                    // The ptr operand is safe; the stored *value* escapes
                    // if it happens to be a pointer to another alloca.
                    note(value, &mut escaping);
                }
                other => {
                    for operand in other.operands() {
                        note(operand, &mut escaping);
                    }
                }
            }
        }
        for operand in block.terminator.operands() {
            note(operand, &mut escaping);
        }
    }
    escaping
}

#[allow(clippy::too_many_arguments)]
fn rename(
    func: &mut Function,
    block_id: BlockId,
    doms: &Dominators,
    phi_owner: &FxHashMap<ValueId, ValueId>,
    tys: &FxHashMap<ValueId, Type>,
    stacks: &mut FxHashMap<ValueId, Vec<Operand>>,
    subst: &mut FxHashMap<ValueId, Operand>,
    loads_to_delete: &mut FxHashSet<ValueId>,
    stores_to_delete: &mut FxHashSet<(BlockId, usize)>,
) {
    let mut pushes: Vec<ValueId> = Vec::new(); // allocas pushed in this block, for the pop on the way out

    {
        let block = func.block(block_id);
        for (idx, inst) in block.instructions.iter().enumerate() {
            match inst {
                Instruction::Phi { dest, .. } => {
                    if let Some(&owner) = phi_owner.get(dest) {
                        stacks.entry(owner).or_default().push(Operand::Value(*dest));
                        pushes.push(owner);
                    }
                }
                Instruction::Load { dest, ptr: Operand::Value(ptr), .. } if tys.contains_key(ptr) => {
                    let replacement = stacks
                        .get(ptr)
                        .and_then(|s| s.last())
                        .cloned()
                        .unwrap_or_else(|| Operand::Const(Constant::zero_for(&tys[ptr])));
                    subst.insert(*dest, replacement);
                    loads_to_delete.insert(*dest);
                }
                Instruction::Store { ptr: Operand::Value(ptr), value } if tys.contains_key(ptr) => {
                    stacks.entry(*ptr).or_default().push(value.clone());
                    pushes.push(*ptr);
                    stores_to_delete.insert((block_id, idx));
                }
                _ => {}
            }
        }
    }

    for succ in func.successors(block_id) {
        for phi in func.block_mut(succ).phis_mut() {
            let Instruction::Phi { dest, incoming, .. } = phi else { unreachable!() };
            let dest = *dest;
            let Some(&owner) = phi_owner.get(&dest) else { continue };
            if let Some(top) = stacks.get(&owner).and_then(|s| s.last()) {
                incoming.push((top.clone(), block_id));
            } else {
                // No reaching definition on this edge: poison to the
                // type-appropriate zero.
                incoming.push((Operand::Const(Constant::zero_for(&tys[&owner])), block_id));
            }
        }
    }

    for child in doms.dom_succ.get(&block_id).cloned().unwrap_or_default() {
        rename(func, child, doms, phi_owner, tys, stacks, subst, loads_to_delete, stores_to_delete);
    }

    for owner in pushes.into_iter().rev() {
        stacks.get_mut(&owner).expect("pushed value must have a stack").pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::ir::{BasicBlock, Terminator};

    /// Mem2Reg on straight line: `alloca i32 x; store 7, x; %t = load
    /// x; ret %t` becomes `ret i32 7` with no alloca and no load/store.
    #[test]
    fn straight_line_elides_memory_traffic() {
        let mut module = Module::new();
        let mut f = Function::new("straight", Type::I32, vec![], false);
        let entry = f.new_block();
        let x = f.new_value();
        let t = f.new_value();
        f.blocks.push(BasicBlock {
            id: entry,
            instructions: vec![
                Instruction::Alloca { dest: x, ty: Type::I32 },
                Instruction::Store { ptr: Operand::Value(x), value: Operand::Const(Constant::I32(7)) },
                Instruction::Load { dest: t, ty: Type::I32, ptr: Operand::Value(x) },
            ],
            terminator: Terminator::Ret(Some(Operand::Value(t))),
        });
        module.functions.push(f);

        promote_allocas(&mut module);

        let f = &module.functions[0];
        let block = &f.blocks[0];
        assert!(block.instructions.is_empty(), "alloca/store/load should all be erased");
        match &block.terminator {
            Terminator::Ret(Some(Operand::Const(Constant::I32(7)))) => {}
            other => panic!("expected ret 7, got {other:?}"),
        }
    }

    /// Mem2Reg across a diamond: `if (c) store 1,x; else store 2,x; %t =
    /// load x; ret %t` yields one φ at the join with incoming `(1, then),
    /// (2, else)`.
    #[test]
    fn diamond_inserts_single_phi() {
        let mut module = Module::new();
        let mut f = Function::new("diamond", Type::I32, vec![], false);
        let entry = f.new_block();
        let then_blk = f.new_block();
        let else_blk = f.new_block();
        let join = f.new_block();
        let x = f.new_value();
        let t = f.new_value();

        f.blocks.push(BasicBlock {
            id: entry,
            instructions: vec![Instruction::Alloca { dest: x, ty: Type::I32 }],
            terminator: Terminator::CondBr {
                cond: Operand::Const(Constant::I1(true)),
                then_blk,
                else_blk,
            },
        });
        f.blocks.push(BasicBlock {
            id: then_blk,
            instructions: vec![Instruction::Store { ptr: Operand::Value(x), value: Operand::Const(Constant::I32(1)) }],
            terminator: Terminator::Br(join),
        });
        f.blocks.push(BasicBlock {
            id: else_blk,
            instructions: vec![Instruction::Store { ptr: Operand::Value(x), value: Operand::Const(Constant::I32(2)) }],
            terminator: Terminator::Br(join),
        });
        f.blocks.push(BasicBlock {
            id: join,
            instructions: vec![Instruction::Load { dest: t, ty: Type::I32, ptr: Operand::Value(x) }],
            terminator: Terminator::Ret(Some(Operand::Value(t))),
        });
        module.functions.push(f);

        promote_allocas(&mut module);

        let f = &module.functions[0];
        let join_block = f.block(join);
        assert_eq!(join_block.instructions.len(), 1, "exactly one φ, load erased");
        let Instruction::Phi { incoming, .. } = &join_block.instructions[0] else {
            panic!("expected a φ");
        };
        assert_eq!(incoming.len(), 2);
        let mut by_pred: FxHashMap<BlockId, &Operand> = incoming.iter().map(|(v, b)| (*b, v)).collect();
        assert_eq!(by_pred.remove(&then_blk), Some(&Operand::Const(Constant::I32(1))));
        assert_eq!(by_pred.remove(&else_blk), Some(&Operand::Const(Constant::I32(2))));
    }

    #[test]
    fn array_alloca_is_left_intact() {
        let mut module = Module::new();
        let mut f = Function::new("arr", Type::Void, vec![], false);
        let entry = f.new_block();
        let a = f.new_value();
        f.blocks.push(BasicBlock {
            id: entry,
            instructions: vec![Instruction::Alloca { dest: a, ty: Type::array(Type::I32, 4) }],
            terminator: Terminator::Ret(None),
        });
        module.functions.push(f);

        promote_allocas(&mut module);

        assert_eq!(module.functions[0].blocks[0].instructions.len(), 1);
    }

    #[test]
    fn address_taken_by_gep_is_not_promoted() {
        let mut module = Module::new();
        let mut f = Function::new("escapes", Type::Void, vec![], false);
        let entry = f.new_block();
        let a = f.new_value();
        let g = f.new_value();
        f.blocks.push(BasicBlock {
            id: entry,
            instructions: vec![
                Instruction::Alloca { dest: a, ty: Type::I32 },
                Instruction::Gep {
                    dest: g,
                    base: Operand::Value(a),
                    base_ty: Type::I32,
                    indices: vec![Operand::Const(Constant::I32(0))],
                },
            ],
            terminator: Terminator::Ret(None),
        });
        module.functions.push(f);

        promote_allocas(&mut module);

        assert_eq!(module.functions[0].blocks[0].instructions.len(), 2, "alloca must survive, address taken by gep");
    }

    #[test]
    fn idempotent_second_run_is_a_no_op() {
        let mut module = Module::new();
        let mut f = Function::new("straight", Type::I32, vec![], false);
        let entry = f.new_block();
        let x = f.new_value();
        let t = f.new_value();
        f.blocks.push(BasicBlock {
            id: entry,
            instructions: vec![
                Instruction::Alloca { dest: x, ty: Type::I32 },
                Instruction::Store { ptr: Operand::Value(x), value: Operand::Const(Constant::I32(7)) },
                Instruction::Load { dest: t, ty: Type::I32, ptr: Operand::Value(x) },
            ],
            terminator: Terminator::Ret(Some(Operand::Value(t))),
        });
        module.functions.push(f);

        promote_allocas(&mut module);
        let after_first = format!("{:?}", module.functions[0].blocks);
        promote_allocas(&mut module);
        let after_second = format!("{:?}", module.functions[0].blocks);
        assert_eq!(after_first, after_second);
    }

    #[test]
    fn non_promotable_load_store_survives_byte_identical() {
        // A load/store through a global (not an alloca at all) must be
        // left completely untouched.
        let mut module = Module::new();
        module.globals.push(crate::ir::ir::Global { name: "g".into(), ty: Type::I32 });
        let mut f = Function::new("globals", Type::I32, vec![], false);
        let entry = f.new_block();
        let t = f.new_value();
        let before = vec![
            Instruction::Store { ptr: Operand::Global("g".into()), value: Operand::Const(Constant::I32(9)) },
            Instruction::Load { dest: t, ty: Type::I32, ptr: Operand::Global("g".into()) },
        ];
        f.blocks.push(BasicBlock { id: entry, instructions: before.clone(), terminator: Terminator::Ret(Some(Operand::Value(t))) });
        module.functions.push(f);

        promote_allocas(&mut module);

        let got = &module.functions[0].blocks[0].instructions;
        assert_eq!(got.len(), before.len());
        assert!(matches!(got[0], Instruction::Store { ptr: Operand::Global(_), .. }));
        assert!(matches!(got[1], Instruction::Load { ptr: Operand::Global(_), .. }));
    }
}
