//! Data model for the post-lowering IR: `Value` identity, instructions,
//! basic blocks, functions, and the module. `Instruction` is a tagged enum
//! keyed by opcode rather than an open class hierarchy with `dynamic_cast`
//! — the natural representation in a language with sum types. `Value`
//! identity is a `u32` newtype; there is no separate arena-owned `Use`
//! linked list. Rewriting uses of a value is instead a whole-function
//! operand-substitution pass (see `mem2reg`), which is sufficient because
//! nothing in this crate needs to walk a value's use list incrementally.

use std::fmt;

use crate::common::fx_hash::{FxHashMap, FxHashSet};
use crate::common::types::Type;

/// Identifies an SSA value: an instruction result or a function argument.
/// IDs are unique within a function, assigned in definition order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub u32);

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Identifies a basic block, unique within a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

/// A compile-time constant. `I1`/`I32`/`F32` cover the scalar opcodes;
/// pointers and arrays are never constant in this language (no constant
/// folding of addresses).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Constant {
    I1(bool),
    I32(i32),
    F32(f32),
}

impl Constant {
    /// The type-appropriate zero — used both for default-initialized
    /// globals and for the "variable undefined along this edge" poison
    /// value Mem2Reg substitutes when a φ predecessor has no reaching def.
    pub fn zero_for(ty: &Type) -> Constant {
        match ty {
            Type::I1 => Constant::I1(false),
            Type::I32 => Constant::I32(0),
            Type::F32 => Constant::F32(0.0),
            Type::Ptr(_) => Constant::I32(0), // null, represented as an integer 0 pun
            other => panic!("no zero constant for type {other:?}"),
        }
    }

    pub fn ty(&self) -> Type {
        match self {
            Constant::I1(_) => Type::I1,
            Constant::I32(_) => Type::I32,
            Constant::F32(_) => Type::F32,
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::I1(b) => write!(f, "{}", *b as i32),
            Constant::I32(v) => write!(f, "{v}"),
            Constant::F32(v) => write!(f, "{v}"),
        }
    }
}

/// An operand: either an immediate constant, a reference to another value's
/// result (instruction or argument), or a reference to a global by name.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Const(Constant),
    Value(ValueId),
    Global(String),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Const(c) => write!(f, "{c}"),
            Operand::Value(v) => write!(f, "{v}"),
            Operand::Global(name) => write!(f, "@{name}"),
        }
    }
}

/// A module-level global variable: a `.bss` reservation, never initialized
/// to a nonzero value (the language has no constant-initializer globals
/// beyond implicit zero).
#[derive(Debug, Clone)]
pub struct Global {
    pub name: String,
    /// The type of the storage the global reserves (not a pointer to it —
    /// uses of a global are always `Operand::Global(name)`, typed as
    /// `ptr<ty>` implicitly at the use site).
    pub ty: Type,
}

impl Global {
    pub fn size(&self) -> u32 {
        self.ty.size()
    }
}

/// An integer binary opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntBinOp {
    Add,
    Sub,
    Mul,
    Sdiv,
}

impl IntBinOp {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            IntBinOp::Add => "add",
            IntBinOp::Sub => "sub",
            IntBinOp::Mul => "mul",
            IntBinOp::Sdiv => "sdiv",
        }
    }
}

/// A floating binary opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatBinOp {
    Fadd,
    Fsub,
    Fmul,
    Fdiv,
}

impl FloatBinOp {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            FloatBinOp::Fadd => "fadd",
            FloatBinOp::Fsub => "fsub",
            FloatBinOp::Fmul => "fmul",
            FloatBinOp::Fdiv => "fdiv",
        }
    }
}

/// A comparison predicate, shared by `icmp` and `fcmp` (the opcode itself
/// records which).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpPred {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpPred {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            CmpPred::Eq => "eq",
            CmpPred::Ne => "ne",
            CmpPred::Lt => "lt",
            CmpPred::Le => "le",
            CmpPred::Gt => "gt",
            CmpPred::Ge => "ge",
        }
    }

    /// The predicate obtained by swapping operand order — used to realize
    /// `fgt`/`fge` via `flt`/`fle` with swapped operands.
    pub fn swapped(&self) -> CmpPred {
        match self {
            CmpPred::Eq => CmpPred::Eq,
            CmpPred::Ne => CmpPred::Ne,
            CmpPred::Lt => CmpPred::Gt,
            CmpPred::Le => CmpPred::Ge,
            CmpPred::Gt => CmpPred::Lt,
            CmpPred::Ge => CmpPred::Le,
        }
    }
}

/// A non-terminator instruction. φ-instructions live here too (they are
/// not terminators) and, by invariant, precede all non-φ instructions in
/// their block's `instructions` list.
#[derive(Debug, Clone)]
pub enum Instruction {
    /// Reserves `size_of(ty)` bytes and produces a `ptr<ty>`.
    Alloca { dest: ValueId, ty: Type },
    Load { dest: ValueId, ty: Type, ptr: Operand },
    Store { ptr: Operand, value: Operand },
    /// `base_ty` is the pointee type of `base` (i.e. `base : ptr<base_ty>`).
    /// One index selects a scalar element (`addr = base + i*sizeof(T)`
    /// where `base_ty = T`); two indices decay an array pointer
    /// (`addr = base + i*sizeof(array<T,n>) + j*sizeof(T)` where
    /// `base_ty = array<T,n>`).
    Gep { dest: ValueId, base: Operand, base_ty: Type, indices: Vec<Operand> },
    BinOp { dest: ValueId, op: IntBinOp, lhs: Operand, rhs: Operand },
    FBinOp { dest: ValueId, op: FloatBinOp, lhs: Operand, rhs: Operand },
    Icmp { dest: ValueId, pred: CmpPred, lhs: Operand, rhs: Operand },
    Fcmp { dest: ValueId, pred: CmpPred, lhs: Operand, rhs: Operand },
    Sitofp { dest: ValueId, value: Operand },
    Fptosi { dest: ValueId, value: Operand },
    /// `i1 -> i32` zero extension.
    Zext { dest: ValueId, value: Operand },
    Call { dest: Option<ValueId>, callee: String, args: Vec<Operand>, ret_ty: Type },
    Phi { dest: ValueId, ty: Type, incoming: Vec<(Operand, BlockId)> },
}

impl Instruction {
    pub fn dest(&self) -> Option<ValueId> {
        match self {
            Instruction::Alloca { dest, .. }
            | Instruction::Load { dest, .. }
            | Instruction::Gep { dest, .. }
            | Instruction::BinOp { dest, .. }
            | Instruction::FBinOp { dest, .. }
            | Instruction::Icmp { dest, .. }
            | Instruction::Fcmp { dest, .. }
            | Instruction::Sitofp { dest, .. }
            | Instruction::Fptosi { dest, .. }
            | Instruction::Zext { dest, .. }
            | Instruction::Phi { dest, .. } => Some(*dest),
            Instruction::Call { dest, .. } => *dest,
            Instruction::Store { .. } => None,
        }
    }

    pub fn is_alloca(&self) -> bool {
        matches!(self, Instruction::Alloca { .. })
    }

    pub fn is_load(&self) -> bool {
        matches!(self, Instruction::Load { .. })
    }

    pub fn is_store(&self) -> bool {
        matches!(self, Instruction::Store { .. })
    }

    pub fn is_phi(&self) -> bool {
        matches!(self, Instruction::Phi { .. })
    }

    pub fn opcode_name(&self) -> &'static str {
        match self {
            Instruction::Alloca { .. } => "alloca",
            Instruction::Load { .. } => "load",
            Instruction::Store { .. } => "store",
            Instruction::Gep { .. } => "gep",
            Instruction::BinOp { op, .. } => op.mnemonic(),
            Instruction::FBinOp { op, .. } => op.mnemonic(),
            Instruction::Icmp { .. } => "icmp",
            Instruction::Fcmp { .. } => "fcmp",
            Instruction::Sitofp { .. } => "sitofp",
            Instruction::Fptosi { .. } => "fptosi",
            Instruction::Zext { .. } => "zext",
            Instruction::Call { .. } => "call",
            Instruction::Phi { .. } => "phi",
        }
    }

    /// The operands read by this instruction, in source order. Does not
    /// include the destination (instructions don't read their own result).
    pub fn operands(&self) -> Vec<&Operand> {
        match self {
            Instruction::Alloca { .. } => vec![],
            Instruction::Load { ptr, .. } => vec![ptr],
            Instruction::Store { ptr, value } => vec![ptr, value],
            Instruction::Gep { base, indices, .. } => {
                let mut v = vec![base];
                v.extend(indices.iter());
                v
            }
            Instruction::BinOp { lhs, rhs, .. } | Instruction::FBinOp { lhs, rhs, .. } => vec![lhs, rhs],
            Instruction::Icmp { lhs, rhs, .. } | Instruction::Fcmp { lhs, rhs, .. } => vec![lhs, rhs],
            Instruction::Sitofp { value, .. } | Instruction::Fptosi { value, .. } | Instruction::Zext { value, .. } => {
                vec![value]
            }
            Instruction::Call { args, .. } => args.iter().collect(),
            Instruction::Phi { incoming, .. } => incoming.iter().map(|(v, _)| v).collect(),
        }
    }

    /// Mutable access to every operand, for in-place substitution.
    pub fn operands_mut(&mut self) -> Vec<&mut Operand> {
        match self {
            Instruction::Alloca { .. } => vec![],
            Instruction::Load { ptr, .. } => vec![ptr],
            Instruction::Store { ptr, value } => vec![ptr, value],
            Instruction::Gep { base, indices, .. } => {
                let mut v = vec![base];
                v.extend(indices.iter_mut());
                v
            }
            Instruction::BinOp { lhs, rhs, .. } | Instruction::FBinOp { lhs, rhs, .. } => vec![lhs, rhs],
            Instruction::Icmp { lhs, rhs, .. } | Instruction::Fcmp { lhs, rhs, .. } => vec![lhs, rhs],
            Instruction::Sitofp { value, .. } | Instruction::Fptosi { value, .. } | Instruction::Zext { value, .. } => {
                vec![value]
            }
            Instruction::Call { args, .. } => args.iter_mut().collect(),
            Instruction::Phi { incoming, .. } => incoming.iter_mut().map(|(v, _)| v).collect(),
        }
    }
}

/// A block terminator: exactly one per block, never mid-block.
#[derive(Debug, Clone)]
pub enum Terminator {
    Br(BlockId),
    CondBr { cond: Operand, then_blk: BlockId, else_blk: BlockId },
    Ret(Option<Operand>),
}

impl Terminator {
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Terminator::Br(b) => vec![*b],
            Terminator::CondBr { then_blk, else_blk, .. } => vec![*then_blk, *else_blk],
            Terminator::Ret(_) => vec![],
        }
    }

    pub fn operands(&self) -> Vec<&Operand> {
        match self {
            Terminator::Br(_) => vec![],
            Terminator::CondBr { cond, .. } => vec![cond],
            Terminator::Ret(v) => v.iter().collect(),
        }
    }

    pub fn operands_mut(&mut self) -> Vec<&mut Operand> {
        match self {
            Terminator::Br(_) => vec![],
            Terminator::CondBr { cond, .. } => vec![cond],
            Terminator::Ret(v) => v.iter_mut().collect(),
        }
    }
}

/// A basic block: φ-instructions (if any) followed by straight-line
/// instructions, followed by exactly one terminator.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub id: BlockId,
    pub instructions: Vec<Instruction>,
    pub terminator: Terminator,
}

impl BasicBlock {
    pub fn new(id: BlockId) -> Self {
        BasicBlock { id, instructions: Vec::new(), terminator: Terminator::Ret(None) }
    }

    /// Insert a φ at the block's head — always before any existing
    /// instruction, maintaining the "all φs precede all non-φs" invariant
    /// as long as callers only ever insert φs this way.
    pub fn add_instr_begin(&mut self, instr: Instruction) {
        debug_assert!(instr.is_phi(), "add_instr_begin is only used for φ insertion");
        self.instructions.insert(0, instr);
    }

    pub fn phis(&self) -> impl Iterator<Item = &Instruction> {
        self.instructions.iter().take_while(|i| i.is_phi())
    }

    pub fn phis_mut(&mut self) -> impl Iterator<Item = &mut Instruction> {
        self.instructions.iter_mut().take_while(|i| i.is_phi())
    }
}

/// A function argument — a first-class `Value`, sharing the function's
/// `ValueId` space with instruction results.
#[derive(Debug, Clone)]
pub struct Argument {
    pub id: ValueId,
    pub name: String,
    pub ty: Type,
}

/// A function: an ordered list of basic blocks (first = entry) plus an
/// ordered list of arguments. `is_extern` functions have no blocks and are
/// only ever called, never defined, by this module.
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub ret_ty: Type,
    pub params: Vec<Argument>,
    pub blocks: Vec<BasicBlock>,
    pub is_extern: bool,
    next_value: u32,
    next_block: u32,
}

impl Function {
    pub fn new(name: impl Into<String>, ret_ty: Type, param_tys: Vec<(String, Type)>, is_extern: bool) -> Self {
        let mut next_value = 0u32;
        let params = param_tys
            .into_iter()
            .map(|(name, ty)| {
                let id = ValueId(next_value);
                next_value += 1;
                Argument { id, name, ty }
            })
            .collect();
        Function {
            name: name.into(),
            ret_ty,
            params,
            blocks: Vec::new(),
            is_extern,
            next_value,
            next_block: 0,
        }
    }

    pub fn entry(&self) -> BlockId {
        self.blocks[0].id
    }

    pub fn new_value(&mut self) -> ValueId {
        let id = ValueId(self.next_value);
        self.next_value += 1;
        id
    }

    pub fn new_block(&mut self) -> BlockId {
        let id = BlockId(self.next_block);
        self.next_block += 1;
        id
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        self.blocks.iter().find(|b| b.id == id).unwrap_or_else(|| panic!("no such block {id} in function {}", self.name))
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        let name = self.name.clone();
        self.blocks
            .iter_mut()
            .find(|b| b.id == id)
            .unwrap_or_else(|| panic!("no such block {id} in function {name}"))
    }

    pub fn block_index(&self, id: BlockId) -> usize {
        self.blocks.iter().position(|b| b.id == id).unwrap_or_else(|| panic!("no such block {id} in function {}", self.name))
    }

    /// Inserts a φ with an empty incoming list at `block`'s head and
    /// returns its fresh `ValueId`.
    pub fn insert_phi(&mut self, block: BlockId, ty: Type) -> ValueId {
        let dest = self.new_value();
        self.block_mut(block).add_instr_begin(Instruction::Phi { dest, ty, incoming: Vec::new() });
        dest
    }

    /// Predecessors of every block, derived from terminator targets —
    /// always kept in sync since nothing in this crate mutates a
    /// terminator without going through `Terminator` directly.
    pub fn predecessors(&self) -> FxHashMap<BlockId, Vec<BlockId>> {
        let mut preds: FxHashMap<BlockId, Vec<BlockId>> = FxHashMap::default();
        for b in &self.blocks {
            preds.entry(b.id).or_default();
        }
        for b in &self.blocks {
            for succ in b.terminator.successors() {
                preds.entry(succ).or_default().push(b.id);
            }
        }
        preds
    }

    pub fn successors(&self, block: BlockId) -> Vec<BlockId> {
        self.block(block).terminator.successors()
    }

    /// All block IDs reachable from the entry block — unreachable blocks
    /// are excluded from dominator analysis outputs.
    pub fn reachable_blocks(&self) -> FxHashSet<BlockId> {
        let mut seen = FxHashSet::default();
        if self.blocks.is_empty() {
            return seen;
        }
        let mut worklist = vec![self.entry()];
        seen.insert(self.entry());
        while let Some(b) = worklist.pop() {
            for succ in self.successors(b) {
                if seen.insert(succ) {
                    worklist.push(succ);
                }
            }
        }
        seen
    }

    /// The type of a value defined within this function (instruction
    /// result or argument). Panics on an unknown id — a structural
    /// invariant violation.
    pub fn value_type(&self, id: ValueId) -> Type {
        if let Some(arg) = self.params.iter().find(|a| a.id == id) {
            return arg.ty.clone();
        }
        for b in &self.blocks {
            for inst in &b.instructions {
                if inst.dest() == Some(id) {
                    return instruction_result_type(inst);
                }
            }
        }
        panic!("value {id} not defined in function {}", self.name);
    }
}

/// The type a non-void instruction's result carries.
pub fn instruction_result_type(inst: &Instruction) -> Type {
    match inst {
        Instruction::Alloca { ty, .. } => Type::ptr(ty.clone()),
        Instruction::Load { ty, .. } => ty.clone(),
        Instruction::Store { .. } => Type::Void,
        Instruction::Gep { base_ty, indices, .. } => {
            if indices.len() == 2 {
                Type::ptr(base_ty.pointee_hint())
            } else {
                Type::ptr(base_ty.clone())
            }
        }
        Instruction::BinOp { .. } => Type::I32,
        Instruction::FBinOp { .. } => Type::F32,
        Instruction::Icmp { .. } | Instruction::Fcmp { .. } => Type::I1,
        Instruction::Sitofp { .. } => Type::F32,
        Instruction::Fptosi { .. } => Type::I32,
        Instruction::Zext { .. } => Type::I32,
        Instruction::Call { ret_ty, .. } => ret_ty.clone(),
        Instruction::Phi { ty, .. } => ty.clone(),
    }
}

/// Small helper trait used only by `instruction_result_type`'s Gep arm:
/// the two-index (array-decay) form points one level through the array
/// element type, e.g. `a : ptr<array<i32,10>>` steps to `ptr<i32>`.
trait PointeeHint {
    fn pointee_hint(&self) -> Type;
}

impl PointeeHint for Type {
    fn pointee_hint(&self) -> Type {
        match self {
            Type::Array(elem, _) => (**elem).clone(),
            other => other.clone(),
        }
    }
}

/// The module: globals plus functions, in definition order.
#[derive(Debug, Clone, Default)]
pub struct Module {
    pub globals: Vec<Global>,
    pub functions: Vec<Function>,
}

impl Module {
    pub fn new() -> Self {
        Module::default()
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn function_mut(&mut self, name: &str) -> Option<&mut Function> {
        self.functions.iter_mut().find(|f| f.name == name)
    }
}
