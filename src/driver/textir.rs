//! A minimal textual assembler for the IR model, so the CLI binary and
//! integration tests have a human-writable input without a real front end
//! (lexer/parser/AST/sema) attached. Grammar, informally:
//!
//! ```text
//! global counter: i32
//!
//! fn add(i32 a, i32 b) -> i32 {
//! bb0:
//!   %2 = add i32 %0, %1
//!   ret i32 %2
//! }
//! ```
//!
//! Function parameters get `ValueId`s `0..params.len()` in declaration
//! order; every `%N`/`bbN` appearing later must name the next sequential
//! id, which this parser checks as it assigns them (catching out-of-order
//! or skipped numbering as a syntax error rather than a silent mismatch).
//! `#`-prefixed text to end of line is a comment.

use crate::common::error::{CoreError, CoreResult};
use crate::common::types::{FnType, Type};
use crate::ir::ir::{
    BasicBlock, BlockId, CmpPred, Constant, FloatBinOp, Function, Global, Instruction, IntBinOp,
    Module, Operand, Terminator, ValueId,
};

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Value(u32),
    At(String),
    Int(i64),
    Float(f32),
    Punct(char),
    Arrow,
}

fn lex(src: &str) -> CoreResult<Vec<Tok>> {
    let mut toks = Vec::new();
    let chars: Vec<char> = src.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c == '#' {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
        } else if c == '-' && i + 1 < chars.len() && chars[i + 1] == '>' {
            toks.push(Tok::Arrow);
            i += 2;
        } else if "(){}[]<>,:=;".contains(c) {
            toks.push(Tok::Punct(c));
            i += 1;
        } else if c == '%' {
            let start = i + 1;
            let mut j = start;
            while j < chars.len() && chars[j].is_ascii_digit() {
                j += 1;
            }
            if j == start {
                return Err(CoreError::TextIrSyntax(format!("expected digits after `%` at offset {i}")));
            }
            let n: u32 = chars[start..j]
                .iter()
                .collect::<String>()
                .parse()
                .map_err(|_| CoreError::TextIrSyntax(format!("value id out of range at offset {i}")))?;
            toks.push(Tok::Value(n));
            i = j;
        } else if c == '@' {
            let start = i + 1;
            let mut j = start;
            while j < chars.len() && (chars[j].is_alphanumeric() || chars[j] == '_') {
                j += 1;
            }
            toks.push(Tok::At(chars[start..j].iter().collect()));
            i = j;
        } else if c.is_ascii_digit() || (c == '-' && i + 1 < chars.len() && chars[i + 1].is_ascii_digit()) {
            let start = i;
            let mut j = i + 1;
            let mut is_float = false;
            while j < chars.len() && (chars[j].is_ascii_digit() || chars[j] == '.') {
                if chars[j] == '.' {
                    is_float = true;
                }
                j += 1;
            }
            let text: String = chars[start..j].iter().collect();
            if is_float {
                let v: f32 = text
                    .parse()
                    .map_err(|_| CoreError::TextIrSyntax(format!("malformed float literal `{text}`")))?;
                toks.push(Tok::Float(v));
            } else {
                let v: i64 = text
                    .parse()
                    .map_err(|_| CoreError::TextIrSyntax(format!("malformed integer literal `{text}`")))?;
                toks.push(Tok::Int(v));
            }
            i = j;
        } else if c.is_alphabetic() || c == '_' || c == '.' {
            let start = i;
            let mut j = i + 1;
            while j < chars.len() && (chars[j].is_alphanumeric() || chars[j] == '_' || chars[j] == '.') {
                j += 1;
            }
            toks.push(Tok::Ident(chars[start..j].iter().collect()));
            i = j;
        } else {
            return Err(CoreError::TextIrSyntax(format!("unexpected character `{c}` at offset {i}")));
        }
    }
    Ok(toks)
}

/// Recursive-descent parser over the flat token stream produced by [`lex`].
struct Parser {
    toks: Vec<Tok>,
    pos: usize,
}

impl Parser {
    fn new(toks: Vec<Tok>) -> Self {
        Parser { toks, pos: 0 }
    }

    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos)
    }

    fn bump(&mut self) -> CoreResult<Tok> {
        let t = self.toks.get(self.pos).cloned().ok_or_else(|| CoreError::TextIrSyntax("unexpected end of input".into()))?;
        self.pos += 1;
        Ok(t)
    }

    fn expect_punct(&mut self, p: char) -> CoreResult<()> {
        match self.bump()? {
            Tok::Punct(c) if c == p => Ok(()),
            other => Err(CoreError::TextIrSyntax(format!("expected `{p}`, got {other:?}"))),
        }
    }

    fn expect_arrow(&mut self) -> CoreResult<()> {
        match self.bump()? {
            Tok::Arrow => Ok(()),
            other => Err(CoreError::TextIrSyntax(format!("expected `->`, got {other:?}"))),
        }
    }

    fn expect_ident(&mut self) -> CoreResult<String> {
        match self.bump()? {
            Tok::Ident(s) => Ok(s),
            other => Err(CoreError::TextIrSyntax(format!("expected identifier, got {other:?}"))),
        }
    }

    fn expect_value(&mut self) -> CoreResult<u32> {
        match self.bump()? {
            Tok::Value(n) => Ok(n),
            other => Err(CoreError::TextIrSyntax(format!("expected `%N`, got {other:?}"))),
        }
    }

    fn eat_punct(&mut self, p: char) -> bool {
        if let Some(Tok::Punct(c)) = self.peek() {
            if *c == p {
                self.pos += 1;
                return true;
            }
        }
        false
    }

    fn at_end(&self) -> bool {
        self.pos >= self.toks.len()
    }

    fn parse_type(&mut self) -> CoreResult<Type> {
        let name = self.expect_ident()?;
        match name.as_str() {
            "void" => Ok(Type::Void),
            "i1" => Ok(Type::I1),
            "i32" => Ok(Type::I32),
            "f32" => Ok(Type::F32),
            "ptr" => {
                self.expect_punct('<')?;
                let inner = self.parse_type()?;
                self.expect_punct('>')?;
                Ok(Type::ptr(inner))
            }
            "array" => {
                self.expect_punct('<')?;
                let elem = self.parse_type()?;
                self.expect_punct(',')?;
                let n = match self.bump()? {
                    Tok::Int(v) if v >= 0 => v as usize,
                    other => return Err(CoreError::TextIrSyntax(format!("expected array length, got {other:?}"))),
                };
                self.expect_punct('>')?;
                Ok(Type::array(elem, n))
            }
            "fn" => {
                self.expect_punct('(')?;
                let mut params = Vec::new();
                if !self.eat_punct(')') {
                    loop {
                        params.push(self.parse_type()?);
                        if !self.eat_punct(',') {
                            break;
                        }
                    }
                    self.expect_punct(')')?;
                }
                self.expect_arrow()?;
                let ret = self.parse_type()?;
                Ok(Type::Fn(Box::new(FnType { ret, params })))
            }
            other => Err(CoreError::TextIrSyntax(format!("unknown type `{other}`"))),
        }
    }

    fn parse_block_label(&mut self) -> CoreResult<u32> {
        let name = self.expect_ident()?;
        name.strip_prefix("bb")
            .and_then(|rest| rest.parse::<u32>().ok())
            .ok_or_else(|| CoreError::TextIrSyntax(format!("expected a block label `bbN`, got `{name}`")))
    }

    fn parse_operand(&mut self) -> CoreResult<Operand> {
        match self.bump()? {
            Tok::Value(n) => Ok(Operand::Value(ValueId(n))),
            Tok::At(name) => Ok(Operand::Global(name)),
            Tok::Int(v) => Ok(Operand::Const(Constant::I32(v as i32))),
            Tok::Float(v) => Ok(Operand::Const(Constant::F32(v))),
            Tok::Ident(s) if s == "true" => Ok(Operand::Const(Constant::I1(true))),
            Tok::Ident(s) if s == "false" => Ok(Operand::Const(Constant::I1(false))),
            other => Err(CoreError::TextIrSyntax(format!("expected an operand, got {other:?}"))),
        }
    }

    fn next_value(&mut self, func: &mut Function) -> CoreResult<ValueId> {
        let n = self.expect_value()?;
        self.expect_punct('=')?;
        let id = func.new_value();
        if id.0 != n {
            return Err(CoreError::TextIrSyntax(format!(
                "value numbers must be sequential: expected %{}, got %{n}",
                id.0
            )));
        }
        Ok(id)
    }

    fn parse_module(&mut self) -> CoreResult<Module> {
        let mut module = Module::new();
        while !self.at_end() {
            match self.expect_ident()?.as_str() {
                "global" => {
                    let name = self.expect_ident()?;
                    self.expect_punct(':')?;
                    let ty = self.parse_type()?;
                    module.globals.push(Global { name, ty });
                }
                "fn" => {
                    let func = self.parse_function()?;
                    module.functions.push(func);
                }
                other => return Err(CoreError::TextIrSyntax(format!("expected `global` or `fn`, got `{other}`"))),
            }
        }
        Ok(module)
    }

    fn parse_function(&mut self) -> CoreResult<Function> {
        let name = self.expect_ident()?;
        self.expect_punct('(')?;
        let mut params = Vec::new();
        if !self.eat_punct(')') {
            loop {
                let ty = self.parse_type()?;
                let pname = self.expect_ident()?;
                params.push((pname, ty));
                if !self.eat_punct(',') {
                    break;
                }
            }
            self.expect_punct(')')?;
        }
        self.expect_arrow()?;
        let ret_ty = self.parse_type()?;

        if self.eat_punct(';') {
            return Ok(Function::new(name, ret_ty, params, true));
        }

        self.expect_punct('{')?;
        let mut func = Function::new(name, ret_ty, params, false);
        loop {
            if self.eat_punct('}') {
                break;
            }
            let block = self.parse_block(&mut func)?;
            func.blocks.push(block);
        }
        Ok(func)
    }

    fn parse_block(&mut self, func: &mut Function) -> CoreResult<BasicBlock> {
        let label = self.parse_block_label()?;
        self.expect_punct(':')?;
        let id = func.new_block();
        if id.0 != label {
            return Err(CoreError::TextIrSyntax(format!(
                "block labels must be sequential: expected bb{}, got bb{label}",
                id.0
            )));
        }
        let mut block = BasicBlock::new(id);
        let terminator = loop {
            let (dest, opcode) = match self.peek() {
                Some(Tok::Value(_)) => {
                    let dest = self.next_value(func)?;
                    (Some(dest), self.expect_ident()?)
                }
                Some(Tok::Ident(_)) => (None, self.expect_ident()?),
                other => return Err(CoreError::TextIrSyntax(format!("expected an instruction, got {other:?}"))),
            };
            if let Some(term) = self.parse_terminator_if_any(&opcode, dest)? {
                break term;
            }
            let inst = self.parse_instruction(&opcode, dest)?;
            block.instructions.push(inst);
        };
        block.terminator = terminator;
        Ok(block)
    }

    fn parse_terminator_if_any(&mut self, opcode: &str, dest: Option<ValueId>) -> CoreResult<Option<Terminator>> {
        match opcode {
            "ret" => {
                if dest.is_some() {
                    return Err(CoreError::TextIrSyntax("`ret` never produces a value".into()));
                }
                if matches!(self.peek(), Some(Tok::Ident(s)) if s == "void") {
                    self.pos += 1;
                    return Ok(Some(Terminator::Ret(None)));
                }
                if let Some(Tok::Punct('}')) | None = self.peek() {
                    return Ok(Some(Terminator::Ret(None)));
                }
                self.parse_type()?;
                let op = self.parse_operand()?;
                Ok(Some(Terminator::Ret(Some(op))))
            }
            "br" => {
                if dest.is_some() {
                    return Err(CoreError::TextIrSyntax("`br` never produces a value".into()));
                }
                let target = self.parse_block_label()?;
                Ok(Some(Terminator::Br(BlockId(target))))
            }
            "br.cond" => {
                if dest.is_some() {
                    return Err(CoreError::TextIrSyntax("`br.cond` never produces a value".into()));
                }
                let cond = self.parse_operand()?;
                self.expect_punct(',')?;
                let then_blk = BlockId(self.parse_block_label()?);
                self.expect_punct(',')?;
                let else_blk = BlockId(self.parse_block_label()?);
                Ok(Some(Terminator::CondBr { cond, then_blk, else_blk }))
            }
            _ => Ok(None),
        }
    }

    fn parse_instruction(&mut self, opcode: &str, dest: Option<ValueId>) -> CoreResult<Instruction> {
        let need_dest = || dest.ok_or_else(|| CoreError::TextIrSyntax(format!("`{opcode}` must assign a value")));
        match opcode {
            "alloca" => {
                let ty = self.parse_type()?;
                Ok(Instruction::Alloca { dest: need_dest()?, ty })
            }
            "load" => {
                let ty = self.parse_type()?;
                self.expect_punct(',')?;
                let ptr = self.parse_operand()?;
                Ok(Instruction::Load { dest: need_dest()?, ty, ptr })
            }
            "store" => {
                self.parse_type()?;
                let value = self.parse_operand()?;
                self.expect_punct(',')?;
                let ptr = self.parse_operand()?;
                Ok(Instruction::Store { ptr, value })
            }
            "gep" => {
                let base_ty = self.parse_type()?;
                self.expect_punct(',')?;
                let base = self.parse_operand()?;
                self.expect_punct(',')?;
                let mut indices = vec![self.parse_operand()?];
                if self.eat_punct(',') {
                    indices.push(self.parse_operand()?);
                }
                Ok(Instruction::Gep { dest: need_dest()?, base, base_ty, indices })
            }
            "add" | "sub" | "mul" | "sdiv" => {
                self.parse_type()?;
                let lhs = self.parse_operand()?;
                self.expect_punct(',')?;
                let rhs = self.parse_operand()?;
                let op = match opcode {
                    "add" => IntBinOp::Add,
                    "sub" => IntBinOp::Sub,
                    "mul" => IntBinOp::Mul,
                    _ => IntBinOp::Sdiv,
                };
                Ok(Instruction::BinOp { dest: need_dest()?, op, lhs, rhs })
            }
            "fadd" | "fsub" | "fmul" | "fdiv" => {
                self.parse_type()?;
                let lhs = self.parse_operand()?;
                self.expect_punct(',')?;
                let rhs = self.parse_operand()?;
                let op = match opcode {
                    "fadd" => FloatBinOp::Fadd,
                    "fsub" => FloatBinOp::Fsub,
                    "fmul" => FloatBinOp::Fmul,
                    _ => FloatBinOp::Fdiv,
                };
                Ok(Instruction::FBinOp { dest: need_dest()?, op, lhs, rhs })
            }
            _ if opcode.starts_with("icmp.") || opcode.starts_with("fcmp.") => {
                let (family, pred_name) = opcode.split_once('.').expect("starts_with '.' checked above");
                let pred = match pred_name {
                    "eq" => CmpPred::Eq,
                    "ne" => CmpPred::Ne,
                    "lt" => CmpPred::Lt,
                    "le" => CmpPred::Le,
                    "gt" => CmpPred::Gt,
                    "ge" => CmpPred::Ge,
                    other => return Err(CoreError::TextIrSyntax(format!("unknown comparison predicate `{other}`"))),
                };
                self.parse_type()?;
                let lhs = self.parse_operand()?;
                self.expect_punct(',')?;
                let rhs = self.parse_operand()?;
                if family == "icmp" {
                    Ok(Instruction::Icmp { dest: need_dest()?, pred, lhs, rhs })
                } else {
                    Ok(Instruction::Fcmp { dest: need_dest()?, pred, lhs, rhs })
                }
            }
            "sitofp" => Ok(Instruction::Sitofp { dest: need_dest()?, value: self.parse_operand()? }),
            "fptosi" => Ok(Instruction::Fptosi { dest: need_dest()?, value: self.parse_operand()? }),
            "zext" => Ok(Instruction::Zext { dest: need_dest()?, value: self.parse_operand()? }),
            "call" => {
                let ret_ty = self.parse_type()?;
                let callee = match self.bump()? {
                    Tok::At(name) => name,
                    other => return Err(CoreError::TextIrSyntax(format!("expected `@callee`, got {other:?}"))),
                };
                self.expect_punct('(')?;
                let mut args = Vec::new();
                if !self.eat_punct(')') {
                    loop {
                        args.push(self.parse_operand()?);
                        if !self.eat_punct(',') {
                            break;
                        }
                    }
                    self.expect_punct(')')?;
                }
                Ok(Instruction::Call { dest, callee, args, ret_ty })
            }
            "phi" => {
                let ty = self.parse_type()?;
                let mut incoming = Vec::new();
                loop {
                    self.expect_punct('[')?;
                    let value = self.parse_operand()?;
                    self.expect_punct(',')?;
                    let block = BlockId(self.parse_block_label()?);
                    self.expect_punct(']')?;
                    incoming.push((value, block));
                    if !self.eat_punct(',') {
                        break;
                    }
                }
                Ok(Instruction::Phi { dest: need_dest()?, ty, incoming })
            }
            other => Err(CoreError::TextIrSyntax(format!("unknown opcode `{other}`"))),
        }
    }

}

/// Parse one module's worth of textual IR.
pub fn parse_module(src: &str) -> CoreResult<Module> {
    let toks = lex(src)?;
    Parser::new(toks).parse_module()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_straight_line_function() {
        let src = r#"
            fn add(i32 a, i32 b) -> i32 {
            bb0:
              %2 = add i32 %0, %1
              ret i32 %2
            }
        "#;
        let module = parse_module(src).expect("parses");
        assert_eq!(module.functions.len(), 1);
        let f = &module.functions[0];
        assert_eq!(f.name, "add");
        assert_eq!(f.params.len(), 2);
        assert_eq!(f.blocks.len(), 1);
        assert_eq!(f.blocks[0].instructions.len(), 1);
    }

    #[test]
    fn parses_global_and_diamond_with_phi() {
        let src = r#"
            global counter: i32

            fn pick(i1 c) -> i32 {
            bb0:
              br.cond %0, bb1, bb2
            bb1:
              br bb3
            bb2:
              br bb3
            bb3:
              %1 = phi i32 [1, bb1], [2, bb2]
              ret i32 %1
            }
        "#;
        let module = parse_module(src).expect("parses");
        assert_eq!(module.globals.len(), 1);
        assert_eq!(module.globals[0].name, "counter");
        let f = &module.functions[0];
        assert_eq!(f.blocks.len(), 4);
        assert!(f.blocks[3].instructions[0].is_phi());
    }

    #[test]
    fn rejects_out_of_order_value_numbering() {
        let src = r#"
            fn f() -> i32 {
            bb0:
              %5 = add i32 1, 2
              ret i32 %5
            }
        "#;
        assert!(parse_module(src).is_err());
    }
}
