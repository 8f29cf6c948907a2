//! Wires the textual-IR parser, Mem2Reg promotion, and the code generator
//! into the single entry point the CLI binary calls. Mirrors the shape of
//! a real front end's driver (parse → optimize → emit) with the lexer,
//! parser, and semantic analysis stages replaced by the textual-IR
//! assembler, since this crate's scope starts downstream of those.

use log::debug;

use crate::codegen;
use crate::common::error::CoreResult;
use crate::driver::textir;
use crate::mem2reg;

/// Compiles one module's worth of textual IR down to assembly text.
#[derive(Debug, Default)]
pub struct Driver {
    pub verbose: bool,
}

impl Driver {
    pub fn new() -> Self {
        Driver::default()
    }

    pub fn compile_str(&self, source: &str) -> CoreResult<String> {
        let mut module = textir::parse_module(source)?;
        debug!("parsed {} functions, {} globals", module.functions.len(), module.globals.len());

        mem2reg::promote_allocas(&mut module);
        if self.verbose {
            for func in &module.functions {
                if !func.is_extern {
                    debug!("mem2reg done for `{}`: {} blocks", func.name, func.blocks.len());
                }
            }
        }

        let asm = codegen::emit(&module)?;
        debug!("emitted {} bytes of assembly", asm.len());
        Ok(asm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_straight_line_mem2reg_candidate_to_assembly() {
        let src = r#"
            fn main() -> i32 {
            bb0:
              %0 = alloca i32
              store i32 7, %0
              %1 = load i32, %0
              ret i32 %1
            }
        "#;
        let driver = Driver::new();
        let asm = driver.compile_str(src).expect("compiles");
        assert!(asm.contains("main:"));
        assert!(asm.contains("main_exit:"));
        // Mem2Reg should have removed the alloca/load/store entirely.
        assert!(!asm.contains("addi.d $t1, $fp"));
    }
}
