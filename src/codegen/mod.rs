//! Assembly code generation: stack frame planning, per-opcode lowering,
//! and whole-module emission. No register allocator lives here — every
//! value is spilled to and reloaded from its fixed stack slot around the
//! single instruction that produces or consumes it.

pub mod asm;
pub mod emitter;
pub mod lowering;
pub mod regs;
pub mod stack_layout;

pub use emitter::emit;
