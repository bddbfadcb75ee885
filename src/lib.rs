//! Agora: a stack-based bytecode virtual machine with coroutine functions
//! and `for..range` producers.
//!
//! Modules come from the text assembler ([`bytecode::asm::assemble`]) or
//! from their binary encoding ([`Module::from_bytes`]) and run through a
//! [`Context`].

pub mod bytecode;
pub mod lang;
pub mod runtime;

pub use bytecode::{DebugInfo, Flag, FuncProto, Instr, Module, ModuleError, Opcode};
pub use lang::{Constant, Object, Value};
pub use runtime::{Arithmetic, Comparer, Context, Func, RuntimeError, VmConfig};
