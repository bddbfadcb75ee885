pub mod asm;
pub mod disasm;
pub mod ir;
pub mod op;
pub mod verify;

pub use ir::{DebugInfo, FuncProto, Module, ModuleError};
pub use op::{Flag, Instr, Opcode};
