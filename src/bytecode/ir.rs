use crate::bytecode::Instr;
use crate::lang::value::Constant;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A compiled module: prototypes compiled together.
///
/// Convention: `protos[0]` is the module's top-level function. F-flagged
/// operands index into `protos`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    pub protos: Vec<FuncProto>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            protos: Vec::new(),
        }
    }

    pub fn with_proto(mut self, proto: FuncProto) -> Self {
        self.protos.push(proto);
        self
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ModuleError> {
        Ok(postcard::to_allocvec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ModuleError> {
        Ok(postcard::from_bytes(bytes)?)
    }
}

#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("module codec error: {0}")]
    Codec(#[from] postcard::Error),
}

/// A compiled function body, shared by every function value made from it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FuncProto {
    pub name: String,

    /// Native prototypes have no code, calls go to the host function
    /// registered under `name`.
    pub is_native: bool,

    /// Initial operand stack capacity.
    pub stack_size: usize,

    /// Argument names live in `constants[..exp_args]`.
    pub exp_args: usize,

    pub constants: Vec<Constant>,

    /// Local variable names, all set to nil on entry.
    pub locals: Vec<String>,

    pub code: Vec<Instr>,

    pub debug: DebugInfo,
}

impl FuncProto {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn native(name: impl Into<String>) -> Self {
        Self {
            is_native: true,
            ..Self::new(name)
        }
    }

    /// Name of argument `i`, if the constant table holds one.
    pub fn arg_name(&self, i: usize) -> Option<&str> {
        self.constants.get(i).and_then(Constant::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DebugInfo {
    pub file: String,
    pub line_start: u32,
    pub line_end: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{Flag, Opcode};

    fn sample() -> Module {
        let mut p = FuncProto::new("main");
        p.stack_size = 2;
        p.exp_args = 1;
        p.constants = vec![Constant::string("x"), Constant::Number(2.5), Constant::Nil];
        p.locals = vec!["x".into()];
        p.code = vec![
            Instr::new(Opcode::Push, Flag::V, 0),
            Instr::op(Opcode::Ret, 0),
        ];
        p.debug = DebugInfo {
            file: "main.agora".into(),
            line_start: 1,
            line_end: 3,
        };
        Module::new("sample")
            .with_proto(p)
            .with_proto(FuncProto::native("print"))
    }

    #[test]
    fn test_binary_module_reloads_identically() {
        let m = sample();
        let bytes = m.to_bytes().unwrap();
        assert_eq!(Module::from_bytes(&bytes).unwrap(), m);
    }

    #[test]
    fn test_truncated_bytes_fail() {
        let bytes = sample().to_bytes().unwrap();
        let err = Module::from_bytes(&bytes[..bytes.len() / 2]).unwrap_err();
        assert!(err.to_string().starts_with("module codec error"));
    }

    #[test]
    fn test_arg_name_requires_string_constant() {
        let m = sample();
        assert_eq!(m.protos[0].arg_name(0), Some("x"));
        assert_eq!(m.protos[0].arg_name(1), None);
        assert_eq!(m.protos[0].arg_name(9), None);
    }
}
