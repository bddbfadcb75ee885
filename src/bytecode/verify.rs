use crate::bytecode::disasm::jump_target;
use crate::bytecode::{Flag, FuncProto, Instr, Module, Opcode};
use thiserror::Error;

/// A structural defect found before running a module.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VerifyError {
    #[error("module {0} has no functions")]
    Empty(String),

    #[error("{function}@{ip}: {op} does not take flag {flag}")]
    BadFlag {
        function: String,
        ip: usize,
        op: Opcode,
        flag: Flag,
    },

    #[error("{function}@{ip}: constant {index} out of range ({len} constants)")]
    ConstantRange {
        function: String,
        ip: usize,
        index: u64,
        len: usize,
    },

    #[error("{function}@{ip}: function {index} out of range ({len} functions)")]
    FunctionRange {
        function: String,
        ip: usize,
        index: u64,
        len: usize,
    },

    #[error("{function}@{ip}: jump target out of code ({len} instructions)")]
    JumpRange {
        function: String,
        ip: usize,
        len: usize,
    },

    #[error("{function}: argument {index} has no name constant")]
    ArgumentName { function: String, index: usize },
}

/// Checks every prototype of `module`, stopping at the first defect.
pub fn verify_module(module: &Module) -> Result<(), VerifyError> {
    if module.protos.is_empty() {
        return Err(VerifyError::Empty(module.name.clone()));
    }
    for proto in &module.protos {
        verify_proto(module, proto)?;
    }
    tracing::debug!(module = %module.name, "verified");
    Ok(())
}

pub fn verify_proto(module: &Module, proto: &FuncProto) -> Result<(), VerifyError> {
    if proto.is_native {
        return Ok(());
    }
    for index in 0..proto.exp_args {
        if proto.arg_name(index).is_none() {
            return Err(VerifyError::ArgumentName {
                function: proto.name.clone(),
                index,
            });
        }
    }
    for (ip, instr) in proto.code.iter().enumerate() {
        check_instr(module, proto, ip, instr)?;
    }
    Ok(())
}

fn check_instr(module: &Module, proto: &FuncProto, ip: usize, instr: &Instr) -> Result<(), VerifyError> {
    let bad_flag = || VerifyError::BadFlag {
        function: proto.name.clone(),
        ip,
        op: instr.op,
        flag: instr.flag,
    };
    let constant = |index: u64| {
        let len = proto.constants.len();
        if usize::try_from(index).is_ok_and(|i| i < len) {
            Ok(())
        } else {
            Err(VerifyError::ConstantRange {
                function: proto.name.clone(),
                ip,
                index,
                len,
            })
        }
    };

    match instr.op {
        Opcode::Push => match instr.flag {
            Flag::K | Flag::V => constant(instr.index)?,
            Flag::F => {
                let len = module.protos.len();
                if !usize::try_from(instr.index).is_ok_and(|i| i < len) {
                    return Err(VerifyError::FunctionRange {
                        function: proto.name.clone(),
                        ip,
                        index: instr.index,
                        len,
                    });
                }
            }
            flag if flag.is_operand() => {}
            _ => return Err(bad_flag()),
        },
        Opcode::Pop => constant(instr.index)?,
        Opcode::Jmp | Opcode::Test => {
            if instr.op == Opcode::Jmp && !matches!(instr.flag, Flag::Jf | Flag::Jb) {
                return Err(bad_flag());
            }
            let len = proto.code.len();
            if !jump_target(ip, instr).is_some_and(|target| target < len) {
                return Err(VerifyError::JumpRange {
                    function: proto.name.clone(),
                    ip,
                    len,
                });
            }
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::value::Constant;

    fn module_with(code: Vec<Instr>) -> Module {
        let mut p = FuncProto::new("main");
        p.constants = vec![Constant::string("x")];
        p.code = code;
        Module::new("m").with_proto(p)
    }

    fn verify(code: Vec<Instr>) -> Result<(), VerifyError> {
        verify_module(&module_with(code))
    }

    #[test]
    fn test_valid_module() {
        let code = vec![
            Instr::new(Opcode::Push, Flag::V, 0),
            Instr::op(Opcode::Test, 1),
            Instr::new(Opcode::Jmp, Flag::Jb, 2),
            Instr::new(Opcode::Push, Flag::F, 0),
            Instr::op(Opcode::Ret, 0),
        ];
        assert_eq!(verify(code), Ok(()));
    }

    #[test]
    fn test_empty_module() {
        assert_eq!(
            verify_module(&Module::new("none")),
            Err(VerifyError::Empty("none".into()))
        );
    }

    #[test]
    fn test_push_needs_operand_flag() {
        let err = verify(vec![Instr::new(Opcode::Push, Flag::Jf, 0)]).unwrap_err();
        assert_eq!(err.to_string(), "main@0: PUSH does not take flag Jf");
    }

    #[test]
    fn test_jmp_needs_direction() {
        let err = verify(vec![Instr::op(Opcode::Jmp, 0), Instr::op(Opcode::Ret, 0)]).unwrap_err();
        assert!(matches!(err, VerifyError::BadFlag { op: Opcode::Jmp, .. }));
    }

    #[test]
    fn test_constant_out_of_range() {
        let err = verify(vec![Instr::op(Opcode::Pop, 1)]).unwrap_err();
        assert_eq!(
            err,
            VerifyError::ConstantRange {
                function: "main".into(),
                ip: 0,
                index: 1,
                len: 1,
            }
        );
    }

    #[test]
    fn test_function_out_of_range() {
        let err = verify(vec![Instr::new(Opcode::Push, Flag::F, 3)]).unwrap_err();
        assert!(matches!(err, VerifyError::FunctionRange { index: 3, len: 1, .. }));
    }

    #[test]
    fn test_jump_targets() {
        // forward past the end
        let err = verify(vec![Instr::op(Opcode::Test, 0)]).unwrap_err();
        assert!(matches!(err, VerifyError::JumpRange { ip: 0, .. }));
        // backward before the start
        let err = verify(vec![
            Instr::op(Opcode::Ret, 0),
            Instr::new(Opcode::Jmp, Flag::Jb, 2),
        ])
        .unwrap_err();
        assert!(matches!(err, VerifyError::JumpRange { ip: 1, .. }));
    }

    #[test]
    fn test_argument_names() {
        let mut m = module_with(vec![Instr::op(Opcode::Ret, 0)]);
        m.protos[0].exp_args = 2;
        assert_eq!(
            verify_module(&m),
            Err(VerifyError::ArgumentName {
                function: "main".into(),
                index: 1,
            })
        );
    }

    #[test]
    fn test_native_protos_are_not_checked() {
        let m = Module::new("m").with_proto(FuncProto::native("print"));
        assert_eq!(verify_module(&m), Ok(()));
    }
}
