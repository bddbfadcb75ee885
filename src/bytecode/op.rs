use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// OPCODE - Bytecode instructions
// =============================================================================

/// Instruction kind. The meaning of the instruction index depends on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Opcode {
    // control
    Ret,
    Yld,

    // operands
    Push,
    Pop,

    // arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Not,
    Unm,

    // comparison
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,

    // ==========================================================================
    // Jumps. The index is a magnitude counted from the next instruction.
    // ==========================================================================
    /// Pop a value, skip `ix` instructions if it is falsy.
    Test,
    /// Relative jump, direction given by the `Jf`/`Jb` flag.
    Jmp,

    // objects
    /// ( k1 v1 .. kn vn -- obj )
    New,
    /// ( value key target -- )
    Sfld,
    /// ( key target -- value )
    Gfld,
    /// ( args.. key target -- results.. )
    Cfld,
    /// ( args.. callee -- results.. )
    Call,

    // ==========================================================================
    // for..range loops
    // ==========================================================================
    /// ( seeds.. -- ) starts a range coroutine.
    Rngs,
    /// ( -- values.. more ) pulls from the innermost range coroutine.
    Rngp,
    /// Releases the innermost range coroutine.
    Rnge,

    // multi-value normalization
    Bkms,
    Bkme,

    Dump,
}

impl Opcode {
    pub const ALL: [Opcode; 30] = [
        Opcode::Ret,
        Opcode::Yld,
        Opcode::Push,
        Opcode::Pop,
        Opcode::Add,
        Opcode::Sub,
        Opcode::Mul,
        Opcode::Div,
        Opcode::Mod,
        Opcode::Not,
        Opcode::Unm,
        Opcode::Eq,
        Opcode::Neq,
        Opcode::Lt,
        Opcode::Lte,
        Opcode::Gt,
        Opcode::Gte,
        Opcode::Test,
        Opcode::Jmp,
        Opcode::New,
        Opcode::Sfld,
        Opcode::Gfld,
        Opcode::Cfld,
        Opcode::Call,
        Opcode::Rngs,
        Opcode::Rngp,
        Opcode::Rnge,
        Opcode::Bkms,
        Opcode::Bkme,
        Opcode::Dump,
    ];

    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Ret => "RET",
            Opcode::Yld => "YLD",
            Opcode::Push => "PUSH",
            Opcode::Pop => "POP",
            Opcode::Add => "ADD",
            Opcode::Sub => "SUB",
            Opcode::Mul => "MUL",
            Opcode::Div => "DIV",
            Opcode::Mod => "MOD",
            Opcode::Not => "NOT",
            Opcode::Unm => "UNM",
            Opcode::Eq => "EQ",
            Opcode::Neq => "NEQ",
            Opcode::Lt => "LT",
            Opcode::Lte => "LTE",
            Opcode::Gt => "GT",
            Opcode::Gte => "GTE",
            Opcode::Test => "TEST",
            Opcode::Jmp => "JMP",
            Opcode::New => "NEW",
            Opcode::Sfld => "SFLD",
            Opcode::Gfld => "GFLD",
            Opcode::Cfld => "CFLD",
            Opcode::Call => "CALL",
            Opcode::Rngs => "RNGS",
            Opcode::Rngp => "RNGP",
            Opcode::Rnge => "RNGE",
            Opcode::Bkms => "BKMS",
            Opcode::Bkme => "BKME",
            Opcode::Dump => "DUMP",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.mnemonic())
    }
}

impl FromStr for Opcode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Opcode::ALL
            .iter()
            .copied()
            .find(|op| op.mnemonic().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown opcode '{}'", s))
    }
}

// =============================================================================
// FLAG - where an operand comes from
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Flag {
    /// No operand.
    #[default]
    Unused,
    /// Constant table entry.
    K,
    /// Variable named by a constant table entry.
    V,
    /// Literal nil.
    N,
    /// The bound `this`.
    T,
    /// Closure over a sibling prototype of the module.
    F,
    /// The `args` object.
    A,
    /// Forward jump.
    Jf,
    /// Backward jump.
    Jb,
}

impl Flag {
    pub fn mnemonic(self) -> &'static str {
        match self {
            Flag::Unused => "_",
            Flag::K => "K",
            Flag::V => "V",
            Flag::N => "N",
            Flag::T => "T",
            Flag::F => "F",
            Flag::A => "A",
            Flag::Jf => "Jf",
            Flag::Jb => "Jb",
        }
    }

    /// True for flags that resolve to a value when pushed.
    pub fn is_operand(self) -> bool {
        matches!(
            self,
            Flag::K | Flag::V | Flag::N | Flag::T | Flag::F | Flag::A
        )
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.mnemonic())
    }
}

impl FromStr for Flag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "_" => Flag::Unused,
            "K" => Flag::K,
            "V" => Flag::V,
            "N" => Flag::N,
            "T" => Flag::T,
            "F" => Flag::F,
            "A" => Flag::A,
            "Jf" => Flag::Jf,
            "Jb" => Flag::Jb,
            other => return Err(format!("unknown flag '{}'", other)),
        })
    }
}

// =============================================================================
// INSTR
// =============================================================================

/// A decoded instruction: opcode, operand flag and a 64-bit index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instr {
    pub op: Opcode,
    pub flag: Flag,
    pub index: u64,
}

impl Instr {
    pub fn new(op: Opcode, flag: Flag, index: u64) -> Self {
        Self { op, flag, index }
    }

    /// An instruction whose flag is irrelevant.
    pub fn op(op: Opcode, index: u64) -> Self {
        Self::new(op, Flag::Unused, index)
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<5} {:<2} {}", self.op, self.flag, self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_parse_is_case_insensitive() {
        assert_eq!("rngp".parse::<Opcode>(), Ok(Opcode::Rngp));
        assert_eq!("BKME".parse::<Opcode>(), Ok(Opcode::Bkme));
    }

    #[test]
    fn test_opcode_parse_unknown() {
        let err = "FROB".parse::<Opcode>().unwrap_err();
        assert!(err.contains("FROB"));
    }

    #[test]
    fn test_every_opcode_parses_back() {
        for op in Opcode::ALL {
            assert_eq!(op.mnemonic().parse::<Opcode>(), Ok(op));
        }
    }

    #[test]
    fn test_flag_parse() {
        assert_eq!("Jb".parse::<Flag>(), Ok(Flag::Jb));
        assert_eq!("_".parse::<Flag>(), Ok(Flag::Unused));
        assert!("X".parse::<Flag>().is_err());
    }

    #[test]
    fn test_instr_display() {
        let i = Instr::new(Opcode::Push, Flag::K, 3);
        assert_eq!(i.to_string(), "PUSH  K  3");
    }
}
