//! Text assembler for modules.
//!
//! A module is a sequence of functions, each introduced by `[f]`:
//!
//! ```text
//! [f]
//! 4            stack size, or `true` for a native function
//! 1            expected args
//! 1            expected vars
//! main         name (the only header field after `true`)
//! main.agora   file
//! 1            line start
//! 9            line end
//! [k]
//! sx           constants: i/f number, s string, b0/b1, n
//! i10
//! [i]
//! PUSH K 1     OP [FLAG IX], `;` starts a comment
//! RET
//! ```
//!
//! An optional `[v]` section lists local variable names, one per line.
//! Without it the locals are the string constants among the first
//! `args + vars` entries of `[k]`.

use crate::bytecode::{DebugInfo, Flag, FuncProto, Instr, Module, Opcode};
use crate::lang::value::Constant;
use std::iter::{Enumerate, Peekable};
use std::str::{FromStr, Lines};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AsmError {
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("function {function} has no {section} section")]
    MissingSection {
        function: String,
        section: &'static str,
    },

    #[error("unexpected end of input while reading {expected}")]
    UnexpectedEof { expected: &'static str },
}

impl AsmError {
    fn syntax(line: usize, message: impl Into<String>) -> Self {
        AsmError::Syntax {
            line,
            message: message.into(),
        }
    }
}

type Result<T> = std::result::Result<T, AsmError>;

/// Assembles `source` into a module named `name`.
pub fn assemble(name: &str, source: &str) -> Result<Module> {
    let mut asm = Assembler {
        lines: source.lines().enumerate().peekable(),
    };
    let mut module = Module::new(name);
    while let Some((line, text)) = asm.next_nonblank() {
        if text != "[f]" {
            return Err(AsmError::syntax(
                line,
                format!("expected [f], found '{}'", text),
            ));
        }
        module.protos.push(asm.function()?);
    }
    tracing::debug!(module = name, functions = module.protos.len(), "assembled");
    Ok(module)
}

fn is_section(text: &str) -> bool {
    matches!(text, "[f]" | "[k]" | "[v]" | "[i]")
}

struct Assembler<'a> {
    lines: Peekable<Enumerate<Lines<'a>>>,
}

impl<'a> Assembler<'a> {
    /// Next line with its 1-based number, untrimmed.
    fn next_raw(&mut self) -> Option<(usize, &'a str)> {
        self.lines.next().map(|(i, text)| (i + 1, text))
    }

    fn next_nonblank(&mut self) -> Option<(usize, &'a str)> {
        loop {
            let (line, text) = self.next_raw()?;
            let text = text.trim();
            if !text.is_empty() {
                return Some((line, text));
            }
        }
    }

    /// Trimmed text of the next section header, blank lines skipped.
    fn peek_section(&mut self) -> Option<&'a str> {
        while let Some(&(_, text)) = self.lines.peek() {
            let text = text.trim();
            if !text.is_empty() {
                return Some(text);
            }
            self.lines.next();
        }
        None
    }

    /// Next body line of the current section, `None` at a section header or
    /// end of input.
    fn next_in_section(&mut self) -> Option<(usize, &'a str)> {
        let &(_, text) = self.lines.peek()?;
        if is_section(text.trim()) {
            return None;
        }
        self.next_raw()
    }

    fn field(&mut self, expected: &'static str) -> Result<(usize, &'a str)> {
        self.next_raw()
            .map(|(line, text)| (line, text.trim()))
            .ok_or(AsmError::UnexpectedEof { expected })
    }

    fn number_field<T: FromStr>(&mut self, expected: &'static str) -> Result<T> {
        let (line, text) = self.field(expected)?;
        parse_number(line, text, expected)
    }

    // =========================================================================
    // Sections
    // =========================================================================

    fn function(&mut self) -> Result<FuncProto> {
        let (line, first) = self.field("stack size")?;
        if first == "true" {
            let (_, name) = self.field("native name")?;
            return Ok(FuncProto::native(name));
        }
        let stack_size = parse_number(line, first, "stack size")?;
        let exp_args: usize = self.number_field("expected args")?;
        let exp_vars: usize = self.number_field("expected vars")?;
        let (_, name) = self.field("function name")?;
        let (_, file) = self.field("file name")?;
        let line_start = self.number_field("line start")?;
        let line_end = self.number_field("line end")?;

        let mut proto = FuncProto {
            name: name.to_string(),
            stack_size,
            exp_args,
            debug: DebugInfo {
                file: file.to_string(),
                line_start,
                line_end,
            },
            ..FuncProto::default()
        };

        let mut locals = None;
        let mut has_code = false;
        while let Some(section) = self.peek_section() {
            match section {
                "[f]" => break,
                "[k]" => {
                    self.next_raw();
                    self.constants(&mut proto)?;
                }
                "[v]" => {
                    self.next_raw();
                    locals = Some(self.locals());
                }
                "[i]" => {
                    self.next_raw();
                    self.instructions(&mut proto)?;
                    has_code = true;
                }
                other => {
                    let line = self.lines.peek().map(|&(i, _)| i + 1).unwrap_or_default();
                    return Err(AsmError::syntax(
                        line,
                        format!("expected a section header, found '{}'", other),
                    ));
                }
            }
        }
        if !has_code {
            return Err(AsmError::MissingSection {
                function: proto.name,
                section: "[i]",
            });
        }

        proto.locals = locals.unwrap_or_else(|| {
            proto
                .constants
                .iter()
                .take(exp_args + exp_vars)
                .filter_map(|k| k.as_str().map(str::to_string))
                .collect()
        });
        Ok(proto)
    }

    fn constants(&mut self, proto: &mut FuncProto) -> Result<()> {
        while let Some((line, raw)) = self.next_in_section() {
            let text = raw.trim_start();
            let mut chars = text.chars();
            let Some(kind) = chars.next() else {
                continue;
            };
            let rest = chars.as_str();
            let k = match kind {
                'i' => Constant::Number(parse_number::<i64>(line, rest.trim(), "integer")? as f64),
                'f' => Constant::Number(parse_number(line, rest.trim(), "float")?),
                's' => Constant::string(rest),
                'b' => match rest.trim() {
                    "1" | "true" => Constant::Bool(true),
                    "0" | "false" => Constant::Bool(false),
                    other => {
                        return Err(AsmError::syntax(
                            line,
                            format!("invalid boolean constant '{}'", other),
                        ));
                    }
                },
                'n' => Constant::Nil,
                other => {
                    return Err(AsmError::syntax(
                        line,
                        format!("invalid constant type '{}'", other),
                    ));
                }
            };
            proto.constants.push(k);
        }
        Ok(())
    }

    fn locals(&mut self) -> Vec<String> {
        let mut names = Vec::new();
        while let Some((_, raw)) = self.next_in_section() {
            let name = raw.trim();
            if !name.is_empty() {
                names.push(name.to_string());
            }
        }
        names
    }

    fn instructions(&mut self, proto: &mut FuncProto) -> Result<()> {
        while let Some((line, raw)) = self.next_in_section() {
            let text = match raw.find(';') {
                Some(at) => &raw[..at],
                None => raw,
            };
            let parts: Vec<&str> = text.split_whitespace().collect();
            let instr = match parts.as_slice() {
                [] => continue,
                [op] => Instr::op(parse_opcode(line, op)?, 0),
                [op, flag, ix] => {
                    let op = parse_opcode(line, op)?;
                    let flag: Flag = flag.parse().map_err(|e| AsmError::syntax(line, e))?;
                    Instr::new(op, flag, parse_number(line, ix, "instruction index")?)
                }
                _ => {
                    return Err(AsmError::syntax(
                        line,
                        format!("expected OP [FLAG IX], found '{}'", text.trim()),
                    ));
                }
            };
            proto.code.push(instr);
        }
        Ok(())
    }
}

fn parse_opcode(line: usize, text: &str) -> Result<Opcode> {
    text.parse().map_err(|e| AsmError::syntax(line, e))
}

fn parse_number<T: FromStr>(line: usize, text: &str, what: &str) -> Result<T> {
    text.parse()
        .map_err(|_| AsmError::syntax(line, format!("invalid {} '{}'", what, text)))
}
