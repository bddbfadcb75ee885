use super::context::Context;
use super::func::Func;
use super::range::RangeStack;
use super::runtime_error::{Result, RuntimeError};
use super::scope::Scope;
use super::stack::{BookmarkStack, ValueStack};
use crate::bytecode::disasm::describe_operand;
use crate::bytecode::{Flag, FuncProto, Instr, Module, Opcode};
use crate::lang::object::Object;
use crate::lang::value::Value;
use std::cmp::Ordering;
use std::fmt::Write;
use std::rc::Rc;

/// Upper bound on the preallocated operand stack. Decoded modules carry an
/// arbitrary size hint and the stack grows past it anyway.
const MAX_STACK_HINT: usize = 256;

/// How a run of the dispatch loop ended.
#[derive(Debug)]
pub enum Exit {
    /// RET: the invocation is over.
    Return(Value),
    /// YLD: the frame must be kept to resume later.
    Yield(Value),
}

/// Execution state of one invocation of a script function.
///
/// A frame lives from the first call until RET, across any number of
/// yield/resume cycles.
pub struct Frame {
    ctx: Rc<Context>,
    module: Rc<Module>,
    index: usize,

    pc: usize,
    stk: ValueStack,
    rng: RangeStack,
    bkm: BookmarkStack,

    /// Innermost scope layer, holds the locals.
    scope: Rc<Scope>,
    this: Value,
    args: Value,
}

impl Frame {
    /// `index` must be a valid prototype index of `module`.
    pub fn new(
        ctx: Rc<Context>,
        module: Rc<Module>,
        index: usize,
        parent: Rc<Scope>,
        this: Value,
    ) -> Self {
        let hint = module.protos[index].stack_size.min(MAX_STACK_HINT);
        let stk = ValueStack::with_capacity(hint);
        Self {
            ctx,
            module,
            index,
            pc: 0,
            stk,
            rng: RangeStack::default(),
            bkm: BookmarkStack::default(),
            scope: Rc::new(Scope::new(Some(parent))),
            this,
            args: Value::Nil,
        }
    }

    fn proto(&self) -> &FuncProto {
        &self.module.protos[self.index]
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn stack(&self) -> &[Value] {
        self.stk.as_slice()
    }

    pub fn scope(&self) -> &Rc<Scope> {
        &self.scope
    }

    pub fn active_ranges(&self) -> usize {
        self.rng.len()
    }

    pub(crate) fn release_ranges(&mut self) {
        if !self.rng.is_empty() {
            tracing::trace!(func = %self.proto().name, live = self.rng.len(), "releasing ranges");
        }
        self.rng.clear();
    }

    // Setup

    fn start_fresh(&mut self, args: &[Value]) -> Result<()> {
        let proto = &self.module.protos[self.index];
        for name in &proto.locals {
            self.scope.declare(name.as_str(), Value::Nil);
        }
        for i in 0..proto.exp_args {
            let name = proto.arg_name(i).ok_or_else(|| {
                RuntimeError::malformed(format!("argument {} of {} has no name", i, proto.name))
            })?;
            self.scope
                .declare(name, args.get(i).cloned().unwrap_or_default());
        }
        self.args = args_object(args);
        Ok(())
    }

    fn operand(&self, flag: Flag, ix: u64) -> Result<Value> {
        match flag {
            Flag::K => Ok(self.constant(ix)?),
            Flag::V => {
                let name = self.constant(ix)?.to_string();
                self.scope
                    .lookup(&name)
                    .ok_or(RuntimeError::Unresolved(name))
            }
            Flag::N => Ok(Value::Nil),
            Flag::T => Ok(self.this.clone()),
            Flag::F => {
                let index = to_usize(ix)?;
                let func = Func::script(
                    Rc::clone(&self.ctx),
                    Rc::clone(&self.module),
                    index,
                    Some(Rc::clone(&self.scope)),
                )?;
                Ok(Value::Func(func))
            }
            Flag::A => Ok(self.args.clone()),
            other => Err(RuntimeError::malformed(format!(
                "flag {} does not name an operand",
                other
            ))),
        }
    }

    fn constant(&self, ix: u64) -> Result<Value> {
        let proto = self.proto();
        to_usize(ix)
            .ok()
            .and_then(|i| proto.constants.get(i))
            .map(|k| k.to_value())
            .ok_or_else(|| {
                RuntimeError::malformed(format!(
                    "constant {} out of range in {} ({} constants)",
                    ix,
                    proto.name,
                    proto.constants.len()
                ))
            })
    }

    // Execution

    /// Runs until RET or YLD.
    ///
    /// On a fresh frame `args` are the call arguments. On a resumed frame
    /// `args[0]` (or nil) becomes the value of the suspended yield.
    pub fn run(&mut self, args: &[Value]) -> Result<Exit> {
        if self.pc == 0 {
            tracing::trace!(func = %self.proto().name, argc = args.len(), "enter");
            self.start_fresh(args)?;
        } else {
            tracing::trace!(func = %self.proto().name, pc = self.pc, "resume");
            self.stk.push(args.first().cloned().unwrap_or_default());
        }

        loop {
            let instr = self.fetch()?;
            // the pc already points at the next instruction while this one runs
            self.pc += 1;
            if let Some(exit) = self.step(instr)? {
                return Ok(exit);
            }
        }
    }

    fn fetch(&self) -> Result<Instr> {
        self.proto().code.get(self.pc).copied().ok_or_else(|| {
            RuntimeError::malformed(format!(
                "pc {} ran past the end of {} ({} instructions)",
                self.pc,
                self.proto().name,
                self.proto().code.len()
            ))
        })
    }

    fn step(&mut self, instr: Instr) -> Result<Option<Exit>> {
        let Instr { op, flag, index: ix } = instr;
        match op {
            Opcode::Ret => {
                let v = self.stk.pop()?;
                tracing::trace!(func = %self.proto().name, "return");
                return Ok(Some(Exit::Return(v)));
            }
            Opcode::Yld => {
                let v = self.stk.pop()?;
                tracing::trace!(func = %self.proto().name, pc = self.pc, "yield");
                return Ok(Some(Exit::Yield(v)));
            }

            Opcode::Push => {
                let v = self.operand(flag, ix)?;
                self.stk.push(v);
            }
            Opcode::Pop => {
                let name = self.constant(ix)?.to_string();
                let v = self.stk.pop()?;
                if !self.scope.assign(&name, v) {
                    return Err(RuntimeError::Unresolved(name));
                }
            }

            // Arithmetic
            Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div | Opcode::Mod => {
                let y = self.stk.pop()?;
                let x = self.stk.pop()?;
                let arith = self.ctx.arithmetic();
                let v = match op {
                    Opcode::Add => arith.add(&x, &y)?,
                    Opcode::Sub => arith.sub(&x, &y)?,
                    Opcode::Mul => arith.mul(&x, &y)?,
                    Opcode::Div => arith.div(&x, &y)?,
                    _ => arith.rem(&x, &y)?,
                };
                self.stk.push(v);
            }
            Opcode::Unm => {
                let x = self.stk.pop()?;
                let v = self.ctx.arithmetic().unm(&x)?;
                self.stk.push(v);
            }
            Opcode::Not => {
                let x = self.stk.pop()?;
                self.stk.push(Value::Bool(!x.truthy()));
            }

            // Comparison
            Opcode::Eq | Opcode::Neq | Opcode::Lt | Opcode::Lte | Opcode::Gt | Opcode::Gte => {
                let y = self.stk.pop()?;
                let x = self.stk.pop()?;
                let ord = self.ctx.comparer().cmp(&x, &y)?;
                let b = match op {
                    Opcode::Eq => ord == Ordering::Equal,
                    Opcode::Neq => ord != Ordering::Equal,
                    Opcode::Lt => ord == Ordering::Less,
                    Opcode::Lte => ord != Ordering::Greater,
                    Opcode::Gt => ord == Ordering::Greater,
                    _ => ord != Ordering::Less,
                };
                self.stk.push(Value::Bool(b));
            }

            // Jumps
            Opcode::Test => {
                if !self.stk.pop()?.truthy() {
                    self.jump_forward(ix)?;
                }
            }
            Opcode::Jmp => match flag {
                Flag::Jf => self.jump_forward(ix)?,
                Flag::Jb => {
                    // +1 because the pc is already on the next instruction
                    self.pc = to_usize(ix)
                        .ok()
                        .and_then(|ix| self.pc.checked_sub(ix + 1))
                        .ok_or_else(|| RuntimeError::malformed("backward jump before start"))?;
                }
                other => {
                    return Err(RuntimeError::malformed(format!(
                        "jump needs a Jf or Jb flag, got {}",
                        other
                    )));
                }
            },

            // Objects
            Opcode::New => {
                let ob = Object::new();
                let mut pairs = Vec::new();
                for _ in 0..ix {
                    let value = self.stk.pop()?;
                    let key = self.stk.pop()?;
                    pairs.push((key, value));
                }
                for (key, value) in pairs.into_iter().rev() {
                    ob.set(key, value);
                }
                self.stk.push(Value::Object(ob));
            }
            Opcode::Sfld => {
                let target = self.stk.pop()?;
                let key = self.stk.pop()?;
                let value = self.stk.pop()?;
                expect_object(&target, &key)?.set(key, value);
            }
            Opcode::Gfld => {
                let target = self.stk.pop()?;
                let key = self.stk.pop()?;
                let v = expect_object(&target, &key)?.get(&key);
                self.stk.push(v);
            }
            Opcode::Cfld => {
                let target = self.stk.pop()?;
                let key = self.stk.pop()?;
                let args = self.stk.pop_n(ix)?;
                let vals = expect_object(&target, &key)?.call_method(&key, &args)?;
                self.push_all(vals);
            }
            Opcode::Call => {
                let callee = self.stk.pop()?;
                let Value::Func(func) = callee else {
                    return Err(RuntimeError::type_mismatch(callee.type_name(), "func", None));
                };
                let args = self.stk.pop_n(ix)?;
                let vals = func.call(None, &args)?;
                self.push_all(vals);
            }

            // Ranges
            Opcode::Rngs => {
                let seeds = self.stk.pop_n(ix)?;
                self.rng.push(seeds)?;
                tracing::trace!(func = %self.proto().name, live = self.rng.len(), "range start");
            }
            Opcode::Rngp => match self.rng.pull()? {
                Some(vals) => {
                    let want = to_usize(ix)?;
                    let mut vals = vals.into_iter();
                    for _ in 0..want {
                        self.stk.push(vals.next().unwrap_or_default());
                    }
                    self.stk.push(Value::Bool(true));
                }
                None => self.stk.push(Value::Bool(false)),
            },
            Opcode::Rnge => {
                self.rng.pop()?;
                tracing::trace!(func = %self.proto().name, live = self.rng.len(), "range end");
            }

            // Bookmarks
            Opcode::Bkms => self.bkm.push(self.stk.depth()),
            Opcode::Bkme => {
                let mark = self.bkm.pop()?;
                let target = to_usize(ix)?
                    .checked_add(mark)
                    .ok_or_else(|| RuntimeError::malformed("bookmark target overflows"))?;
                self.stk.truncate_or_pad(target)?;
            }

            Opcode::Dump => {
                if self.ctx.config().debug {
                    tracing::debug!(target: "agora::dump", "{}", self.dump(to_usize(ix)?));
                }
            }
        }
        Ok(None)
    }

    fn jump_forward(&mut self, ix: u64) -> Result<()> {
        self.pc = to_usize(ix)
            .ok()
            .and_then(|ix| self.pc.checked_add(ix))
            .ok_or_else(|| RuntimeError::malformed("forward jump overflows"))?;
        Ok(())
    }

    fn push_all(&mut self, vals: Vec<Value>) {
        for v in vals {
            self.stk.push(v);
        }
    }

    // Debug

    /// Human-readable frame state: constants, variables, a window of the
    /// stack around the stack pointer and of the code around the pc, and
    /// the innermost `depth` entries of the call stack.
    pub fn dump(&self, depth: usize) -> String {
        let proto = self.proto();
        let mut buf = String::new();
        let _ = writeln!(buf, "\n> func {}", proto.name);

        let _ = writeln!(buf, "  Constants:");
        for (i, k) in proto.constants.iter().enumerate() {
            let _ = writeln!(buf, "    [{:3}] {:?}", i, k.to_value());
        }

        let _ = writeln!(buf, "\n  Variables:");
        if !self.this.is_nil() {
            let _ = writeln!(buf, "    [this] = {:?}", self.this);
        }
        if !self.args.is_nil() {
            let _ = writeln!(buf, "    [args] = {:?}", self.args);
        }
        for (name, v) in self.scope.snapshot() {
            let _ = writeln!(buf, "    {} = {:?}", name, v);
        }

        let _ = writeln!(buf, "\n  Stack:");
        let sp = self.stk.depth();
        for i in sp.saturating_sub(5)..=sp {
            let marker = if i == sp { "sp->" } else { "    " };
            let _ = writeln!(buf, "{}[{:3}] {:?}", marker, i, self.stk.slot(i));
        }

        let _ = writeln!(buf, "\n  Instructions:");
        let end = (self.pc + 10).min(proto.code.len().saturating_sub(1));
        for i in self.pc.saturating_sub(10)..=end {
            let Some(instr) = proto.code.get(i) else {
                break;
            };
            let marker = if i == self.pc { "pc->" } else { "    " };
            let _ = writeln!(
                buf,
                "{}[{:3}] {}{}",
                marker,
                i,
                instr,
                describe_operand(&self.module, proto, i, instr)
            );
        }

        let calls = self.ctx.call_stack();
        if depth > 0 && !calls.is_empty() {
            let _ = writeln!(buf, "\n  Call stack:");
            for name in calls.iter().rev().take(depth) {
                let _ = writeln!(buf, "    {}", name);
            }
        }
        buf
    }
}

fn to_usize(ix: u64) -> Result<usize> {
    usize::try_from(ix).map_err(|_| RuntimeError::malformed(format!("index {} too large", ix)))
}

/// The `args` value: nil without arguments, otherwise an object keyed 0..n.
fn args_object(args: &[Value]) -> Value {
    if args.is_empty() {
        return Value::Nil;
    }
    let ob: Object = args
        .iter()
        .enumerate()
        .map(|(i, v)| (Value::Number(i as f64), v.clone()))
        .collect();
    Value::Object(ob)
}

fn expect_object<'a>(target: &'a Value, key: &Value) -> Result<&'a Object> {
    target.as_object().ok_or_else(|| {
        RuntimeError::type_mismatch(target.type_name(), "object", Some(key.to_string()))
    })
}
