use super::context::Context;
use super::frame::{Exit, Frame};
use super::runtime_error::{Result, RuntimeError};
use super::scope::Scope;
use crate::bytecode::{FuncProto, Module};
use crate::lang::value::Value;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Host function: receives `this` (nil for plain calls) and the arguments.
pub type NativeFn = dyn Fn(&Value, &[Value]) -> Result<Vec<Value>>;

/// Callable value. Cloning shares the function, including its suspended
/// state.
#[derive(Clone)]
pub struct Func(Rc<FuncKind>);

enum FuncKind {
    Native { name: String, f: Rc<NativeFn> },
    Script(ScriptFunc),
}

struct ScriptFunc {
    ctx: Rc<Context>,
    module: Rc<Module>,
    index: usize,
    /// Scope the function was created in; `None` for top-level functions.
    env: Option<Rc<Scope>>,
    /// The live frame after a yield, until the invocation returns.
    suspended: RefCell<Option<Box<Frame>>>,
}

impl ScriptFunc {
    fn proto(&self) -> &FuncProto {
        // index checked in Func::script
        &self.module.protos[self.index]
    }

    fn call(&self, this: Option<Value>, args: &[Value]) -> Result<Vec<Value>> {
        let proto = self.proto();
        if proto.is_native {
            let f = self.ctx.native(&proto.name).ok_or_else(|| {
                RuntimeError::Unresolved(format!("native function {}", proto.name))
            })?;
            return f(&this.unwrap_or_default(), args);
        }

        let _guard = self.ctx.enter(&proto.name)?;
        let resumed = self.suspended.borrow_mut().take();
        let mut frame = match resumed {
            Some(frame) => frame,
            None => {
                let parent = self
                    .env
                    .clone()
                    .unwrap_or_else(|| Rc::clone(self.ctx.globals()));
                Box::new(Frame::new(
                    Rc::clone(&self.ctx),
                    Rc::clone(&self.module),
                    self.index,
                    parent,
                    this.unwrap_or_default(),
                ))
            }
        };

        match frame.run(args) {
            Ok(Exit::Yield(v)) => {
                *self.suspended.borrow_mut() = Some(frame);
                Ok(vec![v])
            }
            Ok(Exit::Return(v)) => {
                frame.release_ranges();
                // a nested call of this function may have yielded meanwhile
                let stale = self.suspended.borrow_mut().take();
                if let Some(mut stale) = stale {
                    stale.release_ranges();
                }
                Ok(vec![v])
            }
            Err(e) => {
                frame.release_ranges();
                Err(e.with_context(&self.trace_name()))
            }
        }
    }

    fn trace_name(&self) -> String {
        let proto = self.proto();
        if proto.debug.file.is_empty() {
            proto.name.clone()
        } else {
            format!("{} ({}:{})", proto.name, proto.debug.file, proto.debug.line_start)
        }
    }
}

impl Func {
    pub fn native<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Value, &[Value]) -> Result<Vec<Value>> + 'static,
    {
        Func(Rc::new(FuncKind::Native {
            name: name.into(),
            f: Rc::new(f),
        }))
    }

    pub(crate) fn script(
        ctx: Rc<Context>,
        module: Rc<Module>,
        index: usize,
        env: Option<Rc<Scope>>,
    ) -> Result<Self> {
        if index >= module.protos.len() {
            return Err(RuntimeError::malformed(format!(
                "function index {} out of range for module {} ({} functions)",
                index,
                module.name,
                module.protos.len()
            )));
        }
        Ok(Func(Rc::new(FuncKind::Script(ScriptFunc {
            ctx,
            module,
            index,
            env,
            suspended: RefCell::new(None),
        }))))
    }

    pub fn name(&self) -> &str {
        match self.0.as_ref() {
            FuncKind::Native { name, .. } => name,
            FuncKind::Script(s) => &s.proto().name,
        }
    }

    /// Invokes the function. A suspended function resumes where it yielded,
    /// with `args[0]` (or nil) as the value of the yield.
    pub fn call(&self, this: Option<Value>, args: &[Value]) -> Result<Vec<Value>> {
        match self.0.as_ref() {
            FuncKind::Native { f, .. } => f(&this.unwrap_or_default(), args),
            FuncKind::Script(s) => s.call(this, args),
        }
    }

    /// True between a yield and the return of the same invocation.
    pub fn is_suspended(&self) -> bool {
        match self.0.as_ref() {
            FuncKind::Native { .. } => false,
            FuncKind::Script(s) => s
                .suspended
                .try_borrow()
                .map(|slot| slot.is_some())
                .unwrap_or(false),
        }
    }

    pub fn is_native(&self) -> bool {
        match self.0.as_ref() {
            FuncKind::Native { .. } => true,
            FuncKind::Script(s) => s.proto().is_native,
        }
    }

    /// Drops a suspended invocation, releasing its range coroutines. The
    /// next call starts fresh.
    pub fn reset(&self) {
        if let FuncKind::Script(s) = self.0.as_ref() {
            let frame = s.suspended.borrow_mut().take();
            if let Some(mut frame) = frame {
                frame.release_ranges();
            }
        }
    }

    pub fn ptr_eq(&self, other: &Func) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
}

impl fmt::Display for Func {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_native() {
            write!(f, "<native func {}>", self.name())
        } else {
            write!(f, "<func {}>", self.name())
        }
    }
}

impl fmt::Debug for Func {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{Flag, Instr, Opcode};
    use crate::lang::value::Constant;

    fn module_of(protos: Vec<FuncProto>) -> Rc<Module> {
        let mut m = Module::new("test");
        m.protos = protos;
        Rc::new(m)
    }

    #[test]
    fn test_native_receives_this_and_args() {
        let f = Func::native("pair", |this, args| Ok(vec![this.clone(), args[0].clone()]));
        let out = f.call(Some("me".into()), &[1.into()]).unwrap();
        assert_eq!(out, vec![Value::from("me"), Value::from(1)]);
        assert_eq!(f.call(None, &[2.into()]).unwrap()[0], Value::Nil);
    }

    #[test]
    fn test_script_index_out_of_range() {
        let ctx = Rc::new(Context::new());
        let err = ctx.func(&module_of(vec![]), 0).unwrap_err();
        assert!(matches!(err, RuntimeError::Malformed(_)));
    }

    #[test]
    fn test_native_proto_dispatches_to_host() {
        let ctx = Rc::new(Context::new());
        ctx.register_native("twice", |_, args| {
            Ok(vec![args[0].clone(), args[0].clone()])
        });
        let f = ctx
            .func(&module_of(vec![FuncProto::native("twice")]), 0)
            .unwrap();
        assert!(f.is_native());
        assert_eq!(f.call(None, &[7.into()]).unwrap(), vec![Value::from(7); 2]);
    }

    #[test]
    fn test_unregistered_native_proto() {
        let ctx = Rc::new(Context::new());
        let f = ctx
            .func(&module_of(vec![FuncProto::native("ghost")]), 0)
            .unwrap();
        let err = f.call(None, &[]).unwrap_err();
        assert_eq!(err.to_string(), "unresolved name: native function ghost");
    }

    #[test]
    fn test_reset_drops_suspension() {
        let mut p = FuncProto::new("gen");
        p.constants = vec![Constant::Number(1.0)];
        p.code = vec![
            Instr::new(Opcode::Push, Flag::K, 0),
            Instr::op(Opcode::Yld, 0),
            Instr::op(Opcode::Ret, 0),
        ];
        let ctx = Rc::new(Context::new());
        let f = ctx.func(&module_of(vec![p]), 0).unwrap();
        assert_eq!(f.call(None, &[]).unwrap(), vec![Value::from(1)]);
        assert!(f.is_suspended());
        f.reset();
        assert!(!f.is_suspended());
        // starts over rather than resuming
        assert_eq!(f.call(None, &[]).unwrap(), vec![Value::from(1)]);
    }

    #[test]
    fn test_display() {
        let f = Func::native("print", |_, _| Ok(vec![]));
        assert_eq!(f.to_string(), "<native func print>");
    }
}
