use super::arith::{Arithmetic, Comparer, DefaultArithmetic, DefaultComparer};
use super::func::{Func, NativeFn};
use super::runtime_error::{Result, RuntimeError};
use super::scope::Scope;
use crate::bytecode::Module;
use crate::lang::value::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Debug, Clone)]
pub struct VmConfig {
    /// Enables DUMP output.
    pub debug: bool,
    /// Maximum number of nested script invocations.
    pub max_call_depth: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            debug: false,
            max_call_depth: 1000,
        }
    }
}

/// Services shared by every frame: strategies, globals, host functions and
/// the live call stack.
pub struct Context {
    config: VmConfig,
    arithmetic: Box<dyn Arithmetic>,
    comparer: Box<dyn Comparer>,
    globals: Rc<Scope>,
    natives: RefCell<HashMap<String, Rc<NativeFn>>>,
    call_stack: RefCell<Vec<String>>,
}

impl Context {
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    pub fn with_config(config: VmConfig) -> Self {
        Self {
            config,
            arithmetic: Box::new(DefaultArithmetic),
            comparer: Box::new(DefaultComparer),
            globals: Rc::new(Scope::new(None)),
            natives: RefCell::new(HashMap::new()),
            call_stack: RefCell::new(Vec::new()),
        }
    }

    pub fn with_arithmetic(mut self, arithmetic: impl Arithmetic + 'static) -> Self {
        self.arithmetic = Box::new(arithmetic);
        self
    }

    pub fn with_comparer(mut self, comparer: impl Comparer + 'static) -> Self {
        self.comparer = Box::new(comparer);
        self
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn arithmetic(&self) -> &dyn Arithmetic {
        self.arithmetic.as_ref()
    }

    pub fn comparer(&self) -> &dyn Comparer {
        self.comparer.as_ref()
    }

    /// Outermost layer of every scope chain.
    pub fn globals(&self) -> &Rc<Scope> {
        &self.globals
    }

    pub fn define_global(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.globals.declare(name, value.into());
    }

    pub fn global(&self, name: &str) -> Option<Value> {
        self.globals.lookup(name)
    }

    /// Registers the host implementation of native prototypes named `name`.
    pub fn register_native<F>(&self, name: impl Into<String>, f: F)
    where
        F: Fn(&Value, &[Value]) -> Result<Vec<Value>> + 'static,
    {
        self.natives.borrow_mut().insert(name.into(), Rc::new(f));
    }

    pub(crate) fn native(&self, name: &str) -> Option<Rc<NativeFn>> {
        self.natives.borrow().get(name).cloned()
    }

    /// Function value for prototype `index` of `module`, with no enclosing
    /// scope besides the globals.
    pub fn func(self: &Rc<Self>, module: &Rc<Module>, index: usize) -> Result<Func> {
        Func::script(Rc::clone(self), Rc::clone(module), index, None)
    }

    /// Runs the module's top-level function.
    pub fn run_module(self: &Rc<Self>, module: Module, args: &[Value]) -> Result<Vec<Value>> {
        let module = Rc::new(module);
        self.func(&module, 0)?.call(None, args)
    }

    /// Names of the script functions currently executing, outermost first.
    pub fn call_stack(&self) -> Vec<String> {
        self.call_stack.borrow().clone()
    }

    pub(crate) fn enter(&self, name: &str) -> Result<CallGuard<'_>> {
        let mut stack = self.call_stack.borrow_mut();
        if stack.len() >= self.config.max_call_depth {
            return Err(RuntimeError::CallDepth(self.config.max_call_depth));
        }
        stack.push(name.to_string());
        Ok(CallGuard { ctx: self })
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

/// Pops the call-stack entry pushed by [`Context::enter`].
pub(crate) struct CallGuard<'a> {
    ctx: &'a Context,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        self.ctx.call_stack.borrow_mut().pop();
    }
}
