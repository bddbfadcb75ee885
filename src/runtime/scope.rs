use crate::lang::value::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// One layer of the scope chain.
///
/// A frame's locals form the innermost layer; its parent is the scope the
/// function was created in, ending at the context globals. Closures keep
/// their enclosing layer alive for lookups after the frame has returned.
#[derive(Debug, Default)]
pub struct Scope {
    vars: RefCell<HashMap<String, Value>>,
    parent: Option<Rc<Scope>>,
}

impl Scope {
    pub fn new(parent: Option<Rc<Scope>>) -> Self {
        Self {
            vars: RefCell::new(HashMap::new()),
            parent,
        }
    }

    /// Defines or overwrites `name` in this layer only.
    pub fn declare(&self, name: impl Into<String>, value: Value) {
        self.vars.borrow_mut().insert(name.into(), value);
    }

    /// Reads `name` from the innermost layer that defines it.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        let mut scope = self;
        loop {
            if let Some(v) = scope.vars.borrow().get(name) {
                return Some(v.clone());
            }
            scope = scope.parent.as_deref()?;
        }
    }

    /// Writes `name` in the innermost layer that defines it. Returns false
    /// when no layer does.
    pub fn assign(&self, name: &str, value: Value) -> bool {
        let mut scope = self;
        loop {
            if let Some(slot) = scope.vars.borrow_mut().get_mut(name) {
                *slot = value;
                return true;
            }
            match scope.parent.as_deref() {
                Some(parent) => scope = parent,
                None => return false,
            }
        }
    }

    /// This layer's variables, sorted by name.
    pub fn snapshot(&self) -> Vec<(String, Value)> {
        let mut vars: Vec<_> = self
            .vars
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        vars.sort_by(|a, b| a.0.cmp(&b.0));
        vars
    }
}
