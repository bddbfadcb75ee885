use super::value::Value;
use crate::runtime::runtime_error::{Result, RuntimeError};
use indexmap::IndexMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Shared, mutable key/value mapping.
///
/// Cloning an `Object` clones the handle, not the fields. Storing `nil`
/// under a key removes it, so an absent key and a nil field read the same.
#[derive(Clone, Default)]
pub struct Object(Rc<RefCell<IndexMap<Value, Value>>>);

impl Object {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &Value) -> Value {
        self.0.borrow().get(key).cloned().unwrap_or_default()
    }

    pub fn set(&self, key: Value, value: Value) {
        let mut fields = self.0.borrow_mut();
        if value.is_nil() {
            fields.shift_remove(&key);
        } else {
            fields.insert(key, value);
        }
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    /// Snapshot of the keys in insertion order.
    pub fn keys(&self) -> Vec<Value> {
        self.0.borrow().keys().cloned().collect()
    }

    /// Calls the function stored under `name` with `this` bound to the object.
    pub fn call_method(&self, name: &Value, args: &[Value]) -> Result<Vec<Value>> {
        // the borrow must end before the call, the method may mutate us
        let method = self.get(name);
        match method {
            Value::Func(f) => f.call(Some(Value::Object(self.clone())), args),
            other => Err(RuntimeError::type_mismatch(
                other.type_name(),
                "func",
                Some(name.to_string()),
            )),
        }
    }

    pub fn ptr_eq(&self, other: &Object) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
}

impl FromIterator<(Value, Value)> for Object {
    fn from_iter<I: IntoIterator<Item = (Value, Value)>>(iter: I) -> Self {
        let ob = Object::new();
        for (k, v) in iter {
            ob.set(k, v);
        }
        ob
    }
}

impl fmt::Display for Object {
    /// Shallow rendering, nested objects and functions are not expanded.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields = match self.0.try_borrow() {
            Ok(fields) => fields,
            Err(_) => return write!(f, "{{...}}"),
        };
        write!(f, "{{")?;
        for (i, (k, v)) in fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match v {
                Value::Object(_) => write!(f, "{}: {{...}}", k)?,
                other => write!(f, "{}: {:?}", k, other)?,
            }
        }
        write!(f, "}}")
    }
}
