//! Producers behind `for..range` loops.
//!
//! RNGS starts a producer from its seed values, RNGP pulls the next batch of
//! values from the innermost producer and RNGE releases it. Producers are
//! plain state machines; a function seed is driven through its own
//! yield/resume cycle.

use super::func::Func;
use super::runtime_error::{Result, RuntimeError};
use crate::lang::object::Object;
use crate::lang::value::Value;
use std::rc::Rc;

pub trait RangeCoroutine {
    /// Next batch of values, `None` once exhausted.
    fn resume(&mut self) -> Result<Option<Vec<Value>>>;

    /// Called once when the loop ends, normally or not.
    fn release(&mut self) {}
}

/// Starts the producer matching the first seed.
pub fn start(seeds: Vec<Value>) -> Result<Box<dyn RangeCoroutine>> {
    let mut seeds = seeds.into_iter();
    let first = seeds.next().unwrap_or_default();
    let rest: Vec<Value> = seeds.collect();
    match first {
        Value::Number(n) => Ok(Box::new(NumberRange::from_seeds(n, &rest)?)),
        Value::String(s) => Ok(Box::new(StringRange::new(s, rest.first()))),
        Value::Object(ob) => Ok(Box::new(ObjectRange::new(ob))),
        Value::Func(func) => Ok(Box::new(FuncRange::new(func, rest))),
        other => Err(RuntimeError::type_mismatch(
            other.type_name(),
            "range seed",
            None,
        )),
    }
}

// =============================================================================
// Numbers: (n) | (start, end) | (start, end, step), end exclusive
// =============================================================================

struct NumberRange {
    next: f64,
    end: f64,
    step: f64,
}

impl NumberRange {
    fn from_seeds(first: f64, rest: &[Value]) -> Result<Self> {
        let number = |v: &Value| {
            v.as_number()
                .ok_or_else(|| RuntimeError::type_mismatch(v.type_name(), "number", None))
        };
        let (start, end) = match rest.first() {
            Some(end) => (first, number(end)?),
            None => (0.0, first),
        };
        let step = match rest.get(1) {
            Some(step) => number(step)?,
            None if end < start => -1.0,
            None => 1.0,
        };
        if step == 0.0 || step.is_nan() {
            return Err(RuntimeError::Arithmetic("range step must be non-zero".into()));
        }
        Ok(Self {
            next: start,
            end,
            step,
        })
    }
}

impl RangeCoroutine for NumberRange {
    fn resume(&mut self) -> Result<Option<Vec<Value>>> {
        let more = if self.step > 0.0 {
            self.next < self.end
        } else {
            self.next > self.end
        };
        if !more {
            return Ok(None);
        }
        let v = self.next;
        self.next += self.step;
        Ok(Some(vec![Value::Number(v)]))
    }
}

// =============================================================================
// Strings: each char with its index, or pieces around a separator
// =============================================================================

struct StringRange {
    items: std::vec::IntoIter<Value>,
    index: usize,
}

impl StringRange {
    fn new(s: Rc<str>, sep: Option<&Value>) -> Self {
        let items: Vec<Value> = match sep {
            Some(Value::String(sep)) if !sep.is_empty() => {
                s.split(sep.as_ref()).map(Value::string).collect()
            }
            _ => s.chars().map(|c| Value::from(c.to_string())).collect(),
        };
        Self {
            items: items.into_iter(),
            index: 0,
        }
    }
}

impl RangeCoroutine for StringRange {
    fn resume(&mut self) -> Result<Option<Vec<Value>>> {
        let Some(item) = self.items.next() else {
            return Ok(None);
        };
        let index = self.index;
        self.index += 1;
        Ok(Some(vec![item, Value::Number(index as f64)]))
    }
}

// =============================================================================
// Objects: key and current value, over the keys present at start
// =============================================================================

struct ObjectRange {
    ob: Object,
    keys: std::vec::IntoIter<Value>,
}

impl ObjectRange {
    fn new(ob: Object) -> Self {
        let keys = ob.keys().into_iter();
        Self { ob, keys }
    }
}

impl RangeCoroutine for ObjectRange {
    fn resume(&mut self) -> Result<Option<Vec<Value>>> {
        let Some(key) = self.keys.next() else {
            return Ok(None);
        };
        let value = self.ob.get(&key);
        Ok(Some(vec![key, value]))
    }
}

// =============================================================================
// Functions
// =============================================================================

/// Script functions are called until they return: each yield produces a
/// batch, the final return value is discarded. Native functions are called
/// until they produce nothing or a leading nil.
struct FuncRange {
    func: Func,
    seeds: Option<Vec<Value>>,
    done: bool,
}

impl FuncRange {
    fn new(func: Func, seeds: Vec<Value>) -> Self {
        Self {
            func,
            seeds: Some(seeds),
            done: false,
        }
    }
}

impl RangeCoroutine for FuncRange {
    fn resume(&mut self) -> Result<Option<Vec<Value>>> {
        if self.done {
            return Ok(None);
        }
        // seeds go to the first call only, later calls resume the yield
        let args = self.seeds.take().unwrap_or_default();
        let vals = self
            .func
            .call(None, &args)
            .map_err(|e| RuntimeError::Coroutine(Box::new(e)))?;

        let more = if self.func.is_native() {
            vals.first().is_some_and(|v| !v.is_nil())
        } else {
            self.func.is_suspended()
        };
        if more {
            Ok(Some(vals))
        } else {
            self.done = true;
            Ok(None)
        }
    }

    fn release(&mut self) {
        if !self.done {
            self.func.reset();
        }
    }
}

// =============================================================================
// RangeStack
// =============================================================================

/// Live producers of a frame, innermost loop on top.
#[derive(Default)]
pub struct RangeStack {
    st: Vec<Box<dyn RangeCoroutine>>,
}

impl RangeStack {
    pub fn push(&mut self, seeds: Vec<Value>) -> Result<()> {
        self.st.push(start(seeds)?);
        Ok(())
    }

    pub fn pull(&mut self) -> Result<Option<Vec<Value>>> {
        self.st
            .last_mut()
            .ok_or_else(|| RuntimeError::malformed("range pull without an active range"))?
            .resume()
    }

    pub fn pop(&mut self) -> Result<()> {
        let mut coro = self
            .st
            .pop()
            .ok_or_else(|| RuntimeError::malformed("range end without an active range"))?;
        coro.release();
        Ok(())
    }

    /// Releases every live producer, innermost first.
    pub fn clear(&mut self) {
        while let Some(mut coro) = self.st.pop() {
            coro.release();
        }
    }

    pub fn len(&self) -> usize {
        self.st.len()
    }

    pub fn is_empty(&self) -> bool {
        self.st.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn drain(seeds: Vec<Value>) -> Vec<Vec<Value>> {
        let mut coro = start(seeds).unwrap();
        let mut out = Vec::new();
        while let Some(vals) = coro.resume().unwrap() {
            out.push(vals);
        }
        out
    }

    fn firsts(seeds: Vec<Value>) -> Vec<Value> {
        drain(seeds).into_iter().map(|v| v[0].clone()).collect()
    }

    #[test]
    fn test_number_count() {
        assert_eq!(firsts(vec![3.into()]), vec![Value::from(0), 1.into(), 2.into()]);
    }

    #[test]
    fn test_number_bounds_and_step() {
        assert_eq!(
            firsts(vec![1.into(), 10.into(), 4.into()]),
            vec![Value::from(1), 5.into(), 9.into()]
        );
        assert_eq!(
            firsts(vec![3.into(), 0.into()]),
            vec![Value::from(3), 2.into(), 1.into()]
        );
    }

    #[test]
    fn test_number_empty_and_zero_step() {
        assert!(drain(vec![0.into()]).is_empty());
        assert!(start(vec![0.into(), 5.into(), 0.into()]).is_err());
    }

    #[test]
    fn test_string_chars_with_index() {
        assert_eq!(
            drain(vec!["ab".into()]),
            vec![vec![Value::from("a"), 0.into()], vec!["b".into(), 1.into()]]
        );
    }

    #[test]
    fn test_string_split() {
        assert_eq!(
            firsts(vec!["a,b,,c".into(), ",".into()]),
            vec![Value::from("a"), "b".into(), "".into(), "c".into()]
        );
    }

    #[test]
    fn test_object_pairs() {
        let ob = Object::new();
        ob.set("x".into(), 1.into());
        ob.set("y".into(), 2.into());
        assert_eq!(
            drain(vec![ob.into()]),
            vec![vec![Value::from("x"), 1.into()], vec!["y".into(), 2.into()]]
        );
    }

    #[test]
    fn test_native_func_until_nil() {
        let n = Rc::new(Cell::new(0));
        let counter = Rc::clone(&n);
        let f = Func::native("count", move |_, _| {
            counter.set(counter.get() + 1);
            if counter.get() <= 2 {
                Ok(vec![Value::from(counter.get())])
            } else {
                Ok(vec![Value::Nil])
            }
        });
        assert_eq!(firsts(vec![f.into()]), vec![Value::from(1), 2.into()]);
        assert_eq!(n.get(), 3);
    }

    #[test]
    fn test_func_failure_is_coroutine_error() {
        let f = Func::native("boom", |_, _| Err(RuntimeError::native("boom", "no")));
        let mut coro = start(vec![f.into()]).unwrap();
        assert!(matches!(coro.resume(), Err(RuntimeError::Coroutine(_))));
    }

    #[test]
    fn test_bad_seed() {
        let err = start(vec![true.into()]).err().unwrap();
        assert_eq!(err.to_string(), "type mismatch: expected range seed, got bool");
        assert!(start(vec![]).is_err());
    }

    #[test]
    fn test_stack_nests() {
        let mut st = RangeStack::default();
        st.push(vec![1.into()]).unwrap();
        st.push(vec!["z".into()]).unwrap();
        assert_eq!(st.pull().unwrap(), Some(vec![Value::from("z"), 0.into()]));
        st.pop().unwrap();
        assert_eq!(st.pull().unwrap(), Some(vec![Value::from(0)]));
        assert_eq!(st.pull().unwrap(), None);
        st.pop().unwrap();
        assert!(st.is_empty());
        assert!(st.pop().is_err());
        assert!(st.pull().is_err());
    }
}
