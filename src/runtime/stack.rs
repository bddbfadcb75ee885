use super::runtime_error::{Result, RuntimeError};
use crate::lang::value::Value;

/// Operand stack of a frame.
///
/// The backing storage only grows. Popped slots are reset to nil so the
/// stack never keeps a dead object alive.
#[derive(Debug, Default)]
pub struct ValueStack {
    st: Vec<Value>,
    sp: usize,
}

impl ValueStack {
    /// The hint is a starting capacity, loops can push past it.
    pub fn with_capacity(hint: usize) -> Self {
        Self {
            st: Vec::with_capacity(hint),
            sp: 0,
        }
    }

    pub fn push(&mut self, v: Value) {
        if self.sp == self.st.len() {
            self.st.push(v);
        } else {
            self.st[self.sp] = v;
        }
        self.sp += 1;
    }

    pub fn pop(&mut self) -> Result<Value> {
        if self.sp == 0 {
            return Err(RuntimeError::malformed("operand stack underflow"));
        }
        self.sp -= 1;
        Ok(std::mem::take(&mut self.st[self.sp]))
    }

    /// Pops `n` values, returned in the order they were pushed.
    pub fn pop_n(&mut self, n: u64) -> Result<Vec<Value>> {
        let n = usize::try_from(n)
            .ok()
            .filter(|n| *n <= self.sp)
            .ok_or_else(|| RuntimeError::malformed("operand stack underflow"))?;
        let mut vals = vec![Value::Nil; n];
        for slot in vals.iter_mut().rev() {
            *slot = self.pop()?;
        }
        Ok(vals)
    }

    pub fn depth(&self) -> usize {
        self.sp
    }

    /// Pads with nil or drops values until the depth is exactly `depth`.
    pub fn truncate_or_pad(&mut self, depth: usize) -> Result<()> {
        while self.sp > depth {
            self.pop()?;
        }
        while self.sp < depth {
            self.push(Value::Nil);
        }
        Ok(())
    }

    /// Live values, bottom first.
    pub fn as_slice(&self) -> &[Value] {
        &self.st[..self.sp]
    }

    /// Slot `i` of the backing storage, nil past its end.
    pub fn slot(&self, i: usize) -> Value {
        self.st.get(i).cloned().unwrap_or_default()
    }

    pub fn capacity(&self) -> usize {
        self.st.len()
    }
}

/// Saved operand-stack depths for BKMS/BKME regions.
#[derive(Debug, Default)]
pub struct BookmarkStack {
    st: Vec<usize>,
}

impl BookmarkStack {
    pub fn push(&mut self, depth: usize) {
        self.st.push(depth);
    }

    pub fn pop(&mut self) -> Result<usize> {
        self.st
            .pop()
            .ok_or_else(|| RuntimeError::malformed("bookmark stack underflow"))
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

    #[test]
    fn test_push_pop_order() {
        let mut s = ValueStack::with_capacity(0);
        s.push(1.into());
        s.push(2.into());
        assert_eq!(s.pop().unwrap(), Value::from(2));
        assert_eq!(s.pop().unwrap(), Value::from(1));
        assert_eq!(s.depth(), 0);
    }

    #[test]
    fn test_pop_clears_slot() {
        let mut s = ValueStack::with_capacity(4);
        s.push("held".into());
        s.pop().unwrap();
        assert_eq!(s.capacity(), 1);
        assert_eq!(s.slot(0), Value::Nil);
    }

    #[test]
    fn test_grows_past_hint() {
        let mut s = ValueStack::with_capacity(1);
        for i in 0..10 {
            s.push(i.into());
        }
        assert_eq!(s.depth(), 10);
        assert_eq!(s.as_slice()[9], Value::from(9));
    }

    #[test]
    fn test_reuses_slots_after_pop() {
        let mut s = ValueStack::with_capacity(0);
        s.push(1.into());
        s.push(2.into());
        s.pop().unwrap();
        s.push(3.into());
        assert_eq!(s.capacity(), 2);
        assert_eq!(s.as_slice(), &[Value::from(1), Value::from(3)]);
    }

    #[test]
    fn test_underflow_is_malformed() {
        let mut s = ValueStack::default();
        assert!(matches!(s.pop(), Err(RuntimeError::Malformed(_))));
    }

    #[test]
    fn test_pop_n_keeps_push_order() {
        let mut s = ValueStack::default();
        for i in 1..=3 {
            s.push(i.into());
        }
        let vals = s.pop_n(2).unwrap();
        assert_eq!(vals, vec![Value::from(2), Value::from(3)]);
        assert_eq!(s.depth(), 1);
    }

    #[test]
    fn test_pop_n_underflow_leaves_stack_alone() {
        let mut s = ValueStack::default();
        s.push(1.into());
        assert!(s.pop_n(2).is_err());
        assert_eq!(s.depth(), 1);
    }

    #[test]
    fn test_truncate_or_pad() {
        let mut s = ValueStack::default();
        s.push(1.into());
        s.truncate_or_pad(3).unwrap();
        assert_eq!(s.as_slice(), &[Value::from(1), Value::Nil, Value::Nil]);
        s.truncate_or_pad(0).unwrap();
        assert_eq!(s.depth(), 0);
    }

    #[test]
    fn test_bookmarks_are_lifo() {
        let mut b = BookmarkStack::default();
        b.push(1);
        b.push(4);
        assert_eq!(b.pop().unwrap(), 4);
        assert_eq!(b.pop().unwrap(), 1);
        assert!(b.pop().is_err());
    }
}
