use super::runtime_error::{Result, RuntimeError};
use crate::lang::value::Value;
use std::cmp::Ordering;

/// Arithmetic strategy injected into a [`Context`](super::context::Context).
///
/// Binary operations receive the left operand first.
pub trait Arithmetic {
    fn add(&self, x: &Value, y: &Value) -> Result<Value>;
    fn sub(&self, x: &Value, y: &Value) -> Result<Value>;
    fn mul(&self, x: &Value, y: &Value) -> Result<Value>;
    fn div(&self, x: &Value, y: &Value) -> Result<Value>;
    fn rem(&self, x: &Value, y: &Value) -> Result<Value>;
    fn unm(&self, x: &Value) -> Result<Value>;
}

/// Three-way comparison strategy used by EQ, NEQ, LT, LTE, GT and GTE.
pub trait Comparer {
    fn cmp(&self, x: &Value, y: &Value) -> Result<Ordering>;
}

/// Float arithmetic over numbers; `+` concatenates when either side is a
/// string.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultArithmetic;

impl DefaultArithmetic {
    fn numbers(&self, verb: &str, x: &Value, y: &Value) -> Result<(f64, f64)> {
        match (x, y) {
            (Value::Number(a), Value::Number(b)) => Ok((*a, *b)),
            _ => Err(RuntimeError::Arithmetic(format!(
                "cannot {} {} and {}",
                verb,
                x.type_name(),
                y.type_name()
            ))),
        }
    }
}

impl Arithmetic for DefaultArithmetic {
    fn add(&self, x: &Value, y: &Value) -> Result<Value> {
        match (x, y) {
            (Value::String(_), _) | (_, Value::String(_)) => {
                Ok(Value::from(format!("{}{}", x, y)))
            }
            _ => {
                let (a, b) = self.numbers("add", x, y)?;
                Ok(Value::Number(a + b))
            }
        }
    }

    fn sub(&self, x: &Value, y: &Value) -> Result<Value> {
        let (a, b) = self.numbers("subtract", x, y)?;
        Ok(Value::Number(a - b))
    }

    fn mul(&self, x: &Value, y: &Value) -> Result<Value> {
        let (a, b) = self.numbers("multiply", x, y)?;
        Ok(Value::Number(a * b))
    }

    fn div(&self, x: &Value, y: &Value) -> Result<Value> {
        let (a, b) = self.numbers("divide", x, y)?;
        Ok(Value::Number(a / b))
    }

    fn rem(&self, x: &Value, y: &Value) -> Result<Value> {
        let (a, b) = self.numbers("take the remainder of", x, y)?;
        Ok(Value::Number(a % b))
    }

    fn unm(&self, x: &Value) -> Result<Value> {
        match x {
            Value::Number(n) => Ok(Value::Number(-n)),
            other => Err(RuntimeError::Arithmetic(format!(
                "cannot negate {}",
                other.type_name()
            ))),
        }
    }
}

/// Natural order within a type, `nil < bool < number < string < object <
/// func` across types. Objects and functions are equal only to themselves.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultComparer;

impl Comparer for DefaultComparer {
    fn cmp(&self, x: &Value, y: &Value) -> Result<Ordering> {
        Ok(match (x, y) {
            (Value::Nil, Value::Nil) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            // NaN sorts above every number and equals itself
            (Value::Number(a), Value::Number(b)) => a
                .partial_cmp(b)
                .unwrap_or_else(|| a.is_nan().cmp(&b.is_nan())),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Object(a), Value::Object(b)) => a.addr().cmp(&b.addr()),
            (Value::Func(a), Value::Func(b)) => a.addr().cmp(&b.addr()),
            _ => x.rank().cmp(&y.rank()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::object::Object;

    #[test]
    fn test_add_numbers() {
        let v = DefaultArithmetic.add(&2.into(), &3.5.into()).unwrap();
        assert_eq!(v, Value::Number(5.5));
    }

    #[test]
    fn test_add_concatenates_strings() {
        let v = DefaultArithmetic.add(&"n=".into(), &4.into()).unwrap();
        assert_eq!(v, Value::from("n=4"));
    }

    #[test]
    fn test_sub_keeps_operand_order() {
        let v = DefaultArithmetic.sub(&10.into(), &4.into()).unwrap();
        assert_eq!(v, Value::from(6));
    }

    #[test]
    fn test_div_by_zero_is_infinite() {
        let v = DefaultArithmetic.div(&1.into(), &0.into()).unwrap();
        assert_eq!(v, Value::Number(f64::INFINITY));
    }

    #[test]
    fn test_rem() {
        let v = DefaultArithmetic.rem(&7.into(), &3.into()).unwrap();
        assert_eq!(v, Value::from(1));
    }

    #[test]
    fn test_arith_type_error() {
        let err = DefaultArithmetic.mul(&Value::Nil, &2.into()).unwrap_err();
        assert_eq!(err.to_string(), "arithmetic error: cannot multiply nil and number");
        assert!(DefaultArithmetic.unm(&"x".into()).is_err());
    }

    #[test]
    fn test_compare_same_type() {
        let c = DefaultComparer;
        assert_eq!(c.cmp(&1.into(), &2.into()).unwrap(), Ordering::Less);
        assert_eq!(c.cmp(&"b".into(), &"a".into()).unwrap(), Ordering::Greater);
        assert_eq!(c.cmp(&Value::Nil, &Value::Nil).unwrap(), Ordering::Equal);
    }

    #[test]
    fn test_compare_across_types_never_equal() {
        let c = DefaultComparer;
        assert_eq!(c.cmp(&Value::Nil, &false.into()).unwrap(), Ordering::Less);
        assert_eq!(c.cmp(&"1".into(), &1.into()).unwrap(), Ordering::Greater);
    }

    #[test]
    fn test_compare_objects_by_identity() {
        let c = DefaultComparer;
        let a = Value::Object(Object::new());
        let b = Value::Object(Object::new());
        assert_eq!(c.cmp(&a, &a.clone()).unwrap(), Ordering::Equal);
        assert_ne!(c.cmp(&a, &b).unwrap(), Ordering::Equal);
    }
}
