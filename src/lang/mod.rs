//! # Value model
//!
//! Values are the only data that can live on an operand stack, in a
//! variable or in an object field.
//!
//! - `Nil`, `Bool`, `Number` and `String` are plain values.
//! - `Object` and `Func` are shared handles.
//! - `Constant` is the literal subset stored in prototypes.

pub mod object;
pub mod value;

pub use object::Object;
pub use value::{Constant, Value};
