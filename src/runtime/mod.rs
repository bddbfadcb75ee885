//! # Execution
//!
//! A [`Context`] holds what every frame shares: the arithmetic and
//! comparison strategies, the global scope and the host functions. Calling
//! a [`Func`] made from a prototype runs a [`frame::Frame`] until it returns
//! or yields.
//!
//! ## Stack effects
//!
//! Opcode documentation writes stack effects as `( before -- after )`, top
//! of stack on the right.

pub mod arith;
pub mod context;
pub mod frame;
pub mod func;
pub mod range;
pub mod runtime_error;
pub mod scope;
pub mod stack;

pub use arith::{Arithmetic, Comparer, DefaultArithmetic, DefaultComparer};
pub use context::{Context, VmConfig};
pub use func::{Func, NativeFn};
pub use runtime_error::{Result, RuntimeError};
