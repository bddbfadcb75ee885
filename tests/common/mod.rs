//! Shared helpers for integration tests.

#![allow(dead_code)]

use agora::bytecode::asm::assemble;
use agora::bytecode::verify::verify_module;
use agora::runtime::Result;
use agora::{Context, Func, Module, Value};
use std::rc::Rc;

/// Assemble and verify a module, panicking with the assembler message.
pub fn module(src: &str) -> Rc<Module> {
    let m = assemble("test", src).unwrap_or_else(|e| panic!("assembly failed: {}", e));
    verify_module(&m).unwrap_or_else(|e| panic!("verification failed: {}", e));
    Rc::new(m)
}

/// Function value for prototype `index` of an assembled module.
pub fn func(ctx: &Rc<Context>, src: &str, index: usize) -> Func {
    ctx.func(&module(src), index).unwrap()
}

/// Run prototype 0 of `src` in a fresh context.
pub fn run(src: &str, args: &[Value]) -> Result<Vec<Value>> {
    let ctx = Rc::new(Context::new());
    func(&ctx, src, 0).call(None, args)
}

pub fn nums(ns: &[f64]) -> Vec<Value> {
    ns.iter().map(|n| Value::Number(*n)).collect()
}
