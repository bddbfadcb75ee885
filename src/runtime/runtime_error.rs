use thiserror::Error;

pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Failure of a function invocation.
///
/// Every variant is fatal to the invocation that raised it. Errors leaving
/// a script function are wrapped in [`RuntimeError::InFunction`], which
/// builds up a call stack as the error propagates.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// An operation needed an object or a callable and got something else.
    #[error("type mismatch: expected {expected}, got {actual}{}", fmt_name(.name))]
    TypeMismatch {
        actual: &'static str,
        expected: &'static str,
        name: Option<String>,
    },

    /// A variable name not found in any scope.
    #[error("unresolved name: {0}")]
    Unresolved(String),

    /// Bytecode violated an encoding or stack contract.
    #[error("malformed bytecode: {0}")]
    Malformed(String),

    /// The arithmetic or comparison strategy rejected its operands.
    #[error("arithmetic error: {0}")]
    Arithmetic(String),

    /// A range coroutine failed for a reason other than exhaustion.
    #[error("range coroutine failed: {0}")]
    Coroutine(#[source] Box<RuntimeError>),

    /// A host function reported an error.
    #[error("native function {name} failed: {message}")]
    NativeFailure { name: String, message: String },

    #[error("call depth limit exceeded ({0}) - possible infinite recursion")]
    CallDepth(usize),

    #[error("{source}\n    at {function}")]
    InFunction {
        function: String,
        #[source]
        source: Box<RuntimeError>,
    },
}

fn fmt_name(name: &Option<String>) -> String {
    match name {
        Some(n) => format!(" ({})", n),
        None => String::new(),
    }
}

impl RuntimeError {
    pub fn type_mismatch(actual: &'static str, expected: &'static str, name: Option<String>) -> Self {
        RuntimeError::TypeMismatch {
            actual,
            expected,
            name,
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        RuntimeError::Malformed(message.into())
    }

    pub fn native(name: impl Into<String>, message: impl Into<String>) -> Self {
        RuntimeError::NativeFailure {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn with_context(self, function: &str) -> Self {
        RuntimeError::InFunction {
            function: function.to_string(),
            source: Box::new(self),
        }
    }

    /// The error with all call-stack wrappers removed.
    pub fn root(&self) -> &RuntimeError {
        match self {
            RuntimeError::InFunction { source, .. } => source.root(),
            other => other,
        }
    }

    /// Function names the error passed through, innermost first.
    pub fn call_stack(&self) -> Vec<&str> {
        let mut names = Vec::new();
        let mut err = self;
        while let RuntimeError::InFunction { function, source } = err {
            names.push(function.as_str());
            err = source;
        }
        names.reverse();
        names
    }
}
