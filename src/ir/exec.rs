//! # Reference Interpreter
//!
//! Executes an [Operation](super::construct::Operation) directly on the IR.
//! It is not a runtime, only a tool to check that generated and optimized IR
//! behaves the same, and that the scope based reference counting balances.
//!
//! Under [MemoryModel::Arc] every RETAIN, RELEASE and scope event is
//! simulated. Objects registered to a scope are released in reverse
//! registration order when the scope exits. Under [MemoryModel::Gc] the
//! scope, reference counting and optimization marker opcodes are no-ops,
//! as on a garbage collected target.
//!
//! Fields are references held by their object: `STORE obj.field, value`
//! rebinds one, and freeing the object or `STACK_CLEANUP_REFS` on a stack
//! object releases them. An exception leaving a try chain, or the
//! operation, unwinds the scopes still open below its handler.

mod builtins;
mod heap;
mod interpreter;

use std::fmt;

use thiserror::Error;

pub use self::{
    builtins::BuiltinCalls,
    heap::{Heap, Leak, ObjectId},
    interpreter::{ExecOutcome, Interpreter},
};
use super::{call::CallDetails, opcode::Opcode};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExecError {
    #[error("`{0}` is not bound")]
    Unbound(String),

    #[error("`{0}` is not a primitive boolean")]
    NotPrimitive(String),

    #[error("object {0} released more times than retained")]
    DoubleRelease(ObjectId),

    #[error("object {0} used after being freed")]
    UseAfterFree(ObjectId),

    #[error("scope `{0}` is not open")]
    UnknownScope(String),

    #[error("exit of scope `{found}` while `{expected}` is innermost")]
    ScopeMismatch { expected: String, found: String },

    #[error("no block labeled `{0}`")]
    UnknownLabel(String),

    #[error("{0} cannot leave a nested instruction list")]
    JumpOutOfStructure(Opcode),

    #[error("no incoming value of phi `{0}` for the taken edge")]
    PhiWithoutEdge(String),

    #[error("assertion on `{0}` failed")]
    AssertionFailed(String),

    #[error("store to `{0}`, whose object is null")]
    NullHolder(String),

    #[error("call of `{method}` on a null receiver")]
    NullReceiver { method: String },

    #[error("no builtin `{ty}.{method}`")]
    UnknownMethod { ty: String, method: String },

    #[error("call failed: {0}")]
    CallFailed(String),

    #[error("malformed `{0}`")]
    Malformed(String),

    #[error("step limit of {0} exceeded")]
    StepLimit(usize),
}

pub type ExecResult<T> = Result<T, ExecError>;

/// How object lifetimes are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MemoryModel {
    /// Reference counting driven by the scope instructions.
    #[default]
    Arc,
    /// Scope and reference counting instructions are ignored.
    Gc,
}

#[derive(Debug, Clone)]
pub struct ExecConfig {
    pub memory_model: MemoryModel,
    /// Executed instructions after which execution is aborted.
    pub max_steps: usize,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            memory_model: MemoryModel::Arc,
            max_steps: 1_000_000,
        }
    }
}

/// A runtime value of a heap object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Boolean(bool),
    Integer(i64),
    String(String),
    List(Vec<Value>),
    /// A position in a snapshot of a list.
    Iterator { items: Vec<Value>, next: usize },
    /// Enumeration constants and objects of types without builtins,
    /// compared by their text.
    Other { ty: String, text: String },
}

impl Value {
    pub fn type_name(&self) -> &str {
        use crate::typed::std_types;

        match self {
            Value::Boolean(_) => std_types::BOOLEAN,
            Value::Integer(_) => std_types::INTEGER,
            Value::String(_) => std_types::STRING,
            Value::List(_) => std_types::LIST,
            Value::Iterator { .. } => std_types::ITERATOR,
            Value::Other { ty, .. } => ty,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::String(s) => write!(f, "\"{}\"", s),
            Value::List(items) => {
                let items: Vec<String> = items.iter().map(Value::to_string).collect();
                write!(f, "[{}]", items.join(", "))
            }
            Value::Iterator { items, next } => write!(f, "<iterator {}/{}>", next, items.len()),
            Value::Other { text, .. } => write!(f, "{}", text),
        }
    }
}

/// What a call produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    Void,
    /// A new object.
    Object(Value),
    /// A backend native boolean, as produced by `_true`.
    Primitive(bool),
    /// The callee threw a new exception object.
    Throw(Value),
}

/// The receiver of a call. Methods may update the object in place.
#[derive(Debug, PartialEq, Eq)]
pub enum Receiver<'a> {
    /// `CALL_STATIC`, the target is a type.
    Static,
    Null,
    Object(&'a mut Value),
}

/// Executes the calls of the interpreted IR.
pub trait CallHandler {
    /// Perform `call`. Arguments that are null are `None`.
    fn call(
        &mut self,
        call: &CallDetails,
        receiver: Receiver<'_>,
        args: &[Option<Value>],
    ) -> ExecResult<CallOutcome>;
}
