//! # Typed Program
//!
//! What semantic analysis hands over to IR construction: syntax whose every
//! expression carries a resolved type, resolved call targets with their
//! purity and complexity, and source tokens for debug info.
//!
//! The program is known to type check by the time it gets here. Nothing in
//! this module validates user code.

mod symbol;
mod syntax;

pub use symbol::{DispatchKind, StandardTypes, SymbolInfo, TypeOracle};
pub use syntax::{
    Catch,
    ClassDfn,
    ConstructDfn,
    EnumType,
    Expr,
    ExprKind,
    FieldDfn,
    FunctionDfn,
    Guard,
    ProgramDfn,
    SourceModule,
    Stmt,
    StmtKind,
    SwitchCase,
    SwitchMatch,
};

/// Fully qualified names of the built-in types IR construction refers to.
pub mod std_types {
    pub const ANY: &str = "org.ek9.lang::Any";
    pub const VOID: &str = "org.ek9.lang::Void";
    pub const BOOLEAN: &str = "org.ek9.lang::Boolean";
    pub const INTEGER: &str = "org.ek9.lang::Integer";
    pub const STRING: &str = "org.ek9.lang::String";
    pub const EXCEPTION: &str = "org.ek9.lang::Exception";
    pub const LIST: &str = "org.ek9.lang::List";
    pub const ITERATOR: &str = "org.ek9.lang::Iterator";
    /// The I/O capability.
    pub const IO: &str = "org.ek9.lang::IO";
    pub const STDOUT: &str = "org.ek9.lang::Stdout";
    pub const STDERR: &str = "org.ek9.lang::Stderr";
}
