use super::{std_types, SymbolInfo};
use crate::ir::{ConstructKind, LogicalOp, SourceToken};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprKind {
    /// Literal text as written, e.g. `42`, `"hi"` or `true`.
    Literal(String),
    Variable(String),
    /// A constant of an enumeration type.
    EnumConstant(String),
    /// A binary operator resolved to `operator`, a method of `left`'s type.
    Binary {
        op: String,
        left: Box<Expr>,
        right: Box<Expr>,
        operator: SymbolInfo,
    },
    /// A unary operator resolved to a method of `operand`'s type.
    Unary {
        op: String,
        operand: Box<Expr>,
        operator: SymbolInfo,
    },
    /// `operand?`
    IsSet(Box<Expr>),
    /// `left and right`, `left or right`, evaluated short circuit.
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// A method call on `target`, or a function or constructor call without.
    Call {
        target: Option<Box<Expr>>,
        symbol: SymbolInfo,
        args: Vec<Expr>,
    },
    /// `[a, b, c]`, a new List.
    List(Vec<Expr>),
    /// `object.field`
    Field { object: String, field: String },
}

/// A typed expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expr {
    pub kind: ExprKind,
    /// The resolved type.
    pub ty: String,
    pub token: Option<SourceToken>,
}

impl Expr {
    pub fn new(kind: ExprKind, ty: impl Into<String>) -> Self {
        Self {
            kind,
            ty: ty.into(),
            token: None,
        }
    }

    pub fn literal(text: impl Into<String>, ty: impl Into<String>) -> Self {
        Self::new(ExprKind::Literal(text.into()), ty)
    }

    pub fn integer(value: i64) -> Self { Self::literal(value.to_string(), std_types::INTEGER) }

    pub fn boolean(value: bool) -> Self { Self::literal(value.to_string(), std_types::BOOLEAN) }

    pub fn string(value: &str) -> Self { Self::literal(format!("\"{}\"", value), std_types::STRING) }

    pub fn variable(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self::new(ExprKind::Variable(name.into()), ty)
    }

    pub fn enum_constant(constant: impl Into<String>, enum_type: impl Into<String>) -> Self {
        Self::new(ExprKind::EnumConstant(constant.into()), enum_type)
    }

    /// `left op right`, typed by the return type of `operator`.
    pub fn binary(op: impl Into<String>, left: Expr, right: Expr, operator: SymbolInfo) -> Self {
        let ty = operator.return_type().to_string();
        Self::new(
            ExprKind::Binary {
                op: op.into(),
                left: Box::new(left),
                right: Box::new(right),
                operator,
            },
            ty,
        )
    }

    pub fn unary(op: impl Into<String>, operand: Expr, operator: SymbolInfo) -> Self {
        let ty = operator.return_type().to_string();
        Self::new(
            ExprKind::Unary {
                op: op.into(),
                operand: Box::new(operand),
                operator,
            },
            ty,
        )
    }

    pub fn is_set(operand: Expr) -> Self {
        Self::new(ExprKind::IsSet(Box::new(operand)), std_types::BOOLEAN)
    }

    pub fn logical(op: LogicalOp, left: Expr, right: Expr) -> Self {
        Self::new(
            ExprKind::Logical {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            std_types::BOOLEAN,
        )
    }

    pub fn call(target: Option<Expr>, symbol: SymbolInfo, args: Vec<Expr>) -> Self {
        let ty = symbol.return_type().to_string();
        Self::new(
            ExprKind::Call {
                target: target.map(Box::new),
                symbol,
                args,
            },
            ty,
        )
    }

    /// A constructor call, `ty(args)`.
    pub fn construct(ty: impl Into<String>, args: Vec<Expr>) -> Self {
        Self::call(None, SymbolInfo::constructor(ty), args)
    }

    pub fn list(items: Vec<Expr>) -> Self { Self::new(ExprKind::List(items), std_types::LIST) }

    pub fn field(object: impl Into<String>, field: impl Into<String>, ty: impl Into<String>) -> Self {
        Self::new(
            ExprKind::Field {
                object: object.into(),
                field: field.into(),
            },
            ty,
        )
    }

    pub fn with_token(mut self, token: SourceToken) -> Self {
        self.token = Some(token);
        self
    }
}

/// `if name <- init` guards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Guard {
    pub name: String,
    pub ty: String,
    pub init: Expr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchMatch {
    /// Compared with `_eq` against the switched value.
    Literal(Expr),
    EnumConstant(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchCase {
    pub matches: SwitchMatch,
    pub body: Vec<Stmt>,
}

/// `catch as ty variable`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catch {
    pub exception_type: String,
    pub variable: String,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StmtKind {
    /// `name as ty` or `name <- init`.
    Declare {
        name: String,
        ty: String,
        init: Option<Expr>,
    },
    /// `name := value`
    Assign { name: String, value: Expr },
    /// `object.field := value`
    AssignField {
        object: String,
        field: String,
        value: Expr,
    },
    /// `name :=? value`
    GuardedAssign { name: String, value: Expr },
    Expr(Expr),
    /// `if`, `else if` branches in source order, then `else`.
    If {
        guard: Option<Guard>,
        branches: Vec<(Expr, Vec<Stmt>)>,
        otherwise: Option<Vec<Stmt>>,
    },
    /// A switch, optionally declaring a variable the cases assign to.
    Switch {
        guard: Option<Guard>,
        subject: Expr,
        cases: Vec<SwitchCase>,
        default: Option<Vec<Stmt>>,
        returning: Option<Guard>,
    },
    /// `while name <- init then condition`; the guard is evaluated again
    /// after every iteration.
    While {
        guard: Option<Guard>,
        condition: Expr,
        body: Vec<Stmt>,
    },
    DoWhile { body: Vec<Stmt>, condition: Expr },
    /// `for variable in collection`, through the collection's iterator.
    ForIn {
        variable: String,
        ty: String,
        collection: Expr,
        body: Vec<Stmt>,
    },
    /// `for variable in start ... end by step`, counting towards `end`
    /// from either side, both ends included.
    ForRange {
        variable: String,
        ty: String,
        start: Expr,
        end: Expr,
        by: Option<Expr>,
        body: Vec<Stmt>,
    },
    Try {
        body: Vec<Stmt>,
        catches: Vec<Catch>,
        finally: Option<Vec<Stmt>>,
    },
    Return(Option<Expr>),
    Throw(Expr),
    Assert(Expr),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub token: Option<SourceToken>,
}

impl Stmt {
    pub fn new(kind: StmtKind) -> Self { Self { kind, token: None } }

    pub fn declare(name: impl Into<String>, ty: impl Into<String>, init: Option<Expr>) -> Self {
        Self::new(StmtKind::Declare {
            name: name.into(),
            ty: ty.into(),
            init,
        })
    }

    pub fn assign(name: impl Into<String>, value: Expr) -> Self {
        Self::new(StmtKind::Assign {
            name: name.into(),
            value,
        })
    }

    pub fn assign_field(object: impl Into<String>, field: impl Into<String>, value: Expr) -> Self {
        Self::new(StmtKind::AssignField {
            object: object.into(),
            field: field.into(),
            value,
        })
    }

    pub fn guarded_assign(name: impl Into<String>, value: Expr) -> Self {
        Self::new(StmtKind::GuardedAssign {
            name: name.into(),
            value,
        })
    }

    pub fn expr(expr: Expr) -> Self { Self::new(StmtKind::Expr(expr)) }

    pub fn ret(value: Option<Expr>) -> Self { Self::new(StmtKind::Return(value)) }

    pub fn throw(value: Expr) -> Self { Self::new(StmtKind::Throw(value)) }

    pub fn assert(condition: Expr) -> Self { Self::new(StmtKind::Assert(condition)) }

    pub fn with_token(mut self, token: SourceToken) -> Self {
        self.token = Some(token);
        self
    }

    /// Whether control never continues after this statement.
    pub fn departs(&self) -> bool { matches!(self.kind, StmtKind::Return(_) | StmtKind::Throw(_)) }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDfn {
    pub name: String,
    pub params: Vec<(String, String)>,
    pub return_type: String,
    pub body: Vec<Stmt>,
    pub token: Option<SourceToken>,
}

impl FunctionDfn {
    pub fn new(name: impl Into<String>, return_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            return_type: return_type.into(),
            body: Vec::new(),
            token: None,
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, ty: impl Into<String>) -> Self {
        self.params.push((name.into(), ty.into()));
        self
    }

    pub fn with_body(mut self, body: Vec<Stmt>) -> Self {
        self.body = body;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDfn {
    pub name: String,
    pub ty: String,
    pub init: Option<Expr>,
}

/// A class, record or trait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDfn {
    pub name: String,
    pub kind: ConstructKind,
    pub fields: Vec<FieldDfn>,
    pub methods: Vec<FunctionDfn>,
    pub token: Option<SourceToken>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramDfn {
    pub name: String,
    pub body: Vec<Stmt>,
    pub token: Option<SourceToken>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstructDfn {
    Function(FunctionDfn),
    Class(ClassDfn),
    Program(ProgramDfn),
}

impl ConstructDfn {
    pub fn name(&self) -> &str {
        match self {
            ConstructDfn::Function(function) => &function.name,
            ConstructDfn::Class(class) => &class.name,
            ConstructDfn::Program(program) => &program.name,
        }
    }
}

/// An enumeration; constants are numbered in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumType {
    pub name: String,
    pub constants: Vec<String>,
}

impl EnumType {
    pub fn new(name: impl Into<String>, constants: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            constants: constants.into_iter().map(Into::into).collect(),
        }
    }

    pub fn ordinal(&self, constant: &str) -> Option<u32> {
        self.constants
            .iter()
            .position(|c| c == constant)
            .map(|ordinal| ordinal as u32)
    }
}

/// One source file's worth of constructs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceModule {
    pub name: String,
    pub constructs: Vec<ConstructDfn>,
    pub enums: Vec<EnumType>,
}

impl SourceModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn enum_type(&self, name: &str) -> Option<&EnumType> { self.enums.iter().find(|e| e.name == name) }
}
