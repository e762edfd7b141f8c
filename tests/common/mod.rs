#![allow(dead_code)]

use ek9ir::{
    ir::{
        exec::{ExecConfig, ExecOutcome, Interpreter, Value},
        CompilationUnit,
        IrInstr,
        Operation,
    },
    irgen::{generate_unit, IrGenConfig, FUNCTION_OPERATION},
    typed::{std_types, ConstructDfn, EnumType, Expr, FunctionDfn, SourceModule, Stmt, StmtKind, StandardTypes, SymbolInfo},
};

pub const INTEGER: &str = std_types::INTEGER;
pub const BOOLEAN: &str = std_types::BOOLEAN;
pub const COLOUR: &str = "test::Colour";

/// `left <op> right` on Integers.
pub fn integer_op(op: &str, method: &str, return_type: &str, left: Expr, right: Expr) -> Expr {
    let operator = SymbolInfo::method(INTEGER, method, return_type)
        .pure()
        .with_params([INTEGER]);
    Expr::binary(op, left, right, operator)
}

pub fn add(left: Expr, right: Expr) -> Expr { integer_op("+", "_add", INTEGER, left, right) }

pub fn lt(left: Expr, right: Expr) -> Expr { integer_op("<", "_lt", BOOLEAN, left, right) }

pub fn int_var(name: &str) -> Expr { Expr::variable(name, INTEGER) }

pub fn if_else(condition: Expr, then: Vec<Stmt>, otherwise: Option<Vec<Stmt>>) -> Stmt {
    Stmt::new(StmtKind::If {
        guard: None,
        branches: vec![(condition, then)],
        otherwise,
    })
}

pub fn while_loop(condition: Expr, body: Vec<Stmt>) -> Stmt {
    Stmt::new(StmtKind::While {
        guard: None,
        condition,
        body,
    })
}

pub fn colour() -> EnumType { EnumType::new(COLOUR, ["RED", "ORANGE", "YELLOW", "GREEN", "BLUE"]) }

/// A module with `function` as its only construct.
pub fn module_of(function: FunctionDfn) -> SourceModule {
    let mut module = SourceModule::new("test");
    module.enums.push(colour());
    module.constructs.push(ConstructDfn::Function(function));
    module
}

pub fn generate(module: &SourceModule) -> CompilationUnit {
    generate_unit(module, &StandardTypes::new(), &IrGenConfig::default())
}

/// The `_call` operation of function `name`.
pub fn function_operation<'a>(unit: &'a CompilationUnit, name: &str) -> &'a Operation {
    unit.construct(name)
        .and_then(|construct| construct.operation(FUNCTION_OPERATION))
        .unwrap()
}

pub fn run(operation: &Operation, args: Vec<Value>) -> ExecOutcome {
    Interpreter::new(ExecConfig::default())
        .run(operation, args)
        .unwrap()
}

/// Every instruction of `instrs`, nested ones included, in order.
pub fn flatten(instrs: &[IrInstr]) -> Vec<&IrInstr> {
    let mut flat = Vec::new();
    for instr in instrs {
        flat.push(instr);
        for list in instr.nested_lists() {
            flat.extend(flatten(list));
        }
    }
    flat
}

pub fn all_instrs(operation: &Operation) -> Vec<&IrInstr> {
    let body = operation.body();
    body.blocks()
        .flat_map(|block| flatten(block.instrs(body)))
        .collect()
}
