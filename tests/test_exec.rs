mod common;

use common::*;
use ek9ir::{
    ir::{
        exec::{
            BuiltinCalls,
            CallHandler,
            CallOutcome,
            ExecConfig,
            ExecError,
            ExecResult,
            Interpreter,
            MemoryModel,
            Receiver,
            Value,
        },
        verify::ScopeVerifier,
        CallDetails,
    },
    typed::{std_types, Catch, Expr, FunctionDfn, Guard, Stmt, StmtKind, SwitchCase, SwitchMatch, SymbolInfo},
};

/// Builtins that remember the methods called, in order.
#[derive(Default)]
struct RecordingCalls {
    builtins: BuiltinCalls,
    methods: Vec<String>,
}

impl CallHandler for RecordingCalls {
    fn call(
        &mut self,
        call: &CallDetails,
        receiver: Receiver<'_>,
        args: &[Option<Value>],
    ) -> ExecResult<CallOutcome> {
        self.methods.push(call.method_name.clone());
        self.builtins.call(call, receiver, args)
    }
}

fn sum_to() -> FunctionDfn {
    FunctionDfn::new("test::sumTo", INTEGER)
        .with_param("n", INTEGER)
        .with_body(vec![
            Stmt::declare("total", INTEGER, Some(Expr::integer(0))),
            Stmt::declare("i", INTEGER, Some(Expr::integer(0))),
            while_loop(
                lt(int_var("i"), int_var("n")),
                vec![
                    Stmt::assign("total", add(int_var("total"), int_var("i"))),
                    Stmt::assign("i", add(int_var("i"), Expr::integer(1))),
                ],
            ),
            Stmt::ret(Some(int_var("total"))),
        ])
}

#[test]
fn test_loop_balances() {
    let unit = generate(&module_of(sum_to()));
    let operation = function_operation(&unit, "test::sumTo");
    ScopeVerifier::new().verify_operation(operation).unwrap();

    let outcome = run(operation, vec![Value::Integer(5)]);
    assert_eq!(outcome.returned, Some(Value::Integer(10)));
    assert_eq!(outcome.thrown, None);
    assert!(outcome.leaks.is_empty(), "leaked {:?}", outcome.leaks);
}

#[test]
fn test_early_return_balances() {
    let function = FunctionDfn::new("test::classify", INTEGER)
        .with_param("n", INTEGER)
        .with_body(vec![
            Stmt::declare("limit", INTEGER, Some(Expr::integer(10))),
            if_else(
                lt(int_var("n"), int_var("limit")),
                vec![
                    Stmt::declare("small", INTEGER, Some(Expr::integer(1))),
                    Stmt::ret(Some(int_var("small"))),
                ],
                Some(vec![Stmt::assign("limit", Expr::integer(20))]),
            ),
            Stmt::ret(Some(int_var("limit"))),
        ]);
    let unit = generate(&module_of(function));
    let operation = function_operation(&unit, "test::classify");
    ScopeVerifier::new().verify_operation(operation).unwrap();

    for (n, expected) in [(3, 1), (15, 20)] {
        let outcome = run(operation, vec![Value::Integer(n)]);
        assert_eq!(outcome.returned, Some(Value::Integer(expected)));
        assert!(outcome.leaks.is_empty(), "leaked {:?}", outcome.leaks);
    }
}

#[test]
fn test_switch_matches_in_order() {
    let cases = (1..=3)
        .map(|value| SwitchCase {
            matches: SwitchMatch::Literal(Expr::integer(value)),
            body: vec![Stmt::assign("result", Expr::integer(value * 10))],
        })
        .collect();
    let function = FunctionDfn::new("test::tens", INTEGER)
        .with_param("n", INTEGER)
        .with_body(vec![
            Stmt::new(StmtKind::Switch {
                guard: None,
                subject: int_var("n"),
                cases,
                default: None,
                returning: Some(Guard {
                    name: "result".into(),
                    ty: INTEGER.into(),
                    init: Expr::integer(0),
                }),
            }),
            Stmt::ret(Some(int_var("result"))),
        ]);
    let unit = generate(&module_of(function));
    let operation = function_operation(&unit, "test::tens");
    ScopeVerifier::new().verify_operation(operation).unwrap();

    let mut interpreter = Interpreter::with_handler(ExecConfig::default(), RecordingCalls::default());
    let outcome = interpreter.run(operation, vec![Value::Integer(2)]).unwrap();
    assert_eq!(outcome.returned, Some(Value::Integer(20)));
    assert!(outcome.leaks.is_empty(), "leaked {:?}", outcome.leaks);

    // the first match ends the chain, so the third case is never compared
    let compared = interpreter
        .handler()
        .methods
        .iter()
        .filter(|method| *method == "_eq")
        .count();
    assert_eq!(compared, 2);

    let outcome = run(operation, vec![Value::Integer(7)]);
    assert_eq!(outcome.returned, Some(Value::Integer(0)));
    assert!(outcome.leaks.is_empty(), "leaked {:?}", outcome.leaks);
}

#[test]
fn test_enum_switch_selects_constant() {
    let cases = colour()
        .constants
        .iter()
        .enumerate()
        .map(|(index, constant)| SwitchCase {
            matches: SwitchMatch::EnumConstant(constant.clone()),
            body: vec![Stmt::assign("result", Expr::integer(index as i64))],
        })
        .collect();
    let function = FunctionDfn::new("test::ordinal", INTEGER)
        .with_param("c", COLOUR)
        .with_body(vec![
            Stmt::declare("result", INTEGER, Some(Expr::integer(-1))),
            Stmt::new(StmtKind::Switch {
                guard: None,
                subject: Expr::variable("c", COLOUR),
                cases,
                default: None,
                returning: None,
            }),
            Stmt::ret(Some(int_var("result"))),
        ]);
    let unit = generate(&module_of(function));
    let operation = function_operation(&unit, "test::ordinal");

    let green = Value::Other {
        ty: COLOUR.into(),
        text: "GREEN".into(),
    };
    let outcome = run(operation, vec![green]);
    assert_eq!(outcome.returned, Some(Value::Integer(3)));
    assert!(outcome.leaks.is_empty(), "leaked {:?}", outcome.leaks);
}

#[test]
fn test_guarded_assignment_only_when_unset() {
    let function = FunctionDfn::new("test::first", INTEGER).with_body(vec![
        Stmt::declare("x", INTEGER, None),
        Stmt::guarded_assign("x", Expr::integer(3)),
        Stmt::guarded_assign("x", Expr::integer(4)),
        Stmt::ret(Some(int_var("x"))),
    ]);
    let unit = generate(&module_of(function));
    let operation = function_operation(&unit, "test::first");
    ScopeVerifier::new().verify_operation(operation).unwrap();

    let outcome = run(operation, Vec::new());
    assert_eq!(outcome.returned, Some(Value::Integer(3)));
    assert!(outcome.leaks.is_empty(), "leaked {:?}", outcome.leaks);
}

#[test]
fn test_is_set_and_logical() {
    // `x? and x < 5` with x unset never reaches the comparison
    let check = Expr::logical(
        ek9ir::ir::LogicalOp::And,
        Expr::is_set(int_var("x")),
        lt(int_var("x"), Expr::integer(5)),
    );
    let function = FunctionDfn::new("test::small", BOOLEAN).with_body(vec![
        Stmt::declare("x", INTEGER, None),
        Stmt::ret(Some(check)),
    ]);
    let unit = generate(&module_of(function));
    let operation = function_operation(&unit, "test::small");
    ScopeVerifier::new().verify_operation(operation).unwrap();

    let mut interpreter = Interpreter::with_handler(ExecConfig::default(), RecordingCalls::default());
    let outcome = interpreter.run(operation, Vec::new()).unwrap();
    assert_eq!(outcome.returned, Some(Value::Boolean(false)));
    assert!(outcome.leaks.is_empty(), "leaked {:?}", outcome.leaks);
    assert!(!interpreter.handler().methods.iter().any(|m| m == "_lt"));
}

#[test]
fn test_throw_hands_over() {
    let function = FunctionDfn::new("test::fail", INTEGER)
        .with_param("n", INTEGER)
        .with_body(vec![
            Stmt::declare("message", BOOLEAN, Some(Expr::boolean(false))),
            Stmt::new(StmtKind::Throw(Expr::variable("message", BOOLEAN))),
        ]);
    let unit = generate(&module_of(function));
    let operation = function_operation(&unit, "test::fail");
    ScopeVerifier::new().verify_operation(operation).unwrap();

    let outcome = run(operation, vec![Value::Integer(1)]);
    assert_eq!(outcome.returned, None);
    assert_eq!(outcome.thrown, Some(Value::Boolean(false)));
    assert!(outcome.leaks.is_empty(), "leaked {:?}", outcome.leaks);
}

#[test]
fn test_failed_assertion() {
    let function = FunctionDfn::new("test::check", ek9ir::typed::std_types::VOID)
        .with_param("n", INTEGER)
        .with_body(vec![Stmt::new(StmtKind::Assert(lt(int_var("n"), Expr::integer(3))))]);
    let unit = generate(&module_of(function));
    let operation = function_operation(&unit, "test::check");

    assert!(run(operation, vec![Value::Integer(1)]).leaks.is_empty());
    let err = Interpreter::new(ExecConfig::default())
        .run(operation, vec![Value::Integer(4)])
        .unwrap_err();
    assert!(matches!(err, ExecError::AssertionFailed(_)));
}

#[test]
fn test_gc_model_ignores_scopes() {
    let unit = generate(&module_of(sum_to()));
    let operation = function_operation(&unit, "test::sumTo");
    let config = ExecConfig {
        memory_model: MemoryModel::Gc,
        ..ExecConfig::default()
    };
    let outcome = Interpreter::new(config)
        .run(operation, vec![Value::Integer(4)])
        .unwrap();
    assert_eq!(outcome.returned, Some(Value::Integer(6)));
    assert!(outcome.leaks.is_empty());
}

#[test]
fn test_step_limit() {
    let function = FunctionDfn::new("test::spin", ek9ir::typed::std_types::VOID)
        .with_body(vec![while_loop(Expr::boolean(true), Vec::new())]);
    let unit = generate(&module_of(function));
    let operation = function_operation(&unit, "test::spin");
    let config = ExecConfig {
        max_steps: 1_000,
        ..ExecConfig::default()
    };
    let err = Interpreter::new(config).run(operation, Vec::new()).unwrap_err();
    assert_eq!(err, ExecError::StepLimit(1_000));
}

fn assert_balanced(outcome: &ek9ir::ir::exec::ExecOutcome) {
    assert!(outcome.leaks.is_empty(), "leaked {:?}", outcome.leaks);
}

#[test]
fn test_self_assignment_keeps_value() {
    let function = FunctionDfn::new("test::same", INTEGER).with_body(vec![
        Stmt::declare("x", INTEGER, Some(Expr::integer(0))),
        if_else(Expr::boolean(true), vec![Stmt::assign("x", Expr::integer(5))], None),
        Stmt::assign("x", int_var("x")),
        Stmt::ret(Some(int_var("x"))),
    ]);
    let unit = generate(&module_of(function));
    let operation = function_operation(&unit, "test::same");
    ScopeVerifier::new().verify_operation(operation).unwrap();

    let outcome = run(operation, Vec::new());
    assert_eq!(outcome.returned, Some(Value::Integer(5)));
    assert_balanced(&outcome);
}

fn catch_all(variable: &str, body: Vec<Stmt>) -> Catch {
    Catch {
        exception_type: std_types::EXCEPTION.into(),
        variable: variable.into(),
        body,
    }
}

fn try_stmt(body: Vec<Stmt>, catches: Vec<Catch>, finally: Option<Vec<Stmt>>) -> Stmt {
    Stmt::new(StmtKind::Try { body, catches, finally })
}

#[test]
fn test_catch_and_finally_balance() {
    let raise = Stmt::throw(Expr::construct(std_types::EXCEPTION, vec![Expr::string("small")]));
    let function = FunctionDfn::new("test::guarded", INTEGER)
        .with_param("n", INTEGER)
        .with_body(vec![
            Stmt::declare("result", INTEGER, Some(Expr::integer(0))),
            try_stmt(
                vec![
                    if_else(lt(int_var("n"), Expr::integer(3)), vec![raise], None),
                    Stmt::assign("result", Expr::integer(1)),
                ],
                vec![catch_all("e", vec![Stmt::assign("result", Expr::integer(2))])],
                Some(vec![Stmt::assign("result", add(int_var("result"), Expr::integer(10)))]),
            ),
            Stmt::ret(Some(int_var("result"))),
        ]);
    let unit = generate(&module_of(function));
    let operation = function_operation(&unit, "test::guarded");
    ScopeVerifier::new().verify_operation(operation).unwrap();

    // the throw leaves the if chain and the try block before the catch runs
    for (n, expected) in [(1, 12), (5, 11)] {
        let outcome = run(operation, vec![Value::Integer(n)]);
        assert_eq!(outcome.returned, Some(Value::Integer(expected)));
        assert_eq!(outcome.thrown, None);
        assert_balanced(&outcome);
    }
}

/// Builtins, plus `test::risky`, which throws for negative arguments.
#[derive(Default)]
struct FailingCalls {
    builtins: BuiltinCalls,
}

impl CallHandler for FailingCalls {
    fn call(
        &mut self,
        call: &CallDetails,
        receiver: Receiver<'_>,
        args: &[Option<Value>],
    ) -> ExecResult<CallOutcome> {
        if call.target_type != "test::risky" {
            return self.builtins.call(call, receiver, args);
        }
        match args.first() {
            Some(Some(Value::Integer(n))) if *n < 0 => Ok(CallOutcome::Throw(Value::Other {
                ty: "test::Failure".into(),
                text: n.to_string(),
            })),
            Some(Some(value)) => Ok(CallOutcome::Object(value.clone())),
            _ => Err(ExecError::CallFailed(call.operand())),
        }
    }
}

fn risky(arg: Expr) -> Expr {
    let symbol = SymbolInfo::function("test::risky", INTEGER).with_params([INTEGER]);
    Expr::call(None, symbol, vec![arg])
}

#[test]
fn test_catch_callee_exception() {
    let function = FunctionDfn::new("test::attempt", INTEGER)
        .with_param("n", INTEGER)
        .with_body(vec![
            Stmt::declare("result", INTEGER, Some(Expr::integer(0))),
            try_stmt(
                vec![
                    Stmt::declare("checked", INTEGER, Some(risky(int_var("n")))),
                    Stmt::assign("result", int_var("checked")),
                ],
                vec![catch_all("e", vec![Stmt::assign("result", Expr::integer(-100))])],
                None,
            ),
            Stmt::ret(Some(int_var("result"))),
        ]);
    let unit = generate(&module_of(function));
    let operation = function_operation(&unit, "test::attempt");
    ScopeVerifier::new().verify_operation(operation).unwrap();

    for (n, expected) in [(-1, -100), (7, 7)] {
        let outcome = Interpreter::with_handler(ExecConfig::default(), FailingCalls::default())
            .run(operation, vec![Value::Integer(n)])
            .unwrap();
        assert_eq!(outcome.returned, Some(Value::Integer(expected)));
        assert_balanced(&outcome);
    }
}

#[test]
fn test_uncaught_exception_runs_finally() {
    let unrelated = Catch {
        exception_type: "test::Timeout".into(),
        variable: "t".into(),
        body: vec![Stmt::assign("result", Expr::integer(2))],
    };
    let function = FunctionDfn::new("test::escalate", INTEGER)
        .with_param("n", INTEGER)
        .with_body(vec![
            Stmt::declare("result", INTEGER, Some(Expr::integer(0))),
            try_stmt(
                vec![Stmt::expr(risky(int_var("n")))],
                vec![unrelated],
                Some(vec![Stmt::assign("result", Expr::integer(3))]),
            ),
            Stmt::ret(Some(int_var("result"))),
        ]);
    let unit = generate(&module_of(function));
    let operation = function_operation(&unit, "test::escalate");
    ScopeVerifier::new().verify_operation(operation).unwrap();

    let outcome = Interpreter::with_handler(ExecConfig::default(), FailingCalls::default())
        .run(operation, vec![Value::Integer(-4)])
        .unwrap();
    assert_eq!(outcome.returned, None);
    assert_eq!(
        outcome.thrown,
        Some(Value::Other {
            ty: "test::Failure".into(),
            text: "-4".into(),
        })
    );
    assert_balanced(&outcome);
}

#[test]
fn test_for_in_list() {
    let function = FunctionDfn::new("test::total", INTEGER).with_body(vec![
        Stmt::declare("total", INTEGER, Some(Expr::integer(0))),
        Stmt::new(StmtKind::ForIn {
            variable: "item".into(),
            ty: INTEGER.into(),
            collection: Expr::list(vec![Expr::integer(4), Expr::integer(5), Expr::integer(6)]),
            body: vec![Stmt::assign("total", add(int_var("total"), int_var("item")))],
        }),
        Stmt::ret(Some(int_var("total"))),
    ]);
    let unit = generate(&module_of(function));
    let operation = function_operation(&unit, "test::total");
    ScopeVerifier::new().verify_operation(operation).unwrap();

    let outcome = run(operation, Vec::new());
    assert_eq!(outcome.returned, Some(Value::Integer(15)));
    assert_balanced(&outcome);
}

fn range_sum(by: Option<Expr>) -> FunctionDfn {
    FunctionDfn::new("test::rangeSum", INTEGER)
        .with_param("a", INTEGER)
        .with_param("b", INTEGER)
        .with_body(vec![
            Stmt::declare("total", INTEGER, Some(Expr::integer(0))),
            Stmt::new(StmtKind::ForRange {
                variable: "i".into(),
                ty: INTEGER.into(),
                start: int_var("a"),
                end: int_var("b"),
                by,
                body: vec![Stmt::assign("total", add(int_var("total"), int_var("i")))],
            }),
            Stmt::ret(Some(int_var("total"))),
        ])
}

#[test]
fn test_for_range_counts_towards_end() {
    let unit = generate(&module_of(range_sum(None)));
    let operation = function_operation(&unit, "test::rangeSum");
    ScopeVerifier::new().verify_operation(operation).unwrap();

    for (a, b, expected) in [(1, 4, 10), (4, 1, 10), (3, 3, 3)] {
        let outcome = run(operation, vec![Value::Integer(a), Value::Integer(b)]);
        assert_eq!(outcome.returned, Some(Value::Integer(expected)), "{a} ... {b}");
        assert_balanced(&outcome);
    }
}

#[test]
fn test_for_range_by_step() {
    let unit = generate(&module_of(range_sum(Some(Expr::integer(3)))));
    let operation = function_operation(&unit, "test::rangeSum");
    ScopeVerifier::new().verify_operation(operation).unwrap();

    // 1, 4, 7, 10
    let outcome = run(operation, vec![Value::Integer(1), Value::Integer(10)]);
    assert_eq!(outcome.returned, Some(Value::Integer(22)));
    assert_balanced(&outcome);

    // a step pointing away from the end is rejected
    let err = Interpreter::new(ExecConfig::default())
        .run(operation, vec![Value::Integer(10), Value::Integer(1)])
        .unwrap_err();
    assert!(matches!(err, ExecError::AssertionFailed(_)));
}

#[test]
fn test_guarded_while_rebinds_each_iteration() {
    let function = FunctionDfn::new("test::drain", INTEGER).with_body(vec![
        Stmt::declare("remaining", INTEGER, Some(Expr::integer(3))),
        Stmt::declare("count", INTEGER, Some(Expr::integer(0))),
        Stmt::new(StmtKind::While {
            guard: Some(Guard {
                name: "r".into(),
                ty: INTEGER.into(),
                init: int_var("remaining"),
            }),
            condition: lt(Expr::integer(0), int_var("r")),
            body: vec![
                Stmt::assign("count", add(int_var("count"), int_var("r"))),
                Stmt::assign("remaining", add(int_var("remaining"), Expr::integer(-1))),
            ],
        }),
        Stmt::ret(Some(int_var("count"))),
    ]);
    let unit = generate(&module_of(function));
    let operation = function_operation(&unit, "test::drain");
    ScopeVerifier::new().verify_operation(operation).unwrap();

    let outcome = run(operation, Vec::new());
    assert_eq!(outcome.returned, Some(Value::Integer(6)));
    assert_balanced(&outcome);
}

#[test]
fn test_guarded_switch() {
    let cases = (1..=3)
        .map(|value| SwitchCase {
            matches: SwitchMatch::Literal(Expr::integer(value)),
            body: vec![Stmt::assign("result", Expr::integer(value * 10))],
        })
        .collect();
    let function = FunctionDfn::new("test::next", INTEGER)
        .with_param("n", INTEGER)
        .with_body(vec![
            Stmt::declare("result", INTEGER, Some(Expr::integer(0))),
            Stmt::new(StmtKind::Switch {
                guard: Some(Guard {
                    name: "m".into(),
                    ty: INTEGER.into(),
                    init: add(int_var("n"), Expr::integer(1)),
                }),
                subject: int_var("m"),
                cases,
                default: None,
                returning: None,
            }),
            Stmt::ret(Some(int_var("result"))),
        ]);
    let unit = generate(&module_of(function));
    let operation = function_operation(&unit, "test::next");
    ScopeVerifier::new().verify_operation(operation).unwrap();

    let outcome = run(operation, vec![Value::Integer(1)]);
    assert_eq!(outcome.returned, Some(Value::Integer(20)));
    assert_balanced(&outcome);
}
