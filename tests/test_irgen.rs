mod common;

use common::*;
use ek9ir::{
    ir::{render, CaseType, ChainType, ConstructKind, ControlFlowChain, IrInstr, IrNode, Opcode, SourceToken},
    irgen::{generate_unit, IrGenConfig, INSTANCE_INIT_OPERATION, PROGRAM_OPERATION},
    typed::{
        std_types,
        Catch,
        ClassDfn,
        ConstructDfn,
        Expr,
        FieldDfn,
        FunctionDfn,
        ProgramDfn,
        SourceModule,
        StandardTypes,
        Stmt,
        StmtKind,
        SwitchCase,
        SwitchMatch,
        SymbolInfo,
    },
};

fn chains<'a>(instrs: &[&'a IrInstr]) -> Vec<&'a IrInstr> {
    instrs
        .iter()
        .copied()
        .filter(|instr| instr.opcode() == Opcode::ControlFlowChain)
        .collect()
}

/// The outermost chain, the first in evaluation order.
fn first_chain<'a>(instrs: &[&'a IrInstr]) -> &'a ControlFlowChain {
    instrs.iter().copied().find_map(IrInstr::chain).unwrap()
}

#[test]
fn test_operator_becomes_add_call() {
    let function = FunctionDfn::new("test::sum", INTEGER)
        .with_param("a", INTEGER)
        .with_param("b", INTEGER)
        .with_body(vec![Stmt::ret(Some(add(int_var("a"), int_var("b"))))]);
    let unit = generate(&module_of(function));
    let operation = function_operation(&unit, "test::sum");
    let instrs = all_instrs(operation);

    let calls: Vec<_> = instrs
        .iter()
        .filter(|instr| instr.opcode().is_call())
        .collect();
    assert_eq!(calls.len(), 1);
    let details = calls[0].call_details().unwrap();
    assert_eq!(details.method_name, "_add");
    assert_eq!(details.target_type, INTEGER);
    assert!(details.metadata.is_pure());

    let call = format!("_temp3 = CALL {}", details.operand());
    let texts: Vec<String> = instrs.iter().map(|instr| instr.to_string()).collect();
    assert_eq!(
        texts,
        vec![
            "SCOPE_ENTER _scope_1",
            "_temp1 = LOAD a",
            "_temp2 = LOAD b",
            call.as_str(),
            "RETAIN _temp3",
            "SCOPE_REGISTER _temp3, _scope_1",
            "RETAIN _temp3",
            "SCOPE_EXIT _scope_1",
            "RETURN _temp3",
        ]
    );
}

#[test]
fn test_generation_is_deterministic() {
    let mut module = SourceModule::new("test");
    for name in ["test::first", "test::second", "test::third"] {
        let body = vec![
            Stmt::declare("x", INTEGER, Some(Expr::integer(1))),
            while_loop(
                lt(int_var("x"), Expr::integer(10)),
                vec![Stmt::assign("x", add(int_var("x"), Expr::integer(1)))],
            ),
            Stmt::ret(Some(int_var("x"))),
        ];
        module
            .constructs
            .push(ConstructDfn::Function(FunctionDfn::new(name, INTEGER).with_body(body)));
    }

    let first = render(IrNode::Unit(&generate(&module)));
    let second = render(IrNode::Unit(&generate(&module)));
    assert_eq!(first, second);

    // each operation restarts numbering, and source order is kept
    let unit = generate(&module);
    let names: Vec<&str> = unit.constructs().iter().map(|c| c.name()).collect();
    assert_eq!(names, vec!["test::first", "test::second", "test::third"]);
    let bodies: Vec<String> = unit
        .operations()
        .map(|operation| render(IrNode::Operation(operation)))
        .collect();
    assert_eq!(bodies[0], bodies[1]);
    assert_eq!(bodies[1], bodies[2]);
}

#[test]
fn test_is_set_question_operator() {
    let function = FunctionDfn::new("test::check", BOOLEAN)
        .with_param("x", INTEGER)
        .with_body(vec![Stmt::ret(Some(Expr::is_set(int_var("x"))))]);
    let unit = generate(&module_of(function));
    let instrs = all_instrs(function_operation(&unit, "test::check"));

    let chains = chains(&instrs);
    assert_eq!(chains.len(), 1);
    let chain = chains[0].chain().unwrap();
    assert_eq!(chain.chain_type(), ChainType::QuestionOperator);
    assert_eq!(chain.condition_chain().len(), 1);
    assert_eq!(chain.condition_chain()[0].case_type(), CaseType::NullCheck);
    assert!(chain.result().is_some());

    let default = chain.default_case().unwrap();
    let call = default
        .evaluation
        .iter()
        .find_map(IrInstr::call_details)
        .unwrap();
    assert_eq!(call.method_name, "_isSet");
    assert_eq!(call.target_object, "_temp1");
}

#[test]
fn test_if_else_if_chain() {
    let branches = vec![
        (lt(int_var("n"), Expr::integer(0)), vec![Stmt::ret(Some(Expr::integer(-1)))]),
        (lt(int_var("n"), Expr::integer(10)), vec![Stmt::ret(Some(Expr::integer(1)))]),
    ];
    let function = FunctionDfn::new("test::sign", INTEGER)
        .with_param("n", INTEGER)
        .with_body(vec![
            Stmt::new(StmtKind::If {
                guard: None,
                branches,
                otherwise: Some(vec![Stmt::ret(Some(Expr::integer(2)))]),
            }),
            Stmt::ret(Some(Expr::integer(0))),
        ]);
    let unit = generate(&module_of(function));
    let instrs = all_instrs(function_operation(&unit, "test::sign"));

    let chain = first_chain(&instrs);
    assert_eq!(chain.chain_type(), ChainType::IfElseIf);
    assert_eq!(chain.condition_chain().len(), 2);
    assert!(chain.has_default_case());
    for case in chain.condition_chain() {
        assert_eq!(case.case_type(), CaseType::Expression);
        assert!(case.case_scope_id().is_some());
        assert!(case.body_scope_id().is_some());
        assert_ne!(case.case_scope_id(), case.body_scope_id());
    }
}

#[test]
fn test_enum_switch_optimization() {
    let mut cases: Vec<SwitchCase> = colour()
        .constants
        .iter()
        .enumerate()
        .map(|(index, constant)| SwitchCase {
            matches: SwitchMatch::EnumConstant(constant.clone()),
            body: vec![Stmt::assign("result", Expr::integer(index as i64))],
        })
        .collect();
    let switch = |cases: Vec<SwitchCase>, default: Option<Vec<Stmt>>| {
        Stmt::new(StmtKind::Switch {
            guard: None,
            subject: Expr::variable("c", COLOUR),
            cases,
            default,
            returning: None,
        })
    };
    let function = FunctionDfn::new("test::pick", INTEGER)
        .with_param("c", COLOUR)
        .with_body(vec![
            Stmt::declare("result", INTEGER, Some(Expr::integer(-1))),
            switch(cases.clone(), Some(vec![Stmt::assign("result", Expr::integer(9))])),
            Stmt::ret(Some(int_var("result"))),
        ]);
    let unit = generate(&module_of(function));
    let instrs = all_instrs(function_operation(&unit, "test::pick"));

    let chain = first_chain(&instrs);
    assert_eq!(chain.chain_type(), ChainType::SwitchEnum);
    assert!(chain.has_evaluation_variable());
    let info = chain.enum_optimization().unwrap();
    assert_eq!(info.enum_type(), COLOUR);
    assert_eq!(info.enum_ordinals(), &[0, 1, 2, 3, 4]);
    assert!(info.is_dense());
    assert!(!info.is_exhaustive());
    assert_eq!(info.density_ratio(), 1.0);
    assert!(info.is_jump_table_candidate());

    // two far apart constants without a default
    cases.retain(|case| matches!(&case.matches, SwitchMatch::EnumConstant(c) if c == "RED" || c == "BLUE"));
    let function = FunctionDfn::new("test::sparse", INTEGER)
        .with_param("c", COLOUR)
        .with_body(vec![
            Stmt::declare("result", INTEGER, Some(Expr::integer(-1))),
            switch(cases, None),
            Stmt::ret(Some(int_var("result"))),
        ]);
    let unit = generate(&module_of(function));
    let instrs = all_instrs(function_operation(&unit, "test::sparse"));
    let info = first_chain(&instrs).enum_optimization().unwrap();
    assert_eq!(info.enum_ordinals(), &[0, 4]);
    assert_eq!(info.density_ratio(), 0.4);
    assert!(!info.is_dense());
    assert!(!info.is_exhaustive());
    assert!(!info.is_jump_table_candidate());
}

#[test]
fn test_literal_switch_with_returning_variable() {
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
                returning: Some(ek9ir::typed::Guard {
                    name: "result".into(),
                    ty: INTEGER.into(),
                    init: Expr::integer(0),
                }),
            }),
            Stmt::ret(Some(int_var("result"))),
        ]);
    let unit = generate(&module_of(function));
    let instrs = all_instrs(function_operation(&unit, "test::tens"));

    let chain = first_chain(&instrs);
    assert_eq!(chain.chain_type(), ChainType::Switch);
    assert_eq!(chain.return_variable().map(|r| r.name.as_str()), Some("result"));
    assert!(chain
        .condition_chain()
        .iter()
        .all(|case| case.case_type() == CaseType::Literal));
    // the returning variable belongs to the scope around the switch
    assert!(instrs
        .iter()
        .any(|instr| instr.to_string() == "SCOPE_REGISTER result, _scope_1"));
}

#[test]
fn test_guarded_assignment_chain() {
    let function = FunctionDfn::new("test::default", INTEGER).with_body(vec![
        Stmt::declare("x", INTEGER, None),
        Stmt::guarded_assign("x", Expr::integer(3)),
        Stmt::ret(Some(int_var("x"))),
    ]);
    let unit = generate(&module_of(function));
    let instrs = all_instrs(function_operation(&unit, "test::default"));

    let chains = chains(&instrs);
    let kinds: Vec<ChainType> = chains
        .iter()
        .filter_map(|instr| instr.chain())
        .map(|chain| chain.chain_type())
        .collect();
    // the unset test embeds a question operator
    assert_eq!(kinds, vec![ChainType::GuardedAssignment, ChainType::QuestionOperator]);
    let guarded = chains[0].chain().unwrap();
    assert_eq!(guarded.condition_chain().len(), 1);
    assert!(!guarded.has_default_case());
}

#[test]
fn test_return_exits_every_open_scope() {
    let function = FunctionDfn::new("test::early", INTEGER)
        .with_param("n", INTEGER)
        .with_body(vec![
            if_else(lt(int_var("n"), Expr::integer(10)), vec![Stmt::ret(Some(Expr::integer(1)))], None),
            Stmt::ret(Some(Expr::integer(2))),
        ]);
    let unit = generate(&module_of(function));
    let instrs = all_instrs(function_operation(&unit, "test::early"));

    let body = &first_chain(&instrs).condition_chain()[0];
    let exits: Vec<&str> = body
        .body_evaluation()
        .iter()
        .filter(|instr| instr.opcode() == Opcode::ScopeExit)
        .filter_map(IrInstr::scope_id)
        .collect();
    assert_eq!(exits, vec!["_scope_4", "_scope_2", "_scope_1"]);
    assert_eq!(body.body_evaluation().last().unwrap().opcode(), Opcode::Return);
}

#[test]
#[should_panic(expected = "internal compiler error")]
fn test_assignment_to_parameter() {
    let function = FunctionDfn::new("test::bad", std_types::VOID)
        .with_param("n", INTEGER)
        .with_body(vec![Stmt::assign("n", Expr::integer(1))]);
    generate(&module_of(function));
}

fn try_with_finally(body: Vec<Stmt>) -> FunctionDfn {
    let catch = Catch {
        exception_type: std_types::EXCEPTION.into(),
        variable: "e".into(),
        body: Vec::new(),
    };
    FunctionDfn::new("test::attempt", INTEGER).with_body(vec![
        Stmt::new(StmtKind::Try {
            body,
            catches: vec![catch],
            finally: Some(Vec::new()),
        }),
        Stmt::ret(Some(Expr::integer(0))),
    ])
}

#[test]
fn test_throw_exits_to_try_chain() {
    let raise = Stmt::throw(Expr::construct(std_types::EXCEPTION, Vec::new()));
    let unit = generate(&module_of(try_with_finally(vec![raise])));
    let instrs = all_instrs(function_operation(&unit, "test::attempt"));

    let chain = first_chain(&instrs);
    assert_eq!(chain.chain_type(), ChainType::TryCatchFinally);
    assert!(chain.finally_block().is_some());
    let handler = chain.handler_for(std_types::EXCEPTION, std_types::EXCEPTION).unwrap();
    assert_eq!(handler.body_evaluation()[0].opcode(), Opcode::ScopeEnter);

    // only the try block's own scope closes before the throw
    let block = chain.try_block().unwrap();
    let exits: Vec<&str> = block
        .evaluation
        .iter()
        .filter(|instr| instr.opcode() == Opcode::ScopeExit)
        .filter_map(IrInstr::scope_id)
        .collect();
    assert_eq!(exits, vec![block.scope_id.as_str()]);
    assert_eq!(block.evaluation.last().unwrap().opcode(), Opcode::Throw);
    assert!(block
        .evaluation
        .iter()
        .any(|instr| instr.opcode() == Opcode::AllocObject));
}

#[test]
#[should_panic(expected = "internal compiler error")]
fn test_return_past_finally() {
    generate(&module_of(try_with_finally(vec![Stmt::ret(Some(Expr::integer(1)))])));
}

#[test]
fn test_constructs() {
    let mut module = SourceModule::new("test");
    let describe = FunctionDfn::new("describe", std_types::STRING)
        .with_param("this", "test::Point")
        .with_body(vec![Stmt::ret(Some(Expr::string("point")))]);
    module.constructs.push(ConstructDfn::Class(ClassDfn {
        name: "test::Point".into(),
        kind: ConstructKind::Class,
        fields: vec![
            FieldDfn {
                name: "x".into(),
                ty: INTEGER.into(),
                init: Some(Expr::integer(0)),
            },
            FieldDfn {
                name: "label".into(),
                ty: std_types::STRING.into(),
                init: None,
            },
        ],
        methods: vec![describe],
        token: None,
    }));
    let greet = SymbolInfo::function("test::greet", std_types::VOID);
    module.constructs.push(ConstructDfn::Program(ProgramDfn {
        name: "test::Main".into(),
        body: vec![Stmt::expr(Expr::call(None, greet, Vec::new()))],
        token: None,
    }));
    let unit = generate(&module);

    let point = unit.construct("test::Point").unwrap();
    assert_eq!(point.kind(), ConstructKind::Class);
    assert_eq!(point.fields().len(), 2);
    let init = point.operation(INSTANCE_INIT_OPERATION).unwrap();
    assert!(all_instrs(init)
        .iter()
        .any(|instr| instr.store_parts() == Some(("this.x", "_temp1"))));
    assert!(point.operation("describe").is_some());

    let main = unit
        .construct("test::Main")
        .and_then(|c| c.operation(PROGRAM_OPERATION))
        .unwrap();
    let call = all_instrs(main)
        .into_iter()
        .find(|instr| instr.opcode().is_call())
        .unwrap();
    assert_eq!(call.opcode(), Opcode::CallStatic);
    assert!(call.result().is_none());
    assert_eq!(call.call_details().unwrap().target_object, "test::greet");
}

#[test]
fn test_debug_info() {
    let token = SourceToken::new("test.ek9", 3, 5);
    let function = FunctionDfn::new("test::one", INTEGER)
        .with_body(vec![Stmt::ret(Some(Expr::integer(1))).with_token(token)]);
    let module = module_of(function);

    let config = IrGenConfig { debug_info: true };
    let unit = generate_unit(&module, &StandardTypes::new(), &config);
    let operation = function_operation(&unit, "test::one");
    let ret = all_instrs(operation).into_iter().last().unwrap();
    assert_eq!(ret.to_string(), "RETURN _temp1  // test.ek9:3:5");

    let unit = generate(&module);
    let ret = all_instrs(function_operation(&unit, "test::one"))
        .into_iter()
        .last()
        .unwrap();
    assert_eq!(ret.to_string(), "RETURN _temp1");
}

#[test]
fn test_printer() {
    let function =
        FunctionDfn::new("test::one", INTEGER).with_body(vec![Stmt::ret(Some(Expr::integer(1)))]);
    let unit = generate(&module_of(function));
    let text = render(IrNode::Construct(unit.construct("test::one").unwrap()));

    let expected = format!(
        "ConstructDfn: test::one (function)\n\
         \n\
         OperationDfn: _call()->{ty}\n\
         BasicBlock\n\
         _entry_1:\n\
         SCOPE_ENTER _scope_1\n\
         _temp1 = LOAD_LITERAL 1, {ty}\n\
         RETAIN _temp1\n\
         SCOPE_REGISTER _temp1, _scope_1\n\
         RETAIN _temp1\n\
         SCOPE_EXIT _scope_1\n\
         RETURN _temp1\n",
        ty = INTEGER
    );
    assert_eq!(text, expected);
}
