mod common;

use common::*;
use ek9ir::{
    ir::{
        exec::{ExecConfig, Interpreter, Value},
        verify::{ScopeVerifier, VerifyError},
        Block,
        Body,
        CallDetails,
        IrInstr,
        Operation,
    },
    typed::std_types,
    utils::cfg::CfgRegion,
};

#[test]
fn test_duplicate_edges() {
    let mut body = Body::new();
    let b = Block::new(&mut body, "b_1");
    let c = Block::new(&mut body, "c_1");

    b.add_successor(&mut body, c);
    b.add_successor(&mut body, c);

    assert_eq!(b.successors(&body), vec![c]);
    assert_eq!(c.predecessors(&body), vec![b]);
}

#[test]
fn test_cfg_info() {
    let mut body = Body::new();
    let entry = Block::new(&mut body, "_entry_1");
    let then = Block::new(&mut body, "then_1");
    let otherwise = Block::new(&mut body, "else_1");
    let end = Block::new(&mut body, "end_1");
    // unreachable
    let dead = Block::new(&mut body, "dead_1");

    entry.add_successor(&mut body, then);
    entry.add_successor(&mut body, otherwise);
    then.add_successor(&mut body, end);
    otherwise.add_successor(&mut body, end);
    dead.add_successor(&mut body, end);

    let cfg = body.cfg_info();
    assert!(cfg.is_reachable(end));
    assert!(!cfg.is_reachable(dead));
    // successors are visited in edge order, so `else_1` finishes last
    assert_eq!(cfg.reverse_postorder(), &[entry, otherwise, then, end]);
    // edges from unreachable blocks are left out
    assert_eq!(cfg.preds(end), Some(&[then, otherwise][..]));
    assert_eq!(cfg.succs(dead), None);
}

/// `flag ? 1 : 2` as a diamond joined by a phi.
fn diamond() -> Operation {
    let mut operation = Operation::new("test::pick", INTEGER).with_parameter("flag", BOOLEAN);
    let body = operation.body_mut();
    let entry = Block::new(body, "_entry_1");
    let then = Block::new(body, "then_1");
    let otherwise = Block::new(body, "else_1");
    let end = Block::new(body, "end_1");

    let truth = CallDetails::new("flag", BOOLEAN, "_true", BOOLEAN);
    entry.extend_instrs(
        body,
        [
            IrInstr::scope_enter("_scope_1"),
            IrInstr::call_method(Some("_temp1".into()), truth),
            IrInstr::branch_true("_temp1", "then_1"),
            IrInstr::branch("else_1"),
        ],
    );
    then.extend_instrs(
        body,
        [
            IrInstr::load_literal("_temp2", "1", INTEGER),
            IrInstr::branch("end_1"),
        ],
    );
    otherwise.extend_instrs(
        body,
        [
            IrInstr::load_literal("_temp3", "2", INTEGER),
            IrInstr::branch("end_1"),
        ],
    );
    end.extend_instrs(
        body,
        [
            IrInstr::phi(
                "_temp4",
                vec![
                    ("_temp2".into(), "then_1".into()),
                    ("_temp3".into(), "else_1".into()),
                ],
            ),
            IrInstr::retain("_temp4"),
            IrInstr::scope_exit("_scope_1"),
            IrInstr::ret(Some("_temp4".into())),
        ],
    );
    entry.add_successor(body, then);
    entry.add_successor(body, otherwise);
    then.add_successor(body, end);
    otherwise.add_successor(body, end);
    operation
}

#[test]
fn test_diamond_with_phi() {
    let operation = diamond();
    ScopeVerifier::new().verify_operation(&operation).unwrap();

    for (flag, expected) in [(true, 1), (false, 2)] {
        let outcome = run(&operation, vec![Value::Boolean(flag)]);
        assert_eq!(outcome.returned, Some(Value::Integer(expected)));
        assert!(outcome.leaks.is_empty(), "leaked {:?}", outcome.leaks);
    }
}

#[test]
fn test_branches_disagree_on_scopes() {
    let mut operation = Operation::new("test::bad", std_types::VOID);
    let body = operation.body_mut();
    let entry = Block::new(body, "_entry_1");
    let left = Block::new(body, "left_1");
    let right = Block::new(body, "right_1");
    let end = Block::new(body, "end_1");

    entry.extend_instrs(body, [IrInstr::scope_enter("_scope_1")]);
    left.extend_instrs(body, [IrInstr::scope_exit("_scope_1")]);
    end.extend_instrs(body, [IrInstr::ret(None)]);
    entry.add_successor(body, left);
    entry.add_successor(body, right);
    left.add_successor(body, end);
    right.add_successor(body, end);

    let err = ScopeVerifier::new()
        .verify_operation(&operation)
        .unwrap_err();
    assert!(matches!(err, VerifyError::InconsistentScopes { .. }));
}

#[test]
fn test_handler_receives_exception() {
    let mut operation = Operation::new("test::catch", std_types::STRING);
    let body = operation.body_mut();
    let entry = Block::new(body, "_entry_1");
    let handler = Block::new(body, "handler_1");

    entry.extend_instrs(
        body,
        [
            IrInstr::setup_handler("handler_1", std_types::EXCEPTION),
            IrInstr::load_literal("_temp1", "\"boom\"", std_types::STRING),
            IrInstr::throw("_temp1"),
        ],
    );
    handler.extend_instrs(body, [IrInstr::ret(Some("_exception".into()))]);

    let outcome = Interpreter::new(ExecConfig::default())
        .run(&operation, Vec::new())
        .unwrap();
    assert_eq!(outcome.returned, Some(Value::String("boom".into())));
    assert_eq!(outcome.thrown, None);
}
