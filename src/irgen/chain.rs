use crate::ir::{ControlFlowChain, DebugInfo, GuardVariables, IrInstr};

/// Places a finished chain between the SCOPE_ENTER and SCOPE_EXIT of its
/// scope, and guard variables in a scope of their own around that.
pub struct ControlFlowChainGenerator;

impl ControlFlowChainGenerator {
    pub fn apply(
        chain: ControlFlowChain,
        guards: Option<GuardVariables>,
        debug_info: Option<DebugInfo>,
    ) -> Vec<IrInstr> {
        let scope = chain.scope_id().to_string();
        let mut out = Vec::new();

        let guard_scope = guards.map(|guards| {
            out.push(IrInstr::scope_enter(guards.guard_scope_id.as_str()));
            out.extend(guards.guard_scope_setup);
            guards.guard_scope_id
        });

        out.push(IrInstr::scope_enter(scope.as_str()));
        out.push(IrInstr::control_flow_chain(chain).with_debug_info(debug_info));
        out.push(IrInstr::scope_exit(scope));

        if let Some(guard_scope) = guard_scope {
            out.push(IrInstr::scope_exit(guard_scope));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{CaseBody, CaseCondition, ChainType, ConditionCase, Opcode};

    fn chain(scope: &str) -> ControlFlowChain {
        let condition = CaseCondition::new(Vec::new(), Some("_temp1".into()), "_temp2");
        ControlFlowChain::builder(ChainType::IfElse, scope)
            .case(ConditionCase::expression(None, condition, CaseBody::default()))
            .build()
    }

    #[test]
    fn test_guard_scope_encloses_chain_scope() {
        let guards = GuardVariables {
            variables: vec!["x".to_string()],
            guard_scope_setup: vec![IrInstr::reference("x", "org.ek9.lang::Integer")],
            guard_scope_id: "_scope_1".to_string(),
            condition_scope_id: None,
        };
        let out = ControlFlowChainGenerator::apply(chain("_scope_2"), Some(guards), None);
        let rendered: Vec<String> = out
            .iter()
            .filter(|instr| instr.opcode() != Opcode::ControlFlowChain)
            .map(IrInstr::to_string)
            .collect();
        assert_eq!(
            rendered,
            vec![
                "SCOPE_ENTER _scope_1",
                "REFERENCE x, org.ek9.lang::Integer",
                "SCOPE_ENTER _scope_2",
                "SCOPE_EXIT _scope_2",
                "SCOPE_EXIT _scope_1",
            ]
        );
    }

    #[test]
    fn test_without_guards() {
        let out = ControlFlowChainGenerator::apply(chain("_scope_4"), None, None);
        assert_eq!(out.len(), 3);
        assert_eq!(out[1].opcode(), Opcode::ControlFlowChain);
        assert_eq!(out[2].scope_id(), Some("_scope_4"));
    }
}
