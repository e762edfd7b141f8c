//! Scope discipline checks.
//!
//! The instruction model only records scope events; nesting is owed by IR
//! construction. [ScopeVerifier] checks it after the fact: scopes close in
//! stack order, no scope is entered twice in one body, registrations name an
//! open scope, and nothing leaves the operation with a scope still open.
//! Inside a try chain a THROW only leaves the scopes opened within the
//! chain; the handler takes over from there.

use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;
use tracing::warn;

use super::{
    block::{Block, Body},
    construct::{CompilationUnit, Operation},
    instr::{InstrKind, IrInstr},
    opcode::Opcode,
};
use crate::utils::cfg::CfgRegion;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VerifyError {
    #[error("{operation}: scope `{scope}` entered more than once")]
    ScopeReentered { operation: String, scope: String },

    #[error("{operation}: exit of `{found}` while `{expected}` is innermost")]
    UnbalancedExit {
        operation: String,
        expected: String,
        found: String,
    },

    #[error("{operation}: exit of `{scope}` with no open scope")]
    ExitWithoutEnter { operation: String, scope: String },

    #[error("{operation}: `{object}` registered to `{scope}`, which is not open")]
    RegisterOutsideScope {
        operation: String,
        object: String,
        scope: String,
    },

    #[error("{operation}: {opcode} does not leave exactly the scopes it crosses: {scopes:?}")]
    ScopesOpenAtDeparture {
        operation: String,
        opcode: Opcode,
        scopes: Vec<String>,
    },

    #[error("{operation}: block `{block}` ends with scopes open: {scopes:?}")]
    ScopesOpenAtEnd {
        operation: String,
        block: String,
        scopes: Vec<String>,
    },

    #[error("{operation}: block `{block}` is reached with different open scopes")]
    InconsistentScopes { operation: String, block: String },

    #[error("{operation}: nested {context} does not close the scopes it opens")]
    UnbalancedNested { operation: String, context: String },

    #[error("{operation}: `{instr}` is not backed by a non-escaping allocation")]
    UnprovenStackAllocation { operation: String, instr: String },
}

pub type VerifyResult<T> = Result<T, VerifyError>;

enum Flow {
    /// The list ran to its end.
    FallThrough,
    /// A RETURN or THROW left the list.
    Departed,
}

/// Checks scope discipline per operation.
#[derive(Default)]
pub struct ScopeVerifier {
    operation: String,
    entered: FxHashSet<String>,
    /// Open scope counts at the enclosing try chains.
    handler_depths: Vec<usize>,
}

impl ScopeVerifier {
    pub fn new() -> Self { Self::default() }

    pub fn verify_unit(&mut self, unit: &CompilationUnit) -> VerifyResult<()> {
        for operation in unit.operations() {
            self.verify_operation(operation)?;
        }
        Ok(())
    }

    pub fn verify_operation(&mut self, operation: &Operation) -> VerifyResult<()> {
        self.operation = operation.name().to_string();
        self.entered.clear();
        self.handler_depths.clear();

        let result = self.verify_body(operation.body());
        if let Err(err) = &result {
            warn!(%err, "scope verification failed");
        }
        result
    }

    fn verify_body(&mut self, body: &Body) -> VerifyResult<()> {
        let cfg = body.cfg_info();
        let mut entry_stacks: FxHashMap<Block, Vec<String>> = FxHashMap::default();
        if let Some(entry) = body.entry() {
            entry_stacks.insert(entry, Vec::new());
        }

        for &block in cfg.reverse_postorder() {
            // blocks only reached through a back edge start where the first
            // visit left off
            let mut stack = entry_stacks.get(&block).cloned().unwrap_or_default();

            match self.verify_list(block.instrs(body), &mut stack)? {
                Flow::Departed => continue,
                Flow::FallThrough => {}
            }

            let succs = cfg.succs(block).unwrap_or_default();
            if succs.is_empty() && !stack.is_empty() {
                return Err(VerifyError::ScopesOpenAtEnd {
                    operation: self.operation.clone(),
                    block: block.label(body).to_string(),
                    scopes: stack,
                });
            }
            for succ in succs {
                match entry_stacks.get(succ) {
                    Some(existing) if *existing != stack => {
                        return Err(VerifyError::InconsistentScopes {
                            operation: self.operation.clone(),
                            block: succ.label(body).to_string(),
                        });
                    }
                    Some(_) => {}
                    None => {
                        entry_stacks.insert(*succ, stack.clone());
                    }
                }
            }
        }
        Ok(())
    }

    fn verify_list(&mut self, instrs: &[IrInstr], stack: &mut Vec<String>) -> VerifyResult<Flow> {
        for instr in instrs {
            match instr.opcode() {
                Opcode::ScopeEnter => {
                    let scope = instr.scope_id().unwrap_or_default().to_string();
                    if !self.entered.insert(scope.clone()) {
                        return Err(VerifyError::ScopeReentered {
                            operation: self.operation.clone(),
                            scope,
                        });
                    }
                    stack.push(scope);
                }
                Opcode::ScopeExit => {
                    let scope = instr.scope_id().unwrap_or_default();
                    match stack.last() {
                        Some(top) if top == scope => {
                            stack.pop();
                        }
                        Some(top) => {
                            return Err(VerifyError::UnbalancedExit {
                                operation: self.operation.clone(),
                                expected: top.clone(),
                                found: scope.to_string(),
                            });
                        }
                        None => {
                            return Err(VerifyError::ExitWithoutEnter {
                                operation: self.operation.clone(),
                                scope: scope.to_string(),
                            });
                        }
                    }
                }
                Opcode::ScopeRegister | Opcode::NoScopeRegister => {
                    let scope = instr.scope_id().unwrap_or_default();
                    if !stack.iter().any(|s| s == scope) {
                        return Err(VerifyError::RegisterOutsideScope {
                            operation: self.operation.clone(),
                            object: instr.object().unwrap_or_default().to_string(),
                            scope: scope.to_string(),
                        });
                    }
                }
                Opcode::Return | Opcode::Throw => {
                    let boundary = match instr.opcode() {
                        Opcode::Throw => self.handler_depths.last().copied().unwrap_or(0),
                        _ => 0,
                    };
                    if stack.len() != boundary {
                        return Err(VerifyError::ScopesOpenAtDeparture {
                            operation: self.operation.clone(),
                            opcode: instr.opcode(),
                            scopes: stack.clone(),
                        });
                    }
                    return Ok(Flow::Departed);
                }
                Opcode::StackAlloc | Opcode::StackAllocLiteral => {
                    let proven = instr
                        .escape_metadata()
                        .map(|escape| escape.is_stack_candidate())
                        .unwrap_or(false);
                    if !proven {
                        return Err(VerifyError::UnprovenStackAllocation {
                            operation: self.operation.clone(),
                            instr: instr.to_string(),
                        });
                    }
                }
                _ => {}
            }

            match instr.kind() {
                InstrKind::ControlFlowChain(chain) => {
                    let handles = chain.try_block().is_some();
                    if handles {
                        self.handler_depths.push(stack.len());
                    }
                    for list in chain.nested_lists() {
                        self.verify_nested(list, stack, chain.chain_type().name())?;
                    }
                    if handles {
                        self.handler_depths.pop();
                    }
                }
                InstrKind::Logical(operation) => {
                    for list in [
                        &operation.left_evaluation,
                        &operation.right_evaluation,
                        &operation.result_computation,
                    ] {
                        self.verify_nested(list, stack, "logical block")?;
                    }
                }
                InstrKind::Plain | InstrKind::Call(_) => {}
            }
        }
        Ok(Flow::FallThrough)
    }

    /// A nested list runs with the enclosing scopes open and must leave them
    /// as it found them, unless it departs the operation.
    fn verify_nested(&mut self, list: &[IrInstr], stack: &[String], context: &str) -> VerifyResult<()> {
        let mut nested = stack.to_vec();
        match self.verify_list(list, &mut nested)? {
            Flow::Departed => Ok(()),
            Flow::FallThrough if nested == stack => Ok(()),
            Flow::FallThrough => Err(VerifyError::UnbalancedNested {
                operation: self.operation.clone(),
                context: context.to_string(),
            }),
        }
    }
}
