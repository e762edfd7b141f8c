use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, trace};

use crate::ir::{
    call::SideEffect,
    construct::Operation,
    instr::{EscapeLevel, EscapeMetaData, IrInstr},
    opcode::Opcode,
    passman::{OperationPass, PassManager, PassParams, PassResult},
};

/// The pass name of escape analysis.
pub const ESCAPE_ANALYSIS: &str = "escape-analysis";

/// Whether objects only handed to pure calls are considered non-escaping.
pub const PURE_CALLS_PARAM: &str = "escape-analysis-pure-calls";

/// Escape analysis.
///
/// Classifies every heap allocation of an operation and moves the ones that
/// never leave their operation to the stack:
///
/// - `ALLOC_OBJECT` becomes `STACK_ALLOC`, `LOAD_LITERAL` becomes
///   `STACK_ALLOC_LITERAL`;
/// - `RETAIN`, `RELEASE` and `SCOPE_REGISTER` of such objects become their
///   `NO_*` markers;
/// - an object that had a field assigned gets `STACK_CLEANUP_REFS` before
///   its scope exits.
///
/// Levels are solved as a fixpoint over flow edges. The result of a pure
/// call may be one of its operands, so the operands escape as far as the
/// result does. A variable read escapes as far as the variable, and a
/// value stored to a variable of its own scope as far as that variable.
///
/// Escape metadata is set exactly once per allocation, so running the pass
/// again changes nothing.
pub struct EscapeAnalysis {
    pure_calls: bool,
    /// Lower bounds set by single instructions.
    floors: FxHashMap<String, EscapeLevel>,
    /// `(from, to)`: `to` escapes at least as far as `from`.
    flows: Vec<(String, String)>,
    /// `(from, to)`: `to` may be the object bound to `from`.
    aliases: Vec<(String, String)>,
    /// Plain `(variable, value)` stores, resolved once every scope is known.
    stores: Vec<(String, String)>,
    /// The scope each object was registered to.
    scopes: FxHashMap<String, String>,
    /// Objects that received a reference in one of their fields.
    field_holders: FxHashSet<String>,
    /// The solved level per name.
    levels: FxHashMap<String, EscapeLevel>,
    /// Allocations moved to the stack in this run.
    stack: FxHashSet<String>,
}

impl Default for EscapeAnalysis {
    fn default() -> Self {
        Self {
            pure_calls: true,
            floors: FxHashMap::default(),
            flows: Vec::new(),
            aliases: Vec::new(),
            stores: Vec::new(),
            scopes: FxHashMap::default(),
            field_holders: FxHashSet::default(),
            levels: FxHashMap::default(),
            stack: FxHashSet::default(),
        }
    }
}

impl EscapeAnalysis {
    /// Register the pass and its parameters.
    pub fn register(passman: &mut PassManager) {
        passman.register(ESCAPE_ANALYSIS, Self::default(), &[]);
        passman.add_parameter(PURE_CALLS_PARAM, true);
    }

    fn reset(&mut self) {
        self.floors.clear();
        self.flows.clear();
        self.aliases.clear();
        self.stores.clear();
        self.scopes.clear();
        self.field_holders.clear();
        self.levels.clear();
        self.stack.clear();
    }

    fn floor(&mut self, name: &str, level: EscapeLevel) {
        let entry = self.floors.entry(name.to_string()).or_insert(level);
        if level > *entry {
            *entry = level;
        }
    }

    fn flow(&mut self, from: &str, to: &str) { self.flows.push((from.to_string(), to.to_string())); }

    fn level_of(&self, name: &str) -> EscapeLevel {
        self.levels
            .get(name)
            .copied()
            .unwrap_or(EscapeLevel::NoEscape)
    }

    fn collect_call(&mut self, instr: &IrInstr) {
        let Some(details) = instr.call_details() else {
            return;
        };
        let metadata = &details.metadata;
        if !metadata.is_pure() || metadata.has_side_effect(SideEffect::Io) {
            for name in instr.used_names() {
                self.floor(name, EscapeLevel::GlobalEscape);
            }
            return;
        }

        let level = if self.pure_calls {
            EscapeLevel::NoEscape
        } else {
            EscapeLevel::ArgEscape
        };
        for name in instr.used_names() {
            self.floor(name, level);
            if let Some(result) = instr.result() {
                self.flow(result, name);
            }
        }
        // a constructor may keep its arguments in the new object
        if details.is_constructor() {
            for arg in &details.arguments {
                self.flow(&details.target_object, arg);
            }
        }
    }

    fn collect(&mut self, instrs: &[IrInstr]) {
        use Opcode as Op;

        for instr in instrs {
            match instr.opcode() {
                Op::Call | Op::CallVirtual | Op::CallStatic | Op::CallDispatcher => self.collect_call(instr),
                Op::Store => {
                    if let Some((target, value)) = instr.store_parts() {
                        match target.split_once('.') {
                            Some((holder, _)) => {
                                self.floor(value, EscapeLevel::GlobalEscape);
                                self.field_holders.insert(holder.to_string());
                            }
                            None => self.stores.push((target.to_string(), value.to_string())),
                        }
                        self.aliases.push((target.to_string(), value.to_string()));
                    }
                }
                Op::Load => {
                    if let (Some(result), Some(source)) = (instr.result(), instr.operands().first()) {
                        if !source.contains('.') {
                            self.flow(result, source);
                            self.aliases.push((result.to_string(), source.clone()));
                        }
                    }
                }
                Op::Return | Op::Throw | Op::Phi => {
                    for name in instr.used_names() {
                        self.floor(name, EscapeLevel::GlobalEscape);
                    }
                }
                Op::ScopeRegister => {
                    if let (Some(object), Some(scope)) = (instr.object(), instr.scope_id()) {
                        self.scopes.insert(object.to_string(), scope.to_string());
                    }
                }
                Op::ControlFlowChain => {
                    if let Some(chain) = instr.chain() {
                        for name in chain.result_sources() {
                            self.floor(name, EscapeLevel::GlobalEscape);
                        }
                    }
                }
                Op::LogicalAndBlock | Op::LogicalOrBlock => {
                    if let Some(operation) = instr.logical_operation() {
                        self.floor(&operation.left_operand, EscapeLevel::GlobalEscape);
                        self.floor(&operation.logical_result, EscapeLevel::GlobalEscape);
                    }
                }
                Op::AllocObject
                | Op::LoadLiteral
                | Op::Reference
                | Op::Retain
                | Op::Release
                | Op::IsNull
                | Op::Label
                | Op::Branch
                | Op::BranchTrue
                | Op::BranchFalse
                | Op::Assert
                | Op::SetupHandler
                | Op::ScopeEnter
                | Op::ScopeExit
                | Op::NoRetain
                | Op::NoRelease
                | Op::NoScopeRegister
                | Op::StackAlloc
                | Op::StackAllocLiteral
                | Op::StackCleanupRefs => {}
            }

            for list in instr.nested_lists() {
                self.collect(list);
            }
        }
    }

    /// Propagate levels and field holders until nothing changes.
    fn solve(&mut self) {
        let stores = std::mem::take(&mut self.stores);
        for (variable, value) in stores {
            let same_scope = matches!(
                (self.scopes.get(&variable), self.scopes.get(&value)),
                (Some(a), Some(b)) if a == b
            );
            if same_scope {
                self.flow(&variable, &value);
            } else {
                self.floor(&value, EscapeLevel::GlobalEscape);
            }
        }

        self.levels = self.floors.clone();
        let mut changed = true;
        while changed {
            changed = false;
            for (from, to) in &self.flows {
                let level = self.levels.get(from).copied().unwrap_or(EscapeLevel::NoEscape);
                let entry = self.levels.entry(to.clone()).or_insert(EscapeLevel::NoEscape);
                if level > *entry {
                    *entry = level;
                    changed = true;
                }
            }
        }

        let mut changed = true;
        while changed {
            changed = false;
            for (from, to) in &self.aliases {
                if self.field_holders.contains(from) && !self.field_holders.contains(to) {
                    self.field_holders.insert(to.clone());
                    changed = true;
                }
            }
        }
    }

    fn rewrite(&mut self, instrs: &mut Vec<IrInstr>) -> bool {
        let mut changed = false;
        let mut idx = 0;

        while idx < instrs.len() {
            let instr = &mut instrs[idx];
            let opcode = instr.opcode();

            match opcode {
                Opcode::AllocObject | Opcode::LoadLiteral if instr.escape_metadata().is_none() => {
                    if let Some(name) = instr.result().map(str::to_string) {
                        let level = self.level_of(&name);
                        let escape = EscapeMetaData::new(level, self.scopes.get(&name).cloned());
                        match opcode.stack_counterpart() {
                            Some(stack_opcode) if escape.is_stack_candidate() => {
                                trace!(object = %name, "moved to the stack");
                                let mut moved = instr.with_opcode(stack_opcode);
                                moved.set_escape_metadata(escape);
                                *instr = moved;
                                self.stack.insert(name);
                            }
                            _ => instr.set_escape_metadata(escape),
                        }
                        changed = true;
                    }
                }
                Opcode::Retain | Opcode::Release | Opcode::ScopeRegister => {
                    let on_stack = instr
                        .object()
                        .map(|object| self.stack.contains(object))
                        .unwrap_or(false);
                    if let (true, Some(marker)) = (on_stack, opcode.stack_counterpart()) {
                        *instr = instr.with_opcode(marker);
                        changed = true;
                    }
                }
                Opcode::ScopeExit => {
                    let scope = instr.scope_id().unwrap_or_default().to_string();
                    let mut cleanups: Vec<&String> = self
                        .stack
                        .iter()
                        .filter(|object| self.field_holders.contains(*object))
                        .filter(|object| self.scopes.get(*object) == Some(&scope))
                        .collect();
                    cleanups.sort();
                    let cleanups: Vec<IrInstr> = cleanups
                        .into_iter()
                        .map(|object| IrInstr::stack_cleanup_refs(object.clone()))
                        .collect();
                    if !cleanups.is_empty() {
                        let count = cleanups.len();
                        instrs.splice(idx..idx, cleanups);
                        idx += count;
                        changed = true;
                    }
                }
                _ => {}
            }

            for list in instrs[idx].nested_lists_mut() {
                changed |= self.rewrite(list);
            }
            idx += 1;
        }
        changed
    }
}

impl OperationPass for EscapeAnalysis {
    fn configure(&mut self, params: &PassParams) {
        self.pure_calls = params.get(PURE_CALLS_PARAM).unwrap_or(self.pure_calls);
    }

    fn transform(&mut self, operation: &mut Operation) -> PassResult<bool> {
        self.reset();

        let body = operation.body();
        for block in body.blocks() {
            self.collect(block.instrs(body));
        }
        self.solve();

        let body = operation.body_mut();
        let blocks: Vec<_> = body.blocks().collect();
        let mut changed = false;
        for block in blocks {
            changed |= self.rewrite(block.instrs_mut(body));
        }

        if changed {
            debug!(
                operation = operation.name(),
                on_stack = self.stack.len(),
                "escape analysis"
            );
        }
        Ok(changed)
    }
}
