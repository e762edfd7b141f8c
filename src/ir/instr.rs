//! # Instructions
//!
//! [IrInstr] is the single instruction shape of the IR: an opcode, operand
//! references in a fixed per-opcode order, an optional result and optional
//! debug info. Calls, control flow chains and logical blocks carry their
//! structured payload in [InstrKind], dispatched by pattern matching.
//!
//! Operand layouts:
//!
//! | opcode | result | operands |
//! |---|---|---|
//! | `LOAD_LITERAL` | yes | `value, type` |
//! | `ALLOC_OBJECT` | yes | `type` |
//! | `LOAD` | yes | `source` |
//! | `STORE` | | `target, value` |
//! | `REFERENCE` | | `name, type` |
//! | `RETAIN` / `RELEASE` | | `obj` |
//! | `IS_NULL` | yes | `obj` |
//! | `CALL*` | optional | `target.method(args..)` |
//! | `LABEL` / `BRANCH` | | `label` |
//! | `BRANCH_TRUE` / `BRANCH_FALSE` | | `cond, label` |
//! | `ASSERT` | | `cond` |
//! | `RETURN` | | `value?` |
//! | `THROW` | | `value` |
//! | `SETUP_HANDLER` | | `label, exception_type` |
//! | `SCOPE_ENTER` / `SCOPE_EXIT` | | `scope` |
//! | `SCOPE_REGISTER` | | `obj, scope` |
//! | `PHI` | yes | `value1, label1, value2, label2, ..` |
//! | `CONTROL_FLOW_CHAIN` | optional | `chain_type, scope, eval?, return?` |
//! | `LOGICAL_*_BLOCK` | yes | `left, condition, right, logical_result, scope` |
//!
//! Optimization markers keep the operands of the instruction they replace.

use std::{
    fmt,
    hash::{Hash, Hasher},
};

use super::{
    call::CallDetails,
    chain::ControlFlowChain,
    debug_info::DebugInfo,
    opcode::Opcode,
};
use crate::ice;

/// How far an allocated object may travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EscapeLevel {
    /// Confined to the scope it was registered in.
    NoEscape,
    /// Passed to a callee that neither stores nor publishes it.
    ArgEscape,
    /// Reachable after the allocating scope exits.
    GlobalEscape,
}

impl fmt::Display for EscapeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EscapeLevel::NoEscape => write!(f, "NONE"),
            EscapeLevel::ArgEscape => write!(f, "ARG"),
            EscapeLevel::GlobalEscape => write!(f, "GLOBAL"),
        }
    }
}

/// Escape facts attached by the optimizer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EscapeMetaData {
    pub level: EscapeLevel,
    /// The scope the object's lifetime is bound to, if known.
    pub lifetime_scope: Option<String>,
}

impl EscapeMetaData {
    pub fn new(level: EscapeLevel, lifetime_scope: Option<String>) -> Self {
        Self {
            level,
            lifetime_scope,
        }
    }

    pub fn is_stack_candidate(&self) -> bool { self.level == EscapeLevel::NoEscape }
}

impl fmt::Display for EscapeMetaData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "escape={}", self.level)?;
        if let Some(scope) = &self.lifetime_scope {
            write!(f, ", lifetime={}", scope)?;
        }
        Ok(())
    }
}

/// The short-circuiting logical operator of a logical block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalOp {
    And,
    Or,
}

/// The nested evaluation of `left and right` / `left or right`.
///
/// `condition` is the primitive truth of `left`. When it decides the outcome
/// the right side is never evaluated and the block yields `left_operand`,
/// otherwise `right_evaluation` and `result_computation` run and the block
/// yields `logical_result`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LogicalOperation {
    pub op: LogicalOp,
    pub left_evaluation: Vec<IrInstr>,
    pub left_operand: String,
    pub condition: String,
    pub right_evaluation: Vec<IrInstr>,
    pub right_operand: String,
    pub result_computation: Vec<IrInstr>,
    pub logical_result: String,
    pub scope_id: String,
}

/// The payload of an instruction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InstrKind {
    /// Everything is in the operands.
    Plain,
    Call(Box<CallDetails>),
    ControlFlowChain(Box<ControlFlowChain>),
    Logical(Box<LogicalOperation>),
}

/// An IR instruction.
///
/// Instructions are values: equality and hashing only look at the opcode,
/// the result and the operands.
#[derive(Debug, Clone)]
pub struct IrInstr {
    opcode: Opcode,
    operands: Vec<String>,
    result: Option<String>,
    debug_info: Option<DebugInfo>,
    escape: Option<EscapeMetaData>,
    kind: InstrKind,
}

impl PartialEq for IrInstr {
    fn eq(&self, other: &Self) -> bool {
        self.opcode == other.opcode
            && self.result == other.result
            && self.operands == other.operands
    }
}

impl Eq for IrInstr {}

impl Hash for IrInstr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.opcode.hash(state);
        self.result.hash(state);
        self.operands.hash(state);
    }
}

fn checked(what: &str, name: impl Into<String>) -> String {
    let name = name.into();
    if name.is_empty() {
        ice!("{} cannot be empty", what);
    }
    name
}

impl IrInstr {
    pub fn new(opcode: Opcode, result: Option<String>) -> Self {
        if let Some(result) = &result {
            if result.is_empty() {
                ice!("{} result name cannot be empty", opcode);
            }
        }
        Self {
            opcode,
            operands: Vec::new(),
            result,
            debug_info: None,
            escape: None,
            kind: InstrKind::Plain,
        }
    }

    fn with(opcode: Opcode, result: Option<String>, operands: Vec<String>) -> Self {
        let mut instr = Self::new(opcode, result);
        instr.operands = operands;
        instr
    }

    /// Append an operand. Operands can never be removed or reordered.
    pub fn add_operand(&mut self, operand: impl Into<String>) {
        self.operands.push(operand.into());
    }

    pub fn with_debug_info(mut self, debug_info: Option<DebugInfo>) -> Self {
        self.debug_info = debug_info;
        self
    }

    pub fn opcode(&self) -> Opcode { self.opcode }

    pub fn operands(&self) -> &[String] { &self.operands }

    pub fn result(&self) -> Option<&str> { self.result.as_deref() }

    pub fn has_result(&self) -> bool { self.result.is_some() }

    pub fn debug_info(&self) -> Option<&DebugInfo> { self.debug_info.as_ref() }

    pub fn escape_metadata(&self) -> Option<&EscapeMetaData> { self.escape.as_ref() }

    pub fn kind(&self) -> &InstrKind { &self.kind }

    /// Record the escape facts of this instruction.
    ///
    /// # Panics
    ///
    /// Panics if escape metadata has already been set.
    pub fn set_escape_metadata(&mut self, escape: EscapeMetaData) {
        if self.escape.is_some() {
            ice!("escape metadata of `{}` is already set", self);
        }
        self.escape = Some(escape);
    }

    /// Produce the same instruction under another opcode, keeping operands,
    /// result, debug info and escape metadata.
    pub fn with_opcode(&self, opcode: Opcode) -> Self {
        Self {
            opcode,
            ..self.clone()
        }
    }

    // -- memory ---------------------------------------------------------

    pub fn alloc_object(result: impl Into<String>, ty: impl Into<String>) -> Self {
        Self::with(
            Opcode::AllocObject,
            Some(checked("allocation result", result)),
            vec![checked("allocated type", ty)],
        )
    }

    pub fn load(result: impl Into<String>, source: impl Into<String>) -> Self {
        Self::with(
            Opcode::Load,
            Some(checked("load result", result)),
            vec![checked("load source", source)],
        )
    }

    pub fn store(target: impl Into<String>, value: impl Into<String>) -> Self {
        Self::with(
            Opcode::Store,
            None,
            vec![checked("store target", target), checked("stored value", value)],
        )
    }

    pub fn reference(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self::with(
            Opcode::Reference,
            None,
            vec![checked("variable name", name), checked("variable type", ty)],
        )
    }

    pub fn retain(object: impl Into<String>) -> Self {
        Self::with(Opcode::Retain, None, vec![checked("retained object", object)])
    }

    pub fn release(object: impl Into<String>) -> Self {
        Self::with(Opcode::Release, None, vec![checked("released object", object)])
    }

    pub fn is_null(result: impl Into<String>, object: impl Into<String>) -> Self {
        Self::with(
            Opcode::IsNull,
            Some(checked("null check result", result)),
            vec![checked("null checked object", object)],
        )
    }

    pub fn load_literal(
        result: impl Into<String>,
        value: impl Into<String>,
        ty: impl Into<String>,
    ) -> Self {
        Self::with(
            Opcode::LoadLiteral,
            Some(checked("literal result", result)),
            vec![value.into(), checked("literal type", ty)],
        )
    }

    // -- calls ----------------------------------------------------------

    /// A call instruction. `result` is `None` for calls whose value is
    /// discarded.
    ///
    /// # Panics
    ///
    /// Panics if `opcode` is not a call opcode.
    pub fn call(opcode: Opcode, result: Option<String>, details: CallDetails) -> Self {
        if !opcode.is_call() {
            ice!("{} is not a call opcode", opcode);
        }
        let mut instr = Self::with(opcode, result, vec![details.operand()]);
        instr.kind = InstrKind::Call(Box::new(details));
        instr
    }

    pub fn call_method(result: Option<String>, details: CallDetails) -> Self {
        Self::call(Opcode::Call, result, details)
    }

    pub fn call_static(result: Option<String>, details: CallDetails) -> Self {
        Self::call(Opcode::CallStatic, result, details)
    }

    // -- branches -------------------------------------------------------

    pub fn label(label: impl Into<String>) -> Self {
        Self::with(Opcode::Label, None, vec![checked("label", label)])
    }

    pub fn branch(label: impl Into<String>) -> Self {
        Self::with(Opcode::Branch, None, vec![checked("branch target", label)])
    }

    pub fn branch_true(condition: impl Into<String>, label: impl Into<String>) -> Self {
        Self::with(
            Opcode::BranchTrue,
            None,
            vec![checked("branch condition", condition), checked("branch target", label)],
        )
    }

    pub fn branch_false(condition: impl Into<String>, label: impl Into<String>) -> Self {
        Self::with(
            Opcode::BranchFalse,
            None,
            vec![checked("branch condition", condition), checked("branch target", label)],
        )
    }

    pub fn assert(condition: impl Into<String>) -> Self {
        Self::with(Opcode::Assert, None, vec![checked("assert condition", condition)])
    }

    pub fn ret(value: Option<String>) -> Self {
        Self::with(Opcode::Return, None, value.into_iter().collect())
    }

    pub fn throw(value: impl Into<String>) -> Self {
        Self::with(Opcode::Throw, None, vec![checked("thrown value", value)])
    }

    pub fn setup_handler(label: impl Into<String>, exception_type: impl Into<String>) -> Self {
        Self::with(
            Opcode::SetupHandler,
            None,
            vec![checked("handler label", label), checked("exception type", exception_type)],
        )
    }

    // -- scopes ---------------------------------------------------------

    pub fn scope_enter(scope: impl Into<String>) -> Self {
        Self::with(Opcode::ScopeEnter, None, vec![checked("scope id", scope)])
    }

    pub fn scope_exit(scope: impl Into<String>) -> Self {
        Self::with(Opcode::ScopeExit, None, vec![checked("scope id", scope)])
    }

    pub fn scope_register(object: impl Into<String>, scope: impl Into<String>) -> Self {
        Self::with(
            Opcode::ScopeRegister,
            None,
            vec![checked("registered object", object), checked("scope id", scope)],
        )
    }

    pub fn stack_cleanup_refs(object: impl Into<String>) -> Self {
        Self::with(
            Opcode::StackCleanupRefs,
            None,
            vec![checked("stack object", object)],
        )
    }

    // -- ssa ------------------------------------------------------------

    /// # Panics
    ///
    /// Panics if there are no incoming values.
    pub fn phi(result: impl Into<String>, incoming: Vec<(String, String)>) -> Self {
        if incoming.is_empty() {
            ice!("phi without incoming values");
        }
        let operands = incoming
            .into_iter()
            .flat_map(|(value, label)| [value, label])
            .collect();
        Self::with(Opcode::Phi, Some(checked("phi result", result)), operands)
    }

    // -- structured -----------------------------------------------------

    /// Wrap a control flow chain. The operands summarize the chain:
    /// chain type, scope and the evaluation and return variables if any.
    pub fn control_flow_chain(chain: ControlFlowChain) -> Self {
        let result = chain.result().map(str::to_string);
        let mut operands = vec![chain.chain_type().to_string(), chain.scope_id().to_string()];
        if let Some(eval) = chain.evaluation_variable() {
            operands.push(eval.name.clone());
        }
        if let Some(ret) = chain.return_variable() {
            operands.push(ret.name.clone());
        }
        let mut instr = Self::with(Opcode::ControlFlowChain, result, operands);
        instr.kind = InstrKind::ControlFlowChain(Box::new(chain));
        instr
    }

    pub fn logical(result: impl Into<String>, operation: LogicalOperation) -> Self {
        let opcode = match operation.op {
            LogicalOp::And => Opcode::LogicalAndBlock,
            LogicalOp::Or => Opcode::LogicalOrBlock,
        };
        let operands = vec![
            checked("left operand", operation.left_operand.clone()),
            checked("left condition", operation.condition.clone()),
            checked("right operand", operation.right_operand.clone()),
            checked("logical result", operation.logical_result.clone()),
            checked("scope id", operation.scope_id.clone()),
        ];
        let mut instr = Self::with(opcode, Some(checked("logical block result", result)), operands);
        instr.kind = InstrKind::Logical(Box::new(operation));
        instr
    }

    // -- shape accessors ------------------------------------------------

    pub fn target_label(&self) -> Option<&str> {
        match self.opcode {
            Opcode::Branch | Opcode::SetupHandler | Opcode::Label => self.operand(0),
            Opcode::BranchTrue | Opcode::BranchFalse => self.operand(1),
            _ => None,
        }
    }

    pub fn condition(&self) -> Option<&str> {
        match self.opcode {
            Opcode::BranchTrue | Opcode::BranchFalse | Opcode::Assert => self.operand(0),
            _ => None,
        }
    }

    pub fn return_value(&self) -> Option<&str> {
        match self.opcode {
            Opcode::Return => self.operand(0),
            _ => None,
        }
    }

    pub fn thrown_value(&self) -> Option<&str> {
        match self.opcode {
            Opcode::Throw => self.operand(0),
            _ => None,
        }
    }

    pub fn scope_id(&self) -> Option<&str> {
        match self.opcode {
            Opcode::ScopeEnter | Opcode::ScopeExit => self.operand(0),
            Opcode::ScopeRegister | Opcode::NoScopeRegister | Opcode::ControlFlowChain => {
                self.operand(1)
            }
            Opcode::LogicalAndBlock | Opcode::LogicalOrBlock => self.operand(4),
            _ => None,
        }
    }

    /// The object a memory management instruction acts on.
    pub fn object(&self) -> Option<&str> {
        match self.opcode {
            Opcode::Retain
            | Opcode::Release
            | Opcode::NoRetain
            | Opcode::NoRelease
            | Opcode::ScopeRegister
            | Opcode::NoScopeRegister
            | Opcode::IsNull
            | Opcode::StackCleanupRefs => self.operand(0),
            _ => None,
        }
    }

    /// `(value, type)` of a literal load.
    pub fn literal(&self) -> Option<(&str, &str)> {
        match self.opcode {
            Opcode::LoadLiteral | Opcode::StackAllocLiteral => {
                Some((self.operand(0)?, self.operand(1)?))
            }
            _ => None,
        }
    }

    /// The type an instruction allocates or declares.
    pub fn type_operand(&self) -> Option<&str> {
        match self.opcode {
            Opcode::AllocObject | Opcode::StackAlloc => self.operand(0),
            Opcode::LoadLiteral | Opcode::StackAllocLiteral | Opcode::Reference => self.operand(1),
            _ => None,
        }
    }

    /// `(target, value)` of a store.
    pub fn store_parts(&self) -> Option<(&str, &str)> {
        match self.opcode {
            Opcode::Store => Some((self.operand(0)?, self.operand(1)?)),
            _ => None,
        }
    }

    /// `(value, label)` pairs of a phi.
    pub fn phi_incoming(&self) -> Option<Vec<(&str, &str)>> {
        match self.opcode {
            Opcode::Phi => Some(
                self.operands
                    .chunks(2)
                    .filter_map(|pair| match pair {
                        [value, label] => Some((value.as_str(), label.as_str())),
                        _ => None,
                    })
                    .collect(),
            ),
            _ => None,
        }
    }

    pub fn call_details(&self) -> Option<&CallDetails> {
        match &self.kind {
            InstrKind::Call(details) => Some(details),
            _ => None,
        }
    }

    pub fn chain(&self) -> Option<&ControlFlowChain> {
        match &self.kind {
            InstrKind::ControlFlowChain(chain) => Some(chain),
            _ => None,
        }
    }

    pub fn logical_operation(&self) -> Option<&LogicalOperation> {
        match &self.kind {
            InstrKind::Logical(operation) => Some(operation),
            _ => None,
        }
    }

    /// The instruction lists nested in a chain or logical block.
    pub fn nested_lists(&self) -> Vec<&[IrInstr]> {
        match &self.kind {
            InstrKind::ControlFlowChain(chain) => chain.nested_lists(),
            InstrKind::Logical(operation) => vec![
                &operation.left_evaluation,
                &operation.right_evaluation,
                &operation.result_computation,
            ],
            InstrKind::Plain | InstrKind::Call(_) => Vec::new(),
        }
    }

    pub(crate) fn nested_lists_mut(&mut self) -> Vec<&mut Vec<IrInstr>> {
        match &mut self.kind {
            InstrKind::ControlFlowChain(chain) => chain.nested_lists_mut(),
            InstrKind::Logical(operation) => vec![
                &mut operation.left_evaluation,
                &mut operation.right_evaluation,
                &mut operation.result_computation,
            ],
            InstrKind::Plain | InstrKind::Call(_) => Vec::new(),
        }
    }

    /// The names this instruction reads, not counting nested instructions.
    pub fn used_names(&self) -> Vec<&str> {
        use Opcode as Op;

        match self.opcode {
            Op::Call | Op::CallVirtual | Op::CallStatic | Op::CallDispatcher => self
                .call_details()
                .map(|details| {
                    let mut names: Vec<&str> = vec![details.target_object.as_str()];
                    names.extend(details.arguments.iter().map(String::as_str));
                    names
                })
                .unwrap_or_default(),
            Op::Store => self.operands.get(1).map(String::as_str).into_iter().collect(),
            Op::Phi => self
                .phi_incoming()
                .unwrap_or_default()
                .into_iter()
                .map(|(value, _)| value)
                .collect(),
            Op::Load
            | Op::Retain
            | Op::Release
            | Op::IsNull
            | Op::ScopeRegister
            | Op::Return
            | Op::Throw
            | Op::NoRetain
            | Op::NoRelease
            | Op::NoScopeRegister
            | Op::StackCleanupRefs => self.operand(0).into_iter().collect(),
            Op::BranchTrue | Op::BranchFalse | Op::Assert => self.condition().into_iter().collect(),
            Op::ControlFlowChain => self
                .chain()
                .and_then(|chain| chain.evaluation_variable())
                .map(|eval| eval.name.as_str())
                .into_iter()
                .collect(),
            Op::LogicalAndBlock | Op::LogicalOrBlock => Vec::new(),
            Op::AllocObject
            | Op::Reference
            | Op::LoadLiteral
            | Op::Label
            | Op::Branch
            | Op::SetupHandler
            | Op::ScopeEnter
            | Op::ScopeExit
            | Op::StackAlloc
            | Op::StackAllocLiteral => Vec::new(),
        }
    }

    fn operand(&self, index: usize) -> Option<&str> { self.operands.get(index).map(String::as_str) }
}

impl fmt::Display for IrInstr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let InstrKind::ControlFlowChain(chain) = &self.kind {
            return write!(f, "{}", chain.display(self.debug_info.as_ref()));
        }
        if let Some(result) = &self.result {
            write!(f, "{} = ", result)?;
        }
        write!(f, "{}", self.opcode)?;
        if !self.operands.is_empty() {
            write!(f, " {}", self.operands.join(", "))?;
        }
        if let Some(debug_info) = self.debug_info.as_ref().filter(|d| d.is_valid_location()) {
            write!(f, "  {}", debug_info)?;
        }
        if let InstrKind::Logical(operation) = &self.kind {
            write!(f, "{}", DisplayLogical(operation))?;
        }
        Ok(())
    }
}

/// Renders a nested instruction list as `[ .. ]`, one instruction per line.
pub(crate) struct DisplayInstrs<'a>(pub &'a [IrInstr]);

impl fmt::Display for DisplayInstrs<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[")?;
        if self.0.is_empty() {
            writeln!(f, "no instructions")?;
        }
        for instr in self.0 {
            let text = instr.to_string();
            write!(f, "{}", text)?;
            if !text.ends_with('\n') {
                writeln!(f)?;
            }
        }
        writeln!(f, "]")
    }
}

struct DisplayLogical<'a>(&'a LogicalOperation);

impl fmt::Display for DisplayLogical<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = self.0;
        writeln!(f)?;
        writeln!(f, "[")?;
        write!(f, "left_evaluation:\n{}", DisplayInstrs(&op.left_evaluation))?;
        writeln!(f, "left_operand: {}", op.left_operand)?;
        writeln!(f, "left_condition: {}", op.condition)?;
        write!(f, "right_evaluation:\n{}", DisplayInstrs(&op.right_evaluation))?;
        writeln!(f, "right_operand: {}", op.right_operand)?;
        write!(f, "result_computation:\n{}", DisplayInstrs(&op.result_computation))?;
        writeln!(f, "logical_result: {}", op.logical_result)?;
        writeln!(f, "scope_id: {}", op.scope_id)?;
        write!(f, "]")
    }
}
