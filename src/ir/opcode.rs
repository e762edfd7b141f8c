use core::fmt;

/// The group an [Opcode] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpcodeGroup {
    /// Allocation, loads, stores and reference counting.
    Memory,
    /// Loading a literal value.
    Literal,
    /// Method, function, static and dispatcher calls.
    Call,
    /// Labels, branches, returns and exception flow.
    Branch,
    /// Lexical memory-management regions.
    Scope,
    /// SSA merge.
    Phi,
    /// The structured constructs that carry nested instruction lists.
    Structured,
    /// Emitted only by the optimizer.
    OptimizationMarker,
}

/// The closed set of IR opcodes.
///
/// There are no primitive arithmetic opcodes: every operator is lowered to a
/// call of the operator's method on its operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Opcode {
    // memory
    /// `result = ALLOC_OBJECT type`, heap allocation of a new object.
    AllocObject,
    /// `result = LOAD source`.
    Load,
    /// `STORE target, value`.
    Store,
    /// `REFERENCE name, type`, declares a variable slot.
    Reference,
    /// `RETAIN obj`.
    Retain,
    /// `RELEASE obj`.
    Release,
    /// `result = IS_NULL obj`, yields a primitive boolean.
    IsNull,

    // literal
    /// `result = LOAD_LITERAL value, type`.
    LoadLiteral,

    // calls
    Call,
    CallVirtual,
    CallStatic,
    CallDispatcher,

    // branches
    Label,
    Branch,
    BranchTrue,
    BranchFalse,
    Assert,
    Return,
    Throw,
    SetupHandler,

    // scopes
    ScopeEnter,
    ScopeExit,
    ScopeRegister,

    // ssa
    Phi,

    // structured
    ControlFlowChain,
    LogicalAndBlock,
    LogicalOrBlock,

    // optimization markers
    NoRetain,
    NoRelease,
    NoScopeRegister,
    StackAlloc,
    StackAllocLiteral,
    StackCleanupRefs,
}

impl Opcode {
    /// Every opcode, in declaration order.
    pub const ALL: [Opcode; 33] = [
        Opcode::AllocObject,
        Opcode::Load,
        Opcode::Store,
        Opcode::Reference,
        Opcode::Retain,
        Opcode::Release,
        Opcode::IsNull,
        Opcode::LoadLiteral,
        Opcode::Call,
        Opcode::CallVirtual,
        Opcode::CallStatic,
        Opcode::CallDispatcher,
        Opcode::Label,
        Opcode::Branch,
        Opcode::BranchTrue,
        Opcode::BranchFalse,
        Opcode::Assert,
        Opcode::Return,
        Opcode::Throw,
        Opcode::SetupHandler,
        Opcode::ScopeEnter,
        Opcode::ScopeExit,
        Opcode::ScopeRegister,
        Opcode::Phi,
        Opcode::ControlFlowChain,
        Opcode::LogicalAndBlock,
        Opcode::LogicalOrBlock,
        Opcode::NoRetain,
        Opcode::NoRelease,
        Opcode::NoScopeRegister,
        Opcode::StackAlloc,
        Opcode::StackAllocLiteral,
        Opcode::StackCleanupRefs,
    ];

    pub fn group(self) -> OpcodeGroup {
        use Opcode as Op;

        match self {
            Op::AllocObject
            | Op::Load
            | Op::Store
            | Op::Reference
            | Op::Retain
            | Op::Release
            | Op::IsNull => OpcodeGroup::Memory,
            Op::LoadLiteral => OpcodeGroup::Literal,
            Op::Call | Op::CallVirtual | Op::CallStatic | Op::CallDispatcher => OpcodeGroup::Call,
            Op::Label
            | Op::Branch
            | Op::BranchTrue
            | Op::BranchFalse
            | Op::Assert
            | Op::Return
            | Op::Throw
            | Op::SetupHandler => OpcodeGroup::Branch,
            Op::ScopeEnter | Op::ScopeExit | Op::ScopeRegister => OpcodeGroup::Scope,
            Op::Phi => OpcodeGroup::Phi,
            Op::ControlFlowChain | Op::LogicalAndBlock | Op::LogicalOrBlock => {
                OpcodeGroup::Structured
            }
            Op::NoRetain
            | Op::NoRelease
            | Op::NoScopeRegister
            | Op::StackAlloc
            | Op::StackAllocLiteral
            | Op::StackCleanupRefs => OpcodeGroup::OptimizationMarker,
        }
    }

    /// Jumps: `BRANCH`, `BRANCH_TRUE` and `BRANCH_FALSE`.
    pub fn is_branch(self) -> bool {
        matches!(self, Opcode::Branch | Opcode::BranchTrue | Opcode::BranchFalse)
    }

    pub fn is_conditional_branch(self) -> bool {
        matches!(self, Opcode::BranchTrue | Opcode::BranchFalse)
    }

    pub fn is_call(self) -> bool { self.group() == OpcodeGroup::Call }

    pub fn is_scope(self) -> bool { self.group() == OpcodeGroup::Scope }

    /// Whether the opcode may only be produced by the optimizer.
    pub fn is_optimization_marker(self) -> bool {
        self.group() == OpcodeGroup::OptimizationMarker
    }

    /// Opcodes that leave the operation body, and thus every scope open at
    /// that point.
    pub fn departs_operation(self) -> bool { matches!(self, Opcode::Return | Opcode::Throw) }

    /// Opcodes that produce a fresh object a later scope exit must release.
    pub fn is_heap_allocation(self) -> bool {
        matches!(self, Opcode::AllocObject | Opcode::LoadLiteral)
    }

    /// The stack counterpart of a heap allocation opcode.
    pub fn stack_counterpart(self) -> Option<Opcode> {
        match self {
            Opcode::AllocObject => Some(Opcode::StackAlloc),
            Opcode::LoadLiteral => Some(Opcode::StackAllocLiteral),
            Opcode::Retain => Some(Opcode::NoRetain),
            Opcode::Release => Some(Opcode::NoRelease),
            Opcode::ScopeRegister => Some(Opcode::NoScopeRegister),
            _ => None,
        }
    }

    /// The textual name used by the trace form.
    pub fn name(self) -> &'static str {
        use Opcode as Op;

        match self {
            Op::AllocObject => "ALLOC_OBJECT",
            Op::Load => "LOAD",
            Op::Store => "STORE",
            Op::Reference => "REFERENCE",
            Op::Retain => "RETAIN",
            Op::Release => "RELEASE",
            Op::IsNull => "IS_NULL",
            Op::LoadLiteral => "LOAD_LITERAL",
            Op::Call => "CALL",
            Op::CallVirtual => "CALL_VIRTUAL",
            Op::CallStatic => "CALL_STATIC",
            Op::CallDispatcher => "CALL_DISPATCHER",
            Op::Label => "LABEL",
            Op::Branch => "BRANCH",
            Op::BranchTrue => "BRANCH_TRUE",
            Op::BranchFalse => "BRANCH_FALSE",
            Op::Assert => "ASSERT",
            Op::Return => "RETURN",
            Op::Throw => "THROW",
            Op::SetupHandler => "SETUP_HANDLER",
            Op::ScopeEnter => "SCOPE_ENTER",
            Op::ScopeExit => "SCOPE_EXIT",
            Op::ScopeRegister => "SCOPE_REGISTER",
            Op::Phi => "PHI",
            Op::ControlFlowChain => "CONTROL_FLOW_CHAIN",
            Op::LogicalAndBlock => "LOGICAL_AND_BLOCK",
            Op::LogicalOrBlock => "LOGICAL_OR_BLOCK",
            Op::NoRetain => "NO_RETAIN",
            Op::NoRelease => "NO_RELEASE",
            Op::NoScopeRegister => "NO_SCOPE_REGISTER",
            Op::StackAlloc => "STACK_ALLOC",
            Op::StackAllocLiteral => "STACK_ALLOC_LITERAL",
            Op::StackCleanupRefs => "STACK_CLEANUP_REFS",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.name()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_branch_classification() {
        assert!(Opcode::Branch.is_branch());
        assert!(Opcode::BranchFalse.is_branch());
        assert!(!Opcode::Return.is_branch());
        assert!(!Opcode::Label.is_branch());
        assert!(Opcode::Return.departs_operation());
        assert!(Opcode::Throw.departs_operation());
    }

    #[test]
    fn test_stack_counterparts_are_markers() {
        for op in Opcode::ALL {
            if let Some(counterpart) = op.stack_counterpart() {
                assert!(counterpart.is_optimization_marker(), "{}", op);
                assert!(!op.is_optimization_marker(), "{}", op);
            }
        }
    }

    #[test]
    fn test_no_arithmetic_opcodes() {
        for op in Opcode::ALL {
            let name = op.name();
            assert!(!matches!(name, "ADD" | "SUB" | "MUL" | "DIV" | "CMP"));
        }
    }
}
