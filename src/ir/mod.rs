mod block;
mod call;
mod chain;
mod construct;
mod debug_info;
mod instr;
mod opcode;
mod printer;

pub mod exec;
pub mod passes;
pub mod passman;
pub mod verify;
pub use block::{BasicBlockData, Block, Body, DisplayBlock};
pub use call::{parse_complexity, CallDetails, CallMetaData, CallMetaDataExtractor, SideEffect};
pub use chain::{
    CaseBody,
    CaseCondition,
    CaseType,
    ChainBuilder,
    ChainType,
    ConditionCase,
    ControlFlowChain,
    DefaultCase,
    DisplayChain,
    EnumOptimizationInfo,
    EvaluationVariable,
    ExceptionHandler,
    FinallyBlock,
    GuardVariables,
    ReturnVariable,
    TryBlock,
    DENSE_THRESHOLD,
    JUMP_TABLE_MIN_CASES,
};
pub use construct::{CompilationUnit, ConstructKind, Field, IrConstruct, Operation, Parameter};
pub use debug_info::{DebugInfo, SourceToken};
pub use instr::{EscapeLevel, EscapeMetaData, InstrKind, IrInstr, LogicalOp, LogicalOperation};
pub use opcode::{Opcode, OpcodeGroup};
pub use printer::{render, IrNode, NodePrinter};
