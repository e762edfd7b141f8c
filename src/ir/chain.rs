//! # Control Flow Chains
//!
//! One structured construct for every conditional form: the null-safe
//! question operator, guarded assignment, if/else-if, switch and switch on
//! an enumeration, while and do-while loops, and try/catch/finally.
//!
//! A chain evaluates its [ConditionCase]s strictly in order. The first case
//! whose primitive condition holds runs its body and binds its result; no
//! later case and no default is evaluated. If nothing matches, the default
//! runs if there is one, otherwise the chain binds nothing. Loops re-run
//! their single case until the condition fails.
//!
//! A try chain runs its [TryBlock]. An exception thrown out of it is bound
//! to the block's exception name and handed to the first handler case whose
//! exception type matches; the [FinallyBlock] runs last on every path.
//!
//! [EnumOptimizationInfo] is advisory: a backend may dispatch through a jump
//! table, but the observable behavior must equal sequential evaluation.

use std::fmt;

use super::{debug_info::DebugInfo, instr::IrInstr};
use crate::ice;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainType {
    QuestionOperator,
    IfElse,
    IfElseIf,
    Switch,
    SwitchEnum,
    GuardedAssignment,
    WhileLoop,
    DoWhileLoop,
    TryCatchFinally,
}

impl ChainType {
    pub fn name(self) -> &'static str {
        match self {
            ChainType::QuestionOperator => "QUESTION_OPERATOR",
            ChainType::IfElse => "IF_ELSE",
            ChainType::IfElseIf => "IF_ELSE_IF",
            ChainType::Switch => "SWITCH",
            ChainType::SwitchEnum => "SWITCH_ENUM",
            ChainType::GuardedAssignment => "GUARDED_ASSIGNMENT",
            ChainType::WhileLoop => "WHILE_LOOP",
            ChainType::DoWhileLoop => "DO_WHILE_LOOP",
            ChainType::TryCatchFinally => "TRY_CATCH_FINALLY",
        }
    }

    pub fn is_switch(self) -> bool { matches!(self, ChainType::Switch | ChainType::SwitchEnum) }

    /// Loops re-evaluate their case; every other chain is single pass.
    pub fn is_loop(self) -> bool { matches!(self, ChainType::WhileLoop | ChainType::DoWhileLoop) }
}

impl fmt::Display for ChainType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.name()) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaseType {
    NullCheck,
    Expression,
    Literal,
    EnumConstant,
    ExceptionHandler,
}

impl fmt::Display for CaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaseType::NullCheck => write!(f, "NULL_CHECK"),
            CaseType::Expression => write!(f, "EXPRESSION"),
            CaseType::Literal => write!(f, "LITERAL"),
            CaseType::EnumConstant => write!(f, "ENUM_CONSTANT"),
            CaseType::ExceptionHandler => write!(f, "EXCEPTION_HANDLER"),
        }
    }
}

/// The test half of a case.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CaseCondition {
    pub evaluation: Vec<IrInstr>,
    /// The language level Boolean, absent for null checks.
    pub result: Option<String>,
    /// The backend native boolean the branch is taken on.
    pub primitive: String,
}

impl CaseCondition {
    pub fn new(evaluation: Vec<IrInstr>, result: Option<String>, primitive: impl Into<String>) -> Self {
        let primitive = primitive.into();
        if primitive.is_empty() {
            ice!("case condition needs a primitive condition");
        }
        Self {
            evaluation,
            result,
            primitive,
        }
    }
}

/// The consequence half of a case, or the default.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct CaseBody {
    pub evaluation: Vec<IrInstr>,
    pub result: Option<String>,
}

impl CaseBody {
    pub fn new(evaluation: Vec<IrInstr>, result: Option<String>) -> Self {
        Self { evaluation, result }
    }
}

/// The body run when no case matches.
pub type DefaultCase = CaseBody;

/// What a catch clause takes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExceptionHandler {
    pub exception_type: String,
    /// The variable the catch body declares for the exception.
    pub variable: String,
}

/// One test and consequence pair of a chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConditionCase {
    case_scope_id: Option<String>,
    case_type: CaseType,
    enum_constant: Option<(String, u32)>,
    handler: Option<ExceptionHandler>,
    condition: CaseCondition,
    body: CaseBody,
    body_scope_id: Option<String>,
    guard_updates: Vec<IrInstr>,
}

impl ConditionCase {
    fn new(
        case_scope_id: Option<String>,
        case_type: CaseType,
        condition: CaseCondition,
        body: CaseBody,
    ) -> Self {
        Self {
            case_scope_id,
            case_type,
            enum_constant: None,
            handler: None,
            condition,
            body,
            body_scope_id: None,
            guard_updates: Vec::new(),
        }
    }

    pub fn null_check(case_scope_id: Option<String>, condition: CaseCondition, body: CaseBody) -> Self {
        Self::new(case_scope_id, CaseType::NullCheck, condition, body)
    }

    pub fn expression(case_scope_id: Option<String>, condition: CaseCondition, body: CaseBody) -> Self {
        Self::new(case_scope_id, CaseType::Expression, condition, body)
    }

    pub fn literal(case_scope_id: Option<String>, condition: CaseCondition, body: CaseBody) -> Self {
        Self::new(case_scope_id, CaseType::Literal, condition, body)
    }

    pub fn enum_constant(
        case_scope_id: Option<String>,
        constant: impl Into<String>,
        ordinal: u32,
        condition: CaseCondition,
        body: CaseBody,
    ) -> Self {
        let constant = constant.into();
        if constant.is_empty() {
            ice!("enum constant case without a constant");
        }
        let mut case = Self::new(case_scope_id, CaseType::EnumConstant, condition, body);
        case.enum_constant = Some((constant, ordinal));
        case
    }

    /// A catch clause. It has no condition to evaluate: the exception type
    /// is matched when an exception reaches the chain.
    pub fn exception_handler(
        case_scope_id: Option<String>,
        exception_type: impl Into<String>,
        variable: impl Into<String>,
        body: CaseBody,
    ) -> Self {
        let handler = ExceptionHandler {
            exception_type: exception_type.into(),
            variable: variable.into(),
        };
        if handler.exception_type.is_empty() || handler.variable.is_empty() {
            ice!("exception handler without a type or variable");
        }
        let condition = CaseCondition {
            evaluation: Vec::new(),
            result: None,
            primitive: String::new(),
        };
        let mut case = Self::new(case_scope_id, CaseType::ExceptionHandler, condition, body);
        case.handler = Some(handler);
        case
    }

    pub fn with_body_scope(mut self, scope_id: impl Into<String>) -> Self {
        self.body_scope_id = Some(scope_id.into());
        self
    }

    /// Instructions re-binding guard variables after the body ran.
    pub fn with_guard_updates(mut self, updates: Vec<IrInstr>) -> Self {
        self.guard_updates = updates;
        self
    }

    pub fn case_scope_id(&self) -> Option<&str> { self.case_scope_id.as_deref() }

    pub fn case_type(&self) -> CaseType { self.case_type }

    pub fn enum_constant_name(&self) -> Option<&str> {
        self.enum_constant.as_ref().map(|(name, _)| name.as_str())
    }

    pub fn enum_ordinal(&self) -> Option<u32> { self.enum_constant.as_ref().map(|(_, ord)| *ord) }

    pub fn exception_handler_info(&self) -> Option<&ExceptionHandler> { self.handler.as_ref() }

    pub fn condition(&self) -> &CaseCondition { &self.condition }

    pub fn condition_evaluation(&self) -> &[IrInstr] { &self.condition.evaluation }

    pub fn condition_result(&self) -> Option<&str> { self.condition.result.as_deref() }

    pub fn primitive_condition(&self) -> &str { &self.condition.primitive }

    pub fn body(&self) -> &CaseBody { &self.body }

    pub fn body_evaluation(&self) -> &[IrInstr] { &self.body.evaluation }

    pub fn body_result(&self) -> Option<&str> { self.body.result.as_deref() }

    pub fn body_scope_id(&self) -> Option<&str> { self.body_scope_id.as_deref() }

    pub fn guard_updates(&self) -> &[IrInstr] { &self.guard_updates }
}

/// Jump table hints for a switch over an enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumOptimizationInfo {
    enum_type: String,
    enum_values: Vec<String>,
    enum_ordinals: Vec<u32>,
    is_exhaustive: bool,
    is_dense: bool,
}

/// The density from which an ordinal range counts as dense.
pub const DENSE_THRESHOLD: f64 = 0.5;

/// The least number of cases worth a jump table.
pub const JUMP_TABLE_MIN_CASES: usize = 3;

impl EnumOptimizationInfo {
    /// # Panics
    ///
    /// Panics if `values` and `ordinals` are not parallel.
    pub fn new(
        enum_type: impl Into<String>,
        values: Vec<String>,
        ordinals: Vec<u32>,
        is_exhaustive: bool,
    ) -> Self {
        if values.len() != ordinals.len() {
            ice!(
                "{} enum values but {} ordinals",
                values.len(),
                ordinals.len()
            );
        }
        let is_dense = !ordinals.is_empty() && density(&ordinals) >= DENSE_THRESHOLD;
        Self {
            enum_type: enum_type.into(),
            enum_values: values,
            enum_ordinals: ordinals,
            is_exhaustive,
            is_dense,
        }
    }

    pub fn enum_type(&self) -> &str { &self.enum_type }

    pub fn enum_values(&self) -> &[String] { &self.enum_values }

    pub fn enum_ordinals(&self) -> &[u32] { &self.enum_ordinals }

    pub fn is_exhaustive(&self) -> bool { self.is_exhaustive }

    pub fn is_dense(&self) -> bool { self.is_dense }

    /// `|ordinals| / (max - min + 1)`, or 0.0 without ordinals.
    pub fn density_ratio(&self) -> f64 { density(&self.enum_ordinals) }

    pub fn is_jump_table_candidate(&self) -> bool {
        self.is_dense && self.enum_ordinals.len() >= JUMP_TABLE_MIN_CASES
    }
}

fn density(ordinals: &[u32]) -> f64 {
    let (Some(min), Some(max)) = (ordinals.iter().min(), ordinals.iter().max()) else {
        return 0.0;
    };
    let range = (*max as f64) - (*min as f64) + 1.0;
    ordinals.len() as f64 / range
}

/// The value a switch evaluates once and every case compares against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EvaluationVariable {
    pub name: String,
    pub ty: String,
    pub setup: Vec<IrInstr>,
}

/// The variable an expression form chain binds its value to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReturnVariable {
    pub name: String,
    pub ty: String,
    pub setup: Vec<IrInstr>,
}

/// Variables declared by `if x <- expr` and `switch x <- expr` guards.
///
/// They live in their own scope around the chain and are not part of the
/// chain instruction itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GuardVariables {
    pub variables: Vec<String>,
    pub guard_scope_setup: Vec<IrInstr>,
    pub guard_scope_id: String,
    /// A scope shared by every case condition, if the chain needs one.
    pub condition_scope_id: Option<String>,
}

/// The protected body of a try chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TryBlock {
    pub scope_id: String,
    pub evaluation: Vec<IrInstr>,
    /// Where a caught exception is bound before its handler runs. The
    /// handler takes over the reference the throw held.
    pub exception: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FinallyBlock {
    pub scope_id: String,
    pub evaluation: Vec<IrInstr>,
}

/// The unified conditional construct.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ControlFlowChain {
    chain_type: ChainType,
    result: Option<String>,
    evaluation_variable: Option<EvaluationVariable>,
    return_variable: Option<ReturnVariable>,
    condition_chain: Vec<ConditionCase>,
    default_case: Option<CaseBody>,
    enum_optimization: Option<EnumOptimizationInfo>,
    try_block: Option<TryBlock>,
    finally_block: Option<FinallyBlock>,
    scope_id: String,
}

/// Collects the parts of a [ControlFlowChain] and validates them on build.
pub struct ChainBuilder {
    chain: ControlFlowChain,
}

impl ChainBuilder {
    pub fn result(mut self, result: impl Into<String>) -> Self {
        self.chain.result = Some(result.into());
        self
    }

    pub fn evaluation_variable(mut self, variable: EvaluationVariable) -> Self {
        self.chain.evaluation_variable = Some(variable);
        self
    }

    pub fn return_variable(mut self, variable: ReturnVariable) -> Self {
        self.chain.return_variable = Some(variable);
        self
    }

    pub fn case(mut self, case: ConditionCase) -> Self {
        self.chain.condition_chain.push(case);
        self
    }

    pub fn cases(mut self, cases: impl IntoIterator<Item = ConditionCase>) -> Self {
        self.chain.condition_chain.extend(cases);
        self
    }

    pub fn default_case(mut self, body: CaseBody) -> Self {
        self.chain.default_case = Some(body);
        self
    }

    pub fn enum_optimization(mut self, info: EnumOptimizationInfo) -> Self {
        self.chain.enum_optimization = Some(info);
        self
    }

    pub fn try_block(mut self, block: TryBlock) -> Self {
        self.chain.try_block = Some(block);
        self
    }

    pub fn finally_block(mut self, block: FinallyBlock) -> Self {
        self.chain.finally_block = Some(block);
        self
    }

    /// # Panics
    ///
    /// Panics if the parts do not form a valid chain of its type.
    pub fn build(self) -> ControlFlowChain {
        let chain = self.chain;
        let ty = chain.chain_type;
        let cases = &chain.condition_chain;

        if cases.is_empty() && chain.default_case.is_none() && ty != ChainType::TryCatchFinally {
            ice!("{} chain without cases or default", ty);
        }
        if ty != ChainType::TryCatchFinally && (chain.try_block.is_some() || chain.finally_block.is_some()) {
            ice!("{} chain with a try or finally block", ty);
        }

        let all = |case_type: CaseType| cases.iter().all(|c| c.case_type == case_type);

        match ty {
            ChainType::QuestionOperator => {
                if cases.len() != 1 || !all(CaseType::NullCheck) {
                    ice!("question operator needs exactly one null check case");
                }
            }
            ChainType::IfElse | ChainType::WhileLoop | ChainType::DoWhileLoop => {
                if cases.len() != 1 || !all(CaseType::Expression) {
                    ice!("{} needs exactly one expression case", ty);
                }
            }
            ChainType::IfElseIf | ChainType::GuardedAssignment => {
                if !all(CaseType::Expression) {
                    ice!("{} only takes expression cases", ty);
                }
            }
            ChainType::Switch => {
                if chain.evaluation_variable.is_none() {
                    ice!("switch without an evaluation variable");
                }
                if !cases
                    .iter()
                    .all(|c| matches!(c.case_type, CaseType::Literal | CaseType::Expression))
                {
                    ice!("switch only takes literal or expression cases");
                }
            }
            ChainType::SwitchEnum => {
                if chain.evaluation_variable.is_none() {
                    ice!("enum switch without an evaluation variable");
                }
                if !all(CaseType::EnumConstant) {
                    ice!("enum switch only takes enum constant cases");
                }
                if chain.enum_optimization.is_none() {
                    ice!("enum switch without enum optimization info");
                }
            }
            ChainType::TryCatchFinally => {
                if chain.try_block.is_none() {
                    ice!("try chain without a try block");
                }
                if cases.is_empty() && chain.finally_block.is_none() {
                    ice!("try chain without handlers or finally");
                }
                if !all(CaseType::ExceptionHandler) || chain.default_case.is_some() {
                    ice!("try chain only takes exception handler cases");
                }
            }
        }
        if ty.is_loop() && chain.default_case.is_some() {
            ice!("{} cannot have a default case", ty);
        }

        chain
    }
}

impl ControlFlowChain {
    /// Start a chain of `chain_type` in scope `scope_id`.
    ///
    /// # Panics
    ///
    /// Panics if `scope_id` is empty.
    pub fn builder(chain_type: ChainType, scope_id: impl Into<String>) -> ChainBuilder {
        let scope_id = scope_id.into();
        if scope_id.is_empty() {
            ice!("{} chain without a scope id", chain_type);
        }
        ChainBuilder {
            chain: ControlFlowChain {
                chain_type,
                result: None,
                evaluation_variable: None,
                return_variable: None,
                condition_chain: Vec::new(),
                default_case: None,
                enum_optimization: None,
                try_block: None,
                finally_block: None,
                scope_id,
            },
        }
    }

    /// `operand?`: null yields the null body, otherwise the default calls
    /// `_isSet` on the operand.
    pub fn question_operator(
        result: impl Into<String>,
        null_case: ConditionCase,
        set_case: CaseBody,
        scope_id: impl Into<String>,
    ) -> Self {
        Self::builder(ChainType::QuestionOperator, scope_id)
            .result(result)
            .case(null_case)
            .default_case(set_case)
            .build()
    }

    /// `lhs :=? value`: a single expression case testing that `lhs` is
    /// unset, whose body performs the assignment.
    pub fn guarded_assignment(unset_case: ConditionCase, scope_id: impl Into<String>) -> Self {
        Self::builder(ChainType::GuardedAssignment, scope_id)
            .case(unset_case)
            .build()
    }

    pub fn chain_type(&self) -> ChainType { self.chain_type }

    pub fn result(&self) -> Option<&str> { self.result.as_deref() }

    pub fn scope_id(&self) -> &str { &self.scope_id }

    pub fn evaluation_variable(&self) -> Option<&EvaluationVariable> {
        self.evaluation_variable.as_ref()
    }

    pub fn has_evaluation_variable(&self) -> bool { self.evaluation_variable.is_some() }

    pub fn return_variable(&self) -> Option<&ReturnVariable> { self.return_variable.as_ref() }

    pub fn has_return_variable(&self) -> bool { self.return_variable.is_some() }

    pub fn condition_chain(&self) -> &[ConditionCase] { &self.condition_chain }

    pub fn default_case(&self) -> Option<&CaseBody> { self.default_case.as_ref() }

    pub fn has_default_case(&self) -> bool { self.default_case.is_some() }

    pub fn enum_optimization(&self) -> Option<&EnumOptimizationInfo> {
        self.enum_optimization.as_ref()
    }

    pub fn try_block(&self) -> Option<&TryBlock> { self.try_block.as_ref() }

    pub fn finally_block(&self) -> Option<&FinallyBlock> { self.finally_block.as_ref() }

    /// The first handler taking an exception of type `ty`. `catch_all`
    /// handlers take every exception.
    pub fn handler_for(&self, ty: &str, catch_all: &str) -> Option<&ConditionCase> {
        self.condition_chain.iter().find(|case| {
            case.handler
                .as_ref()
                .map(|handler| handler.exception_type == ty || handler.exception_type == catch_all)
                .unwrap_or(false)
        })
    }

    /// Every nested instruction list, in evaluation order.
    pub fn nested_lists(&self) -> Vec<&[IrInstr]> {
        let mut lists: Vec<&[IrInstr]> = Vec::new();
        if let Some(eval) = &self.evaluation_variable {
            lists.push(&eval.setup);
        }
        if let Some(ret) = &self.return_variable {
            lists.push(&ret.setup);
        }
        if let Some(block) = &self.try_block {
            lists.push(&block.evaluation);
        }
        for case in &self.condition_chain {
            lists.push(&case.condition.evaluation);
            lists.push(&case.body.evaluation);
            lists.push(&case.guard_updates);
        }
        if let Some(default) = &self.default_case {
            lists.push(&default.evaluation);
        }
        if let Some(block) = &self.finally_block {
            lists.push(&block.evaluation);
        }
        lists
    }

    pub(crate) fn nested_lists_mut(&mut self) -> Vec<&mut Vec<IrInstr>> {
        let mut lists: Vec<&mut Vec<IrInstr>> = Vec::new();
        if let Some(eval) = &mut self.evaluation_variable {
            lists.push(&mut eval.setup);
        }
        if let Some(ret) = &mut self.return_variable {
            lists.push(&mut ret.setup);
        }
        if let Some(block) = &mut self.try_block {
            lists.push(&mut block.evaluation);
        }
        for case in &mut self.condition_chain {
            lists.push(&mut case.condition.evaluation);
            lists.push(&mut case.body.evaluation);
            lists.push(&mut case.guard_updates);
        }
        if let Some(default) = &mut self.default_case {
            lists.push(&mut default.evaluation);
        }
        if let Some(block) = &mut self.finally_block {
            lists.push(&mut block.evaluation);
        }
        lists
    }

    /// The names whose values become the value of the chain.
    pub fn result_sources(&self) -> Vec<&str> {
        self.condition_chain
            .iter()
            .filter_map(|case| case.body_result())
            .chain(self.default_case.iter().filter_map(|d| d.result.as_deref()))
            .collect()
    }

    pub fn display<'a>(&'a self, debug_info: Option<&'a DebugInfo>) -> DisplayChain<'a> {
        DisplayChain {
            chain: self,
            debug_info,
        }
    }
}

pub struct DisplayChain<'a> {
    chain: &'a ControlFlowChain,
    debug_info: Option<&'a DebugInfo>,
}

fn write_list(f: &mut fmt::Formatter<'_>, label: &str, instrs: &[IrInstr]) -> fmt::Result {
    writeln!(f, "{}:\n[", label)?;
    for instr in instrs {
        writeln!(f, "{}", instr)?;
    }
    writeln!(f, "]")
}

fn write_case(f: &mut fmt::Formatter<'_>, case: &ConditionCase) -> fmt::Result {
    writeln!(f, "[")?;
    if let Some(scope) = &case.case_scope_id {
        writeln!(f, "case_scope_id: {}", scope)?;
    }
    writeln!(f, "case_type: \"{}\"", case.case_type)?;
    if let Some((constant, ordinal)) = &case.enum_constant {
        writeln!(f, "enum_constant: \"{}\"", constant)?;
        writeln!(f, "enum_ordinal: {}", ordinal)?;
    }
    if let Some(handler) = &case.handler {
        writeln!(f, "exception_type: \"{}\"", handler.exception_type)?;
        writeln!(f, "exception_variable: {}", handler.variable)?;
    } else {
        write_list(f, "condition_evaluation", &case.condition.evaluation)?;
        if let Some(result) = &case.condition.result {
            writeln!(f, "condition_result: {}", result)?;
        }
        writeln!(f, "primitive_condition: {}", case.condition.primitive)?;
    }
    if let Some(scope) = &case.body_scope_id {
        writeln!(f, "body_scope_id: {}", scope)?;
    }
    write_list(f, "body_evaluation", &case.body.evaluation)?;
    if let Some(result) = &case.body.result {
        writeln!(f, "body_result: {}", result)?;
    }
    if !case.guard_updates.is_empty() {
        write_list(f, "guard_updates", &case.guard_updates)?;
    }
    write!(f, "]")
}

impl fmt::Display for DisplayChain<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let chain = self.chain;

        if let Some(result) = &chain.result {
            write!(f, "{} = ", result)?;
        }
        write!(f, "CONTROL_FLOW_CHAIN")?;
        if let Some(debug_info) = self.debug_info.filter(|d| d.is_valid_location()) {
            write!(f, "  {}", debug_info)?;
        }
        writeln!(f, "\n[")?;
        writeln!(f, "chain_type: \"{}\"", chain.chain_type)?;

        if let Some(eval) = &chain.evaluation_variable {
            writeln!(f, "evaluation_variable: {}", eval.name)?;
            writeln!(f, "evaluation_variable_type: \"{}\"", eval.ty)?;
            if !eval.setup.is_empty() {
                write_list(f, "evaluation_variable_setup", &eval.setup)?;
            }
        }
        if let Some(ret) = &chain.return_variable {
            writeln!(f, "return_variable: {}", ret.name)?;
            writeln!(f, "return_variable_type: \"{}\"", ret.ty)?;
            if !ret.setup.is_empty() {
                write_list(f, "return_variable_setup", &ret.setup)?;
            }
        }

        if let Some(block) = &chain.try_block {
            writeln!(f, "try_scope_id: {}", block.scope_id)?;
            write_list(f, "try_body_evaluation", &block.evaluation)?;
            writeln!(f, "exception_name: {}", block.exception)?;
        }

        writeln!(f, "condition_chain:\n[")?;
        for (i, case) in chain.condition_chain.iter().enumerate() {
            write_case(f, case)?;
            if i + 1 < chain.condition_chain.len() {
                write!(f, ",")?;
            }
            writeln!(f)?;
        }
        writeln!(f, "]")?;

        if let Some(default) = &chain.default_case {
            write_list(f, "default_body_evaluation", &default.evaluation)?;
            if let Some(result) = &default.result {
                writeln!(f, "default_result: {}", result)?;
            }
        }

        if let Some(block) = &chain.finally_block {
            writeln!(f, "finally_scope_id: {}", block.scope_id)?;
            write_list(f, "finally_evaluation", &block.evaluation)?;
        }

        if let Some(info) = &chain.enum_optimization {
            writeln!(f, "enum_optimization_info:\n[")?;
            writeln!(f, "enum_type: \"{}\"", info.enum_type)?;
            writeln!(f, "enum_values: [{}]", info.enum_values.join(", "))?;
            let ordinals: Vec<String> = info.enum_ordinals.iter().map(u32::to_string).collect();
            writeln!(f, "enum_ordinals: [{}]", ordinals.join(", "))?;
            writeln!(f, "is_exhaustive: {}", info.is_exhaustive)?;
            writeln!(f, "is_dense: {}", info.is_dense)?;
            writeln!(f, "]")?;
        }

        writeln!(f, "scope_id: {}", chain.scope_id)?;
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expression_case(primitive: &str) -> ConditionCase {
        ConditionCase::expression(
            None,
            CaseCondition::new(Vec::new(), None, primitive),
            CaseBody::default(),
        )
    }

    #[test]
    fn test_density() {
        let info = EnumOptimizationInfo::new(
            "Color",
            vec!["Red".into(), "Blue".into()],
            vec![0, 3],
            false,
        );
        assert_eq!(info.density_ratio(), 0.5);
        assert!(info.is_dense());
        assert!(!info.is_jump_table_candidate());

        let empty = EnumOptimizationInfo::new("Color", Vec::new(), Vec::new(), false);
        assert_eq!(empty.density_ratio(), 0.0);
        assert!(!empty.is_dense());
    }

    #[test]
    fn test_sparse_is_not_candidate() {
        let info = EnumOptimizationInfo::new(
            "Level",
            vec!["A".into(), "B".into(), "C".into()],
            vec![0, 5, 11],
            true,
        );
        assert!(info.density_ratio() < DENSE_THRESHOLD);
        assert!(!info.is_jump_table_candidate());
    }

    #[test]
    fn test_if_else_if_keeps_case_order() {
        let chain = ControlFlowChain::builder(ChainType::IfElseIf, "_scope_1")
            .case(expression_case("_temp1"))
            .case(expression_case("_temp2"))
            .build();
        let order: Vec<&str> = chain
            .condition_chain()
            .iter()
            .map(|c| c.primitive_condition())
            .collect();
        assert_eq!(order, vec!["_temp1", "_temp2"]);
        assert!(!chain.has_default_case());
    }

    #[test]
    fn test_default_only_chain() {
        let chain = ControlFlowChain::builder(ChainType::IfElseIf, "_scope_1")
            .default_case(CaseBody::default())
            .build();
        assert!(chain.condition_chain().is_empty());
    }

    #[test]
    #[should_panic(expected = "internal compiler error")]
    fn test_empty_chain() { ControlFlowChain::builder(ChainType::IfElseIf, "_scope_1").build(); }

    #[test]
    #[should_panic(expected = "internal compiler error")]
    fn test_switch_needs_evaluation_variable() {
        ControlFlowChain::builder(ChainType::Switch, "_scope_1")
            .case(expression_case("_temp1"))
            .build();
    }

    #[test]
    #[should_panic(expected = "internal compiler error")]
    fn test_question_operator_needs_null_check() {
        ControlFlowChain::question_operator(
            "_temp1",
            expression_case("_temp2"),
            CaseBody::default(),
            "_scope_1",
        );
    }

    fn try_block() -> TryBlock {
        TryBlock {
            scope_id: "_scope_2".into(),
            evaluation: Vec::new(),
            exception: "_temp1".into(),
        }
    }

    #[test]
    fn test_first_matching_handler() {
        let chain = ControlFlowChain::builder(ChainType::TryCatchFinally, "_scope_1")
            .try_block(try_block())
            .case(ConditionCase::exception_handler(None, "test::Failure", "failure", CaseBody::default()))
            .case(ConditionCase::exception_handler(None, "test::Base", "base", CaseBody::default()))
            .build();
        let variable = |ty: &str| {
            chain
                .handler_for(ty, "test::Base")
                .and_then(ConditionCase::exception_handler_info)
                .map(|handler| handler.variable.clone())
        };
        assert_eq!(variable("test::Failure").as_deref(), Some("failure"));
        assert_eq!(variable("test::Other").as_deref(), Some("base"));

        let text = chain.display(None).to_string();
        assert!(text.contains("chain_type: \"TRY_CATCH_FINALLY\""));
        assert!(text.contains("exception_type: \"test::Failure\""));
        assert!(!text.contains("primitive_condition"));
    }

    #[test]
    fn test_try_finally_without_handlers() {
        let chain = ControlFlowChain::builder(ChainType::TryCatchFinally, "_scope_1")
            .try_block(try_block())
            .finally_block(FinallyBlock {
                scope_id: "_scope_3".into(),
                evaluation: Vec::new(),
            })
            .build();
        assert_eq!(chain.nested_lists().len(), 2);
        assert!(chain.handler_for("test::Failure", "test::Base").is_none());
    }

    #[test]
    #[should_panic(expected = "internal compiler error")]
    fn test_try_needs_handler_cases() {
        ControlFlowChain::builder(ChainType::TryCatchFinally, "_scope_1")
            .try_block(try_block())
            .case(expression_case("_temp2"))
            .build();
    }

    #[test]
    fn test_trace_layout() {
        let chain = ControlFlowChain::builder(ChainType::IfElse, "_scope_1")
            .case(expression_case("_temp1"))
            .build();
        let text = chain.display(None).to_string();
        assert!(text.starts_with("CONTROL_FLOW_CHAIN\n[\nchain_type: \"IF_ELSE\"\n"));
        assert!(text.contains("case_type: \"EXPRESSION\""));
        assert!(text.ends_with("scope_id: _scope_1\n]"));
    }
}
