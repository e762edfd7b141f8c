use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use super::{
    BuiltinCalls,
    CallHandler,
    CallOutcome,
    ExecConfig,
    ExecError,
    ExecResult,
    Heap,
    Leak,
    MemoryModel,
    ObjectId,
    Receiver,
    Value,
};
use crate::{
    ir::{
        block::Body,
        chain::{ChainType, ControlFlowChain, TryBlock},
        construct::Operation,
        instr::{IrInstr, LogicalOp, LogicalOperation},
        opcode::Opcode,
    },
    typed::std_types,
};

/// What a name is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Binding {
    Null,
    Object(ObjectId),
    Primitive(bool),
}

enum Control {
    Next,
    Jump(String),
    Return(Option<Binding>),
    Throw(Binding),
}

struct OpenScope {
    id: String,
    /// Registered names, resolved when the scope exits.
    registered: Vec<String>,
}

/// The result of running an operation.
#[derive(Debug)]
pub struct ExecOutcome {
    pub returned: Option<Value>,
    pub thrown: Option<Value>,
    /// Objects still referenced at the end, always empty under
    /// [MemoryModel::Gc].
    pub leaks: Vec<Leak>,
    pub steps: usize,
}

/// Runs operations with a [CallHandler].
pub struct Interpreter<H = BuiltinCalls> {
    config: ExecConfig,
    handler: H,
}

impl Interpreter<BuiltinCalls> {
    pub fn new(config: ExecConfig) -> Self { Self::with_handler(config, BuiltinCalls::new()) }
}

impl<H: CallHandler> Interpreter<H> {
    pub fn with_handler(config: ExecConfig, handler: H) -> Self { Self { config, handler } }

    pub fn handler(&self) -> &H { &self.handler }

    pub fn into_handler(self) -> H { self.handler }

    /// Run `operation` with one argument per parameter. Arguments are owned
    /// by the caller.
    pub fn run(&mut self, operation: &Operation, args: Vec<Value>) -> ExecResult<ExecOutcome> {
        debug!(operation = operation.name(), "interpreting");

        let mut machine = Machine {
            config: &self.config,
            handler: &mut self.handler,
            heap: Heap::default(),
            vars: FxHashMap::default(),
            scopes: Vec::new(),
            handlers: Vec::new(),
            prev_label: None,
            steps: 0,
        };

        for (param, value) in operation.parameters().iter().zip(args) {
            let id = machine.heap.alloc_external(value);
            machine.vars.insert(param.name.clone(), Binding::Object(id));
        }

        let control = machine.run_body(operation.body())?;
        if let Control::Throw(_) = control {
            // nothing caught it, so every scope still open unwinds
            machine.unwind(0)?;
        }

        let (returned, thrown) = match control {
            Control::Return(binding) => (binding, None),
            Control::Throw(binding) => (None, Some(binding)),
            Control::Next | Control::Jump(_) => (None, None),
        };
        // the caller owns what is returned or thrown
        let handed_over = match returned.or(thrown) {
            Some(Binding::Object(id)) => Some(id),
            _ => None,
        };

        let leaks = match self.config.memory_model {
            MemoryModel::Arc => machine.heap.leaks(handed_over),
            MemoryModel::Gc => Vec::new(),
        };
        if !leaks.is_empty() {
            debug!(count = leaks.len(), "objects leaked");
        }

        Ok(ExecOutcome {
            returned: returned.map(|b| machine.value_of_binding(b)).transpose()?.flatten(),
            thrown: thrown.map(|b| machine.value_of_binding(b)).transpose()?.flatten(),
            leaks,
            steps: machine.steps,
        })
    }
}

struct Machine<'a, H> {
    config: &'a ExecConfig,
    handler: &'a mut H,
    heap: Heap,
    vars: FxHashMap<String, Binding>,
    scopes: Vec<OpenScope>,
    /// Labels of the pending exception handlers.
    handlers: Vec<String>,
    /// The block control came from, for phis.
    prev_label: Option<String>,
    steps: usize,
}

fn malformed(instr: &IrInstr) -> ExecError { ExecError::Malformed(instr.to_string()) }

fn parse_literal(value: &str, ty: &str) -> Option<Value> {
    match ty {
        std_types::INTEGER => value.parse().ok().map(Value::Integer),
        std_types::BOOLEAN => value.parse().ok().map(Value::Boolean),
        std_types::STRING => Some(Value::String(
            value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value)
                .to_string(),
        )),
        _ => Some(Value::Other {
            ty: ty.to_string(),
            text: value.to_string(),
        }),
    }
}

impl<H: CallHandler> Machine<'_, H> {
    fn arc(&self) -> bool { self.config.memory_model == MemoryModel::Arc }

    /// The binding of a variable or temporary, or of a field written
    /// `holder.field`.
    fn lookup(&self, name: &str) -> ExecResult<Binding> {
        if let Some(binding) = self.vars.get(name) {
            return Ok(*binding);
        }
        if let Some((holder, field)) = name.split_once('.') {
            if let Some(Binding::Object(id)) = self.vars.get(holder) {
                return Ok(match self.heap.field(*id, field)? {
                    Some(object) => Binding::Object(object),
                    None => Binding::Null,
                });
            }
        }
        Err(ExecError::Unbound(name.to_string()))
    }

    fn store(&mut self, target: &str, binding: Binding) -> ExecResult<()> {
        let Some((holder, field)) = target.split_once('.') else {
            self.vars.insert(target.to_string(), binding);
            return Ok(());
        };
        let Binding::Object(id) = self.lookup(holder)? else {
            return Err(ExecError::NullHolder(target.to_string()));
        };
        let value = match binding {
            Binding::Object(object) => Some(object),
            Binding::Null => None,
            Binding::Primitive(_) => return Err(ExecError::Unbound(target.to_string())),
        };
        trace!(holder, field, ?value, "field store");
        self.heap.set_field(id, field, value)
    }

    fn bind(&mut self, name: Option<&str>, binding: Binding) {
        if let Some(name) = name {
            trace!(name, ?binding, "bind");
            self.vars.insert(name.to_string(), binding);
        }
    }

    fn primitive(&self, name: &str) -> ExecResult<bool> {
        match self.lookup(name)? {
            Binding::Primitive(b) => Ok(b),
            Binding::Null | Binding::Object(_) => Err(ExecError::NotPrimitive(name.to_string())),
        }
    }

    fn value_of_binding(&self, binding: Binding) -> ExecResult<Option<Value>> {
        match binding {
            Binding::Null => Ok(None),
            Binding::Object(id) => Ok(Some(self.heap.value(id)?.clone())),
            Binding::Primitive(b) => Ok(Some(Value::Boolean(b))),
        }
    }

    fn run_body(&mut self, body: &Body) -> ExecResult<Control> {
        let Some(mut block) = body.entry() else {
            return Ok(Control::Return(None));
        };

        loop {
            let next = match self.exec_list(block.instrs(body), false)? {
                Control::Next => {
                    let succs = block.successors(body);
                    match succs.as_slice() {
                        [single] => Some(*single),
                        // fall through in layout order
                        _ => body.blocks().find(|b| b.id() == block.id() + 1),
                    }
                }
                Control::Jump(label) => Some(
                    body.block(&label)
                        .ok_or_else(|| ExecError::UnknownLabel(label.clone()))?,
                ),
                Control::Throw(exception) => match self.handlers.pop() {
                    Some(label) => {
                        self.vars.insert("_exception".to_string(), exception);
                        Some(
                            body.block(&label)
                                .ok_or_else(|| ExecError::UnknownLabel(label.clone()))?,
                        )
                    }
                    None => return Ok(Control::Throw(exception)),
                },
                ret @ Control::Return(_) => return Ok(ret),
            };

            match next {
                Some(next) => {
                    self.prev_label = Some(block.label(body).to_string());
                    block = next;
                }
                None => return Ok(Control::Return(None)),
            }
        }
    }

    fn exec_list(&mut self, instrs: &[IrInstr], nested: bool) -> ExecResult<Control> {
        for instr in instrs {
            self.steps += 1;
            if self.steps > self.config.max_steps {
                return Err(ExecError::StepLimit(self.config.max_steps));
            }
            match self.exec_instr(instr)? {
                Control::Next => {}
                Control::Jump(_) if nested => {
                    return Err(ExecError::JumpOutOfStructure(instr.opcode()));
                }
                control => return Ok(control),
            }
        }
        Ok(Control::Next)
    }

    /// Run a nested list, returning the control if it leaves the operation.
    fn exec_nested(&mut self, instrs: &[IrInstr]) -> ExecResult<Option<Control>> {
        match self.exec_list(instrs, true)? {
            Control::Next => Ok(None),
            control => Ok(Some(control)),
        }
    }

    fn exec_instr(&mut self, instr: &IrInstr) -> ExecResult<Control> {
        use Opcode as Op;

        let arc = self.arc();
        let operand = |index: usize| {
            instr
                .operands()
                .get(index)
                .map(String::as_str)
                .ok_or_else(|| malformed(instr))
        };

        match instr.opcode() {
            Op::LoadLiteral | Op::StackAllocLiteral => {
                let (value, ty) = instr.literal().ok_or_else(|| malformed(instr))?;
                let value = parse_literal(value, ty).ok_or_else(|| malformed(instr))?;
                let id = self
                    .heap
                    .alloc(value, instr.opcode() == Op::StackAllocLiteral);
                self.bind(instr.result(), Binding::Object(id));
            }
            Op::AllocObject | Op::StackAlloc => {
                let ty = instr.type_operand().ok_or_else(|| malformed(instr))?;
                let value = Value::Other {
                    ty: ty.to_string(),
                    text: ty.to_string(),
                };
                let id = self.heap.alloc(value, instr.opcode() == Op::StackAlloc);
                self.bind(instr.result(), Binding::Object(id));
            }
            Op::Load => {
                let binding = self.lookup(operand(0)?)?;
                self.bind(instr.result(), binding);
            }
            Op::Store => {
                let (target, value) = instr.store_parts().ok_or_else(|| malformed(instr))?;
                let binding = self.lookup(value)?;
                self.store(target, binding)?;
            }
            // a declaration starts unset, also when a loop body runs it again
            Op::Reference => {
                self.vars.insert(operand(0)?.to_string(), Binding::Null);
            }
            Op::Retain if arc => {
                if let Binding::Object(id) = self.lookup(operand(0)?)? {
                    self.heap.retain(id)?;
                }
            }
            Op::Release if arc => {
                if let Binding::Object(id) = self.lookup(operand(0)?)? {
                    self.heap.release(id)?;
                }
            }
            Op::IsNull => {
                let is_null = self.lookup(operand(0)?)? == Binding::Null;
                self.bind(instr.result(), Binding::Primitive(is_null));
            }
            Op::Call | Op::CallVirtual | Op::CallStatic | Op::CallDispatcher => {
                return self.exec_call(instr);
            }
            Op::Label => {}
            Op::Branch => return Ok(Control::Jump(operand(0)?.to_string())),
            Op::BranchTrue | Op::BranchFalse => {
                let cond = self.primitive(operand(0)?)?;
                if cond == (instr.opcode() == Op::BranchTrue) {
                    return Ok(Control::Jump(operand(1)?.to_string()));
                }
            }
            Op::Assert => {
                let cond = operand(0)?;
                if !self.primitive(cond)? {
                    return Err(ExecError::AssertionFailed(cond.to_string()));
                }
            }
            Op::Return => {
                let value = match instr.return_value() {
                    Some(name) => Some(self.lookup(name)?),
                    None => None,
                };
                return Ok(Control::Return(value));
            }
            Op::Throw => return Ok(Control::Throw(self.lookup(operand(0)?)?)),
            Op::SetupHandler => self.handlers.push(operand(0)?.to_string()),
            Op::ScopeEnter if arc => self.scopes.push(OpenScope {
                id: operand(0)?.to_string(),
                registered: Vec::new(),
            }),
            Op::ScopeExit if arc => self.exit_scope(operand(0)?)?,
            Op::StackCleanupRefs if arc => {
                if let Binding::Object(id) = self.lookup(operand(0)?)? {
                    self.heap.cleanup_fields(id)?;
                }
            }
            Op::ScopeRegister if arc => {
                let (object, scope) = (operand(0)?, operand(1)?);
                let open = self
                    .scopes
                    .iter_mut()
                    .rev()
                    .find(|s| s.id == scope)
                    .ok_or_else(|| ExecError::UnknownScope(scope.to_string()))?;
                open.registered.push(object.to_string());
            }
            Op::Phi => {
                let incoming = instr.phi_incoming().ok_or_else(|| malformed(instr))?;
                let prev = self.prev_label.as_deref();
                let (value, _) = incoming
                    .into_iter()
                    .find(|(_, label)| Some(*label) == prev)
                    .ok_or_else(|| ExecError::PhiWithoutEdge(instr.to_string()))?;
                let binding = self.lookup(value)?;
                self.bind(instr.result(), binding);
            }
            Op::ControlFlowChain => {
                let chain = instr.chain().ok_or_else(|| malformed(instr))?;
                if let Some(control) = self.exec_chain(instr, chain)? {
                    return Ok(control);
                }
            }
            Op::LogicalAndBlock | Op::LogicalOrBlock => {
                let operation = instr.logical_operation().ok_or_else(|| malformed(instr))?;
                if let Some(control) = self.exec_logical(instr, operation)? {
                    return Ok(control);
                }
            }
            Op::Retain
            | Op::Release
            | Op::ScopeEnter
            | Op::ScopeExit
            | Op::ScopeRegister
            | Op::NoRetain
            | Op::NoRelease
            | Op::NoScopeRegister
            | Op::StackCleanupRefs => {}
        }
        Ok(Control::Next)
    }

    /// Close the innermost scope, releasing its registered objects in
    /// reverse registration order.
    fn exit_scope(&mut self, scope: &str) -> ExecResult<()> {
        let open = match self.scopes.pop() {
            Some(open) if open.id == scope => open,
            Some(open) => {
                return Err(ExecError::ScopeMismatch {
                    expected: open.id,
                    found: scope.to_string(),
                })
            }
            None => return Err(ExecError::UnknownScope(scope.to_string())),
        };
        for name in open.registered.iter().rev() {
            if let Binding::Object(id) = self.lookup(name)? {
                trace!(scope, name, %id, "release on scope exit");
                self.heap.release(id)?;
            }
        }
        Ok(())
    }

    /// Pop scopes, releasing what they hold, until `depth` remain.
    fn unwind(&mut self, depth: usize) -> ExecResult<()> {
        while self.scopes.len() > depth {
            let Some(scope) = self.scopes.last().map(|open| open.id.clone()) else {
                break;
            };
            trace!(scope, "unwind");
            self.exit_scope(&scope)?;
        }
        Ok(())
    }

    fn exec_call(&mut self, instr: &IrInstr) -> ExecResult<Control> {
        let details = instr.call_details().ok_or_else(|| malformed(instr))?;

        let is_static = instr.opcode() == Opcode::CallStatic;
        let mut object = None;
        if !is_static {
            match self.lookup(&details.target_object)? {
                Binding::Object(id) => object = Some((id, self.heap.value(id)?.clone())),
                Binding::Null => {}
                Binding::Primitive(_) => return Err(malformed(instr)),
            }
        }
        let receiver = match &mut object {
            Some((_, value)) => Receiver::Object(value),
            None if is_static => Receiver::Static,
            None => Receiver::Null,
        };

        let mut args = Vec::with_capacity(details.arguments.len());
        for arg in &details.arguments {
            match self.lookup(arg)? {
                Binding::Primitive(_) => return Err(malformed(instr)),
                binding => args.push(self.value_of_binding(binding)?),
            }
        }

        let outcome = self.handler.call(details, receiver, &args)?;
        if let Some((id, value)) = object {
            self.heap.set_value(id, value)?;
        }
        match outcome {
            CallOutcome::Void => {}
            CallOutcome::Object(value) => {
                let id = self.heap.alloc(value, false);
                self.bind(instr.result(), Binding::Object(id));
            }
            CallOutcome::Primitive(b) => self.bind(instr.result(), Binding::Primitive(b)),
            CallOutcome::Throw(value) => {
                debug!(call = %details.operand(), "callee threw");
                let id = self.heap.alloc_owned(value);
                return Ok(Control::Throw(Binding::Object(id)));
            }
        }
        Ok(Control::Next)
    }

    fn type_of(&self, binding: Binding) -> ExecResult<String> {
        Ok(match binding {
            Binding::Object(id) => self.heap.value(id)?.type_name().to_string(),
            Binding::Null | Binding::Primitive(_) => String::new(),
        })
    }

    /// Run the try block. An exception out of it unwinds to the chain and
    /// goes to the first matching handler; the finally block runs after
    /// whatever happened.
    fn exec_try(&mut self, chain: &ControlFlowChain, block: &TryBlock) -> ExecResult<Option<Control>> {
        let depth = self.scopes.len();
        let mut pending = self.exec_nested(&block.evaluation)?;

        if let Some(Control::Throw(exception)) = pending {
            self.unwind(depth)?;
            let ty = self.type_of(exception)?;
            pending = match chain.handler_for(&ty, std_types::EXCEPTION) {
                Some(case) => {
                    trace!(exception = %ty, "caught");
                    self.vars.insert(block.exception.clone(), exception);
                    let outcome = self.exec_nested(case.body_evaluation())?;
                    if let Some(Control::Throw(_)) = outcome {
                        self.unwind(depth)?;
                    }
                    outcome
                }
                None => Some(Control::Throw(exception)),
            };
        }

        if let Some(finally) = chain.finally_block() {
            if let Some(control) = self.exec_nested(&finally.evaluation)? {
                return Ok(Some(control));
            }
        }
        Ok(pending)
    }

    /// Cases run in order and the first match wins. Loops re-run their
    /// single case while it holds.
    fn exec_chain(&mut self, instr: &IrInstr, chain: &ControlFlowChain) -> ExecResult<Option<Control>> {
        if chain.chain_type() == ChainType::TryCatchFinally {
            let block = chain.try_block().ok_or_else(|| malformed(instr))?;
            return self.exec_try(chain, block);
        }
        if let Some(eval) = chain.evaluation_variable() {
            if let Some(control) = self.exec_nested(&eval.setup)? {
                return Ok(Some(control));
            }
        }
        if let Some(ret) = chain.return_variable() {
            if let Some(control) = self.exec_nested(&ret.setup)? {
                return Ok(Some(control));
            }
        }

        if chain.chain_type().is_loop() {
            let case = chain
                .condition_chain()
                .first()
                .ok_or_else(|| malformed(instr))?;
            let mut run_body = chain.chain_type() == ChainType::DoWhileLoop;
            loop {
                if run_body {
                    if let Some(control) = self.exec_nested(case.body_evaluation())? {
                        return Ok(Some(control));
                    }
                    if let Some(control) = self.exec_nested(case.guard_updates())? {
                        return Ok(Some(control));
                    }
                }
                if let Some(control) = self.exec_nested(case.condition_evaluation())? {
                    return Ok(Some(control));
                }
                if !self.primitive(case.primitive_condition())? {
                    break;
                }
                run_body = true;
            }
            return Ok(None);
        }

        let mut selected: Option<Option<&str>> = None;
        for case in chain.condition_chain() {
            if let Some(control) = self.exec_nested(case.condition_evaluation())? {
                return Ok(Some(control));
            }
            if self.primitive(case.primitive_condition())? {
                if let Some(control) = self.exec_nested(case.body_evaluation())? {
                    return Ok(Some(control));
                }
                if let Some(control) = self.exec_nested(case.guard_updates())? {
                    return Ok(Some(control));
                }
                selected = Some(case.body_result());
                break;
            }
        }
        if selected.is_none() {
            if let Some(default) = chain.default_case() {
                if let Some(control) = self.exec_nested(&default.evaluation)? {
                    return Ok(Some(control));
                }
                selected = Some(default.result.as_deref());
            }
        }

        let value = match selected.flatten() {
            Some(name) => Some(self.lookup(name)?),
            None => None,
        };
        if let Some(ret) = chain.return_variable() {
            if let Some(value) = value {
                self.vars.insert(ret.name.clone(), value);
            }
            let binding = self.lookup(&ret.name)?;
            self.bind(instr.result(), binding);
        } else if instr.has_result() {
            self.bind(instr.result(), value.unwrap_or(Binding::Null));
        }
        Ok(None)
    }

    fn exec_logical(&mut self, instr: &IrInstr, operation: &LogicalOperation) -> ExecResult<Option<Control>> {
        if let Some(control) = self.exec_nested(&operation.left_evaluation)? {
            return Ok(Some(control));
        }
        let condition = self.primitive(&operation.condition)?;
        let decided = match operation.op {
            LogicalOp::And => !condition,
            LogicalOp::Or => condition,
        };

        let result = if decided {
            self.lookup(&operation.left_operand)?
        } else {
            if let Some(control) = self.exec_nested(&operation.right_evaluation)? {
                return Ok(Some(control));
            }
            if let Some(control) = self.exec_nested(&operation.result_computation)? {
                return Ok(Some(control));
            }
            self.lookup(&operation.logical_result)?
        };
        self.bind(instr.result(), result);
        Ok(None)
    }
}
