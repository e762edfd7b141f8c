use super::{
    chain::ControlFlowChainGenerator,
    context::IrGenContext,
    expr::ExprGenerator,
    memory::VariableMemoryManagement,
};
use crate::{
    ice,
    ir::{
        CaseBody,
        CaseCondition,
        ChainType,
        ConditionCase,
        ControlFlowChain,
        DebugInfo,
        EnumOptimizationInfo,
        EvaluationVariable,
        FinallyBlock,
        GuardVariables,
        IrInstr,
        LogicalOp,
        ReturnVariable,
        TryBlock,
    },
    typed::{std_types, Catch, Expr, ExprKind, Guard, Stmt, StmtKind, SwitchCase, SwitchMatch, SymbolInfo},
};

/// Lowers statements. Conditionals and loops become control flow chains,
/// each condition in a scope of its own and each body in another.
pub struct StmtGenerator<'c, 'a> {
    ctx: &'c mut IrGenContext<'a>,
}

impl<'c, 'a> StmtGenerator<'c, 'a> {
    pub fn new(ctx: &'c mut IrGenContext<'a>) -> Self { Self { ctx } }

    fn expr(&mut self) -> ExprGenerator<'_, 'a> { ExprGenerator::new(self.ctx) }

    /// Emit `stmts` up to the first one that leaves the operation. Returns
    /// whether such a statement was reached.
    pub fn generate_block(&mut self, stmts: &[Stmt], out: &mut Vec<IrInstr>) -> bool {
        for stmt in stmts {
            self.generate(stmt, out);
            if stmt.departs() {
                return true;
            }
        }
        false
    }

    pub fn generate(&mut self, stmt: &Stmt, out: &mut Vec<IrInstr>) {
        let debug_info = self.ctx.debug_info(stmt.token.as_ref());
        let memory = VariableMemoryManagement::new(debug_info.clone());

        match &stmt.kind {
            StmtKind::Declare { name, ty, init } => {
                let scope = self.ctx.current_scope().to_string();
                memory.declare(name, ty, &scope, out);
                if let Some(init) = init {
                    let value = self.expr().value(init, out);
                    memory.initialise(name, &value, out);
                }
                self.ctx.declare(name.as_str(), ty.as_str(), false);
            }
            StmtKind::Assign { name, value } => {
                self.check_assignable(name);
                let value = self.expr().value(value, out);
                memory.assign(name, &value, out);
            }
            StmtKind::AssignField { object, field, value } => {
                let value = self.expr().value(value, out);
                memory.assign(&format!("{}.{}", object, field), &value, out);
            }
            StmtKind::GuardedAssign { name, value } => {
                self.guarded_assignment(name, value, debug_info, out);
            }
            StmtKind::Expr(expr) => {
                self.expr().generate(expr, out);
            }
            StmtKind::If {
                guard,
                branches,
                otherwise,
            } => self.if_chain(guard.as_ref(), branches, otherwise.as_deref(), debug_info, out),
            StmtKind::Switch {
                guard,
                subject,
                cases,
                default,
                returning,
            } => self.switch(
                guard.as_ref(),
                subject,
                cases,
                default.as_deref(),
                returning.as_ref(),
                debug_info,
                out,
            ),
            StmtKind::While { guard, condition, body } => {
                self.while_loop(guard.as_ref(), condition, body, debug_info, out);
            }
            StmtKind::DoWhile { body, condition } => {
                self.loop_chain(ChainType::DoWhileLoop, condition, body, None, debug_info, out);
            }
            StmtKind::ForIn {
                variable,
                ty,
                collection,
                body,
            } => self.for_in(variable, ty, collection, body, debug_info, out),
            StmtKind::ForRange {
                variable,
                ty,
                start,
                end,
                by,
                body,
            } => self.for_range(variable, ty, (start, end, by.as_ref()), body, debug_info, out),
            StmtKind::Try { body, catches, finally } => {
                self.try_chain(body, catches, finally.as_deref(), debug_info, out);
            }
            StmtKind::Return(value) => {
                if self.ctx.in_finally() {
                    ice!("return out of a finally block");
                }
                if self.ctx.returns_past_finally() {
                    ice!("return out of a try block with a finally block");
                }
                let value = value.as_ref().map(|value| self.expr().value(value, out));
                if let Some(value) = &value {
                    out.push(IrInstr::retain(value.as_str()).with_debug_info(debug_info.clone()));
                }
                memory.exits(&self.ctx.open_scopes(), out);
                out.push(IrInstr::ret(value).with_debug_info(debug_info));
            }
            StmtKind::Throw(value) => {
                if self.ctx.in_finally() {
                    ice!("throw out of a finally block");
                }
                let value = self.expr().value(value, out);
                out.push(IrInstr::retain(value.as_str()).with_debug_info(debug_info.clone()));
                memory.exits(&self.ctx.scopes_to_handler(), out);
                out.push(IrInstr::throw(value).with_debug_info(debug_info));
            }
            StmtKind::Assert(condition) => {
                let mut expr = self.expr();
                let value = expr.value(condition, out);
                let primitive = expr.primitive(&value, &condition.ty, out);
                out.push(IrInstr::assert(primitive).with_debug_info(debug_info));
            }
        }
    }

    /// # Panics
    ///
    /// Panics if `name` is a parameter.
    fn check_assignable(&self, name: &str) {
        if self.ctx.lookup(name).map(|entry| entry.is_param).unwrap_or(false) {
            ice!("assignment to parameter `{}`", name);
        }
    }

    /// Emit `stmts` in a new scope, returning the scope id.
    fn scoped_body(&mut self, stmts: &[Stmt], out: &mut Vec<IrInstr>) -> String {
        let scope = self.ctx.new_scope_id();
        out.push(IrInstr::scope_enter(scope.as_str()));
        self.ctx.enter_scope(scope.as_str());
        let departs = self.generate_block(stmts, out);
        self.ctx.exit_scope(&scope);
        // a departure has exited every scope already
        if !departs {
            out.push(IrInstr::scope_exit(scope.as_str()));
        }
        scope
    }

    /// Evaluate a Boolean condition in a tight scope, down to its
    /// primitive truth. Returns the condition and its scope id.
    fn condition(&mut self, condition: &Expr) -> (CaseCondition, String) {
        let scope = self.ctx.new_scope_id();
        let mut evaluation = vec![IrInstr::scope_enter(scope.as_str())];
        self.ctx.enter_scope(scope.as_str());

        let mut expr = self.expr();
        let result = expr.value(condition, &mut evaluation);
        let primitive = expr.primitive(&result, &condition.ty, &mut evaluation);

        self.ctx.exit_scope(&scope);
        evaluation.push(IrInstr::scope_exit(scope.as_str()));
        (CaseCondition::new(evaluation, Some(result), primitive), scope)
    }

    /// `if name <- init`: the guard variable in a scope of its own, which
    /// is left open for the chain.
    fn guard_variables(&mut self, guard: &Guard) -> GuardVariables {
        let scope = self.ctx.new_scope_id();
        self.ctx.enter_scope(scope.as_str());

        let memory = VariableMemoryManagement::new(None);
        let mut setup = Vec::new();
        memory.declare(&guard.name, &guard.ty, &scope, &mut setup);
        let value = self.expr().value(&guard.init, &mut setup);
        memory.initialise(&guard.name, &value, &mut setup);
        self.ctx.declare(guard.name.as_str(), guard.ty.as_str(), false);

        GuardVariables {
            variables: vec![guard.name.clone()],
            guard_scope_setup: setup,
            guard_scope_id: scope,
            condition_scope_id: None,
        }
    }

    fn if_chain(
        &mut self,
        guard: Option<&Guard>,
        branches: &[(Expr, Vec<Stmt>)],
        otherwise: Option<&[Stmt]>,
        debug_info: Option<DebugInfo>,
        out: &mut Vec<IrInstr>,
    ) {
        if branches.is_empty() {
            ice!("if without a condition");
        }
        let guards = guard.map(|guard| self.guard_variables(guard));

        let scope = self.ctx.new_scope_id();
        self.ctx.enter_scope(scope.as_str());

        let mut cases = Vec::with_capacity(branches.len());
        for (index, (condition, body)) in branches.iter().enumerate() {
            // a guarded first branch only runs when the guard got a value
            let guarded;
            let condition = match guard {
                Some(guard) if index == 0 => {
                    let variable = Expr::variable(guard.name.as_str(), guard.ty.as_str());
                    guarded = Expr::logical(LogicalOp::And, Expr::is_set(variable), condition.clone());
                    &guarded
                }
                Some(_) | None => condition,
            };
            let (case_condition, condition_scope) = self.condition(condition);
            let mut evaluation = Vec::new();
            let body_scope = self.scoped_body(body, &mut evaluation);
            cases.push(
                ConditionCase::expression(
                    Some(condition_scope),
                    case_condition,
                    CaseBody::new(evaluation, None),
                )
                .with_body_scope(body_scope),
            );
        }

        let chain_type = if cases.len() == 1 {
            ChainType::IfElse
        } else {
            ChainType::IfElseIf
        };
        let mut builder = ControlFlowChain::builder(chain_type, scope.as_str()).cases(cases);
        if let Some(otherwise) = otherwise {
            let mut evaluation = Vec::new();
            self.scoped_body(otherwise, &mut evaluation);
            builder = builder.default_case(CaseBody::new(evaluation, None));
        }

        self.ctx.exit_scope(&scope);
        if let Some(guards) = &guards {
            self.ctx.exit_scope(&guards.guard_scope_id);
        }
        out.extend(ControlFlowChainGenerator::apply(builder.build(), guards, debug_info));
    }

    /// `returning name <- init`: declared in the enclosing scope, so the
    /// value outlives the chain.
    fn return_variable(&mut self, returning: &Guard) -> ReturnVariable {
        let scope = self.ctx.current_scope().to_string();
        let memory = VariableMemoryManagement::new(None);
        let mut setup = Vec::new();
        memory.declare(&returning.name, &returning.ty, &scope, &mut setup);
        let value = self.expr().value(&returning.init, &mut setup);
        memory.initialise(&returning.name, &value, &mut setup);
        self.ctx.declare(returning.name.as_str(), returning.ty.as_str(), false);

        ReturnVariable {
            name: returning.name.clone(),
            ty: returning.ty.clone(),
            setup,
        }
    }

    /// Compare the switched value with one case, `subject == candidate`.
    fn switch_condition(&mut self, subject: &str, subject_ty: &str, matches: &SwitchMatch) -> (CaseCondition, String) {
        let scope = self.ctx.new_scope_id();
        let mut evaluation = vec![IrInstr::scope_enter(scope.as_str())];
        self.ctx.enter_scope(scope.as_str());

        let mut expr = self.expr();
        let candidate = match matches {
            SwitchMatch::Literal(candidate) => expr.value(candidate, &mut evaluation),
            SwitchMatch::EnumConstant(constant) => expr.literal(constant, subject_ty, None, &mut evaluation),
        };
        let method = expr.operator_method("==");
        let symbol = SymbolInfo::method(subject_ty, method, std_types::BOOLEAN)
            .pure()
            .with_params([subject_ty]);
        let result = expr.call_value(subject, &symbol, vec![candidate], &mut evaluation);
        let primitive = expr.primitive(&result, std_types::BOOLEAN, &mut evaluation);

        self.ctx.exit_scope(&scope);
        evaluation.push(IrInstr::scope_exit(scope.as_str()));
        (CaseCondition::new(evaluation, Some(result), primitive), scope)
    }

    fn switch(
        &mut self,
        guard: Option<&Guard>,
        subject: &Expr,
        cases: &[SwitchCase],
        default: Option<&[Stmt]>,
        returning: Option<&Guard>,
        debug_info: Option<DebugInfo>,
        out: &mut Vec<IrInstr>,
    ) {
        // declared before the guard scope opens, so it outlives the chain
        let return_variable = returning.map(|returning| self.return_variable(returning));
        let guards = guard.map(|guard| self.guard_variables(guard));

        let scope = self.ctx.new_scope_id();
        self.ctx.enter_scope(scope.as_str());

        let mut setup = Vec::new();
        let subject_value = self.expr().value(subject, &mut setup);

        let all_constants = !cases.is_empty()
            && cases
                .iter()
                .all(|case| matches!(case.matches, SwitchMatch::EnumConstant(_)));
        let enum_type = self
            .ctx
            .enum_type(&subject.ty)
            .filter(|_| all_constants);

        let mut condition_cases = Vec::with_capacity(cases.len());
        let mut values = Vec::new();
        let mut ordinals = Vec::new();
        for case in cases {
            let (condition, condition_scope) = self.switch_condition(&subject_value, &subject.ty, &case.matches);
            let mut evaluation = Vec::new();
            let body_scope = self.scoped_body(&case.body, &mut evaluation);
            let body = CaseBody::new(evaluation, None);

            let condition_case = match (&case.matches, enum_type) {
                (SwitchMatch::EnumConstant(constant), Some(enum_type)) => {
                    let Some(ordinal) = enum_type.ordinal(constant) else {
                        ice!("`{}` is not a constant of `{}`", constant, enum_type.name);
                    };
                    values.push(constant.clone());
                    ordinals.push(ordinal);
                    ConditionCase::enum_constant(Some(condition_scope), constant.as_str(), ordinal, condition, body)
                }
                (SwitchMatch::Literal(Expr { kind: ExprKind::Literal(_), .. }), _)
                | (SwitchMatch::EnumConstant(_), None) => {
                    ConditionCase::literal(Some(condition_scope), condition, body)
                }
                (SwitchMatch::Literal(_), _) => ConditionCase::expression(Some(condition_scope), condition, body),
            };
            condition_cases.push(condition_case.with_body_scope(body_scope));
        }

        let chain_type = match enum_type {
            Some(_) => ChainType::SwitchEnum,
            None => ChainType::Switch,
        };
        let mut builder = ControlFlowChain::builder(chain_type, scope.as_str())
            .evaluation_variable(EvaluationVariable {
                name: subject_value,
                ty: subject.ty.clone(),
                setup,
            })
            .cases(condition_cases);

        if let Some(enum_type) = enum_type {
            let is_exhaustive = default.is_none() && enum_type.constants.iter().all(|c| values.contains(c));
            builder = builder.enum_optimization(EnumOptimizationInfo::new(
                enum_type.name.as_str(),
                values,
                ordinals,
                is_exhaustive,
            ));
        }
        if let Some(return_variable) = return_variable {
            builder = builder.return_variable(return_variable);
        }
        if let Some(default) = default {
            let mut evaluation = Vec::new();
            self.scoped_body(default, &mut evaluation);
            builder = builder.default_case(CaseBody::new(evaluation, None));
        }

        self.ctx.exit_scope(&scope);
        if let Some(guards) = &guards {
            self.ctx.exit_scope(&guards.guard_scope_id);
        }
        out.extend(ControlFlowChainGenerator::apply(builder.build(), guards, debug_info));
    }

    /// A guarded loop only runs while its guard has a value, and
    /// re-evaluates the guard after every pass.
    fn while_loop(
        &mut self,
        guard: Option<&Guard>,
        condition: &Expr,
        body: &[Stmt],
        debug_info: Option<DebugInfo>,
        out: &mut Vec<IrInstr>,
    ) {
        let Some(guard) = guard else {
            self.loop_chain(ChainType::WhileLoop, condition, body, None, debug_info, out);
            return;
        };
        let guards = self.guard_variables(guard);
        let variable = Expr::variable(guard.name.as_str(), guard.ty.as_str());
        let guarded = Expr::logical(LogicalOp::And, Expr::is_set(variable), condition.clone());

        let mut chain = Vec::new();
        self.loop_chain(ChainType::WhileLoop, &guarded, body, Some(guard), debug_info, &mut chain);
        self.ctx.exit_scope(&guards.guard_scope_id);

        out.push(IrInstr::scope_enter(guards.guard_scope_id.as_str()));
        out.extend(guards.guard_scope_setup);
        out.extend(chain);
        out.push(IrInstr::scope_exit(guards.guard_scope_id));
    }

    /// Evaluate a guard's initialiser again and rebind its variable.
    fn guard_update(&mut self, guard: &Guard) -> Vec<IrInstr> {
        let scope = self.ctx.new_scope_id();
        let mut updates = vec![IrInstr::scope_enter(scope.as_str())];
        self.ctx.enter_scope(scope.as_str());
        let value = self.expr().value(&guard.init, &mut updates);
        VariableMemoryManagement::new(None).assign(&guard.name, &value, &mut updates);
        self.ctx.exit_scope(&scope);
        updates.push(IrInstr::scope_exit(scope.as_str()));
        updates
    }

    fn loop_chain(
        &mut self,
        chain_type: ChainType,
        condition: &Expr,
        body: &[Stmt],
        guard: Option<&Guard>,
        debug_info: Option<DebugInfo>,
        out: &mut Vec<IrInstr>,
    ) {
        let scope = self.ctx.new_scope_id();
        self.ctx.enter_scope(scope.as_str());

        let mut evaluation = Vec::new();
        let (case_condition, condition_scope, body_scope) = match chain_type {
            ChainType::DoWhileLoop => {
                let body_scope = self.scoped_body(body, &mut evaluation);
                let (case_condition, condition_scope) = self.condition(condition);
                (case_condition, condition_scope, body_scope)
            }
            ChainType::QuestionOperator
            | ChainType::IfElse
            | ChainType::IfElseIf
            | ChainType::Switch
            | ChainType::SwitchEnum
            | ChainType::GuardedAssignment
            | ChainType::WhileLoop
            | ChainType::TryCatchFinally => {
                let (case_condition, condition_scope) = self.condition(condition);
                let body_scope = self.scoped_body(body, &mut evaluation);
                (case_condition, condition_scope, body_scope)
            }
        };
        let updates = guard.map(|guard| self.guard_update(guard)).unwrap_or_default();
        let case = ConditionCase::expression(
            Some(condition_scope),
            case_condition,
            CaseBody::new(evaluation, None),
        )
        .with_body_scope(body_scope)
        .with_guard_updates(updates);

        self.ctx.exit_scope(&scope);
        let chain = ControlFlowChain::builder(chain_type, scope.as_str())
            .case(case)
            .build();
        out.extend(ControlFlowChainGenerator::apply(chain, None, debug_info));
    }

    /// `for variable in collection`: the collection's iterator drives a
    /// while loop whose body first takes the next element.
    fn for_in(
        &mut self,
        variable: &str,
        ty: &str,
        collection: &Expr,
        body: &[Stmt],
        debug_info: Option<DebugInfo>,
        out: &mut Vec<IrInstr>,
    ) {
        let scope = self.ctx.new_scope_id();
        out.push(IrInstr::scope_enter(scope.as_str()));
        self.ctx.enter_scope(scope.as_str());

        let mut expr = self.expr();
        let items = expr.value(collection, out);
        let iterator_symbol = SymbolInfo::method(collection.ty.as_str(), "iterator", std_types::ITERATOR).pure();
        let iterator = expr.call_value(&items, &iterator_symbol, Vec::new(), out);
        VariableMemoryManagement::new(debug_info.clone()).declare(variable, ty, &scope, out);
        self.ctx.declare(variable, ty, false);

        let cursor = || Some(Expr::variable(iterator.as_str(), std_types::ITERATOR));
        let has_next = SymbolInfo::method(std_types::ITERATOR, "hasNext", std_types::BOOLEAN).pure();
        let next = SymbolInfo::method(std_types::ITERATOR, "next", ty);
        let condition = Expr::call(cursor(), has_next, Vec::new());
        let mut loop_body = vec![Stmt::assign(variable, Expr::call(cursor(), next, Vec::new()))];
        loop_body.extend(body.iter().cloned());
        self.loop_chain(ChainType::WhileLoop, &condition, &loop_body, None, debug_info, out);

        self.ctx.exit_scope(&scope);
        out.push(IrInstr::scope_exit(scope));
    }

    /// `for variable in start ... end by step`. The direction is decided
    /// once by comparing the ends: ascending and descending each get a
    /// loop, equal ends run the body once. A step must point towards the
    /// end.
    fn for_range(
        &mut self,
        variable: &str,
        ty: &str,
        (start, end, by): (&Expr, &Expr, Option<&Expr>),
        body: &[Stmt],
        debug_info: Option<DebugInfo>,
        out: &mut Vec<IrInstr>,
    ) {
        let scope = self.ctx.new_scope_id();
        out.push(IrInstr::scope_enter(scope.as_str()));
        self.ctx.enter_scope(scope.as_str());

        let memory = VariableMemoryManagement::new(debug_info.clone());
        let mut expr = self.expr();
        let from = expr.value(start, out);
        let to = expr.value(end, out);
        let step = by.map(|by| expr.value(by, out));
        memory.declare(variable, ty, &scope, out);
        memory.initialise(variable, &from, out);
        self.ctx.declare(variable, ty, false);

        let method = |name: &str, returns: &str, params: &[&str]| {
            SymbolInfo::method(ty, name, returns).pure().with_params(params.iter().copied())
        };
        let value = |name: &str| Expr::variable(name, ty);
        let direction = Expr::call(
            Some(value(&from)),
            method("_cmp", std_types::INTEGER, &[ty]),
            vec![value(&to)],
        );
        let direction = self.expr().value(&direction, out);
        let towards = |method_name: &str| {
            let compare = SymbolInfo::method(std_types::INTEGER, method_name, std_types::BOOLEAN)
                .pure()
                .with_params([std_types::INTEGER]);
            Expr::call(Some(Expr::variable(direction.as_str(), std_types::INTEGER)), compare, vec![Expr::integer(0)])
        };

        let mut branches = Vec::with_capacity(2);
        for (ascending, bound, unit_step) in [(true, "_lteq", "_inc"), (false, "_gteq", "_dec")] {
            let advance = match &step {
                Some(step) => Expr::call(Some(value(variable)), method("_add", ty, &[ty]), vec![value(step)]),
                None => Expr::call(Some(value(variable)), method(unit_step, ty, &[]), Vec::new()),
            };
            let mut stmts = Vec::new();
            if let Some(step) = &step {
                let stepped = Expr::call(Some(value(&from)), method("_add", ty, &[ty]), vec![value(step)]);
                let compare = if ascending { "_gt" } else { "_lt" };
                stmts.push(Stmt::assert(Expr::call(
                    Some(stepped),
                    method(compare, std_types::BOOLEAN, &[ty]),
                    vec![value(&from)],
                )));
            }
            let in_range = Expr::call(Some(value(variable)), method(bound, std_types::BOOLEAN, &[ty]), vec![value(&to)]);
            let mut loop_body = body.to_vec();
            loop_body.push(Stmt::assign(variable, advance));
            stmts.push(Stmt::new(StmtKind::While {
                guard: None,
                condition: in_range,
                body: loop_body,
            }));
            branches.push((towards(if ascending { "_lt" } else { "_gt" }), stmts));
        }
        self.if_chain(None, &branches, Some(body), debug_info, out);

        self.ctx.exit_scope(&scope);
        out.push(IrInstr::scope_exit(scope));
    }

    /// `try` with its catches and finally block. A throw inside exits the
    /// scopes opened since the chain; the exception is then handed to the
    /// catch whose variable takes over its reference.
    fn try_chain(
        &mut self,
        body: &[Stmt],
        catches: &[Catch],
        finally: Option<&[Stmt]>,
        debug_info: Option<DebugInfo>,
        out: &mut Vec<IrInstr>,
    ) {
        let scope = self.ctx.new_scope_id();
        self.ctx.enter_scope(scope.as_str());
        self.ctx.enter_handler(finally.is_some());

        let mut evaluation = Vec::new();
        let try_scope = self.scoped_body(body, &mut evaluation);
        let exception = self.ctx.temp();

        let mut cases = Vec::with_capacity(catches.len());
        for catch in catches {
            let catch_scope = self.ctx.new_scope_id();
            let mut handler = vec![IrInstr::scope_enter(catch_scope.as_str())];
            self.ctx.enter_scope(catch_scope.as_str());
            handler.push(IrInstr::reference(catch.variable.as_str(), catch.exception_type.as_str()));
            handler.push(IrInstr::store(catch.variable.as_str(), exception.as_str()));
            handler.push(IrInstr::scope_register(catch.variable.as_str(), catch_scope.as_str()));
            self.ctx.declare(catch.variable.as_str(), catch.exception_type.as_str(), false);
            let departs = self.generate_block(&catch.body, &mut handler);
            self.ctx.exit_scope(&catch_scope);
            if !departs {
                handler.push(IrInstr::scope_exit(catch_scope.as_str()));
            }
            cases.push(
                ConditionCase::exception_handler(
                    None,
                    catch.exception_type.as_str(),
                    catch.variable.as_str(),
                    CaseBody::new(handler, None),
                )
                .with_body_scope(catch_scope),
            );
        }
        self.ctx.exit_handler();

        let mut builder = ControlFlowChain::builder(ChainType::TryCatchFinally, scope.as_str())
            .try_block(TryBlock {
                scope_id: try_scope,
                evaluation,
                exception,
            })
            .cases(cases);
        if let Some(finally) = finally {
            self.ctx.enter_finally();
            let mut evaluation = Vec::new();
            let finally_scope = self.scoped_body(finally, &mut evaluation);
            self.ctx.exit_finally();
            builder = builder.finally_block(FinallyBlock {
                scope_id: finally_scope,
                evaluation,
            });
        }

        self.ctx.exit_scope(&scope);
        out.extend(ControlFlowChainGenerator::apply(builder.build(), None, debug_info));
    }

    /// `name :=? value` assigns only while `name` is unset.
    fn guarded_assignment(
        &mut self,
        name: &str,
        value: &Expr,
        debug_info: Option<DebugInfo>,
        out: &mut Vec<IrInstr>,
    ) {
        self.check_assignable(name);
        let ty = self
            .ctx
            .lookup(name)
            .map(|entry| entry.ty.clone())
            .unwrap_or_else(|| value.ty.clone());

        let scope = self.ctx.new_scope_id();
        self.ctx.enter_scope(scope.as_str());

        let condition_scope = self.ctx.new_scope_id();
        let mut evaluation = vec![IrInstr::scope_enter(condition_scope.as_str())];
        self.ctx.enter_scope(condition_scope.as_str());
        let mut expr = self.expr();
        let current = expr.variable(name, None, &mut evaluation);
        let is_set = expr.is_set(&current, &ty, None, &mut evaluation);
        let not = SymbolInfo::method(std_types::BOOLEAN, "_not", std_types::BOOLEAN).pure();
        let unset = expr.call_value(&is_set, &not, Vec::new(), &mut evaluation);
        let primitive = expr.primitive(&unset, std_types::BOOLEAN, &mut evaluation);
        self.ctx.exit_scope(&condition_scope);
        evaluation.push(IrInstr::scope_exit(condition_scope.as_str()));

        let body_scope = self.ctx.new_scope_id();
        let mut body = vec![IrInstr::scope_enter(body_scope.as_str())];
        self.ctx.enter_scope(body_scope.as_str());
        let assigned = self.expr().value(value, &mut body);
        VariableMemoryManagement::new(debug_info.clone()).assign(name, &assigned, &mut body);
        self.ctx.exit_scope(&body_scope);
        body.push(IrInstr::scope_exit(body_scope.as_str()));

        let case = ConditionCase::expression(
            Some(condition_scope),
            CaseCondition::new(evaluation, Some(unset), primitive),
            CaseBody::new(body, None),
        )
        .with_body_scope(body_scope);

        self.ctx.exit_scope(&scope);
        let chain = ControlFlowChain::guarded_assignment(case, scope.as_str());
        out.extend(ControlFlowChainGenerator::apply(chain, None, debug_info));
    }
}
