use super::{context::IrGenContext, memory::VariableMemoryManagement};
use crate::{
    ice,
    ir::{
        CallDetails,
        CaseBody,
        CaseCondition,
        ConditionCase,
        ControlFlowChain,
        DebugInfo,
        IrInstr,
        LogicalOp,
        LogicalOperation,
        Opcode,
    },
    typed::{std_types, DispatchKind, Expr, ExprKind, SymbolInfo},
};

/// Lowers expressions. Every operator becomes a call of its method.
pub struct ExprGenerator<'c, 'a> {
    ctx: &'c mut IrGenContext<'a>,
}

impl<'c, 'a> ExprGenerator<'c, 'a> {
    pub fn new(ctx: &'c mut IrGenContext<'a>) -> Self { Self { ctx } }

    /// Emit `expr` into `out`, returning the name bound to its value, or
    /// `None` for a call returning nothing.
    pub fn generate(&mut self, expr: &Expr, out: &mut Vec<IrInstr>) -> Option<String> {
        let debug_info = self.ctx.debug_info(expr.token.as_ref());

        match &expr.kind {
            ExprKind::Literal(text) => Some(self.literal(text, &expr.ty, debug_info, out)),
            ExprKind::Variable(name) => Some(self.variable(name, debug_info, out)),
            ExprKind::EnumConstant(constant) => Some(self.literal(constant, &expr.ty, debug_info, out)),
            ExprKind::Binary {
                op,
                left,
                right,
                operator,
            } => {
                self.check_operator(op, operator);
                let lhs = self.value(left, out);
                let rhs = self.value(right, out);
                self.call(Opcode::Call, &lhs, operator, vec![rhs], debug_info, out)
            }
            ExprKind::Unary {
                op,
                operand,
                operator,
            } => {
                self.check_operator(op, operator);
                let operand = self.value(operand, out);
                self.call(Opcode::Call, &operand, operator, Vec::new(), debug_info, out)
            }
            ExprKind::IsSet(operand) => {
                let value = self.value(operand, out);
                Some(self.is_set(&value, &operand.ty, debug_info, out))
            }
            ExprKind::Logical { op, left, right } => Some(self.logical(*op, left, right, debug_info, out)),
            ExprKind::Call {
                target,
                symbol,
                args,
            } => {
                if symbol.is_constructor() {
                    if let Some(target) = target {
                        self.generate(target, out);
                    }
                    return Some(self.construct(symbol, args, debug_info, out));
                }
                let (opcode, target_object) = match (target, symbol.dispatch()) {
                    (None, _) => (Opcode::CallStatic, symbol.owner().to_string()),
                    // a static member reached through a value still evaluates it
                    (Some(target), DispatchKind::Static) => {
                        self.generate(target, out);
                        (Opcode::CallStatic, symbol.owner().to_string())
                    }
                    (Some(target), DispatchKind::Dispatcher) => {
                        (Opcode::CallDispatcher, self.value(target, out))
                    }
                    (Some(target), DispatchKind::Method) if symbol.is_trait_member() => {
                        (Opcode::CallVirtual, self.value(target, out))
                    }
                    (Some(target), DispatchKind::Method) => (Opcode::Call, self.value(target, out)),
                };
                let mut arguments = Vec::with_capacity(args.len());
                for arg in args {
                    arguments.push(self.value(arg, out));
                }
                self.call(opcode, &target_object, symbol, arguments, debug_info, out)
            }
            ExprKind::List(items) => Some(self.list(items, debug_info, out)),
            ExprKind::Field { object, field } => {
                Some(self.variable(&format!("{}.{}", object, field), debug_info, out))
            }
        }
    }

    /// Like [ExprGenerator::generate], for expressions that must have a
    /// value.
    ///
    /// # Panics
    ///
    /// Panics if the expression returns nothing.
    pub fn value(&mut self, expr: &Expr, out: &mut Vec<IrInstr>) -> String {
        match self.generate(expr, out) {
            Some(value) => value,
            None => ice!("expression of type `{}` used as a value", expr.ty),
        }
    }

    /// The method an operator is lowered to.
    pub fn operator_method(&self, op: &str) -> &'static str {
        match self.ctx.operators().method_for(op) {
            Some(method) => method,
            None => ice!("no method for operator `{}`", op),
        }
    }

    fn check_operator(&self, op: &str, operator: &SymbolInfo) {
        let method = self.operator_method(op);
        if method != operator.name() {
            ice!(
                "operator `{}` resolved to `{}` instead of `{}`",
                op,
                operator.name(),
                method
            );
        }
    }

    fn memory(&self, debug_info: Option<DebugInfo>) -> VariableMemoryManagement {
        VariableMemoryManagement::new(debug_info)
    }

    pub fn literal(
        &mut self,
        value: &str,
        ty: &str,
        debug_info: Option<DebugInfo>,
        out: &mut Vec<IrInstr>,
    ) -> String {
        let temp = self.ctx.temp();
        let scope = self.ctx.current_scope().to_string();
        out.push(IrInstr::load_literal(&temp, value, ty).with_debug_info(debug_info.clone()));
        self.memory(debug_info).retain_and_register(&temp, &scope, out);
        temp
    }

    /// Read a variable. The load aliases the variable's object, so it is
    /// neither retained nor registered.
    pub fn variable(&mut self, name: &str, debug_info: Option<DebugInfo>, out: &mut Vec<IrInstr>) -> String {
        let temp = self.ctx.temp();
        out.push(IrInstr::load(&temp, name).with_debug_info(debug_info));
        temp
    }

    /// Call `symbol` on `target_object`. A result is owned by the current
    /// scope.
    pub fn call(
        &mut self,
        opcode: Opcode,
        target_object: &str,
        symbol: &SymbolInfo,
        arguments: Vec<String>,
        debug_info: Option<DebugInfo>,
        out: &mut Vec<IrInstr>,
    ) -> Option<String> {
        let details = CallDetails::for_symbol(target_object, symbol, arguments, self.ctx.types());
        let result = details.has_result().then(|| self.ctx.temp());
        out.push(IrInstr::call(opcode, result.clone(), details).with_debug_info(debug_info.clone()));
        if let Some(result) = &result {
            let scope = self.ctx.current_scope().to_string();
            self.memory(debug_info).retain_and_register(result, &scope, out);
        }
        result
    }

    /// `ty(args)`: allocate the object, owned by the current scope, then
    /// run its `<init>` on it.
    pub fn construct(
        &mut self,
        symbol: &SymbolInfo,
        args: &[Expr],
        debug_info: Option<DebugInfo>,
        out: &mut Vec<IrInstr>,
    ) -> String {
        let mut arguments = Vec::with_capacity(args.len());
        for arg in args {
            arguments.push(self.value(arg, out));
        }

        let object = self.ctx.temp();
        let scope = self.ctx.current_scope().to_string();
        out.push(IrInstr::alloc_object(&object, symbol.owner()).with_debug_info(debug_info.clone()));
        self.memory(debug_info.clone()).retain_and_register(&object, &scope, out);

        let mut init = SymbolInfo::method(symbol.owner(), symbol.name(), std_types::VOID)
            .with_params(symbol.param_types().iter().cloned());
        if symbol.is_pure() {
            init = init.pure();
        }
        self.call(Opcode::Call, &object, &init, arguments, debug_info, out);
        object
    }

    /// A new List holding `items` in order.
    fn list(&mut self, items: &[Expr], debug_info: Option<DebugInfo>, out: &mut Vec<IrInstr>) -> String {
        let list = self.construct(&SymbolInfo::constructor(std_types::LIST).pure(), &[], debug_info.clone(), out);
        for item in items {
            let value = self.value(item, out);
            let add = SymbolInfo::method(std_types::LIST, "_addAss", std_types::VOID).with_params([item.ty.as_str()]);
            self.call(Opcode::Call, &list, &add, vec![value], debug_info.clone(), out);
        }
        list
    }

    /// Call a method that must return a value.
    pub fn call_value(
        &mut self,
        target_object: &str,
        symbol: &SymbolInfo,
        arguments: Vec<String>,
        out: &mut Vec<IrInstr>,
    ) -> String {
        match self.call(Opcode::Call, target_object, symbol, arguments, None, out) {
            Some(result) => result,
            None => ice!("`{}` returns nothing", symbol.name()),
        }
    }

    /// The backend native truth of a Boolean, through `_true`.
    pub fn primitive(&mut self, value: &str, ty: &str, out: &mut Vec<IrInstr>) -> String {
        let symbol = SymbolInfo::method(ty, "_true", std_types::BOOLEAN).pure();
        let primitive = self.ctx.temp();
        let details = CallDetails::for_symbol(value, &symbol, Vec::new(), self.ctx.types());
        out.push(IrInstr::call_method(Some(primitive.clone()), details));
        primitive
    }

    /// `operand?` as a question operator chain: null yields `false`,
    /// anything else asks the object through `_isSet`.
    pub fn is_set(
        &mut self,
        operand: &str,
        ty: &str,
        debug_info: Option<DebugInfo>,
        out: &mut Vec<IrInstr>,
    ) -> String {
        let scope = self.ctx.current_scope().to_string();

        let is_null = self.ctx.temp();
        let condition = CaseCondition::new(vec![IrInstr::is_null(&is_null, operand)], None, is_null.clone());
        let mut null_body = Vec::new();
        let unset = self.literal("false", std_types::BOOLEAN, None, &mut null_body);
        let null_case = ConditionCase::null_check(
            Some(scope.clone()),
            condition,
            CaseBody::new(null_body, Some(unset)),
        );

        let method = self.operator_method("?");
        let symbol = SymbolInfo::method(ty, method, std_types::BOOLEAN).pure();
        let mut set_body = Vec::new();
        let set = self.call_value(operand, &symbol, Vec::new(), &mut set_body);

        let result = self.ctx.temp();
        let chain = ControlFlowChain::question_operator(
            &result,
            null_case,
            CaseBody::new(set_body, Some(set)),
            scope,
        );
        out.push(IrInstr::control_flow_chain(chain).with_debug_info(debug_info));
        result
    }

    fn logical(
        &mut self,
        op: LogicalOp,
        left: &Expr,
        right: &Expr,
        debug_info: Option<DebugInfo>,
        out: &mut Vec<IrInstr>,
    ) -> String {
        let scope_id = self.ctx.current_scope().to_string();

        let mut left_evaluation = Vec::new();
        let left_operand = self.value(left, &mut left_evaluation);
        let condition = self.primitive(&left_operand, &left.ty, &mut left_evaluation);

        let mut right_evaluation = Vec::new();
        let right_operand = self.value(right, &mut right_evaluation);

        let method = self.operator_method(match op {
            LogicalOp::And => "and",
            LogicalOp::Or => "or",
        });
        let symbol = SymbolInfo::method(&left.ty, method, std_types::BOOLEAN)
            .pure()
            .with_params([right.ty.as_str()]);
        let mut result_computation = Vec::new();
        let logical_result = self.call_value(
            &left_operand,
            &symbol,
            vec![right_operand.clone()],
            &mut result_computation,
        );

        let result = self.ctx.temp();
        let operation = LogicalOperation {
            op,
            left_evaluation,
            left_operand,
            condition,
            right_evaluation,
            right_operand,
            result_computation,
            logical_result,
            scope_id,
        };
        out.push(IrInstr::logical(&result, operation).with_debug_info(debug_info));
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        irgen::{operators::OperatorMap, IrGenConfig},
        typed::{SourceModule, StandardTypes},
    };

    fn add(left: Expr, right: Expr) -> Expr {
        let operator = SymbolInfo::method(std_types::INTEGER, "_add", std_types::INTEGER)
            .pure()
            .with_params([std_types::INTEGER]);
        Expr::binary("+", left, right, operator)
    }

    #[test]
    fn test_binary_is_a_call() {
        let config = IrGenConfig::default();
        let types = StandardTypes::new();
        let operators = OperatorMap::new();
        let module = SourceModule::new("test");
        let mut ctx = IrGenContext::new(&config, &types, &operators, &module);
        ctx.enter_scope("_scope_1");

        let mut out = Vec::new();
        let result = ExprGenerator::new(&mut ctx)
            .value(&add(Expr::integer(1), Expr::integer(2)), &mut out);

        assert_eq!(result, "_temp3");
        let call = out
            .iter()
            .find(|instr| instr.opcode() == Opcode::Call)
            .and_then(IrInstr::call_details)
            .unwrap();
        assert_eq!(call.method_name, "_add");
        assert_eq!(call.target_object, "_temp1");
        assert_eq!(call.arguments, vec!["_temp2"]);
        assert_eq!(out.last().unwrap().to_string(), "SCOPE_REGISTER _temp3, _scope_1");
    }

    fn context<'a>(
        config: &'a IrGenConfig,
        types: &'a StandardTypes,
        operators: &'a OperatorMap,
        module: &'a SourceModule,
    ) -> IrGenContext<'a> {
        let mut ctx = IrGenContext::new(config, types, operators, module);
        ctx.enter_scope("_scope_1");
        ctx
    }

    #[test]
    fn test_static_call_keeps_target_effects() {
        let config = IrGenConfig::default();
        let types = StandardTypes::new();
        let operators = OperatorMap::new();
        let module = SourceModule::new("test");
        let mut ctx = context(&config, &types, &operators, &module);

        let effect = SymbolInfo::function("test::sideEffect", "test::Holder");
        let target = Expr::call(None, effect, Vec::new());
        let member = SymbolInfo::method("test::Holder", "defaultValue", std_types::INTEGER)
            .with_dispatch(DispatchKind::Static);
        let expr = Expr::call(Some(target), member, Vec::new());

        let mut out = Vec::new();
        ExprGenerator::new(&mut ctx).value(&expr, &mut out);
        let calls: Vec<&CallDetails> = out.iter().filter_map(IrInstr::call_details).collect();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].target_type, "test::sideEffect");
        assert_eq!(calls[1].method_name, "defaultValue");
        assert_eq!(calls[1].target_object, "test::Holder");
        assert!(out.iter().all(|instr| instr.opcode() == Opcode::CallStatic || instr.call_details().is_none()));
    }

    #[test]
    fn test_constructor_allocates() {
        let config = IrGenConfig::default();
        let types = StandardTypes::new();
        let operators = OperatorMap::new();
        let module = SourceModule::new("test");
        let mut ctx = context(&config, &types, &operators, &module);

        let symbol = SymbolInfo::constructor("test::Box").pure().with_params([std_types::INTEGER]);
        let mut out = Vec::new();
        let object = ExprGenerator::new(&mut ctx).value(&Expr::call(None, symbol, vec![Expr::integer(5)]), &mut out);

        let rendered: Vec<String> = out.iter().map(IrInstr::to_string).collect();
        assert_eq!(object, "_temp2");
        assert_eq!(out[3].opcode(), Opcode::AllocObject);
        assert_eq!(out[3].type_operand(), Some("test::Box"));
        assert_eq!(rendered[5], "SCOPE_REGISTER _temp2, _scope_1");
        let init = out[6].call_details().unwrap();
        assert_eq!(out[6].opcode(), Opcode::Call);
        assert!(init.is_constructor());
        assert_eq!(init.target_object, "_temp2");
        assert_eq!(init.arguments, vec!["_temp1"]);
        assert!(init.metadata.is_pure());
        assert_eq!(out.len(), 7);
    }

    #[test]
    fn test_list_literal_adds_items() {
        let config = IrGenConfig::default();
        let types = StandardTypes::new();
        let operators = OperatorMap::new();
        let module = SourceModule::new("test");
        let mut ctx = context(&config, &types, &operators, &module);

        let mut out = Vec::new();
        let list = ExprGenerator::new(&mut ctx).value(&Expr::list(vec![Expr::integer(1), Expr::integer(2)]), &mut out);
        let adds: Vec<&CallDetails> = out
            .iter()
            .filter_map(IrInstr::call_details)
            .filter(|details| details.method_name == "_addAss")
            .collect();
        assert_eq!(adds.len(), 2);
        assert!(adds.iter().all(|add| add.target_object == list));
    }

    #[test]
    #[should_panic(expected = "internal compiler error")]
    fn test_mismatched_operator() {
        let config = IrGenConfig::default();
        let types = StandardTypes::new();
        let operators = OperatorMap::new();
        let module = SourceModule::new("test");
        let mut ctx = IrGenContext::new(&config, &types, &operators, &module);
        ctx.enter_scope("_scope_1");

        let operator = SymbolInfo::method(std_types::INTEGER, "_sub", std_types::INTEGER);
        let expr = Expr::binary("+", Expr::integer(1), Expr::integer(2), operator);
        ExprGenerator::new(&mut ctx).value(&expr, &mut Vec::new());
    }
}
