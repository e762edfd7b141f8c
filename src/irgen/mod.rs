//! # IR Construction
//!
//! Lowers typed syntax into the IR of a compilation unit. Every construct of
//! a module is generated independently, so constructs are built in parallel
//! and assembled in source order.
//!
//! Expressions are flattened into temporaries, operators become method
//! calls, and every object gets explicit reference counting instructions
//! tied to the scope that releases it.

pub mod chain;
pub mod context;
pub mod expr;
pub mod memory;
pub mod operators;
pub mod stmt;

pub use chain::ControlFlowChainGenerator;
pub use context::{IrGenContext, SymbolEntry};
pub use expr::ExprGenerator;
pub use memory::VariableMemoryManagement;
pub use operators::{OperatorDetails, OperatorMap};
pub use stmt::StmtGenerator;
use tracing::{debug, trace};

use crate::{
    ir::{Block, CompilationUnit, ConstructKind, IrConstruct, IrInstr, Operation, SourceToken},
    typed::{std_types, ClassDfn, ConstructDfn, Expr, FunctionDfn, ProgramDfn, SourceModule, Stmt, TypeOracle},
};

/// The operation a function construct is invoked through.
pub const FUNCTION_OPERATION: &str = "_call";
/// The operation running a program.
pub const PROGRAM_OPERATION: &str = "_main";
/// The operation initialising the fields of a class instance.
pub const INSTANCE_INIT_OPERATION: &str = "i_init";

#[derive(Debug, Clone, Default)]
pub struct IrGenConfig {
    /// Attach source positions to instructions.
    pub debug_info: bool,
}

pub trait IrGen {
    type Output;

    fn irgen(&self, ctx: &mut IrGenContext<'_>, out: &mut Vec<IrInstr>) -> Self::Output;
}

impl IrGen for Expr {
    type Output = Option<String>;

    fn irgen(&self, ctx: &mut IrGenContext<'_>, out: &mut Vec<IrInstr>) -> Self::Output {
        ExprGenerator::new(ctx).generate(self, out)
    }
}

impl IrGen for Stmt {
    type Output = ();

    fn irgen(&self, ctx: &mut IrGenContext<'_>, out: &mut Vec<IrInstr>) -> Self::Output {
        StmtGenerator::new(ctx).generate(self, out)
    }
}

/// Build one operation: a single entry block whose statements run in an
/// outer scope holding the parameters.
pub fn generate_operation(
    ctx: &mut IrGenContext<'_>,
    name: &str,
    params: &[(String, String)],
    return_type: &str,
    body: &[Stmt],
    token: Option<&SourceToken>,
) -> Operation {
    let entry_label = ctx.label("_entry");
    let scope = ctx.new_scope_id();

    let mut instrs = vec![IrInstr::scope_enter(scope.as_str())];
    ctx.enter_scope(scope.as_str());
    for (param, ty) in params {
        ctx.declare(param.as_str(), ty.as_str(), true);
    }
    let departs = StmtGenerator::new(ctx).generate_block(body, &mut instrs);
    ctx.exit_scope(&scope);
    if !departs {
        instrs.push(IrInstr::scope_exit(scope.as_str()));
        instrs.push(IrInstr::ret(None));
    }

    let mut operation = params
        .iter()
        .fold(Operation::new(name, return_type), |operation, (param, ty)| {
            operation.with_parameter(param.as_str(), ty.as_str())
        })
        .with_debug_info(ctx.debug_info(token));

    let body = operation.body_mut();
    let entry = Block::new(body, entry_label);
    entry.extend_instrs(body, instrs);

    trace!(operation = name, "generated");
    operation
}

/// Shared, read-only inputs of the generation of every construct.
struct UnitGen<'a> {
    config: &'a IrGenConfig,
    types: &'a dyn TypeOracle,
    operators: &'a OperatorMap,
    module: &'a SourceModule,
}

impl<'a> UnitGen<'a> {
    /// Every operation gets a fresh context, restarting all numbering.
    fn context(&self) -> IrGenContext<'a> { IrGenContext::new(self.config, self.types, self.operators, self.module) }

    fn function(&self, function: &FunctionDfn) -> IrConstruct {
        let mut ctx = self.context();
        let mut construct = IrConstruct::new(function.name.as_str(), ConstructKind::Function)
            .with_debug_info(ctx.debug_info(function.token.as_ref()));
        construct.add_operation(generate_operation(
            &mut ctx,
            FUNCTION_OPERATION,
            &function.params,
            &function.return_type,
            &function.body,
            function.token.as_ref(),
        ));
        construct
    }

    fn class(&self, class: &ClassDfn) -> IrConstruct {
        let mut construct = IrConstruct::new(class.name.as_str(), class.kind)
            .with_debug_info(self.context().debug_info(class.token.as_ref()));
        for field in &class.fields {
            construct.add_field(field.name.as_str(), field.ty.as_str());
        }
        if class.fields.iter().any(|field| field.init.is_some()) {
            construct.add_operation(self.instance_init(class));
        }
        for method in &class.methods {
            let mut ctx = self.context();
            construct.add_operation(generate_operation(
                &mut ctx,
                &method.name,
                &method.params,
                &method.return_type,
                &method.body,
                method.token.as_ref(),
            ));
        }
        construct
    }

    /// Assign the initial value of every field that declares one.
    fn instance_init(&self, class: &ClassDfn) -> Operation {
        let mut ctx = self.context();
        let entry_label = ctx.label("_entry");
        let scope = ctx.new_scope_id();
        let memory = VariableMemoryManagement::new(None);

        let mut instrs = vec![IrInstr::scope_enter(scope.as_str())];
        ctx.enter_scope(scope.as_str());
        for field in &class.fields {
            let Some(init) = &field.init else {
                continue;
            };
            let value = ExprGenerator::new(&mut ctx).value(init, &mut instrs);
            memory.initialise(&format!("this.{}", field.name), &value, &mut instrs);
        }
        ctx.exit_scope(&scope);
        instrs.push(IrInstr::scope_exit(scope.as_str()));
        instrs.push(IrInstr::ret(None));

        let mut operation = Operation::new(INSTANCE_INIT_OPERATION, std_types::VOID);
        let body = operation.body_mut();
        let entry = Block::new(body, entry_label);
        entry.extend_instrs(body, instrs);
        operation
    }

    fn program(&self, program: &ProgramDfn) -> IrConstruct {
        let mut ctx = self.context();
        let mut construct = IrConstruct::new(program.name.as_str(), ConstructKind::Program)
            .with_debug_info(ctx.debug_info(program.token.as_ref()));
        construct.add_operation(generate_operation(
            &mut ctx,
            PROGRAM_OPERATION,
            &[],
            std_types::VOID,
            &program.body,
            program.token.as_ref(),
        ));
        construct
    }

    fn construct(&self, dfn: &ConstructDfn) -> IrConstruct {
        match dfn {
            ConstructDfn::Function(function) => self.function(function),
            ConstructDfn::Class(class) => self.class(class),
            ConstructDfn::Program(program) => self.program(program),
        }
    }
}

/// Build the compilation unit of `module`, one thread per construct.
///
/// # Panics
///
/// Panics with an internal compiler error if the typed input breaks an
/// invariant of IR construction. A panic on a construct's thread is
/// propagated as is.
pub fn generate_unit(module: &SourceModule, types: &dyn TypeOracle, config: &IrGenConfig) -> CompilationUnit {
    let operators = OperatorMap::new();
    let unit_gen = UnitGen {
        config,
        types,
        operators: &operators,
        module,
    };

    let constructs: Vec<IrConstruct> = std::thread::scope(|s| {
        let handles: Vec<_> = module
            .constructs
            .iter()
            .map(|dfn| {
                let unit_gen = &unit_gen;
                s.spawn(move || unit_gen.construct(dfn))
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
            .collect()
    });

    let mut unit = CompilationUnit::new(module.name.as_str());
    for construct in constructs {
        debug!(
            construct = construct.name(),
            operations = construct.operations().len(),
            "constructed"
        );
        unit.add_construct(construct);
    }
    unit
}
