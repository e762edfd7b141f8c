use rustc_hash::FxHashMap;

use super::{operators::OperatorMap, IrGenConfig};
use crate::{
    ice,
    ir::{DebugInfo, SourceToken},
    typed::{EnumType, SourceModule, TypeOracle},
};

/// A variable visible in a scope.
#[derive(Debug, Clone)]
pub struct SymbolEntry {
    pub ty: String,
    pub is_param: bool,
}

/// An open scope: its id and the variables declared in it.
struct ScopeFrame {
    id: String,
    symbols: FxHashMap<String, SymbolEntry>,
}

/// An enclosing try chain.
struct HandlerFrame {
    /// Open scopes at the chain, its own scope included. A throw exits the
    /// scopes above.
    depth: usize,
    has_finally: bool,
}

/// Naming and scope state of the construction of one operation.
///
/// Every counter starts over per operation, so generating the same input
/// twice yields the same names.
pub struct IrGenContext<'a> {
    config: &'a IrGenConfig,
    types: &'a dyn TypeOracle,
    operators: &'a OperatorMap,
    module: &'a SourceModule,
    temps: usize,
    scope_ids: usize,
    labels: usize,
    scopes: Vec<ScopeFrame>,
    handlers: Vec<HandlerFrame>,
    /// Nesting of finally blocks being generated.
    finally_depth: usize,
}

impl<'a> IrGenContext<'a> {
    pub fn new(
        config: &'a IrGenConfig,
        types: &'a dyn TypeOracle,
        operators: &'a OperatorMap,
        module: &'a SourceModule,
    ) -> Self {
        Self {
            config,
            types,
            operators,
            module,
            temps: 0,
            scope_ids: 0,
            labels: 0,
            scopes: Vec::new(),
            handlers: Vec::new(),
            finally_depth: 0,
        }
    }

    pub fn types(&self) -> &'a dyn TypeOracle { self.types }

    pub fn operators(&self) -> &'a OperatorMap { self.operators }

    pub fn enum_type(&self, name: &str) -> Option<&'a EnumType> { self.module.enum_type(name) }

    /// A fresh temporary, `_temp<N>`.
    pub fn temp(&mut self) -> String {
        self.temps += 1;
        format!("_temp{}", self.temps)
    }

    /// A fresh scope id, `_scope_<N>`.
    pub fn new_scope_id(&mut self) -> String {
        self.scope_ids += 1;
        format!("_scope_{}", self.scope_ids)
    }

    /// A fresh label, `<prefix>_<N>`.
    pub fn label(&mut self, prefix: &str) -> String {
        self.labels += 1;
        format!("{}_{}", prefix, self.labels)
    }

    pub fn enter_scope(&mut self, id: impl Into<String>) {
        self.scopes.push(ScopeFrame {
            id: id.into(),
            symbols: FxHashMap::default(),
        });
    }

    /// # Panics
    ///
    /// Panics if `id` is not the innermost open scope.
    pub fn exit_scope(&mut self, id: &str) {
        match self.scopes.pop() {
            Some(frame) if frame.id == id => {}
            Some(frame) => ice!("exit of scope `{}` while `{}` is innermost", id, frame.id),
            None => ice!("exit of scope `{}` with no open scope", id),
        }
    }

    /// # Panics
    ///
    /// Panics if no scope is open.
    pub fn current_scope(&self) -> &str {
        match self.scopes.last() {
            Some(frame) => &frame.id,
            None => ice!("no scope is open"),
        }
    }

    /// Open scopes, innermost first.
    pub fn open_scopes(&self) -> Vec<String> { self.scopes.iter().rev().map(|f| f.id.clone()).collect() }

    /// The scopes a throw exits: those opened since the innermost try
    /// chain, or all of them outside one. Innermost first.
    pub fn scopes_to_handler(&self) -> Vec<String> {
        let depth = self.handlers.last().map(|handler| handler.depth).unwrap_or(0);
        self.scopes[depth.min(self.scopes.len())..]
            .iter()
            .rev()
            .map(|f| f.id.clone())
            .collect()
    }

    /// Start the protected part of a try chain whose scope is innermost.
    pub fn enter_handler(&mut self, has_finally: bool) {
        self.handlers.push(HandlerFrame {
            depth: self.scopes.len(),
            has_finally,
        });
    }

    pub fn exit_handler(&mut self) {
        if self.handlers.pop().is_none() {
            ice!("exit of a try chain with none open");
        }
    }

    /// Whether a return would skip a finally block.
    pub fn returns_past_finally(&self) -> bool { self.handlers.iter().any(|handler| handler.has_finally) }

    pub fn enter_finally(&mut self) { self.finally_depth += 1; }

    pub fn exit_finally(&mut self) {
        if self.finally_depth == 0 {
            ice!("exit of a finally block with none open");
        }
        self.finally_depth -= 1;
    }

    pub fn in_finally(&self) -> bool { self.finally_depth > 0 }

    /// Declare a variable in the innermost scope.
    pub fn declare(&mut self, name: impl Into<String>, ty: impl Into<String>, is_param: bool) {
        let Some(frame) = self.scopes.last_mut() else {
            ice!("variable declared with no open scope");
        };
        frame.symbols.insert(
            name.into(),
            SymbolEntry {
                ty: ty.into(),
                is_param,
            },
        );
    }

    pub fn lookup(&self, name: &str) -> Option<&SymbolEntry> {
        self.scopes
            .iter()
            .rev()
            .find_map(|frame| frame.symbols.get(name))
    }

    pub fn debug_info(&self, token: Option<&SourceToken>) -> Option<DebugInfo> {
        if !self.config.debug_info {
            return None;
        }
        token.map(DebugInfo::from)
    }
}
