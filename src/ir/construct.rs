//! Top level containers: a [CompilationUnit] holds the [IrConstruct]s of one
//! source module, a construct owns fields and [Operation]s, and every
//! operation owns a [Body] of basic blocks.

use core::fmt;

use super::{block::Body, debug_info::DebugInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstructKind {
    Program,
    Function,
    Class,
    Record,
    Trait,
}

impl fmt::Display for ConstructKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstructKind::Program => write!(f, "program"),
            ConstructKind::Function => write!(f, "function"),
            ConstructKind::Class => write!(f, "class"),
            ConstructKind::Record => write!(f, "record"),
            ConstructKind::Trait => write!(f, "trait"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    pub name: String,
    pub ty: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Parameter {
    pub name: String,
    pub ty: String,
}

/// A method, function body, program body or constructor.
#[derive(Debug)]
pub struct Operation {
    name: String,
    parameters: Vec<Parameter>,
    return_type: String,
    body: Body,
    debug_info: Option<DebugInfo>,
}

impl Operation {
    pub fn new(name: impl Into<String>, return_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: Vec::new(),
            return_type: return_type.into(),
            body: Body::new(),
            debug_info: None,
        }
    }

    pub fn with_parameter(mut self, name: impl Into<String>, ty: impl Into<String>) -> Self {
        self.parameters.push(Parameter {
            name: name.into(),
            ty: ty.into(),
        });
        self
    }

    pub fn with_debug_info(mut self, debug_info: Option<DebugInfo>) -> Self {
        self.debug_info = debug_info;
        self
    }

    pub fn name(&self) -> &str { &self.name }

    pub fn parameters(&self) -> &[Parameter] { &self.parameters }

    pub fn return_type(&self) -> &str { &self.return_type }

    pub fn body(&self) -> &Body { &self.body }

    pub fn body_mut(&mut self) -> &mut Body { &mut self.body }

    pub fn debug_info(&self) -> Option<&DebugInfo> { self.debug_info.as_ref() }
}

/// A program, function, class, record or trait lowered to IR.
#[derive(Debug)]
pub struct IrConstruct {
    name: String,
    kind: ConstructKind,
    fields: Vec<Field>,
    operations: Vec<Operation>,
    debug_info: Option<DebugInfo>,
}

impl IrConstruct {
    pub fn new(name: impl Into<String>, kind: ConstructKind) -> Self {
        Self {
            name: name.into(),
            kind,
            fields: Vec::new(),
            operations: Vec::new(),
            debug_info: None,
        }
    }

    pub fn with_debug_info(mut self, debug_info: Option<DebugInfo>) -> Self {
        self.debug_info = debug_info;
        self
    }

    pub fn add_field(&mut self, name: impl Into<String>, ty: impl Into<String>) {
        self.fields.push(Field {
            name: name.into(),
            ty: ty.into(),
        });
    }

    pub fn add_operation(&mut self, operation: Operation) { self.operations.push(operation); }

    pub fn name(&self) -> &str { &self.name }

    pub fn kind(&self) -> ConstructKind { self.kind }

    pub fn fields(&self) -> &[Field] { &self.fields }

    pub fn operations(&self) -> &[Operation] { &self.operations }

    pub fn operations_mut(&mut self) -> &mut [Operation] { &mut self.operations }

    pub fn operation(&self, name: &str) -> Option<&Operation> {
        self.operations.iter().find(|op| op.name == name)
    }

    pub fn debug_info(&self) -> Option<&DebugInfo> { self.debug_info.as_ref() }
}

/// The IR of one source module.
#[derive(Debug, Default)]
pub struct CompilationUnit {
    module_name: String,
    constructs: Vec<IrConstruct>,
}

impl CompilationUnit {
    pub fn new(module_name: impl Into<String>) -> Self {
        Self {
            module_name: module_name.into(),
            constructs: Vec::new(),
        }
    }

    pub fn add_construct(&mut self, construct: IrConstruct) { self.constructs.push(construct); }

    pub fn module_name(&self) -> &str { &self.module_name }

    pub fn constructs(&self) -> &[IrConstruct] { &self.constructs }

    pub fn constructs_mut(&mut self) -> &mut [IrConstruct] { &mut self.constructs }

    pub fn construct(&self, name: &str) -> Option<&IrConstruct> {
        self.constructs.iter().find(|c| c.name == name)
    }

    /// Every operation of every construct, in source order.
    pub fn operations(&self) -> impl Iterator<Item = &Operation> + '_ {
        self.constructs.iter().flat_map(|c| c.operations.iter())
    }
}
