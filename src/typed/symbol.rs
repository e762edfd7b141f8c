use rustc_hash::FxHashMap;

use super::std_types;
use crate::ir::parse_complexity;

/// Answers type questions for IR construction.
///
/// Shared by the generators of every construct of a module, which may run on
/// separate threads.
pub trait TypeOracle: Sync {
    /// Whether a value of type `from` can be used where `to` is expected.
    fn is_assignable(&self, from: &str, to: &str) -> bool;
}

/// The built-in type hierarchy, extendable with user types.
#[derive(Debug, Clone)]
pub struct StandardTypes {
    supertypes: FxHashMap<String, Vec<String>>,
}

impl Default for StandardTypes {
    fn default() -> Self { Self::new() }
}

impl StandardTypes {
    pub fn new() -> Self {
        Self {
            supertypes: FxHashMap::default(),
        }
        .with_supertype(std_types::STDOUT, std_types::IO)
        .with_supertype(std_types::STDERR, std_types::IO)
    }

    pub fn with_supertype(mut self, ty: impl Into<String>, supertype: impl Into<String>) -> Self {
        self.supertypes
            .entry(ty.into())
            .or_default()
            .push(supertype.into());
        self
    }
}

impl TypeOracle for StandardTypes {
    fn is_assignable(&self, from: &str, to: &str) -> bool {
        if from == to || to == std_types::ANY {
            return true;
        }
        let mut pending = vec![from];
        let mut visited = Vec::new();
        while let Some(ty) = pending.pop() {
            if ty == to {
                return true;
            }
            if visited.contains(&ty) {
                continue;
            }
            visited.push(ty);
            if let Some(supers) = self.supertypes.get(ty) {
                pending.extend(supers.iter().map(String::as_str));
            }
        }
        false
    }
}

/// How a resolved callee is invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DispatchKind {
    /// On a receiver object.
    #[default]
    Method,
    /// On a type: functions, constructors and static initialisation.
    Static,
    /// Through a dispatcher method selecting the overload at runtime.
    Dispatcher,
}

/// A resolved method, function or operator.
///
/// Purity and complexity are plain fields filled by semantic analysis.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SymbolInfo {
    name: String,
    owner: String,
    param_types: Vec<String>,
    return_type: String,
    is_pure: bool,
    complexity: Option<u32>,
    is_trait_member: bool,
    dispatch: DispatchKind,
}

impl SymbolInfo {
    /// A method `name` of type `owner`.
    pub fn method(
        owner: impl Into<String>,
        name: impl Into<String>,
        return_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            owner: owner.into(),
            param_types: Vec::new(),
            return_type: return_type.into(),
            is_pure: false,
            complexity: None,
            is_trait_member: false,
            dispatch: DispatchKind::Method,
        }
    }

    /// A function, called through its `_call` method on the function type.
    pub fn function(function: impl Into<String>, return_type: impl Into<String>) -> Self {
        Self {
            dispatch: DispatchKind::Static,
            ..Self::method(function, "_call", return_type)
        }
    }

    pub fn constructor(ty: impl Into<String>) -> Self {
        let ty = ty.into();
        Self {
            dispatch: DispatchKind::Static,
            ..Self::method(ty.clone(), "<init>", ty)
        }
    }

    pub fn pure(mut self) -> Self {
        self.is_pure = true;
        self
    }

    pub fn with_params(mut self, param_types: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.param_types = param_types.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_complexity(mut self, complexity: u32) -> Self {
        self.complexity = Some(complexity);
        self
    }

    /// Take the complexity from a raw static analysis annotation.
    pub fn with_complexity_annotation(mut self, raw: &str) -> Self {
        self.complexity = Some(parse_complexity(raw));
        self
    }

    pub fn trait_member(mut self) -> Self {
        self.is_trait_member = true;
        self
    }

    pub fn with_dispatch(mut self, dispatch: DispatchKind) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn name(&self) -> &str { &self.name }

    pub fn is_constructor(&self) -> bool { self.name == "<init>" }

    pub fn owner(&self) -> &str { &self.owner }

    pub fn param_types(&self) -> &[String] { &self.param_types }

    pub fn return_type(&self) -> &str { &self.return_type }

    pub fn is_pure(&self) -> bool { self.is_pure }

    pub fn complexity(&self) -> Option<u32> { self.complexity }

    pub fn is_trait_member(&self) -> bool { self.is_trait_member }

    pub fn dispatch(&self) -> DispatchKind { self.dispatch }
}
