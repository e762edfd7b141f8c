//! # Call sites
//!
//! Every source level operator, method call and function call is lowered to
//! one of the call opcodes. The resolved callee travels with the instruction
//! as [CallDetails], and the optimization facts about the callee as
//! [CallMetaData], so backends never go back to the symbol table.

use std::{collections::BTreeSet, fmt};

use tracing::debug;

use crate::typed::{std_types, SymbolInfo, TypeOracle};

/// A side effect a call may have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SideEffect {
    /// The callee belongs to the I/O capability.
    Io,
    /// The callee may mutate state observable by the caller.
    Mutation,
}

impl fmt::Display for SideEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SideEffect::Io => write!(f, "IO"),
            SideEffect::Mutation => write!(f, "MUTATION"),
        }
    }
}

/// Per call site optimization facts.
///
/// Absence of a side effect is authoritative, presence is only a hint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct CallMetaData {
    is_pure: bool,
    complexity_score: u32,
    side_effects: BTreeSet<SideEffect>,
}

impl CallMetaData {
    pub fn new(
        is_pure: bool,
        complexity_score: u32,
        side_effects: impl IntoIterator<Item = SideEffect>,
    ) -> Self {
        Self {
            is_pure,
            complexity_score,
            side_effects: side_effects.into_iter().collect(),
        }
    }

    /// Metadata for calls nothing is known about: impure, possibly mutating.
    pub fn conservative() -> Self { Self::new(false, 0, [SideEffect::Mutation]) }

    pub fn is_pure(&self) -> bool { self.is_pure }

    pub fn complexity_score(&self) -> u32 { self.complexity_score }

    pub fn side_effects(&self) -> &BTreeSet<SideEffect> { &self.side_effects }

    pub fn has_side_effects(&self) -> bool { !self.side_effects.is_empty() }

    pub fn has_side_effect(&self, effect: SideEffect) -> bool { self.side_effects.contains(&effect) }
}

impl fmt::Display for CallMetaData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let effects: Vec<String> = self.side_effects.iter().map(|e| e.to_string()).collect();
        write!(
            f,
            "[pure={}, complexity={}, effects={}]",
            self.is_pure,
            self.complexity_score,
            if effects.is_empty() {
                "NONE".to_string()
            } else {
                effects.join(",")
            }
        )
    }
}

/// Parse a raw complexity annotation.
///
/// Complexity is advisory, so anything malformed yields 0.
pub fn parse_complexity(raw: &str) -> u32 {
    match raw.trim().parse::<u32>() {
        Ok(score) => score,
        Err(err) => {
            debug!(raw, %err, "malformed complexity annotation, using 0");
            0
        }
    }
}

/// Derives [CallMetaData] from a resolved callee.
pub struct CallMetaDataExtractor<'a> {
    types: &'a dyn TypeOracle,
}

impl<'a> CallMetaDataExtractor<'a> {
    pub fn new(types: &'a dyn TypeOracle) -> Self { Self { types } }

    /// Compute the metadata of a call to `symbol`.
    ///
    /// - purity is taken from the symbol as is.
    /// - `IO` when the type the symbol belongs to is assignable to the I/O
    ///   capability.
    /// - `MUTATION` whenever the symbol returns something other than `Void`.
    pub fn extract(&self, symbol: &SymbolInfo) -> CallMetaData {
        let mut side_effects = BTreeSet::new();

        if self.types.is_assignable(symbol.owner(), std_types::IO) {
            side_effects.insert(SideEffect::Io);
        }
        if symbol.return_type() != std_types::VOID {
            side_effects.insert(SideEffect::Mutation);
        }

        CallMetaData {
            is_pure: symbol.is_pure(),
            complexity_score: symbol.complexity().unwrap_or(0),
            side_effects,
        }
    }
}

/// The resolved target of a call instruction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallDetails {
    /// The receiver variable, or the type name for static calls and
    /// functions.
    pub target_object: String,
    pub target_type: String,
    pub method_name: String,
    pub parameter_types: Vec<String>,
    pub return_type: String,
    pub arguments: Vec<String>,
    pub metadata: CallMetaData,
    /// Whether the receiver type is a trait, which some backends dispatch
    /// through an interface call.
    pub is_trait_call: bool,
}

impl CallDetails {
    pub fn new(
        target_object: impl Into<String>,
        target_type: impl Into<String>,
        method_name: impl Into<String>,
        return_type: impl Into<String>,
    ) -> Self {
        Self {
            target_object: target_object.into(),
            target_type: target_type.into(),
            method_name: method_name.into(),
            parameter_types: Vec::new(),
            return_type: return_type.into(),
            arguments: Vec::new(),
            metadata: CallMetaData::default(),
            is_trait_call: false,
        }
    }

    /// Build the details of a call to a resolved symbol on `target_object`.
    pub fn for_symbol(
        target_object: impl Into<String>,
        symbol: &SymbolInfo,
        arguments: Vec<String>,
        types: &dyn TypeOracle,
    ) -> Self {
        Self {
            target_object: target_object.into(),
            target_type: symbol.owner().to_string(),
            method_name: symbol.name().to_string(),
            parameter_types: symbol.param_types().to_vec(),
            return_type: symbol.return_type().to_string(),
            arguments,
            metadata: CallMetaDataExtractor::new(types).extract(symbol),
            is_trait_call: symbol.is_trait_member(),
        }
    }

    pub fn with_argument(mut self, name: impl Into<String>, ty: impl Into<String>) -> Self {
        self.arguments.push(name.into());
        self.parameter_types.push(ty.into());
        self
    }

    pub fn with_metadata(mut self, metadata: CallMetaData) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_trait_call(mut self, is_trait_call: bool) -> Self {
        self.is_trait_call = is_trait_call;
        self
    }

    pub fn is_constructor(&self) -> bool { self.method_name == "<init>" }

    /// Operator methods are named with a leading underscore, e.g. `_add`.
    pub fn is_operator(&self) -> bool { self.method_name.starts_with('_') }

    /// Whether a result variable is worth binding.
    pub fn has_result(&self) -> bool { self.return_type != std_types::VOID }

    /// The single operand form, `target.method(arg1, arg2)`.
    pub fn operand(&self) -> String {
        format!(
            "{}.{}({})",
            self.target_object,
            self.method_name,
            self.arguments.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typed::{StandardTypes, SymbolInfo};

    #[test]
    fn test_parse_complexity_is_lenient() {
        assert_eq!(parse_complexity("12"), 12);
        assert_eq!(parse_complexity(" 3 "), 3);
        assert_eq!(parse_complexity("high"), 0);
        assert_eq!(parse_complexity("-4"), 0);
        assert_eq!(parse_complexity(""), 0);
    }

    #[test]
    fn test_void_pure_call_has_no_effects() {
        let types = StandardTypes::new();
        let symbol = SymbolInfo::method(std_types::INTEGER, "_inc", std_types::VOID).pure();
        let metadata = CallMetaDataExtractor::new(&types).extract(&symbol);
        assert!(metadata.is_pure());
        assert!(!metadata.has_side_effects());
    }

    #[test]
    fn test_io_and_mutation_tags() {
        let types = StandardTypes::new();
        let symbol = SymbolInfo::method(std_types::STDOUT, "println", std_types::STDOUT);
        let metadata = CallMetaDataExtractor::new(&types).extract(&symbol);
        assert!(metadata.has_side_effect(SideEffect::Io));
        assert!(metadata.has_side_effect(SideEffect::Mutation));
        assert_eq!(metadata.to_string(), "[pure=false, complexity=0, effects=IO,MUTATION]");
    }

    #[test]
    fn test_call_operand_form() {
        let details = CallDetails::new("_temp1", std_types::INTEGER, "_add", std_types::INTEGER)
            .with_argument("_temp2", std_types::INTEGER);
        assert_eq!(details.operand(), "_temp1._add(_temp2)");
        assert!(details.is_operator());
        assert!(!details.is_constructor());
    }
}
