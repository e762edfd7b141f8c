use rustc_hash::FxHashMap;

use crate::collections::bimap::BiMap;

/// What is known about an operator independent of the type defining it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperatorDetails {
    pub operator: &'static str,
    pub method: &'static str,
    pub is_pure: bool,
    pub requires_argument: bool,
    pub has_return: bool,
}

/// The fixed table between source operators and the methods they are
/// lowered to, e.g. `+` and `_add`.
#[derive(Debug, Clone)]
pub struct OperatorMap {
    names: BiMap<&'static str, &'static str>,
    details: FxHashMap<&'static str, OperatorDetails>,
}

impl Default for OperatorMap {
    fn default() -> Self { Self::new() }
}

impl OperatorMap {
    pub fn new() -> Self {
        let mut map = Self {
            names: BiMap::new(),
            details: FxHashMap::default(),
        };

        // comparison
        map.add("<", "_lt", true, true, true);
        map.add("<=", "_lteq", true, true, true);
        map.add(">", "_gt", true, true, true);
        map.add(">=", "_gteq", true, true, true);
        map.add("==", "_eq", true, true, true);
        map.add("<>", "_neq", true, true, true);
        map.add("<=>", "_cmp", true, true, true);
        map.add("<~>", "_fuzzy", true, true, true);

        // shifts
        map.add("<<", "_shftl", true, true, true);
        map.add(">>", "_shftr", true, true, true);

        // mutating
        map.add(":=:", "_copy", false, true, false);
        map.add(":^:", "_replace", false, true, false);
        map.add(":~:", "_merge", false, true, false);
        map.add("|", "_pipe", false, true, false);
        map.add("+=", "_addAss", false, true, false);
        map.add("-=", "_subAss", false, true, false);
        map.add("*=", "_mulAss", false, true, false);
        map.add("/=", "_divAss", false, true, false);
        map.add("++", "_inc", false, false, true);
        map.add("--", "_dec", false, false, true);

        // arithmetic
        map.add("+", "_add", true, true, true);
        map.add("-", "_sub", true, true, true);
        map.add("*", "_mul", true, true, true);
        map.add("/", "_div", true, true, true);
        map.add("^", "_pow", true, true, true);
        map.add("mod", "_mod", true, true, true);
        map.add("rem", "_rem", true, true, true);
        map.add("~", "_negate", true, false, true);
        map.add("!", "_fac", true, false, true);
        map.add("abs", "_abs", true, false, true);
        map.add("sqrt", "_sqrt", true, false, true);

        // logical
        map.add("and", "_and", true, true, true);
        map.add("or", "_or", true, true, true);
        map.add("xor", "_xor", true, true, true);

        // state and conversion
        map.add("?", "_isSet", true, false, true);
        map.add("$", "_string", true, false, true);
        map.add("$$", "_json", true, false, true);
        map.add("#?", "_hashcode", true, false, true);
        map.add("#^", "_promote", true, false, true);
        map.add("#<", "_prefix", true, false, true);
        map.add("#>", "_suffix", true, false, true);
        map.add("empty", "_empty", true, false, true);
        map.add("length", "_len", true, false, true);
        map.add("close", "_close", true, false, false);

        // collections and queries
        map.add("sort", "_sort", true, false, true);
        map.add("filter", "_filter", true, false, true);
        map.add("collect", "_collect", true, false, true);
        map.add("map", "_map", true, false, true);
        map.add("group", "_group", true, false, true);
        map.add("split", "_split", true, false, true);
        map.add("head", "_head", true, false, true);
        map.add("tail", "_tail", true, false, true);
        map.add("contains", "_contains", true, true, true);
        map.add("matches", "_matches", true, true, true);

        map
    }

    fn add(
        &mut self,
        operator: &'static str,
        method: &'static str,
        is_pure: bool,
        requires_argument: bool,
        has_return: bool,
    ) {
        self.names.insert(operator, method);
        self.details.insert(
            operator,
            OperatorDetails {
                operator,
                method,
                is_pure,
                requires_argument,
                has_return,
            },
        );
    }

    /// The method `operator` is lowered to.
    pub fn method_for(&self, operator: &str) -> Option<&'static str> { self.names.get(operator).copied() }

    /// The operator a method implements.
    pub fn operator_for(&self, method: &str) -> Option<&'static str> {
        self.names.get_rev(method).copied()
    }

    pub fn details(&self, operator: &str) -> Option<&OperatorDetails> { self.details.get(operator) }

    pub fn has_method(&self, method: &str) -> bool { self.operator_for(method).is_some() }

    pub fn expects_parameter(&self, operator: &str) -> bool {
        self.details(operator)
            .map(|details| details.requires_argument)
            .unwrap_or(false)
    }

    /// Assignment style operators and the explicit mutators change their
    /// receiver.
    pub fn is_this_mutating(&self, operator: &str) -> bool {
        let assignment = operator.ends_with('=') && !matches!(operator, ">=" | "<=" | "==" | "<>");
        assignment || matches!(operator, ":=:" | ":^:" | ":~:" | "|" | "++" | "--")
    }

    pub fn len(&self) -> usize { self.names.len() }

    pub fn is_empty(&self) -> bool { self.names.is_empty() }
}
