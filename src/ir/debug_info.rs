use std::{fmt, sync::Arc};

/// A located token handed over by the typed-symbol provider.
///
/// Line and column are 1-based; a line of 0 means the token was synthesized
/// and has no location in a source file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceToken {
    pub source_file: Arc<str>,
    pub line: u32,
    pub column: u32,
    pub text: Option<String>,
}

impl SourceToken {
    pub fn new(source_file: impl Into<Arc<str>>, line: u32, column: u32) -> Self {
        Self {
            source_file: source_file.into(),
            line,
            column,
            text: None,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }
}

/// Immutable source location attached to instructions.
///
/// Debug info never takes part in instruction equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DebugInfo {
    source_file: Arc<str>,
    line: u32,
    column: u32,
    original_text: Option<String>,
}

impl DebugInfo {
    pub fn new(source_file: impl Into<Arc<str>>, line: u32, column: u32) -> Self {
        Self {
            source_file: source_file.into(),
            line,
            column,
            original_text: None,
        }
    }

    pub fn with_original_text(mut self, text: impl Into<String>) -> Self {
        self.original_text = Some(text.into());
        self
    }

    pub fn source_file(&self) -> &str { &self.source_file }

    pub fn line(&self) -> u32 { self.line }

    pub fn column(&self) -> u32 { self.column }

    pub fn original_text(&self) -> Option<&str> { self.original_text.as_deref() }

    /// Whether this refers to an actual place in a source file.
    pub fn is_valid_location(&self) -> bool { self.line > 0 && !self.source_file.is_empty() }
}

impl From<&SourceToken> for DebugInfo {
    fn from(token: &SourceToken) -> Self {
        Self {
            source_file: token.source_file.clone(),
            line: token.line,
            column: token.column,
            original_text: token.text.clone(),
        }
    }
}

impl fmt::Display for DebugInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "// {}:{}:{}", self.source_file, self.line, self.column)
    }
}
