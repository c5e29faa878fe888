//! Error types for row-selection conditions.

use std::fmt;

/// Error raised while parsing, compiling or evaluating a condition.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionError {
    /// Kind of error.
    pub kind: ConditionErrorKind,
    /// Byte position in the condition, when known.
    pub position: usize,
    /// The problematic fragment (identifier, operator or input prefix).
    pub fragment: String,
    /// Human-readable message.
    pub message: String,
}

impl ConditionError {
    /// Creates a new condition error.
    #[must_use]
    pub fn new(
        kind: ConditionErrorKind,
        position: usize,
        fragment: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            position,
            fragment: fragment.into(),
            message: message.into(),
        }
    }

    /// Creates a syntax error.
    #[must_use]
    pub fn syntax(
        position: usize,
        fragment: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(ConditionErrorKind::Syntax, position, fragment, message)
    }

    /// Creates an unknown identifier error.
    #[must_use]
    pub fn unknown_identifier(name: &str) -> Self {
        Self::new(
            ConditionErrorKind::UnknownIdentifier,
            0,
            name,
            format!("Unknown column or variable '{name}'"),
        )
    }

    /// Creates a type mismatch error.
    #[must_use]
    pub fn type_mismatch(fragment: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ConditionErrorKind::TypeMismatch, 0, fragment, message)
    }

    /// Creates an evaluation error for row `row`.
    #[must_use]
    pub fn evaluation(kind: ConditionErrorKind, row: usize, message: impl Into<String>) -> Self {
        Self::new(kind, 0, format!("row {row}"), message)
    }
}

impl fmt::Display for ConditionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind.code(), self.message)?;
        if self.kind == ConditionErrorKind::Syntax {
            write!(f, " at position {}", self.position)?;
        } else if !self.fragment.is_empty() {
            write!(f, " ({})", self.fragment)?;
        }
        Ok(())
    }
}

impl std::error::Error for ConditionError {}

/// Kind of condition error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionErrorKind {
    /// Input does not match the grammar (C001).
    Syntax,
    /// Identifier is neither a bound variable nor a column (C002).
    UnknownIdentifier,
    /// Array or mask column used where a scalar is required (C003).
    NotScalar,
    /// Operand types do not fit the operator (C004).
    TypeMismatch,
    /// The whole condition does not produce a boolean (C005).
    NotBoolean,
    /// Integer division or remainder by zero (C006).
    DivisionByZero,
    /// Integer arithmetic overflow (C007).
    Overflow,
}

impl ConditionErrorKind {
    /// Returns the error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Syntax => "C001",
            Self::UnknownIdentifier => "C002",
            Self::NotScalar => "C003",
            Self::TypeMismatch => "C004",
            Self::NotBoolean => "C005",
            Self::DivisionByZero => "C006",
            Self::Overflow => "C007",
        }
    }
}
