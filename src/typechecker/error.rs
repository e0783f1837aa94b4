//! Diagnostics produced by checking, analysis and emission.
//!
//! Every defect is a dedicated payload struct wrapped by [`LambdaError`]
//! together with its source span. Diagnostics accumulate on the context in
//! encounter order; no phase aborts on the first error.

use std::error::Error;
use std::fmt::{self, Display, Formatter};

use serde::Serialize;

use super::types::Type;
use crate::syntax::Span;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum LambdaError {
    /// Parser-level ERROR node; the checker skips it and keeps going.
    SyntaxReject(SyntaxReject, Span),
    Name(NameError, Span),
    Type(TypeError, Span),
    Pattern(PatternError, Span),
    /// Structurally invalid AST; recovered with an error placeholder.
    Shape(ShapeError, Span),
    /// Analyzer depth limit exceeded.
    Overflow(OverflowError, Span),
    Import(ImportError, Span),
}

impl LambdaError {
    pub fn span(&self) -> Span {
        match self {
            LambdaError::SyntaxReject(_, span)
            | LambdaError::Name(_, span)
            | LambdaError::Type(_, span)
            | LambdaError::Pattern(_, span)
            | LambdaError::Shape(_, span)
            | LambdaError::Overflow(_, span)
            | LambdaError::Import(_, span) => *span,
        }
    }
}

impl Display for LambdaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            LambdaError::SyntaxReject(e, span) => write!(f, "{span} {e}"),
            LambdaError::Name(e, span) => write!(f, "{span} {e}"),
            LambdaError::Type(e, span) => write!(f, "{span} {e}"),
            LambdaError::Pattern(e, span) => write!(f, "{span} {e}"),
            LambdaError::Shape(e, span) => write!(f, "{span} {e}"),
            LambdaError::Overflow(e, span) => write!(f, "{span} {e}"),
            LambdaError::Import(e, span) => write!(f, "{span} {e}"),
        }
    }
}

impl Error for LambdaError {}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SyntaxReject {
    pub symbol: String,
}

impl Display for SyntaxReject {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "syntax error node '{}' skipped", self.symbol)
    }
}

impl Error for SyntaxReject {}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum NameError {
    Undefined { name: String },
    Duplicate { name: String },
}

impl Display for NameError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            NameError::Undefined { name } => write!(f, "undefined name '{name}'"),
            NameError::Duplicate { name } => {
                write!(f, "'{name}' is already declared in this scope")
            }
        }
    }
}

impl Error for NameError {}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum TypeError {
    Mismatch {
        expected: Type,
        actual: Type,
        what: String,
    },
    Arity {
        expected: usize,
        actual: usize,
    },
    UnknownParameter {
        name: String,
    },
    DuplicateArgument {
        name: String,
    },
    MissingArgument {
        name: String,
    },
    NamedVariadic {
        name: String,
    },
    NotCallable {
        actual: Type,
    },
    IllegalStatement {
        what: String,
    },
}

impl Display for TypeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            TypeError::Mismatch {
                expected,
                actual,
                what,
            } => write!(f, "expected '{expected}' but got '{actual}' for {what}"),
            TypeError::Arity { expected, actual } => {
                write!(f, "expected {expected} arguments but got {actual}")
            }
            TypeError::UnknownParameter { name } => {
                write!(f, "no parameter named '{name}'")
            }
            TypeError::DuplicateArgument { name } => {
                write!(f, "duplicate argument for parameter '{name}'")
            }
            TypeError::MissingArgument { name } => {
                write!(f, "missing argument for required parameter '{name}'")
            }
            TypeError::NamedVariadic { name } => {
                write!(f, "named argument '{name}' cannot feed a variadic parameter")
            }
            TypeError::NotCallable { actual } => write!(f, "'{actual}' is not callable"),
            TypeError::IllegalStatement { what } => {
                write!(f, "{what} is only allowed in procedural scope")
            }
        }
    }
}

impl Error for TypeError {}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum PatternError {
    Compile { name: String, message: String },
    Unresolved { name: String },
}

impl Display for PatternError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            PatternError::Compile { name, message } => {
                write!(f, "pattern '{name}' failed to compile: {message}")
            }
            PatternError::Unresolved { name } => {
                write!(f, "reference to unresolved pattern '{name}'")
            }
        }
    }
}

impl Error for PatternError {}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ShapeError {
    pub what: String,
}

impl Display for ShapeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "malformed node: {}", self.what)
    }
}

impl Error for ShapeError {}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OverflowError {
    pub what: String,
    pub limit: usize,
}

impl Display for OverflowError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} exceeded depth limit of {}", self.what, self.limit)
    }
}

impl Error for OverflowError {}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ImportError {
    pub module: String,
}

impl Display for ImportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "could not resolve module '{}'", self.module)
    }
}

impl Error for ImportError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_span_and_payload() {
        let err = LambdaError::Name(
            NameError::Undefined {
                name: "foo".into(),
            },
            Span::new(3, 6),
        );
        assert_eq!(err.to_string(), "[3..6] undefined name 'foo'");
        assert_eq!(err.span(), Span::new(3, 6));
    }

    #[test]
    fn test_type_mismatch_display() {
        let err = TypeError::Mismatch {
            expected: Type::Int,
            actual: Type::String,
            what: "parameter 'n'".into(),
        };
        assert_eq!(
            err.to_string(),
            "expected 'int' but got 'string' for parameter 'n'"
        );
    }
}
