use std::fmt;

use once_cell::sync::Lazy;
use thiserror::Error;

use crate::ast::Span;
use crate::value::Value;

/// Whether `SORREL_DEBUG=1` was set when the process started. Enables
/// span-carrying error rendering; never changes runtime semantics.
pub fn debug_enabled() -> bool {
    static DEBUG: Lazy<bool> =
        Lazy::new(|| std::env::var("SORREL_DEBUG").map(|v| v == "1").unwrap_or(false));
    *DEBUG
}

#[derive(Clone, Debug, Default)]
pub struct ErrorData {
    pub message: String,
    pub span: Option<Span>,
}

impl ErrorData {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            span: None,
        }
    }
}

impl fmt::Display for ErrorData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if debug_enabled() {
            if let Some(span) = self.span {
                write!(f, " (line {}, col {})", span.line, span.col)?;
            }
        }
        Ok(())
    }
}

#[derive(Error, Debug, Clone)]
pub enum SorrelError {
    /// Produced by the parser collaborator; surfaced unchanged.
    #[error("parse error: {0}")]
    Parse(ErrorData),

    #[error("{0}")]
    UndefinedSymbol(ErrorData),

    #[error("{0}")]
    UndefinedType(ErrorData),

    #[error("{0}")]
    Type(ErrorData),

    #[error("{0}")]
    IndexOutOfRange(ErrorData),

    #[error("{0}")]
    InvalidOperation(ErrorData),

    #[error("{0}")]
    Channel(ErrorData),

    /// Host cancellation. Not catchable by script `catch`.
    #[error("execution interrupted")]
    Interrupt,

    /// A value thrown by script `throw`, carried to the nearest `catch`.
    #[error("{0}")]
    Thrown(Value),
}

impl SorrelError {
    pub fn parse(message: impl Into<String>) -> Self {
        SorrelError::Parse(ErrorData::new(message))
    }

    pub fn undefined_symbol(name: &str) -> Self {
        SorrelError::UndefinedSymbol(ErrorData::new(format!("undefined symbol '{}'", name)))
    }

    pub fn undefined_type(name: &str) -> Self {
        SorrelError::UndefinedType(ErrorData::new(format!("undefined type '{}'", name)))
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        SorrelError::Type(ErrorData::new(message))
    }

    pub fn cannot_assign(from: &str, to: &str) -> Self {
        SorrelError::Type(ErrorData::new(format!(
            "type {} cannot be assigned to type {}",
            from, to
        )))
    }

    pub fn index_out_of_range() -> Self {
        SorrelError::IndexOutOfRange(ErrorData::new("index out of range"))
    }

    pub fn invalid_operation() -> Self {
        SorrelError::InvalidOperation(ErrorData::new("invalid operation"))
    }

    pub fn invalid_operation_msg(message: impl Into<String>) -> Self {
        SorrelError::InvalidOperation(ErrorData::new(message))
    }

    pub fn channel(message: impl Into<String>) -> Self {
        SorrelError::Channel(ErrorData::new(message))
    }

    pub fn thrown(value: Value) -> Self {
        SorrelError::Thrown(value)
    }

    pub fn with_span(mut self, span: Span) -> Self {
        if let Some(data) = self.data_mut() {
            if data.span.is_none() {
                data.span = Some(span);
            }
        }
        self
    }

    pub fn span(&self) -> Option<Span> {
        self.data_ref().and_then(|data| data.span)
    }

    /// Whether a script-level `catch` may intercept this error. Interrupt and
    /// parse errors always continue to the host.
    pub fn is_catchable(&self) -> bool {
        !matches!(self, SorrelError::Interrupt | SorrelError::Parse(_))
    }

    /// The value bound to a `catch` variable: the thrown value itself, or the
    /// rendered message for ordinary runtime errors.
    pub fn catch_value(&self) -> Value {
        match self {
            SorrelError::Thrown(value) => value.clone(),
            other => Value::Str(other.to_string()),
        }
    }

    fn data_ref(&self) -> Option<&ErrorData> {
        match self {
            SorrelError::Parse(data)
            | SorrelError::UndefinedSymbol(data)
            | SorrelError::UndefinedType(data)
            | SorrelError::Type(data)
            | SorrelError::IndexOutOfRange(data)
            | SorrelError::InvalidOperation(data)
            | SorrelError::Channel(data) => Some(data),
            SorrelError::Interrupt | SorrelError::Thrown(_) => None,
        }
    }

    fn data_mut(&mut self) -> Option<&mut ErrorData> {
        match self {
            SorrelError::Parse(data)
            | SorrelError::UndefinedSymbol(data)
            | SorrelError::UndefinedType(data)
            | SorrelError::Type(data)
            | SorrelError::IndexOutOfRange(data)
            | SorrelError::InvalidOperation(data)
            | SorrelError::Channel(data) => Some(data),
            SorrelError::Interrupt | SorrelError::Thrown(_) => None,
        }
    }
}
