use std::fmt::{self, Display, Write as _};

use strum::{Display, EnumString, IntoStaticStr};

use crate::{
    context::{Context, StackFrame},
    value::{value_to_string, Value},
};

/// Result type alias threaded through every evaluator.
///
/// The error side is [`Flow`], the explicit control-flow sum: evaluation
/// never unwinds through host panics, it returns `Return` or `Raise`
/// signals that callers route with `?`.
pub type EvalResult<T> = Result<T, Flow>;

/// Runtime error classes.
///
/// `Return` is deliberately absent: early return is a [`Flow`] variant, not
/// an error kind, so user `catch` can never intercept it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
pub enum ErrorKind {
    /// Wrong arity, wrong argument variant, out-of-range index, type
    /// mismatch at declaration, division by zero, unknown method.
    Evaluation,
    /// Variable or method name not in scope.
    UnresolvedReference,
    /// External call to a non-external method, or external property access.
    AccessViolation,
    /// Method call on a variant that does not support method calls at all.
    TypeMismatch,
    /// A user-thrown value (`throw expr`). Carries the thrown `Value`.
    UserException,
    /// Lower-level host failure surfaced into the language.
    SystemError,
    /// Lexer/parser failure. Produced before evaluation starts.
    Syntax,
}

/// A raised language-level error: kind, message, optional thrown payload,
/// and the stack-frame snapshot captured where it was raised.
#[derive(Debug, Clone)]
pub struct RunError {
    kind: ErrorKind,
    message: String,
    thrown: Option<Value>,
    trace: Vec<StackFrame>,
}

impl RunError {
    /// Creates an error with no trace. The dispatcher attaches the current
    /// frame stack to traceless errors as they cross a method-call boundary.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            thrown: None,
            trace: Vec::new(),
        }
    }

    /// Creates an error carrying the context's current frame stack.
    #[must_use]
    pub fn with_context(kind: ErrorKind, message: impl Into<String>, ctx: &Context) -> Self {
        Self {
            kind,
            message: message.into(),
            thrown: None,
            trace: ctx.trace_snapshot(),
        }
    }

    /// Packages a user-thrown value, capturing the current trace.
    #[must_use]
    pub fn user_throw(value: Value, ctx: &Context) -> Self {
        Self {
            kind: ErrorKind::UserException,
            message: value_to_string(&value),
            thrown: Some(value),
            trace: ctx.trace_snapshot(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The thrown value for `UserException` errors.
    #[must_use]
    pub fn thrown(&self) -> Option<&Value> {
        self.thrown.as_ref()
    }

    #[must_use]
    pub fn trace(&self) -> &[StackFrame] {
        &self.trace
    }

    pub(crate) fn has_trace(&self) -> bool {
        !self.trace.is_empty()
    }

    pub(crate) fn attach_trace(&mut self, trace: Vec<StackFrame>) {
        if self.trace.is_empty() {
            self.trace = trace;
        }
    }

    /// Multi-line uncaught-exception rendering: the first line is
    /// `Uncaught exception:`, then the error itself, then one line per
    /// stack frame, innermost first.
    #[must_use]
    pub fn render_uncaught(&self) -> String {
        let mut out = String::from("Uncaught exception:\n");
        let _ = writeln!(out, "{self}");
        for frame in &self.trace {
            let _ = writeln!(out, "    at {frame}");
        }
        out
    }
}

impl Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ErrorKind::UserException => write!(f, "{}", self.message),
            kind => write!(f, "{kind}: {}", self.message),
        }
    }
}

/// The evaluation control-flow sum.
///
/// `Return` unwinds to the nearest method activation (observable only by
/// `finally`); `Raise` unwinds to the nearest `try` with a matching catch,
/// or to the top frame as an uncaught exception.
#[derive(Debug, Clone)]
pub enum Flow {
    Return(Value),
    Raise(Box<RunError>),
}

impl Flow {
    #[must_use]
    pub fn raise(err: RunError) -> Self {
        Self::Raise(Box::new(err))
    }

    /// Shorthand for an `Evaluation` error without trace context.
    #[must_use]
    pub fn eval(message: impl Into<String>) -> Self {
        Self::raise(RunError::new(ErrorKind::Evaluation, message))
    }

    /// Shorthand for an `Evaluation` error carrying the current trace.
    #[must_use]
    pub fn eval_at(message: impl Into<String>, ctx: &Context) -> Self {
        Self::raise(RunError::with_context(ErrorKind::Evaluation, message, ctx))
    }

    #[must_use]
    pub fn unresolved(message: impl Into<String>, ctx: &Context) -> Self {
        Self::raise(RunError::with_context(
            ErrorKind::UnresolvedReference,
            message,
            ctx,
        ))
    }

    #[must_use]
    pub fn access_violation(message: impl Into<String>, ctx: &Context) -> Self {
        Self::raise(RunError::with_context(
            ErrorKind::AccessViolation,
            message,
            ctx,
        ))
    }

    #[must_use]
    pub fn type_mismatch(message: impl Into<String>, ctx: &Context) -> Self {
        Self::raise(RunError::with_context(ErrorKind::TypeMismatch, message, ctx))
    }

    #[must_use]
    pub fn system(message: impl Into<String>) -> Self {
        Self::raise(RunError::new(ErrorKind::SystemError, message))
    }

    /// The error payload, if this is a raise rather than a return.
    #[must_use]
    pub fn as_error(&self) -> Option<&RunError> {
        match self {
            Self::Raise(err) => Some(err),
            Self::Return(_) => None,
        }
    }
}

impl From<RunError> for Flow {
    fn from(err: RunError) -> Self {
        Self::raise(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_round_trips_through_strum() {
        assert_eq!(ErrorKind::Evaluation.to_string(), "Evaluation");
        assert_eq!(
            "AccessViolation".parse::<ErrorKind>().unwrap(),
            ErrorKind::AccessViolation
        );
    }

    #[test]
    fn display_prefixes_kind_except_for_user_throws() {
        let err = RunError::new(ErrorKind::Evaluation, "Division by zero");
        assert_eq!(err.to_string(), "Evaluation: Division by zero");
    }
}
