use std::rc::Rc;

use crate::{
    exception::{EvalResult, Flow},
    types::list::require_no_args,
    value::Value,
};

/// A structured error value: message, code, and an optional nested cause.
/// Users create these with `new Error(message[, code])`.
#[derive(Debug)]
pub struct ErrorInstance {
    message: String,
    code: String,
    cause: Option<Value>,
}

impl ErrorInstance {
    #[must_use]
    pub fn new(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: code.into(),
            cause: None,
        }
    }

    #[must_use]
    pub fn with_cause(message: impl Into<String>, code: impl Into<String>, cause: Value) -> Self {
        Self {
            message: message.into(),
            code: code.into(),
            cause: Some(cause),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    #[must_use]
    pub fn cause(&self) -> Option<&Value> {
        self.cause.as_ref()
    }

    /// Canonical rendering: `<code>: <message>`, with nested causes
    /// appended as `caused by` suffixes.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = format!("{}: {}", self.code, self.message);
        let mut cause = self.cause.as_ref();
        while let Some(Value::Error(inner)) = cause {
            out.push_str(" caused by ");
            out.push_str(&inner.code);
            out.push_str(": ");
            out.push_str(&inner.message);
            cause = inner.cause.as_ref();
        }
        out
    }
}

pub(crate) fn call_error_method(
    error: &Rc<ErrorInstance>,
    name: &str,
    args: &[Value],
) -> EvalResult<Value> {
    match name {
        "getMessage" => {
            require_no_args("Error.getMessage()", args)?;
            Ok(Value::text(error.message()))
        }
        "getCode" => {
            require_no_args("Error.getCode()", args)?;
            Ok(Value::text(error.code()))
        }
        _ => Err(Flow::eval(format!("Unknown method '{name}' on Error type"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_code_and_message() {
        let err = ErrorInstance::new("boom", "E1");
        assert_eq!(err.render(), "E1: boom");
    }

    #[test]
    fn cause_chain_renders_nested() {
        let inner = ErrorInstance::new("disk full", "IO");
        let outer =
            ErrorInstance::with_cause("write failed", "E2", Value::Error(Rc::new(inner)));
        assert_eq!(outer.render(), "E2: write failed caused by IO: disk full");
    }
}
