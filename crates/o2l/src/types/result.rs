use std::rc::Rc;

use crate::{
    exception::{EvalResult, Flow},
    types::list::require_no_args,
    value::{value_to_string, Value},
};

/// The `Result<T, E>` discriminated union: a success holding a value of
/// declared type `T`, or an error holding a value of declared type `E`.
/// The type names are kept for rendering only; they are not enforced
/// after construction.
#[derive(Debug)]
pub struct ResultInstance {
    is_success: bool,
    value: Value,
    error: Value,
    value_type_name: String,
    error_type_name: String,
}

impl ResultInstance {
    #[must_use]
    pub fn success(value: Value, value_type: &str, error_type: &str) -> Self {
        Self {
            is_success: true,
            value,
            error: Value::void(),
            value_type_name: value_type.to_owned(),
            error_type_name: error_type.to_owned(),
        }
    }

    #[must_use]
    pub fn error(error: Value, value_type: &str, error_type: &str) -> Self {
        Self {
            is_success: false,
            value: Value::void(),
            error,
            value_type_name: value_type.to_owned(),
            error_type_name: error_type.to_owned(),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.is_success
    }

    /// The success value. Callers must check `isSuccess` first; an error
    /// result yields the default value rather than failing.
    #[must_use]
    pub fn result(&self) -> Value {
        self.value.clone()
    }

    #[must_use]
    pub fn error_value(&self) -> Value {
        self.error.clone()
    }

    #[must_use]
    pub fn value_type_name(&self) -> &str {
        &self.value_type_name
    }

    #[must_use]
    pub fn error_type_name(&self) -> &str {
        &self.error_type_name
    }

    #[must_use]
    pub fn render(&self) -> String {
        if self.is_success {
            format!("Result.Success({})", value_to_string(&self.value))
        } else {
            format!("Result.Error({})", value_to_string(&self.error))
        }
    }
}

pub(crate) fn call_result_method(
    result: &Rc<ResultInstance>,
    name: &str,
    args: &[Value],
) -> EvalResult<Value> {
    match name {
        "isSuccess" => {
            require_no_args("Result.isSuccess()", args)?;
            Ok(Value::Bool(result.is_success()))
        }
        "getResult" => {
            require_no_args("Result.getResult()", args)?;
            Ok(result.result())
        }
        "getError" => {
            require_no_args("Result.getError()", args)?;
            Ok(result.error_value())
        }
        _ => Err(Flow::eval(format!("Unknown method '{name}' on Result type"))),
    }
}
