//! Stdlib host objects: pre-populated `ObjectInstance`s whose methods are
//! native closures consumed through the core dispatch path.
//!
//! `io`, `os`, `fs` and `utils` are ambient (defined at bootstrap without
//! an import); `json`, `http.client`, `http.server` and `ffi` bind on
//! import. The final path segment becomes the bound name.

use std::rc::Rc;

use crate::{
    ast::ImportDecl,
    context::Context,
    exception::{EvalResult, Flow},
    object::ObjectInstance,
    types::ResultInstance,
    value::{type_name, Value},
};

pub(crate) mod ffi;
pub(crate) mod fs;
pub(crate) mod http_client;
pub(crate) mod http_server;
pub(crate) mod io;
pub(crate) mod json;
pub(crate) mod os;
pub(crate) mod utils;

/// Defines the ambient host objects and the `Result` constructor object
/// in the global scope.
pub(crate) fn bootstrap_system(ctx: &mut Context) {
    ctx.define_global_const("io", Value::Object(io::create_io_object()));
    ctx.define_global_const("os", Value::Object(os::create_os_object()));
    ctx.define_global_const("fs", Value::Object(fs::create_fs_object()));
    ctx.define_global_const("utils", Value::Object(utils::create_utils_object()));
    ctx.define_global_const("Result", Value::Object(create_result_object()));
}

/// Resolves an `import` declaration against the module registry.
pub(crate) fn import_module(import: &ImportDecl, ctx: &mut Context) -> EvalResult<()> {
    let path = import.path.join(".");
    let (name, object): (&str, Rc<ObjectInstance>) = match path.as_str() {
        // The system modules are ambient; importing them is a no-op that
        // keeps source files explicit about their dependencies.
        "system.io" | "system.os" | "system.fs" | "system.utils" => return Ok(()),
        "json" => ("json", json::create_json_object()),
        "http.client" => ("client", http_client::create_http_client_object()),
        "http.server" => ("server", http_server::create_http_server_object()),
        "ffi" => {
            if !ctx.ffi_enabled() {
                return Err(Flow::eval_at(
                    "FFI is disabled; run with --ffi to enable native library access",
                    ctx,
                ));
            }
            ("ffi", ffi::create_ffi_object())
        }
        _ => {
            return Err(Flow::unresolved(format!("Unknown module '{path}'"), ctx));
        }
    };
    ctx.define_global_const(name, Value::Object(object));
    Ok(())
}

/// The `Result` host object: `Result.success(v)` / `Result.error(e)`.
fn create_result_object() -> Rc<ObjectInstance> {
    let result = Rc::new(ObjectInstance::new("Result"));
    result.add_native("success", true, |args, _ctx| {
        let [value] = args else {
            return Err(Flow::eval("Result.success() requires exactly one argument"));
        };
        Ok(Value::Result(Rc::new(ResultInstance::success(
            value.clone(),
            &type_name(value),
            "Error",
        ))))
    });
    result.add_native("error", true, |args, _ctx| {
        let [error] = args else {
            return Err(Flow::eval("Result.error() requires exactly one argument"));
        };
        Ok(Value::Result(Rc::new(ResultInstance::error(
            error.clone(),
            "Value",
            &type_name(error),
        ))))
    });
    result
}

// --- shared argument helpers for native methods ---

pub(crate) fn text_arg<'a>(what: &str, args: &'a [Value], index: usize) -> EvalResult<&'a str> {
    match args.get(index) {
        Some(Value::Text(s)) => Ok(s),
        _ => Err(Flow::eval(format!("{what} argument must be a Text"))),
    }
}

pub(crate) fn int_arg(what: &str, args: &[Value], index: usize) -> EvalResult<i64> {
    match args.get(index) {
        Some(Value::Int(v)) => Ok(*v),
        _ => Err(Flow::eval(format!("{what} argument must be an Int"))),
    }
}

pub(crate) fn require_arity(what: &str, args: &[Value], arity: usize) -> EvalResult<()> {
    if args.len() == arity {
        Ok(())
    } else {
        Err(Flow::eval(format!(
            "{what} requires exactly {arity} argument{}",
            if arity == 1 { "" } else { "s" }
        )))
    }
}
