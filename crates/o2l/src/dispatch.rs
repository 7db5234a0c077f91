//! The central method-call evaluator.
//!
//! Resolves the receiver, selects the built-in table or user method,
//! and weaves the call through a stack-frame guard so every exit path
//! (normal, return, raise) pops exactly one frame.

use std::rc::Rc;

use log::trace;
use smallvec::SmallVec;

use crate::{
    ast::Expr,
    context::{Context, SourceLocation, StackFrame},
    eval,
    exception::{EvalResult, Flow},
    types::{
        list::{call_list_iterator_method, call_list_method},
        map::{call_map_entry_method, call_map_iterator_method, call_map_method},
        number::{
            call_bool_method, call_double_method, call_float_method, call_int_method,
            call_long_method,
        },
        repeat::call_repeat_iterator_method,
        result::call_result_method,
        set::{call_set_iterator_method, call_set_method},
        text::call_text_method,
    },
    value::Value,
};

/// Receiver name recorded in the stack frame, per variant.
fn receiver_frame_name(receiver: &Value) -> String {
    match receiver {
        Value::Object(obj) => obj.name().to_owned(),
        Value::List(_) => "List".to_owned(),
        Value::ListIter(_) => "ListIterator".to_owned(),
        Value::RepeatIter(_) => "RepeatIterator".to_owned(),
        Value::Map(_) => "Map".to_owned(),
        Value::MapIter(_) => "MapIterator".to_owned(),
        Value::MapEntry(_) => "MapObject".to_owned(),
        Value::Set(_) => "Set".to_owned(),
        Value::SetIter(_) => "SetIterator".to_owned(),
        Value::Result(_) => "Result".to_owned(),
        Value::Error(_) => "Error".to_owned(),
        Value::Text(_) => "Text".to_owned(),
        Value::Int(_) => "Int".to_owned(),
        Value::Long(_) => "Long".to_owned(),
        Value::Float(_) => "Float".to_owned(),
        Value::Double(_) => "Double".to_owned(),
        Value::Bool(_) => "Bool".to_owned(),
        _ => "object".to_owned(),
    }
}

pub(crate) fn eval_method_call(
    target: &Expr,
    method: &str,
    args: &[Expr],
    location: SourceLocation,
    ctx: &mut Context,
) -> EvalResult<Value> {
    let receiver = eval::eval_expr(target, ctx)?;
    let receiver_name = receiver_frame_name(&receiver);
    trace!("dispatch {receiver_name}.{method}()");

    ctx.push_frame(StackFrame {
        method_name: method.to_owned(),
        object_name: receiver_name,
        location,
    })?;

    let result = dispatch(&receiver, method, args, ctx);

    // Errors raised below this frame without a trace of their own pick up
    // the frame stack as they cross the call boundary.
    let result = match result {
        Err(Flow::Raise(mut err)) => {
            if !err.has_trace() {
                err.attach_trace(ctx.trace_snapshot());
            }
            Err(Flow::Raise(err))
        }
        other => other,
    };

    ctx.pop_frame();
    result
}

fn dispatch(receiver: &Value, method: &str, args: &[Expr], ctx: &mut Context) -> EvalResult<Value> {
    // Argument expressions evaluate strictly left to right.
    let mut arg_values: SmallVec<[Value; 4]> = SmallVec::with_capacity(args.len());
    for arg in args {
        arg_values.push(eval::eval_expr(arg, ctx)?);
    }

    match receiver {
        Value::List(list) => call_list_method(list, method, &arg_values),
        Value::ListIter(iter) => call_list_iterator_method(iter, method, &arg_values),
        Value::RepeatIter(iter) => call_repeat_iterator_method(iter, method, &arg_values),
        Value::Map(map) => call_map_method(map, method, &arg_values),
        Value::MapIter(iter) => call_map_iterator_method(iter, method, &arg_values),
        Value::MapEntry(entry) => call_map_entry_method(entry, method, &arg_values),
        Value::Set(set) => call_set_method(set, method, &arg_values),
        Value::SetIter(iter) => call_set_iterator_method(iter, method, &arg_values),
        Value::Result(result) => call_result_method(result, method, &arg_values),
        Value::Error(error) => crate::types::error::call_error_method(error, method, &arg_values),
        Value::Text(text) => call_text_method(text, method, &arg_values),
        Value::Int(v) => call_int_method(*v, method, &arg_values),
        Value::Long(v) => call_long_method(*v, method, &arg_values),
        Value::Float(v) => call_float_method(*v, method, &arg_values),
        Value::Double(v) => call_double_method(*v, method, &arg_values),
        Value::Bool(v) => call_bool_method(*v, method, &arg_values),
        Value::Object(obj) => {
            let external_call = !ctx
                .this_object()
                .is_some_and(|this| Rc::ptr_eq(this, obj));
            obj.call_method(method, &arg_values, ctx, external_call)
        }
        // FFI handles are opaque receivers: every method is unknown.
        Value::Ffi(handle) => Err(Flow::eval_at(
            format!("Unknown method '{method}' on {} type", handle.type_name()),
            ctx,
        )),
        Value::Char(_)
        | Value::Enum(_)
        | Value::RecordType(_)
        | Value::Record(_)
        | Value::Protocol(_) => Err(Flow::type_mismatch(
            format!("Cannot call method '{method}' on non-object type"),
            ctx,
        )),
    }
}
