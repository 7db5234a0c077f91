use std::rc::Rc;

use indexmap::IndexMap;

use crate::{
    ast::{BinaryOp, Expr, Stmt, UnaryOp},
    context::Context,
    dispatch,
    exception::{ErrorKind, EvalResult, Flow, RunError},
    types::{ErrorInstance, ListInstance, MapInstance, RecordInstance, SetInstance},
    value::{type_name, value_to_string, values_equal, Value},
};

/// Evaluates statements in the current scope (method bodies: the caller
/// already pushed a scope). Yields the last statement's value, or the
/// unit value for an empty body.
pub(crate) fn eval_stmts(stmts: &[Stmt], ctx: &mut Context) -> EvalResult<Value> {
    let mut result = Value::void();
    for stmt in stmts {
        result = eval_stmt(stmt, ctx)?;
    }
    Ok(result)
}

/// Evaluates a block in a fresh scope. The scope is popped on every exit
/// path, keeping the scope stack balanced under returns and raises.
pub(crate) fn eval_block(stmts: &[Stmt], ctx: &mut Context) -> EvalResult<Value> {
    ctx.push_scope();
    let result = eval_stmts(stmts, ctx);
    ctx.pop_scope();
    result
}

pub(crate) fn eval_stmt(stmt: &Stmt, ctx: &mut Context) -> EvalResult<Value> {
    match stmt {
        Stmt::VarDecl { name, type_name: declared, init, constant, .. } => {
            let value = eval_expr(init, ctx)?;
            check_declared_type(name, declared, &value, ctx)?;
            if *constant {
                ctx.define_const(name.clone(), value.clone());
            } else {
                ctx.define(name.clone(), value.clone());
            }
            Ok(value)
        }
        Stmt::Assign { name, value, .. } => {
            let value = eval_expr(value, ctx)?;
            ctx.reassign(name, value.clone())?;
            Ok(value)
        }
        Stmt::PropertyAssign { property, value, .. } => {
            let value = eval_expr(value, ctx)?;
            let Some(this) = ctx.this_object().cloned() else {
                return Err(Flow::eval_at("'this' is not bound in this context", ctx));
            };
            this.set_property(property.clone(), value.clone());
            Ok(value)
        }
        Stmt::ExternalPropertyAssign { target, property, .. } => {
            let receiver = eval_expr(target, ctx)?;
            match receiver {
                Value::Object(obj) => Err(Flow::access_violation(
                    format!(
                        "Cannot assign property '{property}' of object '{}' from external context",
                        obj.name()
                    ),
                    ctx,
                )),
                other => Err(Flow::eval_at(
                    format!("Cannot assign property '{property}' on {} value", type_name(&other)),
                    ctx,
                )),
            }
        }
        Stmt::If { condition, then_block, else_block, .. } => {
            let cond = eval_condition(condition, ctx)?;
            if cond {
                eval_block(then_block, ctx)
            } else if let Some(else_block) = else_block {
                eval_block(else_block, ctx)
            } else {
                Ok(Value::void())
            }
        }
        Stmt::While { condition, body, .. } => {
            while eval_condition(condition, ctx)? {
                eval_block(body, ctx)?;
            }
            Ok(Value::void())
        }
        Stmt::Return { value, .. } => {
            let value = match value {
                Some(expr) => eval_expr(expr, ctx)?,
                None => Value::void(),
            };
            Err(Flow::Return(value))
        }
        Stmt::Throw { value, .. } => {
            let value = eval_expr(value, ctx)?;
            Err(Flow::raise(RunError::user_throw(value, ctx)))
        }
        Stmt::TryCatchFinally {
            try_block,
            catch_variable,
            catch_block,
            finally_block,
            ..
        } => eval_try(try_block, catch_variable, catch_block.as_deref(), finally_block.as_deref(), ctx),
        Stmt::Expr(expr) => eval_expr(expr, ctx),
    }
}

/// The outcome of a try/catch pending the finally block.
enum Pending {
    Value(Value),
    Propagate(Flow),
}

fn eval_try(
    try_block: &[Stmt],
    catch_variable: &str,
    catch_block: Option<&[Stmt]>,
    finally_block: Option<&[Stmt]>,
    ctx: &mut Context,
) -> EvalResult<Value> {
    let mut pending = match eval_block(try_block, ctx) {
        Ok(value) => Pending::Value(value),
        Err(Flow::Return(value)) => Pending::Propagate(Flow::Return(value)),
        Err(Flow::Raise(err)) => {
            // A user throw is caught as its payload; anything else is
            // wrapped into an Error carrying the SYSTEM_ERROR code.
            let caught = match err.thrown() {
                Some(value) => value.clone(),
                None => Value::Error(Rc::new(ErrorInstance::new(err.message(), "SYSTEM_ERROR"))),
            };
            match catch_block {
                Some(catch_block) => {
                    ctx.push_scope();
                    ctx.define(catch_variable.to_owned(), caught);
                    let catch_result = eval_stmts(catch_block, ctx);
                    ctx.pop_scope();
                    match catch_result {
                        Ok(value) => Pending::Value(value),
                        Err(flow) => Pending::Propagate(flow),
                    }
                }
                // No catch block: finally still runs, then the exception
                // re-raises as a user exception carrying the value.
                None => Pending::Propagate(Flow::raise(RunError::user_throw(caught, ctx))),
            }
        }
    };

    if let Some(finally_block) = finally_block {
        match eval_block(finally_block, ctx) {
            Ok(_) => {}
            // A raise or return inside finally replaces whatever was
            // propagating, including earlier returns.
            Err(flow) => pending = Pending::Propagate(flow),
        }
    }

    match pending {
        Pending::Value(value) => Ok(value),
        Pending::Propagate(flow) => Err(flow),
    }
}

fn eval_condition(condition: &Expr, ctx: &mut Context) -> EvalResult<bool> {
    match eval_expr(condition, ctx)? {
        Value::Bool(b) => Ok(b),
        other => Err(Flow::eval_at(
            format!("Condition must be a Bool, got {}", type_name(&other)),
            ctx,
        )),
    }
}

/// Declaration-time type check: enforced for primitives and `List<T>`,
/// lenient for user-defined and other complex types.
fn check_declared_type(
    name: &str,
    declared: &str,
    value: &Value,
    ctx: &Context,
) -> EvalResult<()> {
    if let Some(inner) = declared.strip_prefix("List<").and_then(|s| s.strip_suffix('>')) {
        let Value::List(list) = value else {
            return Err(Flow::raise(RunError::with_context(
                ErrorKind::Evaluation,
                format!("Type mismatch: {name} declared as {declared} but assigned non-List value"),
                ctx,
            )));
        };
        for element in list.values() {
            let actual = type_name(&element);
            if actual != inner {
                return Err(Flow::raise(RunError::with_context(
                    ErrorKind::Evaluation,
                    format!("Type mismatch in {name}: expected {inner} but found {actual}"),
                    ctx,
                )));
            }
        }
        return Ok(());
    }

    let actual = type_name(value);
    if actual == declared {
        return Ok(());
    }
    let conversion_allowed = matches!(
        (declared, actual.as_str()),
        ("Long", "Int") | ("Float", "Int") | ("Double", "Int") | ("Double", "Float")
    );
    if conversion_allowed {
        return Ok(());
    }
    // Only the built-in primitive types are enforced; declarations against
    // objects, records, enums and the like stay lenient.
    let strict = matches!(
        declared,
        "Int" | "Long" | "Float" | "Double" | "Text" | "Bool" | "Char"
    );
    if strict {
        return Err(Flow::raise(RunError::with_context(
            ErrorKind::Evaluation,
            format!("Type mismatch: {name} declared as {declared} but assigned {actual}"),
            ctx,
        )));
    }
    Ok(())
}

pub(crate) fn eval_expr(expr: &Expr, ctx: &mut Context) -> EvalResult<Value> {
    match expr {
        Expr::IntLit(v) => Ok(Value::Int(*v)),
        Expr::LongLit(v) => Ok(Value::Long(*v)),
        Expr::FloatLit(v) => Ok(Value::Float(*v)),
        Expr::DoubleLit(v) => Ok(Value::Double(*v)),
        Expr::BoolLit(v) => Ok(Value::Bool(*v)),
        Expr::CharLit(c) => Ok(Value::Char(*c)),
        Expr::TextLit(s) => Ok(Value::text(s.as_str())),
        Expr::ListLit(elements) => {
            let mut values = Vec::with_capacity(elements.len());
            for element in elements {
                values.push(eval_expr(element, ctx)?);
            }
            let element_type = values.first().map_or_else(|| "Value".to_owned(), type_name);
            Ok(Value::List(Rc::new(ListInstance::from_values(element_type, values))))
        }
        Expr::MapLit(entries) => {
            let mut evaluated = Vec::with_capacity(entries.len());
            for (key, value) in entries {
                let key = eval_expr(key, ctx)?;
                let value = eval_expr(value, ctx)?;
                evaluated.push((key, value));
            }
            let (key_type, value_type) = evaluated.first().map_or_else(
                || ("Value".to_owned(), "Value".to_owned()),
                |(k, v)| (type_name(k), type_name(v)),
            );
            let map = MapInstance::new(key_type, value_type);
            for (key, value) in evaluated {
                map.put(key, value);
            }
            Ok(Value::Map(Rc::new(map)))
        }
        Expr::SetLit(elements) => {
            let mut values = Vec::with_capacity(elements.len());
            for element in elements {
                values.push(eval_expr(element, ctx)?);
            }
            let element_type = values.first().map_or_else(|| "Value".to_owned(), type_name);
            let set = SetInstance::new(element_type);
            for value in values {
                set.add(value);
            }
            Ok(Value::Set(Rc::new(set)))
        }
        Expr::Identifier { name, .. } => ctx
            .lookup(name)
            .ok_or_else(|| Flow::unresolved(format!("Undefined variable '{name}'"), ctx)),
        Expr::This { .. } => match ctx.this_object() {
            Some(this) => Ok(Value::Object(Rc::clone(this))),
            None => Err(Flow::eval_at("'this' is not bound in this context", ctx)),
        },
        Expr::PropertyAccess { target, name, .. } => eval_property_access(target, name, ctx),
        Expr::MethodCall { target, method, args, location } => {
            dispatch::eval_method_call(target, method, args, *location, ctx)
        }
        Expr::New { type_name: ty, args, .. } => eval_new(ty, args, ctx),
        Expr::RecordCall { type_name: ty, fields, .. } => eval_record_call(ty, fields, ctx),
        Expr::Unary { op, operand, .. } => {
            let value = eval_expr(operand, ctx)?;
            match (op, &value) {
                (UnaryOp::Neg, Value::Int(v)) => Ok(Value::Int(v.wrapping_neg())),
                (UnaryOp::Neg, Value::Long(v)) => Ok(Value::Long(v.wrapping_neg())),
                (UnaryOp::Neg, Value::Float(v)) => Ok(Value::Float(-v)),
                (UnaryOp::Neg, Value::Double(v)) => Ok(Value::Double(-v)),
                (UnaryOp::Not, Value::Bool(v)) => Ok(Value::Bool(!v)),
                (UnaryOp::Neg, other) => Err(Flow::eval_at(
                    format!("Cannot negate {} value", type_name(other)),
                    ctx,
                )),
                (UnaryOp::Not, other) => Err(Flow::eval_at(
                    format!("Cannot apply '!' to {} value", type_name(other)),
                    ctx,
                )),
            }
        }
        Expr::Binary { op, lhs, rhs, .. } => eval_binary(*op, lhs, rhs, ctx),
    }
}

fn eval_property_access(target: &Expr, name: &str, ctx: &mut Context) -> EvalResult<Value> {
    let receiver = eval_expr(target, ctx)?;
    match &receiver {
        Value::Object(obj) => {
            let is_this = ctx
                .this_object()
                .is_some_and(|this| Rc::ptr_eq(this, obj));
            if !is_this {
                return Err(Flow::access_violation(
                    format!(
                        "Cannot access property '{name}' of object '{}' from external context",
                        obj.name()
                    ),
                    ctx,
                ));
            }
            obj.get_property(name).ok_or_else(|| {
                Flow::eval_at(
                    format!("Property '{name}' not found on object '{}'", obj.name()),
                    ctx,
                )
            })
        }
        Value::Enum(en) => en.member_value(name).map(Value::Int).ok_or_else(|| {
            Flow::eval_at(
                format!("Enum '{}' has no member '{name}'", en.enum_name()),
                ctx,
            )
        }),
        Value::Record(rec) => rec.get_field(name).ok_or_else(|| {
            Flow::eval_at(
                format!("Record '{}' has no field '{name}'", rec.type_name()),
                ctx,
            )
        }),
        other => Err(Flow::eval_at(
            format!("Cannot access property '{name}' on {} value", type_name(other)),
            ctx,
        )),
    }
}

fn eval_new(ty: &str, args: &[Expr], ctx: &mut Context) -> EvalResult<Value> {
    let mut arg_values = Vec::with_capacity(args.len());
    for arg in args {
        arg_values.push(eval_expr(arg, ctx)?);
    }

    // `new Error(...)` builds the structured error value directly.
    if ty == "Error" {
        let message = match arg_values.first() {
            Some(Value::Text(s)) => s.to_string(),
            Some(other) => value_to_string(other),
            None => return Err(Flow::eval_at("new Error() requires a message argument", ctx)),
        };
        let code = match arg_values.get(1) {
            None => "ERROR".to_owned(),
            Some(Value::Text(s)) => s.to_string(),
            Some(_) => {
                return Err(Flow::eval_at("new Error() code argument must be a Text", ctx));
            }
        };
        let error = match arg_values.get(2) {
            None => ErrorInstance::new(message, code),
            Some(cause) => ErrorInstance::with_cause(message, code, cause.clone()),
        };
        return Ok(Value::Error(Rc::new(error)));
    }

    let Some(prototype) = ctx.lookup(ty) else {
        return Err(Flow::unresolved(format!("Undefined type '{ty}'"), ctx));
    };
    let Value::Object(prototype) = prototype else {
        return Err(Flow::eval_at(
            format!("Cannot instantiate {} with 'new'", type_name(&prototype)),
            ctx,
        ));
    };

    let instance = Rc::new(prototype.instantiate());
    if instance.has_method("constructor") {
        instance.call_method("constructor", &arg_values, ctx, false)?;
    } else if !arg_values.is_empty() {
        return Err(Flow::eval_at(
            format!("Object '{ty}' has no constructor but got {} arguments", arg_values.len()),
            ctx,
        ));
    }
    Ok(Value::Object(instance))
}

fn eval_record_call(
    ty: &str,
    fields: &[(String, Expr)],
    ctx: &mut Context,
) -> EvalResult<Value> {
    let Some(record_type) = ctx.lookup(ty) else {
        return Err(Flow::unresolved(format!("Undefined type '{ty}'"), ctx));
    };
    let Value::RecordType(record_type) = record_type else {
        return Err(Flow::eval_at(
            format!("'{ty}' is not a record type"),
            ctx,
        ));
    };

    // Field expressions evaluate in written order; storage follows the
    // declared field order.
    let mut provided: IndexMap<String, Value> = IndexMap::new();
    for (field, expr) in fields {
        if !record_type.has_field(field) {
            return Err(Flow::eval_at(
                format!("Record '{ty}' has no field '{field}'"),
                ctx,
            ));
        }
        provided.insert(field.clone(), eval_expr(expr, ctx)?);
    }

    let mut ordered = IndexMap::new();
    for (field, _) in record_type.fields() {
        match provided.swap_remove(field) {
            Some(value) => {
                ordered.insert(field.clone(), value);
            }
            None => {
                return Err(Flow::eval_at(
                    format!("Record '{ty}' construction missing field '{field}'"),
                    ctx,
                ));
            }
        }
    }
    Ok(Value::Record(Rc::new(RecordInstance::new(
        record_type.record_name(),
        ordered,
    ))))
}

fn eval_binary(op: BinaryOp, lhs: &Expr, rhs: &Expr, ctx: &mut Context) -> EvalResult<Value> {
    // Logical operators short-circuit; everything else evaluates both
    // sides left to right.
    if matches!(op, BinaryOp::And | BinaryOp::Or) {
        let left = eval_expr(lhs, ctx)?;
        let Value::Bool(left) = left else {
            return Err(Flow::eval_at(
                format!("Logical operator requires Bool operands, got {}", type_name(&left)),
                ctx,
            ));
        };
        if (op == BinaryOp::And && !left) || (op == BinaryOp::Or && left) {
            return Ok(Value::Bool(left));
        }
        let right = eval_expr(rhs, ctx)?;
        let Value::Bool(right) = right else {
            return Err(Flow::eval_at(
                format!("Logical operator requires Bool operands, got {}", type_name(&right)),
                ctx,
            ));
        };
        return Ok(Value::Bool(right));
    }

    let left = eval_expr(lhs, ctx)?;
    let right = eval_expr(rhs, ctx)?;

    match op {
        BinaryOp::Eq => return Ok(Value::Bool(values_equal(&left, &right))),
        BinaryOp::Ne => return Ok(Value::Bool(!values_equal(&left, &right))),
        _ => {}
    }

    let mismatch = |ctx: &Context| {
        Flow::eval_at(
            format!(
                "Cannot apply operator to {} and {}",
                type_name(&left),
                type_name(&right)
            ),
            ctx,
        )
    };

    match op {
        BinaryOp::Add => match (&left, &right) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_add(*b))),
            (Value::Long(a), Value::Long(b)) => Ok(Value::Long(a.wrapping_add(*b))),
            (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a + b)),
            (Value::Double(a), Value::Double(b)) => Ok(Value::Double(a + b)),
            (Value::Text(a), Value::Text(b)) => Ok(Value::text(format!("{a}{b}"))),
            _ => Err(mismatch(ctx)),
        },
        BinaryOp::Sub => match (&left, &right) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_sub(*b))),
            (Value::Long(a), Value::Long(b)) => Ok(Value::Long(a.wrapping_sub(*b))),
            (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a - b)),
            (Value::Double(a), Value::Double(b)) => Ok(Value::Double(a - b)),
            _ => Err(mismatch(ctx)),
        },
        BinaryOp::Mul => match (&left, &right) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_mul(*b))),
            (Value::Long(a), Value::Long(b)) => Ok(Value::Long(a.wrapping_mul(*b))),
            (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a * b)),
            (Value::Double(a), Value::Double(b)) => Ok(Value::Double(a * b)),
            _ => Err(mismatch(ctx)),
        },
        BinaryOp::Div => match (&left, &right) {
            (Value::Int(_), Value::Int(0)) | (Value::Long(_), Value::Long(0)) => {
                Err(Flow::eval_at("Division by zero", ctx))
            }
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_div(*b))),
            (Value::Long(a), Value::Long(b)) => Ok(Value::Long(a.wrapping_div(*b))),
            (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a / b)),
            (Value::Double(a), Value::Double(b)) => Ok(Value::Double(a / b)),
            _ => Err(mismatch(ctx)),
        },
        BinaryOp::Mod => match (&left, &right) {
            (Value::Int(_), Value::Int(0)) | (Value::Long(_), Value::Long(0)) => {
                Err(Flow::eval_at("Division by zero", ctx))
            }
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_rem(*b))),
            (Value::Long(a), Value::Long(b)) => Ok(Value::Long(a.wrapping_rem(*b))),
            (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a % b)),
            (Value::Double(a), Value::Double(b)) => Ok(Value::Double(a % b)),
            _ => Err(mismatch(ctx)),
        },
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = match (&left, &right) {
                (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
                (Value::Long(a), Value::Long(b)) => a.partial_cmp(b),
                (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
                (Value::Double(a), Value::Double(b)) => a.partial_cmp(b),
                (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
                (Value::Char(a), Value::Char(b)) => Some(a.cmp(b)),
                _ => {
                    return Err(Flow::eval_at(
                        format!(
                            "Cannot compare {} and {}",
                            type_name(&left),
                            type_name(&right)
                        ),
                        ctx,
                    ));
                }
            };
            let satisfied = ordering.is_some_and(|o| match op {
                BinaryOp::Lt => o.is_lt(),
                BinaryOp::Le => o.is_le(),
                BinaryOp::Gt => o.is_gt(),
                BinaryOp::Ge => o.is_ge(),
                _ => unreachable!(),
            });
            Ok(Value::Bool(satisfied))
        }
        BinaryOp::Eq | BinaryOp::Ne | BinaryOp::And | BinaryOp::Or => unreachable!(),
    }
}
