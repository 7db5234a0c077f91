use crate::{
    exception::{EvalResult, Flow},
    types::list::require_no_args,
    value::Value,
};

// Reciprocal conversion tables for Int, Long, Float, Double and Bool.
// Narrowing conversions range-check; float-to-integer conversions reject
// NaN and infinities.

pub(crate) fn call_int_method(value: i64, name: &str, args: &[Value]) -> EvalResult<Value> {
    match name {
        "toString" => {
            require_no_args("Int.toString()", args)?;
            Ok(Value::text(value.to_string()))
        }
        "toLong" => {
            require_no_args("Int.toLong()", args)?;
            Ok(Value::Long(i128::from(value)))
        }
        "toFloat" => {
            require_no_args("Int.toFloat()", args)?;
            Ok(Value::Float(value as f32))
        }
        "toDouble" => {
            require_no_args("Int.toDouble()", args)?;
            Ok(Value::Double(value as f64))
        }
        "toBool" => {
            require_no_args("Int.toBool()", args)?;
            Ok(Value::Bool(value != 0))
        }
        _ => Err(Flow::eval(format!("Unknown method '{name}' on Int type"))),
    }
}

pub(crate) fn call_long_method(value: i128, name: &str, args: &[Value]) -> EvalResult<Value> {
    match name {
        "toString" => {
            require_no_args("Long.toString()", args)?;
            Ok(Value::text(value.to_string()))
        }
        "toInt" => {
            require_no_args("Long.toInt()", args)?;
            i64::try_from(value)
                .map(Value::Int)
                .map_err(|_| Flow::eval(format!("Long value {value} out of Int range")))
        }
        "toFloat" => {
            require_no_args("Long.toFloat()", args)?;
            Ok(Value::Float(value as f32))
        }
        "toDouble" => {
            require_no_args("Long.toDouble()", args)?;
            Ok(Value::Double(value as f64))
        }
        "toBool" => {
            require_no_args("Long.toBool()", args)?;
            Ok(Value::Bool(value != 0))
        }
        _ => Err(Flow::eval(format!("Unknown method '{name}' on Long type"))),
    }
}

fn float_to_int(value: f64, target: &str, max: f64, min: f64) -> EvalResult<f64> {
    if value.is_nan() || value.is_infinite() {
        return Err(Flow::eval(format!("Cannot convert NaN or Infinity to {target}")));
    }
    if value > max || value < min {
        return Err(Flow::eval(format!("Float value {value} out of {target} range")));
    }
    Ok(value)
}

pub(crate) fn call_float_method(value: f32, name: &str, args: &[Value]) -> EvalResult<Value> {
    match name {
        "toString" => {
            require_no_args("Float.toString()", args)?;
            Ok(Value::text(value.to_string()))
        }
        "toInt" => {
            require_no_args("Float.toInt()", args)?;
            let checked = float_to_int(f64::from(value), "Int", i64::MAX as f64, i64::MIN as f64)?;
            Ok(Value::Int(checked as i64))
        }
        "toLong" => {
            require_no_args("Float.toLong()", args)?;
            let checked =
                float_to_int(f64::from(value), "Long", i128::MAX as f64, i128::MIN as f64)?;
            Ok(Value::Long(checked as i128))
        }
        "toDouble" => {
            require_no_args("Float.toDouble()", args)?;
            Ok(Value::Double(f64::from(value)))
        }
        "toBool" => {
            require_no_args("Float.toBool()", args)?;
            Ok(Value::Bool(value != 0.0))
        }
        "isNaN" => {
            require_no_args("Float.isNaN()", args)?;
            Ok(Value::Bool(value.is_nan()))
        }
        "isInfinite" => {
            require_no_args("Float.isInfinite()", args)?;
            Ok(Value::Bool(value.is_infinite()))
        }
        "isFinite" => {
            require_no_args("Float.isFinite()", args)?;
            Ok(Value::Bool(value.is_finite()))
        }
        _ => Err(Flow::eval(format!("Unknown method '{name}' on Float type"))),
    }
}

pub(crate) fn call_double_method(value: f64, name: &str, args: &[Value]) -> EvalResult<Value> {
    match name {
        "toString" => {
            require_no_args("Double.toString()", args)?;
            Ok(Value::text(value.to_string()))
        }
        "toInt" => {
            require_no_args("Double.toInt()", args)?;
            let checked = float_to_int(value, "Int", i64::MAX as f64, i64::MIN as f64)?;
            Ok(Value::Int(checked as i64))
        }
        "toLong" => {
            require_no_args("Double.toLong()", args)?;
            let checked = float_to_int(value, "Long", i128::MAX as f64, i128::MIN as f64)?;
            Ok(Value::Long(checked as i128))
        }
        "toFloat" => {
            require_no_args("Double.toFloat()", args)?;
            Ok(Value::Float(value as f32))
        }
        "toBool" => {
            require_no_args("Double.toBool()", args)?;
            Ok(Value::Bool(value != 0.0))
        }
        "isNaN" => {
            require_no_args("Double.isNaN()", args)?;
            Ok(Value::Bool(value.is_nan()))
        }
        "isInfinite" => {
            require_no_args("Double.isInfinite()", args)?;
            Ok(Value::Bool(value.is_infinite()))
        }
        "isFinite" => {
            require_no_args("Double.isFinite()", args)?;
            Ok(Value::Bool(value.is_finite()))
        }
        _ => Err(Flow::eval(format!("Unknown method '{name}' on Double type"))),
    }
}

pub(crate) fn call_bool_method(value: bool, name: &str, args: &[Value]) -> EvalResult<Value> {
    match name {
        "toString" => {
            require_no_args("Bool.toString()", args)?;
            Ok(Value::text(if value { "true" } else { "false" }))
        }
        "toInt" => {
            require_no_args("Bool.toInt()", args)?;
            Ok(Value::Int(i64::from(value)))
        }
        "toLong" => {
            require_no_args("Bool.toLong()", args)?;
            Ok(Value::Long(i128::from(value)))
        }
        "toFloat" => {
            require_no_args("Bool.toFloat()", args)?;
            Ok(Value::Float(if value { 1.0 } else { 0.0 }))
        }
        "toDouble" => {
            require_no_args("Bool.toDouble()", args)?;
            Ok(Value::Double(if value { 1.0 } else { 0.0 }))
        }
        _ => Err(Flow::eval(format!("Unknown method '{name}' on Bool type"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_long_round_trip() {
        let long = call_int_method(42, "toLong", &[]).unwrap();
        let Value::Long(l) = long else { panic!("expected Long") };
        let back = call_long_method(l, "toInt", &[]).unwrap();
        assert!(matches!(back, Value::Int(42)));
    }

    #[test]
    fn long_to_int_range_checks() {
        assert!(call_long_method(i128::from(i64::MAX) + 1, "toInt", &[]).is_err());
        assert!(call_long_method(i128::from(i64::MIN) - 1, "toInt", &[]).is_err());
    }

    #[test]
    fn nan_and_infinity_do_not_convert() {
        assert!(call_double_method(f64::NAN, "toInt", &[]).is_err());
        assert!(call_double_method(f64::INFINITY, "toLong", &[]).is_err());
        assert!(matches!(
            call_double_method(f64::NAN, "isNaN", &[]).unwrap(),
            Value::Bool(true)
        ));
    }

    #[test]
    fn bool_conversions() {
        assert!(matches!(call_bool_method(true, "toInt", &[]).unwrap(), Value::Int(1)));
        assert_eq!(
            call_bool_method(false, "toString", &[]).unwrap().as_text().unwrap(),
            "false"
        );
    }
}
