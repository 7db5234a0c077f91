use std::rc::Rc;

use serde_json::{json, Map as JsonMap, Value as Json};

use crate::{
    exception::{EvalResult, Flow},
    modules::{require_arity, text_arg},
    object::ObjectInstance,
    types::{ListInstance, MapInstance},
    value::{value_to_string, Value},
};

/// The `json` host object, backed by `serde_json` with order-preserving
/// objects.
pub(crate) fn create_json_object() -> Rc<ObjectInstance> {
    let json_object = Rc::new(ObjectInstance::new("json"));

    json_object.add_native("parse", true, |args, _ctx| {
        require_arity("json.parse()", args, 1)?;
        Ok(json_to_value(&parse_json(text_arg("json.parse()", args, 0)?)?))
    });

    json_object.add_native("parseAuto", true, |args, _ctx| {
        require_arity("json.parseAuto()", args, 1)?;
        Ok(json_to_value(&parse_json(text_arg("json.parseAuto()", args, 0)?)?))
    });

    json_object.add_native("parseToMap", true, |args, _ctx| {
        require_arity("json.parseToMap()", args, 1)?;
        let parsed = parse_json(text_arg("json.parseToMap()", args, 0)?)?;
        if !parsed.is_object() {
            return Err(Flow::eval("json.parseToMap() requires a JSON object"));
        }
        Ok(json_to_value(&parsed))
    });

    json_object.add_native("parseToList", true, |args, _ctx| {
        require_arity("json.parseToList()", args, 1)?;
        let parsed = parse_json(text_arg("json.parseToList()", args, 0)?)?;
        if !parsed.is_array() {
            return Err(Flow::eval("json.parseToList() requires a JSON array"));
        }
        Ok(json_to_value(&parsed))
    });

    json_object.add_native("isValid", true, |args, _ctx| {
        require_arity("json.isValid()", args, 1)?;
        let text = text_arg("json.isValid()", args, 0)?;
        Ok(Value::Bool(serde_json::from_str::<Json>(text).is_ok()))
    });

    json_object.add_native("get", true, |args, _ctx| {
        require_arity("json.get()", args, 2)?;
        let doc = parse_json(text_arg("json.get()", args, 0)?)?;
        let path = text_arg("json.get()", args, 1)?;
        let found = navigate(&doc, path)
            .ok_or_else(|| Flow::eval(format!("Path not found: {path}")))?;
        Ok(json_to_value(found))
    });

    json_object.add_native("getType", true, |args, _ctx| {
        require_arity("json.getType()", args, 1)?;
        let doc = parse_json(text_arg("json.getType()", args, 0)?)?;
        Ok(Value::text(json_type_name(&doc)))
    });

    json_object.add_native("hasKey", true, |args, _ctx| {
        require_arity("json.hasKey()", args, 2)?;
        let doc = parse_json(text_arg("json.hasKey()", args, 0)?)?;
        let key = text_arg("json.hasKey()", args, 1)?;
        Ok(Value::Bool(doc.get(key).is_some()))
    });

    json_object.add_native("set", true, |args, _ctx| {
        require_arity("json.set()", args, 3)?;
        let mut doc = parse_json(text_arg("json.set()", args, 0)?)?;
        let path = text_arg("json.set()", args, 1)?;
        set_path(&mut doc, path, value_to_json(&args[2]))?;
        Ok(Value::text(doc.to_string()))
    });

    json_object.add_native("remove", true, |args, _ctx| {
        require_arity("json.remove()", args, 2)?;
        let mut doc = parse_json(text_arg("json.remove()", args, 0)?)?;
        let path = text_arg("json.remove()", args, 1)?;
        remove_path(&mut doc, path)?;
        Ok(Value::text(doc.to_string()))
    });

    json_object.add_native("merge", true, |args, _ctx| {
        require_arity("json.merge()", args, 2)?;
        let mut base = parse_json(text_arg("json.merge()", args, 0)?)?;
        let overlay = parse_json(text_arg("json.merge()", args, 1)?)?;
        deep_merge(&mut base, overlay);
        Ok(Value::text(base.to_string()))
    });

    json_object.add_native("keys", true, |args, _ctx| {
        require_arity("json.keys()", args, 1)?;
        let doc = parse_json(text_arg("json.keys()", args, 0)?)?;
        let Json::Object(object) = doc else {
            return Err(Flow::eval("json.keys() requires a JSON object"));
        };
        let keys = object.keys().map(|k| Value::text(k.as_str())).collect();
        Ok(Value::List(Rc::new(ListInstance::from_values("Text", keys))))
    });

    json_object.add_native("values", true, |args, _ctx| {
        require_arity("json.values()", args, 1)?;
        let doc = parse_json(text_arg("json.values()", args, 0)?)?;
        let Json::Object(object) = doc else {
            return Err(Flow::eval("json.values() requires a JSON object"));
        };
        let values = object.values().map(json_to_value).collect();
        Ok(Value::List(Rc::new(ListInstance::from_values("Value", values))))
    });

    json_object.add_native("size", true, |args, _ctx| {
        require_arity("json.size()", args, 1)?;
        let doc = parse_json(text_arg("json.size()", args, 0)?)?;
        let size = match &doc {
            Json::Object(object) => object.len(),
            Json::Array(array) => array.len(),
            _ => return Err(Flow::eval("json.size() requires a JSON object or array")),
        };
        Ok(Value::Int(size as i64))
    });

    json_object.add_native("push", true, |args, _ctx| {
        require_arity("json.push()", args, 2)?;
        let mut doc = parse_json(text_arg("json.push()", args, 0)?)?;
        let Json::Array(array) = &mut doc else {
            return Err(Flow::eval("json.push() requires a JSON array"));
        };
        array.push(value_to_json(&args[1]));
        Ok(Value::text(doc.to_string()))
    });

    json_object.add_native("pop", true, |args, _ctx| {
        require_arity("json.pop()", args, 1)?;
        let mut doc = parse_json(text_arg("json.pop()", args, 0)?)?;
        let Json::Array(array) = &mut doc else {
            return Err(Flow::eval("json.pop() requires a JSON array"));
        };
        if array.pop().is_none() {
            return Err(Flow::eval("json.pop() on empty array"));
        }
        Ok(Value::text(doc.to_string()))
    });

    json_object.add_native("slice", true, |args, _ctx| {
        require_arity("json.slice()", args, 3)?;
        let doc = parse_json(text_arg("json.slice()", args, 0)?)?;
        let Json::Array(array) = doc else {
            return Err(Flow::eval("json.slice() requires a JSON array"));
        };
        let (Some(Value::Int(start)), Some(Value::Int(end))) = (args.get(1), args.get(2)) else {
            return Err(Flow::eval("json.slice() start and end must be Int"));
        };
        let start = (*start).clamp(0, array.len() as i64) as usize;
        let end = (*end).clamp(start as i64, array.len() as i64) as usize;
        Ok(Value::text(Json::Array(array[start..end].to_vec()).to_string()))
    });

    json_object.add_native("indexOf", true, |args, _ctx| {
        require_arity("json.indexOf()", args, 2)?;
        let doc = parse_json(text_arg("json.indexOf()", args, 0)?)?;
        let Json::Array(array) = doc else {
            return Err(Flow::eval("json.indexOf() requires a JSON array"));
        };
        let needle = value_to_json(&args[1]);
        let index = array.iter().position(|v| *v == needle).map_or(-1, |i| i as i64);
        Ok(Value::Int(index))
    });

    json_object.add_native("stringify", true, |args, _ctx| {
        require_arity("json.stringify()", args, 1)?;
        Ok(Value::text(value_to_json(&args[0]).to_string()))
    });

    json_object.add_native("create", true, |args, _ctx| {
        require_arity("json.create()", args, 1)?;
        Ok(Value::text(value_to_json(&args[0]).to_string()))
    });

    json_object.add_native("createArray", true, |args, _ctx| {
        let array: Vec<Json> = args.iter().map(value_to_json).collect();
        Ok(Value::text(Json::Array(array).to_string()))
    });

    json_object.add_native("createObject", true, |args, _ctx| {
        if args.is_empty() {
            return Ok(Value::text("{}"));
        }
        require_arity("json.createObject()", args, 1)?;
        let Value::Map(map) = &args[0] else {
            return Err(Flow::eval("json.createObject() argument must be a Map"));
        };
        Ok(Value::text(value_to_json(&Value::Map(Rc::clone(map))).to_string()))
    });

    json_object.add_native("prettyPrint", true, |args, _ctx| {
        require_arity("json.prettyPrint()", args, 1)?;
        let doc = parse_json(text_arg("json.prettyPrint()", args, 0)?)?;
        serde_json::to_string_pretty(&doc)
            .map(Value::from)
            .map_err(|e| Flow::system(format!("Failed to render JSON: {e}")))
    });

    json_object.add_native("minify", true, |args, _ctx| {
        require_arity("json.minify()", args, 1)?;
        let doc = parse_json(text_arg("json.minify()", args, 0)?)?;
        Ok(Value::text(doc.to_string()))
    });

    json_object.add_native("equals", true, |args, _ctx| {
        require_arity("json.equals()", args, 2)?;
        let a = parse_json(text_arg("json.equals()", args, 0)?)?;
        let b = parse_json(text_arg("json.equals()", args, 1)?)?;
        Ok(Value::Bool(a == b))
    });

    json_object.add_native("clone", true, |args, _ctx| {
        require_arity("json.clone()", args, 1)?;
        let doc = parse_json(text_arg("json.clone()", args, 0)?)?;
        Ok(Value::text(doc.to_string()))
    });

    for (method, check) in [
        ("isObject", json_is_object as fn(&Json) -> bool),
        ("isArray", Json::is_array as fn(&Json) -> bool),
        ("isString", Json::is_string as fn(&Json) -> bool),
        ("isNumber", Json::is_number as fn(&Json) -> bool),
        ("isBoolean", Json::is_boolean as fn(&Json) -> bool),
        ("isNull", Json::is_null as fn(&Json) -> bool),
    ] {
        let name = format!("json.{method}()");
        json_object.add_native(method, true, move |args, _ctx| {
            require_arity(&name, args, 1)?;
            let doc = parse_json(text_arg(&name, args, 0)?)?;
            Ok(Value::Bool(check(&doc)))
        });
    }

    json_object
}

fn json_is_object(v: &Json) -> bool {
    v.is_object()
}

fn parse_json(text: &str) -> EvalResult<Json> {
    serde_json::from_str(text).map_err(|e| Flow::eval(format!("Invalid JSON: {e}")))
}

fn json_type_name(value: &Json) -> &'static str {
    match value {
        Json::Object(_) => "object",
        Json::Array(_) => "array",
        Json::String(_) => "string",
        Json::Number(_) => "number",
        Json::Bool(_) => "boolean",
        Json::Null => "null",
    }
}

/// JSON → runtime value. Objects become maps, arrays become lists,
/// integral numbers become Int, other numbers Double, null the Text
/// `"null"` (the runtime has no null of its own).
pub(crate) fn json_to_value(value: &Json) -> Value {
    match value {
        Json::Null => Value::text("null"),
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::Double(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Json::String(s) => Value::text(s.as_str()),
        Json::Array(array) => {
            let values = array.iter().map(json_to_value).collect();
            Value::List(Rc::new(ListInstance::from_values("Value", values)))
        }
        Json::Object(object) => {
            let map = MapInstance::new("Text", "Value");
            for (key, value) in object {
                map.put(Value::text(key.as_str()), json_to_value(value));
            }
            Value::Map(Rc::new(map))
        }
    }
}

/// Runtime value → JSON. Containers recurse; values with no JSON shape
/// fall back to their canonical rendering as a string.
fn value_to_json(value: &Value) -> Json {
    match value {
        Value::Int(v) => json!(v),
        Value::Long(v) => {
            if let Ok(small) = i64::try_from(*v) {
                json!(small)
            } else {
                json!(v.to_string())
            }
        }
        Value::Float(v) => json!(f64::from(*v)),
        Value::Double(v) => json!(v),
        Value::Bool(v) => json!(v),
        Value::Text(s) => {
            // JSON-valued text embeds structurally so documents round-trip
            // through set/push without double encoding.
            if s.as_ref() == "null" {
                Json::Null
            } else {
                json!(s.as_ref())
            }
        }
        Value::List(list) => Json::Array(list.values().iter().map(value_to_json).collect()),
        Value::Map(map) => {
            let mut object = JsonMap::new();
            for key in map.keys() {
                let rendered = value_to_string(&key);
                if let Ok(entry) = map.get(&key) {
                    object.insert(rendered, value_to_json(&entry));
                }
            }
            Json::Object(object)
        }
        Value::Record(record) => {
            let mut object = JsonMap::new();
            for field in record.field_names() {
                if let Some(entry) = record.get_field(field) {
                    object.insert(field.to_owned(), value_to_json(&entry));
                }
            }
            Json::Object(object)
        }
        other => json!(value_to_string(other)),
    }
}

/// Walks a dot-separated path; numeric segments index arrays.
fn navigate<'a>(doc: &'a Json, path: &str) -> Option<&'a Json> {
    let mut current = doc;
    if path.is_empty() {
        return Some(current);
    }
    for segment in path.split('.') {
        current = match current {
            Json::Array(array) => array.get(segment.parse::<usize>().ok()?)?,
            Json::Object(object) => object.get(segment)?,
            _ => return None,
        };
    }
    Some(current)
}

fn set_path(doc: &mut Json, path: &str, new_value: Json) -> EvalResult<()> {
    if path.is_empty() {
        *doc = new_value;
        return Ok(());
    }
    let segments: Vec<&str> = path.split('.').collect();
    set_at(doc, &segments, path, new_value)
}

fn set_at(current: &mut Json, segments: &[&str], path: &str, new_value: Json) -> EvalResult<()> {
    let Some((segment, rest)) = segments.split_first() else {
        *current = new_value;
        return Ok(());
    };
    match current {
        Json::Array(array) => {
            let index: usize = segment
                .parse()
                .map_err(|_| Flow::eval(format!("Invalid array index '{segment}' in path")))?;
            let slot = array
                .get_mut(index)
                .ok_or_else(|| Flow::eval(format!("Path not found: {path}")))?;
            set_at(slot, rest, path, new_value)
        }
        Json::Object(object) => {
            // Missing intermediate keys are created as objects; a leaf slot
            // is overwritten by the recursion's base case either way.
            let slot = object
                .entry((*segment).to_owned())
                .or_insert_with(|| Json::Object(JsonMap::new()));
            set_at(slot, rest, path, new_value)
        }
        _ => Err(Flow::eval(format!("Path not found: {path}"))),
    }
}

fn remove_path(doc: &mut Json, path: &str) -> EvalResult<()> {
    let segments: Vec<&str> = path.split('.').collect();
    remove_at(doc, &segments, path)
}

fn remove_at(current: &mut Json, segments: &[&str], path: &str) -> EvalResult<()> {
    let missing = || Flow::eval(format!("Path not found: {path}"));
    match segments {
        [] => Err(missing()),
        [leaf] => match current {
            Json::Object(object) => {
                object.shift_remove(*leaf).ok_or_else(missing)?;
                Ok(())
            }
            Json::Array(array) => {
                let index: usize = leaf.parse().map_err(|_| missing())?;
                if index >= array.len() {
                    return Err(missing());
                }
                array.remove(index);
                Ok(())
            }
            _ => Err(missing()),
        },
        [segment, rest @ ..] => {
            let slot = match current {
                Json::Array(array) => {
                    let index: usize = segment.parse().map_err(|_| missing())?;
                    array.get_mut(index).ok_or_else(missing)?
                }
                Json::Object(object) => object.get_mut(*segment).ok_or_else(missing)?,
                _ => return Err(missing()),
            };
            remove_at(slot, rest, path)
        }
    }
}

/// Recursive merge: object keys from `overlay` override `base`; other
/// shapes replace wholesale.
fn deep_merge(base: &mut Json, overlay: Json) {
    match (base, overlay) {
        (Json::Object(base_map), Json::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base_slot, other) => *base_slot = other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn navigate_mixed_path() {
        let doc: Json = serde_json::from_str(r#"{"a": {"b": [10, 20, 30]}}"#).unwrap();
        assert_eq!(navigate(&doc, "a.b.1"), Some(&json!(20)));
        assert_eq!(navigate(&doc, "a.x"), None);
    }

    #[test]
    fn set_creates_intermediate_objects() {
        let mut doc: Json = serde_json::from_str("{}").unwrap();
        set_path(&mut doc, "a.b.c", json!(1)).unwrap();
        assert_eq!(doc, serde_json::from_str::<Json>(r#"{"a":{"b":{"c":1}}}"#).unwrap());
    }

    #[test]
    fn merge_overrides_deeply() {
        let mut base: Json = serde_json::from_str(r#"{"a": {"x": 1, "y": 2}}"#).unwrap();
        let overlay: Json = serde_json::from_str(r#"{"a": {"y": 9}, "b": 3}"#).unwrap();
        deep_merge(&mut base, overlay);
        assert_eq!(
            base,
            serde_json::from_str::<Json>(r#"{"a":{"x":1,"y":9},"b":3}"#).unwrap()
        );
    }
}
