use std::{cmp::Ordering, fmt::Write as _, rc::Rc};

use crate::{
    object::ObjectInstance,
    types::{
        EnumInstance, ErrorInstance, FfiHandle, ListInstance, ListIterator, MapEntry, MapInstance,
        MapIterator, ProtocolInstance, RecordInstance, RecordType, RepeatIterator, ResultInstance,
        SetInstance, SetIterator,
    },
};

/// Primary value type representing O²L values at runtime.
///
/// Primitives are stored inline. Everything with identity (objects,
/// containers, iterators, records, errors, results) is stored behind `Rc`
/// and shared by reference; mutable runtimes additionally sit behind a
/// `RefCell` inside their instance type. Cloning a `Value` is therefore
/// cheap and never deep-copies.
#[derive(Debug, Clone)]
pub enum Value {
    Int(i64),
    Long(i128),
    Float(f32),
    Double(f64),
    Bool(bool),
    Char(u8),
    Text(Rc<str>),
    Object(Rc<ObjectInstance>),
    Enum(Rc<EnumInstance>),
    RecordType(Rc<RecordType>),
    Record(Rc<RecordInstance>),
    Protocol(Rc<ProtocolInstance>),
    List(Rc<ListInstance>),
    ListIter(Rc<ListIterator>),
    RepeatIter(Rc<RepeatIterator>),
    Map(Rc<MapInstance>),
    MapIter(Rc<MapIterator>),
    MapEntry(Rc<MapEntry>),
    Set(Rc<SetInstance>),
    SetIter(Rc<SetIterator>),
    Error(Rc<ErrorInstance>),
    Result(Rc<ResultInstance>),
    /// Opaque FFI handles (pointer, buffer, struct, array, callback).
    /// The dispatcher treats these as opaque receivers.
    Ffi(FfiHandle),
}

impl Value {
    /// The unit/void value returned by built-ins with no meaningful result.
    ///
    /// Matches the original runtime, whose default-constructed value was the
    /// first variant of its union: `Int(0)`.
    #[must_use]
    pub fn void() -> Self {
        Self::Int(0)
    }

    #[must_use]
    pub fn text(s: impl Into<Rc<str>>) -> Self {
        Self::Text(s.into())
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v.into())
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.into())
    }
}

/// Canonical type name of a value, as used in error messages and
/// declaration-time type checks.
///
/// Container names embed their declared element/key types, e.g.
/// `List<Int>` or `Map<Text, Int>`.
#[must_use]
pub fn type_name(value: &Value) -> String {
    match value {
        Value::Int(_) => "Int".to_owned(),
        Value::Long(_) => "Long".to_owned(),
        Value::Float(_) => "Float".to_owned(),
        Value::Double(_) => "Double".to_owned(),
        Value::Bool(_) => "Bool".to_owned(),
        Value::Char(_) => "Char".to_owned(),
        Value::Text(_) => "Text".to_owned(),
        Value::Object(obj) => obj.name().to_owned(),
        Value::Enum(en) => en.enum_name().to_owned(),
        Value::RecordType(_) => "RecordType".to_owned(),
        Value::Record(rec) => rec.type_name().to_owned(),
        Value::Protocol(proto) => proto.name().to_owned(),
        Value::List(list) => format!("List<{}>", list.element_type_name()),
        Value::ListIter(_) => "ListIterator".to_owned(),
        Value::RepeatIter(_) => "RepeatIterator".to_owned(),
        Value::Map(map) => format!("Map<{}, {}>", map.key_type_name(), map.value_type_name()),
        Value::MapIter(_) => "MapIterator".to_owned(),
        Value::MapEntry(_) => "MapObject".to_owned(),
        Value::Set(set) => format!("Set<{}>", set.element_type_name()),
        Value::SetIter(_) => "SetIterator".to_owned(),
        Value::Error(_) => "Error".to_owned(),
        Value::Result(res) => format!(
            "Result<{}, {}>",
            res.value_type_name(),
            res.error_type_name()
        ),
        Value::Ffi(handle) => handle.type_name().to_owned(),
    }
}

/// Total, deterministic string rendering of a value.
///
/// Containers render recursively; floats use the host's default formatting.
#[must_use]
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::Int(v) => v.to_string(),
        Value::Long(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::Double(v) => v.to_string(),
        Value::Bool(v) => if *v { "true" } else { "false" }.to_owned(),
        Value::Char(c) => (*c as char).to_string(),
        Value::Text(s) => s.to_string(),
        Value::Object(obj) => format!("Object({})", obj.name()),
        Value::Enum(en) => format!("Enum({})", en.enum_name()),
        Value::RecordType(rt) => format!("RecordType({})", rt.record_name()),
        Value::Record(rec) => rec.render(),
        Value::Protocol(proto) => format!("Protocol({})", proto.name()),
        Value::List(list) => list.render(),
        Value::ListIter(iter) => iter.render(),
        Value::RepeatIter(iter) => iter.render(),
        Value::Map(map) => map.render(),
        Value::MapIter(iter) => iter.render(),
        Value::MapEntry(entry) => entry.render(),
        Value::Set(set) => set.render(),
        Value::SetIter(iter) => iter.render(),
        Value::Error(err) => err.render(),
        Value::Result(res) => res.render(),
        Value::Ffi(handle) => handle.render(),
    }
}

/// Detailed rendering used by the `%o` print directive: enums and records
/// expand to their full declaration-style form, everything else falls back
/// to [`value_to_string`].
#[must_use]
pub fn value_to_object_string(value: &Value) -> String {
    match value {
        Value::Object(obj) => format!("Object {}", obj.name()),
        Value::Enum(en) => en.render_detailed(),
        Value::Record(rec) => rec.render(),
        Value::RecordType(rt) => rt.render(),
        _ => value_to_string(value),
    }
}

/// Variant-aware equality.
///
/// Different variants never compare equal (so `Int(1) != Long(1)`).
/// Primitives compare by value, records structurally, and every
/// shared-reference variant by identity.
#[must_use]
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Long(x), Value::Long(y)) => x == y,
        (Value::Float(x), Value::Float(y)) => x == y,
        (Value::Double(x), Value::Double(y)) => x == y,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Char(x), Value::Char(y)) => x == y,
        (Value::Text(x), Value::Text(y)) => x == y,
        (Value::Object(x), Value::Object(y)) => Rc::ptr_eq(x, y),
        (Value::Enum(x), Value::Enum(y)) => Rc::ptr_eq(x, y),
        (Value::RecordType(x), Value::RecordType(y)) => Rc::ptr_eq(x, y),
        (Value::Record(x), Value::Record(y)) => x.structurally_equals(y),
        (Value::Protocol(x), Value::Protocol(y)) => Rc::ptr_eq(x, y),
        (Value::List(x), Value::List(y)) => Rc::ptr_eq(x, y),
        (Value::ListIter(x), Value::ListIter(y)) => Rc::ptr_eq(x, y),
        (Value::RepeatIter(x), Value::RepeatIter(y)) => Rc::ptr_eq(x, y),
        (Value::Map(x), Value::Map(y)) => Rc::ptr_eq(x, y),
        (Value::MapIter(x), Value::MapIter(y)) => Rc::ptr_eq(x, y),
        (Value::MapEntry(x), Value::MapEntry(y)) => Rc::ptr_eq(x, y),
        (Value::Set(x), Value::Set(y)) => Rc::ptr_eq(x, y),
        (Value::SetIter(x), Value::SetIter(y)) => Rc::ptr_eq(x, y),
        (Value::Error(x), Value::Error(y)) => Rc::ptr_eq(x, y),
        (Value::Result(x), Value::Result(y)) => Rc::ptr_eq(x, y),
        (Value::Ffi(x), Value::Ffi(y)) => x.identity_equals(y),
        _ => false,
    }
}

/// Ordering predicate used by sets and ordered maps: textual comparison of
/// the canonical rendering. Containers never hold mixed kinds (each has a
/// declared element/key type), so this is total in practice.
#[must_use]
pub fn by_string_form(a: &Value, b: &Value) -> Ordering {
    value_to_string(a).cmp(&value_to_string(b))
}

/// Renders a sequence of values as `[a, b, c]`.
pub(crate) fn render_joined(out: &mut String, values: &[Value]) {
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let _ = write!(out, "{}", value_to_string(v));
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::types::ListInstance;

    #[test]
    fn primitive_type_names() {
        assert_eq!(type_name(&Value::Int(42)), "Int");
        assert_eq!(type_name(&Value::Long(42)), "Long");
        assert_eq!(type_name(&Value::Float(1.5)), "Float");
        assert_eq!(type_name(&Value::Double(1.5)), "Double");
        assert_eq!(type_name(&Value::Bool(true)), "Bool");
        assert_eq!(type_name(&Value::Char(b'A')), "Char");
        assert_eq!(type_name(&Value::text("hi")), "Text");
    }

    #[test]
    fn numeric_variants_do_not_cross_compare() {
        assert!(!values_equal(&Value::Int(1), &Value::Long(1)));
        assert!(!values_equal(&Value::Float(1.0), &Value::Double(1.0)));
        assert!(!values_equal(&Value::Int(1), &Value::Double(1.0)));
        assert!(values_equal(&Value::Int(1), &Value::Int(1)));
    }

    #[test]
    fn lists_compare_by_identity() {
        let a = Rc::new(ListInstance::new("Int"));
        let b = Rc::new(ListInstance::new("Int"));
        assert!(values_equal(
            &Value::List(Rc::clone(&a)),
            &Value::List(Rc::clone(&a))
        ));
        assert!(!values_equal(&Value::List(a), &Value::List(b)));
    }

    #[test]
    fn rendering_is_total_for_primitives() {
        assert_eq!(value_to_string(&Value::Int(42)), "42");
        assert_eq!(value_to_string(&Value::Long(123456789012345)), "123456789012345");
        assert_eq!(value_to_string(&Value::Bool(false)), "false");
        assert_eq!(value_to_string(&Value::Char(b'A')), "A");
        assert_eq!(value_to_string(&Value::text("Hello")), "Hello");
    }

    #[test]
    fn string_form_ordering_is_textual() {
        assert_eq!(
            by_string_form(&Value::text("apple"), &Value::text("banana")),
            std::cmp::Ordering::Less
        );
        // "10" sorts before "2" textually; containers rely on this order.
        assert_eq!(
            by_string_form(&Value::Int(10), &Value::Int(2)),
            std::cmp::Ordering::Less
        );
    }
}
