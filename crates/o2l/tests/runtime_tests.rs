use std::rc::Rc;

use o2l::{
    type_name, value_to_string, values_equal, ErrorInstance, ListInstance, ListIterator,
    MapInstance, MapIterator, RepeatIterator, ResultInstance, SetInstance, SetIterator, Value,
};
use pretty_assertions::assert_eq;

#[test]
fn value_to_string_for_primitives() {
    assert_eq!(value_to_string(&Value::Int(42)), "42");
    assert_eq!(value_to_string(&Value::Long(123456789012345)), "123456789012345");
    assert_eq!(value_to_string(&Value::text("Hello")), "Hello");
    assert_eq!(value_to_string(&Value::Bool(true)), "true");
    assert_eq!(value_to_string(&Value::Bool(false)), "false");
    assert_eq!(value_to_string(&Value::Char(b'A')), "A");
}

#[test]
fn numeric_variants_are_distinct() {
    assert!(!values_equal(&Value::Int(42), &Value::Long(42)));
    assert!(!values_equal(&Value::Float(3.14), &Value::Double(3.14)));
    assert!(!values_equal(&Value::Long(42), &Value::Float(42.0)));
    assert!(values_equal(&Value::Long(123456789012345), &Value::Long(123456789012345)));
}

#[test]
fn container_type_names_embed_declared_types() {
    let list = Value::List(Rc::new(ListInstance::new("Int")));
    assert_eq!(type_name(&list), "List<Int>");
    let map = Value::Map(Rc::new(MapInstance::new("Text", "Int")));
    assert_eq!(type_name(&map), "Map<Text, Int>");
    let set = Value::Set(Rc::new(SetInstance::new("Text")));
    assert_eq!(type_name(&set), "Set<Text>");
}

#[test]
fn container_renderings() {
    let list = ListInstance::from_values("Int", vec![Value::Int(1), Value::Int(2)]);
    assert_eq!(list.render(), "[1, 2]");

    let map = MapInstance::new("Text", "Int");
    assert_eq!(map.render(), "{}");
    map.put(Value::text("a"), Value::Int(1));
    assert_eq!(map.render(), "{a: 1}");

    let set = SetInstance::new("Int");
    assert_eq!(set.render(), "()");
    set.add(Value::Int(2));
    set.add(Value::Int(1));
    assert_eq!(set.render(), "(1, 2)");
}

#[test]
fn list_iterator_visits_every_element_then_fails() {
    let list = Rc::new(ListInstance::from_values(
        "Int",
        vec![Value::Int(10), Value::Int(20), Value::Int(30)],
    ));
    let iter = ListIterator::new(Rc::clone(&list));

    let mut seen = Vec::new();
    for _ in 0..list.size() {
        seen.push(value_to_string(&iter.next().unwrap()));
    }
    assert_eq!(seen, ["10", "20", "30"]);
    assert!(!iter.has_next());
    assert!(iter.next().is_err());

    iter.reset();
    assert_eq!(value_to_string(&iter.next().unwrap()), "10");
}

#[test]
fn map_iteration_follows_string_form_order_and_supports_entries() {
    let map = Rc::new(MapInstance::new("Text", "Int"));
    map.put(Value::text("beta"), Value::Int(2));
    map.put(Value::text("alpha"), Value::Int(1));

    let iter = MapIterator::new(Rc::clone(&map));
    assert_eq!(iter.next_entry().unwrap().as_text().unwrap(), "alpha:1");
    let item = iter.map_item().unwrap();
    let Value::MapEntry(entry) = item else { panic!("expected MapObject") };
    assert_eq!(value_to_string(entry.key()), "beta");
    assert_eq!(value_to_string(entry.value()), "2");
    assert!(!iter.has_next());
    assert!(iter.next_key().is_err());

    iter.reset();
    assert_eq!(value_to_string(&iter.next_key().unwrap()), "alpha");
    assert_eq!(iter.total_size(), 2);
}

#[test]
fn set_iterator_walks_sorted_elements() {
    let set = Rc::new(SetInstance::new("Text"));
    set.add(Value::text("pear"));
    set.add(Value::text("apple"));
    set.add(Value::text("apple"));
    assert_eq!(set.size(), 2);

    let iter = SetIterator::new(Rc::clone(&set));
    assert_eq!(iter.next().unwrap().as_text().unwrap(), "apple");
    assert_eq!(iter.next().unwrap().as_text().unwrap(), "pear");
    assert!(iter.next().is_err());
    assert_eq!(iter.total_size(), 2);
}

#[test]
fn repeat_iterator_counts_from_zero() {
    let iter = RepeatIterator::new(3).unwrap();
    let mut collected = Vec::new();
    while iter.has_next() {
        collected.push(iter.next().unwrap().as_int().unwrap());
    }
    assert_eq!(collected, [0, 1, 2]);
    assert!(RepeatIterator::new(-2).is_err());
    assert_eq!(iter.render(), "RepeatIterator(count=3/3, hasNext=false)");
}

#[test]
fn result_rendering_and_accessors() {
    let ok = ResultInstance::success(Value::Int(7), "Int", "Error");
    assert!(ok.is_success());
    assert_eq!(value_to_string(&ok.result()), "7");
    assert_eq!(ok.render(), "Result.Success(7)");

    let error_value = Value::Error(Rc::new(ErrorInstance::new("boom", "E1")));
    let err = ResultInstance::error(error_value, "Int", "Error");
    assert!(!err.is_success());
    assert_eq!(err.render(), "Result.Error(E1: boom)");
}

#[test]
fn error_instance_renders_code_and_message() {
    let error = ErrorInstance::new("file missing", "IO_ERROR");
    assert_eq!(error.render(), "IO_ERROR: file missing");
    assert_eq!(type_name(&Value::Error(Rc::new(error))), "Error");
}

#[test]
fn iterator_renderings_report_progress() {
    let list = Rc::new(ListInstance::from_values("Int", vec![Value::Int(1)]));
    let iter = ListIterator::new(list);
    assert_eq!(iter.render(), "ListIterator(index=0, hasNext=true)");
    iter.next().unwrap();
    assert_eq!(iter.render(), "ListIterator(index=1, hasNext=false)");
}
