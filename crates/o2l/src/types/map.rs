use std::{cell::Cell, cell::RefCell, fmt::Write as _, rc::Rc};

use crate::{
    exception::{EvalResult, Flow},
    types::list::{require_no_args, ListInstance},
    value::{value_to_string, values_equal, Value},
};

/// A mutable, reference-shared key/value map.
///
/// Entries are kept sorted by the string form of their key, which defines
/// the canonical iteration order. Lookup uses value equality.
#[derive(Debug)]
pub struct MapInstance {
    entries: RefCell<Vec<(Value, Value)>>,
    key_type_name: String,
    value_type_name: String,
}

impl MapInstance {
    #[must_use]
    pub fn new(key_type: impl Into<String>, value_type: impl Into<String>) -> Self {
        Self {
            entries: RefCell::new(Vec::new()),
            key_type_name: key_type.into(),
            value_type_name: value_type.into(),
        }
    }

    #[must_use]
    pub fn key_type_name(&self) -> &str {
        &self.key_type_name
    }

    #[must_use]
    pub fn value_type_name(&self) -> &str {
        &self.value_type_name
    }

    fn position_of(&self, key: &Value) -> Option<usize> {
        self.entries
            .borrow()
            .iter()
            .position(|(k, _)| values_equal(k, key))
    }

    /// Inserts or overwrites, keeping the string-form key order.
    pub fn put(&self, key: Value, value: Value) {
        if let Some(index) = self.position_of(&key) {
            self.entries.borrow_mut()[index].1 = value;
            return;
        }
        let rendered = value_to_string(&key);
        let mut entries = self.entries.borrow_mut();
        let insert_at = entries
            .binary_search_by(|(k, _)| value_to_string(k).cmp(&rendered))
            .unwrap_or_else(|slot| slot);
        entries.insert(insert_at, (key, value));
    }

    pub fn get(&self, key: &Value) -> EvalResult<Value> {
        self.position_of(key)
            .map(|i| self.entries.borrow()[i].1.clone())
            .ok_or_else(|| Flow::eval("Key not found in map"))
    }

    #[must_use]
    pub fn contains(&self, key: &Value) -> bool {
        self.position_of(key).is_some()
    }

    pub fn remove(&self, key: &Value) -> EvalResult<()> {
        match self.position_of(key) {
            Some(index) => {
                self.entries.borrow_mut().remove(index);
                Ok(())
            }
            None => Err(Flow::eval("Key not found in map")),
        }
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.entries.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    #[must_use]
    pub fn keys(&self) -> Vec<Value> {
        self.entries.borrow().iter().map(|(k, _)| k.clone()).collect()
    }

    #[must_use]
    pub fn values(&self) -> Vec<Value> {
        self.entries.borrow().iter().map(|(_, v)| v.clone()).collect()
    }

    #[must_use]
    pub fn entry_at(&self, index: usize) -> Option<(Value, Value)> {
        self.entries.borrow().get(index).cloned()
    }

    #[must_use]
    pub fn render(&self) -> String {
        let entries = self.entries.borrow();
        if entries.is_empty() {
            return "{}".to_owned();
        }
        let mut out = String::from("{");
        for (i, (k, v)) in entries.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            let _ = write!(out, "{}: {}", value_to_string(k), value_to_string(v));
        }
        out.push('}');
        out
    }
}

/// A key-value pair view with typed getters, produced by
/// `MapIterator.MapItem()`.
#[derive(Debug)]
pub struct MapEntry {
    key: Value,
    value: Value,
    key_type_name: String,
    value_type_name: String,
}

impl MapEntry {
    #[must_use]
    pub fn new(key: Value, value: Value, key_type: &str, value_type: &str) -> Self {
        Self {
            key,
            value,
            key_type_name: key_type.to_owned(),
            value_type_name: value_type.to_owned(),
        }
    }

    #[must_use]
    pub fn key(&self) -> &Value {
        &self.key
    }

    #[must_use]
    pub fn value(&self) -> &Value {
        &self.value
    }

    #[must_use]
    pub fn key_type_name(&self) -> &str {
        &self.key_type_name
    }

    #[must_use]
    pub fn value_type_name(&self) -> &str {
        &self.value_type_name
    }

    #[must_use]
    pub fn render(&self) -> String {
        format!(
            "MapObject{{key: {}, value: {}}}",
            value_to_string(&self.key),
            value_to_string(&self.value)
        )
    }
}

/// Cursor over a shared [`MapInstance`] in canonical key order.
#[derive(Debug)]
pub struct MapIterator {
    map: Rc<MapInstance>,
    cursor: Cell<usize>,
}

impl MapIterator {
    #[must_use]
    pub fn new(map: Rc<MapInstance>) -> Self {
        Self { map, cursor: Cell::new(0) }
    }

    #[must_use]
    pub fn has_next(&self) -> bool {
        self.cursor.get() < self.map.size()
    }

    fn advance(&self, missing: &str) -> EvalResult<(Value, Value)> {
        match self.map.entry_at(self.cursor.get()) {
            Some(entry) => {
                self.cursor.set(self.cursor.get() + 1);
                Ok(entry)
            }
            None => Err(Flow::eval(missing.to_owned())),
        }
    }

    pub fn next_key(&self) -> EvalResult<Value> {
        self.advance("MapIterator has no more keys").map(|(k, _)| k)
    }

    pub fn next_value(&self) -> EvalResult<Value> {
        self.advance("MapIterator has no more values").map(|(_, v)| v)
    }

    /// Legacy entry form: a Text `"key:value"`. Prefer [`Self::map_item`],
    /// which keeps type information.
    pub fn next_entry(&self) -> EvalResult<Value> {
        let (key, value) = self.advance("MapIterator has no more entries")?;
        Ok(Value::text(format!(
            "{}:{}",
            value_to_string(&key),
            value_to_string(&value)
        )))
    }

    pub fn map_item(&self) -> EvalResult<Value> {
        let (key, value) = self.advance("MapIterator has no more items")?;
        Ok(Value::MapEntry(Rc::new(MapEntry::new(
            key,
            value,
            self.map.key_type_name(),
            self.map.value_type_name(),
        ))))
    }

    pub fn reset(&self) {
        self.cursor.set(0);
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.cursor.get()
    }

    #[must_use]
    pub fn total_size(&self) -> usize {
        self.map.size()
    }

    #[must_use]
    pub fn render(&self) -> String {
        format!(
            "MapIterator(index={}, total={}, hasNext={})",
            self.current_index(),
            self.total_size(),
            self.has_next()
        )
    }
}

pub(crate) fn call_map_method(
    map: &Rc<MapInstance>,
    name: &str,
    args: &[Value],
) -> EvalResult<Value> {
    match name {
        "put" => match args {
            [key, value] => {
                map.put(key.clone(), value.clone());
                Ok(Value::void())
            }
            _ => Err(Flow::eval("Map.put() requires exactly two arguments (key, value)")),
        },
        "get" => match args {
            [key] => map.get(key),
            _ => Err(Flow::eval("Map.get() requires exactly one argument (key)")),
        },
        "contains" => match args {
            [key] => Ok(Value::Bool(map.contains(key))),
            _ => Err(Flow::eval("Map.contains() requires exactly one argument (key)")),
        },
        "remove" => match args {
            [key] => {
                map.remove(key)?;
                Ok(Value::void())
            }
            _ => Err(Flow::eval("Map.remove() requires exactly one argument (key)")),
        },
        "size" => {
            require_no_args("Map.size()", args)?;
            Ok(Value::Int(map.size() as i64))
        }
        "empty" => {
            require_no_args("Map.empty()", args)?;
            Ok(Value::Bool(map.is_empty()))
        }
        "clear" => {
            require_no_args("Map.clear()", args)?;
            map.clear();
            Ok(Value::void())
        }
        "keys" => {
            require_no_args("Map.keys()", args)?;
            Ok(Value::List(Rc::new(ListInstance::from_values(
                map.key_type_name(),
                map.keys(),
            ))))
        }
        "values" => {
            require_no_args("Map.values()", args)?;
            Ok(Value::List(Rc::new(ListInstance::from_values(
                map.value_type_name(),
                map.values(),
            ))))
        }
        "iterator" => {
            require_no_args("Map.iterator()", args)?;
            Ok(Value::MapIter(Rc::new(MapIterator::new(Rc::clone(map)))))
        }
        _ => Err(Flow::eval(format!("Unknown method '{name}' on Map type"))),
    }
}

pub(crate) fn call_map_iterator_method(
    iter: &Rc<MapIterator>,
    name: &str,
    args: &[Value],
) -> EvalResult<Value> {
    match name {
        "hasNext" => {
            require_no_args("MapIterator.hasNext()", args)?;
            Ok(Value::Bool(iter.has_next()))
        }
        "nextKey" => {
            require_no_args("MapIterator.nextKey()", args)?;
            iter.next_key()
        }
        "nextValue" => {
            require_no_args("MapIterator.nextValue()", args)?;
            iter.next_value()
        }
        "nextEntry" => {
            require_no_args("MapIterator.nextEntry()", args)?;
            iter.next_entry()
        }
        "MapItem" => {
            require_no_args("MapIterator.MapItem()", args)?;
            iter.map_item()
        }
        "reset" => {
            require_no_args("MapIterator.reset()", args)?;
            iter.reset();
            Ok(Value::void())
        }
        "getCurrentIndex" => {
            require_no_args("MapIterator.getCurrentIndex()", args)?;
            Ok(Value::Int(iter.current_index() as i64))
        }
        "getTotalSize" => {
            require_no_args("MapIterator.getTotalSize()", args)?;
            Ok(Value::Int(iter.total_size() as i64))
        }
        _ => Err(Flow::eval(format!("Unknown method '{name}' on MapIterator type"))),
    }
}

pub(crate) fn call_map_entry_method(
    entry: &Rc<MapEntry>,
    name: &str,
    args: &[Value],
) -> EvalResult<Value> {
    match name {
        "getKey" => {
            require_no_args("MapObject.getKey()", args)?;
            Ok(entry.key().clone())
        }
        "getVal" => {
            require_no_args("MapObject.getVal()", args)?;
            Ok(entry.value().clone())
        }
        "getValue" => {
            require_no_args("MapObject.getValue()", args)?;
            Ok(entry.value().clone())
        }
        _ => Err(Flow::eval(format!("Unknown method '{name}' on MapObject type"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iteration_follows_string_form_key_order() {
        let map = MapInstance::new("Text", "Int");
        map.put(Value::text("banana"), Value::Int(2));
        map.put(Value::text("apple"), Value::Int(1));
        map.put(Value::text("cherry"), Value::Int(3));
        let keys: Vec<String> = map.keys().iter().map(value_to_string).collect();
        assert_eq!(keys, ["apple", "banana", "cherry"]);
    }

    #[test]
    fn put_overwrites_existing_key() {
        let map = MapInstance::new("Text", "Int");
        map.put(Value::text("a"), Value::Int(1));
        map.put(Value::text("a"), Value::Int(2));
        assert_eq!(map.size(), 1);
        assert!(matches!(map.get(&Value::text("a")).unwrap(), Value::Int(2)));
    }

    #[test]
    fn missing_key_fails() {
        let map = MapInstance::new("Text", "Int");
        assert!(map.get(&Value::text("ghost")).is_err());
        assert!(map.remove(&Value::text("ghost")).is_err());
    }

    #[test]
    fn next_entry_renders_key_colon_value() {
        let map = Rc::new(MapInstance::new("Text", "Int"));
        map.put(Value::text("a"), Value::Int(1));
        let iter = MapIterator::new(map);
        let entry = iter.next_entry().unwrap();
        assert_eq!(entry.as_text().unwrap(), "a:1");
        assert!(iter.next_entry().is_err());
    }
}
