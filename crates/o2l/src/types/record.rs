use std::fmt::Write as _;

use indexmap::IndexMap;

use crate::value::{value_to_string, values_equal, Value};

/// The schema of a record type: its name and declared fields in order.
#[derive(Debug)]
pub struct RecordType {
    name: String,
    fields: Vec<(String, String)>,
}

impl RecordType {
    #[must_use]
    pub fn new(name: impl Into<String>, fields: Vec<(String, String)>) -> Self {
        Self { name: name.into(), fields }
    }

    #[must_use]
    pub fn record_name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    #[must_use]
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|(f, _)| f == name)
    }

    #[must_use]
    pub fn render(&self) -> String {
        let mut out = format!("Record {} {{ ", self.name);
        for (i, (field, ty)) in self.fields.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            let _ = write!(out, "{field}: {ty}");
        }
        out.push_str(" }");
        out
    }
}

/// A populated record. Fields are fixed at construction; records compare
/// structurally, field by field.
#[derive(Debug)]
pub struct RecordInstance {
    type_name: String,
    fields: IndexMap<String, Value>,
}

impl RecordInstance {
    #[must_use]
    pub fn new(type_name: impl Into<String>, fields: IndexMap<String, Value>) -> Self {
        Self { type_name: type_name.into(), fields }
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    #[must_use]
    pub fn get_field(&self, name: &str) -> Option<Value> {
        self.fields.get(name).cloned()
    }

    #[must_use]
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.keys().map(String::as_str).collect()
    }

    #[must_use]
    pub fn structurally_equals(&self, other: &Self) -> bool {
        if self.type_name != other.type_name || self.fields.len() != other.fields.len() {
            return false;
        }
        self.fields.iter().all(|(name, value)| {
            other
                .fields
                .get(name)
                .is_some_and(|other_value| values_equal(value, other_value))
        })
    }

    #[must_use]
    pub fn render(&self) -> String {
        let mut out = format!("{}(", self.type_name);
        for (i, (name, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            let _ = write!(out, "{name}: {}", value_to_string(value));
        }
        out.push(')');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(x: i64, y: i64) -> RecordInstance {
        let mut fields = IndexMap::new();
        fields.insert("x".to_owned(), Value::Int(x));
        fields.insert("y".to_owned(), Value::Int(y));
        RecordInstance::new("Point", fields)
    }

    #[test]
    fn records_compare_structurally() {
        assert!(point(1, 2).structurally_equals(&point(1, 2)));
        assert!(!point(1, 2).structurally_equals(&point(1, 3)));
    }

    #[test]
    fn rendering_lists_fields_in_order() {
        assert_eq!(point(1, 2).render(), "Point(x: 1, y: 2)");
    }
}
