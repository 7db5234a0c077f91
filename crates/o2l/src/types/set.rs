use std::{cell::Cell, cell::RefCell, rc::Rc};

use crate::{
    exception::{EvalResult, Flow},
    types::list::{require_no_args, ListInstance},
    value::{render_joined, value_to_string, Value},
};

/// A mutable, reference-shared set ordered by the string form of its
/// elements. Two values whose canonical renderings coincide occupy the
/// same slot, matching the original comparator semantics.
#[derive(Debug)]
pub struct SetInstance {
    elements: RefCell<Vec<Value>>,
    element_type_name: String,
}

impl SetInstance {
    #[must_use]
    pub fn new(element_type: impl Into<String>) -> Self {
        Self {
            elements: RefCell::new(Vec::new()),
            element_type_name: element_type.into(),
        }
    }

    #[must_use]
    pub fn element_type_name(&self) -> &str {
        &self.element_type_name
    }

    fn slot_of(&self, element: &Value) -> Result<usize, usize> {
        let rendered = value_to_string(element);
        self.elements
            .borrow()
            .binary_search_by(|e| value_to_string(e).cmp(&rendered))
    }

    pub fn add(&self, element: Value) {
        if let Err(insert_at) = self.slot_of(&element) {
            self.elements.borrow_mut().insert(insert_at, element);
        }
    }

    #[must_use]
    pub fn contains(&self, element: &Value) -> bool {
        self.slot_of(element).is_ok()
    }

    /// Removing an absent element is a no-op, as in the original.
    pub fn remove(&self, element: &Value) {
        if let Ok(index) = self.slot_of(element) {
            self.elements.borrow_mut().remove(index);
        }
    }

    pub fn clear(&self) {
        self.elements.borrow_mut().clear();
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.elements.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.borrow().is_empty()
    }

    #[must_use]
    pub fn values(&self) -> Vec<Value> {
        self.elements.borrow().clone()
    }

    #[must_use]
    pub fn element_at(&self, index: usize) -> Option<Value> {
        self.elements.borrow().get(index).cloned()
    }

    #[must_use]
    pub fn render(&self) -> String {
        let elements = self.elements.borrow();
        if elements.is_empty() {
            return "()".to_owned();
        }
        let mut out = String::from("(");
        render_joined(&mut out, &elements);
        out.push(')');
        out
    }
}

/// Cursor over a shared [`SetInstance`] in string-form order.
#[derive(Debug)]
pub struct SetIterator {
    set: Rc<SetInstance>,
    cursor: Cell<usize>,
}

impl SetIterator {
    #[must_use]
    pub fn new(set: Rc<SetInstance>) -> Self {
        Self { set, cursor: Cell::new(0) }
    }

    #[must_use]
    pub fn has_next(&self) -> bool {
        self.cursor.get() < self.set.size()
    }

    pub fn next(&self) -> EvalResult<Value> {
        match self.set.element_at(self.cursor.get()) {
            Some(element) => {
                self.cursor.set(self.cursor.get() + 1);
                Ok(element)
            }
            None => Err(Flow::eval("SetIterator has no more elements")),
        }
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
        self.set.size()
    }

    #[must_use]
    pub fn render(&self) -> String {
        format!(
            "SetIterator<{}>(index={}, total={})",
            self.set.element_type_name(),
            self.current_index(),
            self.total_size()
        )
    }
}

pub(crate) fn call_set_method(
    set: &Rc<SetInstance>,
    name: &str,
    args: &[Value],
) -> EvalResult<Value> {
    match name {
        "add" => match args {
            [element] => {
                set.add(element.clone());
                Ok(Value::void())
            }
            _ => Err(Flow::eval("Set.add() requires exactly one argument")),
        },
        "contains" => match args {
            [element] => Ok(Value::Bool(set.contains(element))),
            _ => Err(Flow::eval("Set.contains() requires exactly one argument")),
        },
        "remove" => match args {
            [element] => {
                set.remove(element);
                Ok(Value::void())
            }
            _ => Err(Flow::eval("Set.remove() requires exactly one argument")),
        },
        "size" => {
            require_no_args("Set.size()", args)?;
            Ok(Value::Int(set.size() as i64))
        }
        "empty" => {
            require_no_args("Set.empty()", args)?;
            Ok(Value::Bool(set.is_empty()))
        }
        "clear" => {
            require_no_args("Set.clear()", args)?;
            set.clear();
            Ok(Value::void())
        }
        "elements" => {
            require_no_args("Set.elements()", args)?;
            Ok(Value::List(Rc::new(ListInstance::from_values(
                set.element_type_name(),
                set.values(),
            ))))
        }
        "iterator" => {
            require_no_args("Set.iterator()", args)?;
            Ok(Value::SetIter(Rc::new(SetIterator::new(Rc::clone(set)))))
        }
        _ => Err(Flow::eval(format!("Unknown method '{name}' on Set type"))),
    }
}

pub(crate) fn call_set_iterator_method(
    iter: &Rc<SetIterator>,
    name: &str,
    args: &[Value],
) -> EvalResult<Value> {
    match name {
        "hasNext" => {
            require_no_args("SetIterator.hasNext()", args)?;
            Ok(Value::Bool(iter.has_next()))
        }
        "next" => {
            require_no_args("SetIterator.next()", args)?;
            iter.next()
        }
        "reset" => {
            require_no_args("SetIterator.reset()", args)?;
            iter.reset();
            Ok(Value::void())
        }
        "getCurrentIndex" => {
            require_no_args("SetIterator.getCurrentIndex()", args)?;
            Ok(Value::Int(iter.current_index() as i64))
        }
        "getTotalSize" => {
            require_no_args("SetIterator.getTotalSize()", args)?;
            Ok(Value::Int(iter.total_size() as i64))
        }
        _ => Err(Flow::eval(format!("Unknown method '{name}' on SetIterator type"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elements_are_ordered_by_string_form() {
        let set = SetInstance::new("Int");
        set.add(Value::Int(10));
        set.add(Value::Int(2));
        set.add(Value::Int(1));
        let rendered: Vec<String> = set.values().iter().map(value_to_string).collect();
        // Textual order: "1" < "10" < "2".
        assert_eq!(rendered, ["1", "10", "2"]);
    }

    #[test]
    fn duplicate_add_is_ignored() {
        let set = SetInstance::new("Text");
        set.add(Value::text("a"));
        set.add(Value::text("a"));
        assert_eq!(set.size(), 1);
    }

    #[test]
    fn remove_absent_is_noop() {
        let set = SetInstance::new("Text");
        set.add(Value::text("a"));
        set.remove(&Value::text("b"));
        assert_eq!(set.size(), 1);
    }
}
