use std::{cell::Cell, cell::RefCell, rc::Rc};

use crate::{
    exception::{EvalResult, Flow},
    value::{render_joined, values_equal, Value},
};

/// A mutable, reference-shared list with a declared element type.
///
/// The declared type is informational except at variable-declaration
/// checks; elements are stored as generic [`Value`]s.
#[derive(Debug)]
pub struct ListInstance {
    elements: RefCell<Vec<Value>>,
    element_type_name: String,
}

impl ListInstance {
    #[must_use]
    pub fn new(element_type: impl Into<String>) -> Self {
        Self {
            elements: RefCell::new(Vec::new()),
            element_type_name: element_type.into(),
        }
    }

    #[must_use]
    pub fn from_values(element_type: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            elements: RefCell::new(values),
            element_type_name: element_type.into(),
        }
    }

    #[must_use]
    pub fn element_type_name(&self) -> &str {
        &self.element_type_name
    }

    pub fn add(&self, element: Value) {
        self.elements.borrow_mut().push(element);
    }

    pub fn get(&self, index: usize) -> EvalResult<Value> {
        self.elements.borrow().get(index).cloned().ok_or_else(|| {
            Flow::eval(format!(
                "List index {index} out of range (size {})",
                self.size()
            ))
        })
    }

    pub fn remove(&self, index: usize) -> EvalResult<()> {
        let mut elements = self.elements.borrow_mut();
        if index >= elements.len() {
            return Err(Flow::eval(format!(
                "List index {index} out of range (size {})",
                elements.len()
            )));
        }
        elements.remove(index);
        Ok(())
    }

    pub fn reverse(&self) {
        self.elements.borrow_mut().reverse();
    }

    pub fn pop(&self) -> EvalResult<Value> {
        self.elements
            .borrow_mut()
            .pop()
            .ok_or_else(|| Flow::eval("Cannot pop from empty list"))
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.elements.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.elements.borrow_mut().clear();
    }

    /// Snapshot of the current elements, in order.
    #[must_use]
    pub fn values(&self) -> Vec<Value> {
        self.elements.borrow().clone()
    }

    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::from("[");
        render_joined(&mut out, &self.elements.borrow());
        out.push(']');
        out
    }
}

/// Cursor over a shared [`ListInstance`]. Does not snapshot; mutating the
/// list mid-iteration has unspecified behaviour.
#[derive(Debug)]
pub struct ListIterator {
    list: Rc<ListInstance>,
    cursor: Cell<usize>,
}

impl ListIterator {
    #[must_use]
    pub fn new(list: Rc<ListInstance>) -> Self {
        Self { list, cursor: Cell::new(0) }
    }

    #[must_use]
    pub fn has_next(&self) -> bool {
        self.cursor.get() < self.list.size()
    }

    pub fn next(&self) -> EvalResult<Value> {
        if !self.has_next() {
            return Err(Flow::eval("ListIterator.next() called when hasNext() is false"));
        }
        let value = self.list.get(self.cursor.get())?;
        self.cursor.set(self.cursor.get() + 1);
        Ok(value)
    }

    pub fn reset(&self) {
        self.cursor.set(0);
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.cursor.get()
    }

    #[must_use]
    pub fn render(&self) -> String {
        format!(
            "ListIterator(index={}, hasNext={})",
            self.cursor.get(),
            self.has_next()
        )
    }
}

pub(crate) fn call_list_method(
    list: &Rc<ListInstance>,
    name: &str,
    args: &[Value],
) -> EvalResult<Value> {
    match name {
        "add" => {
            let [element] = args else {
                return Err(Flow::eval("List.add() requires exactly one argument"));
            };
            list.add(element.clone());
            Ok(Value::void())
        }
        "get" => match args {
            [Value::Int(index)] => {
                let index = usize::try_from(*index)
                    .map_err(|_| Flow::eval(format!("List index {index} out of range (size {})", list.size())))?;
                list.get(index)
            }
            _ => Err(Flow::eval("List.get() requires exactly one Int argument")),
        },
        "remove" => match args {
            [Value::Int(index)] => {
                let index = usize::try_from(*index)
                    .map_err(|_| Flow::eval(format!("List index {index} out of range (size {})", list.size())))?;
                list.remove(index)?;
                Ok(Value::void())
            }
            _ => Err(Flow::eval("List.remove() requires exactly one Int argument")),
        },
        "reverse" => {
            require_no_args("List.reverse()", args)?;
            list.reverse();
            Ok(Value::void())
        }
        "pop" => {
            require_no_args("List.pop()", args)?;
            list.pop()
        }
        "size" => {
            require_no_args("List.size()", args)?;
            Ok(Value::Int(list.size() as i64))
        }
        "isEmpty" => {
            require_no_args("List.isEmpty()", args)?;
            Ok(Value::Bool(list.is_empty()))
        }
        "clear" => {
            require_no_args("List.clear()", args)?;
            list.clear();
            Ok(Value::void())
        }
        "contains" => {
            let [needle] = args else {
                return Err(Flow::eval("List.contains() requires exactly one argument"));
            };
            let found = list.values().iter().any(|e| values_equal(e, needle));
            Ok(Value::Bool(found))
        }
        "indexOf" => {
            let [needle] = args else {
                return Err(Flow::eval("List.indexOf() requires exactly one argument"));
            };
            let index = list
                .values()
                .iter()
                .position(|e| values_equal(e, needle))
                .map_or(-1, |i| i as i64);
            Ok(Value::Int(index))
        }
        "iterator" => {
            require_no_args("List.iterator()", args)?;
            Ok(Value::ListIter(Rc::new(ListIterator::new(Rc::clone(list)))))
        }
        "forEach" => {
            if args.len() != 1 {
                return Err(Flow::eval("List.forEach() requires exactly one argument (function)"));
            }
            Err(Flow::eval(
                "List.forEach() is not yet fully implemented - use iterator() for now",
            ))
        }
        _ => Err(Flow::eval(format!("Unknown method '{name}' on List type"))),
    }
}

pub(crate) fn call_list_iterator_method(
    iter: &Rc<ListIterator>,
    name: &str,
    args: &[Value],
) -> EvalResult<Value> {
    match name {
        "hasNext" => {
            require_no_args("ListIterator.hasNext()", args)?;
            Ok(Value::Bool(iter.has_next()))
        }
        "next" => {
            require_no_args("ListIterator.next()", args)?;
            iter.next()
        }
        "reset" => {
            require_no_args("ListIterator.reset()", args)?;
            iter.reset();
            Ok(Value::void())
        }
        "getCurrentIndex" | "index" => {
            require_no_args("ListIterator.getCurrentIndex()", args)?;
            Ok(Value::Int(iter.current_index() as i64))
        }
        _ => Err(Flow::eval(format!("Unknown method '{name}' on ListIterator type"))),
    }
}

/// Rejects any arguments with the stable `"<m> takes no arguments"` form.
pub(crate) fn require_no_args(what: &str, args: &[Value]) -> EvalResult<()> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(Flow::eval(format!("{what} takes no arguments")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_get_fails() {
        let list = ListInstance::from_values("Int", vec![Value::Int(1)]);
        assert!(list.get(0).is_ok());
        assert!(list.get(1).is_err());
    }

    #[test]
    fn iterator_exhaustion() {
        let list = Rc::new(ListInstance::from_values(
            "Int",
            vec![Value::Int(10), Value::Int(20)],
        ));
        let iter = ListIterator::new(Rc::clone(&list));
        assert!(iter.has_next());
        assert!(matches!(iter.next().unwrap(), Value::Int(10)));
        assert!(matches!(iter.next().unwrap(), Value::Int(20)));
        assert!(!iter.has_next());
        assert!(iter.next().is_err());
        iter.reset();
        assert!(matches!(iter.next().unwrap(), Value::Int(10)));
    }

    #[test]
    fn index_of_uses_value_equality() {
        let list = Rc::new(ListInstance::from_values(
            "Int",
            vec![Value::Int(10), Value::Int(20), Value::Int(30)],
        ));
        let found = call_list_method(&list, "indexOf", &[Value::Int(20)]).unwrap();
        assert!(matches!(found, Value::Int(1)));
        let missing = call_list_method(&list, "indexOf", &[Value::Int(99)]).unwrap();
        assert!(matches!(missing, Value::Int(-1)));
    }
}
