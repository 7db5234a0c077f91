use std::{cell::Cell, rc::Rc};

use crate::{
    exception::{EvalResult, Flow},
    types::list::require_no_args,
    value::Value,
};

/// Counting iterator produced by `utils.repeat(n)`: yields `0..n`.
#[derive(Debug)]
pub struct RepeatIterator {
    total_count: i64,
    current_count: Cell<i64>,
}

impl RepeatIterator {
    /// Fails for a negative count.
    pub fn new(count: i64) -> EvalResult<Self> {
        if count < 0 {
            return Err(Flow::eval(format!(
                "RepeatIterator count cannot be negative: {count}"
            )));
        }
        Ok(Self {
            total_count: count,
            current_count: Cell::new(0),
        })
    }

    #[must_use]
    pub fn has_next(&self) -> bool {
        self.current_count.get() < self.total_count
    }

    /// Yields the current 0-based counter and advances.
    pub fn next(&self) -> EvalResult<Value> {
        if !self.has_next() {
            return Err(Flow::eval("RepeatIterator.next() called when hasNext() is false"));
        }
        let current = self.current_count.get();
        self.current_count.set(current + 1);
        Ok(Value::Int(current))
    }

    pub fn reset(&self) {
        self.current_count.set(0);
    }

    #[must_use]
    pub fn current_count(&self) -> i64 {
        self.current_count.get()
    }

    #[must_use]
    pub fn total_count(&self) -> i64 {
        self.total_count
    }

    #[must_use]
    pub fn render(&self) -> String {
        format!(
            "RepeatIterator(count={}/{}, hasNext={})",
            self.current_count.get(),
            self.total_count,
            self.has_next()
        )
    }
}

pub(crate) fn call_repeat_iterator_method(
    iter: &Rc<RepeatIterator>,
    name: &str,
    args: &[Value],
) -> EvalResult<Value> {
    match name {
        "hasNext" => {
            require_no_args("RepeatIterator.hasNext()", args)?;
            Ok(Value::Bool(iter.has_next()))
        }
        "next" => {
            require_no_args("RepeatIterator.next()", args)?;
            iter.next()
        }
        "reset" => {
            require_no_args("RepeatIterator.reset()", args)?;
            iter.reset();
            Ok(Value::void())
        }
        "getCurrentCount" => {
            require_no_args("RepeatIterator.getCurrentCount()", args)?;
            Ok(Value::Int(iter.current_count()))
        }
        "getTotalCount" => {
            require_no_args("RepeatIterator.getTotalCount()", args)?;
            Ok(Value::Int(iter.total_count()))
        }
        _ => Err(Flow::eval(format!("Unknown method '{name}' on RepeatIterator type"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yields_zero_to_n_then_fails() {
        let iter = RepeatIterator::new(3).unwrap();
        let mut seen = Vec::new();
        while iter.has_next() {
            seen.push(iter.next().unwrap().as_int().unwrap());
        }
        assert_eq!(seen, [0, 1, 2]);
        assert!(iter.next().is_err());
        iter.reset();
        assert_eq!(iter.next().unwrap().as_int().unwrap(), 0);
    }

    #[test]
    fn negative_count_fails() {
        assert!(RepeatIterator::new(-1).is_err());
    }
}
