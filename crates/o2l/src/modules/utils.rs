use std::rc::Rc;

use crate::{
    exception::Flow,
    modules::{int_arg, require_arity},
    object::ObjectInstance,
    types::RepeatIterator,
    value::Value,
};

/// The `utils` host object: `repeat(n)` → RepeatIterator.
pub(crate) fn create_utils_object() -> Rc<ObjectInstance> {
    let utils = Rc::new(ObjectInstance::new("utils"));

    utils.add_native("repeat", true, |args, _ctx| {
        require_arity("repeat()", args, 1)?;
        let count = int_arg("repeat()", args, 0)?;
        if count < 0 {
            return Err(Flow::eval(format!("repeat() count cannot be negative: {count}")));
        }
        Ok(Value::RepeatIter(Rc::new(RepeatIterator::new(count)?)))
    });

    utils
}
