use std::{
    io::{self, BufRead as _, Write as _},
    rc::Rc,
};

use crate::{
    exception::Flow,
    io::format_directives,
    object::ObjectInstance,
    value::Value,
};

/// The `io` host object: `print(fmt, …)` and `input(prompt?)`.
pub(crate) fn create_io_object() -> Rc<ObjectInstance> {
    let io_object = Rc::new(ObjectInstance::new("io"));

    io_object.add_native("print", true, |args, ctx| {
        let writer = ctx.writer();
        let Some(first) = args.first() else {
            writer.borrow_mut().write_line("");
            return Ok(Value::text(""));
        };
        let Value::Text(format) = first else {
            return Err(Flow::eval("print() first argument must be a Text (format string)"));
        };
        let formatted = if args.len() == 1 {
            format.to_string()
        } else {
            format_directives(format, &args[1..])
        };
        writer.borrow_mut().write_line(&formatted);
        Ok(Value::text(formatted))
    });

    io_object.add_native("input", true, |args, _ctx| {
        if let Some(prompt) = args.first() {
            let Value::Text(prompt) = prompt else {
                return Err(Flow::eval("input() argument must be a Text (prompt)"));
            };
            print!("{prompt}");
            let _ = io::stdout().flush();
        }
        let mut line = String::new();
        io::stdin()
            .lock()
            .read_line(&mut line)
            .map_err(|e| Flow::system(format!("Failed to read stdin: {e}")))?;
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(Value::text(line))
    });

    io_object
}
