use std::{cell::RefCell, fmt, rc::Rc};

use ahash::AHashMap;

use crate::{
    exception::{EvalResult, Flow},
    io::{PrintWriter, StdPrint},
    object::ObjectInstance,
    value::Value,
};

/// Call depth cap. Exceeding it raises an `Evaluation` error instead of
/// overflowing the host stack.
pub const MAX_CALL_DEPTH: usize = 1024;

/// One stack frame: pushed on every method entry, popped on every exit
/// path, and snapshotted into errors for traces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub method_name: String,
    pub object_name: String,
    pub location: SourceLocation,
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} ({}:{})",
            self.object_name, self.method_name, self.location.line, self.location.column
        )
    }
}

/// Line/column of a token or node in the source file, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
}

impl SourceLocation {
    #[must_use]
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

#[derive(Debug, Clone)]
struct Binding {
    value: Value,
    constant: bool,
}

/// The scoped evaluation context: a stack of lexical scopes, the `this`
/// stack for nested method activations, and the stack-frame list used to
/// build traces.
///
/// Lookup walks scopes innermost to outermost. Every block-introducing
/// construct pairs `push_scope`/`pop_scope`; the evaluators guarantee the
/// pairing on all exit paths, which the scope-balance tests assert.
pub struct Context {
    scopes: Vec<AHashMap<String, Binding>>,
    this_stack: Vec<Rc<ObjectInstance>>,
    frames: Vec<StackFrame>,
    writer: Rc<RefCell<dyn PrintWriter>>,
    ffi_enabled: bool,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    #[must_use]
    pub fn new() -> Self {
        Self {
            scopes: vec![AHashMap::new()],
            this_stack: Vec::new(),
            frames: Vec::new(),
            writer: Rc::new(RefCell::new(StdPrint)),
            ffi_enabled: false,
        }
    }

    /// Replaces the print writer, e.g. with a collecting writer in tests.
    #[must_use]
    pub fn with_writer(writer: Rc<RefCell<dyn PrintWriter>>) -> Self {
        let mut ctx = Self::new();
        ctx.writer = writer;
        ctx
    }

    pub(crate) fn writer(&self) -> Rc<RefCell<dyn PrintWriter>> {
        Rc::clone(&self.writer)
    }

    pub fn set_ffi_enabled(&mut self, enabled: bool) {
        self.ffi_enabled = enabled;
    }

    #[must_use]
    pub fn ffi_enabled(&self) -> bool {
        self.ffi_enabled
    }

    // --- scopes ---

    pub fn push_scope(&mut self) {
        self.scopes.push(AHashMap::new());
    }

    /// Pops the innermost scope. The outermost (global) scope is never
    /// popped; an unbalanced pop is an interpreter bug.
    pub fn pop_scope(&mut self) {
        debug_assert!(self.scopes.len() > 1, "scope stack underflow");
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    #[must_use]
    pub fn scope_depth(&self) -> usize {
        self.scopes.len()
    }

    /// Binds `name` in the innermost scope. Redefinition in the same scope
    /// overwrites.
    pub fn define(&mut self, name: impl Into<String>, value: Value) {
        self.scopes
            .last_mut()
            .expect("scope stack is never empty")
            .insert(name.into(), Binding { value, constant: false });
    }

    /// Binds `name` in the innermost scope, marked non-reassignable.
    pub fn define_const(&mut self, name: impl Into<String>, value: Value) {
        self.scopes
            .last_mut()
            .expect("scope stack is never empty")
            .insert(name.into(), Binding { value, constant: true });
    }

    /// Finds the defining scope and overwrites the binding. Fails with
    /// `UnresolvedReference` if absent and `Evaluation` if constant.
    pub fn reassign(&mut self, name: &str, value: Value) -> EvalResult<()> {
        for scope in self.scopes.iter_mut().rev() {
            if let Some(binding) = scope.get_mut(name) {
                if binding.constant {
                    return Err(Flow::eval(format!("Cannot reassign constant '{name}'")));
                }
                binding.value = value;
                return Ok(());
            }
        }
        Err(Flow::raise(crate::exception::RunError::new(
            crate::exception::ErrorKind::UnresolvedReference,
            format!("Undefined variable '{name}'"),
        )))
    }

    /// Searches the scope chain innermost to outermost.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        for scope in self.scopes.iter().rev() {
            if let Some(binding) = scope.get(name) {
                return Some(binding.value.clone());
            }
        }
        None
    }

    #[must_use]
    pub fn has_variable(&self, name: &str) -> bool {
        self.scopes.iter().rev().any(|s| s.contains_key(name))
    }

    /// Defines a binding in the outermost (global) scope regardless of the
    /// current nesting. Used by the bootstrap for host objects and
    /// `__program_args__`.
    pub fn define_global_const(&mut self, name: impl Into<String>, value: Value) {
        self.scopes
            .first_mut()
            .expect("scope stack is never empty")
            .insert(name.into(), Binding { value, constant: true });
    }

    // --- this ---

    pub fn push_this(&mut self, obj: Rc<ObjectInstance>) {
        self.this_stack.push(obj);
    }

    pub fn pop_this(&mut self) {
        self.this_stack.pop();
    }

    #[must_use]
    pub fn this_object(&self) -> Option<&Rc<ObjectInstance>> {
        self.this_stack.last()
    }

    // --- stack frames ---

    /// Pushes a stack frame, enforcing the call-depth cap.
    pub fn push_frame(&mut self, frame: StackFrame) -> EvalResult<()> {
        if self.frames.len() >= MAX_CALL_DEPTH {
            return Err(Flow::eval(format!(
                "Maximum call depth ({MAX_CALL_DEPTH}) exceeded in {}.{}",
                frame.object_name, frame.method_name
            )));
        }
        self.frames.push(frame);
        Ok(())
    }

    pub fn pop_frame(&mut self) {
        self.frames.pop();
    }

    #[must_use]
    pub fn frame_depth(&self) -> usize {
        self.frames.len()
    }

    /// Snapshot of the frame stack, innermost first, for error traces.
    #[must_use]
    pub fn trace_snapshot(&self) -> Vec<StackFrame> {
        self.frames.iter().rev().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_walks_scope_chain() {
        let mut ctx = Context::new();
        ctx.define("x", Value::Int(1));
        ctx.push_scope();
        ctx.define("y", Value::Int(2));
        assert!(matches!(ctx.lookup("x"), Some(Value::Int(1))));
        assert!(matches!(ctx.lookup("y"), Some(Value::Int(2))));
        ctx.pop_scope();
        assert!(ctx.lookup("y").is_none());
    }

    #[test]
    fn inner_scope_shadows_outer() {
        let mut ctx = Context::new();
        ctx.define("x", Value::Int(1));
        ctx.push_scope();
        ctx.define("x", Value::Int(2));
        assert!(matches!(ctx.lookup("x"), Some(Value::Int(2))));
        ctx.pop_scope();
        assert!(matches!(ctx.lookup("x"), Some(Value::Int(1))));
    }

    #[test]
    fn reassign_finds_defining_scope() {
        let mut ctx = Context::new();
        ctx.define("x", Value::Int(1));
        ctx.push_scope();
        ctx.reassign("x", Value::Int(5)).unwrap();
        ctx.pop_scope();
        assert!(matches!(ctx.lookup("x"), Some(Value::Int(5))));
    }

    #[test]
    fn reassigning_a_constant_fails() {
        let mut ctx = Context::new();
        ctx.define_const("PI", Value::Double(3.14));
        let err = ctx.reassign("PI", Value::Double(3.0)).unwrap_err();
        let err = err.as_error().unwrap();
        assert_eq!(err.kind(), crate::exception::ErrorKind::Evaluation);
    }

    #[test]
    fn reassigning_undefined_is_unresolved() {
        let mut ctx = Context::new();
        let err = ctx.reassign("ghost", Value::Int(0)).unwrap_err();
        assert_eq!(
            err.as_error().unwrap().kind(),
            crate::exception::ErrorKind::UnresolvedReference
        );
    }
}
