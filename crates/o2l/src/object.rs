use std::{cell::RefCell, fmt, rc::Rc};

use indexmap::IndexMap;

use crate::{
    ast::MethodDecl,
    context::Context,
    eval,
    exception::{EvalResult, Flow},
    value::Value,
};

/// A host-implemented method: takes the evaluated arguments and the
/// context, returns a value or a raised flow.
pub type NativeFn = Rc<dyn Fn(&[Value], &mut Context) -> EvalResult<Value>>;

/// A method body: either user-declared AST or a native closure.
#[derive(Clone)]
pub enum Callable {
    User(Rc<MethodDecl>),
    Native(NativeFn),
}

#[derive(Clone)]
pub struct MethodEntry {
    pub callable: Callable,
    /// Callable from outside the object (`@external` in source; host
    /// objects mark their public surface external).
    pub external: bool,
}

/// A user-defined or host object: a named method table plus a property
/// map. Instances are shared by identity; properties are only reachable
/// through the object's own methods.
pub struct ObjectInstance {
    name: String,
    methods: RefCell<IndexMap<String, MethodEntry>>,
    properties: RefCell<IndexMap<String, Value>>,
}

impl fmt::Debug for ObjectInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectInstance")
            .field("name", &self.name)
            .field("methods", &self.methods.borrow().keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl ObjectInstance {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: RefCell::new(IndexMap::new()),
            properties: RefCell::new(IndexMap::new()),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_method(&self, name: impl Into<String>, entry: MethodEntry) {
        self.methods.borrow_mut().insert(name.into(), entry);
    }

    pub fn add_user_method(&self, decl: Rc<MethodDecl>) {
        let external = decl.external;
        self.add_method(
            decl.name.clone(),
            MethodEntry { callable: Callable::User(decl), external },
        );
    }

    /// Registers a native method. Host objects pass `external: true` for
    /// their public surface.
    pub fn add_native(
        &self,
        name: &str,
        external: bool,
        f: impl Fn(&[Value], &mut Context) -> EvalResult<Value> + 'static,
    ) {
        self.add_method(
            name,
            MethodEntry { callable: Callable::Native(Rc::new(f)), external },
        );
    }

    #[must_use]
    pub fn has_method(&self, name: &str) -> bool {
        self.methods.borrow().contains_key(name)
    }

    fn method_entry(&self, name: &str) -> Option<MethodEntry> {
        self.methods.borrow().get(name).cloned()
    }

    /// A fresh instance sharing this object's method declarations but with
    /// its own empty property map. Used by the `new` expression.
    #[must_use]
    pub fn instantiate(&self) -> Self {
        let clone = Self::new(self.name.clone());
        *clone.methods.borrow_mut() = self.methods.borrow().clone();
        clone
    }

    // --- properties (internal surface only) ---

    #[must_use]
    pub fn get_property(&self, name: &str) -> Option<Value> {
        self.properties.borrow().get(name).cloned()
    }

    pub fn set_property(&self, name: impl Into<String>, value: Value) {
        self.properties.borrow_mut().insert(name.into(), value);
    }

    #[must_use]
    pub fn property_names(&self) -> Vec<String> {
        self.properties.borrow().keys().cloned().collect()
    }

    /// Calls a method on `this` object.
    ///
    /// `external_call` is true when the receiver is not the context's
    /// current `this`; protected methods then raise `AccessViolation`.
    /// User methods run in a fresh scope with `this` bound to the receiver
    /// and parameters bound by position; both the scope and the `this`
    /// binding are released on every exit path.
    pub fn call_method(
        self: &Rc<Self>,
        name: &str,
        args: &[Value],
        ctx: &mut Context,
        external_call: bool,
    ) -> EvalResult<Value> {
        let Some(entry) = self.method_entry(name) else {
            return Err(Flow::eval_at(
                format!("Unknown method '{name}' on {} type", self.name),
                ctx,
            ));
        };

        if external_call && !entry.external {
            return Err(Flow::access_violation(
                format!(
                    "Cannot call protected method '{name}' on object '{}' from external context",
                    self.name
                ),
                ctx,
            ));
        }

        match entry.callable {
            Callable::Native(f) => f(args, ctx),
            Callable::User(decl) => self.call_user_method(&decl, args, ctx),
        }
    }

    fn call_user_method(
        self: &Rc<Self>,
        decl: &MethodDecl,
        args: &[Value],
        ctx: &mut Context,
    ) -> EvalResult<Value> {
        if args.len() != decl.params.len() {
            return Err(Flow::eval_at(
                format!(
                    "Method '{}' of object '{}' expects {} arguments, got {}",
                    decl.name,
                    self.name,
                    decl.params.len(),
                    args.len()
                ),
                ctx,
            ));
        }

        ctx.push_scope();
        ctx.push_this(Rc::clone(self));
        for (param, arg) in decl.params.iter().zip(args) {
            ctx.define(param.name.clone(), arg.clone());
        }

        let result = eval::eval_stmts(&decl.body, ctx);

        ctx.pop_this();
        ctx.pop_scope();

        match result {
            Ok(value) => Ok(value),
            Err(Flow::Return(value)) => Ok(value),
            Err(raise) => Err(raise),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instantiate_shares_methods_not_properties() {
        let proto = ObjectInstance::new("Greeter");
        proto.add_native("hello", true, |_, _| Ok(Value::text("hi")));
        proto.set_property("stale", Value::Int(9));

        let fresh = proto.instantiate();
        assert!(fresh.has_method("hello"));
        assert!(fresh.get_property("stale").is_none());
    }

    #[test]
    fn protected_method_rejects_external_calls() {
        let obj = Rc::new(ObjectInstance::new("Vault"));
        obj.add_native("open", false, |_, _| Ok(Value::void()));
        let mut ctx = Context::new();

        let err = obj.call_method("open", &[], &mut ctx, true).unwrap_err();
        assert_eq!(
            err.as_error().unwrap().kind(),
            crate::exception::ErrorKind::AccessViolation
        );
        assert!(obj.call_method("open", &[], &mut ctx, false).is_ok());
    }

    #[test]
    fn unknown_method_message_is_stable() {
        let obj = Rc::new(ObjectInstance::new("Widget"));
        let mut ctx = Context::new();
        let err = obj.call_method("spin", &[], &mut ctx, true).unwrap_err();
        assert_eq!(
            err.as_error().unwrap().message(),
            "Unknown method 'spin' on Widget type"
        );
    }
}
