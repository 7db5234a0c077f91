use std::{cell::RefCell, rc::Rc};

use log::debug;
use thiserror::Error;

use crate::{
    ast::{Decl, Program},
    context::Context,
    eval,
    exception::{ErrorKind, Flow, RunError},
    io::{CollectPrint, PrintWriter},
    modules,
    object::ObjectInstance,
    parser,
    types::{
        EnumInstance, ListInstance, MethodSignature, ProtocolInstance, RecordType,
    },
    value::Value,
};

/// Errors surfaced by the launcher before user code runs.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{0}")]
    Parse(RunError),
    #[error("no entry object: expected an Object named 'Main' with a main() method")]
    NoEntryPoint,
}

/// A parsed, runnable program. Parsing happens once; `run` can be called
/// repeatedly against fresh contexts.
pub struct Runner {
    program: Program,
    source_name: String,
    ffi_enabled: bool,
}

impl Runner {
    pub fn new(source: &str, source_name: impl Into<String>) -> Result<Self, LaunchError> {
        let program = parser::parse(source).map_err(LaunchError::Parse)?;
        Ok(Self {
            program,
            source_name: source_name.into(),
            ffi_enabled: false,
        })
    }

    #[must_use]
    pub fn with_ffi(mut self, enabled: bool) -> Self {
        self.ffi_enabled = enabled;
        self
    }

    #[must_use]
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Runs `Main.main()` with stdout printing.
    pub fn run(&self, args: Vec<String>) -> Result<Value, RunError> {
        let mut ctx = Context::new();
        ctx.set_ffi_enabled(self.ffi_enabled);
        self.run_in(&mut ctx, args)
    }

    /// Runs `Main.main()` collecting all `io.print` output; returns the
    /// result alongside the captured text.
    pub fn run_collect(&self, args: Vec<String>) -> (Result<Value, RunError>, String) {
        let collect = Rc::new(RefCell::new(CollectPrint::new()));
        let mut ctx = Context::with_writer(Rc::clone(&collect) as Rc<RefCell<dyn PrintWriter>>);
        ctx.set_ffi_enabled(self.ffi_enabled);
        let result = self.run_in(&mut ctx, args);
        let output = collect.borrow().output().to_owned();
        (result, output)
    }

    fn run_in(&self, ctx: &mut Context, args: Vec<String>) -> Result<Value, RunError> {
        bootstrap(ctx, args);

        for import in &self.program.imports {
            modules::import_module(import, ctx).map_err(flow_to_error)?;
        }
        declare(&self.program, ctx).map_err(flow_to_error)?;

        let Some(Value::Object(main)) = ctx.lookup("Main") else {
            return Err(RunError::new(
                ErrorKind::UnresolvedReference,
                "No 'Main' object found in program",
            ));
        };
        if !main.has_method("main") {
            return Err(RunError::new(
                ErrorKind::UnresolvedReference,
                "Object 'Main' has no main() method",
            ));
        }

        debug!("invoking Main.main() from {}", self.source_name);
        // The launcher is privileged: it may invoke main() whether or not
        // it is marked @external.
        main.call_method("main", &[], ctx, false)
            .map_err(flow_to_error)
    }
}

fn flow_to_error(flow: Flow) -> RunError {
    match flow {
        Flow::Raise(err) => *err,
        Flow::Return(_) => RunError::new(ErrorKind::Evaluation, "'return' outside of a method"),
    }
}

/// Defines the stdlib host objects and `__program_args__`.
fn bootstrap(ctx: &mut Context, args: Vec<String>) {
    modules::bootstrap_system(ctx);
    let program_args: Vec<Value> = args.into_iter().map(Value::from).collect();
    ctx.define_global_const(
        "__program_args__",
        Value::List(Rc::new(ListInstance::from_values("Text", program_args))),
    );
}

/// Evaluates the top-level declarations: each binds a constant in the
/// global scope.
fn declare(program: &Program, ctx: &mut Context) -> Result<(), Flow> {
    for decl in &program.declarations {
        match decl {
            Decl::Object(object_decl) => {
                let prototype = ObjectInstance::new(object_decl.name.clone());
                for method in &object_decl.methods {
                    prototype.add_user_method(Rc::clone(method));
                }
                ctx.define_global_const(object_decl.name.clone(), Value::Object(Rc::new(prototype)));
            }
            Decl::Enum(enum_decl) => {
                let mut next = 0;
                let mut members = Vec::with_capacity(enum_decl.members.len());
                for (name, explicit) in &enum_decl.members {
                    let value = explicit.unwrap_or(next);
                    next = value + 1;
                    members.push((name.clone(), value));
                }
                ctx.define_global_const(
                    enum_decl.name.clone(),
                    Value::Enum(Rc::new(EnumInstance::new(enum_decl.name.clone(), members))),
                );
            }
            Decl::Record(record_decl) => {
                ctx.define_global_const(
                    record_decl.name.clone(),
                    Value::RecordType(Rc::new(RecordType::new(
                        record_decl.name.clone(),
                        record_decl.fields.clone(),
                    ))),
                );
            }
            Decl::Protocol(protocol_decl) => {
                let signatures = protocol_decl
                    .methods
                    .iter()
                    .map(|m| MethodSignature {
                        name: m.name.clone(),
                        param_types: m.param_types.clone(),
                        return_type: m.return_type.clone(),
                    })
                    .collect();
                ctx.define_global_const(
                    protocol_decl.name.clone(),
                    Value::Protocol(Rc::new(ProtocolInstance::new(
                        protocol_decl.name.clone(),
                        signatures,
                    ))),
                );
            }
        }
    }
    Ok(())
}

/// An interactive evaluation session over a bootstrapped context.
///
/// Statements evaluate in the global scope, so definitions persist
/// between `eval` calls. Used by embedders and the test suite.
pub struct Session {
    ctx: Context,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        let mut ctx = Context::new();
        bootstrap(&mut ctx, Vec::new());
        Self { ctx }
    }

    /// A session whose `io.print` output goes to the given writer.
    #[must_use]
    pub fn with_writer(writer: Rc<RefCell<dyn PrintWriter>>) -> Self {
        let mut ctx = Context::with_writer(writer);
        bootstrap(&mut ctx, Vec::new());
        Self { ctx }
    }

    /// Parses and evaluates a statement sequence, yielding the last
    /// statement's value. Top-level declarations are accepted too, so a
    /// session can define objects and then exercise them.
    pub fn eval(&mut self, source: &str) -> Result<Value, RunError> {
        if let Ok(program) = parser::parse(source) {
            if !program.declarations.is_empty() || !program.imports.is_empty() {
                for import in &program.imports {
                    modules::import_module(import, &mut self.ctx).map_err(flow_to_error)?;
                }
                declare(&program, &mut self.ctx).map_err(flow_to_error)?;
                return Ok(Value::void());
            }
        }
        let stmts = parser::parse_statements(source)?;
        match eval::eval_stmts(&stmts, &mut self.ctx) {
            Ok(value) | Err(Flow::Return(value)) => Ok(value),
            Err(Flow::Raise(err)) => Err(*err),
        }
    }

    /// Current scope depth; the scope-balance property tests assert this
    /// is invariant across evaluation.
    #[must_use]
    pub fn scope_depth(&self) -> usize {
        self.ctx.scope_depth()
    }

    #[must_use]
    pub fn frame_depth(&self) -> usize {
        self.ctx.frame_depth()
    }

    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.ctx
    }
}
