//! A tree-walking interpreter for the O²L object-oriented scripting
//! language: source text → tokens → AST → direct evaluation against the
//! runtime value universe.
//!
//! The crate exposes a small embedding surface: [`Runner`] parses and
//! runs a whole `.obq` program, [`Session`] evaluates statement
//! sequences incrementally, and [`PrintWriter`] redirects `io.print`
//! output.

pub mod ast;
mod context;
mod dispatch;
mod eval;
mod exception;
mod io;
mod lexer;
mod modules;
mod object;
mod parser;
mod run;
mod types;
mod value;

pub use crate::{
    ast::Program,
    context::{Context, SourceLocation, StackFrame, MAX_CALL_DEPTH},
    exception::{ErrorKind, EvalResult, Flow, RunError},
    io::{CollectPrint, PrintWriter, StdPrint},
    object::{Callable, MethodEntry, NativeFn, ObjectInstance},
    parser::{parse, parse_statements},
    run::{LaunchError, Runner, Session},
    types::{
        CArrayInstance, CBufferInstance, CCallbackInstance, CStructInstance, EnumInstance,
        ErrorInstance, FfiHandle, FfiType, ListInstance, ListIterator, MapEntry, MapInstance,
        MapIterator, MethodSignature, ProtocolInstance, PtrInstance, RecordInstance, RecordType,
        RepeatIterator, ResultInstance, SetInstance, SetIterator,
    },
    value::{by_string_form, type_name, value_to_string, values_equal, Value},
};
