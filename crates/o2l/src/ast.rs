//! AST node types produced by the parser and consumed by the evaluators.
//!
//! Nodes carry the source location of the token that introduced them so
//! stack frames and error messages can point back into the `.obq` file.

use std::rc::Rc;

use crate::context::SourceLocation;

/// A parsed program: imports followed by top-level declarations.
#[derive(Debug)]
pub struct Program {
    pub imports: Vec<ImportDecl>,
    pub declarations: Vec<Decl>,
}

/// `import system.io` / `import json`: a dotted module path. The final
/// segment becomes the bound name.
#[derive(Debug)]
pub struct ImportDecl {
    pub path: Vec<String>,
    pub location: SourceLocation,
}

#[derive(Debug)]
pub enum Decl {
    Object(ObjectDecl),
    Enum(EnumDecl),
    Record(RecordDecl),
    Protocol(ProtocolDecl),
}

#[derive(Debug)]
pub struct ObjectDecl {
    pub name: String,
    pub properties: Vec<PropertyDecl>,
    /// Shared so instantiated objects reference the declarations without
    /// cloning method bodies.
    pub methods: Vec<Rc<MethodDecl>>,
    pub location: SourceLocation,
}

#[derive(Debug)]
pub struct PropertyDecl {
    pub name: String,
    pub type_name: String,
}

#[derive(Debug)]
pub struct MethodDecl {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: String,
    pub body: Vec<Stmt>,
    /// Set by the `@external` annotation; `constructor` is implicitly
    /// callable through `new` regardless.
    pub external: bool,
    pub location: SourceLocation,
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub type_name: String,
}

#[derive(Debug)]
pub struct EnumDecl {
    pub name: String,
    /// Member name plus optional explicit value; unset members number from
    /// zero or the previous value plus one.
    pub members: Vec<(String, Option<i64>)>,
    pub location: SourceLocation,
}

#[derive(Debug)]
pub struct RecordDecl {
    pub name: String,
    pub fields: Vec<(String, String)>,
    pub location: SourceLocation,
}

#[derive(Debug)]
pub struct ProtocolDecl {
    pub name: String,
    pub methods: Vec<ProtocolMethod>,
    pub location: SourceLocation,
}

#[derive(Debug)]
pub struct ProtocolMethod {
    pub name: String,
    pub param_types: Vec<String>,
    pub return_type: String,
}

#[derive(Debug)]
pub enum Stmt {
    /// `name: Type = expr`, a declaration with a type check.
    VarDecl {
        name: String,
        type_name: String,
        init: Expr,
        constant: bool,
        location: SourceLocation,
    },
    /// `name = expr`, reassignment through the scope chain.
    Assign {
        name: String,
        value: Expr,
        location: SourceLocation,
    },
    /// `this.prop = expr`, a property write on the current receiver.
    PropertyAssign {
        property: String,
        value: Expr,
        location: SourceLocation,
    },
    /// `expr.prop = expr` where the target is not `this`. Parses, but
    /// always raises `AccessViolation` when evaluated.
    ExternalPropertyAssign {
        target: Expr,
        property: String,
        value: Expr,
        location: SourceLocation,
    },
    If {
        condition: Expr,
        then_block: Vec<Stmt>,
        else_block: Option<Vec<Stmt>>,
        location: SourceLocation,
    },
    While {
        condition: Expr,
        body: Vec<Stmt>,
        location: SourceLocation,
    },
    Return {
        value: Option<Expr>,
        location: SourceLocation,
    },
    Throw {
        value: Expr,
        location: SourceLocation,
    },
    TryCatchFinally {
        try_block: Vec<Stmt>,
        catch_variable: String,
        catch_block: Option<Vec<Stmt>>,
        finally_block: Option<Vec<Stmt>>,
        location: SourceLocation,
    },
    Expr(Expr),
}

#[derive(Debug)]
pub enum Expr {
    IntLit(i64),
    LongLit(i128),
    FloatLit(f32),
    DoubleLit(f64),
    BoolLit(bool),
    CharLit(u8),
    TextLit(String),
    ListLit(Vec<Expr>),
    MapLit(Vec<(Expr, Expr)>),
    SetLit(Vec<Expr>),
    Identifier {
        name: String,
        location: SourceLocation,
    },
    This {
        location: SourceLocation,
    },
    /// `target.name` with no call parentheses: property read, enum member,
    /// or record field.
    PropertyAccess {
        target: Box<Expr>,
        name: String,
        location: SourceLocation,
    },
    /// `target.name(args…)`, routed through the dispatcher.
    MethodCall {
        target: Box<Expr>,
        method: String,
        args: Vec<Expr>,
        location: SourceLocation,
    },
    /// `new Type(args…)`.
    New {
        type_name: String,
        args: Vec<Expr>,
        location: SourceLocation,
    },
    /// `Point(x: 1, y: 2)`, record construction with named fields.
    RecordCall {
        type_name: String,
        fields: Vec<(String, Expr)>,
        location: SourceLocation,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        location: SourceLocation,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        location: SourceLocation,
    },
}

impl Expr {
    /// Best-effort location for error reporting.
    #[must_use]
    pub fn location(&self) -> SourceLocation {
        match self {
            Self::Identifier { location, .. }
            | Self::This { location }
            | Self::PropertyAccess { location, .. }
            | Self::MethodCall { location, .. }
            | Self::New { location, .. }
            | Self::RecordCall { location, .. }
            | Self::Unary { location, .. }
            | Self::Binary { location, .. } => *location,
            _ => SourceLocation::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}
