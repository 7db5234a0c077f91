use std::rc::Rc;

use crate::{
    ast::{
        BinaryOp, Decl, EnumDecl, Expr, ImportDecl, MethodDecl, ObjectDecl, Param, Program,
        PropertyDecl, ProtocolDecl, ProtocolMethod, RecordDecl, Stmt, UnaryOp,
    },
    context::SourceLocation,
    exception::{ErrorKind, RunError},
    lexer::{tokenize, Token, TokenKind},
};

/// Parses `.obq` source into a [`Program`].
pub fn parse(source: &str) -> Result<Program, RunError> {
    let tokens = tokenize(source)?;
    Parser { tokens, pos: 0 }.program()
}

/// Parses a statement sequence, for embedders and tests that evaluate
/// snippets outside an object declaration.
pub fn parse_statements(source: &str) -> Result<Vec<Stmt>, RunError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    let mut stmts = Vec::new();
    while !parser.check(&TokenKind::Eof) {
        stmts.push(parser.statement()?);
    }
    Ok(stmts)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn peek_at(&self, offset: usize) -> &TokenKind {
        &self.tokens[(self.pos + offset).min(self.tokens.len() - 1)].kind
    }

    fn location(&self) -> SourceLocation {
        self.peek().location
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<Token, RunError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error(format!("Expected {what}")))
        }
    }

    fn error(&self, message: impl Into<String>) -> RunError {
        let loc = self.location();
        RunError::new(
            ErrorKind::Syntax,
            format!("{} at {}:{}", message.into(), loc.line, loc.column),
        )
    }

    fn identifier(&mut self, what: &str) -> Result<String, RunError> {
        match self.peek_kind().clone() {
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.error(format!("Expected {what}"))),
        }
    }

    // --- top level ---

    fn program(&mut self) -> Result<Program, RunError> {
        let mut imports = Vec::new();
        let mut declarations = Vec::new();
        loop {
            match self.peek_kind() {
                TokenKind::Eof => break,
                TokenKind::KwImport => imports.push(self.import_decl()?),
                TokenKind::KwObject => declarations.push(Decl::Object(self.object_decl()?)),
                TokenKind::KwEnum => declarations.push(Decl::Enum(self.enum_decl()?)),
                TokenKind::KwRecord => declarations.push(Decl::Record(self.record_decl()?)),
                TokenKind::KwProtocol => declarations.push(Decl::Protocol(self.protocol_decl()?)),
                _ => return Err(self.error("Expected a top-level declaration")),
            }
        }
        Ok(Program { imports, declarations })
    }

    fn import_decl(&mut self) -> Result<ImportDecl, RunError> {
        let location = self.location();
        self.advance(); // import
        let mut path = vec![self.identifier("module name after 'import'")?];
        while self.eat(&TokenKind::Dot) {
            path.push(self.identifier("module path segment")?);
        }
        Ok(ImportDecl { path, location })
    }

    fn object_decl(&mut self) -> Result<ObjectDecl, RunError> {
        let location = self.location();
        self.advance(); // Object
        let name = self.identifier("object name")?;
        self.expect(&TokenKind::LBrace, "'{' after object name")?;

        let mut properties = Vec::new();
        let mut methods = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            match self.peek_kind() {
                TokenKind::KwProperty => {
                    self.advance();
                    let prop_name = self.identifier("property name")?;
                    self.expect(&TokenKind::Colon, "':' after property name")?;
                    let type_name = self.type_name()?;
                    properties.push(PropertyDecl { name: prop_name, type_name });
                }
                TokenKind::KwConstructor => {
                    let ctor_location = self.location();
                    self.advance();
                    let params = self.param_list()?;
                    let body = self.block()?;
                    methods.push(Rc::new(MethodDecl {
                        name: "constructor".to_owned(),
                        params,
                        return_type: name.clone(),
                        body,
                        external: false,
                        location: ctor_location,
                    }));
                }
                TokenKind::At | TokenKind::KwMethod => {
                    methods.push(Rc::new(self.method_decl()?));
                }
                TokenKind::Eof => return Err(self.error("Unterminated object declaration")),
                _ => return Err(self.error("Expected property, constructor, or method")),
            }
        }
        self.advance(); // }
        Ok(ObjectDecl { name, properties, methods, location })
    }

    fn method_decl(&mut self) -> Result<MethodDecl, RunError> {
        let mut external = false;
        if self.eat(&TokenKind::At) {
            let annotation = self.identifier("annotation name after '@'")?;
            if annotation != "external" {
                return Err(self.error(format!("Unknown annotation '@{annotation}'")));
            }
            external = true;
        }
        let location = self.location();
        self.expect(&TokenKind::KwMethod, "'method'")?;
        let name = self.identifier("method name")?;
        let params = self.param_list()?;
        self.expect(&TokenKind::Colon, "':' before return type")?;
        let return_type = self.type_name()?;
        let body = self.block()?;
        Ok(MethodDecl { name, params, return_type, body, external, location })
    }

    fn param_list(&mut self) -> Result<Vec<Param>, RunError> {
        self.expect(&TokenKind::LParen, "'('")?;
        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                let name = self.identifier("parameter name")?;
                self.expect(&TokenKind::Colon, "':' after parameter name")?;
                let type_name = self.type_name()?;
                params.push(Param { name, type_name });
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen, "')'")?;
        Ok(params)
    }

    fn enum_decl(&mut self) -> Result<EnumDecl, RunError> {
        let location = self.location();
        self.advance(); // Enum
        let name = self.identifier("enum name")?;
        self.expect(&TokenKind::LBrace, "'{' after enum name")?;
        let mut members = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            let member = self.identifier("enum member name")?;
            let value = if self.eat(&TokenKind::Assign) {
                match self.advance().kind {
                    TokenKind::IntLit(v) => Some(v),
                    _ => return Err(self.error("Expected integer value for enum member")),
                }
            } else {
                None
            };
            members.push((member, value));
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RBrace, "'}' after enum members")?;
        Ok(EnumDecl { name, members, location })
    }

    fn record_decl(&mut self) -> Result<RecordDecl, RunError> {
        let location = self.location();
        self.advance(); // Record
        let name = self.identifier("record name")?;
        self.expect(&TokenKind::LBrace, "'{' after record name")?;
        let mut fields = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            let field = self.identifier("record field name")?;
            self.expect(&TokenKind::Colon, "':' after field name")?;
            let type_name = self.type_name()?;
            fields.push((field, type_name));
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RBrace, "'}' after record fields")?;
        Ok(RecordDecl { name, fields, location })
    }

    fn protocol_decl(&mut self) -> Result<ProtocolDecl, RunError> {
        let location = self.location();
        self.advance(); // Protocol
        let name = self.identifier("protocol name")?;
        self.expect(&TokenKind::LBrace, "'{' after protocol name")?;
        let mut methods = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            self.expect(&TokenKind::KwMethod, "'method' in protocol body")?;
            let method_name = self.identifier("method name")?;
            self.expect(&TokenKind::LParen, "'('")?;
            let mut param_types = Vec::new();
            if !self.check(&TokenKind::RParen) {
                loop {
                    // Parameter names are optional in protocol signatures.
                    if matches!(self.peek_kind(), TokenKind::Identifier(_))
                        && self.peek_at(1) == &TokenKind::Colon
                    {
                        self.advance();
                        self.advance();
                    }
                    param_types.push(self.type_name()?);
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
            }
            self.expect(&TokenKind::RParen, "')'")?;
            self.expect(&TokenKind::Colon, "':' before return type")?;
            let return_type = self.type_name()?;
            methods.push(ProtocolMethod { name: method_name, param_types, return_type });
        }
        self.expect(&TokenKind::RBrace, "'}' after protocol body")?;
        Ok(ProtocolDecl { name, methods, location })
    }

    /// A type name, including generic forms like `List<Int>` and
    /// `Map<Text, Int>`, flattened back to its source string.
    fn type_name(&mut self) -> Result<String, RunError> {
        let mut name = self.identifier("type name")?;
        if self.eat(&TokenKind::Lt) {
            name.push('<');
            loop {
                name.push_str(&self.type_name()?);
                if self.eat(&TokenKind::Comma) {
                    name.push_str(", ");
                } else {
                    break;
                }
            }
            self.expect(&TokenKind::Gt, "'>' closing generic type")?;
            name.push('>');
        }
        Ok(name)
    }

    // --- statements ---

    fn block(&mut self) -> Result<Vec<Stmt>, RunError> {
        self.expect(&TokenKind::LBrace, "'{'")?;
        let mut stmts = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            if self.check(&TokenKind::Eof) {
                return Err(self.error("Unterminated block"));
            }
            stmts.push(self.statement()?);
        }
        self.advance(); // }
        Ok(stmts)
    }

    fn statement(&mut self) -> Result<Stmt, RunError> {
        let location = self.location();
        match self.peek_kind() {
            TokenKind::KwConst => {
                self.advance();
                let name = self.identifier("constant name")?;
                self.expect(&TokenKind::Colon, "':' after constant name")?;
                let type_name = self.type_name()?;
                self.expect(&TokenKind::Assign, "'=' in constant declaration")?;
                let init = self.expression()?;
                Ok(Stmt::VarDecl { name, type_name, init, constant: true, location })
            }
            TokenKind::KwReturn => {
                self.advance();
                // A value belongs to this return only when it starts on the
                // same source line.
                let value = if self.location().line == location.line && self.starts_expression() {
                    Some(self.expression()?)
                } else {
                    None
                };
                Ok(Stmt::Return { value, location })
            }
            TokenKind::KwThrow => {
                self.advance();
                Ok(Stmt::Throw { value: self.expression()?, location })
            }
            TokenKind::KwIf => {
                self.advance();
                self.expect(&TokenKind::LParen, "'(' after 'if'")?;
                let condition = self.expression()?;
                self.expect(&TokenKind::RParen, "')' after condition")?;
                let then_block = self.block()?;
                let else_block = if self.eat(&TokenKind::KwElse) {
                    if self.check(&TokenKind::KwIf) {
                        let nested = self.statement()?;
                        Some(vec![nested])
                    } else {
                        Some(self.block()?)
                    }
                } else {
                    None
                };
                Ok(Stmt::If { condition, then_block, else_block, location })
            }
            TokenKind::KwWhile => {
                self.advance();
                self.expect(&TokenKind::LParen, "'(' after 'while'")?;
                let condition = self.expression()?;
                self.expect(&TokenKind::RParen, "')' after condition")?;
                let body = self.block()?;
                Ok(Stmt::While { condition, body, location })
            }
            TokenKind::KwTry => {
                self.advance();
                let try_block = self.block()?;
                let mut catch_variable = String::new();
                let catch_block = if self.eat(&TokenKind::KwCatch) {
                    self.expect(&TokenKind::LParen, "'(' after 'catch'")?;
                    catch_variable = self.identifier("catch variable")?;
                    self.expect(&TokenKind::RParen, "')' after catch variable")?;
                    Some(self.block()?)
                } else {
                    None
                };
                let finally_block = if self.eat(&TokenKind::KwFinally) {
                    Some(self.block()?)
                } else {
                    None
                };
                if catch_block.is_none() && finally_block.is_none() {
                    return Err(self.error("'try' requires a catch or finally block"));
                }
                Ok(Stmt::TryCatchFinally {
                    try_block,
                    catch_variable,
                    catch_block,
                    finally_block,
                    location,
                })
            }
            TokenKind::KwThis if self.peek_at(1) == &TokenKind::Dot => {
                // Distinguish `this.p = v` from `this.m(...)` expressions.
                if let TokenKind::Identifier(_) = self.peek_at(2) {
                    if self.assign_op_at(3).is_some() {
                        self.advance(); // this
                        self.advance(); // .
                        let property = self.identifier("property name")?;
                        return self.finish_property_assign(property, location);
                    }
                }
                self.expression_statement()
            }
            TokenKind::Identifier(_) => {
                if self.peek_at(1) == &TokenKind::Colon {
                    let name = self.identifier("variable name")?;
                    self.advance(); // :
                    let type_name = self.type_name()?;
                    self.expect(&TokenKind::Assign, "'=' in variable declaration")?;
                    let init = self.expression()?;
                    return Ok(Stmt::VarDecl { name, type_name, init, constant: false, location });
                }
                if let Some(op) = self.assign_op_at(1) {
                    let name = self.identifier("variable name")?;
                    self.advance(); // the assignment operator
                    let rhs = self.expression()?;
                    let value = match op {
                        None => rhs,
                        Some(binary) => Expr::Binary {
                            op: binary,
                            lhs: Box::new(Expr::Identifier { name: name.clone(), location }),
                            rhs: Box::new(rhs),
                            location,
                        },
                    };
                    return Ok(Stmt::Assign { name, value, location });
                }
                self.expression_statement()
            }
            _ => self.expression_statement(),
        }
    }

    /// Recognises `=`, `+=`, `-=`, `*=`, `/=`, `%=` at the given lookahead
    /// offset. Outer `None` means no assignment; inner `None` is plain `=`.
    #[allow(clippy::option_option)]
    fn assign_op_at(&self, offset: usize) -> Option<Option<BinaryOp>> {
        match self.peek_at(offset) {
            TokenKind::Assign => Some(None),
            TokenKind::PlusAssign => Some(Some(BinaryOp::Add)),
            TokenKind::MinusAssign => Some(Some(BinaryOp::Sub)),
            TokenKind::StarAssign => Some(Some(BinaryOp::Mul)),
            TokenKind::SlashAssign => Some(Some(BinaryOp::Div)),
            TokenKind::PercentAssign => Some(Some(BinaryOp::Mod)),
            _ => None,
        }
    }

    fn finish_property_assign(
        &mut self,
        property: String,
        location: SourceLocation,
    ) -> Result<Stmt, RunError> {
        let op = self
            .assign_op_at(0)
            .expect("caller verified an assignment operator");
        self.advance();
        let rhs = self.expression()?;
        let value = match op {
            None => rhs,
            Some(binary) => Expr::Binary {
                op: binary,
                lhs: Box::new(Expr::PropertyAccess {
                    target: Box::new(Expr::This { location }),
                    name: property.clone(),
                    location,
                }),
                rhs: Box::new(rhs),
                location,
            },
        };
        Ok(Stmt::PropertyAssign { property, value, location })
    }

    fn expression_statement(&mut self) -> Result<Stmt, RunError> {
        let location = self.location();
        let expr = self.expression()?;
        if self.assign_op_at(0).is_some() {
            // Only property targets are assignable here; `this.p = v` was
            // already handled, so this is an external property write that
            // fails with AccessViolation at runtime.
            if let Expr::PropertyAccess { target, name, .. } = expr {
                self.advance();
                let value = self.expression()?;
                return Ok(Stmt::ExternalPropertyAssign {
                    target: *target,
                    property: name,
                    value,
                    location,
                });
            }
            return Err(self.error("Invalid assignment target"));
        }
        Ok(Stmt::Expr(expr))
    }

    fn starts_expression(&self) -> bool {
        matches!(
            self.peek_kind(),
            TokenKind::Identifier(_)
                | TokenKind::IntLit(_)
                | TokenKind::LongLit(_)
                | TokenKind::FloatLit(_)
                | TokenKind::DoubleLit(_)
                | TokenKind::TextLit(_)
                | TokenKind::CharLit(_)
                | TokenKind::KwTrue
                | TokenKind::KwFalse
                | TokenKind::KwThis
                | TokenKind::KwNew
                | TokenKind::LParen
                | TokenKind::LBracket
                | TokenKind::LBrace
                | TokenKind::Minus
                | TokenKind::Bang
        )
    }

    // --- expressions, by precedence ---

    fn expression(&mut self) -> Result<Expr, RunError> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> Result<Expr, RunError> {
        let mut lhs = self.and_expr()?;
        while self.check(&TokenKind::OrOr) {
            let location = self.location();
            self.advance();
            let rhs = self.and_expr()?;
            lhs = Expr::Binary { op: BinaryOp::Or, lhs: Box::new(lhs), rhs: Box::new(rhs), location };
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<Expr, RunError> {
        let mut lhs = self.equality_expr()?;
        while self.check(&TokenKind::AndAnd) {
            let location = self.location();
            self.advance();
            let rhs = self.equality_expr()?;
            lhs = Expr::Binary { op: BinaryOp::And, lhs: Box::new(lhs), rhs: Box::new(rhs), location };
        }
        Ok(lhs)
    }

    fn equality_expr(&mut self) -> Result<Expr, RunError> {
        let mut lhs = self.comparison_expr()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::EqEq => BinaryOp::Eq,
                TokenKind::NotEq => BinaryOp::Ne,
                _ => break,
            };
            let location = self.location();
            self.advance();
            let rhs = self.comparison_expr()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), location };
        }
        Ok(lhs)
    }

    fn comparison_expr(&mut self) -> Result<Expr, RunError> {
        let mut lhs = self.additive_expr()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::Le => BinaryOp::Le,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::Ge => BinaryOp::Ge,
                _ => break,
            };
            let location = self.location();
            self.advance();
            let rhs = self.additive_expr()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), location };
        }
        Ok(lhs)
    }

    fn additive_expr(&mut self) -> Result<Expr, RunError> {
        let mut lhs = self.multiplicative_expr()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            let location = self.location();
            self.advance();
            let rhs = self.multiplicative_expr()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), location };
        }
        Ok(lhs)
    }

    fn multiplicative_expr(&mut self) -> Result<Expr, RunError> {
        let mut lhs = self.unary_expr()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            let location = self.location();
            self.advance();
            let rhs = self.unary_expr()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), location };
        }
        Ok(lhs)
    }

    fn unary_expr(&mut self) -> Result<Expr, RunError> {
        let location = self.location();
        if self.eat(&TokenKind::Minus) {
            let operand = self.unary_expr()?;
            return Ok(Expr::Unary { op: UnaryOp::Neg, operand: Box::new(operand), location });
        }
        if self.eat(&TokenKind::Bang) {
            let operand = self.unary_expr()?;
            return Ok(Expr::Unary { op: UnaryOp::Not, operand: Box::new(operand), location });
        }
        self.postfix_expr()
    }

    fn postfix_expr(&mut self) -> Result<Expr, RunError> {
        let mut expr = self.primary_expr()?;
        while self.check(&TokenKind::Dot) {
            let location = self.location();
            self.advance();
            let name = self.identifier("member name after '.'")?;
            if self.check(&TokenKind::LParen) {
                let args = self.argument_list()?;
                expr = Expr::MethodCall { target: Box::new(expr), method: name, args, location };
            } else {
                expr = Expr::PropertyAccess { target: Box::new(expr), name, location };
            }
        }
        Ok(expr)
    }

    fn argument_list(&mut self) -> Result<Vec<Expr>, RunError> {
        self.expect(&TokenKind::LParen, "'('")?;
        let mut args = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                args.push(self.expression()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen, "')' after arguments")?;
        Ok(args)
    }

    fn primary_expr(&mut self) -> Result<Expr, RunError> {
        let location = self.location();
        match self.peek_kind().clone() {
            TokenKind::IntLit(v) => {
                self.advance();
                Ok(Expr::IntLit(v))
            }
            TokenKind::LongLit(v) => {
                self.advance();
                Ok(Expr::LongLit(v))
            }
            TokenKind::FloatLit(v) => {
                self.advance();
                Ok(Expr::FloatLit(v))
            }
            TokenKind::DoubleLit(v) => {
                self.advance();
                Ok(Expr::DoubleLit(v))
            }
            TokenKind::TextLit(s) => {
                self.advance();
                Ok(Expr::TextLit(s))
            }
            TokenKind::CharLit(c) => {
                self.advance();
                Ok(Expr::CharLit(c))
            }
            TokenKind::KwTrue => {
                self.advance();
                Ok(Expr::BoolLit(true))
            }
            TokenKind::KwFalse => {
                self.advance();
                Ok(Expr::BoolLit(false))
            }
            TokenKind::KwThis => {
                self.advance();
                Ok(Expr::This { location })
            }
            TokenKind::KwNew => {
                self.advance();
                let type_name = self.identifier("type name after 'new'")?;
                let args = self.argument_list()?;
                Ok(Expr::New { type_name, args, location })
            }
            TokenKind::LBracket => self.list_literal(),
            TokenKind::LBrace => self.map_literal(),
            TokenKind::LParen => self.paren_or_set(),
            TokenKind::Identifier(name) => {
                self.advance();
                if self.check(&TokenKind::LParen) {
                    // Record construction: `Point(x: 1, y: 2)`.
                    self.advance();
                    let mut fields = Vec::new();
                    if !self.check(&TokenKind::RParen) {
                        loop {
                            let field = self.identifier("field name in record construction")?;
                            self.expect(&TokenKind::Colon, "':' after field name")?;
                            fields.push((field, self.expression()?));
                            if !self.eat(&TokenKind::Comma) {
                                break;
                            }
                        }
                    }
                    self.expect(&TokenKind::RParen, "')' after record fields")?;
                    return Ok(Expr::RecordCall { type_name: name, fields, location });
                }
                Ok(Expr::Identifier { name, location })
            }
            _ => Err(self.error("Expected an expression")),
        }
    }

    fn list_literal(&mut self) -> Result<Expr, RunError> {
        self.advance(); // [
        let mut elements = Vec::new();
        if !self.check(&TokenKind::RBracket) {
            loop {
                elements.push(self.expression()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
                if self.check(&TokenKind::RBracket) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RBracket, "']' closing list literal")?;
        Ok(Expr::ListLit(elements))
    }

    fn map_literal(&mut self) -> Result<Expr, RunError> {
        self.advance(); // {
        let mut entries = Vec::new();
        if !self.check(&TokenKind::RBrace) {
            loop {
                let key = self.expression()?;
                self.expect(&TokenKind::Colon, "':' between map key and value")?;
                let value = self.expression()?;
                entries.push((key, value));
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
                if self.check(&TokenKind::RBrace) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RBrace, "'}' closing map literal")?;
        Ok(Expr::MapLit(entries))
    }

    /// `( expr )` is grouping; `( a, b … )`, `( a, )` and `()` are set
    /// literals.
    fn paren_or_set(&mut self) -> Result<Expr, RunError> {
        self.advance(); // (
        if self.eat(&TokenKind::RParen) {
            return Ok(Expr::SetLit(Vec::new()));
        }
        let first = self.expression()?;
        if self.eat(&TokenKind::RParen) {
            return Ok(first);
        }
        self.expect(&TokenKind::Comma, "',' or ')' in parenthesised expression")?;
        let mut elements = vec![first];
        while !self.check(&TokenKind::RParen) {
            elements.push(self.expression()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RParen, "')' closing set literal")?;
        Ok(Expr::SetLit(elements))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_complete_object() {
        let source = r#"
import system.io

Object Greeter {
    property message: Text

    constructor(greeting: Text) {
        this.message = greeting
    }

    @external method greet(name: Text): Text {
        io.print("%s, %s!", this.message, name)
        return this.message
    }
}

Object Main {
    method main(): Int {
        greeter: Greeter = new Greeter("Hello")
        greeter.greet("World")
        return 0
    }
}
"#;
        let program = parse(source).unwrap();
        assert_eq!(program.imports.len(), 1);
        assert_eq!(program.declarations.len(), 2);
        let Decl::Object(greeter) = &program.declarations[0] else {
            panic!("expected object");
        };
        assert_eq!(greeter.name, "Greeter");
        assert_eq!(greeter.properties.len(), 1);
        assert_eq!(greeter.methods.len(), 2);
        assert!(greeter.methods.iter().any(|m| m.name == "greet" && m.external));
    }

    #[test]
    fn generic_types_flatten_to_strings() {
        let stmts = parse_statements("xs: List<Int> = [1, 2, 3]").unwrap();
        let Stmt::VarDecl { type_name, .. } = &stmts[0] else {
            panic!("expected declaration");
        };
        assert_eq!(type_name, "List<Int>");
    }

    #[test]
    fn set_literal_vs_grouping() {
        let stmts = parse_statements("x: Int = (1 + 2) * 3").unwrap();
        assert_eq!(stmts.len(), 1);
        let set = parse_statements("s: Set<Int> = (1, 2, 3)").unwrap();
        let Stmt::VarDecl { init: Expr::SetLit(elements), .. } = &set[0] else {
            panic!("expected set literal");
        };
        assert_eq!(elements.len(), 3);
    }

    #[test]
    fn return_value_must_share_the_line() {
        let stmts = parse_statements("return\nx = 5").unwrap();
        assert!(matches!(stmts[0], Stmt::Return { value: None, .. }));
        assert!(matches!(stmts[1], Stmt::Assign { .. }));
    }

    #[test]
    fn compound_assignment_desugars() {
        let stmts = parse_statements("x += 2").unwrap();
        let Stmt::Assign { value: Expr::Binary { op, .. }, .. } = &stmts[0] else {
            panic!("expected desugared assignment");
        };
        assert_eq!(*op, BinaryOp::Add);
    }

    #[test]
    fn syntax_errors_carry_location() {
        let err = parse("Object {").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Syntax);
        assert!(err.message().contains("1:8"));
    }
}
