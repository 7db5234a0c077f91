use crate::{
    context::SourceLocation,
    exception::{ErrorKind, RunError},
};

/// A lexed token with its source location.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Identifier(String),
    IntLit(i64),
    LongLit(i128),
    FloatLit(f32),
    DoubleLit(f64),
    TextLit(String),
    CharLit(u8),

    // keywords
    KwObject,
    KwEnum,
    KwRecord,
    KwProtocol,
    KwMethod,
    KwProperty,
    KwConstructor,
    KwImport,
    KwNew,
    KwThis,
    KwReturn,
    KwThrow,
    KwTry,
    KwCatch,
    KwFinally,
    KwIf,
    KwElse,
    KwWhile,
    KwConst,
    KwTrue,
    KwFalse,

    // punctuation / operators
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Colon,
    Dot,
    At,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PercentAssign,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Bang,

    Eof,
}

impl TokenKind {
    fn keyword(word: &str) -> Option<Self> {
        Some(match word {
            "Object" => Self::KwObject,
            "Enum" => Self::KwEnum,
            "Record" => Self::KwRecord,
            "Protocol" => Self::KwProtocol,
            "method" => Self::KwMethod,
            "property" => Self::KwProperty,
            "constructor" => Self::KwConstructor,
            "import" => Self::KwImport,
            "new" => Self::KwNew,
            "this" => Self::KwThis,
            "return" => Self::KwReturn,
            "throw" => Self::KwThrow,
            "try" => Self::KwTry,
            "catch" => Self::KwCatch,
            "finally" => Self::KwFinally,
            "if" => Self::KwIf,
            "else" => Self::KwElse,
            "while" => Self::KwWhile,
            "const" => Self::KwConst,
            "true" => Self::KwTrue,
            "false" => Self::KwFalse,
            _ => return None,
        })
    }
}

/// Tokenizes `.obq` source. Comments are `#` to end of line and
/// `### … ###` blocks.
pub fn tokenize(source: &str) -> Result<Vec<Token>, RunError> {
    Lexer::new(source).run()
}

struct Lexer<'a> {
    bytes: &'a [u8],
    pos: usize,
    line: u32,
    column: u32,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self { bytes: source.as_bytes(), pos: 0, line: 1, column: 1 }
    }

    fn error(&self, message: impl Into<String>) -> RunError {
        RunError::new(
            ErrorKind::Syntax,
            format!("{} at {}:{}", message.into(), self.line, self.column),
        )
    }

    fn location(&self) -> SourceLocation {
        SourceLocation::new(self.line, self.column)
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(b)
    }

    fn eat(&mut self, expected: u8) -> bool {
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn run(mut self) -> Result<Vec<Token>, RunError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia()?;
            let location = self.location();
            let Some(b) = self.peek() else {
                tokens.push(Token { kind: TokenKind::Eof, location });
                return Ok(tokens);
            };

            let kind = match b {
                b'(' => self.single(TokenKind::LParen),
                b')' => self.single(TokenKind::RParen),
                b'{' => self.single(TokenKind::LBrace),
                b'}' => self.single(TokenKind::RBrace),
                b'[' => self.single(TokenKind::LBracket),
                b']' => self.single(TokenKind::RBracket),
                b',' => self.single(TokenKind::Comma),
                b':' => self.single(TokenKind::Colon),
                b'.' => self.single(TokenKind::Dot),
                b'@' => self.single(TokenKind::At),
                b'+' => self.with_assign(TokenKind::Plus, TokenKind::PlusAssign),
                b'-' => self.with_assign(TokenKind::Minus, TokenKind::MinusAssign),
                b'*' => self.with_assign(TokenKind::Star, TokenKind::StarAssign),
                b'/' => self.with_assign(TokenKind::Slash, TokenKind::SlashAssign),
                b'%' => self.with_assign(TokenKind::Percent, TokenKind::PercentAssign),
                b'=' => {
                    self.bump();
                    if self.eat(b'=') { TokenKind::EqEq } else { TokenKind::Assign }
                }
                b'!' => {
                    self.bump();
                    if self.eat(b'=') { TokenKind::NotEq } else { TokenKind::Bang }
                }
                b'<' => {
                    self.bump();
                    if self.eat(b'=') { TokenKind::Le } else { TokenKind::Lt }
                }
                b'>' => {
                    self.bump();
                    if self.eat(b'=') { TokenKind::Ge } else { TokenKind::Gt }
                }
                b'&' => {
                    self.bump();
                    if self.eat(b'&') {
                        TokenKind::AndAnd
                    } else {
                        return Err(self.error("Unexpected character '&'"));
                    }
                }
                b'|' => {
                    self.bump();
                    if self.eat(b'|') {
                        TokenKind::OrOr
                    } else {
                        return Err(self.error("Unexpected character '|'"));
                    }
                }
                b'"' => self.text_literal()?,
                b'\'' => self.char_literal()?,
                b'0'..=b'9' => self.number_literal()?,
                b'_' | b'a'..=b'z' | b'A'..=b'Z' => self.identifier(),
                other => {
                    return Err(self.error(format!("Unexpected character '{}'", other as char)));
                }
            };
            tokens.push(Token { kind, location });
        }
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.bump();
        kind
    }

    fn with_assign(&mut self, plain: TokenKind, compound: TokenKind) -> TokenKind {
        self.bump();
        if self.eat(b'=') { compound } else { plain }
    }

    fn skip_trivia(&mut self) -> Result<(), RunError> {
        loop {
            match self.peek() {
                Some(b' ' | b'\t' | b'\r' | b'\n') => {
                    self.bump();
                }
                Some(b'#') => {
                    if self.peek_at(1) == Some(b'#') && self.peek_at(2) == Some(b'#') {
                        self.bump();
                        self.bump();
                        self.bump();
                        // block comment runs to the next ###
                        loop {
                            match self.peek() {
                                None => return Err(self.error("Unterminated block comment")),
                                Some(b'#')
                                    if self.peek_at(1) == Some(b'#')
                                        && self.peek_at(2) == Some(b'#') =>
                                {
                                    self.bump();
                                    self.bump();
                                    self.bump();
                                    break;
                                }
                                _ => {
                                    self.bump();
                                }
                            }
                        }
                    } else {
                        while let Some(b) = self.peek() {
                            if b == b'\n' {
                                break;
                            }
                            self.bump();
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn identifier(&mut self) -> TokenKind {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_alphanumeric() || b == b'_' {
                self.bump();
            } else {
                break;
            }
        }
        let word = std::str::from_utf8(&self.bytes[start..self.pos])
            .expect("identifier bytes are ASCII")
            .to_owned();
        TokenKind::keyword(&word).unwrap_or(TokenKind::Identifier(word))
    }

    fn number_literal(&mut self) -> Result<TokenKind, RunError> {
        let start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.bump();
        }

        let mut is_float = false;
        if self.peek() == Some(b'.') && self.peek_at(1).is_some_and(|b| b.is_ascii_digit()) {
            is_float = true;
            self.bump();
            while self.peek().is_some_and(|b| b.is_ascii_digit()) {
                self.bump();
            }
        }
        if matches!(self.peek(), Some(b'e' | b'E'))
            && self
                .peek_at(1)
                .is_some_and(|b| b.is_ascii_digit() || b == b'+' || b == b'-')
        {
            is_float = true;
            self.bump();
            if matches!(self.peek(), Some(b'+' | b'-')) {
                self.bump();
            }
            while self.peek().is_some_and(|b| b.is_ascii_digit()) {
                self.bump();
            }
        }

        let digits = std::str::from_utf8(&self.bytes[start..self.pos])
            .expect("number bytes are ASCII")
            .to_owned();

        if is_float {
            // An `f` suffix selects Float (32-bit); the default is Double.
            if matches!(self.peek(), Some(b'f' | b'F')) {
                self.bump();
                return digits
                    .parse::<f32>()
                    .map(TokenKind::FloatLit)
                    .map_err(|_| self.error(format!("Invalid Float literal '{digits}'")));
            }
            return digits
                .parse::<f64>()
                .map(TokenKind::DoubleLit)
                .map_err(|_| self.error(format!("Invalid Double literal '{digits}'")));
        }

        if matches!(self.peek(), Some(b'f' | b'F')) {
            self.bump();
            return digits
                .parse::<f32>()
                .map(TokenKind::FloatLit)
                .map_err(|_| self.error(format!("Invalid Float literal '{digits}'")));
        }
        // An `l` suffix forces Long; otherwise literals exceeding Int range
        // promote to Long automatically.
        if matches!(self.peek(), Some(b'l' | b'L')) {
            self.bump();
            return digits
                .parse::<i128>()
                .map(TokenKind::LongLit)
                .map_err(|_| self.error(format!("Invalid Long literal '{digits}'")));
        }
        if let Ok(value) = digits.parse::<i64>() {
            return Ok(TokenKind::IntLit(value));
        }
        digits
            .parse::<i128>()
            .map(TokenKind::LongLit)
            .map_err(|_| self.error(format!("Invalid integer literal '{digits}'")))
    }

    fn escape(&mut self) -> Result<u8, RunError> {
        match self.bump() {
            Some(b'n') => Ok(b'\n'),
            Some(b't') => Ok(b'\t'),
            Some(b'r') => Ok(b'\r'),
            Some(b'0') => Ok(0),
            Some(b'\\') => Ok(b'\\'),
            Some(b'"') => Ok(b'"'),
            Some(b'\'') => Ok(b'\''),
            _ => Err(self.error("Invalid escape sequence")),
        }
    }

    fn text_literal(&mut self) -> Result<TokenKind, RunError> {
        self.bump(); // opening quote
        let mut value = Vec::new();
        loop {
            match self.bump() {
                None | Some(b'\n') => return Err(self.error("Unterminated string literal")),
                Some(b'"') => break,
                Some(b'\\') => value.push(self.escape()?),
                Some(b) => value.push(b),
            }
        }
        Ok(TokenKind::TextLit(
            String::from_utf8_lossy(&value).into_owned(),
        ))
    }

    fn char_literal(&mut self) -> Result<TokenKind, RunError> {
        self.bump(); // opening quote
        let c = match self.bump() {
            None | Some(b'\'') => return Err(self.error("Empty character literal")),
            Some(b'\\') => self.escape()?,
            Some(b) => b,
        };
        if !self.eat(b'\'') {
            return Err(self.error("Unterminated character literal"));
        }
        Ok(TokenKind::CharLit(c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn lexes_declaration_line() {
        let toks = kinds("x: Int = 42");
        assert_eq!(
            toks,
            vec![
                TokenKind::Identifier("x".into()),
                TokenKind::Colon,
                TokenKind::Identifier("Int".into()),
                TokenKind::Assign,
                TokenKind::IntLit(42),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn numeric_literal_forms() {
        assert_eq!(kinds("3.14")[0], TokenKind::DoubleLit(3.14));
        assert_eq!(kinds("3.14f")[0], TokenKind::FloatLit(3.14));
        assert_eq!(kinds("7L")[0], TokenKind::LongLit(7));
        // Beyond i64 promotes to Long without a suffix.
        assert!(matches!(kinds("123456789012345678901")[0], TokenKind::LongLit(_)));
    }

    #[test]
    fn comments_are_trivia() {
        let toks = kinds("1 # comment\n### block\nstill comment ### 2");
        assert_eq!(toks, vec![TokenKind::IntLit(1), TokenKind::IntLit(2), TokenKind::Eof]);
    }

    #[test]
    fn string_escapes() {
        assert_eq!(kinds(r#""a\nb""#)[0], TokenKind::TextLit("a\nb".into()));
        assert_eq!(kinds(r"'\t'")[0], TokenKind::CharLit(b'\t'));
    }

    #[test]
    fn tracks_line_numbers() {
        let toks = tokenize("a\nb").unwrap();
        assert_eq!(toks[0].location.line, 1);
        assert_eq!(toks[1].location.line, 2);
    }
}
