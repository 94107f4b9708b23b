//! Layout-sensitive parser from module source text to [`SyntaxFile`].
//!
//! The grammar is the surface subset the compiler consumes: module headers,
//! imports, type and type-alias declarations, infix and port declarations,
//! function declarations, and the expression/pattern language. Layout is
//! handled with a column floor threaded through the expression parser: a
//! token at or left of the floor ends the current construct.

use std::fmt;

use num_bigint::BigInt;

use crate::syntax::{
    Associativity, CustomTypeDeclaration, Declaration, ExposeItem, Exposing, Expression,
    ExpressionKind, FunctionDeclaration, Import, InfixDeclaration, LetDeclaration, ModuleHeader,
    Pattern, PatternKind, PortDeclaration, Position, Range, SyntaxFile, TypeAliasDeclaration,
    VariantDeclaration,
};

/// Parse failure with the source position where it was detected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    pub line: u32,
    pub column: u32,
}

impl ParseError {
    fn syntax(message: impl Into<String>, position: Position) -> Self {
        Self {
            message: message.into(),
            line: position.line,
            column: position.column,
        }
    }

    fn unexpected_end(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: 0,
            column: 0,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.line == 0 {
            write!(f, "parse error at end of input: {}", self.message)
        } else {
            write!(f, "parse error at {}:{}: {}", self.line, self.column, self.message)
        }
    }
}

impl std::error::Error for ParseError {}

/// Parses a complete module file.
pub fn parse_module(source: &str) -> Result<SyntaxFile, ParseError> {
    let mut parser = Parser::new(source)?;
    parser.parse_file()
}

/// Parses a free-standing expression, e.g. an interactive submission.
pub fn parse_expression_text(source: &str) -> Result<Expression, ParseError> {
    let mut parser = Parser::new(source)?;
    let expr = parser.parse_expression(0)?;
    parser.expect_end()?;
    Ok(expr)
}

/// Parses a free-standing declaration, e.g. an interactive submission
/// introducing a binding.
pub fn parse_declaration_text(source: &str) -> Result<Declaration, ParseError> {
    let mut parser = Parser::new(source)?;
    let declaration = parser
        .parse_declaration(0)?
        .ok_or_else(|| ParseError::unexpected_end("expected a declaration"))?;
    parser.expect_end()?;
    Ok(declaration)
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Lower(String),
    Upper(String),
    Int(BigInt),
    Float(f64),
    Character(char),
    Str(String),
    Operator(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Dot,
    DotDot,
    Backslash,
    Equals,
    Arrow,
    Pipe,
    Colon,
    Underscore,
    KwModule,
    KwExposing,
    KwImport,
    KwAs,
    KwPort,
    KwType,
    KwAlias,
    KwLet,
    KwIn,
    KwCase,
    KwOf,
    KwIf,
    KwThen,
    KwElse,
    KwInfix,
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    line: u32,
    column: u32,
    end_column: u32,
    /// True when no whitespace separates this token from the previous one on
    /// the same line. Drives field access and negation.
    adjacent: bool,
}

impl Token {
    fn start(&self) -> Position {
        Position {
            line: self.line,
            column: self.column,
        }
    }

    fn end(&self) -> Position {
        Position {
            line: self.line,
            column: self.end_column,
        }
    }

    fn range(&self) -> Range {
        Range::new(self.start(), self.end())
    }
}

const SYMBOL_CHARS: &str = "+-/*=.<>:&|^";

fn keyword(word: &str) -> Option<TokenKind> {
    Some(match word {
        "module" => TokenKind::KwModule,
        "exposing" => TokenKind::KwExposing,
        "import" => TokenKind::KwImport,
        "as" => TokenKind::KwAs,
        "port" => TokenKind::KwPort,
        "type" => TokenKind::KwType,
        "alias" => TokenKind::KwAlias,
        "let" => TokenKind::KwLet,
        "in" => TokenKind::KwIn,
        "case" => TokenKind::KwCase,
        "of" => TokenKind::KwOf,
        "if" => TokenKind::KwIf,
        "then" => TokenKind::KwThen,
        "else" => TokenKind::KwElse,
        "infix" => TokenKind::KwInfix,
        _ => return None,
    })
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: u32,
    column: u32,
    tokens: Vec<Token>,
    /// Position right after the previously emitted token, for adjacency.
    previous_end: Option<(u32, u32)>,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().peekable(),
            line: 1,
            column: 1,
            tokens: Vec::new(),
            previous_end: None,
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn position(&self) -> Position {
        Position {
            line: self.line,
            column: self.column,
        }
    }

    fn push(&mut self, kind: TokenKind, line: u32, column: u32) {
        let adjacent = self.previous_end == Some((line, column));
        self.tokens.push(Token {
            kind,
            line,
            column,
            end_column: self.column,
            adjacent,
        });
        self.previous_end = Some((self.line, self.column));
    }

    fn run(mut self) -> Result<Vec<Token>, ParseError> {
        while let Some(c) = self.peek() {
            let (line, column) = (self.line, self.column);
            match c {
                ' ' | '\t' | '\r' | '\n' => {
                    self.bump();
                }
                '(' => {
                    self.bump();
                    self.push(TokenKind::LParen, line, column);
                }
                ')' => {
                    self.bump();
                    self.push(TokenKind::RParen, line, column);
                }
                '[' => {
                    self.bump();
                    self.push(TokenKind::LBracket, line, column);
                }
                ']' => {
                    self.bump();
                    self.push(TokenKind::RBracket, line, column);
                }
                '{' => {
                    self.bump();
                    if self.peek() == Some('-') {
                        self.block_comment(line, column)?;
                    } else {
                        self.push(TokenKind::LBrace, line, column);
                    }
                }
                '}' => {
                    self.bump();
                    self.push(TokenKind::RBrace, line, column);
                }
                ',' => {
                    self.bump();
                    self.push(TokenKind::Comma, line, column);
                }
                '\\' => {
                    self.bump();
                    self.push(TokenKind::Backslash, line, column);
                }
                '\'' => self.char_literal(line, column)?,
                '"' => self.string_literal(line, column)?,
                '_' => {
                    let word = self.identifier_chars();
                    if word == "_" {
                        self.push(TokenKind::Underscore, line, column);
                    } else {
                        self.push(TokenKind::Lower(word), line, column);
                    }
                }
                c if c.is_ascii_digit() => self.number(line, column)?,
                c if c.is_alphabetic() => {
                    let word = self.identifier_chars();
                    let kind = if let Some(kw) = keyword(&word) {
                        kw
                    } else if word.chars().next().is_some_and(char::is_uppercase) {
                        TokenKind::Upper(word)
                    } else {
                        TokenKind::Lower(word)
                    };
                    self.push(kind, line, column);
                }
                c if SYMBOL_CHARS.contains(c) => {
                    let mut run = String::new();
                    while let Some(s) = self.peek() {
                        if SYMBOL_CHARS.contains(s) {
                            run.push(s);
                            self.bump();
                        } else {
                            break;
                        }
                    }
                    if run.starts_with("--") {
                        // line comment
                        while let Some(c) = self.peek() {
                            if c == '\n' {
                                break;
                            }
                            self.bump();
                        }
                        self.previous_end = None;
                        continue;
                    }
                    let kind = match run.as_str() {
                        "." => TokenKind::Dot,
                        ".." => TokenKind::DotDot,
                        "=" => TokenKind::Equals,
                        "->" => TokenKind::Arrow,
                        "|" => TokenKind::Pipe,
                        ":" => TokenKind::Colon,
                        _ => TokenKind::Operator(run),
                    };
                    self.push(kind, line, column);
                }
                other => {
                    return Err(ParseError::syntax(
                        format!("unexpected character {other:?}"),
                        self.position(),
                    ));
                }
            }
        }
        Ok(self.tokens)
    }

    fn identifier_chars(&mut self) -> String {
        let mut word = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                word.push(c);
                self.bump();
            } else {
                break;
            }
        }
        word
    }

    fn block_comment(&mut self, line: u32, column: u32) -> Result<(), ParseError> {
        // the opening brace is already consumed; comments nest
        self.bump(); // '-'
        let mut depth = 1usize;
        while depth > 0 {
            match self.bump() {
                Some('{') if self.peek() == Some('-') => {
                    self.bump();
                    depth += 1;
                }
                Some('-') if self.peek() == Some('}') => {
                    self.bump();
                    depth -= 1;
                }
                Some(_) => {}
                None => {
                    return Err(ParseError::syntax(
                        "unterminated block comment",
                        Position { line, column },
                    ));
                }
            }
        }
        self.previous_end = None;
        Ok(())
    }

    fn escape(&mut self) -> Result<char, ParseError> {
        let position = self.position();
        match self.bump() {
            Some('n') => Ok('\n'),
            Some('t') => Ok('\t'),
            Some('r') => Ok('\r'),
            Some('\\') => Ok('\\'),
            Some('\'') => Ok('\''),
            Some('"') => Ok('"'),
            Some('u') => {
                if self.bump() != Some('{') {
                    return Err(ParseError::syntax("expected '{' in unicode escape", position));
                }
                let mut digits = String::new();
                loop {
                    match self.bump() {
                        Some('}') => break,
                        Some(d) if d.is_ascii_hexdigit() => digits.push(d),
                        _ => {
                            return Err(ParseError::syntax("malformed unicode escape", position));
                        }
                    }
                }
                u32::from_str_radix(&digits, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| ParseError::syntax("invalid unicode code point", position))
            }
            other => Err(ParseError::syntax(
                format!("unknown escape sequence {other:?}"),
                position,
            )),
        }
    }

    fn char_literal(&mut self, line: u32, column: u32) -> Result<(), ParseError> {
        self.bump(); // opening quote
        let c = match self.bump() {
            Some('\\') => self.escape()?,
            Some(c) => c,
            None => {
                return Err(ParseError::syntax(
                    "unterminated character literal",
                    Position { line, column },
                ));
            }
        };
        if self.bump() != Some('\'') {
            return Err(ParseError::syntax(
                "expected closing quote of character literal",
                Position { line, column },
            ));
        }
        self.push(TokenKind::Character(c), line, column);
        Ok(())
    }

    fn string_literal(&mut self, line: u32, column: u32) -> Result<(), ParseError> {
        self.bump(); // opening quote
        let triple = if self.peek() == Some('"') {
            self.bump();
            if self.peek() == Some('"') {
                self.bump();
                true
            } else {
                // empty string ""
                self.push(TokenKind::Str(String::new()), line, column);
                return Ok(());
            }
        } else {
            false
        };
        let mut text = String::new();
        loop {
            match self.bump() {
                Some('"') if !triple => break,
                Some('"') if triple => {
                    if self.peek() == Some('"') {
                        self.bump();
                        if self.peek() == Some('"') {
                            self.bump();
                            break;
                        }
                        text.push('"');
                        text.push('"');
                    } else {
                        text.push('"');
                    }
                }
                Some('\\') => text.push(self.escape()?),
                Some('\n') if !triple => {
                    return Err(ParseError::syntax(
                        "unterminated string literal",
                        Position { line, column },
                    ));
                }
                Some(c) => text.push(c),
                None => {
                    return Err(ParseError::syntax(
                        "unterminated string literal",
                        Position { line, column },
                    ));
                }
            }
        }
        self.push(TokenKind::Str(text), line, column);
        Ok(())
    }

    fn number(&mut self, line: u32, column: u32) -> Result<(), ParseError> {
        let mut digits = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                digits.push(c);
                self.bump();
            } else {
                break;
            }
        }
        if digits == "0" && self.peek() == Some('x') {
            self.bump();
            let mut hex = String::new();
            while let Some(c) = self.peek() {
                if c.is_ascii_hexdigit() {
                    hex.push(c);
                    self.bump();
                } else {
                    break;
                }
            }
            let value = BigInt::parse_bytes(hex.as_bytes(), 16).ok_or_else(|| {
                ParseError::syntax("malformed hexadecimal literal", Position { line, column })
            })?;
            self.push(TokenKind::Int(value), line, column);
            return Ok(());
        }
        // a dot directly followed by a digit makes this a float literal
        if self.peek() == Some('.') {
            let mut lookahead = self.chars.clone();
            lookahead.next();
            if lookahead.peek().is_some_and(char::is_ascii_digit) {
                self.bump(); // '.'
                let mut fractional = String::new();
                while let Some(c) = self.peek() {
                    if c.is_ascii_digit() {
                        fractional.push(c);
                        self.bump();
                    } else {
                        break;
                    }
                }
                let text = format!("{digits}.{fractional}");
                let value: f64 = text.parse().map_err(|_| {
                    ParseError::syntax("malformed float literal", Position { line, column })
                })?;
                self.push(TokenKind::Float(value), line, column);
                return Ok(());
            }
        }
        let value = BigInt::parse_bytes(digits.as_bytes(), 10).ok_or_else(|| {
            ParseError::syntax("malformed integer literal", Position { line, column })
        })?;
        self.push(TokenKind::Int(value), line, column);
        Ok(())
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(source: &str) -> Result<Self, ParseError> {
        let tokens = Lexer::new(source).run()?;
        Ok(Self { tokens, pos: 0 })
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    /// The next token, but only if it sits strictly right of the layout
    /// floor. Anything at or left of the floor belongs to an outer construct.
    fn peek_within(&self, floor: u32) -> Option<&Token> {
        self.peek().filter(|t| t.column > floor)
    }

    fn next_token(&mut self) -> Result<Token, ParseError> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| ParseError::unexpected_end("unexpected end of input"))?;
        self.pos += 1;
        Ok(token)
    }

    fn error_here(&self, message: impl Into<String>) -> ParseError {
        match self.peek() {
            Some(token) => ParseError::syntax(message, token.start()),
            None => ParseError::unexpected_end(message),
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<Token, ParseError> {
        match self.peek() {
            Some(token) if token.kind == *kind => self.next_token(),
            _ => Err(self.error_here(format!("expected {what}"))),
        }
    }

    fn expect_end(&self) -> Result<(), ParseError> {
        if self.pos < self.tokens.len() {
            return Err(self.error_here("expected end of input"));
        }
        Ok(())
    }

    fn lower_name(&mut self, what: &str) -> Result<String, ParseError> {
        match self.peek() {
            Some(Token {
                kind: TokenKind::Lower(_),
                ..
            }) => {
                let token = self.next_token()?;
                let TokenKind::Lower(name) = token.kind else { unreachable!() };
                Ok(name)
            }
            _ => Err(self.error_here(format!("expected {what}"))),
        }
    }

    fn upper_name(&mut self, what: &str) -> Result<String, ParseError> {
        match self.peek() {
            Some(Token {
                kind: TokenKind::Upper(_),
                ..
            }) => {
                let token = self.next_token()?;
                let TokenKind::Upper(name) = token.kind else { unreachable!() };
                Ok(name)
            }
            _ => Err(self.error_here(format!("expected {what}"))),
        }
    }

    // === module structure ===================================================

    fn parse_file(&mut self) -> Result<SyntaxFile, ParseError> {
        let module = self.parse_module_header()?;
        let mut imports = Vec::new();
        while matches!(self.peek().map(|t| &t.kind), Some(TokenKind::KwImport)) {
            imports.push(self.parse_import()?);
        }
        let mut declarations = Vec::new();
        while let Some(token) = self.peek() {
            if token.column != 1 {
                return Err(self.error_here("expected a declaration at column 1"));
            }
            if let Some(declaration) = self.parse_declaration(1)? {
                declarations.push(declaration);
            }
        }
        Ok(SyntaxFile {
            module,
            imports,
            declarations,
        })
    }

    fn parse_module_header(&mut self) -> Result<ModuleHeader, ParseError> {
        // `port module` headers are accepted; the port keyword carries no
        // meaning here
        if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::KwPort))
            && matches!(self.peek_at(1).map(|t| &t.kind), Some(TokenKind::KwModule))
        {
            self.next_token()?;
        }
        self.expect(&TokenKind::KwModule, "keyword 'module'")?;
        let name = self.module_path()?;
        self.expect(&TokenKind::KwExposing, "keyword 'exposing'")?;
        let exposing = self.parse_exposing()?;
        Ok(ModuleHeader { name, exposing })
    }

    fn module_path(&mut self) -> Result<Vec<String>, ParseError> {
        let mut path = vec![self.upper_name("a module name")?];
        while matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Dot)) {
            self.next_token()?;
            path.push(self.upper_name("a module name segment")?);
        }
        Ok(path)
    }

    fn parse_exposing(&mut self) -> Result<Exposing, ParseError> {
        self.expect(&TokenKind::LParen, "'('")?;
        if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::DotDot)) {
            self.next_token()?;
            self.expect(&TokenKind::RParen, "')'")?;
            return Ok(Exposing::All);
        }
        let mut items = Vec::new();
        loop {
            let item = match self.peek().map(|t| t.kind.clone()) {
                Some(TokenKind::Lower(name)) => {
                    self.next_token()?;
                    ExposeItem::Value(name)
                }
                Some(TokenKind::Upper(name)) => {
                    self.next_token()?;
                    let mut open = false;
                    if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::LParen)) {
                        self.next_token()?;
                        self.expect(&TokenKind::DotDot, "'..'")?;
                        self.expect(&TokenKind::RParen, "')'")?;
                        open = true;
                    }
                    ExposeItem::Type { name, open }
                }
                Some(TokenKind::LParen) => {
                    self.next_token()?;
                    let operator = self.operator_name()?;
                    self.expect(&TokenKind::RParen, "')'")?;
                    ExposeItem::Operator(operator)
                }
                _ => return Err(self.error_here("expected an exposing item")),
            };
            items.push(item);
            match self.peek().map(|t| &t.kind) {
                Some(TokenKind::Comma) => {
                    self.next_token()?;
                }
                Some(TokenKind::RParen) => {
                    self.next_token()?;
                    break;
                }
                _ => return Err(self.error_here("expected ',' or ')' in exposing list")),
            }
        }
        Ok(Exposing::Explicit(items))
    }

    fn operator_name(&mut self) -> Result<String, ParseError> {
        let token = self.next_token()?;
        match token.kind {
            TokenKind::Operator(op) => Ok(op),
            TokenKind::Equals => Ok("=".to_owned()),
            TokenKind::Pipe => Ok("|".to_owned()),
            _ => Err(ParseError::syntax("expected an operator symbol", token.start())),
        }
    }

    fn parse_import(&mut self) -> Result<Import, ParseError> {
        self.expect(&TokenKind::KwImport, "keyword 'import'")?;
        let module_name = self.module_path()?;
        let alias = if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::KwAs)) {
            self.next_token()?;
            Some(self.upper_name("an import alias")?)
        } else {
            None
        };
        let exposing = if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::KwExposing)) {
            self.next_token()?;
            Some(self.parse_exposing()?)
        } else {
            None
        };
        Ok(Import {
            module_name,
            alias,
            exposing,
        })
    }

    /// Parses one top-level (or submission-level) declaration. Returns `None`
    /// for type annotations, which carry no compiled artifact.
    fn parse_declaration(&mut self, floor: u32) -> Result<Option<Declaration>, ParseError> {
        match self.peek().map(|t| t.kind.clone()) {
            Some(TokenKind::KwPort) => {
                self.next_token()?;
                let name = self.lower_name("a port name")?;
                self.expect(&TokenKind::Colon, "':'")?;
                self.skip_type(floor);
                Ok(Some(Declaration::Port(PortDeclaration { name })))
            }
            Some(TokenKind::KwType) => {
                self.next_token()?;
                if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::KwAlias)) {
                    self.next_token()?;
                    Ok(Some(Declaration::TypeAlias(self.parse_type_alias(floor)?)))
                } else {
                    Ok(Some(Declaration::CustomType(self.parse_custom_type(floor)?)))
                }
            }
            Some(TokenKind::KwInfix) => {
                self.next_token()?;
                let direction = match self.lower_name("an associativity")?.as_str() {
                    "left" => Associativity::Left,
                    "right" => Associativity::Right,
                    "non" => Associativity::Non,
                    other => {
                        return Err(
                            self.error_here(format!("unknown operator associativity '{other}'"))
                        );
                    }
                };
                let precedence = match self.next_token()? {
                    Token {
                        kind: TokenKind::Int(n),
                        ..
                    } => u8::try_from(&n)
                        .map_err(|_| self.error_here("operator precedence out of range"))?,
                    token => {
                        return Err(ParseError::syntax(
                            "expected an operator precedence",
                            token.start(),
                        ));
                    }
                };
                self.expect(&TokenKind::LParen, "'('")?;
                let operator = self.operator_name()?;
                self.expect(&TokenKind::RParen, "')'")?;
                self.expect(&TokenKind::Equals, "'='")?;
                let function = self.lower_name("the implementing function")?;
                Ok(Some(Declaration::Infix(InfixDeclaration {
                    direction,
                    precedence,
                    operator,
                    function,
                })))
            }
            Some(TokenKind::Lower(name)) => {
                self.next_token()?;
                if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Colon)) {
                    // a type annotation; skip it
                    self.next_token()?;
                    self.skip_type(floor);
                    return Ok(None);
                }
                let mut arguments = Vec::new();
                while !matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Equals)) {
                    arguments.push(self.parse_pattern_atom(floor)?);
                }
                self.expect(&TokenKind::Equals, "'='")?;
                let body = self.parse_expression(floor)?;
                Ok(Some(Declaration::Function(FunctionDeclaration {
                    name,
                    arguments,
                    body,
                })))
            }
            _ => Err(self.error_here("expected a declaration")),
        }
    }

    fn parse_custom_type(&mut self, floor: u32) -> Result<CustomTypeDeclaration, ParseError> {
        let name = self.upper_name("a type name")?;
        // type variables
        while matches!(self.peek_within(floor).map(|t| &t.kind), Some(TokenKind::Lower(_))) {
            self.next_token()?;
        }
        self.expect(&TokenKind::Equals, "'='")?;
        let mut variants = vec![self.parse_variant(floor)?];
        while matches!(self.peek_within(floor).map(|t| &t.kind), Some(TokenKind::Pipe)) {
            self.next_token()?;
            variants.push(self.parse_variant(floor)?);
        }
        Ok(CustomTypeDeclaration { name, variants })
    }

    fn parse_variant(&mut self, floor: u32) -> Result<VariantDeclaration, ParseError> {
        let name = self.upper_name("a variant name")?;
        let mut arity = 0;
        while self.skip_type_atom(floor)? {
            arity += 1;
        }
        Ok(VariantDeclaration { name, arity })
    }

    /// Consumes one type atom of a variant argument list. Returns false when
    /// the next token does not start a type atom.
    fn skip_type_atom(&mut self, floor: u32) -> Result<bool, ParseError> {
        match self.peek_within(floor).map(|t| t.kind.clone()) {
            Some(TokenKind::Lower(_) | TokenKind::Upper(_)) => {
                self.next_token()?;
                // qualified names within an atom
                while matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Dot))
                    && self.peek().is_some_and(|t| t.adjacent)
                {
                    self.next_token()?;
                    self.next_token()?;
                }
                Ok(true)
            }
            Some(TokenKind::LParen) => {
                self.skip_balanced()?;
                Ok(true)
            }
            Some(TokenKind::LBrace) => {
                self.skip_balanced()?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Consumes a balanced bracket group starting at the current token.
    fn skip_balanced(&mut self) -> Result<(), ParseError> {
        let mut depth = 0usize;
        loop {
            let token = self.next_token()?;
            match token.kind {
                TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => depth += 1,
                TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                _ => {}
            }
        }
    }

    /// Skips a type expression: everything right of the floor, minding
    /// balanced brackets.
    fn skip_type(&mut self, floor: u32) {
        while let Some(kind) = self.peek_within(floor).map(|t| t.kind.clone()) {
            match kind {
                TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => {
                    if self.skip_balanced().is_err() {
                        return;
                    }
                }
                _ => {
                    self.pos += 1;
                }
            }
        }
    }

    fn parse_type_alias(&mut self, floor: u32) -> Result<TypeAliasDeclaration, ParseError> {
        let name = self.upper_name("a type alias name")?;
        while matches!(self.peek_within(floor).map(|t| &t.kind), Some(TokenKind::Lower(_))) {
            self.next_token()?;
        }
        self.expect(&TokenKind::Equals, "'='")?;
        if matches!(self.peek_within(floor).map(|t| &t.kind), Some(TokenKind::LBrace)) {
            let fields = self.parse_record_type_fields()?;
            Ok(TypeAliasDeclaration {
                name,
                record_fields: Some(fields),
            })
        } else {
            self.skip_type(floor);
            Ok(TypeAliasDeclaration {
                name,
                record_fields: None,
            })
        }
    }

    fn parse_record_type_fields(&mut self) -> Result<Vec<String>, ParseError> {
        self.expect(&TokenKind::LBrace, "'{'")?;
        let mut fields = Vec::new();
        if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::RBrace)) {
            self.next_token()?;
            return Ok(fields);
        }
        loop {
            fields.push(self.lower_name("a field name")?);
            self.expect(&TokenKind::Colon, "':'")?;
            // skip the field type up to the next top-level ',' or '}'
            let mut depth = 0usize;
            loop {
                match self.peek().map(|t| &t.kind) {
                    Some(TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace) => {
                        depth += 1;
                        self.pos += 1;
                    }
                    Some(TokenKind::RParen | TokenKind::RBracket) => {
                        depth = depth.saturating_sub(1);
                        self.pos += 1;
                    }
                    Some(TokenKind::RBrace) if depth > 0 => {
                        depth -= 1;
                        self.pos += 1;
                    }
                    Some(TokenKind::Comma) if depth == 0 => break,
                    Some(TokenKind::RBrace) => break,
                    Some(_) => self.pos += 1,
                    None => return Err(self.error_here("unterminated record type")),
                }
            }
            match self.next_token()?.kind {
                TokenKind::Comma => {}
                TokenKind::RBrace => break,
                _ => return Err(self.error_here("expected ',' or '}' in record type")),
            }
        }
        Ok(fields)
    }

    // === expressions ========================================================

    fn parse_expression(&mut self, floor: u32) -> Result<Expression, ParseError> {
        match self.peek_within(floor).map(|t| &t.kind) {
            Some(TokenKind::KwLet) => self.parse_let(floor),
            Some(TokenKind::KwIf) => self.parse_if(floor),
            Some(TokenKind::KwCase) => self.parse_case(floor),
            Some(TokenKind::Backslash) => self.parse_lambda(floor),
            Some(_) => {
                let left = self.parse_application(floor)?;
                self.parse_operator_tail(floor, left)
            }
            None => Err(self.error_here("expected an expression")),
        }
    }

    /// Builds a right-leaning operator chain in source order; priority-driven
    /// re-association happens later in the compiler.
    fn parse_operator_tail(
        &mut self,
        floor: u32,
        left: Expression,
    ) -> Result<Expression, ParseError> {
        let Some(token) = self.peek_within(floor) else {
            return Ok(left);
        };
        let TokenKind::Operator(op) = token.kind.clone() else {
            return Ok(left);
        };
        self.next_token()?;
        let right = self.parse_expression(floor)?;
        let range = left.range.spanning(right.range);
        Ok(Expression::new(
            range,
            ExpressionKind::OperatorApplication {
                operator: op,
                left: Box::new(left),
                right: Box::new(right),
            },
        ))
    }

    fn parse_application(&mut self, floor: u32) -> Result<Expression, ParseError> {
        let first = self.parse_atom(floor)?;
        let mut parts = vec![first];
        while self.next_starts_atom(floor) {
            parts.push(self.parse_atom(floor)?);
        }
        if parts.len() == 1 {
            Ok(parts.pop().expect("parts is non-empty"))
        } else {
            let range = parts[0].range.spanning(parts[parts.len() - 1].range);
            Ok(Expression::new(range, ExpressionKind::Application(parts)))
        }
    }

    fn next_starts_atom(&self, floor: u32) -> bool {
        let Some(token) = self.peek_within(floor) else {
            return false;
        };
        match &token.kind {
            TokenKind::Lower(_)
            | TokenKind::Upper(_)
            | TokenKind::Int(_)
            | TokenKind::Float(_)
            | TokenKind::Character(_)
            | TokenKind::Str(_)
            | TokenKind::LParen
            | TokenKind::LBracket
            | TokenKind::LBrace
            | TokenKind::Underscore => true,
            // a '.field' accessor function
            TokenKind::Dot => !token.adjacent,
            // '-' glued to the next token but detached from the previous one
            // starts a negation
            TokenKind::Operator(op) => {
                op == "-"
                    && !token.adjacent
                    && self.peek_at(1).is_some_and(|next| next.adjacent)
            }
            _ => false,
        }
    }

    fn parse_atom(&mut self, floor: u32) -> Result<Expression, ParseError> {
        let token = self.next_token()?;
        let range = token.range();
        let mut expr = match token.kind {
            TokenKind::Int(n) => Expression::new(range, ExpressionKind::Integer(n)),
            TokenKind::Float(x) => Expression::new(range, ExpressionKind::Float(x)),
            TokenKind::Character(c) => Expression::new(range, ExpressionKind::Character(c)),
            TokenKind::Str(s) => Expression::new(range, ExpressionKind::StringLiteral(s)),
            TokenKind::Lower(name) => Expression::new(
                range,
                ExpressionKind::FunctionOrValue {
                    module: Vec::new(),
                    name,
                },
            ),
            TokenKind::Upper(first) => self.parse_qualified(first, range)?,
            TokenKind::Dot => {
                let field = self.lower_name("a field name after '.'")?;
                Expression::new(range, ExpressionKind::FieldAccessFunction(field))
            }
            TokenKind::Operator(op) if op == "-" => {
                let operand = self.parse_atom(floor)?;
                let range = range.spanning(operand.range);
                Expression::new(range, ExpressionKind::Negation(Box::new(operand)))
            }
            TokenKind::LParen => self.parse_paren_group(range)?,
            TokenKind::LBracket => {
                let (items, end) = self.parse_comma_separated(TokenKind::RBracket)?;
                Expression::new(Range::new(range.start, end), ExpressionKind::ListLiteral(items))
            }
            TokenKind::LBrace => self.parse_record(range)?,
            other => {
                return Err(ParseError::syntax(
                    format!("unexpected token {other:?} in expression"),
                    range.start,
                ));
            }
        };
        // postfix field access binds tighter than application
        loop {
            let is_access = matches!(
                self.peek().map(|t| (&t.kind, t.adjacent)),
                Some((TokenKind::Dot, true))
            ) && matches!(
                self.peek_at(1).map(|t| (&t.kind, t.adjacent)),
                Some((TokenKind::Lower(_), true))
            );
            if !is_access {
                break;
            }
            self.next_token()?;
            let field_token = self.next_token()?;
            let range = expr.range.spanning(field_token.range());
            let TokenKind::Lower(field) = field_token.kind else { unreachable!() };
            expr = Expression::new(
                range,
                ExpressionKind::FieldAccess {
                    record: Box::new(expr),
                    field,
                },
            );
        }
        Ok(expr)
    }

    /// Parses the tail of a capitalized reference: `List.map`, `Maybe.Just`,
    /// or a bare tag like `Just`.
    fn parse_qualified(&mut self, first: String, range: Range) -> Result<Expression, ParseError> {
        let mut path = vec![first];
        let mut end = range;
        loop {
            let dotted = matches!(
                self.peek().map(|t| (&t.kind, t.adjacent)),
                Some((TokenKind::Dot, true))
            );
            if !dotted {
                break;
            }
            match self.peek_at(1).map(|t| (t.kind.clone(), t.adjacent)) {
                Some((TokenKind::Upper(segment), true)) => {
                    self.next_token()?;
                    end = end.spanning(self.next_token()?.range());
                    path.push(segment);
                }
                Some((TokenKind::Lower(name), true)) => {
                    self.next_token()?;
                    end = end.spanning(self.next_token()?.range());
                    return Ok(Expression::new(
                        end,
                        ExpressionKind::FunctionOrValue { module: path, name },
                    ));
                }
                _ => break,
            }
        }
        let name = path.pop().expect("path is non-empty");
        Ok(Expression::new(
            end,
            ExpressionKind::FunctionOrValue { module: path, name },
        ))
    }

    fn parse_paren_group(&mut self, open: Range) -> Result<Expression, ParseError> {
        if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::RParen)) {
            let close = self.next_token()?;
            return Ok(Expression::new(
                open.spanning(close.range()),
                ExpressionKind::Unit,
            ));
        }
        // an operator section like (+) or (::)
        if matches!(
            self.peek().map(|t| &t.kind),
            Some(TokenKind::Operator(_) | TokenKind::Pipe | TokenKind::Equals)
        ) && matches!(self.peek_at(1).map(|t| &t.kind), Some(TokenKind::RParen))
        {
            let operator = self.operator_name()?;
            let close = self.next_token()?;
            return Ok(Expression::new(
                open.spanning(close.range()),
                ExpressionKind::PrefixOperator(operator),
            ));
        }
        let (mut items, end) = self.parse_comma_separated(TokenKind::RParen)?;
        let range = open.spanning(Range::new(end, end));
        match items.len() {
            1 => Ok(Expression::new(
                range,
                ExpressionKind::Parenthesized(Box::new(items.pop().expect("one item"))),
            )),
            _ => Ok(Expression::new(range, ExpressionKind::Tuple(items))),
        }
    }

    fn parse_comma_separated(
        &mut self,
        closer: TokenKind,
    ) -> Result<(Vec<Expression>, Position), ParseError> {
        let mut items = Vec::new();
        if self.peek().is_some_and(|t| t.kind == closer) {
            let close = self.next_token()?;
            return Ok((items, close.end()));
        }
        loop {
            items.push(self.parse_expression(0)?);
            let token = self.next_token()?;
            if token.kind == closer {
                return Ok((items, token.end()));
            }
            if token.kind != TokenKind::Comma {
                return Err(ParseError::syntax(
                    "expected ',' or a closing delimiter",
                    token.start(),
                ));
            }
        }
    }

    fn parse_record(&mut self, open: Range) -> Result<Expression, ParseError> {
        if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::RBrace)) {
            let close = self.next_token()?;
            return Ok(Expression::new(
                open.spanning(close.range()),
                ExpressionKind::RecordLiteral(Vec::new()),
            ));
        }
        // `{ name | ... }` is an update, `{ name = ... }` a literal
        let is_update = matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Lower(_)))
            && matches!(self.peek_at(1).map(|t| &t.kind), Some(TokenKind::Pipe));
        if is_update {
            let record_name = self.lower_name("a record name")?;
            self.expect(&TokenKind::Pipe, "'|'")?;
            let (fields, end) = self.parse_record_fields()?;
            return Ok(Expression::new(
                open.spanning(Range::new(end, end)),
                ExpressionKind::RecordUpdate { record_name, fields },
            ));
        }
        let (fields, end) = self.parse_record_fields()?;
        Ok(Expression::new(
            open.spanning(Range::new(end, end)),
            ExpressionKind::RecordLiteral(fields),
        ))
    }

    fn parse_record_fields(&mut self) -> Result<(Vec<(String, Expression)>, Position), ParseError> {
        let mut fields = Vec::new();
        loop {
            let name = self.lower_name("a field name")?;
            self.expect(&TokenKind::Equals, "'='")?;
            let value = self.parse_expression(0)?;
            fields.push((name, value));
            let token = self.next_token()?;
            match token.kind {
                TokenKind::Comma => {}
                TokenKind::RBrace => return Ok((fields, token.end())),
                _ => {
                    return Err(ParseError::syntax(
                        "expected ',' or '}' in record",
                        token.start(),
                    ));
                }
            }
        }
    }

    fn parse_lambda(&mut self, floor: u32) -> Result<Expression, ParseError> {
        let backslash = self.next_token()?;
        let mut parameters = vec![self.parse_pattern_atom(floor)?];
        while !matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Arrow)) {
            parameters.push(self.parse_pattern_atom(floor)?);
        }
        self.expect(&TokenKind::Arrow, "'->'")?;
        let body = self.parse_expression(floor)?;
        let range = backslash.range().spanning(body.range);
        Ok(Expression::new(
            range,
            ExpressionKind::Lambda {
                parameters,
                body: Box::new(body),
            },
        ))
    }

    fn parse_if(&mut self, floor: u32) -> Result<Expression, ParseError> {
        let kw = self.next_token()?;
        let condition = self.parse_expression(floor)?;
        self.expect(&TokenKind::KwThen, "keyword 'then'")?;
        let then_branch = self.parse_expression(floor)?;
        self.expect(&TokenKind::KwElse, "keyword 'else'")?;
        let else_branch = self.parse_expression(floor)?;
        let range = kw.range().spanning(else_branch.range);
        Ok(Expression::new(
            range,
            ExpressionKind::If {
                condition: Box::new(condition),
                then_branch: Box::new(then_branch),
                else_branch: Box::new(else_branch),
            },
        ))
    }

    fn parse_case(&mut self, floor: u32) -> Result<Expression, ParseError> {
        let kw = self.next_token()?;
        let subject = self.parse_expression(floor)?;
        self.expect(&TokenKind::KwOf, "keyword 'of'")?;
        let branch_column = self
            .peek_within(floor)
            .ok_or_else(|| self.error_here("expected at least one case branch"))?
            .column;
        let mut branches = Vec::new();
        let mut end = subject.range;
        while self
            .peek()
            .is_some_and(|t| t.column == branch_column && t.column > floor)
        {
            let pattern = self.parse_pattern(branch_column - 1)?;
            self.expect(&TokenKind::Arrow, "'->'")?;
            let body = self.parse_expression(branch_column)?;
            end = body.range;
            branches.push((pattern, body));
        }
        if branches.is_empty() {
            return Err(self.error_here("expected at least one case branch"));
        }
        Ok(Expression::new(
            kw.range().spanning(end),
            ExpressionKind::CaseOf {
                subject: Box::new(subject),
                branches,
            },
        ))
    }

    fn parse_let(&mut self, floor: u32) -> Result<Expression, ParseError> {
        let kw = self.next_token()?;
        let binding_column = self
            .peek_within(floor)
            .ok_or_else(|| self.error_here("expected let bindings"))?
            .column;
        let mut declarations = Vec::new();
        loop {
            match self.peek().map(|t| &t.kind) {
                Some(TokenKind::KwIn) => {
                    self.next_token()?;
                    break;
                }
                Some(_) if self.peek().is_some_and(|t| t.column == binding_column) => {
                    if let Some(declaration) = self.parse_let_declaration(binding_column)? {
                        declarations.push(declaration);
                    }
                }
                _ => return Err(self.error_here("expected a let binding or 'in'")),
            }
        }
        let body = self.parse_expression(floor)?;
        let range = kw.range().spanning(body.range);
        Ok(Expression::new(
            range,
            ExpressionKind::LetIn {
                declarations,
                body: Box::new(body),
            },
        ))
    }

    fn parse_let_declaration(&mut self, floor: u32) -> Result<Option<LetDeclaration>, ParseError> {
        if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Lower(_))) {
            let name = self.lower_name("a binding name")?;
            if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Colon)) {
                self.next_token()?;
                self.skip_type(floor);
                return Ok(None);
            }
            let mut arguments = Vec::new();
            while !matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Equals)) {
                arguments.push(self.parse_pattern_atom(floor)?);
            }
            self.expect(&TokenKind::Equals, "'='")?;
            let body = self.parse_expression(floor)?;
            return Ok(Some(LetDeclaration::Function(FunctionDeclaration {
                name,
                arguments,
                body,
            })));
        }
        let pattern = self.parse_pattern(floor)?;
        self.expect(&TokenKind::Equals, "'='")?;
        let expression = self.parse_expression(floor)?;
        Ok(Some(LetDeclaration::Destructuring { pattern, expression }))
    }

    // === patterns ===========================================================

    /// A full pattern: cons chains, tag applications, and `as` bindings.
    fn parse_pattern(&mut self, floor: u32) -> Result<Pattern, ParseError> {
        let head = self.parse_pattern_apply(floor)?;
        // `::` chains are right-associative
        let pattern = if matches!(
            self.peek_within(floor).map(|t| &t.kind),
            Some(TokenKind::Operator(op)) if op == "::"
        ) {
            self.next_token()?;
            let tail = self.parse_pattern(floor)?;
            let range = head.range.spanning(tail.range);
            Pattern::new(
                range,
                PatternKind::UnCons {
                    head: Box::new(head),
                    tail: Box::new(tail),
                },
            )
        } else {
            head
        };
        if matches!(self.peek_within(floor).map(|t| &t.kind), Some(TokenKind::KwAs)) {
            self.next_token()?;
            let name = self.lower_name("a pattern alias")?;
            let range = pattern.range;
            return Ok(Pattern::new(
                range,
                PatternKind::As {
                    pattern: Box::new(pattern),
                    name,
                },
            ));
        }
        Ok(pattern)
    }

    /// A pattern with tag arguments allowed: `Just x`, `Node left right`.
    fn parse_pattern_apply(&mut self, floor: u32) -> Result<Pattern, ParseError> {
        if matches!(self.peek_within(floor).map(|t| &t.kind), Some(TokenKind::Upper(_))) {
            let token = self.next_token()?;
            let token_range = token.range();
            let TokenKind::Upper(first) = token.kind else { unreachable!() };
            let (module, name, mut range) = self.parse_pattern_qualified(first, token_range)?;
            let mut arguments = Vec::new();
            while self.next_starts_pattern_atom(floor) {
                let argument = self.parse_pattern_atom(floor)?;
                range = range.spanning(argument.range);
                arguments.push(argument);
            }
            return Ok(Pattern::new(
                range,
                PatternKind::Named {
                    module,
                    name,
                    arguments,
                },
            ));
        }
        self.parse_pattern_atom(floor)
    }

    fn parse_pattern_qualified(
        &mut self,
        first: String,
        range: Range,
    ) -> Result<(Vec<String>, String, Range), ParseError> {
        let mut path = vec![first];
        let mut end = range;
        while matches!(
            self.peek().map(|t| (&t.kind, t.adjacent)),
            Some((TokenKind::Dot, true))
        ) && matches!(
            self.peek_at(1).map(|t| (&t.kind, t.adjacent)),
            Some((TokenKind::Upper(_), true))
        ) {
            self.next_token()?;
            let token = self.next_token()?;
            let token_range = token.range();
            let TokenKind::Upper(segment) = token.kind else { unreachable!() };
            end = end.spanning(token_range);
            path.push(segment);
        }
        let name = path.pop().expect("path is non-empty");
        Ok((path, name, end))
    }

    fn next_starts_pattern_atom(&self, floor: u32) -> bool {
        let Some(token) = self.peek_within(floor) else {
            return false;
        };
        matches!(
            token.kind,
            TokenKind::Lower(_)
                | TokenKind::Upper(_)
                | TokenKind::Underscore
                | TokenKind::Int(_)
                | TokenKind::Float(_)
                | TokenKind::Character(_)
                | TokenKind::Str(_)
                | TokenKind::LParen
                | TokenKind::LBracket
                | TokenKind::LBrace
        ) || matches!(&token.kind, TokenKind::Operator(op) if op == "-")
    }

    /// An atomic pattern: usable as a function argument or tag argument.
    fn parse_pattern_atom(&mut self, floor: u32) -> Result<Pattern, ParseError> {
        let token = self.next_token()?;
        let range = token.range();
        match token.kind {
            TokenKind::Underscore => Ok(Pattern::new(range, PatternKind::All)),
            TokenKind::Lower(name) => Ok(Pattern::new(range, PatternKind::Var(name))),
            TokenKind::Upper(first) => {
                let (module, name, range) = self.parse_pattern_qualified(first, range)?;
                Ok(Pattern::new(
                    range,
                    PatternKind::Named {
                        module,
                        name,
                        arguments: Vec::new(),
                    },
                ))
            }
            TokenKind::Int(n) => Ok(Pattern::new(range, PatternKind::Int(n))),
            TokenKind::Float(x) => Ok(Pattern::new(range, PatternKind::Float(x))),
            TokenKind::Character(c) => Ok(Pattern::new(range, PatternKind::Character(c))),
            TokenKind::Str(s) => Ok(Pattern::new(range, PatternKind::StringLiteral(s))),
            TokenKind::Operator(op) if op == "-" => {
                let operand = self.next_token()?;
                let operand_range = operand.range();
                match operand.kind {
                    TokenKind::Int(n) => Ok(Pattern::new(
                        range.spanning(operand_range),
                        PatternKind::Int(-n),
                    )),
                    _ => Err(ParseError::syntax(
                        "expected an integer after '-' in pattern",
                        operand.start(),
                    )),
                }
            }
            TokenKind::LParen => {
                if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::RParen)) {
                    let close = self.next_token()?;
                    return Ok(Pattern::new(
                        range.spanning(close.range()),
                        PatternKind::Unit,
                    ));
                }
                let mut items = vec![self.parse_pattern(0)?];
                loop {
                    let token = self.next_token()?;
                    match token.kind {
                        TokenKind::RParen => {
                            let range = range.spanning(token.range());
                            if items.len() == 1 {
                                return Ok(Pattern::new(
                                    range,
                                    PatternKind::Parenthesized(Box::new(
                                        items.pop().expect("one item"),
                                    )),
                                ));
                            }
                            return Ok(Pattern::new(range, PatternKind::Tuple(items)));
                        }
                        TokenKind::Comma => items.push(self.parse_pattern(0)?),
                        _ => {
                            return Err(ParseError::syntax(
                                "expected ',' or ')' in pattern",
                                token.start(),
                            ));
                        }
                    }
                }
            }
            TokenKind::LBracket => {
                if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::RBracket)) {
                    let close = self.next_token()?;
                    return Ok(Pattern::new(
                        range.spanning(close.range()),
                        PatternKind::List(Vec::new()),
                    ));
                }
                let mut items = vec![self.parse_pattern(0)?];
                loop {
                    let token = self.next_token()?;
                    match token.kind {
                        TokenKind::RBracket => {
                            return Ok(Pattern::new(
                                range.spanning(token.range()),
                                PatternKind::List(items),
                            ));
                        }
                        TokenKind::Comma => items.push(self.parse_pattern(0)?),
                        _ => {
                            return Err(ParseError::syntax(
                                "expected ',' or ']' in pattern",
                                token.start(),
                            ));
                        }
                    }
                }
            }
            TokenKind::LBrace => {
                let mut fields = Vec::new();
                if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::RBrace)) {
                    let close = self.next_token()?;
                    return Ok(Pattern::new(
                        range.spanning(close.range()),
                        PatternKind::Record(fields),
                    ));
                }
                loop {
                    fields.push(self.lower_name("a field name in record pattern")?);
                    let token = self.next_token()?;
                    match token.kind {
                        TokenKind::RBrace => {
                            return Ok(Pattern::new(
                                range.spanning(token.range()),
                                PatternKind::Record(fields),
                            ));
                        }
                        TokenKind::Comma => {}
                        _ => {
                            return Err(ParseError::syntax(
                                "expected ',' or '}' in record pattern",
                                token.start(),
                            ));
                        }
                    }
                }
            }
            other => Err(ParseError::syntax(
                format!("unexpected token {other:?} in pattern"),
                range.start,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{parse_declaration_text, parse_expression_text, parse_module};
    use crate::syntax::{
        Declaration, Exposing, ExpressionKind, LetDeclaration, PatternKind,
    };

    #[test]
    fn parses_a_minimal_module() {
        let file = parse_module("module M exposing (f)\n\nf x =\n    x\n").unwrap();
        assert_eq!(file.module.name, ["M"]);
        assert_eq!(file.declarations.len(), 1);
        let Declaration::Function(f) = &file.declarations[0] else {
            panic!("expected a function declaration")
        };
        assert_eq!(f.name, "f");
        assert_eq!(f.arguments.len(), 1);
    }

    #[test]
    fn annotations_are_skipped() {
        let file = parse_module(
            "module M exposing (..)\n\nf : Int -> Int\nf x =\n    x\n\ng : Int\ng =\n    1\n",
        )
        .unwrap();
        assert_eq!(file.declarations.len(), 2);
        assert_eq!(file.module.exposing, Exposing::All);
    }

    #[test]
    fn operator_chain_is_right_leaning_in_source_order() {
        let expr = parse_expression_text("1 + 2 * 3").unwrap();
        let ExpressionKind::OperatorApplication { operator, right, .. } = expr.kind else {
            panic!("expected an operator application")
        };
        assert_eq!(operator, "+");
        assert!(matches!(
            right.kind,
            ExpressionKind::OperatorApplication { .. }
        ));
    }

    #[test]
    fn case_branches_align_by_column() {
        let expr = parse_expression_text(
            "case xs of\n    [] ->\n        0\n    x :: rest ->\n        x\n",
        )
        .unwrap();
        let ExpressionKind::CaseOf { branches, .. } = expr.kind else {
            panic!("expected case-of")
        };
        assert_eq!(branches.len(), 2);
        assert!(matches!(branches[0].0.kind, PatternKind::List(ref items) if items.is_empty()));
        assert!(matches!(branches[1].0.kind, PatternKind::UnCons { .. }));
    }

    #[test]
    fn let_bindings_support_functions_and_destructuring() {
        let expr = parse_expression_text(
            "let\n    ( a, b ) =\n        p\n\n    go n =\n        n\nin\ngo a",
        )
        .unwrap();
        let ExpressionKind::LetIn { declarations, .. } = expr.kind else {
            panic!("expected let-in")
        };
        assert_eq!(declarations.len(), 2);
        assert!(matches!(declarations[0], LetDeclaration::Destructuring { .. }));
        assert!(matches!(declarations[1], LetDeclaration::Function(_)));
    }

    #[test]
    fn field_access_and_accessor_functions() {
        let access = parse_expression_text("person.name").unwrap();
        assert!(matches!(access.kind, ExpressionKind::FieldAccess { .. }));
        let accessor = parse_expression_text(".name").unwrap();
        assert!(matches!(accessor.kind, ExpressionKind::FieldAccessFunction(_)));
        let qualified = parse_expression_text("List.map").unwrap();
        let ExpressionKind::FunctionOrValue { module, name } = qualified.kind else {
            panic!("expected a qualified reference")
        };
        assert_eq!(module, ["List"]);
        assert_eq!(name, "map");
    }

    #[test]
    fn negation_requires_adjacency() {
        let negated = parse_expression_text("-x").unwrap();
        assert!(matches!(negated.kind, ExpressionKind::Negation(_)));
        let subtraction = parse_expression_text("a - b").unwrap();
        assert!(matches!(
            subtraction.kind,
            ExpressionKind::OperatorApplication { ref operator, .. } if operator == "-"
        ));
        let applied_negation = parse_expression_text("f -x").unwrap();
        let ExpressionKind::Application(parts) = applied_negation.kind else {
            panic!("expected an application")
        };
        assert!(matches!(parts[1].kind, ExpressionKind::Negation(_)));
    }

    #[test]
    fn custom_type_variant_arity_counts_atoms() {
        let file = parse_module(
            "module M exposing (..)\n\ntype Tree a\n    = Leaf a\n    | Node (Tree a) (Tree a)\n    | Empty\n",
        )
        .unwrap();
        let Declaration::CustomType(t) = &file.declarations[0] else {
            panic!("expected a custom type")
        };
        let arities: Vec<_> = t.variants.iter().map(|v| (v.name.as_str(), v.arity)).collect();
        assert_eq!(arities, [("Leaf", 1), ("Node", 2), ("Empty", 0)]);
    }

    #[test]
    fn record_alias_captures_field_names() {
        let file = parse_module(
            "module M exposing (..)\n\ntype alias Point =\n    { x : Int\n    , y : Int\n    }\n",
        )
        .unwrap();
        let Declaration::TypeAlias(alias) = &file.declarations[0] else {
            panic!("expected a type alias")
        };
        assert_eq!(alias.record_fields.as_deref(), Some(["x".to_owned(), "y".to_owned()].as_slice()));
    }

    #[test]
    fn infix_declarations() {
        let decl = parse_declaration_text("infix right 5 (++) = append").unwrap();
        let Declaration::Infix(infix) = decl else {
            panic!("expected an infix declaration")
        };
        assert_eq!(infix.operator, "++");
        assert_eq!(infix.precedence, 5);
        assert_eq!(infix.function, "append");
    }

    #[test]
    fn record_update_and_literal() {
        let update = parse_expression_text("{ point | x = 1 }").unwrap();
        assert!(matches!(update.kind, ExpressionKind::RecordUpdate { .. }));
        let literal = parse_expression_text("{ x = 1, y = 2 }").unwrap();
        assert!(matches!(literal.kind, ExpressionKind::RecordLiteral(ref fields) if fields.len() == 2));
    }

    #[test]
    fn triple_quoted_strings() {
        let expr = parse_expression_text("\"\"\"line one\n\"quoted\"\nline two\"\"\"").unwrap();
        let ExpressionKind::StringLiteral(text) = expr.kind else {
            panic!("expected a string literal")
        };
        assert_eq!(text, "line one\n\"quoted\"\nline two");
    }
}
