use crate::error::{Diagnostic, Span};
use tracing::trace;

/// Every operator the scanner can produce, plus the tags the tree-builder
/// rewrites operators into (unary forms, calls, array access).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatorKind {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Power,
    Positive,
    Negative,
    Factorial,

    // Logic
    LogicNot,
    LogicAnd,
    LogicOr,
    LogicXor,

    // Bitwise
    BitAnd,
    BitOr,
    BitXor,
    BitNot,

    // Comparison
    Equal,
    NotEqual,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,

    // Assignment and mutation
    Assign,
    PostIncrement,
    PostDecrement,
    PreIncrement,
    PreDecrement,

    // Punctuation
    Comma,
    Colon,
    Semicolon,
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    LeftBrace,
    RightBrace,

    // Produced by the tree-builder only
    Call,
    Access,
}

impl OperatorKind {
    pub fn symbol(&self) -> &'static str {
        match self {
            OperatorKind::Add | OperatorKind::Positive => "+",
            OperatorKind::Sub | OperatorKind::Negative => "-",
            OperatorKind::Mul => "*",
            OperatorKind::Div => "/",
            OperatorKind::Mod => "%",
            OperatorKind::Power => "^",
            OperatorKind::Factorial | OperatorKind::LogicNot => "!",
            OperatorKind::LogicAnd => "&&",
            OperatorKind::LogicOr => "||",
            OperatorKind::LogicXor => "^^",
            OperatorKind::BitAnd => "&",
            OperatorKind::BitOr => "|",
            OperatorKind::BitXor => "$$",
            OperatorKind::BitNot => "~",
            OperatorKind::Equal => "==",
            OperatorKind::NotEqual => "!=",
            OperatorKind::Less => "<",
            OperatorKind::Greater => ">",
            OperatorKind::LessEqual => "<=",
            OperatorKind::GreaterEqual => ">=",
            OperatorKind::Assign => "=",
            OperatorKind::PostIncrement | OperatorKind::PreIncrement => "++",
            OperatorKind::PostDecrement | OperatorKind::PreDecrement => "--",
            OperatorKind::Comma => ",",
            OperatorKind::Colon => ":",
            OperatorKind::Semicolon => ";",
            OperatorKind::LeftParen | OperatorKind::Call => "(",
            OperatorKind::RightParen => ")",
            OperatorKind::LeftBracket | OperatorKind::Access => "[",
            OperatorKind::RightBracket => "]",
            OperatorKind::LeftBrace => "{",
            OperatorKind::RightBrace => "}",
        }
    }

    pub fn is_open_bracket(&self) -> bool {
        matches!(
            self,
            OperatorKind::LeftParen | OperatorKind::LeftBracket | OperatorKind::LeftBrace
        )
    }
}

// Two-character symbols come first so the table scan is a longest match.
const OPERATORS: &[(&str, OperatorKind)] = &[
    ("++", OperatorKind::PostIncrement),
    ("--", OperatorKind::PostDecrement),
    ("==", OperatorKind::Equal),
    ("!=", OperatorKind::NotEqual),
    ("<>", OperatorKind::NotEqual),
    (">=", OperatorKind::GreaterEqual),
    ("<=", OperatorKind::LessEqual),
    ("&&", OperatorKind::LogicAnd),
    ("||", OperatorKind::LogicOr),
    ("^^", OperatorKind::LogicXor),
    ("~~", OperatorKind::LogicNot),
    ("$$", OperatorKind::BitXor),
    ("+", OperatorKind::Add),
    ("-", OperatorKind::Sub),
    ("*", OperatorKind::Mul),
    ("/", OperatorKind::Div),
    ("%", OperatorKind::Mod),
    ("^", OperatorKind::Power),
    ("=", OperatorKind::Assign),
    ("<", OperatorKind::Less),
    (">", OperatorKind::Greater),
    ("!", OperatorKind::Factorial),
    ("~", OperatorKind::BitNot),
    ("&", OperatorKind::BitAnd),
    ("|", OperatorKind::BitOr),
    (",", OperatorKind::Comma),
    (";", OperatorKind::Semicolon),
    (":", OperatorKind::Colon),
    ("(", OperatorKind::LeftParen),
    (")", OperatorKind::RightParen),
    ("[", OperatorKind::LeftBracket),
    ("]", OperatorKind::RightBracket),
    ("{", OperatorKind::LeftBrace),
    ("}", OperatorKind::RightBrace),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    If,
    Elif,
    Else,
    For,
    While,
    Continue,
    Break,
    Return,
    Exit,
    Goto,
    Var,
}

impl Keyword {
    pub fn from_ident(text: &str) -> Option<Self> {
        let keyword = match text {
            "if" => Keyword::If,
            "elif" => Keyword::Elif,
            "else" => Keyword::Else,
            "for" => Keyword::For,
            "while" => Keyword::While,
            "continue" => Keyword::Continue,
            "break" => Keyword::Break,
            "return" => Keyword::Return,
            "exit" => Keyword::Exit,
            "goto" => Keyword::Goto,
            "var" => Keyword::Var,
            _ => return None,
        };
        Some(keyword)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Keyword::If => "if",
            Keyword::Elif => "elif",
            Keyword::Else => "else",
            Keyword::For => "for",
            Keyword::While => "while",
            Keyword::Continue => "continue",
            Keyword::Break => "break",
            Keyword::Return => "return",
            Keyword::Exit => "exit",
            Keyword::Goto => "goto",
            Keyword::Var => "var",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Decimal(f64),
    /// Unescaped string contents.
    String(String),
    Operator(OperatorKind),
    Variable,
    Keyword(Keyword),
    Comment,
    /// Placeholder for an empty positional slot, e.g. the middle of `f(a,,c)`.
    Dummy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub row: usize,
    pub column: usize,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, text: String, row: usize, column: usize, span: Span) -> Self {
        Self {
            kind,
            text,
            row,
            column,
            span,
        }
    }

    pub fn dummy(row: usize, column: usize, span: Span) -> Self {
        Self::new(TokenKind::Dummy, String::new(), row, column, span)
    }

    pub fn operator(&self) -> Option<OperatorKind> {
        match self.kind {
            TokenKind::Operator(op) => Some(op),
            _ => None,
        }
    }

    pub fn keyword(&self) -> Option<Keyword> {
        match self.kind {
            TokenKind::Keyword(kw) => Some(kw),
            _ => None,
        }
    }

    pub fn is_operator(&self, op: OperatorKind) -> bool {
        self.operator() == Some(op)
    }

    /// Tokens that stand for a value on their own.
    pub fn is_value(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::Decimal(_) | TokenKind::String(_) | TokenKind::Variable | TokenKind::Dummy
        )
    }
}

/// Which token class the scanner tries first at the current position.
///
/// After a value the next token is most likely an operator; after an
/// operator it is most likely a value. This is what separates binary `-`
/// from a negative literal and postfix `!` from prefix `!`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOrder {
    NumberFirst,
    OperatorFirst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    Number,
    String,
    Identifier,
    Operator,
}

const NUMBER_FIRST: [Attempt; 4] = [
    Attempt::Number,
    Attempt::String,
    Attempt::Identifier,
    Attempt::Operator,
];

const OPERATOR_FIRST: [Attempt; 4] = [
    Attempt::Operator,
    Attempt::String,
    Attempt::Identifier,
    Attempt::Number,
];

// Exponents beyond this already saturate an f64 to zero or infinity.
const MAX_EXPONENT: u32 = 400;

pub struct Scanner<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    row: usize,
    column: usize,
    order: ReadOrder,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Scanner<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            pos: 0,
            row: 1,
            column: 1,
            order: ReadOrder::NumberFirst,
            diagnostics: Vec::new(),
        }
    }

    pub fn read_order(&self) -> ReadOrder {
        self.order
    }

    /// Non-fatal problems found so far (unterminated strings).
    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    /// Scan the whole input. Stops at the first unrecoverable error.
    pub fn scan_tokens(&mut self) -> Result<Vec<Token>, Diagnostic> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }
        Ok(tokens)
    }

    /// Produce the next token, `Ok(None)` at end of input.
    pub fn next_token(&mut self) -> Result<Option<Token>, Diagnostic> {
        self.skip_whitespace();

        if self.is_at_end() {
            return Ok(None);
        }

        if let Some(token) = self.comment()? {
            return Ok(Some(token));
        }

        let attempts = match self.order {
            ReadOrder::NumberFirst => NUMBER_FIRST,
            ReadOrder::OperatorFirst => OPERATOR_FIRST,
        };

        for attempt in attempts {
            let found = match attempt {
                Attempt::Number => self.number(),
                Attempt::String => self.string(),
                Attempt::Identifier => self.identifier(),
                Attempt::Operator => self.operator(),
            };
            if let Some(token) = found {
                self.order = self.order_after(&token);
                trace!(text = %token.text, row = token.row, column = token.column, "token");
                return Ok(Some(token));
            }
        }

        let c = self.source[self.pos..].chars().next().unwrap_or('\0');
        Err(Diagnostic::scan_error(
            self.row,
            self.column,
            Span::new(self.pos, self.pos + c.len_utf8()),
            format!("Unexpected character: '{}'", c),
        ))
    }

    fn order_after(&self, token: &Token) -> ReadOrder {
        match &token.kind {
            TokenKind::Decimal(_) | TokenKind::String(_) | TokenKind::Variable => ReadOrder::OperatorFirst,
            TokenKind::Keyword(_) => ReadOrder::NumberFirst,
            TokenKind::Comment | TokenKind::Dummy => self.order,
            TokenKind::Operator(op) => match op {
                OperatorKind::RightParen | OperatorKind::RightBracket | OperatorKind::Factorial => {
                    ReadOrder::OperatorFirst
                }
                // `x++` keeps looking for an operator, `++x` for a value.
                OperatorKind::PostIncrement | OperatorKind::PostDecrement => self.order,
                _ => ReadOrder::NumberFirst,
            },
        }
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn peek_at(&self, offset: usize) -> u8 {
        self.bytes.get(self.pos + offset).copied().unwrap_or(0)
    }

    fn skip_whitespace(&mut self) {
        while !self.is_at_end() && self.peek_at(0).is_ascii_whitespace() {
            self.advance(1);
        }
    }

    /// Move the cursor forward, keeping row and column current.
    fn advance(&mut self, len: usize) {
        let end = (self.pos + len).min(self.bytes.len());
        for &b in &self.bytes[self.pos..end] {
            if b == b'\n' {
                self.row += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        self.pos = end;
    }

    fn make_token(&mut self, kind: TokenKind, len: usize) -> Token {
        let start = self.pos;
        let (row, column) = (self.row, self.column);
        self.advance(len);
        Token::new(
            kind,
            self.source[start..self.pos].to_string(),
            row,
            column,
            Span::new(start, self.pos),
        )
    }

    fn comment(&mut self) -> Result<Option<Token>, Diagnostic> {
        if self.peek_at(0) != b'/' {
            return Ok(None);
        }
        match self.peek_at(1) {
            b'/' => {
                let rest = &self.bytes[self.pos..];
                let len = rest.iter().position(|&b| b == b'\n').unwrap_or(rest.len());
                Ok(Some(self.make_token(TokenKind::Comment, len)))
            }
            b'*' => {
                let rest = &self.bytes[self.pos + 2..];
                match rest.windows(2).position(|w| w == b"*/") {
                    Some(idx) => Ok(Some(self.make_token(TokenKind::Comment, idx + 4))),
                    None => Err(Diagnostic::scan_error(
                        self.row,
                        self.column,
                        Span::new(self.pos, self.bytes.len()),
                        "Unterminated block comment".to_string(),
                    )),
                }
            }
            _ => Ok(None),
        }
    }

    fn number(&mut self) -> Option<Token> {
        let (value, len) = scan_number(&self.bytes[self.pos..])?;
        Some(self.make_token(TokenKind::Decimal(value), len))
    }

    fn string(&mut self) -> Option<Token> {
        if self.peek_at(0) != b'"' {
            return None;
        }

        let rest = &self.bytes[self.pos..];
        let mut value = Vec::new();
        let mut i = 1;
        let mut terminated = false;

        while i < rest.len() {
            match rest[i] {
                b'"' => {
                    i += 1;
                    terminated = true;
                    break;
                }
                b'\n' => break,
                b'\\' if i + 1 < rest.len() && rest[i + 1] != b'\n' => {
                    value.push(match rest[i + 1] {
                        b'n' => b'\n',
                        b't' => b'\t',
                        other => other,
                    });
                    i += 2;
                }
                b'\\' => {
                    i += 1;
                }
                other => {
                    value.push(other);
                    i += 1;
                }
            }
        }

        if !terminated {
            self.diagnostics.push(Diagnostic::scan_error(
                self.row,
                self.column,
                Span::new(self.pos, self.pos + i),
                "Unterminated string".to_string(),
            ));
        }

        let value = String::from_utf8_lossy(&value).into_owned();
        Some(self.make_token(TokenKind::String(value), i))
    }

    fn identifier(&mut self) -> Option<Token> {
        let rest = &self.bytes[self.pos..];
        match rest.first() {
            Some(c) if c.is_ascii_alphabetic() || *c == b'_' => {}
            _ => return None,
        }
        let len = rest
            .iter()
            .position(|c| !(c.is_ascii_alphanumeric() || *c == b'_'))
            .unwrap_or(rest.len());

        let text = &self.source[self.pos..self.pos + len];
        let kind = match Keyword::from_ident(text) {
            Some(keyword) => TokenKind::Keyword(keyword),
            None => TokenKind::Variable,
        };
        Some(self.make_token(kind, len))
    }

    fn operator(&mut self) -> Option<Token> {
        let rest = &self.bytes[self.pos..];
        let (symbol, op) = OPERATORS
            .iter()
            .find(|(symbol, _)| rest.starts_with(symbol.as_bytes()))?;

        let op = match op {
            OperatorKind::Factorial if self.order == ReadOrder::NumberFirst => OperatorKind::LogicNot,
            other => *other,
        };
        Some(self.make_token(TokenKind::Operator(op), symbol.len()))
    }
}

/// Number state machine: optional sign, integer digits, optional `.` and
/// fraction digits, optional exponent. Returns the value and the number of
/// bytes consumed, or `None` when no digit was found.
fn scan_number(bytes: &[u8]) -> Option<(f64, usize)> {
    let digit = |i: usize| bytes.get(i).filter(|b| b.is_ascii_digit()).map(|b| f64::from(b - b'0'));

    let mut i = 0;
    let mut negative = false;
    if let Some(sign @ (b'+' | b'-')) = bytes.first() {
        negative = *sign == b'-';
        i = 1;
    }

    let mut value = 0.0_f64;
    let mut digits = 0;
    while let Some(d) = digit(i) {
        value = value * 10.0 + d;
        digits += 1;
        i += 1;
    }

    if bytes.get(i) == Some(&b'.') {
        let mut j = i + 1;
        let mut step = 1.0_f64;
        let mut fraction = 0.0_f64;
        let mut fraction_digits = 0;
        while let Some(d) = digit(j) {
            step /= 10.0;
            fraction += d * step;
            fraction_digits += 1;
            j += 1;
        }
        if digits + fraction_digits > 0 {
            value += fraction;
            digits += fraction_digits;
            i = j;
        }
    }

    if digits == 0 {
        return None;
    }

    if let Some(b'e' | b'E') = bytes.get(i) {
        let mut j = i + 1;
        let mut exp_negative = false;
        if let Some(sign @ (b'+' | b'-')) = bytes.get(j) {
            exp_negative = *sign == b'-';
            j += 1;
        }
        let mut exponent: u32 = 0;
        let mut exp_digits = 0;
        while let Some(b) = bytes.get(j).filter(|b| b.is_ascii_digit()) {
            exponent = exponent.saturating_mul(10).saturating_add(u32::from(b - b'0'));
            exp_digits += 1;
            j += 1;
        }
        // A bare `e` is left for the next token.
        if exp_digits > 0 {
            for _ in 0..exponent.min(MAX_EXPONENT) {
                if exp_negative {
                    value /= 10.0;
                } else {
                    value *= 10.0;
                }
            }
            i = j;
        }
    }

    Some((if negative { -value } else { value }, i))
}
