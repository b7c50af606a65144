//! Strict decoder for the array literals embedded in match-result feeds.
//!
//! Only arrays, quoted strings, numbers and `null` are accepted. The feed text is never
//! evaluated: identifiers, operators, calls and objects are rejected by the tokenizer.
//!
//! Feeds elide values between delimiters (`[,1]`, `[1,,2]`, `[1,]`). The tokenizer emits an
//! explicit [`Token::Hole`] for every elided position before the decoder sees the stream, so
//! positional field indexes stay aligned with the source tuple layout.

use std::iter::Peekable;
use std::vec::IntoIter;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Int(i64),
    Float(f64),
    Str(String),
    Array(Vec<Literal>),
}

impl Literal {
    pub fn is_null(&self) -> bool {
        matches!(self, Literal::Null)
    }

    pub fn as_array(&self) -> Option<&[Literal]> {
        match self {
            Literal::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Integer view of a scalar. Integral decimals and numeric strings are accepted.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Literal::Int(n) => Some(*n),
            Literal::Float(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => Some(*f as i64),
            Literal::Str(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
    }

    /// Canonical text of a scalar; `None` for `null` and arrays.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Literal::Int(n) => Some(n.to_string()),
            Literal::Float(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => {
                Some((*f as i64).to_string())
            }
            Literal::Float(f) => Some(f.to_string()),
            Literal::Str(s) => Some(s.clone()),
            Literal::Null | Literal::Array(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind} at byte {offset}")]
pub struct LiteralError {
    pub offset: usize,
    pub kind: LiteralErrorKind,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LiteralErrorKind {
    #[error("expected an array literal")]
    ExpectedArray,
    #[error("unexpected end of input")]
    UnexpectedEnd,
    #[error("unexpected character {0:?}")]
    UnexpectedChar(char),
    #[error("unexpected {0}")]
    UnexpectedToken(&'static str),
    #[error("unterminated string")]
    UnterminatedString,
    #[error("invalid escape sequence")]
    InvalidEscape,
    #[error("invalid number {0:?}")]
    InvalidNumber(String),
    #[error("identifier {0:?} is not a literal")]
    Identifier(String),
    #[error("trailing input after literal")]
    TrailingInput,
}

fn fail<T>(offset: usize, kind: LiteralErrorKind) -> Result<T, LiteralError> {
    Err(LiteralError { offset, kind })
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Open,
    Close,
    Comma,
    Hole,
    Null,
    Int(i64),
    Float(f64),
    Str(String),
}

impl Token {
    fn describe(&self) -> &'static str {
        match self {
            Token::Open => "'['",
            Token::Close => "']'",
            Token::Comma => "','",
            Token::Hole => "elided value",
            Token::Null => "null",
            Token::Int(_) | Token::Float(_) => "number",
            Token::Str(_) => "string",
        }
    }
}

#[derive(Debug)]
struct Spanned {
    token: Token,
    offset: usize,
}

struct Tokenizer<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Tokenizer<'a> {
    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_ws(&mut self) {
        while let Some(ch) = self.peek() {
            if !ch.is_whitespace() {
                break;
            }
            self.pos += ch.len_utf8();
        }
    }

    /// Tokenizes one complete top-level array and stops right after its closing bracket.
    fn array(mut self) -> Result<(Vec<Spanned>, usize), LiteralError> {
        self.skip_ws();
        if self.peek() != Some('[') {
            return fail(self.pos, LiteralErrorKind::ExpectedArray);
        }

        let mut tokens: Vec<Spanned> = Vec::new();
        let mut depth = 0usize;
        loop {
            self.skip_ws();
            let offset = self.pos;
            let Some(ch) = self.peek() else {
                return fail(offset, LiteralErrorKind::UnexpectedEnd);
            };
            let last = tokens.last().map(|t| &t.token);
            match ch {
                '[' => {
                    self.bump();
                    depth += 1;
                    tokens.push(Spanned { token: Token::Open, offset });
                }
                ']' => {
                    if matches!(last, Some(Token::Comma)) {
                        tokens.push(Spanned { token: Token::Hole, offset });
                    }
                    self.bump();
                    tokens.push(Spanned { token: Token::Close, offset });
                    depth -= 1;
                    if depth == 0 {
                        return Ok((tokens, self.pos));
                    }
                }
                ',' => {
                    if matches!(last, Some(Token::Open) | Some(Token::Comma)) {
                        tokens.push(Spanned { token: Token::Hole, offset });
                    }
                    self.bump();
                    tokens.push(Spanned { token: Token::Comma, offset });
                }
                '"' | '\'' => {
                    let text = self.string(ch)?;
                    tokens.push(Spanned { token: Token::Str(text), offset });
                }
                '-' | '+' | '.' | '0'..='9' => {
                    let token = self.number()?;
                    tokens.push(Spanned { token, offset });
                }
                c if c.is_alphabetic() || c == '_' || c == '$' => {
                    let word = self.word();
                    if word != "null" {
                        return fail(offset, LiteralErrorKind::Identifier(word.to_string()));
                    }
                    tokens.push(Spanned { token: Token::Null, offset });
                }
                other => return fail(offset, LiteralErrorKind::UnexpectedChar(other)),
            }
        }
    }

    fn word(&mut self) -> &'a str {
        let start = self.pos;
        while let Some(ch) = self.peek() {
            if !(ch.is_alphanumeric() || ch == '_' || ch == '$') {
                break;
            }
            self.pos += ch.len_utf8();
        }
        &self.src[start..self.pos]
    }

    fn number(&mut self) -> Result<Token, LiteralError> {
        let start = self.pos;
        while let Some(ch) = self.peek() {
            if !(ch.is_ascii_digit() || matches!(ch, '-' | '+' | '.' | 'e' | 'E')) {
                break;
            }
            self.pos += 1;
        }
        let text = &self.src[start..self.pos];
        let is_integral = !text.contains(['.', 'e', 'E']);
        if is_integral && let Ok(n) = text.parse::<i64>() {
            return Ok(Token::Int(n));
        }
        match text.parse::<f64>() {
            Ok(f) if f.is_finite() => Ok(Token::Float(f)),
            _ => fail(start, LiteralErrorKind::InvalidNumber(text.to_string())),
        }
    }

    fn string(&mut self, quote: char) -> Result<String, LiteralError> {
        let start = self.pos;
        self.bump();
        let mut out = String::new();
        loop {
            let Some(ch) = self.bump() else {
                return fail(start, LiteralErrorKind::UnterminatedString);
            };
            if ch == quote {
                return Ok(out);
            }
            if ch != '\\' {
                out.push(ch);
                continue;
            }
            let escape_at = self.pos - 1;
            let Some(esc) = self.bump() else {
                return fail(start, LiteralErrorKind::UnterminatedString);
            };
            match esc {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                'r' => out.push('\r'),
                'b' => out.push('\u{8}'),
                'f' => out.push('\u{c}'),
                'v' => out.push('\u{b}'),
                '0' => out.push('\0'),
                'x' => {
                    let code = self.hex(2, escape_at)?;
                    out.push(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER));
                }
                'u' => {
                    let ch = self.unicode_escape(escape_at)?;
                    out.push(ch);
                }
                // Line continuation.
                '\n' => {}
                other => out.push(other),
            }
        }
    }

    fn unicode_escape(&mut self, escape_at: usize) -> Result<char, LiteralError> {
        let high = self.hex(4, escape_at)?;
        if !(0xD800..0xDC00).contains(&high) {
            return Ok(char::from_u32(high).unwrap_or(char::REPLACEMENT_CHARACTER));
        }
        if !self.src[self.pos..].starts_with("\\u") {
            return Ok(char::REPLACEMENT_CHARACTER);
        }
        self.pos += 2;
        let low = self.hex(4, escape_at)?;
        if !(0xDC00..0xE000).contains(&low) {
            return Ok(char::REPLACEMENT_CHARACTER);
        }
        let code = 0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00);
        Ok(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER))
    }

    fn hex(&mut self, digits: usize, escape_at: usize) -> Result<u32, LiteralError> {
        let end = self.pos + digits;
        let Some(text) = self.src.get(self.pos..end) else {
            return fail(escape_at, LiteralErrorKind::InvalidEscape);
        };
        let Ok(code) = u32::from_str_radix(text, 16) else {
            return fail(escape_at, LiteralErrorKind::InvalidEscape);
        };
        self.pos = end;
        Ok(code)
    }
}

struct Decoder {
    tokens: Peekable<IntoIter<Spanned>>,
    end: usize,
}

impl Decoder {
    fn value(&mut self) -> Result<Literal, LiteralError> {
        let Some(Spanned { token, offset }) = self.tokens.next() else {
            return fail(self.end, LiteralErrorKind::UnexpectedEnd);
        };
        match token {
            Token::Open => self.array(),
            Token::Null | Token::Hole => Ok(Literal::Null),
            Token::Int(n) => Ok(Literal::Int(n)),
            Token::Float(f) => Ok(Literal::Float(f)),
            Token::Str(s) => Ok(Literal::Str(s)),
            other @ (Token::Close | Token::Comma) => {
                fail(offset, LiteralErrorKind::UnexpectedToken(other.describe()))
            }
        }
    }

    fn array(&mut self) -> Result<Literal, LiteralError> {
        let mut items = Vec::new();
        if self
            .tokens
            .peek()
            .is_some_and(|t| t.token == Token::Close)
        {
            self.tokens.next();
            return Ok(Literal::Array(items));
        }
        loop {
            items.push(self.value()?);
            match self.tokens.next() {
                Some(Spanned {
                    token: Token::Comma,
                    ..
                }) => continue,
                Some(Spanned {
                    token: Token::Close,
                    ..
                }) => return Ok(Literal::Array(items)),
                Some(Spanned { token, offset }) => {
                    return fail(offset, LiteralErrorKind::UnexpectedToken(token.describe()));
                }
                None => return fail(self.end, LiteralErrorKind::UnexpectedEnd),
            }
        }
    }
}

/// Decodes the array literal that starts at byte `start` of `src` (leading whitespace allowed).
/// Returns the value and the byte offset just past its closing bracket.
pub fn parse_array_at(src: &str, start: usize) -> Result<(Literal, usize), LiteralError> {
    let (tokens, end) = Tokenizer { src, pos: start }.array()?;
    let mut decoder = Decoder {
        tokens: tokens.into_iter().peekable(),
        end,
    };
    let value = decoder.value()?;
    if let Some(extra) = decoder.tokens.next() {
        return fail(extra.offset, LiteralErrorKind::UnexpectedToken(extra.token.describe()));
    }
    Ok((value, end))
}

/// Decodes a whole string holding a single array literal; a trailing `;` is tolerated.
pub fn parse_array(src: &str) -> Result<Literal, LiteralError> {
    let (value, end) = parse_array_at(src, 0)?;
    let rest = src[end..].trim();
    if !(rest.is_empty() || rest == ";") {
        return fail(end, LiteralErrorKind::TrailingInput);
    }
    Ok(value)
}
