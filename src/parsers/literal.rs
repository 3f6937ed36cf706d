//! Structured parser for JavaScript data literals embedded in feed scripts.
//!
//! The legacy bet site ships its meeting data and racecards as
//! `var x = [...];` statements. This parser accepts only the data subset
//! of JavaScript (objects, arrays, strings in either quote style, numbers,
//! `true`/`false`/`null`/`undefined`, bare object keys, trailing commas)
//! and produces a `serde_json::Value`. Anything else, such as a function
//! call or an expression, is a `FeedError::Literal`.

use serde_json::{Map, Number, Value};

use crate::types::FeedError;

/// Deepest array/object nesting accepted before the literal is rejected.
const MAX_DEPTH: usize = 128;

/// Parse a complete literal. Trailing whitespace and one `;` are allowed.
pub fn parse_literal(src: &str) -> Result<Value, FeedError> {
    let mut parser = LiteralParser {
        src,
        pos: 0,
        depth: 0,
    };
    let value = parser.value()?;
    parser.skip_ws();
    if parser.peek() == Some(';') {
        parser.pos += 1;
        parser.skip_ws();
    }
    if parser.pos < src.len() {
        return Err(parser.error("trailing characters after literal"));
    }
    Ok(value)
}

struct LiteralParser<'a> {
    src: &'a str,
    pos: usize,
    depth: usize,
}

impl<'a> LiteralParser<'a> {
    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn error(&self, message: &str) -> FeedError {
        FeedError::Literal {
            offset: self.pos,
            message: message.to_string(),
        }
    }

    fn expect(&mut self, want: char) -> Result<(), FeedError> {
        match self.bump() {
            Some(c) if c == want => Ok(()),
            _ => Err(self.error(&format!("expected '{want}'"))),
        }
    }

    fn skip_ws(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.pos += c.len_utf8();
                }
                Some('/') if self.src[self.pos..].starts_with("//") => {
                    let rest = &self.src[self.pos..];
                    self.pos += rest.find('\n').unwrap_or(rest.len());
                }
                Some('/') if self.src[self.pos..].starts_with("/*") => {
                    let rest = &self.src[self.pos + 2..];
                    self.pos += rest.find("*/").map(|i| i + 4).unwrap_or(rest.len() + 2);
                }
                _ => return,
            }
        }
    }

    fn value(&mut self) -> Result<Value, FeedError> {
        self.skip_ws();
        match self.peek() {
            Some('{') => self.nested(Self::object),
            Some('[') => self.nested(Self::array),
            Some(q @ ('"' | '\'')) => self.string(q).map(Value::String),
            Some(c) if c == '-' || c == '.' || c.is_ascii_digit() => self.number(),
            Some(c) if is_ident_start(c) => self.keyword(),
            Some(_) => Err(self.error("unexpected character")),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn nested(
        &mut self,
        parse: fn(&mut Self) -> Result<Value, FeedError>,
    ) -> Result<Value, FeedError> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error("nesting too deep"));
        }
        self.depth += 1;
        let value = parse(self);
        self.depth -= 1;
        value
    }

    fn object(&mut self) -> Result<Value, FeedError> {
        self.expect('{')?;
        let mut map = Map::new();
        loop {
            self.skip_ws();
            match self.peek() {
                Some('}') => {
                    self.pos += 1;
                    return Ok(Value::Object(map));
                }
                Some(q @ ('"' | '\'')) => {
                    let key = self.string(q)?;
                    self.entry(&mut map, key)?;
                }
                Some(c) if is_ident_start(c) || c.is_ascii_digit() => {
                    let key = self.identifier();
                    self.entry(&mut map, key)?;
                }
                _ => return Err(self.error("expected object key")),
            }
            self.skip_ws();
            match self.bump() {
                Some(',') => continue,
                Some('}') => return Ok(Value::Object(map)),
                _ => return Err(self.error("expected ',' or '}'")),
            }
        }
    }

    fn entry(&mut self, map: &mut Map<String, Value>, key: String) -> Result<(), FeedError> {
        self.skip_ws();
        self.expect(':')?;
        let value = self.value()?;
        map.insert(key, value);
        Ok(())
    }

    fn array(&mut self) -> Result<Value, FeedError> {
        self.expect('[')?;
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(']') {
                self.pos += 1;
                return Ok(Value::Array(items));
            }
            items.push(self.value()?);
            self.skip_ws();
            match self.bump() {
                Some(',') => continue,
                Some(']') => return Ok(Value::Array(items)),
                _ => return Err(self.error("expected ',' or ']'")),
            }
        }
    }

    fn string(&mut self, quote: char) -> Result<String, FeedError> {
        self.expect(quote)?;
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated string")),
                Some(c) if c == quote => return Ok(out),
                Some('\\') => {
                    let escaped = self.bump().ok_or_else(|| self.error("dangling escape"))?;
                    match escaped {
                        'n' => out.push('\n'),
                        't' => out.push('\t'),
                        'r' => out.push('\r'),
                        'b' => out.push('\u{8}'),
                        'f' => out.push('\u{c}'),
                        '0' => out.push('\0'),
                        'u' => out.push(self.unicode_escape()?),
                        '\n' => {}
                        other => out.push(other),
                    }
                }
                Some(c) => out.push(c),
            }
        }
    }

    fn hex4(&self, at: usize) -> Option<u32> {
        let hex = self.src.get(at..at + 4)?;
        u32::from_str_radix(hex, 16).ok()
    }

    fn unicode_escape(&mut self) -> Result<char, FeedError> {
        if self.src.get(self.pos..self.pos + 4).is_none() {
            return Err(self.error("short unicode escape"));
        }
        let code = self.hex4(self.pos).ok_or_else(|| self.error("bad unicode escape"))?;
        self.pos += 4;

        // High surrogate: combine with a following `\uDC00`-`\uDFFF` escape.
        if (0xD800..0xDC00).contains(&code) && self.src[self.pos..].starts_with("\\u") {
            if let Some(low @ 0xDC00..=0xDFFF) = self.hex4(self.pos + 2) {
                self.pos += 6;
                let combined = 0x10000 + ((code - 0xD800) << 10) + (low - 0xDC00);
                return Ok(char::from_u32(combined).unwrap_or(char::REPLACEMENT_CHARACTER));
            }
        }
        Ok(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER))
    }

    fn number(&mut self) -> Result<Value, FeedError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E') {
                self.pos += 1;
            } else {
                break;
            }
        }
        let raw = &self.src[start..self.pos];
        if let Ok(i) = raw.parse::<i64>() {
            return Ok(Value::Number(i.into()));
        }
        raw.parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| FeedError::Literal {
                offset: start,
                message: format!("invalid number '{raw}'"),
            })
    }

    fn identifier(&mut self) -> String {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if is_ident_start(c) || c.is_ascii_digit() {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
        self.src[start..self.pos].to_string()
    }

    fn keyword(&mut self) -> Result<Value, FeedError> {
        let start = self.pos;
        match self.identifier().as_str() {
            "null" | "undefined" => Ok(Value::Null),
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            other => Err(FeedError::Literal {
                offset: start,
                message: format!("identifier '{other}' is not a literal"),
            }),
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
