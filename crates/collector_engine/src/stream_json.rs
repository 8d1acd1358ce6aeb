//! Token-driven streaming extraction of JSON values at a nested path.
//!
//! Source payloads can exceed available memory, so this module never
//! materializes the enclosing document: a byte-level lexer feeds a walker
//! that only builds `serde_json::Value`s for subtrees matching the
//! configured path. A `skip_key` member is skipped wherever it appears,
//! including inside matched values, which is what makes "metadata-only"
//! reads of a package cheap while a multi-gigabyte sibling array sits next
//! to the fields of interest.

use std::io::{BufReader, Read};

use serde_json::{Map, Number, Value};

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("io error while streaming JSON: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed JSON near byte {offset}: {message}")]
    Syntax { offset: u64, message: String },
    #[error("invalid item path {path:?}: {message}")]
    Path { path: String, message: String },
}

/// Dot-separated path to the values of interest. The empty path selects the
/// document root; the segment `item` selects each element of an array.
pub(crate) fn parse_path(path: &str) -> Result<Vec<String>, StreamError> {
    if path.is_empty() {
        return Ok(Vec::new());
    }
    let mut segments = Vec::new();
    for segment in path.split('.') {
        if segment.is_empty() {
            return Err(StreamError::Path {
                path: path.to_string(),
                message: "empty segment".to_string(),
            });
        }
        segments.push(segment.to_string());
    }
    Ok(segments)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    ObjectBegin,
    ObjectEnd,
    ArrayBegin,
    ArrayEnd,
    Comma,
    Colon,
    Str(String),
    Num(Number),
    Bool(bool),
    Null,
}

impl Token {
    fn describe(&self) -> &'static str {
        match self {
            Token::ObjectBegin => "'{'",
            Token::ObjectEnd => "'}'",
            Token::ArrayBegin => "'['",
            Token::ArrayEnd => "']'",
            Token::Comma => "','",
            Token::Colon => "':'",
            Token::Str(_) => "string",
            Token::Num(_) => "number",
            Token::Bool(_) => "boolean",
            Token::Null => "null",
        }
    }
}

struct Lexer<R: Read> {
    bytes: std::io::Bytes<BufReader<R>>,
    peeked: Option<u8>,
    offset: u64,
}

impl<R: Read> Lexer<R> {
    fn new(source: R) -> Self {
        Self {
            bytes: BufReader::new(source).bytes(),
            peeked: None,
            offset: 0,
        }
    }

    fn syntax(&self, message: impl Into<String>) -> StreamError {
        StreamError::Syntax {
            offset: self.offset,
            message: message.into(),
        }
    }

    fn next_byte(&mut self) -> Result<Option<u8>, StreamError> {
        if let Some(byte) = self.peeked.take() {
            return Ok(Some(byte));
        }
        match self.bytes.next() {
            None => Ok(None),
            Some(Err(err)) => Err(err.into()),
            Some(Ok(byte)) => {
                self.offset += 1;
                Ok(Some(byte))
            }
        }
    }

    fn peek_byte(&mut self) -> Result<Option<u8>, StreamError> {
        if self.peeked.is_none() {
            self.peeked = self.next_byte()?;
        }
        Ok(self.peeked)
    }

    /// Next token, or `None` at end of input.
    fn next_token(&mut self) -> Result<Option<Token>, StreamError> {
        let byte = loop {
            match self.next_byte()? {
                None => return Ok(None),
                Some(b' ' | b'\t' | b'\n' | b'\r') => continue,
                Some(byte) => break byte,
            }
        };
        let token = match byte {
            b'{' => Token::ObjectBegin,
            b'}' => Token::ObjectEnd,
            b'[' => Token::ArrayBegin,
            b']' => Token::ArrayEnd,
            b',' => Token::Comma,
            b':' => Token::Colon,
            b'"' => Token::Str(self.read_string()?),
            b't' => {
                self.expect_literal(b"rue")?;
                Token::Bool(true)
            }
            b'f' => {
                self.expect_literal(b"alse")?;
                Token::Bool(false)
            }
            b'n' => {
                self.expect_literal(b"ull")?;
                Token::Null
            }
            b'-' | b'0'..=b'9' => Token::Num(self.read_number(byte)?),
            other => return Err(self.syntax(format!("unexpected byte 0x{other:02x}"))),
        };
        Ok(Some(token))
    }

    fn expect_literal(&mut self, rest: &[u8]) -> Result<(), StreamError> {
        for expected in rest {
            match self.next_byte()? {
                Some(byte) if byte == *expected => {}
                _ => return Err(self.syntax("invalid literal")),
            }
        }
        Ok(())
    }

    fn read_string(&mut self) -> Result<String, StreamError> {
        let mut buf = Vec::new();
        loop {
            match self.next_byte()? {
                None => return Err(self.syntax("unterminated string")),
                Some(b'"') => break,
                Some(b'\\') => match self.next_byte()? {
                    Some(b'"') => buf.push(b'"'),
                    Some(b'\\') => buf.push(b'\\'),
                    Some(b'/') => buf.push(b'/'),
                    Some(b'b') => buf.push(0x08),
                    Some(b'f') => buf.push(0x0C),
                    Some(b'n') => buf.push(b'\n'),
                    Some(b'r') => buf.push(b'\r'),
                    Some(b't') => buf.push(b'\t'),
                    Some(b'u') => {
                        let ch = self.read_unicode_escape()?;
                        let mut encoded = [0u8; 4];
                        buf.extend_from_slice(ch.encode_utf8(&mut encoded).as_bytes());
                    }
                    _ => return Err(self.syntax("invalid escape sequence")),
                },
                Some(byte) => buf.push(byte),
            }
        }
        String::from_utf8(buf).map_err(|_| self.syntax("string is not valid UTF-8"))
    }

    fn read_unicode_escape(&mut self) -> Result<char, StreamError> {
        let first = self.read_hex4()?;
        // High surrogate must be followed by an escaped low surrogate.
        let code = if (0xD800..=0xDBFF).contains(&first) {
            match (self.next_byte()?, self.next_byte()?) {
                (Some(b'\\'), Some(b'u')) => {
                    let second = self.read_hex4()?;
                    if !(0xDC00..=0xDFFF).contains(&second) {
                        return Err(self.syntax("unpaired surrogate"));
                    }
                    0x10000 + ((first - 0xD800) << 10) + (second - 0xDC00)
                }
                _ => return Err(self.syntax("unpaired surrogate")),
            }
        } else if (0xDC00..=0xDFFF).contains(&first) {
            return Err(self.syntax("unpaired surrogate"));
        } else {
            first
        };
        char::from_u32(code).ok_or_else(|| self.syntax("invalid unicode escape"))
    }

    fn read_hex4(&mut self) -> Result<u32, StreamError> {
        let mut code = 0u32;
        for _ in 0..4 {
            let byte = self
                .next_byte()?
                .ok_or_else(|| self.syntax("unterminated unicode escape"))?;
            let digit = (byte as char)
                .to_digit(16)
                .ok_or_else(|| self.syntax("invalid unicode escape"))?;
            code = code * 16 + digit;
        }
        Ok(code)
    }

    fn read_number(&mut self, first: u8) -> Result<Number, StreamError> {
        let mut text = String::new();
        text.push(first as char);
        let mut is_float = false;
        while let Some(byte) = self.peek_byte()? {
            match byte {
                b'0'..=b'9' => text.push(byte as char),
                b'.' | b'e' | b'E' | b'+' | b'-' => {
                    is_float = true;
                    text.push(byte as char);
                }
                _ => break,
            }
            self.peeked = None;
        }
        if !is_float {
            if let Ok(value) = text.parse::<i64>() {
                return Ok(Number::from(value));
            }
            if let Ok(value) = text.parse::<u64>() {
                return Ok(Number::from(value));
            }
        }
        let value: f64 = text
            .parse()
            .map_err(|_| self.syntax(format!("invalid number {text:?}")))?;
        Number::from_f64(value).ok_or_else(|| self.syntax(format!("invalid number {text:?}")))
    }
}

enum Frame {
    Object { key: Option<String>, fresh: bool },
    Array { fresh: bool },
}

/// Lazy, finite, non-restartable sequence of the JSON values found at a
/// dot-separated path inside a byte stream.
///
/// Values already yielded stand even if a later part of the document turns
/// out to be malformed; the parse error surfaces at the point of failure
/// and iteration ends.
pub struct JsonItems<R: Read> {
    lexer: Lexer<R>,
    target: Vec<String>,
    skip_key: Option<String>,
    stack: Vec<Frame>,
    pending: Option<Token>,
    at_value: bool,
    done: bool,
}

impl<R: Read> JsonItems<R> {
    pub fn new(source: R, path: &str, skip_key: Option<&str>) -> Result<Self, StreamError> {
        Ok(Self {
            lexer: Lexer::new(source),
            target: parse_path(path)?,
            skip_key: skip_key.map(str::to_string),
            stack: Vec::new(),
            pending: None,
            at_value: true,
            done: false,
        })
    }

    fn take_token(&mut self) -> Result<Option<Token>, StreamError> {
        if let Some(token) = self.pending.take() {
            return Ok(Some(token));
        }
        self.lexer.next_token()
    }

    fn require_token(&mut self) -> Result<Token, StreamError> {
        self.take_token()?
            .ok_or_else(|| self.lexer.syntax("unexpected end of input"))
    }

    fn is_skipped(&self, key: &str) -> bool {
        self.skip_key.as_deref() == Some(key)
    }

    /// Path of the value the walker is positioned at, compared against the
    /// target segment by segment.
    fn path_relation(&self) -> PathRelation {
        let mut depth = 0;
        for frame in &self.stack {
            let segment = match frame {
                Frame::Object { key: Some(key), .. } => key.as_str(),
                Frame::Object { key: None, .. } => return PathRelation::Off,
                Frame::Array { .. } => "item",
            };
            match self.target.get(depth) {
                Some(expected) if expected == segment => depth += 1,
                _ => return PathRelation::Off,
            }
        }
        if depth == self.target.len() {
            PathRelation::Match
        } else {
            PathRelation::Ancestor
        }
    }

    fn next_match(&mut self) -> Result<Option<Value>, StreamError> {
        loop {
            if self.at_value {
                self.at_value = false;
                let token = self.require_token()?;
                match self.path_relation() {
                    PathRelation::Match => {
                        let value = self.build_value(token)?;
                        return Ok(Some(value));
                    }
                    PathRelation::Ancestor => match token {
                        Token::ObjectBegin => self.stack.push(Frame::Object {
                            key: None,
                            fresh: true,
                        }),
                        Token::ArrayBegin => self.stack.push(Frame::Array { fresh: true }),
                        // A scalar short of the target path matches nothing.
                        _ => {}
                    },
                    PathRelation::Off => {
                        self.skip_value(token)?;
                    }
                }
                continue;
            }

            // Between values: advance within the innermost open container.
            let Some(frame) = self.stack.pop() else {
                return match self.take_token()? {
                    None => Ok(None),
                    Some(token) => {
                        Err(self.lexer.syntax(format!(
                            "trailing {} after document end",
                            token.describe()
                        )))
                    }
                };
            };
            match frame {
                Frame::Object { fresh, .. } => {
                    let token = self.require_token()?;
                    let key = match (token, fresh) {
                        (Token::ObjectEnd, _) => continue,
                        (Token::Str(key), true) => key,
                        (Token::Comma, false) => match self.require_token()? {
                            Token::Str(key) => key,
                            other => {
                                return Err(self
                                    .lexer
                                    .syntax(format!("expected member key, found {}", other.describe())))
                            }
                        },
                        (other, _) => {
                            return Err(self
                                .lexer
                                .syntax(format!("unexpected {} in object", other.describe())))
                        }
                    };
                    match self.require_token()? {
                        Token::Colon => {}
                        other => {
                            return Err(self
                                .lexer
                                .syntax(format!("expected ':', found {}", other.describe())))
                        }
                    }
                    if self.is_skipped(&key) {
                        let token = self.require_token()?;
                        self.skip_value(token)?;
                        self.stack.push(Frame::Object {
                            key: None,
                            fresh: false,
                        });
                    } else {
                        self.stack.push(Frame::Object {
                            key: Some(key),
                            fresh: false,
                        });
                        self.at_value = true;
                    }
                }
                Frame::Array { fresh } => {
                    let token = self.require_token()?;
                    match (token, fresh) {
                        (Token::ArrayEnd, _) => continue,
                        (Token::Comma, false) => {
                            self.stack.push(Frame::Array { fresh: false });
                            self.at_value = true;
                        }
                        (token, true) => {
                            self.pending = Some(token);
                            self.stack.push(Frame::Array { fresh: false });
                            self.at_value = true;
                        }
                        (other, false) => {
                            return Err(self
                                .lexer
                                .syntax(format!("unexpected {} in array", other.describe())))
                        }
                    }
                }
            }
        }
    }

    /// Builds a full value from the token stream, omitting `skip_key`
    /// members at any depth.
    fn build_value(&mut self, token: Token) -> Result<Value, StreamError> {
        match token {
            Token::Str(s) => Ok(Value::String(s)),
            Token::Num(n) => Ok(Value::Number(n)),
            Token::Bool(b) => Ok(Value::Bool(b)),
            Token::Null => Ok(Value::Null),
            Token::ObjectBegin => {
                let mut map = Map::new();
                let mut fresh = true;
                loop {
                    let key = match (self.require_token()?, fresh) {
                        (Token::ObjectEnd, _) => break,
                        (Token::Str(key), true) => key,
                        (Token::Comma, false) => match self.require_token()? {
                            Token::Str(key) => key,
                            other => {
                                return Err(self
                                    .lexer
                                    .syntax(format!("expected member key, found {}", other.describe())))
                            }
                        },
                        (other, _) => {
                            return Err(self
                                .lexer
                                .syntax(format!("unexpected {} in object", other.describe())))
                        }
                    };
                    fresh = false;
                    match self.require_token()? {
                        Token::Colon => {}
                        other => {
                            return Err(self
                                .lexer
                                .syntax(format!("expected ':', found {}", other.describe())))
                        }
                    }
                    let token = self.require_token()?;
                    if self.is_skipped(&key) {
                        self.skip_value(token)?;
                    } else {
                        let value = self.build_value(token)?;
                        map.insert(key, value);
                    }
                }
                Ok(Value::Object(map))
            }
            Token::ArrayBegin => {
                let mut items = Vec::new();
                let mut fresh = true;
                loop {
                    let token = match (self.require_token()?, fresh) {
                        (Token::ArrayEnd, _) => break,
                        (Token::Comma, false) => self.require_token()?,
                        (token, true) => token,
                        (other, false) => {
                            return Err(self
                                .lexer
                                .syntax(format!("unexpected {} in array", other.describe())))
                        }
                    };
                    fresh = false;
                    items.push(self.build_value(token)?);
                }
                Ok(Value::Array(items))
            }
            other => Err(self
                .lexer
                .syntax(format!("expected value, found {}", other.describe()))),
        }
    }

    /// Consumes a full value without building it.
    fn skip_value(&mut self, token: Token) -> Result<(), StreamError> {
        let mut depth = 0u64;
        let mut token = token;
        loop {
            match token {
                Token::ObjectBegin | Token::ArrayBegin => depth += 1,
                Token::ObjectEnd | Token::ArrayEnd => {
                    if depth == 0 {
                        return Err(self
                            .lexer
                            .syntax(format!("expected value, found {}", token.describe())));
                    }
                    depth -= 1;
                }
                Token::Comma | Token::Colon if depth == 0 => {
                    return Err(self
                        .lexer
                        .syntax(format!("expected value, found {}", token.describe())));
                }
                _ => {}
            }
            if depth == 0 {
                return Ok(());
            }
            token = self.require_token()?;
        }
    }
}

enum PathRelation {
    /// The current position is exactly the target path.
    Match,
    /// The target path lies below the current position.
    Ancestor,
    /// The current position diverges from the target path.
    Off,
}

impl<R: Read> Iterator for JsonItems<R> {
    type Item = Result<Value, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_match() {
            Ok(Some(value)) => Some(Ok(value)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}
