use super::lexer::{Lexer, Token};
use super::literals;
use crate::error::{CompileError, CompileResult};
use crate::value::{Document, Value};

/// Deepest accepted nesting of documents, arrays and wrapper arguments.
pub const MAX_NESTING_DEPTH: usize = 100;

/// Recursive-descent parser over the extended-JSON token stream.
///
/// Positions are kept as character indexes internally and reported as byte
/// offsets.
pub struct Parser {
    lexer: Lexer,
    current: Token,
    current_pos: usize,
    depth: usize,
}

impl Parser {
    pub fn new(input: &str) -> Self {
        let mut lexer = Lexer::new(input);
        let (current, current_pos) = lexer.next_token();
        Self {
            lexer,
            current,
            current_pos,
            depth: 0,
        }
    }

    pub(crate) fn current_token(&self) -> &Token {
        &self.current
    }

    /// Byte offset of the current token.
    pub(crate) fn current_position(&self) -> usize {
        self.lexer.byte_offset(self.current_pos)
    }

    /// True once every token has been consumed.
    pub fn at_end(&self) -> bool {
        self.current == Token::Eof
    }

    /// Text from the current token onwards.
    pub fn remaining(&self) -> String {
        self.lexer.rest_from(self.current_pos)
    }

    fn advance(&mut self) {
        let (token, pos) = self.lexer.next_token();
        self.current = token;
        self.current_pos = pos;
    }

    fn expect(&mut self, expected: Token) -> CompileResult<()> {
        if self.current == expected {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    /// Error pointing at the current token.
    pub(crate) fn unexpected(&self) -> CompileError {
        match self.current {
            Token::Eof => CompileError::syntax("Invalid JSON input. Unexpected end of input."),
            _ => self.error_at(self.current_pos),
        }
    }

    fn descend(&mut self) -> CompileResult<()> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(CompileError::syntax(format!(
                "Invalid JSON input. Nesting too deep at position {}.",
                self.current_position()
            )));
        }
        self.depth += 1;
        Ok(())
    }

    fn ascend(&mut self) {
        self.depth -= 1;
    }

    /// Parse one value starting at the current token.
    pub fn parse_value(&mut self) -> CompileResult<Value> {
        match self.current.clone() {
            Token::LeftBrace => self.parse_document().map(Value::Document),
            Token::LeftBracket => self.parse_array().map(Value::Array),
            Token::String(s) => {
                self.advance();
                Ok(decode_string(s))
            }
            Token::Number(raw) => {
                let value = number_value(&raw).ok_or_else(|| self.unexpected())?;
                self.advance();
                Ok(value)
            }
            Token::Identifier(ident) => self.parse_word(&ident),
            _ => Err(self.unexpected()),
        }
    }

    pub(crate) fn parse_document(&mut self) -> CompileResult<Document> {
        self.descend()?;
        self.expect(Token::LeftBrace)?;
        let mut doc = Document::new();

        while self.current != Token::RightBrace {
            let key = self.parse_key()?;
            self.expect(Token::Colon)?;
            let value = self.parse_value()?;
            doc.insert(key, value);

            match self.current {
                Token::Comma => self.advance(),
                Token::RightBrace => {}
                _ => return Err(self.unexpected()),
            }
        }

        self.advance();
        self.ascend();
        Ok(doc)
    }

    fn parse_array(&mut self) -> CompileResult<Vec<Value>> {
        self.descend()?;
        self.expect(Token::LeftBracket)?;
        let mut items = Vec::new();

        while self.current != Token::RightBracket {
            items.push(self.parse_value()?);

            match self.current {
                Token::Comma => self.advance(),
                Token::RightBracket => {}
                _ => return Err(self.unexpected()),
            }
        }

        self.advance();
        self.ascend();
        Ok(items)
    }

    fn parse_key(&mut self) -> CompileResult<String> {
        let key = match &self.current {
            Token::String(s) | Token::Identifier(s) | Token::Number(s) => s.clone(),
            _ => return Err(self.unexpected()),
        };
        self.advance();
        Ok(key)
    }

    /// Keyword literals and wrapper calls.
    fn parse_word(&mut self, ident: &str) -> CompileResult<Value> {
        let start = self.current_pos;
        let value = match ident {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            "null" | "undefined" => Some(Value::Null),
            "NaN" => Some(Value::Double(f64::NAN)),
            "Infinity" => Some(Value::Double(f64::INFINITY)),
            _ => None,
        };
        if let Some(value) = value {
            self.advance();
            return Ok(value);
        }

        self.advance();
        let name = if ident == "new" {
            match self.current.clone() {
                Token::Identifier(name) if literals::is_constructor_name(&name) => {
                    self.advance();
                    name
                }
                _ => return Err(self.unexpected()),
            }
        } else {
            ident.to_string()
        };

        if self.current != Token::LeftParen {
            return Err(self.error_at(start));
        }
        let args = self.parse_arguments()?;
        literals::construct(&name, &args).map_err(|message| {
            CompileError::syntax(format!(
                "Invalid JSON input. Position: {}. {}",
                self.lexer.byte_offset(start),
                message
            ))
        })
    }

    fn parse_arguments(&mut self) -> CompileResult<Vec<Value>> {
        self.descend()?;
        self.expect(Token::LeftParen)?;
        let mut args = Vec::new();

        while self.current != Token::RightParen {
            args.push(self.parse_value()?);

            match self.current {
                Token::Comma => self.advance(),
                Token::RightParen => {}
                _ => return Err(self.unexpected()),
            }
        }

        self.advance();
        self.ascend();
        Ok(args)
    }

    fn error_at(&self, position: usize) -> CompileError {
        match self.lexer.char_at(position) {
            Some(ch) => CompileError::syntax(format!(
                "Invalid JSON input. Position: {}. Character: '{}'.",
                self.lexer.byte_offset(position),
                ch
            )),
            None => CompileError::syntax("Invalid JSON input. Unexpected end of input."),
        }
    }
}

/// Integers narrow to the smallest fitting width; out-of-range or fractional
/// numerals become doubles.
fn number_value(raw: &str) -> Option<Value> {
    if !raw.contains(['.', 'e', 'E']) {
        if let Ok(n) = raw.parse::<i32>() {
            return Some(Value::Int32(n));
        }
        if let Ok(n) = raw.parse::<i64>() {
            return Some(Value::Int64(n));
        }
    }
    raw.parse::<f64>().ok().map(Value::Double)
}

/// A string whose whole content is a wrapper call decodes to the typed value.
/// Anything that fails to decode stays a plain string.
fn decode_string(s: String) -> Value {
    if !literals::is_wrapper_literal(&s) {
        return Value::String(s);
    }
    let mut inner = Parser::new(s.trim());
    match inner.parse_value() {
        Ok(value) if inner.at_end() && !matches!(value, Value::String(_)) => value,
        _ => Value::String(s),
    }
}

