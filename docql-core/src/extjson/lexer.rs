//! Tokenizer for the extended-JSON dialect.
//!
//! Tokens are produced on demand so that a lenient parse can stop after the
//! first complete value without lexing (and failing on) whatever follows it.

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    LeftBrace,    // {
    RightBrace,   // }
    LeftBracket,  // [
    RightBracket, // ]
    LeftParen,    // (
    RightParen,   // )
    Colon,        // :
    Comma,        // ,

    /// Single- or double-quoted string, escapes resolved.
    String(String),
    /// Numeric lexeme kept raw; the parser decides its width.
    Number(String),
    /// Bare word: unquoted key, `true`/`false`/`null`, wrapper name.
    Identifier(String),

    /// A character that cannot start any token, or an unterminated string.
    Invalid(char),
    Eof,
}

pub struct Lexer {
    input: Vec<char>,
    position: usize,
    current_char: Option<char>,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        let chars: Vec<char> = input.chars().collect();
        let current_char = chars.first().copied();

        Self {
            input: chars,
            position: 0,
            current_char,
        }
    }

    fn advance(&mut self) {
        self.position += 1;
        self.current_char = self.input.get(self.position).copied();
    }

    fn peek_char(&self) -> Option<char> {
        self.input.get(self.position + 1).copied()
    }

    /// Character at an absolute position, for error reporting.
    pub fn char_at(&self, position: usize) -> Option<char> {
        self.input.get(position).copied()
    }

    /// UTF-8 byte offset of the character at `position`.
    pub fn byte_offset(&self, position: usize) -> usize {
        self.input
            .iter()
            .take(position)
            .map(|ch| ch.len_utf8())
            .sum()
    }

    /// Unconsumed input starting at `position`.
    pub fn rest_from(&self, position: usize) -> String {
        self.input.iter().skip(position).collect()
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current_char {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Next token together with the position of its first character.
    pub fn next_token(&mut self) -> (Token, usize) {
        self.skip_whitespace();
        let start = self.position;

        let ch = match self.current_char {
            Some(ch) => ch,
            None => return (Token::Eof, start),
        };

        let token = match ch {
            '{' => self.single(Token::LeftBrace),
            '}' => self.single(Token::RightBrace),
            '[' => self.single(Token::LeftBracket),
            ']' => self.single(Token::RightBracket),
            '(' => self.single(Token::LeftParen),
            ')' => self.single(Token::RightParen),
            ':' => self.single(Token::Colon),
            ',' => self.single(Token::Comma),
            '"' | '\'' => self.read_string(ch),
            '-' | '+' if self.peek_char().is_some_and(|c| c.is_ascii_digit() || c == '.') => {
                self.read_number()
            }
            c if c.is_ascii_digit() => self.read_number(),
            c if is_identifier_start(c) => self.read_identifier(),
            other => self.single(Token::Invalid(other)),
        };

        (token, start)
    }

    fn single(&mut self, token: Token) -> Token {
        self.advance();
        token
    }

    fn read_number(&mut self) -> Token {
        let mut num_str = String::new();

        if let Some(sign) = self.current_char.filter(|c| *c == '-' || *c == '+') {
            num_str.push(sign);
            self.advance();
        }

        while let Some(ch) = self.current_char {
            if ch.is_ascii_digit() || ch == '.' {
                num_str.push(ch);
                self.advance();
            } else if (ch == 'e' || ch == 'E') && !num_str.contains(['e', 'E']) {
                num_str.push(ch);
                self.advance();
                if let Some(sign) = self.current_char.filter(|c| *c == '-' || *c == '+') {
                    num_str.push(sign);
                    self.advance();
                }
            } else {
                break;
            }
        }

        Token::Number(num_str)
    }

    fn read_string(&mut self, quote: char) -> Token {
        self.advance(); // Skip opening quote

        let mut string = String::new();

        while let Some(ch) = self.current_char {
            if ch == quote {
                self.advance(); // Skip closing quote
                return Token::String(string);
            } else if ch == '\\' {
                self.advance();
                let Some(escaped) = self.current_char else {
                    break;
                };
                match escaped {
                    'n' => string.push('\n'),
                    't' => string.push('\t'),
                    'r' => string.push('\r'),
                    'b' => string.push('\u{0008}'),
                    'f' => string.push('\u{000C}'),
                    'u' => match self.read_unicode_escape() {
                        Some(c) => {
                            string.push(c);
                            continue;
                        }
                        None => return Token::Invalid('\\'),
                    },
                    _ => string.push(escaped),
                }
                self.advance();
            } else {
                string.push(ch);
                self.advance();
            }
        }

        Token::Invalid(quote)
    }

    /// Reads `XXXX` after `\u`, leaving the cursor past the last hex digit.
    /// Surrogate pairs are combined when both halves are present.
    fn read_unicode_escape(&mut self) -> Option<char> {
        let high = self.read_hex4()?;
        if (0xD800..0xDC00).contains(&high)
            && self.current_char == Some('\\')
            && self.peek_char() == Some('u')
        {
            self.advance();
            let low = self.read_hex4()?;
            let combined = 0x10000 + ((high - 0xD800) << 10) + (low.checked_sub(0xDC00)?);
            return char::from_u32(combined);
        }
        char::from_u32(high)
    }

    fn read_hex4(&mut self) -> Option<u32> {
        let mut value = 0u32;
        for _ in 0..4 {
            self.advance();
            let digit = self.current_char?.to_digit(16)?;
            value = value * 16 + digit;
        }
        self.advance();
        Some(value)
    }

    fn read_identifier(&mut self) -> Token {
        let mut ident = String::new();

        while let Some(ch) = self.current_char {
            if is_identifier_start(ch) || ch.is_ascii_digit() || ch == '.' {
                ident.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        Token::Identifier(ident)
    }
}

fn is_identifier_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}
