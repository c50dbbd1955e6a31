//! Tokenizer for SDL source. Keywords are case-insensitive; radixed
//! integers are written `%X`, `%O`, `%B`, character values `%A'c'`.
//! Comments (`/* ... */` and `{ ... }`) surface as tokens because the
//! compiler preserves them inside aggregates.

use crate::error::SdlError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Name,
    Integer,
    Str,
    Comment,
    Semicolon,
    Comma,
    Colon,
    Star,
    Minus,
    LParen,
    RParen,
    Equals,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    /// Parsed value for `Integer` tokens.
    pub value: Option<i128>,
    pub line: u32,
    pub column: u32,
    /// Nothing but whitespace preceded this token on its line.
    pub line_start: bool,
}

pub struct Lexer<'src> {
    src: &'src str,
    offset: usize,
    line: u32,
    column: u32,
    fresh_line: bool,
}

impl<'src> Lexer<'src> {
    pub fn new(src: &'src str) -> Self {
        Self {
            src,
            offset: 0,
            line: 1,
            column: 1,
            fresh_line: true,
        }
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    fn rest(&self) -> &'src str {
        &self.src[self.offset..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.offset += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
            self.fresh_line = true;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    /// Consume the remainder of the current line verbatim, for the
    /// LITERAL passthrough.
    pub fn raw_line(&mut self) -> Option<String> {
        if self.offset >= self.src.len() {
            return None;
        }
        let mut text = String::new();
        while let Some(ch) = self.peek() {
            self.bump();
            if ch == '\n' {
                break;
            }
            text.push(ch);
        }
        Some(text)
    }

    pub fn next_token(&mut self) -> Result<Token, SdlError> {
        self.skip_whitespace();
        let line = self.line;
        let column = self.column;
        let line_start = self.fresh_line;
        self.fresh_line = false;

        let Some(ch) = self.peek() else {
            return Ok(self.token(TokenKind::Eof, "", line, column, line_start));
        };

        if self.rest().starts_with("/*") {
            return self.block_comment(line, column, line_start);
        }
        if ch == '{' {
            return self.brace_comment(line, column, line_start);
        }
        if ch == '"' {
            return self.string(line, column, line_start);
        }
        if ch == '%' {
            return self.radixed(line, column, line_start);
        }
        if ch.is_ascii_digit() {
            return self.number(line, column, line_start);
        }
        if ch.is_ascii_alphabetic() || ch == '_' || ch == '#' || ch == '$'
        {
            return self.name(line, column, line_start);
        }

        self.bump();
        let kind = match ch {
            ';' => TokenKind::Semicolon,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            '*' => TokenKind::Star,
            '-' => TokenKind::Minus,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '=' => TokenKind::Equals,
            other => {
                return Err(SdlError::Syntax {
                    token: other.to_string(),
                })
            }
        };
        Ok(self.token(
            kind,
            &ch.to_string(),
            line,
            column,
            line_start,
        ))
    }

    fn token(
        &self,
        kind: TokenKind,
        text: &str,
        line: u32,
        column: u32,
        line_start: bool,
    ) -> Token {
        Token {
            kind,
            text: text.to_string(),
            value: None,
            line,
            column,
            line_start,
        }
    }

    fn name(
        &mut self,
        line: u32,
        column: u32,
        line_start: bool,
    ) -> Result<Token, SdlError> {
        let mut text = String::new();
        while let Some(ch) = self.peek() {
            if ch.is_ascii_alphanumeric()
                || ch == '_'
                || ch == '#'
                || ch == '$'
            {
                text.push(ch);
                self.bump();
            } else {
                break;
            }
        }
        Ok(self.token(TokenKind::Name, &text, line, column, line_start))
    }

    fn number(
        &mut self,
        line: u32,
        column: u32,
        line_start: bool,
    ) -> Result<Token, SdlError> {
        let mut text = String::new();
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            text.push(self.bump().unwrap());
        }
        let value = text.parse::<i128>().map_err(|_| SdlError::Syntax {
            token: text.clone(),
        })?;
        let mut token =
            self.token(TokenKind::Integer, &text, line, column, line_start);
        token.value = Some(value);
        Ok(token)
    }

    fn radixed(
        &mut self,
        line: u32,
        column: u32,
        line_start: bool,
    ) -> Result<Token, SdlError> {
        self.bump(); // '%'
        let Some(marker) = self.bump() else {
            return Err(SdlError::Syntax {
                token: "%".to_string(),
            });
        };
        let radix = match marker.to_ascii_uppercase() {
            'X' => 16,
            'O' => 8,
            'B' => 2,
            'D' => 10,
            'A' => return self.ascii_value(line, column, line_start),
            other => {
                return Err(SdlError::Syntax {
                    token: format!("%{other}"),
                })
            }
        };
        let mut text = String::new();
        while let Some(ch) = self.peek() {
            if ch.is_ascii_hexdigit() {
                text.push(ch);
                self.bump();
            } else {
                break;
            }
        }
        let value = i128::from_str_radix(&text, radix).map_err(|_| {
            SdlError::Syntax {
                token: format!("%{marker}{text}"),
            }
        })?;
        let mut token = self.token(
            TokenKind::Integer,
            &format!("%{marker}{text}"),
            line,
            column,
            line_start,
        );
        token.value = Some(value);
        Ok(token)
    }

    /// `%A'c'`: the numeric value of the quoted characters.
    fn ascii_value(
        &mut self,
        line: u32,
        column: u32,
        line_start: bool,
    ) -> Result<Token, SdlError> {
        if self.peek() != Some('\'') {
            return Err(SdlError::Syntax {
                token: "%A".to_string(),
            });
        }
        self.bump();
        let mut value: i128 = 0;
        let mut text = String::from("%A'");
        loop {
            match self.bump() {
                Some('\'') => break,
                Some(ch) if ch.is_ascii() => {
                    value = (value << 8) | ch as i128;
                    text.push(ch);
                }
                _ => {
                    return Err(SdlError::Syntax { token: text });
                }
            }
        }
        text.push('\'');
        let mut token =
            self.token(TokenKind::Integer, &text, line, column, line_start);
        token.value = Some(value);
        Ok(token)
    }

    fn string(
        &mut self,
        line: u32,
        column: u32,
        line_start: bool,
    ) -> Result<Token, SdlError> {
        self.bump(); // opening quote
        let mut text = String::new();
        loop {
            match self.bump() {
                Some('"') => {
                    // doubled quote is an escaped quote
                    if self.peek() == Some('"') {
                        self.bump();
                        text.push('"');
                        continue;
                    }
                    break;
                }
                Some(ch) => text.push(ch),
                None => {
                    return Err(SdlError::Syntax {
                        token: format!("\"{text}"),
                    })
                }
            }
        }
        Ok(self.token(TokenKind::Str, &text, line, column, line_start))
    }

    fn block_comment(
        &mut self,
        line: u32,
        column: u32,
        line_start: bool,
    ) -> Result<Token, SdlError> {
        self.bump();
        self.bump(); // "/*"
        let mut text = String::new();
        loop {
            if self.rest().starts_with("*/") {
                self.bump();
                self.bump();
                break;
            }
            match self.bump() {
                Some(ch) => text.push(ch),
                None => break,
            }
        }
        Ok(self.token(
            TokenKind::Comment,
            text.trim(),
            line,
            column,
            line_start,
        ))
    }

    fn brace_comment(
        &mut self,
        line: u32,
        column: u32,
        line_start: bool,
    ) -> Result<Token, SdlError> {
        self.bump(); // '{'
        let mut text = String::new();
        loop {
            match self.bump() {
                Some('}') | None => break,
                Some(ch) => text.push(ch),
            }
        }
        Ok(self.token(
            TokenKind::Comment,
            text.trim(),
            line,
            column,
            line_start,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_tokens(src: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(src);
        let mut out = Vec::new();
        loop {
            let token = lexer.next_token().unwrap();
            let done = token.kind == TokenKind::Eof;
            out.push(token);
            if done {
                break;
            }
        }
        out
    }

    #[test]
    fn radixed_integers() {
        let tokens = all_tokens("%XFF %O17 %B101 42");
        let values: Vec<i128> =
            tokens.iter().filter_map(|t| t.value).collect();
        assert_eq!(values, vec![0xFF, 0o17, 0b101, 42]);
    }

    #[test]
    fn ascii_literal() {
        let tokens = all_tokens("%A'A'");
        assert_eq!(tokens[0].value, Some(65));
    }

    #[test]
    fn doubled_quote_escapes() {
        let tokens = all_tokens("\"say \"\"hi\"\"\"");
        assert_eq!(tokens[0].kind, TokenKind::Str);
        assert_eq!(tokens[0].text, "say \"hi\"");
    }

    #[test]
    fn comments_are_tokens() {
        let tokens = all_tokens("a /* note */ b { also } c");
        let kinds: Vec<TokenKind> =
            tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Name,
                TokenKind::Comment,
                TokenKind::Name,
                TokenKind::Comment,
                TokenKind::Name,
                TokenKind::Eof,
            ]
        );
        assert_eq!(tokens[1].text, "note");
        assert_eq!(tokens[3].text, "also");
    }
}
