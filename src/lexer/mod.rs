/*
Copyright 2025 Connor Nolan

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

//! C1: the lexer and source reader. Turns a byte buffer plus a filename into
//! a token vector. Newlines are significant; block comments `/* ... */` and
//! line comments `// ...` are stripped outside of string literals.

pub mod token;

use crate::errors::AsmError;
use crate::pos::SourcePos;
use std::path::PathBuf;
use std::rc::Rc;
use token::{NumberLit, Sym, StrLit, StrPart, Token, TokenKind};

pub struct Lexer<'a> {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    col: usize,
    file: Rc<PathBuf>,
    src: &'a str,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str, file: Rc<PathBuf>) -> Self {
        Self {
            chars: src.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
            file,
            src,
        }
    }

    fn here(&self) -> SourcePos {
        SourcePos::new(self.file.clone(), self.line, self.col)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, off: usize) -> Option<char> {
        self.chars.get(self.pos + off).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn err(&self, pos: SourcePos, message: impl Into<String>) -> AsmError {
        AsmError::Lex {
            pos,
            message: message.into(),
        }
    }

    /// Tokenizes a full source buffer. Eager rather than lazily-streamed
    /// (the spec's token stream is a "finite lazy sequence"): the driver
    /// needs random lookahead to splice `put`-generated text back into the
    /// stream, so materializing the vector up front is simpler and has no
    /// observable effect given the single-threaded, restart-from-scratch
    /// execution model of §5.
    pub fn tokenize(mut self) -> Result<Vec<Token>, AsmError> {
        let mut out = Vec::new();
        let mut at_line_start = true;

        loop {
            self.skip_intra_line_whitespace();

            match self.peek() {
                None => {
                    out.push(Token::new(TokenKind::Eof, self.here()));
                    break;
                }
                Some('\n') => {
                    let p = self.here();
                    self.bump();
                    out.push(Token::new(TokenKind::Newline, p));
                    at_line_start = true;
                    continue;
                }
                Some('\\') if self.peek_at(1) == Some('\n') => {
                    // Line continuation: join with the next line silently.
                    self.bump();
                    self.bump();
                    continue;
                }
                Some('/') if self.peek_at(1) == Some('/') => {
                    self.skip_line_comment();
                    continue;
                }
                Some('/') if self.peek_at(1) == Some('*') => {
                    self.skip_block_comment()?;
                    continue;
                }
                _ => {}
            }

            let start = self.here();

            if at_line_start {
                if let Some(tok) = self.try_line_label(start.clone())? {
                    out.push(tok);
                    at_line_start = false;
                    continue;
                }
            }
            at_line_start = false;

            let c = self.peek().unwrap();
            if c == ';' {
                self.bump();
                out.push(Token::new(TokenKind::Sym(Sym::Semicolon), start));
                at_line_start = true;
                continue;
            }
            if c.is_ascii_digit() {
                out.push(self.lex_number(start)?);
                continue;
            }
            if c == '"' || c == '\'' {
                out.push(self.lex_string(start)?);
                continue;
            }
            if is_ident_start(c) {
                out.push(self.lex_ident_or_label(start)?);
                continue;
            }
            if c == '.' && self.peek_at(1).is_some_and(is_ident_start) {
                self.bump();
                let name = self.lex_ident_text();
                out.push(Token::new(TokenKind::Directive(name), start));
                continue;
            }

            out.push(self.lex_symbol(start)?);
        }

        Ok(out)
    }

    fn skip_intra_line_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c == ' ' || c == '\t' || c == '\r') {
            self.bump();
        }
    }

    fn skip_line_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.bump();
        }
    }

    fn skip_block_comment(&mut self) -> Result<(), AsmError> {
        let start = self.here();
        self.bump();
        self.bump();
        loop {
            match self.peek() {
                None => return Err(self.err(start, "unterminated block comment")),
                Some('*') if self.peek_at(1) == Some('/') => {
                    self.bump();
                    self.bump();
                    return Ok(());
                }
                _ => {
                    self.bump();
                }
            }
        }
    }

    /// `@name:` or `name:` at the start of a statement. Falls through (by
    /// returning `None` with position unconsumed) when the identifier is not
    /// followed by `:`.
    fn try_line_label(&mut self, start: SourcePos) -> Result<Option<Token>, AsmError> {
        let checkpoint = (self.pos, self.line, self.col);
        let is_line_label = self.peek() == Some('@');
        if is_line_label {
            self.bump();
        }
        if !self.peek().is_some_and(is_ident_start) {
            self.restore(checkpoint);
            return Ok(None);
        }
        let name = self.lex_ident_text();
        if self.peek() == Some(':') {
            self.bump();
            if is_line_label {
                Ok(Some(Token::new(TokenKind::LineLabelDef(name), start)))
            } else {
                Ok(Some(Token::new(TokenKind::LabelDef(name), start)))
            }
        } else {
            self.restore(checkpoint);
            Ok(None)
        }
    }

    fn restore(&mut self, checkpoint: (usize, usize, usize)) {
        self.pos = checkpoint.0;
        self.line = checkpoint.1;
        self.col = checkpoint.2;
    }

    fn lex_ident_text(&mut self) -> String {
        let mut s = String::new();
        while let Some(c) = self.peek() {
            if is_ident_continue(c) {
                s.push(c);
                self.bump();
            } else {
                break;
            }
        }
        s
    }

    fn lex_ident_or_label(&mut self, start: SourcePos) -> Result<Token, AsmError> {
        let name = self.lex_ident_text();
        Ok(Token::new(TokenKind::Ident(name), start))
    }

    fn lex_number(&mut self, start: SourcePos) -> Result<Token, AsmError> {
        let mut radix = 10u32;
        let mut digits = String::new();
        let mut is_float = false;

        if self.peek() == Some('0') {
            match self.peek_at(1) {
                Some('x') | Some('X') => {
                    radix = 16;
                    self.bump();
                    self.bump();
                }
                Some('b') | Some('B') => {
                    radix = 2;
                    self.bump();
                    self.bump();
                }
                Some('c') | Some('C') => {
                    radix = 8;
                    self.bump();
                    self.bump();
                }
                _ => {}
            }
        }

        let digit_ok = |c: char, radix: u32| c == '_' || c.is_digit(radix);
        while self.peek().is_some_and(|c| digit_ok(c, radix)) {
            let c = self.bump().unwrap();
            if c != '_' {
                digits.push(c);
            }
        }

        if radix == 10 {
            if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                digits.push(self.bump().unwrap());
                while self.peek().is_some_and(|c| digit_ok(c, 10)) {
                    let c = self.bump().unwrap();
                    if c != '_' {
                        digits.push(c);
                    }
                }
            }
            if matches!(self.peek(), Some('e') | Some('E')) {
                let save = (self.pos, self.line, self.col);
                let mut exp = String::new();
                exp.push(self.bump().unwrap());
                if matches!(self.peek(), Some('+') | Some('-')) {
                    exp.push(self.bump().unwrap());
                }
                if self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    is_float = true;
                    while self.peek().is_some_and(|c| digit_ok(c, 10)) {
                        let c = self.bump().unwrap();
                        if c != '_' {
                            exp.push(c);
                        }
                    }
                    digits.push_str(&exp);
                } else {
                    self.restore(save);
                }
            }
        }

        if digits.is_empty() {
            return Err(self.err(start, "malformed numeric literal"));
        }

        let value = if is_float {
            digits
                .parse::<f64>()
                .map_err(|e| self.err(start.clone(), format!("invalid float literal: {e}")))?
        } else {
            u64::from_str_radix(&digits, radix)
                .map_err(|e| self.err(start.clone(), format!("invalid integer literal: {e}")))?
                as f64
        };

        Ok(Token::new(
            TokenKind::Number(NumberLit { value, is_float }),
            start,
        ))
    }

    fn lex_string(&mut self, start: SourcePos) -> Result<Token, AsmError> {
        let quote = self.bump().unwrap();
        let mut parts: Vec<StrPart> = Vec::new();
        let mut current: Vec<u8> = Vec::new();

        loop {
            match self.peek() {
                None => return Err(self.err(start, "unterminated string literal")),
                Some(c) if c == quote => {
                    self.bump();
                    break;
                }
                Some('\'') if quote == '\'' => unreachable!(),
                Some('\\') if quote == '\'' => {
                    // Single-quoted strings only understand `''` as an
                    // escaped quote; a lone backslash is literal.
                    current.push(self.bump().unwrap() as u8);
                }
                Some('\\') if quote == '"' => {
                    self.bump();
                    self.lex_escape(&start, &mut current)?;
                }
                Some('$') if quote == '"' && self.peek_at(1) == Some('{') => {
                    if !current.is_empty() {
                        parts.push(StrPart::Lit(std::mem::take(&mut current)));
                    }
                    self.bump();
                    self.bump();
                    let sub_start = self.here();
                    let mut depth = 1usize;
                    let mut sub = String::new();
                    loop {
                        match self.peek() {
                            None => return Err(self.err(sub_start, "unterminated interpolation")),
                            Some('{') => {
                                depth += 1;
                                sub.push(self.bump().unwrap());
                            }
                            Some('}') => {
                                depth -= 1;
                                if depth == 0 {
                                    self.bump();
                                    break;
                                }
                                sub.push(self.bump().unwrap());
                            }
                            Some(c) => {
                                sub.push(c);
                                self.bump();
                            }
                        }
                    }
                    let sub_tokens =
                        Lexer::new(&sub, self.file.clone()).tokenize_expr_fragment(sub_start)?;
                    parts.push(StrPart::Interp(sub_tokens));
                }
                Some(_) => {
                    let c = self.bump().unwrap();
                    let mut buf = [0u8; 4];
                    current.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                }
            }
        }

        if !current.is_empty() || parts.is_empty() {
            parts.push(StrPart::Lit(current));
        }

        Ok(Token::new(TokenKind::Str(StrLit { parts }), start))
    }

    /// Used only to re-tokenize the body of a `${...}` interpolation; it
    /// shares line numbering with the parent lexer's start position.
    fn tokenize_expr_fragment(self, _base: SourcePos) -> Result<Vec<Token>, AsmError> {
        self.tokenize()
    }

    fn lex_escape(&mut self, start: &SourcePos, out: &mut Vec<u8>) -> Result<(), AsmError> {
        let c = self
            .bump()
            .ok_or_else(|| self.err(start.clone(), "unterminated escape sequence"))?;
        match c {
            'n' => out.push(b'\n'),
            't' => out.push(b'\t'),
            'r' => out.push(b'\r'),
            '0' => out.push(0),
            '\\' => out.push(b'\\'),
            '"' => out.push(b'"'),
            '\'' => out.push(b'\''),
            '$' => out.push(b'$'),
            'u' => {
                let mut hex = String::new();
                for _ in 0..4 {
                    let d = self
                        .bump()
                        .ok_or_else(|| self.err(start.clone(), "truncated \\u escape"))?;
                    hex.push(d);
                }
                let cp = u32::from_str_radix(&hex, 16)
                    .map_err(|_| self.err(start.clone(), "invalid \\u escape"))?;
                let ch = char::from_u32(cp)
                    .ok_or_else(|| self.err(start.clone(), "invalid unicode code point"))?;
                let mut buf = [0u8; 4];
                out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            }
            other => {
                return Err(self.err(
                    start.clone(),
                    format!("unknown escape sequence `\\{other}`"),
                ));
            }
        }
        Ok(())
    }

    fn lex_symbol(&mut self, start: SourcePos) -> Result<Token, AsmError> {
        macro_rules! two {
            ($a:expr, $b:expr, $sym:expr) => {
                if self.peek() == Some($a) && self.peek_at(1) == Some($b) {
                    self.bump();
                    self.bump();
                    return Ok(Token::new(TokenKind::Sym($sym), start));
                }
            };
        }
        macro_rules! three {
            ($a:expr, $b:expr, $c:expr, $sym:expr) => {
                if self.peek() == Some($a) && self.peek_at(1) == Some($b) && self.peek_at(2) == Some($c) {
                    self.bump();
                    self.bump();
                    self.bump();
                    return Ok(Token::new(TokenKind::Sym($sym), start));
                }
            };
        }

        three!('>', '>', '>', Sym::Ushr);
        two!('<', '<', Sym::Shl);
        two!('>', '>', Sym::Shr);
        two!('&', '&', Sym::AmpAmp);
        two!('|', '|', Sym::PipePipe);
        two!('=', '=', Sym::Eq2);
        two!('!', '=', Sym::Ne);
        two!('<', '=', Sym::Le);
        two!('>', '=', Sym::Ge);

        let c = self.bump().unwrap();
        let sym = match c {
            '+' => Sym::Plus,
            '-' => Sym::Minus,
            '*' => Sym::Star,
            '/' => Sym::Slash,
            '%' => Sym::Percent,
            '&' => Sym::Amp,
            '|' => Sym::Pipe,
            '^' => Sym::Caret,
            '~' => Sym::Tilde,
            '!' => Sym::Bang,
            '?' => Sym::Question,
            ':' => Sym::Colon,
            '<' => Sym::Lt,
            '>' => Sym::Gt,
            '=' => Sym::Assign,
            '(' => Sym::LParen,
            ')' => Sym::RParen,
            '[' => Sym::LBracket,
            ']' => Sym::RBracket,
            '{' => Sym::LBrace,
            '}' => Sym::RBrace,
            ',' => Sym::Comma,
            '.' => Sym::Dot,
            '#' => Sym::Hash,
            '@' => Sym::At,
            other => return Err(self.err(start, format!("unexpected character `{other}`"))),
        };
        Ok(Token::new(TokenKind::Sym(sym), start))
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Convenience wrapper matching the `readText` → token-vector pipeline the
/// driver calls for every file it processes (root source plus every
/// `.include`).
pub fn tokenize_source(src: &str, file: Rc<PathBuf>) -> Result<Vec<Token>, AsmError> {
    Lexer::new(src, file).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(src: &str) -> Vec<Token> {
        tokenize_source(src, Rc::new(PathBuf::from("test.s"))).unwrap()
    }

    #[test]
    fn lexes_numbers() {
        let t = toks("0x1f 0b101 0c17 42 3.5 1_000\n");
        let nums: Vec<f64> = t
            .iter()
            .filter_map(|tok| match &tok.kind {
                TokenKind::Number(n) => Some(n.value),
                _ => None,
            })
            .collect();
        assert_eq!(nums, vec![31.0, 5.0, 15.0, 42.0, 3.5, 1000.0]);
    }

    #[test]
    fn lexes_label_and_line_label() {
        let t = toks("loop: nop\n@L1: nop\n");
        assert!(matches!(t[0].kind, TokenKind::LabelDef(ref s) if s == "loop"));
        let line_label = t.iter().find_map(|tok| match &tok.kind {
            TokenKind::LineLabelDef(s) => Some(s.clone()),
            _ => None,
        });
        assert_eq!(line_label, Some("L1".to_string()));
    }

    #[test]
    fn lexes_directive_keyword() {
        let t = toks(".arm\n");
        assert!(matches!(t[0].kind, TokenKind::Directive(ref s) if s == "arm"));
    }

    #[test]
    fn lexes_string_with_interpolation() {
        let t = toks("\"hi ${1+2}\"\n");
        match &t[0].kind {
            TokenKind::Str(lit) => {
                assert_eq!(lit.parts.len(), 2);
                assert!(matches!(lit.parts[1], StrPart::Interp(_)));
            }
            _ => panic!("expected string literal"),
        }
    }

    #[test]
    fn strips_comments() {
        let t = toks("nop // trailing\n/* block */ halt\n");
        let idents: Vec<&str> = t
            .iter()
            .filter_map(|tok| match &tok.kind {
                TokenKind::Ident(s) => Some(s.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(idents, vec!["nop", "halt"]);
    }

    #[test]
    fn line_continuation_joins_lines() {
        let t = toks("mov r0, \\\n#1\n");
        let newlines = t.iter().filter(|tok| tok.is_newline()).count();
        assert_eq!(newlines, 1);
    }
}
