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

use crate::pos::SourcePos;

/// A numeric literal, tagged with whether it had a fractional/exponent part.
/// The tag backs the "integer-ness" introspection (`int.isInt`) called out in
/// §4.2 without requiring two separate token kinds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumberLit {
    pub value: f64,
    pub is_float: bool,
}

/// One piece of a (possibly interpolated) string literal. `${...}` runs are
/// lexed as an independent sub-stream of tokens and re-assembled into a
/// concatenation expression by the parser (§4.1).
#[derive(Debug, Clone, PartialEq)]
pub enum StrPart {
    Lit(Vec<u8>),
    Interp(Vec<Token>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrLit {
    pub parts: Vec<StrPart>,
}

impl StrLit {
    /// True when every part is a literal byte run with no interpolation.
    pub fn is_static(&self) -> bool {
        self.parts
            .iter()
            .all(|p| matches!(p, StrPart::Lit(_)))
    }

    /// Concatenates all literal parts; only meaningful when `is_static()`.
    pub fn static_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for p in &self.parts {
            if let StrPart::Lit(b) = p {
                out.extend_from_slice(b);
            }
        }
        out
    }
}

/// Punctuation and operator symbols. Multi-character operators are matched
/// longest-first by the lexer (`>>>` before `>>` before `>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sym {
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Shl,
    Shr,
    Ushr,
    Amp,
    Pipe,
    Caret,
    Tilde,
    Bang,
    AmpAmp,
    PipePipe,
    Question,
    Colon,
    Eq2,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Assign,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Dot,
    Hash,
    At,
    Bang3, // `!!` reserved, unused in practice
    Semicolon,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// A `.name` directive keyword, without the leading dot.
    Directive(String),
    /// A bare identifier: mnemonic, register name, constant/label reference.
    Ident(String),
    /// `name:` at the start of a statement.
    LabelDef(String),
    /// `@name:` line-label (§4.4.1); `name` retains any trailing digits so
    /// the driver can recover the declared index.
    LineLabelDef(String),
    Number(NumberLit),
    Str(StrLit),
    Sym(Sym),
    Newline,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: SourcePos,
}

impl Token {
    pub fn new(kind: TokenKind, pos: SourcePos) -> Self {
        Self { kind, pos }
    }

    pub fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }

    pub fn is_newline(&self) -> bool {
        matches!(self.kind, TokenKind::Newline)
    }
}
