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

//! C2: expression AST and a Pratt (top-down operator precedence) parser over
//! the token stream produced by the lexer. `eval` holds the partial
//! evaluator described in §4.2.

pub mod eval;

use crate::errors::AsmError;
use crate::lexer::token::{StrPart, Sym, Token, TokenKind};
use crate::pos::SourcePos;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    Ushr,
    And,
    Or,
    Xor,
    AndAnd,
    OrOr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Pos,
    Not,
    BitNot,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64, bool),
    /// A dotted name: a label, a `.def` constant, a register alias, a struct
    /// member access, or the magic identifier `_base`.
    Name(String, SourcePos),
    /// A parameterized constant invocation: `name(args...)`.
    Call(String, Vec<Expr>, SourcePos),
    Str(Vec<u8>),
    /// Built from a `"${a}${b}"` string literal with interpolation.
    Concat(Vec<Expr>),
    Unary(UnOp, Box<Expr>, SourcePos),
    Binary(BinOp, Box<Expr>, Box<Expr>, SourcePos),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>, SourcePos),
}

impl Expr {
    pub fn pos(&self) -> SourcePos {
        match self {
            Expr::Number(..) => SourcePos::synthetic(),
            Expr::Name(_, p) => p.clone(),
            Expr::Call(_, _, p) => p.clone(),
            Expr::Str(_) => SourcePos::synthetic(),
            Expr::Concat(parts) => parts.first().map(|e| e.pos()).unwrap_or_else(SourcePos::synthetic),
            Expr::Unary(_, _, p) => p.clone(),
            Expr::Binary(_, _, _, p) => p.clone(),
            Expr::Ternary(_, _, _, p) => p.clone(),
        }
    }
}

/// A cursor over a token slice. Used by both the main-language expression
/// parser and the directive parser that sits on top of it.
pub struct TokenCursor<'t> {
    toks: &'t [Token],
    idx: usize,
}

impl<'t> TokenCursor<'t> {
    pub fn new(toks: &'t [Token]) -> Self {
        Self { toks, idx: 0 }
    }

    pub fn peek(&self) -> &Token {
        &self.toks[self.idx.min(self.toks.len() - 1)]
    }

    pub fn peek_at(&self, n: usize) -> &Token {
        let i = (self.idx + n).min(self.toks.len() - 1);
        &self.toks[i]
    }

    pub fn bump(&mut self) -> Token {
        let t = self.toks[self.idx.min(self.toks.len() - 1)].clone();
        if self.idx < self.toks.len() - 1 {
            self.idx += 1;
        }
        t
    }

    pub fn at_eof(&self) -> bool {
        self.peek().is_eof()
    }

    pub fn skip_newlines(&mut self) {
        while self.peek().is_newline() {
            self.bump();
        }
    }

    pub fn eat_sym(&mut self, sym: Sym) -> bool {
        if matches!(&self.peek().kind, TokenKind::Sym(s) if *s == sym) {
            self.bump();
            true
        } else {
            false
        }
    }

    pub fn expect_sym(&mut self, sym: Sym) -> Result<(), AsmError> {
        if self.eat_sym(sym) {
            Ok(())
        } else {
            Err(AsmError::Parse {
                pos: self.peek().pos.clone(),
                message: format!("expected {sym:?}, found {:?}", self.peek().kind),
            })
        }
    }
}

/// Parses one expression from the cursor, stopping at the first token the
/// grammar around it doesn't consume (comma, newline, closing bracket, ...).
pub fn parse_expr(cur: &mut TokenCursor) -> Result<Expr, AsmError> {
    parse_ternary(cur)
}

fn parse_ternary(cur: &mut TokenCursor) -> Result<Expr, AsmError> {
    let cond = parse_or_or(cur)?;
    if matches!(&cur.peek().kind, TokenKind::Sym(Sym::Question)) {
        let pos = cur.bump().pos;
        let then_branch = parse_ternary(cur)?;
        cur.expect_sym(Sym::Colon)?;
        let else_branch = parse_ternary(cur)?;
        Ok(Expr::Ternary(
            Box::new(cond),
            Box::new(then_branch),
            Box::new(else_branch),
            pos,
        ))
    } else {
        Ok(cond)
    }
}

macro_rules! left_assoc {
    ($name:ident, $next:ident, [$(($sym:pat, $op:expr)),+ $(,)?]) => {
        fn $name(cur: &mut TokenCursor) -> Result<Expr, AsmError> {
            let mut lhs = $next(cur)?;
            loop {
                let op = match &cur.peek().kind {
                    $(TokenKind::Sym($sym) => Some($op),)+
                    _ => None,
                };
                match op {
                    Some(op) => {
                        let pos = cur.bump().pos;
                        let rhs = $next(cur)?;
                        lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs), pos);
                    }
                    None => break,
                }
            }
            Ok(lhs)
        }
    };
}

left_assoc!(parse_or_or, parse_and_and, [(Sym::PipePipe, BinOp::OrOr)]);
left_assoc!(parse_and_and, parse_bit_or, [(Sym::AmpAmp, BinOp::AndAnd)]);
left_assoc!(parse_bit_or, parse_bit_xor, [(Sym::Pipe, BinOp::Or)]);
left_assoc!(parse_bit_xor, parse_bit_and, [(Sym::Caret, BinOp::Xor)]);
left_assoc!(parse_bit_and, parse_equality, [(Sym::Amp, BinOp::And)]);
left_assoc!(
    parse_equality,
    parse_relational,
    [(Sym::Eq2, BinOp::Eq), (Sym::Ne, BinOp::Ne)]
);
left_assoc!(
    parse_relational,
    parse_shift,
    [
        (Sym::Lt, BinOp::Lt),
        (Sym::Le, BinOp::Le),
        (Sym::Gt, BinOp::Gt),
        (Sym::Ge, BinOp::Ge),
    ]
);
left_assoc!(
    parse_shift,
    parse_additive,
    [
        (Sym::Shl, BinOp::Shl),
        (Sym::Shr, BinOp::Shr),
        (Sym::Ushr, BinOp::Ushr),
    ]
);
left_assoc!(
    parse_additive,
    parse_multiplicative,
    [(Sym::Plus, BinOp::Add), (Sym::Minus, BinOp::Sub)]
);
left_assoc!(
    parse_multiplicative,
    parse_unary,
    [
        (Sym::Star, BinOp::Mul),
        (Sym::Slash, BinOp::Div),
        (Sym::Percent, BinOp::Mod),
    ]
);

fn parse_unary(cur: &mut TokenCursor) -> Result<Expr, AsmError> {
    let op = match &cur.peek().kind {
        TokenKind::Sym(Sym::Minus) => Some(UnOp::Neg),
        TokenKind::Sym(Sym::Plus) => Some(UnOp::Pos),
        TokenKind::Sym(Sym::Bang) => Some(UnOp::Not),
        TokenKind::Sym(Sym::Tilde) => Some(UnOp::BitNot),
        _ => None,
    };
    match op {
        Some(op) => {
            let pos = cur.bump().pos;
            let operand = parse_unary(cur)?;
            Ok(Expr::Unary(op, Box::new(operand), pos))
        }
        None => parse_primary(cur),
    }
}

fn parse_primary(cur: &mut TokenCursor) -> Result<Expr, AsmError> {
    let tok = cur.peek().clone();
    match tok.kind {
        TokenKind::Number(n) => {
            cur.bump();
            Ok(Expr::Number(n.value, n.is_float))
        }
        TokenKind::Str(lit) => {
            cur.bump();
            string_literal_to_expr(lit)
        }
        TokenKind::Ident(_) => parse_dotted_name_or_call(cur),
        TokenKind::Sym(Sym::LParen) => {
            cur.bump();
            let inner = parse_expr(cur)?;
            cur.expect_sym(Sym::RParen)?;
            Ok(inner)
        }
        _ => Err(AsmError::Parse {
            pos: tok.pos,
            message: format!("expected an expression, found {:?}", tok.kind),
        }),
    }
}

fn parse_dotted_name_or_call(cur: &mut TokenCursor) -> Result<Expr, AsmError> {
    let start_pos = cur.peek().pos.clone();
    let mut name = expect_ident(cur)?;
    while matches!(&cur.peek().kind, TokenKind::Sym(Sym::Dot))
        && matches!(&cur.peek_at(1).kind, TokenKind::Ident(_))
    {
        cur.bump();
        name.push('.');
        name.push_str(&expect_ident(cur)?);
    }

    if cur.eat_sym(Sym::LParen) {
        let mut args = Vec::new();
        if !matches!(&cur.peek().kind, TokenKind::Sym(Sym::RParen)) {
            loop {
                args.push(parse_expr(cur)?);
                if !cur.eat_sym(Sym::Comma) {
                    break;
                }
            }
        }
        cur.expect_sym(Sym::RParen)?;
        Ok(Expr::Call(name, args, start_pos))
    } else {
        Ok(Expr::Name(name, start_pos))
    }
}

fn expect_ident(cur: &mut TokenCursor) -> Result<String, AsmError> {
    match &cur.peek().kind {
        TokenKind::Ident(s) => {
            let s = s.clone();
            cur.bump();
            Ok(s)
        }
        other => Err(AsmError::Parse {
            pos: cur.peek().pos.clone(),
            message: format!("expected an identifier, found {other:?}"),
        }),
    }
}

fn string_literal_to_expr(lit: crate::lexer::token::StrLit) -> Result<Expr, AsmError> {
    if lit.is_static() {
        return Ok(Expr::Str(lit.static_bytes()));
    }
    let mut parts = Vec::new();
    for part in lit.parts {
        match part {
            StrPart::Lit(bytes) => parts.push(Expr::Str(bytes)),
            StrPart::Interp(toks) => {
                let mut sub = TokenCursor::new(&toks);
                parts.push(parse_expr(&mut sub)?);
            }
        }
    }
    Ok(Expr::Concat(parts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize_source;
    use std::path::PathBuf;
    use std::rc::Rc;

    fn parse(src: &str) -> Expr {
        let toks = tokenize_source(src, Rc::new(PathBuf::from("t.s"))).unwrap();
        let mut cur = TokenCursor::new(&toks);
        parse_expr(&mut cur).unwrap()
    }

    #[test]
    fn precedence_mul_over_add() {
        let e = parse("1 + 2 * 3");
        match e {
            Expr::Binary(BinOp::Add, _, rhs, _) => {
                assert!(matches!(*rhs, Expr::Binary(BinOp::Mul, ..)));
            }
            _ => panic!("wrong shape"),
        }
    }

    #[test]
    fn ternary_parses() {
        let e = parse("1 ? 2 : 3");
        assert!(matches!(e, Expr::Ternary(..)));
    }

    #[test]
    fn dotted_name_parses() {
        let e = parse("S.b._bytes");
        match e {
            Expr::Name(n, _) => assert_eq!(n, "S.b._bytes"),
            _ => panic!("wrong shape"),
        }
    }

    #[test]
    fn parameterized_constant_call() {
        let e = parse("scale(2, 3)");
        match e {
            Expr::Call(name, args, _) => {
                assert_eq!(name, "scale");
                assert_eq!(args.len(), 2);
            }
            _ => panic!("wrong shape"),
        }
    }
}
