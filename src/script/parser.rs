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

//! A single-pass, top-down-precedence parser over the same token stream the
//! assembler lexes (§4.9). Statements are newline-separated exactly as in
//! the outer assembly language.

use super::ast::*;
use crate::errors::AsmError;
use crate::expr::TokenCursor;
use crate::lexer::token::{StrPart, Sym, Token, TokenKind};
use crate::pos::SourcePos;
use std::rc::Rc;

const BARE_ARG_NATIVES: &[&str] = &[
    "printf", "error", "i8", "i16", "i32", "u8", "u16", "u32", "b8", "b16", "b32", "i8fill",
    "i16fill", "i32fill", "u8fill", "u16fill", "u32fill", "b8fill", "b16fill", "b32fill",
];

pub fn parse_program(tokens: &[Token]) -> Result<Vec<Stmt>, AsmError> {
    let mut cur = TokenCursor::new(tokens);
    parse_block(&mut cur, &[])
}

fn is_kw(cur: &TokenCursor, kw: &str) -> bool {
    matches!(&cur.peek().kind, TokenKind::Ident(s) if s == kw)
}

fn any_kw(cur: &TokenCursor, kws: &[&str]) -> bool {
    matches!(&cur.peek().kind, TokenKind::Ident(s) if kws.contains(&s.as_str()))
}

fn parse_block(cur: &mut TokenCursor, terminators: &[&str]) -> Result<Vec<Stmt>, AsmError> {
    let mut out = Vec::new();
    loop {
        cur.skip_newlines();
        if cur.at_eof() || any_kw(cur, terminators) {
            break;
        }
        out.push(parse_stmt(cur)?);
    }
    Ok(out)
}

fn expect_ident(cur: &mut TokenCursor) -> Result<String, AsmError> {
    match &cur.peek().kind {
        TokenKind::Ident(s) => {
            let s = s.clone();
            cur.bump();
            Ok(s)
        }
        other => Err(AsmError::Script {
            pos: cur.peek().pos.clone(),
            message: format!("expected an identifier, found {other:?}"),
        }),
    }
}

fn expect_kw(cur: &mut TokenCursor, kw: &str) -> Result<SourcePos, AsmError> {
    if is_kw(cur, kw) {
        Ok(cur.bump().pos)
    } else {
        Err(AsmError::Script {
            pos: cur.peek().pos.clone(),
            message: format!("expected `{kw}`, found {:?}", cur.peek().kind),
        })
    }
}

fn parse_stmt(cur: &mut TokenCursor) -> Result<Stmt, AsmError> {
    if let TokenKind::Ident(name) = cur.peek().kind.clone() {
        // `label:`
        if matches!(&cur.peek_at(1).kind, TokenKind::Sym(Sym::Colon)) {
            cur.bump();
            cur.bump();
            return Ok(Stmt::Label(name));
        }
        match name.as_str() {
            "let" => return parse_let(cur),
            "if" => return parse_if(cur),
            "for" => return parse_for(cur),
            "do" => return parse_do_while(cur),
            "break" => {
                cur.bump();
                return Ok(Stmt::Break);
            }
            "continue" => {
                cur.bump();
                return Ok(Stmt::Continue);
            }
            "return" => {
                cur.bump();
                if cur.peek().is_newline() || cur.at_eof() {
                    return Ok(Stmt::Return(None));
                }
                return Ok(Stmt::Return(Some(parse_expr(cur)?)));
            }
            "goto" => {
                let pos = cur.bump().pos;
                let target = expect_ident(cur)?;
                return Ok(Stmt::Goto(target, pos));
            }
            "def" => return parse_def_stmt(cur),
            "namespace" => return parse_namespace(cur),
            "using" => {
                let pos = cur.bump().pos;
                let ns = expect_ident(cur)?;
                return Ok(Stmt::Using(ns, pos));
            }
            "exit" => {
                cur.bump();
                return Ok(Stmt::Exit);
            }
            "put" => {
                let pos = cur.bump().pos;
                let args = parse_expr_list(cur)?;
                return Ok(Stmt::Put(args, pos));
            }
            "export" => {
                let pos = cur.bump().pos;
                let name = expect_ident(cur)?;
                cur.expect_sym(Sym::Assign)?;
                let value = parse_expr(cur)?;
                return Ok(Stmt::Export(name, value, pos));
            }
            _ if BARE_ARG_NATIVES.contains(&name.as_str()) => {
                let pos = cur.bump().pos;
                let args = if cur.peek().is_newline() || cur.at_eof() {
                    Vec::new()
                } else {
                    parse_expr_list(cur)?
                };
                return Ok(Stmt::NativeStmt(name, args, pos));
            }
            _ => {}
        }
    }
    parse_expr_or_assign(cur)
}

fn parse_let(cur: &mut TokenCursor) -> Result<Stmt, AsmError> {
    let pos = cur.bump().pos;
    let name = expect_ident(cur)?;
    cur.expect_sym(Sym::Assign)?;
    let value = parse_expr(cur)?;
    Ok(Stmt::Let(name, value, pos))
}

fn parse_if(cur: &mut TokenCursor) -> Result<Stmt, AsmError> {
    cur.bump();
    let mut arms = Vec::new();
    let cond = parse_expr(cur)?;
    let body = parse_block(cur, &["elseif", "else", "end"])?;
    arms.push((cond, body));
    while is_kw(cur, "elseif") {
        cur.bump();
        let c = parse_expr(cur)?;
        let b = parse_block(cur, &["elseif", "else", "end"])?;
        arms.push((c, b));
    }
    let else_body = if is_kw(cur, "else") {
        cur.bump();
        parse_block(cur, &["end"])?
    } else {
        Vec::new()
    };
    expect_kw(cur, "end")?;
    Ok(Stmt::If(arms, else_body))
}

fn parse_for(cur: &mut TokenCursor) -> Result<Stmt, AsmError> {
    cur.bump();
    if is_kw(cur, "var") {
        cur.bump();
        let v = expect_ident(cur)?;
        let idx = if cur.eat_sym(Sym::Comma) {
            Some(expect_ident(cur)?)
        } else {
            None
        };
        cur.expect_sym(Sym::Colon)?;
        let iter = parse_expr(cur)?;
        let body = parse_block(cur, &["end"])?;
        expect_kw(cur, "end")?;
        Ok(Stmt::ForIn(v, idx, iter, body))
    } else {
        let body = parse_block(cur, &["end"])?;
        expect_kw(cur, "end")?;
        Ok(Stmt::ForInfinite(body))
    }
}

fn parse_do_while(cur: &mut TokenCursor) -> Result<Stmt, AsmError> {
    cur.bump();
    let body = parse_block(cur, &["while"])?;
    expect_kw(cur, "while")?;
    let cond = parse_expr(cur)?;
    let _ = cur.eat_sym(Sym::Colon);
    expect_kw(cur, "end")?;
    Ok(Stmt::DoWhile(body, cond))
}

fn parse_params(cur: &mut TokenCursor) -> Result<Vec<String>, AsmError> {
    cur.expect_sym(Sym::LParen)?;
    let mut out = Vec::new();
    if !matches!(&cur.peek().kind, TokenKind::Sym(Sym::RParen)) {
        loop {
            out.push(expect_ident(cur)?);
            if !cur.eat_sym(Sym::Comma) {
                break;
            }
        }
    }
    cur.expect_sym(Sym::RParen)?;
    Ok(out)
}

fn parse_def_stmt(cur: &mut TokenCursor) -> Result<Stmt, AsmError> {
    let pos = cur.bump().pos;
    let name = expect_ident(cur)?;
    let params = parse_params(cur)?;
    let body = parse_block(cur, &["end"])?;
    expect_kw(cur, "end")?;
    Ok(Stmt::Def(Rc::new(FuncDef {
        name: Some(name),
        params,
        body,
        pos,
    })))
}

fn parse_namespace(cur: &mut TokenCursor) -> Result<Stmt, AsmError> {
    cur.bump();
    let name = expect_ident(cur)?;
    let body = parse_block(cur, &["end"])?;
    expect_kw(cur, "end")?;
    Ok(Stmt::Namespace(name, body))
}

fn parse_expr_list(cur: &mut TokenCursor) -> Result<Vec<Expr>, AsmError> {
    let mut out = Vec::new();
    loop {
        out.push(parse_expr(cur)?);
        if !cur.eat_sym(Sym::Comma) {
            break;
        }
    }
    Ok(out)
}

fn parse_expr_or_assign(cur: &mut TokenCursor) -> Result<Stmt, AsmError> {
    let start = cur_snapshot(cur);
    let e = parse_expr(cur)?;
    if cur.eat_sym(Sym::Assign) {
        let lv = expr_to_lvalue(e, start)?;
        let value = parse_expr(cur)?;
        return Ok(Stmt::Assign(lv, value));
    }
    Ok(Stmt::Expr(e))
}

fn cur_snapshot(cur: &TokenCursor) -> SourcePos {
    cur.peek().pos.clone()
}

fn expr_to_lvalue(e: Expr, pos: SourcePos) -> Result<LValue, AsmError> {
    match e {
        Expr::Var(n, p) => Ok(LValue::Var(n, p)),
        Expr::Index(base, idx, p) => Ok(LValue::Index(base, idx, p)),
        Expr::Field(base, name, p) => Ok(LValue::Field(base, name, p)),
        _ => Err(AsmError::Script {
            pos,
            message: "left-hand side of `=` is not assignable".into(),
        }),
    }
}

pub fn parse_expr(cur: &mut TokenCursor) -> Result<Expr, AsmError> {
    parse_ternary(cur)
}

fn parse_ternary(cur: &mut TokenCursor) -> Result<Expr, AsmError> {
    let cond = parse_or(cur)?;
    if cur.eat_sym(Sym::Question) {
        let then_e = parse_ternary(cur)?;
        cur.expect_sym(Sym::Colon)?;
        let else_e = parse_ternary(cur)?;
        Ok(Expr::Ternary(Box::new(cond), Box::new(then_e), Box::new(else_e)))
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

left_assoc!(parse_or, parse_and, [(Sym::PipePipe, BinOp::Or)]);
left_assoc!(parse_and, parse_bit_or, [(Sym::AmpAmp, BinOp::And)]);
left_assoc!(parse_bit_or, parse_bit_xor, [(Sym::Pipe, BinOp::BitOr)]);
left_assoc!(parse_bit_xor, parse_bit_and, [(Sym::Caret, BinOp::BitXor)]);
left_assoc!(parse_bit_and, parse_equality, [(Sym::Amp, BinOp::BitAnd)]);
left_assoc!(parse_equality, parse_relational, [(Sym::Eq2, BinOp::Eq), (Sym::Ne, BinOp::Ne)]);
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
    [(Sym::Shl, BinOp::Shl), (Sym::Shr, BinOp::Shr), (Sym::Ushr, BinOp::Ushr)]
);
left_assoc!(parse_additive, parse_multiplicative, [(Sym::Plus, BinOp::Add), (Sym::Minus, BinOp::Sub)]);
left_assoc!(
    parse_multiplicative,
    parse_unary,
    [(Sym::Star, BinOp::Mul), (Sym::Slash, BinOp::Div), (Sym::Percent, BinOp::Mod)]
);

fn parse_unary(cur: &mut TokenCursor) -> Result<Expr, AsmError> {
    let op = match &cur.peek().kind {
        TokenKind::Sym(Sym::Minus) => Some(UnOp::Neg),
        TokenKind::Sym(Sym::Bang) => Some(UnOp::Not),
        TokenKind::Sym(Sym::Tilde) => Some(UnOp::BitNot),
        _ => None,
    };
    match op {
        Some(op) => {
            let pos = cur.bump().pos;
            Ok(Expr::Unary(op, Box::new(parse_unary(cur)?), pos))
        }
        None => parse_postfix(cur),
    }
}

fn parse_postfix(cur: &mut TokenCursor) -> Result<Expr, AsmError> {
    let mut e = parse_primary(cur)?;
    loop {
        match &cur.peek().kind {
            TokenKind::Sym(Sym::LBracket) => {
                let pos = cur.bump().pos;
                let idx = parse_expr(cur)?;
                cur.expect_sym(Sym::RBracket)?;
                e = Expr::Index(Box::new(e), Box::new(idx), pos);
            }
            TokenKind::Sym(Sym::Dot) => {
                let pos = cur.bump().pos;
                let name = expect_ident(cur)?;
                e = Expr::Field(Box::new(e), name, pos);
            }
            TokenKind::Sym(Sym::LParen) => {
                let pos = cur.bump().pos;
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
                e = Expr::Call(Box::new(e), args, pos);
            }
            _ => break,
        }
    }
    Ok(e)
}

fn parse_primary(cur: &mut TokenCursor) -> Result<Expr, AsmError> {
    let tok = cur.peek().clone();
    match tok.kind {
        TokenKind::Number(n) => {
            cur.bump();
            Ok(Expr::Num(n.value))
        }
        TokenKind::Str(lit) => {
            cur.bump();
            if lit.is_static() {
                Ok(Expr::Str(lit.static_bytes()))
            } else {
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
                Ok(Expr::Interp(parts))
            }
        }
        TokenKind::Sym(Sym::LBracket) => {
            cur.bump();
            let mut items = Vec::new();
            if !matches!(&cur.peek().kind, TokenKind::Sym(Sym::RBracket)) {
                loop {
                    items.push(parse_expr(cur)?);
                    if !cur.eat_sym(Sym::Comma) {
                        break;
                    }
                }
            }
            cur.expect_sym(Sym::RBracket)?;
            Ok(Expr::List(items))
        }
        TokenKind::Sym(Sym::LParen) => {
            cur.bump();
            let inner = parse_expr(cur)?;
            cur.expect_sym(Sym::RParen)?;
            Ok(inner)
        }
        TokenKind::Ident(name) => match name.as_str() {
            "nil" => {
                cur.bump();
                Ok(Expr::Nil)
            }
            "true" => {
                cur.bump();
                Ok(Expr::Num(1.0))
            }
            "false" => {
                cur.bump();
                Ok(Expr::Num(0.0))
            }
            "def" => {
                let pos = cur.bump().pos;
                let params = parse_params(cur)?;
                let body = parse_block(cur, &["end"])?;
                expect_kw(cur, "end")?;
                Ok(Expr::Func(Rc::new(FuncDef {
                    name: None,
                    params,
                    body,
                    pos,
                })))
            }
            _ => {
                cur.bump();
                Ok(Expr::Var(name, tok.pos))
            }
        },
        other => Err(AsmError::Script {
            pos: tok.pos,
            message: format!("expected an expression, found {other:?}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize_source;
    use std::path::PathBuf;

    fn toks(src: &str) -> Vec<Token> {
        tokenize_source(src, Rc::new(PathBuf::from("t.s"))).unwrap()
    }

    #[test]
    fn parses_let_and_expr_stmt() {
        let t = toks("let x = 1 + 2\nprintf \"hi\"");
        let prog = parse_program(&t).unwrap();
        assert_eq!(prog.len(), 2);
        assert!(matches!(prog[0], Stmt::Let(..)));
        assert!(matches!(prog[1], Stmt::NativeStmt(..)));
    }

    #[test]
    fn parses_if_elseif_else() {
        let t = toks("if x\nlet a = 1\nelseif y\nlet a = 2\nelse\nlet a = 3\nend");
        let prog = parse_program(&t).unwrap();
        match &prog[0] {
            Stmt::If(arms, else_body) => {
                assert_eq!(arms.len(), 2);
                assert_eq!(else_body.len(), 1);
            }
            _ => panic!("wrong shape"),
        }
    }

    #[test]
    fn parses_function_call_and_index() {
        let t = toks("let a = foo(1, 2)[0]");
        let prog = parse_program(&t).unwrap();
        match &prog[0] {
            Stmt::Let(_, Expr::Index(base, _, _), _) => {
                assert!(matches!(**base, Expr::Call(..)));
            }
            _ => panic!("wrong shape"),
        }
    }
}
