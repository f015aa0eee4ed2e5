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

//! Turns the textual operand syntax following a mnemonic into the
//! `encoder::operand::Operand` shapes the encoding tables match against.

use crate::encoder::operand::{MemOperand, Offset, Operand, Shift, ShiftOp};
use crate::errors::AsmError;
use crate::expr::eval::{evaluate, EvalResult};
use crate::expr::{parse_expr, Expr, TokenCursor};
use crate::lexer::token::{Sym, TokenKind};
use crate::pos::SourcePos;
use crate::symbol::{Entry, Scope, ScopeRef};

fn lookup_register(scope: &ScopeRef, name: &str) -> Option<u8> {
    match Scope::lookup_entry(scope, name) {
        Some(Entry::Register(idx)) => Some(idx),
        _ => None,
    }
}

pub(crate) fn resolve_int(expr: &Expr, scope: &ScopeRef) -> Result<i64, AsmError> {
    match evaluate(expr, scope)? {
        EvalResult::Resolved(v) => Ok(v as i64),
        _ => Err(AsmError::Encoding {
            pos: expr.pos(),
            message: "expression must resolve to a concrete value here".into(),
        }),
    }
}

fn is_shift_keyword(kind: &TokenKind) -> bool {
    matches!(kind, TokenKind::Ident(s) if matches!(s.as_str(), "lsl" | "lsr" | "asr" | "ror" | "rrx"))
}

fn parse_shift_suffix(cur: &mut TokenCursor, scope: &ScopeRef) -> Result<Shift, AsmError> {
    let shift_op = match &cur.peek().kind {
        TokenKind::Ident(s) => match s.as_str() {
            "lsl" => ShiftOp::Lsl,
            "lsr" => ShiftOp::Lsr,
            "asr" => ShiftOp::Asr,
            "ror" => ShiftOp::Ror,
            "rrx" => ShiftOp::Rrx,
            _ => return Ok(Shift::None),
        },
        _ => return Ok(Shift::None),
    };
    cur.bump();
    if shift_op == ShiftOp::Rrx {
        return Ok(Shift::Immediate(ShiftOp::Rrx, 0));
    }
    if cur.eat_sym(Sym::Hash) {
        let e = parse_expr(cur)?;
        let v = resolve_int(&e, scope)?;
        Ok(Shift::Immediate(shift_op, v as u32))
    } else if let TokenKind::Ident(name) = &cur.peek().kind {
        let name = name.clone();
        if let Some(r) = lookup_register(scope, &name) {
            cur.bump();
            Ok(Shift::Register(shift_op, r))
        } else {
            Err(AsmError::Parse {
                pos: cur.peek().pos.clone(),
                message: format!("`{name}` is not a register"),
            })
        }
    } else {
        Err(AsmError::Parse {
            pos: cur.peek().pos.clone(),
            message: "expected a shift amount".into(),
        })
    }
}

fn parse_reglist(cur: &mut TokenCursor, scope: &ScopeRef) -> Result<Operand, AsmError> {
    cur.expect_sym(Sym::LBrace)?;
    let mut mask: u16 = 0;
    if !matches!(&cur.peek().kind, TokenKind::Sym(Sym::RBrace)) {
        loop {
            let name = expect_reg_name(cur)?;
            let lo = lookup_register(scope, &name).ok_or_else(|| unknown_reg(cur, &name))?;
            if cur.eat_sym(Sym::Minus) {
                let hi_name = expect_reg_name(cur)?;
                let hi = lookup_register(scope, &hi_name).ok_or_else(|| unknown_reg(cur, &hi_name))?;
                let (lo, hi) = (lo.min(hi), lo.max(hi));
                for r in lo..=hi {
                    mask |= 1 << r;
                }
            } else {
                mask |= 1 << lo;
            }
            if !cur.eat_sym(Sym::Comma) {
                break;
            }
        }
    }
    cur.expect_sym(Sym::RBrace)?;
    Ok(Operand::RegList(mask))
}

fn expect_reg_name(cur: &mut TokenCursor) -> Result<String, AsmError> {
    match &cur.peek().kind {
        TokenKind::Ident(s) => {
            let s = s.clone();
            cur.bump();
            Ok(s)
        }
        other => Err(AsmError::Parse {
            pos: cur.peek().pos.clone(),
            message: format!("expected a register name, found {other:?}"),
        }),
    }
}

fn unknown_reg(cur: &TokenCursor, name: &str) -> AsmError {
    AsmError::UnknownSymbol {
        pos: cur.peek().pos.clone(),
        name: name.to_string(),
    }
}

/// `[rN]`, `[rN, #imm]`, `[rN, ±rM]`, `[rN, ±rM, shift]`, with trailing `!`
/// for pre-indexed writeback, or `[rN], ±…` for post-indexed.
fn parse_mem(cur: &mut TokenCursor, scope: &ScopeRef) -> Result<Operand, AsmError> {
    cur.expect_sym(Sym::LBracket)?;
    let base_name = expect_reg_name(cur)?;
    let base = lookup_register(scope, &base_name).ok_or_else(|| unknown_reg(cur, &base_name))?;

    let mut offset = Offset::None;
    let mut had_inner_offset = false;
    if cur.eat_sym(Sym::Comma) {
        had_inner_offset = true;
        offset = parse_offset(cur, scope)?;
    }
    cur.expect_sym(Sym::RBracket)?;

    if cur.eat_sym(Sym::Bang) {
        return Ok(Operand::Mem(MemOperand::Offset { base, offset, writeback: true }));
    }

    if !had_inner_offset && cur.eat_sym(Sym::Comma) {
        let post = parse_offset(cur, scope)?;
        return Ok(Operand::Mem(MemOperand::PostIndexed { base, offset: post }));
    }

    Ok(Operand::Mem(MemOperand::Offset { base, offset, writeback: false }))
}

fn parse_offset(cur: &mut TokenCursor, scope: &ScopeRef) -> Result<Offset, AsmError> {
    if cur.eat_sym(Sym::Hash) {
        let e = parse_expr(cur)?;
        let v = resolve_int(&e, scope)?;
        return Ok(Offset::Imm(v as i32));
    }
    let negative = cur.eat_sym(Sym::Minus);
    let _ = cur.eat_sym(Sym::Plus);
    let name = expect_reg_name(cur)?;
    let reg = lookup_register(scope, &name).ok_or_else(|| unknown_reg(cur, &name))?;
    if cur.eat_sym(Sym::Comma) {
        let shift = parse_shift_suffix(cur, scope)?;
        let (op, amount) = match shift {
            Shift::Immediate(op, amount) => (op, amount),
            Shift::None => return Ok(Offset::Reg(!negative, reg)),
            Shift::Register(..) => {
                return Err(AsmError::Parse {
                    pos: cur.peek().pos.clone(),
                    message: "a memory offset shift amount must be an immediate".into(),
                })
            }
        };
        Ok(Offset::RegShift(!negative, reg, op, amount))
    } else {
        Ok(Offset::Reg(!negative, reg))
    }
}

/// Parses a single operand: immediate (`#expr`), register list (`{...}`),
/// memory operand (`[...]`), a register (optionally shifted), or a bare
/// expression (branch targets, `swi` comments, and the like).
pub fn parse_operand(cur: &mut TokenCursor, scope: &ScopeRef) -> Result<Operand, AsmError> {
    match &cur.peek().kind {
        TokenKind::Sym(Sym::Hash) => {
            cur.bump();
            let e = parse_expr(cur)?;
            let v = resolve_int(&e, scope)?;
            Ok(Operand::Imm(v))
        }
        TokenKind::Sym(Sym::LBrace) => parse_reglist(cur, scope),
        TokenKind::Sym(Sym::LBracket) => parse_mem(cur, scope),
        TokenKind::Ident(name) => {
            if let Some(reg) = lookup_register(scope, name) {
                cur.bump();
                if matches!(&cur.peek().kind, TokenKind::Sym(Sym::Comma)) && is_shift_keyword(&cur.peek_at(1).kind) {
                    cur.bump(); // comma
                    let shift = parse_shift_suffix(cur, scope)?;
                    Ok(Operand::ShiftedReg(reg, shift))
                } else {
                    Ok(Operand::Reg(reg))
                }
            } else {
                let e = parse_expr(cur)?;
                let v = resolve_int(&e, scope)?;
                Ok(Operand::Imm(v))
            }
        }
        _ => {
            let e = parse_expr(cur)?;
            let v = resolve_int(&e, scope)?;
            Ok(Operand::Imm(v))
        }
    }
}

/// Parses a comma-separated operand list to end of line.
pub fn parse_operand_list(cur: &mut TokenCursor, scope: &ScopeRef) -> Result<Vec<Operand>, AsmError> {
    let mut out = Vec::new();
    if cur.at_eof() || cur.peek().is_newline() {
        return Ok(out);
    }
    loop {
        out.push(parse_operand(cur, scope)?);
        if !cur.eat_sym(Sym::Comma) {
            break;
        }
    }
    Ok(out)
}

pub fn pos_of(cur: &TokenCursor) -> SourcePos {
    cur.peek().pos.clone()
}
