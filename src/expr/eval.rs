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

//! The partial evaluator of §4.2. `evaluate` never panics on an unresolved
//! name; it returns `Unresolved` and lets the caller decide whether that is
//! fatal (an address-bearing expression) or fine (a constant nobody uses).

use super::{BinOp, Expr, UnOp};
use crate::errors::AsmError;
use crate::pos::SourcePos;

/// The result of partially evaluating an expression. `DeferredLinear(k0, k1)`
/// is the closed form `k0 + k1 * _base`; arithmetic that keeps the `_base`
/// coefficient linear (addition, subtraction, scaling by a resolved
/// constant) stays representable, everything else collapses to
/// `Unresolved`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EvalResult {
    Resolved(f64),
    DeferredLinear(f64, f64),
    Unresolved,
}

impl EvalResult {
    pub fn as_resolved(&self) -> Option<f64> {
        match self {
            EvalResult::Resolved(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_unresolved(&self) -> bool {
        matches!(self, EvalResult::Unresolved)
    }
}

/// What the evaluator needs from the outside world: names (labels,
/// constants, registers, `_base`) and parameterized-constant invocation.
/// Implemented by `crate::symbol::Scope`.
pub trait EvalContext {
    fn lookup(&self, name: &str, pos: &SourcePos) -> Result<EvalResult, AsmError>;
    fn call(&self, name: &str, args: &[EvalResult], pos: &SourcePos) -> Result<EvalResult, AsmError>;
}

pub fn evaluate(expr: &Expr, ctx: &dyn EvalContext) -> Result<EvalResult, AsmError> {
    match expr {
        Expr::Number(v, _) => Ok(EvalResult::Resolved(*v)),
        Expr::Str(_) | Expr::Concat(_) => Err(AsmError::Encoding {
            pos: expr.pos(),
            message: "a string cannot be used in a numeric expression".into(),
        }),
        Expr::Name(name, pos) => ctx.lookup(name, pos),
        Expr::Call(name, args, pos) => {
            let mut vals = Vec::with_capacity(args.len());
            for a in args {
                vals.push(evaluate(a, ctx)?);
            }
            ctx.call(name, &vals, pos)
        }
        Expr::Unary(op, inner, pos) => {
            let v = evaluate(inner, ctx)?;
            eval_unary(*op, v, pos)
        }
        Expr::Binary(op, lhs, rhs, pos) => {
            // Short-circuit boolean operators must not force the other side
            // to resolve when the result is already determined.
            if matches!(op, BinOp::AndAnd) {
                let l = evaluate(lhs, ctx)?;
                if let EvalResult::Resolved(lv) = l {
                    if lv == 0.0 {
                        return Ok(EvalResult::Resolved(0.0));
                    }
                }
                let r = evaluate(rhs, ctx)?;
                return eval_binary(BinOp::AndAnd, l, r, pos);
            }
            if matches!(op, BinOp::OrOr) {
                let l = evaluate(lhs, ctx)?;
                if let EvalResult::Resolved(lv) = l {
                    if lv != 0.0 {
                        return Ok(EvalResult::Resolved(1.0));
                    }
                }
                let r = evaluate(rhs, ctx)?;
                return eval_binary(BinOp::OrOr, l, r, pos);
            }
            let l = evaluate(lhs, ctx)?;
            let r = evaluate(rhs, ctx)?;
            eval_binary(*op, l, r, pos)
        }
        Expr::Ternary(cond, then_e, else_e, pos) => {
            let c = evaluate(cond, ctx)?;
            match c {
                EvalResult::Resolved(v) => {
                    if v != 0.0 {
                        evaluate(then_e, ctx)
                    } else {
                        evaluate(else_e, ctx)
                    }
                }
                EvalResult::DeferredLinear(..) => Err(AsmError::Encoding {
                    pos: pos.clone(),
                    message: "ternary condition cannot depend on `_base`".into(),
                }),
                EvalResult::Unresolved => Ok(EvalResult::Unresolved),
            }
        }
    }
}

fn truthy(v: f64) -> f64 {
    if v != 0.0 {
        1.0
    } else {
        0.0
    }
}

/// 32-bit wrapping conversion used for the bitwise/shift family (§4.2: `>>>`
/// is logical on 32 bits, `>>` arithmetic on 32 bits).
fn to_i32(v: f64) -> i32 {
    if v.is_nan() {
        0
    } else {
        (v as i64 as u64 as u32) as i32
    }
}

fn eval_unary(op: UnOp, v: EvalResult, pos: &SourcePos) -> Result<EvalResult, AsmError> {
    match (op, v) {
        (_, EvalResult::Unresolved) => Ok(EvalResult::Unresolved),
        (UnOp::Pos, v) => Ok(v),
        (UnOp::Neg, EvalResult::Resolved(v)) => Ok(EvalResult::Resolved(-v)),
        (UnOp::Neg, EvalResult::DeferredLinear(k0, k1)) => Ok(EvalResult::DeferredLinear(-k0, -k1)),
        (UnOp::Not, EvalResult::Resolved(v)) => Ok(EvalResult::Resolved(if v == 0.0 { 1.0 } else { 0.0 })),
        (UnOp::BitNot, EvalResult::Resolved(v)) => Ok(EvalResult::Resolved(!to_i32(v) as f64)),
        (UnOp::Not | UnOp::BitNot, EvalResult::DeferredLinear(..)) => Err(AsmError::Encoding {
            pos: pos.clone(),
            message: "operator is not linear in `_base`".into(),
        }),
    }
}

fn eval_binary(op: BinOp, l: EvalResult, r: EvalResult, pos: &SourcePos) -> Result<EvalResult, AsmError> {
    use EvalResult::*;

    if let (Resolved(a), Resolved(b)) = (l, r) {
        return Ok(Resolved(eval_binary_numeric(op, a, b)));
    }

    if matches!(l, Unresolved) || matches!(r, Unresolved) {
        return Ok(Unresolved);
    }

    // At least one side is DeferredLinear and neither side is Unresolved.
    match op {
        BinOp::Add => Ok(combine_linear(l, r, 1.0)),
        BinOp::Sub => Ok(combine_linear(l, negate(r), 1.0)),
        BinOp::Mul => match (l, r) {
            (DeferredLinear(k0, k1), Resolved(c)) | (Resolved(c), DeferredLinear(k0, k1)) => {
                Ok(DeferredLinear(k0 * c, k1 * c))
            }
            _ => Err(non_linear(pos)),
        },
        BinOp::Div => match (l, r) {
            (DeferredLinear(k0, k1), Resolved(c)) if c != 0.0 => Ok(DeferredLinear(k0 / c, k1 / c)),
            _ => Err(non_linear(pos)),
        },
        _ => Err(non_linear(pos)),
    }
}

fn negate(v: EvalResult) -> EvalResult {
    match v {
        EvalResult::Resolved(v) => EvalResult::Resolved(-v),
        EvalResult::DeferredLinear(k0, k1) => EvalResult::DeferredLinear(-k0, -k1),
        EvalResult::Unresolved => EvalResult::Unresolved,
    }
}

fn combine_linear(l: EvalResult, r: EvalResult, sign: f64) -> EvalResult {
    let (lk0, lk1) = as_linear(l);
    let (rk0, rk1) = as_linear(r);
    EvalResult::DeferredLinear(lk0 + sign * rk0, lk1 + sign * rk1)
}

fn as_linear(v: EvalResult) -> (f64, f64) {
    match v {
        EvalResult::Resolved(v) => (v, 0.0),
        EvalResult::DeferredLinear(k0, k1) => (k0, k1),
        EvalResult::Unresolved => (0.0, 0.0),
    }
}

fn non_linear(pos: &SourcePos) -> AsmError {
    AsmError::Encoding {
        pos: pos.clone(),
        message: "expression is not a linear function of `_base`".into(),
    }
}

fn eval_binary_numeric(op: BinOp, a: f64, b: f64) -> f64 {
    match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => {
            if b == 0.0 {
                f64::NAN
            } else {
                (a / b).trunc()
            }
        }
        BinOp::Mod => {
            if b == 0.0 {
                f64::NAN
            } else {
                a % b
            }
        }
        BinOp::Shl => ((to_i32(a) as i64) << (to_i32(b) & 31)) as i32 as f64,
        BinOp::Shr => (to_i32(a) >> (to_i32(b) & 31)) as f64,
        BinOp::Ushr => ((to_i32(a) as u32) >> (to_i32(b) as u32 & 31)) as f64,
        BinOp::And => (to_i32(a) & to_i32(b)) as f64,
        BinOp::Or => (to_i32(a) | to_i32(b)) as f64,
        BinOp::Xor => (to_i32(a) ^ to_i32(b)) as f64,
        BinOp::AndAnd => truthy(truthy(a) * truthy(b)),
        BinOp::OrOr => truthy(truthy(a) + truthy(b)),
        BinOp::Eq => {
            if a.is_nan() || b.is_nan() {
                0.0
            } else {
                bool_f64(a == b)
            }
        }
        BinOp::Ne => {
            if a.is_nan() || b.is_nan() {
                0.0
            } else {
                bool_f64(a != b)
            }
        }
        BinOp::Lt => cmp_with_nan(a, b, |o| o == std::cmp::Ordering::Less),
        BinOp::Le => cmp_with_nan(a, b, |o| o != std::cmp::Ordering::Greater),
        BinOp::Gt => cmp_with_nan(a, b, |o| o == std::cmp::Ordering::Greater),
        BinOp::Ge => cmp_with_nan(a, b, |o| o != std::cmp::Ordering::Less),
    }
}

fn bool_f64(v: bool) -> f64 {
    if v {
        1.0
    } else {
        0.0
    }
}

fn cmp_with_nan(a: f64, b: f64, pred: impl Fn(std::cmp::Ordering) -> bool) -> f64 {
    if a.is_nan() || b.is_nan() {
        return 0.0;
    }
    match a.partial_cmp(&b) {
        Some(o) => bool_f64(pred(o)),
        None => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{parse_expr, TokenCursor};
    use crate::lexer::tokenize_source;
    use std::path::PathBuf;
    use std::rc::Rc;

    struct NoCtx;
    impl EvalContext for NoCtx {
        fn lookup(&self, name: &str, pos: &SourcePos) -> Result<EvalResult, AsmError> {
            if name == "_base" {
                Ok(EvalResult::DeferredLinear(0.0, 1.0))
            } else {
                Err(AsmError::UnknownSymbol {
                    pos: pos.clone(),
                    name: name.to_string(),
                })
            }
        }
        fn call(&self, name: &str, _args: &[EvalResult], pos: &SourcePos) -> Result<EvalResult, AsmError> {
            Err(AsmError::UnknownSymbol {
                pos: pos.clone(),
                name: name.to_string(),
            })
        }
    }

    fn eval(src: &str) -> EvalResult {
        let toks = tokenize_source(src, Rc::new(PathBuf::from("t.s"))).unwrap();
        let mut cur = TokenCursor::new(&toks);
        let e = parse_expr(&mut cur).unwrap();
        evaluate(&e, &NoCtx).unwrap()
    }

    #[test]
    fn arithmetic_precedence() {
        assert_eq!(eval("1 + 2 * 3"), EvalResult::Resolved(7.0));
    }

    #[test]
    fn truncating_division() {
        assert_eq!(eval("-7 / 2"), EvalResult::Resolved(-3.0));
    }

    #[test]
    fn logical_shift_right_is_unsigned() {
        assert_eq!(eval("-1 >>> 28"), EvalResult::Resolved(15.0));
    }

    #[test]
    fn arithmetic_shift_right_is_signed() {
        assert_eq!(eval("-16 >> 2"), EvalResult::Resolved(-4.0));
    }

    #[test]
    fn base_linear_arithmetic() {
        assert_eq!(eval("_base + 4"), EvalResult::DeferredLinear(4.0, 1.0));
        assert_eq!(eval("2 * _base"), EvalResult::DeferredLinear(0.0, 2.0));
    }

    #[test]
    fn ternary_short_circuits() {
        assert_eq!(eval("1 ? 5 : 10"), EvalResult::Resolved(5.0));
    }
}
