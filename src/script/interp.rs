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

//! A tree-walking evaluator for the script AST (§4.9). Closures capture
//! their defining environment by reference (`Rc<EnvData>`), so mutations an
//! inner function makes to an outer local are visible to the rest of the
//! script, matching the "functions capture enclosing variables by reference"
//! rule.

use super::ast::{BinOp, Expr, FuncDef, LValue, Stmt, UnOp};
use super::natives;
use super::value::{format_number, values_equal, Closure, Value};
use crate::errors::AsmError;
use crate::pos::SourcePos;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

const NATIVE_NAMESPACES: &[&str] = &["str", "num", "int", "image", "audio", "json", "struct", "pickle", "list"];

pub struct EnvData {
    vars: RefCell<HashMap<String, Value>>,
    parent: Option<Env>,
}

pub type Env = Rc<EnvData>;

pub fn root_env() -> Env {
    Rc::new(EnvData {
        vars: RefCell::new(HashMap::new()),
        parent: None,
    })
}

fn child_env(parent: &Env) -> Env {
    Rc::new(EnvData {
        vars: RefCell::new(HashMap::new()),
        parent: Some(parent.clone()),
    })
}

fn env_get(env: &Env, name: &str) -> Option<Value> {
    if let Some(v) = env.vars.borrow().get(name) {
        return Some(v.clone());
    }
    match &env.parent {
        Some(p) => env_get(p, name),
        None => None,
    }
}

fn env_set_existing(env: &Env, name: &str, value: Value) -> bool {
    if env.vars.borrow().contains_key(name) {
        env.vars.borrow_mut().insert(name.to_string(), value);
        return true;
    }
    match &env.parent {
        Some(p) => env_set_existing(p, name, value),
        None => false,
    }
}

fn env_declare(env: &Env, name: &str, value: Value) {
    env.vars.borrow_mut().insert(name.to_string(), value);
}

/// What the interpreter needs from the assembler host: the `put`, `export`
/// and `lookup` bridge natives, plus host-visible output (§4.9).
pub trait ScriptHost {
    fn say(&mut self, line: &str);
    fn emit_bytes(&mut self, bytes: &[u8]);
    fn export(&mut self, name: &str, value: &Value, pos: &SourcePos) -> Result<(), AsmError>;
    fn lookup(&mut self, name: &str, pos: &SourcePos) -> Result<Value, AsmError>;
    fn put(&mut self, text: &str, pos: &SourcePos) -> Result<(), AsmError>;
}

enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
    Goto(String),
    Exit,
}

pub fn run(program: &[Stmt], host: &mut dyn ScriptHost) -> Result<(), AsmError> {
    let env = root_env();
    match exec_block(&env, program, host)? {
        Flow::Normal | Flow::Exit => Ok(()),
        Flow::Goto(label) => Err(AsmError::Script {
            pos: SourcePos::synthetic(),
            message: format!("`goto {label}` has no matching label in this function"),
        }),
        Flow::Break | Flow::Continue | Flow::Return(_) => Err(AsmError::Script {
            pos: SourcePos::synthetic(),
            message: "`break`/`continue`/`return` used outside a loop or function".into(),
        }),
    }
}

fn exec_block(env: &Env, stmts: &[Stmt], host: &mut dyn ScriptHost) -> Result<Flow, AsmError> {
    let mut i = 0;
    while i < stmts.len() {
        match exec_stmt(env, &stmts[i], host)? {
            Flow::Normal => i += 1,
            Flow::Goto(label) => {
                if let Some(target) = stmts.iter().position(|s| matches!(s, Stmt::Label(l) if *l == label)) {
                    i = target + 1;
                } else {
                    return Ok(Flow::Goto(label));
                }
            }
            other => return Ok(other),
        }
    }
    Ok(Flow::Normal)
}

fn exec_loop_body(env: &Env, stmts: &[Stmt], host: &mut dyn ScriptHost) -> Result<Flow, AsmError> {
    match exec_block(env, stmts, host)? {
        Flow::Break => Ok(Flow::Normal),
        Flow::Continue => Ok(Flow::Normal),
        other => Ok(other),
    }
}

fn is_loop_exit(flow: &Flow) -> bool {
    matches!(flow, Flow::Return(_) | Flow::Goto(_) | Flow::Exit)
}

fn exec_stmt(env: &Env, stmt: &Stmt, host: &mut dyn ScriptHost) -> Result<Flow, AsmError> {
    match stmt {
        Stmt::Expr(e) => {
            eval(env, e, host)?;
            Ok(Flow::Normal)
        }
        Stmt::Let(name, e, _pos) => {
            let v = eval(env, e, host)?;
            env_declare(env, name, v);
            Ok(Flow::Normal)
        }
        Stmt::Assign(lv, e) => {
            let v = eval(env, e, host)?;
            assign(env, lv, v, host)?;
            Ok(Flow::Normal)
        }
        Stmt::If(arms, else_body) => {
            for (cond, body) in arms {
                if eval(env, cond, host)?.truthy() {
                    let inner = child_env(env);
                    return exec_block(&inner, body, host);
                }
            }
            let inner = child_env(env);
            exec_block(&inner, else_body, host)
        }
        Stmt::ForIn(v, idx, iter_e, body) => {
            let iterable = eval(env, iter_e, host)?;
            let items = match &iterable {
                Value::List(l) => l.borrow().clone(),
                other => {
                    return Err(AsmError::Script {
                        pos: SourcePos::synthetic(),
                        message: format!("cannot iterate over a {}", other.type_name()),
                    })
                }
            };
            for (i, item) in items.into_iter().enumerate() {
                let inner = child_env(env);
                env_declare(&inner, v, item);
                if let Some(idx_name) = idx {
                    env_declare(&inner, idx_name, Value::Num(i as f64));
                }
                let flow = exec_loop_body(&inner, body, host)?;
                if is_loop_exit(&flow) {
                    return Ok(flow);
                }
            }
            Ok(Flow::Normal)
        }
        Stmt::ForInfinite(body) => loop {
            let inner = child_env(env);
            let flow = exec_loop_body(&inner, body, host)?;
            if is_loop_exit(&flow) {
                return Ok(flow);
            }
        },
        Stmt::DoWhile(body, cond) => loop {
            let inner = child_env(env);
            let flow = exec_loop_body(&inner, body, host)?;
            if is_loop_exit(&flow) {
                return Ok(flow);
            }
            if !eval(&inner, cond, host)?.truthy() {
                return Ok(Flow::Normal);
            }
        },
        Stmt::Break => Ok(Flow::Break),
        Stmt::Continue => Ok(Flow::Continue),
        Stmt::Return(e) => {
            let v = match e {
                Some(e) => eval(env, e, host)?,
                None => Value::Nil,
            };
            Ok(Flow::Return(v))
        }
        Stmt::Goto(label, _pos) => Ok(Flow::Goto(label.clone())),
        Stmt::Label(_) => Ok(Flow::Normal),
        Stmt::Def(def) => {
            let closure = Value::Func(Rc::new(Closure {
                def: def.clone(),
                upvalues: env.clone(),
            }));
            if let Some(name) = &def.name {
                env_declare(env, name, closure);
            }
            Ok(Flow::Normal)
        }
        Stmt::Namespace(name, body) => {
            let ns_env = child_env(env);
            exec_block(&ns_env, body, host)?;
            env_declare(env, name, Value::Namespace(ns_env));
            Ok(Flow::Normal)
        }
        Stmt::Using(name, pos) => {
            let ns = env_get(env, name).ok_or_else(|| AsmError::Script {
                pos: pos.clone(),
                message: format!("`using {name}`: no such namespace"),
            })?;
            if let Value::Namespace(ns_env) = ns {
                for (k, v) in ns_env.vars.borrow().iter() {
                    env_declare(env, k, v.clone());
                }
                Ok(Flow::Normal)
            } else {
                Err(AsmError::Script {
                    pos: pos.clone(),
                    message: format!("`{name}` is not a namespace"),
                })
            }
        }
        Stmt::Exit => Ok(Flow::Exit),
        Stmt::Put(parts, pos) => {
            let mut out = Vec::new();
            for (i, p) in parts.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                out.push_str(&eval(env, p, host)?.display());
            }
            host.put(&out, pos)?;
            Ok(Flow::Normal)
        }
        Stmt::Export(name, e, pos) => {
            let v = eval(env, e, host)?;
            host.export(name, &v, pos)?;
            Ok(Flow::Normal)
        }
        Stmt::NativeStmt(name, args, pos) => {
            let vals: Result<Vec<Value>, AsmError> = args.iter().map(|a| eval(env, a, host)).collect();
            exec_native_stmt(name, &vals?, pos, host)
        }
    }
}

fn exec_native_stmt(name: &str, args: &[Value], pos: &SourcePos, host: &mut dyn ScriptHost) -> Result<Flow, AsmError> {
    match name {
        "printf" => {
            let line = natives::format_printf(args, pos)?;
            host.say(&line);
        }
        "error" => {
            let msg = args.first().map(|v| v.display()).unwrap_or_default();
            return Err(AsmError::Script { pos: pos.clone(), message: msg });
        }
        _ if name.ends_with("fill") => {
            let (width, big_endian) = byte_emitter_shape(&name[..name.len() - 4])?;
            let n = arg_num(args, 0, pos)? as i64;
            let v = if args.len() > 1 { arg_num(args, 1, pos)? as i64 } else { 0 };
            let bytes = int_bytes(v, width, big_endian);
            for _ in 0..n.max(0) {
                host.emit_bytes(&bytes);
            }
        }
        _ => {
            let (width, big_endian) = byte_emitter_shape(name)?;
            for a in args {
                match a {
                    Value::Str(s) if width == 1 => host.emit_bytes(s),
                    _ => {
                        let v = a.as_num().ok_or_else(|| AsmError::Script {
                            pos: pos.clone(),
                            message: format!("`{name}` expects a number or string argument"),
                        })? as i64;
                        host.emit_bytes(&int_bytes(v, width, big_endian));
                    }
                }
            }
        }
    }
    Ok(Flow::Normal)
}

fn byte_emitter_shape(name: &str) -> Result<(u32, bool), AsmError> {
    match name {
        "i8" | "u8" => Ok((1, false)),
        "i16" | "u16" => Ok((2, false)),
        "i32" | "u32" => Ok((4, false)),
        "b8" => Ok((1, true)),
        "b16" => Ok((2, true)),
        "b32" => Ok((4, true)),
        other => Err(AsmError::Script {
            pos: SourcePos::synthetic(),
            message: format!("unknown byte emitter `{other}`"),
        }),
    }
}

fn int_bytes(v: i64, width: u32, big_endian: bool) -> Vec<u8> {
    let mut b = match width {
        1 => vec![(v & 0xFF) as u8],
        2 => (v as i16 as u16).to_le_bytes().to_vec(),
        4 => (v as i32 as u32).to_le_bytes().to_vec(),
        _ => unreachable!(),
    };
    if big_endian {
        b.reverse();
    }
    b
}

fn arg_num(args: &[Value], i: usize, pos: &SourcePos) -> Result<f64, AsmError> {
    args.get(i)
        .and_then(|v| v.as_num())
        .ok_or_else(|| AsmError::Script {
            pos: pos.clone(),
            message: "expected a numeric argument".into(),
        })
}

fn assign(env: &Env, lv: &LValue, value: Value, host: &mut dyn ScriptHost) -> Result<(), AsmError> {
    match lv {
        LValue::Var(name, pos) => {
            if !env_set_existing(env, name, value.clone()) {
                return Err(AsmError::Script {
                    pos: pos.clone(),
                    message: format!("assignment to undeclared variable `{name}`"),
                });
            }
            Ok(())
        }
        LValue::Index(base_e, idx_e, pos) => {
            let base = eval(env, base_e, host)?;
            let idx = eval(env, idx_e, host)?.as_num().ok_or_else(|| AsmError::Script {
                pos: pos.clone(),
                message: "list index must be a number".into(),
            })? as usize;
            match base {
                Value::List(l) => {
                    let mut l = l.borrow_mut();
                    if idx >= l.len() {
                        return Err(AsmError::Script {
                            pos: pos.clone(),
                            message: "list index out of range".into(),
                        });
                    }
                    l[idx] = value;
                    Ok(())
                }
                other => Err(AsmError::Script {
                    pos: pos.clone(),
                    message: format!("cannot index into a {}", other.type_name()),
                }),
            }
        }
        LValue::Field(base_e, name, pos) => {
            let base = eval(env, base_e, host)?;
            match base {
                Value::Namespace(ns_env) => {
                    env_declare(&ns_env, name, value);
                    Ok(())
                }
                other => Err(AsmError::Script {
                    pos: pos.clone(),
                    message: format!("cannot assign a field of a {}", other.type_name()),
                }),
            }
        }
    }
}

pub fn eval(env: &Env, expr: &Expr, host: &mut dyn ScriptHost) -> Result<Value, AsmError> {
    match expr {
        Expr::Num(n) => Ok(Value::Num(*n)),
        Expr::Str(b) => Ok(Value::str(b.clone())),
        Expr::Nil => Ok(Value::Nil),
        Expr::Interp(parts) => {
            let mut out = Vec::new();
            for p in parts {
                out.extend_from_slice(eval(env, p, host)?.display().as_bytes());
            }
            Ok(Value::str(out))
        }
        Expr::Var(name, pos) => {
            if name == "lookup" {
                // bare `lookup` referenced without a call is not meaningful.
                return Err(AsmError::Script {
                    pos: pos.clone(),
                    message: "`lookup` must be called with a name".into(),
                });
            }
            env_get(env, name).ok_or_else(|| AsmError::Script {
                pos: pos.clone(),
                message: format!("undefined variable `{name}`"),
            })
        }
        Expr::Index(base_e, idx_e, pos) => {
            let base = eval(env, base_e, host)?;
            let idx = eval(env, idx_e, host)?;
            match (base, idx) {
                (Value::List(l), Value::Num(n)) => {
                    let l = l.borrow();
                    let i = n as usize;
                    l.get(i).cloned().ok_or_else(|| AsmError::Script {
                        pos: pos.clone(),
                        message: "list index out of range".into(),
                    })
                }
                (Value::Str(s), Value::Num(n)) => {
                    let i = n as usize;
                    s.get(i).map(|b| Value::Num(*b as f64)).ok_or_else(|| AsmError::Script {
                        pos: pos.clone(),
                        message: "string index out of range".into(),
                    })
                }
                (other, _) => Err(AsmError::Script {
                    pos: pos.clone(),
                    message: format!("cannot index into a {}", other.type_name()),
                }),
            }
        }
        Expr::Field(base_e, name, pos) => {
            let base = eval(env, base_e, host)?;
            match base {
                Value::Namespace(ns_env) => env_get(&ns_env, name).ok_or_else(|| AsmError::Script {
                    pos: pos.clone(),
                    message: format!("no member `{name}` in this namespace"),
                }),
                other => Err(AsmError::Script {
                    pos: pos.clone(),
                    message: format!("cannot access field `{name}` of a {}", other.type_name()),
                }),
            }
        }
        Expr::List(items) => {
            let mut out = Vec::with_capacity(items.len());
            for e in items {
                out.push(eval(env, e, host)?);
            }
            Ok(Value::list(out))
        }
        Expr::Call(callee, args, pos) => eval_call(env, callee, args, pos, host),
        Expr::Unary(op, inner, pos) => {
            let v = eval(env, inner, host)?;
            eval_unary(*op, v, pos)
        }
        Expr::Binary(op, l, r, pos) => eval_binary(env, *op, l, r, pos, host),
        Expr::Ternary(c, t, e) => {
            if eval(env, c, host)?.truthy() {
                eval(env, t, host)
            } else {
                eval(env, e, host)
            }
        }
        Expr::Func(def) => Ok(Value::Func(Rc::new(Closure {
            def: def.clone(),
            upvalues: env.clone(),
        }))),
    }
}

fn eval_call(env: &Env, callee: &Expr, args: &[Expr], pos: &SourcePos, host: &mut dyn ScriptHost) -> Result<Value, AsmError> {
    if let Expr::Var(name, _) = callee {
        if name == "lookup" {
            let arg = args.first().ok_or_else(|| AsmError::Script {
                pos: pos.clone(),
                message: "`lookup` requires a name argument".into(),
            })?;
            let v = eval(env, arg, host)?;
            let name = match v {
                Value::Str(s) => String::from_utf8_lossy(&s).into_owned(),
                other => {
                    return Err(AsmError::Script {
                        pos: pos.clone(),
                        message: format!("`lookup` expects a string, found a {}", other.type_name()),
                    })
                }
            };
            return host.lookup(&name, pos);
        }
    }

    if let Expr::Field(base, method, _) = callee {
        if let Expr::Var(ns, _) = base.as_ref() {
            if NATIVE_NAMESPACES.contains(&ns.as_str()) {
                let mut vals = Vec::with_capacity(args.len());
                for a in args {
                    vals.push(eval(env, a, host)?);
                }
                return natives::dispatch(ns, method, &vals, pos);
            }
        }
    }

    let callee_v = eval(env, callee, host)?;
    let mut vals = Vec::with_capacity(args.len());
    for a in args {
        vals.push(eval(env, a, host)?);
    }
    call_closure(&callee_v, &vals, pos, host)
}

fn call_closure(callee: &Value, args: &[Value], pos: &SourcePos, host: &mut dyn ScriptHost) -> Result<Value, AsmError> {
    let Value::Func(closure) = callee else {
        return Err(AsmError::Script {
            pos: pos.clone(),
            message: format!("cannot call a {}", callee.type_name()),
        });
    };
    let def: &FuncDef = &closure.def;
    if def.params.len() != args.len() {
        return Err(AsmError::Script {
            pos: pos.clone(),
            message: format!(
                "function expects {} argument(s), got {}",
                def.params.len(),
                args.len()
            ),
        });
    }
    let call_env = child_env(&closure.upvalues);
    for (p, v) in def.params.iter().zip(args.iter()) {
        env_declare(&call_env, p, v.clone());
    }
    match exec_block(&call_env, &def.body, host)? {
        Flow::Return(v) => Ok(v),
        Flow::Normal => Ok(Value::Nil),
        Flow::Exit => Ok(Value::Nil),
        Flow::Goto(label) => Err(AsmError::Script {
            pos: pos.clone(),
            message: format!("`goto {label}` has no matching label in this function"),
        }),
        Flow::Break | Flow::Continue => Err(AsmError::Script {
            pos: pos.clone(),
            message: "`break`/`continue` used outside a loop".into(),
        }),
    }
}

fn eval_unary(op: UnOp, v: Value, pos: &SourcePos) -> Result<Value, AsmError> {
    match op {
        UnOp::Not => Ok(Value::Num(if v.truthy() { 0.0 } else { 1.0 })),
        UnOp::Neg => v
            .as_num()
            .map(|n| Value::Num(-n))
            .ok_or_else(|| type_err("negate", &v, pos)),
        UnOp::BitNot => v
            .as_num()
            .map(|n| Value::Num(!(n as i64 as i32) as f64))
            .ok_or_else(|| type_err("bitwise-not", &v, pos)),
    }
}

fn type_err(op: &str, v: &Value, pos: &SourcePos) -> AsmError {
    AsmError::Script {
        pos: pos.clone(),
        message: format!("cannot {op} a {}", v.type_name()),
    }
}

fn eval_binary(env: &Env, op: BinOp, l: &Expr, r: &Expr, pos: &SourcePos, host: &mut dyn ScriptHost) -> Result<Value, AsmError> {
    if matches!(op, BinOp::And) {
        let lv = eval(env, l, host)?;
        if !lv.truthy() {
            return Ok(Value::Num(0.0));
        }
        let rv = eval(env, r, host)?;
        return Ok(Value::Num(if rv.truthy() { 1.0 } else { 0.0 }));
    }
    if matches!(op, BinOp::Or) {
        let lv = eval(env, l, host)?;
        if lv.truthy() {
            return Ok(Value::Num(1.0));
        }
        let rv = eval(env, r, host)?;
        return Ok(Value::Num(if rv.truthy() { 1.0 } else { 0.0 }));
    }

    let lv = eval(env, l, host)?;
    let rv = eval(env, r, host)?;

    if matches!(op, BinOp::Add) {
        if let (Value::Str(a), Value::Str(b)) = (&lv, &rv) {
            let mut out = (**a).clone();
            out.extend_from_slice(b);
            return Ok(Value::str(out));
        }
    }
    if matches!(op, BinOp::Eq | BinOp::Ne) {
        let eq = values_equal(&lv, &rv);
        return Ok(Value::Num(if matches!(op, BinOp::Eq) { eq } else { !eq } as u8 as f64));
    }

    let a = lv.as_num().ok_or_else(|| type_err("operate on", &lv, pos))?;
    let b = rv.as_num().ok_or_else(|| type_err("operate on", &rv, pos))?;
    Ok(Value::Num(numeric_binop(op, a, b)))
}

fn to_i32(v: f64) -> i32 {
    if v.is_nan() {
        0
    } else {
        (v as i64 as u64 as u32) as i32
    }
}

fn numeric_binop(op: BinOp, a: f64, b: f64) -> f64 {
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
        BinOp::BitAnd => (to_i32(a) & to_i32(b)) as f64,
        BinOp::BitOr => (to_i32(a) | to_i32(b)) as f64,
        BinOp::BitXor => (to_i32(a) ^ to_i32(b)) as f64,
        BinOp::Lt => ((a < b) as u8) as f64,
        BinOp::Le => ((a <= b) as u8) as f64,
        BinOp::Gt => ((a > b) as u8) as f64,
        BinOp::Ge => ((a >= b) as u8) as f64,
        BinOp::And | BinOp::Or | BinOp::Eq | BinOp::Ne => unreachable!("handled above"),
    }
}

#[allow(dead_code)]
fn debug_display(v: &Value) -> String {
    format_number(v.as_num().unwrap_or(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::parser::parse_program;
    use crate::lexer::tokenize_source;
    use std::path::PathBuf;

    struct NullHost {
        said: Vec<String>,
    }
    impl ScriptHost for NullHost {
        fn say(&mut self, line: &str) {
            self.said.push(line.to_string());
        }
        fn emit_bytes(&mut self, _bytes: &[u8]) {}
        fn export(&mut self, _name: &str, _value: &Value, _pos: &SourcePos) -> Result<(), AsmError> {
            Ok(())
        }
        fn lookup(&mut self, _name: &str, _pos: &SourcePos) -> Result<Value, AsmError> {
            Ok(Value::Nil)
        }
        fn put(&mut self, _text: &str, _pos: &SourcePos) -> Result<(), AsmError> {
            Ok(())
        }
    }

    fn run_src(src: &str) -> NullHost {
        let toks = tokenize_source(src, Rc::new(PathBuf::from("t.scr"))).unwrap();
        let prog = parse_program(&toks).unwrap();
        let mut host = NullHost { said: Vec::new() };
        run(&prog, &mut host).unwrap();
        host
    }

    #[test]
    fn let_and_arithmetic() {
        let toks = tokenize_source("let x = 1 + 2 * 3\nprintf x", Rc::new(PathBuf::from("t"))).unwrap();
        let prog = parse_program(&toks).unwrap();
        let mut host = NullHost { said: Vec::new() };
        run(&prog, &mut host).unwrap();
        assert_eq!(host.said, vec!["7"]);
    }

    #[test]
    fn closures_capture_by_reference() {
        let host = run_src(
            "let counter = 0\ndef bump()\n  counter = counter + 1\n  return counter\nend\nprintf bump()\nprintf bump()",
        );
        assert_eq!(host.said, vec!["1", "2"]);
    }

    #[test]
    fn for_in_list_sums_values() {
        let host = run_src("let total = 0\nfor var v: [1, 2, 3]\n  total = total + v\nend\nprintf total");
        assert_eq!(host.said, vec!["6"]);
    }

    #[test]
    fn goto_skips_forward() {
        let host = run_src("goto done\nprintf 1\ndone:\nprintf 2");
        assert_eq!(host.said, vec!["2"]);
    }
}
