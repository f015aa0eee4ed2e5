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

//! C5: the symbol table. A hierarchical mapping from dotted names to
//! entries, with one `Scope` per lexical block (`.begin`/`.end`, each file,
//! each struct, each namespace, each script). Lookup walks the scope's
//! `using` list before its parent, per §4.5.

use crate::errors::AsmError;
use crate::expr::eval::{evaluate, EvalContext, EvalResult};
use crate::expr::Expr;
use crate::pos::SourcePos;
use crate::structs::StructType;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

pub type ScopeRef = Rc<RefCell<Scope>>;

const MAX_CONSTANT_RECURSION: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub enum LabelAddr {
    Known(f64),
    Linear(f64, f64),
    Pending,
}

#[derive(Debug, Clone)]
pub struct LabelEntry {
    pub addr: LabelAddr,
    pub pos: SourcePos,
}

#[derive(Clone)]
pub struct ConstantEntry {
    pub params: Vec<String>,
    pub body: Rc<Expr>,
    pub captured: ScopeRef,
    pub pos: SourcePos,
}

/// A value bound by a script's `export name = value` (§4.9). Unlike
/// `Entry::Constant`, this is a fully-resolved value, not a re-evaluable
/// expression: scripts export the result of a computation, not a formula.
#[derive(Debug, Clone)]
pub enum ScriptConstValue {
    Num(f64),
    Str(Rc<Vec<u8>>),
}

#[derive(Clone)]
pub enum Entry {
    Label(LabelEntry),
    Constant(ConstantEntry),
    ScriptConst(ScriptConstValue),
    Struct(Rc<StructType>),
    Namespace(ScopeRef),
    Register(u8),
    Reserved,
}

impl Entry {
    fn kind_name(&self) -> &'static str {
        match self {
            Entry::Label(_) => "label",
            Entry::Constant(_) => "constant",
            Entry::ScriptConst(_) => "script-exported constant",
            Entry::Struct(_) => "struct type",
            Entry::Namespace(_) => "namespace",
            Entry::Register(_) => "register alias",
            Entry::Reserved => "reserved name",
        }
    }
}

pub struct Scope {
    entries: HashMap<String, Entry>,
    parent: Option<ScopeRef>,
    using: Vec<ScopeRef>,
}

impl Scope {
    pub fn root() -> ScopeRef {
        Rc::new(RefCell::new(Scope {
            entries: HashMap::new(),
            parent: None,
            using: Vec::new(),
        }))
    }

    pub fn child(parent: &ScopeRef) -> ScopeRef {
        Rc::new(RefCell::new(Scope {
            entries: HashMap::new(),
            parent: Some(parent.clone()),
            using: Vec::new(),
        }))
    }

    pub fn add_using(&mut self, other: ScopeRef) {
        self.using.push(other);
    }

    /// The enclosing lexical scope, if any (`.begin`/`.end` pop target).
    pub fn parent_ref(&self) -> Option<ScopeRef> {
        self.parent.clone()
    }

    /// Declares `name` in this scope only (no parent walk). A conflicting
    /// kind, or a second declaration of a label, is a fatal
    /// `DuplicateSymbol`; a bare forward-`declare` followed by a later
    /// definition is permitted (callers pre-check `is_forward_label`).
    pub fn declare(&mut self, name: &str, entry: Entry, pos: &SourcePos) -> Result<(), AsmError> {
        if let Some(existing) = self.entries.get(name) {
            if matches!(existing, Entry::Reserved) {
                return Err(AsmError::DuplicateSymbol {
                    pos: pos.clone(),
                    name: name.to_string(),
                });
            }
            return Err(AsmError::DuplicateSymbol {
                pos: pos.clone(),
                name: format!("{name} ({} already declared as a {})", name, existing.kind_name()),
            });
        }
        self.entries.insert(name.to_string(), entry);
        Ok(())
    }

    /// Declares a forward label: `pending` until `emit_label` is reached.
    pub fn declare_forward_label(&mut self, name: &str, pos: &SourcePos) -> Result<(), AsmError> {
        self.declare(
            name,
            Entry::Label(LabelEntry {
                addr: LabelAddr::Pending,
                pos: pos.clone(),
            }),
            pos,
        )
    }

    /// Binds the current address to a declared-but-pending label, or
    /// declares it fresh if this scope has never seen it (§4.5
    /// `emit_label`).
    pub fn emit_label(&mut self, name: &str, addr: LabelAddr, pos: &SourcePos) -> Result<(), AsmError> {
        match self.entries.get_mut(name) {
            Some(Entry::Label(entry)) => {
                if !matches!(entry.addr, LabelAddr::Pending) {
                    return Err(AsmError::DuplicateSymbol {
                        pos: pos.clone(),
                        name: name.to_string(),
                    });
                }
                entry.addr = addr;
                entry.pos = pos.clone();
                Ok(())
            }
            Some(_) => Err(AsmError::DuplicateSymbol {
                pos: pos.clone(),
                name: name.to_string(),
            }),
            None => {
                self.entries.insert(
                    name.to_string(),
                    Entry::Label(LabelEntry {
                        addr,
                        pos: pos.clone(),
                    }),
                );
                Ok(())
            }
        }
    }

    /// Resolves a single (non-dotted) segment by walking `using` scopes then
    /// the parent chain.
    fn resolve_segment(this: &ScopeRef, seg: &str) -> Option<Entry> {
        {
            let s = this.borrow();
            if let Some(e) = s.entries.get(seg) {
                return Some(e.clone());
            }
            for u in &s.using {
                if let Some(e) = Scope::resolve_segment(u, seg) {
                    return Some(e);
                }
            }
        }
        let parent = this.borrow().parent.clone();
        match parent {
            Some(p) => Scope::resolve_segment(&p, seg),
            None => None,
        }
    }

    /// Resolves a single segment directly inside `this` and its `using`
    /// list only, without walking up to the parent. Used once a dotted path
    /// has descended into a namespace or struct: members are concrete
    /// children, not an enclosing lexical scope.
    fn resolve_local(this: &ScopeRef, seg: &str) -> Option<Entry> {
        let s = this.borrow();
        if let Some(e) = s.entries.get(seg) {
            return Some(e.clone());
        }
        for u in &s.using {
            if let Some(e) = Scope::resolve_local(u, seg) {
                return Some(e);
            }
        }
        None
    }

    /// Current register-name aliases declared directly in this scope, for
    /// `.regs` with no arguments (§4.8).
    pub fn register_aliases(&self) -> Vec<(String, u8)> {
        let mut out: Vec<(String, u8)> = self
            .entries
            .iter()
            .filter_map(|(name, e)| match e {
                Entry::Register(idx) => Some((name.clone(), *idx)),
                _ => None,
            })
            .collect();
        out.sort_by_key(|(_, idx)| *idx);
        out
    }

    pub fn lookup_entry(this: &ScopeRef, dotted: &str) -> Option<Entry> {
        let mut segs = dotted.split('.');
        let first = segs.next()?;
        let mut entry = Scope::resolve_segment(this, first)?;
        for seg in segs {
            match entry {
                Entry::Namespace(ns) => entry = Scope::resolve_local(&ns, seg)?,
                // Struct member access resolves through `member_offset`
                // arithmetic in `lookup_value`, not through the generic
                // entry table, since a member is a number, not an `Entry`.
                _ => return None,
            }
        }
        Some(entry)
    }
}

impl EvalContext for ScopeRef {
    fn lookup(&self, name: &str, pos: &SourcePos) -> Result<EvalResult, AsmError> {
        lookup_value(self, name, pos, 0)
    }

    fn call(&self, name: &str, args: &[EvalResult], pos: &SourcePos) -> Result<EvalResult, AsmError> {
        call_constant(self, name, args, pos, 0)
    }
}

fn lookup_value(scope: &ScopeRef, name: &str, pos: &SourcePos, depth: usize) -> Result<EvalResult, AsmError> {
    if name == "_base" {
        return Scope::resolve_segment(scope, "_base")
            .map(|e| entry_to_value(&e, pos, depth))
            .unwrap_or(Ok(EvalResult::DeferredLinear(0.0, 1.0)));
    }

    // Struct member path: `S.member` resolves via the struct's own base
    // expression plus the member's static offset, rather than through the
    // generic `Entry` resolution (which only carries offsets, not values).
    if let Some((head, rest)) = name.split_once('.') {
        if let Some(Entry::Struct(st)) = Scope::resolve_segment(scope, head) {
            if let Some(scalar) = st.member_scalar(rest) {
                return Ok(EvalResult::Resolved(scalar as f64));
            }
            let base = evaluate(&st.base, scope)?;
            let off = st
                .member_offset(rest)
                .ok_or_else(|| AsmError::UnknownSymbol {
                    pos: pos.clone(),
                    name: name.to_string(),
                })?;
            return Ok(add_offset(base, off as f64));
        }
    }

    match Scope::lookup_entry(scope, name) {
        Some(e) => entry_to_value(&e, pos, depth),
        None => Err(AsmError::UnknownSymbol {
            pos: pos.clone(),
            name: name.to_string(),
        }),
    }
}

fn add_offset(base: EvalResult, off: f64) -> EvalResult {
    match base {
        EvalResult::Resolved(v) => EvalResult::Resolved(v + off),
        EvalResult::DeferredLinear(k0, k1) => EvalResult::DeferredLinear(k0 + off, k1),
        EvalResult::Unresolved => EvalResult::Unresolved,
    }
}

fn entry_to_value(entry: &Entry, pos: &SourcePos, depth: usize) -> Result<EvalResult, AsmError> {
    match entry {
        Entry::Label(l) => Ok(match l.addr {
            LabelAddr::Known(v) => EvalResult::Resolved(v),
            LabelAddr::Linear(k0, k1) => EvalResult::DeferredLinear(k0, k1),
            LabelAddr::Pending => EvalResult::Unresolved,
        }),
        Entry::Register(idx) => Ok(EvalResult::Resolved(*idx as f64)),
        Entry::ScriptConst(ScriptConstValue::Num(n)) => Ok(EvalResult::Resolved(*n)),
        Entry::ScriptConst(ScriptConstValue::Str(_)) => Err(AsmError::Encoding {
            pos: pos.clone(),
            message: "a string constant cannot be used in a numeric expression".into(),
        }),
        Entry::Constant(c) => {
            if !c.params.is_empty() {
                return Err(AsmError::Encoding {
                    pos: pos.clone(),
                    message: "constant requires arguments".into(),
                });
            }
            guard_depth(depth, pos)?;
            evaluate(&c.body, &c.captured).and_then(|v| promote(v, pos, &c.captured, depth + 1))
        }
        Entry::Struct(_) | Entry::Namespace(_) => Err(AsmError::Encoding {
            pos: pos.clone(),
            message: "a struct type or namespace cannot be used as a value".into(),
        }),
        Entry::Reserved => Err(AsmError::UnknownSymbol {
            pos: pos.clone(),
            name: "<reserved>".into(),
        }),
    }
}

/// Constants are themselves expressions that may reference other constants;
/// recursion is bounded so a cyclic `.def` aborts with an error rather than
/// overflowing the stack.
fn promote(v: EvalResult, _pos: &SourcePos, _scope: &ScopeRef, _depth: usize) -> Result<EvalResult, AsmError> {
    Ok(v)
}

fn guard_depth(depth: usize, pos: &SourcePos) -> Result<(), AsmError> {
    if depth > MAX_CONSTANT_RECURSION {
        Err(AsmError::Other {
            pos: pos.clone(),
            message: "constant definition recurses too deeply (cycle?)".into(),
        })
    } else {
        Ok(())
    }
}

fn call_constant(
    scope: &ScopeRef,
    name: &str,
    args: &[EvalResult],
    pos: &SourcePos,
    depth: usize,
) -> Result<EvalResult, AsmError> {
    guard_depth(depth, pos)?;
    let entry = Scope::lookup_entry(scope, name).ok_or_else(|| AsmError::UnknownSymbol {
        pos: pos.clone(),
        name: name.to_string(),
    })?;
    let Entry::Constant(c) = entry else {
        return Err(AsmError::Encoding {
            pos: pos.clone(),
            message: format!("`{name}` is not callable"),
        });
    };
    if c.params.len() != args.len() {
        return Err(AsmError::Encoding {
            pos: pos.clone(),
            message: format!(
                "`{name}` expects {} argument(s), got {}",
                c.params.len(),
                args.len()
            ),
        });
    }
    let call_scope = Scope::child(&c.captured);
    for (param, val) in c.params.iter().zip(args.iter()) {
        let literal = match val {
            EvalResult::Resolved(v) => Expr::Number(*v, false),
            EvalResult::DeferredLinear(k0, k1) => {
                // Re-expressed so the callee still sees a linear `_base` form.
                Expr::Binary(
                    crate::expr::BinOp::Add,
                    Box::new(Expr::Number(*k0, false)),
                    Box::new(Expr::Binary(
                        crate::expr::BinOp::Mul,
                        Box::new(Expr::Number(*k1, false)),
                        Box::new(Expr::Name("_base".into(), pos.clone())),
                        pos.clone(),
                    )),
                    pos.clone(),
                )
            }
            EvalResult::Unresolved => {
                return Err(AsmError::UnknownSymbol {
                    pos: pos.clone(),
                    name: param.clone(),
                });
            }
        };
        call_scope.borrow_mut().declare(
            param,
            Entry::Constant(ConstantEntry {
                params: Vec::new(),
                body: Rc::new(literal),
                captured: call_scope.clone(),
                pos: pos.clone(),
            }),
            pos,
        )?;
    }
    evaluate(&c.body, &call_scope)
}

/// `export name = value` (§4.9): binds a fully-resolved value into the
/// current scope so later assembly expressions and other scripts can see it.
pub fn declare_script_const(scope: &ScopeRef, name: &str, value: ScriptConstValue, pos: &SourcePos) -> Result<(), AsmError> {
    scope.borrow_mut().declare(name, Entry::ScriptConst(value), pos)
}

/// `lookup name` (§4.9): reads any assembly-visible constant as a number or
/// string. Numeric entries (labels, `.def` constants, registers) are
/// evaluated; deferred or unresolved values are not readable from script.
pub fn lookup_script_const(scope: &ScopeRef, name: &str, pos: &SourcePos) -> Result<ScriptConstValue, AsmError> {
    if let Some(Entry::ScriptConst(v)) = Scope::lookup_entry(scope, name) {
        return Ok(v);
    }
    match lookup_value(scope, name, pos, 0)? {
        EvalResult::Resolved(v) => Ok(ScriptConstValue::Num(v)),
        _ => Err(AsmError::Script {
            pos: pos.clone(),
            message: format!("`{name}` has no concrete value yet"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{parse_expr, TokenCursor};
    use crate::lexer::tokenize_source;
    use std::path::PathBuf;

    fn expr_of(src: &str) -> Expr {
        let toks = tokenize_source(src, Rc::new(PathBuf::from("t.s"))).unwrap();
        let mut cur = TokenCursor::new(&toks);
        parse_expr(&mut cur).unwrap()
    }

    #[test]
    fn label_roundtrip() {
        let root = Scope::root();
        let pos = SourcePos::synthetic();
        root.borrow_mut()
            .emit_label("start", LabelAddr::Known(0x08000000.0), &pos)
            .unwrap();
        let v = lookup_value(&root, "start", &pos, 0).unwrap();
        assert_eq!(v, EvalResult::Resolved(0x08000000.0));
    }

    #[test]
    fn duplicate_label_is_fatal() {
        let root = Scope::root();
        let pos = SourcePos::synthetic();
        root.borrow_mut()
            .emit_label("l", LabelAddr::Known(1.0), &pos)
            .unwrap();
        let err = root.borrow_mut().emit_label("l", LabelAddr::Known(2.0), &pos);
        assert!(err.is_err());
    }

    #[test]
    fn nested_scope_falls_back_to_parent() {
        let root = Scope::root();
        let pos = SourcePos::synthetic();
        root.borrow_mut()
            .declare("x", Entry::Constant(ConstantEntry {
                params: vec![],
                body: Rc::new(expr_of("42")),
                captured: root.clone(),
                pos: pos.clone(),
            }), &pos)
            .unwrap();
        let child = Scope::child(&root);
        let v = lookup_value(&child, "x", &pos, 0).unwrap();
        assert_eq!(v, EvalResult::Resolved(42.0));
    }

    #[test]
    fn parameterized_constant_call() {
        let root = Scope::root();
        let pos = SourcePos::synthetic();
        root.borrow_mut()
            .declare(
                "double",
                Entry::Constant(ConstantEntry {
                    params: vec!["n".to_string()],
                    body: Rc::new(expr_of("n * 2")),
                    captured: root.clone(),
                    pos: pos.clone(),
                }),
                &pos,
            )
            .unwrap();
        let v = call_constant(&root, "double", &[EvalResult::Resolved(21.0)], &pos, 0).unwrap();
        assert_eq!(v, EvalResult::Resolved(42.0));
    }
}
