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

//! The script language's AST (§4.9). A single-pass Pratt parser (`parser.rs`)
//! builds this tree directly from the same token stream the assembler
//! lexes; the tree-walking interpreter (`interp.rs`) evaluates it.

use crate::pos::SourcePos;
use std::rc::Rc;

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
    BitAnd,
    BitOr,
    BitXor,
    And,
    Or,
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
    Not,
    BitNot,
}

#[derive(Clone)]
pub enum Expr {
    Num(f64),
    Str(Vec<u8>),
    Nil,
    Interp(Vec<Expr>),
    Var(String, SourcePos),
    Index(Box<Expr>, Box<Expr>, SourcePos),
    Field(Box<Expr>, String, SourcePos),
    List(Vec<Expr>),
    Call(Box<Expr>, Vec<Expr>, SourcePos),
    Unary(UnOp, Box<Expr>, SourcePos),
    Binary(BinOp, Box<Expr>, Box<Expr>, SourcePos),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    Func(Rc<FuncDef>),
}

pub struct FuncDef {
    pub name: Option<String>,
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
    pub pos: SourcePos,
}

#[derive(Clone)]
pub enum LValue {
    Var(String, SourcePos),
    Index(Box<Expr>, Box<Expr>, SourcePos),
    Field(Box<Expr>, String, SourcePos),
}

pub enum Stmt {
    Expr(Expr),
    Let(String, Expr, SourcePos),
    Assign(LValue, Expr),
    If(Vec<(Expr, Vec<Stmt>)>, Vec<Stmt>),
    ForIn(String, Option<String>, Expr, Vec<Stmt>),
    ForInfinite(Vec<Stmt>),
    DoWhile(Vec<Stmt>, Expr),
    Break,
    Continue,
    Return(Option<Expr>),
    Goto(String, SourcePos),
    Label(String),
    Def(Rc<FuncDef>),
    Namespace(String, Vec<Stmt>),
    Using(String, SourcePos),
    Exit,
    /// `put s1, s2, ...` — splice generated text back into the enclosing
    /// assembly source at the script's position.
    Put(Vec<Expr>, SourcePos),
    /// `export name = value`.
    Export(String, Expr, SourcePos),
    /// A directive-style native call with no return value of interest:
    /// `printf`, `error`, the `i8`/`b8fill`/... byte emitters.
    NativeStmt(String, Vec<Expr>, SourcePos),
}
