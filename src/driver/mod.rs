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

//! C4: the single forward-pass assembly driver (§4.4). Owns every piece of
//! mutable assembly state and dispatches each source line to a directive
//! handler or to the instruction encoder.

pub mod directives;
pub mod operands;

use self::directives::PendingBranch;
use crate::encoder::Mode;
use crate::errors::{AsmError, PrintfWarning};
use crate::expr::eval::{evaluate, EvalResult};
use crate::expr::Expr;
use crate::file_reader::{FileReader, OutputSink};
use crate::pool::{PatchSink, PoolQueue};
use crate::pos::SourcePos;
use crate::regs::{expand_regs_args, RegsArg, CANONICAL_NAMES};
use crate::symbol::{Entry, LabelAddr, Scope, ScopeRef};
use std::path::PathBuf;

/// One `.if`/`.elseif`/`.else` cascade frame.
pub struct IfFrame {
    /// True if this frame (or an ancestor) is currently assembling bytes.
    pub active: bool,
    /// True once some branch in this cascade has already been taken; later
    /// `.elseif`/`.else` arms are skipped regardless of their predicate.
    pub taken: bool,
}

struct SectionBuf {
    bytes: Vec<u8>,
}

impl PatchSink for SectionBuf {
    fn patch_word(&mut self, addr: u32, bytes: &[u8]) {
        let addr = addr as usize;
        self.bytes[addr..addr + bytes.len()].copy_from_slice(bytes);
    }

    fn append_word(&mut self, value: u32) -> u32 {
        let addr = self.bytes.len() as u32;
        self.bytes.extend_from_slice(&value.to_le_bytes());
        addr
    }

    fn current_addr(&self) -> u32 {
        self.bytes.len() as u32
    }

    fn align_to(&mut self, n: u32) {
        while self.bytes.len() as u32 % n != 0 {
            self.bytes.push(0);
        }
    }
}

pub struct Driver<'a> {
    pub mode: Option<Mode>,
    pub base: Option<u32>,
    pub scope: ScopeRef,
    section: SectionBuf,
    pool_arm: PoolQueue,
    pool_thumb: PoolQueue,
    pub if_stack: Vec<IfFrame>,
    next_line_label: usize,
    pub file_reader: &'a dyn FileReader,
    pub output: &'a mut dyn OutputSink,
    pub base_resolution_path: PathBuf,
    pub warnings: Vec<PrintfWarning>,
    pub included_files: Vec<PathBuf>,
    /// Branch sites whose target was still `Unresolved` when encoded; see
    /// `resolve_pending_branches`.
    pending_branches: Vec<PendingBranch>,
    /// Failures from an independent top-level unit (a `.include`d or
    /// `.import`ed file) that can't corrupt this file's own address
    /// counter, so assembly continues past them (§7's batching carve-out);
    /// surfaced alongside any fatal top-level error by the caller.
    pub errors: Vec<AsmError>,
}

impl<'a> Driver<'a> {
    pub fn new(file_reader: &'a dyn FileReader, output: &'a mut dyn OutputSink, base_resolution_path: PathBuf) -> Self {
        let scope = Scope::root();
        let pos = SourcePos::synthetic();
        for (idx, name) in CANONICAL_NAMES.iter().enumerate() {
            scope
                .borrow_mut()
                .declare(name, Entry::Register(idx as u8), &pos)
                .expect("canonical register names are declared once into a fresh scope");
        }
        Self {
            mode: None,
            base: Some(0x0800_0000),
            scope,
            section: SectionBuf { bytes: Vec::new() },
            pool_arm: PoolQueue::new(),
            pool_thumb: PoolQueue::new(),
            if_stack: Vec::new(),
            next_line_label: 0,
            file_reader,
            output,
            base_resolution_path,
            warnings: Vec::new(),
            included_files: Vec::new(),
            pending_branches: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn active(&self) -> bool {
        self.if_stack.iter().all(|f| f.active)
    }

    pub fn cur_addr(&self) -> u32 {
        self.base.unwrap_or(0) + self.section.bytes.len() as u32
    }

    pub fn mode(&self, pos: &SourcePos) -> Result<Mode, AsmError> {
        self.mode.ok_or_else(|| AsmError::Other {
            pos: pos.clone(),
            message: "no `.arm`/`.thumb` mode has been set".into(),
        })
    }

    pub fn emit_bytes(&mut self, bytes: &[u8]) {
        self.section.bytes.extend_from_slice(bytes);
    }

    pub fn align(&mut self, n: u32, fill: u8) {
        while self.section.bytes.len() as u32 % n != 0 {
            self.section.bytes.push(fill);
        }
    }

    pub fn pool_queue(&mut self, mode: Mode) -> &mut PoolQueue {
        match mode {
            Mode::Arm => &mut self.pool_arm,
            Mode::Thumb => &mut self.pool_thumb,
        }
    }

    /// `.pool` (or end-of-file): flushes whichever pool queue(s) are
    /// non-empty for the current mode, re-evaluating each deferred entry's
    /// expression against the current scope so a `ldr rN, =forward_label`
    /// resolves once `forward_label` has been bound.
    pub fn flush_pool(&mut self, at_eof: bool) -> Result<(), AsmError> {
        let scope_arm = self.scope.clone();
        let scope_thumb = self.scope.clone();
        self.pool_arm.flush(&mut self.section, at_eof, |expr, _pos| revalue_expr(&scope_arm, expr))?;
        self.pool_thumb.flush(&mut self.section, at_eof, |expr, _pos| revalue_expr(&scope_thumb, expr))?;
        Ok(())
    }

    /// Queues a `b`/`bl` site whose target didn't resolve at operand-parse
    /// time; `emit_label_here` retries it the moment a new label is bound.
    pub fn queue_pending_branch(&mut self, branch: PendingBranch) {
        self.pending_branches.push(branch);
    }

    /// Re-attempts every still-unresolved forward branch target. `at_eof`
    /// turns a target that still won't resolve into a fatal `UnknownSymbol`
    /// instead of requeuing it for the next label binding.
    pub fn resolve_pending_branches(&mut self, at_eof: bool) -> Result<(), AsmError> {
        let scope = self.scope.clone();
        let base = self.base.unwrap_or(0);
        let pending = std::mem::take(&mut self.pending_branches);
        let mut remaining = Vec::new();
        for branch in pending {
            match evaluate(&branch.expr, &scope)? {
                EvalResult::Resolved(v) => {
                    let bytes = branch.encode(v as i64, base)?;
                    self.section.patch_word(branch.byte_offset, &bytes);
                }
                _ if at_eof => {
                    return Err(AsmError::UnknownSymbol {
                        pos: branch.pos.clone(),
                        name: branch.target_name.clone(),
                    });
                }
                _ => remaining.push(branch),
            }
        }
        self.pending_branches = remaining;
        Ok(())
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.section.bytes
    }

    pub fn bytes(&self) -> &[u8] {
        &self.section.bytes
    }

    /// Handles `@Ln:` / `Ln:` line-labels (§4.4.1): the index must be
    /// scanned and validated even inside a skipped `.if` branch, but the
    /// symbol is only bound to an address when the branch is active.
    pub fn handle_line_label(&mut self, raw_name: &str, pos: &SourcePos) -> Result<(), AsmError> {
        let digits: String = raw_name.chars().skip_while(|c| !c.is_ascii_digit()).collect();
        if let Ok(n) = digits.parse::<usize>() {
            if n != self.next_line_label {
                return Err(AsmError::Parse {
                    pos: pos.clone(),
                    message: format!("line-label index {n} out of sequence (expected {})", self.next_line_label),
                });
            }
            self.next_line_label += 1;
        }
        if self.active() {
            self.emit_label_here(raw_name, pos)?;
        }
        Ok(())
    }

    pub fn emit_label_here(&mut self, name: &str, pos: &SourcePos) -> Result<(), AsmError> {
        let addr = match self.base {
            Some(b) => LabelAddr::Known((b + self.section.bytes.len() as u32) as f64),
            None => LabelAddr::Linear(self.section.bytes.len() as f64, 1.0),
        };
        self.scope.borrow_mut().emit_label(name, addr, pos)?;
        // A label just bound here might be exactly what an earlier forward
        // branch was waiting on.
        self.resolve_pending_branches(false)
    }

    /// `.regs name, a-c, ...` (§4.8): rebinds register names in the current
    /// scope starting at index 0.
    pub fn handle_regs(&mut self, args: Vec<RegsArg>, pos: &SourcePos) -> Result<(), AsmError> {
        let expanded = expand_regs_args(&args, 0, pos)?;
        for (name, idx) in expanded {
            self.scope.borrow_mut().declare(&name, Entry::Register(idx), pos)?;
        }
        Ok(())
    }

    pub fn push_scope(&mut self) {
        self.scope = Scope::child(&self.scope);
    }

    pub fn pop_scope(&mut self, pos: &SourcePos) -> Result<(), AsmError> {
        let parent = self.scope.borrow().parent_ref();
        match parent {
            Some(p) => {
                self.scope = p;
                Ok(())
            }
            None => Err(AsmError::Parse {
                pos: pos.clone(),
                message: "`.end` with no matching `.begin`".into(),
            }),
        }
    }

    pub fn say(&mut self, line: &str) {
        self.output.say(line);
    }
}

fn revalue_expr(scope: &ScopeRef, expr: &Expr) -> Option<i64> {
    match evaluate(expr, scope) {
        Ok(EvalResult::Resolved(v)) => Some(v as i64),
        _ => None,
    }
}
