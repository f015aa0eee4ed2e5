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

//! C6: the literal-pool resolver. Owns the decision logic for `ldr rN,
//! =expr` (§4.6); the driver owns the actual byte buffer and calls back into
//! `PatchSink` to rewrite already-emitted instructions.

use crate::encoder::operand::encode_rotated_immediate;
use crate::encoder::Mode;
use crate::errors::AsmError;
use crate::expr::Expr;
use crate::pos::SourcePos;

/// The driver's byte buffer, exposed narrowly enough for the pool resolver
/// to patch a previously-emitted instruction or append a pool word.
pub trait PatchSink {
    fn patch_word(&mut self, addr: u32, bytes: &[u8]);
    fn append_word(&mut self, value: u32) -> u32;
    fn current_addr(&self) -> u32;
    fn align_to(&mut self, n: u32);
}

/// A `ldr rN, =expr` site whose value could not be encoded as `mov`/`mvn` at
/// request time and was instead deferred to a pool word.
pub struct PoolRequest {
    pub mode: Mode,
    pub reg: u8,
    pub site_addr: u32,
    pub value: Option<i64>,
    pub expr: Expr,
    pub pos: SourcePos,
}

/// A `ldr rN, =expr` site that *was* collapsed to `mov`/`mvn` at request
/// time. Kept revisable until the next `.pool` or end-of-file (§4.6
/// back-tracking): if the expression's value changes by then, the site must
/// be retracted back to a real `ldr` pool request.
pub struct PendingConversion {
    pub mode: Mode,
    pub reg: u8,
    pub site_addr: u32,
    pub value_at_conversion: i64,
    pub expr: Expr,
    pub pos: SourcePos,
}

#[derive(Default)]
pub struct PoolQueue {
    requests: Vec<PoolRequest>,
    pending: Vec<PendingConversion>,
}

pub enum LdrEqOutcome {
    /// Collapsed to `mov rN, #v`.
    Mov(i64),
    /// Collapsed to `mvn rN, #~v`.
    Mvn(i64),
    /// Deferred to a pool entry; the caller should emit a placeholder
    /// `ldr rN, [pc, #0]` at `site_addr` and revisit it at flush time.
    Deferred,
}

impl PoolQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decides the outcome of one `ldr rN, =expr` site (§4.6 steps 1-3). If
    /// `value` is `None` the expression was not yet resolvable and the site
    /// is unconditionally deferred; `expr` is kept so `flush` can re-evaluate
    /// it once more of the file (and any label it names) has been assembled.
    pub fn resolve_ldr_eq(&mut self, mode: Mode, reg: u8, value: Option<i64>, expr: Expr, site_addr: u32, pos: &SourcePos) -> LdrEqOutcome {
        match (mode, value) {
            (Mode::Arm, Some(v)) => {
                if encode_rotated_immediate(v as u32).is_some() {
                    self.pending.push(PendingConversion {
                        mode,
                        reg,
                        site_addr,
                        value_at_conversion: v,
                        expr,
                        pos: pos.clone(),
                    });
                    LdrEqOutcome::Mov(v)
                } else if encode_rotated_immediate(!(v as u32)).is_some() {
                    self.pending.push(PendingConversion {
                        mode,
                        reg,
                        site_addr,
                        value_at_conversion: v,
                        expr,
                        pos: pos.clone(),
                    });
                    LdrEqOutcome::Mvn(v)
                } else {
                    self.requests.push(PoolRequest {
                        mode,
                        reg,
                        site_addr,
                        value: Some(v),
                        expr,
                        pos: pos.clone(),
                    });
                    LdrEqOutcome::Deferred
                }
            }
            (Mode::Thumb, _) => {
                // Thumb `ldr =expr` never collapses to mov (§4.6).
                self.requests.push(PoolRequest {
                    mode,
                    reg,
                    site_addr,
                    value,
                    expr,
                    pos: pos.clone(),
                });
                LdrEqOutcome::Deferred
            }
            (Mode::Arm, None) => {
                self.requests.push(PoolRequest {
                    mode,
                    reg,
                    site_addr,
                    value: None,
                    expr,
                    pos: pos.clone(),
                });
                LdrEqOutcome::Deferred
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty() && self.pending.is_empty()
    }

    /// `.pool` flush (or end-of-file): revalidates every `mov`/`mvn`
    /// conversion made since the last flush, then places a word for every
    /// outstanding deferred request, back-patching its `ldr` instruction's
    /// PC-relative offset.
    ///
    /// `revalue` re-evaluates a site's target expression now that more of
    /// the file has been assembled; `None` means still unresolved (fatal
    /// only at end-of-file, the caller decides).
    pub fn flush(
        &mut self,
        sink: &mut dyn PatchSink,
        at_eof: bool,
        mut revalue: impl FnMut(&Expr, &SourcePos) -> Option<i64>,
    ) -> Result<(), AsmError> {
        for pending in std::mem::take(&mut self.pending) {
            let still_valid = match revalue(&pending.expr, &pending.pos) {
                Some(v) if v == pending.value_at_conversion => true,
                _ => false,
            };
            if !still_valid {
                // Retraction: the collapse no longer holds, reissue a real
                // `ldr` and requeue a pool request at the same site.
                self.requests.push(PoolRequest {
                    mode: pending.mode,
                    reg: pending.reg,
                    site_addr: pending.site_addr,
                    value: revalue(&pending.expr, &pending.pos),
                    expr: pending.expr.clone(),
                    pos: pending.pos.clone(),
                });
                let placeholder = encode_ldr_placeholder(pending.mode, pending.reg);
                sink.patch_word(pending.site_addr, &placeholder);
            }
        }

        if self.requests.is_empty() {
            return Ok(());
        }

        sink.align_to(4);

        let requests = std::mem::take(&mut self.requests);
        for req in requests {
            let value = match req.value.or_else(|| revalue(&req.expr, &req.pos)) {
                Some(v) => v,
                None => {
                    if at_eof {
                        return Err(AsmError::Other {
                            pos: req.pos.clone(),
                            message: "literal pool entry never resolved".into(),
                        });
                    }
                    // Not yet resolvable; requeue for the next flush.
                    self.requests.push(PoolRequest { value: None, ..req });
                    continue;
                }
            };

            // A pool entry that, by flush time, turns out immediate-encodable
            // is downgraded to `mov`/`mvn` (§4.6); its pool word becomes an
            // unused zero-filled slot.
            if req.mode == Mode::Arm {
                if let Some((rot, imm8)) = encode_rotated_immediate(value as u32) {
                    let word = 0xE3A0_0000u32 | ((req.reg as u32) << 12) | (rot << 8) | imm8;
                    sink.patch_word(req.site_addr, &word.to_le_bytes());
                    sink.append_word(0);
                    continue;
                }
            }

            let pool_addr = sink.append_word(value as u32);
            let distance = pool_addr as i64 - (req.site_addr as i64 + pc_bias(req.mode));
            let max_distance = match req.mode {
                Mode::Arm => 4095,
                Mode::Thumb => 1020,
            };
            if distance < 0 || distance > max_distance || (req.mode == Mode::Thumb && distance % 4 != 0) {
                return Err(AsmError::PoolTooFar {
                    pos: req.pos,
                    message: format!("distance {distance} exceeds the {max_distance}-byte pool range"),
                });
            }
            patch_ldr_offset(sink, req.mode, req.site_addr, req.reg, distance as u32);
        }

        Ok(())
    }
}

/// ARM/Thumb PC is always the instruction address + 8 (ARM) or +4 (Thumb),
/// word-aligned, per the pipelined-PC convention both encodings inherit.
fn pc_bias(mode: Mode) -> i64 {
    match mode {
        Mode::Arm => 8,
        Mode::Thumb => 4,
    }
}

pub(crate) fn encode_ldr_placeholder(mode: Mode, reg: u8) -> Vec<u8> {
    match mode {
        Mode::Arm => {
            let word = 0xE59F_0000u32 | ((reg as u32) << 12);
            word.to_le_bytes().to_vec()
        }
        Mode::Thumb => {
            let word = (0b01001 << 11) | ((reg as u16) << 8);
            word.to_le_bytes().to_vec()
        }
    }
}

fn patch_ldr_offset(sink: &mut dyn PatchSink, mode: Mode, site_addr: u32, reg: u8, offset: u32) {
    match mode {
        Mode::Arm => {
            let word = 0xE59F_0000u32 | ((reg as u32) << 12) | offset;
            sink.patch_word(site_addr, &word.to_le_bytes());
        }
        Mode::Thumb => {
            let word = (0b01001u16 << 11) | ((reg as u16) << 8) | ((offset / 4) as u16);
            sink.patch_word(site_addr, &word.to_le_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct TestSink {
        bytes: HashMap<u32, Vec<u8>>,
        cursor: u32,
    }

    impl PatchSink for TestSink {
        fn patch_word(&mut self, addr: u32, bytes: &[u8]) {
            self.bytes.insert(addr, bytes.to_vec());
        }
        fn append_word(&mut self, value: u32) -> u32 {
            let addr = self.cursor;
            self.bytes.insert(addr, value.to_le_bytes().to_vec());
            self.cursor += 4;
            addr
        }
        fn current_addr(&self) -> u32 {
            self.cursor
        }
        fn align_to(&mut self, n: u32) {
            let rem = self.cursor % n;
            if rem != 0 {
                self.cursor += n - rem;
            }
        }
    }

    fn dummy_expr() -> Expr {
        Expr::Number(0.0, false)
    }

    #[test]
    fn small_immediate_collapses_to_mov() {
        let mut q = PoolQueue::new();
        let outcome = q.resolve_ldr_eq(Mode::Arm, 0, Some(5), dummy_expr(), 0, &SourcePos::synthetic());
        assert!(matches!(outcome, LdrEqOutcome::Mov(5)));
        assert!(!q.is_empty()); // pending conversion still tracked
    }

    #[test]
    fn non_immediate_value_is_deferred() {
        let mut q = PoolQueue::new();
        let outcome = q.resolve_ldr_eq(Mode::Arm, 0, Some(0x1234_5678), dummy_expr(), 0, &SourcePos::synthetic());
        assert!(matches!(outcome, LdrEqOutcome::Deferred));
    }

    #[test]
    fn thumb_never_collapses() {
        let mut q = PoolQueue::new();
        let outcome = q.resolve_ldr_eq(Mode::Thumb, 0, Some(5), dummy_expr(), 0, &SourcePos::synthetic());
        assert!(matches!(outcome, LdrEqOutcome::Deferred));
    }

    #[test]
    fn flush_places_word_and_patches_offset() {
        let mut q = PoolQueue::new();
        // site at 4, pc bias +8 => pc=12; pool word lands at 16 => distance 4.
        q.resolve_ldr_eq(Mode::Arm, 0, Some(0x1234_5678), dummy_expr(), 4, &SourcePos::synthetic());
        let mut sink = TestSink { bytes: HashMap::new(), cursor: 16 };
        q.flush(&mut sink, true, |_, _| Some(0x1234_5678)).unwrap();
        let patched = u32::from_le_bytes(sink.bytes[&4].clone().try_into().unwrap());
        assert_eq!(patched & 0xFFF, 4);
        let word_at_pool = u32::from_le_bytes(sink.bytes[&16].clone().try_into().unwrap());
        assert_eq!(word_at_pool, 0x1234_5678);
    }

    #[test]
    fn flush_revalues_a_forward_referenced_expression() {
        let mut q = PoolQueue::new();
        let forward = Expr::Name("forward".into(), SourcePos::synthetic());
        q.resolve_ldr_eq(Mode::Arm, 0, None, forward.clone(), 4, &SourcePos::synthetic());
        let mut sink = TestSink { bytes: HashMap::new(), cursor: 16 };
        q.flush(&mut sink, true, |e, _| match e {
            Expr::Name(n, _) if n == "forward" => Some(0x1234_5678),
            _ => None,
        })
        .unwrap();
        let word_at_pool = u32::from_le_bytes(sink.bytes[&16].clone().try_into().unwrap());
        assert_eq!(word_at_pool, 0x1234_5678);
    }
}
