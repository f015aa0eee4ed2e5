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

//! C3: the 32-bit ARM encoding table. Each `encode_*` function is one
//! encoding rule; `encode` tries mnemonics in the order §4.3 requires
//! (data-processing before `mov`/`mvn` special-casing, etc.) so that the
//! first matching rule wins when more than one shape could apply.

use super::operand::*;
use crate::errors::AsmError;
use crate::pos::SourcePos;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cond {
    Eq,
    Ne,
    Cs,
    Cc,
    Mi,
    Pl,
    Vs,
    Vc,
    Hi,
    Ls,
    Ge,
    Lt,
    Gt,
    Le,
    Al,
}

impl Cond {
    pub fn parse(s: &str) -> Option<Cond> {
        use Cond::*;
        Some(match s {
            "eq" => Eq,
            "ne" => Ne,
            "cs" | "hs" => Cs,
            "cc" | "lo" => Cc,
            "mi" => Mi,
            "pl" => Pl,
            "vs" => Vs,
            "vc" => Vc,
            "hi" => Hi,
            "ls" => Ls,
            "ge" => Ge,
            "lt" => Lt,
            "gt" => Gt,
            "le" => Le,
            "al" => Al,
            _ => return None,
        })
    }

    pub fn bits(self) -> u32 {
        use Cond::*;
        match self {
            Eq => 0x0,
            Ne => 0x1,
            Cs => 0x2,
            Cc => 0x3,
            Mi => 0x4,
            Pl => 0x5,
            Vs => 0x6,
            Vc => 0x7,
            Hi => 0x8,
            Ls => 0x9,
            Ge => 0xA,
            Lt => 0xB,
            Gt => 0xC,
            Le => 0xD,
            Al => 0xE,
        }
    }
}

fn cond_field(cond: Cond) -> u32 {
    cond.bits() << 28
}

/// Encodes the 12-bit shifter operand (`operand2`) of a data-processing
/// instruction, returning `(I bit, bits[11:0])`.
fn shifter_operand(op: &Operand, pos: &SourcePos) -> Result<(u32, u32), AsmError> {
    match op {
        Operand::Imm(v) => {
            let (rot, imm8) = encode_rotated_immediate(*v as u32).ok_or_else(|| AsmError::Encoding {
                pos: pos.clone(),
                message: format!("immediate #{v} cannot be encoded as an 8-bit value rotated by an even amount"),
            })?;
            Ok((1, (rot << 8) | imm8))
        }
        Operand::Reg(r) => Ok((0, *r as u32)),
        Operand::ShiftedReg(r, shift) => {
            let bits = match shift {
                Shift::None => *r as u32,
                Shift::Immediate(op, amount) => {
                    let amount = if matches!(op, ShiftOp::Ror) && *amount == 0 {
                        // rrx
                        0
                    } else {
                        *amount
                    };
                    ((amount & 0x1F) << 7) | (op.bits() << 5) | (*r as u32)
                }
                Shift::Register(op, rs) => ((*rs as u32) << 8) | (op.bits() << 5) | (1 << 4) | (*r as u32),
            };
            Ok((0, bits))
        }
        _ => Err(AsmError::Encoding {
            pos: pos.clone(),
            message: "expected an immediate, register, or shifted-register operand".into(),
        }),
    }
}

struct DpOpcode {
    bits: u32,
    has_rd: bool,
    has_rn: bool,
}

fn dp_opcode(mnemonic: &str) -> Option<DpOpcode> {
    let (bits, has_rd, has_rn) = match mnemonic {
        "and" => (0x0, true, true),
        "eor" => (0x1, true, true),
        "sub" => (0x2, true, true),
        "rsb" => (0x3, true, true),
        "add" => (0x4, true, true),
        "adc" => (0x5, true, true),
        "sbc" => (0x6, true, true),
        "rsc" => (0x7, true, true),
        "tst" => (0x8, false, true),
        "teq" => (0x9, false, true),
        "cmp" => (0xA, false, true),
        "cmn" => (0xB, false, true),
        "orr" => (0xC, true, true),
        "mov" => (0xD, true, false),
        "bic" => (0xE, true, true),
        "mvn" => (0xF, true, false),
        _ => return None,
    };
    Some(DpOpcode { bits, has_rd, has_rn })
}

fn encode_data_processing(
    mnemonic: &str,
    cond: Cond,
    set_flags: bool,
    operands: &[Operand],
    pos: &SourcePos,
) -> Result<Option<u32>, AsmError> {
    let Some(op) = dp_opcode(mnemonic) else { return Ok(None) };

    let mut it = operands.iter();
    let rd = if op.has_rd {
        require_reg(it.next().ok_or_else(|| missing_operand(pos))?, pos)?
    } else {
        0
    };
    let rn = if op.has_rn {
        require_reg(it.next().ok_or_else(|| missing_operand(pos))?, pos)?
    } else {
        0
    };
    let shifter = it.next().ok_or_else(|| missing_operand(pos))?;
    let (i_bit, operand2) = shifter_operand(shifter, pos)?;

    // tst/teq/cmp/cmn always set flags regardless of the written `s` suffix.
    let s_bit = if matches!(mnemonic, "tst" | "teq" | "cmp" | "cmn") {
        1
    } else {
        set_flags as u32
    };

    let word = cond_field(cond)
        | (i_bit << 25)
        | (op.bits << 21)
        | (s_bit << 20)
        | ((rn as u32) << 16)
        | ((rd as u32) << 12)
        | operand2;
    Ok(Some(word))
}

fn encode_branch(mnemonic: &str, cond: Cond, operands: &[Operand], pos: &SourcePos) -> Result<Option<u32>, AsmError> {
    let link = match mnemonic {
        "b" => false,
        "bl" => true,
        _ => return Ok(None),
    };
    let target = require_imm(operands.first().ok_or_else(|| missing_operand(pos))?, pos)?;
    if target % 4 != 0 {
        return Err(AsmError::Alignment {
            pos: pos.clone(),
            message: "branch target is not word-aligned".into(),
        });
    }
    let offset = (target >> 2) & 0x00FF_FFFF;
    let word = cond_field(cond) | (0b101 << 25) | ((link as u32) << 24) | (offset as u32);
    Ok(Some(word))
}

fn encode_bx(mnemonic: &str, cond: Cond, operands: &[Operand], pos: &SourcePos) -> Result<Option<u32>, AsmError> {
    if mnemonic != "bx" && mnemonic != "blx" {
        return Ok(None);
    }
    let rm = require_reg(operands.first().ok_or_else(|| missing_operand(pos))?, pos)?;
    let link_bit = (mnemonic == "blx") as u32;
    let word = cond_field(cond) | 0x012F_FF10 | (link_bit << 5) | rm as u32;
    Ok(Some(word))
}

fn encode_mul(mnemonic: &str, cond: Cond, set_flags: bool, operands: &[Operand], pos: &SourcePos) -> Result<Option<u32>, AsmError> {
    let accumulate = match mnemonic {
        "mul" => false,
        "mla" => true,
        _ => return Ok(None),
    };
    let mut it = operands.iter();
    let rd = require_reg(it.next().ok_or_else(|| missing_operand(pos))?, pos)?;
    let rm = require_reg(it.next().ok_or_else(|| missing_operand(pos))?, pos)?;
    let rs = require_reg(it.next().ok_or_else(|| missing_operand(pos))?, pos)?;
    let rn = if accumulate {
        require_reg(it.next().ok_or_else(|| missing_operand(pos))?, pos)?
    } else {
        0
    };
    let word = cond_field(cond)
        | ((accumulate as u32) << 21)
        | ((set_flags as u32) << 20)
        | ((rd as u32) << 16)
        | ((rn as u32) << 12)
        | ((rs as u32) << 8)
        | (0x9 << 4)
        | rm as u32;
    Ok(Some(word))
}

/// Picks the bits a single-data-transfer `MemOperand` contributes: the I/P/U/W
/// bits and the 12-bit offset field (or register form).
fn mem_bits(mem: &MemOperand, byte_sized: bool, load: bool, pos: &SourcePos) -> Result<u32, AsmError> {
    let (base, offset, pre, writeback) = match mem {
        MemOperand::Offset { base, offset, writeback } => (*base, *offset, true, *writeback),
        MemOperand::PostIndexed { base, offset } => (*base, *offset, false, true),
    };
    let (i_bit, up, off_bits) = match offset {
        Offset::None => (0u32, 1u32, 0u32),
        Offset::Imm(v) => {
            if v.unsigned_abs() > 0xFFF {
                return Err(AsmError::Encoding {
                    pos: pos.clone(),
                    message: format!("offset #{v} exceeds the 12-bit single-transfer range"),
                });
            }
            (0, (v >= 0) as u32, v.unsigned_abs())
        }
        Offset::Reg(up, rm) => (1, up as u32, rm as u32),
        Offset::RegShift(up, rm, op, amount) => (1, up as u32, ((amount & 0x1F) << 7) | (op.bits() << 5) | rm as u32),
    };
    Ok((i_bit << 25)
        | ((pre as u32) << 24)
        | (up << 23)
        | ((byte_sized as u32) << 22)
        | ((writeback as u32) << 21)
        | ((load as u32) << 20)
        | ((base as u32) << 16)
        | off_bits)
}

fn encode_single_transfer(mnemonic: &str, cond: Cond, operands: &[Operand], pos: &SourcePos) -> Result<Option<u32>, AsmError> {
    let (load, byte_sized) = match mnemonic {
        "ldr" => (true, false),
        "ldrb" => (true, true),
        "str" => (false, false),
        "strb" => (false, true),
        _ => return Ok(None),
    };
    let mut it = operands.iter();
    let rd = require_reg(it.next().ok_or_else(|| missing_operand(pos))?, pos)?;
    let mem = require_mem(it.next().ok_or_else(|| missing_operand(pos))?, pos)?;
    let word = (0b01 << 26) | ((rd as u32) << 12) | mem_bits(&mem, byte_sized, load, pos)?;
    Ok(Some(cond_field(cond) | word))
}

/// `ldrh/ldrsh/ldrsb/strh` — the "halfword and signed" class, a distinct
/// template from the single-data-transfer one above.
fn encode_halfword_transfer(mnemonic: &str, cond: Cond, operands: &[Operand], pos: &SourcePos) -> Result<Option<u32>, AsmError> {
    let (load, sh) = match mnemonic {
        "ldrh" => (true, 0b01),
        "ldrsb" => (true, 0b10),
        "ldrsh" => (true, 0b11),
        "strh" => (false, 0b01),
        _ => return Ok(None),
    };
    let mut it = operands.iter();
    let rd = require_reg(it.next().ok_or_else(|| missing_operand(pos))?, pos)?;
    let mem = require_mem(it.next().ok_or_else(|| missing_operand(pos))?, pos)?;
    let (base, offset, pre, writeback) = match mem {
        MemOperand::Offset { base, offset, writeback } => (base, offset, true, writeback),
        MemOperand::PostIndexed { base, offset } => (base, offset, false, true),
    };
    let (i_bit, up, hi, lo) = match offset {
        Offset::None => (1u32, 1u32, 0u32, 0u32),
        Offset::Imm(v) => {
            if v.unsigned_abs() > 0xFF {
                return Err(AsmError::Encoding {
                    pos: pos.clone(),
                    message: format!("offset #{v} exceeds the 8-bit halfword-transfer range"),
                });
            }
            let u = v.unsigned_abs() as u32;
            (1, (v >= 0) as u32, (u >> 4) & 0xF, u & 0xF)
        }
        Offset::Reg(up, rm) => (0, up as u32, 0, rm as u32),
        Offset::RegShift(..) => {
            return Err(AsmError::Encoding {
                pos: pos.clone(),
                message: "halfword/signed transfers do not support a shifted-register offset".into(),
            })
        }
    };
    let word = cond_field(cond)
        | ((pre as u32) << 24)
        | (up << 23)
        | (i_bit << 22)
        | ((writeback as u32) << 21)
        | ((load as u32) << 20)
        | ((base as u32) << 16)
        | ((rd as u32) << 12)
        | (hi << 8)
        | (1 << 7)
        | (sh << 5)
        | (1 << 4)
        | lo;
    Ok(Some(word))
}

fn reglist_bits(op: &Operand, pos: &SourcePos) -> Result<u32, AsmError> {
    match op {
        Operand::RegList(mask) => Ok(*mask as u32),
        _ => Err(AsmError::Encoding {
            pos: pos.clone(),
            message: "expected a register list `{r0, r1, ...}`".into(),
        }),
    }
}

fn encode_block_transfer(mnemonic: &str, cond: Cond, operands: &[Operand], pos: &SourcePos) -> Result<Option<u32>, AsmError> {
    let (load, pre, up) = match mnemonic {
        "stmia" | "stm" => (false, false, true),
        "stmib" => (false, true, true),
        "stmda" => (false, false, false),
        "stmdb" => (false, true, false),
        "ldmia" | "ldm" => (true, false, true),
        "ldmib" => (true, true, true),
        "ldmda" => (true, false, false),
        "ldmdb" => (true, true, false),
        "push" => (false, true, false),
        "pop" => (true, false, true),
        _ => return Ok(None),
    };
    let mut it = operands.iter();
    // push/pop implicitly use sp with writeback; the driver passes only the
    // register-list operand for them.
    let (base, writeback) = if mnemonic == "push" || mnemonic == "pop" {
        (SP, true)
    } else {
        let base = require_reg(it.next().ok_or_else(|| missing_operand(pos))?, pos)?;
        (base, true)
    };
    let list = reglist_bits(it.next().ok_or_else(|| missing_operand(pos))?, pos)?;
    let word = cond_field(cond)
        | (0b100 << 25)
        | ((pre as u32) << 24)
        | ((up as u32) << 23)
        | ((writeback as u32) << 21)
        | ((load as u32) << 20)
        | ((base as u32) << 16)
        | list;
    Ok(Some(word))
}

fn encode_swi(mnemonic: &str, cond: Cond, operands: &[Operand], pos: &SourcePos) -> Result<Option<u32>, AsmError> {
    if mnemonic != "swi" && mnemonic != "svc" {
        return Ok(None);
    }
    let v = require_imm(operands.first().ok_or_else(|| missing_operand(pos))?, pos)?;
    if !(0..=0x00FF_FFFF).contains(&v) {
        return Err(AsmError::Encoding {
            pos: pos.clone(),
            message: format!("swi comment #{v} exceeds 24 bits"),
        });
    }
    Ok(Some(cond_field(cond) | (0xF << 24) | v as u32))
}

fn missing_operand(pos: &SourcePos) -> AsmError {
    AsmError::Encoding {
        pos: pos.clone(),
        message: "missing operand".into(),
    }
}

/// Tries each ARM encoding rule in declaration order (§4.3); the first whose
/// parameter shapes and predicates all pass wins.
pub fn encode(
    mnemonic: &str,
    cond: Cond,
    set_flags: bool,
    operands: &[Operand],
    pos: &SourcePos,
) -> Result<u32, AsmError> {
    let rules: [fn(&str, Cond, &[Operand], &SourcePos) -> Result<Option<u32>, AsmError>; 6] = [
        encode_branch,
        encode_bx,
        encode_single_transfer,
        encode_halfword_transfer,
        encode_block_transfer,
        encode_swi,
    ];

    if let Some(word) = encode_data_processing(mnemonic, cond, set_flags, operands, pos)? {
        return Ok(word);
    }
    if let Some(word) = encode_mul(mnemonic, cond, set_flags, operands, pos)? {
        return Ok(word);
    }
    for rule in rules {
        if let Some(word) = rule(mnemonic, cond, operands, pos)? {
            return Ok(word);
        }
    }

    Err(AsmError::Encoding {
        pos: pos.clone(),
        message: format!("`{mnemonic}` is not a recognised ARM mnemonic for this operand shape"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mov_immediate_rotates_correctly() {
        let word = encode("mov", Cond::Al, false, &[Operand::Reg(0), Operand::Imm(0xFF)], &SourcePos::synthetic()).unwrap();
        assert_eq!(word, 0xE3A000FF);
    }

    #[test]
    fn mov_unencodable_immediate_is_rejected() {
        let err = encode("mov", Cond::Al, false, &[Operand::Reg(0), Operand::Imm(0x101)], &SourcePos::synthetic());
        assert!(err.is_err());
    }

    #[test]
    fn branch_encodes_word_offset() {
        let word = encode("b", Cond::Al, false, &[Operand::Imm(8)], &SourcePos::synthetic()).unwrap();
        assert_eq!(word & 0x00FF_FFFF, 2);
    }

    #[test]
    fn cmp_always_sets_flags_even_unrequested() {
        let word = encode("cmp", Cond::Al, false, &[Operand::Reg(0), Operand::Imm(1)], &SourcePos::synthetic()).unwrap();
        assert_eq!((word >> 20) & 1, 1);
    }

    #[test]
    fn push_uses_sp_with_writeback() {
        let word = encode("push", Cond::Al, false, &[Operand::RegList(0b11)], &SourcePos::synthetic()).unwrap();
        assert_eq!((word >> 16) & 0xF, SP as u32);
        assert_eq!((word >> 21) & 1, 1);
    }
}
