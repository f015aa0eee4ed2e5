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

//! C3: the 16-bit Thumb encoding table. Thumb carries no condition suffix
//! (other than `b<cond>`, the conditional branch) and no explicit `s` flag -
//! every data-processing form always sets the flags.

use super::operand::*;
use crate::errors::AsmError;
use crate::pos::SourcePos;

fn missing_operand(pos: &SourcePos) -> AsmError {
    AsmError::Encoding {
        pos: pos.clone(),
        message: "missing operand".into(),
    }
}

fn low_reg(op: &Operand, pos: &SourcePos) -> Result<u8, AsmError> {
    let r = require_reg(op, pos)?;
    if r > 7 {
        return Err(AsmError::Encoding {
            pos: pos.clone(),
            message: format!("r{r} is not addressable in this Thumb form (r0-r7 only)"),
        });
    }
    Ok(r)
}

/// Format 1: move shifted register. `lsl/lsr/asr rd, rs, #imm5`.
fn encode_shifted_move(mnemonic: &str, operands: &[Operand], pos: &SourcePos) -> Result<Option<u16>, AsmError> {
    let op_bits = match mnemonic {
        "lsl" => 0b00,
        "lsr" => 0b01,
        "asr" => 0b10,
        _ => return Ok(None),
    };
    if operands.len() != 3 {
        return Ok(None);
    }
    let rd = low_reg(&operands[0], pos)?;
    let rs = low_reg(&operands[1], pos)?;
    let imm = require_imm(&operands[2], pos)?;
    if !(0..=31).contains(&imm) {
        return Err(AsmError::Encoding {
            pos: pos.clone(),
            message: format!("shift amount #{imm} out of range 0-31"),
        });
    }
    let word = (0b000 << 13) | (op_bits << 11) | ((imm as u16) << 6) | ((rs as u16) << 3) | rd as u16;
    Ok(Some(word))
}

/// Format 2: add/subtract, register or 3-bit immediate.
fn encode_add_sub(mnemonic: &str, operands: &[Operand], pos: &SourcePos) -> Result<Option<u16>, AsmError> {
    if mnemonic != "add" && mnemonic != "sub" {
        return Ok(None);
    }
    if operands.len() != 3 {
        return Ok(None);
    }
    let rd = match low_reg(&operands[0], pos) {
        Ok(r) => r,
        Err(_) => return Ok(None),
    };
    let rs = match low_reg(&operands[1], pos) {
        Ok(r) => r,
        Err(_) => return Ok(None),
    };
    let sub = mnemonic == "sub";
    match &operands[2] {
        Operand::Reg(rn) if *rn <= 7 => {
            let word = (0b00011 << 11) | ((sub as u16) << 10) | ((*rn as u16) << 6) | ((rs as u16) << 3) | rd as u16;
            Ok(Some(word))
        }
        Operand::Imm(v) if (0..=7).contains(v) => {
            let word = (0b00011 << 11) | ((sub as u16) << 10) | (1 << 10) | ((*v as u16) << 6) | ((rs as u16) << 3) | rd as u16;
            Ok(Some(word))
        }
        _ => Ok(None),
    }
}

/// Format 3: move/compare/add/subtract immediate (8-bit), `rd` implicit from
/// a two-operand form.
fn encode_imm8(mnemonic: &str, operands: &[Operand], pos: &SourcePos) -> Result<Option<u16>, AsmError> {
    let op_bits = match mnemonic {
        "mov" => 0b00,
        "cmp" => 0b01,
        "add" => 0b10,
        "sub" => 0b11,
        _ => return Ok(None),
    };
    if operands.len() != 2 {
        return Ok(None);
    }
    let rd = match low_reg(&operands[0], pos) {
        Ok(r) => r,
        Err(_) => return Ok(None),
    };
    let Operand::Imm(v) = &operands[1] else { return Ok(None) };
    if !(0..=255).contains(v) {
        return Err(AsmError::Encoding {
            pos: pos.clone(),
            message: format!("immediate #{v} exceeds the 8-bit range for this Thumb form"),
        });
    }
    let word = (0b001 << 13) | (op_bits << 11) | ((rd as u16) << 8) | (*v as u16);
    Ok(Some(word))
}

/// Format 4: ALU operations (two low registers only, always sets flags).
fn encode_alu(mnemonic: &str, operands: &[Operand], pos: &SourcePos) -> Result<Option<u16>, AsmError> {
    let op_bits: u16 = match mnemonic {
        "and" => 0b0000,
        "eor" => 0b0001,
        "lsl" if operands.len() == 2 => 0b0010,
        "lsr" if operands.len() == 2 => 0b0011,
        "asr" if operands.len() == 2 => 0b0100,
        "adc" => 0b0101,
        "sbc" => 0b0110,
        "ror" => 0b0111,
        "tst" => 0b1000,
        "neg" => 0b1001,
        "cmp" if operands.len() == 2 => 0b1010,
        "cmn" => 0b1011,
        "orr" => 0b1100,
        "mul" => 0b1101,
        "bic" => 0b1110,
        "mvn" => 0b1111,
        _ => return Ok(None),
    };
    if operands.len() != 2 {
        return Ok(None);
    }
    let rd = low_reg(&operands[0], pos)?;
    let rs = low_reg(&operands[1], pos)?;
    let word = (0b010000 << 10) | (op_bits << 6) | ((rs as u16) << 3) | rd as u16;
    Ok(Some(word))
}

/// Format 5: hi-register operations and branch/exchange.
fn encode_hi_reg(mnemonic: &str, operands: &[Operand], pos: &SourcePos) -> Result<Option<u16>, AsmError> {
    if mnemonic == "bx" || mnemonic == "blx" {
        let rm = require_reg(operands.first().ok_or_else(|| missing_operand(pos))?, pos)?;
        let link_bit = (mnemonic == "blx") as u16;
        let h2 = (rm > 7) as u16;
        let word = (0b010001 << 10) | (0b11 << 8) | (link_bit << 7) | (h2 << 6) | ((rm as u16 & 0x7) << 3);
        return Ok(Some(word));
    }
    let op_bits: u16 = match mnemonic {
        "add" if operands.len() == 2 => 0b00,
        "cmp" if operands.len() == 2 => 0b01,
        "mov" if operands.len() == 2 => 0b10,
        _ => return Ok(None),
    };
    if operands.len() != 2 {
        return Ok(None);
    }
    let rd = require_reg(&operands[0], pos)?;
    let rs = require_reg(&operands[1], pos)?;
    if rd <= 7 && rs <= 7 {
        return Ok(None); // low/low form belongs to encode_alu/encode_add_sub
    }
    let h1 = (rd > 7) as u16;
    let h2 = (rs > 7) as u16;
    let word = (0b010001 << 10) | (op_bits << 8) | (h1 << 7) | (h2 << 6) | ((rs as u16 & 0x7) << 3) | (rd as u16 & 0x7);
    Ok(Some(word))
}

/// Format 6: PC-relative load, `ldr rd, [pc, #imm]` (word-aligned, unsigned byte offset*4).
fn encode_pc_relative_load(mnemonic: &str, operands: &[Operand], pos: &SourcePos) -> Result<Option<u16>, AsmError> {
    if mnemonic != "ldr" {
        return Ok(None);
    }
    if operands.len() != 2 {
        return Ok(None);
    }
    let rd = low_reg(&operands[0], pos)?;
    let mem = match &operands[1] {
        Operand::Mem(m) => m,
        _ => return Ok(None),
    };
    let MemOperand::Offset { base: PC, offset: Offset::Imm(v), writeback: false } = mem else {
        return Ok(None);
    };
    if *v % 4 != 0 || !(0..=1020).contains(v) {
        return Err(AsmError::Encoding {
            pos: pos.clone(),
            message: format!("pc-relative load offset #{v} must be word-aligned and within 0-1020"),
        });
    }
    let word = (0b01001 << 11) | ((rd as u16) << 8) | ((*v / 4) as u16);
    Ok(Some(word))
}

/// Formats 7/8: load/store with register offset (byte/word/halfword/signed).
fn encode_reg_offset_transfer(mnemonic: &str, operands: &[Operand], pos: &SourcePos) -> Result<Option<u16>, AsmError> {
    let (load, kind): (bool, &str) = match mnemonic {
        "str" => (false, "w"),
        "strb" => (false, "b"),
        "ldr" => (true, "w"),
        "ldrb" => (true, "b"),
        "strh" => (false, "h"),
        "ldrh" => (true, "h"),
        "ldsb" | "ldrsb" => (true, "sb"),
        "ldsh" | "ldrsh" => (true, "sh"),
        _ => return Ok(None),
    };
    if operands.len() != 2 {
        return Ok(None);
    }
    let rd = low_reg(&operands[0], pos)?;
    let mem = match &operands[1] {
        Operand::Mem(m) => m,
        _ => return Ok(None),
    };
    let MemOperand::Offset { base, offset: Offset::Reg(true, ro), writeback: false } = mem else {
        return Ok(None);
    };
    let base = low_reg(&Operand::Reg(*base), pos)?;
    let ro = low_reg(&Operand::Reg(*ro), pos)?;
    let (b_bit, sub_opc) = match kind {
        "w" => (0u16, if load { 0b100 } else { 0b000 }),
        "b" => (1u16, if load { 0b110 } else { 0b010 }),
        "h" => (0u16, if load { 0b101 } else { 0b001 }), // ldrh/strh use the sign-extend format (7)
        "sb" => (0u16, 0b011),
        "sh" => (0u16, 0b111),
        _ => unreachable!(),
    };
    // formats 7 (word/byte load-store) and 8 (sign-extended byte/halfword)
    // share the top 4 bits but diverge on bit 9 (B) vs (S/H); encode the
    // word directly rather than re-deriving the opcode split.
    let word = match kind {
        "w" | "b" => (0b0101 << 12) | ((load as u16) << 11) | (b_bit << 10) | ((ro as u16) << 6) | ((base as u16) << 3) | rd as u16,
        _ => {
            let (s_bit, h_bit) = match sub_opc {
                0b001 => (0, 1), // strh
                0b101 => (0, 1), // ldrh shares S=0,H=1 with strh; L bit distinguishes
                0b011 => (1, 0), // ldrsb
                0b111 => (1, 1), // ldrsh
                _ => unreachable!(),
            };
            (0b0101 << 12) | (h_bit << 11) | (s_bit << 10) | (1 << 9) | ((ro as u16) << 6) | ((base as u16) << 3) | rd as u16
        }
    };
    Ok(Some(word))
}

/// Format 9: load/store with immediate offset (word/byte).
fn encode_imm_offset_transfer(mnemonic: &str, operands: &[Operand], pos: &SourcePos) -> Result<Option<u16>, AsmError> {
    let (load, byte_sized) = match mnemonic {
        "str" => (false, false),
        "ldr" => (true, false),
        "strb" => (false, true),
        "ldrb" => (true, true),
        _ => return Ok(None),
    };
    if operands.len() != 2 {
        return Ok(None);
    }
    let rd = low_reg(&operands[0], pos)?;
    let mem = match &operands[1] {
        Operand::Mem(m) => m,
        _ => return Ok(None),
    };
    let MemOperand::Offset { base, offset: Offset::Imm(v), writeback: false } = mem else {
        return Ok(None);
    };
    let base = low_reg(&Operand::Reg(*base), pos)?;
    let align = if byte_sized { 1 } else { 4 };
    let max = if byte_sized { 31 } else { 124 };
    if v % align != 0 || !(0..=max).contains(v) {
        return Err(AsmError::Encoding {
            pos: pos.clone(),
            message: format!("offset #{v} out of range for this immediate transfer"),
        });
    }
    let field = if byte_sized { *v } else { *v / 4 };
    let word = (0b011 << 13) | ((byte_sized as u16) << 12) | ((load as u16) << 11) | ((field as u16) << 6) | ((base as u16) << 3) | rd as u16;
    Ok(Some(word))
}

/// Format 10: load/store halfword, immediate offset.
fn encode_halfword_imm(mnemonic: &str, operands: &[Operand], pos: &SourcePos) -> Result<Option<u16>, AsmError> {
    let load = match mnemonic {
        "strh" => false,
        "ldrh" => true,
        _ => return Ok(None),
    };
    if operands.len() != 2 {
        return Ok(None);
    }
    let rd = low_reg(&operands[0], pos)?;
    let mem = match &operands[1] {
        Operand::Mem(m) => m,
        _ => return Ok(None),
    };
    let MemOperand::Offset { base, offset: Offset::Imm(v), writeback: false } = mem else {
        return Ok(None);
    };
    let base = low_reg(&Operand::Reg(*base), pos)?;
    if *v % 2 != 0 || !(0..=62).contains(v) {
        return Err(AsmError::Encoding {
            pos: pos.clone(),
            message: format!("halfword offset #{v} must be even and within 0-62"),
        });
    }
    let word = (0b1000 << 12) | ((load as u16) << 11) | (((*v / 2) as u16) << 6) | ((base as u16) << 3) | rd as u16;
    Ok(Some(word))
}

/// Format 11: SP-relative load/store.
fn encode_sp_relative(mnemonic: &str, operands: &[Operand], pos: &SourcePos) -> Result<Option<u16>, AsmError> {
    let load = match mnemonic {
        "str" => false,
        "ldr" => true,
        _ => return Ok(None),
    };
    if operands.len() != 2 {
        return Ok(None);
    }
    let rd = low_reg(&operands[0], pos)?;
    let mem = match &operands[1] {
        Operand::Mem(m) => m,
        _ => return Ok(None),
    };
    let MemOperand::Offset { base: SP, offset: Offset::Imm(v), writeback: false } = mem else {
        return Ok(None);
    };
    if *v % 4 != 0 || !(0..=1020).contains(v) {
        return Err(AsmError::Encoding {
            pos: pos.clone(),
            message: format!("sp-relative offset #{v} must be word-aligned and within 0-1020"),
        });
    }
    let word = (0b1001 << 12) | ((load as u16) << 11) | ((rd as u16) << 8) | ((*v / 4) as u16);
    Ok(Some(word))
}

/// Format 12: load address, `add rd, pc|sp, #imm` (word-aligned).
fn encode_load_address(mnemonic: &str, operands: &[Operand], pos: &SourcePos) -> Result<Option<u16>, AsmError> {
    if mnemonic != "add" || operands.len() != 3 {
        return Ok(None);
    }
    let rd = low_reg(&operands[0], pos)?;
    let src = match &operands[1] {
        Operand::Reg(r) => *r,
        _ => return Ok(None),
    };
    if src != PC && src != SP {
        return Ok(None);
    }
    let v = require_imm(&operands[2], pos)?;
    if v % 4 != 0 || !(0..=1020).contains(&v) {
        return Err(AsmError::Encoding {
            pos: pos.clone(),
            message: format!("load-address offset #{v} must be word-aligned and within 0-1020"),
        });
    }
    let sp_bit = (src == SP) as u16;
    let word = (0b1010 << 12) | (sp_bit << 11) | ((rd as u16) << 8) | ((v / 4) as u16);
    Ok(Some(word))
}

/// Format 13: add offset to stack pointer, `add sp, #±imm7*4`.
fn encode_add_sp(mnemonic: &str, operands: &[Operand], pos: &SourcePos) -> Result<Option<u16>, AsmError> {
    if mnemonic != "add" || operands.len() != 2 {
        return Ok(None);
    }
    let Operand::Reg(SP) = &operands[0] else { return Ok(None) };
    let v = require_imm(&operands[1], pos)?;
    if v % 4 != 0 || !(-508..=508).contains(&v) {
        return Err(AsmError::Encoding {
            pos: pos.clone(),
            message: format!("stack adjustment #{v} must be word-aligned and within ±508"),
        });
    }
    let sign = (v < 0) as u16;
    let word = (0b10110000 << 8) | (sign << 7) | ((v.unsigned_abs() / 4) as u16);
    Ok(Some(word))
}

/// Format 14: push/pop register list (with optional lr/pc).
fn encode_push_pop(mnemonic: &str, operands: &[Operand], pos: &SourcePos) -> Result<Option<u16>, AsmError> {
    let load = match mnemonic {
        "push" => false,
        "pop" => true,
        _ => return Ok(None),
    };
    let mask = reglist_bits(operands.first().ok_or_else(|| missing_operand(pos))?, pos)?;
    let special_bit = if load { (mask >> PC) & 1 } else { (mask >> LR) & 1 };
    let low_mask = mask & 0xFF;
    let word = (0b1011 << 12) | ((load as u16) << 11) | (0b10 << 9) | ((special_bit as u16) << 8) | low_mask as u16;
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

/// Format 15: multiple load/store, always IA with writeback.
fn encode_multiple_transfer(mnemonic: &str, operands: &[Operand], pos: &SourcePos) -> Result<Option<u16>, AsmError> {
    let load = match mnemonic {
        "stmia" | "stm" => false,
        "ldmia" | "ldm" => true,
        _ => return Ok(None),
    };
    let rb = low_reg(operands.first().ok_or_else(|| missing_operand(pos))?, pos)?;
    let mask = reglist_bits(operands.get(1).ok_or_else(|| missing_operand(pos))?, pos)?;
    let word = (0b1100 << 12) | ((load as u16) << 11) | ((rb as u16) << 8) | mask as u16;
    Ok(Some(word))
}

/// Format 16: conditional branch (8-bit signed word*2 offset).
fn encode_conditional_branch(mnemonic: &str, operands: &[Operand], pos: &SourcePos) -> Result<Option<u16>, AsmError> {
    let Some(cond_str) = mnemonic.strip_prefix('b') else { return Ok(None) };
    if cond_str.is_empty() || cond_str == "l" || cond_str == "x" {
        return Ok(None);
    }
    let cond = super::arm::Cond::parse(cond_str).ok_or_else(|| AsmError::Encoding {
        pos: pos.clone(),
        message: format!("`{cond_str}` is not a recognised condition code"),
    })?;
    if cond == super::arm::Cond::Al {
        return Ok(None); // unconditional `b` handled by format 18
    }
    let target = require_imm(operands.first().ok_or_else(|| missing_operand(pos))?, pos)?;
    if target % 2 != 0 || !(-256..=254).contains(&target) {
        return Err(AsmError::Encoding {
            pos: pos.clone(),
            message: format!("conditional branch offset #{target} out of range"),
        });
    }
    let signed8 = (target / 2) as i16 as u16 & 0xFF;
    let word = (0b1101 << 12) | ((cond.bits() as u16) << 8) | signed8;
    Ok(Some(word))
}

/// Format 18: unconditional branch, `b`, 11-bit signed word*2 offset.
fn encode_unconditional_branch(mnemonic: &str, operands: &[Operand], pos: &SourcePos) -> Result<Option<u16>, AsmError> {
    if mnemonic != "b" {
        return Ok(None);
    }
    let target = require_imm(operands.first().ok_or_else(|| missing_operand(pos))?, pos)?;
    if target % 2 != 0 || !(-2048..=2046).contains(&target) {
        return Err(AsmError::Encoding {
            pos: pos.clone(),
            message: format!("branch offset #{target} out of range"),
        });
    }
    let field = (target / 2) as i16 as u16 & 0x7FF;
    Ok(Some((0b11100 << 11) | field))
}

/// Format 19: long branch with link - emitted as a pair of 16-bit halves by
/// the caller; this returns the first half (high bits) only. The driver is
/// responsible for emitting the matching low-bits half immediately after.
pub fn encode_bl_high(target: i64, pos: &SourcePos) -> Result<u16, AsmError> {
    if target % 2 != 0 || !(-4_194_304..=4_194_302).contains(&target) {
        return Err(AsmError::Encoding {
            pos: pos.clone(),
            message: format!("bl target offset #{target} exceeds the ±4MiB Thumb range"),
        });
    }
    let off = (target / 2) as i32;
    Ok((0b11110 << 11) as u16 | ((off >> 11) as u16 & 0x7FF))
}

pub fn encode_bl_low(target: i64) -> u16 {
    let off = (target / 2) as i32;
    (0b11111 << 11) as u16 | (off as u16 & 0x7FF)
}

fn encode_swi(mnemonic: &str, operands: &[Operand], pos: &SourcePos) -> Result<Option<u16>, AsmError> {
    if mnemonic != "swi" && mnemonic != "svc" {
        return Ok(None);
    }
    let v = require_imm(operands.first().ok_or_else(|| missing_operand(pos))?, pos)?;
    if !(0..=255).contains(&v) {
        return Err(AsmError::Encoding {
            pos: pos.clone(),
            message: format!("swi comment #{v} exceeds 8 bits in Thumb"),
        });
    }
    Ok(Some((0b11011111 << 8) | v as u16))
}

/// Tries each Thumb encoding rule in declaration order (§4.3).
pub fn encode(mnemonic: &str, operands: &[Operand], pos: &SourcePos) -> Result<u16, AsmError> {
    let rules: [fn(&str, &[Operand], &SourcePos) -> Result<Option<u16>, AsmError>; 18] = [
        encode_shifted_move,
        encode_add_sub,
        encode_imm8,
        encode_alu,
        encode_hi_reg,
        encode_pc_relative_load,
        encode_reg_offset_transfer,
        encode_imm_offset_transfer,
        encode_halfword_imm,
        encode_sp_relative,
        encode_load_address,
        encode_add_sp,
        encode_push_pop,
        encode_multiple_transfer,
        encode_conditional_branch,
        encode_unconditional_branch,
        encode_swi,
        |_, _, _| Ok(None),
    ];
    for rule in rules {
        if let Some(word) = rule(mnemonic, operands, pos)? {
            return Ok(word);
        }
    }
    Err(AsmError::Encoding {
        pos: pos.clone(),
        message: format!("`{mnemonic}` is not a recognised Thumb mnemonic for this operand shape"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mov_immediate_format3() {
        let word = encode("mov", &[Operand::Reg(0), Operand::Imm(5)], &SourcePos::synthetic()).unwrap();
        assert_eq!(word, 0b00100_000_00000101);
    }

    #[test]
    fn add_three_low_registers() {
        let word = encode("add", &[Operand::Reg(0), Operand::Reg(1), Operand::Reg(2)], &SourcePos::synthetic()).unwrap();
        assert_eq!(word >> 11, 0b00011_0);
    }

    #[test]
    fn push_sets_special_bit_for_lr() {
        let word = encode("push", &[Operand::RegList((1 << LR) | 0b1)], &SourcePos::synthetic()).unwrap();
        assert_eq!((word >> 8) & 1, 1);
    }

    #[test]
    fn conditional_branch_out_of_range_is_rejected() {
        let err = encode("beq", &[Operand::Imm(1000)], &SourcePos::synthetic());
        assert!(err.is_err());
    }

    #[test]
    fn unconditional_branch_encodes_offset() {
        let word = encode("b", &[Operand::Imm(-10)], &SourcePos::synthetic()).unwrap();
        assert_eq!(word & 0x7FF, ((-10i16 / 2) as u16) & 0x7FF);
    }
}
