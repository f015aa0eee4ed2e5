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

//! Shared operand shapes fed to both the ARM and Thumb encoders (§4.3): the
//! parameter slots an encoding rule matches against.

use crate::errors::AsmError;
use crate::pos::SourcePos;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftOp {
    Lsl,
    Lsr,
    Asr,
    Ror,
    Rrx,
}

impl ShiftOp {
    pub fn bits(self) -> u32 {
        match self {
            ShiftOp::Lsl => 0b00,
            ShiftOp::Lsr => 0b01,
            ShiftOp::Asr => 0b10,
            ShiftOp::Ror | ShiftOp::Rrx => 0b11,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Shift {
    None,
    Immediate(ShiftOp, u32),
    Register(ShiftOp, u8),
}

#[derive(Debug, Clone, Copy)]
pub enum Offset {
    None,
    Imm(i32),
    Reg(bool, u8),
    RegShift(bool, u8, ShiftOp, u32),
}

#[derive(Debug, Clone, Copy)]
pub enum MemOperand {
    /// `[rN]`, `[rN, #imm]`, `[rN, ±rM]`, `[rN, ±rM, shift]` with optional
    /// `!` writeback (pre-indexed).
    Offset { base: u8, offset: Offset, writeback: bool },
    /// `[rN], ±…` (post-indexed: the base is updated, but the transfer uses
    /// the un-offset address).
    PostIndexed { base: u8, offset: Offset },
}

#[derive(Debug, Clone)]
pub enum Operand {
    Reg(u8),
    ShiftedReg(u8, Shift),
    Imm(i64),
    RegList(u16),
    Mem(MemOperand),
    /// `=expr` — only legal as the second operand of `ldr`, resolved by the
    /// literal-pool machinery (§4.6) rather than here.
    LoadLiteral(i64),
}

pub const SP: u8 = 13;
pub const LR: u8 = 14;
pub const PC: u8 = 15;

pub fn require_reg(op: &Operand, pos: &SourcePos) -> Result<u8, AsmError> {
    match op {
        Operand::Reg(r) => Ok(*r),
        _ => Err(AsmError::Encoding {
            pos: pos.clone(),
            message: "expected a register operand".into(),
        }),
    }
}

pub fn require_imm(op: &Operand, pos: &SourcePos) -> Result<i64, AsmError> {
    match op {
        Operand::Imm(v) => Ok(*v),
        _ => Err(AsmError::Encoding {
            pos: pos.clone(),
            message: "expected an immediate operand".into(),
        }),
    }
}

pub fn require_mem(op: &Operand, pos: &SourcePos) -> Result<MemOperand, AsmError> {
    match op {
        Operand::Mem(m) => Ok(*m),
        _ => Err(AsmError::Encoding {
            pos: pos.clone(),
            message: "expected a memory operand `[rN, ...]`".into(),
        }),
    }
}

/// Searches for an 8-bit value rotated right by an even shift (0-30) that
/// reproduces `v` as a 32-bit pattern (§4.3 ARM immediate rule). Returns
/// `(rotate_field, imm8)` where the encoded rotate amount is `rotate_field * 2`.
pub fn encode_rotated_immediate(v: u32) -> Option<(u32, u32)> {
    for rot in 0..16 {
        let shift = rot * 2;
        let rotated = v.rotate_left(shift);
        if rotated <= 0xFF {
            return Some((rot, rotated));
        }
    }
    None
}
