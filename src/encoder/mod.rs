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

//! C3: the instruction encoder. Two parallel tables, ARM (32-bit) and Thumb
//! (16-bit), selected by the driver's current mode (§4.3, §4.4).

pub mod arm;
pub mod operand;
pub mod thumb;

use crate::errors::AsmError;
use crate::pos::SourcePos;
use operand::Operand;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Arm,
    Thumb,
}

/// One fully-decoded instruction statement, ready for encoding: the mnemonic
/// has already been split from its condition suffix and `s`/`.s` flag.
pub struct InstrStatement {
    pub mnemonic: String,
    pub cond: arm::Cond,
    pub set_flags: bool,
    pub operands: Vec<Operand>,
}

/// Splits `moveq`/`mov.eq`/`movs`/`adds` etc. into (base mnemonic, condition,
/// set_flags). The dotted form (`mov.eq`) and the suffixed form (`moveq`)
/// are equivalent (§4.3).
pub fn split_mnemonic(raw: &str) -> (String, Option<arm::Cond>, bool) {
    if let Some((base, suffix)) = raw.split_once('.') {
        if let Some(cond) = arm::Cond::parse(suffix) {
            return (base.to_string(), Some(cond), false);
        }
    }

    // Try progressively shorter trailing substrings for an `s` flag then a
    // two-letter condition code, longest match first so `cmp` isn't
    // mis-split as `cm` + `p`-as-condition (which doesn't parse anyway, but
    // keeps the search honest for mnemonics like `adcs`).
    for (cond_len, has_s) in [(2, true), (2, false), (0, true)] {
        if raw.len() <= cond_len + has_s as usize {
            continue;
        }
        let s_trim = if has_s && raw.ends_with('s') {
            &raw[..raw.len() - 1]
        } else if has_s {
            continue;
        } else {
            raw
        };
        if cond_len == 0 {
            return (s_trim.to_string(), None, has_s);
        }
        if s_trim.len() > cond_len {
            let (base, suffix) = s_trim.split_at(s_trim.len() - cond_len);
            if let Some(cond) = arm::Cond::parse(suffix) {
                return (base.to_string(), Some(cond), has_s);
            }
        }
    }

    (raw.to_string(), None, false)
}

/// Encodes one instruction in the given mode, returning its bytes in
/// little-endian emission order (§3: the assembler emits little-endian by
/// default, `.b*` directives flip to big-endian, but instruction words
/// themselves are always little-endian on GBA hardware).
pub fn encode(mode: Mode, stmt: &InstrStatement, pos: &SourcePos) -> Result<Vec<u8>, AsmError> {
    match mode {
        Mode::Arm => {
            let word = arm::encode(&stmt.mnemonic, stmt.cond, stmt.set_flags, &stmt.operands, pos)?;
            Ok(word.to_le_bytes().to_vec())
        }
        Mode::Thumb => {
            let word = thumb::encode(&stmt.mnemonic, &stmt.operands, pos)?;
            Ok(word.to_le_bytes().to_vec())
        }
    }
}

pub fn required_alignment(mode: Mode) -> u32 {
    match mode {
        Mode::Arm => 4,
        Mode::Thumb => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_mnemonic_dotted_condition() {
        let (base, cond, s) = split_mnemonic("mov.eq");
        assert_eq!(base, "mov");
        assert_eq!(cond, Some(arm::Cond::Eq));
        assert!(!s);
    }

    #[test]
    fn split_mnemonic_suffixed_condition() {
        let (base, cond, s) = split_mnemonic("moveq");
        assert_eq!(base, "mov");
        assert_eq!(cond, Some(arm::Cond::Eq));
        assert!(!s);
    }

    #[test]
    fn split_mnemonic_set_flags_suffix() {
        let (base, cond, s) = split_mnemonic("adds");
        assert_eq!(base, "add");
        assert_eq!(cond, None);
        assert!(s);
    }

    #[test]
    fn encode_thumb_instruction_is_two_bytes() {
        let stmt = InstrStatement {
            mnemonic: "mov".into(),
            cond: arm::Cond::Al,
            set_flags: false,
            operands: vec![Operand::Reg(0), Operand::Imm(5)],
        };
        let bytes = encode(Mode::Thumb, &stmt, &SourcePos::synthetic()).unwrap();
        assert_eq!(bytes.len(), 2);
    }
}
