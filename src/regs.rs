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

//! C8: register-name rebinding. `.regs` binds visible identifiers to the 16
//! ARM/Thumb register indices (§4.8). Indices 12-15 always keep their
//! canonical names `ip/sp/lr/pc`; only 0-11 may be renamed.

use crate::errors::AsmError;
use crate::pos::SourcePos;

pub const CANONICAL_NAMES: [&str; 16] = [
    "r0", "r1", "r2", "r3", "r4", "r5", "r6", "r7", "r8", "r9", "r10", "r11", "ip", "sp", "lr",
    "pc",
];

/// One parsed `.regs` argument: either a bare name (one register) or a
/// `from-to` range (a run of registers, the run's length determined by
/// stepping the trailing alphanumeric run of `from` towards `to`).
#[derive(Debug, Clone)]
pub enum RegsArg {
    Single(String),
    Range(String, String),
}

/// The (name, absolute register index) pairs produced by one `.regs`
/// directive, in declaration order, ready to be `declare`d into the current
/// scope as `Entry::Register`.
pub fn expand_regs_args(args: &[RegsArg], start_index: u8, pos: &SourcePos) -> Result<Vec<(String, u8)>, AsmError> {
    let mut out = Vec::new();
    let mut idx = start_index as i32;

    for arg in args {
        match arg {
            RegsArg::Single(name) => {
                check_index(idx, pos)?;
                out.push((name.clone(), idx as u8));
                idx += 1;
            }
            RegsArg::Range(from, to) => {
                let names = succ_chain(from, to, pos)?;
                // §4.8: ascending or descending is decided by the lexical
                // order of the two endpoints as written.
                let ascending = from.as_str() <= to.as_str();
                let len = names.len() as i32;
                for (i, name) in names.into_iter().enumerate() {
                    let reg_idx = if ascending { idx + i as i32 } else { idx - i as i32 };
                    check_index(reg_idx, pos)?;
                    out.push((name, reg_idx as u8));
                }
                // "each segment contributes its length to the next index"
                idx += len;
            }
        }
    }

    Ok(out)
}

fn check_index(idx: i32, pos: &SourcePos) -> Result<(), AsmError> {
    if !(0..12).contains(&idx) {
        return Err(AsmError::Parse {
            pos: pos.clone(),
            message: format!(
                "register index {idx} is out of the rebindable range (0-11); r12-r15 keep their canonical names"
            ),
        });
    }
    Ok(())
}

/// Generates the inclusive chain of names obtained by stepping the trailing
/// alphanumeric run of `from` one unit at a time until `to` is reached.
/// Bounded to 64 entries so a typo can't hang the assembler.
fn succ_chain(from: &str, to: &str, pos: &SourcePos) -> Result<Vec<String>, AsmError> {
    if from == to {
        return Ok(vec![from.to_string()]);
    }

    let (prefix, from_num, width) = split_trailing_digits(from);
    let (to_prefix, to_num, _) = split_trailing_digits(to);
    if prefix == to_prefix && from_num.is_some() && to_num.is_some() {
        let a = from_num.unwrap();
        let b = to_num.unwrap();
        let step: i64 = if a <= b { 1 } else { -1 };
        let mut out = Vec::new();
        let mut n = a;
        loop {
            out.push(format!("{prefix}{n:0width$}", width = width));
            if n == b || out.len() > 64 {
                break;
            }
            n += step;
        }
        return Ok(out);
    }

    // Fall back to stepping the last character's code point directly (the
    // `a-c` => a,b,c case from §4.8).
    let mut from_chars: Vec<char> = from.chars().collect();
    let to_last = to.chars().last().ok_or_else(|| AsmError::Parse {
        pos: pos.clone(),
        message: "empty register range endpoint".into(),
    })?;
    let Some(last) = from_chars.last().copied() else {
        return Err(AsmError::Parse {
            pos: pos.clone(),
            message: "empty register range endpoint".into(),
        });
    };
    let step: i32 = if last <= to_last { 1 } else { -1 };
    let mut out = Vec::new();
    let mut c = last as i32;
    loop {
        *from_chars.last_mut().unwrap() = char::from_u32(c as u32).unwrap_or(last);
        out.push(from_chars.iter().collect());
        if c == to_last as i32 || out.len() > 64 {
            break;
        }
        c += step;
    }
    Ok(out)
}

fn split_trailing_digits(s: &str) -> (String, Option<i64>, usize) {
    let digit_start = s
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i);
    match digit_start {
        Some(i) => {
            let prefix = s[..i].to_string();
            let digits = &s[i..];
            (prefix, digits.parse::<i64>().ok(), digits.len())
        }
        None => (s.to_string(), None, 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_character_range_expands_alphabetically() {
        let names = succ_chain("a", "c", &SourcePos::synthetic()).unwrap();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn numeric_suffix_range_preserves_width() {
        let names = succ_chain("r0", "r3", &SourcePos::synthetic()).unwrap();
        assert_eq!(names, vec!["r0", "r1", "r2", "r3"]);
    }

    #[test]
    fn expand_assigns_ascending_indices() {
        let args = vec![RegsArg::Range("a".into(), "c".into())];
        let out = expand_regs_args(&args, 0, &SourcePos::synthetic()).unwrap();
        assert_eq!(
            out,
            vec![("a".to_string(), 0), ("b".to_string(), 1), ("c".to_string(), 2)]
        );
    }

    #[test]
    fn expand_rejects_reserved_indices() {
        let args = vec![RegsArg::Single("too_many".into())];
        let err = expand_regs_args(&args, 12, &SourcePos::synthetic());
        assert!(err.is_err());
    }

    #[test]
    fn segment_length_advances_following_segment() {
        let args = vec![
            RegsArg::Range("a".into(), "c".into()),
            RegsArg::Single("d".into()),
        ];
        let out = expand_regs_args(&args, 0, &SourcePos::synthetic()).unwrap();
        assert_eq!(out.last().unwrap(), &("d".to_string(), 3));
    }
}
