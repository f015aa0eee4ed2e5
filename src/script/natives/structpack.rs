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

//! `struct.str/list/size` — pack/unpack little-endian binary data against a
//! format list of `"i8"`/`"u8"`/`"i16"`/`"u16"`/`"i32"`/`"u32"` tags.

use super::super::value::Value;
use crate::errors::AsmError;
use crate::pos::SourcePos;

pub fn dispatch(method: &str, args: &[Value], pos: &SourcePos) -> Result<Value, AsmError> {
    match method {
        "size" => size(args, pos),
        "list" => unpack(args, pos),
        "str" => pack(args, pos),
        _ => Err(AsmError::Script {
            pos: pos.clone(),
            message: format!("no such native `struct.{method}`"),
        }),
    }
}

fn field_width(tag: &str, pos: &SourcePos) -> Result<(usize, bool), AsmError> {
    match tag {
        "i8" => Ok((1, true)),
        "u8" => Ok((1, false)),
        "i16" => Ok((2, true)),
        "u16" => Ok((2, false)),
        "i32" => Ok((4, true)),
        "u32" => Ok((4, false)),
        other => Err(AsmError::Script {
            pos: pos.clone(),
            message: format!("unknown struct format tag `{other}`"),
        }),
    }
}

fn format_list(args: &[Value], pos: &SourcePos) -> Result<Vec<String>, AsmError> {
    match args.first() {
        Some(Value::List(l)) => l
            .borrow()
            .iter()
            .map(|v| match v {
                Value::Str(s) => Ok(String::from_utf8_lossy(s).into_owned()),
                other => Err(AsmError::Script {
                    pos: pos.clone(),
                    message: format!("format entries must be strings, found a {}", other.type_name()),
                }),
            })
            .collect(),
        _ => Err(AsmError::Script {
            pos: pos.clone(),
            message: "expected a format list".into(),
        }),
    }
}

fn size(args: &[Value], pos: &SourcePos) -> Result<Value, AsmError> {
    let fmt = format_list(args, pos)?;
    let mut total = 0usize;
    for tag in &fmt {
        total += field_width(tag, pos)?.0;
    }
    Ok(Value::Num(total as f64))
}

fn unpack(args: &[Value], pos: &SourcePos) -> Result<Value, AsmError> {
    let fmt = format_list(args, pos)?;
    let bytes = match args.get(1) {
        Some(Value::Str(s)) => s.clone(),
        _ => {
            return Err(AsmError::Script {
                pos: pos.clone(),
                message: "struct.list expects a byte string".into(),
            })
        }
    };
    let mut out = Vec::with_capacity(fmt.len());
    let mut off = 0usize;
    for tag in &fmt {
        let (width, signed) = field_width(tag, pos)?;
        let chunk = bytes.get(off..off + width).ok_or_else(|| AsmError::Script {
            pos: pos.clone(),
            message: "struct.list: not enough bytes for format".into(),
        })?;
        let mut raw: u64 = 0;
        for (i, b) in chunk.iter().enumerate() {
            raw |= (*b as u64) << (8 * i);
        }
        let v = if signed {
            match width {
                1 => raw as u8 as i8 as f64,
                2 => raw as u16 as i16 as f64,
                4 => raw as u32 as i32 as f64,
                _ => unreachable!(),
            }
        } else {
            raw as f64
        };
        out.push(Value::Num(v));
        off += width;
    }
    Ok(Value::list(out))
}

fn pack(args: &[Value], pos: &SourcePos) -> Result<Value, AsmError> {
    let fmt = format_list(args, pos)?;
    let values = match args.get(1) {
        Some(Value::List(l)) => l.borrow().clone(),
        _ => {
            return Err(AsmError::Script {
                pos: pos.clone(),
                message: "struct.str expects a value list".into(),
            })
        }
    };
    if values.len() != fmt.len() {
        return Err(AsmError::Script {
            pos: pos.clone(),
            message: format!("struct.str: format has {} entries, got {} values", fmt.len(), values.len()),
        });
    }
    let mut out = Vec::new();
    for (tag, v) in fmt.iter().zip(values.iter()) {
        let (width, _) = field_width(tag, pos)?;
        let n = v.as_num().ok_or_else(|| AsmError::Script {
            pos: pos.clone(),
            message: "struct.str: value must be a number".into(),
        })? as i64;
        for i in 0..width {
            out.push(((n >> (8 * i)) & 0xFF) as u8);
        }
    }
    Ok(Value::str(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_and_unpacks_round_trip() {
        let pos = SourcePos::synthetic();
        let fmt = Value::list(vec![Value::str("u16"), Value::str("i8")]);
        let vals = Value::list(vec![Value::Num(0x1234 as f64), Value::Num(-5.0)]);
        let packed = pack(&[fmt.clone(), vals], &pos).unwrap();
        let unpacked = unpack(&[fmt, packed], &pos).unwrap();
        if let Value::List(l) = unpacked {
            let l = l.borrow();
            assert_eq!(l[0].as_num(), Some(0x1234 as f64));
            assert_eq!(l[1].as_num(), Some(-5.0));
        } else {
            panic!("expected a list");
        }
    }
}
