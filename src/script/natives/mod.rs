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

//! Namespaced native functions callable from script (`image.*`, `audio.*`,
//! `json.*`, `struct.*`, `pickle.*`, `str.*`, `num.*`, `int.*`, `list.*`).
//! These are pure functions over `Value`s; they have no access to the
//! assembler driver (that bridge is `put`/`export`/`lookup`, handled in
//! `interp.rs` directly).

mod audio;
mod image_native;
mod json_native;
mod pickle;
mod structpack;

use super::value::Value;
use crate::errors::AsmError;
use crate::pos::SourcePos;

pub fn dispatch(ns: &str, method: &str, args: &[Value], pos: &SourcePos) -> Result<Value, AsmError> {
    match ns {
        "str" => str_native(method, args, pos),
        "num" => num_native(method, args, pos),
        "int" => int_native(method, args, pos),
        "list" => list_native(method, args, pos),
        "image" => image_native::dispatch(method, args, pos),
        "audio" => audio::dispatch(method, args, pos),
        "json" => json_native::dispatch(method, args, pos),
        "struct" => structpack::dispatch(method, args, pos),
        "pickle" => pickle::dispatch(method, args, pos),
        _ => Err(unknown(ns, method, pos)),
    }
}

fn unknown(ns: &str, method: &str, pos: &SourcePos) -> AsmError {
    AsmError::Script {
        pos: pos.clone(),
        message: format!("no such native `{ns}.{method}`"),
    }
}

fn arg(args: &[Value], i: usize, pos: &SourcePos) -> Result<&Value, AsmError> {
    args.get(i).ok_or_else(|| AsmError::Script {
        pos: pos.clone(),
        message: format!("missing argument {}", i + 1),
    })
}

fn arg_num(args: &[Value], i: usize, pos: &SourcePos) -> Result<f64, AsmError> {
    arg(args, i, pos)?.as_num().ok_or_else(|| AsmError::Script {
        pos: pos.clone(),
        message: format!("argument {} must be a number", i + 1),
    })
}

fn arg_bytes<'a>(args: &'a [Value], i: usize, pos: &SourcePos) -> Result<&'a [u8], AsmError> {
    match arg(args, i, pos)? {
        Value::Str(s) => Ok(s),
        _ => Err(AsmError::Script {
            pos: pos.clone(),
            message: format!("argument {} must be a string", i + 1),
        }),
    }
}

fn str_native(method: &str, args: &[Value], pos: &SourcePos) -> Result<Value, AsmError> {
    match method {
        "len" => Ok(Value::Num(arg_bytes(args, 0, pos)?.len() as f64)),
        "byte" => {
            let s = arg_bytes(args, 0, pos)?;
            let i = arg_num(args, 1, pos)? as usize;
            let b = s.get(i).ok_or_else(|| AsmError::Script {
                pos: pos.clone(),
                message: "str.byte index out of range".into(),
            })?;
            Ok(Value::Num(*b as f64))
        }
        "sub" => {
            let s = arg_bytes(args, 0, pos)?;
            let start = arg_num(args, 1, pos)? as usize;
            let end = if args.len() > 2 {
                arg_num(args, 2, pos)? as usize
            } else {
                s.len()
            };
            let end = end.min(s.len());
            let start = start.min(end);
            Ok(Value::str(s[start..end].to_vec()))
        }
        "cat" => {
            let mut out = Vec::new();
            for a in args {
                match a {
                    Value::Str(s) => out.extend_from_slice(s),
                    other => out.extend_from_slice(other.display().as_bytes()),
                }
            }
            Ok(Value::str(out))
        }
        _ => Err(unknown("str", method, pos)),
    }
}

fn num_native(method: &str, args: &[Value], pos: &SourcePos) -> Result<Value, AsmError> {
    let n = arg_num(args, 0, pos)?;
    match method {
        "floor" => Ok(Value::Num(n.floor())),
        "ceil" => Ok(Value::Num(n.ceil())),
        "round" => Ok(Value::Num(round_half_to_even(n))),
        "abs" => Ok(Value::Num(n.abs())),
        _ => Err(unknown("num", method, pos)),
    }
}

fn round_half_to_even(n: f64) -> f64 {
    let floor = n.floor();
    let diff = n - floor;
    if diff < 0.5 {
        floor
    } else if diff > 0.5 {
        floor + 1.0
    } else if (floor as i64) % 2 == 0 {
        floor
    } else {
        floor + 1.0
    }
}

fn int_native(method: &str, args: &[Value], pos: &SourcePos) -> Result<Value, AsmError> {
    match method {
        "isInt" => {
            let n = arg_num(args, 0, pos)?;
            Ok(Value::Num((n.fract() == 0.0 && n.is_finite()) as u8 as f64))
        }
        "bits" => {
            let n = arg_num(args, 0, pos)? as i64;
            let bits = if n == 0 { 1 } else { (64 - n.unsigned_abs().leading_zeros() + 1) as i64 };
            Ok(Value::Num(bits as f64))
        }
        // `int.range(n)` / `int.range(from, to)`: the list `for var v: ...
        // end` iterates over to drive a fixed repeat count (§8's `for: range
        // 5` scenario). Not in the native-op list of §4.9, added because
        // that scenario has no other way to produce an iterable of a given
        // length.
        "range" => {
            let (start, end) = if args.len() > 1 {
                (arg_num(args, 0, pos)? as i64, arg_num(args, 1, pos)? as i64)
            } else {
                (0, arg_num(args, 0, pos)? as i64)
            };
            Ok(Value::list((start..end).map(|n| Value::Num(n as f64)).collect()))
        }
        _ => Err(unknown("int", method, pos)),
    }
}

fn list_native(method: &str, args: &[Value], pos: &SourcePos) -> Result<Value, AsmError> {
    let list = match arg(args, 0, pos)? {
        Value::List(l) => l.clone(),
        other => {
            return Err(AsmError::Script {
                pos: pos.clone(),
                message: format!("expected a list, found a {}", other.type_name()),
            })
        }
    };
    match method {
        "len" => Ok(Value::Num(list.borrow().len() as f64)),
        "push" => {
            let v = arg(args, 1, pos)?.clone();
            list.borrow_mut().push(v);
            Ok(Value::Nil)
        }
        "pop" => Ok(list.borrow_mut().pop().unwrap_or(Value::Nil)),
        _ => Err(unknown("list", method, pos)),
    }
}

/// The `printf fmt, args...` native's formatting: `%d`/`%x`/`%s`/`%f` substitution
/// against a format string, matching the assembly-level `.printf` directive.
pub fn format_printf(args: &[Value], pos: &SourcePos) -> Result<String, AsmError> {
    let fmt = match args.first() {
        Some(Value::Str(s)) => String::from_utf8_lossy(s).into_owned(),
        Some(other) => other.display(),
        None => String::new(),
    };
    let mut out = String::new();
    let mut rest = args.get(1..).unwrap_or(&[]).iter();
    let mut chars = fmt.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('d') => {
                let v = rest.next().and_then(|v| v.as_num()).ok_or_else(|| AsmError::Script {
                    pos: pos.clone(),
                    message: "printf: not enough arguments for %d".into(),
                })?;
                out.push_str(&format!("{}", v as i64));
            }
            Some('x') => {
                let v = rest.next().and_then(|v| v.as_num()).ok_or_else(|| AsmError::Script {
                    pos: pos.clone(),
                    message: "printf: not enough arguments for %x".into(),
                })?;
                out.push_str(&format!("{:x}", v as i64));
            }
            Some('s') => {
                let v = rest.next().ok_or_else(|| AsmError::Script {
                    pos: pos.clone(),
                    message: "printf: not enough arguments for %s".into(),
                })?;
                out.push_str(&v.display());
            }
            Some('f') => {
                let v = rest.next().and_then(|v| v.as_num()).ok_or_else(|| AsmError::Script {
                    pos: pos.clone(),
                    message: "printf: not enough arguments for %f".into(),
                })?;
                out.push_str(&format!("{v}"));
            }
            Some('%') => out.push('%'),
            Some(other) => {
                out.push('%');
                out.push(other);
            }
            None => out.push('%'),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_half_to_even_ties() {
        assert_eq!(round_half_to_even(0.5), 0.0);
        assert_eq!(round_half_to_even(1.5), 2.0);
        assert_eq!(round_half_to_even(2.5), 2.0);
    }

    #[test]
    fn printf_substitutes_d_and_s() {
        let pos = SourcePos::synthetic();
        let args = vec![Value::str("x=%d y=%s"), Value::Num(3.0), Value::str("hi")];
        assert_eq!(format_printf(&args, &pos).unwrap(), "x=3 y=hi");
    }
}
