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

//! `pickle.{json,bin,val,valid,copy,circular,sibling}` — serialize and
//! deserialize arbitrary script values.
//!
//! `bin` supports cyclic lists with three tag bytes: `0xF8 <id> <count>`
//! opens a list and registers it under `id` before its elements are
//! serialized (so an element may reference the list being built), `0xF9
//! <id>` is a back-reference to an already-opened list, and `0xFA` closes
//! the current list. `json` rejects cycles and non-JSON-representable
//! values (functions, namespaces) outright.

use super::super::value::Value;
use crate::errors::AsmError;
use crate::pos::SourcePos;
use std::collections::HashMap;
use std::rc::Rc;

const TAG_NIL: u8 = 0x00;
const TAG_NUM: u8 = 0x01;
const TAG_STR: u8 = 0x02;
const TAG_LIST_OPEN: u8 = 0xF8;
const TAG_LIST_REF: u8 = 0xF9;
const TAG_LIST_CLOSE: u8 = 0xFA;

pub fn dispatch(method: &str, args: &[Value], pos: &SourcePos) -> Result<Value, AsmError> {
    match method {
        "json" => json(args, pos),
        "bin" => bin(args, pos),
        "val" => val(args, pos),
        "valid" => Ok(Value::Num(val(args, pos).is_ok() as u8 as f64)),
        "copy" => Ok(copy(first(args, pos)?)),
        "circular" => Ok(Value::Num(is_circular(first(args, pos)?) as u8 as f64)),
        "sibling" => sibling(args, pos),
        _ => Err(AsmError::Script {
            pos: pos.clone(),
            message: format!("no such native `pickle.{method}`"),
        }),
    }
}

fn first<'a>(args: &'a [Value], pos: &SourcePos) -> Result<&'a Value, AsmError> {
    args.first().ok_or_else(|| AsmError::Script {
        pos: pos.clone(),
        message: "expected a value argument".into(),
    })
}

fn json(args: &[Value], pos: &SourcePos) -> Result<Value, AsmError> {
    let mut seen = Vec::new();
    let j = to_json(first(args, pos)?, &mut seen, pos)?;
    Ok(Value::str(j.to_string().into_bytes()))
}

fn to_json(v: &Value, seen: &mut Vec<*const ()>, pos: &SourcePos) -> Result<serde_json::Value, AsmError> {
    match v {
        Value::Nil => Ok(serde_json::Value::Null),
        Value::Num(n) => Ok(serde_json::json!(n)),
        Value::Str(s) => Ok(serde_json::Value::String(String::from_utf8_lossy(s).into_owned())),
        Value::List(l) => {
            let ptr = Rc::as_ptr(l) as *const ();
            if seen.contains(&ptr) {
                return Err(AsmError::Script {
                    pos: pos.clone(),
                    message: "pickle.json cannot serialize a cyclic value".into(),
                });
            }
            seen.push(ptr);
            let items = l.borrow();
            let out: Result<Vec<_>, _> = items.iter().map(|v| to_json(v, seen, pos)).collect();
            seen.pop();
            Ok(serde_json::Value::Array(out?))
        }
        Value::Func(_) | Value::Namespace(_) => Err(AsmError::Script {
            pos: pos.clone(),
            message: format!("pickle.json cannot serialize a {}", v.type_name()),
        }),
    }
}

fn bin(args: &[Value], pos: &SourcePos) -> Result<Value, AsmError> {
    let mut out = Vec::new();
    let mut ids: HashMap<*const (), u32> = HashMap::new();
    encode_bin(first(args, pos)?, &mut out, &mut ids, pos)?;
    Ok(Value::str(out))
}

fn encode_bin(v: &Value, out: &mut Vec<u8>, ids: &mut HashMap<*const (), u32>, pos: &SourcePos) -> Result<(), AsmError> {
    match v {
        Value::Nil => out.push(TAG_NIL),
        Value::Num(n) => {
            out.push(TAG_NUM);
            out.extend_from_slice(&n.to_le_bytes());
        }
        Value::Str(s) => {
            out.push(TAG_STR);
            out.extend_from_slice(&(s.len() as u32).to_le_bytes());
            out.extend_from_slice(s);
        }
        Value::List(l) => {
            let ptr = Rc::as_ptr(l) as *const ();
            if let Some(id) = ids.get(&ptr) {
                out.push(TAG_LIST_REF);
                out.extend_from_slice(&id.to_le_bytes());
                return Ok(());
            }
            let id = ids.len() as u32;
            ids.insert(ptr, id);
            let items = l.borrow();
            out.push(TAG_LIST_OPEN);
            out.extend_from_slice(&id.to_le_bytes());
            out.extend_from_slice(&(items.len() as u32).to_le_bytes());
            for item in items.iter() {
                encode_bin(item, out, ids, pos)?;
            }
            out.push(TAG_LIST_CLOSE);
        }
        Value::Func(_) | Value::Namespace(_) => {
            return Err(AsmError::Script {
                pos: pos.clone(),
                message: format!("pickle.bin cannot serialize a {}", v.type_name()),
            })
        }
    }
    Ok(())
}

fn val(args: &[Value], pos: &SourcePos) -> Result<Value, AsmError> {
    let bytes = match first(args, pos)? {
        Value::Str(s) => s.clone(),
        other => {
            return Err(AsmError::Script {
                pos: pos.clone(),
                message: format!("pickle.val expects a byte string, found a {}", other.type_name()),
            })
        }
    };
    let mut cursor = 0usize;
    let mut refs: HashMap<u32, super::super::value::ListRef> = HashMap::new();
    let v = decode_bin(&bytes, &mut cursor, &mut refs, pos)?;
    Ok(v)
}

fn take<'a>(bytes: &'a [u8], cursor: &mut usize, n: usize, pos: &SourcePos) -> Result<&'a [u8], AsmError> {
    let slice = bytes.get(*cursor..*cursor + n).ok_or_else(|| AsmError::Script {
        pos: pos.clone(),
        message: "pickle.val: truncated data".into(),
    })?;
    *cursor += n;
    Ok(slice)
}

fn decode_bin(
    bytes: &[u8],
    cursor: &mut usize,
    refs: &mut HashMap<u32, super::super::value::ListRef>,
    pos: &SourcePos,
) -> Result<Value, AsmError> {
    let tag = *take(bytes, cursor, 1, pos)?.first().unwrap();
    match tag {
        TAG_NIL => Ok(Value::Nil),
        TAG_NUM => {
            let raw = take(bytes, cursor, 8, pos)?;
            Ok(Value::Num(f64::from_le_bytes(raw.try_into().unwrap())))
        }
        TAG_STR => {
            let len = u32::from_le_bytes(take(bytes, cursor, 4, pos)?.try_into().unwrap()) as usize;
            Ok(Value::str(take(bytes, cursor, len, pos)?.to_vec()))
        }
        TAG_LIST_REF => {
            let id = u32::from_le_bytes(take(bytes, cursor, 4, pos)?.try_into().unwrap());
            let l = refs.get(&id).ok_or_else(|| AsmError::Script {
                pos: pos.clone(),
                message: "pickle.val: dangling list reference".into(),
            })?;
            Ok(Value::List(l.clone()))
        }
        TAG_LIST_OPEN => {
            let id = u32::from_le_bytes(take(bytes, cursor, 4, pos)?.try_into().unwrap());
            let count = u32::from_le_bytes(take(bytes, cursor, 4, pos)?.try_into().unwrap());
            let list_ref: super::super::value::ListRef = Rc::new(std::cell::RefCell::new(Vec::new()));
            refs.insert(id, list_ref.clone());
            let mut items = Vec::with_capacity(count as usize);
            for _ in 0..count {
                items.push(decode_bin(bytes, cursor, refs, pos)?);
            }
            *list_ref.borrow_mut() = items;
            let close = *take(bytes, cursor, 1, pos)?.first().unwrap();
            if close != TAG_LIST_CLOSE {
                return Err(AsmError::Script {
                    pos: pos.clone(),
                    message: "pickle.val: malformed list framing".into(),
                });
            }
            Ok(Value::List(list_ref))
        }
        other => Err(AsmError::Script {
            pos: pos.clone(),
            message: format!("pickle.val: unknown tag byte 0x{other:02x}"),
        }),
    }
}

fn copy(v: &Value) -> Value {
    let mut seen: HashMap<*const (), super::super::value::ListRef> = HashMap::new();
    copy_inner(v, &mut seen)
}

fn copy_inner(v: &Value, seen: &mut HashMap<*const (), super::super::value::ListRef>) -> Value {
    match v {
        Value::List(l) => {
            let ptr = Rc::as_ptr(l) as *const ();
            if let Some(existing) = seen.get(&ptr) {
                return Value::List(existing.clone());
            }
            let new_list: super::super::value::ListRef = Rc::new(std::cell::RefCell::new(Vec::new()));
            seen.insert(ptr, new_list.clone());
            let copied: Vec<Value> = l.borrow().iter().map(|item| copy_inner(item, seen)).collect();
            *new_list.borrow_mut() = copied;
            Value::List(new_list)
        }
        other => other.clone(),
    }
}

fn is_circular(v: &Value) -> bool {
    let mut path = Vec::new();
    circular_inner(v, &mut path)
}

fn circular_inner(v: &Value, path: &mut Vec<*const ()>) -> bool {
    match v {
        Value::List(l) => {
            let ptr = Rc::as_ptr(l) as *const ();
            if path.contains(&ptr) {
                return true;
            }
            path.push(ptr);
            let found = l.borrow().iter().any(|item| circular_inner(item, path));
            path.pop();
            found
        }
        _ => false,
    }
}

fn sibling(args: &[Value], pos: &SourcePos) -> Result<Value, AsmError> {
    let a = first(args, pos)?;
    let b = args.get(1).ok_or_else(|| AsmError::Script {
        pos: pos.clone(),
        message: "pickle.sibling expects two values".into(),
    })?;
    let same = match (a, b) {
        (Value::List(x), Value::List(y)) => Rc::ptr_eq(x, y),
        _ => false,
    };
    Ok(Value::Num(same as u8 as f64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bin_round_trips_plain_list() {
        let pos = SourcePos::synthetic();
        let v = Value::list(vec![Value::Num(1.0), Value::str("hi"), Value::Nil]);
        let packed = bin(&[v], &pos).unwrap();
        let back = val(&[packed], &pos).unwrap();
        assert_eq!(back.display(), "[1, hi, nil]");
    }

    #[test]
    fn bin_round_trips_cycle() {
        let pos = SourcePos::synthetic();
        let l = Value::list(vec![Value::Num(1.0)]);
        if let Value::List(inner) = &l {
            inner.borrow_mut().push(l.clone());
        }
        assert!(is_circular(&l));
        let packed = bin(&[l], &pos).unwrap();
        let back = val(&[packed], &pos).unwrap();
        assert!(is_circular(&back));
    }

    #[test]
    fn json_rejects_cycles() {
        let pos = SourcePos::synthetic();
        let l = Value::list(vec![Value::Num(1.0)]);
        if let Value::List(inner) = &l {
            inner.borrow_mut().push(l.clone());
        }
        assert!(json(&[l], &pos).is_err());
    }
}
