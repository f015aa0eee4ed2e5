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

//! `json.load/type/boolean/number/string/array/object/size/get` — parse JSON
//! text and walk the tree as a tagged script value.
//!
//! The value domain has no dedicated JSON/object type, so a parsed node is
//! represented as a tagged list: `["null"]`, `["bool", 0|1]`, `["number", n]`,
//! `["string", s]`, `["array", v...]`, `["object", [k, v]...]`. `json.type`
//! reads the tag back out; the other accessors unwrap it.

use super::super::value::Value;
use crate::errors::AsmError;
use crate::pos::SourcePos;
use serde_json::Value as Json;

pub fn dispatch(method: &str, args: &[Value], pos: &SourcePos) -> Result<Value, AsmError> {
    match method {
        "load" => load(args, pos),
        "type" => Ok(Value::str(tag_of(args, pos)?)),
        "boolean" => unwrap_tagged(args, pos, "bool"),
        "number" => unwrap_tagged(args, pos, "number"),
        "string" => unwrap_tagged(args, pos, "string"),
        "array" => unwrap_tagged(args, pos, "array"),
        "object" => unwrap_tagged(args, pos, "object"),
        "size" => size(args, pos),
        "get" => get(args, pos),
        _ => Err(AsmError::Script {
            pos: pos.clone(),
            message: format!("no such native `json.{method}`"),
        }),
    }
}

fn load(args: &[Value], pos: &SourcePos) -> Result<Value, AsmError> {
    let bytes = match args.first() {
        Some(Value::Str(s)) => s.as_slice(),
        _ => {
            return Err(AsmError::Script {
                pos: pos.clone(),
                message: "json.load expects a string".into(),
            })
        }
    };
    let parsed: Json = serde_json::from_slice(bytes).map_err(|e| AsmError::Script {
        pos: pos.clone(),
        message: format!("invalid JSON: {e}"),
    })?;
    Ok(from_json(&parsed))
}

fn from_json(v: &Json) -> Value {
    match v {
        Json::Null => Value::list(vec![Value::str("null")]),
        Json::Bool(b) => Value::list(vec![Value::str("bool"), Value::Num(*b as u8 as f64)]),
        Json::Number(n) => Value::list(vec![Value::str("number"), Value::Num(n.as_f64().unwrap_or(f64::NAN))]),
        Json::String(s) => Value::list(vec![Value::str("string"), Value::str(s.as_bytes().to_vec())]),
        Json::Array(items) => {
            let mut tagged = vec![Value::str("array")];
            tagged.extend(items.iter().map(from_json));
            Value::list(tagged)
        }
        Json::Object(map) => {
            let mut tagged = vec![Value::str("object")];
            for (k, v) in map {
                tagged.push(Value::list(vec![Value::str(k.as_bytes().to_vec()), from_json(v)]));
            }
            Value::list(tagged)
        }
    }
}

fn as_tagged<'a>(args: &'a [Value], pos: &SourcePos) -> Result<(&'a str, Vec<Value>), AsmError> {
    match args.first() {
        Some(Value::List(l)) => {
            let items = l.borrow();
            let tag = match items.first() {
                Some(Value::Str(s)) => std::str::from_utf8(s).unwrap_or(""),
                _ => {
                    return Err(AsmError::Script {
                        pos: pos.clone(),
                        message: "not a json value".into(),
                    })
                }
            };
            Ok((leak_tag(tag), items[1..].to_vec()))
        }
        _ => Err(AsmError::Script {
            pos: pos.clone(),
            message: "not a json value".into(),
        }),
    }
}

fn leak_tag(tag: &str) -> &'static str {
    match tag {
        "null" => "null",
        "bool" => "bool",
        "number" => "number",
        "string" => "string",
        "array" => "array",
        "object" => "object",
        _ => "null",
    }
}

fn tag_of(args: &[Value], pos: &SourcePos) -> Result<&'static str, AsmError> {
    Ok(as_tagged(args, pos)?.0)
}

fn unwrap_tagged(args: &[Value], pos: &SourcePos, expect: &str) -> Result<Value, AsmError> {
    let (tag, rest) = as_tagged(args, pos)?;
    if tag != expect {
        return Err(AsmError::Script {
            pos: pos.clone(),
            message: format!("expected a json {expect}, found {tag}"),
        });
    }
    match expect {
        "bool" | "number" | "string" => Ok(rest.first().cloned().unwrap_or(Value::Nil)),
        "array" => Ok(Value::list(rest)),
        "object" => Ok(Value::list(rest)),
        _ => Ok(Value::Nil),
    }
}

fn size(args: &[Value], pos: &SourcePos) -> Result<Value, AsmError> {
    let (tag, rest) = as_tagged(args, pos)?;
    match tag {
        "array" | "object" => Ok(Value::Num(rest.len() as f64)),
        _ => Err(AsmError::Script {
            pos: pos.clone(),
            message: format!("json.size expects an array or object, found {tag}"),
        }),
    }
}

fn get(args: &[Value], pos: &SourcePos) -> Result<Value, AsmError> {
    let (tag, rest) = as_tagged(args, pos)?;
    match tag {
        "array" => {
            let idx = args.get(1).and_then(|v| v.as_num()).ok_or_else(|| AsmError::Script {
                pos: pos.clone(),
                message: "json.get on an array requires a numeric index".into(),
            })? as usize;
            rest.get(idx).cloned().ok_or_else(|| AsmError::Script {
                pos: pos.clone(),
                message: "json.get index out of range".into(),
            })
        }
        "object" => {
            let key = match args.get(1) {
                Some(Value::Str(s)) => s.clone(),
                _ => {
                    return Err(AsmError::Script {
                        pos: pos.clone(),
                        message: "json.get on an object requires a string key".into(),
                    })
                }
            };
            for entry in &rest {
                if let Value::List(pair) = entry {
                    let pair = pair.borrow();
                    if let Some(Value::Str(k)) = pair.first() {
                        if **k == *key {
                            return Ok(pair.get(1).cloned().unwrap_or(Value::Nil));
                        }
                    }
                }
            }
            Err(AsmError::Script {
                pos: pos.clone(),
                message: "json.get: no such key".into(),
            })
        }
        _ => Err(AsmError::Script {
            pos: pos.clone(),
            message: format!("json.get expects an array or object, found {tag}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_object_and_array() {
        let pos = SourcePos::synthetic();
        let loaded = load(&[Value::str(r#"{"a": [1, 2, true]}"#)], &pos).unwrap();
        assert_eq!(tag_of(&[loaded.clone()], &pos).unwrap(), "object");
        let a = get(&[loaded, Value::str("a")], &pos).unwrap();
        assert_eq!(tag_of(&[a.clone()], &pos).unwrap(), "array");
        assert_eq!(size(&[a], &pos).unwrap().as_num(), Some(3.0));
    }
}
