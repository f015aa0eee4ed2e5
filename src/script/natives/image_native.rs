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

//! `image.load bytes` — decode a PNG byte vector into a list-of-rows of
//! RGBA-tuple lists, the shape scripts use to build tile and palette data.

use super::super::value::Value;
use crate::errors::AsmError;
use crate::pos::SourcePos;
use image::{GenericImageView, ImageFormat};

pub fn dispatch(method: &str, args: &[Value], pos: &SourcePos) -> Result<Value, AsmError> {
    match method {
        "load" => load(args, pos),
        _ => Err(AsmError::Script {
            pos: pos.clone(),
            message: format!("no such native `image.{method}`"),
        }),
    }
}

fn load(args: &[Value], pos: &SourcePos) -> Result<Value, AsmError> {
    let bytes = match args.first() {
        Some(Value::Str(s)) => s.as_slice(),
        _ => {
            return Err(AsmError::Script {
                pos: pos.clone(),
                message: "image.load expects a byte string".into(),
            })
        }
    };
    let img = image::load_from_memory_with_format(bytes, ImageFormat::Png).map_err(|e| AsmError::Script {
        pos: pos.clone(),
        message: format!("unsupported image: {e}"),
    })?;
    if img.color().has_color() && !img.color().has_alpha() {
        return Err(AsmError::Script {
            pos: pos.clone(),
            message: "unsupported image: expected RGBA8".into(),
        });
    }
    let (w, h) = img.dimensions();
    let rgba = img.to_rgba8();
    let mut rows = Vec::with_capacity(h as usize);
    for y in 0..h {
        let mut row = Vec::with_capacity(w as usize);
        for x in 0..w {
            let p = rgba.get_pixel(x, y);
            row.push(Value::list(vec![
                Value::Num(p[0] as f64),
                Value::Num(p[1] as f64),
                Value::Num(p[2] as f64),
                Value::Num(p[3] as f64),
            ]));
        }
        rows.push(Value::list(row));
    }
    Ok(Value::list(rows))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_png_bytes() {
        let pos = SourcePos::synthetic();
        let args = vec![Value::str(vec![0u8, 1, 2, 3])];
        assert!(load(&args, &pos).is_err());
    }
}
