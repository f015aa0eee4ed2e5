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

//! `audio.load bytes` — decode a WAV byte vector to `{rate, data}`, where
//! `data` is a list of per-channel sample lists normalized to `[-1, 1]`.

use super::super::value::Value;
use crate::errors::AsmError;
use crate::pos::SourcePos;
use std::io::Cursor;

pub fn dispatch(method: &str, args: &[Value], pos: &SourcePos) -> Result<Value, AsmError> {
    match method {
        "load" => load(args, pos),
        _ => Err(AsmError::Script {
            pos: pos.clone(),
            message: format!("no such native `audio.{method}`"),
        }),
    }
}

fn load(args: &[Value], pos: &SourcePos) -> Result<Value, AsmError> {
    let bytes = match args.first() {
        Some(Value::Str(s)) => s.as_slice(),
        _ => {
            return Err(AsmError::Script {
                pos: pos.clone(),
                message: "audio.load expects a byte string".into(),
            })
        }
    };
    let mut reader = hound::WavReader::new(Cursor::new(bytes)).map_err(|e| AsmError::Script {
        pos: pos.clone(),
        message: format!("unsupported audio: {e}"),
    })?;
    let spec = reader.spec();
    let channels = spec.channels as usize;
    let mut data: Vec<Vec<Value>> = vec![Vec::new(); channels.max(1)];

    match spec.sample_format {
        hound::SampleFormat::Float => {
            for (i, s) in reader.samples::<f32>().enumerate() {
                let s = s.map_err(|e| wav_err(pos, e))?;
                data[i % channels].push(Value::Num(s as f64));
            }
        }
        hound::SampleFormat::Int => {
            let max = (1i64 << (spec.bits_per_sample.max(1) - 1)) as f64;
            for (i, s) in reader.samples::<i32>().enumerate() {
                let s = s.map_err(|e| wav_err(pos, e))?;
                data[i % channels].push(Value::Num(s as f64 / max));
            }
        }
    }

    let channel_lists = data.into_iter().map(Value::list).collect();
    // Positional `[rate, data]` pair: the value domain has no record type,
    // so `{rate, data}` is represented as a two-element list.
    Ok(Value::list(vec![Value::Num(spec.sample_rate as f64), Value::list(channel_lists)]))
}

fn wav_err(pos: &SourcePos, e: hound::Error) -> AsmError {
    AsmError::Script {
        pos: pos.clone(),
        message: format!("unsupported audio: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_wav_bytes() {
        let pos = SourcePos::synthetic();
        let args = vec![Value::str(vec![0u8, 1, 2, 3])];
        assert!(load(&args, &pos).is_err());
    }
}
