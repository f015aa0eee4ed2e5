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

//! Top-level driver entry (§6): tokenizes a root source file, runs it
//! through the forward-pass [`driver`], and packages the result in the
//! shape the host contract expects.

pub mod driver;
pub mod encoder;
pub mod errors;
pub mod expr;
pub mod file_reader;
pub mod header;
pub mod lexer;
pub mod pool;
pub mod pos;
pub mod regs;
pub mod script;
pub mod structs;
pub mod symbol;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::debug;

use crate::driver::directives::run_tokens;
use crate::driver::Driver;
use crate::errors::AsmError;
use crate::file_reader::{FileReader, OutputSink};
use crate::lexer::tokenize_source;
use crate::symbol::{ConstantEntry, Entry};

/// Everything the host contract's `DebugInfo` needs to carry: nothing the
/// assembled bytes themselves don't already imply, but useful for a caller
/// that wants to report on what happened without re-parsing `say()` output.
#[derive(Debug, Clone, Default)]
pub struct DebugInfo {
    pub included_files: Vec<PathBuf>,
    pub warnings: Vec<String>,
}

/// The `{sections: [bytes], base: int, arm: bool, debug: DebugInfo}` success
/// shape of §6. The driver only ever builds one contiguous address space (no
/// `.section` directive exists in this grammar), so `sections` is always a
/// single element; the field stays plural to match the host contract as
/// written, in case a future `.section` directive splits it.
#[derive(Debug, Clone)]
pub struct AssembleOutput {
    pub sections: Vec<Vec<u8>>,
    pub base: u32,
    pub arm: bool,
    pub debug: DebugInfo,
}

/// Assembles `source_path` (resolved via `reader`) starting from
/// `base_resolution_path` for relative `.include`/`.import`/`.embed`
/// lookups, with `predefined` constants seeded into the root scope before
/// the first token is read.
///
/// Because this is a single forward pass over a mutable address counter, a
/// fatal error partway through generally means the remaining address
/// arithmetic can no longer be trusted, so the root file's own pass stops at
/// its first fatal `AsmError` (§7). Independent top-level units that can't
/// corrupt that counter — a `.include`d or `.import`ed file, once it's
/// finished running — are batched instead: the driver collects their
/// failures in `driver.errors` and keeps going. This function folds all of
/// that into one `anyhow::Error` for callers that just want pass/fail;
/// callers that need the full `{errors: [string]}` host-contract shape
/// should use [`assemble_host`].
pub fn assemble(
    source_path: &Path,
    predefined: &[(String, f64)],
    base_resolution_path: &Path,
    reader: &dyn FileReader,
    output: &mut dyn OutputSink,
) -> Result<AssembleOutput> {
    match assemble_inner(source_path, predefined, base_resolution_path, reader, output) {
        Ok(out) => Ok(out),
        Err(errs) => {
            let joined = errs.iter().map(|e| e.to_host_string()).collect::<Vec<_>>().join("\n");
            Err(anyhow::anyhow!(joined)).context("failed during assembly")
        }
    }
}

/// The shared pass behind [`assemble`] and [`assemble_host`]: runs the root
/// file to completion, folding any batched `driver.errors` in alongside a
/// fatal root-level failure so both callers see every collected error, not
/// just the first.
fn assemble_inner(
    source_path: &Path,
    predefined: &[(String, f64)],
    base_resolution_path: &Path,
    reader: &dyn FileReader,
    output: &mut dyn OutputSink,
) -> Result<AssembleOutput, Vec<AsmError>> {
    debug!("tokenizing root file {}", source_path.display());
    let text = reader.read_to_string(source_path).map_err(|e| {
        vec![AsmError::other(
            crate::pos::SourcePos::synthetic(),
            format!("failed to read root source file {}: {e}", source_path.display()),
        )]
    })?;
    let tokens =
        tokenize_source(&text, std::rc::Rc::new(source_path.to_path_buf())).map_err(|e| vec![e])?;

    let mut driver = Driver::new(reader, output, base_resolution_path.to_path_buf());
    seed_predefined(&mut driver, predefined).map_err(|e| vec![e])?;

    debug!("running assembly pass over {} tokens", tokens.len());
    let root_result = run_tokens(&mut driver, &tokens).and_then(|()| {
        driver.resolve_pending_branches(true)?;
        driver.flush_pool(true)
    });

    let mut errors = std::mem::take(&mut driver.errors);
    if let Err(e) = root_result {
        errors.insert(0, e);
    }
    if !errors.is_empty() {
        return Err(errors);
    }

    let arm = !matches!(driver.mode, Some(crate::encoder::Mode::Thumb));
    let base = driver.base.unwrap_or(0);
    let debug_info = DebugInfo {
        included_files: driver.included_files.clone(),
        warnings: driver.warnings.iter().map(|w| format!("{}: {}", w.pos, w.message)).collect(),
    };
    let bytes = driver.into_bytes();

    Ok(AssembleOutput {
        sections: vec![bytes],
        base,
        arm,
        debug: debug_info,
    })
}

fn seed_predefined(driver: &mut Driver, predefined: &[(String, f64)]) -> Result<(), AsmError> {
    let pos = crate::pos::SourcePos::synthetic();
    for (name, value) in predefined {
        driver.scope.borrow_mut().declare(
            name,
            Entry::Constant(ConstantEntry {
                params: Vec::new(),
                body: std::rc::Rc::new(crate::expr::Expr::Number(*value, value.fract() != 0.0)),
                captured: driver.scope.clone(),
                pos: pos.clone(),
            }),
            &pos,
        )?;
    }
    Ok(())
}

/// Host-contract wrapper: collapses any failure into the `{errors: [string]}`
/// shape of §6. Unlike [`assemble`], this preserves every collected error as
/// its own string rather than joining them into one `anyhow::Error` chain —
/// the plural shape is the whole point of batching (§7).
pub fn assemble_host(
    source_path: &Path,
    predefined: &[(String, f64)],
    base_resolution_path: &Path,
    reader: &dyn FileReader,
    output: &mut dyn OutputSink,
) -> Result<AssembleOutput, Vec<String>> {
    assemble_inner(source_path, predefined, base_resolution_path, reader, output)
        .map_err(|errs| errs.iter().map(|e| e.to_host_string()).collect())
}
