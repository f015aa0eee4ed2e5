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

//! The embedded `.script … .end` language (§4.9): a small dynamically-typed
//! imperative language that shares its surface lexis with the outer
//! assembler (identifiers, numbers, interpolated strings, newline-delimited
//! statements) but is parsed and evaluated independently once collected.

pub mod ast;
pub mod interp;
mod natives;
pub mod parser;
pub mod value;

use crate::errors::AsmError;
use crate::lexer::token::Token;
pub use interp::ScriptHost;

/// Parses and runs one `.script` block's token stream to completion.
pub fn run_script(tokens: &[Token], host: &mut dyn ScriptHost) -> Result<(), AsmError> {
    let program = parser::parse_program(tokens)?;
    interp::run(&program, host)
}
