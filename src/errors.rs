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

use crate::pos::SourcePos;
use thiserror::Error;

/// The error taxonomy of §7: one variant per kind, each carrying the
/// `SourcePos` of its origin so that `file:line:col: message` formatting
/// (the host contract of §6) is always available.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AsmError {
    #[error("{pos}: {message}")]
    Lex { pos: SourcePos, message: String },

    #[error("{pos}: {message}")]
    Parse { pos: SourcePos, message: String },

    #[error("{pos}: undefined symbol `{name}`")]
    UnknownSymbol { pos: SourcePos, name: String },

    #[error("{pos}: `{name}` is already declared in this scope")]
    DuplicateSymbol { pos: SourcePos, name: String },

    #[error("{pos}: {message}")]
    Alignment { pos: SourcePos, message: String },

    #[error("{pos}: {message}")]
    Encoding { pos: SourcePos, message: String },

    #[error("{pos}: literal pool unreachable from this site ({message})")]
    PoolTooFar { pos: SourcePos, message: String },

    #[error("{pos}: .title value exceeds 12 bytes")]
    TitleOverflow { pos: SourcePos },

    #[error("{pos}: script error: {message}")]
    Script { pos: SourcePos, message: String },

    #[error("{pos}: cannot read `{path}`: {message}")]
    Include {
        pos: SourcePos,
        path: String,
        message: String,
    },

    #[error("{pos}: {message}")]
    Other { pos: SourcePos, message: String },
}

impl AsmError {
    pub fn pos(&self) -> &SourcePos {
        match self {
            AsmError::Lex { pos, .. }
            | AsmError::Parse { pos, .. }
            | AsmError::UnknownSymbol { pos, .. }
            | AsmError::DuplicateSymbol { pos, .. }
            | AsmError::Alignment { pos, .. }
            | AsmError::Encoding { pos, .. }
            | AsmError::PoolTooFar { pos, .. }
            | AsmError::TitleOverflow { pos }
            | AsmError::Script { pos, .. }
            | AsmError::Include { pos, .. }
            | AsmError::Other { pos, .. } => pos,
        }
    }

    /// The `file:line:col: message` rendering the host contract (§6) requires
    /// for the `{errors: [string]}` failure shape.
    pub fn to_host_string(&self) -> String {
        format!("{}", self)
    }

    pub fn other(pos: SourcePos, message: impl Into<String>) -> Self {
        AsmError::Other {
            pos,
            message: message.into(),
        }
    }
}

/// A non-fatal condition: the only member of the §7 taxonomy that does not
/// abort assembly. Collected separately from `AsmError` and surfaced to the
/// host `say()` callback rather than returned as a failure.
#[derive(Debug, Clone, PartialEq)]
pub struct PrintfWarning {
    pub pos: SourcePos,
    pub message: String,
}
