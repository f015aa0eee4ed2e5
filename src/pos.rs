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

use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// A (file, line, column) triple attached to every token, AST node, symbol and
/// emitted artifact so that errors and `.if` line-labels can be traced back to
/// source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourcePos {
    pub file: Rc<PathBuf>,
    pub line: usize,
    pub col: usize,
}

impl SourcePos {
    pub fn new(file: Rc<PathBuf>, line: usize, col: usize) -> Self {
        Self { file, line, col }
    }

    pub fn synthetic() -> Self {
        Self {
            file: Rc::new(PathBuf::from("<generated>")),
            line: 0,
            col: 0,
        }
    }

    pub fn file_name(&self) -> &Path {
        self.file.as_path()
    }
}

impl fmt::Display for SourcePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file.display(), self.line, self.col)
    }
}
