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

use anyhow::Result;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// What `fstype(path)` (§6) reports about a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsType {
    File,
    Dir,
    None,
}

/// The filesystem callback of §6: `fstype`, `readText`, `readBinary`. The
/// core never touches `std::fs` directly outside of the production
/// implementation below, so the assembler is restartable from scratch and
/// owns no process-global state between invocations (§5).
pub trait FileReader {
    fn fstype(&self, path: &Path) -> FsType;
    fn read_to_string(&self, path: &Path) -> Result<String>;
    fn read_binary(&self, path: &Path) -> Result<Vec<u8>>;
}

// production file reader
pub struct AsmFileReader;

impl FileReader for AsmFileReader {
    fn fstype(&self, path: &Path) -> FsType {
        match fs::metadata(path) {
            Ok(meta) if meta.is_dir() => FsType::Dir,
            Ok(_) => FsType::File,
            Err(_) => FsType::None,
        }
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        Ok(fs::read_to_string(path)?)
    }

    fn read_binary(&self, path: &Path) -> Result<Vec<u8>> {
        Ok(fs::read(path)?)
    }
}

// Enum to hold either text, binary, or directory data
#[derive(Clone)]
enum FileData {
    Text(String),
    Binary(Vec<u8>),
    Dir,
}

// mock file reader for testing
#[derive(Default)]
pub struct MockFileReader {
    files: HashMap<PathBuf, FileData>,
}

impl MockFileReader {
    pub fn add_file(&mut self, path: &str, content: &str) -> &mut Self {
        self.files
            .insert(PathBuf::from(path), FileData::Text(content.to_string()));
        self
    }

    pub fn add_binary_file(&mut self, path: &str, content: &[u8]) -> &mut Self {
        self.files
            .insert(PathBuf::from(path), FileData::Binary(content.to_vec()));
        self
    }

    pub fn add_dir(&mut self, path: &str) -> &mut Self {
        self.files.insert(PathBuf::from(path), FileData::Dir);
        self
    }
}

impl FileReader for MockFileReader {
    fn fstype(&self, path: &Path) -> FsType {
        match self.files.get(path) {
            Some(FileData::Dir) => FsType::Dir,
            Some(_) => FsType::File,
            None => FsType::None,
        }
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        match self.files.get(path) {
            Some(FileData::Text(content)) => Ok(content.clone()),
            Some(FileData::Binary(_)) => {
                Err(anyhow::anyhow!("Cannot read binary file as string: {}", path.display()))
            }
            Some(FileData::Dir) => Err(anyhow::anyhow!("{} is a directory", path.display())),
            None => Err(anyhow::anyhow!("Mock file not found: {}", path.display())),
        }
    }

    fn read_binary(&self, path: &Path) -> Result<Vec<u8>> {
        match self.files.get(path) {
            Some(FileData::Binary(content)) => Ok(content.clone()),
            Some(FileData::Text(content)) => Ok(content.clone().into_bytes()),
            Some(FileData::Dir) => Err(anyhow::anyhow!("{} is a directory", path.display())),
            None => Err(anyhow::anyhow!("Mock file not found: {}", path.display())),
        }
    }
}

/// The `say(str)` output callback of §6: one logical line per call, used by
/// `.printf` and the script `say` native. Boxed so the driver and the script
/// VM can share a sink without generic plumbing through every call site.
pub trait OutputSink {
    fn say(&mut self, line: &str);
}

/// Production sink: prints to stdout, as `cicasm`'s CLI does with its own
/// status line in `main.rs`.
pub struct StdoutSink;

impl OutputSink for StdoutSink {
    fn say(&mut self, line: &str) {
        println!("{line}");
    }
}

/// Test sink: captures lines for assertions instead of printing them.
#[derive(Default)]
pub struct CapturingSink {
    pub lines: Vec<String>,
}

impl OutputSink for CapturingSink {
    fn say(&mut self, line: &str) {
        self.lines.push(line.to_string());
    }
}
