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

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser as clap_parser;
use log::info;

use gbasm::file_reader::{AsmFileReader, StdoutSink};

#[derive(clap_parser)]
#[clap(version = "0.1.0", author = "Connor Nolan")]
struct Opts {
    #[clap(short, long)]
    input: PathBuf,
    #[clap(short, long)]
    output: PathBuf,
    /// Directory relative `.include`/`.import`/`.embed` paths resolve
    /// against; defaults to the input file's own directory.
    #[clap(long)]
    base_resolution_path: Option<PathBuf>,
    /// Pre-defined constant, e.g. `--define REGION=1`. Repeatable.
    #[clap(long = "define", value_parser = parse_define)]
    defines: Vec<(String, f64)>,
}

fn parse_define(s: &str) -> Result<(String, f64), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, found `{s}`"))?;
    let value: f64 = value
        .parse()
        .map_err(|_| format!("`{value}` is not a number"))?;
    Ok((key.to_string(), value))
}

fn main() -> ExitCode {
    env_logger::init();
    let opts: Opts = Opts::parse();

    let reader = AsmFileReader;
    let mut sink = StdoutSink;
    let base_resolution_path = opts
        .base_resolution_path
        .clone()
        .or_else(|| opts.input.parent().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."));

    info!("assembling {}", opts.input.display());
    match gbasm::assemble_host(&opts.input, &opts.defines, &base_resolution_path, &reader, &mut sink) {
        Ok(result) => {
            let rom: Vec<u8> = result.sections.into_iter().flatten().collect();
            if let Err(e) = fs::write(&opts.output, &rom) {
                eprintln!("{}: failed to write output: {e}", opts.output.display());
                return ExitCode::FAILURE;
            }
            println!(
                "assembled {} to {} ({} bytes, base {:#010x}, {})",
                opts.input.display(),
                opts.output.display(),
                rom.len(),
                result.base,
                if result.arm { "ARM" } else { "Thumb" },
            );
            for warning in &result.debug.warnings {
                eprintln!("warning: {warning}");
            }
            ExitCode::SUCCESS
        }
        Err(errors) => {
            for e in &errors {
                eprintln!("{e}");
            }
            ExitCode::FAILURE
        }
    }
}
