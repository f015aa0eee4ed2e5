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

use std::path::Path;

use gbasm::file_reader::{CapturingSink, MockFileReader};

fn assemble(source: &str) -> gbasm::AssembleOutput {
    let mut reader = MockFileReader::default();
    reader.add_file("root.s", source);
    let mut sink = CapturingSink::default();
    gbasm::assemble_host(Path::new("root.s"), &[], Path::new("."), &reader, &mut sink)
        .unwrap_or_else(|e| panic!("assembly failed: {e:?}"))
}

fn rom(source: &str) -> Vec<u8> {
    assemble(source).sections.into_iter().flatten().collect()
}

#[test]
fn emits_u8_list() {
    assert_eq!(rom(".u8 0, 1, 2, 3"), vec![0x00, 0x01, 0x02, 0x03]);
}

#[test]
fn emits_little_endian_u16() {
    assert_eq!(rom(".u16 0x1234"), vec![0x34, 0x12]);
}

#[test]
fn align_pads_to_boundary_with_zero_fill() {
    assert_eq!(rom(".u8 7\n.align 4"), vec![0x07, 0x00, 0x00, 0x00]);
}

#[test]
fn arm_mov_immediate() {
    assert_eq!(rom(".arm\nmov r0, #0x04000000"), vec![0x01, 0x03, 0xa0, 0xe3]);
}

#[test]
fn arm_ldr_eq_collapses_to_mov_when_no_pool_follows() {
    assert_eq!(rom(".arm\nldr r2, =0x03000000"), vec![0x03, 0x24, 0xa0, 0xe3]);
}

#[test]
fn arm_ldr_eq_defers_to_pool() {
    assert_eq!(
        rom(".arm\nldr r2, =0x12345678\n.pool"),
        vec![0x04, 0x20, 0x1f, 0xe5, 0x78, 0x56, 0x34, 0x12]
    );
}

#[test]
fn thumb_ldr_eq_defers_to_word_aligned_pool() {
    let bytes = rom(".thumb\nldr r4, =0x12345678\n.pool");
    assert_eq!(&bytes[0..2], &[0x01, 0x4c]);
    // the pool literal sits at the next word-aligned address past the `ldr`
    let pool_start = bytes.len() - 4;
    assert_eq!(pool_start % 4, 0);
    assert_eq!(&bytes[pool_start..], &[0x78, 0x56, 0x34, 0x12]);
}

#[test]
fn struct_member_bytes_is_its_primitive_width() {
    let source = ".struct S\n.i16 a[5]\n.align 4\n.i32 b\n.end\n.u8 S.b._bytes";
    assert_eq!(rom(source), vec![0x04]);
}

#[test]
fn struct_last_member_plus_its_size_equals_total_bytes() {
    // a[5] of i16 occupies 0..10, .align 4 pads to 12, b (i32) occupies 12..16:
    // the last member's offset plus its own width equals the struct's total size.
    let source = ".struct S\n.i16 a[5]\n.align 4\n.i32 b\n.end\n.u8 S.b, S.b._bytes";
    let bytes = rom(source);
    assert_eq!(bytes[0] as u32 + bytes[1] as u32, 16);
}

#[test]
fn gba_header_checksum_sequence() {
    let source = ".logo\n.title \"GBASM TEST\"\n.u8fill 0x18, 0\n.crc";
    let bytes = rom(source);
    let header_len = gbasm::header::NINTENDO_LOGO.len() + 12 + 0x18;
    assert_eq!(bytes.len(), header_len + 1);
    assert_eq!(*bytes.last().unwrap(), gbasm::header::header_checksum(&bytes[..header_len]));
}

#[test]
fn conditional_suffix_and_dotted_condition_are_equivalent() {
    let a = rom(".arm\nmoveq r0, #1");
    let b = rom(".arm\nmov.eq r0, #1");
    assert_eq!(a, b);
}

#[test]
fn predefined_constants_are_visible_to_source() {
    let mut reader = MockFileReader::default();
    reader.add_file("root.s", ".u8 REGION");
    let mut sink = CapturingSink::default();
    let result = gbasm::assemble_host(
        Path::new("root.s"),
        &[("REGION".to_string(), 7.0)],
        Path::new("."),
        &reader,
        &mut sink,
    )
    .unwrap();
    assert_eq!(result.sections, vec![vec![7u8]]);
}

#[test]
fn script_range_loop_repeats_put_statement() {
    let source = ".script\nfor var i : int.range(5)\nput '.i8 0, 1, 2, 3'\nend\n.end";
    assert_eq!(
        rom(source),
        vec![0, 1, 2, 3, 0, 1, 2, 3, 0, 1, 2, 3, 0, 1, 2, 3, 0, 1, 2, 3]
    );
}

#[test]
fn script_export_and_lookup_round_trip() {
    let source = ".script\nexport answer = 42\n.end\n.u8 answer";
    assert_eq!(rom(source), vec![42]);
}

#[test]
fn include_directive_splices_in_another_file() {
    let mut reader = MockFileReader::default();
    reader.add_file("root.s", ".include \"child.s\"\n.u8 9");
    reader.add_file("child.s", ".u8 1, 2");
    let mut sink = CapturingSink::default();
    let result = gbasm::assemble_host(Path::new("root.s"), &[], Path::new("."), &reader, &mut sink).unwrap();
    assert_eq!(result.sections, vec![vec![1u8, 2, 9]]);
    assert_eq!(result.debug.included_files, vec![std::path::PathBuf::from("child.s")]);
}

#[test]
fn embed_directive_inlines_binary_bytes() {
    let mut reader = MockFileReader::default();
    reader.add_file("root.s", ".embed \"data.bin\"");
    reader.add_binary_file("data.bin", &[0xde, 0xad, 0xbe, 0xef]);
    let mut sink = CapturingSink::default();
    let result = gbasm::assemble_host(Path::new("root.s"), &[], Path::new("."), &reader, &mut sink).unwrap();
    assert_eq!(result.sections, vec![vec![0xde, 0xad, 0xbe, 0xef]]);
}

#[test]
fn arm_mode_is_reported_when_thumb_never_runs() {
    assert!(assemble(".arm\nmov r0, #1").arm);
}

#[test]
fn thumb_mode_is_reported_once_selected() {
    assert!(!assemble(".thumb\nmovs r0, #1").arm);
}

#[test]
fn unknown_register_name_is_a_fatal_error() {
    let mut reader = MockFileReader::default();
    reader.add_file("root.s", ".arm\nmov rX, #1");
    let mut sink = CapturingSink::default();
    let result = gbasm::assemble_host(Path::new("root.s"), &[], Path::new("."), &reader, &mut sink);
    assert!(result.is_err());
}

#[test]
fn misaligned_word_emit_is_a_fatal_error() {
    let mut reader = MockFileReader::default();
    reader.add_file("root.s", ".arm\n.u8 1\nmov r0, #1");
    let mut sink = CapturingSink::default();
    let result = gbasm::assemble_host(Path::new("root.s"), &[], Path::new("."), &reader, &mut sink);
    assert!(result.is_err());
}

#[test]
fn regs_directive_rebinds_aliases() {
    assert_eq!(rom(".arm\n.regs a, b, c\nmov a, #1"), rom(".arm\nmov r0, #1"));
}

#[test]
fn assembling_is_deterministic() {
    let source = ".arm\nmov r0, #0x04000000\nldr r1, =0x12345678\n.pool";
    assert_eq!(rom(source), rom(source));
}

#[test]
fn branch_to_a_label_declared_later_in_the_file_resolves() {
    let bytes = rom(".arm\nb forward\nmov r0, #1\nforward:\nmov r1, #2");
    // `b` to the very next word-aligned label after one intervening
    // instruction: distance 0, the same unconditional-branch encoding as a
    // `b` with an immediate word-offset of zero.
    assert_eq!(&bytes[0..4], &[0x00, 0x00, 0x00, 0xea]);
}

#[test]
fn ldr_eq_to_a_label_declared_later_in_the_file_resolves_at_pool_flush() {
    let bytes = rom(".arm\nldr r2, =target\nmov r0, #1\nmov r0, #1\ntarget:\n.pool");
    assert_eq!(bytes.len(), 16);
    // the pool word is the address `target` is bound to, base (0x08000000)
    // plus its 12-byte offset into this section
    assert_eq!(&bytes[12..16], &[0x0c, 0x00, 0x00, 0x08]);
}

#[test]
fn unresolved_forward_branch_is_a_fatal_error_at_end_of_file() {
    let mut reader = MockFileReader::default();
    reader.add_file("root.s", ".arm\nb nowhere");
    let mut sink = CapturingSink::default();
    let result = gbasm::assemble_host(Path::new("root.s"), &[], Path::new("."), &reader, &mut sink);
    assert!(result.is_err());
}

#[test]
fn independent_include_failures_are_batched_not_aborted() {
    let mut reader = MockFileReader::default();
    reader.add_file("root.s", ".include \"bad1.s\"\n.include \"bad2.s\"\n.u8 9");
    reader.add_file("bad1.s", ".u8 totally_undefined_one");
    reader.add_file("bad2.s", ".u8 totally_undefined_two");
    let mut sink = CapturingSink::default();
    let result = gbasm::assemble_host(Path::new("root.s"), &[], Path::new("."), &reader, &mut sink);
    let errors = result.expect_err("both included files reference undefined symbols");
    assert_eq!(errors.len(), 2);
}
