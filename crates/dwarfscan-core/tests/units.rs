//! Tests for unit walking, abbreviations and line program headers

use dwarfscan_core::error::DwarfError;
use dwarfscan_core::line::LineProgramHeader;
use dwarfscan_core::reader::AddressValue;
use dwarfscan_core::section::Section;
use dwarfscan_core::unit::{AbbreviationTable, DwarfReaders, UnitHeader};
use dwarfscan_core::SectionReader;
use gimli::constants::{self, DwLang};
use gimli::Format;

/// Lays sections out back to back in one file image.
#[derive(Default)]
struct ImageBuilder
{
    data: Vec<u8>,
}

impl ImageBuilder
{
    fn add(&mut self, bytes: &[u8]) -> Section
    {
        // Keep a gap so sections never touch.
        self.data.extend_from_slice(&[0xcc; 3]);
        let offset = self.data.len() as u64;
        self.data.extend_from_slice(bytes);
        Section::new(offset, bytes.len() as u64)
    }
}

fn u16b(value: u16) -> [u8; 2]
{
    value.to_ne_bytes()
}

fn u32b(value: u32) -> [u8; 4]
{
    value.to_ne_bytes()
}

/// Prefix a unit body with its 32-bit initial length.
fn with_length(body: &[u8]) -> Vec<u8>
{
    let mut out = u32b(body.len() as u32).to_vec();
    out.extend_from_slice(body);
    out
}

const V5_ABBREV_OFFSET: u32 = 20;

fn abbrev_section() -> Vec<u8>
{
    let mut out = vec![
        // code 1: compile_unit, no children
        0x01, 0x11, 0x00,
        0x25, 0x0e, // producer: strp
        0x13, 0x05, // language: data2
        0x03, 0x08, // name: string
        0x1b, 0x1f, // comp_dir: line_strp
        0x10, 0x17, // stmt_list: sec_offset
        0x11, 0x01, // low_pc: addr
        0x12, 0x06, // high_pc: data4
        0x00, 0x00,
        0x00,
    ];
    assert_eq!(out.len(), V5_ABBREV_OFFSET as usize);
    out.extend_from_slice(&[
        // code 1: compile_unit with children
        0x01, 0x11, 0x01,
        0x03, 0x1f, // name: line_strp
        0x13, 0x21, 0x1c, // language: implicit_const DW_LANG_Rust
        0x11, 0x29, // low_pc: addrx1
        0x3f, 0x19, // external: flag_present
        0x00, 0x00,
        0x00,
    ]);
    out
}

const STR: &[u8] = b"clang version 17\0rustc 1.80\0";
const LINE_STR: &[u8] = b"/src\0lib.rs\0/usr/include\0";

fn info_section() -> Vec<u8>
{
    let mut out = Vec::new();

    // DWARF 4 compile unit
    let mut body = u16b(4).to_vec();
    body.extend_from_slice(&u32b(0));
    body.push(4);
    body.push(1);
    body.extend_from_slice(&u32b(0));
    body.extend_from_slice(&u16b(0x0c));
    body.extend_from_slice(b"main.c\0");
    body.extend_from_slice(&u32b(0));
    body.extend_from_slice(&u32b(0x40));
    body.extend_from_slice(&u32b(0x1000));
    body.extend_from_slice(&u32b(0x20));
    out.extend(with_length(&body));

    // DWARF 5 unit whose root DIE uses an undefined abbreviation
    let mut body = u16b(5).to_vec();
    body.push(constants::DW_UT_compile.0);
    body.push(4);
    body.extend_from_slice(&u32b(V5_ABBREV_OFFSET));
    body.push(9);
    body.extend_from_slice(&[0; 6]);
    out.extend(with_length(&body));

    // DWARF 5 compile unit
    let mut body = u16b(5).to_vec();
    body.push(constants::DW_UT_compile.0);
    body.push(4);
    body.extend_from_slice(&u32b(V5_ABBREV_OFFSET));
    body.push(1);
    body.extend_from_slice(&u32b(5));
    body.push(3);
    body.push(0);
    out.extend(with_length(&body));

    // Unknown version
    let mut body = u16b(7).to_vec();
    body.extend_from_slice(&[0; 8]);
    out.extend(with_length(&body));

    out
}

#[test]
fn test_walk_units_abandons_corrupt_ones()
{
    let mut image = ImageBuilder::default();
    let info = image.add(&info_section());
    let abbrev = image.add(&abbrev_section());
    let strings = image.add(STR);
    let line_strings = image.add(LINE_STR);
    let size = image.data.len() as u64;
    let data = image.data;

    let (mut a, mut b, mut c, mut d) = ([0u8; 16], [0u8; 16], [0u8; 16], [0u8; 16]);
    let mut readers = DwarfReaders {
        info: SectionReader::bound(&data, &mut a, info, size).unwrap(),
        abbrev: SectionReader::bound(&data, &mut b, abbrev, size).unwrap(),
        strings: SectionReader::bound(&data, &mut c, strings, size).unwrap(),
        line_strings: SectionReader::bound(&data, &mut d, line_strings, size).unwrap(),
        ..DwarfReaders::default()
    };

    let mut reports = Vec::new();
    let count = readers
        .for_each_unit(|offset, report| reports.push((offset, report)))
        .unwrap();
    assert_eq!(count, 4);
    assert_eq!(reports.len(), 4);

    let (offset, first) = &reports[0];
    assert_eq!(*offset, 0);
    let first = first.as_ref().unwrap();
    assert_eq!(first.header.version, 4);
    assert_eq!(first.header.format, Format::Dwarf32);
    assert_eq!(first.header.address_size, 4);
    assert_eq!(first.header.unit_type, constants::DW_UT_compile);
    assert_eq!(first.header.start, info.offset);
    assert_eq!(first.header.entries, info.offset + 11);
    assert_eq!(first.summary.tag, Some(constants::DW_TAG_compile_unit));
    assert_eq!(first.summary.producer.as_deref(), Some("clang version 17"));
    assert_eq!(first.summary.language, Some(DwLang(0x0c)));
    assert_eq!(first.summary.name.as_deref(), Some("main.c"));
    assert_eq!(first.summary.comp_dir.as_deref(), Some("/src"));
    assert_eq!(first.summary.stmt_list, Some(0x40));
    assert_eq!(first.summary.low_pc, Some(AddressValue::Address(0x1000)));

    let (offset, second) = &reports[1];
    assert_eq!(*offset, first.header.end - info.offset);
    assert_eq!(second, &Err(DwarfError::MissingAbbreviation(9)));

    let third = reports[2].1.as_ref().unwrap();
    assert_eq!(third.header.version, 5);
    assert_eq!(third.header.debug_abbrev_offset, u64::from(V5_ABBREV_OFFSET));
    assert_eq!(third.summary.name.as_deref(), Some("lib.rs"));
    assert_eq!(third.summary.language, Some(constants::DW_LANG_Rust));
    assert_eq!(third.summary.low_pc, Some(AddressValue::Index(3)));
    assert_eq!(third.summary.producer, None);
    assert_eq!(third.summary.stmt_list, None);

    assert_eq!(reports[3].1, Err(DwarfError::UnsupportedVersion(7)));
    assert!(readers.info.at_end_of_section());
}

#[test]
fn test_walk_resolves_indexed_strings()
{
    let abbrev = [
        // code 1: compile_unit with its own str_offsets_base
        0x01, 0x11, 0x00,
        0x25, 0x25, // producer: strx1
        0x03, 0x25, // name: strx1
        0x72, 0x17, // str_offsets_base: sec_offset
        0x00, 0x00,
        // code 2: compile_unit relying on the first table
        0x02, 0x11, 0x00,
        0x03, 0x1a, // name: strx
        0x1b, 0x26, // comp_dir: strx2
        0x00, 0x00,
        0x00,
    ];
    let strings = b"lib.rs\0rustc 1.80\0/src\0";
    let mut str_offsets = u32b(16).to_vec();
    str_offsets.extend_from_slice(&u16b(5));
    str_offsets.extend_from_slice(&u16b(0));
    for offset in [7, 0, 18] {
        str_offsets.extend_from_slice(&u32b(offset));
    }

    let mut info = Vec::new();
    let mut body = u16b(5).to_vec();
    body.push(constants::DW_UT_compile.0);
    body.push(4);
    body.extend_from_slice(&u32b(0));
    // producer (index 0) comes before the base that locates it
    body.extend_from_slice(&[1, 0, 1]);
    body.extend_from_slice(&u32b(8));
    info.extend(with_length(&body));

    let mut body = u16b(5).to_vec();
    body.push(constants::DW_UT_compile.0);
    body.push(4);
    body.extend_from_slice(&u32b(0));
    body.extend_from_slice(&[2, 1]);
    body.extend_from_slice(&u16b(2));
    info.extend(with_length(&body));

    let mut image = ImageBuilder::default();
    let info = image.add(&info);
    let abbrev = image.add(&abbrev);
    let strings = image.add(strings);
    let str_offsets = image.add(&str_offsets);
    let size = image.data.len() as u64;
    let data = image.data;

    let (mut a, mut b, mut c, mut d) = ([0u8; 16], [0u8; 16], [0u8; 16], [0u8; 16]);
    let mut readers = DwarfReaders {
        info: SectionReader::bound(&data, &mut a, info, size).unwrap(),
        abbrev: SectionReader::bound(&data, &mut b, abbrev, size).unwrap(),
        strings: SectionReader::bound(&data, &mut c, strings, size).unwrap(),
        str_offsets: SectionReader::bound(&data, &mut d, str_offsets, size).unwrap(),
        ..DwarfReaders::default()
    };

    let mut reports = Vec::new();
    readers
        .for_each_unit(|_, report| reports.push(report.unwrap()))
        .unwrap();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].summary.producer.as_deref(), Some("rustc 1.80"));
    assert_eq!(reports[0].summary.name.as_deref(), Some("lib.rs"));
    assert_eq!(reports[1].summary.name.as_deref(), Some("lib.rs"));
    assert_eq!(reports[1].summary.comp_dir.as_deref(), Some("/src"));
}

#[test]
fn test_walk_reads_dwarf2_ref_addr_by_address_size()
{
    let address_size = u8::try_from(std::mem::size_of::<usize>()).unwrap();
    let abbrev = [
        0x01, 0x11, 0x00,
        0x03, 0x08, // name: string
        0x47, 0x10, // specification: ref_addr
        0x10, 0x06, // stmt_list: data4
        0x00, 0x00,
        0x00,
    ];

    let mut body = u16b(2).to_vec();
    body.extend_from_slice(&u32b(0));
    body.push(address_size);
    body.push(1);
    body.extend_from_slice(b"old.c\0");
    body.extend(std::iter::repeat(0x77).take(usize::from(address_size)));
    body.extend_from_slice(&u32b(0x40));

    let mut image = ImageBuilder::default();
    let info = image.add(&with_length(&body));
    let abbrev = image.add(&abbrev);
    let size = image.data.len() as u64;
    let data = image.data;

    let (mut a, mut b) = ([0u8; 16], [0u8; 16]);
    let mut readers = DwarfReaders {
        info: SectionReader::bound(&data, &mut a, info, size).unwrap(),
        abbrev: SectionReader::bound(&data, &mut b, abbrev, size).unwrap(),
        ..DwarfReaders::default()
    };

    let mut reports = Vec::new();
    readers.for_each_unit(|_, report| reports.push(report)).unwrap();
    let report = reports[0].as_ref().unwrap();
    assert_eq!(report.header.version, 2);
    assert_eq!(report.summary.name.as_deref(), Some("old.c"));
    assert_eq!(report.summary.stmt_list, Some(0x40));
}

#[test]
fn test_walk_stops_when_unit_overruns_section()
{
    let mut body = with_length(&[4, 0, 0, 0, 0, 0, 4, 0]);
    body.extend_from_slice(&u32b(0x100));
    body.extend_from_slice(&[0; 4]);

    let mut image = ImageBuilder::default();
    let info = image.add(&body);
    let abbrev = image.add(&[1, 0x11, 0, 0, 0, 0]);
    let size = image.data.len() as u64;
    let data = image.data;

    let (mut a, mut b) = ([0u8; 16], [0u8; 16]);
    let mut readers = DwarfReaders {
        info: SectionReader::bound(&data, &mut a, info, size).unwrap(),
        abbrev: SectionReader::bound(&data, &mut b, abbrev, size).unwrap(),
        ..DwarfReaders::default()
    };

    let mut visited = 0;
    let result = readers.for_each_unit(|_, _| visited += 1);
    assert!(matches!(result, Err(DwarfError::Truncated { .. })));
    assert_eq!(visited, 1);
}

#[test]
fn test_unit_header_dwarf64_type_unit()
{
    let mut data = 0xffff_ffffu32.to_ne_bytes().to_vec();
    let mut body = u16b(5).to_vec();
    body.push(constants::DW_UT_type.0);
    body.push(4);
    body.extend_from_slice(&0x80u64.to_ne_bytes());
    body.extend_from_slice(&0xfeed_face_cafe_beefu64.to_ne_bytes());
    body.extend_from_slice(&0x30u64.to_ne_bytes());
    body.push(0);
    data.extend_from_slice(&(body.len() as u64).to_ne_bytes());
    data.extend_from_slice(&body);
    let size = data.len() as u64;

    let mut scratch = [0u8; 16];
    let mut reader = SectionReader::bound(&data, &mut scratch, Section::new(0, size), size).unwrap();
    let header = UnitHeader::parse(&mut reader).unwrap();
    assert_eq!(header.format, Format::Dwarf64);
    assert_eq!(header.unit_type, constants::DW_UT_type);
    assert_eq!(header.debug_abbrev_offset, 0x80);
    assert_eq!(header.type_signature, Some(0xfeed_face_cafe_beef));
    assert_eq!(header.type_offset, Some(0x30));
    assert_eq!(header.dwo_id, None);
    assert_eq!(header.end, size);
    assert_eq!(header.entries, size - 1);
    assert_eq!(reader.end_offset(), size);
}

#[test]
fn test_abbreviation_table()
{
    let data = abbrev_section();
    let size = data.len() as u64;
    let mut scratch = [0u8; 16];
    let mut reader = SectionReader::bound(&data, &mut scratch, Section::new(0, size), size).unwrap();

    let table = AbbreviationTable::parse(&mut reader, 0).unwrap();
    assert_eq!(table.len(), 1);
    let entry = table.get(1).unwrap();
    assert_eq!(entry.tag, constants::DW_TAG_compile_unit);
    assert!(!entry.has_children);
    assert_eq!(entry.attributes.len(), 7);
    assert_eq!(entry.attributes[3].name, constants::DW_AT_comp_dir);
    assert_eq!(entry.attributes[3].form, constants::DW_FORM_line_strp);
    assert!(table.get(2).is_none());

    let table = AbbreviationTable::parse(&mut reader, u64::from(V5_ABBREV_OFFSET)).unwrap();
    let entry = table.get(1).unwrap();
    assert!(entry.has_children);
    assert_eq!(entry.attributes[1].form, constants::DW_FORM_implicit_const);
    assert_eq!(entry.attributes[1].implicit_const, Some(0x1c));
    assert_eq!(entry.attributes[0].implicit_const, None);
}

#[test]
fn test_abbreviation_lookup_with_sparse_codes()
{
    let data = vec![5u8, 0x2e, 0, 0, 0, 2, 0x34, 0, 0, 0, 0];
    let mut scratch = [0u8; 16];
    let mut reader = SectionReader::bound(&data, &mut scratch, Section::new(0, 11), 11).unwrap();
    let table = AbbreviationTable::parse(&mut reader, 0).unwrap();
    assert_eq!(table.get(5).unwrap().tag, constants::DW_TAG_subprogram);
    assert_eq!(table.get(2).unwrap().tag, constants::DW_TAG_variable);
    assert!(table.get(1).is_none());
}

const STANDARD_OPCODE_LENGTHS: [u8; 12] = [0, 1, 1, 1, 1, 0, 0, 0, 1, 0, 0, 1];
const PROGRAM: [u8; 3] = [0x00, 0x01, 0x01];

fn line_program_v4() -> Vec<u8>
{
    let mut params = vec![1, 1, 1, 0xfb, 14, 13];
    params.extend_from_slice(&STANDARD_OPCODE_LENGTHS);
    params.extend_from_slice(b"src\0include\0\0");
    params.extend_from_slice(b"main.c\0\x01\x00\x00");
    params.extend_from_slice(b"stdio.h\0\x02\x80\x01\x10");
    params.push(0);

    let mut body = u16b(4).to_vec();
    body.extend_from_slice(&u32b(params.len() as u32));
    body.extend_from_slice(&params);
    body.extend_from_slice(&PROGRAM);
    with_length(&body)
}

fn line_program_v5() -> Vec<u8>
{
    // directories: path as line_strp
    let mut tables = vec![1, 0x01, 0x1f, 2];
    tables.extend_from_slice(&u32b(0));
    tables.extend_from_slice(&u32b(12));
    // files: path as string, directory index as udata, MD5 as data16
    tables.extend_from_slice(&[3, 0x01, 0x08, 0x02, 0x0f, 0x05, 0x1e, 1]);
    tables.extend_from_slice(b"lib.rs\0");
    tables.push(0);
    tables.extend_from_slice(&[0xab; 16]);
    line_program_v5_with(&tables)
}

/// A DWARF 5 line program whose directory and file tables are `tables`.
fn line_program_v5_with(tables: &[u8]) -> Vec<u8>
{
    let mut params = vec![1, 1, 1, 0xfb, 14, 13];
    params.extend_from_slice(&STANDARD_OPCODE_LENGTHS);
    params.extend_from_slice(tables);

    let mut body = u16b(5).to_vec();
    body.push(4);
    body.push(0);
    body.extend_from_slice(&u32b(params.len() as u32));
    body.extend_from_slice(&params);
    body.extend_from_slice(&PROGRAM);
    with_length(&body)
}

#[test]
fn test_line_program_headers()
{
    let v4 = line_program_v4();
    let mut line_section = v4.clone();
    line_section.extend(line_program_v5());

    let mut image = ImageBuilder::default();
    let line = image.add(&line_section);
    let line_strings = image.add(LINE_STR);
    let size = image.data.len() as u64;
    let data = image.data;

    let (mut a, mut b) = ([0u8; 16], [0u8; 16]);
    let mut line_reader = SectionReader::bound(&data, &mut a, line, size).unwrap();
    let mut line_str_reader = SectionReader::bound(&data, &mut b, line_strings, size).unwrap();
    let mut str_reader = SectionReader::new();

    let header = LineProgramHeader::parse(&mut line_reader, 0, &mut str_reader, &mut line_str_reader).unwrap();
    assert_eq!(header.version, 4);
    assert_eq!(header.format, Format::Dwarf32);
    assert_eq!(header.address_size, None);
    assert_eq!(header.line_base, -5);
    assert_eq!(header.line_range, 14);
    assert_eq!(header.opcode_base, 13);
    assert_eq!(header.standard_opcode_lengths, STANDARD_OPCODE_LENGTHS);
    assert_eq!(header.include_directories, ["src", "include"]);
    assert_eq!(header.files.len(), 2);
    assert_eq!(header.files[0].path, "main.c");
    assert_eq!(header.directory(&header.files[0]), Some("src"));
    assert_eq!(header.files[1].path, "stdio.h");
    assert_eq!(header.files[1].modification_time, Some(128));
    assert_eq!(header.files[1].size, Some(16));
    assert_eq!(header.program_offset, line.offset + (v4.len() - PROGRAM.len()) as u64);
    assert_eq!(line_reader.offset(), header.program_offset);
    assert_eq!(line_reader.read_u8().unwrap(), 0x00);

    let header =
        LineProgramHeader::parse(&mut line_reader, v4.len() as u64, &mut str_reader, &mut line_str_reader).unwrap();
    assert_eq!(header.version, 5);
    assert_eq!(header.address_size, Some(4));
    assert_eq!(header.segment_selector_size, Some(0));
    assert_eq!(header.include_directories, ["/src", "/usr/include"]);
    assert_eq!(header.files.len(), 1);
    assert_eq!(header.files[0].path, "lib.rs");
    assert_eq!(header.files[0].directory_index, 0);
    assert_eq!(header.files[0].md5, Some([0xab; 16]));
    assert_eq!(header.directory(&header.files[0]), Some("/src"));
    assert_eq!(header.end, line.end());
    assert_eq!(line_reader.remaining(), PROGRAM.len() as u64);
}

#[test]
fn test_line_program_rejects_zero_line_range()
{
    let mut program = line_program_v4();
    // line_range sits after length(4), version(2), header_length(4) and four parameter bytes.
    program[14] = 0;
    let size = program.len() as u64;
    let mut scratch = [0u8; 16];
    let mut reader = SectionReader::bound(&program, &mut scratch, Section::new(0, size), size).unwrap();
    let mut disabled = (SectionReader::new(), SectionReader::new());
    assert_eq!(
        LineProgramHeader::parse(&mut reader, 0, &mut disabled.0, &mut disabled.1),
        Err(DwarfError::InvalidSetting {
            field: "line_range",
            value: 0
        })
    );
}

fn parse_line_program(program: &[u8]) -> Result<LineProgramHeader, DwarfError>
{
    let size = program.len() as u64;
    let mut scratch = [0u8; 16];
    let mut reader = SectionReader::bound(&program, &mut scratch, Section::new(0, size), size)?;
    let mut disabled = (SectionReader::new(), SectionReader::new());
    LineProgramHeader::parse(&mut reader, 0, &mut disabled.0, &mut disabled.1)
}

#[test]
fn test_line_program_rejects_impossible_entry_count()
{
    // No entry fields at all, yet a thousand directories.
    let mut tables = vec![0, 0xe8, 0x07];
    tables.extend_from_slice(&[0; 64]);
    assert_eq!(
        parse_line_program(&line_program_v5_with(&tables)),
        Err(DwarfError::InvalidSetting {
            field: "directory count",
            value: 1000
        })
    );

    // Each entry needs at least 17 bytes, far more than are left.
    let mut tables = vec![2, 0x01, 0x08, 0x05, 0x1e, 100];
    tables.extend_from_slice(&[0; 200]);
    assert_eq!(
        parse_line_program(&line_program_v5_with(&tables)),
        Err(DwarfError::InvalidSetting {
            field: "directory count",
            value: 100
        })
    );

    // Empty tables stay valid whatever their entry formats.
    let header = parse_line_program(&line_program_v5_with(&[0, 0, 0, 0])).unwrap();
    assert!(header.include_directories.is_empty());
    assert!(header.files.is_empty());
}
