use std::error::Error;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use dwarfscan_core::elf::DebugSections;
use dwarfscan_core::line::LineProgramHeader;
use dwarfscan_core::names::{
    string_for_language, string_for_lns, string_for_tag, string_for_unit_type, NameKind, UNKNOWN,
};
use dwarfscan_core::reader::{AddressValue, DEFAULT_BUFFER_SIZE};
use dwarfscan_core::unit::{DwarfReaders, UnitReport};
use dwarfscan_core::ReaderOptions;
use dwarfscan_utils::{
    debug, info, init_logging, init_logging_to_file, init_logging_with_level, warn, LogFormat, LogLevel, LoggingError,
    LoggingGuard,
};
use gimli::constants::DwLns;

type CliResult<T> = Result<T, Box<dyn Error>>;

/// Inspect the DWARF debug info of an object file with a bounded streaming reader.
#[derive(Parser, Debug)]
#[command(name = "dwarfscan")]
#[command(version)]
#[command(about = "Inspect DWARF compile units and line tables", long_about = None)]
struct Cli
{
    #[command(subcommand)]
    command: Commands,

    /// Scratch buffer size of each section reader, in bytes
    #[arg(long, global = true, default_value_t = DEFAULT_BUFFER_SIZE)]
    buffer_size: usize,

    /// Log level (error, warn, info, debug, trace); overrides RUST_LOG
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    /// Log output format (pretty or json)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    /// Write logs to this file (or a dated file in this directory) instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands
{
    /// List the DWARF sections with their file offsets and sizes
    Sections
    {
        /// Object file to inspect
        file: PathBuf,
    },
    /// List the units in .debug_info
    Units
    {
        /// Object file to inspect
        file: PathBuf,
    },
    /// Print the line program header of each compile unit
    Lines
    {
        /// Object file to inspect
        file: PathBuf,
        /// Only the unit at this .debug_info offset (hex with 0x, or decimal)
        #[arg(long, value_parser = parse_number)]
        unit_offset: Option<u64>,
    },
    /// Look up the name of a DWARF constant
    Name
    {
        /// Constant family: at, form, tag, lns, lne, lnct, inl, ut, lang
        kind: NameKind,
        /// Raw value (hex with 0x, or decimal)
        #[arg(value_parser = parse_number)]
        value: u64,
    },
}

fn main() -> ExitCode
{
    let cli = Cli::parse();

    let _guard = match setup_logging(&cli) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            return ExitCode::FAILURE;
        }
    };

    match run_command(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn setup_logging(cli: &Cli) -> Result<LoggingGuard, LoggingError>
{
    if let Some(path) = &cli.log_file {
        let (guard, resolved) = init_logging_to_file(path, cli.log_level, cli.log_format.unwrap_or_default())?;
        debug!(path = %resolved.display(), "logging to file");
        return Ok(guard);
    }

    match (cli.log_level, cli.log_format) {
        (None, None) => init_logging(),
        (level, format) => init_logging_with_level(level.unwrap_or(LogLevel::Warn), format.unwrap_or_default()),
    }
}

fn run_command(cli: &Cli) -> CliResult<()>
{
    match &cli.command {
        Commands::Sections { file } => {
            let (_, sections) = open_object(file)?;
            print_sections(&sections);
            Ok(())
        }
        Commands::Units { file } => list_units(cli, file),
        Commands::Lines { file, unit_offset } => list_lines(cli, file, *unit_offset),
        Commands::Name { kind, value } => {
            let name = kind.lookup(*value);
            if name == UNKNOWN {
                return Err(format!("no {kind} constant with value 0x{value:x}").into());
            }
            println!("{name}");
            Ok(())
        }
    }
}

/// Locate the debug sections and open the file for streaming reads.
fn open_object(path: &Path) -> CliResult<(File, DebugSections)>
{
    let image = fs::read(path).map_err(|e| format!("{}: {e}", path.display()))?;
    let sections = DebugSections::parse(&image)?;
    debug!(path = %path.display(), sections = sections.iter().count(), "parsed object file");
    let file = File::open(path)?;
    Ok((file, sections))
}

fn allocate_buffers(cli: &Cli) -> CliResult<Vec<Vec<u8>>>
{
    let options = ReaderOptions {
        buffer_size: cli.buffer_size,
    }
    .validate()?;
    Ok((0..DwarfReaders::BUFFER_COUNT)
        .map(|_| options.allocate_buffer())
        .collect())
}

fn print_sections(sections: &DebugSections)
{
    if sections.is_empty() {
        println!("no DWARF sections");
        return;
    }

    println!("{:<20} {:>12} {:>12}", "SECTION", "OFFSET", "SIZE");
    for entry in sections.iter() {
        let note = if entry.compressed { "  (compressed, not streamable)" } else { "" };
        println!(
            "{:<20} {:>#12x} {:>#12x}{note}",
            entry.name, entry.section.offset, entry.section.size
        );
    }
}

fn list_units(cli: &Cli, path: &Path) -> CliResult<()>
{
    let (file, sections) = open_object(path)?;
    let mut buffers = allocate_buffers(cli)?;
    let mut readers = DwarfReaders::bind(&file, &mut buffers, &sections)?;
    if !readers.info.is_enabled() {
        return Err(format!("{}: no readable .debug_info section", path.display()).into());
    }

    let mut skipped = 0usize;
    let count = readers.for_each_unit(|offset, report| match report {
        Ok(report) => print_unit(&report),
        Err(err) => {
            skipped += 1;
            println!("unit 0x{offset:08x}: skipped ({err})");
        }
    })?;
    info!(units = count, skipped = skipped, "walked .debug_info");
    Ok(())
}

fn print_unit(report: &UnitReport)
{
    let header = &report.header;
    let summary = &report.summary;
    println!(
        "unit 0x{:08x}: DWARF {} {} ({}-bit, address size {})",
        header.section_offset,
        header.version,
        string_for_unit_type(header.unit_type),
        header.format.word_size() * 8,
        header.address_size
    );
    if let Some(tag) = summary.tag {
        println!("  tag:       {}", string_for_tag(tag));
    }
    if let Some(name) = &summary.name {
        println!("  name:      {name}");
    }
    if let Some(dir) = &summary.comp_dir {
        println!("  comp_dir:  {dir}");
    }
    if let Some(producer) = &summary.producer {
        println!("  producer:  {producer}");
    }
    if let Some(language) = summary.language {
        println!("  language:  {}", string_for_language(language));
    }
    if let Some(offset) = summary.stmt_list {
        println!("  stmt_list: 0x{offset:x}");
    }
    match summary.low_pc {
        Some(AddressValue::Address(address)) => println!("  low_pc:    0x{address:x}"),
        Some(AddressValue::Index(index)) => println!("  low_pc:    .debug_addr[{index}]"),
        Some(AddressValue::Offset(offset)) => println!("  low_pc:    +0x{offset:x}"),
        None => {}
    }
}

fn list_lines(cli: &Cli, path: &Path, only: Option<u64>) -> CliResult<()>
{
    let (file, sections) = open_object(path)?;
    let mut buffers = allocate_buffers(cli)?;
    let mut readers = DwarfReaders::bind(&file, &mut buffers, &sections)?;
    if !readers.line.is_enabled() {
        return Err(format!("{}: no readable .debug_line section", path.display()).into());
    }

    let mut programs = Vec::new();
    readers.for_each_unit(|offset, report| {
        if only.is_some_and(|wanted| wanted != offset) {
            return;
        }
        if let Ok(report) = report {
            if let Some(stmt_list) = report.summary.stmt_list {
                programs.push((offset, report.summary.name, stmt_list));
            }
        }
    })?;

    if let Some(wanted) = only {
        if programs.is_empty() {
            return Err(format!("no compile unit with a line program at offset 0x{wanted:x}").into());
        }
    }

    for (offset, name, stmt_list) in programs {
        println!("unit 0x{offset:08x} {}", name.as_deref().unwrap_or("<unnamed>"));
        match LineProgramHeader::parse(&mut readers.line, stmt_list, &mut readers.strings, &mut readers.line_strings) {
            Ok(header) => print_line_header(&header),
            Err(err) => {
                warn!(unit = offset, stmt_list = stmt_list, error = %err, "unreadable line program");
                println!("  line program at 0x{stmt_list:x}: skipped ({err})");
            }
        }
    }
    Ok(())
}

fn print_line_header(header: &LineProgramHeader)
{
    println!(
        "  line program 0x{:x}: version {}, min_inst {}, line_base {}, line_range {}, opcode_base {}",
        header.section_offset,
        header.version,
        header.minimum_instruction_length,
        header.line_base,
        header.line_range,
        header.opcode_base
    );

    let lengths: Vec<String> = header
        .standard_opcode_lengths
        .iter()
        .zip(1u8..)
        .map(|(length, opcode)| format!("{}={length}", string_for_lns(DwLns(opcode))))
        .collect();
    println!("  opcode operands: {}", lengths.join(" "));

    for (index, directory) in header.include_directories.iter().enumerate() {
        println!("  dir  [{index}] {directory}");
    }
    for (index, file) in header.files.iter().enumerate() {
        let directory = header.directory(file).unwrap_or("");
        println!("  file [{index}] {} (dir {}: {directory})", file.path, file.directory_index);
    }
}

/// Parse `0x`-prefixed hex or plain decimal.
fn parse_number(text: &str) -> Result<u64, String>
{
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|e| format!("invalid number '{text}': {e}"))
}
