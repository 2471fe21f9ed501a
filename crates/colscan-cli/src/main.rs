use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colscan::arrow::{read_ipc_to_memory, read_parquet_to_memory, LoadOptions};
use colscan::{
    scan, CmpOp, ColumnValues, DictionaryOutput, ParquetTable, ScanOptions, ScanOutput,
    ScanRequest, ScanTable,
};
use serde::Serialize;

#[derive(Debug, Parser)]
#[command(name = "colscan")]
#[command(about = "Run filter/projection scans over Parquet and Arrow IPC files without loading them first.")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Filter and project columns, printing a JSON report.
    Scan(ScanArgs),
    /// Print columns, physical types and segment lengths as JSON.
    Info(InfoArgs),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Backing {
    /// Read Parquet row groups in place.
    Disk,
    /// Load the file into in-memory chunks first.
    Memory,
}

impl Backing {
    fn as_str(self) -> &'static str {
        match self {
            Backing::Disk => "disk",
            Backing::Memory => "memory",
        }
    }
}

#[derive(Debug, Parser)]
struct ScanArgs {
    /// Parquet file, or Arrow IPC file (`.arrow`, `.feather`, `.ipc`).
    input: PathBuf,

    /// Column to project, by name or zero-based index (repeatable).
    #[arg(long = "project", value_name = "COL")]
    projections: Vec<String>,

    /// Filter as `COL:OP:OPERAND`, e.g. `age:GREATER_EQUAL:40` (repeatable, applied in order).
    #[arg(long = "filter", value_name = "COL:OP:OPERAND")]
    filters: Vec<String>,

    /// Backing store. Parquet defaults to `disk`; IPC files are always scanned in memory.
    #[arg(long, value_enum)]
    backing: Option<Backing>,

    /// Dictionary-encode plain string columns when loading into memory (requires
    /// `--backing memory` for Parquet inputs).
    #[arg(long)]
    dictionary_strings: bool,

    /// Return dictionary indices instead of strings for dictionary-encoded columns.
    #[arg(long)]
    dictionary_indices: bool,

    /// Maximum rows per in-memory chunk.
    #[arg(long, default_value_t = 65_536)]
    batch_size: usize,
}

#[derive(Debug, Parser)]
struct InfoArgs {
    /// Parquet file, or Arrow IPC file (`.arrow`, `.feather`, `.ipc`).
    input: PathBuf,

    /// Report the in-memory chunking instead of Parquet row groups.
    #[arg(long, value_enum)]
    backing: Option<Backing>,
}

#[derive(Debug, Serialize)]
struct FilterReport {
    column: usize,
    name: String,
    op: &'static str,
    operand: String,
    candidates: usize,
    skipped: bool,
}

#[derive(Debug, Serialize)]
struct ColumnReport {
    column: usize,
    name: String,
    values: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct ScanReport {
    input: String,
    backing: &'static str,
    total_rows: usize,
    matched_rows: usize,
    filters: Vec<FilterReport>,
    columns: Vec<ColumnReport>,
}

#[derive(Debug, Serialize)]
struct ColumnInfo {
    column: usize,
    name: String,
    #[serde(rename = "type")]
    column_type: String,
    segments: Vec<usize>,
}

#[derive(Debug, Serialize)]
struct InfoReport {
    input: String,
    backing: &'static str,
    rows: usize,
    columns: Vec<ColumnInfo>,
}

fn is_ipc(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("arrow" | "feather" | "ipc")
    )
}

fn choose_backing(input: &Path, requested: Option<Backing>) -> Result<Backing> {
    match (is_ipc(input), requested) {
        (true, Some(Backing::Disk)) => {
            bail!("{} is an Arrow IPC file; only `--backing memory` is supported", input.display())
        }
        (true, _) => Ok(Backing::Memory),
        (false, requested) => Ok(requested.unwrap_or(Backing::Disk)),
    }
}

fn load_memory(input: &Path, options: &LoadOptions) -> Result<colscan::MemTable> {
    let table = if is_ipc(input) {
        read_ipc_to_memory(input, options)
    } else {
        read_parquet_to_memory(input, options)
    };
    table.with_context(|| format!("load {}", input.display()))
}

fn open_disk(input: &Path) -> Result<ParquetTable> {
    ParquetTable::open(input).with_context(|| format!("open {}", input.display()))
}

/// Resolve a column given by name or zero-based index.
fn resolve_column<T: ScanTable>(table: &T, column: &str) -> Result<usize> {
    if let Some(idx) =
        (0..table.column_count()).find(|&idx| table.column_name(idx) == Some(column))
    {
        return Ok(idx);
    }
    match column.parse::<usize>() {
        Ok(idx) => Ok(idx),
        Err(_) => bail!("no column named {column:?}"),
    }
}

fn parse_filter<T: ScanTable>(table: &T, spec: &str) -> Result<(usize, CmpOp, String)> {
    let mut parts = spec.splitn(3, ':');
    let (Some(column), Some(op), Some(operand)) = (parts.next(), parts.next(), parts.next())
    else {
        bail!("filter {spec:?} is not of the form COL:OP:OPERAND");
    };
    let column = resolve_column(table, column)?;
    let op = op
        .parse::<CmpOp>()
        .with_context(|| format!("filter {spec:?}"))?;
    Ok((column, op, operand.to_owned()))
}

fn values_json(values: &ColumnValues) -> serde_json::Value {
    match values {
        ColumnValues::Float64(v) => v.iter().copied().collect(),
        ColumnValues::Int32(v) => v.iter().copied().collect(),
        ColumnValues::Utf8(v) => v.iter().map(|s| s.as_ref()).collect(),
        ColumnValues::DictionaryIndices(v) => v.iter().copied().collect(),
    }
}

fn column_name<T: ScanTable>(table: &T, column: usize) -> String {
    table.column_name(column).unwrap_or_default().to_owned()
}

fn run_scan<T: ScanTable>(
    table: &T,
    args: &ScanArgs,
    backing: Backing,
) -> Result<ScanReport> {
    let mut request = ScanRequest::new(
        args.projections
            .iter()
            .map(|column| resolve_column(table, column))
            .collect::<Result<Vec<_>>>()?,
    );
    for spec in &args.filters {
        let (column, op, operand) = parse_filter(table, spec)?;
        request = request.filter(column, op, operand);
    }

    let options = ScanOptions {
        dictionary_output: if args.dictionary_indices {
            DictionaryOutput::Indices
        } else {
            DictionaryOutput::Strings
        },
    };
    let ScanOutput {
        columns,
        filters,
        rows,
        ..
    } = scan(table, &request, &options)
        .with_context(|| format!("scan {}", args.input.display()))?;

    Ok(ScanReport {
        input: args.input.display().to_string(),
        backing: backing.as_str(),
        total_rows: table.row_count(),
        matched_rows: rows,
        filters: filters
            .into_iter()
            .map(|f| FilterReport {
                name: column_name(table, f.column),
                column: f.column,
                op: f.op.as_str(),
                operand: f.operand,
                candidates: f.candidates,
                skipped: f.skipped,
            })
            .collect(),
        columns: columns
            .iter()
            .map(|c| ColumnReport {
                column: c.column,
                name: column_name(table, c.column),
                values: values_json(&c.values),
            })
            .collect(),
    })
}

fn describe<T: ScanTable>(table: &T, input: &Path, backing: Backing) -> Result<InfoReport> {
    let columns = (0..table.column_count())
        .map(|column| -> Result<ColumnInfo> {
            let column_type = match table.physical_type(column) {
                Ok(t) => t.to_string(),
                Err(colscan::ScanError::UnsupportedPhysicalType { type_name, .. }) => {
                    format!("unsupported ({type_name})")
                }
                Err(err) => return Err(err.into()),
            };
            Ok(ColumnInfo {
                column,
                name: column_name(table, column),
                column_type,
                segments: table.segment_lens(column)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(InfoReport {
        input: input.display().to_string(),
        backing: backing.as_str(),
        rows: table.row_count(),
        columns,
    })
}

/// Print `value` as one line of JSON. A closed stdout is not an error.
fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    let written = serde_json::to_writer(&mut stdout, value)
        .map_err(std::io::Error::from)
        .and_then(|()| writeln!(stdout))
        .and_then(|()| stdout.flush());
    match written {
        Err(err) if err.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
        other => other.context("write report"),
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Scan(args) => {
            let backing = choose_backing(&args.input, args.backing)?;
            if backing == Backing::Disk && args.dictionary_strings {
                bail!("--dictionary-strings only applies to `--backing memory`");
            }
            log::debug!("scanning {} ({})", args.input.display(), backing.as_str());
            let report = match backing {
                Backing::Disk => run_scan(&open_disk(&args.input)?, &args, backing)?,
                Backing::Memory => {
                    let options = LoadOptions {
                        dictionary_strings: args.dictionary_strings,
                        batch_size: args.batch_size,
                    };
                    run_scan(&load_memory(&args.input, &options)?, &args, backing)?
                }
            };
            print_json(&report)
        }
        Command::Info(args) => {
            let backing = choose_backing(&args.input, args.backing)?;
            let report = match backing {
                Backing::Disk => describe(&open_disk(&args.input)?, &args.input, backing)?,
                Backing::Memory => describe(
                    &load_memory(&args.input, &LoadOptions::default())?,
                    &args.input,
                    backing,
                )?,
            };
            print_json(&report)
        }
    }
}

fn main() {
    env_logger::init();

    if let Err(err) = run(Cli::parse()) {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
