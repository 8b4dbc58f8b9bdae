use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use dkb2ynab::logging::{default_level, init_tracing};
use dkb2ynab::{
    range_from_path, BankParser, ConversionOptions, Converter, DateRange, DkbParser, DkbReader,
    FileValidator, OutputLocation,
};

#[derive(Parser, Debug)]
#[command(name = "dkb2ynab", version, about = "Convert DKB account exports into YNAB import files")]
struct Cli {
    /// More log output (repeatable)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Less log output (repeatable)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    quiet: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert one export into a YNAB CSV
    Convert(ConvertArgs),
    /// Parse and map an export without writing, print a JSON report
    Check {
        input: PathBuf,
    },
}

#[derive(Args, Debug)]
struct ConvertArgs {
    /// DKB export, or "-" for stdin
    input: PathBuf,

    /// Exact output file ("-" for stdout)
    #[arg(short, long, conflicts_with = "output_dir")]
    output: Option<PathBuf>,

    /// Output directory; the file name is derived from the account
    #[arg(short = 'd', long, default_value = ".")]
    output_dir: PathBuf,

    /// First booking date to keep (YYYY-MM-DD)
    #[arg(long, requires = "to")]
    from: Option<NaiveDate>,

    /// Last booking date to keep (YYYY-MM-DD)
    #[arg(long, requires = "from")]
    to: Option<NaiveDate>,

    /// Skip malformed rows instead of aborting
    #[arg(long)]
    skip_invalid: bool,

    /// Do not write a UTF-8 byte order mark
    #[arg(long)]
    no_bom: bool,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(default_level(cli.verbose, cli.quiet));

    if let Err(err) = run(cli.command) {
        eprintln!("❌ {:#}", err);
        std::process::exit(1);
    }
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Convert(args) => run_convert(args),
        Command::Check { input } => run_check(input),
    }
}

fn run_convert(args: ConvertArgs) -> Result<()> {
    let is_stdin = args.input.as_os_str() == "-";

    // An explicit range wins over one encoded in the input's file name
    let range = match (args.from, args.to) {
        (Some(from), Some(to)) => Some(DateRange::new(from, to)?),
        _ if is_stdin => None,
        _ => range_from_path(&args.input)?,
    };
    let converter = Converter::new(ConversionOptions {
        range,
        skip_invalid: args.skip_invalid,
        bom: !args.no_bom,
    });

    let to_stdout = args.output.as_ref().map(|p| p.as_os_str() == "-");

    if is_stdin || to_stdout == Some(true) {
        let reader = open_input(&args.input, is_stdin)?;
        let report = match &args.output {
            Some(path) if path.as_os_str() != "-" => converter
                .convert_to_file(reader, path)
                .with_context(|| format!("Failed to convert into {}", path.display()))?,
            _ => {
                let stdout = io::stdout();
                let mut out = BufWriter::new(stdout.lock());
                let report = converter.convert(reader, &mut out)?;
                out.flush().context("Failed to flush stdout")?;
                report
            }
        };
        eprintln!("✓ {}", report.summary());
        return Ok(());
    }

    if !args.input.is_file() {
        bail!("Input file not found: {}", args.input.display());
    }

    let output = match args.output {
        Some(path) => OutputLocation::File(path),
        None => OutputLocation::Dir(args.output_dir),
    };

    let report = converter
        .convert_file(&args.input, &output)
        .with_context(|| format!("Failed to convert {}", args.input.display()))?;

    if let Some(path) = &report.output {
        eprintln!("✓ {} → {}", report.summary(), path.display());
    }
    Ok(())
}

fn open_input(path: &Path, is_stdin: bool) -> Result<Box<dyn io::Read>> {
    if is_stdin {
        return Ok(Box::new(io::stdin().lock()));
    }
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open input: {}", path.display()))?;
    Ok(Box::new(io::BufReader::new(file)))
}

fn run_check(input: PathBuf) -> Result<()> {
    let parser = DkbParser::new();
    if !parser.can_parse(&input) {
        bail!("Not a DKB account export: {}", input.display());
    }

    let range = range_from_path(&input)?;

    // Dry run: map every row into a sink, keeping the real counts
    let converter = Converter::new(ConversionOptions {
        range,
        ..Default::default()
    });
    let file = std::fs::File::open(&input)
        .with_context(|| format!("Failed to open input: {}", input.display()))?;
    let reader = DkbReader::new(io::BufReader::new(file))?;
    let report = converter.convert_records(reader, io::sink())?;

    let json = serde_json::json!({
        "parser": parser.source_type().code(),
        "parser_version": parser.version(),
        "report": report,
    });
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
