use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum, ValueHint};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use usv_merge::{
    parse_overlay, parse_primary, InputFile, IntervalUnit, KeyMode, MergeParams, ParseReport,
    Session, TimeConfig,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Merge USV track logs with corrected depth overlays", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Merge a primary track log with overlay spreadsheets and export the result
    Merge(MergeArgs),
    /// Parse files and report row counts and problems without merging
    Inspect(InspectArgs),
}

#[derive(Parser, Debug)]
struct MergeArgs {
    /// Primary track log (CSV: latitude, longitude, depth, time)
    #[arg(long, value_hint = ValueHint::FilePath)]
    primary: PathBuf,

    /// Overlay spreadsheet (xlsx/xls/ods/csv); repeat for several files
    #[arg(long, value_hint = ValueHint::FilePath)]
    overlay: Vec<PathBuf>,

    /// Start date for regenerated timestamps (YYYY-MM-DD)
    #[arg(long)]
    date: Option<String>,

    /// Start time for regenerated timestamps (HH:MM or HH:MM:SS)
    #[arg(long)]
    time: Option<String>,

    /// Step between regenerated timestamps
    #[arg(long, default_value = "1")]
    interval: String,

    /// Unit of --interval
    #[arg(long, value_enum, default_value_t = IntervalUnitOpt::Second)]
    interval_unit: IntervalUnitOpt,

    /// JSON merge parameters; flags below override it
    #[arg(long, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Coordinate matching mode
    #[arg(long, value_enum)]
    key_mode: Option<KeyModeOpt>,

    /// Decimals kept when --key-mode numeric
    #[arg(long, default_value_t = 6)]
    key_decimals: u32,

    /// Rewrite numeric depths with a fixed number of decimals
    #[arg(long)]
    depth_decimals: Option<usize>,

    /// Seed for the depth fill (reproducible output)
    #[arg(long)]
    seed: Option<u64>,

    /// Replace the preview with this edited text before export
    #[arg(long, value_hint = ValueHint::FilePath)]
    edit: Option<PathBuf>,

    /// Output directory for "RAW DATA USV" (`-` for stdout)
    #[arg(short, long, default_value = ".", value_hint = ValueHint::DirPath)]
    output: PathBuf,

    /// Optional JSON report of parse results and merge stats
    #[arg(long, value_hint = ValueHint::FilePath)]
    report: Option<PathBuf>,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Parser, Debug)]
struct InspectArgs {
    /// Files to parse
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    inputs: Vec<PathBuf>,

    /// Parse the inputs as primary track logs instead of overlays
    #[arg(long, action = ArgAction::SetTrue)]
    primary: bool,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum IntervalUnitOpt {
    Second,
    Millisecond,
}

impl From<IntervalUnitOpt> for IntervalUnit {
    fn from(value: IntervalUnitOpt) -> Self {
        match value {
            IntervalUnitOpt::Second => IntervalUnit::Second,
            IntervalUnitOpt::Millisecond => IntervalUnit::Millisecond,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum KeyModeOpt {
    Exact,
    Numeric,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbose = match &cli.command {
        Command::Merge(args) => args.verbose,
        Command::Inspect(args) => args.verbose,
    };
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match cli.command {
        Command::Merge(args) => handle_merge(args),
        Command::Inspect(args) => handle_inspect(args),
    }
}

fn handle_merge(args: MergeArgs) -> Result<()> {
    let params = build_params(&args)?;
    info!("Merge parameters {}", params.fingerprint()?);
    let time = TimeConfig::from_inputs(
        args.date.as_deref().unwrap_or(""),
        args.time.as_deref().unwrap_or(""),
        &args.interval,
        args.interval_unit.into(),
    )?;
    if time.start.is_none() && (args.date.is_some() || args.time.is_some()) {
        warn!("Both --date and --time are needed to regenerate timestamps; keeping source times");
    }

    let mut session = Session::new(params);

    let t_load = Instant::now();
    log_report(&session.load_primary(read_input(&args.primary)?));
    if session.primary().is_empty() {
        return Err(anyhow!(
            "{} has no usable track records",
            args.primary.display()
        ));
    }

    let overlays = args
        .overlay
        .iter()
        .map(|path| read_input(path))
        .collect::<Result<Vec<_>>>()?;
    let overlay_reports = session.load_overlays(overlays);
    for report in &overlay_reports {
        log_report(report);
    }
    info!(
        "Load stage: {:.1} ms",
        t_load.elapsed().as_secs_f64() * 1000.0
    );

    let t_merge = Instant::now();
    let outcome = session.execute(&time)?;
    info!(
        "Merged {} records ({} overlay matches, {} dropped overlay rows, {} depths filled) in {:.1} ms",
        outcome.records.len(),
        outcome.join.matched,
        outcome.join.unmatched,
        outcome.fill.filled,
        t_merge.elapsed().as_secs_f64() * 1000.0
    );

    if let Some(report_path) = args.report.as_ref() {
        let text = serde_json::to_string_pretty(&merge_report(&session, &overlay_reports))?;
        fs::write(report_path, text)
            .with_context(|| format!("failed to write {}", report_path.display()))?;
        info!("Wrote report: {}", report_path.display());
    }

    if let Some(edit_path) = args.edit.as_ref() {
        let edited = fs::read_to_string(edit_path)
            .with_context(|| format!("failed to read {}", edit_path.display()))?;
        session.edit_preview(edited);
        info!("Preview replaced with {}", edit_path.display());
    }

    if args.output.as_os_str() == "-" {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle.write_all(session.preview().as_bytes())?;
        handle.write_all(b"\n")?;
        return Ok(());
    }

    fs::create_dir_all(&args.output)
        .with_context(|| format!("failed to create {}", args.output.display()))?;
    let receipt = session
        .export(&args.output)
        .with_context(|| format!("failed to export into {}", args.output.display()))?;
    info!(
        "Wrote {} ({} bytes, sha256 {})",
        receipt.path.display(),
        receipt.bytes,
        receipt.sha256
    );
    Ok(())
}

fn merge_report(session: &Session, overlay_reports: &[ParseReport]) -> serde_json::Value {
    let outcome = session.outcome();
    serde_json::json!({
        "params": session.params(),
        "primary": session.primary_report(),
        "overlays": overlay_reports,
        "join": outcome.map(|o| &o.join),
        "fill": outcome.map(|o| &o.fill),
    })
}

fn build_params(args: &MergeArgs) -> Result<MergeParams> {
    let mut params = match args.config.as_ref() {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            MergeParams::from_json_str(&text)
                .with_context(|| format!("invalid config {}", path.display()))?
        }
        None => MergeParams::default(),
    };
    if let Some(mode) = args.key_mode {
        params.key_mode = match mode {
            KeyModeOpt::Exact => KeyMode::Exact,
            KeyModeOpt::Numeric => KeyMode::Numeric {
                decimals: args.key_decimals,
            },
        };
    }
    if args.depth_decimals.is_some() {
        params.depth_decimals = args.depth_decimals;
    }
    if args.seed.is_some() {
        params.seed = args.seed;
    }
    params.validate()?;
    Ok(params)
}

fn read_input(path: &Path) -> Result<InputFile> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(InputFile::new(name, bytes))
}

fn log_report(report: &ParseReport) {
    if let Some(err) = report.error.as_ref() {
        warn!("{}: {}", report.file, err);
        return;
    }
    if report.is_clean() {
        info!("{}: {} rows", report.file, report.rows);
        return;
    }
    info!(
        "{}: {} rows, {} skipped",
        report.file,
        report.rows,
        report.issues.len()
    );
    for issue in report.issues.iter().take(10) {
        warn!("{} row {}: {}", report.file, issue.row, issue.message);
    }
    if report.issues.len() > 10 {
        warn!(
            "{}: {} more row issues not shown",
            report.file,
            report.issues.len() - 10
        );
    }
}

fn handle_inspect(args: InspectArgs) -> Result<()> {
    let mut out = String::new();
    for (file_index, path) in args.inputs.iter().enumerate() {
        let input = read_input(path)?;
        let report = if args.primary {
            match parse_primary(&input) {
                Ok((_, report)) => report,
                Err(err) => ParseReport::failed(&input.name, &err),
            }
        } else {
            match parse_overlay(&input, file_index) {
                Ok(batch) => batch.report,
                Err(err) => ParseReport::failed(&input.name, &err),
            }
        };
        out.push_str(&format_report(&report));
    }
    print!("{out}");
    Ok(())
}

fn format_report(report: &ParseReport) -> String {
    let mut text = format!("FILE: {}\n", report.file);
    match report.error.as_ref() {
        Some(err) => text.push_str(&format!("  error: {err}\n")),
        None => {
            text.push_str(&format!("  rows: {}\n", report.rows));
            if report.is_clean() {
                text.push_str("  clean\n");
            } else {
                text.push_str("  issues:\n");
                for issue in &report.issues {
                    text.push_str(&format!("    - row {}: {}\n", issue.row, issue.message));
                }
            }
        }
    }
    text.push('\n');
    text
}
