//! csvmerge3 — three-way merge of CSV files keyed by a primary-key column.
//!
//! Reads a common ancestor and two descendants, merges both sides' row and
//! column edits, and writes the result to stdout or a file. Incompatible
//! edits become `>>>>>>` / `======` / `<<<<<<` conflict blocks for a human
//! to resolve; their presence is reported through the exit code.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use csvmerge3::config::{CONFIG_FILE, ToolConfig};
use csvmerge3::csv::{LineTerminator, QuoteStyle};
use csvmerge3::error::{EXIT_CONFLICTS, EXIT_IO, MergeError};
use csvmerge3::{MergeInput, MergeOptions, MergeSummary, merge3};

/// Three-way CSV merge
///
/// Merges two descendants of a common ancestor file, matching rows by the
/// value of a primary-key column. Rows edited on only one side carry the
/// edit; rows edited compatibly on both sides merge field by field; rows
/// edited incompatibly become conflict blocks in the output.
///
/// Unchanged rows keep their original formatting byte for byte (see
/// --reformat-all). Exit code 0 means a clean merge; 1 means the output
/// contains conflict blocks; higher codes are fatal input or I/O errors.
///
/// Defaults for --key, --quote and --lineterminator may be placed in a
/// .csvmerge3.toml file in the working directory.
#[derive(Parser)]
#[command(name = "csvmerge3")]
#[command(version, about)]
struct Cli {
    /// Common-ancestor CSV file
    file_lca: PathBuf,

    /// First descendant (side A)
    file_a: PathBuf,

    /// Second descendant (side B)
    file_b: PathBuf,

    /// Primary-key column name; `|`-separated alternatives are tried in
    /// order, and the token `[auto]` asks for automatic guessing
    #[arg(short, long)]
    key: Option<String>,

    /// Field quoting style for re-encoded output rows
    #[arg(short, long, value_name = "minimal|all|nonnumeric|none")]
    quote: Option<QuoteStyle>,

    /// Line termination for re-encoded output rows
    #[arg(short, long, value_name = "unix|dos|native")]
    lineterminator: Option<LineTerminator>,

    /// Reformat every output row (default reformats only changed rows)
    #[arg(short, long)]
    reformat_all: bool,

    /// Enable debug logging to stderr
    #[arg(short, long)]
    debug: bool,

    /// Write the merged result to this file (default is stdout)
    #[arg(short, long)]
    output_file: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.debug);

    match run(&cli) {
        Ok(summary) => {
            if summary.is_clean() {
                ExitCode::SUCCESS
            } else {
                exit_code(EXIT_CONFLICTS)
            }
        }
        Err(err) => {
            eprintln!("csvmerge3: error: {err:#}");
            let code = err
                .downcast_ref::<MergeError>()
                .map_or(EXIT_IO, MergeError::exit_code);
            exit_code(code)
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(code as u8)
}

/// Debug flag wins; otherwise `RUST_LOG` decides, defaulting to warnings.
fn init_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("csvmerge3=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: &Cli) -> Result<MergeSummary> {
    let config = ToolConfig::load(Path::new(CONFIG_FILE)).map_err(|e| anyhow::anyhow!("{e}"))?;

    let Some(key) = cli.key.clone().or(config.merge.key) else {
        // The exit contract groups "no key given" with "key column absent".
        return Err(MergeError::MissingKeyColumn {
            spec: "(none given; use --key or [merge] key in .csvmerge3.toml)".to_owned(),
        }
        .into());
    };

    let options = MergeOptions {
        key,
        quote: cli.quote.or(config.output.quote).unwrap_or_default(),
        terminator: cli
            .lineterminator
            .or(config.output.lineterminator)
            .unwrap_or_default(),
        reformat_all: cli.reformat_all || config.output.reformat_all,
    };

    let text_lca = read_input(&cli.file_lca)?;
    let text_a = read_input(&cli.file_a)?;
    let text_b = read_input(&cli.file_b)?;

    let name_lca = cli.file_lca.display().to_string();
    let name_a = cli.file_a.display().to_string();
    let name_b = cli.file_b.display().to_string();
    let lca = MergeInput::new(&name_lca, &text_lca);
    let a = MergeInput::new(&name_a, &text_a);
    let b = MergeInput::new(&name_b, &text_b);

    match &cli.output_file {
        Some(path) => merge_to_file(lca, a, b, &options, path),
        None => {
            let stdout = std::io::stdout().lock();
            let summary = merge3(lca, a, b, &options, std::io::BufWriter::new(stdout))?;
            Ok(summary)
        }
    }
}

fn read_input(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .map_err(MergeError::from)
        .with_context(|| format!("reading {}", path.display()))
}

/// Merge into a temporary file first, then copy over the destination. The
/// destination may be one of the inputs; a failing merge must never
/// truncate it.
fn merge_to_file(
    lca: MergeInput<'_>,
    a: MergeInput<'_>,
    b: MergeInput<'_>,
    options: &MergeOptions,
    path: &Path,
) -> Result<MergeSummary> {
    let mut temp = tempfile::NamedTempFile::new()
        .map_err(MergeError::from)
        .context("creating temporary output file")?;

    let summary = merge3(lca, a, b, options, std::io::BufWriter::new(temp.as_file_mut()))?;

    temp.as_file_mut()
        .flush()
        .map_err(MergeError::from)
        .context("flushing temporary output file")?;
    std::fs::copy(temp.path(), path)
        .map_err(MergeError::from)
        .with_context(|| format!("writing {}", path.display()))?;

    Ok(summary)
}
