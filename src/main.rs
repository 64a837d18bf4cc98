//! redsift - extract subreddit records from compressed Reddit dumps.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use redsift::extract::{self, DEFAULT_WORK_DIR_NAME, ExtractConfig};
use redsift::logging::{self, LogLevel};
use redsift::predicate::DEFAULT_FIELD;
use redsift::runner::default_threads;
use redsift::verify::{self, VerifyOptions, VerifyOutcome};
use redsift::{Algorithm, CodecConfig, Predicate, filter_archive};
use tracing::info;

/// redsift - extract subreddit records from compressed Reddit dumps
#[derive(Parser, Debug)]
#[command(name = "redsift")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Print lots of messages (same as --log-level debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, global = true, default_value = "info")]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Filter every archive of a directory in parallel and merge the results
    ExtractDir(ExtractDirArgs),

    /// Filter a single archive
    ExtractOne(ExtractOneArgs),

    /// Compare a file or directory of archives with an extracted file
    Verify(VerifyArgs),
}

#[derive(Args, Debug)]
struct FilterArgs {
    /// The subreddit to filter by (case-insensitive)
    #[arg(short, long)]
    subreddit: Option<String>,

    /// Record field compared against --subreddit
    #[arg(long, default_value = DEFAULT_FIELD)]
    field: String,
}

impl FilterArgs {
    fn predicate(&self) -> Predicate {
        Predicate::on_field(&self.field, self.subreddit.as_deref())
    }
}

#[derive(Args, Debug)]
struct ExtractDirArgs {
    /// Directory containing compressed reddit data
    #[arg(short, long)]
    in_dir: PathBuf,

    /// Directory for intermediate results [default: <system temp>/reddit_extract]
    #[arg(short = 'T', long)]
    temp_dir: Option<PathBuf>,

    /// File in which to store filtered output
    #[arg(short, long)]
    out_file: PathBuf,

    #[command(flatten)]
    filter: FilterArgs,

    /// Level of compression to apply to final output
    #[arg(short = 'c', long)]
    final_compression_level: Option<i32>,

    /// Level of compression to apply to intermediate output
    #[arg(short = 'C', long)]
    intermed_compression_level: Option<i32>,

    /// Compression algorithm to apply to intermediate output
    #[arg(short = 'a', long, value_enum, default_value_t = Algorithm::Zst)]
    intermed_compression_algo: Algorithm,

    /// Number of threads to use [default: available cores - 1]
    #[arg(short, long)]
    threads: Option<usize>,

    /// Resume previous run
    #[arg(short, long)]
    resume: bool,
}

#[derive(Args, Debug)]
struct ExtractOneArgs {
    in_file: PathBuf,
    out_file: PathBuf,

    /// Level of compression to apply to output
    #[arg(short = 'c', long)]
    final_compression_level: Option<i32>,

    #[command(flatten)]
    filter: FilterArgs,
}

#[derive(Args, Debug)]
struct VerifyArgs {
    /// Original directory/file containing compressed reddit data
    input_a: PathBuf,

    /// File to verify
    input_b: PathBuf,

    // Applied to input_a only.
    #[command(flatten)]
    filter: FilterArgs,

    /// Start with the given file and align the file to verify with its first record
    #[arg(long)]
    skip_to: Option<String>,

    /// Skip this many records of both inputs
    #[arg(long)]
    skip_iter: Option<u64>,

    /// Print the number of records in the file to verify and exit
    #[arg(long)]
    diag: bool,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let level = if cli.verbose {
        LogLevel::Debug
    } else {
        cli.log_level
    };
    logging::init(level)?;

    match cli.command {
        Commands::ExtractDir(args) => extract_dir(args),
        Commands::ExtractOne(args) => extract_one(args),
        Commands::Verify(args) => verify_cmd(args),
    }
}

fn extract_dir(args: ExtractDirArgs) -> Result<ExitCode> {
    let config = ExtractConfig {
        work_dir: args
            .temp_dir
            .unwrap_or_else(|| std::env::temp_dir().join(DEFAULT_WORK_DIR_NAME)),
        predicate: args.filter.predicate(),
        threads: args.threads.unwrap_or_else(default_threads),
        intermediate: CodecConfig::new(
            args.intermed_compression_algo,
            args.intermed_compression_level,
        ),
        final_level: args.final_compression_level,
        resume: args.resume,
        input_dir: args.in_dir,
        output: args.out_file,
    };
    let summary = extract::run(&config)
        .with_context(|| format!("extraction from {} failed", config.input_dir.display()))?;
    info!(
        processed = summary.processed,
        resumed = summary.resumed,
        records = summary.records,
        output = %config.output.display(),
        "done"
    );
    Ok(ExitCode::SUCCESS)
}

fn extract_one(args: ExtractOneArgs) -> Result<ExitCode> {
    let stats = filter_archive(
        &args.in_file,
        &args.out_file,
        &args.filter.predicate(),
        args.final_compression_level,
        None,
    )
    .with_context(|| format!("filtering {} failed", args.in_file.display()))?;
    info!(read = stats.read, kept = stats.kept, output = %args.out_file.display(), "done");
    Ok(ExitCode::SUCCESS)
}

fn verify_cmd(args: VerifyArgs) -> Result<ExitCode> {
    if args.diag {
        let n = verify::count_records(&args.input_b)?;
        println!("Posts in {}: {n}", args.input_b.display());
        return Ok(ExitCode::SUCCESS);
    }

    let options = VerifyOptions {
        predicate: args.filter.predicate(),
        skip_to: args.skip_to,
        skip_iter: args.skip_iter,
    };
    let outcome = verify::verify(&args.input_a, &args.input_b, &options)?;
    match outcome {
        VerifyOutcome::Equal { compared } => {
            info!(compared, "inputs are equal");
            Ok(ExitCode::SUCCESS)
        }
        VerifyOutcome::Mismatch { index, left, right } => {
            println!("Not equal at record {index}:");
            println!("{right}");
            println!("{left}");
            Ok(ExitCode::FAILURE)
        }
        VerifyOutcome::LengthMismatch { compared, exhausted } => {
            println!("Inputs differ in length: {exhausted:?} ended after {compared} records");
            Ok(ExitCode::FAILURE)
        }
    }
}
