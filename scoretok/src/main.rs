// scoretok — CLI entry point.
//
// Subcommands map one-to-one onto the stages in `pipeline.rs`:
//
//   scoretok prep     tokenized documents → raw store, bigram tables,
//                     merge tree, compressed store
//   scoretok render   replay a token sequence (a compressed corpus document
//                     or a JSON id array) into MusicXML
//   scoretok sample   decode a fresh document from a seeded follower sampler
//   scoretok inspect  summarize saved artifacts
//
// Usage:
//   scoretok [-v|-q] [--config pipeline.json] [--data-root DIR] <command> ...
//
// Settings come from the JSON config (defaults when omitted); flags given
// here override the matching config fields. Log verbosity follows `-v`/`-q`,
// or `RUST_LOG` when neither is given.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{self, PathBuf};
use std::process::ExitCode;

use clap::{ArgAction, Args, Parser, Subcommand};
use env_logger::Env;
use log::LevelFilter;

use scoretok::interpreter::DOCUMENT_PROLOGUE;
use scoretok::pipeline::{compressed_document, inspect, prepare, read_token_file, render, sample};
use scoretok::{DecodeReport, PipelineConfig, Result};

#[derive(Parser, Debug)]
#[command(author, version, about = "MusicXML token pipeline", long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Decrease verbosity (-q, -qq)
    #[arg(short = 'q', long, global = true, action = ArgAction::Count)]
    quiet: u8,

    /// Pipeline config JSON
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Override the config's data_root
    #[arg(long, global = true, value_name = "DIR")]
    data_root: Option<PathBuf>,

    /// Override the config's worker count (0 = every core)
    #[arg(long, global = true, value_name = "N")]
    threads: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ingest documents, grow the vocabulary and rewrite the corpus
    Prep(PrepArgs),
    /// Reconstruct MusicXML from a token sequence
    Render(RenderArgs),
    /// Decode a new document from a seeded sampler
    Sample(SampleArgs),
    /// Summarize saved artifacts
    Inspect(InspectArgs),
}

#[derive(Args, Debug)]
struct PrepArgs {
    /// Tokenized documents (JSON lines)
    #[arg(long, value_name = "PATH")]
    documents: Option<PathBuf>,

    /// Target vocabulary size, base tokens included
    #[arg(long, value_name = "SIZE")]
    vocab_size: Option<usize>,

    /// Maximum ints loaded for vocabulary growth
    #[arg(long, value_name = "INTS")]
    token_budget: Option<usize>,

    /// Disable progress bars
    #[arg(long)]
    no_progress: bool,
}

#[derive(Args, Debug)]
struct OutputArgs {
    /// Write markup here instead of stdout
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Keep a well-formed snapshot of the document in progress here
    #[arg(long, value_name = "PATH")]
    live: Option<PathBuf>,

    /// Element depth table replacing the built-in MusicXML one
    #[arg(long, value_name = "PATH")]
    indent_table: Option<PathBuf>,

    /// Most tokens accepted after the start token
    #[arg(long, value_name = "N")]
    max_steps: Option<usize>,
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// JSON array of token ids; defaults to a compressed corpus document
    #[arg(long, value_name = "PATH")]
    tokens: Option<PathBuf>,

    /// Index of the compressed corpus document to render
    #[arg(long, value_name = "INDEX", default_value_t = 0)]
    document: usize,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Args, Debug)]
struct SampleArgs {
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Most proposals per step before giving up
    #[arg(long, value_name = "N")]
    max_attempts: Option<usize>,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Args, Debug)]
struct InspectArgs {
    /// How many of the newest merges to list
    #[arg(long, value_name = "N", default_value_t = 10)]
    recent: usize,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8, quiet: u8) {
    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or("info"));
    builder.format_timestamp_millis();
    let level = match (quiet, verbose) {
        (0, 0) => None,
        (1, _) => Some(LevelFilter::Warn),
        (q, _) if q > 1 => Some(LevelFilter::Error),
        (_, 1) => Some(LevelFilter::Debug),
        _ => Some(LevelFilter::Trace),
    };
    if let Some(level) = level {
        builder.filter_level(level);
    }
    let _ = builder.try_init();
}

fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(root) = cli.data_root {
        config.data_root = root;
    }
    if let Some(threads) = cli.threads {
        config.parallelism = threads;
    }

    match cli.command {
        Commands::Prep(args) => {
            if let Some(documents) = args.documents {
                config.documents = path::absolute(documents)?;
            }
            if let Some(size) = args.vocab_size {
                config.target_vocab_size = size;
            }
            if let Some(budget) = args.token_budget {
                config.token_budget = budget;
            }
            if args.no_progress {
                config.show_progress = false;
            }
            config.validate()?;
            run_prep(&config)
        }
        Commands::Render(args) => {
            apply_output_overrides(&mut config, &args.output)?;
            config.validate()?;
            let tokens = match &args.tokens {
                Some(path) => read_token_file(path)?,
                None => compressed_document(&config, args.document)?,
            };
            let report = render(&config, &tokens, open_output(&args.output)?)?;
            summarize(&report);
            Ok(())
        }
        Commands::Sample(args) => {
            apply_output_overrides(&mut config, &args.output)?;
            if let Some(attempts) = args.max_attempts {
                config.max_decode_attempts = attempts;
            }
            config.validate()?;
            let report = sample(&config, args.seed, open_output(&args.output)?)?;
            summarize(&report);
            Ok(())
        }
        Commands::Inspect(args) => run_inspect(&config, args.recent),
    }
}

fn run_prep(config: &PipelineConfig) -> Result<()> {
    println!("=== scoretok prep ===");
    println!("Data root: {}", config.data_root.display());
    println!("Target vocabulary: {}", config.target_vocab_size);
    println!("Workers: {}", config.worker_count());
    println!();

    let report = prepare(config)?;

    println!();
    println!("Documents:  {}", report.documents);
    println!("Vocabulary: {} -> {}", report.base_size, report.vocab_size);
    println!(
        "Corpus:     {} -> {} ints ({:.1}%)",
        report.raw_ints,
        report.compressed_ints,
        report.ratio() * 100.0
    );
    println!("Merge tree: {}", config.tokens_path().display());
    Ok(())
}

fn run_inspect(config: &PipelineConfig, recent: usize) -> Result<()> {
    let report = inspect(config, recent)?;
    let store = |len: Option<u64>| len.map_or_else(|| "missing".to_string(), |n| format!("{n} ints"));

    println!("Vocabulary:     {} base, {} total", report.base_size, report.vocab_size);
    println!("Sentinel:       {}", report.sentinel);
    match report.start_token {
        Some(start) => println!(
            "Start token:    {start} ({} composite variants)",
            report.start_variants
        ),
        None => println!("Start token:    none"),
    }
    println!(
        "Bigram edges:   {} tok2tok, {} tag2tag",
        report.tok2tok_edges, report.tag2tag_edges
    );
    println!("Raw store:      {}", store(report.raw_ints));
    println!("Compressed:     {}", store(report.compressed_ints));
    if !report.recent_merges.is_empty() {
        println!();
        println!("Newest merges:");
        for (id, text) in &report.recent_merges {
            println!("  {id:>6}  {text}");
        }
    }
    Ok(())
}

/// Paths given on the command line are relative to the working directory,
/// not to `data_root`.
fn apply_output_overrides(config: &mut PipelineConfig, args: &OutputArgs) -> Result<()> {
    if let Some(live) = &args.live {
        config.live_output = Some(path::absolute(live)?);
    }
    if let Some(table) = &args.indent_table {
        config.indent_table = Some(path::absolute(table)?);
    }
    if let Some(steps) = args.max_steps {
        config.max_decode_steps = steps;
    }
    Ok(())
}

/// Output sink with the document prologue already written.
fn open_output(args: &OutputArgs) -> Result<Box<dyn Write>> {
    let mut out: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(io::stdout().lock()),
    };
    out.write_all(DOCUMENT_PROLOGUE.as_bytes())?;
    Ok(out)
}

fn summarize(report: &DecodeReport) {
    // Markup went to stdout; keep the summary off it.
    eprintln!();
    eprintln!(
        "{} tokens accepted, {} rejected, stopped: {:?}",
        report.accepted.len(),
        report.rejections.len(),
        report.stop
    );
}
