//! Similarity scoring binary.
//!
//! Usage:
//!   similarity --input math_analysis.csv --models qwen2.5:1.5b,qwen2.5:14b
//!
//! Options:
//!   --reference-column <NAME>   # Official solution column (default: solution)
//!   --embedding-model <ID>      # Override the per-dataset encoder choice
//!   --max-tokens <N>            # Tokens per window (default from config)
//!   --output <path>             # Defaults to <input stem>_cosine.csv

use answer_eval::config::{Config, is_math_dataset};
use answer_eval::dataset::Table;
use answer_eval::interrupt::Interrupt;
use answer_eval::judge::DEFAULT_MODELS;
use answer_eval::similarity::{BertEncoder, ScoringPlan, SimilarityScorer, default_output_path};
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "similarity")]
#[command(about = "Score model answers against official solutions by embedding similarity", long_about = None)]
struct Cli {
    /// Merged analysis table (CSV)
    #[arg(short, long)]
    input: PathBuf,

    /// Models to score, comma-separated
    #[arg(short, long, value_delimiter = ',', default_values_t = DEFAULT_MODELS.map(String::from))]
    models: Vec<String>,

    /// Official solution column (matched ignoring case)
    #[arg(long, default_value = "solution")]
    reference_column: String,

    /// Hugging Face model id of the encoder
    #[arg(long)]
    embedding_model: Option<String>,

    /// Tokens per window
    #[arg(long)]
    max_tokens: Option<usize>,

    /// Output CSV file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = Config::load().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    let model_id = cli
        .embedding_model
        .unwrap_or_else(|| config.embedding.model_for_dataset(&cli.input).to_string());
    let max_tokens = cli.max_tokens.unwrap_or(config.embedding.max_tokens);
    let output = cli.output.unwrap_or_else(|| default_output_path(&cli.input));

    println!("Input:    {}", cli.input.display());
    println!("Encoder:  {}", model_id);
    println!("Models:   {}", cli.models.join(", "));

    let table = Table::from_csv_path(&cli.input).context("Failed to load analysis table")?;
    let plan = ScoringPlan::resolve(
        &table,
        &cli.models,
        &cli.reference_column,
        is_math_dataset(&cli.input),
    )?;

    println!("Loading encoder...");
    let encoder = BertEncoder::load(&model_id, max_tokens).context("Failed to load encoder")?;

    let interrupt = Interrupt::install()?;
    let scorer = SimilarityScorer::new(encoder).with_interrupt(interrupt);

    let start = Instant::now();
    let report = scorer.score(&table, &plan);
    report.write_csv(&output).context("Failed to write similarity results")?;

    println!();
    println!("Similarity Results");
    println!("{}", "─".repeat(50));
    for scores in report.models() {
        let valid: Vec<f64> = scores.scores.iter().copied().filter(|s| s.is_finite()).collect();
        let mean = if valid.is_empty() {
            f64::NAN
        } else {
            valid.iter().sum::<f64>() / valid.len() as f64
        };
        println!(
            "  {:<24} mean {:.4}  ({} of {} rows scored)",
            scores.model,
            mean,
            valid.len(),
            report.row_count()
        );
    }
    println!("{}", "─".repeat(50));
    if !report.complete {
        println!("Interrupted; partial results saved.");
    }
    println!("Saved to {} in {:.2?}", output.display(), start.elapsed());

    Ok(())
}
