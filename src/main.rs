//! answer-eval CLI
//!
//! Batch answer generation and blind ranking against a local Ollama server.

use answer_eval::{
    backend::{GenerateOptions, OllamaClient},
    config::Config,
    dataset::{ColumnNames, QuestionSource, RowRange, Table, load_prompt},
    interrupt::Interrupt,
    judge::{
        BlindJudge, DEFAULT_LABELS, DEFAULT_MODELS, JudgeColumns, JudgePanel, JudgeRun,
        JudgeSchema, JudgeSettings, PlacementStats, load_outcomes,
    },
    runner::{AnswerSink, BatchRunner, PromptMode, SinkLayout, WriteMode},
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Evaluate locally served language models on a reference question set
#[derive(Parser)]
#[command(name = "answer-eval")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send every question to one model and record the answers
    Generate {
        /// Model to query
        #[arg(short, long)]
        model: String,

        /// Inclusive row range, e.g. 0:99
        #[arg(short, long)]
        range: Option<String>,

        /// Truncate the output file instead of appending
        #[arg(long)]
        reset_output: bool,

        /// Prompt template file
        #[arg(short, long, default_value = "prompt.txt")]
        prompt: PathBuf,

        /// Question source (.db/.sqlite/.sqlite3 for SQLite, otherwise CSV)
        #[arg(short, long)]
        questions: PathBuf,

        /// Table holding the questions in a SQLite source
        #[arg(long, default_value = "math_questions")]
        table: String,

        /// Question id column in the source
        #[arg(long, default_value = "id")]
        id_column: String,

        /// Question text column in the source
        #[arg(long, default_value = "problem")]
        text_column: String,

        /// Output CSV file
        #[arg(short, long)]
        output: PathBuf,

        /// Id column name in the output (defaults to --id-column)
        #[arg(long)]
        output_id_column: Option<String>,

        /// Repeat the question text in the output
        #[arg(long)]
        include_question: bool,

        /// Send the template as the system prompt instead of prepending it
        #[arg(long)]
        system_prompt_mode: bool,
    },

    /// Rank anonymized candidate answers with an arbiter model
    Judge {
        /// Merged answer table (CSV)
        #[arg(short, long)]
        input: PathBuf,

        /// Arbiter system prompt file
        #[arg(short, long)]
        system_prompt: PathBuf,

        /// Arbiter model (defaults to judge.arbiter_model from config)
        #[arg(short, long)]
        arbiter: Option<String>,

        /// Models under comparison, comma-separated
        #[arg(long, value_delimiter = ',', default_values_t = DEFAULT_MODELS.map(String::from))]
        models: Vec<String>,

        /// Labels shown to the arbiter, comma-separated
        #[arg(long, value_delimiter = ',', default_values_t = DEFAULT_LABELS.map(String::from))]
        labels: Vec<String>,

        /// Seed for the label draws (random if unset)
        #[arg(long)]
        seed: Option<u64>,

        /// Directory for the outcome JSON and summary CSV
        #[arg(short, long, default_value = "results")]
        output_dir: PathBuf,

        /// Question id column
        #[arg(long, default_value = "QuestionID")]
        id_column: String,

        /// Question text column
        #[arg(long, default_value = "Answer")]
        question_column: String,

        /// Official solution column
        #[arg(long, default_value = "Solution")]
        solution_column: String,
    },

    /// Show placement counts from a saved judge run
    Stats {
        /// judge_outputs_*.json file
        input: PathBuf,

        /// Models to report, comma-separated (defaults to every model in the file)
        #[arg(long, value_delimiter = ',')]
        models: Vec<String>,
    },

    /// Test the backend connection
    Test {
        /// Model to query
        #[arg(short, long, default_value = "qwen2.5:1.5b")]
        model: String,
    },
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn load_config() -> Result<Config> {
    let config = Config::load().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Generate {
            model,
            range,
            reset_output,
            prompt,
            questions,
            table,
            id_column,
            text_column,
            output,
            output_id_column,
            include_question,
            system_prompt_mode,
        } => {
            let range = range
                .as_deref()
                .map(str::parse::<RowRange>)
                .transpose()
                .context("Invalid --range")?;
            let columns = ColumnNames {
                id: id_column,
                text: text_column,
                ..Default::default()
            };
            let layout = SinkLayout {
                id_column: output_id_column.unwrap_or_else(|| columns.id.clone()),
                include_question,
            };
            let source = QuestionSource::from_path(questions, table, columns);
            let mode = if system_prompt_mode {
                PromptMode::System
            } else {
                PromptMode::Inline
            };
            cmd_generate(model, range, reset_output, prompt, source, output, layout, mode).await
        }
        Commands::Judge {
            input,
            system_prompt,
            arbiter,
            models,
            labels,
            seed,
            output_dir,
            id_column,
            question_column,
            solution_column,
        } => {
            let columns = JudgeColumns {
                id: id_column,
                question: question_column,
                solution: solution_column,
            };
            let panel = JudgePanel::new(models, labels).context("Invalid judge panel")?;
            cmd_judge(input, system_prompt, arbiter, panel, seed, output_dir, columns).await
        }
        Commands::Stats { input, models } => cmd_stats(input, models),
        Commands::Test { model } => cmd_test(model).await,
    }
}

#[allow(clippy::too_many_arguments)]
async fn cmd_generate(
    model: String,
    range: Option<RowRange>,
    reset_output: bool,
    prompt_path: PathBuf,
    source: QuestionSource,
    output: PathBuf,
    layout: SinkLayout,
    mode: PromptMode,
) -> Result<()> {
    let config = load_config()?;

    let template = load_prompt(&prompt_path).context("Failed to load prompt template")?;
    let questions = source.load().context("Failed to load questions")?;

    println!("Loaded {} questions from {}", questions.len(), source.path().display());
    println!("Model: {}", model);
    if let Some(range) = range {
        println!("Range: {}", range);
    }

    let mut sink = AnswerSink::open(&output, WriteMode::from_reset_flag(reset_output), layout)
        .context("Failed to open output file")?;

    let client = OllamaClient::new(&config.backend).context("Failed to create backend client")?;
    let interrupt = Interrupt::install()?;
    let runner = BatchRunner::new(client)
        .with_prompt_mode(mode)
        .with_interrupt(interrupt);

    let start = Instant::now();
    let summary = runner
        .run(&model, &questions, &template, range, &mut sink)
        .await
        .context("Batch run failed")?;

    println!();
    println!("Run summary");
    println!("{}", "─".repeat(40));
    println!("  Processed:  {}", summary.processed);
    println!("  Failed:     {}", summary.failed);
    println!("  Duration:   {:.2?}", start.elapsed());
    println!("  Output:     {}", sink.path().display());
    if summary.interrupted {
        println!("  Interrupted; rerun with --range to resume.");
    }

    Ok(())
}

async fn cmd_judge(
    input: PathBuf,
    system_prompt_path: PathBuf,
    arbiter: Option<String>,
    panel: JudgePanel,
    seed: Option<u64>,
    output_dir: PathBuf,
    columns: JudgeColumns,
) -> Result<()> {
    let mut config = load_config()?;
    if let Some(arbiter) = arbiter {
        config.judge.arbiter_model = arbiter;
    }

    let system_prompt = load_prompt(&system_prompt_path).context("Failed to load judge system prompt")?;
    let table = Table::from_csv_path(&input).context("Failed to load answer table")?;
    let schema = JudgeSchema::resolve(&table, &columns, panel.models())?;
    let questions = schema.questions(&table);

    println!("Judging {} questions from {}", questions.len(), input.display());
    println!("Arbiter: {}", config.judge.arbiter_model);
    println!("Models:  {}", panel.models().join(", "));

    let client = OllamaClient::new(&config.backend)
        .context("Failed to create backend client")?
        .with_options(GenerateOptions {
            temperature: Some(config.judge.temperature),
            top_p: Some(config.judge.top_p),
        });
    let rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let settings = JudgeSettings::from_config(&config.judge, system_prompt);
    let models = panel.models().to_vec();
    let mut run = JudgeRun::new(panel.len());

    let interrupt = Interrupt::install()?;
    let mut judge = BlindJudge::new(client, panel, settings, rng).with_interrupt(interrupt);
    let summary = judge.judge_all(&questions, &mut run).await;

    let saved = run.finalize(&output_dir).context("Failed to save judge results")?;

    println!();
    if summary.interrupted {
        println!("Interrupted; partial results saved.");
    }
    println!("Judge outputs:      {}", saved.outcomes_path.display());
    println!("Evaluation results: {}", saved.summary_path.display());
    println!();
    println!("{}", PlacementStats::from_outcomes(run.outcomes(), &models));

    Ok(())
}

fn cmd_stats(input: PathBuf, models: Vec<String>) -> Result<()> {
    let outcomes = load_outcomes(&input).context("Failed to load judge outputs")?;
    let models = if models.is_empty() {
        PlacementStats::models_in(&outcomes)
    } else {
        models
    };

    println!("Placement counts for {} questions", outcomes.len());
    println!("{}", "─".repeat(40));
    println!("{}", PlacementStats::from_outcomes(&outcomes, &models));

    Ok(())
}

async fn cmd_test(model: String) -> Result<()> {
    println!("Testing backend connection...\n");

    let config = Config::load().context("Failed to load configuration")?;

    println!("Configuration:");
    println!("  API Base:  {}", config.backend.api_base);
    println!("  Model:     {}", model);
    println!();

    if let Err(e) = config.validate() {
        println!("Configuration error: {}", e);
        return Ok(());
    }

    let client = OllamaClient::new(&config.backend)?;

    println!("Sending test request...");
    match client.test_connection(&model).await {
        Ok(reply) => {
            println!("Connection successful! Reply: {}", reply.trim());
        }
        Err(e) => {
            println!("Connection failed: {}", e);
        }
    }

    Ok(())
}
