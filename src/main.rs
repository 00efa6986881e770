//! PDF QA Bench CLI
//!
//! Extract, question and grade PDFs with interchangeable extraction strategies.

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use pdf_qa_bench::{
    answer::AnswerFanout,
    config::{Config, ConversationMode},
    driver::BatchDriver,
    judge::{ScoringClient, Verdict, accuracy},
    llm::{EmbeddingClient, LlmClient},
    metrics::{MetricsRecorder, MetricsStore},
    results::{ScoredRecord, read_answers, scored_path, write_answers, write_scored},
    search::search_document,
    strategy::StrategyRegistry,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// PDF QA Bench - benchmark PDF extraction by how well LLMs answer from it
#[derive(Parser)]
#[command(name = "pdf-qa-bench")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every extraction strategy over every input PDF and record metrics
    Extract {
        /// Folder of source documents
        #[arg(default_value = "input_data")]
        input: PathBuf,

        /// Folder for per-document artifacts
        #[arg(short, long, default_value = "output_data")]
        output: PathBuf,

        /// Only run the named strategies (repeatable)
        #[arg(long)]
        only: Vec<String>,

        /// Wait for Enter after each failed strategy
        #[arg(long)]
        pause_on_error: bool,
    },

    /// Ask the question sets against every extracted artifact
    Answer {
        /// Folder of per-document artifacts
        #[arg(default_value = "output_data")]
        output: PathBuf,

        /// Folder holding <stem>_questions.json files
        #[arg(short, long, default_value = "input_data/questions")]
        questions: PathBuf,

        /// Answering models, overriding the configuration (repeatable)
        #[arg(short, long)]
        model: Vec<String>,

        /// Ask each question with only the document as context
        #[arg(long)]
        independent: bool,
    },

    /// Grade an answers table with the judge model
    Score {
        /// Answers table written by `answer`
        answers: PathBuf,

        /// Scored table path (defaults to <answers>_scored.csv)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Rank one document's artifact chunks against a query by embedding similarity
    Search {
        /// The search query
        query: String,

        /// Per-document artifact folder, e.g. output_data/report
        #[arg(short, long)]
        document: PathBuf,

        /// Number of results to return
        #[arg(short = 'k', long, default_value_t = 5)]
        top_k: usize,
    },

    /// List the registered extraction strategies
    Strategies,

    /// Test LLM connection
    Test,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Extract {
            input,
            output,
            only,
            pause_on_error,
        } => cmd_extract(config, input, output, only, pause_on_error).await,
        Commands::Answer {
            output,
            questions,
            model,
            independent,
        } => cmd_answer(config, output, questions, model, independent).await,
        Commands::Score { answers, output } => cmd_score(config, answers, output).await,
        Commands::Search {
            query,
            document,
            top_k,
        } => cmd_search(config, query, document, top_k).await,
        Commands::Strategies => cmd_strategies(config),
        Commands::Test => cmd_test(config).await,
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "pdf_qa_bench=info",
        1 => "pdf_qa_bench=debug",
        _ => "pdf_qa_bench=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn cmd_extract(
    config: Config,
    input: PathBuf,
    output: PathBuf,
    only: Vec<String>,
    pause_on_error: bool,
) -> Result<()> {
    let mut registry = StrategyRegistry::standard(&config).context("Failed to build strategy registry")?;
    if !only.is_empty() {
        registry = registry.retain_only(&only)?;
    }

    let metrics_file = config.paths.metrics_file_for(&output);
    println!("Extracting: {}", input.display());
    println!("Strategies: {}", registry.names().join(", "));
    println!("Metrics:    {}", metrics_file.display());

    let store = MetricsStore::new(metrics_file, config.retry.clone());
    let mut driver = BatchDriver::new(registry, MetricsRecorder::new(store), config.retry.clone())
        .with_pause_on_error(pause_on_error);

    let start = Instant::now();
    let report = driver
        .run_all(&input, &output)
        .await
        .context("Extraction run failed")?;

    report.print_summary();
    println!("Finished in {:.2?}", start.elapsed());
    Ok(())
}

async fn cmd_answer(
    mut config: Config,
    output: PathBuf,
    questions: PathBuf,
    models: Vec<String>,
    independent: bool,
) -> Result<()> {
    if !models.is_empty() {
        config.answer.models = models;
    }
    if independent {
        config.answer.mode = ConversationMode::Independent;
    }
    config.validate().context("Invalid configuration")?;

    println!("Answering from: {}", output.display());
    println!("Models:         {}", config.answer.models.join(", "));
    println!("Mode:           {:?}", config.answer.mode);

    let workers = config.answer_workers();
    let backend = Arc::new(LlmClient::new(config.llm.clone()));
    let fanout = AnswerFanout::new(backend, config.answer.clone(), workers);

    let start = Instant::now();
    let run = fanout
        .run(&output, &questions)
        .await
        .context("Answering run failed")?;

    let path = write_answers(&config.paths.results_dir, &run.records, &config.retry)
        .context("Failed to write answers table")?;

    run.print_summary();
    println!("Answers saved to: {}", path.display());
    println!("Finished in {:.2?}", start.elapsed());
    Ok(())
}

async fn cmd_score(config: Config, answers: PathBuf, output: Option<PathBuf>) -> Result<()> {
    config.validate().context("Invalid configuration")?;

    let rows = read_answers(&answers).context("Failed to read answers table")?;
    println!("Scoring {} answers with {}", rows.len(), config.judge.model);

    let backend = Arc::new(LlmClient::new(config.llm.clone()));
    let judge = ScoringClient::new(backend, config.judge.model.clone());

    let start = Instant::now();
    let verdicts = judge
        .score_table(&rows, config.judge_workers(), config.judge.samples)
        .await;

    let scored: Vec<ScoredRecord> = rows
        .into_iter()
        .zip(verdicts.iter().copied())
        .map(|(row, verdict)| ScoredRecord::new(row, verdict))
        .collect();

    let path = output.unwrap_or_else(|| scored_path(&answers));
    write_scored(&path, &scored, &config.retry).context("Failed to write scored table")?;

    let failed = verdicts.iter().filter(|v| **v == Verdict::Failed).count();
    println!("\nScored table saved to: {}", path.display());
    match accuracy(&verdicts) {
        Some(acc) => println!("  Accuracy:      {:.1}%", acc * 100.0),
        None => println!("  Accuracy:      n/a"),
    }
    println!("  Judge errors:  {}", failed);
    println!("  Time:          {:.2?}", start.elapsed());
    Ok(())
}

async fn cmd_search(config: Config, query: String, document: PathBuf, top_k: usize) -> Result<()> {
    config.validate().context("Invalid configuration")?;

    let embedder = EmbeddingClient::new(&config.llm, &config.embeddings);
    println!("Searching {} for: \"{}\"", document.display(), query);
    println!("Using embedding model: {}", config.embeddings.model);
    println!();

    let start = Instant::now();
    let outcome = search_document(&document, &query, &embedder, &config.embeddings, top_k)
        .await
        .context("Search failed")?;

    if outcome.hits.is_empty() {
        println!("No chunks found.");
    } else {
        println!("Results:");
        println!("{}", "─".repeat(60));
        for (i, hit) in outcome.hits.iter().enumerate() {
            println!("{:>2}. {} [{:.3}]", i + 1, hit.chunk.source, hit.score);
            let preview: String = hit.chunk.text.chars().take(200).collect();
            for line in preview.lines().take(3) {
                println!("      {}", line);
            }
            println!();
        }
        println!("{}", "─".repeat(60));
    }
    println!(
        "{} chunks, {} embedding tokens, {:.2?}",
        outcome.chunks,
        outcome.embedding_tokens,
        start.elapsed()
    );
    Ok(())
}

fn cmd_strategies(config: Config) -> Result<()> {
    let registry = StrategyRegistry::standard(&config)?;
    let example = Path::new("<output>/<stem>");

    println!("Registered strategies");
    println!("{}", "─".repeat(60));
    for descriptor in registry.iter() {
        println!(
            "  {:<20} {}",
            descriptor.name,
            descriptor.output_path(example).display()
        );
    }
    Ok(())
}

async fn cmd_test(config: Config) -> Result<()> {
    println!("Testing LLM connection...\n");

    println!("Configuration:");
    println!("  API Base:  {}", config.llm.api_base);
    println!("  Model:     {}", config.llm.model);
    println!("  Judge:     {}", config.judge.model);
    println!(
        "  API Key:   {}...",
        config.llm.api_key.chars().take(8).collect::<String>()
    );
    println!();

    if let Err(e) = config.validate() {
        println!("Configuration error: {}", e);
        return Ok(());
    }

    let client = LlmClient::new(config.llm);

    println!("Sending test request...");
    match client.test_connection().await {
        Ok(()) => println!("Connection successful!"),
        Err(e) => println!("Connection failed: {}", e),
    }

    Ok(())
}
