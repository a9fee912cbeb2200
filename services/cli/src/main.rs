//! `roleplay`: terminal client for the role-play trainer.

mod chat;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use roleplay_core::{
    ScenarioRegistry, SessionController,
    config::ProviderConfig,
    questions::{
        QuestionFormat, QuestionGenerator, join_sources, plan_topics, render_batch_export,
    },
};
use std::{path::PathBuf, sync::Arc};
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "roleplay")]
#[command(version, about = "Practice professional conversations with an AI role-play partner")]
struct Cli {
    #[command(flatten)]
    overrides: CompletionOverrides,

    #[command(subcommand)]
    command: Commands,
}

/// Per-invocation overrides of the `CHAT_*` environment settings.
#[derive(Args, Debug, Default)]
struct CompletionOverrides {
    /// Chat model name
    #[arg(long, global = true)]
    model: Option<String>,

    /// Sampling temperature in [0, 2]
    #[arg(long, global = true)]
    temperature: Option<f32>,

    /// Upper bound on reply tokens
    #[arg(long, global = true)]
    max_tokens: Option<u32>,
}

#[derive(Subcommand)]
enum Commands {
    /// List the available scenarios
    Scenarios,

    /// Start an interactive conversation
    Chat {
        /// Scenario key, e.g. `feedback` or `feedback@2`
        #[arg(long, short)]
        scenario: String,
    },

    /// Generate exam questions from a plain-text source document
    Questions(QuestionArgs),
}

#[derive(Args)]
struct QuestionArgs {
    /// Plain-text file the questions are drawn from; repeat to combine several
    #[arg(long, short, required = true)]
    input: Vec<PathBuf>,

    /// Topic title the questions must fit; omit to run every default topic
    #[arg(long, short)]
    topic: Option<String>,

    /// Questions per topic; defaults to the topic's catalogue count
    #[arg(long, short)]
    count: Option<u32>,

    /// mixed, open, multiple_choice or case_based
    #[arg(long, short, default_value_t = QuestionFormat::Mixed)]
    format: QuestionFormat,

    /// Output file; defaults to a timestamped name in the working directory
    #[arg(long, short)]
    output: Option<PathBuf>,
}

fn load_config(overrides: &CompletionOverrides) -> anyhow::Result<ProviderConfig> {
    dotenvy::dotenv().ok();
    let mut config = ProviderConfig::from_env().context("Failed to load configuration")?;
    if let Some(model) = &overrides.model {
        config.completion.model = model.clone();
    }
    if let Some(temperature) = overrides.temperature {
        config.completion.temperature = temperature;
    }
    if let Some(max_tokens) = overrides.max_tokens {
        config.completion.max_tokens = max_tokens;
    }
    config.completion.validate()?;
    Ok(config)
}

fn list_scenarios() {
    let registry = ScenarioRegistry::builtin();
    for scenario in registry.list() {
        println!(
            "{:<28} {:<48} {} / {}",
            scenario.key.to_string(),
            scenario.title,
            scenario.communication_type,
            scenario.social_role
        );
    }
}

async fn run_chat(config: ProviderConfig, scenario: &str) -> anyhow::Result<()> {
    let controller = SessionController::new(
        Arc::new(ScenarioRegistry::builtin()),
        config.build_executor(),
        config.completion.clone(),
    );
    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();
    let session = chat::run(&controller, scenario, stdin, &mut stdout).await?;
    info!(session_id = %session.id(), turns = session.turns().len(), "Chat finished");
    Ok(())
}

fn default_output_path(now: chrono::DateTime<chrono::Local>) -> PathBuf {
    PathBuf::from(format!(
        "EQF_Fragentext_{}.txt",
        now.format("%Y-%m-%d_%H-%M")
    ))
}

async fn run_questions(config: ProviderConfig, args: QuestionArgs) -> anyhow::Result<()> {
    let mut sources = Vec::with_capacity(args.input.len());
    for path in &args.input {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        sources.push(text);
    }
    let source_text = join_sources(&sources);

    let generator = QuestionGenerator::new(config.build_executor(), config.completion.model);
    let topics = plan_topics(args.topic.as_deref(), args.count);
    let outcomes = generator
        .generate_all(&source_text, &topics, args.format)
        .await;

    for outcome in &outcomes {
        match &outcome.result {
            Ok(questions) => println!("{}: {} questions", outcome.topic, questions.len()),
            Err(e) => eprintln!("{}: generation failed: {e}", outcome.topic),
        }
    }

    let export = render_batch_export(&outcomes);
    if export.is_empty() {
        anyhow::bail!("No questions were generated");
    }
    let output = args
        .output
        .unwrap_or_else(|| default_output_path(chrono::Local::now()));
    tokio::fs::write(&output, export)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!("Questions written to {}", output.display());
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // stdout carries the conversation, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Scenarios => list_scenarios(),
        Commands::Chat { scenario } => run_chat(load_config(&cli.overrides)?, &scenario).await?,
        Commands::Questions(args) => run_questions(load_config(&cli.overrides)?, args).await?,
    }
    Ok(())
}
