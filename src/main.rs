//! stepbind CLI - run demo scenarios and validate runtime configs

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use stepbind::demo::{self, Scenario};
use stepbind::{FixSuggestion, RuntimeConfig, StepError};

#[derive(Parser)]
#[command(name = "stepbind")]
#[command(about = "stepbind - cooperative tasks, late-binding references and data bindings")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a demo scenario
    Run {
        /// Scenario to run
        #[arg(value_enum)]
        scenario: Scenario,

        /// Runtime config file (YAML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Print the event journal as JSON
        #[arg(long)]
        journal: bool,
    },

    /// Validate a runtime config file (parse only)
    Validate {
        /// Path to the YAML config
        file: PathBuf,
    },
}

fn main() {
    // Load .env file (ignore if not present)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            scenario,
            config,
            journal,
        } => run_scenario(scenario, config.as_deref(), journal),
        Commands::Validate { file } => validate_config(&file),
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        if let Some(suggestion) = e.fix_suggestion() {
            eprintln!("  {} {}", "Fix:".yellow(), suggestion);
        }
        std::process::exit(1);
    }
}

/// RUST_LOG wins over the config's filter
fn init_tracing(config: &RuntimeConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run_scenario(scenario: Scenario, config: Option<&Path>, journal: bool) -> Result<(), StepError> {
    let mut config = match config {
        Some(path) => RuntimeConfig::load(path)?,
        None => RuntimeConfig::default(),
    };
    config.journal |= journal;
    init_tracing(&config);

    println!("{} Running scenario: {}", "→".cyan(), scenario.to_string().cyan().bold());
    let outcome = demo::run(scenario, config)?;

    for line in &outcome.lines {
        println!("  {line}");
    }
    println!(
        "{} {} ticks, {} pending",
        "✓".green(),
        outcome.report.ticks,
        outcome.report.pending
    );

    if journal {
        if let Some(events) = &outcome.journal {
            println!("{}", "Journal:".cyan().bold());
            println!("{}", serde_json::to_string_pretty(events)?);
        }
    }

    Ok(())
}

fn validate_config(file: &Path) -> Result<(), StepError> {
    init_tracing(&RuntimeConfig::default());
    let config = RuntimeConfig::load(file)?;

    println!("{} Config '{}' is valid", "✓".green(), file.display());
    println!("  max_ticks: {}", config.max_ticks);
    println!("  log_filter: {}", config.log_filter);
    println!("  invalidation: {:?}", config.invalidation);
    println!("  journal: {}", config.journal);

    Ok(())
}
