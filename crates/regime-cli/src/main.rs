mod commands;
mod input;
mod output;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::EnvFilter;

use commands::brackets::BracketsArgs;
use commands::break_even::BreakEvenArgs;
use commands::classify::ClassifyArgs;
use commands::regimes::RegimeArgs;
use commands::summary::SummaryArgs;

/// Brazilian corporate tax regime comparison
#[derive(Parser)]
#[command(
    name = "regime",
    version,
    about = "Brazilian corporate tax regime comparison",
    long_about = "A CLI for comparing Simples Nacional, Lucro Presumido and Lucro Real \
                  with decimal precision. Classifies CNAE activity codes, computes each \
                  regime's annual burden, sweeps the Presumido/Real break-even margin and \
                  produces a ranked summary with optimisation advice."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// JSON or YAML file replacing the built-in tax tables
    #[arg(long, global = true)]
    config: Option<String>,

    /// Log to stderr (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a CNAE activity code to its tax ruleset
    Classify(ClassifyArgs),
    /// Compute the Simples Nacional burden
    Simples(RegimeArgs),
    /// Compute the Lucro Presumido burden
    Presumido(RegimeArgs),
    /// Compute the Lucro Real burden at an assumed margin
    Real(RegimeArgs),
    /// Sweep profit margins for the Presumido/Real crossover
    BreakEven(BreakEvenArgs),
    /// Compare all regimes and list optimisation opportunities
    Summary(SummaryArgs),
    /// Show the Simples Nacional bracket tables
    Brackets(BracketsArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match input::file::read_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    };

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Classify(args) => commands::classify::run_classify(args, &config),
        Commands::Simples(args) => commands::regimes::run_simples(args, &config),
        Commands::Presumido(args) => commands::regimes::run_presumido(args, &config),
        Commands::Real(args) => commands::regimes::run_real(args, &config),
        Commands::BreakEven(args) => commands::break_even::run_break_even(args, &config),
        Commands::Summary(args) => commands::summary::run_summary(args, &config),
        Commands::Brackets(args) => commands::brackets::run_brackets(args, &config),
        Commands::Version => {
            println!("regime {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
