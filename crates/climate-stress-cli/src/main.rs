mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use climate_stress_core::{ClimateStressError, ErrorCategory};
use commands::indicators::IndicatorsArgs;
use commands::run::RunArgs;
use commands::validate::ValidateArgs;
use commands::CommandOutput;

/// Scenario-based climate credit stress testing
#[derive(Parser)]
#[command(
    name = "climate-stress",
    version,
    about = "Scenario-based climate credit stress testing",
    long_about = "Applies sector-level climate shocks to a loan portfolio's PD and LGD, \
                  computes expected and incremental losses per scenario, and reports \
                  Climate VaR with decimal precision."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Log verbosity on stderr (-v info, -vv debug, -vvv trace). RUST_LOG
    /// takes precedence when set
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the stress test over every (or each selected) scenario
    Run(RunArgs),
    /// Check portfolio, scenarios and configuration without running
    Validate(ValidateArgs),
    /// Green portfolio indicators
    Indicators(IndicatorsArgs),
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
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();
}

/// Category of an error returned by a command. Anything that is not a core
/// error is an input or output failure.
fn category_of(e: &(dyn std::error::Error + 'static)) -> ErrorCategory {
    e.downcast_ref::<ClimateStressError>()
        .map(ClimateStressError::category)
        .unwrap_or(ErrorCategory::Serialization)
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result: Result<CommandOutput, Box<dyn std::error::Error>> = match cli.command {
        Commands::Run(args) => commands::run::run_stress(args),
        Commands::Validate(args) => commands::validate::run_validate(args),
        Commands::Indicators(args) => commands::indicators::run_indicators(args),
        Commands::Version => {
            println!("climate-stress {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(CommandOutput { value, failure }) => {
            output::format_output(&cli.output, &value);
            if let Some(category) = failure {
                eprintln!(
                    "{} [{}]: one or more scenarios failed",
                    "error".red().bold(),
                    category
                );
                process::exit(category.exit_code());
            }
            process::exit(0);
        }
        Err(e) => {
            let category = category_of(e.as_ref());
            eprintln!("{} [{}]: {}", "error".red().bold(), category, e);
            process::exit(category.exit_code());
        }
    }
}
