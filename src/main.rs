use adaptrs::banister::{MultiSystemRequest, SolveRequest};
use adaptrs::config::AppConfig;
use adaptrs::export::{self, ExportFormat, Exportable};
use adaptrs::fatigue::FatiguePredictionRequest;
use adaptrs::recovery::{RecoveryEstimateRequest, RecoveryUpdateRequest};
use adaptrs::self_improvement::{CorrectionRequest, SelfImprovementRequest};
use adaptrs::{engine_status, init_logging, AdaptError};
use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::*;
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::PathBuf;
use tracing::{debug, error, warn};

/// adaptrs - Adaptive recovery and fatigue modelling CLI
///
/// Personalizes muscle recovery estimates, forecasts fatigue curves and
/// fitness-fatigue performance, and recalibrates itself from logged outcomes.
/// Every command reads a JSON request and prints the result.
#[derive(Parser)]
#[command(name = "adaptrs")]
#[command(author = "adaptrs contributors")]
#[command(version)]
#[command(about = "Adaptive recovery and fatigue modelling CLI", long_about = None)]
struct Cli {
    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity of output
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Request input and result output shared by every model command
#[derive(Args)]
struct IoArgs {
    /// JSON request file (reads stdin when omitted or "-")
    #[arg(short, long, value_name = "FILE")]
    input: Option<PathBuf>,

    /// Write the result to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Output format (json, csv, text)
    #[arg(short = 'f', long, default_value = "json")]
    format: ExportFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Update per-muscle recovery priors from observed sessions
    RecoveryUpdate(IoArgs),

    /// Estimate recovery hours for one muscle
    RecoveryEstimate(IoArgs),

    /// Predict a fatigue curve with its uncertainty band
    FatiguePredict(IoArgs),

    /// Solve the fitness-fatigue model, optionally fitting its parameters
    Solve(IoArgs),

    /// Solve the muscular, neural and connective systems together
    SolveMulti(IoArgs),

    /// Score past predictions against their outcomes
    Evaluate(IoArgs),

    /// Derive calibration corrections from prediction accuracy
    Corrections(IoArgs),

    /// Show engine availability and version
    Status,

    /// Configure application settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::RecoveryUpdate(_) => "recovery-update",
            Commands::RecoveryEstimate(_) => "recovery-estimate",
            Commands::FatiguePredict(_) => "fatigue-predict",
            Commands::Solve(_) => "solve",
            Commands::SolveMulti(_) => "solve-multi",
            Commands::Evaluate(_) => "evaluate",
            Commands::Corrections(_) => "corrections",
            Commands::Status => "status",
            Commands::Config { .. } => "config",
        }
    }
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,

    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the configuration file location
    Path,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) if path.exists() => AppConfig::load_from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        Some(_) => AppConfig::default(),
        None => AppConfig::load_or_default(),
    };

    let log_config = config.logging.clone().with_verbosity(cli.verbose);
    init_logging(&log_config).context("Failed to initialize logging")?;
    debug!(command = cli.command.name(), "Running command");

    match cli.command {
        Commands::RecoveryUpdate(io) => {
            let estimator = config.recovery_estimator();
            execute(&io, |req: &RecoveryUpdateRequest| estimator.run_update(req))
        }
        Commands::RecoveryEstimate(io) => {
            let estimator = config.recovery_estimator();
            execute(&io, |req: &RecoveryEstimateRequest| estimator.run_estimate(req))
        }
        Commands::FatiguePredict(io) => {
            let regressor = config.fatigue_regressor();
            execute(&io, |req: &FatiguePredictionRequest| regressor.run(req))
        }
        Commands::Solve(io) => {
            let solver = config.solver();
            execute(&io, |req: &SolveRequest| solver.run(req))
        }
        Commands::SolveMulti(io) => {
            let solver = config.solver();
            execute(&io, |req: &MultiSystemRequest| solver.run_multi_system(req))
        }
        Commands::Evaluate(io) => {
            let evaluator = config.evaluator();
            execute(&io, |req: &SelfImprovementRequest| evaluator.run(req))
        }
        Commands::Corrections(io) => {
            let evaluator = config.evaluator();
            execute(&io, |req: &CorrectionRequest| evaluator.run_corrections(req))
        }
        Commands::Status => {
            let status = engine_status();
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(())
        }
        Commands::Config { action } => handle_config(action, config, cli.config),
    }
}

/// Read a request, run one model operation and render its result
fn execute<Req, Res, F>(io: &IoArgs, run: F) -> Result<()>
where
    Req: DeserializeOwned,
    Res: Exportable,
    F: FnOnce(&Req) -> adaptrs::Result<Res>,
{
    let request: Req = read_request(io.input.as_ref())?;
    let result = run(&request).map_err(report)?;

    match &io.output {
        Some(path) => {
            colored::control::set_override(false);
            export::export_to_file(&result, io.format, path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!(
                "{}",
                format!("✓ Result written to {}", path.display()).green()
            );
        }
        None => {
            let stdout = io::stdout();
            export::render(&result, io.format, stdout.lock())
                .context("Failed to write result to stdout")?;
        }
    }
    Ok(())
}

fn read_request<T: DeserializeOwned>(input: Option<&PathBuf>) -> Result<T> {
    match input {
        Some(path) if path.as_os_str() != "-" => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open request file: {}", path.display()))?;
            serde_json::from_reader(BufReader::new(file))
                .with_context(|| format!("Failed to parse request JSON in {}", path.display()))
        }
        _ => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read request from stdin")?;
            serde_json::from_str(&buffer).context("Failed to parse request JSON from stdin")
        }
    }
}

/// Log a core error at its severity and turn it into a user-facing message
fn report(err: AdaptError) -> anyhow::Error {
    if err.severity().to_tracing_level() == tracing::Level::ERROR {
        error!(error = %err, "Operation failed");
    } else {
        warn!(error = %err, "Request rejected");
    }
    anyhow!(err.user_message())
}

fn handle_config(
    action: ConfigAction,
    mut config: AppConfig,
    custom_path: Option<PathBuf>,
) -> Result<()> {
    let path = custom_path.unwrap_or_else(AppConfig::default_config_path);

    match action {
        ConfigAction::Show => {
            let content =
                toml::to_string_pretty(&config).context("Failed to serialize configuration")?;
            println!("{}", content);
        }
        ConfigAction::Init { force } => {
            if path.exists() && !force {
                println!(
                    "{}",
                    format!("Configuration already exists at {}", path.display()).yellow()
                );
                println!("  Use --force to overwrite it");
                return Ok(());
            }
            config.save_to_file(&path)?;
            println!(
                "{}",
                format!("✓ Configuration written to {}", path.display())
                    .green()
                    .bold()
            );
        }
        ConfigAction::Path => println!("{}", path.display()),
    }
    Ok(())
}
