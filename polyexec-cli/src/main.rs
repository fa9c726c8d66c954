mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "polyexec")]
#[command(about = "Compile and run untrusted C++, Python and JavaScript in throwaway workspaces")]
#[command(version)]
pub struct Cli {
    /// Configuration file (default: <config dir>/polyexec/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Also write logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a single source file
    Run {
        /// Source file; the language is inferred from its extension
        file: PathBuf,

        /// Language id (cpp, python, javascript or an alias)
        #[arg(short, long)]
        lang: Option<String>,

        /// File fed to the program's stdin
        #[arg(short, long, conflicts_with = "stdin")]
        input: Option<PathBuf>,

        /// Text fed to the program's stdin
        #[arg(long)]
        stdin: Option<String>,

        /// Wall-clock limit for the run phase (e.g. "2s", "500ms")
        #[arg(short, long, value_parser = parse_duration)]
        timeout: Option<Duration>,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run JSON-lines requests from stdin, printing one JSON result per line
    Batch,
    /// Show configured toolchains and whether they were found
    Languages,
    /// Inspect or create the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn parse_duration(value: &str) -> std::result::Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(value).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let _guard = init_tracing(cli.verbose, cli.log_file.as_deref())?;
    run(cli).await
}

/// Runs the selected command. Must return rather than call `process::exit`, so
/// the log file guard in `main` drops and flushes.
async fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Run {
            file,
            lang,
            input,
            stdin,
            timeout,
            json,
        } => {
            let config = commands::load_config(cli.config.as_deref())?;
            let options = commands::RunOptions {
                file,
                lang,
                input,
                stdin,
                timeout,
                json,
            };
            let success = commands::execute_run(config, options).await?;
            Ok(ExitCode::from(exit_status(success)))
        }
        Commands::Batch => {
            let config = commands::load_config(cli.config.as_deref())?;
            commands::execute_batch(config).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Languages => {
            let config = commands::load_config(cli.config.as_deref())?;
            commands::execute_languages(&config);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Config { action } => {
            match action {
                ConfigAction::Show => commands::execute_config_show(cli.config.as_deref())?,
                ConfigAction::Init { force } => {
                    commands::execute_config_init(cli.config.as_deref(), force)?
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Process exit status of `run`: 1 when the program did not succeed
fn exit_status(success: bool) -> u8 {
    if success {
        0
    } else {
        1
    }
}

/// Logs go to stderr so stdout carries only program output
fn init_tracing(
    verbose: bool,
    log_file: Option<&std::path::Path>,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let log_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("polyexec={}", log_level)));

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let directory = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("Invalid log file path: {}", path.display()))?;
            let file_appender = tracing_appender::rolling::never(directory, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(file_layer)
        .with(filter)
        .init();

    Ok(guard)
}
