use std::io::Read;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::config::{Config, LoggingConfig};
use crate::engine::{compile, Engine};
use crate::explain::Explainer;
use crate::types::ExecutionResult;

#[derive(Parser)]
#[command(name = "stepwise")]
#[command(about = "Stepwise - run Python snippets and record every step", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Config file to load instead of ./stepwise.toml
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Execute a file ("-" for stdin) and print the result as JSON
    Run {
        file: String,

        /// Pretty-print the JSON result
        #[arg(long)]
        pretty: bool,
    },

    /// Print the parsed AST of a file as JSON
    Ast { file: String },

    /// Ask the configured model to explain a file
    Explain {
        file: String,

        /// Explain the first step recorded for this line
        #[arg(short = 'l', long = "line")]
        line: Option<usize>,
    },

    /// Start the HTTP server
    Serve {
        #[arg(long)]
        host: Option<String>,

        #[arg(long)]
        port: Option<u16>,
    },

    /// Print the effective configuration as TOML
    Config,
}

/// Entry point for the binary
pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    run_cli_with_args(cli).await
}

/// Run the CLI with provided arguments
pub async fn run_cli_from_args(args: Vec<String>) -> Result<()> {
    let cli = Cli::parse_from(args);
    run_cli_with_args(cli).await
}

async fn run_cli_with_args(cli: Cli) -> Result<()> {
    // Load before any command so config errors surface first
    let mut config = Config::builder()
        .config_path(cli.config.clone())
        .build()
        .context("Failed to load configuration")?;
    init_logging(&config.logging);

    match cli.command {
        Commands::Run { file, pretty } => {
            let source = read_source(&file)?;
            let engine = Engine::new(config.engine.clone());
            let result = tokio::task::spawn_blocking(move || engine.execute(&source))
                .await
                .context("Execution task failed")?;

            let json = if pretty {
                serde_json::to_string_pretty(&result)?
            } else {
                serde_json::to_string(&result)?
            };
            println!("{}", json);
            if !matches!(result, ExecutionResult::Success { .. }) {
                std::process::exit(1);
            }
        }

        Commands::Ast { file } => {
            let source = read_source(&file)?;
            match compile(&source) {
                Ok(unit) => println!("{}", serde_json::to_string_pretty(unit.module())?),
                Err(err) => bail!("{}", err),
            }
        }

        Commands::Explain { file, line } => {
            let source = read_source(&file)?;
            let step = match line {
                Some(line_no) => {
                    let engine = Engine::new(config.engine.clone());
                    let traced = source.clone();
                    let result = tokio::task::spawn_blocking(move || engine.execute(&traced))
                        .await
                        .context("Execution task failed")?;
                    let step = result.steps().iter().find(|s| s.line_no == line_no).cloned();
                    match step {
                        Some(step) => Some(step),
                        None => bail!("line {} was never reached", line_no),
                    }
                }
                None => None,
            };

            let explainer = Explainer::from_config(&config.explain)?;
            let text = explainer.explain(&source, step.as_ref()).await?;
            println!("{}", text);
        }

        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            crate::server::start_server(config).await?;
        }

        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

fn read_source(file: &str) -> Result<String> {
    if file == "-" {
        let mut source = String::new();
        std::io::stdin()
            .read_to_string(&mut source)
            .context("Failed to read source from stdin")?;
        return Ok(source);
    }
    std::fs::read_to_string(file).with_context(|| format!("Failed to read {}", file))
}

/// Logs go to stderr; `RUST_LOG` overrides the configured filter
fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.filter))
        .unwrap_or_else(|_| EnvFilter::new("stepwise=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_run_with_global_config() {
        let cli = Cli::parse_from(["stepwise", "run", "prog.py", "--pretty", "--config", "custom.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));
        assert!(matches!(
            cli.command,
            Commands::Run { ref file, pretty: true } if file == "prog.py"
        ));
    }

    #[test]
    fn test_parses_explain_line() {
        let cli = Cli::parse_from(["stepwise", "explain", "-", "--line", "3"]);
        assert!(matches!(cli.command, Commands::Explain { line: Some(3), .. }));
    }

    #[test]
    fn test_parses_serve_overrides() {
        let cli = Cli::parse_from(["stepwise", "serve", "--port", "9000"]);
        assert!(matches!(
            cli.command,
            Commands::Serve { host: None, port: Some(9000) }
        ));
    }
}
