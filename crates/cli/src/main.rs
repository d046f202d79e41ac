mod commands;
mod config;
mod logging;
mod serve;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::Config;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Offline write-ahead sync layer for the parking backend.
#[derive(Parser)]
#[command(
    name = "parksync",
    version,
    about = "Offline write-ahead sync layer for the parking backend"
)]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the local HTTP server with the outbox interceptor
    Serve {
        /// Port to listen on (overrides the config file)
        #[arg(long)]
        port: Option<u16>,
        /// Path to a TOML config file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Path to the JSONL outbox file (overrides the config file)
        #[arg(long)]
        outbox: Option<PathBuf>,
    },

    /// Show how a request path would be classified
    Classify {
        /// Request path, optionally with a query string
        path: String,
        /// Path to a TOML config file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Treat the request as flagged local-only
        #[arg(long)]
        local_only: bool,
    },

    /// List the records of an outbox file
    Outbox {
        /// Path to the JSONL outbox file
        #[arg(long)]
        outbox: PathBuf,
        /// Only show records in this state (pending, synced, error)
        #[arg(long)]
        status: Option<String>,
        /// Maximum number of records to show (0 = all)
        #[arg(long, default_value = "0")]
        limit: usize,
    },
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.quiet);

    match cli.command {
        Commands::Serve {
            port,
            config,
            outbox,
        } => {
            let mut config = load_config(config.as_deref(), cli.output, cli.quiet);
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(path) = outbox {
                config.outbox.path = Some(path);
            }
            let rt = match tokio::runtime::Runtime::new() {
                Ok(rt) => rt,
                Err(e) => {
                    report_error(
                        &format!("failed to create tokio runtime: {}", e),
                        cli.output,
                        cli.quiet,
                    );
                    process::exit(1);
                }
            };
            if let Err(e) = rt.block_on(serve::start_server(config)) {
                report_error(&format!("Server error: {}", e), cli.output, cli.quiet);
                process::exit(1);
            }
        }
        Commands::Classify {
            path,
            config,
            local_only,
        } => {
            let config = load_config(config.as_deref(), cli.output, cli.quiet);
            commands::classify::cmd_classify(&path, &config, local_only, cli.output, cli.quiet);
        }
        Commands::Outbox {
            outbox,
            status,
            limit,
        } => {
            commands::outbox::cmd_outbox(
                &outbox,
                status.as_deref(),
                limit,
                cli.output,
                cli.quiet,
            );
        }
    }
}

fn load_config(path: Option<&Path>, output: OutputFormat, quiet: bool) -> Config {
    match Config::load(path) {
        Ok(c) => c,
        Err(e) => {
            report_error(&e.to_string(), output, quiet);
            process::exit(1);
        }
    }
}

pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => eprintln!("{}", serde_json::json!({ "error": msg })),
    }
}
