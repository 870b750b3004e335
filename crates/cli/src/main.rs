//! agentflow CLI: the main entry point.
//!
//! Commands:
//! - `run`    : Run one turn in the chosen mode and print the answer
//! - `tools`  : List the built-in tools and their parameter schemas
//! - `config` : Print the effective configuration

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "agentflow",
    about = "agentflow: reactive, code execution and plan-then-execute agent loops",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one turn and print the answer
    Run {
        /// react, codeact, plan_execute or mcp
        #[arg(short = 'M', long, default_value = "react")]
        mode: String,

        /// The user message
        #[arg(short, long)]
        message: String,

        /// Print the answer as it is generated
        #[arg(long)]
        stream: bool,

        /// User id for remote tool credentials
        #[arg(short, long)]
        user: Option<String>,
    },

    /// List available tools
    Tools,

    /// Print the effective configuration as TOML
    Config {
        /// Print the config file path instead
        #[arg(long)]
        path: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so the answer on stdout stays clean.
    let filter = if cli.verbose { "debug" } else { "warn" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if cli.log_json {
        builder.json().init();
    } else {
        builder.init();
    }

    match cli.command {
        Commands::Run {
            mode,
            message,
            stream,
            user,
        } => commands::run::run(mode, message, stream, user).await?,
        Commands::Tools => commands::tools::run().await?,
        Commands::Config { path } => {
            if path {
                commands::config_cmd::path()?
            } else {
                commands::config_cmd::show()?
            }
        }
    }

    Ok(())
}
