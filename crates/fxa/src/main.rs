use std::{future::Future, process::ExitCode};

use clap::{Args, Parser, Subcommand};

use fxa_core::{Error, Result};

mod control;
mod serve;
mod setup;

#[derive(Parser)]
#[command(name = "fxa")]
#[command(about = "FX rate assistant for Telegram, WhatsApp and web chat", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bot in the foreground
    Serve,
    /// Start the bot in the background
    Start,
    /// Stop the background bot
    Stop,
    /// Stop, then start the background bot
    Restart,
    /// Show whether the background bot is running
    Status,
    /// Print the background bot's log
    Logs {
        /// Number of lines to show
        #[arg(short = 'n', long, default_value_t = 50)]
        lines: usize,
        /// Keep printing new output
        #[arg(short, long)]
        follow: bool,
    },
    /// Telegram bot administration
    Setup(SetupArgs),
}

#[derive(Args)]
#[group(required = true, multiple = false)]
pub struct SetupArgs {
    /// Check configuration and the bot's current registration
    #[arg(long)]
    check: bool,
    /// Connect to Telegram and print the bot identity
    #[arg(long)]
    test: bool,
    /// Remove any webhook and run in polling mode in the foreground
    #[arg(long)]
    local: bool,
    /// Register the webhook at this public URL
    #[arg(long, value_name = "URL")]
    webhook: Option<String>,
    /// Remove the registered webhook
    #[arg(long)]
    delete_webhook: bool,
}

/// Supervisor commands sleep while waiting on the background process, so
/// only `serve` and `setup` get an async runtime.
fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Serve => block_on(serve::run(false)),
        Commands::Start => control::start(),
        Commands::Stop => control::stop(),
        Commands::Restart => control::restart(),
        Commands::Status => control::status(),
        Commands::Logs { lines, follow } => control::logs(lines, follow),
        Commands::Setup(args) => block_on(setup::run(args)),
    }
}

fn block_on(fut: impl Future<Output = Result<()>>) -> Result<()> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    rt.block_on(fut)
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e @ (Error::AlreadyRunning { .. } | Error::NotRunning)) => {
            eprintln!("fxa is {e}");
            ExitCode::from(1)
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(1)
        }
    }
}
