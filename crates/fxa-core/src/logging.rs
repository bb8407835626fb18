use std::io::IsTerminal;

use tracing_subscriber::{fmt, EnvFilter};

use crate::{errors::Error, Result};

/// Initialize logging/tracing for the bot.
///
/// Default: info for our crates, warn for everything else. Can be overridden
/// with `RUST_LOG`.
pub fn init(service_name: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,fxa=info,fxa_core=info,fxa_http=info,fxa_openai=info,fxa_rates=info,fxa_telegram=info,{}=info",
            service_name.replace('-', "_")
        ))
    });

    // The supervisor redirects stdout into a log file; keep it free of escape codes.
    let ansi = std::io::stdout().is_terminal();

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(ansi)
        .try_init()
        .map_err(|e| Error::Config(format!("failed to initialise logging: {e}")))
}
