//! `fxa setup`: one-off Telegram administration.

use fxa_core::{config::Config, Result};
use fxa_telegram::{build_bot, setup};

use crate::{serve, SetupArgs};

pub async fn run(args: SetupArgs) -> Result<()> {
    if args.local {
        return serve::run(true).await;
    }

    let cfg = Config::load()?;
    fxa_core::logging::init("fxa")?;
    let bot = build_bot(&cfg)?;

    if args.check {
        println!("TELEGRAM_BOT_TOKEN is configured");
        println!("delivery mode: {}", cfg.delivery_mode);
        println!(
            "ai fallback: {}",
            if cfg.openai_api_key.is_some() { "enabled" } else { "disabled" }
        );
        let check = setup::check(&bot).await?;
        println!("bot: @{}", check.username);
        match &check.webhook_url {
            Some(url) => println!("webhook: {url}"),
            None => println!("webhook: none (polling)"),
        }
        println!("pending updates: {}", check.pending_updates);
    } else if args.test {
        let check = setup::check(&bot).await?;
        println!("connected as @{}", check.username);
    } else if let Some(url) = args.webhook.as_deref() {
        let endpoint = setup::set_webhook(&bot, url).await?;
        let check = setup::check(&bot).await?;
        println!("webhook set to {endpoint}");
        println!("pending updates: {}", check.pending_updates);
    } else if args.delete_webhook {
        setup::delete_webhook(&bot).await?;
        println!("webhook deleted; the bot can now run in polling mode");
    }
    Ok(())
}
