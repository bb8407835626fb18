//! One-off Bot API administration used by `fxa setup`.

use teloxide::{prelude::*, types::BotCommand};

use fxa_core::{errors::Error, Result};

/// Path the HTTP server receives Telegram updates on.
pub const WEBHOOK_PATH: &str = "/telegram-webhook";

#[derive(Clone, Debug)]
pub struct BotCheck {
    pub username: String,
    pub webhook_url: Option<String>,
    pub pending_updates: u32,
}

fn tg_err(e: teloxide::RequestError) -> Error {
    Error::External(format!("telegram error: {e}"))
}

/// `https://host/` or `https://host` -> `https://host/telegram-webhook`.
/// A URL that already ends with the path is kept.
pub fn webhook_endpoint(public_url: &str) -> Result<reqwest::Url> {
    let base = public_url.trim().trim_end_matches('/');
    let full = if base.ends_with(WEBHOOK_PATH) {
        base.to_string()
    } else {
        format!("{base}{WEBHOOK_PATH}")
    };
    let url = reqwest::Url::parse(&full)
        .map_err(|e| Error::Config(format!("invalid webhook url '{public_url}': {e}")))?;
    if url.scheme() != "https" {
        return Err(Error::Config(format!(
            "webhook url must use https, got '{public_url}'"
        )));
    }
    Ok(url)
}

pub async fn check(bot: &Bot) -> Result<BotCheck> {
    let me = bot.get_me().await.map_err(tg_err)?;
    let info = bot.get_webhook_info().await.map_err(tg_err)?;
    Ok(BotCheck {
        username: me.username().to_string(),
        webhook_url: info.url.as_ref().map(|u| u.to_string()),
        pending_updates: info.pending_update_count,
    })
}

pub async fn set_webhook(bot: &Bot, public_url: &str) -> Result<reqwest::Url> {
    let url = webhook_endpoint(public_url)?;
    bot.set_webhook(url.clone()).await.map_err(tg_err)?;
    tracing::info!(%url, "webhook registered");
    Ok(url)
}

pub async fn delete_webhook(bot: &Bot) -> Result<()> {
    bot.delete_webhook().await.map_err(tg_err)?;
    tracing::info!("webhook deleted");
    Ok(())
}

/// Populate the command menu shown by Telegram clients.
pub async fn register_commands(bot: &Bot) -> Result<()> {
    let commands = vec![
        BotCommand::new("start", "Welcome message"),
        BotCommand::new("help", "How to use the bot"),
        BotCommand::new("rates", "Today's selling rates"),
        BotCommand::new("convert", "Convert an amount, e.g. /convert 100 USD to XAF"),
        BotCommand::new("grouprates", "Compact rates for groups"),
        BotCommand::new("grouphelp", "Group commands"),
    ];
    bot.set_my_commands(commands).await.map_err(tg_err)?;
    Ok(())
}
