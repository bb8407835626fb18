//! Long-polling delivery over `getUpdates`.

use std::time::Duration;

use async_trait::async_trait;
use teloxide::{prelude::*, types::Update};
use tokio::{task::JoinHandle, time::sleep};
use tokio_util::sync::CancellationToken;

use fxa_core::{
    delivery::poller::{Poller, UpdateSource},
    errors::Error,
    Result,
};

use crate::handlers::TelegramFrontend;

pub struct TelegramUpdateSource {
    bot: Bot,
    timeout: Duration,
}

impl TelegramUpdateSource {
    pub fn new(bot: Bot, timeout: Duration) -> Self {
        Self { bot, timeout }
    }
}

#[async_trait]
impl UpdateSource for TelegramUpdateSource {
    type Update = Update;

    async fn fetch(&self, offset: Option<i64>) -> Result<Vec<Update>> {
        let mut req = self
            .bot
            .get_updates()
            .timeout(self.timeout.as_secs() as u32);
        if let Some(offset) = offset {
            req = req.offset(offset as i32);
        }
        req.await
            .map_err(|e| Error::External(format!("telegram getUpdates error: {e}")))
    }

    fn update_id(update: &Update) -> i64 {
        update.id as i64
    }
}

const CLEAR_ATTEMPTS: u32 = 3;
const CLEAR_BACKOFF: Duration = Duration::from_secs(1);

/// A registered webhook makes `getUpdates` fail, so it must go before polling.
async fn clear_webhook(bot: &Bot, attempts: u32, backoff: Duration) -> Result<()> {
    let mut attempt = 1;
    loop {
        match bot.delete_webhook().await {
            Ok(_) => return Ok(()),
            Err(e) if attempt < attempts => {
                tracing::warn!(attempt, "deleteWebhook failed, retrying: {e}");
                attempt += 1;
                sleep(backoff).await;
            }
            Err(e) => {
                return Err(Error::External(format!("telegram deleteWebhook error: {e}")));
            }
        }
    }
}

/// Clear any webhook, then poll in a background task until `cancel` fires.
///
/// Fails (without spawning) if the webhook cannot be cleared, so startup can abort.
pub async fn start_polling(
    bot: Bot,
    frontend: TelegramFrontend,
    poll_timeout: Duration,
    interval: Duration,
    cancel: CancellationToken,
) -> Result<JoinHandle<()>> {
    clear_webhook(&bot, CLEAR_ATTEMPTS, CLEAR_BACKOFF).await?;
    tracing::info!("webhook cleared, starting long polling");

    let source = TelegramUpdateSource::new(bot, poll_timeout);
    Ok(tokio::spawn(async move {
        Poller::new(source, frontend, interval).run(cancel).await;
        tracing::info!("polling stopped");
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::handlers::tests::{frontend, FakeMessenger};

    fn unreachable_bot() -> Bot {
        Bot::new("123:abc").set_api_url("http://127.0.0.1:9/".parse().unwrap())
    }

    #[tokio::test]
    async fn clear_webhook_gives_up_after_attempts() {
        let err = clear_webhook(&unreachable_bot(), 2, Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("deleteWebhook"));
    }

    #[tokio::test]
    async fn polling_does_not_start_when_webhook_cannot_be_cleared() {
        let started = start_polling(
            unreachable_bot(),
            frontend(Arc::new(FakeMessenger::default())),
            Duration::from_secs(1),
            Duration::from_millis(10),
            CancellationToken::new(),
        )
        .await;
        assert!(started.is_err());
    }
}
