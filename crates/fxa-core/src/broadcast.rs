//! Daily rate broadcast to group chats that opted in with `/enabledaily`.
//!
//! Enrollment lives in memory only; a restart starts with no groups.

use std::{collections::BTreeSet, sync::Arc, time::Duration};

use chrono::{DateTime, Days, NaiveTime, Utc};
use tokio::{sync::Mutex, time::sleep};
use tokio_util::sync::CancellationToken;

use crate::{
    config::Config,
    domain::ChatId,
    messaging::{deliver_reply, port::MessagingPort},
    rates::{west_africa_time, RateService},
    templates::Templates,
    Result,
};

/// Outcome of one broadcast round.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub sent: usize,
    /// Groups removed because Telegram refused the message (bot kicked, chat gone).
    pub dropped: usize,
    /// Transient failures; the group stays enrolled.
    pub failed: usize,
}

pub struct DailyBroadcast {
    time: NaiveTime,
    groups: Mutex<BTreeSet<ChatId>>,
    rates: RateService,
    templates: Templates,
    messenger: Arc<dyn MessagingPort>,
}

impl DailyBroadcast {
    pub fn new(
        time: NaiveTime,
        rates: RateService,
        templates: Templates,
        messenger: Arc<dyn MessagingPort>,
    ) -> Self {
        Self {
            time,
            groups: Mutex::new(BTreeSet::new()),
            rates,
            templates,
            messenger,
        }
    }

    pub fn from_config(cfg: &Config, rates: RateService, messenger: Arc<dyn MessagingPort>) -> Self {
        Self::new(cfg.daily_rates_time, rates, Templates::from_config(cfg), messenger)
    }

    /// Time of day (WAT) the broadcast goes out.
    pub fn time(&self) -> NaiveTime {
        self.time
    }

    /// Returns false if the group was already enrolled.
    pub async fn enable(&self, chat_id: ChatId) -> bool {
        let added = self.groups.lock().await.insert(chat_id);
        tracing::info!(chat_id = chat_id.0, added, "daily rates enabled");
        added
    }

    /// Returns false if the group was not enrolled.
    pub async fn disable(&self, chat_id: ChatId) -> bool {
        let removed = self.groups.lock().await.remove(&chat_id);
        tracing::info!(chat_id = chat_id.0, removed, "daily rates disabled");
        removed
    }

    pub async fn groups(&self) -> Vec<ChatId> {
        self.groups.lock().await.iter().copied().collect()
    }

    /// Next occurrence of the broadcast time, strictly after `now`.
    pub fn next_run_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let local = now.with_timezone(&west_africa_time());
        let today = local.date_naive().and_time(self.time);
        let mut next = today.and_local_timezone(west_africa_time()).single();
        if next.map_or(true, |n| n <= local) {
            next = local
                .date_naive()
                .checked_add_days(Days::new(1))
                .and_then(|d| d.and_time(self.time).and_local_timezone(west_africa_time()).single());
        }
        next.map(|n| n.with_timezone(&Utc))
            .unwrap_or_else(|| now + chrono::Duration::days(1))
    }

    /// Send today's rates to every enrolled group.
    pub async fn send_once(&self) -> Result<BroadcastReport> {
        let groups = self.groups().await;
        let mut report = BroadcastReport::default();
        if groups.is_empty() {
            return Ok(report);
        }

        let sheet = self.rates.sheet().await?;
        let reply = self
            .templates
            .daily_broadcast(&sheet, Utc::now().with_timezone(&west_africa_time()));

        for chat_id in groups {
            match deliver_reply(self.messenger.as_ref(), chat_id, &reply).await {
                Ok(_) => report.sent += 1,
                Err(e) if e.is_permanent() => {
                    tracing::warn!(chat_id = chat_id.0, "dropping group from daily rates: {e}");
                    self.groups.lock().await.remove(&chat_id);
                    report.dropped += 1;
                }
                Err(e) => {
                    tracing::error!(chat_id = chat_id.0, "daily rates send failed: {e}");
                    report.failed += 1;
                }
            }
        }
        tracing::info!(?report, "daily rates broadcast finished");
        Ok(report)
    }

    /// Sleep until the broadcast time, send, repeat. Stops on `cancel`.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        tracing::info!(time = %self.time.format("%H:%M"), "daily rates scheduler started");
        loop {
            let now = Utc::now();
            let next = self.next_run_after(now);
            let dur = (next - now).to_std().unwrap_or(Duration::ZERO);

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(dur) => {
                    if let Err(e) = self.send_once().await {
                        tracing::error!("daily rates broadcast failed: {e}");
                    }
                }
            }
        }
        tracing::info!("daily rates scheduler stopped");
    }
}
