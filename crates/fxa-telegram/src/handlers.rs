//! Telegram front end: group gating, callbacks, reply delivery.

use std::sync::Arc;

use async_trait::async_trait;
use teloxide::types::Update;

use fxa_core::{
    broadcast::DailyBroadcast,
    currency::Currency,
    delivery::poller::UpdateSink,
    domain::{Channel, ChatId, InboundMessage, SessionId, UserId},
    intent::Intent,
    messaging::{
        deliver_reply,
        port::MessagingPort,
        types::{ChatAction, IncomingUpdate},
    },
    responder::Responder,
    templates::Reply,
    Result,
};

use crate::convert::to_incoming;

/// Words that make a group message worth answering without a mention.
const FX_KEYWORDS: [&str; 8] = [
    "rate", "rates", "exchange", "convert", "currency", "trading", "fx", "price",
];

#[derive(Clone)]
pub struct TelegramFrontend {
    responder: Arc<Responder>,
    messenger: Arc<dyn MessagingPort>,
    /// Without `@`. Unknown until `get_me` succeeds.
    bot_username: Option<String>,
    broadcast: Option<Arc<DailyBroadcast>>,
}

impl TelegramFrontend {
    pub fn new(
        responder: Arc<Responder>,
        messenger: Arc<dyn MessagingPort>,
        bot_username: Option<String>,
    ) -> Self {
        Self {
            responder,
            messenger,
            bot_username: bot_username.map(|u| u.trim_start_matches('@').to_string()),
            broadcast: None,
        }
    }

    /// Enables `/enabledaily` and `/disabledaily` in groups.
    pub fn with_broadcast(mut self, broadcast: Arc<DailyBroadcast>) -> Self {
        self.broadcast = Some(broadcast);
        self
    }

    /// Handle one update. Errors mean the reply could not be sent.
    pub async fn handle(&self, update: IncomingUpdate) -> Result<()> {
        match update {
            IncomingUpdate::Text(msg) => {
                let text = if msg.is_group {
                    match self.addressed_text(&msg.text) {
                        Some(t) => t,
                        None => {
                            tracing::debug!(chat_id = msg.chat_id.0, "group message not addressed to us");
                            return Ok(());
                        }
                    }
                } else {
                    msg.text
                };
                if msg.is_group {
                    if let Some(reply) = self.toggle_daily(msg.chat_id, msg.sender_id, &text).await {
                        return self.send(msg.chat_id, &reply).await;
                    }
                }
                self.reply(msg.chat_id, text, msg.sender_name, msg.is_group).await
            }
            IncomingUpdate::Callback(q) => {
                if let Err(e) = self.messenger.answer_callback_query(&q.callback_id, None).await {
                    tracing::warn!("failed to answer callback query: {e}");
                }
                self.reply(q.chat_id, q.data, q.sender_name, false).await
            }
        }
    }

    async fn reply(
        &self,
        chat_id: ChatId,
        text: String,
        sender_name: Option<String>,
        is_group: bool,
    ) -> Result<()> {
        if text.trim().is_empty() {
            return Ok(());
        }

        if self.messenger.capabilities().supports_chat_actions {
            if let Err(e) = self
                .messenger
                .send_chat_action(chat_id, ChatAction::Typing)
                .await
            {
                tracing::debug!("typing indicator failed: {e}");
            }
        }

        let inbound = InboundMessage::new(Channel::Telegram, SessionId::from_chat(chat_id), text)
            .with_sender(sender_name)
            .in_group(is_group);
        let reply = self.responder.respond(&inbound).await;
        self.send(chat_id, &reply).await
    }

    /// A reply Telegram refuses (blocked, kicked, bad request) will never go
    /// through, so it is logged and the update counts as handled.
    async fn send(&self, chat_id: ChatId, reply: &Reply) -> Result<()> {
        match deliver_reply(self.messenger.as_ref(), chat_id, reply).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_permanent() => {
                tracing::warn!(chat_id = chat_id.0, "reply rejected: {e}");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Admin-gated daily broadcast toggles. `None` if `text` is not one.
    async fn toggle_daily(
        &self,
        chat_id: ChatId,
        sender_id: Option<UserId>,
        text: &str,
    ) -> Option<Reply> {
        let broadcast = self.broadcast.as_ref()?;
        let enable = match self.responder.parser().parse(text) {
            Intent::EnableDaily => true,
            Intent::DisableDaily => false,
            _ => return None,
        };
        let templates = self.responder.templates();

        let Some(user_id) = sender_id else {
            return Some(templates.admin_unverified());
        };
        let reply = match self.messenger.is_chat_admin(chat_id, user_id).await {
            Ok(true) if enable => {
                broadcast.enable(chat_id).await;
                templates.daily_enabled(broadcast.time())
            }
            Ok(true) => {
                broadcast.disable(chat_id).await;
                templates.daily_disabled()
            }
            Ok(false) => templates.admins_only(),
            Err(e) => {
                tracing::warn!(chat_id = chat_id.0, "admin check failed: {e}");
                templates.admin_unverified()
            }
        };
        Some(reply)
    }

    /// Group gating. Returns the text to parse, or `None` if the message is
    /// not meant for the bot.
    pub fn addressed_text(&self, text: &str) -> Option<String> {
        let trimmed = text.trim();

        if trimmed.starts_with('/') {
            // `/rates@OtherBot` belongs to someone else.
            let head = trimmed.split_whitespace().next().unwrap_or("");
            return match (head.split_once('@'), &self.bot_username) {
                (Some((_, target)), Some(me)) if !target.eq_ignore_ascii_case(me) => None,
                _ => Some(trimmed.to_string()),
            };
        }

        if let Some(me) = &self.bot_username {
            let mention = format!("@{me}");
            if let Some(pos) = find_ignore_case(trimmed, &mention) {
                let mut stripped = String::with_capacity(trimmed.len());
                stripped.push_str(&trimmed[..pos]);
                stripped.push_str(&trimmed[pos + mention.len()..]);
                return Some(stripped.split_whitespace().collect::<Vec<_>>().join(" "));
            }
        }

        let name = self.responder.templates().assistant_name();
        if has_fx_keyword(trimmed, name) {
            return Some(trimmed.to_string());
        }
        None
    }
}

fn find_ignore_case(haystack: &str, needle: &str) -> Option<usize> {
    haystack.to_ascii_lowercase().find(&needle.to_ascii_lowercase())
}

fn has_fx_keyword(text: &str, assistant_name: &str) -> bool {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .any(|w| {
            let lower = w.to_lowercase();
            FX_KEYWORDS.contains(&lower.as_str())
                || lower.eq_ignore_ascii_case(assistant_name)
                || Currency::from_token(&lower).is_some()
        })
}

#[async_trait]
impl UpdateSink<Update> for TelegramFrontend {
    async fn process(&self, update: Update) -> Result<()> {
        match to_incoming(&update) {
            Some(incoming) => self.handle(incoming).await,
            None => {
                tracing::debug!(update_id = update.id, "ignoring unsupported update");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{
        collections::HashMap,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Mutex,
        },
    };

    use chrono::NaiveTime;
    use fxa_core::{
        config::Config,
        domain::{MessageId, MessageRef},
        errors::Error,
        messaging::types::{InlineKeyboard, MessagingCapabilities},
        rates::{MarketRates, RateProvider, RateService},
    };

    use super::*;
    use crate::convert::tests::{callback_update, text_update};

    struct FixedRates;

    #[async_trait]
    impl RateProvider for FixedRates {
        async fn market_rates(&self) -> Result<MarketRates> {
            Ok(MarketRates::FALLBACK)
        }
    }

    #[derive(Default)]
    pub(crate) struct FakeMessenger {
        pub(crate) fail_sends: bool,
        pub(crate) reject_sends: bool,
        pub(crate) no_chat_actions: bool,
        /// `None` makes the admin lookup fail.
        pub(crate) admin: Option<bool>,
        pub(crate) sent: Mutex<Vec<(i64, String)>>,
        pub(crate) answered: Mutex<Vec<String>>,
        pub(crate) actions: AtomicUsize,
    }

    #[async_trait]
    impl MessagingPort for FakeMessenger {
        fn capabilities(&self) -> MessagingCapabilities {
            MessagingCapabilities {
                supports_html: true,
                supports_inline_keyboards: true,
                supports_chat_actions: !self.no_chat_actions,
                max_message_len: 4096,
            }
        }

        async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
            if self.fail_sends {
                return Err(Error::External("network down".to_string()));
            }
            if self.reject_sends {
                return Err(Error::Rejected("Forbidden: bot was blocked by the user".to_string()));
            }
            self.sent.lock().unwrap().push((chat_id.0, html.to_string()));
            Ok(MessageRef {
                chat_id,
                message_id: MessageId(1),
            })
        }

        async fn send_inline_keyboard(
            &self,
            chat_id: ChatId,
            html: &str,
            _keyboard: InlineKeyboard,
        ) -> Result<MessageRef> {
            self.send_html(chat_id, html).await
        }

        async fn send_chat_action(&self, _chat_id: ChatId, _action: ChatAction) -> Result<()> {
            self.actions.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn answer_callback_query(&self, callback_id: &str, _text: Option<&str>) -> Result<()> {
            self.answered.lock().unwrap().push(callback_id.to_string());
            Ok(())
        }

        async fn is_chat_admin(&self, _chat_id: ChatId, _user_id: UserId) -> Result<bool> {
            self.admin
                .ok_or_else(|| Error::External("getChatMember timed out".to_string()))
        }
    }

    fn responder() -> Arc<Responder> {
        let mut env: HashMap<String, String> = HashMap::new();
        env.insert("TELEGRAM_BOT_TOKEN".into(), "t".into());
        let cfg = Config::from_lookup(|k| env.get(k).cloned()).unwrap();
        Arc::new(Responder::new(&cfg, RateService::new(Arc::new(FixedRates)), None))
    }

    pub(crate) fn frontend(messenger: Arc<FakeMessenger>) -> TelegramFrontend {
        TelegramFrontend::new(responder(), messenger, Some("@EvaFxBot".to_string()))
    }

    fn with_daily(messenger: Arc<FakeMessenger>) -> (TelegramFrontend, Arc<DailyBroadcast>) {
        let r = responder();
        let broadcast = Arc::new(DailyBroadcast::new(
            NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            RateService::new(Arc::new(FixedRates)),
            r.templates().clone(),
            messenger.clone(),
        ));
        let f = TelegramFrontend::new(r, messenger, Some("EvaFxBot".to_string()))
            .with_broadcast(broadcast.clone());
        (f, broadcast)
    }

    #[tokio::test]
    async fn private_message_gets_html_reply() {
        let m = Arc::new(FakeMessenger::default());
        let f = frontend(m.clone());

        f.process(text_update(1, 42, "private", "100 USD")).await.unwrap();

        let sent = m.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, 42);
        assert!(sent[0].1.contains("<b>100 USD → 60,450 XAF</b>"));
        assert_eq!(m.actions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn no_typing_indicator_without_chat_actions() {
        let m = Arc::new(FakeMessenger {
            no_chat_actions: true,
            ..Default::default()
        });
        let f = frontend(m.clone());

        f.process(text_update(1, 42, "private", "/rates")).await.unwrap();
        assert_eq!(m.actions.load(Ordering::SeqCst), 0);
        assert_eq!(m.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn group_chatter_is_ignored() {
        let m = Arc::new(FakeMessenger::default());
        let f = frontend(m.clone());

        f.process(text_update(1, -5, "group", "see you tomorrow")).await.unwrap();
        f.process(text_update(2, -5, "group", "/rates@OtherBot")).await.unwrap();
        assert!(m.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn group_mentions_commands_and_keywords_are_answered() {
        let m = Arc::new(FakeMessenger::default());
        let f = frontend(m.clone());

        f.process(text_update(1, -5, "supergroup", "@evafxbot 200 EUR")).await.unwrap();
        f.process(text_update(2, -5, "group", "/help@EvaFxBot")).await.unwrap();
        f.process(text_update(3, -5, "group", "what is the rate today?")).await.unwrap();
        f.process(text_update(4, -5, "group", "/grouphelp")).await.unwrap();

        let sent = m.sent.lock().unwrap();
        assert_eq!(sent.len(), 4);
        assert!(sent[0].1.contains("200 EUR →"));
        assert!(sent[1].1.contains("How to use"));
        assert!(sent[3].1.contains("group commands"));
    }

    #[test]
    fn mention_is_stripped() {
        let f = frontend(Arc::new(FakeMessenger::default()));
        assert_eq!(
            f.addressed_text("hey @EvaFxBot   100 usd"),
            Some("hey 100 usd".to_string())
        );
        assert_eq!(f.addressed_text("lunch?"), None);
        assert!(f.addressed_text("Eva are you open today").is_some());
        assert_eq!(f.addressed_text("any yuan sellers"), Some("any yuan sellers".to_string()));
    }

    #[tokio::test]
    async fn callback_is_answered_and_processed_as_text() {
        let m = Arc::new(FakeMessenger::default());
        let f = frontend(m.clone());

        f.process(callback_update(7, 42, "/rates")).await.unwrap();

        assert_eq!(*m.answered.lock().unwrap(), vec!["cb-1".to_string()]);
        let sent = m.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.contains("TODAY'S SELLING RATES"));
    }

    #[tokio::test]
    async fn send_failure_is_reported_for_redelivery() {
        let m = Arc::new(FakeMessenger {
            fail_sends: true,
            ..Default::default()
        });
        let f = frontend(m);
        assert!(f.process(text_update(1, 42, "private", "/help")).await.is_err());
    }

    #[tokio::test]
    async fn rejected_reply_counts_as_handled() {
        let m = Arc::new(FakeMessenger {
            reject_sends: true,
            ..Default::default()
        });
        let f = frontend(m);
        assert!(f.process(text_update(1, 42, "private", "/help")).await.is_ok());
    }

    #[tokio::test]
    async fn admins_toggle_the_daily_broadcast() {
        let m = Arc::new(FakeMessenger {
            admin: Some(true),
            ..Default::default()
        });
        let (f, broadcast) = with_daily(m.clone());

        f.process(text_update(1, -5, "group", "/enabledaily")).await.unwrap();
        assert_eq!(broadcast.groups().await, vec![ChatId(-5)]);

        f.process(text_update(2, -5, "group", "/disabledaily@EvaFxBot")).await.unwrap();
        assert!(broadcast.groups().await.is_empty());

        let sent = m.sent.lock().unwrap();
        assert!(sent[0].1.contains("10:00 WAT"));
        assert!(sent[1].1.contains("disabled"));
    }

    #[tokio::test]
    async fn non_admins_cannot_enable_the_daily_broadcast() {
        let m = Arc::new(FakeMessenger {
            admin: Some(false),
            ..Default::default()
        });
        let (f, broadcast) = with_daily(m.clone());

        f.process(text_update(1, -5, "group", "/enabledaily")).await.unwrap();
        assert!(broadcast.groups().await.is_empty());
        assert!(m.sent.lock().unwrap()[0].1.contains("Only group admins"));
    }

    #[tokio::test]
    async fn failed_admin_lookup_is_reported() {
        let m = Arc::new(FakeMessenger::default());
        let (f, broadcast) = with_daily(m.clone());

        f.process(text_update(1, -5, "group", "/enabledaily")).await.unwrap();
        assert!(broadcast.groups().await.is_empty());
        assert!(m.sent.lock().unwrap()[0].1.contains("Could not verify admin status"));
    }

    #[tokio::test]
    async fn daily_toggle_in_private_chat_is_group_only() {
        let m = Arc::new(FakeMessenger {
            admin: Some(true),
            ..Default::default()
        });
        let (f, broadcast) = with_daily(m.clone());

        f.process(text_update(1, 42, "private", "/enabledaily")).await.unwrap();
        assert!(broadcast.groups().await.is_empty());
        assert!(m.sent.lock().unwrap()[0].1.contains("only available in groups"));
    }
}
