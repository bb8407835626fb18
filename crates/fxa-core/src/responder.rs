//! Channel-agnostic message handling: rate limit, classify, dispatch, remember.

use std::sync::Arc;

use crate::{
    assistant::{Assistant, AssistantRequest, Turn},
    config::Config,
    currency::Currency,
    domain::InboundMessage,
    intent::{Intent, IntentParser},
    ratelimit::{RateDecision, RateLimiter},
    rates::RateService,
    session::SessionStore,
    templates::{Reply, Templates},
};

/// Turns one inbound message into exactly one reply.
///
/// Never fails: upstream errors are logged and answered with a fixed apology.
pub struct Responder {
    parser: IntentParser,
    templates: Templates,
    rates: RateService,
    assistant: Option<Arc<dyn Assistant>>,
    sessions: SessionStore,
    limiter: RateLimiter,
}

impl Responder {
    pub fn new(cfg: &Config, rates: RateService, assistant: Option<Arc<dyn Assistant>>) -> Self {
        Self {
            parser: IntentParser::new(cfg.base_currency),
            templates: Templates::from_config(cfg),
            rates,
            assistant,
            sessions: SessionStore::new(cfg.session_history_limit),
            limiter: RateLimiter::from_config(cfg),
        }
    }

    pub fn parser(&self) -> &IntentParser {
        &self.parser
    }

    pub fn templates(&self) -> &Templates {
        &self.templates
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub async fn respond(&self, msg: &InboundMessage) -> Reply {
        let channel = msg.channel().as_str();

        if let RateDecision::Limited { retry_after } = self.limiter.check(&msg.session).await {
            tracing::warn!(channel, session = %msg.session.id, "rate limited");
            return self.templates.too_many_messages(retry_after);
        }

        let snapshot = self.sessions.touch(&msg.session).await;
        let intent = self.parser.parse_with_hint(&msg.text, snapshot.last_currency);
        tracing::info!(channel, session = %msg.session.id, intent = intent.kind(), "message classified");

        let (reply, currency) = self.dispatch(intent, msg, snapshot.history).await;

        self.sessions
            .record(
                &msg.session,
                Turn::user(msg.text.clone()),
                Turn::assistant(reply.text.clone()),
                currency,
            )
            .await;
        reply
    }

    /// Returns the reply and the currency the conversation is now about.
    async fn dispatch(
        &self,
        intent: Intent,
        msg: &InboundMessage,
        history: Vec<Turn>,
    ) -> (Reply, Option<Currency>) {
        match intent {
            Intent::Welcome => (self.templates.welcome(msg.sender_name.as_deref()), None),
            Intent::Help => (self.templates.help(), None),
            Intent::Malformed { reason } => (self.templates.malformed(&reason), None),
            Intent::Rates { currency } => match self.rates.sheet().await {
                Ok(sheet) => (
                    self.templates.rates(&sheet, currency),
                    currency.filter(|c| !c.is_local()),
                ),
                Err(e) => {
                    tracing::error!("rate lookup failed: {e}");
                    (self.templates.rates_unavailable(), None)
                }
            },
            Intent::Convert { amount, from, to } => {
                let sheet = match self.rates.sheet().await {
                    Ok(s) => s,
                    Err(e) => {
                        tracing::error!("rate lookup failed: {e}");
                        return (self.templates.rates_unavailable(), None);
                    }
                };
                match sheet.convert(amount, from, to) {
                    Some(conv) => (self.templates.conversion(&conv, &sheet), Some(from)),
                    None => {
                        tracing::error!(%from, %to, "no rate for pair");
                        (self.templates.rates_unavailable(), None)
                    }
                }
            }
            Intent::GroupRates => match self.rates.sheet().await {
                Ok(sheet) => (self.templates.group_rates(&sheet), None),
                Err(e) => {
                    tracing::error!("rate lookup failed: {e}");
                    (self.templates.rates_unavailable(), None)
                }
            },
            Intent::GroupHelp if msg.is_group => (self.templates.group_help(), None),
            // Toggling the broadcast needs an admin check, done by the Telegram front end.
            Intent::GroupHelp | Intent::EnableDaily | Intent::DisableDaily => {
                (self.templates.group_only(), None)
            }
            Intent::Freeform { text } => {
                let Some(assistant) = &self.assistant else {
                    return (self.templates.assistant_unavailable(), None);
                };
                let req = AssistantRequest {
                    text,
                    sender_name: msg.sender_name.clone(),
                    channel: msg.channel(),
                    history,
                };
                match assistant.reply(req).await {
                    Ok(answer) => (Reply::text(answer), None),
                    Err(e) => {
                        tracing::error!("assistant failed: {e}");
                        (self.templates.assistant_failed(), None)
                    }
                }
            }
        }
    }
}
