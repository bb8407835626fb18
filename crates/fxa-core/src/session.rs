use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::{
    assistant::Turn,
    currency::Currency,
    domain::{Channel, SessionId, SessionKey},
};

/// Per-conversation state. Lives until the process exits.
#[derive(Clone, Debug)]
pub struct Session {
    pub id: SessionId,
    pub channel: Channel,
    pub created_at: DateTime<Utc>,
    pub last_currency: Option<Currency>,
    history: VecDeque<Turn>,
}

impl Session {
    fn new(key: &SessionKey) -> Self {
        Self {
            id: key.id.clone(),
            channel: key.channel,
            created_at: Utc::now(),
            last_currency: None,
            history: VecDeque::new(),
        }
    }

    pub fn history(&self) -> impl Iterator<Item = &Turn> {
        self.history.iter()
    }
}

/// What the responder needs to know before handling a message.
#[derive(Clone, Debug)]
pub struct SessionSnapshot {
    pub created_at: DateTime<Utc>,
    pub last_currency: Option<Currency>,
    pub history: Vec<Turn>,
    pub is_new: bool,
}

/// In-memory session map. The lock is only held for map updates.
#[derive(Debug)]
pub struct SessionStore {
    history_limit: usize,
    sessions: Mutex<HashMap<SessionKey, Session>>,
}

impl SessionStore {
    pub fn new(history_limit: usize) -> Self {
        Self {
            history_limit,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Look up a session, creating it on first contact.
    pub async fn touch(&self, key: &SessionKey) -> SessionSnapshot {
        let mut sessions = self.sessions.lock().await;
        let is_new = !sessions.contains_key(key);
        let session = sessions
            .entry(key.clone())
            .or_insert_with(|| Session::new(key));

        if is_new {
            tracing::debug!(channel = key.channel.as_str(), session = %key.id, "session created");
        }

        SessionSnapshot {
            created_at: session.created_at,
            last_currency: session.last_currency,
            history: session.history.iter().cloned().collect(),
            is_new,
        }
    }

    /// Store one exchange. `currency` (if any) becomes the session's last currency.
    pub async fn record(&self, key: &SessionKey, user: Turn, reply: Turn, currency: Option<Currency>) {
        let mut sessions = self.sessions.lock().await;
        let session = sessions
            .entry(key.clone())
            .or_insert_with(|| Session::new(key));

        if currency.is_some() {
            session.last_currency = currency;
        }
        if self.history_limit == 0 {
            return;
        }
        session.history.push_back(user);
        session.history.push_back(reply);
        while session.history.len() > self.history_limit {
            session.history.pop_front();
        }
    }

    pub async fn get(&self, key: &SessionKey) -> Option<Session> {
        self.sessions.lock().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(channel: Channel, id: &str) -> SessionKey {
        SessionKey::new(channel, SessionId(id.to_string()))
    }

    #[tokio::test]
    async fn touch_creates_once() {
        let store = SessionStore::new(4);
        let k = key(Channel::Telegram, "42");

        assert!(store.touch(&k).await.is_new);
        assert!(!store.touch(&k).await.is_new);
        assert_eq!(store.len().await, 1);

        // Same id on another channel is another session.
        store.touch(&key(Channel::Web, "42")).await;
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn history_is_capped_oldest_first() {
        let store = SessionStore::new(4);
        let k = key(Channel::Web, "s");

        for i in 0..3 {
            store
                .record(&k, Turn::user(format!("q{i}")), Turn::assistant(format!("a{i}")), None)
                .await;
        }

        let snap = store.touch(&k).await;
        let texts: Vec<_> = snap.history.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["q1", "a1", "q2", "a2"]);
    }

    #[tokio::test]
    async fn last_currency_is_sticky() {
        let store = SessionStore::new(0);
        let k = key(Channel::WhatsApp, "whatsapp:+237600000000");

        store
            .record(&k, Turn::user("100 usd"), Turn::assistant("..."), Some(Currency::Usd))
            .await;
        store
            .record(&k, Turn::user("thanks"), Turn::assistant("..."), None)
            .await;

        let s = store.get(&k).await.unwrap();
        assert_eq!(s.last_currency, Some(Currency::Usd));
        assert_eq!(s.history().count(), 0);
    }
}
