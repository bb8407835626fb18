use std::sync::Arc;

use fxa_core::{delivery::DeliveryMode, responder::Responder};
use fxa_telegram::TelegramFrontend;

/// Shared by every route handler.
pub struct AppState {
    pub responder: Arc<Responder>,
    /// Present in webhook mode only; polling mode has no inbound Telegram route.
    pub telegram: Option<TelegramFrontend>,
    pub mode: DeliveryMode,
    pub max_inbound_len: usize,
}

impl AppState {
    pub fn new(responder: Arc<Responder>, mode: DeliveryMode, max_inbound_len: usize) -> Self {
        Self {
            responder,
            telegram: None,
            mode,
            max_inbound_len,
        }
    }

    pub fn with_telegram(mut self, frontend: TelegramFrontend) -> Self {
        self.telegram = Some(frontend);
        self
    }
}
