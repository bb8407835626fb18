use crate::{
    domain::{ChatId, UserId},
    templates::QuickAction,
};

/// Telegram rejects callback data longer than this (bytes).
pub const MAX_CALLBACK_DATA: usize = 64;

/// Inbound update, already stripped of provider-specific shape.
#[derive(Clone, Debug, PartialEq)]
pub enum IncomingUpdate {
    Text(TextMessage),
    Callback(CallbackQuery),
}

#[derive(Clone, Debug, PartialEq)]
pub struct TextMessage {
    pub chat_id: ChatId,
    pub sender_id: Option<UserId>,
    pub sender_name: Option<String>,
    /// Group or supergroup chat.
    pub is_group: bool,
    pub text: String,
}

/// An inline button press. `data` is the quick action's command text.
#[derive(Clone, Debug, PartialEq)]
pub struct CallbackQuery {
    pub chat_id: ChatId,
    pub sender_name: Option<String>,
    pub callback_id: String,
    pub data: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatAction {
    Typing,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct InlineKeyboard {
    pub rows: Vec<Vec<InlineButton>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InlineButton {
    pub label: String,
    pub callback_data: String,
}

impl InlineKeyboard {
    /// Lay quick actions out `per_row` buttons per row. Actions whose command
    /// does not fit in callback data are left out.
    pub fn from_quick_actions(actions: &[QuickAction], per_row: usize) -> Self {
        let buttons: Vec<InlineButton> = actions
            .iter()
            .filter(|a| !a.command.is_empty() && a.command.len() <= MAX_CALLBACK_DATA)
            .map(|a| InlineButton {
                label: a.label.clone(),
                callback_data: a.command.clone(),
            })
            .collect();

        let rows = buttons
            .chunks(per_row.max(1))
            .map(|row| row.to_vec())
            .collect();
        Self { rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(|r| r.is_empty())
    }
}

/// Capabilities / feature flags of a messenger implementation.
#[derive(Clone, Copy, Debug)]
pub struct MessagingCapabilities {
    pub supports_html: bool,
    pub supports_inline_keyboards: bool,
    pub supports_chat_actions: bool,
    pub max_message_len: usize,
}
