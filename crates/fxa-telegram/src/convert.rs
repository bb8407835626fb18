//! teloxide `Update` -> core `IncomingUpdate`.

use teloxide::types::{Update, UpdateKind, User};

use fxa_core::{
    domain::{ChatId, UserId},
    messaging::types::{CallbackQuery, IncomingUpdate, TextMessage},
};

fn display_name(user: &User) -> Option<String> {
    let name = user.first_name.trim();
    if !name.is_empty() {
        return Some(name.to_string());
    }
    user.username.clone()
}

/// `None` for update kinds the bot does not handle (edits, photos, joins, ...).
pub fn to_incoming(update: &Update) -> Option<IncomingUpdate> {
    match &update.kind {
        UpdateKind::Message(msg) => {
            let text = msg.text()?;
            Some(IncomingUpdate::Text(TextMessage {
                chat_id: ChatId(msg.chat.id.0),
                sender_id: msg.from().map(|u| UserId(u.id.0)),
                sender_name: msg.from().and_then(display_name),
                is_group: msg.chat.is_group() || msg.chat.is_supergroup(),
                text: text.to_string(),
            }))
        }
        UpdateKind::CallbackQuery(q) => {
            let data = q.data.clone()?;
            // Private chats share the user's id when the message is gone.
            let chat_id = q
                .message
                .as_ref()
                .map(|m| m.chat.id.0)
                .unwrap_or(q.from.id.0 as i64);
            Some(IncomingUpdate::Callback(CallbackQuery {
                chat_id: ChatId(chat_id),
                sender_name: display_name(&q.from),
                callback_id: q.id.clone(),
                data,
            }))
        }
        _ => None,
    }
}
