//! Outbound messaging abstractions (Telegram today).

pub mod port;
pub mod types;

use crate::{
    domain::{ChatId, MessageRef},
    errors::Error,
    formatting::markdown_to_telegram_html,
    templates::Reply,
    Result,
};

use self::{port::MessagingPort, types::InlineKeyboard};

/// Render a reply for a chat messenger and send it.
///
/// Long replies are split on line boundaries; quick actions ride on the last
/// chunk as inline buttons when the messenger supports them.
pub async fn deliver_reply(
    messenger: &dyn MessagingPort,
    chat_id: ChatId,
    reply: &Reply,
) -> Result<MessageRef> {
    let caps = messenger.capabilities();
    let body = if caps.supports_html {
        markdown_to_telegram_html(&reply.text)
    } else {
        reply.text.clone()
    };

    let chunks = split_message(&body, caps.max_message_len);
    let keyboard = InlineKeyboard::from_quick_actions(&reply.quick_actions, 2);

    let mut last = None;
    let count = chunks.len();
    for (i, chunk) in chunks.into_iter().enumerate() {
        let is_last = i + 1 == count;
        let sent = if is_last && caps.supports_inline_keyboards && !keyboard.is_empty() {
            messenger
                .send_inline_keyboard(chat_id, &chunk, keyboard.clone())
                .await?
        } else {
            messenger.send_html(chat_id, &chunk).await?
        };
        last = Some(sent);
    }

    last.ok_or_else(|| Error::External("empty reply".to_string()))
}

/// Split `text` into pieces of at most `max_len` characters, preferring newlines.
pub fn split_message(text: &str, max_len: usize) -> Vec<String> {
    let max_len = max_len.max(1);
    if text.chars().count() <= max_len {
        return vec![text.to_string()];
    }

    let mut out = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for line in text.split('\n') {
        let line_len = line.chars().count();
        let needed = if current.is_empty() { line_len } else { line_len + 1 };

        if current_len + needed > max_len && !current.is_empty() {
            out.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if line_len > max_len {
            // Hard split an oversized line.
            let chars: Vec<char> = line.chars().collect();
            for piece in chars.chunks(max_len) {
                out.push(piece.iter().collect());
            }
            continue;
        }

        if !current.is_empty() {
            current.push('\n');
            current_len += 1;
        }
        current.push_str(line);
        current_len += line_len;
    }

    if !current.is_empty() {
        out.push(current);
    }
    out
}
