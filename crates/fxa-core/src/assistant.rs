//! AI fallback port for messages the parser cannot classify.

use async_trait::async_trait;

use crate::{currency::Currency, domain::Channel, Result};

/// Who said a history line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AssistantRequest {
    pub text: String,
    pub sender_name: Option<String>,
    pub channel: Channel,
    /// Oldest first, not including `text`.
    pub history: Vec<Turn>,
}

#[async_trait]
pub trait Assistant: Send + Sync {
    async fn reply(&self, req: AssistantRequest) -> Result<String>;
}

/// Persona prompt shared by every model backend.
pub fn system_prompt(assistant_name: &str, channel: Channel, sender_name: Option<&str>) -> String {
    let mut prompt = format!(
        "You are {assistant_name}, a friendly assistant for a currency exchange desk serving \
         Central and West Africa. You help customers with exchange rates and conversions \
         between {}. Rates are selling prices quoted in XAF and XOF and already include the \
         service fee. Never invent a rate: ask the customer to send /rates or an amount such \
         as \"100 USD\" for live figures. Keep answers short and polite.",
        Currency::supported_list()
    );

    match channel {
        Channel::WhatsApp => prompt.push_str(" You are chatting on WhatsApp; use plain text."),
        Channel::Telegram => prompt.push_str(" You are chatting on Telegram."),
        Channel::Web => prompt.push_str(" You are chatting on the website."),
    }

    if let Some(name) = sender_name {
        prompt.push_str(&format!(" The customer's name is {name}."));
    }
    prompt
}

/// Appended to every model answer so customers know who they talked to.
pub fn signature(assistant_name: &str) -> String {
    format!("\n\n~ {assistant_name}, your FX assistant")
}
