//! How inbound messages reach the bot: pushed (webhook) or pulled (polling).

pub mod poller;

use std::{fmt, str::FromStr};

use crate::{errors::Error, Result};

/// Environment variables set by the hosting platforms we deploy to.
/// Any of them present means a public URL exists and updates can be pushed.
pub const CLOUD_MARKERS: [&str; 5] = ["RENDER", "HEROKU", "RAILWAY_PROJECT_NAME", "VERCEL", "PORT"];

/// Delivery mode, fixed for the lifetime of the process.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryMode {
    Polling,
    Webhook,
}

impl DeliveryMode {
    pub fn detect(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let on_cloud = CLOUD_MARKERS
            .iter()
            .any(|k| lookup(k).is_some_and(|v| !v.trim().is_empty()));
        if on_cloud {
            DeliveryMode::Webhook
        } else {
            DeliveryMode::Polling
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryMode::Polling => "polling",
            DeliveryMode::Webhook => "webhook",
        }
    }
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "polling" | "poll" => Ok(DeliveryMode::Polling),
            "webhook" => Ok(DeliveryMode::Webhook),
            other => Err(Error::Config(format!(
                "DELIVERY_MODE must be 'polling' or 'webhook', got '{other}'"
            ))),
        }
    }
}
