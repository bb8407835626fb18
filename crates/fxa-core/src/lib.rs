//! Core domain + application logic for the FX assistant bot.
//!
//! This crate is framework-agnostic. Telegram, the HTTP surface, the rates feed
//! and the language model live behind ports (traits) implemented in adapter crates.

pub mod assistant;
pub mod broadcast;
pub mod config;
pub mod currency;
pub mod delivery;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod intent;
pub mod logging;
pub mod messaging;
pub mod ratelimit;
pub mod rates;
pub mod responder;
pub mod session;
pub mod supervisor;
pub mod templates;

pub use errors::{Error, Result};
