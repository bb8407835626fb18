//! Command parser: raw message text -> exactly one [`Intent`].
//!
//! Slash commands are matched first and always win. Anything else is scanned
//! for an amount, currency codes and a connecting "to".

use std::{fmt, sync::OnceLock};

use regex::Regex;

use crate::currency::Currency;

#[derive(Clone, Debug, PartialEq)]
pub enum Intent {
    Welcome,
    Help,
    Rates {
        currency: Option<Currency>,
    },
    Convert {
        amount: f64,
        from: Currency,
        to: Currency,
    },
    Malformed {
        reason: Malformed,
    },
    Freeform {
        text: String,
    },
    /// Compact sheet for group chats.
    GroupRates,
    GroupHelp,
    EnableDaily,
    DisableDaily,
}

impl Intent {
    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Intent::Welcome => "welcome",
            Intent::Help => "help",
            Intent::Rates { .. } => "rates",
            Intent::Convert { .. } => "convert",
            Intent::Malformed { .. } => "malformed",
            Intent::Freeform { .. } => "freeform",
            Intent::GroupRates => "group_rates",
            Intent::GroupHelp => "group_help",
            Intent::EnableDaily => "enable_daily",
            Intent::DisableDaily => "disable_daily",
        }
    }
}

/// Why a `/convert` or `/rates` command could not be understood.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Malformed {
    MissingArguments,
    InvalidAmount(String),
    NonPositiveAmount,
    UnknownCurrency(String),
}

impl fmt::Display for Malformed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Malformed::MissingArguments => f.write_str("missing arguments"),
            Malformed::InvalidAmount(raw) => write!(f, "'{raw}' is not a valid amount"),
            Malformed::NonPositiveAmount => f.write_str("the amount must be greater than zero"),
            Malformed::UnknownCurrency(raw) => write!(f, "'{raw}' is not a supported currency"),
        }
    }
}

/// Words accepted between the two currencies of a conversion.
const CONNECTORS: [&str; 3] = ["to", "in", "into"];

fn token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(\d{1,3}(?:,\d{3})+(?:\.\d+)?|\d+(?:\.\d+)?)|([a-z]+)").expect("valid regex")
    })
}

fn amount_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?:\d{1,3}(?:,\d{3})+|\d+)(?:\.\d+)?$").expect("valid regex"))
}

/// Parse a decimal amount, allowing `,` thousands separators.
pub fn parse_amount(raw: &str) -> Option<f64> {
    if !amount_re().is_match(raw) {
        return None;
    }
    raw.replace(',', "").parse::<f64>().ok()
}

#[derive(Clone, Copy, Debug)]
pub struct IntentParser {
    base: Currency,
}

impl IntentParser {
    pub fn new(base: Currency) -> Self {
        Self { base }
    }

    pub fn parse(&self, text: &str) -> Intent {
        self.parse_with_hint(text, None)
    }

    /// `last_currency` lets a bare amount ("500") convert in the currency the
    /// conversation was last about.
    pub fn parse_with_hint(&self, text: &str, last_currency: Option<Currency>) -> Intent {
        let text = text.trim();
        if text.starts_with('/') {
            return self.parse_command(text);
        }
        self.parse_natural(text, last_currency)
    }

    /// Where a conversion goes when the user only named the source.
    pub fn default_target(&self, from: Currency) -> Currency {
        if from != self.base {
            self.base
        } else if self.base != Currency::Usd {
            Currency::Usd
        } else {
            Currency::Xaf
        }
    }

    fn parse_command(&self, text: &str) -> Intent {
        let (head, rest) = match text.split_once(char::is_whitespace) {
            Some((h, r)) => (h, r.trim()),
            None => (text, ""),
        };
        let name = head[1..].split('@').next().unwrap_or("").to_lowercase();

        match name.as_str() {
            "start" => Intent::Welcome,
            "help" => Intent::Help,
            "rates" | "rate" => match rest.split_whitespace().next() {
                None => Intent::Rates { currency: None },
                Some(code) => match Currency::from_token(code) {
                    Some(c) => Intent::Rates { currency: Some(c) },
                    None => Intent::Malformed {
                        reason: Malformed::UnknownCurrency(code.to_string()),
                    },
                },
            },
            "grouprates" => Intent::GroupRates,
            "grouphelp" => Intent::GroupHelp,
            "enabledaily" => Intent::EnableDaily,
            "disabledaily" => Intent::DisableDaily,
            "convert" => match parse_convert_args(rest) {
                Ok((amount, from, to)) => Intent::Convert { amount, from, to },
                Err(reason) => Intent::Malformed { reason },
            },
            _ => Intent::Freeform {
                text: text.to_string(),
            },
        }
    }

    fn parse_natural(&self, text: &str, last_currency: Option<Currency>) -> Intent {
        let mut amount: Option<f64> = None;
        let mut codes: Vec<(usize, Currency)> = Vec::new();
        let mut connectors: Vec<usize> = Vec::new();

        for (idx, cap) in token_re().captures_iter(text).enumerate() {
            if let Some(num) = cap.get(1) {
                if amount.is_none() {
                    amount = parse_amount(num.as_str());
                }
            } else if let Some(word) = cap.get(2) {
                let w = word.as_str();
                if let Some(c) = Currency::from_token(w) {
                    if codes.len() < 2 {
                        codes.push((idx, c));
                    }
                } else if CONNECTORS.iter().any(|k| k.eq_ignore_ascii_case(w)) {
                    connectors.push(idx);
                }
            }
        }

        let joined = match codes.as_slice() {
            [(i, from), (j, to), ..] if connectors.iter().any(|k| k > i && k < j) => {
                Some((*from, *to))
            }
            _ => None,
        };

        match (amount, codes.first().map(|(_, c)| *c), joined) {
            (Some(amount), _, Some((from, to))) => Intent::Convert { amount, from, to },
            (Some(amount), Some(from), None) => Intent::Convert {
                amount,
                from,
                to: self.default_target(from),
            },
            (None, _, Some((from, to))) => Intent::Convert {
                amount: 1.0,
                from,
                to,
            },
            (None, Some(code), None) => Intent::Rates {
                currency: Some(code),
            },
            (Some(amount), None, None) => match last_currency {
                Some(from) => Intent::Convert {
                    amount,
                    from,
                    to: self.default_target(from),
                },
                None => Intent::Freeform {
                    text: text.to_string(),
                },
            },
            (None, None, None) => Intent::Freeform {
                text: text.to_string(),
            },
        }
    }
}

fn parse_convert_args(rest: &str) -> Result<(f64, Currency, Currency), Malformed> {
    let mut tokens: Vec<&str> = rest.split_whitespace().collect();
    if tokens.len() == 4 && CONNECTORS.iter().any(|k| k.eq_ignore_ascii_case(tokens[2])) {
        tokens.remove(2);
    }
    let [raw_amount, raw_from, raw_to] = tokens.as_slice() else {
        return Err(Malformed::MissingArguments);
    };

    let amount =
        parse_amount(raw_amount).ok_or_else(|| Malformed::InvalidAmount(raw_amount.to_string()))?;
    if amount <= 0.0 {
        return Err(Malformed::NonPositiveAmount);
    }
    let from =
        Currency::from_token(raw_from).ok_or_else(|| Malformed::UnknownCurrency(raw_from.to_string()))?;
    let to =
        Currency::from_token(raw_to).ok_or_else(|| Malformed::UnknownCurrency(raw_to.to_string()))?;

    Ok((amount, from, to))
}
