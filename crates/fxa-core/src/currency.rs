//! The fixed set of currencies the bot quotes.

use std::{fmt, str::FromStr};

/// A supported currency.
///
/// XAF and XOF are the "local" currencies the desk sells against; the others are
/// the foreign currencies it quotes selling prices for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Currency {
    Xaf,
    Xof,
    Usd,
    Usdt,
    Aed,
    Cny,
    Eur,
}

impl Currency {
    pub const ALL: [Currency; 7] = [
        Currency::Xaf,
        Currency::Xof,
        Currency::Usd,
        Currency::Usdt,
        Currency::Aed,
        Currency::Cny,
        Currency::Eur,
    ];

    /// Foreign currencies, in the order they appear on the rate sheet.
    pub const FOREIGN: [Currency; 5] = [
        Currency::Usd,
        Currency::Usdt,
        Currency::Aed,
        Currency::Cny,
        Currency::Eur,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Currency::Xaf => "XAF",
            Currency::Xof => "XOF",
            Currency::Usd => "USD",
            Currency::Usdt => "USDT",
            Currency::Aed => "AED",
            Currency::Cny => "CNY",
            Currency::Eur => "EUR",
        }
    }

    pub fn is_local(self) -> bool {
        matches!(self, Currency::Xaf | Currency::Xof)
    }

    pub fn flag(self) -> &'static str {
        match self {
            Currency::Xaf | Currency::Xof => "🌍",
            Currency::Usd => "🇺🇸",
            Currency::Usdt => "💰",
            Currency::Aed => "🇦🇪",
            Currency::Cny => "🇨🇳",
            Currency::Eur => "🇪🇺",
        }
    }

    /// Recognise a currency token (code or common alias), case-insensitively.
    pub fn from_token(token: &str) -> Option<Self> {
        let upper = token.trim().to_ascii_uppercase();
        let c = match upper.as_str() {
            "XAF" => Currency::Xaf,
            "XOF" => Currency::Xof,
            "USD" => Currency::Usd,
            "USDT" | "TETHER" => Currency::Usdt,
            "AED" => Currency::Aed,
            "CNY" | "RMB" | "YUAN" => Currency::Cny,
            "EUR" => Currency::Eur,
            _ => return None,
        };
        Some(c)
    }

    /// Comma-separated list of the supported codes (for usage texts).
    pub fn supported_list() -> String {
        Self::ALL
            .iter()
            .map(|c| c.code())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownCurrency(pub String);

impl fmt::Display for UnknownCurrency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unsupported currency '{}'", self.0)
    }
}

impl std::error::Error for UnknownCurrency {}

impl FromStr for Currency {
    type Err = UnknownCurrency;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_token(s).ok_or_else(|| UnknownCurrency(s.trim().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_codes_and_aliases_case_insensitively() {
        assert_eq!("usd".parse::<Currency>().unwrap(), Currency::Usd);
        assert_eq!("Tether".parse::<Currency>().unwrap(), Currency::Usdt);
        assert_eq!("rmb".parse::<Currency>().unwrap(), Currency::Cny);
        assert_eq!("YUAN".parse::<Currency>().unwrap(), Currency::Cny);
        assert!("GBP".parse::<Currency>().is_err());
    }

    #[test]
    fn local_currencies() {
        assert!(Currency::Xaf.is_local());
        assert!(Currency::Xof.is_local());
        assert!(Currency::FOREIGN.iter().all(|c| !c.is_local()));
    }

    #[test]
    fn supported_list_names_every_code() {
        assert_eq!(
            Currency::supported_list(),
            "XAF, XOF, USD, USDT, AED, CNY, EUR"
        );
    }
}
