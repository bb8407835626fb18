//! Rate sheet: raw market rates in, selling prices out.

pub mod service;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Offset, Utc};

use crate::{currency::Currency, errors::Error, Result};

pub use service::RateService;

/// USD and USDT never sell below this many XAF.
pub const XAF_DOLLAR_FLOOR: f64 = 604.5;

/// Raw market mid rates as returned by a provider.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MarketRates {
    pub usd_xaf: f64,
    pub usd_xof: f64,
    pub aed_usd: f64,
    pub usd_cny: f64,
    pub usd_eur: f64,
}

impl MarketRates {
    /// Last-known values used when every upstream source is down.
    pub const FALLBACK: MarketRates = MarketRates {
        usd_xaf: 558.0,
        usd_xof: 558.0,
        aed_usd: 0.272,
        usd_cny: 7.14,
        usd_eur: 0.858,
    };

    fn validate(&self) -> Result<()> {
        let fields = [
            ("USD/XAF", self.usd_xaf),
            ("USD/XOF", self.usd_xof),
            ("AED/USD", self.aed_usd),
            ("USD/CNY", self.usd_cny),
            ("USD/EUR", self.usd_eur),
        ];
        for (name, v) in fields {
            if !v.is_finite() || v <= 0.0 {
                return Err(Error::External(format!("market rate {name} is invalid: {v}")));
            }
        }
        Ok(())
    }
}

/// Source of market rates (Yahoo Finance in production, fixed values in tests).
#[async_trait]
pub trait RateProvider: Send + Sync {
    async fn market_rates(&self) -> Result<MarketRates>;
}

/// Markup percentages applied on top of the market rate.
#[derive(Clone, Copy, Debug)]
pub struct Markups {
    pub xaf_usd: f64,
    pub xaf_usdt: f64,
    pub xaf_aed: f64,
    pub xof_dollar_aed: f64,
    pub xaf_cny: f64,
    pub xof_cny: f64,
    pub xaf_eur: f64,
    pub xof_eur: f64,
}

impl Default for Markups {
    fn default() -> Self {
        Self {
            xaf_usd: 8.0,
            xaf_usdt: 8.5,
            xaf_aed: 8.5,
            xof_dollar_aed: 4.0,
            xaf_cny: 9.5,
            xof_cny: 5.0,
            xaf_eur: 7.0,
            xof_eur: 4.0,
        }
    }
}

/// Selling price of one unit of a foreign currency.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SellingRate {
    pub currency: Currency,
    pub xaf: f64,
    pub xof: f64,
}

#[derive(Clone, Debug)]
pub struct RateSheet {
    /// In `Currency::FOREIGN` order.
    pub rows: Vec<SellingRate>,
    /// West Africa Time.
    pub updated_at: DateTime<FixedOffset>,
}

/// The result of converting an amount with a sheet.
#[derive(Clone, Debug, PartialEq)]
pub struct Conversion {
    pub amount: f64,
    pub from: Currency,
    pub to: Currency,
    pub rate: f64,
    pub result: f64,
}

impl RateSheet {
    pub fn from_market(market: &MarketRates, markups: &Markups, now: DateTime<Utc>) -> Result<Self> {
        market.validate()?;

        let up = |pct: f64| 1.0 + pct / 100.0;
        let aed_xaf = market.aed_usd * market.usd_xaf;
        let aed_xof = market.aed_usd * market.usd_xof;
        let cny_xaf = market.usd_xaf / market.usd_cny;
        let cny_xof = market.usd_xof / market.usd_cny;
        let eur_xaf = market.usd_xaf / market.usd_eur;
        let eur_xof = market.usd_xof / market.usd_eur;

        let xaf_usd = floored(Currency::Usd, round2(market.usd_xaf * up(markups.xaf_usd)));
        let xaf_usdt = floored(Currency::Usdt, round2(market.usd_xaf * up(markups.xaf_usdt)));
        let xof_dollar = round2(market.usd_xof * up(markups.xof_dollar_aed));

        let rows = vec![
            SellingRate {
                currency: Currency::Usd,
                xaf: xaf_usd,
                xof: xof_dollar,
            },
            SellingRate {
                currency: Currency::Usdt,
                xaf: xaf_usdt,
                xof: xof_dollar,
            },
            SellingRate {
                currency: Currency::Aed,
                xaf: round2(aed_xaf * up(markups.xaf_aed)),
                xof: round2(aed_xof * up(markups.xof_dollar_aed)),
            },
            SellingRate {
                currency: Currency::Cny,
                xaf: round2(cny_xaf * up(markups.xaf_cny)),
                xof: round2(cny_xof * up(markups.xof_cny)),
            },
            SellingRate {
                currency: Currency::Eur,
                xaf: round2(eur_xaf * up(markups.xaf_eur)),
                xof: round2(eur_xof * up(markups.xof_eur)),
            },
        ];

        Ok(Self {
            rows,
            updated_at: now.with_timezone(&west_africa_time()),
        })
    }

    pub fn row(&self, currency: Currency) -> Option<&SellingRate> {
        self.rows.iter().find(|r| r.currency == currency)
    }

    /// Price of one `from` expressed in `to`.
    ///
    /// XAF and XOF trade at parity (both pegged to the euro at the same rate);
    /// foreign/foreign pairs cross through XAF.
    pub fn rate(&self, from: Currency, to: Currency) -> Option<f64> {
        if from == to || (from.is_local() && to.is_local()) {
            return Some(1.0);
        }
        match (from.is_local(), to.is_local()) {
            (false, true) => self.local_price(from, to),
            (true, false) => self.local_price(to, from).map(|p| 1.0 / p),
            _ => {
                let a = self.local_price(from, Currency::Xaf)?;
                let b = self.local_price(to, Currency::Xaf)?;
                Some(a / b)
            }
        }
    }

    pub fn convert(&self, amount: f64, from: Currency, to: Currency) -> Option<Conversion> {
        let rate = self.rate(from, to)?;
        Some(Conversion {
            amount,
            from,
            to,
            rate,
            result: round2(amount * rate),
        })
    }

    fn local_price(&self, foreign: Currency, local: Currency) -> Option<f64> {
        let row = self.row(foreign)?;
        match local {
            Currency::Xaf => Some(row.xaf),
            Currency::Xof => Some(row.xof),
            _ => None,
        }
    }
}

pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn floored(currency: Currency, rate: f64) -> f64 {
    if rate < XAF_DOLLAR_FLOOR {
        tracing::info!("{currency}/XAF floor applied: {rate} -> {XAF_DOLLAR_FLOOR}");
        XAF_DOLLAR_FLOOR
    } else {
        rate
    }
}

/// UTC+1, the zone rates are quoted and broadcast in.
pub fn west_africa_time() -> FixedOffset {
    FixedOffset::east_opt(3600).unwrap_or_else(|| Utc.fix())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn sheet(market: MarketRates) -> RateSheet {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap();
        RateSheet::from_market(&market, &Markups::default(), now).unwrap()
    }

    #[test]
    fn floor_applies_to_dollar_rates() {
        let s = sheet(MarketRates::FALLBACK);
        // 558 * 1.08 = 602.64, below the floor.
        assert_eq!(s.row(Currency::Usd).unwrap().xaf, XAF_DOLLAR_FLOOR);
        // 558 * 1.085 = 605.43, above it.
        assert_eq!(s.row(Currency::Usdt).unwrap().xaf, 605.43);
        assert_eq!(s.row(Currency::Usd).unwrap().xof, 580.32);
    }

    #[test]
    fn markups_above_floor_are_rounded() {
        let s = sheet(MarketRates {
            usd_xaf: 600.0,
            ..MarketRates::FALLBACK
        });
        assert_eq!(s.row(Currency::Usd).unwrap().xaf, 648.0);
        assert_eq!(s.row(Currency::Aed).unwrap().xaf, round2(600.0 * 0.272 * 1.085));
        assert_eq!(s.row(Currency::Eur).unwrap().xof, round2(558.0 / 0.858 * 1.04));
    }

    #[test]
    fn cross_rates_are_consistent() {
        let s = sheet(MarketRates::FALLBACK);
        for a in Currency::FOREIGN {
            for b in Currency::FOREIGN {
                let direct = s.rate(a, Currency::Xaf).unwrap();
                let via = s.rate(a, b).unwrap() * s.rate(b, Currency::Xaf).unwrap();
                assert!((direct - via).abs() < 1e-9, "{a}->{b}");
            }
        }
        let there = s.rate(Currency::Xaf, Currency::Cny).unwrap();
        let back = s.rate(Currency::Cny, Currency::Xaf).unwrap();
        assert!((there * back - 1.0).abs() < 1e-12);
    }

    #[test]
    fn local_pairs_trade_at_parity() {
        let s = sheet(MarketRates::FALLBACK);
        assert_eq!(s.rate(Currency::Xaf, Currency::Xof), Some(1.0));
        assert_eq!(s.rate(Currency::Usd, Currency::Usd), Some(1.0));
        let c = s.convert(1000.0, Currency::Xof, Currency::Xaf).unwrap();
        assert_eq!(c.result, 1000.0);
    }

    #[test]
    fn conversion_uses_selling_price() {
        let s = sheet(MarketRates::FALLBACK);
        let c = s.convert(100.0, Currency::Usd, Currency::Xaf).unwrap();
        assert_eq!(c.rate, 604.5);
        assert_eq!(c.result, 60450.0);
    }

    #[test]
    fn timestamp_is_west_africa_time() {
        let s = sheet(MarketRates::FALLBACK);
        assert_eq!(s.updated_at.offset().local_minus_utc(), 3600);
        assert_eq!(s.updated_at.format("%H:%M").to_string(), "10:30");
    }

    #[test]
    fn invalid_market_rates_are_rejected() {
        let bad = MarketRates {
            usd_cny: 0.0,
            ..MarketRates::FALLBACK
        };
        let err = RateSheet::from_market(&bad, &Markups::default(), Utc::now()).unwrap_err();
        assert!(matches!(err, Error::External(_)));
    }
}
