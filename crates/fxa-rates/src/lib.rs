//! Market rate feed: Yahoo Finance chart API, then exchangerate-api.com, then
//! last-known constants.

use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use fxa_core::{
    config::Config,
    errors::Error,
    rates::{MarketRates, RateProvider},
    Result,
};
use serde::Deserialize;

pub const YAHOO_CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
pub const EXCHANGERATE_API_URL: &str = "https://api.exchangerate-api.com/v4/latest";

// Yahoo rejects requests without a browser-like agent.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// One market quote and where to find it.
#[derive(Clone, Copy, Debug)]
struct Quote {
    /// Yahoo symbol, e.g. `USDXAF=X`.
    symbol: &'static str,
    /// exchangerate-api base and target currency.
    base: &'static str,
    target: &'static str,
    fallback: f64,
}

const USD_XAF: Quote = Quote {
    symbol: "USDXAF=X",
    base: "USD",
    target: "XAF",
    fallback: MarketRates::FALLBACK.usd_xaf,
};
const USD_XOF: Quote = Quote {
    symbol: "USDXOF=X",
    base: "USD",
    target: "XOF",
    fallback: MarketRates::FALLBACK.usd_xof,
};
const AED_USD: Quote = Quote {
    symbol: "AEDUSD=X",
    base: "AED",
    target: "USD",
    fallback: MarketRates::FALLBACK.aed_usd,
};
const USD_CNY: Quote = Quote {
    symbol: "USDCNY=X",
    base: "USD",
    target: "CNY",
    fallback: MarketRates::FALLBACK.usd_cny,
};
const USD_EUR: Quote = Quote {
    symbol: "USDEUR=X",
    base: "USD",
    target: "EUR",
    fallback: MarketRates::FALLBACK.usd_eur,
};

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    regular_market_price: Option<f64>,
    previous_close: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct LatestResponse {
    rates: HashMap<String, f64>,
}

fn parse_chart_price(body: &str) -> Option<f64> {
    let resp: ChartResponse = serde_json::from_str(body).ok()?;
    let first = resp.chart.result?.into_iter().next()?;
    let meta = first.meta;
    meta.regular_market_price
        .or(meta.previous_close)
        .filter(|p| p.is_finite() && *p > 0.0)
}

fn parse_latest_rate(body: &str, target: &str) -> Option<f64> {
    let resp: LatestResponse = serde_json::from_str(body).ok()?;
    resp.rates
        .get(target)
        .copied()
        .filter(|p| p.is_finite() && *p > 0.0)
}

/// Production [`RateProvider`]. Never fails: each quote degrades to the next
/// source and finally to a constant, logging every fallback.
#[derive(Clone, Debug)]
pub struct YahooRateProvider {
    http: reqwest::Client,
    chart_url: String,
    latest_url: String,
}

impl YahooRateProvider {
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::with_urls(timeout, YAHOO_CHART_URL, EXCHANGERATE_API_URL)
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        Self::new(cfg.http_timeout)
    }

    pub fn with_urls(timeout: Duration, chart_url: &str, latest_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::External(format!("rates client build error: {e}")))?;
        Ok(Self {
            http,
            chart_url: chart_url.trim_end_matches('/').to_string(),
            latest_url: latest_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| Error::External(format!("rates request error: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::External(format!("rates request failed: {status}")));
        }
        resp.text()
            .await
            .map_err(|e| Error::External(format!("rates body error: {e}")))
    }

    async fn yahoo(&self, symbol: &str) -> Option<f64> {
        let url = format!("{}/{symbol}?interval=1d&range=1d", self.chart_url);
        match self.get_text(&url).await {
            Ok(body) => {
                let price = parse_chart_price(&body);
                if price.is_none() {
                    tracing::warn!(symbol, "yahoo response had no price");
                }
                price
            }
            Err(e) => {
                tracing::warn!(symbol, "yahoo lookup failed: {e}");
                None
            }
        }
    }

    async fn latest(&self, base: &str, target: &str) -> Option<f64> {
        let url = format!("{}/{base}", self.latest_url);
        match self.get_text(&url).await {
            Ok(body) => parse_latest_rate(&body, target),
            Err(e) => {
                tracing::warn!(base, "fallback rate lookup failed: {e}");
                None
            }
        }
    }

    async fn quote(&self, q: Quote) -> f64 {
        if let Some(p) = self.yahoo(q.symbol).await {
            tracing::debug!(symbol = q.symbol, price = p, "yahoo rate");
            return p;
        }
        if let Some(p) = self.latest(q.base, q.target).await {
            tracing::info!(base = q.base, target = q.target, rate = p, "using fallback rate");
            return p;
        }
        tracing::error!(
            base = q.base,
            target = q.target,
            rate = q.fallback,
            "all rate sources failed, using last known rate"
        );
        q.fallback
    }
}

#[async_trait]
impl RateProvider for YahooRateProvider {
    async fn market_rates(&self) -> Result<MarketRates> {
        Ok(MarketRates {
            usd_xaf: self.quote(USD_XAF).await,
            usd_xof: self.quote(USD_XOF).await,
            aed_usd: self.quote(AED_USD).await,
            usd_cny: self.quote(USD_CNY).await,
            usd_eur: self.quote(USD_EUR).await,
        })
    }
}
