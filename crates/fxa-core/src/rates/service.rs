use std::sync::Arc;

use chrono::Utc;

use crate::Result;

use super::{Markups, RateProvider, RateSheet};

/// Fetches fresh market data and applies markups. There is no cache: every
/// lookup hits the provider.
#[derive(Clone)]
pub struct RateService {
    provider: Arc<dyn RateProvider>,
    markups: Markups,
}

impl RateService {
    pub fn new(provider: Arc<dyn RateProvider>) -> Self {
        Self::with_markups(provider, Markups::default())
    }

    pub fn with_markups(provider: Arc<dyn RateProvider>, markups: Markups) -> Self {
        Self { provider, markups }
    }

    pub async fn sheet(&self) -> Result<RateSheet> {
        let market = self.provider.market_rates().await?;
        let sheet = RateSheet::from_market(&market, &self.markups, Utc::now())?;
        tracing::debug!(?market, "rate sheet computed");
        Ok(sheet)
    }
}
