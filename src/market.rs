//! Spot price and carbon-intensity feed
//!
//! The market service exposes plain-text variables at
//! `{base}/getvar?var=<name>`. Lookups that fail fall back to configured
//! values; the pricing path never returns an error.

use crate::config::MarketConfig;
use crate::error::{ChargeGateError, Result};
use crate::logging::{StructuredLogger, get_logger};
use std::sync::Arc;
use std::time::Duration;

pub const PRICE_VARIABLE: &str = "price_per_kwh";
pub const CO2_VARIABLE: &str = "local_co2";

/// Read-only market data source
#[async_trait::async_trait]
pub trait MarketFeed: Send + Sync {
    /// Current price in cents per kWh
    async fn price(&self) -> Result<f64>;
    /// Current carbon intensity of the local grid
    async fn co2(&self) -> Result<f64>;
}

pub struct HttpMarketFeed {
    client: reqwest::Client,
    base_url: String,
}

impl HttpMarketFeed {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
        })
    }

    async fn variable(&self, name: &str) -> Result<f64> {
        let url = format!("{}/getvar", self.base_url);
        let resp = self.client.get(&url).query(&[("var", name)]).send().await?;
        if !resp.status().is_success() {
            return Err(ChargeGateError::transport(format!(
                "market variable {}: HTTP {}",
                name,
                resp.status()
            )));
        }
        let body = resp.text().await?;
        parse_variable(name, &body)
    }
}

#[async_trait::async_trait]
impl MarketFeed for HttpMarketFeed {
    async fn price(&self) -> Result<f64> {
        self.variable(PRICE_VARIABLE).await
    }

    async fn co2(&self) -> Result<f64> {
        self.variable(CO2_VARIABLE).await
    }
}

/// Parse a plain-text numeric body
pub fn parse_variable(name: &str, body: &str) -> Result<f64> {
    let value = body.trim().parse::<f64>().map_err(|_| {
        ChargeGateError::decode(format!("market variable {} is not a number: '{}'", name, body.trim()))
    })?;
    if !value.is_finite() {
        return Err(ChargeGateError::decode(format!(
            "market variable {} is not finite",
            name
        )));
    }
    Ok(value)
}

/// Market lookups with fallbacks substituted for failures
pub struct PricingService {
    feed: Arc<dyn MarketFeed>,
    fallback_price: f64,
    fallback_co2: Option<f64>,
    logger: StructuredLogger,
}

impl PricingService {
    pub fn new(feed: Arc<dyn MarketFeed>, config: &MarketConfig) -> Self {
        Self {
            feed,
            fallback_price: config.fallback_price,
            fallback_co2: config.fallback_co2,
            logger: get_logger("market"),
        }
    }

    /// Price in cents per kWh; always positive
    pub async fn price(&self) -> f64 {
        match self.feed.price().await {
            Ok(p) if p > 0.0 => p,
            Ok(p) => {
                self.logger.warn(&format!(
                    "Market price {} is not positive, using fallback {}",
                    p, self.fallback_price
                ));
                self.fallback_price
            }
            Err(e) => {
                self.logger.warn(&format!(
                    "Market price unavailable, using fallback {}: {}",
                    self.fallback_price, e
                ));
                self.fallback_price
            }
        }
    }

    /// Carbon intensity, or the fallback (possibly absent)
    pub async fn co2(&self) -> Option<f64> {
        match self.feed.co2().await {
            Ok(v) => Some(v),
            Err(e) => {
                self.logger
                    .warn(&format!("Market CO2 unavailable: {}", e));
                self.fallback_co2
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingFeed;

    #[async_trait::async_trait]
    impl MarketFeed for FailingFeed {
        async fn price(&self) -> Result<f64> {
            Err(ChargeGateError::transport("down"))
        }
        async fn co2(&self) -> Result<f64> {
            Err(ChargeGateError::transport("down"))
        }
    }

    #[test]
    fn parse_plain_body() {
        assert_eq!(parse_variable("p", " 23.5\n").unwrap(), 23.5);
        assert!(parse_variable("p", "n/a").is_err());
        assert!(parse_variable("p", "inf").is_err());
    }

    #[tokio::test]
    async fn failures_use_fallbacks() {
        let pricing = PricingService::new(Arc::new(FailingFeed), &MarketConfig::default());
        assert_eq!(pricing.price().await, 200.0);
        assert_eq!(pricing.co2().await, None);
    }
}
