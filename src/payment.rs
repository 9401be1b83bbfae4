//! Payment rail integration
//!
//! Station accounts hold the prepaid funds for their sessions. The rail
//! answers balance lookups and moves funds out of a station account to a
//! recipient (the operator, or the driver's return account).

use crate::config::{PaymentConfig, PaymentMode};
use crate::error::{ChargeGateError, Result};
use crate::logging::{StructuredLogger, get_logger};
use dashmap::DashMap;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Balance lookup and settlement transfer
#[async_trait::async_trait]
pub trait PaymentRail: Send + Sync {
    /// Spendable balance of `account`, in cents
    async fn get_balance(&self, account: &str) -> Result<f64>;

    /// Transfer `amount` cents from the station account `from` to `to`
    async fn pay_out(&self, from: &str, to: &str, amount: f64) -> Result<()>;
}

/// Build the rail selected in configuration
pub fn rail_from_config(config: &PaymentConfig) -> Result<Arc<dyn PaymentRail>> {
    match config.mode {
        PaymentMode::DryRun => Ok(Arc::new(DryRunPaymentRail::new(config.dry_run_balance))),
        PaymentMode::Http => Ok(Arc::new(HttpPaymentRail::new(
            &config.gateway_url,
            Duration::from_millis(config.request_timeout_ms),
        )?)),
    }
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    balance: f64,
}

#[derive(Debug, Serialize)]
struct TransferRequest<'a> {
    from: &'a str,
    to: &'a str,
    amount: f64,
}

/// Settlement gateway reached over HTTP.
///
/// `GET {gateway}/balance/{account}` answers `{"balance": <cents>}` and
/// `POST {gateway}/transfer` accepts `{"from", "to", "amount"}`.
pub struct HttpPaymentRail {
    client: reqwest::Client,
    gateway_url: Url,
    logger: StructuredLogger,
}

impl HttpPaymentRail {
    pub fn new(gateway_url: &str, timeout: Duration) -> Result<Self> {
        let trimmed = gateway_url.trim();
        if trimmed.is_empty() {
            return Err(ChargeGateError::config("payment gateway url is empty"));
        }
        let gateway_url = Url::parse(trimmed).map_err(|e| {
            ChargeGateError::config(format!("invalid payment gateway url '{}': {}", trimmed, e))
        })?;
        if gateway_url.cannot_be_a_base() {
            return Err(ChargeGateError::config(format!(
                "payment gateway url '{}' cannot carry a path",
                trimmed
            )));
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            gateway_url,
            logger: get_logger("payment"),
        })
    }

    /// Gateway URL with `segments` appended, each percent-encoded
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.gateway_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

#[async_trait::async_trait]
impl PaymentRail for HttpPaymentRail {
    async fn get_balance(&self, account: &str) -> Result<f64> {
        let url = self.endpoint(&["balance", account]);
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ChargeGateError::payment(format!("balance of {}: {}", account, e)))?;
        if !resp.status().is_success() {
            return Err(ChargeGateError::payment(format!(
                "balance of {}: HTTP {}",
                account,
                resp.status()
            )));
        }
        let body: BalanceResponse = resp
            .json()
            .await
            .map_err(|e| ChargeGateError::payment(format!("balance of {}: {}", account, e)))?;
        Ok(body.balance)
    }

    async fn pay_out(&self, from: &str, to: &str, amount: f64) -> Result<()> {
        let url = self.endpoint(&["transfer"]);
        let resp = self
            .client
            .post(url)
            .json(&TransferRequest { from, to, amount })
            .send()
            .await
            .map_err(|e| ChargeGateError::payment(format!("transfer {} -> {}: {}", from, to, e)))?;
        if !resp.status().is_success() {
            return Err(ChargeGateError::payment(format!(
                "transfer {} -> {}: HTTP {}",
                from,
                to,
                resp.status()
            )));
        }
        self.logger
            .info(&format!("Transferred {:.2} from {} to {}", amount, from, to));
        Ok(())
    }
}

/// Rail that moves no real funds.
///
/// Every account starts at the configured balance; transfers are applied to
/// the in-memory ledger and logged.
pub struct DryRunPaymentRail {
    opening_balance: f64,
    ledger: DashMap<String, f64>,
    logger: StructuredLogger,
}

impl DryRunPaymentRail {
    pub fn new(opening_balance: f64) -> Self {
        Self {
            opening_balance,
            ledger: DashMap::new(),
            logger: get_logger("payment"),
        }
    }

    /// Override one account's balance
    pub fn set_balance(&self, account: &str, balance: f64) {
        self.ledger.insert(account.to_string(), balance);
    }

    fn balance_of(&self, account: &str) -> f64 {
        self.ledger
            .get(account)
            .map(|b| *b)
            .unwrap_or(self.opening_balance)
    }
}

#[async_trait::async_trait]
impl PaymentRail for DryRunPaymentRail {
    async fn get_balance(&self, account: &str) -> Result<f64> {
        Ok(self.balance_of(account))
    }

    async fn pay_out(&self, from: &str, to: &str, amount: f64) -> Result<()> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(ChargeGateError::payment(format!(
                "invalid transfer amount {}",
                amount
            )));
        }
        let available = self.balance_of(from);
        if amount > available {
            return Err(ChargeGateError::payment(format!(
                "{} holds {:.2}, cannot send {:.2}",
                from, available, amount
            )));
        }
        let credited = self.balance_of(to) + amount;
        self.ledger.insert(from.to_string(), available - amount);
        self.ledger.insert(to.to_string(), credited);
        self.logger.info(&format!(
            "[dry run] would send {:.2} from {} to {}",
            amount, from, to
        ));
        Ok(())
    }
}
