//! External data collaborators
//!
//! `PortfolioSource` is the per-user portfolio API (Ghostfolio in
//! production). `MarketData` serves public quotes and is shared by all
//! users. Both return raw upstream JSON / plain structs; shaping for the
//! agent happens in the tools.

pub mod ghostfolio;
pub mod yahoo;

pub use ghostfolio::{GhostfolioClient, GhostfolioConnector};
pub use yahoo::YahooClient;

use crate::error::OrchestrationError;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_RETRY_AFTER_SECS: u64 = 60;
const ERROR_BODY_LIMIT: usize = 200;

//
// ================= HTTP =================
//

pub(crate) fn http_client() -> Result<Client> {
    Ok(Client::builder()
        .pool_idle_timeout(Duration::from_secs(60))
        .pool_max_idle_per_host(8)
        .timeout(Duration::from_secs(30))
        .build()?)
}

/// Map a non-success status to the typed upstream error
pub(crate) async fn status_error(response: Response) -> OrchestrationError {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
        return OrchestrationError::RateLimited { retry_after_secs };
    }

    let mut message = response.text().await.unwrap_or_default();
    if message.len() > ERROR_BODY_LIMIT {
        let mut end = ERROR_BODY_LIMIT;
        while !message.is_char_boundary(end) {
            end -= 1;
        }
        message.truncate(end);
    }
    OrchestrationError::Http {
        status: status.as_u16(),
        message,
    }
}

//
// ================= Portfolio =================
//

#[async_trait]
pub trait PortfolioSource: Send + Sync {
    async fn portfolio_details(&self) -> Result<Value>;
    async fn portfolio_performance(&self, date_range: &str) -> Result<Value>;
    async fn holding_detail(&self, data_source: &str, symbol: &str) -> Result<Value>;
    async fn orders(&self, query: &OrderQuery) -> Result<Value>;
    async fn dividends(&self, data_source: &str, symbol: &str) -> Result<Value>;
    async fn lookup_symbol(&self, query: &str) -> Result<Value>;
    async fn accounts(&self) -> Result<Value>;
    async fn create_account(&self, name: &str, currency: &str) -> Result<Value>;
    /// Implementations must call `NewOrder::validate` before any I/O.
    async fn create_order(&self, order: &NewOrder) -> Result<Value>;
}

/// Builds an authenticated source for one user token
#[async_trait]
pub trait SourceConnector: Send + Sync {
    async fn connect(&self, token: &str) -> Result<Arc<dyn PortfolioSource>>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderQuery {
    pub take: u32,
    pub skip: u32,
    pub asset_class: Option<String>,
}

impl OrderQuery {
    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("take", self.take.to_string()), ("skip", self.skip.to_string())];
        if let Some(ac) = self.asset_class.as_deref().filter(|s| !s.is_empty()) {
            params.push(("assetClasses", ac.to_string()));
        }
        params
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl FromStr for OrderSide {
    type Err = OrchestrationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "BUY" => Ok(OrderSide::Buy),
            "SELL" => Ok(OrderSide::Sell),
            _ => Err(OrchestrationError::InvalidOrder(
                "trade_type must be 'BUY' or 'SELL'".to_string(),
            )),
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        };
        write!(f, "{}", s)
    }
}

/// Order body in the upstream wire shape
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    pub account_id: String,
    pub currency: String,
    pub data_source: String,
    pub date: String,
    pub fee: f64,
    pub quantity: f64,
    pub symbol: String,
    #[serde(rename = "type")]
    pub side: OrderSide,
    pub unit_price: f64,
}

impl NewOrder {
    pub fn validate(&self) -> Result<()> {
        validate_trade(self.quantity, self.unit_price)?;
        if self.fee < 0.0 || !self.fee.is_finite() {
            return Err(OrchestrationError::InvalidOrder("fee must not be negative".to_string()));
        }
        if self.symbol.trim().is_empty() {
            return Err(OrchestrationError::InvalidOrder("symbol is required".to_string()));
        }
        Ok(())
    }
}

/// Shared quantity/price rule for previews and executed orders
pub fn validate_trade(quantity: f64, unit_price: f64) -> Result<()> {
    if !(quantity > 0.0) || !quantity.is_finite() {
        return Err(OrchestrationError::InvalidOrder(
            "quantity must be greater than 0".to_string(),
        ));
    }
    if !(unit_price > 0.0) || !unit_price.is_finite() {
        return Err(OrchestrationError::InvalidOrder(
            "unit_price must be greater than 0".to_string(),
        ));
    }
    Ok(())
}

//
// ================= Market Data =================
//

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PriceBar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PriceHistory {
    pub symbol: String,
    pub currency: String,
    pub previous_close: Option<f64>,
    /// Oldest first
    pub bars: Vec<PriceBar>,
}

#[async_trait]
pub trait MarketData: Send + Sync {
    /// `range` / `interval` use the Yahoo chart vocabulary (`5d`, `1h`, ...)
    async fn history(&self, symbol: &str, range: &str, interval: &str) -> Result<PriceHistory>;
}
