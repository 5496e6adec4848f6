//! In-memory collaborators for unit tests

use crate::client::{
    MarketData, NewOrder, OrderQuery, PortfolioSource, PriceBar, PriceHistory, SourceConnector,
};
use crate::error::OrchestrationError;
use crate::models::ChatMessage;
use crate::runtime::{AgentRuntime, RuntimeMessage, RuntimeRequest};
use crate::tools::ToolRegistry;
use crate::Result;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Errors are not `Clone`; rebuild the variants tests inject
fn copy_error(err: &OrchestrationError) -> OrchestrationError {
    match err {
        OrchestrationError::RateLimited { retry_after_secs } => OrchestrationError::RateLimited {
            retry_after_secs: *retry_after_secs,
        },
        OrchestrationError::AuthExpired => OrchestrationError::AuthExpired,
        OrchestrationError::Http { status, message } => OrchestrationError::Http {
            status: *status,
            message: message.clone(),
        },
        other => OrchestrationError::ToolError(other.to_string()),
    }
}

//
// ================= Portfolio =================
//

fn holding(symbol: &str, name: &str, class: &str, value: f64, sectors: Value) -> Value {
    json!({
        "symbol": symbol,
        "name": name,
        "currency": "USD",
        "dataSource": "YAHOO",
        "assetClass": class,
        "valueInBaseCurrency": value,
        "allocationInPercentage": value / 125000.5,
        "netPerformancePercent": 0.1,
        "sectors": sectors,
        "countries": [{ "name": "United States", "weight": 1.0 }],
    })
}

fn activity(symbol: &str, side: &str, quantity: f64, unit_price: f64, date: &str) -> Value {
    json!({
        "date": date,
        "type": side,
        "quantity": quantity,
        "unitPrice": unit_price,
        "fee": 0,
        "SymbolProfile": { "symbol": symbol, "name": symbol, "currency": "USD" },
        "Account": { "name": "Brokerage" },
    })
}

/// Four holdings worth 125000.50 in total, VOO the largest at 40%
pub struct MockPortfolio {
    details: Value,
    accounts: Mutex<Vec<Value>>,
    orders: Mutex<Vec<NewOrder>>,
    failure: Mutex<Option<OrchestrationError>>,
    latency: Duration,
}

impl MockPortfolio {
    pub fn new() -> Self {
        let details = json!({
            "summary": {
                "currentValueInBaseCurrency": 125000.5,
                "totalInvestment": 112000.0,
                "netPerformance": 13000.5,
                "netPerformancePercentage": 0.1161,
                "grossPerformance": 13500.0,
                "annualizedPerformancePercent": 0.08,
                "dividendInBaseCurrency": 3.3,
                "fees": 0,
                "cash": 0,
            },
            "holdings": {
                "VOO": holding("VOO", "Vanguard S&P 500 ETF", "EQUITY", 50000.2,
                    json!([{ "name": "Technology", "weight": 0.3 }, { "name": "Financials", "weight": 0.7 }])),
                "AAPL": holding("AAPL", "Apple Inc.", "EQUITY", 30000.12,
                    json!([{ "name": "Technology", "weight": 1.0 }])),
                "MSFT": holding("MSFT", "Microsoft Corporation", "EQUITY", 25000.08,
                    json!([{ "name": "Technology", "weight": 1.0 }])),
                "BND": holding("BND", "Vanguard Total Bond Market ETF", "FIXED_INCOME", 20000.1, json!([])),
            },
        });

        Self {
            details,
            accounts: Mutex::new(vec![json!({ "id": "acc-1", "name": "Brokerage", "currency": "USD" })]),
            orders: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
            latency: Duration::ZERO,
        }
    }

    pub fn without_accounts(self) -> Self {
        self.accounts.lock().unwrap().clear();
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Every subsequent call fails with `err`
    pub fn fail_with(&self, err: OrchestrationError) {
        *self.failure.lock().unwrap() = Some(err);
    }

    pub fn created_orders(&self) -> Vec<NewOrder> {
        self.orders.lock().unwrap().clone()
    }

    async fn enter(&self) -> Result<()> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        match self.failure.lock().unwrap().as_ref() {
            Some(err) => Err(copy_error(err)),
            None => Ok(()),
        }
    }

    fn holdings(&self) -> Vec<Value> {
        self.details["holdings"]
            .as_object()
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl PortfolioSource for MockPortfolio {
    async fn portfolio_details(&self) -> Result<Value> {
        self.enter().await?;
        Ok(self.details.clone())
    }

    async fn portfolio_performance(&self, _date_range: &str) -> Result<Value> {
        self.enter().await?;
        Ok(json!({
            "performance": {
                "netPerformance": 13000.5,
                "netPerformancePercentage": 0.1161,
                "totalInvestment": 112000.0,
                "currentValueInBaseCurrency": 125000.5,
                "currentNetWorth": 125000.5,
            },
            "chart": [{ "date": "2024-01-02" }, { "date": "2025-01-02" }],
        }))
    }

    async fn holding_detail(&self, _data_source: &str, symbol: &str) -> Result<Value> {
        self.enter().await?;
        let h = self
            .holdings()
            .into_iter()
            .find(|h| h["symbol"] == symbol)
            .ok_or_else(|| OrchestrationError::Http {
                status: 404,
                message: "Holding not found".to_string(),
            })?;
        Ok(json!({
            "name": h["name"],
            "currency": "USD",
            "marketPrice": 100.0,
            "quantity": 10,
            "value": h["valueInBaseCurrency"],
            "averagePrice": 90.0,
            "investment": 900.0,
            "netPerformancePercent": 0.1,
            "assetClass": h["assetClass"],
            "sectors": h["sectors"],
            "countries": h["countries"],
        }))
    }

    async fn orders(&self, _query: &OrderQuery) -> Result<Value> {
        self.enter().await?;
        let mut activities = vec![
            activity("VOO", "BUY", 100.0, 400.0, "2024-01-02T00:00:00.000Z"),
            activity("AAPL", "BUY", 150.0, 180.0, "2024-02-01T00:00:00.000Z"),
            activity("MSFT", "BUY", 60.0, 380.0, "2024-03-01T00:00:00.000Z"),
        ];
        for o in self.orders.lock().unwrap().iter() {
            activities.push(activity(&o.symbol, &o.side.to_string(), o.quantity, o.unit_price, &o.date));
        }
        Ok(json!({ "activities": activities, "count": activities.len() }))
    }

    async fn dividends(&self, _data_source: &str, symbol: &str) -> Result<Value> {
        self.enter().await?;
        let dividends = if symbol == "VOO" {
            json!([{ "date": "2024-03-28", "amount": 1.5 }, { "date": "2024-06-28", "amount": 1.8 }])
        } else {
            json!([])
        };
        Ok(json!({ "dividends": dividends }))
    }

    async fn lookup_symbol(&self, query: &str) -> Result<Value> {
        self.enter().await?;
        let q = query.to_lowercase();
        let items: Vec<Value> = self
            .holdings()
            .into_iter()
            .filter(|h| {
                h["name"].as_str().unwrap_or("").to_lowercase().contains(&q)
                    || h["symbol"].as_str().unwrap_or("").to_lowercase() == q
            })
            .collect();
        Ok(json!({ "items": items }))
    }

    async fn accounts(&self) -> Result<Value> {
        self.enter().await?;
        Ok(json!({ "accounts": self.accounts.lock().unwrap().clone() }))
    }

    async fn create_account(&self, name: &str, currency: &str) -> Result<Value> {
        self.enter().await?;
        let mut accounts = self.accounts.lock().unwrap();
        let account = json!({ "id": format!("acc-{}", accounts.len() + 1), "name": name, "currency": currency });
        accounts.push(account.clone());
        Ok(account)
    }

    async fn create_order(&self, order: &NewOrder) -> Result<Value> {
        order.validate()?;
        self.enter().await?;
        let mut orders = self.orders.lock().unwrap();
        orders.push(order.clone());
        Ok(json!({ "id": format!("order-{}", orders.len()) }))
    }
}

/// Accepts the token "valid" only
pub struct MockConnector;

#[async_trait]
impl SourceConnector for MockConnector {
    async fn connect(&self, token: &str) -> Result<Arc<dyn PortfolioSource>> {
        if token == "valid" {
            Ok(Arc::new(MockPortfolio::new()))
        } else {
            Err(OrchestrationError::Http {
                status: 401,
                message: "Invalid token".to_string(),
            })
        }
    }
}

//
// ================= Market =================
//

/// Five daily bars closing 100..=104 for any symbol; "ZZZZ" has no data
pub struct MockMarket;

impl MockMarket {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MarketData for MockMarket {
    async fn history(&self, symbol: &str, _range: &str, _interval: &str) -> Result<PriceHistory> {
        let symbol = symbol.to_uppercase();
        let start = Utc.with_ymd_and_hms(2025, 1, 6, 14, 30, 0).single().unwrap();
        let bars = if symbol == "ZZZZ" {
            Vec::new()
        } else {
            (0..5)
                .map(|i| {
                    let close = 100.0 + i as f64;
                    PriceBar {
                        timestamp: start + ChronoDuration::days(i),
                        open: close - 0.5,
                        high: close + 1.0,
                        low: close - 1.0,
                        close,
                        volume: 1000 + 100 * i as u64,
                    }
                })
                .collect()
        };
        Ok(PriceHistory {
            symbol,
            currency: "USD".to_string(),
            previous_close: Some(99.0),
            bars,
        })
    }
}

//
// ================= Runtime =================
//

pub enum Step {
    /// Model requests a tool with these arguments
    Call(&'static str, Value),
    /// Model replies with text
    Answer(&'static str),
    /// Runtime fails before producing anything further
    Fail(fn() -> OrchestrationError),
}

/// Replays a fixed script through the real tool registry
pub struct ScriptedRuntime {
    steps: Vec<Step>,
    seen: Mutex<Vec<(String, Vec<ChatMessage>)>>,
}

impl ScriptedRuntime {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps,
            seen: Mutex::new(Vec::new()),
        }
    }

    /// (system prompt, messages) of every invocation
    pub fn requests(&self) -> Vec<(String, Vec<ChatMessage>)> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl AgentRuntime for ScriptedRuntime {
    async fn invoke(
        &self,
        request: RuntimeRequest<'_>,
        tools: &ToolRegistry,
    ) -> Result<Vec<RuntimeMessage>> {
        self.seen
            .lock()
            .unwrap()
            .push((request.system_prompt.clone(), request.messages.clone()));

        let mut produced = Vec::new();
        for step in &self.steps {
            match step {
                Step::Call(name, args) => {
                    produced.push(RuntimeMessage::assistant(
                        "",
                        Some(json!({ "prompt_tokens": 100, "completion_tokens": 10 })),
                    ));
                    let output = tools.execute(name, args.clone()).await?;
                    produced.push(RuntimeMessage::tool(*name, output));
                }
                Step::Answer(text) => produced.push(RuntimeMessage::assistant(
                    *text,
                    Some(json!({ "input_tokens": 200, "output_tokens": 50 })),
                )),
                Step::Fail(make) => return Err(make()),
            }
        }
        Ok(produced)
    }
}
