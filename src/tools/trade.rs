//! Two-phase trade entry
//!
//! The first call (`confirmed=false`) only validates and previews. Nothing
//! touches the data source until the model calls again with
//! `confirmed=true` after the user approved the preview.

use super::{bool_param, f64_param, items, require_f64, require_str, round2, str_param, text, Tool};
use crate::client::{validate_trade, NewOrder, OrderSide};
use crate::error::OrchestrationError;
use crate::models::ToolInput;
use crate::scope::current_source;
use crate::Result;
use chrono::{NaiveDate, Utc};
use serde_json::{json, Value};
use tracing::info;

const DEFAULT_ACCOUNT_NAME: &str = "Default";

#[derive(Debug, Clone, PartialEq)]
struct TradeRequest {
    symbol: String,
    quantity: f64,
    unit_price: f64,
    side: OrderSide,
    currency: String,
    date: Option<NaiveDate>,
    fee: f64,
    data_source: String,
}

impl TradeRequest {
    fn parse(input: &ToolInput) -> Result<Self> {
        let symbol = require_str(input, "symbol")?.to_uppercase();
        let quantity = require_f64(input, "quantity")?;
        let unit_price = require_f64(input, "unit_price")?;
        let side = str_param(input, "trade_type").unwrap_or("BUY").parse::<OrderSide>()?;
        let fee = f64_param(input, "fee").unwrap_or(0.0);
        validate_trade(quantity, unit_price)?;
        if fee < 0.0 {
            return Err(OrchestrationError::InvalidOrder("fee must not be negative".to_string()));
        }

        let date = str_param(input, "date")
            .map(|d| {
                NaiveDate::parse_from_str(d, "%Y-%m-%d").map_err(|_| {
                    OrchestrationError::InvalidToolInput(format!(
                        "date must be in YYYY-MM-DD format, got '{}'",
                        d
                    ))
                })
            })
            .transpose()?;

        Ok(Self {
            symbol,
            quantity,
            unit_price,
            side,
            currency: str_param(input, "currency").unwrap_or("USD").to_uppercase(),
            date,
            fee,
            data_source: str_param(input, "data_source").unwrap_or("YAHOO").to_uppercase(),
        })
    }

    fn trade_date(&self) -> NaiveDate {
        self.date.unwrap_or_else(|| Utc::now().date_naive())
    }

    fn total_cost(&self) -> f64 {
        self.quantity * self.unit_price + self.fee
    }

    fn preview(&self) -> Value {
        let date = self.trade_date().format("%Y-%m-%d").to_string();
        let total = self.total_cost();
        json!({
            "pending_confirmation": true,
            "preview": {
                "type": self.side,
                "symbol": self.symbol,
                "quantity": self.quantity,
                "unit_price": self.unit_price,
                "total_cost": round2(total),
                "fee": self.fee,
                "currency": self.currency,
                "date": date,
                "data_source": self.data_source,
            },
            "message": format!(
                "Please confirm this trade:\n  {} {} x {} @ ${:.2}\n  Total: ${:.2} (fee: ${:.2})\n  Date: {}\n\nReply 'yes' or 'confirm' to execute this trade.",
                self.side, self.quantity, self.symbol, self.unit_price, total, self.fee, date
            ),
        })
    }

    fn order(&self, account_id: String) -> NewOrder {
        NewOrder {
            account_id,
            currency: self.currency.clone(),
            data_source: self.data_source.clone(),
            date: format!("{}T00:00:00.000Z", self.trade_date().format("%Y-%m-%d")),
            fee: self.fee,
            quantity: self.quantity,
            symbol: self.symbol.clone(),
            side: self.side,
            unit_price: self.unit_price,
        }
    }
}

pub struct AddTradeTool;

#[async_trait::async_trait]
impl Tool for AddTradeTool {
    fn name(&self) -> &'static str {
        "add_trade"
    }

    fn description(&self) -> &'static str {
        "Add a buy or sell trade to the portfolio. You MUST call this tool twice for every trade: \
         first with confirmed=false to get a preview for the user, then, only after the user \
         confirms, again with confirmed=true to execute. Never set confirmed=true on the first call."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "symbol": { "type": "string", "description": "Ticker symbol, e.g. AAPL, VOO, BTC-USD" },
                "quantity": { "type": "number", "description": "Number of shares/units" },
                "unit_price": { "type": "number", "description": "Price per share/unit" },
                "trade_type": { "type": "string", "enum": ["BUY", "SELL"], "default": "BUY" },
                "currency": { "type": "string", "default": "USD" },
                "date": { "type": "string", "description": "Trade date YYYY-MM-DD, default today" },
                "fee": { "type": "number", "default": 0 },
                "data_source": { "type": "string", "default": "YAHOO" },
                "confirmed": { "type": "boolean", "default": false }
            },
            "required": ["symbol", "quantity", "unit_price"]
        })
    }

    async fn execute(&self, input: &ToolInput) -> Result<Value> {
        let trade = TradeRequest::parse(input)?;
        if !bool_param(input, "confirmed") {
            return Ok(trade.preview());
        }

        let source = current_source()?;
        let accounts_data = source.accounts().await?;
        let accounts = if accounts_data.is_array() {
            items(&accounts_data, "")
        } else {
            items(&accounts_data, "accounts")
        };

        let account = match accounts.into_iter().next() {
            Some(account) => account,
            None => {
                info!(currency = %trade.currency, "No accounts found, creating default account");
                source.create_account(DEFAULT_ACCOUNT_NAME, &trade.currency).await?
            }
        };
        let account_id = account
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| OrchestrationError::ToolError("Account has no id".to_string()))?
            .to_string();

        let created = source.create_order(&trade.order(account_id)).await?;
        let total = trade.total_cost();
        info!(symbol = %trade.symbol, side = %trade.side, quantity = trade.quantity, "Trade executed");

        Ok(json!({
            "success": true,
            "trade": {
                "id": text(&created, "id"),
                "type": trade.side,
                "symbol": trade.symbol,
                "quantity": trade.quantity,
                "unit_price": trade.unit_price,
                "total_cost": round2(total),
                "fee": trade.fee,
                "currency": trade.currency,
                "date": trade.trade_date().format("%Y-%m-%d").to_string(),
                "account": text(&account, "name"),
            },
            "message": format!(
                "Successfully added {} of {} {} at ${} (total: ${:.2})",
                trade.side, trade.quantity, trade.symbol, trade.unit_price, total
            ),
        }))
    }
}
