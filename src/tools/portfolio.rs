//! Portfolio read tools backed by the turn's data source

use super::{items, num, pct, raw, require_str, round2, str_param, text, Tool};
use crate::client::OrderQuery;
use crate::error::OrchestrationError;
use crate::models::ToolInput;
use crate::scope::current_source;
use crate::Result;
use serde_json::{json, Map, Value};
use std::cmp::Ordering;

pub const VALID_RANGES: &[&str] = &["1d", "1w", "1m", "3m", "6m", "ytd", "1y", "3y", "5y", "max"];
pub const DEFAULT_RANGE: &str = "max";
const DEFAULT_DATA_SOURCE: &str = "YAHOO";
const DEFAULT_TAKE: u64 = 50;
const SYMBOL_SEARCH_LIMIT: usize = 10;

fn by_value_desc(a: &Value, b: &Value) -> Ordering {
    num(b, "valueInBaseCurrency").total_cmp(&num(a, "valueInBaseCurrency"))
}

fn symbol_arg(input: &ToolInput) -> Result<String> {
    Ok(require_str(input, "symbol")?.to_uppercase())
}

fn data_source_arg(input: &ToolInput) -> String {
    str_param(input, "data_source")
        .unwrap_or(DEFAULT_DATA_SOURCE)
        .to_uppercase()
}

/// Weighted breakdown (sectors, countries) as percentages, largest first
fn weighted_allocation(holdings: &[Value], field: &str, total_value: f64) -> Vec<(String, f64)> {
    let mut buckets: Vec<(String, f64)> = Vec::new();
    for h in holdings {
        let value = num(h, "valueInBaseCurrency");
        for entry in items(h, field) {
            let name = entry
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("Unknown")
                .to_string();
            let weight = num(&entry, "weight") * value;
            match buckets.iter_mut().find(|(n, _)| *n == name) {
                Some((_, total)) => *total += weight,
                None => buckets.push((name, weight)),
            }
        }
    }

    let mut pcts: Vec<(String, f64)> = buckets
        .into_iter()
        .map(|(name, v)| (name, round2(v / total_value * 100.0)))
        .collect();
    pcts.sort_by(|a, b| b.1.total_cmp(&a.1));
    pcts
}

fn allocation_list(entries: &[(String, f64)]) -> Value {
    Value::Array(
        entries
            .iter()
            .map(|(name, pct)| json!({ "name": name, "pct": pct }))
            .collect(),
    )
}

//
// ================= portfolio_summary =================
//

pub struct PortfolioSummaryTool;

#[async_trait::async_trait]
impl Tool for PortfolioSummaryTool {
    fn name(&self) -> &'static str {
        "portfolio_summary"
    }

    fn description(&self) -> &'static str {
        "Get a summary of the entire portfolio including total value, allocations by asset class, \
         top holdings, and performance. Use when the user asks about their portfolio overview, \
         total value, what they own, or asset allocation."
    }

    fn parameters(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _input: &ToolInput) -> Result<Value> {
        let details = current_source()?.portfolio_details().await?;
        let summary = details.get("summary").cloned().unwrap_or(Value::Null);
        let mut holdings = items(&details, "holdings");
        holdings.sort_by(by_value_desc);

        let top_holdings: Vec<Value> = holdings
            .iter()
            .take(5)
            .map(|h| {
                json!({
                    "symbol": text(h, "symbol"),
                    "name": text(h, "name"),
                    "value": raw(h, "valueInBaseCurrency"),
                    "weight_pct": pct(h, "allocationInPercentage"),
                    "performance_pct": pct(h, "netPerformancePercent"),
                })
            })
            .collect();

        let mut allocation = Map::new();
        for h in &holdings {
            let class = h
                .get("assetClass")
                .and_then(Value::as_str)
                .unwrap_or("UNKNOWN")
                .to_string();
            let current = allocation.get(&class).and_then(Value::as_f64).unwrap_or(0.0);
            allocation.insert(class, json!(round2(current + num(h, "valueInBaseCurrency"))));
        }

        Ok(json!({
            "total_value": raw(&summary, "currentValueInBaseCurrency"),
            "total_investment": raw(&summary, "totalInvestment"),
            "net_performance": raw(&summary, "netPerformance"),
            "net_performance_pct": pct(&summary, "netPerformancePercentage"),
            "gross_performance": raw(&summary, "grossPerformance"),
            "annualized_return_pct": pct(&summary, "annualizedPerformancePercent"),
            "dividend_in_base_currency": raw(&summary, "dividendInBaseCurrency"),
            "fees": raw(&summary, "fees"),
            "cash": raw(&summary, "cash"),
            "holdings_count": holdings.len(),
            "top_holdings": top_holdings,
            "allocation_by_asset_class": allocation,
        }))
    }
}

//
// ================= portfolio_performance =================
//

pub struct PortfolioPerformanceTool;

#[async_trait::async_trait]
impl Tool for PortfolioPerformanceTool {
    fn name(&self) -> &'static str {
        "portfolio_performance"
    }

    fn description(&self) -> &'static str {
        "Get portfolio performance metrics for a time range (1d, 1w, 1m, 3m, 6m, ytd, 1y, 3y, 5y, max). \
         Use when the user asks about returns, gains, losses, or how the portfolio performed."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "date_range": { "type": "string", "enum": VALID_RANGES, "default": DEFAULT_RANGE }
            }
        })
    }

    async fn execute(&self, input: &ToolInput) -> Result<Value> {
        let date_range = str_param(input, "date_range")
            .map(str::to_lowercase)
            .filter(|r| VALID_RANGES.contains(&r.as_str()))
            .unwrap_or_else(|| DEFAULT_RANGE.to_string());

        let data = current_source()?.portfolio_performance(&date_range).await?;
        let perf = data.get("performance").cloned().unwrap_or(Value::Null);
        let chart = items(&data, "chart");

        Ok(json!({
            "date_range": date_range,
            "net_performance": raw(&perf, "netPerformance"),
            "net_performance_pct": pct(&perf, "netPerformancePercentage"),
            "total_investment": raw(&perf, "totalInvestment"),
            "current_value": raw(&perf, "currentValueInBaseCurrency"),
            "current_net_worth": raw(&perf, "currentNetWorth"),
            "chart_points": chart.len(),
            "first_date": chart.first().map(|p| text(p, "date")).unwrap_or_default(),
            "last_date": chart.last().map(|p| text(p, "date")).unwrap_or_default(),
        }))
    }
}

//
// ================= holding_detail =================
//

pub struct HoldingDetailTool;

#[async_trait::async_trait]
impl Tool for HoldingDetailTool {
    fn name(&self) -> &'static str {
        "holding_detail"
    }

    fn description(&self) -> &'static str {
        "Get detailed information about a specific holding: value, quantity, average cost, \
         performance, dividends, sectors and countries. Use when the user asks about a specific \
         stock or ETF they hold."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "symbol": { "type": "string", "description": "Ticker symbol, e.g. AAPL" },
                "data_source": { "type": "string", "default": DEFAULT_DATA_SOURCE }
            },
            "required": ["symbol"]
        })
    }

    async fn execute(&self, input: &ToolInput) -> Result<Value> {
        let symbol = symbol_arg(input)?;
        let data_source = data_source_arg(input);
        let detail = current_source()?.holding_detail(&data_source, &symbol).await?;

        Ok(json!({
            "symbol": symbol,
            "data_source": data_source,
            "name": text(&detail, "name"),
            "currency": detail.get("currency").and_then(Value::as_str).unwrap_or("USD"),
            "market_price": raw(&detail, "marketPrice"),
            "quantity": raw(&detail, "quantity"),
            "value": raw(&detail, "value"),
            "average_price": raw(&detail, "averagePrice"),
            "investment": raw(&detail, "investment"),
            "gross_performance": raw(&detail, "grossPerformance"),
            "gross_performance_pct": pct(&detail, "grossPerformancePercent"),
            "net_performance": raw(&detail, "netPerformance"),
            "net_performance_pct": pct(&detail, "netPerformancePercent"),
            "dividend": raw(&detail, "dividend"),
            "first_buy_date": text(&detail, "firstBuyDate"),
            "asset_class": text(&detail, "assetClass"),
            "asset_sub_class": text(&detail, "assetSubClass"),
            "sectors": detail.get("sectors").cloned().unwrap_or_else(|| json!([])),
            "countries": detail.get("countries").cloned().unwrap_or_else(|| json!([])),
        }))
    }
}

//
// ================= transactions =================
//

pub struct TransactionsTool;

#[async_trait::async_trait]
impl Tool for TransactionsTool {
    fn name(&self) -> &'static str {
        "transactions"
    }

    fn description(&self) -> &'static str {
        "Get transaction/order history, optionally filtered by symbol or asset class. Returns buy/sell \
         orders with dates, quantities and prices. Use when the user asks about their trades or \
         purchase history."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "symbol": { "type": "string" },
                "asset_class": { "type": "string" },
                "take": { "type": "integer", "default": DEFAULT_TAKE },
                "skip": { "type": "integer", "default": 0 }
            }
        })
    }

    async fn execute(&self, input: &ToolInput) -> Result<Value> {
        let take = input
            .parameters
            .get("take")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_TAKE);
        let skip = input.parameters.get("skip").and_then(Value::as_u64).unwrap_or(0);
        let query = OrderQuery {
            take: u32::try_from(take).unwrap_or(u32::MAX),
            skip: u32::try_from(skip).unwrap_or(u32::MAX),
            asset_class: str_param(input, "asset_class").map(str::to_string),
        };

        let data = current_source()?.orders(&query).await?;
        let mut activities = if data.is_array() {
            items(&data, "")
        } else {
            items(&data, "activities")
        };

        if let Some(symbol) = str_param(input, "symbol") {
            activities.retain(|a| {
                a.get("SymbolProfile")
                    .and_then(|p| p.get("symbol"))
                    .and_then(Value::as_str)
                    .is_some_and(|s| s.eq_ignore_ascii_case(symbol))
            });
        }

        let shown: Vec<Value> = activities
            .iter()
            .take(take as usize)
            .map(|act| {
                let profile = act.get("SymbolProfile").cloned().unwrap_or(Value::Null);
                let account = act.get("Account").cloned().unwrap_or(Value::Null);
                json!({
                    "date": text(act, "date"),
                    "type": text(act, "type"),
                    "symbol": text(&profile, "symbol"),
                    "name": text(&profile, "name"),
                    "quantity": raw(act, "quantity"),
                    "unit_price": raw(act, "unitPrice"),
                    "fee": raw(act, "fee"),
                    "currency": text(&profile, "currency"),
                    "account_name": text(&account, "name"),
                })
            })
            .collect();

        Ok(json!({
            "total_count": activities.len(),
            "showing": shown.len(),
            "transactions": shown,
        }))
    }
}

//
// ================= dividend_history =================
//

pub struct DividendHistoryTool;

#[async_trait::async_trait]
impl Tool for DividendHistoryTool {
    fn name(&self) -> &'static str {
        "dividend_history"
    }

    fn description(&self) -> &'static str {
        "Get dividend payment history for a specific holding. Use when the user asks about \
         dividends received from a stock or ETF."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "symbol": { "type": "string" },
                "data_source": { "type": "string", "default": DEFAULT_DATA_SOURCE }
            },
            "required": ["symbol"]
        })
    }

    async fn execute(&self, input: &ToolInput) -> Result<Value> {
        let symbol = symbol_arg(input)?;
        let data_source = data_source_arg(input);
        let data = current_source()?.dividends(&data_source, &symbol).await?;

        let dividends = if data.is_array() {
            items(&data, "")
        } else {
            items(&data, "dividends")
        };
        let total: f64 = dividends.iter().map(|d| num(d, "amount")).sum();

        Ok(json!({
            "symbol": symbol,
            "data_source": data_source,
            "total_dividends_received": round2(total),
            "payment_count": dividends.len(),
            "payments": dividends
                .iter()
                .map(|d| json!({ "date": text(d, "date"), "amount": raw(d, "amount") }))
                .collect::<Vec<_>>(),
        }))
    }
}

//
// ================= symbol_search =================
//

pub struct SymbolSearchTool;

#[async_trait::async_trait]
impl Tool for SymbolSearchTool {
    fn name(&self) -> &'static str {
        "symbol_search"
    }

    fn description(&self) -> &'static str {
        "Search for a stock, ETF, or fund symbol by name or ticker. Use when the user mentions a \
         company name and the ticker needs to be resolved."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "query": { "type": "string" } },
            "required": ["query"]
        })
    }

    async fn execute(&self, input: &ToolInput) -> Result<Value> {
        let query = require_str(input, "query")?;
        let data = current_source()?.lookup_symbol(query).await?;
        let results: Vec<Value> = items(&data, "items")
            .iter()
            .take(SYMBOL_SEARCH_LIMIT)
            .map(|item| {
                json!({
                    "symbol": text(item, "symbol"),
                    "name": text(item, "name"),
                    "data_source": text(item, "dataSource"),
                    "asset_class": text(item, "assetClass"),
                    "asset_sub_class": text(item, "assetSubClass"),
                    "currency": text(item, "currency"),
                })
            })
            .collect();

        Ok(json!({
            "query": query,
            "results_count": results.len(),
            "results": results,
        }))
    }
}

//
// ================= market_sentiment =================
//

pub struct MarketSentimentTool;

#[async_trait::async_trait]
impl Tool for MarketSentimentTool {
    fn name(&self) -> &'static str {
        "market_sentiment"
    }

    fn description(&self) -> &'static str {
        "Analyze portfolio risk and diversification: sector concentration, asset class breakdown, \
         geographic exposure, and over-concentration flags. Use when the user asks about risk, \
         diversification, or portfolio health."
    }

    fn parameters(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _input: &ToolInput) -> Result<Value> {
        let details = current_source()?.portfolio_details().await?;
        let mut holdings = items(&details, "holdings");
        if holdings.is_empty() {
            return Err(OrchestrationError::ToolError("No holdings found in portfolio".to_string()));
        }

        let total_value: f64 = holdings.iter().map(|h| num(h, "valueInBaseCurrency")).sum();
        if total_value == 0.0 {
            return Err(OrchestrationError::ToolError("Portfolio total value is zero".to_string()));
        }
        holdings.sort_by(by_value_desc);

        let sectors = weighted_allocation(&holdings, "sectors", total_value);
        let mut countries = weighted_allocation(&holdings, "countries", total_value);
        countries.truncate(10);

        let mut asset_classes = Map::new();
        for h in &holdings {
            let class = h
                .get("assetClass")
                .and_then(Value::as_str)
                .unwrap_or("UNKNOWN")
                .to_string();
            let current = asset_classes.get(&class).and_then(Value::as_f64).unwrap_or(0.0);
            asset_classes.insert(class, json!(current + num(h, "valueInBaseCurrency")));
        }
        for v in asset_classes.values_mut() {
            *v = json!(round2(v.as_f64().unwrap_or(0.0) / total_value * 100.0));
        }

        let top = &holdings[0];
        let top_symbol = text(top, "symbol");
        let top_holding_pct = round2(num(top, "valueInBaseCurrency") / total_value * 100.0);
        let top_3_value: f64 = holdings
            .iter()
            .take(3)
            .map(|h| num(h, "valueInBaseCurrency"))
            .sum();
        let top_3_pct = round2(top_3_value / total_value * 100.0);

        let mut risk_flags = Vec::new();
        if top_holding_pct > 25.0 {
            let shown = if top_symbol.is_empty() { "?" } else { top_symbol.as_str() };
            risk_flags.push(format!(
                "Single holding concentration: {} at {}%",
                shown, top_holding_pct
            ));
        }
        if top_3_pct > 60.0 {
            risk_flags.push(format!("Top 3 holdings represent {}% of portfolio", top_3_pct));
        }
        if holdings.len() < 5 {
            risk_flags.push(format!("Low diversification: only {} holdings", holdings.len()));
        }
        if sectors.len() <= 2 {
            risk_flags.push("Narrow sector exposure".to_string());
        }

        let diversification_score = match risk_flags.len() {
            0 => "good",
            1 | 2 => "moderate",
            _ => "low",
        };

        Ok(json!({
            "total_value": round2(total_value),
            "holdings_count": holdings.len(),
            "sector_allocation": allocation_list(&sectors),
            "geographic_allocation": allocation_list(&countries),
            "asset_class_allocation": asset_classes,
            "concentration": {
                "top_holding_pct": top_holding_pct,
                "top_holding_symbol": top_symbol,
                "top_3_pct": top_3_pct,
            },
            "risk_flags": risk_flags,
            "diversification_score": diversification_score,
        }))
    }
}
