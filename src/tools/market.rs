//! Public market data tools

use super::{direction, require_str, round2, str_param, Tool};
use crate::client::{MarketData, PriceHistory};
use crate::error::OrchestrationError;
use crate::models::ToolInput;
use crate::Result;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

/// SPDR sector ETFs used as a proxy for S&P 500 sector performance
pub const SECTOR_ETFS: &[(&str, &str)] = &[
    ("Technology", "XLK"),
    ("Healthcare", "XLV"),
    ("Financials", "XLF"),
    ("Consumer Discretionary", "XLY"),
    ("Consumer Staples", "XLP"),
    ("Energy", "XLE"),
    ("Industrials", "XLI"),
    ("Materials", "XLB"),
    ("Real Estate", "XLRE"),
    ("Utilities", "XLU"),
    ("Communication Services", "XLC"),
];

fn symbol_arg(input: &ToolInput) -> Result<String> {
    Ok(require_str(input, "symbol")?.to_uppercase())
}

/// Resolve a user period against a table of (period, chart range, interval)
fn resolve_period(
    input: &ToolInput,
    table: &[(&'static str, &'static str, &'static str)],
    default: &'static str,
) -> (&'static str, &'static str, &'static str) {
    let requested = str_param(input, "period").map(str::to_lowercase);
    table
        .iter()
        .find(|(p, _, _)| Some(*p) == requested.as_deref())
        .or_else(|| table.iter().find(|(p, _, _)| *p == default))
        .copied()
        .unwrap_or(table[0])
}

fn require_bars(history: &PriceHistory) -> Result<()> {
    if history.bars.is_empty() {
        return Err(OrchestrationError::ToolError(format!(
            "No data found for {}",
            history.symbol
        )));
    }
    Ok(())
}

fn change_pct(start: f64, end: f64) -> f64 {
    if start > 0.0 {
        (end - start) / start * 100.0
    } else {
        0.0
    }
}

//
// ================= stock_price =================
//

pub struct StockPriceTool {
    market: Arc<dyn MarketData>,
}

impl StockPriceTool {
    pub fn new(market: Arc<dyn MarketData>) -> Self {
        Self { market }
    }
}

#[async_trait::async_trait]
impl Tool for StockPriceTool {
    fn name(&self) -> &'static str {
        "stock_price"
    }

    fn description(&self) -> &'static str {
        "Get the current market price for a stock, ETF, or cryptocurrency, with previous close and \
         day change. Use when the user asks 'what is the price of X' or 'how much is X trading at'."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "symbol": { "type": "string", "description": "e.g. AAPL, VOO, BTC-USD" } },
            "required": ["symbol"]
        })
    }

    async fn execute(&self, input: &ToolInput) -> Result<Value> {
        let symbol = symbol_arg(input)?;
        let history = self.market.history(&symbol, "5d", "1d").await?;
        require_bars(&history)?;

        let n = history.bars.len();
        let last = &history.bars[n - 1];
        let previous_close = if n >= 2 {
            history.bars[n - 2].close
        } else {
            history.previous_close.unwrap_or(0.0)
        };

        let mut result = json!({
            "symbol": symbol,
            "current_price": round2(last.close),
            "previous_close": round2(previous_close),
            "open": round2(last.open),
            "day_high": round2(last.high),
            "day_low": round2(last.low),
            "currency": history.currency,
        });
        if previous_close > 0.0 {
            result["day_change"] = json!(round2(last.close - previous_close));
            result["day_change_pct"] = json!(round2(change_pct(previous_close, last.close)));
        }
        Ok(result)
    }
}

//
// ================= stock_trend =================
//

const TREND_PERIODS: &[(&str, &str, &str)] = &[("1d", "1d", "5m"), ("1w", "5d", "1h")];

pub struct StockTrendTool {
    market: Arc<dyn MarketData>,
}

impl StockTrendTool {
    pub fn new(market: Arc<dyn MarketData>) -> Self {
        Self { market }
    }
}

#[async_trait::async_trait]
impl Tool for StockTrendTool {
    fn name(&self) -> &'static str {
        "stock_trend"
    }

    fn description(&self) -> &'static str {
        "Get a stock's price trend over a day ('1d') or week ('1w', default) with data points and a \
         high/low/change summary. Use when the user asks how a symbol has trended."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "symbol": { "type": "string" },
                "period": { "type": "string", "enum": ["1d", "1w"], "default": "1w" }
            },
            "required": ["symbol"]
        })
    }

    async fn execute(&self, input: &ToolInput) -> Result<Value> {
        let symbol = symbol_arg(input)?;
        let (period, range, interval) = resolve_period(input, TREND_PERIODS, "1w");
        let history = self.market.history(&symbol, range, interval).await?;
        require_bars(&history)?;

        let closes: Vec<f64> = history.bars.iter().map(|b| b.close).collect();
        let start = closes[0];
        let end = closes[closes.len() - 1];
        let high = closes.iter().copied().fold(f64::MIN, f64::max);
        let low = closes.iter().copied().fold(f64::MAX, f64::min);
        let change = end - start;

        let data_points: Vec<Value> = history
            .bars
            .iter()
            .map(|b| {
                json!({
                    "datetime": b.timestamp.format("%Y-%m-%d %H:%M").to_string(),
                    "close": round2(b.close),
                    "volume": b.volume,
                })
            })
            .collect();

        Ok(json!({
            "symbol": symbol,
            "period": period,
            "start_price": round2(start),
            "end_price": round2(end),
            "high": round2(high),
            "low": round2(low),
            "change": round2(change),
            "change_pct": round2(change_pct(start, end)),
            "direction": direction(change),
            "data_points_count": data_points.len(),
            "data_points": data_points,
        }))
    }
}

//
// ================= sector_performance =================
//

const SECTOR_PERIODS: &[(&str, &str, &str)] = &[
    ("1d", "1d", "1d"),
    ("1w", "5d", "1d"),
    ("1m", "1mo", "1d"),
];

pub struct SectorPerformanceTool {
    market: Arc<dyn MarketData>,
}

impl SectorPerformanceTool {
    pub fn new(market: Arc<dyn MarketData>) -> Self {
        Self { market }
    }
}

#[async_trait::async_trait]
impl Tool for SectorPerformanceTool {
    fn name(&self) -> &'static str {
        "sector_performance"
    }

    fn description(&self) -> &'static str {
        "Get overall market performance by sector using SPDR sector ETFs over '1d', '1w' (default) \
         or '1m'. Use when the user asks how the market is doing or which sectors are up."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "period": { "type": "string", "enum": ["1d", "1w", "1m"], "default": "1w" }
            }
        })
    }

    async fn execute(&self, input: &ToolInput) -> Result<Value> {
        let (period, range, interval) = resolve_period(input, SECTOR_PERIODS, "1w");

        let mut sectors: Vec<(f64, Value)> = Vec::new();
        let mut unavailable: Vec<Value> = Vec::new();

        for (name, etf) in SECTOR_ETFS {
            let history = match self.market.history(etf, range, interval).await {
                Ok(h) if !h.bars.is_empty() => h,
                Ok(_) => {
                    unavailable.push(json!({ "name": name, "etf": etf, "error": "data unavailable" }));
                    continue;
                }
                Err(e) if e.is_turn_fatal() => return Err(e),
                Err(e) => {
                    debug!(etf, error = %e, "Sector ETF fetch failed");
                    unavailable.push(json!({ "name": name, "etf": etf, "error": "data unavailable" }));
                    continue;
                }
            };

            let end = history.bars[history.bars.len() - 1].close;
            // A single daily bar has no in-range start; measure from the prior close
            let start = if history.bars.len() > 1 {
                history.bars[0].close
            } else {
                history.previous_close.unwrap_or(history.bars[0].close)
            };
            let pct = round2(change_pct(start, end));
            sectors.push((
                pct,
                json!({
                    "name": name,
                    "etf": etf,
                    "current_price": round2(end),
                    "change_pct": pct,
                    "direction": direction(pct),
                }),
            ));
        }

        sectors.sort_by(|a, b| b.0.total_cmp(&a.0));
        let sectors_up = sectors.iter().filter(|(p, _)| *p > 0.0).count();
        let sectors_down = sectors.iter().filter(|(p, _)| *p < 0.0).count();
        let best = sectors.first().map(|(_, v)| v.clone());
        let worst = sectors.last().map(|(_, v)| v.clone());

        let mut ranked: Vec<Value> = sectors.into_iter().map(|(_, v)| v).collect();
        ranked.extend(unavailable);

        Ok(json!({
            "period": period,
            "sectors": ranked,
            "best_sector": best,
            "worst_sector": worst,
            "sectors_up": sectors_up,
            "sectors_down": sectors_down,
        }))
    }
}

//
// ================= stock_volume =================
//

const VOLUME_PERIODS: &[(&str, &str, &str)] = &[("1d", "1d", "1d"), ("1w", "5d", "1d")];

fn volume_assessment(latest: u64, average_30d: u64) -> &'static str {
    if average_30d == 0 || latest == 0 {
        return "";
    }
    let ratio = latest as f64 / average_30d as f64;
    if ratio > 1.5 {
        "significantly above average"
    } else if ratio > 1.1 {
        "above average"
    } else if ratio < 0.5 {
        "significantly below average"
    } else if ratio < 0.9 {
        "below average"
    } else {
        "near average"
    }
}

pub struct StockVolumeTool {
    market: Arc<dyn MarketData>,
}

impl StockVolumeTool {
    pub fn new(market: Arc<dyn MarketData>) -> Self {
        Self { market }
    }
}

#[async_trait::async_trait]
impl Tool for StockVolumeTool {
    fn name(&self) -> &'static str {
        "stock_volume"
    }

    fn description(&self) -> &'static str {
        "Get trading volume for a stock over '1d' or '1w' (default): daily volumes, period and \
         30-day averages, and an above/below average assessment. Use for questions about trading \
         volume or activity."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "symbol": { "type": "string" },
                "period": { "type": "string", "enum": ["1d", "1w"], "default": "1w" }
            },
            "required": ["symbol"]
        })
    }

    async fn execute(&self, input: &ToolInput) -> Result<Value> {
        let symbol = symbol_arg(input)?;
        let (period, range, interval) = resolve_period(input, VOLUME_PERIODS, "1w");
        let history = self.market.history(&symbol, range, interval).await?;
        require_bars(&history)?;

        let daily: Vec<Value> = history
            .bars
            .iter()
            .map(|b| {
                let price_direction = if b.close >= b.open { "up" } else { "down" };
                json!({
                    "date": b.timestamp.format("%Y-%m-%d").to_string(),
                    "volume": b.volume,
                    "close": round2(b.close),
                    "price_direction": price_direction,
                })
            })
            .collect();

        let total_volume: u64 = history.bars.iter().map(|b| b.volume).sum();
        let average_period = total_volume / history.bars.len() as u64;

        let month = self.market.history(&symbol, "1mo", "1d").await?;
        let average_30d = if month.bars.is_empty() {
            0
        } else {
            month.bars.iter().map(|b| b.volume).sum::<u64>() / month.bars.len() as u64
        };

        let latest = &history.bars[history.bars.len() - 1];
        Ok(json!({
            "symbol": symbol,
            "period": period,
            "latest_volume": latest.volume,
            "latest_date": latest.timestamp.format("%Y-%m-%d").to_string(),
            "average_volume_period": average_period,
            "average_volume_30d": average_30d,
            "volume_assessment": volume_assessment(latest.volume, average_30d),
            "total_volume": total_volume,
            "daily_breakdown": daily,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockMarket;

    fn input(parameters: Value) -> ToolInput {
        ToolInput {
            tool_name: "test".to_string(),
            parameters,
        }
    }

    fn market() -> Arc<dyn MarketData> {
        Arc::new(MockMarket::new())
    }

    #[tokio::test]
    async fn test_stock_price_day_change() {
        let out = StockPriceTool::new(market())
            .execute(&input(json!({ "symbol": "aapl" })))
            .await
            .unwrap();
        assert_eq!(out["symbol"], "AAPL");
        assert_eq!(out["current_price"], json!(104.0));
        assert_eq!(out["previous_close"], json!(103.0));
        assert_eq!(out["day_change"], json!(1.0));
        assert_eq!(out["day_change_pct"], json!(0.97));
    }

    #[tokio::test]
    async fn test_stock_trend_defaults_to_week() {
        let out = StockTrendTool::new(market())
            .execute(&input(json!({ "symbol": "MSFT", "period": "10y" })))
            .await
            .unwrap();
        assert_eq!(out["period"], "1w");
        assert_eq!(out["start_price"], json!(100.0));
        assert_eq!(out["end_price"], json!(104.0));
        assert_eq!(out["direction"], "up");
        assert_eq!(out["data_points_count"], 5);
    }

    #[tokio::test]
    async fn test_unknown_symbol_errors() {
        let err = StockTrendTool::new(market())
            .execute(&input(json!({ "symbol": "ZZZZ" })))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::ToolError(_)));
    }

    #[tokio::test]
    async fn test_sector_performance_ranks_sectors() {
        let out = SectorPerformanceTool::new(market())
            .execute(&input(json!({})))
            .await
            .unwrap();
        assert_eq!(out["period"], "1w");
        assert_eq!(out["sectors"].as_array().unwrap().len(), SECTOR_ETFS.len());
        assert_eq!(out["sectors_up"], SECTOR_ETFS.len());
        assert_eq!(out["best_sector"]["change_pct"], json!(4.0));
    }

    #[tokio::test]
    async fn test_stock_volume_assessment() {
        let out = StockVolumeTool::new(market())
            .execute(&input(json!({ "symbol": "VOO", "period": "1w" })))
            .await
            .unwrap();
        assert_eq!(out["latest_volume"], 1400);
        assert_eq!(out["total_volume"], 6000);
        assert_eq!(out["average_volume_period"], 1200);
        assert_eq!(out["average_volume_30d"], 1200);
        assert_eq!(out["volume_assessment"], "above average");
    }

    #[test]
    fn test_volume_thresholds() {
        assert_eq!(volume_assessment(200, 100), "significantly above average");
        assert_eq!(volume_assessment(100, 100), "near average");
        assert_eq!(volume_assessment(40, 100), "significantly below average");
        assert_eq!(volume_assessment(80, 100), "below average");
        assert_eq!(volume_assessment(0, 100), "");
    }
}
