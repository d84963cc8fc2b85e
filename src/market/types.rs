use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MarketError;

/// Provider market families we proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketType {
    Stocks,
    Crypto,
    Fx,
    Indices,
}

impl MarketType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketType::Stocks => "stocks",
            MarketType::Crypto => "crypto",
            MarketType::Fx => "fx",
            MarketType::Indices => "indices",
        }
    }

    /// Provider-side mapping. Unknown provider strings fall back to stocks,
    /// matching upstream behaviour for tickers with exotic market tags.
    pub fn from_provider(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "crypto" => MarketType::Crypto,
            "fx" => MarketType::Fx,
            "indices" => MarketType::Indices,
            _ => MarketType::Stocks,
        }
    }
}

impl fmt::Display for MarketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MarketType {
    type Err = MarketError;

    /// Caller-side parsing is strict: unknown input is a caller error, not
    /// something to silently coerce.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stocks" => Ok(MarketType::Stocks),
            "crypto" => Ok(MarketType::Crypto),
            "fx" => Ok(MarketType::Fx),
            "indices" => Ok(MarketType::Indices),
            other => Err(MarketError::invalid_parameter(format!(
                "unknown market type: {}",
                other
            ))),
        }
    }
}

/// Candle bucket width, in provider terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timespan {
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl Default for Timespan {
    fn default() -> Self {
        Timespan::Day
    }
}

impl Timespan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timespan::Minute => "minute",
            Timespan::Hour => "hour",
            Timespan::Day => "day",
            Timespan::Week => "week",
            Timespan::Month => "month",
            Timespan::Quarter => "quarter",
            Timespan::Year => "year",
        }
    }

    /// Approximate width of one bucket in minutes, used to derive a default
    /// candle date range when the caller omits the start date.
    pub fn approx_minutes(&self) -> i64 {
        match self {
            Timespan::Minute => 1,
            Timespan::Hour => 60,
            Timespan::Day => 60 * 24,
            Timespan::Week => 60 * 24 * 7,
            Timespan::Month => 60 * 24 * 30,
            Timespan::Quarter => 60 * 24 * 90,
            Timespan::Year => 60 * 24 * 365,
        }
    }
}

impl fmt::Display for Timespan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timespan {
    type Err = MarketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "minute" => Ok(Timespan::Minute),
            "hour" => Ok(Timespan::Hour),
            "day" => Ok(Timespan::Day),
            "week" => Ok(Timespan::Week),
            "month" => Ok(Timespan::Month),
            "quarter" => Ok(Timespan::Quarter),
            "year" => Ok(Timespan::Year),
            other => Err(MarketError::invalid_parameter(format!(
                "unknown timespan: {}",
                other
            ))),
        }
    }
}

/// One grouped-daily row after normalization. Backs both the overview
/// rankings and the asset list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedSummary {
    pub symbol: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub vwap: Option<f64>,
    pub change: f64,
    pub change_percent: f64,
}

/// Market overview: rankings derived from one grouped-daily snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedOverview {
    pub market: MarketType,
    pub total_assets: usize,
    pub last_updated: DateTime<Utc>,
    pub top_gainers: Vec<NormalizedSummary>,
    pub top_losers: Vec<NormalizedSummary>,
    pub most_active: Vec<NormalizedSummary>,
}

/// A single asset, either listed from grouped-daily data or enriched via the
/// ticker-detail endpoint. Optional provider fields get explicit defaults so
/// a record is never partially initialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedAsset {
    pub symbol: String,
    pub name: String,
    pub market: MarketType,
    pub currency: String,
    pub active: bool,
    pub price: Option<f64>,
    pub change: Option<f64>,
    pub change_percent: Option<f64>,
    pub volume: Option<u64>,
    pub description: Option<String>,
    pub market_cap: Option<f64>,
    pub primary_exchange: Option<String>,
    pub homepage_url: Option<String>,
}

/// One OHLCV bar, timestamp in epoch milliseconds UTC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedCandle {
    pub ts: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Ticker search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub symbol: String,
    pub name: String,
    pub market: MarketType,
    pub currency: String,
    pub active: bool,
}

/// Candle request parameters as the service receives them. Dates are
/// resolved (auto range, last trading day) before the gateway is called.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandleQuery {
    pub symbol: String,
    pub timespan: Timespan,
    pub multiplier: u32,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub limit: u32,
}

impl CandleQuery {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            timespan: Timespan::Day,
            multiplier: 1,
            start_date: None,
            end_date: None,
            limit: 100,
        }
    }

    pub fn timespan(mut self, timespan: Timespan) -> Self {
        self.timespan = timespan;
        self
    }

    pub fn multiplier(mut self, multiplier: u32) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn start_date(mut self, date: NaiveDate) -> Self {
        self.start_date = Some(date);
        self
    }

    pub fn end_date(mut self, date: NaiveDate) -> Self {
        self.end_date = Some(date);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    /// Resolve the date range: an absent end date falls to the last trading
    /// day, an absent start date is derived from the requested window width
    /// (multiplier x limit buckets). Using the resolved range for cache keys
    /// means a request with explicit defaults and one with omitted dates
    /// land on the same entry.
    pub fn resolved_range(&self) -> (NaiveDate, NaiveDate) {
        let end = self
            .end_date
            .unwrap_or_else(crate::time_util::last_trading_day_today);
        let start = self.start_date.unwrap_or_else(|| {
            let minutes = (self.multiplier as i64)
                .saturating_mul(self.limit as i64)
                .saturating_mul(self.timespan.approx_minutes())
                // clamp to a century so chrono arithmetic cannot overflow
                .min(60 * 24 * 365 * 100);
            end - chrono::Duration::minutes(minutes)
        });
        (start, end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candle_range_defaults_derive_from_window() {
        let query = CandleQuery::new("AAPL")
            .timespan(Timespan::Day)
            .multiplier(1)
            .limit(10)
            .end_date(NaiveDate::from_ymd_opt(2024, 6, 14).unwrap());
        let (start, end) = query.resolved_range();
        assert_eq!(end, NaiveDate::from_ymd_opt(2024, 6, 14).unwrap());
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 6, 4).unwrap());
    }

    #[test]
    fn explicit_range_wins() {
        let query = CandleQuery::new("AAPL")
            .start_date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
            .end_date(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        let (start, end) = query.resolved_range();
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
    }

    #[test]
    fn strict_parsing_rejects_unknown_market() {
        assert!("stocks".parse::<MarketType>().is_ok());
        assert!("bonds".parse::<MarketType>().is_err());
        // provider-side mapping is lenient instead
        assert_eq!(MarketType::from_provider("bonds"), MarketType::Stocks);
    }
}
