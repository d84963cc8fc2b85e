//! Per-endpoint-family normalization of raw provider payloads into the
//! stable internal shapes. Raw field names follow the provider's aggregate
//! row schema (`T`/`o`/`h`/`l`/`c`/`v`/`vw`/`t`).

use chrono::Utc;
use serde::Deserialize;

use crate::error::MarketError;
use crate::market::types::{
    MarketType, NormalizedAsset, NormalizedCandle, NormalizedOverview, NormalizedSummary,
    SearchResult,
};
use crate::time_util;

/// Overview rankings consider at most this many symbols, ranked by volume.
const OVERVIEW_UNIVERSE: usize = 500;
/// Entries per ranking list (gainers, losers, most active).
const RANKING_SIZE: usize = 10;

#[derive(Debug, Deserialize)]
pub struct RawAggsResponse {
    pub status: Option<String>,
    pub results: Option<Vec<RawAggRow>>,
}

#[derive(Debug, Deserialize)]
pub struct RawAggRow {
    #[serde(rename = "T")]
    pub symbol: Option<String>,
    pub o: Option<f64>,
    pub h: Option<f64>,
    pub l: Option<f64>,
    pub c: Option<f64>,
    pub v: Option<f64>,
    pub vw: Option<f64>,
    pub t: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct RawTickerDetailResponse {
    pub results: Option<RawTickerRow>,
}

#[derive(Debug, Deserialize)]
pub struct RawTickerSearchResponse {
    pub results: Option<Vec<RawTickerRow>>,
}

#[derive(Debug, Deserialize)]
pub struct RawTickerRow {
    pub ticker: Option<String>,
    pub name: Option<String>,
    pub market: Option<String>,
    pub currency_name: Option<String>,
    pub active: Option<bool>,
    pub description: Option<String>,
    pub market_cap: Option<f64>,
    pub primary_exchange: Option<String>,
    pub homepage_url: Option<String>,
}

fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// One grouped-daily row to a summary. Rows missing required fields are
/// skipped by the caller, matching upstream behaviour for stub tickers.
fn summary_from_row(row: &RawAggRow) -> Option<NormalizedSummary> {
    let symbol = row.symbol.as_deref()?.to_string();
    let open = row.o?;
    let close = row.c?;
    let volume = row.v?;
    if !open.is_finite() || !close.is_finite() || !volume.is_finite() {
        return None;
    }
    let change = close - open;
    let change_percent = if open > 0.0 { change / open * 100.0 } else { 0.0 };
    Some(NormalizedSummary {
        symbol,
        open,
        high: row.h.unwrap_or(close),
        low: row.l.unwrap_or(close),
        close,
        volume,
        vwap: row.vw,
        change: round_to(change, 4),
        change_percent: round_to(change_percent, 2),
    })
}

/// Grouped-daily payload to summaries. A payload with no usable rows at all
/// is malformed, not an empty market.
pub fn normalize_grouped_daily(
    raw: &RawAggsResponse,
) -> Result<Vec<NormalizedSummary>, MarketError> {
    let rows = raw
        .results
        .as_ref()
        .ok_or_else(|| MarketError::UpstreamDataError("grouped daily: missing results".into()))?;
    let summaries: Vec<NormalizedSummary> = rows.iter().filter_map(summary_from_row).collect();
    if summaries.is_empty() && !rows.is_empty() {
        return Err(MarketError::UpstreamDataError(
            "grouped daily: no row carried the required fields".into(),
        ));
    }
    Ok(summaries)
}

/// Rankings over one grouped-daily snapshot, restricted to the
/// top-by-volume universe.
pub fn build_overview(
    market: MarketType,
    mut summaries: Vec<NormalizedSummary>,
) -> NormalizedOverview {
    summaries.sort_by(|a, b| b.volume.partial_cmp(&a.volume).unwrap_or(std::cmp::Ordering::Equal));
    summaries.truncate(OVERVIEW_UNIVERSE);

    let mut gainers: Vec<NormalizedSummary> = summaries
        .iter()
        .filter(|s| s.change_percent > 0.0)
        .cloned()
        .collect();
    gainers.sort_by(|a, b| {
        b.change_percent
            .partial_cmp(&a.change_percent)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    gainers.truncate(RANKING_SIZE);

    let mut losers: Vec<NormalizedSummary> = summaries
        .iter()
        .filter(|s| s.change_percent < 0.0)
        .cloned()
        .collect();
    losers.sort_by(|a, b| {
        a.change_percent
            .partial_cmp(&b.change_percent)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    losers.truncate(RANKING_SIZE);

    // summaries are already volume-sorted
    let most_active: Vec<NormalizedSummary> =
        summaries.iter().take(RANKING_SIZE).cloned().collect();

    let total_assets = {
        let mut symbols: Vec<&str> = summaries.iter().map(|s| s.symbol.as_str()).collect();
        symbols.sort_unstable();
        symbols.dedup();
        symbols.len()
    };

    NormalizedOverview {
        market,
        total_assets,
        last_updated: Utc::now(),
        top_gainers: gainers,
        top_losers: losers,
        most_active,
    }
}

/// Grouped-daily rows to a de-duplicated asset list. Name falls back to the
/// symbol; the listing endpoint has no company names.
pub fn normalize_asset_list(
    raw: &RawAggsResponse,
    market: MarketType,
) -> Result<Vec<NormalizedAsset>, MarketError> {
    let summaries = normalize_grouped_daily(raw)?;
    let mut seen = std::collections::HashSet::new();
    let mut assets = Vec::with_capacity(summaries.len());
    for s in summaries {
        if !seen.insert(s.symbol.clone()) {
            continue;
        }
        assets.push(NormalizedAsset {
            symbol: s.symbol.clone(),
            name: s.symbol.clone(),
            market,
            currency: "USD".to_string(),
            active: true,
            price: Some(s.close),
            change: Some(s.change),
            change_percent: Some(s.change_percent),
            volume: Some(s.volume.max(0.0) as u64),
            description: None,
            market_cap: None,
            primary_exchange: None,
            homepage_url: None,
        });
    }
    Ok(assets)
}

/// Ticker-detail payload to a single asset. Optional provider fields get
/// explicit defaults; a missing results object is malformed.
pub fn normalize_ticker_detail(
    raw: &RawTickerDetailResponse,
) -> Result<NormalizedAsset, MarketError> {
    let row = raw
        .results
        .as_ref()
        .ok_or_else(|| MarketError::UpstreamDataError("ticker detail: missing results".into()))?;
    asset_from_ticker_row(row)
        .ok_or_else(|| MarketError::UpstreamDataError("ticker detail: missing ticker field".into()))
}

fn asset_from_ticker_row(row: &RawTickerRow) -> Option<NormalizedAsset> {
    let symbol = row.ticker.as_deref()?.to_string();
    Some(NormalizedAsset {
        name: row.name.clone().unwrap_or_else(|| symbol.clone()),
        market: MarketType::from_provider(row.market.as_deref().unwrap_or("")),
        currency: row
            .currency_name
            .clone()
            .unwrap_or_else(|| "USD".to_string())
            .to_ascii_uppercase(),
        active: row.active.unwrap_or(true),
        price: None,
        change: None,
        change_percent: None,
        volume: None,
        description: row.description.clone(),
        market_cap: row.market_cap,
        primary_exchange: row.primary_exchange.clone(),
        homepage_url: row.homepage_url.clone(),
        symbol,
    })
}

/// Bars payload to an ascending-time candle series.
///
/// The provider is not trusted to order the series; it is re-sorted here and
/// duplicate timestamps are rejected rather than silently merged.
pub fn normalize_candles(raw: &RawAggsResponse) -> Result<Vec<NormalizedCandle>, MarketError> {
    let rows = raw
        .results
        .as_ref()
        .ok_or_else(|| MarketError::UpstreamDataError("bars: missing results".into()))?;

    let mut candles = Vec::with_capacity(rows.len());
    for row in rows {
        let (ts, open, high, low, close, volume) =
            match (row.t, row.o, row.h, row.l, row.c, row.v) {
                (Some(t), Some(o), Some(h), Some(l), Some(c), Some(v)) => (t, o, h, l, c, v),
                _ => {
                    return Err(MarketError::UpstreamDataError(
                        "bars: row missing required OHLCV fields".into(),
                    ))
                }
            };
        if ![open, high, low, close, volume].iter().all(|x| x.is_finite()) {
            return Err(MarketError::UpstreamDataError(
                "bars: non-finite OHLCV value".into(),
            ));
        }
        if let Err(e) = time_util::mill_ts_to_datetime(ts) {
            return Err(MarketError::UpstreamDataError(format!(
                "bars: unrepresentable timestamp {}: {}",
                ts, e
            )));
        }
        candles.push(NormalizedCandle {
            ts,
            open,
            high,
            low,
            close,
            volume,
        });
    }

    candles.sort_by_key(|c| c.ts);
    for pair in candles.windows(2) {
        if pair[0].ts == pair[1].ts {
            return Err(MarketError::UpstreamDataError(format!(
                "bars: duplicate timestamp {}",
                pair[0].ts
            )));
        }
    }
    Ok(candles)
}

/// Search payload to hits. Rows without a ticker are dropped; everything
/// else defaults rather than erroring, search is best-effort.
pub fn normalize_search(raw: &RawTickerSearchResponse) -> Vec<SearchResult> {
    raw.results
        .as_deref()
        .unwrap_or(&[])
        .iter()
        .filter_map(|row| {
            let asset = asset_from_ticker_row(row)?;
            Some(SearchResult {
                symbol: asset.symbol,
                name: asset.name,
                market: asset.market,
                currency: asset.currency,
                active: asset.active,
            })
        })
        .collect()
}
