use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::{debug, warn};

use crate::app_config::env::ProviderConfig;
use crate::error::MarketError;
use crate::market::normalize::{
    self, RawAggsResponse, RawTickerDetailResponse, RawTickerSearchResponse,
};
use crate::market::types::{
    CandleQuery, MarketType, NormalizedAsset, NormalizedCandle, NormalizedOverview, SearchResult,
};
use crate::market::validate;
use crate::time_util;

/// Capability seam between the service and the provider. The production
/// implementation is [`PolygonGateway`]; tests substitute their own.
#[async_trait]
pub trait MarketGateway: Send + Sync {
    async fn fetch_overview(&self, market: MarketType) -> Result<NormalizedOverview, MarketError>;

    async fn fetch_assets(
        &self,
        market: MarketType,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<NormalizedAsset>, MarketError>;

    async fn fetch_asset_detail(&self, symbol: &str) -> Result<NormalizedAsset, MarketError>;

    async fn fetch_candles(&self, query: &CandleQuery)
        -> Result<Vec<NormalizedCandle>, MarketError>;

    async fn search(
        &self,
        query: &str,
        market: Option<MarketType>,
        limit: u32,
    ) -> Result<Vec<SearchResult>, MarketError>;
}

/// HTTP gateway to the market-data provider.
///
/// Applies the configured per-request timeout, retries transient failures
/// with exponential backoff, and hands every payload to the normalization
/// layer before anything leaves this module.
pub struct PolygonGateway {
    client: Client,
    config: ProviderConfig,
}

impl PolygonGateway {
    pub fn new(config: ProviderConfig) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    fn retry_strategy(&self) -> impl Iterator<Item = std::time::Duration> {
        ExponentialBackoff::from_millis(2)
            .factor(100)
            .map(jitter)
            .take(self.config.max_retries)
    }

    async fn request_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, MarketError> {
        RetryIf::spawn(
            self.retry_strategy(),
            || self.request_json_once::<T>(path, params),
            |err: &MarketError| {
                let transient = matches!(err, MarketError::ProviderUnavailable(_));
                if transient {
                    warn!(path, "transient provider failure, retrying: {}", err);
                }
                transient
            },
        )
        .await
    }

    async fn request_json_once<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, MarketError> {
        let url = format!("{}{}", self.config.base_url, path);
        let response = self
            .client
            .get(&url)
            .query(params)
            .query(&[("apikey", self.config.api_key.as_str())])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    MarketError::ProviderUnavailable(format!("{}: {}", path, e))
                } else {
                    MarketError::ProviderUnavailable(format!("request failed {}: {}", path, e))
                }
            })?;

        let status = response.status();
        debug!(path, %status, "provider response");
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(MarketError::ProviderUnavailable(format!(
                "{} returned {}",
                path, status
            )));
        }
        if !status.is_success() {
            // caller-visible provider rejection, not worth a retry
            let body = response.text().await.unwrap_or_default();
            return Err(MarketError::UpstreamDataError(format!(
                "{} returned {}: {}",
                path,
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| MarketError::ProviderUnavailable(format!("{}: {}", path, e)))?;
        let parsed: T = serde_json::from_str(&body)?;
        Ok(parsed)
    }

    /// Grouped-daily snapshot for the last trading day.
    async fn fetch_grouped_daily(&self, market: MarketType) -> Result<RawAggsResponse, MarketError> {
        let date = time_util::format_date(time_util::last_trading_day_today());
        let path = format!("/v2/aggs/grouped/locale/us/market/{}/{}", market, date);
        let raw: RawAggsResponse = self
            .request_json(
                &path,
                &[
                    ("adjusted", "true".to_string()),
                    ("sort", "volume".to_string()),
                    ("order", "desc".to_string()),
                ],
            )
            .await?;
        check_provider_status(&raw.status)?;
        Ok(raw)
    }
}

fn check_provider_status(status: &Option<String>) -> Result<(), MarketError> {
    match status.as_deref() {
        None | Some("OK") | Some("DELAYED") => Ok(()),
        Some(other) => Err(MarketError::UpstreamDataError(format!(
            "provider status: {}",
            other
        ))),
    }
}

#[async_trait]
impl MarketGateway for PolygonGateway {
    async fn fetch_overview(&self, market: MarketType) -> Result<NormalizedOverview, MarketError> {
        let raw = self.fetch_grouped_daily(market).await?;
        let summaries = normalize::normalize_grouped_daily(&raw)?;
        Ok(normalize::build_overview(market, summaries))
    }

    async fn fetch_assets(
        &self,
        market: MarketType,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<NormalizedAsset>, MarketError> {
        validate::validate_assets_query(limit, offset)?;
        let raw = self.fetch_grouped_daily(market).await?;
        let assets = normalize::normalize_asset_list(&raw, market)?;
        Ok(assets
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn fetch_asset_detail(&self, symbol: &str) -> Result<NormalizedAsset, MarketError> {
        validate::validate_symbol(symbol)?;
        let path = format!("/v3/reference/tickers/{}", symbol.to_ascii_uppercase());
        let raw: RawTickerDetailResponse = self.request_json(&path, &[]).await?;
        normalize::normalize_ticker_detail(&raw)
    }

    async fn fetch_candles(
        &self,
        query: &CandleQuery,
    ) -> Result<Vec<NormalizedCandle>, MarketError> {
        validate::validate_candle_query(query)?;
        let (start, end) = query.resolved_range();
        let path = format!(
            "/v2/aggs/ticker/{}/range/{}/{}/{}/{}",
            query.symbol.to_ascii_uppercase(),
            query.multiplier,
            query.timespan,
            time_util::date_to_mill_ts(start),
            time_util::date_to_mill_ts(end),
        );
        let raw: RawAggsResponse = self
            .request_json(
                &path,
                &[
                    ("adjusted", "true".to_string()),
                    ("sort", "asc".to_string()),
                    ("limit", query.limit.to_string()),
                ],
            )
            .await?;
        check_provider_status(&raw.status)?;
        normalize::normalize_candles(&raw)
    }

    async fn search(
        &self,
        query: &str,
        market: Option<MarketType>,
        limit: u32,
    ) -> Result<Vec<SearchResult>, MarketError> {
        validate::validate_search_query(query, limit)?;
        let mut params = vec![
            ("search", query.trim().to_string()),
            ("limit", limit.to_string()),
            ("active", "true".to_string()),
        ];
        if let Some(market) = market {
            params.push(("market", market.to_string()));
        }
        let raw: RawTickerSearchResponse =
            self.request_json("/v3/reference/tickers", &params).await?;
        Ok(normalize::normalize_search(&raw))
    }
}
