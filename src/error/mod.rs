use thiserror::Error;

/// 市场数据核心错误 / unified error taxonomy for the market-data core.
///
/// Payloads are plain strings so the whole enum stays `Clone` and a
/// single-flight leader can fan the same failure out to every waiter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarketError {
    /// Caller error. Fails fast, never retried, raised before any cache
    /// or provider contact.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Transient upstream failure, surfaced after internal retries are
    /// exhausted.
    #[error("market data provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Malformed or inconsistent provider payload. Not retried and never
    /// cached.
    #[error("upstream data error: {0}")]
    UpstreamDataError(String),

    /// 缓存后端不可用 / cache backend down. Triggers the degraded bypass
    /// path; only reaches the end caller when the gateway also fails.
    #[error("cache backend unavailable: {0}")]
    BackendUnavailable(String),
}

impl MarketError {
    pub fn invalid_parameter(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }

    /// True when the failure came from the cache backend rather than the
    /// request itself.
    pub fn is_backend_unavailable(&self) -> bool {
        matches!(self, Self::BackendUnavailable(_))
    }
}

impl From<redis::RedisError> for MarketError {
    fn from(err: redis::RedisError) -> Self {
        MarketError::BackendUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for MarketError {
    fn from(err: serde_json::Error) -> Self {
        MarketError::UpstreamDataError(err.to_string())
    }
}
