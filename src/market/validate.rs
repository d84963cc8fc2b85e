use crate::error::MarketError;
use crate::market::types::CandleQuery;

pub const ASSETS_LIMIT_MAX: u32 = 100;
pub const CANDLES_LIMIT_MAX: u32 = 5000;
pub const SEARCH_LIMIT_MAX: u32 = 100;
pub const SEARCH_QUERY_MIN_LEN: usize = 2;

/// Range checks happen before any cache or provider contact; a violation is
/// always `InvalidParameter`.

pub fn validate_symbol(symbol: &str) -> Result<(), MarketError> {
    if symbol.is_empty() {
        return Err(MarketError::invalid_parameter("symbol must not be empty"));
    }
    let ok = symbol
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':'));
    if !ok {
        return Err(MarketError::invalid_parameter(format!(
            "symbol contains invalid characters: {}",
            symbol
        )));
    }
    Ok(())
}

pub fn validate_assets_query(limit: u32, _offset: u32) -> Result<(), MarketError> {
    if limit == 0 || limit > ASSETS_LIMIT_MAX {
        return Err(MarketError::invalid_parameter(format!(
            "assets limit must be between 1 and {}, got {}",
            ASSETS_LIMIT_MAX, limit
        )));
    }
    Ok(())
}

pub fn validate_candle_query(query: &CandleQuery) -> Result<(), MarketError> {
    validate_symbol(&query.symbol)?;
    if query.limit == 0 || query.limit > CANDLES_LIMIT_MAX {
        return Err(MarketError::invalid_parameter(format!(
            "candles limit must be between 1 and {}, got {}",
            CANDLES_LIMIT_MAX, query.limit
        )));
    }
    if query.multiplier == 0 {
        return Err(MarketError::invalid_parameter(
            "candles multiplier must be at least 1",
        ));
    }
    if let (Some(start), Some(end)) = (query.start_date, query.end_date) {
        if start > end {
            return Err(MarketError::invalid_parameter(format!(
                "candles start date {} is after end date {}",
                start, end
            )));
        }
    }
    Ok(())
}

pub fn validate_search_query(query: &str, limit: u32) -> Result<(), MarketError> {
    if query.trim().chars().count() < SEARCH_QUERY_MIN_LEN {
        return Err(MarketError::invalid_parameter(format!(
            "search query must be at least {} characters",
            SEARCH_QUERY_MIN_LEN
        )));
    }
    if limit == 0 || limit > SEARCH_LIMIT_MAX {
        return Err(MarketError::invalid_parameter(format!(
            "search limit must be between 1 and {}, got {}",
            SEARCH_LIMIT_MAX, limit
        )));
    }
    Ok(())
}
