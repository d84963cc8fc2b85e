use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc, Weekday};

/// 将毫秒级时间戳转换为 DateTime<Utc>
pub fn mill_ts_to_datetime(timestamp_ms: i64) -> Result<DateTime<Utc>, String> {
    match Utc.timestamp_millis_opt(timestamp_ms) {
        chrono::LocalResult::Single(datetime) => Ok(datetime),
        chrono::LocalResult::None => Err("Invalid timestamp: None".to_string()),
        chrono::LocalResult::Ambiguous(_, _) => Err("Invalid timestamp: Ambiguous".to_string()),
    }
}

/// Epoch milliseconds at UTC midnight of the given date.
pub fn date_to_mill_ts(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| Utc.from_utc_datetime(&dt).timestamp_millis())
        .unwrap_or(0)
}

/// Last weekday strictly before `target`. The grouped-daily endpoint only
/// has data for trading days, so weekend requests roll back to Friday.
pub fn last_trading_day(target: NaiveDate) -> NaiveDate {
    match target.weekday() {
        Weekday::Mon => target - Duration::days(3),
        Weekday::Sun => target - Duration::days(2),
        Weekday::Sat => target - Duration::days(1),
        _ => target - Duration::days(1),
    }
}

/// Convenience form of [`last_trading_day`] anchored at today (UTC).
pub fn last_trading_day_today() -> NaiveDate {
    last_trading_day(Utc::now().date_naive())
}

/// Canonical YYYY-MM-DD formatting used in cache keys and provider paths.
pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
